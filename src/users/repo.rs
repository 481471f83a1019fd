use anyhow::Context;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use super::dto::UpdateUserRequest;
use super::repo_types::{NewUser, User};

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, currency, \
     monthly_budget, is_active, email_verified, notifications, profile_picture, \
     created_at, updated_at, last_login";

impl User {
    /// Find a user by (normalised) email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(db)
        .await
        .context("list users")?;
        Ok(users)
    }

    pub async fn create(db: &PgPool, new: NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, first_name, last_name, email, password_hash, currency,
                               monthly_budget, notifications, profile_picture)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.first_name)
        .bind(new.last_name)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.currency)
        .bind(new.monthly_budget)
        .bind(Json(new.notifications))
        .bind(new.profile_picture)
        .fetch_one(db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    /// Partial profile update; absent fields keep their stored value.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        changes: UpdateUserRequest,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                first_name      = COALESCE($2, first_name),
                last_name       = COALESCE($3, last_name),
                currency        = COALESCE($4, currency),
                monthly_budget  = COALESCE($5, monthly_budget),
                notifications   = COALESCE($6, notifications),
                profile_picture = COALESCE($7, profile_picture),
                updated_at      = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.currency)
        .bind(changes.monthly_budget)
        .bind(changes.notifications.map(Json))
        .bind(changes.profile_picture)
        .fetch_optional(db)
        .await
        .context("update user profile")?;
        Ok(user)
    }

    pub async fn touch_last_login(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await
            .context("update last_login")?;
        Ok(())
    }
}
