use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Category, CategoryChanges, NewCategory};

const CATEGORY_COLUMNS: &str = "id, user_id, name, description, color, icon, kind, parent_id, \
     is_active, is_default, usage_count, created_at, updated_at";

/// Categories the user owns plus the built-in defaults.
pub async fn list_visible(
    db: &PgPool,
    user_id: Uuid,
    kind: Option<&str>,
) -> anyhow::Result<Vec<Category>> {
    let rows = sqlx::query_as::<_, Category>(&format!(
        r#"
        SELECT {CATEGORY_COLUMNS}
          FROM categories
         WHERE (user_id = $1 OR is_default)
           AND ($2::text IS NULL OR kind = $2)
         ORDER BY is_default DESC, name ASC
        "#
    ))
    .bind(user_id)
    .bind(kind)
    .fetch_all(db)
    .await
    .context("list categories")?;
    Ok(rows)
}

pub async fn find_visible(
    db: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> anyhow::Result<Option<Category>> {
    let row = sqlx::query_as::<_, Category>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1 AND (user_id = $2 OR is_default)"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("find category")?;
    Ok(row)
}

/// Whether `name` is already used by one of the user's categories or a default.
pub async fn name_taken(
    db: &PgPool,
    user_id: Uuid,
    name: &str,
    exclude: Option<Uuid>,
) -> anyhow::Result<bool> {
    let taken: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM categories
             WHERE name = $2
               AND (user_id = $1 OR is_default)
               AND ($3::uuid IS NULL OR id <> $3)
        )
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(exclude)
    .fetch_one(db)
    .await
    .context("check category name")?;
    Ok(taken)
}

/// Whether a transaction may reference `category`, given either as an id or a name.
pub async fn is_valid_for_user(db: &PgPool, user_id: Uuid, category: &str) -> anyhow::Result<bool> {
    let valid: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM categories
             WHERE (id::text = $2 OR name = $2)
               AND (user_id = $1 OR is_default)
               AND is_active
        )
        "#,
    )
    .bind(user_id)
    .bind(category)
    .fetch_one(db)
    .await
    .context("validate category reference")?;
    Ok(valid)
}

pub async fn insert(db: &PgPool, new: NewCategory) -> anyhow::Result<Category> {
    let row = sqlx::query_as::<_, Category>(&format!(
        r#"
        INSERT INTO categories (id, user_id, name, description, color, icon, kind, parent_id, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {CATEGORY_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.user_id)
    .bind(new.name)
    .bind(new.description)
    .bind(new.color)
    .bind(new.icon)
    .bind(new.kind.as_str())
    .bind(new.parent_id)
    .bind(new.is_active)
    .fetch_one(db)
    .await
    .context("insert category")?;
    Ok(row)
}

/// Partial update of a category the user owns; defaults are never touched.
pub async fn update_owned(
    db: &PgPool,
    user_id: Uuid,
    id: Uuid,
    changes: CategoryChanges,
) -> anyhow::Result<Option<Category>> {
    let row = sqlx::query_as::<_, Category>(&format!(
        r#"
        UPDATE categories SET
            name        = COALESCE($3, name),
            description = COALESCE($4, description),
            color       = COALESCE($5, color),
            icon        = COALESCE($6, icon),
            kind        = COALESCE($7, kind),
            is_active   = COALESCE($8, is_active),
            updated_at  = now()
        WHERE id = $1 AND user_id = $2
        RETURNING {CATEGORY_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(user_id)
    .bind(changes.name)
    .bind(changes.description)
    .bind(changes.color)
    .bind(changes.icon)
    .bind(changes.kind.map(|k| k.as_str()))
    .bind(changes.is_active)
    .fetch_optional(db)
    .await
    .context("update category")?;
    Ok(row)
}

pub async fn delete_owned(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await
        .context("delete category")?;
    Ok(result.rows_affected() > 0)
}
