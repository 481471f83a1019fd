use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Per-user notification switches, stored as JSONB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notifications {
    pub budget_alerts: bool,
    pub email: bool,
    pub weekly_reports: bool,
}

impl Default for Notifications {
    fn default() -> Self {
        Self {
            budget_alerts: true,
            email: true,
            weekly_reports: false,
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String, // Argon2 hash, never serialized
    pub currency: String,
    pub monthly_budget: f64,
    pub is_active: bool,
    pub email_verified: bool,
    pub notifications: Json<Notifications>,
    pub profile_picture: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
}

/// Validated input for a new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub currency: String,
    pub monthly_budget: f64,
    pub notifications: Notifications,
    pub profile_picture: String,
}
