use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Notifications, User};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub currency: Option<String>,
    pub monthly_budget: Option<f64>,
    pub notifications: Option<Notifications>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub currency: Option<String>,
    pub monthly_budget: Option<f64>,
    pub notifications: Option<Notifications>,
    pub profile_picture: Option<String>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub currency: String,
    pub monthly_budget: f64,
    pub is_active: bool,
    pub email_verified: bool,
    pub notifications: Notifications,
    pub profile_picture: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            first_name: u.first_name,
            last_name: u.last_name,
            email: u.email,
            currency: u.currency,
            monthly_budget: u.monthly_budget,
            is_active: u.is_active,
            email_verified: u.email_verified,
            notifications: u.notifications.0,
            profile_picture: u.profile_picture,
            created_at: u.created_at,
            updated_at: u.updated_at,
            last_login: u.last_login,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: PublicUser,
}
