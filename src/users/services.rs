use sqlx::PgPool;
use tracing::{info, warn};

use super::dto::CreateUserRequest;
use super::repo_types::{NewUser, User};
use crate::auth::password::{hash_password, is_valid_email, MIN_PASSWORD_LEN};
use crate::error::ApiError;

/// Check a sign-up payload and turn it into a row, minus the password hash.
///
/// Returns the normalised row and the plain password.
pub fn validate_new_user(req: CreateUserRequest) -> Result<(NewUser, String), ApiError> {
    let (Some(first_name), Some(last_name), Some(email), Some(password)) =
        (req.first_name, req.last_name, req.email, req.password)
    else {
        return Err(ApiError::validation("Missing required fields"));
    };

    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::validation("Invalid email"));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation("Password too short"));
    }
    let monthly_budget = req.monthly_budget.unwrap_or(0.0);
    if !monthly_budget.is_finite() || monthly_budget < 0.0 {
        return Err(ApiError::validation("monthlyBudget must be a non-negative number"));
    }

    let user = NewUser {
        first_name: first_name.trim().to_string(),
        last_name: last_name.trim().to_string(),
        email,
        password_hash: String::new(),
        currency: req
            .currency
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "USD".into()),
        monthly_budget,
        notifications: req.notifications.unwrap_or_default(),
        profile_picture: req.profile_picture.unwrap_or_default(),
    };
    Ok((user, password))
}

pub async fn register_user(db: &PgPool, req: CreateUserRequest) -> Result<User, ApiError> {
    let (mut new_user, password) = validate_new_user(req)?;

    if User::find_by_email(db, &new_user.email).await?.is_some() {
        warn!(email = %new_user.email, "email already registered");
        return Err(ApiError::Conflict("Email already exists".into()));
    }

    new_user.password_hash = hash_password(&password)?;
    let user = User::create(db, new_user).await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateUserRequest {
        CreateUserRequest {
            first_name: Some(" Ada ".into()),
            last_name: Some("Lovelace".into()),
            email: Some("  Ada@Example.COM ".into()),
            password: Some("analytical-engine".into()),
            currency: Some("eur".into()),
            monthly_budget: None,
            notifications: None,
            profile_picture: None,
        }
    }

    #[test]
    fn normalises_and_defaults() {
        let (user, password) = validate_new_user(request()).expect("valid");
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.first_name, "Ada");
        assert_eq!(user.currency, "EUR");
        assert_eq!(user.monthly_budget, 0.0);
        assert!(user.notifications.budget_alerts);
        assert!(!user.notifications.weekly_reports);
        assert_eq!(password, "analytical-engine");
    }

    #[test]
    fn currency_defaults_to_usd() {
        let mut req = request();
        req.currency = None;
        assert_eq!(validate_new_user(req).unwrap().0.currency, "USD");
    }

    #[test]
    fn rejects_missing_fields() {
        let mut req = request();
        req.last_name = None;
        let err = validate_new_user(req).unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields");
    }

    #[test]
    fn rejects_bad_email_and_short_password() {
        let mut req = request();
        req.email = Some("nope".into());
        assert_eq!(validate_new_user(req).unwrap_err().to_string(), "Invalid email");

        let mut req = request();
        req.password = Some("short".into());
        assert_eq!(validate_new_user(req).unwrap_err().to_string(), "Password too short");
    }

    #[test]
    fn rejects_negative_budget() {
        let mut req = request();
        req.monthly_budget = Some(-5.0);
        assert!(matches!(validate_new_user(req), Err(ApiError::Validation(_))));
    }
}
