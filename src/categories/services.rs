use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use super::dto::{CreateCategoryRequest, UpdateCategoryRequest};
use super::repo_types::{CategoryChanges, EntryKind, NewCategory};
use crate::error::ApiError;

pub const DEFAULT_COLOR: &str = "#000000";
const MAX_NAME_LEN: usize = 64;

fn valid_color(color: &str) -> bool {
    lazy_static! {
        static ref COLOR_RE: Regex = Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap();
    }
    COLOR_RE.is_match(color)
}

fn parse_kind(raw: &str) -> Result<EntryKind, ApiError> {
    EntryKind::parse(raw).ok_or_else(|| ApiError::validation("type must be 'income' or 'expense'"))
}

fn clean_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn clean_color(raw: String) -> Result<String, ApiError> {
    if !valid_color(&raw) {
        return Err(ApiError::validation("color must look like #RRGGBB"));
    }
    Ok(raw)
}

pub fn validate_new(user_id: Uuid, req: CreateCategoryRequest) -> Result<NewCategory, ApiError> {
    let (Some(name), Some(kind)) = (req.name, req.kind) else {
        return Err(ApiError::validation("Missing required fields"));
    };

    Ok(NewCategory {
        user_id,
        name: clean_name(&name)?,
        description: req.description.unwrap_or_default(),
        color: clean_color(req.color.unwrap_or_else(|| DEFAULT_COLOR.into()))?,
        icon: req.icon.unwrap_or_default(),
        kind: parse_kind(&kind)?,
        parent_id: req.parent_category,
        is_active: req.is_active.unwrap_or(true),
    })
}

pub fn validate_changes(req: UpdateCategoryRequest) -> Result<CategoryChanges, ApiError> {
    Ok(CategoryChanges {
        name: req.name.as_deref().map(clean_name).transpose()?,
        description: req.description,
        color: req.color.map(clean_color).transpose()?,
        icon: req.icon,
        kind: req.kind.as_deref().map(parse_kind).transpose()?,
        is_active: req.is_active,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(name: Option<&str>, kind: Option<&str>) -> CreateCategoryRequest {
        CreateCategoryRequest {
            name: name.map(String::from),
            kind: kind.map(String::from),
            description: None,
            color: None,
            icon: None,
            parent_category: None,
            is_active: None,
        }
    }

    #[test]
    fn new_category_defaults() {
        let user = Uuid::new_v4();
        let cat = validate_new(user, create(Some("  Groceries "), Some("expense"))).unwrap();
        assert_eq!(cat.name, "Groceries");
        assert_eq!(cat.color, DEFAULT_COLOR);
        assert_eq!(cat.kind, EntryKind::Expense);
        assert_eq!(cat.user_id, user);
        assert!(cat.is_active);
    }

    #[test]
    fn name_and_type_are_required() {
        let err = validate_new(Uuid::new_v4(), create(Some("Rent"), None)).unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields");
        let err = validate_new(Uuid::new_v4(), create(None, Some("income"))).unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields");
    }

    #[test]
    fn rejects_unknown_type_and_bad_color() {
        assert!(validate_new(Uuid::new_v4(), create(Some("Misc"), Some("transfer"))).is_err());

        let mut req = create(Some("Misc"), Some("expense"));
        req.color = Some("red".into());
        let err = validate_new(Uuid::new_v4(), req).unwrap_err();
        assert_eq!(err.to_string(), "color must look like #RRGGBB");
    }

    #[test]
    fn changes_only_carry_supplied_fields() {
        let changes = validate_changes(UpdateCategoryRequest {
            color: Some("#12abEF".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(changes.color.as_deref(), Some("#12abEF"));
        assert!(changes.name.is_none());
        assert!(changes.kind.is_none());
    }

    #[test]
    fn changes_reject_blank_name() {
        let err = validate_changes(UpdateCategoryRequest {
            name: Some("   ".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "name cannot be empty");
    }
}
