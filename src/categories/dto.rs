use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::Category;

#[derive(Debug, Deserialize)]
pub struct ListCategoriesQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub parent_category: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub color: String,
    pub icon: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: Option<Uuid>,
    pub parent_category: Option<Uuid>,
    pub is_active: bool,
    pub is_default: bool,
    pub usage_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Category> for CategoryResponse {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            name: c.name,
            description: c.description,
            color: c.color,
            icon: c.icon,
            kind: c.kind,
            user_id: c.user_id,
            parent_category: c.parent_id,
            is_active: c.is_active,
            is_default: c.is_default,
            usage_count: c.usage_count,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}
