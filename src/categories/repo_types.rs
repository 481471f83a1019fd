use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Whether money flows in or out. Shared by categories and transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Income,
    Expense,
}

impl EntryKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Option<Uuid>, // None for built-in defaults
    pub name: String,
    pub description: String,
    pub color: String,
    pub icon: String,
    pub kind: String, // "income" | "expense", enforced by a CHECK constraint
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    pub is_default: bool,
    pub usage_count: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub user_id: Uuid,
    pub name: String,
    pub description: String,
    pub color: String,
    pub icon: String,
    pub kind: EntryKind,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub kind: Option<EntryKind>,
    pub is_active: Option<bool>,
}
