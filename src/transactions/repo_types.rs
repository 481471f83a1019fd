use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::categories::repo_types::EntryKind;

pub const TRANSACTION_COLUMNS: &str = "id, user_id, kind, amount, category, occurred_at, \
     description, payment_method, tags, created_at, updated_at";

/// Transaction record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String, // "income" | "expense"
    pub amount: f64,
    pub category: String,
    pub occurred_at: OffsetDateTime,
    pub description: String,
    pub payment_method: String,
    pub tags: Vec<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub kind: EntryKind,
    pub amount: f64,
    pub category: String,
    pub occurred_at: OffsetDateTime,
    pub description: String,
    pub payment_method: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionChanges {
    pub kind: Option<EntryKind>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub occurred_at: Option<OffsetDateTime>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TotalsRow {
    pub income: f64,
    pub expense: f64,
    pub count: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct PeriodRow {
    pub bucket: OffsetDateTime,
    pub income: f64,
    pub expense: f64,
    pub count: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct CategoryTotalRow {
    pub category: String,
    pub total: f64,
    pub count: i64,
}
