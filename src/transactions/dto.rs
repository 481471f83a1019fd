use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::query::{SortField, SortOrder};
use super::repo_types::TransactionRow;
use super::stats::StatsPeriod;
use crate::categories::repo_types::EntryKind;

/// Public shape of a transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
    pub category: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub description: String,
    pub payment_method: String,
    pub tags: Vec<String>,
}

impl From<TransactionRow> for TransactionResponse {
    fn from(t: TransactionRow) -> Self {
        Self {
            id: t.id,
            kind: t.kind,
            amount: t.amount,
            category: t.category,
            date: t.occurred_at,
            description: t.description,
            payment_method: t.payment_method,
            tags: t.tags,
        }
    }
}

/// Filters that constrained a listing; inactive ones are `null`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilters {
    #[serde(rename = "type")]
    pub kind: Option<EntryKind>,
    pub category: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub payment_method: Option<String>,
    pub tags: Option<Vec<String>>,
    pub search: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub filters: AppliedFilters,
}

#[derive(Debug, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<TransactionResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransactionRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct TransactionEnvelope {
    pub transaction: TransactionResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteRequest {
    #[serde(default)]
    pub transaction_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCount {
    pub deleted_count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub income: f64,
    pub expense: f64,
    pub balance: f64,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub period: OffsetDateTime,
    pub income: f64,
    pub expense: f64,
    pub balance: f64,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStats {
    pub period: StatsPeriod,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub totals: Totals,
    pub series: Vec<PeriodSummary>,
    pub by_category: Vec<CategoryTotal>,
}

#[derive(Debug, Serialize)]
pub struct StatsEnvelope {
    pub stats: TransactionStats,
}
