//! In-memory `TransactionReader` evaluating predicates the way the SQL does.
use std::cmp::Ordering;

use async_trait::async_trait;
use time::{macros::datetime, Duration};
use uuid::Uuid;

use super::query::{Predicate, SortField, SortOrder, TransactionQuery};
use super::repo::TransactionReader;
use super::repo_types::TransactionRow;

#[derive(Default)]
pub struct MemoryReader {
    pub rows: Vec<TransactionRow>,
}

impl MemoryReader {
    pub fn new(rows: Vec<TransactionRow>) -> Self {
        Self { rows }
    }

    fn matching(&self, query: &TransactionQuery) -> Vec<TransactionRow> {
        self.rows
            .iter()
            .filter(|row| query.predicates.iter().all(|p| matches(p, row)))
            .cloned()
            .collect()
    }
}

fn matches(p: &Predicate, row: &TransactionRow) -> bool {
    match p {
        Predicate::Owner(id) => row.user_id == *id,
        Predicate::Kind(kind) => row.kind == kind.as_str(),
        Predicate::Category(c) => &row.category == c,
        Predicate::DateBetween(r) => r.start <= row.occurred_at && row.occurred_at <= r.end,
        Predicate::AmountAtLeast(v) => row.amount >= *v,
        Predicate::AmountAtMost(v) => row.amount <= *v,
        Predicate::PaymentMethod(m) => &row.payment_method == m,
        Predicate::AnyTag(tags) => row.tags.iter().any(|t| tags.contains(t)),
        Predicate::DescriptionContains(needle) => row
            .description
            .to_lowercase()
            .contains(&needle.to_lowercase()),
    }
}

fn compare(field: SortField, a: &TransactionRow, b: &TransactionRow) -> Ordering {
    let primary = match field {
        SortField::Date => a.occurred_at.cmp(&b.occurred_at),
        SortField::Amount => a.amount.total_cmp(&b.amount),
        SortField::Type => a.kind.cmp(&b.kind),
        SortField::Category => a.category.cmp(&b.category),
        SortField::PaymentMethod => a.payment_method.cmp(&b.payment_method),
        SortField::Description => a.description.cmp(&b.description),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl TransactionReader for MemoryReader {
    async fn count(&self, query: &TransactionQuery) -> anyhow::Result<i64> {
        Ok(self.matching(query).len() as i64)
    }

    async fn fetch_page(&self, query: &TransactionQuery) -> anyhow::Result<Vec<TransactionRow>> {
        let mut rows = self.matching(query);
        rows.sort_by(|a, b| {
            let ord = compare(query.sort_by, a, b);
            match query.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }
}

/// A reader whose every call fails, for exercising the dependency error path.
pub struct FailingReader;

#[async_trait]
impl TransactionReader for FailingReader {
    async fn count(&self, _query: &TransactionQuery) -> anyhow::Result<i64> {
        anyhow::bail!("connection refused")
    }

    async fn fetch_page(&self, _query: &TransactionQuery) -> anyhow::Result<Vec<TransactionRow>> {
        anyhow::bail!("connection refused")
    }
}

/// Builder for fixture rows; `day` offsets the date from 2024-01-01.
pub fn row(user_id: Uuid, day: i64, amount: f64) -> TransactionRow {
    let at = datetime!(2024-01-01 12:00 UTC) + Duration::days(day);
    TransactionRow {
        id: Uuid::new_v4(),
        user_id,
        kind: "expense".into(),
        amount,
        category: "General".into(),
        occurred_at: at,
        description: String::new(),
        payment_method: "card".into(),
        tags: Vec::new(),
        created_at: at,
        updated_at: at,
    }
}
