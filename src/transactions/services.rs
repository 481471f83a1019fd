use tracing::debug;
use uuid::Uuid;

use super::dto::{
    CreateTransactionRequest, Pagination, TransactionPage, UpdateTransactionRequest,
};
use super::query::{parse_timestamp, total_pages, DayBound, TransactionFilter, TransactionQuery};
use super::repo::TransactionReader;
use super::repo_types::{NewTransaction, TransactionChanges};
use crate::categories::repo_types::EntryKind;
use crate::error::ApiError;

/// Run the count and the page fetch concurrently and shape the listing.
pub async fn list_page(
    reader: &dyn TransactionReader,
    user_id: Uuid,
    filter: &TransactionFilter,
) -> Result<TransactionPage, ApiError> {
    let query = TransactionQuery::new(user_id, filter);
    debug!(predicates = query.predicates.len(), "listing transactions");

    let (total_items, rows) = tokio::try_join!(reader.count(&query), reader.fetch_page(&query))?;

    Ok(TransactionPage {
        transactions: rows.into_iter().map(Into::into).collect(),
        pagination: Pagination {
            page: filter.page,
            limit: filter.limit,
            total_pages: total_pages(total_items, filter.limit),
            total_items,
            filters: filter.applied(),
        },
    })
}

fn missing(field: &str) -> ApiError {
    ApiError::validation(format!("Missing required field: {field}"))
}

fn parse_kind(raw: &str) -> Result<EntryKind, ApiError> {
    EntryKind::parse(raw.trim())
        .ok_or_else(|| ApiError::validation("type must be 'income' or 'expense'"))
}

fn check_amount(amount: f64) -> Result<f64, ApiError> {
    if !amount.is_finite() {
        return Err(ApiError::validation("amount must be a number"));
    }
    Ok(amount)
}

fn clean_category(raw: &str) -> Result<String, ApiError> {
    let category = raw.trim();
    if category.is_empty() {
        return Err(ApiError::validation("category cannot be empty"));
    }
    Ok(category.to_string())
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

pub fn validate_new(
    user_id: Uuid,
    req: CreateTransactionRequest,
) -> Result<NewTransaction, ApiError> {
    let kind = req.kind.ok_or_else(|| missing("type"))?;
    let amount = req.amount.ok_or_else(|| missing("amount"))?;
    let category = req.category.ok_or_else(|| missing("category"))?;
    let date = req.date.ok_or_else(|| missing("date"))?;

    Ok(NewTransaction {
        user_id,
        kind: parse_kind(&kind)?,
        amount: check_amount(amount)?,
        category: clean_category(&category)?,
        occurred_at: parse_timestamp("date", &date, DayBound::Start)?,
        description: req.description.unwrap_or_default(),
        payment_method: req.payment_method.unwrap_or_default(),
        tags: clean_tags(req.tags.unwrap_or_default()),
    })
}

pub fn validate_changes(req: UpdateTransactionRequest) -> Result<TransactionChanges, ApiError> {
    Ok(TransactionChanges {
        kind: req.kind.as_deref().map(parse_kind).transpose()?,
        amount: req.amount.map(check_amount).transpose()?,
        category: req.category.as_deref().map(clean_category).transpose()?,
        occurred_at: req
            .date
            .as_deref()
            .map(|d| parse_timestamp("date", d, DayBound::Start))
            .transpose()?,
        description: req.description,
        payment_method: req.payment_method,
        tags: req.tags.map(clean_tags),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transactions::memory::{row, FailingReader, MemoryReader};
    use crate::transactions::query::ListTransactionsParams;
    use crate::transactions::repo_types::TransactionRow;
    use time::macros::datetime;

    fn filter(p: ListTransactionsParams) -> TransactionFilter {
        TransactionFilter::from_params(&p).unwrap()
    }

    fn by_day(count: i64, user: Uuid) -> Vec<TransactionRow> {
        (0..count).map(|d| row(user, d, 10.0 + d as f64)).collect()
    }

    #[tokio::test]
    async fn listing_never_crosses_tenants() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut rows = by_day(7, alice);
        rows.extend(by_day(5, bob));
        let reader = MemoryReader::new(rows);

        let page = list_page(
            &reader,
            alice,
            &filter(ListTransactionsParams {
                limit: Some("100".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(page.pagination.total_items, 7);
        assert_eq!(page.transactions.len(), 7);

        let alice_ids: Vec<Uuid> = reader
            .rows
            .iter()
            .filter(|r| r.user_id == alice)
            .map(|r| r.id)
            .collect();
        assert!(page.transactions.iter().all(|t| alice_ids.contains(&t.id)));
    }

    #[tokio::test]
    async fn second_page_of_twelve_holds_records_six_to_ten() {
        let user = Uuid::new_v4();
        let reader = MemoryReader::new(by_day(12, user));

        let page = list_page(
            &reader,
            user,
            &filter(ListTransactionsParams {
                page: Some("2".into()),
                limit: Some("5".into()),
                sort_order: Some("asc".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.total_items, 12);
        let amounts: Vec<f64> = page.transactions.iter().map(|t| t.amount).collect();
        // records 6..=10 in ascending date order are days 5..=9
        assert_eq!(amounts, vec![15.0, 16.0, 17.0, 18.0, 19.0]);
    }

    #[tokio::test]
    async fn default_order_is_newest_first() {
        let user = Uuid::new_v4();
        let reader = MemoryReader::new(by_day(3, user));
        let page = list_page(&reader, user, &filter(Default::default()))
            .await
            .unwrap();
        assert_eq!(page.transactions[0].date, datetime!(2024-01-03 12:00 UTC));
    }

    #[tokio::test]
    async fn lone_start_date_does_not_filter() {
        let user = Uuid::new_v4();
        let reader = MemoryReader::new(by_day(10, user));
        let page = list_page(
            &reader,
            user,
            &filter(ListTransactionsParams {
                start_date: Some("2024-01-08".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(page.pagination.total_items, 10);

        let page = list_page(
            &reader,
            user,
            &filter(ListTransactionsParams {
                start_date: Some("2024-01-03".into()),
                end_date: Some("2024-01-05".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(page.pagination.total_items, 3);
    }

    #[tokio::test]
    async fn min_amount_alone_is_open_above() {
        let user = Uuid::new_v4();
        let reader = MemoryReader::new(vec![
            row(user, 0, 10.0),
            row(user, 1, 49.99),
            row(user, 2, 50.0),
            row(user, 3, 5000.0),
        ]);
        let page = list_page(
            &reader,
            user,
            &filter(ListTransactionsParams {
                min_amount: Some("50".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(page.pagination.total_items, 2);
        assert!(page.transactions.iter().all(|t| t.amount >= 50.0));
    }

    #[tokio::test]
    async fn tags_match_any() {
        let user = Uuid::new_v4();
        let tagged = |day, tags: &[&str]| {
            let mut r = row(user, day, 1.0);
            r.tags = tags.iter().map(|t| t.to_string()).collect();
            r
        };
        let reader = MemoryReader::new(vec![
            tagged(0, &["food"]),
            tagged(1, &["travel", "work"]),
            tagged(2, &["rent"]),
            tagged(3, &[]),
        ]);
        let page = list_page(
            &reader,
            user,
            &filter(ListTransactionsParams {
                tags: Some("food,travel".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(page.pagination.total_items, 2);
        assert_eq!(
            page.pagination.filters.tags,
            Some(vec!["food".to_string(), "travel".to_string()])
        );
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let user = Uuid::new_v4();
        let described = |day, d: &str| {
            let mut r = row(user, day, 1.0);
            r.description = d.into();
            r
        };
        let reader = MemoryReader::new(vec![
            described(0, "Morning Coffee Run"),
            described(1, "COFFEE shop"),
            described(2, "Groceries"),
        ]);
        let page = list_page(
            &reader,
            user,
            &filter(ListTransactionsParams {
                search: Some("coffee".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(page.pagination.total_items, 2);
    }

    #[tokio::test]
    async fn total_pages_is_zero_for_empty_results() {
        let reader = MemoryReader::default();
        let page = list_page(&reader, Uuid::new_v4(), &filter(Default::default()))
            .await
            .unwrap();
        assert_eq!(page.pagination.total_pages, 0);
        assert!(page.transactions.is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_a_dependency_error() {
        let err = list_page(&FailingReader, Uuid::new_v4(), &filter(Default::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Dependency(_)));
    }

    #[test]
    fn create_reports_first_missing_field() {
        let err = validate_new(Uuid::new_v4(), CreateTransactionRequest::default()).unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: type");

        let err = validate_new(
            Uuid::new_v4(),
            CreateTransactionRequest {
                kind: Some("expense".into()),
                amount: Some(12.0),
                category: Some("Food".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: date");
    }

    #[test]
    fn create_parses_and_cleans() {
        let user = Uuid::new_v4();
        let new = validate_new(
            user,
            CreateTransactionRequest {
                kind: Some("income".into()),
                amount: Some(1200.0),
                category: Some(" Salary ".into()),
                date: Some("2024-05-01".into()),
                tags: Some(vec!["work".into(), " work ".into(), "".into()]),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(new.kind, EntryKind::Income);
        assert_eq!(new.category, "Salary");
        assert_eq!(new.occurred_at, datetime!(2024-05-01 0:00 UTC));
        assert_eq!(new.tags, vec!["work"]);
        assert_eq!(new.payment_method, "");
    }

    #[test]
    fn create_rejects_bad_values() {
        let base = || CreateTransactionRequest {
            kind: Some("expense".into()),
            amount: Some(5.0),
            category: Some("Food".into()),
            date: Some("2024-05-01".into()),
            ..Default::default()
        };
        let bad_kind = CreateTransactionRequest { kind: Some("gift".into()), ..base() };
        let bad_date = CreateTransactionRequest { date: Some("May 1st".into()), ..base() };
        let blank_category = CreateTransactionRequest { category: Some(" ".into()), ..base() };
        for req in [bad_kind, bad_date, blank_category] {
            assert!(matches!(
                validate_new(Uuid::new_v4(), req),
                Err(ApiError::Validation(_))
            ));
        }
    }

    #[test]
    fn changes_carry_only_supplied_fields() {
        let changes = validate_changes(UpdateTransactionRequest {
            amount: Some(42.5),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(changes.amount, Some(42.5));
        assert!(changes.kind.is_none() && changes.category.is_none() && changes.tags.is_none());
    }
}
