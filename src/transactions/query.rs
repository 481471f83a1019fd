//! Transaction listing: query-string parsing, predicate composition and SQL.
//!
//! Raw parameters are parsed once into a [`TransactionFilter`]; the filter is
//! turned into an ordered list of [`Predicate`]s (always starting with the
//! owner), and the same list drives both the count and the page query.
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    PrimitiveDateTime, Time,
};
use uuid::Uuid;

use super::dto::AppliedFilters;
use super::repo_types::TRANSACTION_COLUMNS;
use crate::categories::repo_types::EntryKind;
use crate::error::ApiError;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;

/// Query string of `GET /transactions`, exactly as the client sent it.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTransactionsParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub min_amount: Option<String>,
    pub max_amount: Option<String>,
    pub payment_method: Option<String>,
    pub tags: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Date,
    Amount,
    Type,
    Category,
    PaymentMethod,
    Description,
    CreatedAt,
}

impl SortField {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "date" => Self::Date,
            "amount" => Self::Amount,
            "type" => Self::Type,
            "category" => Self::Category,
            "paymentMethod" => Self::PaymentMethod,
            "description" => Self::Description,
            "createdAt" => Self::CreatedAt,
            _ => return None,
        })
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Date => "occurred_at",
            Self::Amount => "amount",
            Self::Type => "kind",
            Self::Category => "category",
            Self::PaymentMethod => "payment_method",
            Self::Description => "description",
            Self::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Inclusive timestamp range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

/// Which end of a day a bare `YYYY-MM-DD` resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayBound {
    Start,
    End,
}

/// Strongly typed listing filter; `None` means "no constraint".
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFilter {
    pub page: i64,
    pub limit: i64,
    pub offset: i64,
    pub kind: Option<EntryKind>,
    pub category: Option<String>,
    pub date_range: Option<DateRange>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub payment_method: Option<String>,
    pub tags: Option<Vec<String>>,
    pub search: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

fn present(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_positive(field: &str, raw: Option<&str>, default: i64) -> Result<i64, ApiError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<i64>() {
        Ok(v) if v >= 1 => Ok(v),
        _ => Err(ApiError::validation(format!(
            "{field} must be a positive integer"
        ))),
    }
}

fn parse_amount(field: &str, raw: Option<&str>) -> Result<Option<f64>, ApiError> {
    raw.map(|raw| match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ApiError::validation(format!("{field} must be a number"))),
    })
    .transpose()
}

/// Parse an ISO-8601 timestamp, a naive `YYYY-MM-DDTHH:MM:SS` (read as UTC)
/// or a bare date.
pub fn parse_timestamp(field: &str, raw: &str, bound: DayBound) -> Result<OffsetDateTime, ApiError> {
    let raw = raw.trim();
    let invalid = || ApiError::validation(format!("{field} must be an ISO-8601 date"));

    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts);
    }
    if let Ok(ts) = PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
    ) {
        return Ok(ts.assume_utc());
    }
    let date = Date::parse(raw, format_description!("[year]-[month]-[day]")).map_err(|_| invalid())?;
    let time = match bound {
        DayBound::Start => Time::MIDNIGHT,
        DayBound::End => Time::from_hms_nano(23, 59, 59, 999_999_999).map_err(|_| invalid())?,
    };
    Ok(PrimitiveDateTime::new(date, time).assume_utc())
}

/// Both bounds activate the range; a lone bound is validated and then ignored.
pub fn parse_date_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Option<DateRange>, ApiError> {
    let start = start
        .map(|s| parse_timestamp("startDate", s, DayBound::Start))
        .transpose()?;
    let end = end
        .map(|s| parse_timestamp("endDate", s, DayBound::End))
        .transpose()?;

    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(ApiError::validation(
            "startDate must not be after endDate",
        )),
        (Some(start), Some(end)) => Ok(Some(DateRange { start, end })),
        _ => Ok(None),
    }
}

/// Split a comma-separated tag list, dropping blanks and duplicates.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

impl TransactionFilter {
    /// Validate the raw query string, failing on the first bad field.
    pub fn from_params(p: &ListTransactionsParams) -> Result<Self, ApiError> {
        let page = parse_positive("page", present(&p.page), DEFAULT_PAGE)?;
        let limit = parse_positive("limit", present(&p.limit), DEFAULT_LIMIT)?;
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| ApiError::validation("page is out of range"))?;

        let kind = present(&p.kind)
            .map(|raw| {
                EntryKind::parse(raw)
                    .ok_or_else(|| ApiError::validation("type must be 'income' or 'expense'"))
            })
            .transpose()?;

        let date_range = parse_date_range(present(&p.start_date), present(&p.end_date))?;

        let min_amount = parse_amount("minAmount", present(&p.min_amount))?;
        let max_amount = parse_amount("maxAmount", present(&p.max_amount))?;
        if let (Some(min), Some(max)) = (min_amount, max_amount) {
            if min > max {
                return Err(ApiError::validation("minAmount must not exceed maxAmount"));
            }
        }

        let tags = present(&p.tags)
            .map(parse_tags)
            .filter(|tags| !tags.is_empty());

        let sort_by = match present(&p.sort_by) {
            None => SortField::Date,
            Some(raw) => SortField::parse(raw).ok_or_else(|| {
                ApiError::validation(
                    "sortBy must be one of date, amount, type, category, paymentMethod, description, createdAt",
                )
            })?,
        };
        let sort_order = match present(&p.sort_order).map(str::to_ascii_lowercase).as_deref() {
            None | Some("desc") => SortOrder::Desc,
            Some("asc") => SortOrder::Asc,
            Some(_) => return Err(ApiError::validation("sortOrder must be 'asc' or 'desc'")),
        };

        Ok(Self {
            page,
            limit,
            offset,
            kind,
            category: present(&p.category).map(String::from),
            date_range,
            min_amount,
            max_amount,
            payment_method: present(&p.payment_method).map(String::from),
            tags,
            search: present(&p.search).map(String::from),
            sort_by,
            sort_order,
        })
    }

    /// The filters that actually constrain the result, echoed back to the client.
    pub fn applied(&self) -> AppliedFilters {
        AppliedFilters {
            kind: self.kind,
            category: self.category.clone(),
            start_date: self.date_range.map(|r| r.start),
            end_date: self.date_range.map(|r| r.end),
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            payment_method: self.payment_method.clone(),
            tags: self.tags.clone(),
            search: self.search.clone(),
            sort_by: self.sort_by,
            sort_order: self.sort_order,
        }
    }
}

/// One conjunctive condition of a transaction query.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Owner(Uuid),
    Kind(EntryKind),
    Category(String),
    DateBetween(DateRange),
    AmountAtLeast(f64),
    AmountAtMost(f64),
    PaymentMethod(String),
    AnyTag(Vec<String>),
    DescriptionContains(String),
}

/// Escape LIKE metacharacters so user input matches literally.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl Predicate {
    fn push_sql(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        match self {
            Predicate::Owner(id) => {
                qb.push("user_id = ").push_bind(*id);
            }
            Predicate::Kind(kind) => {
                qb.push("kind = ").push_bind(kind.as_str());
            }
            Predicate::Category(c) => {
                qb.push("category = ").push_bind(c.clone());
            }
            Predicate::DateBetween(range) => {
                qb.push("occurred_at BETWEEN ")
                    .push_bind(range.start)
                    .push(" AND ")
                    .push_bind(range.end);
            }
            Predicate::AmountAtLeast(v) => {
                qb.push("amount >= ").push_bind(*v);
            }
            Predicate::AmountAtMost(v) => {
                qb.push("amount <= ").push_bind(*v);
            }
            Predicate::PaymentMethod(m) => {
                qb.push("payment_method = ").push_bind(m.clone());
            }
            Predicate::AnyTag(tags) => {
                qb.push("tags && ").push_bind(tags.clone());
            }
            Predicate::DescriptionContains(needle) => {
                qb.push("description ILIKE ")
                    .push_bind(format!("%{}%", escape_like(needle)));
            }
        }
    }
}

/// Append `WHERE p1 AND p2 ...` for a non-empty predicate list.
pub fn push_where(qb: &mut QueryBuilder<'static, Postgres>, predicates: &[Predicate]) {
    for (i, p) in predicates.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        p.push_sql(qb);
    }
}

/// A composed, tenant-scoped listing query.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionQuery {
    pub predicates: Vec<Predicate>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl TransactionQuery {
    pub fn new(user_id: Uuid, f: &TransactionFilter) -> Self {
        let mut predicates = vec![Predicate::Owner(user_id)];
        if let Some(kind) = f.kind {
            predicates.push(Predicate::Kind(kind));
        }
        if let Some(c) = &f.category {
            predicates.push(Predicate::Category(c.clone()));
        }
        if let Some(range) = f.date_range {
            predicates.push(Predicate::DateBetween(range));
        }
        if let Some(min) = f.min_amount {
            predicates.push(Predicate::AmountAtLeast(min));
        }
        if let Some(max) = f.max_amount {
            predicates.push(Predicate::AmountAtMost(max));
        }
        if let Some(m) = &f.payment_method {
            predicates.push(Predicate::PaymentMethod(m.clone()));
        }
        if let Some(tags) = &f.tags {
            predicates.push(Predicate::AnyTag(tags.clone()));
        }
        if let Some(s) = &f.search {
            predicates.push(Predicate::DescriptionContains(s.clone()));
        }

        Self {
            predicates,
            sort_by: f.sort_by,
            sort_order: f.sort_order,
            limit: f.limit,
            offset: f.offset,
        }
    }

    pub fn count_sql(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM transactions");
        push_where(&mut qb, &self.predicates);
        qb
    }

    pub fn page_sql(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("SELECT {TRANSACTION_COLUMNS} FROM transactions"));
        push_where(&mut qb, &self.predicates);
        let dir = self.sort_order.sql();
        // id breaks ties so pages never overlap
        qb.push(format!(" ORDER BY {} {dir}, id {dir}", self.sort_by.column()));
        qb.push(" LIMIT ").push_bind(self.limit);
        qb.push(" OFFSET ").push_bind(self.offset);
        qb
    }
}

/// `ceil(total / limit)`; zero items means zero pages.
pub fn total_pages(total_items: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    total_items / limit + i64::from(total_items % limit != 0)
}
