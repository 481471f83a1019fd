use serde::Serialize;
use uuid::Uuid;

use super::dto::{CategoryTotal, PeriodSummary, StatsParams, Totals, TransactionStats};
use super::query::{parse_date_range, DateRange, Predicate};
use super::repo_types::{CategoryTotalRow, PeriodRow, TotalsRow};
use crate::error::ApiError;

/// Bucket width of the stats time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl StatsPeriod {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw.to_ascii_lowercase().as_str() {
            "day" => Self::Day,
            "week" => Self::Week,
            "month" => Self::Month,
            "year" => Self::Year,
            _ => return None,
        })
    }

    /// Unit name understood by Postgres `date_trunc`.
    pub fn trunc_unit(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsFilter {
    pub period: StatsPeriod,
    pub date_range: Option<DateRange>,
}

impl StatsFilter {
    pub fn from_params(p: &StatsParams) -> Result<Self, ApiError> {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        let period = match clean(&p.period) {
            None => StatsPeriod::default(),
            Some(raw) => StatsPeriod::parse(&raw).ok_or_else(|| {
                ApiError::validation("period must be one of day, week, month, year")
            })?,
        };
        let date_range = parse_date_range(
            clean(&p.start_date).as_deref(),
            clean(&p.end_date).as_deref(),
        )?;
        Ok(Self { period, date_range })
    }

    pub fn predicates(&self, user_id: Uuid) -> Vec<Predicate> {
        let mut predicates = vec![Predicate::Owner(user_id)];
        if let Some(range) = self.date_range {
            predicates.push(Predicate::DateBetween(range));
        }
        predicates
    }
}

pub fn summarize(
    filter: &StatsFilter,
    totals: TotalsRow,
    series: Vec<PeriodRow>,
    by_category: Vec<CategoryTotalRow>,
) -> TransactionStats {
    TransactionStats {
        period: filter.period,
        start_date: filter.date_range.map(|r| r.start),
        end_date: filter.date_range.map(|r| r.end),
        totals: Totals {
            income: totals.income,
            expense: totals.expense,
            balance: totals.income - totals.expense,
            count: totals.count,
        },
        series: series
            .into_iter()
            .map(|row| PeriodSummary {
                period: row.bucket,
                income: row.income,
                expense: row.expense,
                balance: row.income - row.expense,
                count: row.count,
            })
            .collect(),
        by_category: by_category
            .into_iter()
            .map(|row| CategoryTotal {
                category: row.category,
                total: row.total,
                count: row.count,
            })
            .collect(),
    }
}
