use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use super::query::{push_where, Predicate, TransactionQuery};
use super::repo_types::{
    CategoryTotalRow, NewTransaction, PeriodRow, TotalsRow, TransactionChanges, TransactionRow,
    TRANSACTION_COLUMNS,
};
use super::stats::StatsPeriod;
use crate::categories::repo_types::EntryKind;

/// Read side of the listing: a filtered count and a sorted, bounded page.
#[async_trait]
pub trait TransactionReader: Send + Sync {
    async fn count(&self, query: &TransactionQuery) -> anyhow::Result<i64>;
    async fn fetch_page(&self, query: &TransactionQuery) -> anyhow::Result<Vec<TransactionRow>>;
}

#[async_trait]
impl TransactionReader for PgPool {
    async fn count(&self, query: &TransactionQuery) -> anyhow::Result<i64> {
        let mut qb = query.count_sql();
        let total: i64 = qb
            .build_query_scalar()
            .fetch_one(self)
            .await
            .context("count transactions")?;
        Ok(total)
    }

    async fn fetch_page(&self, query: &TransactionQuery) -> anyhow::Result<Vec<TransactionRow>> {
        let mut qb = query.page_sql();
        let rows = qb
            .build_query_as::<TransactionRow>()
            .fetch_all(self)
            .await
            .context("fetch transaction page")?;
        Ok(rows)
    }
}

/// Insert a transaction and bump the usage counter of the category it names.
pub async fn insert(db: &PgPool, new: NewTransaction) -> anyhow::Result<TransactionRow> {
    let mut tx = db.begin().await.context("begin insert transaction")?;

    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        INSERT INTO transactions (id, user_id, kind, amount, category, occurred_at,
                                  description, payment_method, tags)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.user_id)
    .bind(new.kind.as_str())
    .bind(new.amount)
    .bind(&new.category)
    .bind(new.occurred_at)
    .bind(new.description)
    .bind(new.payment_method)
    .bind(new.tags)
    .fetch_one(&mut *tx)
    .await
    .context("insert transaction")?;

    sqlx::query(
        r#"
        UPDATE categories SET usage_count = usage_count + 1
         WHERE (id::text = $2 OR name = $2)
           AND (user_id = $1 OR is_default)
        "#,
    )
    .bind(new.user_id)
    .bind(&new.category)
    .execute(&mut *tx)
    .await
    .context("bump category usage")?;

    tx.commit().await.context("commit insert transaction")?;
    Ok(row)
}

pub async fn find_owned(
    db: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> anyhow::Result<Option<TransactionRow>> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("find transaction")?;
    Ok(row)
}

pub async fn update_owned(
    db: &PgPool,
    user_id: Uuid,
    id: Uuid,
    changes: TransactionChanges,
) -> anyhow::Result<Option<TransactionRow>> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        UPDATE transactions SET
            kind           = COALESCE($3, kind),
            amount         = COALESCE($4, amount),
            category       = COALESCE($5, category),
            occurred_at    = COALESCE($6, occurred_at),
            description    = COALESCE($7, description),
            payment_method = COALESCE($8, payment_method),
            tags           = COALESCE($9, tags),
            updated_at     = now()
        WHERE id = $1 AND user_id = $2
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(user_id)
    .bind(changes.kind.map(EntryKind::as_str))
    .bind(changes.amount)
    .bind(changes.category)
    .bind(changes.occurred_at)
    .bind(changes.description)
    .bind(changes.payment_method)
    .bind(changes.tags)
    .fetch_optional(db)
    .await
    .context("update transaction")?;
    Ok(row)
}

pub async fn delete_owned(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM transactions WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await
        .context("delete transaction")?;
    Ok(result.rows_affected() > 0)
}

/// Delete every listed transaction the user owns; foreign ids are ignored.
pub async fn bulk_delete(db: &PgPool, user_id: Uuid, ids: &[Uuid]) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM transactions WHERE user_id = $1 AND id = ANY($2)")
        .bind(user_id)
        .bind(ids)
        .execute(db)
        .await
        .context("bulk delete transactions")?;
    Ok(result.rows_affected())
}

const SUMS: &str = "COALESCE(SUM(amount) FILTER (WHERE kind = 'income'), 0) AS income, \
     COALESCE(SUM(amount) FILTER (WHERE kind = 'expense'), 0) AS expense, \
     COUNT(*) AS count";

pub async fn totals(db: &PgPool, predicates: &[Predicate]) -> anyhow::Result<TotalsRow> {
    let mut qb = QueryBuilder::new(format!("SELECT {SUMS} FROM transactions"));
    push_where(&mut qb, predicates);
    let row = qb
        .build_query_as::<TotalsRow>()
        .fetch_one(db)
        .await
        .context("transaction totals")?;
    Ok(row)
}

pub async fn series(
    db: &PgPool,
    predicates: &[Predicate],
    period: StatsPeriod,
) -> anyhow::Result<Vec<PeriodRow>> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT date_trunc('{}', occurred_at) AS bucket, {SUMS} FROM transactions",
        period.trunc_unit()
    ));
    push_where(&mut qb, predicates);
    qb.push(" GROUP BY bucket ORDER BY bucket ASC");
    let rows = qb
        .build_query_as::<PeriodRow>()
        .fetch_all(db)
        .await
        .context("transaction series")?;
    Ok(rows)
}

/// Expense totals grouped by category, largest first.
pub async fn expense_by_category(
    db: &PgPool,
    predicates: &[Predicate],
) -> anyhow::Result<Vec<CategoryTotalRow>> {
    let mut scoped = predicates.to_vec();
    scoped.push(Predicate::Kind(EntryKind::Expense));

    let mut qb = QueryBuilder::new(
        "SELECT category, SUM(amount) AS total, COUNT(*) AS count FROM transactions",
    );
    push_where(&mut qb, &scoped);
    qb.push(" GROUP BY category ORDER BY total DESC, category ASC");
    let rows = qb
        .build_query_as::<CategoryTotalRow>()
        .fetch_all(db)
        .await
        .context("expense by category")?;
    Ok(rows)
}
