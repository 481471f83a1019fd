use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{
    BulkDeleteRequest, CreateTransactionRequest, DeletedCount, StatsEnvelope, StatsParams,
    TransactionEnvelope, TransactionPage, TransactionResponse, UpdateTransactionRequest,
};
use super::query::{ListTransactionsParams, TransactionFilter};
use super::stats::{summarize, StatsFilter};
use super::{repo, services};
use crate::{
    auth::jwt::AuthUser, categories, error::ApiError, response::ApiResponse, state::AppState,
};

pub fn transaction_routes() -> Router<AppState> {
    Router::new()
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route("/transactions/bulk", delete(bulk_delete_transactions))
        .route("/transactions/stats", get(transaction_stats))
        .route(
            "/transactions/:id",
            get(get_transaction)
                .put(update_transaction)
                .delete(delete_transaction),
        )
}

fn missing() -> ApiError {
    ApiError::not_found("Transaction not found")
}

#[instrument(skip(state, params))]
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    params: Result<Query<ListTransactionsParams>, QueryRejection>,
) -> Result<Json<ApiResponse<TransactionPage>>, ApiError> {
    let Query(params) = params?;
    let filter = TransactionFilter::from_params(&params)?;
    let page = services::list_page(state.transactions.as_ref(), user_id, &filter).await?;
    Ok(Json(ApiResponse::ok(
        "Transactions retrieved successfully",
        page,
    )))
}

#[instrument(skip(state, payload))]
pub async fn create_transaction(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<TransactionResponse>>), ApiError> {
    let Json(payload) = payload?;
    let new = services::validate_new(user_id, payload)?;
    let row = repo::insert(&state.db, new).await?;
    info!(%user_id, transaction_id = %row.id, "transaction created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Transaction created successfully", row.into())),
    ))
}

#[instrument(skip(state))]
pub async fn get_transaction(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<TransactionEnvelope>>, ApiError> {
    let Path(id) = id?;
    let row = repo::find_owned(&state.db, user_id, id)
        .await?
        .ok_or_else(missing)?;
    Ok(Json(ApiResponse::data(TransactionEnvelope {
        transaction: row.into(),
    })))
}

#[instrument(skip(state, payload))]
pub async fn update_transaction(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateTransactionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<TransactionEnvelope>>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let changes = services::validate_changes(payload)?;

    if repo::find_owned(&state.db, user_id, id).await?.is_none() {
        return Err(missing());
    }
    if let Some(category) = &changes.category {
        if !categories::repo::is_valid_for_user(&state.db, user_id, category).await? {
            warn!(%user_id, %category, "transaction update names unknown category");
            return Err(ApiError::Forbidden("Invalid category".into()));
        }
    }

    let row = repo::update_owned(&state.db, user_id, id, changes)
        .await?
        .ok_or_else(missing)?;
    info!(%user_id, transaction_id = %id, "transaction updated");
    Ok(Json(ApiResponse::ok(
        "Transaction updated successfully",
        TransactionEnvelope {
            transaction: row.into(),
        },
    )))
}

#[instrument(skip(state))]
pub async fn delete_transaction(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let Path(id) = id?;
    if !repo::delete_owned(&state.db, user_id, id).await? {
        return Err(missing());
    }
    info!(%user_id, transaction_id = %id, "transaction deleted");
    Ok(Json(ApiResponse::message("Transaction deleted successfully")))
}

fn bulk_ids(payload: Result<Json<BulkDeleteRequest>, JsonRejection>) -> Result<Vec<Uuid>, ApiError> {
    match payload {
        Ok(Json(req)) if !req.transaction_ids.is_empty() => Ok(req.transaction_ids),
        _ => Err(ApiError::validation("Invalid transaction ID list")),
    }
}

#[instrument(skip(state, payload))]
pub async fn bulk_delete_transactions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<BulkDeleteRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<DeletedCount>>, ApiError> {
    let ids = bulk_ids(payload)?;
    let deleted_count = repo::bulk_delete(&state.db, user_id, &ids).await?;
    info!(%user_id, requested = ids.len(), deleted_count, "bulk delete");
    Ok(Json(ApiResponse::ok(
        format!("{deleted_count} transactions deleted successfully"),
        DeletedCount { deleted_count },
    )))
}

#[instrument(skip(state, params))]
pub async fn transaction_stats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    params: Result<Query<StatsParams>, QueryRejection>,
) -> Result<Json<ApiResponse<StatsEnvelope>>, ApiError> {
    let Query(params) = params?;
    let filter = StatsFilter::from_params(&params)?;
    let predicates = filter.predicates(user_id);

    let (totals, series, by_category) = tokio::try_join!(
        repo::totals(&state.db, &predicates),
        repo::series(&state.db, &predicates, filter.period),
        repo::expense_by_category(&state.db, &predicates),
    )?;

    Ok(Json(ApiResponse::ok(
        "Transaction statistics retrieved successfully",
        StatsEnvelope {
            stats: summarize(&filter, totals, series, by_category),
        },
    )))
}
