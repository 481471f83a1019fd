use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{CategoryResponse, CreateCategoryRequest, ListCategoriesQuery, UpdateCategoryRequest};
use super::repo;
use super::repo_types::{CategoryChanges, EntryKind};
use super::services::{validate_changes, validate_new};
use crate::{auth::jwt::AuthUser, error::ApiError, response::ApiResponse, state::AppState};

pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/categories/:id/archive", put(archive_category))
        .route("/categories/:id/restore", put(restore_category))
}

fn missing() -> ApiError {
    ApiError::not_found("Category not found or unauthorized")
}

#[instrument(skip(state))]
pub async fn list_categories(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    query: Result<Query<ListCategoriesQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<CategoryResponse>>>, ApiError> {
    let Query(query) = query?;
    let kind = match query.kind.as_deref().filter(|k| !k.is_empty()) {
        Some(raw) => Some(
            EntryKind::parse(raw)
                .ok_or_else(|| ApiError::validation("type must be 'income' or 'expense'"))?,
        ),
        None => None,
    };

    let rows = repo::list_visible(&state.db, user_id, kind.map(EntryKind::as_str)).await?;
    Ok(Json(ApiResponse::data(
        rows.into_iter().map(CategoryResponse::from).collect(),
    )))
}

#[instrument(skip(state, payload))]
pub async fn create_category(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateCategoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CategoryResponse>>), ApiError> {
    let Json(payload) = payload?;
    let new = validate_new(user_id, payload)?;

    if repo::name_taken(&state.db, user_id, &new.name, None).await? {
        warn!(%user_id, name = %new.name, "duplicate category");
        return Err(ApiError::Conflict("Category already exists".into()));
    }

    if let Some(parent_id) = new.parent_id {
        if repo::find_visible(&state.db, user_id, parent_id).await?.is_none() {
            warn!(%user_id, %parent_id, "parent category not visible");
            return Err(ApiError::Forbidden("Invalid parent category access".into()));
        }
    }

    let category = repo::insert(&state.db, new).await?;
    info!(%user_id, category_id = %category.id, "category created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Category created successfully", category.into())),
    ))
}

#[instrument(skip(state))]
pub async fn get_category(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<CategoryResponse>>, ApiError> {
    let Path(id) = id?;
    let category = repo::find_visible(&state.db, user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;
    Ok(Json(ApiResponse::data(category.into())))
}

#[instrument(skip(state, payload))]
pub async fn update_category(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateCategoryRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<CategoryResponse>>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let changes = validate_changes(payload)?;

    if let Some(name) = &changes.name {
        if repo::name_taken(&state.db, user_id, name, Some(id)).await? {
            return Err(ApiError::Conflict("Category already exists".into()));
        }
    }

    let category = repo::update_owned(&state.db, user_id, id, changes)
        .await?
        .ok_or_else(missing)?;
    info!(%user_id, category_id = %id, "category updated");
    Ok(Json(ApiResponse::ok("Category updated", category.into())))
}

#[instrument(skip(state))]
pub async fn delete_category(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let Path(id) = id?;
    if !repo::delete_owned(&state.db, user_id, id).await? {
        return Err(missing());
    }
    info!(%user_id, category_id = %id, "category deleted");
    Ok(Json(ApiResponse::message("Category deleted")))
}

async fn set_active(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
    active: bool,
) -> Result<CategoryResponse, ApiError> {
    let changes = CategoryChanges {
        is_active: Some(active),
        ..Default::default()
    };
    let category = repo::update_owned(&state.db, user_id, id, changes)
        .await?
        .ok_or_else(missing)?;
    Ok(category.into())
}

#[instrument(skip(state))]
pub async fn archive_category(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<CategoryResponse>>, ApiError> {
    let Path(id) = id?;
    let category = set_active(&state, user_id, id, false).await?;
    Ok(Json(ApiResponse::ok("Category archived", category)))
}

#[instrument(skip(state))]
pub async fn restore_category(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<CategoryResponse>>, ApiError> {
    let Path(id) = id?;
    let category = set_active(&state, user_id, id, true).await?;
    Ok(Json(ApiResponse::ok("Category restored", category)))
}
