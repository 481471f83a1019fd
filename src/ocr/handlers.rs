use anyhow::Context;
use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{EngineCheck, HealthResponse, ProcessTextRequest, ProcessedReceipt, SupportedFormats};
use super::engine::ReceiptFormat;
use super::parser::{parse_receipt, ReceiptData};
use crate::{auth::jwt::AuthUser, error::ApiError, response::ApiResponse, state::AppState};

const RECEIPT_URL_TTL_SECS: u64 = 10 * 60;

pub fn ocr_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/ocr/process-receipt",
            post(process_receipt).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/ocr/process-text", post(process_text))
        .route("/ocr/supported-formats", get(supported_formats))
        .route("/ocr/test", get(test_engine))
        .route("/health", get(health))
}

#[instrument(skip(state, mp))]
pub async fn process_receipt(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<Json<ApiResponse<ProcessedReceipt>>, ApiError> {
    let limit = state.config.ocr.max_upload_bytes;

    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = mp.next_field().await.map_err(|e| multipart_error(e, limit))? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let body = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        upload = Some((file_name, body));
        break;
    }

    let (file_name, body) = upload.ok_or_else(|| ApiError::validation("No file provided"))?;
    if file_name.is_empty() {
        return Err(ApiError::validation("No file selected"));
    }
    let format = ReceiptFormat::from_filename(&file_name).ok_or_else(|| {
        ApiError::validation("Invalid file type. Allowed types: PNG, JPG, JPEG, PDF")
    })?;
    if body.len() > limit {
        return Err(ApiError::PayloadTooLarge(limit_mb(limit)));
    }

    let text = state
        .ocr
        .extract_text(body.clone(), format)
        .await
        .with_context(|| format!("process receipt {file_name}"))?;
    let receipt = parse_receipt(&text);

    let key = format!("receipts/{}/{}.{}", user_id, Uuid::new_v4(), format.extension());
    state
        .storage
        .put_object(&key, body, format.content_type())
        .await?;
    let url = state.storage.presign_get(&key, RECEIPT_URL_TTL_SECS).await?;

    info!(%user_id, file = %file_name, key = %key, "receipt processed");
    Ok(Json(ApiResponse::ok(
        "Receipt processed successfully",
        ProcessedReceipt {
            receipt,
            file_name,
            receipt_key: key,
            receipt_url: url,
        },
    )))
}

#[instrument(skip(payload))]
pub async fn process_text(
    payload: Result<Json<ProcessTextRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ReceiptData>>, ApiError> {
    let text = payload
        .ok()
        .and_then(|Json(body)| body.text)
        .ok_or_else(|| ApiError::validation("Text content is required"))?;
    if text.trim().is_empty() {
        return Err(ApiError::validation("Text content cannot be empty"));
    }

    Ok(Json(ApiResponse::ok(
        "Text processed successfully",
        parse_receipt(&text),
    )))
}

pub async fn supported_formats(State(state): State<AppState>) -> Json<ApiResponse<SupportedFormats>> {
    let max = state.config.ocr.max_upload_bytes;
    Json(ApiResponse::data(SupportedFormats {
        supported_formats: ReceiptFormat::EXTENSIONS.to_vec(),
        max_file_size: max,
        max_file_size_mb: max as f64 / (1024.0 * 1024.0),
        features: vec![
            "Text extraction from images (PNG, JPG, JPEG)",
            "PDF text extraction",
            "Amount detection",
            "Date recognition",
            "Merchant name identification",
        ],
    }))
}

#[instrument(skip(state))]
pub async fn test_engine(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<EngineCheck>>, ApiError> {
    let version = state
        .ocr
        .version()
        .await
        .context("ocr engine self-check")?;
    Ok(Json(ApiResponse::ok(
        "OCR engine test completed",
        EngineCheck {
            engine: "tesseract",
            version,
            available: true,
        },
    )))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "Finly API is running",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn multipart_error(e: MultipartError, limit: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(limit_mb(limit))
    } else {
        warn!(error = %e, "malformed multipart body");
        ApiError::validation(e.body_text())
    }
}

/// Whole megabytes, rounded up so small limits never read as 0MB.
fn limit_mb(bytes: usize) -> usize {
    bytes.div_ceil(1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn process_text_requires_text() {
        let err = process_text(Ok(Json(ProcessTextRequest { text: None })))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Text content is required");

        let err = process_text(Ok(Json(ProcessTextRequest {
            text: Some("  \n ".into()),
        })))
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Text content cannot be empty");
    }

    #[tokio::test]
    async fn process_text_parses_receipt() {
        let Json(resp) = process_text(Ok(Json(ProcessTextRequest {
            text: Some("Blue Bottle\n2024-05-02\nTotal 4.75".into()),
        })))
        .await
        .unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.extracted_merchant.as_deref(), Some("Blue Bottle"));
        assert_eq!(data.extracted_amount, Some(4.75));
    }

    #[tokio::test]
    async fn supported_formats_reports_limit_in_mb() {
        let Json(resp) = supported_formats(State(AppState::fake())).await;
        let data = resp.data.unwrap();
        assert_eq!(data.max_file_size_mb, 10.0);
        assert!(data.supported_formats.contains(&"pdf"));
    }

    #[tokio::test]
    async fn engine_check_uses_configured_engine() {
        let Json(resp) = test_engine(State(AppState::fake())).await.unwrap();
        assert_eq!(resp.data.unwrap().version, "fake 1.0");
    }

    #[test]
    fn limit_is_reported_in_whole_megabytes() {
        assert_eq!(limit_mb(10 * 1024 * 1024), 10);
        assert_eq!(limit_mb(512 * 1024), 1);
        assert_eq!(limit_mb(10 * 1024 * 1024 + 1), 11);
        assert_eq!(
            ApiError::PayloadTooLarge(limit_mb(256 * 1024)).to_string(),
            "File size too large. Maximum size is 1MB."
        );
    }
}
