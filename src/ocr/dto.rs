use serde::{Deserialize, Serialize};

use super::parser::ReceiptData;

#[derive(Debug, Deserialize)]
pub struct ProcessTextRequest {
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedReceipt {
    #[serde(flatten)]
    pub receipt: ReceiptData,
    pub file_name: String,
    pub receipt_key: String,
    pub receipt_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedFormats {
    pub supported_formats: Vec<&'static str>,
    pub max_file_size: usize,
    #[serde(rename = "maxFileSizeMB")]
    pub max_file_size_mb: f64,
    pub features: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct EngineCheck {
    pub engine: &'static str,
    pub version: String,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}
