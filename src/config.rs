use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Object storage used to archive uploaded receipts.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    pub tesseract_cmd: String,
    pub pdftotext_cmd: String,
    pub language: String,
    pub max_upload_bytes: usize,
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub ocr: OcrConfig,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "finly".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "finly-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT")?,
            bucket: std::env::var("S3_BUCKET")?,
            access_key: std::env::var("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };
        let ocr = OcrConfig {
            tesseract_cmd: std::env::var("TESSERACT_CMD").unwrap_or_else(|_| "tesseract".into()),
            pdftotext_cmd: std::env::var("PDFTOTEXT_CMD").unwrap_or_else(|_| "pdftotext".into()),
            language: std::env::var("OCR_LANGUAGE").unwrap_or_else(|_| "eng".into()),
            max_upload_bytes: env_parse("MAX_CONTENT_LENGTH", DEFAULT_MAX_UPLOAD_BYTES),
        };
        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|v| split_list(&v))
            .unwrap_or_default();

        Ok(Self {
            database_url,
            jwt,
            storage,
            ocr,
            cors_origins,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
