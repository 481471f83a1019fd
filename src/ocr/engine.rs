//! Text extraction through external command-line engines.
//!
//! Images go through `tesseract`, PDFs through `pdftotext`; both are fed over
//! stdin and read back from stdout, so no temporary files are written.
use std::process::Stdio;

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::OcrConfig;

/// Upload formats accepted by the receipt endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptFormat {
    Png,
    Jpeg,
    Pdf,
}

impl ReceiptFormat {
    pub const EXTENSIONS: [&'static str; 4] = ["png", "jpg", "jpeg", "pdf"];

    /// Resolve the format from a file name's extension, case-insensitively.
    pub fn from_filename(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Pdf => "application/pdf",
        }
    }
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract_text(&self, body: Bytes, format: ReceiptFormat) -> anyhow::Result<String>;
    /// Engine self-check; returns the engine's version banner.
    async fn version(&self) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct TesseractEngine {
    tesseract_cmd: String,
    pdftotext_cmd: String,
    language: String,
}

impl TesseractEngine {
    pub fn from_config(cfg: &OcrConfig) -> Self {
        Self {
            tesseract_cmd: cfg.tesseract_cmd.clone(),
            pdftotext_cmd: cfg.pdftotext_cmd.clone(),
            language: cfg.language.clone(),
        }
    }

    fn command_for(&self, format: ReceiptFormat) -> Command {
        match format {
            ReceiptFormat::Pdf => {
                let mut cmd = Command::new(&self.pdftotext_cmd);
                cmd.args(["-layout", "-", "-"]);
                cmd
            }
            ReceiptFormat::Png | ReceiptFormat::Jpeg => {
                let mut cmd = Command::new(&self.tesseract_cmd);
                cmd.args(["stdin", "stdout", "-l", &self.language]);
                cmd
            }
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn extract_text(&self, body: Bytes, format: ReceiptFormat) -> anyhow::Result<String> {
        let mut child = self
            .command_for(format)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn ocr engine for {:?}", format))?;

        let mut stdin = child.stdin.take().context("ocr engine stdin")?;
        // Feed stdin concurrently with draining stdout so large pages cannot deadlock.
        let writer = tokio::spawn(async move {
            stdin.write_all(&body).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .context("wait for ocr engine")?;
        writer
            .await
            .context("join ocr stdin writer")?
            .context("write image to ocr engine")?;

        if !output.status.success() {
            bail!(
                "ocr engine exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.len(), ?format, "ocr text extracted");
        Ok(text)
    }

    async fn version(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.tesseract_cmd)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("run {} --version", self.tesseract_cmd))?;
        if !output.status.success() {
            bail!("{} --version exited with {}", self.tesseract_cmd, output.status);
        }
        // Older builds print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        Ok(String::from_utf8_lossy(&banner)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_filename() {
        assert_eq!(ReceiptFormat::from_filename("lunch.PNG"), Some(ReceiptFormat::Png));
        assert_eq!(ReceiptFormat::from_filename("a.b.jpeg"), Some(ReceiptFormat::Jpeg));
        assert_eq!(ReceiptFormat::from_filename("scan.jpg"), Some(ReceiptFormat::Jpeg));
        assert_eq!(ReceiptFormat::from_filename("invoice.pdf"), Some(ReceiptFormat::Pdf));
        assert_eq!(ReceiptFormat::from_filename("notes.txt"), None);
        assert_eq!(ReceiptFormat::from_filename("png"), None);
    }

    #[test]
    fn jpeg_variants_share_extension_and_mime() {
        assert_eq!(ReceiptFormat::Jpeg.extension(), "jpg");
        assert_eq!(ReceiptFormat::Jpeg.content_type(), "image/jpeg");
        assert_eq!(ReceiptFormat::Pdf.content_type(), "application/pdf");
    }

    #[tokio::test]
    async fn missing_binary_is_reported_as_error() {
        let engine = TesseractEngine {
            tesseract_cmd: "/nonexistent/tesseract-for-tests".into(),
            pdftotext_cmd: "/nonexistent/pdftotext-for-tests".into(),
            language: "eng".into(),
        };
        assert!(engine.version().await.is_err());
        assert!(engine
            .extract_text(Bytes::from_static(b"%PDF-1.4"), ReceiptFormat::Pdf)
            .await
            .is_err());
    }
}
