//! CV attachments. Text extraction sits behind [`TextExtractor`]; only a
//! plain-text extractor ships.

use std::path::Path;

use anyhow::{Context, Result};

pub trait TextExtractor {
    /// Best-effort text of `bytes`. Blank output means the document had no
    /// readable text.
    fn extract(&self, bytes: &[u8]) -> Result<String>;
}

pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CvAttachment {
    pub file_name: String,
    pub text: String,
}

pub fn cv_text_or_sentinel(file_name: &str, extracted: &str) -> String {
    if extracted.trim().is_empty() {
        format!("[Empty content in PDF: {file_name}]")
    } else {
        extracted.to_owned()
    }
}

pub async fn load_cv(path: &Path, extractor: &dyn TextExtractor) -> Result<CvAttachment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("could not read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let extracted = extractor
        .extract(&bytes)
        .with_context(|| format!("could not extract text from {file_name}"))?;

    Ok(CvAttachment {
        text: cv_text_or_sentinel(&file_name, &extracted),
        file_name,
    })
}
