//! Dispatches a file path to the extractor matching its format, producing
//! the plain text the segmenter consumes. One function, no abstraction
//! beyond a match — adding a format is a deliberate change here, same as
//! the closed filter set in `search_engine`.

use std::path::Path;

use anyhow::{Context, Result};

use super::{docx, html, json, lopdf_parser::LoPdfParser};
use crate::types::DocumentFormat;

pub fn extract_text(path: &Path, format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::Pdf => {
            let doc = LoPdfParser::parse(path)
                .with_context(|| format!("failed to parse PDF: {}", path.display()))?;
            let text = doc.full_text();
            if text.trim().is_empty() {
                anyhow::bail!("PDF contains no extractable text: {}", path.display());
            }
            Ok(text)
        }
        DocumentFormat::Docx => docx::extract(path),
        DocumentFormat::Html => Ok(html::extract(path)?),
        DocumentFormat::Json => json::extract(path),
        DocumentFormat::Txt | DocumentFormat::Md => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read text file: {}", path.display())),
    }
}
