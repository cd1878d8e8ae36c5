//! Text extraction and sentence splitting for uploaded documents.
use std::path::Path;

use regex::Regex;

use crate::services::{ServiceError, ServiceResult};

/// Extracted text of one document, split into candidate sentences.
#[derive(Clone, Debug)]
pub struct DocumentText {
    pub filename: String,
    pub sentences: Vec<String>,
    pub char_count: usize,
}

/// Extracts and normalizes text from PDF documents.
#[derive(Clone, Debug)]
pub struct PdfProcessor {
    min_sentence_length: usize,
    max_sentence_length: usize,
    whitespace: Regex,
    glued_period: Regex,
}

impl Default for PdfProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfProcessor {
    pub fn new() -> Self {
        Self {
            min_sentence_length: 10,
            max_sentence_length: 1000,
            whitespace: Regex::new(r"\s+").expect("static regex"),
            glued_period: Regex::new(r"([a-z])\.([A-Z])").expect("static regex"),
        }
    }

    /// Extract all text from a PDF file.
    pub fn extract_text(&self, path: &Path) -> ServiceResult<String> {
        pdf_extract::extract_text(path).map_err(ServiceError::PdfExtraction)
    }

    /// Split raw text into sentences, keeping those between the configured
    /// length bounds. PDFs frequently drop the space after a period, so
    /// that is repaired before splitting.
    pub fn split_into_sentences(&self, text: &str) -> Vec<String> {
        let text = self.whitespace.replace_all(text, " ");
        let text = self.glued_period.replace_all(&text, "$1. $2");

        split_on_terminals(&text)
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| {
                s.len() >= self.min_sentence_length && s.len() <= self.max_sentence_length
            })
            .collect()
    }

    /// Extract and split a batch of PDFs. Files that fail extraction are
    /// logged and skipped rather than failing the whole batch.
    pub fn process_files(&self, paths: &[std::path::PathBuf]) -> Vec<DocumentText> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            match self.extract_text(path) {
                Ok(text) => {
                    let sentences = self.split_into_sentences(&text);
                    results.push(DocumentText {
                        filename,
                        char_count: text.len(),
                        sentences,
                    });
                }
                Err(err) => {
                    log::warn!("Skipping {filename}: {err}");
                }
            }
        }
        results
    }
}

/// Split on sentence-terminal punctuation followed by whitespace.
fn split_on_terminals(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev_terminal = false;

    for (idx, ch) in text.char_indices() {
        if prev_terminal && ch.is_whitespace() {
            sentences.push(&text[start..idx]);
            start = idx + ch.len_utf8();
        }
        prev_terminal = matches!(ch, '.' | '!' | '?');
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}
