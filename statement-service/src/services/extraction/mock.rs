//! Canned extractor for tests and local development.

use super::StatementExtractor;
use crate::models::BankStatement;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Returns a fixed statement, except for uploads whose bytes contain one of the
/// configured failure markers.
pub struct MockExtractor {
    statement: BankStatement,
    failure_markers: Vec<Vec<u8>>,
    seen: Mutex<Vec<PathBuf>>,
}

impl MockExtractor {
    pub fn new(statement: BankStatement) -> Self {
        Self {
            statement,
            failure_markers: Vec::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Report absence for any PDF whose content contains `marker`.
    pub fn failing_when_contains(mut self, marker: impl Into<Vec<u8>>) -> Self {
        self.failure_markers.push(marker.into());
        self
    }

    /// Paths handed to `extract`, in call order.
    pub fn seen_paths(&self) -> Vec<PathBuf> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StatementExtractor for MockExtractor {
    async fn extract(&self, pdf_path: &Path) -> Option<BankStatement> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(pdf_path.to_path_buf());
        }

        let bytes = tokio::fs::read(pdf_path).await.ok()?;
        let fails = self
            .failure_markers
            .iter()
            .any(|marker| !marker.is_empty() && bytes.windows(marker.len()).any(|w| w == &marker[..]));
        if fails {
            tracing::debug!(path = %pdf_path.display(), "Mock extractor reporting absence");
            return None;
        }

        Some(self.statement.clone())
    }
}
