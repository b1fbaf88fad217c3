//! Extraction client abstractions and implementations.
//!
//! An extractor turns a PDF on disk into a [`BankStatement`], or reports that
//! nothing usable came back. Failures never propagate: they are logged and
//! collapsed into `None`.

pub mod credentials;
pub mod gemini;
pub mod mock;

use crate::models::BankStatement;
use async_trait::async_trait;
use std::path::Path;

pub use credentials::{CredentialPool, RandomPool, RoundRobinPool};
pub use gemini::GeminiExtractor;
pub use mock::MockExtractor;

#[async_trait]
pub trait StatementExtractor: Send + Sync {
    async fn extract(&self, pdf_path: &Path) -> Option<BankStatement>;
}
