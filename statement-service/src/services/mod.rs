pub mod archive;
pub mod database;
pub mod extraction;
pub mod job_store;
pub mod metrics;
pub mod orchestrator;
pub mod spreadsheet;

pub use database::Database;
pub use extraction::{GeminiExtractor, MockExtractor, StatementExtractor};
pub use job_store::{InMemoryJobStore, JobStore, StoreError};
pub use metrics::{get_metrics, init_metrics};
pub use orchestrator::{Orchestrator, PipelineError, StatementArtifact, UploadedPdf};
