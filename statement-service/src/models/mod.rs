pub mod job;
pub mod statement;

pub use job::{ExtractionJob, JobStatus};
pub use statement::{BankStatement, LedgerMetadata, Transaction};
