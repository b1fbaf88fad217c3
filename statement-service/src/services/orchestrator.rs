//! Extraction job pipeline.
//!
//! Turns uploaded PDFs into tracked jobs and generated workbooks:
//! `pending -> processing -> extract -> stamp -> render -> success`, with every
//! unexpected failure recorded as `failed` on a best-effort basis. Every
//! temporary file lives inside a per-request scratch directory that is removed
//! when the returned [`StatementArtifact`] (or the error) is dropped.

use crate::models::{JobStatus, LedgerMetadata};
use crate::services::archive::{self, ArchiveEntry, ArchiveError};
use crate::services::extraction::StatementExtractor;
use crate::services::job_store::{JobStore, StoreError};
use crate::services::metrics::record_job_outcome;
use crate::services::spreadsheet::{self, SpreadsheetError};
use axum::body::Bytes;
use service_core::error::AppError;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";
pub const XLSX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const ZIP_MEDIA_TYPE: &str = "application/zip";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Only PDF files are supported (got {0})")]
    UnsupportedFileType(String),

    #[error("Failed to extract data from {0}")]
    ExtractionFailed(String),

    #[error("Failed to generate a spreadsheet from any of the uploaded documents")]
    NoSuccessfulFiles,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Spreadsheet(#[from] SpreadsheetError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Scratch file error: {0}")]
    Io(#[from] io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::UnsupportedFileType(_) => AppError::BadRequest(anyhow::anyhow!(err)),
            PipelineError::ExtractionFailed(_) | PipelineError::NoSuccessfulFiles => {
                AppError::UnprocessableEntity(anyhow::anyhow!(err))
            }
            other => AppError::InternalError(anyhow::anyhow!(other)),
        }
    }
}

/// One uploaded file as received from the multipart form.
#[derive(Debug, Clone)]
pub struct UploadedPdf {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedPdf {
    pub fn is_pdf(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|essence| essence.trim().eq_ignore_ascii_case(PDF_MEDIA_TYPE))
            .unwrap_or(false)
    }
}

/// A generated file ready to be streamed back.
///
/// `scratch` owns the directory holding `path`; dropping it deletes the file.
#[derive(Debug)]
pub struct StatementArtifact {
    pub path: PathBuf,
    pub download_name: String,
    pub media_type: &'static str,
    pub scratch: TempDir,
}

/// `<stem>_statement.xlsx`, where the stem is the final path component of the
/// upload name without its last extension.
pub fn output_name(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    let stem = if stem.is_empty() { "statement" } else { stem };
    format!("{}_statement.xlsx", stem)
}

/// Suffix `_2`, `_3`, ... onto `name` until it is unused.
fn unique_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{}", ext)),
        None => (name.clone(), String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}{}", stem, n, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

pub fn archive_name(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("bank_statements_{}.zip", now.format("%Y%m%d_%H%M%S"))
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    extractor: Arc<dyn StatementExtractor>,
    scratch_root: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn JobStore>, extractor: Arc<dyn StatementExtractor>) -> Self {
        Self {
            store,
            extractor,
            scratch_root: None,
        }
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    fn scratch_dir(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("statement-");
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    /// Process a single upload into a workbook.
    #[instrument(skip(self, upload, ledger), fields(user_id = %user_id, filename = %upload.filename))]
    pub async fn process_single(
        &self,
        user_id: Uuid,
        upload: UploadedPdf,
        ledger: &LedgerMetadata,
    ) -> Result<StatementArtifact, PipelineError> {
        if !upload.is_pdf() {
            tracing::warn!(content_type = ?upload.content_type, "Rejected non-PDF upload");
            return Err(PipelineError::UnsupportedFileType(
                upload.content_type.unwrap_or_else(|| "unknown".to_string()),
            ));
        }

        let scratch = self.scratch_dir()?;
        let job = self.store.create_job(user_id, &upload.filename).await?;
        let download_name = output_name(&upload.filename);

        match self
            .run_job(job.job_id, &upload, ledger, scratch.path(), &download_name)
            .await
        {
            Ok(path) => Ok(StatementArtifact {
                path,
                download_name,
                media_type: XLSX_MEDIA_TYPE,
                scratch,
            }),
            Err(e) => {
                if !matches!(e, PipelineError::ExtractionFailed(_)) {
                    tracing::error!(job_id = %job.job_id, error = %e, "Statement processing failed");
                    self.fail_job(job.job_id).await;
                }
                Err(e)
            }
        }
    }

    /// Process several uploads; one success yields the workbook itself, more
    /// than one yields a zip of all of them.
    #[instrument(skip(self, uploads, ledger), fields(user_id = %user_id, files = uploads.len()))]
    pub async fn process_batch(
        &self,
        user_id: Uuid,
        uploads: Vec<UploadedPdf>,
        ledger: &LedgerMetadata,
    ) -> Result<StatementArtifact, PipelineError> {
        let scratch = self.scratch_dir()?;
        let mut used_names = HashSet::new();
        let mut outputs: Vec<ArchiveEntry> = Vec::new();
        let total = uploads.len();

        for (index, upload) in uploads.iter().enumerate() {
            tracing::info!(
                file = index + 1,
                total,
                filename = %upload.filename,
                "Processing batch file"
            );

            if !upload.is_pdf() {
                tracing::warn!(
                    filename = %upload.filename,
                    content_type = ?upload.content_type,
                    "Skipping non-PDF file in batch"
                );
                continue;
            }

            let job = match self.store.create_job(user_id, &upload.filename).await {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!(filename = %upload.filename, error = %e, "Failed to create extraction job");
                    continue;
                }
            };

            let name = unique_name(output_name(&upload.filename), &mut used_names);
            match self
                .run_job(job.job_id, upload, ledger, scratch.path(), &name)
                .await
            {
                Ok(path) => outputs.push(ArchiveEntry { path, name }),
                Err(PipelineError::ExtractionFailed(_)) => {}
                Err(e) => {
                    tracing::error!(job_id = %job.job_id, error = %e, "Batch file processing failed");
                    self.fail_job(job.job_id).await;
                }
            }
        }

        match outputs.len() {
            0 => Err(PipelineError::NoSuccessfulFiles),
            1 => {
                let ArchiveEntry { path, name } = outputs.remove(0);
                Ok(StatementArtifact {
                    path,
                    download_name: name,
                    media_type: XLSX_MEDIA_TYPE,
                    scratch,
                })
            }
            count => {
                let zip_name = archive_name(chrono::Utc::now());
                let zip_path = scratch.path().join(&zip_name);
                let destination = zip_path.clone();
                tokio::task::spawn_blocking(move || archive::write_zip(&outputs, &destination))
                    .await??;

                tracing::info!(files = count, archive = %zip_name, "Batch processing completed");
                Ok(StatementArtifact {
                    path: zip_path,
                    download_name: zip_name,
                    media_type: ZIP_MEDIA_TYPE,
                    scratch,
                })
            }
        }
    }

    /// Steps after job creation. Returns the rendered workbook path.
    ///
    /// An absent extraction result is recorded as `failed` here and surfaces as
    /// [`PipelineError::ExtractionFailed`]; every other error leaves the job for
    /// the caller to fail.
    async fn run_job(
        &self,
        job_id: Uuid,
        upload: &UploadedPdf,
        ledger: &LedgerMetadata,
        scratch: &Path,
        output_name: &str,
    ) -> Result<PathBuf, PipelineError> {
        self.store.transition(job_id, JobStatus::Processing).await?;

        let input = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".pdf")
            .tempfile_in(scratch)?;
        tokio::fs::write(input.path(), &upload.bytes).await?;
        tracing::debug!(job_id = %job_id, path = %input.path().display(), "Upload staged");
        let extracted = self.extractor.extract(input.path()).await;
        drop(input);

        let Some(mut statement) = extracted else {
            tracing::error!(job_id = %job_id, filename = %upload.filename, "Extraction returned no data");
            self.store.transition(job_id, JobStatus::Failed).await?;
            record_job_outcome(JobStatus::Failed);
            return Err(PipelineError::ExtractionFailed(upload.filename.clone()));
        };

        statement.stamp(ledger);

        let output = scratch.join(output_name);
        let destination = output.clone();
        tokio::task::spawn_blocking(move || spreadsheet::render_to_path(&statement, &destination))
            .await??;

        self.store.transition(job_id, JobStatus::Success).await?;
        record_job_outcome(JobStatus::Success);
        tracing::info!(job_id = %job_id, output = %output_name, "Extraction job completed");
        Ok(output)
    }

    /// Best-effort move to `failed`. A failure here is logged and swallowed so
    /// the original error reaches the caller.
    async fn fail_job(&self, job_id: Uuid) {
        let mut result = self.store.transition(job_id, JobStatus::Failed).await;

        if let Err(StoreError::InvalidTransition {
            from: JobStatus::Pending,
            ..
        }) = result
        {
            result = match self.store.transition(job_id, JobStatus::Processing).await {
                Ok(_) => self.store.transition(job_id, JobStatus::Failed).await,
                Err(e) => Err(e),
            };
        }

        match result {
            Ok(_) => {
                record_job_outcome(JobStatus::Failed);
                tracing::info!(job_id = %job_id, "Extraction job marked as failed");
            }
            Err(secondary) => {
                tracing::error!(
                    job_id = %job_id,
                    error = %secondary,
                    "Failed to record failed status for extraction job"
                );
            }
        }
    }
}
