use crate::middleware::UserId;
use crate::models::LedgerMetadata;
use crate::services::orchestrator::{StatementArtifact, UploadedPdf};
use crate::startup::AppState;
use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use service_core::error::AppError;
use tokio_util::io::ReaderStream;

/// Parsed multipart form shared by the single and batch upload routes.
#[derive(Debug)]
pub struct StatementForm {
    pub files: Vec<UploadedPdf>,
    pub ledger: LedgerMetadata,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(anyhow::anyhow!("Upload exceeds the maximum allowed size"))
    } else {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
    }
}

fn missing_field(name: &str) -> AppError {
    AppError::UnprocessableEntity(anyhow::anyhow!("Missing required form field '{}'", name))
}

/// Read the form, collecting every part named `file_field` as an upload.
pub async fn read_statement_form(
    mut multipart: Multipart,
    file_field: &str,
) -> Result<StatementForm, AppError> {
    let mut files = Vec::new();
    let mut document_number = None;
    let mut bank_code = None;
    let mut account_number = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == file_field {
            let filename = field.file_name().unwrap_or("unnamed").to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            files.push(UploadedPdf {
                filename,
                content_type,
                bytes,
            });
            continue;
        }

        let slot = match name.as_str() {
            "document_number" => &mut document_number,
            "bank_code" => &mut bank_code,
            "account_number" => &mut account_number,
            _ => continue,
        };
        *slot = Some(field.text().await.map_err(multipart_error)?);
    }

    let ledger = LedgerMetadata {
        document_number: document_number.ok_or_else(|| missing_field("document_number"))?,
        bank_code: bank_code.ok_or_else(|| missing_field("bank_code"))?,
        account_number: account_number.ok_or_else(|| missing_field("account_number"))?,
    };

    if files.is_empty() {
        return Err(missing_field(file_field));
    }

    Ok(StatementForm { files, ledger })
}

/// `attachment` disposition with an ASCII fallback name and the exact UTF-8
/// name in `filename*`.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

/// Stream the artifact back. The scratch directory travels with the body and
/// is removed once the body is finished or dropped.
async fn artifact_response(artifact: StatementArtifact) -> Result<Response, AppError> {
    let StatementArtifact {
        path,
        download_name,
        media_type,
        scratch,
    } = artifact;

    let file = tokio::fs::File::open(&path).await?;
    let length = file.metadata().await?.len();

    let stream = ReaderStream::new(file).map(move |chunk| {
        let _scratch = &scratch;
        chunk
    });

    tracing::info!(filename = %download_name, bytes = length, "Returning generated file");

    Ok((
        [
            (header::CONTENT_TYPE, media_type.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&download_name)),
            (header::CONTENT_LENGTH, length.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

pub async fn extract_statement(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let form = read_statement_form(multipart, "file").await?;
    let StatementForm { files, ledger } = form;
    let upload = files
        .into_iter()
        .next()
        .ok_or_else(|| missing_field("file"))?;

    tracing::info!(
        user_id = %user_id,
        filename = %upload.filename,
        size = upload.bytes.len(),
        "Statement extraction requested"
    );

    let artifact = state
        .orchestrator
        .process_single(user_id, upload, &ledger)
        .await?;
    artifact_response(artifact).await
}

pub async fn extract_batch(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let StatementForm { files, ledger } = read_statement_form(multipart, "files").await?;

    tracing::info!(
        user_id = %user_id,
        files = files.len(),
        "Batch statement extraction requested"
    );

    let artifact = state
        .orchestrator
        .process_batch(user_id, files, &ledger)
        .await?;
    artifact_response(artifact).await
}
