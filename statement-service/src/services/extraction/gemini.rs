//! Gemini extraction client.
//!
//! Sends the PDF inline to `generateContent` with a JSON response schema and
//! parses the first candidate into a [`BankStatement`].

use super::{CredentialPool, StatementExtractor};
use crate::models::BankStatement;
use crate::services::metrics::record_extraction_duration;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

const EXTRACTION_PROMPT: &str = "\
Extract every relevant field from the attached bank statement and return it using the JSON schema provided.
Include the account holder (person or entity), the bank account number, the bank name, the statement start and end dates,
the account currency, and the opening and closing balances.
List every transaction shown in the statement tables as its own entry with: the date (DD/MM/YYYY), the description,
the debit amount as a positive number (0.0 when there is no debit) and the credit amount as a positive number (0.0 when there is no credit).
A transaction carries either a debit or a credit, never both.
Normalise amounts to plain numbers, for example \"1 234,56\" becomes 1234.56.
Use null for any field that is missing or ambiguous.";

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Error)]
enum ExtractionError {
    #[error("no API credential configured")]
    NoCredential,

    #[error("failed to read PDF: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(reqwest::Error),

    #[error("Gemini API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("response had no text candidate")]
    EmptyResponse,

    #[error("response text did not match the statement schema")]
    Unparseable,
}

impl From<reqwest::Error> for ExtractionError {
    fn from(e: reqwest::Error) -> Self {
        ExtractionError::Network(e.without_url())
    }
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

/// Gemini-backed statement extractor.
pub struct GeminiExtractor {
    settings: GeminiSettings,
    credentials: Arc<dyn CredentialPool>,
    client: Client,
}

impl GeminiExtractor {
    pub fn new(
        settings: GeminiSettings,
        credentials: Arc<dyn CredentialPool>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.timeout).build()?;

        if credentials.is_empty() {
            tracing::warn!("No Gemini API keys configured; every extraction will report absence");
        }

        Ok(Self {
            settings,
            credentials,
            client,
        })
    }

    /// Build the API URL for the given model and method. The key travels in
    /// the `x-goog-api-key` header, never in the URL.
    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.model,
            method
        )
    }

    async fn request_statement(&self, pdf_path: &Path) -> Result<BankStatement, ExtractionError> {
        let api_key = self
            .credentials
            .next_key()
            .ok_or(ExtractionError::NoCredential)?;

        let pdf = tokio::fs::read(pdf_path).await?;

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "application/pdf".to_string(),
                            data: base64::engine::general_purpose::STANDARD.encode(&pdf),
                        },
                    },
                    Part::Text {
                        text: EXTRACTION_PROMPT.to_string(),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: response_schema(),
            },
        };

        tracing::debug!(
            model = %self.settings.model,
            pdf_bytes = pdf.len(),
            "Sending statement to Gemini API"
        );

        let response = self
            .client
            .post(self.api_url("generateContent"))
            .header(API_KEY_HEADER, api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api { status, body });
        }

        let api_response: GenerateContentResponse = response.json().await?;
        let text = api_response
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| match p {
                        Part::Text { text } => Some(text),
                        Part::InlineData { .. } => None,
                    })
                    .collect::<String>()
            })
            .filter(|t| !t.trim().is_empty())
            .ok_or(ExtractionError::EmptyResponse)?;

        parse_statement(&text).ok_or(ExtractionError::Unparseable)
    }
}

#[async_trait]
impl StatementExtractor for GeminiExtractor {
    async fn extract(&self, pdf_path: &Path) -> Option<BankStatement> {
        let start = Instant::now();
        let result = self.request_statement(pdf_path).await;
        record_extraction_duration(start.elapsed(), result.is_ok());

        match result {
            Ok(statement) => {
                tracing::info!(
                    transactions = statement.transactions.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Statement extracted"
                );
                Some(statement)
            }
            Err(e) => {
                tracing::error!(error = %e, path = %pdf_path.display(), "Statement extraction failed");
                None
            }
        }
    }
}

/// Parse candidate text as a statement: directly first, then the first JSON
/// object embedded in the text (markdown fences, leading prose).
pub fn parse_statement(text: &str) -> Option<BankStatement> {
    if let Ok(statement) = serde_json::from_str::<BankStatement>(text.trim()) {
        return Some(statement);
    }

    tracing::debug!("Structured parse failed, falling back to embedded JSON");
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<BankStatement>(&text[start..=end]).ok()
}

/// Schema handed to Gemini so the reply matches [`BankStatement`].
pub fn response_schema() -> serde_json::Value {
    let nullable_string = json!({ "type": "STRING", "nullable": true });
    let nullable_number = json!({ "type": "NUMBER", "nullable": true });

    json!({
        "type": "OBJECT",
        "properties": {
            "bank_name": { "type": "STRING" },
            "account_number": nullable_string,
            "account_holder": nullable_string,
            "starting_date": nullable_string,
            "closing_date": nullable_string,
            "starting_balance": nullable_number,
            "closing_balance": nullable_number,
            "currency": nullable_string,
            "transactions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "date": nullable_string,
                        "document_number": nullable_string,
                        "bank_code": nullable_string,
                        "account_number": nullable_string,
                        "description": { "type": "STRING" },
                        "debit": { "type": "NUMBER" },
                        "credit": { "type": "NUMBER" }
                    },
                    "required": ["description", "debit", "credit"]
                }
            }
        },
        "required": ["bank_name", "transactions"]
    })
}

// -----------------------------------------------------------------------------
// Gemini API types
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
