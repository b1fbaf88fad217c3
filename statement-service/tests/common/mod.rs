//! Common test utilities for statement-service integration tests.

#![allow(dead_code)]

use reqwest::multipart::{Form, Part};
use rust_decimal::Decimal;
use statement_service::models::{BankStatement, JobStatus, Transaction};
use statement_service::services::{InMemoryJobStore, MockExtractor};
use statement_service::startup::{router, AppState};
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use uuid::Uuid;

static INIT: Once = Once::new();

pub const PDF_BYTES: &[u8] = b"%PDF-1.4 quarterly statement";
pub const CORRUPT_MARKER: &[u8] = b"%CORRUPT%";
pub const CORRUPT_PDF_BYTES: &[u8] = b"%PDF-1.4 %CORRUPT% unreadable";

pub const EXTRACT_PATH: &str = "/api/statements/extract/";
pub const BATCH_PATH: &str = "/api/statements/extract/batch";

pub const XLSX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,statement_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn sample_statement() -> BankStatement {
    BankStatement {
        bank_name: Some("Banque Atlantique".to_string()),
        account_number: Some("CI0080100012345".to_string()),
        account_holder: Some("ACME SARL".to_string()),
        starting_date: Some("01/03/2024".to_string()),
        closing_date: Some("31/03/2024".to_string()),
        starting_balance: Some(Decimal::from_str("1500.00").unwrap()),
        closing_balance: Some(Decimal::from_str("1374.50").unwrap()),
        currency: Some("XOF".to_string()),
        transactions: vec![
            Transaction {
                date: Some("05/03/2024".to_string()),
                description: "Frais de tenue de compte".to_string(),
                debit: Decimal::from_str("25.50").unwrap(),
                credit: Decimal::ZERO,
                ..Default::default()
            },
            Transaction {
                date: Some("12/03/2024".to_string()),
                description: "Virement client".to_string(),
                debit: Decimal::ZERO,
                credit: Decimal::from_str("100.00").unwrap(),
                ..Default::default()
            },
        ],
    }
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub store: Arc<InMemoryJobStore>,
    pub extractor: Arc<MockExtractor>,
    pub scratch_root: TempDir,
    pub user_id: Uuid,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::with_store(InMemoryJobStore::new(), 1_000).await
    }

    /// Serve the real router on a random port, backed by an in-memory job
    /// store and the mock extractor.
    pub async fn with_store(store: InMemoryJobStore, rate_limit_per_minute: u32) -> Self {
        init_tracing();

        let store = Arc::new(store);
        let extractor =
            Arc::new(MockExtractor::new(sample_statement()).failing_when_contains(CORRUPT_MARKER));
        let scratch_root = tempfile::tempdir().expect("Failed to create scratch root");

        let mut state = AppState::new(
            store.clone(),
            extractor.clone(),
            rate_limit_per_minute,
            20 * 1024 * 1024,
            "test",
        );
        state.orchestrator = state.orchestrator.with_scratch_root(scratch_root.path());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().expect("No local address").port();
        let app = router(state);

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .ok();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            store,
            extractor,
            scratch_root,
            user_id: Uuid::new_v4(),
        }
    }

    pub async fn post_form(
        &self,
        path: &str,
        form: Form,
        user_id: Option<Uuid>,
    ) -> reqwest::Response {
        let mut request = self
            .client
            .post(format!("{}{}", self.address, path))
            .multipart(form);
        if let Some(id) = user_id {
            request = request.header("X-User-ID", id.to_string());
        }
        request.send().await.expect("Failed to execute request.")
    }

    pub async fn get(&self, path: &str, user_id: Option<Uuid>, admin: bool) -> reqwest::Response {
        let mut request = self.client.get(format!("{}{}", self.address, path));
        if let Some(id) = user_id {
            request = request.header("X-User-ID", id.to_string());
        }
        if admin {
            request = request.header("X-User-Role", "admin");
        }
        request.send().await.expect("Failed to execute request.")
    }

    pub async fn job_statuses(&self) -> Vec<JobStatus> {
        self.store.jobs().await.into_iter().map(|j| j.status).collect()
    }

    /// Files and directories left under the scratch root once the server has
    /// finished with the response. Waits briefly because the streamed body is
    /// released just after its last chunk reaches the client.
    pub async fn scratch_entries(&self) -> usize {
        let mut remaining = scratch_entries(self.scratch_root.path());
        for _ in 0..50 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            remaining = scratch_entries(self.scratch_root.path());
        }
        remaining
    }
}

pub fn scratch_entries(root: &Path) -> usize {
    std::fs::read_dir(root)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Form carrying the three caller-supplied ledger fields.
pub fn ledger_form() -> Form {
    Form::new()
        .text("document_number", "100")
        .text("bank_code", "512000")
        .text("account_number", "FR7630001")
}

pub fn file_part(filename: &str, mime: &str, bytes: &[u8]) -> Part {
    Part::bytes(bytes.to_vec())
        .file_name(filename.to_string())
        .mime_str(mime)
        .unwrap()
}

pub fn pdf_part(filename: &str, bytes: &[u8]) -> Part {
    file_part(filename, "application/pdf", bytes)
}

pub async fn body_bytes(response: reqwest::Response) -> Vec<u8> {
    response
        .bytes()
        .await
        .expect("Failed to read body")
        .to_vec()
}

pub async fn body_json(response: reqwest::Response) -> serde_json::Value {
    response.json().await.expect("Failed to parse JSON")
}

pub fn header(response: &reqwest::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Names of the entries in a zip (or xlsx) payload.
pub fn zip_entries(bytes: &[u8]) -> Vec<String> {
    let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec()))
        .expect("Payload is not a zip archive");
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

pub fn zip_text(bytes: &[u8], entry: &str) -> String {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec()))
        .expect("Payload is not a zip archive");
    let mut text = String::new();
    archive
        .by_name(entry)
        .expect("Missing zip entry")
        .read_to_string(&mut text)
        .expect("Entry is not UTF-8");
    text
}
