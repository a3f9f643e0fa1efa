use std::sync::Arc;

use actix_web::http::header;
use actix_web::test::TestRequest;
use filevault::app_state::AppState;
use filevault::cache::mock_store::MockCacheStore;
use filevault::config::AppConfig;
use filevault::metadata::mock_store::MockRecordStore;
use filevault::storage::mock_store::MockBlobStore;

/// Application state over mock adapters, with handles kept for assertions
pub struct Harness {
    pub state: AppState,
    pub blobs: Arc<MockBlobStore>,
    pub records: Arc<MockRecordStore>,
    pub cache: Arc<MockCacheStore>,
}

pub fn harness() -> Harness {
    let blobs = Arc::new(MockBlobStore::new());
    let records = Arc::new(MockRecordStore::starting_at(901));
    let cache = Arc::new(MockCacheStore::new());
    let state = AppState::with_backends(AppConfig::default(), blobs.clone(), records.clone(), cache.clone());
    Harness {
        state,
        blobs,
        records,
        cache,
    }
}

const BOUNDARY: &str = "filevault-test-boundary";

/// One part of a `multipart/form-data` body
pub struct FormPart<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub content_length: Option<usize>,
    pub body: &'a [u8],
}

impl<'a> FormPart<'a> {
    pub fn file(file_name: &'a str, body: &'a [u8]) -> Self {
        FormPart {
            name: "file",
            file_name: Some(file_name),
            content_length: None,
            body,
        }
    }
}

fn form_body(parts: &[FormPart]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        out.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"", part.name).as_bytes());
        if let Some(file_name) = part.file_name {
            out.extend_from_slice(format!("; filename=\"{}\"", file_name).as_bytes());
        }
        out.extend_from_slice(b"\r\nContent-Type: application/octet-stream\r\n");
        if let Some(len) = part.content_length {
            out.extend_from_slice(format!("Content-Length: {}\r\n", len).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(part.body);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    out
}

pub fn form_request(owner: &str, parts: &[FormPart]) -> TestRequest {
    let body = form_body(parts);
    let len = body.len();
    TestRequest::post()
        .uri("/protected/upload")
        .insert_header(("User", owner))
        .insert_header((header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY)))
        .set_payload(body)
        .insert_header((header::CONTENT_LENGTH, len))
}

pub fn upload_request(owner: &str, file_name: &str, body: Vec<u8>) -> TestRequest {
    form_request(owner, &[FormPart::file(file_name, &body)])
}
