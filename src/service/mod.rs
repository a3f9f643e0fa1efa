//service/mod.rs
pub mod metadata_service;
pub mod principal;
pub mod reconciliation_worker;
pub mod upload_service;

use actix_multipart::{Multipart, MultipartError};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use bytes::BytesMut;
use chrono::NaiveDate;
use futures::StreamExt;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::ServiceError;
use crate::metadata::{FileMetadata, SearchFilter};
use crate::service::principal::{Principal, PrincipalError};
use crate::service::upload_service::UploadRequest;

/// Header set by the upstream auth layer with the caller's decoded id
pub const PRINCIPAL_HEADER: &str = "User";
/// Form part carrying the uploaded file
pub const FILE_FIELD: &str = "file";
/// Room left for boundaries and part headers above `max_file_size`
const FORM_OVERHEAD: u64 = 64 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub file_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<FileMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareResponse {
    pub share_link: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user_id: Principal,
    pub message: String,
}

/// Query string of `/files/search`; empty values are ignored
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub name: Option<String>,
    pub date: Option<String>,
}

impl SearchParams {
    fn into_filter(self) -> Result<SearchFilter, ServiceError> {
        let name = self.name.filter(|n| !n.is_empty());
        let date = match self.date.filter(|d| !d.is_empty()) {
            Some(raw) => Some(
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|_| ServiceError::Validation(format!("Invalid date {:?}, expected YYYY-MM-DD", raw)))?,
            ),
            None => None,
        };
        Ok(SearchFilter { name, date })
    }
}

/// Resolve the caller's principal from the request headers
fn principal_from_request(req: &HttpRequest) -> Result<Principal, ServiceError> {
    // Worker threads are reused, so clear the previous request's tag first
    log_mdc::remove("user");
    let raw = req
        .headers()
        .get(PRINCIPAL_HEADER)
        .ok_or(ServiceError::Unauthorized)?
        .to_str()
        .map_err(|_| PrincipalError::NotANumber("<non-ascii header>".to_string()))?;

    let principal = Principal::parse(raw)?;
    log_mdc::insert("user", principal.to_string());
    Ok(principal)
}

fn declared_length(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

fn malformed_form(e: MultipartError) -> ServiceError {
    ServiceError::Validation(format!("Failed to read upload: {}", e))
}

/// POST /protected/upload
///
/// Expects `multipart/form-data` with the file in the `file` part. Other
/// parts are skipped. Sizes are checked against the request and part
/// `Content-Length` before the body is read, and again while it streams.
pub async fn upload_file(
    req: HttpRequest,
    mut form: Multipart,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let owner = principal_from_request(&req)?;
    let coordinator = &app_state.upload_coordinator;

    if let Some(request_length) = declared_length(req.headers()) {
        if request_length > coordinator.max_file_size() + FORM_OVERHEAD {
            return Err(coordinator.too_large());
        }
    }

    while let Some(field) = form.next().await {
        let mut field = field.map_err(malformed_form)?;
        let (name, file_name) = match field.content_disposition() {
            Some(cd) => (cd.get_name().map(str::to_string), cd.get_filename().map(str::to_string)),
            None => (None, None),
        };
        if name.as_deref() != Some(FILE_FIELD) {
            debug!("Skipping form part {:?}", name);
            continue;
        }
        let file_name = file_name.unwrap_or_default();

        // Refuse oversized parts before reading them
        let part_length = declared_length(field.headers());
        if let Some(declared) = part_length {
            coordinator.check_declared_size(declared)?;
        }
        let limit = part_length.unwrap_or(coordinator.max_file_size());

        debug!("Receiving {} for owner {}", file_name, owner);
        let mut bytes = BytesMut::with_capacity(part_length.unwrap_or(0) as usize);
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(malformed_form)?;
            if (bytes.len() + chunk.len()) as u64 > limit {
                return Err(match part_length {
                    Some(_) => ServiceError::Validation("File part is larger than its Content-Length".to_string()),
                    None => coordinator.too_large(),
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        let stored = coordinator
            .upload(UploadRequest {
                owner,
                file_name,
                declared_size: part_length.unwrap_or(bytes.len() as u64),
                body: bytes.freeze(),
            })
            .await?;

        return Ok(HttpResponse::Ok().json(UploadResponse {
            message: "File uploaded successfully".to_string(),
            file_url: stored.storage_locator,
        }));
    }

    Err(ServiceError::Validation("File is required".to_string()))
}

/// GET /protected/files
pub async fn list_files(req: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ServiceError> {
    let owner = principal_from_request(&req)?;
    let files = app_state.metadata_service.list_files(owner)?;
    Ok(HttpResponse::Ok().json(FilesResponse { files }))
}

/// GET /protected/files/search?name=&date=
pub async fn search_files(
    req: HttpRequest,
    query: web::Query<SearchParams>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let owner = principal_from_request(&req)?;
    let filter = query.into_inner().into_filter()?;
    let files = app_state.metadata_service.search_files(owner, &filter)?;
    info!("Search for owner {} matched {} files", owner, files.len());
    Ok(HttpResponse::Ok().json(FilesResponse { files }))
}

/// GET /protected/share/{file_id}
pub async fn share_file(
    req: HttpRequest,
    file_id: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let owner = principal_from_request(&req)?;
    let share_link = app_state.metadata_service.resolve_share_link(&file_id, owner)?;
    Ok(HttpResponse::Ok().json(ShareResponse { share_link }))
}

/// GET /protected/profile
pub async fn profile(req: HttpRequest) -> Result<HttpResponse, ServiceError> {
    let owner = principal_from_request(&req)?;
    Ok(HttpResponse::Ok().json(ProfileResponse {
        user_id: owner,
        message: "Welcome to your profile".to_string(),
    }))
}

/// Register all routes under `/protected`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/protected")
            .route("/upload", web::post().to(upload_file))
            .route("/files", web::get().to(list_files))
            .route("/files/search", web::get().to(search_files))
            .route("/share/{file_id}", web::get().to(share_file))
            .route("/profile", web::get().to(profile)),
    );
}
