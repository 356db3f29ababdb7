//! services/api/src/web/bins.rs
//!
//! REST handlers for bins: creation (text and file), lookup by alias, listing,
//! statistics, update, deletion and expiration renewal.
//!
//! Lookups and downloads address a bin by its alias; mutations address it by id.

use crate::error::ApiError;
use crate::web::state::AppState;
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use pastebin_core::{Bin, BinUpdate, ContentKind, NewBin, NewFileBin, Statistics};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use utoipa::ToSchema;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BinKind {
    #[default]
    Text,
    File,
}

impl From<ContentKind> for BinKind {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Text => BinKind::Text,
            ContentKind::File => BinKind::File,
        }
    }
}

impl From<BinKind> for ContentKind {
    fn from(kind: BinKind) -> Self {
        match kind {
            BinKind::Text => ContentKind::Text,
            BinKind::File => ContentKind::File,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BinResponse {
    pub id: String,
    pub alias: String,
    /// Inline text, or the stored file name for file bins.
    pub contain: String,
    pub kind: BinKind,
    pub clic: u64,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<Bin> for BinResponse {
    fn from(bin: Bin) -> Self {
        Self {
            id: bin.id,
            alias: bin.alias,
            contain: bin.contain,
            kind: bin.kind.into(),
            clic: bin.clic,
            user_id: bin.user_id,
            created_at: bin.created_at,
            updated_at: bin.updated_at,
            expires_at: bin.expires_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBinRequest {
    #[serde(default)]
    pub alias: String,
    pub contain: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Full replacement: omitted fields are reset to their empty value.
///
/// `kind` may be omitted or must repeat the bin's kind. For a file bin,
/// `contain` may be omitted or must repeat the stored file name.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBinRequest {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub contain: String,
    #[serde(default)]
    pub kind: Option<BinKind>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExpirationRequest {
    /// New lifetime in seconds, counted from now.
    pub seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BinClicksResponse {
    pub bin_id: String,
    pub clicks: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatisticsResponse {
    pub bin_count: usize,
    pub clicks_by_bin: Vec<BinClicksResponse>,
}

impl From<Statistics> for StatisticsResponse {
    fn from(stats: Statistics) -> Self {
        Self {
            bin_count: stats.bin_count,
            clicks_by_bin: stats
                .clicks_by_bin
                .into_iter()
                .map(|c| BinClicksResponse {
                    bin_id: c.bin_id,
                    clicks: c.clicks,
                })
                .collect(),
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /bins - Create a text bin
#[utoipa::path(
    post,
    path = "/bins",
    request_body = CreateBinRequest,
    responses(
        (status = 201, description = "Bin created", body = BinResponse),
        (status = 400, description = "Invalid alias"),
        (status = 409, description = "Alias already in use")
    )
)]
pub async fn create_bin_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBinRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bin = state
        .bins
        .create_bin(NewBin {
            alias: req.alias,
            contain: req.contain,
            user_id: req.user_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(BinResponse::from(bin))))
}

/// POST /bins/files - Create a bin from an uploaded file
///
/// Accepts a multipart/form-data body with a `file` part and optional
/// `alias` and `user_id` text parts.
#[utoipa::path(
    post,
    path = "/bins/files",
    request_body(content_type = "multipart/form-data", description = "The file to upload plus an optional alias."),
    responses(
        (status = 201, description = "Bin created", body = BinResponse),
        (status = 400, description = "Missing file part or invalid alias"),
        (status = 409, description = "Alias already in use"),
        (status = 413, description = "The upload exceeds MAX_UPLOAD_BYTES")
    )
)]
pub async fn create_file_bin_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut alias = String::new();
    let mut user_id = None;
    let mut upload: Option<(Bytes, String)> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "alias" => alias = field.text().await.map_err(bad_multipart)?,
            "user_id" => {
                let value = field.text().await.map_err(bad_multipart)?;
                user_id = Some(value).filter(|v| !v.trim().is_empty());
            }
            "file" => {
                let extension = field.file_name().map(extension_of).unwrap_or_default();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                upload = Some((bytes, extension));
            }
            other => debug!("Ignoring unexpected multipart field '{}'", other),
        }
    }

    let (bytes, extension) =
        upload.ok_or_else(|| ApiError::BadRequest("a 'file' part is required".to_string()))?;
    let bin = state
        .bins
        .create_file_bin(NewFileBin {
            alias,
            bytes,
            extension,
            user_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(BinResponse::from(bin))))
}

/// GET /bins - List every live bin
#[utoipa::path(
    get,
    path = "/bins",
    responses(
        (status = 200, description = "All live bins", body = [BinResponse]),
        (status = 503, description = "The scan did not finish in time")
    )
)]
pub async fn list_bins_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let (cancel, _guard) = state.scan_deadline();
    let bins = state.bins.get_all_bins(&cancel).await?;
    let body: Vec<BinResponse> = bins.into_iter().map(BinResponse::from).collect();
    Ok(Json(body))
}

/// GET /bins/statistics - Bin count and clicks per bin
#[utoipa::path(
    get,
    path = "/bins/statistics",
    responses(
        (status = 200, description = "Current statistics", body = StatisticsResponse),
        (status = 503, description = "The scan did not finish in time")
    )
)]
pub async fn statistics_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let (cancel, _guard) = state.scan_deadline();
    let stats = state.stats.get_stats(&cancel).await?;
    Ok(Json(StatisticsResponse::from(stats)))
}

/// GET /bins/{ident} - Resolve a bin by alias, counting one click
#[utoipa::path(
    get,
    path = "/bins/{ident}",
    params(("ident" = String, Path, description = "The bin alias")),
    responses(
        (status = 200, description = "The bin, with its updated click count", body = BinResponse),
        (status = 404, description = "No live bin has this alias")
    )
)]
pub async fn get_bin_handler(
    State(state): State<Arc<AppState>>,
    Path(ident): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bin = state.bins.get_bin_by_alias(&ident).await?;
    Ok(Json(BinResponse::from(bin)))
}

/// GET /bins/{ident}/file - Download the file behind a bin
#[utoipa::path(
    get,
    path = "/bins/{ident}/file",
    params(("ident" = String, Path, description = "The bin alias")),
    responses(
        (status = 200, description = "The file contents as an octet-stream attachment"),
        (status = 404, description = "Unknown alias, text bin, or missing file")
    )
)]
pub async fn download_file_handler(
    State(state): State<Arc<AppState>>,
    Path(ident): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bin = state.bins.get_bin_by_alias(&ident).await?;
    let bytes = state.bins.read_file(&bin).await?;
    let disposition = format!("attachment; filename=\"{}\"", download_name(&bin));
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// PUT /bins/{ident} - Replace a bin's alias, content, kind and owner
#[utoipa::path(
    put,
    path = "/bins/{ident}",
    params(("ident" = String, Path, description = "The bin id")),
    request_body = UpdateBinRequest,
    responses(
        (status = 200, description = "The updated bin", body = BinResponse),
        (status = 400, description = "Invalid alias, a kind change, or a new file name for a file bin"),
        (status = 404, description = "Unknown id"),
        (status = 409, description = "The new alias is already in use")
    )
)]
pub async fn update_bin_handler(
    State(state): State<Arc<AppState>>,
    Path(ident): Path<String>,
    Json(req): Json<UpdateBinRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bin = state
        .bins
        .update_bin(
            &ident,
            BinUpdate {
                alias: req.alias,
                contain: req.contain,
                kind: req.kind.map(ContentKind::from),
                user_id: req.user_id,
            },
        )
        .await?;
    Ok(Json(BinResponse::from(bin)))
}

/// DELETE /bins/{ident} - Delete a bin and return its last state
#[utoipa::path(
    delete,
    path = "/bins/{ident}",
    params(("ident" = String, Path, description = "The bin id")),
    responses(
        (status = 200, description = "The deleted bin", body = BinResponse),
        (status = 404, description = "Unknown id")
    )
)]
pub async fn delete_bin_handler(
    State(state): State<Arc<AppState>>,
    Path(ident): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bin = state.bins.delete_bin_by_id(&ident).await?;
    Ok(Json(BinResponse::from(bin)))
}

/// PUT /bins/{ident}/expiration - Renew a bin's lifetime
#[utoipa::path(
    put,
    path = "/bins/{ident}/expiration",
    params(("ident" = String, Path, description = "The bin id")),
    request_body = ExpirationRequest,
    responses(
        (status = 200, description = "The bin with its new expiry", body = BinResponse),
        (status = 400, description = "Zero lifetime"),
        (status = 404, description = "Unknown id")
    )
)]
pub async fn set_expiration_handler(
    State(state): State<Arc<AppState>>,
    Path(ident): Path<String>,
    Json(req): Json<ExpirationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bin = state
        .bins
        .set_expiration(&ident, Duration::from_secs(req.seconds))
        .await?;
    Ok(Json(BinResponse::from(bin)))
}

//=========================================================================================
// Helpers
//=========================================================================================

fn bad_multipart(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge(e.body_text());
    }
    ApiError::BadRequest(format!("invalid multipart body: {}", e.body_text()))
}

/// The file name offered to downloaders: the alias (or id) plus the stored extension.
fn download_name(bin: &Bin) -> String {
    let base = if bin.alias.is_empty() { &bin.id } else { &bin.alias };
    format!("{base}{}", extension_of(&bin.contain))
}

/// `.ext` from an uploaded file name, or empty if it has none worth keeping.
fn extension_of(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}
