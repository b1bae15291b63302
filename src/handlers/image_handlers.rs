//! HTTP handlers for image upload and rendition lookup.
//!
//! - `POST /images` stores an original and optionally archives it
//! - `GET /images/{*key}` redirects to a (possibly new) resized rendition
//! - `GET /report-missing/{*key}` answers 404 for a key known to be gone

use crate::{
    errors::AppError,
    handlers::raw_param,
    models::{
        image::ImageAsset,
        object::{CannedAcl, StorageClass},
    },
    services::{
        image_store::UploadRequest,
        resolver::{ResolveOutcome, VariantRequest},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, RawPathParams, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    #[serde(rename = "objectKey")]
    pub object_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResizeQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(rename = "versionId")]
    pub version_id: Option<String>,
}

/// `POST /images`: multipart upload of a single `file` field.
pub async fn upload_image(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut object_key = query.object_key;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {}", err)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let name = field.file_name().map(base_name).unwrap_or_default();
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("reading file field: {}", err)))?;
                file = Some((name, data));
            }
            Some("objectKey") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("reading objectKey: {}", err)))?;
                object_key = object_key.or(Some(text));
            }
            _ => {}
        }
    }

    let (file_name, data) = file.ok_or_else(|| AppError::bad_request("missing `file` field"))?;
    if data.is_empty() {
        return Err(AppError::bad_request("uploaded file is empty"));
    }
    let file_name = if file_name.is_empty() {
        "image".to_string()
    } else {
        file_name
    };

    let codec = Arc::clone(&state.codec);
    let probe = data.clone();
    let info = tokio::task::spawn_blocking(move || codec.inspect(&probe))
        .await
        .map_err(|err| AppError::internal(err.to_string()))?
        .map_err(|err| AppError::bad_request(format!("not a supported image: {}", err)))?;

    let key = state
        .keys
        .derive_original_key(&file_name, object_key.as_deref());
    let request = UploadRequest {
        bucket: state.originals.bucket.clone(),
        bucket_url: state.originals.bucket_url.clone(),
        object_key: key.into_string(),
        storage_class: StorageClass::Standard,
        acl: CannedAcl::Private,
        archive_vault: state.originals.vault.clone(),
    };

    let outcome = state
        .store
        .upload_image(request, ImageAsset::new(data, info))
        .await;

    if let Some(failure) = outcome.failure() {
        warn!("upload of {} rejected: {}", outcome.object_key(), failure);
        return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(outcome)).into_response());
    }

    info!("uploaded {}", outcome.object_key());
    let mut response = (StatusCode::CREATED, Json(&outcome)).into_response();
    if let Some(value) = outcome
        .location()
        .and_then(|location| HeaderValue::from_str(location).ok())
    {
        response.headers_mut().insert(header::LOCATION, value);
    }
    Ok(response)
}

/// `GET /images/{*key}`: 302 to the requested rendition.
pub async fn get_image(
    State(state): State<AppState>,
    params: RawPathParams,
    Query(query): Query<ResizeQuery>,
) -> Result<Response, AppError> {
    let key = raw_param(&params, "key")?;
    let outcome = state
        .resolver
        .resolve(VariantRequest {
            original_key: key.clone(),
            width: query.width,
            height: query.height,
            version_id: query.version_id,
        })
        .await;

    match outcome {
        ResolveOutcome::Cached { location } | ResolveOutcome::Created { location, .. } => {
            found(&location)
        }
        ResolveOutcome::NotFound => Err(AppError::not_found(format!(
            "Image with key `{}` not found",
            key
        ))),
        ResolveOutcome::Failed(failure) => Err(AppError::from_failure(&failure)),
    }
}

/// `GET /report-missing/{*key}`
pub async fn report_missing(Path(key): Path<String>) -> AppError {
    AppError::not_found(format!(
        "Image with key `{}` has been reported as missing",
        key
    ))
}

fn found(location: &str) -> Result<Response, AppError> {
    let value = HeaderValue::from_str(location)
        .map_err(|_| AppError::internal(format!("unusable location `{}`", location)))?;
    let mut response = StatusCode::FOUND.into_response();
    response.headers_mut().insert(header::LOCATION, value);
    Ok(response)
}

/// Final path component of a client-supplied file name.
fn base_name(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
