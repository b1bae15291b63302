//! Serves the public location of hot-tier objects.
//! Streams object bodies to avoid buffering in memory.

use crate::{
    errors::AppError,
    handlers::raw_param,
    models::object::ObjectVersion,
    state::AppState,
};
use axum::{
    body::Body,
    extract::{RawPathParams, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Open the latest readable version, refusing private objects.
async fn open_public(
    state: &AppState,
    bucket: &str,
    key: &str,
) -> Result<(ObjectVersion, File), AppError> {
    let tier = state
        .public_objects
        .as_ref()
        .ok_or_else(|| AppError::not_found("objects are not served by this instance"))?;

    let (meta, file) = tier
        .open_latest(bucket, key)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{}/{} not found", bucket, key)))?;

    if !meta.is_public() {
        return Err(AppError::new(StatusCode::FORBIDDEN, "access denied"));
    }
    Ok((meta, file))
}

/// `GET /objects/{bucket}/{*key}` as a streaming response.
pub async fn get_object(
    State(state): State<AppState>,
    params: RawPathParams,
) -> Result<Response, AppError> {
    let (bucket, key) = (raw_param(&params, "bucket")?, raw_param(&params, "key")?);
    let (meta, file) = open_public(&state, &bucket, &key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

/// HEAD `/objects/{bucket}/{*key}`: same headers as GET but no body.
pub async fn head_object(
    State(state): State<AppState>,
    params: RawPathParams,
) -> Result<Response, AppError> {
    let (bucket, key) = (raw_param(&params, "bucket")?, raw_param(&params, "key")?);
    let (meta, _file) = open_public(&state, &bucket, &key).await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectVersion) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    let quoted = format!("\"{}\"", meta.etag.trim_matches('"'));
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&meta.version_id) {
        headers.insert("x-amz-version-id", value);
    }

    if let Ok(value) = HeaderValue::from_str(&meta.created_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
