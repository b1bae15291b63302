pub mod archive_handlers;
pub mod health_handlers;
pub mod image_handlers;
pub mod object_handlers;

use crate::errors::AppError;
use axum::extract::RawPathParams;

/// A path capture exactly as it appeared in the request URI.
///
/// Generated keys carry percent-escapes (`my%20cat.png`), so the capture is
/// matched against stored keys without decoding it first.
pub(crate) fn raw_param(params: &RawPathParams, name: &str) -> Result<String, AppError> {
    params
        .iter()
        .find(|(param, _)| *param == name)
        .map(|(_, value)| value.to_string())
        .ok_or_else(|| AppError::bad_request(format!("missing path parameter `{}`", name)))
}
