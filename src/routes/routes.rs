//! Defines routes for image, archive, and object operations.
//!
//! ## Structure
//! - **Image endpoints**
//!   - `POST /images`: upload an original (multipart `file`)
//!   - `GET  /images/{*key}`: 302 to a resized rendition (`width`, `height`, `versionId`)
//!   - `GET  /report-missing/{*key}`: 404 for a key reported missing
//!
//! - **Archive endpoints**
//!   - `GET  /archive/inventory`: start an inventory job
//!   - `GET  /archive/inventory/{job_id}`: inventory of a finished job
//!   - `GET  /archive/jobs`: list the vault's jobs
//!   - `POST /archive/retrievals/{archive_id}`: start an archive retrieval
//!   - `POST /archive/restore/{job_id}`: restore a retrieved archive
//!
//! - **Object endpoints**
//!   - `GET | HEAD /objects/{bucket}/{*key}`: public location of hot-tier objects
//!
//! The wildcard `*key` allows nested keys like `ab12cd34/2024-01-01T00-00-00/cat.jpg`.

use crate::{
    handlers::{
        archive_handlers::{
            get_inventory, list_jobs, restore_archive, start_inventory, start_retrieval,
        },
        health_handlers::{healthz, readyz},
        image_handlers::{get_image, report_missing, upload_image},
        object_handlers::{get_object, head_object},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for every endpoint.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Image routes
        .route("/images", post(upload_image))
        .route("/images/{*key}", get(get_image))
        .route("/report-missing/{*key}", get(report_missing))
        // Archive routes
        .route("/archive/inventory", get(start_inventory))
        .route("/archive/inventory/{job_id}", get(get_inventory))
        .route("/archive/jobs", get(list_jobs))
        .route("/archive/retrievals/{archive_id}", post(start_retrieval))
        .route("/archive/restore/{job_id}", post(restore_archive))
        // Object routes
        .route("/objects/{bucket}/{*key}", get(get_object).head(head_object))
}
