//! Core data models for the tiered image store.
//!
//! Hot-tier rows map to SQLite tables via `sqlx::FromRow`; outcomes and
//! cold-tier records serialize as JSON via `serde`.

pub mod archive;
pub mod byte_source;
pub mod image;
pub mod object;
pub mod upload;
