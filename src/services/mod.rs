//! Storage orchestration: key derivation, integrity checks, tier clients and
//! the flows built on top of them.

pub mod archive_tier;
pub mod codec;
pub mod error;
pub mod image_store;
pub mod integrity;
pub mod keys;
pub mod local_archive_tier;
pub mod local_object_tier;
pub mod memory;
pub mod object_tier;
pub mod recovery;
pub mod resolver;
