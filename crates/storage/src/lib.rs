//! Storage for the mirrored simple index.
//!
//! The mirror is a tree of index documents rooted at a single directory:
//!
//! ```text
//! <mirror_root>/index.html                 root listing
//! <mirror_root>/simple/<package>/index.html  per-package listing
//! <mirror_root>/last_serial.txt            persisted changelog cursor
//! ```
//!
//! Everything that touches that tree goes through a [`StorageBackend`] so the
//! synchronisation logic can be exercised against the in-memory
//! `MockBackend` (behind the `mock` feature) in tests.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
