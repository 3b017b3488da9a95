//! Filesystem project store.
//!
//! This crate provides:
//! - Project discovery and loading from a projects directory
//! - Persistence of manifests, transcriptions, scenes and dossiers
//! - Batch report files
//! - Transient artifact cleanup

pub mod error;
pub mod layout;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use layout::{ProjectManifest, ScenesFile};
pub use store::ProjectStore;
