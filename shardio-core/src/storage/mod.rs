//! Storage modules for shardio
//!
//! Provides the ingress-side fragment registry and node-local fragment files.

pub mod fragment_store;
pub mod metadata_store;

pub use fragment_store::{DEFAULT_READ_WINDOW, FragmentReader, FragmentStore, validate_filename};
pub use metadata_store::{FileRecord, FileStatus, FragmentRegistry};
