//! Shardio Core - fragment placement, metadata and streaming pipelines for a sharded file store

pub mod cluster;
pub mod error;
pub mod operations;
pub mod registry;
pub mod storage;

#[cfg(test)]
mod testing;

pub use cluster::*;
pub use error::{ErrorKind, Result, ShardError};
pub use operations::*;
pub use registry::{NodeRegistry, StorageNode, fnv1_64, selection_key};
pub use storage::{
    DEFAULT_READ_WINDOW, FileRecord, FileStatus, FragmentReader, FragmentRegistry, FragmentStore,
    validate_filename,
};
