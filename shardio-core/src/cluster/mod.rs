pub mod client;
pub mod types;

pub use client::{ClusterClient, DEFAULT_WRITE_BUFFER, RegisterNodeRequest};
pub use types::{FragmentChunks, FragmentFrame, FragmentSink, FragmentTransport};
