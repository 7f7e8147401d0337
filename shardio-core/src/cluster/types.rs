use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// One tagged payload frame on a fragment write session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentFrame {
    pub filename: String,
    pub index: u32,
    pub payload: Bytes,
}

/// Chunks of one fragment as served by its node, in storage order.
pub type FragmentChunks = BoxStream<'static, Result<Bytes>>;

/// RPC surface the ingress uses to reach storage nodes.
#[async_trait]
pub trait FragmentTransport: Send + Sync {
    /// Open a streaming write for fragment `index` of `filename` on `address`.
    async fn open_write(
        &self,
        address: &str,
        filename: &str,
        index: u32,
    ) -> Result<Box<dyn FragmentSink>>;

    async fn read_fragment(&self, address: &str, filename: &str, index: u32)
    -> Result<FragmentChunks>;

    async fn delete_fragment(&self, address: &str, filename: &str, index: u32) -> Result<()>;
}

/// An open write session. Dropping it closes the stream without waiting for
/// the node's acknowledgement; `close` waits for it.
#[async_trait]
pub trait FragmentSink: Send {
    async fn send(&mut self, frame: FragmentFrame) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}
