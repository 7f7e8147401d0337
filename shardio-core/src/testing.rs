//! In-process cluster used by the unit tests.

use crate::cluster::{FragmentChunks, FragmentFrame, FragmentSink, FragmentTransport};
use crate::error::{Result, ShardError};
use crate::operations::{InboundFrame, InboundFrames};
use crate::registry::NodeRegistry;
use crate::storage::{FragmentRegistry, FragmentStore};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Routes fragment RPCs to real [`FragmentStore`]s keyed by node address.
#[derive(Default)]
pub(crate) struct LocalTransport {
    stores: Mutex<HashMap<String, Arc<FragmentStore>>>,
    failing_deletes: Mutex<HashSet<String>>,
    delete_calls: Mutex<Vec<(String, String, u32)>>,
}

impl LocalTransport {
    pub(crate) fn add_node(&self, address: &str, store: Arc<FragmentStore>) {
        self.stores
            .lock()
            .unwrap()
            .insert(address.to_string(), store);
    }

    pub(crate) fn fail_deletes_on(&self, address: &str) {
        self.failing_deletes
            .lock()
            .unwrap()
            .insert(address.to_string());
    }

    pub(crate) fn delete_calls(&self) -> Vec<(String, String, u32)> {
        self.delete_calls.lock().unwrap().clone()
    }

    fn store(&self, address: &str) -> Result<Arc<FragmentStore>> {
        self.stores
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| ShardError::Transport(format!("node unreachable: {}", address)))
    }
}

#[async_trait]
impl FragmentTransport for LocalTransport {
    async fn open_write(
        &self,
        address: &str,
        filename: &str,
        index: u32,
    ) -> Result<Box<dyn FragmentSink>> {
        let store = self.store(address)?;
        Ok(Box::new(LocalSink {
            store,
            filename: filename.to_string(),
            index,
            buffer: BytesMut::new(),
        }))
    }

    async fn read_fragment(
        &self,
        address: &str,
        filename: &str,
        index: u32,
    ) -> Result<FragmentChunks> {
        let store = self.store(address)?;
        Ok(store.open(filename, index).await?.into_stream())
    }

    async fn delete_fragment(&self, address: &str, filename: &str, index: u32) -> Result<()> {
        self.delete_calls.lock().unwrap().push((
            address.to_string(),
            filename.to_string(),
            index,
        ));

        if self.failing_deletes.lock().unwrap().contains(address) {
            return Err(ShardError::Transport(format!(
                "injected delete failure on {}",
                address
            )));
        }

        self.store(address)?.delete(filename, index).await
    }
}

struct LocalSink {
    store: Arc<FragmentStore>,
    filename: String,
    index: u32,
    buffer: BytesMut,
}

#[async_trait]
impl FragmentSink for LocalSink {
    async fn send(&mut self, frame: FragmentFrame) -> Result<()> {
        if frame.filename != self.filename || frame.index != self.index {
            return Err(ShardError::Internal("mis-tagged frame".to_string()));
        }
        self.buffer.extend_from_slice(&frame.payload);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let LocalSink {
            store,
            filename,
            index,
            buffer,
        } = *self;
        store.put(&filename, index, buffer.freeze()).await
    }
}

/// Ingress registries plus one temp-dir backed store per node.
pub(crate) struct LocalCluster {
    pub(crate) transport: Arc<LocalTransport>,
    pub(crate) nodes: Arc<NodeRegistry>,
    pub(crate) files: Arc<FragmentRegistry>,
    pub(crate) stores: HashMap<String, Arc<FragmentStore>>,
    _dirs: Vec<TempDir>,
}

impl LocalCluster {
    pub(crate) async fn new(addresses: &[&str]) -> Self {
        let meta_dir = tempfile::tempdir().unwrap();
        let files = Arc::new(FragmentRegistry::open(meta_dir.path().join("fragments.json")).unwrap());

        let transport = Arc::new(LocalTransport::default());
        let nodes = Arc::new(NodeRegistry::new());
        let mut stores = HashMap::new();
        let mut dirs = vec![meta_dir];

        for address in addresses {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(FragmentStore::new(dir.path().to_path_buf()).unwrap());
            transport.add_node(address, store.clone());
            nodes.register(address).await.unwrap();
            stores.insert(address.to_string(), store);
            dirs.push(dir);
        }

        Self {
            transport,
            nodes,
            files,
            stores,
            _dirs: dirs,
        }
    }

    /// Read back fragment `index` straight from the store that holds it.
    pub(crate) async fn fragment_bytes(&self, address: &str, filename: &str, index: u32) -> Bytes {
        let mut reader = self.stores[address].open(filename, index).await.unwrap();
        let mut body = BytesMut::new();
        while let Some(window) = reader.next_window().await.unwrap() {
            body.extend_from_slice(&window);
        }
        body.freeze()
    }
}

/// An upload stream holding `announcement` followed by binary `chunks`.
pub(crate) fn inbound(announcement: &str, chunks: &[&[u8]]) -> InboundFrames {
    let (sender, receiver) = mpsc::channel(chunks.len() + 2);
    sender
        .try_send(Ok(InboundFrame::Text(announcement.to_string())))
        .unwrap();
    for chunk in chunks {
        sender
            .try_send(Ok(InboundFrame::Binary(Bytes::copy_from_slice(chunk))))
            .unwrap();
    }
    receiver
}
