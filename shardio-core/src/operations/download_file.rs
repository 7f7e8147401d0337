use crate::{FileRecord, FileStatus, FragmentRegistry, FragmentTransport, Result, ShardError};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct DownloadFileOperation {
    files: Arc<FragmentRegistry>,
    transport: Arc<dyn FragmentTransport>,
}

#[derive(Debug, Clone)]
pub struct DownloadFileOperationRequest {
    pub filename: String,
}

#[derive(Debug, Clone)]
pub enum DownloadFileOperationOutcome {
    Found(FileRecord),
    NotFound,
}

impl DownloadFileOperation {
    pub fn new(files: Arc<FragmentRegistry>, transport: Arc<dyn FragmentTransport>) -> Self {
        Self { files, transport }
    }

    /// Locate a downloadable file. Only `Complete` records are served.
    pub async fn run(
        &self,
        request: DownloadFileOperationRequest,
    ) -> Result<DownloadFileOperationOutcome> {
        match self.files.get(&request.filename).await {
            Some(record) if record.status == FileStatus::Complete => {
                Ok(DownloadFileOperationOutcome::Found(record))
            }
            _ => Ok(DownloadFileOperationOutcome::NotFound),
        }
    }

    /// Replay every fragment of `record` into `sink` in index order.
    ///
    /// A zero-length frame is sent last to mark the end of the file, so empty
    /// chunks from a node are never forwarded. Returns the bytes relayed.
    pub async fn relay(&self, record: &FileRecord, sink: &mpsc::Sender<Bytes>) -> Result<u64> {
        let mut relayed = 0u64;

        for (index, address) in record.addresses.iter().enumerate() {
            let mut chunks = self
                .transport
                .read_fragment(address, &record.filename, index as u32)
                .await?;

            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                if chunk.is_empty() {
                    continue;
                }

                relayed += chunk.len() as u64;
                sink.send(chunk)
                    .await
                    .map_err(|_| ShardError::Transport("download client went away".to_string()))?;
            }
        }

        sink.send(Bytes::new())
            .await
            .map_err(|_| ShardError::Transport("download client went away".to_string()))?;

        tracing::info!(
            "Download of {} complete: bytes={} fragments={}",
            record.filename,
            relayed,
            record.fragment_count()
        );

        Ok(relayed)
    }
}
