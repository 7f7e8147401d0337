use crate::{
    FileStatus, FragmentFrame, FragmentRegistry, FragmentSink, FragmentTransport, NodeRegistry,
    Result, ShardError, selection_key, validate_filename,
};
use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const DEFAULT_FANOUT: u64 = 6;

/// One message read from an upload client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Bytes),
}

/// Bounded channel carrying a client's upload stream to the orchestrator.
pub type InboundFrames = mpsc::Receiver<Result<InboundFrame>>;

#[derive(Debug, Deserialize)]
struct SizeAnnouncement {
    size: i64,
}

/// Parse the `{"size": n}` message that opens every upload.
pub fn parse_size_announcement(payload: &[u8]) -> Result<u64> {
    let announcement: SizeAnnouncement = serde_json::from_slice(payload).map_err(|error| {
        ShardError::InvalidInput(format!("malformed size announcement: {}", error))
    })?;

    if announcement.size <= 0 {
        return Err(ShardError::InvalidInput(format!(
            "declared size must be positive, got {}",
            announcement.size
        )));
    }

    Ok(announcement.size as u64)
}

/// Tracks where fragment boundaries fall for one upload.
///
/// The target size is `declared / fanout`. A boundary opens on the first frame
/// and whenever the bytes accumulated since the last boundary, counting the
/// current frame, reach the target. A target of zero puts every frame in its
/// own fragment.
#[derive(Debug, Clone)]
pub struct FragmentBoundaries {
    declared: u64,
    target: u64,
    consumed: u64,
    current: u64,
    opened: bool,
}

impl FragmentBoundaries {
    pub fn new(declared: u64, fanout: u64) -> Self {
        Self {
            declared,
            target: declared / fanout.max(1),
            consumed: 0,
            current: 0,
            opened: false,
        }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn is_satisfied(&self) -> bool {
        self.consumed >= self.declared
    }

    /// Account for a frame of `len` bytes; true when it opens a new fragment.
    pub fn advance(&mut self, len: u64) -> bool {
        self.consumed += len;
        self.current += len;

        if !self.opened || self.current >= self.target {
            self.opened = true;
            self.current = 0;
            return true;
        }

        false
    }
}

#[derive(Clone)]
pub struct UploadFileOperation {
    nodes: Arc<NodeRegistry>,
    files: Arc<FragmentRegistry>,
    transport: Arc<dyn FragmentTransport>,
    fanout: u64,
    claims: UploadClaims,
}

#[derive(Debug)]
pub struct UploadFileOperationRequest {
    pub filename: String,
    pub frames: InboundFrames,
}

#[derive(Debug)]
pub struct UploadFileOperationResult {
    pub filename: String,
    pub status: FileStatus,
    pub declared_size: u64,
    pub bytes_received: u64,
    pub fragment_count: u32,
    pub failure: Option<ShardError>,
}

impl UploadFileOperation {
    pub fn new(
        nodes: Arc<NodeRegistry>,
        files: Arc<FragmentRegistry>,
        transport: Arc<dyn FragmentTransport>,
        fanout: u64,
    ) -> Self {
        Self {
            nodes,
            files,
            transport,
            fanout: fanout.max(1),
            claims: UploadClaims::new(),
        }
    }

    pub fn fanout(&self) -> u64 {
        self.fanout
    }

    /// Names this operation is currently streaming.
    pub fn claims(&self) -> UploadClaims {
        self.claims.clone()
    }

    /// Run one upload session.
    ///
    /// Errors are returned only when the session is rejected before any
    /// fragment exists. Once streaming starts the session always finalizes and
    /// reports `Complete` or `Failed` in the result.
    pub async fn run(&self, request: UploadFileOperationRequest) -> Result<UploadFileOperationResult> {
        let UploadFileOperationRequest {
            filename,
            mut frames,
        } = request;

        validate_filename(&filename)?;
        let declared_size = read_announcement(&mut frames).await?;

        let _claim = self
            .claims
            .try_claim(&filename)?
            .ok_or_else(|| ShardError::FileExists(filename.clone()))?;
        if self.files.get(&filename).await.is_some() {
            return Err(ShardError::FileExists(filename));
        }

        let boundaries = FragmentBoundaries::new(declared_size, self.fanout);
        tracing::info!(
            "Upload of {} started: declared={} fragment_size={}",
            filename,
            declared_size,
            boundaries.target()
        );

        let mut session = UploadSession {
            operation: self,
            filename,
            declared_size,
            boundaries,
            active: None,
            placed: 0,
        };

        let streamed = session.stream(&mut frames).await;
        Ok(session.finalize(streamed).await)
    }
}

async fn read_announcement(frames: &mut InboundFrames) -> Result<u64> {
    match frames.recv().await {
        Some(Ok(InboundFrame::Text(text))) => parse_size_announcement(text.as_bytes()),
        Some(Ok(InboundFrame::Binary(payload))) => parse_size_announcement(&payload),
        Some(Err(error)) => Err(ShardError::InvalidInput(format!(
            "failed to read size announcement: {}",
            error
        ))),
        None => Err(ShardError::InvalidInput(
            "stream closed before size announcement".to_string(),
        )),
    }
}

/// Filenames with an upload session in progress.
///
/// Clones share one set. A name stays claimed until its [`UploadClaim`] drops.
#[derive(Debug, Clone, Default)]
pub struct UploadClaims {
    names: Arc<Mutex<HashSet<String>>>,
}

impl UploadClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, filename: &str) -> bool {
        self.names
            .lock()
            .map(|names| names.contains(filename))
            .unwrap_or(false)
    }

    /// Claim `filename`, or `None` when another holder already has it.
    pub fn try_claim(&self, filename: &str) -> Result<Option<UploadClaim>> {
        let mut names = self
            .names
            .lock()
            .map_err(|_| ShardError::Internal("upload claim lock poisoned".to_string()))?;
        if !names.insert(filename.to_string()) {
            return Ok(None);
        }

        Ok(Some(UploadClaim {
            claims: self.clone(),
            filename: filename.to_string(),
        }))
    }
}

pub struct UploadClaim {
    claims: UploadClaims,
    filename: String,
}

impl Drop for UploadClaim {
    fn drop(&mut self) {
        if let Ok(mut names) = self.claims.names.lock() {
            names.remove(&self.filename);
        }
    }
}

struct ActiveFragment {
    address: String,
    index: u32,
    sink: Box<dyn FragmentSink>,
}

struct UploadSession<'a> {
    operation: &'a UploadFileOperation,
    filename: String,
    declared_size: u64,
    boundaries: FragmentBoundaries,
    active: Option<ActiveFragment>,
    /// Fragments whose write session opened; also the next index.
    placed: u32,
}

impl UploadSession<'_> {
    async fn stream(&mut self, frames: &mut InboundFrames) -> Result<()> {
        while !self.boundaries.is_satisfied() {
            let payload = match frames.recv().await {
                None => break,
                Some(Err(error)) => return Err(error),
                Some(Ok(InboundFrame::Binary(payload))) => payload,
                Some(Ok(InboundFrame::Text(text))) => Bytes::from(text),
            };

            if payload.is_empty() {
                break;
            }

            if self.boundaries.advance(payload.len() as u64) {
                self.open_next_fragment(&payload).await?;
            }

            let active = self
                .active
                .as_mut()
                .ok_or_else(|| ShardError::Internal("no open fragment for frame".to_string()))?;

            active
                .sink
                .send(FragmentFrame {
                    filename: self.filename.clone(),
                    index: active.index,
                    payload,
                })
                .await?;
        }

        Ok(())
    }

    async fn open_next_fragment(&mut self, payload: &Bytes) -> Result<()> {
        if let Some(previous) = self.active.take() {
            let recorded = self
                .operation
                .files
                .append_fragment(&self.filename, &previous.address)
                .await;
            let closed = previous.sink.close().await;
            recorded?;
            closed?;
        }

        let index = self.placed;
        let key = selection_key(&self.filename, self.boundaries.consumed(), payload);
        let node = self
            .operation
            .nodes
            .select(&key)
            .await
            .ok_or(ShardError::NoNodes)?;

        let sink = self
            .operation
            .transport
            .open_write(&node.address, &self.filename, index)
            .await?;

        tracing::debug!(
            "Routed fragment {} of {} to {}",
            index,
            self.filename,
            node.address
        );

        self.active = Some(ActiveFragment {
            address: node.address,
            index,
            sink,
        });
        self.placed += 1;
        Ok(())
    }

    async fn finalize(mut self, streamed: Result<()>) -> UploadFileOperationResult {
        let mut failure = streamed.err();

        if let Some(last) = self.active.take() {
            let closed = last.sink.close().await;
            let recorded = self
                .operation
                .files
                .append_fragment(&self.filename, &last.address)
                .await;

            for error in [closed.err(), recorded.err()].into_iter().flatten() {
                if failure.is_none() {
                    failure = Some(error);
                } else {
                    tracing::warn!(
                        "Additional error while finalizing upload of {}: {}",
                        self.filename,
                        error
                    );
                }
            }
        }

        if failure.is_none() && !self.boundaries.is_satisfied() {
            failure = Some(ShardError::InvalidInput(format!(
                "stream ended after {} of {} bytes",
                self.boundaries.consumed(),
                self.declared_size
            )));
        }

        let status = if failure.is_none() {
            FileStatus::Complete
        } else {
            FileStatus::Failed
        };

        if self.placed > 0 {
            if let Err(error) = self.operation.files.set_status(&self.filename, status).await {
                tracing::error!(
                    "Failed to mark upload of {} as {}: {}",
                    self.filename,
                    status.as_str(),
                    error
                );
            }
        }

        match &failure {
            None => tracing::info!(
                "Upload of {} complete: bytes={} fragments={}",
                self.filename,
                self.boundaries.consumed(),
                self.placed
            ),
            Some(error) => tracing::warn!(
                "Upload of {} failed after {} bytes in {} fragments: {}",
                self.filename,
                self.boundaries.consumed(),
                self.placed,
                error
            ),
        }

        UploadFileOperationResult {
            filename: self.filename,
            status,
            declared_size: self.declared_size,
            bytes_received: self.boundaries.consumed(),
            fragment_count: self.placed,
            failure,
        }
    }
}
