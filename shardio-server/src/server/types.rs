use serde::{Deserialize, Serialize};
use shardio_core::{
    DeleteFileOperationResult, FileRecord, FileStatus, ShardError, UploadFileOperationResult,
};

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: String,
    pub(crate) role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) nodes: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NodesResponse {
    pub(crate) nodes: Vec<NodeItem>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NodeItem {
    pub(crate) address: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct FilesResponse {
    pub(crate) files: Vec<FileItem>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FileItem {
    pub(crate) filename: String,
    pub(crate) status: FileStatus,
    pub(crate) fragments: usize,
    pub(crate) addresses: Vec<String>,
    pub(crate) updated_at: String,
}

impl From<FileRecord> for FileItem {
    fn from(record: FileRecord) -> Self {
        Self {
            fragments: record.fragment_count(),
            updated_at: record.updated_at.to_rfc3339(),
            filename: record.filename,
            status: record.status,
            addresses: record.addresses,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteFileResponse {
    pub(crate) filename: String,
    pub(crate) previous_status: FileStatus,
    pub(crate) deletes_issued: usize,
    pub(crate) deletes_failed: usize,
}

impl From<DeleteFileOperationResult> for DeleteFileResponse {
    fn from(result: DeleteFileOperationResult) -> Self {
        Self {
            filename: result.filename,
            previous_status: result.previous_status,
            deletes_issued: result.reclaim.deletes_issued,
            deletes_failed: result.reclaim.deletes_failed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FragmentQuery {
    pub(crate) filename: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct FragmentResponse {
    pub(crate) filename: String,
    pub(crate) index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) bytes: Option<u64>,
}

/// Final text message of an upload session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct UploadReply {
    pub(crate) filename: String,
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) declared_size: u64,
    #[serde(default)]
    pub(crate) bytes_received: u64,
    #[serde(default)]
    pub(crate) fragments: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

pub(crate) const UPLOAD_REJECTED: &str = "rejected";

impl UploadReply {
    pub(crate) fn rejected(filename: &str, error: &ShardError) -> Self {
        Self {
            filename: filename.to_string(),
            status: UPLOAD_REJECTED.to_string(),
            declared_size: 0,
            bytes_received: 0,
            fragments: 0,
            error: Some(error.to_string()),
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.status == FileStatus::Complete.as_str()
    }
}

impl From<&UploadFileOperationResult> for UploadReply {
    fn from(result: &UploadFileOperationResult) -> Self {
        Self {
            filename: result.filename.clone(),
            status: result.status.as_str().to_string(),
            declared_size: result.declared_size,
            bytes_received: result.bytes_received,
            fragments: result.fragment_count,
            error: result.failure.as_ref().map(|error| error.to_string()),
        }
    }
}
