use super::cleanup_failed::{ReclaimReport, reclaim_fragments};
use super::upload_file::UploadClaims;
use crate::{FileStatus, FragmentRegistry, FragmentTransport, Result, ShardError};
use std::sync::Arc;

#[derive(Clone)]
pub struct DeleteFileOperation {
    files: Arc<FragmentRegistry>,
    transport: Arc<dyn FragmentTransport>,
    claims: UploadClaims,
}

#[derive(Debug, Clone)]
pub struct DeleteFileOperationRequest {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFileOperationResult {
    pub filename: String,
    pub previous_status: FileStatus,
    pub reclaim: ReclaimReport,
}

impl DeleteFileOperation {
    /// `claims` must be the set the upload operation streams under.
    pub fn new(
        files: Arc<FragmentRegistry>,
        transport: Arc<dyn FragmentTransport>,
        claims: UploadClaims,
    ) -> Self {
        Self {
            files,
            transport,
            claims,
        }
    }

    /// Delete a file and its fragments.
    ///
    /// Refused while an upload of the same name is streaming. An `Incomplete`
    /// record with no live session was left by an interrupted ingress and is
    /// deleted like any other.
    pub async fn run(&self, request: DeleteFileOperationRequest) -> Result<DeleteFileOperationResult> {
        let DeleteFileOperationRequest { filename } = request;

        let _claim = self.claims.try_claim(&filename)?.ok_or_else(|| {
            ShardError::InvalidInput(format!("upload of {} is still in progress", filename))
        })?;

        let record = self
            .files
            .get(&filename)
            .await
            .ok_or_else(|| ShardError::FileNotFound(filename.clone()))?;

        if record.status == FileStatus::Incomplete {
            tracing::warn!("Deleting stale incomplete upload {}", filename);
        }

        let reclaim = reclaim_fragments(self.transport.as_ref(), &record).await;
        self.files.delete(&filename).await?;

        tracing::info!(
            "Deleted {} (was {}): deletes={} failed={}",
            filename,
            record.status.as_str(),
            reclaim.deletes_issued,
            reclaim.deletes_failed
        );

        Ok(DeleteFileOperationResult {
            filename,
            previous_status: record.status,
            reclaim,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LocalCluster, inbound};
    use crate::{DEFAULT_FANOUT, UploadFileOperation, UploadFileOperationRequest};
    use bytes::Bytes;

    #[tokio::test]
    async fn test_delete_complete_file_reclaims_fragments() {
        let cluster = LocalCluster::new(&["A", "B"]).await;
        let upload = UploadFileOperation::new(
            cluster.nodes.clone(),
            cluster.files.clone(),
            cluster.transport.clone(),
            DEFAULT_FANOUT,
        );
        upload
            .run(UploadFileOperationRequest {
                filename: "report".to_string(),
                frames: inbound(r#"{"size": 6}"#, &[b"ab", b"cd", b"ef"]),
            })
            .await
            .unwrap();
        let record = cluster.files.get("report").await.unwrap();

        let op = DeleteFileOperation::new(
            cluster.files.clone(),
            cluster.transport.clone(),
            upload.claims(),
        );
        let result = op
            .run(DeleteFileOperationRequest {
                filename: "report".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(result.previous_status, FileStatus::Complete);
        assert_eq!(result.reclaim.deletes_issued, record.addresses.len());
        assert_eq!(result.reclaim.deletes_failed, 0);
        assert!(cluster.files.get("report").await.is_none());
        for (index, address) in record.addresses.iter().enumerate() {
            assert!(!cluster.stores[address].exists("report", index as u32).await);
        }
    }

    #[tokio::test]
    async fn test_delete_rejects_missing_and_in_flight() {
        let cluster = LocalCluster::new(&["A"]).await;
        let claims = UploadClaims::new();
        let op = DeleteFileOperation::new(
            cluster.files.clone(),
            cluster.transport.clone(),
            claims.clone(),
        );

        let missing = op
            .run(DeleteFileOperationRequest {
                filename: "ghost".to_string(),
            })
            .await;
        assert!(matches!(missing, Err(ShardError::FileNotFound(_))));

        cluster.files.append_fragment("busy", "A").await.unwrap();
        let held = claims.try_claim("busy").unwrap().unwrap();
        let busy = op
            .run(DeleteFileOperationRequest {
                filename: "busy".to_string(),
            })
            .await;
        assert!(matches!(busy, Err(ShardError::InvalidInput(_))));
        assert!(cluster.files.get("busy").await.is_some());
        assert!(cluster.transport.delete_calls().is_empty());

        drop(held);
        op.run(DeleteFileOperationRequest {
            filename: "busy".to_string(),
        })
        .await
        .unwrap();
        assert!(cluster.files.get("busy").await.is_none());
    }

    #[tokio::test]
    async fn test_stale_incomplete_record_is_cleared_after_restart() {
        let cluster = LocalCluster::new(&["A"]).await;
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("fragments.json");

        {
            let files = FragmentRegistry::open(snapshot.clone()).unwrap();
            files.append_fragment("stuck", "A").await.unwrap();
            cluster.stores["A"]
                .put("stuck", 0, Bytes::from_static(b"half"))
                .await
                .unwrap();
        }

        let files = Arc::new(FragmentRegistry::open(snapshot.clone()).unwrap());
        assert_eq!(
            files.get("stuck").await.unwrap().status,
            FileStatus::Incomplete
        );

        let upload = UploadFileOperation::new(
            cluster.nodes.clone(),
            files.clone(),
            cluster.transport.clone(),
            DEFAULT_FANOUT,
        );
        let delete =
            DeleteFileOperation::new(files.clone(), cluster.transport.clone(), upload.claims());

        let result = delete
            .run(DeleteFileOperationRequest {
                filename: "stuck".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(result.previous_status, FileStatus::Incomplete);
        assert_eq!(result.reclaim.deletes_issued, 1);
        assert!(!cluster.stores["A"].exists("stuck", 0).await);

        let reopened = FragmentRegistry::open(snapshot).unwrap();
        assert!(reopened.get("stuck").await.is_none());

        let again = upload
            .run(UploadFileOperationRequest {
                filename: "stuck".to_string(),
                frames: inbound(r#"{"size": 4}"#, &[b"full"]),
            })
            .await
            .unwrap();
        assert_eq!(again.status, FileStatus::Complete);
    }
}
