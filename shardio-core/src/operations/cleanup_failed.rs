use crate::{FileRecord, FragmentRegistry, FragmentTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

/// Outcome of reclaiming one file's fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub deletes_issued: usize,
    pub deletes_failed: usize,
}

/// Delete a file's fragments in index order, stopping at the first failure.
///
/// Fragments after a failed delete are left where they are.
pub(crate) async fn reclaim_fragments(
    transport: &dyn FragmentTransport,
    record: &FileRecord,
) -> ReclaimReport {
    let mut report = ReclaimReport::default();

    for (index, address) in record.addresses.iter().enumerate() {
        report.deletes_issued += 1;
        if let Err(error) = transport
            .delete_fragment(address, &record.filename, index as u32)
            .await
        {
            report.deletes_failed += 1;
            tracing::warn!(
                "Failed to delete fragment {} of {} on {}, leaving the rest: {}",
                index,
                record.filename,
                address,
                error
            );
            break;
        }
    }

    report
}

#[derive(Clone)]
pub struct CleanupFailedOperation {
    files: Arc<FragmentRegistry>,
    transport: Arc<dyn FragmentTransport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupFailedOperationResult {
    pub files_reclaimed: usize,
    pub deletes_issued: usize,
    pub deletes_failed: usize,
    /// Records dropped from memory whose snapshot write failed.
    pub registry_errors: usize,
}

impl CleanupFailedOperation {
    pub fn new(files: Arc<FragmentRegistry>, transport: Arc<dyn FragmentTransport>) -> Self {
        Self { files, transport }
    }

    /// One sweep over every `Failed` record.
    ///
    /// A registry write failure is logged and the sweep moves on to the next
    /// record.
    pub async fn run(&self) -> CleanupFailedOperationResult {
        let mut result = CleanupFailedOperationResult::default();

        for record in self.files.failed().await {
            let report = reclaim_fragments(self.transport.as_ref(), &record).await;
            result.deletes_issued += report.deletes_issued;
            result.deletes_failed += report.deletes_failed;

            match self.files.delete(&record.filename).await {
                Ok(()) => result.files_reclaimed += 1,
                Err(error) => {
                    result.registry_errors += 1;
                    tracing::error!(
                        "Failed to remove record {} during cleanup: {}",
                        record.filename,
                        error
                    );
                }
            }
        }

        result
    }

    /// Run a sweep every `interval` until the task is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let result = self.run().await;
                if result.files_reclaimed > 0 || result.registry_errors > 0 {
                    tracing::info!(
                        "Cleanup sweep reclaimed {} failed uploads: deletes={} failed={} registry_errors={}",
                        result.files_reclaimed,
                        result.deletes_issued,
                        result.deletes_failed,
                        result.registry_errors
                    );
                }
            }
        })
    }
}
