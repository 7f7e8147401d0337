pub mod cleanup_failed;
pub mod delete_file;
pub mod download_file;
pub mod internal_get_fragment;
pub mod internal_put_fragment;
pub mod upload_file;

pub use cleanup_failed::{
    CleanupFailedOperation, CleanupFailedOperationResult, DEFAULT_CLEANUP_INTERVAL, ReclaimReport,
};
pub use delete_file::{DeleteFileOperation, DeleteFileOperationRequest, DeleteFileOperationResult};
pub use download_file::{
    DownloadFileOperation, DownloadFileOperationOutcome, DownloadFileOperationRequest,
};
pub use internal_get_fragment::{
    InternalGetFragmentOperation, InternalGetFragmentOperationOutcome,
    InternalGetFragmentOperationRequest,
};
pub use internal_put_fragment::{
    InternalPutFragmentOperation, InternalPutFragmentOperationRequest,
    InternalPutFragmentOperationResult,
};
pub use upload_file::{
    DEFAULT_FANOUT, FragmentBoundaries, InboundFrame, InboundFrames, UploadClaim, UploadClaims,
    UploadFileOperation, UploadFileOperationRequest, UploadFileOperationResult,
    parse_size_announcement,
};
