use crate::{FragmentReader, FragmentStore, Result, ShardError};
use std::sync::Arc;

#[derive(Clone)]
pub struct InternalGetFragmentOperation {
    store: Arc<FragmentStore>,
}

#[derive(Debug, Clone)]
pub struct InternalGetFragmentOperationRequest {
    pub filename: String,
    pub index: u32,
}

pub enum InternalGetFragmentOperationOutcome {
    Found(FragmentReader),
    NotFound,
}

impl InternalGetFragmentOperation {
    pub fn new(store: Arc<FragmentStore>) -> Self {
        Self { store }
    }

    pub async fn run(
        &self,
        request: InternalGetFragmentOperationRequest,
    ) -> Result<InternalGetFragmentOperationOutcome> {
        match self.store.open(&request.filename, request.index).await {
            Ok(reader) => Ok(InternalGetFragmentOperationOutcome::Found(reader)),
            Err(ShardError::FragmentNotFound { .. }) => {
                Ok(InternalGetFragmentOperationOutcome::NotFound)
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_get_streams_in_windows() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FragmentStore::with_read_window(dir.path().to_path_buf(), 4).unwrap());
        store
            .put("log.txt", 0, Bytes::from_static(b"0123456789"))
            .await
            .unwrap();

        let op = InternalGetFragmentOperation::new(store);
        let outcome = op
            .run(InternalGetFragmentOperationRequest {
                filename: "log.txt".to_string(),
                index: 0,
            })
            .await
            .unwrap();
        let InternalGetFragmentOperationOutcome::Found(reader) = outcome else {
            panic!("fragment should exist");
        };

        let windows: Vec<Bytes> = reader
            .into_stream()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(
            windows,
            vec![
                Bytes::from_static(b"0123"),
                Bytes::from_static(b"4567"),
                Bytes::from_static(b"89"),
            ]
        );

        let missing = op
            .run(InternalGetFragmentOperationRequest {
                filename: "log.txt".to_string(),
                index: 1,
            })
            .await
            .unwrap();
        assert!(matches!(missing, InternalGetFragmentOperationOutcome::NotFound));
    }
}
