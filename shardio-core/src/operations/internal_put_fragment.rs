use crate::{FragmentChunks, FragmentStore, Result};
use bytes::BytesMut;
use futures::StreamExt;
use std::sync::Arc;

#[derive(Clone)]
pub struct InternalPutFragmentOperation {
    store: Arc<FragmentStore>,
}

pub struct InternalPutFragmentOperationRequest {
    pub filename: String,
    pub index: u32,
    pub chunks: FragmentChunks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalPutFragmentOperationResult {
    pub bytes: u64,
}

impl InternalPutFragmentOperation {
    pub fn new(store: Arc<FragmentStore>) -> Self {
        Self { store }
    }

    /// Drain a write session and store it as one blob once the stream ends.
    ///
    /// Nothing is written when the stream errors before its end.
    pub async fn run(
        &self,
        request: InternalPutFragmentOperationRequest,
    ) -> Result<InternalPutFragmentOperationResult> {
        let InternalPutFragmentOperationRequest {
            filename,
            index,
            mut chunks,
        } = request;

        self.store.fragment_path(&filename, index)?;

        let mut body = BytesMut::new();
        while let Some(chunk) = chunks.next().await {
            body.extend_from_slice(&chunk?);
        }

        let bytes = body.len() as u64;
        self.store.put(&filename, index, body.freeze()).await?;

        Ok(InternalPutFragmentOperationResult { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShardError;
    use bytes::Bytes;
    use futures::stream;

    fn chunks(items: Vec<Result<Bytes>>) -> FragmentChunks {
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_put_collects_stream_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FragmentStore::new(dir.path().to_path_buf()).unwrap());
        let op = InternalPutFragmentOperation::new(store.clone());

        let result = op
            .run(InternalPutFragmentOperationRequest {
                filename: "movie.mp4".to_string(),
                index: 2,
                chunks: chunks(vec![
                    Ok(Bytes::from_static(b"hello ")),
                    Ok(Bytes::from_static(b"world")),
                ]),
            })
            .await
            .unwrap();
        assert_eq!(result.bytes, 11);

        let mut reader = store.open("movie.mp4", 2).await.unwrap();
        assert_eq!(
            reader.next_window().await.unwrap().unwrap().as_ref(),
            b"hello world"
        );

        let again = op
            .run(InternalPutFragmentOperationRequest {
                filename: "movie.mp4".to_string(),
                index: 2,
                chunks: chunks(vec![Ok(Bytes::from_static(b"other"))]),
            })
            .await;
        assert!(matches!(again, Err(ShardError::FragmentExists { index: 2, .. })));
    }

    #[tokio::test]
    async fn test_broken_stream_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FragmentStore::new(dir.path().to_path_buf()).unwrap());
        let op = InternalPutFragmentOperation::new(store.clone());

        let result = op
            .run(InternalPutFragmentOperationRequest {
                filename: "cut".to_string(),
                index: 0,
                chunks: chunks(vec![
                    Ok(Bytes::from_static(b"part")),
                    Err(ShardError::Transport("connection reset".to_string())),
                ]),
            })
            .await;

        assert!(matches!(result, Err(ShardError::Transport(_))));
        assert!(!store.exists("cut", 0).await);
    }
}
