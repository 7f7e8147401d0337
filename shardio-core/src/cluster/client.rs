use super::types::{FragmentChunks, FragmentFrame, FragmentSink, FragmentTransport};
use crate::error::{Result, ShardError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response, StatusCode, Url, header};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Frames buffered per open write session before `send` waits on the node.
pub const DEFAULT_WRITE_BUFFER: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterNodeRequest {
    pub address: String,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: String,
}

/// HTTP client for the node-facing RPC surface and for node registration.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
    write_buffer: usize,
}

impl Default for ClusterClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterClient {
    pub fn new() -> Self {
        Self::with_write_buffer(DEFAULT_WRITE_BUFFER)
    }

    pub fn with_write_buffer(write_buffer: usize) -> Self {
        Self {
            client: Client::new(),
            write_buffer: write_buffer.max(1),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Announce `address` to the ingress at `ingress_addr`.
    pub async fn register_node(&self, ingress_addr: &str, address: &str) -> Result<()> {
        let url = Url::parse(&format!("http://{}/internal/v1/nodes", ingress_addr))
            .map_err(|error| ShardError::Transport(error.to_string()))?;

        let response = self
            .client
            .post(url)
            .json(&RegisterNodeRequest {
                address: address.to_string(),
            })
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(ShardError::AlreadyRegistered(address.to_string())),
            StatusCode::BAD_REQUEST => Err(ShardError::InvalidAddress(address.to_string())),
            status => Err(ShardError::Transport(format!(
                "node registration failed: ingress={} status={} error={}",
                ingress_addr,
                status,
                error_message(response).await
            ))),
        }
    }

    fn fragment_url(&self, address: &str, filename: &str, index: u32) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "http://{}/internal/v1/fragments/{}",
            address, index
        ))
        .map_err(|error| ShardError::Transport(error.to_string()))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("filename", filename);
        }

        Ok(url)
    }
}

#[async_trait]
impl FragmentTransport for ClusterClient {
    async fn open_write(
        &self,
        address: &str,
        filename: &str,
        index: u32,
    ) -> Result<Box<dyn FragmentSink>> {
        let url = self.fragment_url(address, filename, index)?;
        let (sender, receiver) =
            mpsc::channel::<std::result::Result<Bytes, std::io::Error>>(self.write_buffer);

        let body = reqwest::Body::wrap_stream(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        }));

        let request = self
            .client
            .put(url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(body);

        let target = address.to_string();
        let name = filename.to_string();
        let handle = tokio::spawn(async move {
            let response = request.send().await?;
            expect_fragment_success(response, &target, &name, index).await
        });

        tracing::debug!("Opened write session for fragment {} of {} on {}", index, filename, address);

        Ok(Box::new(HttpFragmentSink {
            address: address.to_string(),
            filename: filename.to_string(),
            index,
            sender: Some(sender),
            request: Some(handle),
        }))
    }

    async fn read_fragment(
        &self,
        address: &str,
        filename: &str,
        index: u32,
    ) -> Result<FragmentChunks> {
        let url = self.fragment_url(address, filename, index)?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(fragment_status_error(response, address, filename, index).await);
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ShardError::from))
            .boxed())
    }

    async fn delete_fragment(&self, address: &str, filename: &str, index: u32) -> Result<()> {
        let url = self.fragment_url(address, filename, index)?;
        let response = self.client.delete(url).send().await?;
        expect_fragment_success(response, address, filename, index).await
    }
}

struct HttpFragmentSink {
    address: String,
    filename: String,
    index: u32,
    sender: Option<mpsc::Sender<std::result::Result<Bytes, std::io::Error>>>,
    request: Option<JoinHandle<Result<()>>>,
}

impl HttpFragmentSink {
    async fn finish(&mut self) -> Result<()> {
        self.sender.take();

        match self.request.take() {
            Some(handle) => handle.await.map_err(|error| {
                ShardError::Internal(format!("fragment write task failed: {}", error))
            })?,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FragmentSink for HttpFragmentSink {
    async fn send(&mut self, frame: FragmentFrame) -> Result<()> {
        if frame.filename != self.filename || frame.index != self.index {
            return Err(ShardError::Internal(format!(
                "frame for {}#{} sent on write session for {}#{}",
                frame.filename, frame.index, self.filename, self.index
            )));
        }

        let Some(sender) = self.sender.as_ref() else {
            return Err(ShardError::Internal(
                "fragment write session already closed".to_string(),
            ));
        };

        if sender.send(Ok(frame.payload)).await.is_ok() {
            return Ok(());
        }

        // The request finished before the body did, so surface its outcome.
        match self.finish().await {
            Err(error) => Err(error),
            Ok(()) => Err(ShardError::Transport(format!(
                "node {} closed write session for {}#{} early",
                self.address, self.filename, self.index
            ))),
        }
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.finish().await
    }
}

async fn expect_fragment_success(
    response: Response,
    address: &str,
    filename: &str,
    index: u32,
) -> Result<()> {
    if response.status().is_success() {
        return Ok(());
    }

    Err(fragment_status_error(response, address, filename, index).await)
}

async fn fragment_status_error(
    response: Response,
    address: &str,
    filename: &str,
    index: u32,
) -> ShardError {
    match response.status() {
        StatusCode::NOT_FOUND => ShardError::FragmentNotFound {
            filename: filename.to_string(),
            index,
        },
        StatusCode::CONFLICT => ShardError::FragmentExists {
            filename: filename.to_string(),
            index,
        },
        StatusCode::BAD_REQUEST => ShardError::InvalidInput(error_message(response).await),
        status => ShardError::Transport(format!(
            "fragment rpc failed: node={} status={} fragment={}#{} error={}",
            address,
            status,
            filename,
            index,
            error_message(response).await
        )),
    }
}

async fn error_message(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorPayload>(&text)
        .map(|payload| payload.error)
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_url_encodes_filename() {
        let client = ClusterClient::new();
        let url = client
            .fragment_url("10.0.0.7:6571", "my report&v=2.pdf", 4)
            .unwrap();

        assert_eq!(url.path(), "/internal/v1/fragments/4");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![("filename".to_string(), "my report&v=2.pdf".to_string())]
        );
    }

    #[test]
    fn test_register_request_is_exported_at_crate_root() {
        let request = crate::RegisterNodeRequest {
            address: "10.0.0.7:6571".to_string(),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body, serde_json::json!({ "address": "10.0.0.7:6571" }));
    }

    #[tokio::test]
    async fn test_unreachable_node_surfaces_transport_error() {
        let client = ClusterClient::new();
        let result = client.delete_fragment("127.0.0.1:1", "f", 0).await;
        assert!(matches!(result, Err(ShardError::Transport(_))));
    }
}
