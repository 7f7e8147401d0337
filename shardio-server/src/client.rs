use crate::server::UploadReply;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::json;
use shardio_core::{Result, ShardError};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message, http::StatusCode},
};

pub(crate) const DEFAULT_FRAME_SIZE: usize = 128 * 1024;

fn ws_error(error: WsError) -> ShardError {
    ShardError::Transport(error.to_string())
}

/// Websocket URL for `route` on the ingress with `filename` as one escaped segment.
fn session_url(api_server: &str, route: &str, filename: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("ws://{}/", api_server))
        .map_err(|error| ShardError::InvalidInput(format!("invalid api server {}: {}", api_server, error)))?;

    url.path_segments_mut()
        .map_err(|_| ShardError::InvalidInput(format!("invalid api server: {}", api_server)))?
        .clear()
        .push(route)
        .push(filename);

    Ok(url)
}

/// Stream `src` to the ingress and return its session reply.
pub(crate) async fn upload_file(src: &Path, api_server: &str, frame_size: usize) -> Result<UploadReply> {
    let filename = src
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ShardError::InvalidInput(format!("invalid source path: {}", src.display())))?
        .to_string();

    let mut file = tokio::fs::File::open(src).await?;
    let size = file.metadata().await?.len();

    let url = session_url(api_server, "upload", &filename)?;
    let (socket, _) = connect_async(url.as_str()).await.map_err(ws_error)?;
    let (mut sink, mut stream) = socket.split();

    sink.send(Message::Text(json!({ "size": size }).to_string()))
        .await
        .map_err(ws_error)?;

    // The ingress may reject the upload early; stop sending and read its reply.
    let mut buf = vec![0u8; frame_size.max(1)];
    let mut send_error = None;
    loop {
        let read = file.read(&mut buf).await?;
        if let Err(error) = sink.send(Message::Binary(buf[..read].to_vec())).await {
            send_error = Some(ws_error(error));
            break;
        }
        if read == 0 {
            break;
        }
    }

    while let Some(message) = stream.next().await {
        match message.map_err(ws_error)? {
            Message::Text(text) => {
                let reply: UploadReply = serde_json::from_str(&text)?;
                tracing::info!(
                    "Upload {} finished: status={} bytes={} fragments={}",
                    reply.filename,
                    reply.status,
                    reply.bytes_received,
                    reply.fragments
                );
                return Ok(reply);
            }
            Message::Close(_) => break,
            _ => continue,
        }
    }

    Err(send_error.unwrap_or_else(|| {
        ShardError::Transport(format!("ingress closed upload of {} without a reply", filename))
    }))
}

/// Fetch `name` from the ingress into `dst`, returning the bytes written.
pub(crate) async fn download_file(name: &str, dst: &Path, api_server: &str) -> Result<u64> {
    let url = session_url(api_server, "download", name)?;
    let (mut socket, _) = match connect_async(url.as_str()).await {
        Ok(connected) => connected,
        Err(WsError::Http(response)) if response.status() == StatusCode::NOT_FOUND => {
            return Err(ShardError::FileNotFound(name.to_string()));
        }
        Err(error) => return Err(ws_error(error)),
    };

    let mut file = tokio::fs::File::create(dst).await?;
    let mut written = 0u64;

    while let Some(message) = socket.next().await {
        match message.map_err(ws_error)? {
            Message::Binary(payload) if payload.is_empty() => {
                file.flush().await?;
                tracing::info!("Downloaded {} ({} bytes) to {}", name, written, dst.display());
                return Ok(written);
            }
            Message::Binary(payload) => {
                file.write_all(&payload).await?;
                written += payload.len() as u64;
            }
            Message::Close(_) => break,
            _ => continue,
        }
    }

    Err(ShardError::Transport(format!(
        "download of {} ended after {} bytes without end marker",
        name, written
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_url_escapes_filename() {
        let url = session_url("127.0.0.1:8000", "upload", "a#b?c d.txt").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/upload/a%23b%3Fc%20d.txt");
        assert!(url.fragment().is_none());
        assert!(url.query().is_none());

        let url = session_url("127.0.0.1:8000", "download", "plain.bin").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/download/plain.bin");
    }
}
