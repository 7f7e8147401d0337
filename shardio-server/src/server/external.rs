use super::{
    DeleteFileResponse, FileItem, FilesResponse, HealthResponse, IngressState, NodeItem,
    NodesResponse, UploadReply, response_error, shard_error_response,
};
use axum::{
    Json,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use shardio_core::{
    DeleteFileOperationRequest, DownloadFileOperationOutcome, DownloadFileOperationRequest,
    FileRecord, InboundFrame, ShardError, UploadFileOperationRequest, validate_filename,
};
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) async fn ingress_health(State(state): State<Arc<IngressState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        role: "ingress".to_string(),
        address: None,
        nodes: Some(state.nodes.len().await),
    })
}

pub(crate) async fn v1_nodes(State(state): State<Arc<IngressState>>) -> impl IntoResponse {
    let nodes = state
        .nodes
        .nodes()
        .await
        .into_iter()
        .map(|node| NodeItem {
            address: node.address,
        })
        .collect();

    (StatusCode::OK, Json(NodesResponse { nodes })).into_response()
}

pub(crate) async fn v1_list_files(State(state): State<Arc<IngressState>>) -> impl IntoResponse {
    let files = state
        .files
        .list()
        .await
        .into_iter()
        .map(FileItem::from)
        .collect();

    (StatusCode::OK, Json(FilesResponse { files })).into_response()
}

pub(crate) async fn v1_get_file(
    State(state): State<Arc<IngressState>>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    match state.files.get(&filename).await {
        Some(record) => (StatusCode::OK, Json(FileItem::from(record))).into_response(),
        None => response_error(StatusCode::NOT_FOUND, format!("file not found: {}", filename)),
    }
}

pub(crate) async fn v1_delete_file(
    State(state): State<Arc<IngressState>>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    let result = state
        .delete_file_operation
        .run(DeleteFileOperationRequest { filename })
        .await;

    match result {
        Ok(result) => (StatusCode::OK, Json(DeleteFileResponse::from(result))).into_response(),
        Err(error) => shard_error_response(error),
    }
}

pub(crate) async fn ws_upload(
    State(state): State<Arc<IngressState>>,
    Path(filename): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Err(error) = validate_filename(&filename) {
        return shard_error_response(error);
    }

    ws.on_upgrade(move |socket| upload_session(state, filename, socket))
        .into_response()
}

async fn upload_session(state: Arc<IngressState>, filename: String, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (sender, receiver) = mpsc::channel(state.session_buffer);

    let reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            let frame = match message {
                Ok(Message::Text(text)) => Ok(InboundFrame::Text(text)),
                Ok(Message::Binary(payload)) => Ok(InboundFrame::Binary(Bytes::from(payload))),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(error) => Err(ShardError::Transport(error.to_string())),
            };

            let broken = frame.is_err();
            if sender.send(frame).await.is_err() || broken {
                break;
            }
        }
    });

    let result = state
        .upload_file_operation
        .run(UploadFileOperationRequest {
            filename: filename.clone(),
            frames: receiver,
        })
        .await;
    reader.abort();

    let reply = match &result {
        Ok(result) => UploadReply::from(result),
        Err(error) => {
            tracing::warn!("Upload of {} rejected: {}", filename, error);
            UploadReply::rejected(&filename, error)
        }
    };

    match serde_json::to_string(&reply) {
        Ok(text) => {
            if let Err(error) = sink.send(Message::Text(text)).await {
                tracing::debug!("Upload client for {} left before reply: {}", filename, error);
            }
        }
        Err(error) => tracing::error!("Failed to encode upload reply: {}", error),
    }
    let _ = sink.send(Message::Close(None)).await;
}

pub(crate) async fn ws_download(
    State(state): State<Arc<IngressState>>,
    Path(filename): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let outcome = state
        .download_file_operation
        .run(DownloadFileOperationRequest {
            filename: filename.clone(),
        })
        .await;

    match outcome {
        Ok(DownloadFileOperationOutcome::Found(record)) => ws
            .on_upgrade(move |socket| download_session(state, record, socket))
            .into_response(),
        Ok(DownloadFileOperationOutcome::NotFound) => {
            response_error(StatusCode::NOT_FOUND, format!("file not found: {}", filename))
        }
        Err(error) => shard_error_response(error),
    }
}

async fn download_session(state: Arc<IngressState>, record: FileRecord, mut socket: WebSocket) {
    let (sender, mut receiver) = mpsc::channel::<Bytes>(state.session_buffer);

    let operation = state.download_file_operation.clone();
    let relay_record = record.clone();
    let relay = tokio::spawn(async move { operation.relay(&relay_record, &sender).await });

    while let Some(chunk) = receiver.recv().await {
        if let Err(error) = socket.send(Message::Binary(chunk.to_vec())).await {
            tracing::warn!("Download client for {} went away: {}", record.filename, error);
            break;
        }
    }
    drop(receiver);

    match relay.await {
        Ok(Ok(_)) => {}
        Ok(Err(error)) => {
            tracing::warn!("Download of {} aborted: {}", record.filename, error);
        }
        Err(error) => tracing::error!("Download relay task failed: {}", error),
    }
    let _ = socket.send(Message::Close(None)).await;
}
