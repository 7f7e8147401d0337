use crate::config::{IngressConfig, NodeConfig};
use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use shardio_core::{
    CleanupFailedOperation, ClusterClient, DeleteFileOperation, DownloadFileOperation, ErrorKind,
    FragmentRegistry, FragmentStore, FragmentTransport, InternalGetFragmentOperation,
    InternalPutFragmentOperation, NodeRegistry, Result, ShardError, UploadFileOperation,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::interval;

mod external;
mod internal;
mod types;

use external::{
    ingress_health, v1_delete_file, v1_get_file, v1_list_files, v1_nodes, ws_download, ws_upload,
};
use internal::{
    internal_delete_fragment, internal_get_fragment, internal_put_fragment, internal_register_node,
    node_health,
};
pub(crate) use types::*;

pub struct IngressState {
    pub(crate) nodes: Arc<NodeRegistry>,
    pub(crate) files: Arc<FragmentRegistry>,
    pub(crate) transport: Arc<dyn FragmentTransport>,
    pub(crate) upload_file_operation: Arc<UploadFileOperation>,
    pub(crate) download_file_operation: Arc<DownloadFileOperation>,
    pub(crate) delete_file_operation: Arc<DeleteFileOperation>,
    pub(crate) session_buffer: usize,
}

pub struct NodeState {
    pub(crate) advertise_addr: String,
    pub(crate) store: Arc<FragmentStore>,
    pub(crate) internal_put_fragment_operation: Arc<InternalPutFragmentOperation>,
    pub(crate) internal_get_fragment_operation: Arc<InternalGetFragmentOperation>,
}

pub fn build_ingress_state(config: &IngressConfig) -> Result<Arc<IngressState>> {
    let nodes = Arc::new(NodeRegistry::new());
    let files = Arc::new(FragmentRegistry::open(config.snapshot_path.clone())?);
    let transport: Arc<dyn FragmentTransport> =
        Arc::new(ClusterClient::with_write_buffer(config.session_buffer));

    let upload_file_operation = Arc::new(UploadFileOperation::new(
        nodes.clone(),
        files.clone(),
        transport.clone(),
        config.fanout,
    ));
    let download_file_operation = Arc::new(DownloadFileOperation::new(
        files.clone(),
        transport.clone(),
    ));
    let delete_file_operation = Arc::new(DeleteFileOperation::new(
        files.clone(),
        transport.clone(),
        upload_file_operation.claims(),
    ));

    Ok(Arc::new(IngressState {
        nodes,
        files,
        transport,
        upload_file_operation,
        download_file_operation,
        delete_file_operation,
        session_buffer: config.session_buffer,
    }))
}

pub fn ingress_router(state: Arc<IngressState>) -> Router {
    Router::new()
        .route("/health", get(ingress_health))
        .route("/upload/:filename", get(ws_upload))
        .route("/download/:filename", get(ws_download))
        .route("/api/v1/nodes", get(v1_nodes))
        .route("/api/v1/files", get(v1_list_files))
        .route(
            "/api/v1/files/:filename",
            get(v1_get_file).delete(v1_delete_file),
        )
        .route("/internal/v1/nodes", post(internal_register_node))
        .with_state(state)
}

pub async fn run_ingress(config: IngressConfig) -> Result<()> {
    let state = build_ingress_state(&config)?;

    let sweeper = CleanupFailedOperation::new(state.files.clone(), state.transport.clone())
        .spawn(config.cleanup_interval());

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Shardio ingress listening on {}", config.bind_addr);

    let served = axum::serve(listener, ingress_router(state))
        .await
        .map_err(|error| ShardError::Transport(error.to_string()));
    sweeper.abort();
    served
}

pub fn build_node_state(config: &NodeConfig) -> Result<Arc<NodeState>> {
    let store = Arc::new(FragmentStore::with_read_window(
        config.fragments_dir.clone(),
        config.read_window_bytes,
    )?);

    Ok(Arc::new(NodeState {
        advertise_addr: config.advertise_address().to_string(),
        internal_put_fragment_operation: Arc::new(InternalPutFragmentOperation::new(
            store.clone(),
        )),
        internal_get_fragment_operation: Arc::new(InternalGetFragmentOperation::new(
            store.clone(),
        )),
        store,
    }))
}

pub fn node_router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/health", get(node_health))
        .route(
            "/internal/v1/fragments/:index",
            put(internal_put_fragment)
                .get(internal_get_fragment)
                .delete(internal_delete_fragment),
        )
        .with_state(state)
}

pub async fn run_node(config: NodeConfig) -> Result<()> {
    let state = build_node_state(&config)?;

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        "Shardio node listening on {} (advertised as {}), fragments in {}",
        config.bind_addr,
        state.advertise_addr,
        config.fragments_dir.display()
    );

    let client = ClusterClient::new();
    match register_with_ingress(&client, &config.ingress_addr, &state.advertise_addr).await {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::Transport => {
            tracing::warn!(
                "Ingress {} unreachable, will retry registration: {}",
                config.ingress_addr,
                error
            );
        }
        Err(error) => return Err(error),
    }

    // An ingress keeps membership in memory, so re-announce in case it restarted.
    {
        let ingress_addr = config.ingress_addr.clone();
        let advertise_addr = state.advertise_addr.clone();
        let period = config.registration_interval();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(error) =
                    register_with_ingress(&client, &ingress_addr, &advertise_addr).await
                {
                    tracing::warn!("Failed to refresh node registration: {}", error);
                }
            }
        });
    }

    axum::serve(listener, node_router(state))
        .await
        .map_err(|error| ShardError::Transport(error.to_string()))?;

    Ok(())
}

/// Register with the ingress, treating an existing registration as success.
pub(crate) async fn register_with_ingress(
    client: &ClusterClient,
    ingress_addr: &str,
    address: &str,
) -> Result<()> {
    match client.register_node(ingress_addr, address).await {
        Ok(()) => {
            tracing::info!("Registered with ingress {} as {}", ingress_addr, address);
            Ok(())
        }
        Err(ShardError::AlreadyRegistered(_)) => {
            tracing::debug!("Node {} already registered with {}", address, ingress_addr);
            Ok(())
        }
        Err(error) => Err(error),
    }
}

pub(crate) fn response_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

pub(crate) fn error_status(error: &ShardError) -> StatusCode {
    match error.kind() {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::Transport | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn shard_error_response(error: ShardError) -> Response {
    response_error(error_status(&error), error.to_string())
}
