use super::{
    FragmentQuery, FragmentResponse, HealthResponse, IngressState, NodeItem, NodeState,
    response_error, shard_error_response,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, TryStreamExt};
use shardio_core::{
    InternalGetFragmentOperationOutcome, InternalGetFragmentOperationRequest,
    InternalPutFragmentOperationRequest, RegisterNodeRequest, ShardError,
};
use std::sync::Arc;

pub(crate) async fn internal_register_node(
    State(state): State<Arc<IngressState>>,
    Json(request): Json<RegisterNodeRequest>,
) -> impl IntoResponse {
    match state.nodes.register(&request.address).await {
        Ok(node) => (
            StatusCode::OK,
            Json(NodeItem {
                address: node.address,
            }),
        )
            .into_response(),
        Err(error) => shard_error_response(error),
    }
}

pub(crate) async fn node_health(State(state): State<Arc<NodeState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        role: "node".to_string(),
        address: Some(state.advertise_addr.clone()),
        nodes: None,
    })
}

pub(crate) async fn internal_put_fragment(
    State(state): State<Arc<NodeState>>,
    Path(index): Path<u32>,
    Query(query): Query<FragmentQuery>,
    body: Body,
) -> impl IntoResponse {
    let chunks = body
        .into_data_stream()
        .map_err(|error| ShardError::Transport(error.to_string()))
        .boxed();

    let result = state
        .internal_put_fragment_operation
        .run(InternalPutFragmentOperationRequest {
            filename: query.filename.clone(),
            index,
            chunks,
        })
        .await;

    match result {
        Ok(result) => (
            StatusCode::OK,
            Json(FragmentResponse {
                filename: query.filename,
                index,
                bytes: Some(result.bytes),
            }),
        )
            .into_response(),
        Err(error) => {
            tracing::warn!(
                "Fragment write rejected: filename={} index={} error={}",
                query.filename,
                index,
                error
            );
            shard_error_response(error)
        }
    }
}

pub(crate) async fn internal_get_fragment(
    State(state): State<Arc<NodeState>>,
    Path(index): Path<u32>,
    Query(query): Query<FragmentQuery>,
) -> impl IntoResponse {
    let result = state
        .internal_get_fragment_operation
        .run(InternalGetFragmentOperationRequest {
            filename: query.filename,
            index,
        })
        .await;

    match result {
        Ok(InternalGetFragmentOperationOutcome::Found(reader)) => {
            let mut response = Response::new(Body::from_stream(reader.into_stream()));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            response
        }
        Ok(InternalGetFragmentOperationOutcome::NotFound) => {
            response_error(StatusCode::NOT_FOUND, "fragment not found")
        }
        Err(error) => shard_error_response(error),
    }
}

pub(crate) async fn internal_delete_fragment(
    State(state): State<Arc<NodeState>>,
    Path(index): Path<u32>,
    Query(query): Query<FragmentQuery>,
) -> impl IntoResponse {
    match state.store.delete(&query.filename, index).await {
        Ok(()) => (
            StatusCode::OK,
            Json(FragmentResponse {
                filename: query.filename,
                index,
                bytes: None,
            }),
        )
            .into_response(),
        Err(error) => shard_error_response(error),
    }
}
