//! REST API server for powledger
//!
//! Serves the ledger to clients and to peer nodes: transaction intake, mining,
//! block propagation, peer registration, consensus and lookups.

use axum::{
    extract::{Path, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::blockchain::{BlockAcceptance, ChainSnapshot};
use crate::error::ChainError;
use crate::network::{BlockReceipt, BulkNodesPayload, NewBlockPayload, NodeUrlPayload};
use crate::node::{Node, NodeState};
use crate::transaction::Transaction;

/// Shared handler state: the node plus request counters.
#[derive(Clone)]
pub struct ApiState {
    pub node: Arc<Node>,
    stats: Arc<RwLock<ApiStats>>,
}

impl ApiState {
    pub fn new(node: Arc<Node>) -> Self {
        Self {
            node,
            stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }
}

#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    transactions_submitted: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::StaleProof | ChainError::MiningCancelled => {
                ApiError::Conflict(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateTransactionRequest {
    pub amount: f64,
    pub sender: String,
    pub recipient: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionIntakeResponse {
    pub note: String,
    pub block_index: u64,
}

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub transactions_submitted: u64,
    pub uptime_seconds: u64,
    pub blocks_mined: u64,
    pub is_mining: bool,
    pub chain_length: usize,
    pub pending_transactions: usize,
    pub peer_count: usize,
}

// ============================================================================
// Middleware
// ============================================================================

async fn stats_middleware(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    state.stats.write().await.record_request(success);

    response
}

/// Logs method, path, status and duration of every request.
async fn logging_middleware(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let node_state = *state.node.state.read().await;
    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        node_state = ?node_state,
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints.
pub fn build_api_router(node: Arc<Node>) -> Router {
    let state = ApiState::new(node);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        // Ledger
        .route("/blockchain", get(get_blockchain))
        .route("/block/:hash", get(get_block))
        .route("/address/:address", get(get_address))
        // Transactions
        .route("/transaction", post(submit_transaction))
        .route("/transaction/broadcast", post(broadcast_transaction))
        .route("/transaction/:id", get(get_transaction))
        // Mining and block propagation
        .route("/mine", get(mine))
        .route("/receive-new-block", post(receive_new_block))
        // Peers
        .route("/register-and-broadcast-node", post(register_and_broadcast_node))
        .route("/register-node", post(register_node))
        .route("/register-nodes-bulk", post(register_nodes_bulk))
        .route("/consensus", get(consensus))
        // System
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        // logging before stats so we always record timing and node-state
        .layer(middleware::from_fn_with_state(state.clone(), logging_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), stats_middleware))
        .with_state(state)
        .layer(cors)
}

/// Serve the API on `0.0.0.0:<network.api_port>` until the process exits.
pub async fn run_api_server(node: Arc<Node>) -> Result<(), ChainError> {
    let port = node.config.network.api_port;
    let app = build_api_router(node);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    let node_state = *state.node.state.read().await;
    let (status, label) = if node_state == NodeState::Ready {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status,
        Json(json!({
            "status": label,
            "node_state": node_state,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

async fn get_blockchain(State(state): State<ApiState>) -> Json<ChainSnapshot> {
    Json(state.node.snapshot().await)
}

async fn get_block(
    State(state): State<ApiState>,
    Path(hash): Path<String>,
) -> impl IntoResponse {
    let chain = state.node.blockchain.read().await;
    let block = chain.find_block_by_hash(&hash).cloned();
    Json(json!({ "block": block }))
}

async fn get_transaction(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let chain = state.node.blockchain.read().await;
    let (transaction, block) = match chain.find_transaction(&id) {
        Some((tx, block)) => (Some(tx.clone()), Some(block.clone())),
        None => (None, None),
    };
    Json(json!({ "transaction": transaction, "block": block }))
}

async fn get_address(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    let summary = state.node.blockchain.read().await.address_summary(&address);
    Json(json!({ "addressData": summary }))
}

async fn submit_transaction(
    State(state): State<ApiState>,
    Json(tx): Json<Transaction>,
) -> Result<Json<TransactionIntakeResponse>, ApiError> {
    let block_index = state.node.submit_transaction(tx).await?;
    state.stats.write().await.transactions_submitted += 1;

    Ok(Json(TransactionIntakeResponse {
        note: format!("Transaction will be added in block {}.", block_index),
        block_index,
    }))
}

async fn broadcast_transaction(
    State(state): State<ApiState>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (transaction, block_index, peers) = state
        .node
        .create_and_broadcast_transaction(req.amount, &req.sender, &req.recipient)
        .await?;
    state.stats.write().await.transactions_submitted += 1;

    Ok(Json(json!({
        "note": format!(
            "Transaction created and broadcast to {} of {} peers.",
            peers.delivered(),
            peers.peers.len()
        ),
        "transaction": transaction,
        "blockIndex": block_index,
        "peers": peers
    })))
}

async fn mine(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.node.mine().await?;

    Ok(Json(json!({
        "note": format!(
            "New block mined and broadcast to {} of {} peers.",
            outcome.peers.delivered(),
            outcome.peers.peers.len()
        ),
        "block": outcome.block,
        "peers": outcome.peers,
        "reward": outcome.reward,
        "rewardPeers": outcome.reward_peers
    })))
}

async fn receive_new_block(
    State(state): State<ApiState>,
    Json(payload): Json<NewBlockPayload>,
) -> Result<Json<BlockReceipt>, ApiError> {
    let acceptance = state.node.receive_block(payload.new_block.clone()).await?;

    let (note, accepted) = match acceptance {
        BlockAcceptance::Accepted => ("New block received and accepted.", true),
        BlockAcceptance::RejectedStale => ("New block rejected.", false),
    };
    Ok(Json(BlockReceipt {
        note: note.to_string(),
        accepted,
        new_block: payload.new_block,
    }))
}

fn require_url(url: &str) -> Result<(), ApiError> {
    if url.trim().is_empty() {
        return Err(ApiError::InvalidInput("newNodeUrl must not be empty".to_string()));
    }
    Ok(())
}

async fn register_and_broadcast_node(
    State(state): State<ApiState>,
    Json(payload): Json<NodeUrlPayload>,
) -> Result<impl IntoResponse, ApiError> {
    require_url(&payload.new_node_url)?;
    let outcome = state
        .node
        .register_and_broadcast_peer(&payload.new_node_url)
        .await;

    Ok(Json(json!({
        "note": "New node registered with network.",
        "added": outcome.added,
        "peers": outcome.peers,
        "newcomer": outcome.newcomer
    })))
}

async fn register_node(
    State(state): State<ApiState>,
    Json(payload): Json<NodeUrlPayload>,
) -> Result<impl IntoResponse, ApiError> {
    require_url(&payload.new_node_url)?;
    let added = state.node.register_peer(&payload.new_node_url);

    Ok(Json(json!({
        "note": "New node registered successfully with node.",
        "added": added
    })))
}

async fn register_nodes_bulk(
    State(state): State<ApiState>,
    Json(payload): Json<BulkNodesPayload>,
) -> impl IntoResponse {
    let added = state.node.register_peers_bulk(&payload.all_network_nodes);
    Json(json!({
        "note": "Bulk registration successful.",
        "added": added
    }))
}

async fn consensus(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.node.consensus().await?;
    let note = if outcome.replaced {
        "This chain has been replaced."
    } else {
        "Current chain has not been replaced."
    };

    Ok(Json(json!({
        "note": note,
        "replaced": outcome.replaced,
        "chain": outcome.chain,
        "peers": outcome.peers,
        "rejected": outcome.rejected
    })))
}

async fn get_api_stats(State(state): State<ApiState>) -> Json<ApiStatsResponse> {
    let (chain_length, pending_transactions) = {
        let chain = state.node.blockchain.read().await;
        (chain.len(), chain.mempool.len())
    };
    let stats = state.stats.read().await;

    Json(ApiStatsResponse {
        total_requests: stats.total_requests,
        successful_requests: stats.successful_requests,
        failed_requests: stats.failed_requests,
        transactions_submitted: stats.transactions_submitted,
        uptime_seconds: stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0),
        blocks_mined: state.node.blocks_mined(),
        is_mining: state.node.is_mining(),
        chain_length,
        pending_transactions,
        peer_count: state.node.peers.len(),
    })
}
