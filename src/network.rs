//! Peer networking for powledger
//!
//! - [`PeerRegistry`]: the set of known peer base URLs
//! - [`PeerClient`]: the transport seam used for every outbound peer call
//! - [`HttpPeerClient`]: JSON over HTTP/1.1 via hyper
//! - [`fan_out`]: concurrent per-peer calls with individually tracked outcomes

use crate::blockchain::{Block, BlockAcceptance, ChainSnapshot};
use crate::error::{ChainError, Result};
use crate::transaction::Transaction;
use hyper::body::Buf;
use hyper::client::HttpConnector;
use hyper::{header, Body, Client, Method, Request, StatusCode};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Wire payloads
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlockPayload {
    pub new_block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockReceipt {
    pub note: String,
    pub accepted: bool,
    pub new_block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUrlPayload {
    pub new_node_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkNodesPayload {
    pub all_network_nodes: Vec<String>,
}

// ============================================================================
// Peer registry
// ============================================================================

/// Known peers, excluding this node itself. Insertion order is kept.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    self_url: String,
    peers: Arc<RwLock<Vec<String>>>,
}

impl PeerRegistry {
    pub fn new(self_url: impl Into<String>) -> Self {
        Self {
            self_url: self_url.into(),
            peers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    /// Returns false for this node's own URL or an already known peer.
    pub fn add(&self, url: &str) -> bool {
        let url = url.trim_end_matches('/');
        if url.is_empty() || url == self.self_url.trim_end_matches('/') {
            return false;
        }

        let mut peers = self.peers.write();
        if peers.iter().any(|p| p == url) {
            return false;
        }
        peers.push(url.to_string());
        true
    }

    pub fn list(&self) -> Vec<String> {
        self.peers.read().clone()
    }

    pub fn contains(&self, url: &str) -> bool {
        let url = url.trim_end_matches('/');
        self.peers.read().iter().any(|p| p == url)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

// ============================================================================
// Transport seam
// ============================================================================

pub type PeerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Outbound calls to a single peer, addressed by its base URL.
pub trait PeerClient: Send + Sync {
    fn fetch_snapshot<'a>(&'a self, peer: &'a str) -> PeerFuture<'a, ChainSnapshot>;

    fn send_transaction<'a>(&'a self, peer: &'a str, tx: &'a Transaction) -> PeerFuture<'a, ()>;

    fn send_block<'a>(&'a self, peer: &'a str, block: &'a Block)
        -> PeerFuture<'a, BlockAcceptance>;

    fn register_node<'a>(&'a self, peer: &'a str, node_url: &'a str) -> PeerFuture<'a, ()>;

    fn register_nodes_bulk<'a>(&'a self, peer: &'a str, urls: &'a [String])
        -> PeerFuture<'a, ()>;

    /// Ask `peer` to register `node_url` and introduce it to the network.
    fn announce<'a>(&'a self, peer: &'a str, node_url: &'a str) -> PeerFuture<'a, ()>;
}

/// [`PeerClient`] speaking JSON over HTTP to other nodes' API.
#[derive(Clone)]
pub struct HttpPeerClient {
    client: Client<HttpConnector>,
    timeout: Duration,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        peer: &str,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<T> {
        let url = format!("{}{}", peer.trim_end_matches('/'), path);
        let unreachable = |reason: String| ChainError::PeerUnreachable {
            peer: peer.to_string(),
            reason,
        };

        let mut builder = Request::builder().method(method).uri(&url);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .map_err(|e| ChainError::NetworkError(format!("bad request to {}: {}", url, e)))?;

        debug!(%url, "peer request");
        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| unreachable(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| unreachable(e.to_string()))?;

        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        if status != StatusCode::OK {
            return Err(ChainError::NetworkError(format!(
                "{} answered {} for {}",
                peer, status, path
            )));
        }

        Ok(serde_json::from_reader(bytes.reader())?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        peer: &str,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_vec(body)?;
        self.request(peer, Method::POST, path, Some(body)).await
    }
}

impl PeerClient for HttpPeerClient {
    fn fetch_snapshot<'a>(&'a self, peer: &'a str) -> PeerFuture<'a, ChainSnapshot> {
        Box::pin(self.request(peer, Method::GET, "/blockchain", None))
    }

    fn send_transaction<'a>(&'a self, peer: &'a str, tx: &'a Transaction) -> PeerFuture<'a, ()> {
        Box::pin(async move {
            let _: serde_json::Value = self.post(peer, "/transaction", tx).await?;
            Ok(())
        })
    }

    fn send_block<'a>(
        &'a self,
        peer: &'a str,
        block: &'a Block,
    ) -> PeerFuture<'a, BlockAcceptance> {
        Box::pin(async move {
            let payload = NewBlockPayload {
                new_block: block.clone(),
            };
            let receipt: BlockReceipt = self.post(peer, "/receive-new-block", &payload).await?;
            Ok(if receipt.accepted {
                BlockAcceptance::Accepted
            } else {
                BlockAcceptance::RejectedStale
            })
        })
    }

    fn register_node<'a>(&'a self, peer: &'a str, node_url: &'a str) -> PeerFuture<'a, ()> {
        Box::pin(async move {
            let payload = NodeUrlPayload {
                new_node_url: node_url.to_string(),
            };
            let _: serde_json::Value = self.post(peer, "/register-node", &payload).await?;
            Ok(())
        })
    }

    fn register_nodes_bulk<'a>(
        &'a self,
        peer: &'a str,
        urls: &'a [String],
    ) -> PeerFuture<'a, ()> {
        Box::pin(async move {
            let payload = BulkNodesPayload {
                all_network_nodes: urls.to_vec(),
            };
            let _: serde_json::Value = self.post(peer, "/register-nodes-bulk", &payload).await?;
            Ok(())
        })
    }

    fn announce<'a>(&'a self, peer: &'a str, node_url: &'a str) -> PeerFuture<'a, ()> {
        Box::pin(async move {
            let payload = NodeUrlPayload {
                new_node_url: node_url.to_string(),
            };
            let _: serde_json::Value = self
                .post(peer, "/register-and-broadcast-node", &payload)
                .await?;
            Ok(())
        })
    }
}

// ============================================================================
// Fan-out
// ============================================================================

/// Delivery result for one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerOutcome {
    pub peer: String,
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl PeerOutcome {
    pub fn delivered(peer: String, detail: Option<String>) -> Self {
        Self {
            peer,
            delivered: true,
            detail,
        }
    }

    pub fn failed(peer: String, err: &ChainError) -> Self {
        Self {
            peer,
            delivered: false,
            detail: Some(err.to_string()),
        }
    }
}

/// Per-peer outcomes of one fan-out, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub peers: Vec<PeerOutcome>,
}

impl BroadcastReport {
    pub fn from_results<T>(
        results: Vec<(String, Result<T>)>,
        describe: impl Fn(&T) -> Option<String>,
    ) -> Self {
        let peers = results
            .into_iter()
            .map(|(peer, result)| match result {
                Ok(value) => {
                    let detail = describe(&value);
                    PeerOutcome::delivered(peer, detail)
                }
                Err(e) => PeerOutcome::failed(peer, &e),
            })
            .collect();
        Self { peers }
    }

    pub fn delivered(&self) -> usize {
        self.peers.iter().filter(|p| p.delivered).count()
    }

    pub fn failed(&self) -> usize {
        self.peers.len() - self.delivered()
    }

    pub fn all_delivered(&self) -> bool {
        self.peers.iter().all(|p| p.delivered)
    }
}

/// Run `op` against every peer concurrently and wait for all of them.
///
/// One failing peer never affects another's result.
pub async fn fan_out<T, F, Fut>(peers: Vec<String>, op: F) -> Vec<(String, Result<T>)>
where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let handles: Vec<_> = peers
        .into_iter()
        .map(|peer| {
            let task = tokio::spawn(op(peer.clone()));
            (peer, task)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (peer, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(ChainError::TaskFailed(format!("peer task failed: {}", e))),
        };
        if let Err(e) = &result {
            warn!(%peer, error = %e, "peer call failed");
        }
        results.push((peer, result));
    }
    results
}
