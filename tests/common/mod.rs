//! In-process peer network for integration tests.
//!
//! `LocalNetwork` implements `PeerClient` by calling straight into other
//! `Node`s registered under their URL. Unknown URLs behave like peers that
//! are down.

#![allow(dead_code)]

use parking_lot::RwLock;
use powledger::blockchain::{Block, BlockAcceptance, ChainSnapshot};
use powledger::config::Config;
use powledger::error::ChainError;
use powledger::network::{PeerClient, PeerFuture};
use powledger::node::Node;
use powledger::transaction::Transaction;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct LocalNetwork {
    nodes: Arc<RwLock<HashMap<String, Arc<Node>>>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node reachable at `url` through this network.
    pub fn spawn_node(&self, url: &str, bootstrap: &[&str]) -> Arc<Node> {
        let mut config = Config::default();
        config.network.node_url = Some(url.to_string());
        config.network.bootstrap_peers = bootstrap.iter().map(|p| p.to_string()).collect();
        config.miner.node_address = format!("miner-{}", url.trim_start_matches("http://"));

        let node = Arc::new(Node::new(config, Arc::new(self.clone())));
        self.nodes.write().insert(url.to_string(), node.clone());
        node
    }

    pub fn take_down(&self, url: &str) {
        self.nodes.write().remove(url);
    }

    fn lookup(&self, peer: &str) -> Result<Arc<Node>, ChainError> {
        self.nodes
            .read()
            .get(peer)
            .cloned()
            .ok_or_else(|| ChainError::PeerUnreachable {
                peer: peer.to_string(),
                reason: "no such node".to_string(),
            })
    }
}

impl PeerClient for LocalNetwork {
    fn fetch_snapshot<'a>(&'a self, peer: &'a str) -> PeerFuture<'a, ChainSnapshot> {
        Box::pin(async move { Ok(self.lookup(peer)?.snapshot().await) })
    }

    fn send_transaction<'a>(&'a self, peer: &'a str, tx: &'a Transaction) -> PeerFuture<'a, ()> {
        Box::pin(async move {
            self.lookup(peer)?.submit_transaction(tx.clone()).await?;
            Ok(())
        })
    }

    fn send_block<'a>(
        &'a self,
        peer: &'a str,
        block: &'a Block,
    ) -> PeerFuture<'a, BlockAcceptance> {
        Box::pin(async move { self.lookup(peer)?.receive_block(block.clone()).await })
    }

    fn register_node<'a>(&'a self, peer: &'a str, node_url: &'a str) -> PeerFuture<'a, ()> {
        Box::pin(async move {
            self.lookup(peer)?.register_peer(node_url);
            Ok(())
        })
    }

    fn register_nodes_bulk<'a>(
        &'a self,
        peer: &'a str,
        urls: &'a [String],
    ) -> PeerFuture<'a, ()> {
        Box::pin(async move {
            self.lookup(peer)?.register_peers_bulk(urls);
            Ok(())
        })
    }

    fn announce<'a>(&'a self, peer: &'a str, node_url: &'a str) -> PeerFuture<'a, ()> {
        Box::pin(async move {
            let node = self.lookup(peer)?;
            node.register_and_broadcast_peer(node_url).await;
            Ok(())
        })
    }
}
