//! Node orchestration: the single owner of ledger state plus peer fan-out
//!
//! Every state mutation goes through the one `RwLock<Blockchain>` write guard.
//! Mining runs on the blocking pool and is cancelled whenever a peer block or
//! a peer chain replaces the tip it was working on.

use crate::blockchain::{Block, BlockAcceptance, Blockchain, ChainSnapshot, ChainViolation};
use crate::config::Config;
use crate::consensus::Consensus;
use crate::error::Result;
use crate::miner::{MiningJob, MiningSignal};
use crate::network::{fan_out, BroadcastReport, HttpPeerClient, PeerClient, PeerOutcome, PeerRegistry};
use crate::transaction::Transaction;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeState {
    Booting,
    Syncing,
    Ready,
}

/// A freshly mined block and what happened when it was announced.
#[derive(Debug, Clone, Serialize)]
pub struct MineOutcome {
    pub block: Block,
    pub peers: BroadcastReport,
    pub reward: Transaction,
    pub reward_peers: BroadcastReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsensusOutcome {
    pub replaced: bool,
    pub chain: Vec<Block>,
    pub peers: BroadcastReport,
    pub rejected: Option<ChainViolation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
    pub added: bool,
    pub peers: BroadcastReport,
    pub newcomer: PeerOutcome,
}

/// An in-flight search and the tip hash it is building on.
struct ActiveMining {
    previous_hash: String,
    signal: MiningSignal,
}

pub struct Node {
    pub config: Config,
    pub blockchain: Arc<RwLock<Blockchain>>,
    pub peers: PeerRegistry,
    pub state: Arc<RwLock<NodeState>>,
    client: Arc<dyn PeerClient>,
    mining: Mutex<Vec<ActiveMining>>,
    blocks_mined: AtomicU64,
}

impl Node {
    pub fn new(config: Config, client: Arc<dyn PeerClient>) -> Self {
        let peers = PeerRegistry::new(config.network.node_url());
        Self {
            config,
            blockchain: Arc::new(RwLock::new(Blockchain::new())),
            peers,
            state: Arc::new(RwLock::new(NodeState::Booting)),
            client,
            mining: Mutex::new(Vec::new()),
            blocks_mined: AtomicU64::new(0),
        }
    }

    /// A node talking to its peers over HTTP.
    pub fn with_http(config: Config) -> Self {
        let timeout = Duration::from_secs(config.network.request_timeout_secs);
        Self::new(config, Arc::new(HttpPeerClient::new(timeout)))
    }

    pub fn node_url(&self) -> &str {
        self.peers.self_url()
    }

    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined.load(Ordering::Relaxed)
    }

    pub fn is_mining(&self) -> bool {
        !self.mining.lock().is_empty()
    }

    pub async fn snapshot(&self) -> ChainSnapshot {
        self.blockchain.read().await.snapshot()
    }

    // ------------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------------

    /// Stage a transaction as-is; returns the projected block index.
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<u64> {
        self.blockchain.write().await.add_pending_transaction(tx)
    }

    /// Create a transaction with a fresh id, stage it, and send it to every peer.
    pub async fn create_and_broadcast_transaction(
        &self,
        amount: f64,
        sender: &str,
        recipient: &str,
    ) -> Result<(Transaction, u64, BroadcastReport)> {
        let tx = Transaction::new(amount, sender, recipient);
        let block_index = self.submit_transaction(tx.clone()).await?;
        let report = self.broadcast_transaction(&tx).await;
        Ok((tx, block_index, report))
    }

    async fn broadcast_transaction(&self, tx: &Transaction) -> BroadcastReport {
        let client = self.client.clone();
        let tx = tx.clone();
        let results = fan_out(self.peers.list(), move |peer| {
            let client = client.clone();
            let tx = tx.clone();
            async move { client.send_transaction(&peer, &tx).await }
        })
        .await;
        BroadcastReport::from_results(results, |_| None)
    }

    // ------------------------------------------------------------------------
    // Mining
    // ------------------------------------------------------------------------

    /// Mine the current pending pool onto the tip, commit, announce the block,
    /// then stage and announce the mining reward.
    pub async fn mine(&self) -> Result<MineOutcome> {
        // Registered under the ledger lock so a tip change can never slip in
        // between the snapshot and the job becoming cancellable.
        let (job, index) = {
            let chain = self.blockchain.read().await;
            let (previous_hash, data) = chain.next_block_data()?;
            let index = data.index;
            info!(index, pending = data.transactions.len(), "mining started");

            let job = MiningJob::spawn(previous_hash.clone(), data);
            self.mining.lock().push(ActiveMining {
                previous_hash,
                signal: job.signal(),
            });
            (job, index)
        };

        let signal = job.signal();
        let proof = job.wait().await;
        self.mining.lock().retain(|m| !m.signal.same_as(&signal));

        let proof = proof.inspect_err(|e| warn!(index, error = %e, "mining abandoned"))?;
        let block = self.blockchain.write().await.commit_mined(&proof)?;
        self.blocks_mined.fetch_add(1, Ordering::Relaxed);
        info!(index = block.index, nonce = block.nonce, hash = %block.hash, "block mined");

        let peers = self.broadcast_block(&block).await;

        let miner = &self.config.miner;
        let (reward, _, reward_peers) = self
            .create_and_broadcast_transaction(miner.reward, &miner.reward_sender, &miner.node_address)
            .await?;

        Ok(MineOutcome {
            block,
            peers,
            reward,
            reward_peers,
        })
    }

    async fn broadcast_block(&self, block: &Block) -> BroadcastReport {
        let client = self.client.clone();
        let block = block.clone();
        let results = fan_out(self.peers.list(), move |peer| {
            let client = client.clone();
            let block = block.clone();
            async move { client.send_block(&peer, &block).await }
        })
        .await;
        BroadcastReport::from_results(results, |acceptance| {
            Some(
                match acceptance {
                    BlockAcceptance::Accepted => "accepted",
                    BlockAcceptance::RejectedStale => "rejected_stale",
                }
                .to_string(),
            )
        })
    }

    /// Cancel every search not building on `tip_hash`. Call with the ledger
    /// write guard held.
    fn cancel_mining(&self, tip_hash: &str) {
        let jobs = self.mining.lock();
        let stale: Vec<&ActiveMining> = jobs
            .iter()
            .filter(|m| m.previous_hash != tip_hash)
            .collect();
        if !stale.is_empty() {
            info!(jobs = stale.len(), "cancelling in-flight mining");
        }
        for job in stale {
            job.signal.cancel();
        }
    }

    // ------------------------------------------------------------------------
    // Peer blocks and consensus
    // ------------------------------------------------------------------------

    /// Offer a peer-mined block to the local chain.
    pub async fn receive_block(&self, block: Block) -> Result<BlockAcceptance> {
        let index = block.index;
        let tip_hash = block.hash.clone();
        let mut chain = self.blockchain.write().await;
        let acceptance = chain.receive_block(block)?;
        match acceptance {
            BlockAcceptance::Accepted => {
                info!(index, "peer block accepted");
                self.cancel_mining(&tip_hash);
            }
            BlockAcceptance::RejectedStale => warn!(index, "peer block rejected as stale"),
        }
        Ok(acceptance)
    }

    /// Fetch every peer's snapshot and adopt the longest one if it is valid.
    /// Unreachable peers are reported and left out of the candidate set.
    pub async fn consensus(&self) -> Result<ConsensusOutcome> {
        let client = self.client.clone();
        let results = fan_out(self.peers.list(), move |peer| {
            let client = client.clone();
            async move { client.fetch_snapshot(&peer).await }
        })
        .await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut snapshots = Vec::new();
        for (peer, result) in results {
            match result {
                Ok(snapshot) => {
                    outcomes.push(PeerOutcome::delivered(
                        peer,
                        Some(format!("chain length {}", snapshot.len())),
                    ));
                    snapshots.push(snapshot);
                }
                Err(e) => outcomes.push(PeerOutcome::failed(peer, &e)),
            }
        }

        let mut chain = self.blockchain.write().await;
        let resolution = Consensus::resolve(chain.snapshot(), snapshots);
        if resolution.replaced {
            chain.replace(
                resolution.chain.clone(),
                resolution.pending_transactions.clone(),
            );
            let tip_hash = chain.last_block()?.hash.clone();
            self.cancel_mining(&tip_hash);
        }
        drop(chain);

        Ok(ConsensusOutcome {
            replaced: resolution.replaced,
            chain: resolution.chain,
            peers: BroadcastReport { peers: outcomes },
            rejected: resolution.rejected,
        })
    }

    // ------------------------------------------------------------------------
    // Peer registration
    // ------------------------------------------------------------------------

    pub fn register_peer(&self, url: &str) -> bool {
        let added = self.peers.add(url);
        if added {
            info!(peer = url, "peer registered");
        }
        added
    }

    /// Returns how many of `urls` were new.
    pub fn register_peers_bulk(&self, urls: &[String]) -> usize {
        urls.iter().filter(|url| self.register_peer(url)).count()
    }

    /// Register `url`, tell every other known peer about it, then hand the
    /// newcomer the full peer list including this node.
    pub async fn register_and_broadcast_peer(&self, url: &str) -> RegistrationOutcome {
        let added = self.register_peer(url);
        let newcomer = url.trim_end_matches('/').to_string();

        let others: Vec<String> = self
            .peers
            .list()
            .into_iter()
            .filter(|p| *p != newcomer)
            .collect();

        let client = self.client.clone();
        let announced = newcomer.clone();
        let results = fan_out(others.clone(), move |peer| {
            let client = client.clone();
            let announced = announced.clone();
            async move { client.register_node(&peer, &announced).await }
        })
        .await;
        let peers = BroadcastReport::from_results(results, |_| None);

        let mut directory = others;
        directory.push(self.node_url().to_string());
        let newcomer_outcome = match self.client.register_nodes_bulk(&newcomer, &directory).await {
            Ok(()) => PeerOutcome::delivered(newcomer, None),
            Err(e) => {
                warn!(peer = %newcomer, error = %e, "bulk registration failed");
                PeerOutcome::failed(newcomer, &e)
            }
        };

        RegistrationOutcome {
            added,
            peers,
            newcomer: newcomer_outcome,
        }
    }

    /// Announce this node to the configured bootstrap peers, then sync.
    pub async fn bootstrap(&self) -> Result<()> {
        *self.state.write().await = NodeState::Syncing;

        for peer in self.config.network.bootstrap_peers.clone() {
            self.register_peer(&peer);
            if let Err(e) = self.client.announce(&peer, self.node_url()).await {
                warn!(%peer, error = %e, "bootstrap announce failed");
            }
        }

        if !self.peers.is_empty() {
            let outcome = self.consensus().await?;
            info!(
                replaced = outcome.replaced,
                chain_length = outcome.chain.len(),
                "initial consensus finished"
            );
        }

        *self.state.write().await = NodeState::Ready;
        Ok(())
    }
}
