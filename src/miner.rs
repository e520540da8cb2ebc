//! Proof-of-work hashing and nonce search
//!
//! A block's digest is `sha256(previous_hash ++ decimal(nonce) ++ json(BlockData))`,
//! hex encoded. [`BlockData`] declares `transactions` before `index`; that order is
//! what `serde_json` emits and is the only canonical form. Mining and validation
//! both go through [`digest`], so they can never disagree.
//!
//! Whole-number amounts serialize without a fraction (`10`), matching nodes
//! that print numbers JavaScript-style. Amounts beyond 2^53 or needing
//! exponent notation may still format differently on such nodes.

use crate::error::{ChainError, Result};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Required hex prefix of a valid block digest. Fixed, never adjusted.
pub const DIFFICULTY_PREFIX: &str = "0000";

/// How many nonces are tried between cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 256;

/// The block content covered by the proof-of-work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    pub transactions: Vec<Transaction>,
    pub index: u64,
}

impl BlockData {
    pub fn new(transactions: Vec<Transaction>, index: u64) -> Self {
        Self {
            transactions,
            index,
        }
    }
}

/// Hex SHA-256 digest of a block's previous hash, nonce and content.
pub fn digest(previous_hash: &str, data: &BlockData, nonce: u64) -> Result<String> {
    let canonical = serde_json::to_string(data)?;

    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(nonce.to_string().as_bytes());
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

pub fn meets_difficulty(hash: &str) -> bool {
    hash.starts_with(DIFFICULTY_PREFIX)
}

/// Brute-force the first nonce, counting up from zero, whose digest meets the
/// difficulty prefix. Unbounded; use [`MiningJob`] off the request path.
pub fn mine(previous_hash: &str, data: &BlockData) -> Result<u64> {
    mine_cancellable(previous_hash, data, &MiningSignal::new())?.ok_or(ChainError::MiningCancelled)
}

/// Same search as [`mine`], returning `Ok(None)` once `signal` is cancelled.
pub fn mine_cancellable(
    previous_hash: &str,
    data: &BlockData,
    signal: &MiningSignal,
) -> Result<Option<u64>> {
    let canonical = serde_json::to_string(data)?;

    let mut nonce: u64 = 0;
    loop {
        if nonce % CANCEL_CHECK_INTERVAL == 0 && signal.is_cancelled() {
            debug!(index = data.index, nonce, "mining cancelled");
            return Ok(None);
        }

        let mut hasher = Sha256::new();
        hasher.update(previous_hash.as_bytes());
        hasher.update(nonce.to_string().as_bytes());
        hasher.update(canonical.as_bytes());
        if meets_difficulty(&hex::encode(hasher.finalize())) {
            return Ok(Some(nonce));
        }

        nonce += 1;
    }
}

/// Shared cancellation flag for an in-flight nonce search.
#[derive(Debug, Clone, Default)]
pub struct MiningSignal {
    cancelled: Arc<AtomicBool>,
}

impl MiningSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// True when both handles control the same job.
    pub fn same_as(&self, other: &MiningSignal) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// A successful proof, carrying the inputs it was computed on.
#[derive(Debug, Clone, PartialEq)]
pub struct MinedProof {
    pub previous_hash: String,
    pub data: BlockData,
    pub nonce: u64,
    pub hash: String,
}

/// A nonce search running on the blocking thread pool.
pub struct MiningJob {
    signal: MiningSignal,
    handle: JoinHandle<Result<Option<MinedProof>>>,
}

impl MiningJob {
    pub fn spawn(previous_hash: String, data: BlockData) -> Self {
        let signal = MiningSignal::new();
        let task_signal = signal.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let Some(nonce) = mine_cancellable(&previous_hash, &data, &task_signal)? else {
                return Ok(None);
            };
            let hash = digest(&previous_hash, &data, nonce)?;
            Ok(Some(MinedProof {
                previous_hash,
                data,
                nonce,
                hash,
            }))
        });

        Self { signal, handle }
    }

    /// A handle that can cancel this job from elsewhere.
    pub fn signal(&self) -> MiningSignal {
        self.signal.clone()
    }

    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// Wait for the search to finish. Cancellation yields `MiningCancelled`.
    pub async fn wait(self) -> Result<MinedProof> {
        let outcome = self
            .handle
            .await
            .map_err(|e| ChainError::TaskFailed(format!("mining task failed: {}", e)))?;
        outcome?.ok_or(ChainError::MiningCancelled)
    }
}
