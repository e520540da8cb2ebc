//! Longest-valid-chain consensus
//!
//! Only the single longest peer chain is ever considered. If it fails
//! validation the local state is kept, even when a shorter peer chain that is
//! still longer than ours would have passed.

use crate::blockchain::{validate_chain, Block, ChainSnapshot, ChainViolation};
use crate::transaction::Transaction;
use tracing::{debug, info, warn};

/// The ledger state chosen by [`Consensus::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub chain: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
    pub replaced: bool,
    /// Set when a longer candidate existed but failed validation.
    pub rejected: Option<ChainViolation>,
}

impl Resolution {
    fn keep(local: ChainSnapshot, rejected: Option<ChainViolation>) -> Self {
        Self {
            chain: local.chain,
            pending_transactions: local.pending_transactions,
            replaced: false,
            rejected,
        }
    }
}

pub struct Consensus;

impl Consensus {
    /// Whether `block` directly extends `tip`: same parent hash, next index.
    pub fn extends_tip(tip: &Block, block: &Block) -> bool {
        block.previous_block_hash == tip.hash && tip.index.checked_add(1) == Some(block.index)
    }

    /// Pick the longest peer snapshot strictly longer than `local`; adopt it
    /// if it validates, otherwise keep `local`. Among equally long peers the
    /// first one wins.
    pub fn resolve(local: ChainSnapshot, peers: Vec<ChainSnapshot>) -> Resolution {
        let mut best: Option<ChainSnapshot> = None;
        let mut best_len = local.len();

        for snapshot in peers {
            if snapshot.len() > best_len {
                best_len = snapshot.len();
                best = Some(snapshot);
            }
        }

        let Some(candidate) = best else {
            debug!(local_len = local.len(), "no longer peer chain");
            return Resolution::keep(local, None);
        };

        let report = validate_chain(&candidate.chain);
        match report.first() {
            None => {
                info!(
                    local_len = local.len(),
                    adopted_len = candidate.len(),
                    "adopting longer peer chain"
                );
                Resolution {
                    chain: candidate.chain,
                    pending_transactions: candidate.pending_transactions,
                    replaced: true,
                    rejected: None,
                }
            }
            Some(violation) => {
                warn!(
                    candidate_len = candidate.len(),
                    index = violation.index,
                    kind = %violation.kind,
                    "longest peer chain is invalid; keeping local chain"
                );
                Resolution::keep(local, Some(*violation))
            }
        }
    }
}
