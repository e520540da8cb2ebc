use crate::error::ChainError;
use crate::miner::{digest, meets_difficulty};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::chain::Block;

/// Which chain invariant a block broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Empty,
    Genesis,
    Linkage,
    Index,
    ProofOfWork,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ViolationKind::Empty => write!(f, "empty chain"),
            ViolationKind::Genesis => write!(f, "genesis mismatch"),
            ViolationKind::Linkage => write!(f, "previous hash linkage"),
            ViolationKind::Index => write!(f, "index continuity"),
            ViolationKind::ProofOfWork => write!(f, "proof-of-work"),
        }
    }
}

/// One broken invariant, by zero-based chain position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainViolation {
    pub index: usize,
    pub kind: ViolationKind,
}

/// Every violation found in a full scan of a candidate chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub violations: Vec<ChainViolation>,
}

impl ChainReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Lowest-positioned violation.
    pub fn first(&self) -> Option<&ChainViolation> {
        self.violations.iter().min_by_key(|v| v.index)
    }

    pub fn into_result(self) -> Result<(), ChainError> {
        match self.first() {
            None => Ok(()),
            Some(v) => Err(ChainError::InvalidChain {
                index: v.index,
                kind: v.kind,
            }),
        }
    }

    fn record(&mut self, index: usize, kind: ViolationKind) {
        self.violations.push(ChainViolation { index, kind });
    }
}

/// Check linkage and proof-of-work of every non-genesis block, then the
/// genesis invariants. The scan never stops early.
pub fn validate_chain(chain: &[Block]) -> ChainReport {
    let mut report = ChainReport::default();

    let Some(genesis) = chain.first() else {
        report.record(0, ViolationKind::Empty);
        return report;
    };

    for (position, block) in chain.iter().enumerate() {
        if block.index != position as u64 + 1 {
            report.record(position, ViolationKind::Index);
        }
    }

    for (i, pair) in chain.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let position = i + 1;

        if current.previous_block_hash != previous.hash {
            report.record(position, ViolationKind::Linkage);
        }

        let proof_ok = digest(&previous.hash, &current.block_data(), current.nonce)
            .map(|hash| meets_difficulty(&hash))
            .unwrap_or(false);
        if !proof_ok {
            report.record(position, ViolationKind::ProofOfWork);
        }
    }

    if !genesis.is_genesis_shaped() {
        report.record(0, ViolationKind::Genesis);
    }

    report
}

/// Plain pass/fail form of [`validate_chain`].
pub fn is_valid_chain(chain: &[Block]) -> bool {
    validate_chain(chain).is_valid()
}
