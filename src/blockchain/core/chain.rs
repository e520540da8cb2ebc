use crate::consensus::Consensus;
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::miner::{BlockData, MinedProof};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

use super::state::{summarize_address, AddressSummary};

/// Nonce, hash and previous hash of the hardcoded genesis block.
pub const GENESIS_NONCE: u64 = 100;
pub const GENESIS_HASH: &str = "0";
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    pub hash: String,
    pub previous_block_hash: String,
}

impl Block {
    /// The proof-of-work input for this block.
    pub fn block_data(&self) -> BlockData {
        BlockData::new(self.transactions.clone(), self.index)
    }

    /// Index of the block that would follow this one.
    pub fn next_index(&self) -> Result<u64> {
        self.index
            .checked_add(1)
            .ok_or(ChainError::IndexOverflow(self.index))
    }

    pub fn is_genesis_shaped(&self) -> bool {
        self.nonce == GENESIS_NONCE
            && self.previous_block_hash == GENESIS_PREVIOUS_HASH
            && self.hash == GENESIS_HASH
            && self.transactions.is_empty()
    }
}

/// An owned copy of a node's ledger state, as exchanged between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    #[serde(default)]
    pub pending_transactions: Vec<Transaction>,
}

impl ChainSnapshot {
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

/// Result of offering a single peer-mined block to the local chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockAcceptance {
    Accepted,
    RejectedStale,
}

/// The ledger: the block sequence and the pending pool, owned together.
#[derive(Debug, Clone)]
pub struct Blockchain {
    pub blocks: Vec<Block>,
    pub mempool: Mempool,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// A chain holding only the genesis block, with an empty pool.
    pub fn new() -> Self {
        let mut blockchain = Blockchain {
            blocks: Vec::new(),
            mempool: Mempool::new(),
        };
        blockchain.create_block(
            GENESIS_NONCE,
            GENESIS_PREVIOUS_HASH.to_string(),
            GENESIS_HASH.to_string(),
        );
        blockchain
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last_block(&self) -> Result<&Block> {
        self.blocks.last().ok_or(ChainError::EmptyChain)
    }

    /// Append a block built from the whole pending pool, which is left empty.
    pub fn create_block(&mut self, nonce: u64, previous_hash: String, hash: String) -> Block {
        let block = Block {
            index: self.blocks.len() as u64 + 1,
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
            transactions: self.mempool.take_all(),
            nonce,
            hash,
            previous_block_hash: previous_hash,
        };

        self.blocks.push(block.clone());
        block
    }

    /// Commit a proof found on a snapshot taken by [`Self::next_block_data`].
    ///
    /// The block holds exactly the transactions that were hashed; anything that
    /// arrived in the pool while mining stays pending. Fails with `StaleProof`
    /// if the tip moved or the pool no longer starts with the mined transactions.
    pub fn commit_mined(&mut self, proof: &MinedProof) -> Result<Block> {
        let tip = self.last_block()?;
        if tip.hash != proof.previous_hash || tip.next_index()? != proof.data.index {
            return Err(ChainError::StaleProof);
        }

        let mined = &proof.data.transactions;
        if !self.mempool.transactions().starts_with(mined) {
            return Err(ChainError::StaleProof);
        }

        let arrived_later = self.mempool.transactions()[mined.len()..].to_vec();
        self.mempool.replace(mined.clone());
        let block = self.create_block(proof.nonce, proof.previous_hash.clone(), proof.hash.clone());
        self.mempool.replace(arrived_later);
        Ok(block)
    }

    /// Stage a transaction; returns the index of the block expected to include it.
    pub fn add_pending_transaction(&mut self, tx: Transaction) -> Result<u64> {
        let next_index = self.last_block()?.next_index()?;
        self.mempool.add_transaction(tx);
        Ok(next_index)
    }

    /// Mining input for the next block: the tip hash and the current pool.
    pub fn next_block_data(&self) -> Result<(String, BlockData)> {
        let last = self.last_block()?;
        Ok((
            last.hash.clone(),
            BlockData::new(self.mempool.get_all_transactions(), last.next_index()?),
        ))
    }

    /// Append a peer-mined block iff it extends the current tip.
    ///
    /// Only linkage and index are checked; the proof-of-work is not re-verified.
    /// On acceptance the pending pool is cleared.
    pub fn receive_block(&mut self, block: Block) -> Result<BlockAcceptance> {
        if !Consensus::extends_tip(self.last_block()?, &block) {
            return Ok(BlockAcceptance::RejectedStale);
        }

        self.blocks.push(block);
        self.mempool.clear();
        Ok(BlockAcceptance::Accepted)
    }

    pub fn find_block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.hash == hash)
    }

    /// First transaction with this id in chain order, with its block.
    pub fn find_transaction(&self, transaction_id: &str) -> Option<(&Transaction, &Block)> {
        self.blocks.iter().find_map(|block| {
            block
                .transactions
                .iter()
                .find(|tx| tx.id() == Some(transaction_id))
                .map(|tx| (tx, block))
        })
    }

    pub fn address_summary(&self, address: &str) -> AddressSummary {
        summarize_address(&self.blocks, address)
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            chain: self.blocks.clone(),
            pending_transactions: self.mempool.get_all_transactions(),
        }
    }

    /// Wholesale replacement with an adopted peer state.
    pub fn replace(&mut self, chain: Vec<Block>, pending: Vec<Transaction>) {
        self.blocks = chain;
        self.mempool.replace(pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::{digest, mine};

    fn mine_next(chain: &mut Blockchain) -> Block {
        let (previous_hash, data) = chain.next_block_data().unwrap();
        let nonce = mine(&previous_hash, &data).unwrap();
        let hash = digest(&previous_hash, &data, nonce).unwrap();
        chain.create_block(nonce, previous_hash, hash)
    }

    #[test]
    fn test_genesis_block() {
        let chain = Blockchain::new();
        assert_eq!(chain.len(), 1);

        let genesis = &chain.blocks[0];
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.nonce, 100);
        assert_eq!(genesis.hash, "0");
        assert_eq!(genesis.previous_block_hash, "0");
        assert!(genesis.transactions.is_empty());
        assert!(chain.mempool.is_empty());
    }

    #[test]
    fn test_last_block_on_emptied_chain() {
        let mut chain = Blockchain::new();
        chain.blocks.clear();
        assert!(matches!(chain.last_block(), Err(ChainError::EmptyChain)));
    }

    #[test]
    fn test_add_pending_returns_next_index() {
        let mut chain = Blockchain::new();
        let index = chain
            .add_pending_transaction(Transaction::new(1.0, "a", "b"))
            .unwrap();
        assert_eq!(index, 2);
        assert_eq!(chain.mempool.len(), 1);
    }

    #[test]
    fn test_tip_at_max_index_errors_instead_of_overflowing() {
        let mut chain = Blockchain::new();
        chain.blocks[0].index = u64::MAX;

        assert!(matches!(
            chain.add_pending_transaction(Transaction::new(1.0, "a", "b")),
            Err(ChainError::IndexOverflow(u64::MAX))
        ));
        assert!(matches!(
            chain.next_block_data(),
            Err(ChainError::IndexOverflow(_))
        ));

        let mut follower = chain.blocks[0].clone();
        follower.previous_block_hash = follower.hash.clone();
        follower.index = 0;
        assert_eq!(
            chain.receive_block(follower).unwrap(),
            BlockAcceptance::RejectedStale
        );
    }

    #[test]
    fn test_create_block_moves_pending_pool() {
        let mut chain = Blockchain::new();
        chain
            .add_pending_transaction(Transaction::new(10.0, "A", "B"))
            .unwrap();
        chain
            .add_pending_transaction(Transaction::new(3.0, "B", "C"))
            .unwrap();

        let block = mine_next(&mut chain);

        assert_eq!(block.index, 2);
        assert_eq!(block.previous_block_hash, "0");
        assert_eq!(block.transactions.len(), 2);
        assert!(block.hash.starts_with("0000"));
        assert!(chain.mempool.is_empty());
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_find_block_by_hash() {
        let mut chain = Blockchain::new();
        let block = mine_next(&mut chain);

        assert_eq!(chain.find_block_by_hash(&block.hash), Some(&block));
        assert!(chain.find_block_by_hash("ffff").is_none());
    }

    #[test]
    fn test_find_transaction_returns_containing_block() {
        let mut chain = Blockchain::new();
        let tx = Transaction::new(4.0, "A", "B");
        let id = tx.id().unwrap().to_string();
        chain.add_pending_transaction(tx.clone()).unwrap();
        let block = mine_next(&mut chain);

        let (found, containing) = chain.find_transaction(&id).unwrap();
        assert_eq!(found, &tx);
        assert_eq!(containing.index, block.index);
        assert!(chain.find_transaction("missing").is_none());
    }

    #[test]
    fn test_find_transaction_prefers_first_match() {
        let mut chain = Blockchain::new();
        let first = Transaction::raw(1.0, "A", "B", Some("dup".to_string()));
        let second = Transaction::raw(2.0, "A", "B", Some("dup".to_string()));

        chain.add_pending_transaction(first.clone()).unwrap();
        mine_next(&mut chain);
        chain.add_pending_transaction(second).unwrap();
        mine_next(&mut chain);

        let (found, block) = chain.find_transaction("dup").unwrap();
        assert_eq!(found, &first);
        assert_eq!(block.index, 2);
    }

    #[test]
    fn test_pending_transactions_are_not_searched() {
        let mut chain = Blockchain::new();
        let tx = Transaction::new(4.0, "A", "B");
        let id = tx.id().unwrap().to_string();
        chain.add_pending_transaction(tx).unwrap();

        assert!(chain.find_transaction(&id).is_none());
        assert_eq!(chain.address_summary("A").transactions.len(), 0);
    }

    #[test]
    fn test_receive_block_extending_tip() {
        let mut chain = Blockchain::new();
        let mut peer = chain.clone();
        let block = mine_next(&mut peer);

        chain
            .add_pending_transaction(Transaction::new(1.0, "x", "y"))
            .unwrap();
        assert_eq!(chain.receive_block(block).unwrap(), BlockAcceptance::Accepted);
        assert_eq!(chain.len(), 2);
        assert!(chain.mempool.is_empty());
    }

    #[test]
    fn test_receive_block_with_wrong_parent_is_rejected() {
        let mut chain = Blockchain::new();
        chain
            .add_pending_transaction(Transaction::new(1.0, "x", "y"))
            .unwrap();

        let block = Block {
            index: 2,
            timestamp: 0,
            transactions: vec![],
            nonce: 0,
            hash: "abcd".to_string(),
            previous_block_hash: "not-the-tip".to_string(),
        };

        assert_eq!(
            chain.receive_block(block).unwrap(),
            BlockAcceptance::RejectedStale
        );
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.mempool.len(), 1);
    }

    #[test]
    fn test_block_wire_format() {
        let chain = Blockchain::new();
        let json = serde_json::to_value(&chain.blocks[0]).unwrap();
        assert_eq!(json["previousBlockHash"], "0");
        assert_eq!(json["nonce"], 100);
        assert!(json["transactions"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_and_replace() {
        let mut chain = Blockchain::new();
        chain
            .add_pending_transaction(Transaction::new(1.0, "x", "y"))
            .unwrap();
        let snapshot = chain.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.pending_transactions.len(), 1);

        let mut other = Blockchain::new();
        other.replace(snapshot.chain.clone(), snapshot.pending_transactions.clone());
        assert_eq!(other.snapshot(), snapshot);
    }

    fn proof_for(chain: &Blockchain) -> MinedProof {
        let (previous_hash, data) = chain.next_block_data().unwrap();
        let nonce = mine(&previous_hash, &data).unwrap();
        let hash = digest(&previous_hash, &data, nonce).unwrap();
        MinedProof {
            previous_hash,
            data,
            nonce,
            hash,
        }
    }

    #[test]
    fn test_commit_mined_keeps_late_arrivals_pending() {
        let mut chain = Blockchain::new();
        let early = Transaction::new(1.0, "A", "B");
        chain.add_pending_transaction(early.clone()).unwrap();
        let proof = proof_for(&chain);

        let late = Transaction::new(2.0, "C", "D");
        chain.add_pending_transaction(late.clone()).unwrap();

        let block = chain.commit_mined(&proof).unwrap();
        assert_eq!(block.transactions, vec![early]);
        assert_eq!(block.hash, proof.hash);
        assert_eq!(chain.mempool.transactions(), &[late]);
        assert!(crate::blockchain::is_valid_chain(&chain.blocks));
    }

    #[test]
    fn test_commit_mined_on_moved_tip_is_stale() {
        let mut chain = Blockchain::new();
        let proof = proof_for(&chain);
        mine_next(&mut chain);

        assert!(matches!(
            chain.commit_mined(&proof),
            Err(ChainError::StaleProof)
        ));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_commit_mined_after_pool_replaced_is_stale() {
        let mut chain = Blockchain::new();
        chain
            .add_pending_transaction(Transaction::new(1.0, "A", "B"))
            .unwrap();
        let proof = proof_for(&chain);
        chain.mempool.replace(vec![Transaction::new(9.0, "X", "Y")]);

        assert!(matches!(
            chain.commit_mined(&proof),
            Err(ChainError::StaleProof)
        ));
        assert_eq!(chain.len(), 1);
    }
}
