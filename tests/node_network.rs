//! Multi-node behaviour over an in-process peer network: joining, block and
//! transaction propagation, partial fan-out failure, consensus and mining
//! cancellation.

mod common;

use common::LocalNetwork;
use powledger::blockchain::{is_valid_chain, BlockAcceptance, Blockchain};
use powledger::error::ChainError;
use powledger::miner::{digest, mine};
use powledger::node::NodeState;
use powledger::transaction::Transaction;
use std::time::Duration;

const TEST_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::test]
async fn test_bootstrap_joins_network() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let net = LocalNetwork::new();
        let a = net.spawn_node("http://a", &[]);
        let b = net.spawn_node("http://b", &["http://a"]);
        b.bootstrap().await.unwrap();

        let c = net.spawn_node("http://c", &["http://a"]);
        c.bootstrap().await.unwrap();

        assert_eq!(*c.state.read().await, NodeState::Ready);
        assert!(a.peers.contains("http://b"));
        assert!(a.peers.contains("http://c"));
        assert!(b.peers.contains("http://c"));
        assert!(c.peers.contains("http://a"));
        assert!(c.peers.contains("http://b"));
        assert!(!c.peers.contains("http://c"));
    })
    .await
    .expect("test_bootstrap_joins_network timed out");
}

#[tokio::test]
async fn test_mined_block_and_reward_reach_every_peer() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let net = LocalNetwork::new();
        let a = net.spawn_node("http://a", &[]);
        let b = net.spawn_node("http://b", &["http://a"]);
        let c = net.spawn_node("http://c", &["http://a"]);
        b.bootstrap().await.unwrap();
        c.bootstrap().await.unwrap();

        let (tx, block_index, report) = a
            .create_and_broadcast_transaction(10.0, "alice", "bob")
            .await
            .unwrap();
        assert_eq!(block_index, 2);
        assert!(report.all_delivered());
        assert_eq!(report.peers.len(), 2);
        assert_eq!(b.snapshot().await.pending_transactions, vec![tx.clone()]);

        let outcome = a.mine().await.unwrap();
        assert_eq!(outcome.block.index, 2);
        assert_eq!(outcome.block.transactions, vec![tx]);
        assert!(outcome.peers.all_delivered());
        assert!(outcome
            .peers
            .peers
            .iter()
            .all(|p| p.detail.as_deref() == Some("accepted")));
        assert_eq!(outcome.reward.sender, "00");
        assert_eq!(outcome.reward.recipient, "miner-a");
        assert_eq!(a.blocks_mined(), 1);

        for node in [&a, &b, &c] {
            let snapshot = node.snapshot().await;
            assert_eq!(snapshot.len(), 2);
            assert_eq!(snapshot.chain[1].hash, outcome.block.hash);
            assert_eq!(snapshot.pending_transactions, vec![outcome.reward.clone()]);
            assert!(is_valid_chain(&snapshot.chain));
        }

        let summary = c.blockchain.read().await.address_summary("bob");
        assert_eq!(summary.balance, 10.0);
    })
    .await
    .expect("test_mined_block_and_reward_reach_every_peer timed out");
}

#[tokio::test]
async fn test_unreachable_peer_does_not_block_others() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let net = LocalNetwork::new();
        let a = net.spawn_node("http://a", &[]);
        let b = net.spawn_node("http://b", &["http://a"]);
        b.bootstrap().await.unwrap();

        a.register_peer("http://ghost");
        assert_eq!(a.peers.len(), 2);

        let outcome = a.mine().await.unwrap();
        assert_eq!(outcome.peers.delivered(), 1);
        assert_eq!(outcome.peers.failed(), 1);
        let ghost = outcome
            .peers
            .peers
            .iter()
            .find(|p| p.peer == "http://ghost")
            .unwrap();
        assert!(!ghost.delivered);
        assert!(ghost.detail.is_some());

        assert_eq!(b.snapshot().await.len(), 2);

        let consensus = a.consensus().await.unwrap();
        assert!(!consensus.replaced);
        assert_eq!(consensus.peers.failed(), 1);
    })
    .await
    .expect("test_unreachable_peer_does_not_block_others timed out");
}

#[tokio::test]
async fn test_consensus_adopts_longer_peer_chain() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let net = LocalNetwork::new();
        let a = net.spawn_node("http://a", &[]);
        a.mine().await.unwrap();
        a.mine().await.unwrap();

        let late = net.spawn_node("http://late", &[]);
        late.submit_transaction(Transaction::new(1.0, "x", "y"))
            .await
            .unwrap();
        late.register_peer("http://a");

        let outcome = late.consensus().await.unwrap();
        assert!(outcome.replaced);
        assert!(outcome.rejected.is_none());

        let ours = late.snapshot().await;
        let theirs = a.snapshot().await;
        assert_eq!(ours.chain, theirs.chain);
        assert_eq!(ours.pending_transactions, theirs.pending_transactions);

        // Already in sync: nothing changes on a second round.
        assert!(!late.consensus().await.unwrap().replaced);
    })
    .await
    .expect("test_consensus_adopts_longer_peer_chain timed out");
}

#[tokio::test]
async fn test_consensus_ignores_tampered_longer_chain() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let net = LocalNetwork::new();
        let a = net.spawn_node("http://a", &[]);
        a.submit_transaction(Transaction::new(5.0, "A", "B"))
            .await
            .unwrap();
        a.mine().await.unwrap();
        a.blockchain.write().await.blocks[1].transactions[0].amount = 500.0;

        let b = net.spawn_node("http://b", &[]);
        b.register_peer("http://a");
        let outcome = b.consensus().await.unwrap();

        assert!(!outcome.replaced);
        assert_eq!(outcome.chain.len(), 1);
        assert_eq!(outcome.rejected.map(|v| v.index), Some(1));
        assert_eq!(b.snapshot().await.len(), 1);
    })
    .await
    .expect("test_consensus_ignores_tampered_longer_chain timed out");
}

#[tokio::test]
async fn test_stale_block_is_rejected() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let net = LocalNetwork::new();
        let a = net.spawn_node("http://a", &[]);
        let b = net.spawn_node("http://b", &[]);

        a.mine().await.unwrap();
        let first = b.mine().await.unwrap();

        // b's block 2 does not extend a's block 2.
        let acceptance = a.receive_block(first.block).await.unwrap();
        assert_eq!(acceptance, BlockAcceptance::RejectedStale);
        assert_eq!(a.snapshot().await.len(), 2);
    })
    .await
    .expect("test_stale_block_is_rejected timed out");
}

#[tokio::test]
async fn test_peer_block_cancels_in_flight_mining() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let net = LocalNetwork::new();
        let a = net.spawn_node("http://a", &[]);

        // A competing block 2 built on the same genesis.
        let mut rival = Blockchain::new();
        rival
            .add_pending_transaction(Transaction::new(3.0, "P", "Q"))
            .unwrap();
        let (previous_hash, data) = rival.next_block_data().unwrap();
        let nonce = mine(&previous_hash, &data).unwrap();
        let hash = digest(&previous_hash, &data, nonce).unwrap();
        let rival_block = rival.create_block(nonce, previous_hash, hash);

        let miner = a.clone();
        let mining = tokio::spawn(async move { miner.mine().await });
        while !a.is_mining() && !mining.is_finished() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let acceptance = a.receive_block(rival_block.clone()).await.unwrap();
        let mined = mining.await.unwrap();

        match acceptance {
            BlockAcceptance::Accepted => {
                assert!(matches!(
                    mined,
                    Err(ChainError::MiningCancelled) | Err(ChainError::StaleProof)
                ));
                assert_eq!(a.snapshot().await.chain[1], rival_block);
            }
            // The local search won the race and committed first.
            BlockAcceptance::RejectedStale => assert!(mined.is_ok()),
        }

        let snapshot = a.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert!(is_valid_chain(&snapshot.chain));
        assert!(!a.is_mining());
    })
    .await
    .expect("test_peer_block_cancels_in_flight_mining timed out");
}
