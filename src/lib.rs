//! powledger - a single proof-of-work ledger node with longest-valid-chain consensus
//!
//! # Architecture
//!
//! ## Ledger Engine
//! - [`blockchain`] - Block store, address accounting and chain validation
//! - [`transaction`] - The transfer record
//! - [`mempool`] - Pending transaction pool
//! - [`miner`] - Proof-of-work hashing and cancellable nonce search
//! - [`consensus`] - Longest-valid-chain resolution and tip extension rule
//!
//! ## Node & Networking
//! - [`node`] - Single owner of ledger state, mining and peer fan-out
//! - [`network`] - Peer registry and HTTP peer client
//! - [`api`] - REST API served to clients and peers
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Ledger Engine
// ============================================================================
pub mod blockchain;
pub mod consensus;
pub mod mempool;
pub mod miner;
pub mod transaction;

// ============================================================================
// Node & Networking
// ============================================================================
pub mod network;
pub mod node;

#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
