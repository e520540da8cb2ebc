//! Error types for powledger

use thiserror::Error;

use crate::blockchain::ViolationKind;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("Chain is empty")]
    EmptyChain,
    #[error("Invalid chain: {kind} violation at block position {index}")]
    InvalidChain { index: usize, kind: ViolationKind },
    #[error("Block index {0} has no successor")]
    IndexOverflow(u64),
    #[error("Proof was computed on a chain tip that is no longer current")]
    StaleProof,
    #[error("Mining was cancelled")]
    MiningCancelled,
    #[error("Background task failed: {0}")]
    TaskFailed(String),
    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
