//! Transaction module: the transfer record carried by blocks and the pending pool

pub mod types;

pub use types::*;
