// Thin re-export module: implementation is in `blockchain/core.rs`, split into
// the block store, address accounting and chain validation.

pub mod core;
pub use core::*;
