// core.rs splits ledger responsibilities into submodules: the block store,
// address accounting and whole-chain validation.
pub mod chain;
pub mod state;
pub mod validation;

pub use chain::*;
pub use state::*;
pub use validation::*;
