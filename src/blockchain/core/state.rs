use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

use super::chain::Block;

/// Every committed transaction touching an address, with its net balance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressSummary {
    #[serde(rename = "addressTransactions")]
    pub transactions: Vec<Transaction>,
    #[serde(rename = "addressBalance")]
    pub balance: f64,
}

/// Linear scan over all blocks. Received amounts add, sent amounts subtract;
/// a self-transfer contributes both and nets to zero.
pub fn summarize_address(blocks: &[Block], address: &str) -> AddressSummary {
    let mut summary = AddressSummary::default();

    for tx in blocks.iter().flat_map(|b| b.transactions.iter()) {
        if !tx.involves(address) {
            continue;
        }
        if tx.recipient == address {
            summary.balance += tx.amount;
        }
        if tx.sender == address {
            summary.balance -= tx.amount;
        }
        summary.transactions.push(tx.clone());
    }

    summary
}
