/// Transaction types for powledger
use serde::{Deserialize, Serialize, Serializer};

/// A value transfer between two identifiers.
///
/// Field declaration order is significant: it is the order `serde_json` emits,
/// and therefore part of the canonical bytes hashed by the proof-of-work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(serialize_with = "serialize_amount")]
    pub amount: f64,
    pub sender: String,
    pub recipient: String,
    #[serde(
        rename = "transactionId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transaction_id: Option<String>,
}

impl Transaction {
    /// Create a transaction with a freshly allocated id.
    pub fn new(amount: f64, sender: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            amount,
            sender: sender.into(),
            recipient: recipient.into(),
            transaction_id: Some(generate_transaction_id()),
        }
    }

    /// A transaction as submitted by a peer or client, id possibly absent.
    pub fn raw(
        amount: f64,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        transaction_id: Option<String>,
    ) -> Self {
        Self {
            amount,
            sender: sender.into(),
            recipient: recipient.into(),
            transaction_id,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// True when `address` is either side of the transfer.
    pub fn involves(&self, address: &str) -> bool {
        self.sender == address || self.recipient == address
    }
}

/// Largest integer an IEEE double holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Whole amounts are written as integers (`10`, not `10.0`), the way
/// JavaScript nodes print numbers. Fractional amounts use the shortest
/// round-trip form, which both sides agree on.
fn serialize_amount<S: Serializer>(amount: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if amount.fract() == 0.0 && amount.abs() <= MAX_SAFE_INTEGER {
        serializer.serialize_i64(*amount as i64)
    } else {
        serializer.serialize_f64(*amount)
    }
}

/// 32 lowercase hex characters from 16 random bytes.
pub fn generate_transaction_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}
