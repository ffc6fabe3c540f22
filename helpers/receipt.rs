//! Confirmation data produced by the local chain.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type TxHash = B256;

/// A named event emitted by a contract during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    /// Contract that emitted the event.
    pub address: Address,
    pub name: String,
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Reverted(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    /// Address of the contract created by a deployment transaction.
    pub contract_address: Option<Address>,
    pub status: TxStatus,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status == TxStatus::Success
    }

    pub fn revert_reason(&self) -> Option<&str> {
        match &self.status {
            TxStatus::Success => None,
            TxStatus::Reverted(reason) => Some(reason),
        }
    }
}
