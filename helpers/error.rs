//! Error types shared by the chain, the contract clients and the scripts.

use std::{fmt, time::Duration};

use alloy_primitives::Address;
use thiserror::Error;

use crate::{address::InvalidAddress, events::EventDecodeError, receipt::TxHash};

/// Errors raised by the local execution environment.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The environment refused to accept the transaction.
    #[error("transaction rejected: {reason}")]
    Rejected { reason: String },

    /// The transaction was accepted but no confirmation arrived in time.
    #[error("transaction {tx_hash} was not confirmed within {timeout:?}")]
    Unconfirmed { tx_hash: TxHash, timeout: Duration },

    /// A read-only call reverted.
    #[error("call to {to} reverted: {reason}")]
    Reverted { to: Address, reason: String },

    /// The miner task is gone; nothing submitted now would ever be confirmed.
    #[error("miner is not running")]
    MinerStopped,

    #[error("abi codec error: {0}")]
    Encoding(String),

    #[error("chain state i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("chain state snapshot is malformed: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Which part of the deployment protocol an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Deployment,
    Construction,
    Creation,
    Discovery,
    Query,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Deployment => "deployment",
            Stage::Construction => "construction",
            Stage::Creation => "creation",
            Stage::Discovery => "discovery",
            Stage::Query => "query",
        };
        f.write_str(name)
    }
}

/// Failures of the logic registry / jar factory protocol.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("deployment of {artifact} failed: {reason}")]
    DeploymentFailure { artifact: String, reason: String },

    #[error("deployment {tx_hash} is not yet confirmed")]
    NotYetConfirmed { tx_hash: TxHash },

    #[error("invalid logic reference: {reason}")]
    InvalidLogicReference { reason: String },

    #[error("invalid treasury {treasury}: {reason}")]
    InvalidTreasury {
        treasury: String,
        #[source]
        reason: InvalidAddress,
    },

    #[error("{address} is not a {expected} contract")]
    UnexpectedContract { address: Address, expected: String },

    #[error("jar creation was not accepted: {reason}")]
    SubmissionFailure { reason: String },

    /// The creation may or may not have happened.
    #[error("jar creation {tx_hash} was not confirmed; reconcile before retrying")]
    UnconfirmedCreation { tx_hash: TxHash },

    /// The creation was confirmed but its log carries no creation event.
    #[error("confirmation {tx_hash} carries no {event} event from {emitter}")]
    MissingCreationEvent {
        tx_hash: TxHash,
        event: &'static str,
        emitter: Address,
    },

    #[error(transparent)]
    MalformedEvent(#[from] EventDecodeError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl RegistryError {
    pub fn stage(&self) -> Stage {
        match self {
            RegistryError::DeploymentFailure { .. } | RegistryError::NotYetConfirmed { .. } => {
                Stage::Deployment
            }
            RegistryError::InvalidLogicReference { .. } | RegistryError::InvalidTreasury { .. } => {
                Stage::Construction
            }
            RegistryError::SubmissionFailure { .. } | RegistryError::UnconfirmedCreation { .. } => {
                Stage::Creation
            }
            RegistryError::MissingCreationEvent { .. } | RegistryError::MalformedEvent(_) => {
                Stage::Discovery
            }
            RegistryError::UnexpectedContract { .. } | RegistryError::Chain(_) => Stage::Query,
        }
    }

    /// True when the true ledger state is unknown and the caller must
    /// re-query the registry before retrying.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            RegistryError::UnconfirmedCreation { .. }
                | RegistryError::MissingCreationEvent { .. }
                | RegistryError::MalformedEvent(_)
        )
    }
}
