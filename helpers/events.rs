//! Typed events and discovery of events in receipt logs.
//!
//! A mutating call's result is often only reported through the events it
//! emits. Discovery is a pure function over a confirmed [`Receipt`]: logs
//! are matched by event name and emitting contract, never by position, since
//! unrelated events may share the same confirmation.

use alloy_primitives::Address;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::receipt::{Log, Receipt};

/// An event whose arguments are carried as a JSON object in a [`Log`].
pub trait ContractEvent: Serialize + DeserializeOwned {
    const NAME: &'static str;
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("log is a {found} event, expected {expected}")]
    WrongEvent {
        expected: &'static str,
        found: String,
    },

    #[error("malformed {event} arguments: {source}")]
    Arguments {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{event} must encode to a JSON object")]
    NotAnObject { event: &'static str },
}

pub fn encode_event<E: ContractEvent>(event: &E) -> Result<Map<String, Value>, EventDecodeError> {
    match serde_json::to_value(event) {
        Ok(Value::Object(args)) => Ok(args),
        Ok(_) => Err(EventDecodeError::NotAnObject { event: E::NAME }),
        Err(source) => Err(EventDecodeError::Arguments {
            event: E::NAME,
            source,
        }),
    }
}

pub fn decode_log<E: ContractEvent>(log: &Log) -> Result<E, EventDecodeError> {
    if log.name != E::NAME {
        return Err(EventDecodeError::WrongEvent {
            expected: E::NAME,
            found: log.name.clone(),
        });
    }
    serde_json::from_value(Value::Object(log.args.clone())).map_err(|source| {
        EventDecodeError::Arguments {
            event: E::NAME,
            source,
        }
    })
}

/// Logs named `name` that were emitted by `emitter`, in emission order.
pub fn matching_logs<'a>(
    receipt: &'a Receipt,
    name: &'a str,
    emitter: Address,
) -> impl Iterator<Item = &'a Log> + 'a {
    receipt
        .logs
        .iter()
        .filter(move |log| log.name == name && log.address == emitter)
}

/// Finds and decodes the first `E` emitted by `emitter`.
///
/// Returns `None` when the receipt carries no such event.
pub fn find_event<E: ContractEvent>(
    receipt: &Receipt,
    emitter: Address,
) -> Option<Result<E, EventDecodeError>> {
    let mut matches = matching_logs(receipt, E::NAME, emitter);
    let first = matches.next()?;
    let extra = matches.count();
    if extra > 0 {
        tracing::warn!(
            event = E::NAME,
            %emitter,
            tx_hash = %receipt.tx_hash,
            extra,
            "receipt carries more than one matching event, using the first"
        );
    }
    Some(decode_log(first))
}
