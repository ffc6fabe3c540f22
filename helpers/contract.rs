//! Interface between the local chain and the contract code it executes.
//!
//! Contract code is stateless: every account owns its own storage and the
//! code runs against the storage of whichever account is being called. A
//! clone account carries no code of its own, only the address of the
//! implementation whose code it borrows.

use std::{collections::BTreeMap, fmt, sync::Arc};

use alloy_primitives::Address;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    events::{encode_event, ContractEvent},
    receipt::Log,
};

const MAX_CALL_DEPTH: usize = 64;
const MAX_CLONE_HOPS: usize = 8;

pub type Storage = BTreeMap<String, Value>;

/// Aborts the current transaction, undoing all of its effects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Revert {
    reason: String,
}

impl Revert {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new(format!("UnknownMethod({method})"))
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<serde_json::Error> for Revert {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("AbiDecode({err})"))
    }
}

pub trait Contract: Send + Sync + 'static {
    /// Runs once when the contract is deployed.
    fn construct(&self, _ctx: &mut CallContext<'_>, _args: &Value) -> Result<(), Revert> {
        Ok(())
    }

    fn call(&self, ctx: &mut CallContext<'_>, method: &str, args: &Value)
        -> Result<Value, Revert>;
}

/// Contract code available for deployment, keyed by artifact name.
#[derive(Clone, Default)]
pub struct Artifacts {
    code: BTreeMap<String, Arc<dyn Contract>>,
}

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, code: impl Contract) -> Self {
        self.code.insert(name.to_owned(), Arc::new(code));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Contract>> {
        self.code.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.code.contains_key(name)
    }
}

impl fmt::Debug for Artifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.code.keys()).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Code {
    Artifact { name: String },
    Clone { implementation: Address },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub nonce: u64,
    pub code: Option<Code>,
    pub storage: Storage,
}

/// Execution context handed to contract code for a single call frame.
pub struct CallContext<'a> {
    accounts: &'a mut BTreeMap<Address, Account>,
    artifacts: &'a Artifacts,
    logs: &'a mut Vec<Log>,
    this: Address,
    caller: Address,
    depth: usize,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(
        accounts: &'a mut BTreeMap<Address, Account>,
        artifacts: &'a Artifacts,
        logs: &'a mut Vec<Log>,
        this: Address,
        caller: Address,
    ) -> Self {
        Self {
            accounts,
            artifacts,
            logs,
            this,
            caller,
            depth: 0,
        }
    }

    /// The account whose storage this frame reads and writes.
    pub fn this(&self) -> Address {
        self.this
    }

    pub fn caller(&self) -> Address {
        self.caller
    }

    pub fn has_code(&self, address: Address) -> bool {
        self.accounts
            .get(&address)
            .is_some_and(|account| account.code.is_some())
    }

    /// The code installed at `address`, without following clones.
    pub fn code_at(&self, address: Address) -> Option<&Code> {
        self.accounts
            .get(&address)
            .and_then(|account| account.code.as_ref())
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Revert> {
        self.accounts
            .get(&self.this)
            .and_then(|account| account.storage.get(key))
            .map(|value| T::deserialize(value))
            .transpose()
            .map_err(Revert::from)
    }

    pub fn store<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), Revert> {
        let value = serde_json::to_value(value)?;
        self.accounts
            .entry(self.this)
            .or_default()
            .storage
            .insert(key.to_owned(), value);
        Ok(())
    }

    pub fn emit<E: ContractEvent>(&mut self, event: &E) -> Result<(), Revert> {
        let args = encode_event(event).map_err(|err| Revert::new(err.to_string()))?;
        self.logs.push(Log {
            address: self.this,
            name: E::NAME.to_owned(),
            args,
        });
        Ok(())
    }

    /// Creates a minimal clone of `implementation` at a fresh address derived
    /// from this contract's address and nonce.
    pub fn clone_contract(&mut self, implementation: Address) -> Result<Address, Revert> {
        if !self.has_code(implementation) {
            return Err(Revert::new(format!("CloneTargetHasNoCode({implementation})")));
        }

        let creator = self.accounts.entry(self.this).or_default();
        let nonce = creator.nonce;
        creator.nonce += 1;

        let address = self.this.create(nonce);
        if self.has_code(address) {
            return Err(Revert::new(format!("CreateCollision({address})")));
        }
        self.accounts.insert(
            address,
            Account {
                nonce: 1,
                code: Some(Code::Clone { implementation }),
                storage: Storage::new(),
            },
        );
        Ok(address)
    }

    /// Calls `method` on `to` with this contract as the caller.
    pub fn call(&mut self, to: Address, method: &str, args: &Value) -> Result<Value, Revert> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Revert::new("CallDepthExceeded"));
        }
        let code = resolve_code(&*self.accounts, self.artifacts, to)?;
        let mut frame = CallContext {
            accounts: &mut *self.accounts,
            artifacts: self.artifacts,
            logs: &mut *self.logs,
            this: to,
            caller: self.this,
            depth: self.depth + 1,
        };
        code.call(&mut frame, method, args)
    }
}

/// Finds the code that runs when `address` is called, following clones to
/// their implementation.
pub(crate) fn resolve_code(
    accounts: &BTreeMap<Address, Account>,
    artifacts: &Artifacts,
    address: Address,
) -> Result<Arc<dyn Contract>, Revert> {
    let mut current = address;
    for _ in 0..MAX_CLONE_HOPS {
        match accounts.get(&current).and_then(|account| account.code.as_ref()) {
            Some(Code::Artifact { name }) => {
                return artifacts
                    .get(name)
                    .ok_or_else(|| Revert::new(format!("MissingArtifact({name})")));
            }
            Some(Code::Clone { implementation }) => current = *implementation,
            None => return Err(Revert::new(format!("NoCode({address})"))),
        }
    }
    Err(Revert::new(format!("CloneChainTooDeep({address})")))
}
