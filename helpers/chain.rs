//! In-process, single-writer execution environment.
//!
//! Submissions are queued in FIFO order and applied one at a time by a miner
//! task, one block per transaction. Every state change happens under the
//! ledger lock, so confirmed transactions form a single total order and
//! readers only ever observe confirmed state.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    fmt,
    path::Path,
    sync::Arc,
    time::Duration,
};

use alloy_primitives::{keccak256, Address};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::{
    contract::{resolve_code, Account, Artifacts, CallContext, Code, Revert, Storage},
    error::ChainError,
    receipt::{Log, Receipt, TxHash, TxStatus},
};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TxKind {
    Create { artifact: String },
    Call { to: Address, method: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub kind: TxKind,
    pub args: Value,
}

impl TransactionRequest {
    pub fn deploy(from: Address, artifact: impl Into<String>, args: Value) -> Self {
        Self {
            from,
            kind: TxKind::Create {
                artifact: artifact.into(),
            },
            args,
        }
    }

    pub fn call(from: Address, to: Address, method: impl Into<String>, args: Value) -> Self {
        Self {
            from,
            kind: TxKind::Call {
                to,
                method: method.into(),
            },
            args,
        }
    }

    fn target(&self) -> Option<Address> {
        match &self.kind {
            TxKind::Create { .. } => None,
            TxKind::Call { to, .. } => Some(*to),
        }
    }
}

/// Misbehaviour applied to the next submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Refuse the submission outright.
    Reject(String),
    /// Confirm without executing: a successful receipt with no logs.
    EmptyReceipt,
    /// Execute and record the receipt but never deliver the confirmation.
    WithholdReceipt,
}

/// A submitted transaction awaiting confirmation.
#[derive(Debug)]
pub struct PendingTransaction {
    tx_hash: TxHash,
    confirmation: oneshot::Receiver<Receipt>,
}

impl PendingTransaction {
    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    /// Waits for the receipt. A timeout says nothing about whether the
    /// transaction executed; look the receipt up by hash to find out.
    pub async fn wait(self, timeout: Duration) -> Result<Receipt, ChainError> {
        match tokio::time::timeout(timeout, self.confirmation).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(_)) | Err(_) => Err(ChainError::Unconfirmed {
                tx_hash: self.tx_hash,
                timeout,
            }),
        }
    }
}

/// Serialized ledger contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub block_number: u64,
    pub accounts: Vec<(Address, Account)>,
    pub receipts: Vec<Receipt>,
}

#[derive(Default)]
struct Ledger {
    block_number: u64,
    accounts: BTreeMap<Address, Account>,
    receipts: Vec<Receipt>,
    receipt_index: HashMap<TxHash, usize>,
    faults: VecDeque<Fault>,
    withheld: Vec<oneshot::Sender<Receipt>>,
}

impl Ledger {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let receipt_index = snapshot
            .receipts
            .iter()
            .enumerate()
            .map(|(index, receipt)| (receipt.tx_hash, index))
            .collect();
        Self {
            block_number: snapshot.block_number,
            accounts: snapshot.accounts.into_iter().collect(),
            receipts: snapshot.receipts,
            receipt_index,
            ..Default::default()
        }
    }

    fn has_code(&self, address: Address) -> bool {
        self.accounts
            .get(&address)
            .is_some_and(|account| account.code.is_some())
    }

    fn apply(
        &mut self,
        artifacts: &Artifacts,
        tx_hash: TxHash,
        nonce: u64,
        request: &TransactionRequest,
        fault: Option<&Fault>,
    ) -> Receipt {
        self.block_number += 1;
        let mut logs = Vec::new();
        let mut contract_address = None;

        let status = if fault == Some(&Fault::EmptyReceipt) {
            warn!(%tx_hash, "confirming transaction without executing it");
            TxStatus::Success
        } else {
            let checkpoint = self.accounts.clone();
            match execute(&mut self.accounts, artifacts, &mut logs, request, nonce) {
                Ok(created) => {
                    contract_address = created;
                    TxStatus::Success
                }
                Err(revert) => {
                    self.accounts = checkpoint;
                    logs.clear();
                    debug!(%tx_hash, reason = revert.reason(), "transaction reverted");
                    TxStatus::Reverted(revert.reason().to_owned())
                }
            }
        };

        let receipt = Receipt {
            tx_hash,
            block_number: self.block_number,
            from: request.from,
            to: request.target(),
            contract_address,
            status,
            logs,
        };
        self.receipt_index.insert(tx_hash, self.receipts.len());
        self.receipts.push(receipt.clone());
        debug!(
            %tx_hash,
            block = self.block_number,
            logs = receipt.logs.len(),
            "transaction mined"
        );
        receipt
    }
}

fn execute(
    accounts: &mut BTreeMap<Address, Account>,
    artifacts: &Artifacts,
    logs: &mut Vec<Log>,
    request: &TransactionRequest,
    nonce: u64,
) -> Result<Option<Address>, Revert> {
    match &request.kind {
        TxKind::Create { artifact } => {
            let code = artifacts
                .get(artifact)
                .ok_or_else(|| Revert::new(format!("MissingArtifact({artifact})")))?;
            let address = request.from.create(nonce);
            if accounts
                .get(&address)
                .is_some_and(|account| account.code.is_some())
            {
                return Err(Revert::new(format!("CreateCollision({address})")));
            }
            accounts.insert(
                address,
                Account {
                    nonce: 1,
                    code: Some(Code::Artifact {
                        name: artifact.clone(),
                    }),
                    storage: Storage::new(),
                },
            );
            let mut ctx = CallContext::new(accounts, artifacts, logs, address, request.from);
            code.construct(&mut ctx, &request.args)?;
            Ok(Some(address))
        }
        TxKind::Call { to, method } => {
            let code = resolve_code(&*accounts, artifacts, *to)?;
            let mut ctx = CallContext::new(accounts, artifacts, logs, *to, request.from);
            code.call(&mut ctx, method, &request.args)?;
            Ok(None)
        }
    }
}

fn transaction_hash(request: &TransactionRequest, nonce: u64) -> Result<TxHash, ChainError> {
    let payload =
        serde_json::to_vec(&(request, nonce)).map_err(|err| ChainError::Encoding(err.to_string()))?;
    Ok(keccak256(payload))
}

struct Submission {
    tx_hash: TxHash,
    nonce: u64,
    request: TransactionRequest,
    fault: Option<Fault>,
    confirmation: oneshot::Sender<Receipt>,
}

struct Shared {
    ledger: Mutex<Ledger>,
    artifacts: Artifacts,
}

async fn mine(
    shared: Arc<Shared>,
    mut queue: mpsc::UnboundedReceiver<Submission>,
    block_time: Duration,
) {
    while let Some(submission) = queue.recv().await {
        let Submission {
            tx_hash,
            nonce,
            request,
            fault,
            confirmation,
        } = submission;

        if !block_time.is_zero() {
            tokio::time::sleep(block_time).await;
        }

        let mut ledger = shared.ledger.lock().await;
        let receipt = ledger.apply(&shared.artifacts, tx_hash, nonce, &request, fault.as_ref());
        if fault == Some(Fault::WithholdReceipt) {
            warn!(%tx_hash, "withholding confirmation");
            // Only senders whose submitter is still waiting are worth keeping.
            ledger.withheld.retain(|sender| !sender.is_closed());
            ledger.withheld.push(confirmation);
        } else if confirmation.send(receipt).is_err() {
            debug!(%tx_hash, "submitter stopped waiting for confirmation");
        }
    }
    debug!("miner stopped");
}

/// Handle to a running local chain. Clones share the same ledger.
#[derive(Clone)]
pub struct LocalChain {
    shared: Arc<Shared>,
    submissions: mpsc::UnboundedSender<Submission>,
}

impl fmt::Debug for LocalChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChain")
            .field("artifacts", &self.shared.artifacts)
            .finish_non_exhaustive()
    }
}

impl LocalChain {
    /// Starts an empty auto-mining chain. Must be called within a Tokio runtime.
    pub fn new(artifacts: Artifacts) -> Self {
        Self::with_block_time(artifacts, Duration::ZERO)
    }

    pub fn with_block_time(artifacts: Artifacts, block_time: Duration) -> Self {
        Self::start(artifacts, Ledger::default(), block_time)
    }

    pub fn from_snapshot(artifacts: Artifacts, snapshot: Snapshot, block_time: Duration) -> Self {
        Self::start(artifacts, Ledger::from_snapshot(snapshot), block_time)
    }

    /// Resumes the chain saved at `path`, or starts an empty one if the file
    /// does not exist yet.
    pub async fn open(
        path: &Path,
        artifacts: Artifacts,
        block_time: Duration,
    ) -> Result<Self, ChainError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                info!(
                    path = %path.display(),
                    block = snapshot.block_number,
                    accounts = snapshot.accounts.len(),
                    "resuming chain state"
                );
                Ok(Self::from_snapshot(artifacts, snapshot, block_time))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no saved chain state, starting empty");
                Ok(Self::with_block_time(artifacts, block_time))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn start(artifacts: Artifacts, ledger: Ledger, block_time: Duration) -> Self {
        let shared = Arc::new(Shared {
            ledger: Mutex::new(ledger),
            artifacts,
        });
        let (submissions, queue) = mpsc::unbounded_channel();
        tokio::spawn(mine(Arc::clone(&shared), queue, block_time));
        Self {
            shared,
            submissions,
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), ChainError> {
        let bytes = serde_json::to_vec_pretty(&self.snapshot().await)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        debug!(path = %path.display(), "chain state saved");
        Ok(())
    }

    pub async fn snapshot(&self) -> Snapshot {
        let ledger = self.shared.ledger.lock().await;
        Snapshot {
            block_number: ledger.block_number,
            accounts: ledger
                .accounts
                .iter()
                .map(|(address, account)| (*address, account.clone()))
                .collect(),
            receipts: ledger.receipts.clone(),
        }
    }

    /// Accepts a transaction for mining.
    ///
    /// The sender's nonce is consumed here, so transactions are mined in the
    /// order they were accepted.
    pub async fn submit(
        &self,
        request: TransactionRequest,
    ) -> Result<PendingTransaction, ChainError> {
        let mut ledger = self.shared.ledger.lock().await;

        if let Some(Fault::Reject(reason)) = ledger.faults.front() {
            let reason = reason.clone();
            ledger.faults.pop_front();
            return Err(ChainError::Rejected { reason });
        }
        self.validate(&ledger, &request)?;

        let nonce = ledger
            .accounts
            .get(&request.from)
            .map_or(0, |account| account.nonce);
        let tx_hash = transaction_hash(&request, nonce)?;
        ledger.accounts.entry(request.from).or_default().nonce += 1;
        let fault = ledger.faults.pop_front();

        debug!(%tx_hash, from = %request.from, nonce, "transaction submitted");
        let (confirmation, receiver) = oneshot::channel();
        self.submissions
            .send(Submission {
                tx_hash,
                nonce,
                request,
                fault,
                confirmation,
            })
            .map_err(|_| ChainError::MinerStopped)?;

        Ok(PendingTransaction {
            tx_hash,
            confirmation: receiver,
        })
    }

    fn validate(&self, ledger: &Ledger, request: &TransactionRequest) -> Result<(), ChainError> {
        if request.from.is_zero() {
            return Err(ChainError::Rejected {
                reason: "sender is the zero address".to_owned(),
            });
        }
        match &request.kind {
            TxKind::Create { artifact } if !self.shared.artifacts.contains(artifact) => {
                Err(ChainError::Rejected {
                    reason: format!("unknown artifact {artifact}"),
                })
            }
            TxKind::Call { to, .. } if !ledger.has_code(*to) => Err(ChainError::Rejected {
                reason: format!("no contract at {to}"),
            }),
            _ => Ok(()),
        }
    }

    /// Executes a read-only call against a scratch copy of confirmed state.
    pub async fn view(&self, to: Address, method: &str, args: &Value) -> Result<Value, ChainError> {
        let mut scratch = self.shared.ledger.lock().await.accounts.clone();
        let reverted = |revert: Revert| ChainError::Reverted {
            to,
            reason: revert.reason().to_owned(),
        };

        let code = resolve_code(&scratch, &self.shared.artifacts, to).map_err(reverted)?;
        let mut logs = Vec::new();
        let mut ctx = CallContext::new(
            &mut scratch,
            &self.shared.artifacts,
            &mut logs,
            to,
            Address::ZERO,
        );
        code.call(&mut ctx, method, args).map_err(reverted)
    }

    /// [`LocalChain::view`] with the result decoded into `T`.
    pub async fn view_as<T: DeserializeOwned>(
        &self,
        to: Address,
        method: &str,
        args: &Value,
    ) -> Result<T, ChainError> {
        let value = self.view(to, method, args).await?;
        serde_json::from_value(value)
            .map_err(|err| ChainError::Encoding(format!("{method} returned {err}")))
    }

    pub async fn receipt(&self, tx_hash: TxHash) -> Option<Receipt> {
        let ledger = self.shared.ledger.lock().await;
        ledger
            .receipt_index
            .get(&tx_hash)
            .and_then(|index| ledger.receipts.get(*index))
            .cloned()
    }

    /// Polls for the receipt of a transaction whose confirmation channel is
    /// no longer available.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<Receipt, ChainError> {
        let poll = async {
            loop {
                if let Some(receipt) = self.receipt(tx_hash).await {
                    return receipt;
                }
                tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| ChainError::Unconfirmed { tx_hash, timeout })
    }

    pub async fn code_at(&self, address: Address) -> Option<Code> {
        let ledger = self.shared.ledger.lock().await;
        ledger
            .accounts
            .get(&address)
            .and_then(|account| account.code.clone())
    }

    pub async fn has_code(&self, address: Address) -> bool {
        self.shared.ledger.lock().await.has_code(address)
    }

    pub async fn nonce(&self, address: Address) -> u64 {
        let ledger = self.shared.ledger.lock().await;
        ledger.accounts.get(&address).map_or(0, |account| account.nonce)
    }

    pub async fn block_number(&self) -> u64 {
        self.shared.ledger.lock().await.block_number
    }

    /// Queues a fault for the next submission.
    pub async fn inject_fault(&self, fault: Fault) {
        warn!(?fault, "fault injected");
        self.shared.ledger.lock().await.faults.push_back(fault);
    }
}
