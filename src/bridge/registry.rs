//! Currency family dispatch.
//!
//! One registry is constructed at process start and passed explicitly to
//! whoever needs a bridge; there is no ambient global. Families are a closed
//! enum, string keys are parsed at the edge and unknown ones are rejected
//! with a typed error carrying the offending identifier.

use crate::account::{Account, ClaimAttributes, Operation, SyncError};
use crate::indexer::IndexerError;
use crate::signing::{DeviceHandle, SigningError, SigningSession};
use crate::transaction::builder::BuildError;
use crate::transaction::sender::BroadcastError;
use crate::transaction::types::{
	DraftPatch, SignedTransaction, TransactionDraft, TransactionStatus,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// The currency families this process knows how to bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurrencyFamily {
	/// UTXO chains with time-bounded claim outputs.
	Stardust,
}

impl CurrencyFamily {
	pub fn as_str(&self) -> &'static str {
		match self {
			CurrencyFamily::Stardust => "stardust",
		}
	}
}

impl fmt::Display for CurrencyFamily {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for CurrencyFamily {
	type Err = BridgeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"stardust" => Ok(CurrencyFamily::Stardust),
			other => Err(BridgeError::CurrencyNotSupported(other.to_string())),
		}
	}
}

#[derive(Error, Debug)]
pub enum BridgeError {
	#[error("currency family '{0}' is not supported")]
	CurrencyNotSupported(String),

	#[error("operation '{0}' is not supported by this bridge")]
	OperationNotSupported(&'static str),

	#[error(transparent)]
	Sync(#[from] SyncError),

	#[error(transparent)]
	Build(#[from] BuildError),

	#[error(transparent)]
	Signing(#[from] SigningError),

	#[error(transparent)]
	Broadcast(#[from] BroadcastError),

	#[error(transparent)]
	Indexer(#[from] IndexerError),
}

/// Currency-level operations, independent of a particular account.
#[async_trait]
pub trait CurrencyBridge: Send + Sync {
	/// Preload currency-level data. Nothing to do for this family.
	async fn preload(&self) -> Result<serde_json::Value, BridgeError> {
		Ok(serde_json::Value::Object(Default::default()))
	}

	/// Rehydrate previously preloaded data. Nothing to do for this family.
	fn hydrate(&self, _data: serde_json::Value) {}

	/// Discover the account behind an address with a fresh sync.
	async fn scan_accounts(
		&self,
		address: &str,
		derivation_mode: &str,
	) -> Result<Account, BridgeError>;
}

/// The per-account operation table of one currency family.
#[async_trait]
pub trait AccountBridge: Send + Sync {
	/// Produce a fresh account snapshot, incrementally on top of `previous`.
	async fn sync(
		&self,
		address: &str,
		previous: Option<&Account>,
	) -> Result<Account, BridgeError>;

	/// An empty draft for the account.
	fn create_transaction(&self, account: &Account) -> TransactionDraft;

	/// Apply a field-wise patch to a draft.
	fn update_transaction(&self, draft: TransactionDraft, patch: DraftPatch) -> TransactionDraft;

	/// Resolve network-dependent draft fields, e.g. the send-max amount.
	async fn prepare_transaction(
		&self,
		account: &Account,
		draft: TransactionDraft,
	) -> Result<TransactionDraft, BridgeError>;

	/// Validate a draft without touching the device.
	async fn get_transaction_status(
		&self,
		account: &Account,
		draft: &TransactionDraft,
	) -> Result<TransactionStatus, BridgeError>;

	/// Largest amount an ordinary spend can move right now.
	async fn estimate_max_spendable(&self, account: &Account) -> Result<u64, BridgeError>;

	/// The account's fresh receiving address.
	fn receive(&self, account: &Account) -> Result<String, BridgeError>;

	/// Build the transaction and start a device signing session for it.
	/// Selection and build errors surface here, before any device round
	/// trip.
	async fn sign_operation(
		&self,
		account: &Account,
		draft: &TransactionDraft,
		device: &DeviceHandle,
	) -> Result<SigningSession, BridgeError>;

	/// Reclaim an expired claim output. Families without claim outputs keep
	/// the default.
	async fn claim_operation(
		&self,
		_account: &Account,
		_claim: &ClaimAttributes,
		_device: &DeviceHandle,
	) -> Result<SigningSession, BridgeError> {
		Err(BridgeError::OperationNotSupported("claim_operation"))
	}

	/// Broadcast a signed transaction and finalize its operation.
	async fn broadcast(&self, signed: &SignedTransaction) -> Result<Operation, BridgeError>;
}

impl fmt::Debug for dyn AccountBridge {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("dyn AccountBridge")
	}
}

/// Bridge lookup table, keyed by currency family.
#[derive(Default)]
pub struct CurrencyBridgeRegistry {
	currency: HashMap<CurrencyFamily, Arc<dyn CurrencyBridge>>,
	account: HashMap<CurrencyFamily, Arc<dyn AccountBridge>>,
}

impl CurrencyBridgeRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(
		&mut self,
		family: CurrencyFamily,
		currency: Arc<dyn CurrencyBridge>,
		account: Arc<dyn AccountBridge>,
	) {
		self.currency.insert(family, currency);
		self.account.insert(family, account);
	}

	pub fn get_currency_bridge(
		&self,
		family: CurrencyFamily,
	) -> Result<Arc<dyn CurrencyBridge>, BridgeError> {
		self.currency
			.get(&family)
			.cloned()
			.ok_or_else(|| BridgeError::CurrencyNotSupported(family.to_string()))
	}

	/// Resolve the account bridge from the family encoded in the account id.
	pub fn get_account_bridge(
		&self,
		account: &Account,
	) -> Result<Arc<dyn AccountBridge>, BridgeError> {
		let family_key = account.id.split(':').next().unwrap_or_default();
		let family = CurrencyFamily::from_str(family_key)?;
		self.account
			.get(&family)
			.cloned()
			.ok_or_else(|| BridgeError::CurrencyNotSupported(family.to_string()))
	}
}
