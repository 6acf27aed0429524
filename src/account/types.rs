use crate::indexer::IndexerError;
use crate::transaction::address::AddressError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the account id encoding scheme.
pub const ACCOUNT_ID_VERSION: u8 = 2;
/// Version of the claim-attribute structure embedded in operations.
pub const CLAIM_ATTRIBUTES_VERSION: u8 = 1;

/// Direction of a value movement relative to the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationDirection {
	#[serde(rename = "IN")]
	In,
	#[serde(rename = "OUT")]
	Out,
}

impl fmt::Display for OperationDirection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OperationDirection::In => write!(f, "IN"),
			OperationDirection::Out => write!(f, "OUT"),
		}
	}
}

/// Claim state attached to an operation whose transaction carries a
/// time-bounded return-to-sender output.
///
/// This is a closed, versioned structure: these are the only operation
/// fields that may change after the operation is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAttributes {
	/// Schema version of this structure.
	pub version: u8,
	/// Whether the claim window is still open (the output is unspent).
	pub is_claiming: bool,
	/// Transaction that created the claimable output.
	pub claim_transaction_id: String,
	/// Index of the claimable output inside that transaction.
	pub output_index: u16,
	/// When the return-to-sender condition takes effect.
	pub unlock_deadline: Option<DateTime<Utc>>,
}

impl ClaimAttributes {
	pub fn new(
		claim_transaction_id: String,
		output_index: u16,
		unlock_deadline: Option<DateTime<Utc>>,
	) -> Self {
		Self {
			version: CLAIM_ATTRIBUTES_VERSION,
			is_claiming: true,
			claim_transaction_id,
			output_index,
			unlock_deadline,
		}
	}
}

/// One canonical historical value movement of an account.
///
/// The id is `{transaction_id}-{direction}` and is the merge key: equal ids
/// denote the same on-chain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
	pub id: String,
	/// Transaction (or, for an optimistic operation, block) hash.
	pub hash: String,
	pub direction: OperationDirection,
	/// Moved amount in base units.
	pub value: u64,
	/// Network fee; always zero on this feeless family.
	pub fee: u64,
	pub senders: Vec<String>,
	pub recipients: Vec<String>,
	pub account_id: String,
	/// Booking milestone; `None` while the operation is unconfirmed.
	pub block_height: Option<u32>,
	pub date: DateTime<Utc>,
	/// Claim state; only present when the transaction carries a
	/// return-to-sender output.
	pub claim: Option<ClaimAttributes>,
}

impl Operation {
	pub fn is_confirmed(&self) -> bool {
		self.block_height.is_some()
	}
}

/// Immutable snapshot of a synced account.
///
/// Every sync produces a fresh snapshot; previous snapshots are never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
	pub id: String,
	/// Receiving address watched by this account.
	pub address: String,
	pub derivation_mode: String,
	/// Total value of unspent outputs, claim-locked outputs included.
	pub balance: u64,
	/// Value spendable right now; excludes outputs awaiting claim
	/// finalization.
	pub spendable_balance: u64,
	pub operations_count: usize,
	/// Operation history, newest first.
	pub operations: Vec<Operation>,
	/// Ledger index the snapshot was computed at.
	pub block_height: u32,
}

/// Derive the stable account id from the currency family, watched address
/// and derivation mode.
pub fn encode_account_id(family: &str, address: &str, derivation_mode: &str) -> String {
	format!(
		"{}:{}:{}:{}",
		family, ACCOUNT_ID_VERSION, address, derivation_mode
	)
}

/// Error types for account synchronization
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Indexer error: {0}")]
	Indexer(#[from] IndexerError),

	#[error("Address error: {0}")]
	Address(#[from] AddressError),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn account_id_embeds_family_address_and_mode() {
		let id = encode_account_id("stardust", "rms1qfoo", "");
		assert_eq!(id, "stardust:2:rms1qfoo:");
		assert!(id.starts_with("stardust:"));
	}
}
