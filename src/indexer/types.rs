//! Types for the node REST and indexer plugin APIs

use serde::{Deserialize, Serialize};

/// Wire tag for a basic output.
pub const BASIC_OUTPUT_TYPE: u8 = 3;
/// Wire tag for a transaction essence.
pub const TRANSACTION_ESSENCE_TYPE: u8 = 1;
/// Wire tag for a transaction payload inside a block.
pub const TRANSACTION_PAYLOAD_TYPE: u8 = 6;
/// Wire tag for an address unlock condition.
pub const ADDRESS_UNLOCK_CONDITION_TYPE: u8 = 0;
/// Wire tag for an expiration (return-to-sender) unlock condition.
pub const EXPIRATION_UNLOCK_CONDITION_TYPE: u8 = 3;
/// Wire tag for an Ed25519 address.
pub const ED25519_ADDRESS_TYPE: u8 = 0;
/// Wire tag for an Ed25519 signature.
pub const ED25519_SIGNATURE_TYPE: u8 = 0;
/// Wire tag for a signature unlock.
pub const SIGNATURE_UNLOCK_TYPE: u8 = 0;
/// Wire tag for a reference unlock (points at an earlier signature unlock).
pub const REFERENCE_UNLOCK_TYPE: u8 = 1;
/// Protocol version stamped on submitted blocks.
pub const PROTOCOL_VERSION: u8 = 2;

/// One page of output ids from the indexer plugin.
///
/// The indexer only tracks unspent outputs; each item is an output id that has
/// to be resolved against the core API for its content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputsPage {
	/// Ledger index the page was computed at.
	pub ledger_index: u32,
	/// Cursor for the next page; absent or empty on the last page.
	#[serde(default)]
	pub cursor: Option<String>,
	/// Output ids matching the query.
	pub items: Vec<String>,
}

/// An output together with its booking metadata, as returned by the core API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputResponse {
	pub metadata: OutputMetadata,
	pub output: BasicOutput,
}

/// Booking metadata for a single output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetadata {
	/// Block the output was booked in.
	pub block_id: String,
	/// Transaction that created the output.
	pub transaction_id: String,
	/// Index of the output inside its creating transaction.
	pub output_index: u16,
	/// Whether the output has been consumed by a later transaction.
	pub is_spent: bool,
	/// Milestone index at which the output was booked.
	#[serde(default)]
	pub milestone_index_booked: u32,
	/// Unix timestamp of the booking milestone.
	#[serde(default)]
	pub milestone_timestamp_booked: u64,
}

/// An Ed25519 address in native key-hash form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ed25519Address {
	#[serde(rename = "type")]
	pub kind: u8,
	pub pub_key_hash: String,
}

impl Ed25519Address {
	pub fn new(pub_key_hash: &str) -> Self {
		Self {
			kind: ED25519_ADDRESS_TYPE,
			pub_key_hash: pub_key_hash.to_string(),
		}
	}
}

/// A single unlock condition on an output.
///
/// Modeled as a flat struct with optional fields rather than an enum: the wire
/// format discriminates on a numeric `type` tag and most fields only apply to
/// some kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockCondition {
	#[serde(rename = "type")]
	pub kind: u8,
	/// Owning address, for address unlock conditions.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<Ed25519Address>,
	/// Sender the output falls back to, for expiration unlock conditions.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub return_address: Option<Ed25519Address>,
	/// Unix timestamp at which the expiration unlock takes effect.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unix_time: Option<u64>,
}

impl UnlockCondition {
	/// Plain address unlock condition for the given key hash.
	pub fn address(pub_key_hash: &str) -> Self {
		Self {
			kind: ADDRESS_UNLOCK_CONDITION_TYPE,
			address: Some(Ed25519Address::new(pub_key_hash)),
			return_address: None,
			unix_time: None,
		}
	}

	/// Whether this is a return-to-sender expiration condition.
	pub fn is_expiration(&self) -> bool {
		self.kind == EXPIRATION_UNLOCK_CONDITION_TYPE && self.return_address.is_some()
	}
}

/// A basic output as carried by the core API and transaction payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicOutput {
	#[serde(rename = "type")]
	pub kind: u8,
	/// Amount in base units, carried as a decimal string on the wire.
	pub amount: String,
	#[serde(default)]
	pub native_tokens: Vec<serde_json::Value>,
	pub unlock_conditions: Vec<UnlockCondition>,
	#[serde(default)]
	pub features: Vec<serde_json::Value>,
}

impl BasicOutput {
	/// A basic output paying `amount` to the given key hash.
	pub fn basic(amount: u64, pub_key_hash: &str) -> Self {
		Self {
			kind: BASIC_OUTPUT_TYPE,
			amount: amount.to_string(),
			native_tokens: Vec::new(),
			unlock_conditions: vec![UnlockCondition::address(pub_key_hash)],
			features: Vec::new(),
		}
	}

	/// Parse the wire amount string.
	pub fn amount_value(&self) -> Result<u64, std::num::ParseIntError> {
		self.amount.parse()
	}

	/// Key hash of the owning address, if the output has an address unlock.
	pub fn address_pub_key_hash(&self) -> Option<&str> {
		self.unlock_conditions
			.iter()
			.find(|c| c.kind == ADDRESS_UNLOCK_CONDITION_TYPE)
			.and_then(|c| c.address.as_ref())
			.map(|a| a.pub_key_hash.as_str())
	}

	/// The expiration unlock condition, if the output carries one.
	pub fn expiration(&self) -> Option<&UnlockCondition> {
		self.unlock_conditions.iter().find(|c| c.is_expiration())
	}
}

/// Reference to an output being consumed as a transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoInput {
	#[serde(rename = "type")]
	pub kind: u8,
	pub transaction_id: String,
	pub transaction_output_index: u16,
}

impl UtxoInput {
	pub fn new(transaction_id: String, transaction_output_index: u16) -> Self {
		Self {
			kind: 0,
			transaction_id,
			transaction_output_index,
		}
	}
}

/// The signable core of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEssence {
	#[serde(rename = "type")]
	pub kind: u8,
	/// Network id the transaction is bound to, as a decimal string.
	pub network_id: String,
	pub inputs: Vec<UtxoInput>,
	/// Digest committing to the exact set of consumed outputs.
	pub inputs_commitment: String,
	pub outputs: Vec<BasicOutput>,
}

/// An Ed25519 signature produced by the signing device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ed25519Signature {
	#[serde(rename = "type")]
	pub kind: u8,
	pub public_key: String,
	pub signature: String,
}

/// Unlock for one input: either a fresh signature or a reference to an
/// earlier unlock signed by the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unlock {
	#[serde(rename = "type")]
	pub kind: u8,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signature: Option<Ed25519Signature>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reference: Option<u16>,
}

impl Unlock {
	pub fn signature(public_key: String, signature: String) -> Self {
		Self {
			kind: SIGNATURE_UNLOCK_TYPE,
			signature: Some(Ed25519Signature {
				kind: ED25519_SIGNATURE_TYPE,
				public_key,
				signature,
			}),
			reference: None,
		}
	}

	pub fn reference(index: u16) -> Self {
		Self {
			kind: REFERENCE_UNLOCK_TYPE,
			signature: None,
			reference: Some(index),
		}
	}
}

/// A signed transaction payload: essence plus one unlock per input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
	#[serde(rename = "type")]
	pub kind: u8,
	pub essence: TransactionEssence,
	pub unlocks: Vec<Unlock>,
}

/// A block as submitted to and returned by the node.
///
/// Parents and proof-of-work nonce are filled in by the node on submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
	pub protocol_version: u8,
	pub parents: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payload: Option<TransactionPayload>,
	pub nonce: String,
}

/// Response to a block submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBlockResponse {
	pub block_id: String,
}

/// Filter for unspent-output queries against the indexer.
#[derive(Debug, Clone, Default)]
pub struct OutputQuery {
	/// Restrict to outputs with (true) or without (false) an expiration
	/// unlock condition; `None` returns both.
	pub has_expiration: Option<bool>,
	/// Only outputs booked strictly after this unix timestamp.
	pub created_after: Option<u64>,
}

impl OutputQuery {
	/// Outputs that are eligible for ordinary spends.
	pub fn spendable() -> Self {
		Self {
			has_expiration: Some(false),
			created_after: None,
		}
	}

	/// Outputs locked behind a return-to-sender expiration, i.e. claim
	/// candidates.
	pub fn claimable() -> Self {
		Self {
			has_expiration: Some(true),
			created_after: None,
		}
	}
}

/// The time-bounded return-to-sender condition of an unspent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationUnlock {
	/// Key hash of the sender the output returns to after the deadline.
	pub return_address: String,
	/// Unix timestamp at which the return condition takes effect.
	pub unix_time: u64,
}

/// An unspent output resolved into the form the selection and sync layers
/// work with. Ephemeral: fetched per query, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
	/// Output id (transaction id + output index) as used by the node APIs.
	pub id: String,
	/// Transaction that created the output.
	pub transaction_id: String,
	/// Index of the output inside its creating transaction.
	pub output_index: u16,
	/// Amount in base units.
	pub amount: u64,
	/// Key hash of the owning address.
	pub address: String,
	/// Whether the output has already been consumed.
	pub is_spent: bool,
	/// Return-to-sender condition, present on claim outputs.
	pub expiration: Option<ExpirationUnlock>,
	/// Milestone index at which the output was booked.
	pub booked_milestone: u32,
	/// Unix timestamp at which the output was booked.
	pub booked_at: u64,
}

impl UnspentOutput {
	/// Reconstruct the wire form of this output, as needed for the inputs
	/// commitment of a consuming transaction.
	pub fn to_wire(&self) -> BasicOutput {
		let mut conditions = vec![UnlockCondition::address(&self.address)];
		if let Some(expiration) = &self.expiration {
			conditions.push(UnlockCondition {
				kind: EXPIRATION_UNLOCK_CONDITION_TYPE,
				address: None,
				return_address: Some(Ed25519Address::new(&expiration.return_address)),
				unix_time: Some(expiration.unix_time),
			});
		}
		BasicOutput {
			kind: BASIC_OUTPUT_TYPE,
			amount: self.amount.to_string(),
			native_tokens: Vec::new(),
			unlock_conditions: conditions,
			features: Vec::new(),
		}
	}
}

/// A resolved set of unspent outputs together with the ledger index the
/// query was answered at.
#[derive(Debug, Clone)]
pub struct UnspentOutputs {
	pub ledger_index: u32,
	pub outputs: Vec<UnspentOutput>,
}

/// Error types for node and indexer queries
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("node returned status {status}: {message}")]
	Status { status: u16, message: String },

	#[error("indexer retry budget exhausted: {0}")]
	Timeout(String),

	#[error("malformed indexer payload: {0}")]
	Malformed(String),

	#[error("no data returned")]
	NoData,
}
