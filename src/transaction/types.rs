use crate::account::{ClaimAttributes, Operation};
use crate::bridge::CurrencyFamily;
use crate::indexer::{BasicOutput, TransactionEssence};
use crate::transaction::builder::BuildError;
use crate::transaction::selection::SelectionError;

use chrono::{DateTime, Utc};

/// A transfer being drafted by the user.
///
/// Built fresh per user action and immutable once handed to the signing
/// pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDraft {
	pub family: CurrencyFamily,
	/// Amount in base units; ignored in claim mode, where the claimed
	/// output is consumed for its full value.
	pub amount: u64,
	pub recipient: String,
	/// Spend the whole spendable balance; resolved by `prepare_transaction`.
	pub use_all_amount: bool,
	/// Claim context of the operation being reclaimed, if any.
	pub claim: Option<ClaimAttributes>,
}

/// Field-wise patch applied to a draft.
#[derive(Debug, Clone, Default)]
pub struct DraftPatch {
	pub amount: Option<u64>,
	pub recipient: Option<String>,
	pub use_all_amount: Option<bool>,
	pub claim: Option<ClaimAttributes>,
}

/// Key-derivation data the signing device needs alongside the essence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningMetadata {
	/// Hardened BIP32 account-level index.
	pub bip32_account: u32,
	/// Hardened BIP32 change-level index.
	pub bip32_change: u32,
	/// Position of the remainder output, when one exists, so the device can
	/// recognize change returning to the sender.
	pub remainder_index: Option<u16>,
}

/// An unsigned transaction ready for the signing pipeline.
#[derive(Debug, Clone)]
pub struct UnsignedEnvelope {
	/// The signable essence.
	pub essence: TransactionEssence,
	/// Wire form of the consumed outputs the commitment binds.
	pub consumed: Vec<BasicOutput>,
	/// Serialized essence with per-input key indices appended; uploaded to
	/// the device for on-screen confirmation.
	pub essence_bytes: Vec<u8>,
	/// BLAKE2b-256 digest of `essence_bytes`.
	pub digest: [u8; 32],
	pub metadata: SigningMetadata,
}

impl UnsignedEnvelope {
	pub fn input_count(&self) -> usize {
		self.essence.inputs.len()
	}
}

/// A fully signed transaction awaiting broadcast.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
	pub draft: TransactionDraft,
	/// Locally synthesized unconfirmed operation.
	pub operation: Operation,
	/// The signed block, JSON-serialized; opaque to everything but the
	/// broadcaster.
	pub signature: String,
	pub expiration_date: Option<DateTime<Utc>>,
}

/// Validation result for a draft, field errors attached to the field they
/// belong to.
#[derive(Debug, Clone, Default)]
pub struct TransactionStatus {
	pub recipient_error: Option<BuildError>,
	pub amount_error: Option<SelectionError>,
	/// Always zero on this feeless family.
	pub estimated_fees: u64,
	pub amount: u64,
	pub total_spent: u64,
}

impl TransactionStatus {
	pub fn is_valid(&self) -> bool {
		self.recipient_error.is_none() && self.amount_error.is_none()
	}
}
