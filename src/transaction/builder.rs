//! Unsigned transaction assembly
//!
//! This module turns a draft plus a completed input selection into the
//! envelope the signing pipeline uploads to the device: the essence, the
//! inputs commitment binding the exact consumed outputs, and the per-input
//! key-derivation metadata the device uses to re-derive its signing keys.

use crate::account::Account;
use crate::config::NetworkConfig;
use crate::indexer::{BasicOutput, TRANSACTION_ESSENCE_TYPE, TransactionEssence, UtxoInput};
use crate::transaction::address::{AddressError, StardustAddress};
use crate::transaction::selection::{Selection, SelectionError};
use crate::transaction::types::{SigningMetadata, TransactionDraft, UnsignedEnvelope};

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use thiserror::Error;

type Blake2b256 = Blake2b<U32>;

/// Hardened BIP32 derivation offset; both key indices the device re-derives
/// with are hardened.
pub const BIP32_HARDENED: u32 = 0x8000_0000;

#[derive(Error, Debug, Clone)]
pub enum BuildError {
	#[error("a recipient is required")]
	RecipientRequired,

	#[error("unsupported recipient format: {0}")]
	UnsupportedRecipientFormat(AddressError),

	#[error("sender address is not usable on this network: {0}")]
	InvalidSenderAddress(AddressError),

	#[error("failed to encode transaction essence: {0}")]
	Encoding(String),

	#[error(transparent)]
	Selection(#[from] SelectionError),
}

/// Builder for unsigned transaction envelopes
pub struct TransactionBuilder {
	network: NetworkConfig,
}

impl TransactionBuilder {
	pub fn new(network: NetworkConfig) -> Self {
		Self { network }
	}

	/// Assemble the unsigned envelope for a draft and its input selection.
	///
	/// Claim drafts pay the full consumed amount back to the sender; ordinary
	/// drafts pay the draft amount to the recipient with any selection excess
	/// returned to the sender as a remainder output.
	pub fn build(
		&self,
		account: &Account,
		draft: &TransactionDraft,
		selection: Selection,
	) -> Result<UnsignedEnvelope, BuildError> {
		log::info!(
			"building transaction envelope from {} inputs",
			selection.inputs.len()
		);

		let sender = StardustAddress::decode(&account.address, &self.network.bech32_hrp)
			.map_err(BuildError::InvalidSenderAddress)?;

		let (destination, amount) = match &draft.claim {
			Some(_) => (sender.clone(), selection.consumed),
			None => {
				if draft.recipient.is_empty() {
					return Err(BuildError::RecipientRequired);
				}
				let recipient =
					StardustAddress::decode(&draft.recipient, &self.network.bech32_hrp)
						.map_err(BuildError::UnsupportedRecipientFormat)?;
				(recipient, draft.amount)
			}
		};

		let mut outputs = vec![BasicOutput::basic(amount, &destination.pub_key_hash_hex())];
		let mut remainder_index = None;
		if selection.remainder > 0 {
			remainder_index = Some(outputs.len() as u16);
			outputs.push(BasicOutput::basic(
				selection.remainder,
				&sender.pub_key_hash_hex(),
			));
			log::debug!("remainder of {} returns to the sender", selection.remainder);
		}

		let inputs: Vec<UtxoInput> = selection
			.inputs
			.iter()
			.map(|o| UtxoInput::new(o.transaction_id.clone(), o.output_index))
			.collect();
		let consumed: Vec<BasicOutput> = selection.inputs.iter().map(|o| o.to_wire()).collect();
		let inputs_commitment = Self::inputs_commitment(&consumed)?;

		let essence = TransactionEssence {
			kind: TRANSACTION_ESSENCE_TYPE,
			network_id: self.network.network_id().to_string(),
			inputs,
			inputs_commitment,
			outputs,
		};

		let metadata = SigningMetadata {
			bip32_account: BIP32_HARDENED,
			bip32_change: BIP32_HARDENED,
			remainder_index,
		};
		let essence_bytes = Self::essence_bytes(&essence, &metadata)?;
		let digest = Self::digest(&essence_bytes);

		log::info!(
			"envelope ready: {} inputs, {} outputs, commitment {}",
			essence.inputs.len(),
			essence.outputs.len(),
			essence.inputs_commitment
		);

		Ok(UnsignedEnvelope {
			essence,
			consumed,
			essence_bytes,
			digest,
			metadata,
		})
	}

	/// Digest committing to the exact set of consumed outputs. Substituting
	/// any input after this point changes the commitment and therefore the
	/// digest the device displays and signs over.
	fn inputs_commitment(consumed: &[BasicOutput]) -> Result<String, BuildError> {
		let mut hasher = Blake2b256::new();
		for output in consumed {
			let bytes =
				bincode::serialize(output).map_err(|e| BuildError::Encoding(e.to_string()))?;
			hasher.update(&bytes);
		}
		Ok(format!("0x{}", hex::encode(hasher.finalize())))
	}

	/// Serialized essence with one hardened (account, change) index pair
	/// appended per input.
	fn essence_bytes(
		essence: &TransactionEssence,
		metadata: &SigningMetadata,
	) -> Result<Vec<u8>, BuildError> {
		let mut bytes =
			bincode::serialize(essence).map_err(|e| BuildError::Encoding(e.to_string()))?;
		for _ in 0..essence.inputs.len() {
			bytes.extend_from_slice(&metadata.bip32_account.to_le_bytes());
			bytes.extend_from_slice(&metadata.bip32_change.to_le_bytes());
		}
		Ok(bytes)
	}

	fn digest(essence_bytes: &[u8]) -> [u8; 32] {
		let mut hasher = Blake2b256::new();
		hasher.update(essence_bytes);
		hasher.finalize().into()
	}
}
