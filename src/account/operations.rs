//! Extraction of canonical operations from chain data.
//!
//! The indexer only tracks unspent outputs, so history is discovered output
//! by output: each unspent output leads to its creating transaction's
//! included block, which is folded into one `Operation` relative to the
//! watched address. Spent outputs drop out of the index; operations already
//! merged into history survive through the append-only merge.

use crate::account::types::{ClaimAttributes, Operation, OperationDirection, SyncError};
use crate::config::NetworkConfig;
use crate::indexer::{
	Block, IndexerError, OutputIndex, OutputQuery, TRANSACTION_PAYLOAD_TYPE, UnspentOutput,
};
use crate::transaction::address::StardustAddress;
use crate::utils::output_id_hex;

use chrono::DateTime;
use itertools::Itertools;
use std::collections::HashSet;
use tracing::warn;

/// Fetch the operations of `address` booked after `created_after`.
pub(crate) async fn fetch_operations(
	index: &dyn OutputIndex,
	network: &NetworkConfig,
	account_id: &str,
	address: &str,
	created_after: Option<u64>,
) -> Result<Vec<Operation>, SyncError> {
	let our_key_hash =
		StardustAddress::decode(address, &network.bech32_hrp)?.pub_key_hash_hex();
	let query = OutputQuery {
		has_expiration: None,
		created_after,
	};
	let resolved = index.unspent_outputs(address, &query).await?;

	let mut operations = Vec::new();
	let mut seen_transactions = HashSet::new();
	for output in &resolved.outputs {
		// several outputs of one transaction fold into the same operation
		if !seen_transactions.insert(output.transaction_id.clone()) {
			continue;
		}
		let block = match index.included_block(&output.transaction_id).await {
			Ok(block) => block,
			Err(e) => {
				warn!(
					"no included block for transaction {}: {}",
					output.transaction_id, e
				);
				continue;
			}
		};
		if let Some(operation) =
			block_to_operation(index, network, account_id, &our_key_hash, &block, output).await?
		{
			operations.push(operation);
		}
	}

	Ok(operations)
}

/// Fold an included block into one operation relative to the watched
/// address. Returns `None` for non-transaction payloads and zero-value
/// movements.
async fn block_to_operation(
	index: &dyn OutputIndex,
	network: &NetworkConfig,
	account_id: &str,
	our_key_hash: &str,
	block: &Block,
	origin: &UnspentOutput,
) -> Result<Option<Operation>, SyncError> {
	let Some(payload) = &block.payload else {
		return Ok(None);
	};
	if payload.kind != TRANSACTION_PAYLOAD_TYPE {
		return Ok(None);
	}
	let essence = &payload.essence;

	// resolve the source address of every consumed input
	let mut input_key_hashes = Vec::with_capacity(essence.inputs.len());
	for input in &essence.inputs {
		let source_id = output_id_hex(&input.transaction_id, input.transaction_output_index);
		let source = index.output(&source_id).await?;
		if let Some(key_hash) = source.output.address_pub_key_hash() {
			input_key_hashes.push(key_hash.to_string());
		}
	}
	let is_sender = input_key_hashes.iter().any(|kh| kh == our_key_hash);

	let mut own_total = 0u64;
	let mut foreign_total = 0u64;
	let mut own_outputs = Vec::new();
	let mut foreign_outputs = Vec::new();
	for output in &essence.outputs {
		let Some(key_hash) = output.address_pub_key_hash() else {
			continue;
		};
		let amount = output.amount_value().map_err(|e| {
			SyncError::Indexer(IndexerError::Malformed(format!(
				"output of {} has bad amount: {}",
				origin.transaction_id, e
			)))
		})?;
		if key_hash == our_key_hash {
			own_total = own_total.saturating_add(amount);
			own_outputs.push(key_hash.to_string());
		} else {
			foreign_total = foreign_total.saturating_add(amount);
			foreign_outputs.push(key_hash.to_string());
		}
	}

	let (direction, value, recipient_hashes) = if is_sender {
		if foreign_total > 0 {
			// change back to the sender is not part of the moved value
			(OperationDirection::Out, foreign_total, foreign_outputs)
		} else {
			// a self transfer, e.g. reclaiming an expired output
			(OperationDirection::Out, own_total, own_outputs)
		}
	} else {
		(OperationDirection::In, own_total, own_outputs)
	};
	if value == 0 {
		return Ok(None);
	}

	let claim = essence
		.outputs
		.iter()
		.find_map(|output| output.expiration())
		.map(|condition| {
			ClaimAttributes::new(
				origin.transaction_id.clone(),
				origin.output_index,
				condition
					.unix_time
					.and_then(|t| DateTime::from_timestamp(t as i64, 0)),
			)
		});

	Ok(Some(Operation {
		id: format!("{}-{}", origin.transaction_id, direction),
		hash: origin.transaction_id.clone(),
		direction,
		value,
		fee: 0,
		senders: encode_addresses(&input_key_hashes, &network.bech32_hrp)?,
		recipients: encode_addresses(&recipient_hashes, &network.bech32_hrp)?,
		account_id: account_id.to_string(),
		block_height: Some(origin.booked_milestone),
		date: DateTime::from_timestamp(origin.booked_at as i64, 0).unwrap_or_default(),
		claim,
	}))
}

/// Deduplicate key hashes and render them as bech32 addresses.
fn encode_addresses(key_hashes: &[String], hrp: &str) -> Result<Vec<String>, SyncError> {
	key_hashes
		.iter()
		.unique()
		.map(|key_hash| {
			Ok(StardustAddress::from_pub_key_hash_hex(key_hash)?.encode(hrp)?)
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::indexer::testing::{MockIndex, unspent};
	use crate::indexer::{
		BasicOutput, Ed25519Address, EXPIRATION_UNLOCK_CONDITION_TYPE, OutputMetadata,
		OutputResponse, TransactionEssence, TransactionPayload, UnlockCondition, UtxoInput,
		TRANSACTION_ESSENCE_TYPE,
	};

	fn address(seed: u8) -> StardustAddress {
		StardustAddress {
			pub_key_hash: [seed; 32],
		}
	}

	fn transfer_block(inputs: Vec<UtxoInput>, outputs: Vec<BasicOutput>) -> Block {
		Block {
			protocol_version: 2,
			parents: Vec::new(),
			payload: Some(TransactionPayload {
				kind: TRANSACTION_PAYLOAD_TYPE,
				essence: TransactionEssence {
					kind: TRANSACTION_ESSENCE_TYPE,
					network_id: "0".to_string(),
					inputs,
					inputs_commitment: "0xc0ffee".to_string(),
					outputs,
				},
				unlocks: Vec::new(),
			}),
			nonce: "0".to_string(),
		}
	}

	fn source_output(amount: u64, key_hash: &str, transaction_id: &str) -> OutputResponse {
		OutputResponse {
			metadata: OutputMetadata {
				block_id: "0xblock".to_string(),
				transaction_id: transaction_id.to_string(),
				output_index: 0,
				is_spent: true,
				milestone_index_booked: 9,
				milestone_timestamp_booked: 1_699_000_000,
			},
			output: BasicOutput::basic(amount, key_hash),
		}
	}

	fn network() -> NetworkConfig {
		NetworkConfig::shimmer_testnet()
	}

	#[tokio::test]
	async fn outgoing_transfer_with_change_reports_the_moved_value() {
		let ours = address(1);
		let theirs = address(2);
		let our_bech32 = ours.encode("rms").unwrap();

		let mut index = MockIndex::default();
		// the remainder output back to us is how the transfer is discovered
		index.outputs = vec![unspent("0xt1", 1, 10, &ours.pub_key_hash_hex(), None)];
		index.blocks.insert(
			"0xt1".to_string(),
			transfer_block(
				vec![UtxoInput::new("0xs1".to_string(), 0)],
				vec![
					BasicOutput::basic(90, &theirs.pub_key_hash_hex()),
					BasicOutput::basic(10, &ours.pub_key_hash_hex()),
				],
			),
		);
		index.resolved.insert(
			output_id_hex("0xs1", 0),
			source_output(100, &ours.pub_key_hash_hex(), "0xs1"),
		);

		let operations = fetch_operations(&index, &network(), "acct", &our_bech32, None)
			.await
			.unwrap();

		assert_eq!(operations.len(), 1);
		let operation = &operations[0];
		assert_eq!(operation.id, "0xt1-OUT");
		assert_eq!(operation.direction, OperationDirection::Out);
		assert_eq!(operation.value, 90);
		assert_eq!(operation.senders, vec![our_bech32.clone()]);
		assert_eq!(operation.recipients, vec![theirs.encode("rms").unwrap()]);
		assert_eq!(operation.block_height, Some(100));
		assert!(operation.claim.is_none());
	}

	#[tokio::test]
	async fn incoming_transfer_is_reported_in() {
		let ours = address(1);
		let theirs = address(2);
		let our_bech32 = ours.encode("rms").unwrap();

		let mut index = MockIndex::default();
		index.outputs = vec![unspent("0xt2", 0, 40, &ours.pub_key_hash_hex(), None)];
		index.blocks.insert(
			"0xt2".to_string(),
			transfer_block(
				vec![UtxoInput::new("0xs2".to_string(), 0)],
				vec![BasicOutput::basic(40, &ours.pub_key_hash_hex())],
			),
		);
		index.resolved.insert(
			output_id_hex("0xs2", 0),
			source_output(40, &theirs.pub_key_hash_hex(), "0xs2"),
		);

		let operations = fetch_operations(&index, &network(), "acct", &our_bech32, None)
			.await
			.unwrap();

		assert_eq!(operations.len(), 1);
		assert_eq!(operations[0].id, "0xt2-IN");
		assert_eq!(operations[0].direction, OperationDirection::In);
		assert_eq!(operations[0].value, 40);
		assert_eq!(operations[0].senders, vec![theirs.encode("rms").unwrap()]);
	}

	#[tokio::test]
	async fn expiration_output_marks_the_operation_claimable() {
		let ours = address(1);
		let theirs = address(2);
		let our_bech32 = ours.encode("rms").unwrap();

		let mut claim_output = BasicOutput::basic(40, &ours.pub_key_hash_hex());
		claim_output.unlock_conditions.push(UnlockCondition {
			kind: EXPIRATION_UNLOCK_CONDITION_TYPE,
			address: None,
			return_address: Some(Ed25519Address::new(&theirs.pub_key_hash_hex())),
			unix_time: Some(1_800_000_000),
		});

		let mut index = MockIndex::default();
		index.outputs = vec![unspent("0xt3", 0, 40, &ours.pub_key_hash_hex(), None)];
		index.blocks.insert(
			"0xt3".to_string(),
			transfer_block(vec![UtxoInput::new("0xs3".to_string(), 0)], vec![claim_output]),
		);
		index.resolved.insert(
			output_id_hex("0xs3", 0),
			source_output(40, &theirs.pub_key_hash_hex(), "0xs3"),
		);

		let operations = fetch_operations(&index, &network(), "acct", &our_bech32, None)
			.await
			.unwrap();

		let claim = operations[0].claim.as_ref().expect("claim attributes");
		assert!(claim.is_claiming);
		assert_eq!(claim.claim_transaction_id, "0xt3");
		assert_eq!(claim.output_index, 0);
		assert_eq!(
			claim.unlock_deadline.map(|d| d.timestamp()),
			Some(1_800_000_000)
		);
	}

	#[tokio::test]
	async fn missing_included_block_is_skipped() {
		let ours = address(1);
		let our_bech32 = ours.encode("rms").unwrap();

		let mut index = MockIndex::default();
		index.outputs = vec![unspent("0xgone", 0, 10, &ours.pub_key_hash_hex(), None)];

		let operations = fetch_operations(&index, &network(), "acct", &our_bech32, None)
			.await
			.unwrap();
		assert!(operations.is_empty());
	}
}
