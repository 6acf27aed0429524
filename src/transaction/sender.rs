//!
//! Broadcast of signed transactions.
//!
//! Parses the opaque signature envelope back into a block, submits it once
//! and finalizes the optimistic operation with the network-assigned id.
//! There is deliberately no retry at this layer: a rejection surfaces
//! unchanged so the caller can decide between re-signing (the inputs may be
//! stale) and re-broadcasting the same envelope.

use crate::account::Operation;
use crate::indexer::{Block, BlockSubmitter};
use crate::transaction::types::SignedTransaction;

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum BroadcastError {
	#[error("broadcast rejected by the network: {0}")]
	Rejected(String),

	#[error("signature envelope is not a valid block: {0}")]
	Envelope(#[from] serde_json::Error),
}

/// Submits signed envelopes to the network
pub struct Broadcaster {
	submitter: Arc<dyn BlockSubmitter>,
}

impl Broadcaster {
	pub fn new(submitter: Arc<dyn BlockSubmitter>) -> Self {
		Self { submitter }
	}

	/// Submit a signed transaction and finalize its operation id.
	pub async fn broadcast(&self, signed: &SignedTransaction) -> Result<Operation, BroadcastError> {
		let block: Block = serde_json::from_str(&signed.signature)?;
		debug!("submitting signed block");

		let block_id = self
			.submitter
			.submit_block(&block)
			.await
			.map_err(|e| BroadcastError::Rejected(e.to_string()))?;

		let mut operation = signed.operation.clone();
		operation.id = format!("{}-{}", block_id, operation.direction);
		operation.hash = block_id;

		info!("broadcast accepted, operation {}", operation.id);
		Ok(operation)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::account::OperationDirection;
	use crate::bridge::CurrencyFamily;
	use crate::indexer::testing::MockSubmitter;
	use crate::indexer::{PROTOCOL_VERSION, TRANSACTION_PAYLOAD_TYPE};
	use crate::transaction::types::TransactionDraft;
	use chrono::Utc;

	fn signed_fixture() -> SignedTransaction {
		let block = Block {
			protocol_version: PROTOCOL_VERSION,
			parents: Vec::new(),
			payload: Some(crate::indexer::TransactionPayload {
				kind: TRANSACTION_PAYLOAD_TYPE,
				essence: crate::indexer::TransactionEssence {
					kind: crate::indexer::TRANSACTION_ESSENCE_TYPE,
					network_id: "0".to_string(),
					inputs: Vec::new(),
					inputs_commitment: "0xc0ffee".to_string(),
					outputs: Vec::new(),
				},
				unlocks: Vec::new(),
			}),
			nonce: "0".to_string(),
		};
		SignedTransaction {
			draft: TransactionDraft {
				family: CurrencyFamily::Stardust,
				amount: 10,
				recipient: "rms1qrecipient".to_string(),
				use_all_amount: false,
				claim: None,
			},
			operation: Operation {
				id: "stardust:2:rms1qme:--OUT".to_string(),
				hash: String::new(),
				direction: OperationDirection::Out,
				value: 10,
				fee: 0,
				senders: vec!["rms1qme".to_string()],
				recipients: vec!["rms1qrecipient".to_string()],
				account_id: "stardust:2:rms1qme:".to_string(),
				block_height: None,
				date: Utc::now(),
				claim: None,
			},
			signature: serde_json::to_string(&block).unwrap(),
			expiration_date: None,
		}
	}

	#[tokio::test]
	async fn broadcast_finalizes_the_operation_id() {
		let submitter = Arc::new(MockSubmitter {
			block_id: "0xb10c".to_string(),
			..MockSubmitter::default()
		});
		let broadcaster = Broadcaster::new(submitter.clone());

		let operation = broadcaster.broadcast(&signed_fixture()).await.unwrap();
		assert_eq!(operation.id, "0xb10c-OUT");
		assert_eq!(operation.hash, "0xb10c");
		assert_eq!(submitter.submitted.lock().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn rejection_surfaces_without_retry() {
		let submitter = Arc::new(MockSubmitter {
			reject_with: Some("invalid proof of work".to_string()),
			..MockSubmitter::default()
		});
		let broadcaster = Broadcaster::new(submitter.clone());

		let err = broadcaster.broadcast(&signed_fixture()).await.unwrap_err();
		assert!(matches!(err, BroadcastError::Rejected(_)));
		assert!(submitter.submitted.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn garbage_envelope_is_rejected_before_submission() {
		let submitter = Arc::new(MockSubmitter::default());
		let broadcaster = Broadcaster::new(submitter.clone());

		let mut signed = signed_fixture();
		signed.signature = "not json".to_string();
		let err = broadcaster.broadcast(&signed).await.unwrap_err();
		assert!(matches!(err, BroadcastError::Envelope(_)));
		assert!(submitter.submitted.lock().unwrap().is_empty());
	}
}
