//! Chain index integration for Stardust networks
//!
//! This module provides the client and types for talking to a node's core
//! REST API and its indexer plugin. The indexer tracks the unspent outputs
//! of an address; the core API resolves outputs, their metadata and the
//! blocks transactions were included in, and accepts signed blocks for
//! broadcast.

/// REST client plus the `OutputIndex`/`BlockSubmitter` seams
mod client;
/// Wire and domain type definitions for index data
mod types;

pub use client::*;
pub use types::*;

#[cfg(test)]
pub(crate) mod testing {
	use super::*;
	use async_trait::async_trait;
	use std::collections::HashMap;
	use std::sync::Mutex;

	/// In-memory `OutputIndex` used by sync, merge and bridge tests.
	#[derive(Default)]
	pub struct MockIndex {
		pub ledger_index: u32,
		pub outputs: Vec<UnspentOutput>,
		pub resolved: HashMap<String, OutputResponse>,
		pub metadata: HashMap<String, OutputMetadata>,
		pub blocks: HashMap<String, Block>,
	}

	#[async_trait]
	impl OutputIndex for MockIndex {
		async fn unspent_outputs(
			&self,
			_address: &str,
			query: &OutputQuery,
		) -> Result<UnspentOutputs, IndexerError> {
			let outputs = self
				.outputs
				.iter()
				.filter(|o| match query.has_expiration {
					Some(true) => o.expiration.is_some(),
					Some(false) => o.expiration.is_none(),
					None => true,
				})
				.filter(|o| match query.created_after {
					Some(after) => o.booked_at > after,
					None => true,
				})
				.cloned()
				.collect();
			Ok(UnspentOutputs {
				ledger_index: self.ledger_index,
				outputs,
			})
		}

		async fn output(&self, output_id: &str) -> Result<OutputResponse, IndexerError> {
			self.resolved
				.get(output_id)
				.cloned()
				.ok_or(IndexerError::NoData)
		}

		async fn output_metadata(&self, output_id: &str) -> Result<OutputMetadata, IndexerError> {
			self.metadata
				.get(output_id)
				.cloned()
				.ok_or(IndexerError::NoData)
		}

		async fn included_block(&self, transaction_id: &str) -> Result<Block, IndexerError> {
			self.blocks
				.get(transaction_id)
				.cloned()
				.ok_or(IndexerError::NoData)
		}
	}

	/// `BlockSubmitter` double recording what was submitted.
	#[derive(Default)]
	pub struct MockSubmitter {
		pub block_id: String,
		pub reject_with: Option<String>,
		pub submitted: Mutex<Vec<Block>>,
	}

	#[async_trait]
	impl BlockSubmitter for MockSubmitter {
		async fn submit_block(&self, block: &Block) -> Result<String, IndexerError> {
			if let Some(reason) = &self.reject_with {
				return Err(IndexerError::Status {
					status: 400,
					message: reason.clone(),
				});
			}
			self.submitted
				.lock()
				.expect("submitter mutex poisoned")
				.push(block.clone());
			Ok(self.block_id.clone())
		}
	}

	/// Shorthand for building an unspent output fixture.
	pub fn unspent(
		transaction_id: &str,
		output_index: u16,
		amount: u64,
		address: &str,
		expiration: Option<ExpirationUnlock>,
	) -> UnspentOutput {
		UnspentOutput {
			id: crate::utils::output_id_hex(transaction_id, output_index),
			transaction_id: transaction_id.to_string(),
			output_index,
			amount,
			address: address.to_string(),
			is_spent: false,
			expiration,
			booked_milestone: 100,
			booked_at: 1_700_000_000,
		}
	}
}
