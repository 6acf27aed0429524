//! Idempotent merging of freshly observed operations into account history.
//!
//! History is append-only and ordered newest first. The operation id
//! (`{transaction_id}-{direction}`) is the merge key: an id already present
//! never produces a duplicate. Confirmed operations are immutable except for
//! their claim attributes, which track whether the claim window is still
//! open. A companion refresh pass re-queries the spent state of every
//! still-claimable output so consumed claim windows are closed even when no
//! new operation mentions them.

use crate::account::types::Operation;
use crate::indexer::{IndexerError, OutputIndex};
use crate::utils::output_id_hex;

use std::collections::HashMap;
use tracing::debug;

/// Merge `incoming` operations into the `existing` newest-first history.
///
/// Idempotent and commutative over repeated application of the same batch:
/// `merge(merge(a, b), b) == merge(a, b)`.
pub fn merge_operations(existing: &[Operation], incoming: &[Operation]) -> Vec<Operation> {
	let mut merged: Vec<Operation> = existing.to_vec();
	let mut index_by_id: HashMap<String, usize> = merged
		.iter()
		.enumerate()
		.map(|(at, op)| (op.id.clone(), at))
		.collect();

	for operation in incoming {
		match index_by_id.get(&operation.id) {
			Some(&at) => {
				if merged[at].is_confirmed() {
					// confirmed history is immutable apart from the claim
					// window state
					merged[at].claim = operation.claim.clone();
				} else {
					// an optimistic operation is superseded wholesale by the
					// observed one
					merged[at] = operation.clone();
				}
			}
			None => {
				index_by_id.insert(operation.id.clone(), merged.len());
				merged.push(operation.clone());
			}
		}
	}

	merged.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
	merged
}

/// Close the claim window of every operation whose claimable output has
/// been spent in the meantime.
pub async fn refresh_claim_status(
	operations: &mut [Operation],
	index: &dyn OutputIndex,
) -> Result<(), IndexerError> {
	for operation in operations.iter_mut() {
		let Some(claim) = operation.claim.as_mut() else {
			continue;
		};
		if !claim.is_claiming {
			continue;
		}
		let output_id = output_id_hex(&claim.claim_transaction_id, claim.output_index);
		let metadata = index.output_metadata(&output_id).await?;
		if metadata.is_spent {
			debug!("claim window of {} is consumed", operation.id);
			claim.is_claiming = false;
		}
	}
	Ok(())
}
