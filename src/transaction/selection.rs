//! Input selection for outgoing transfers.
//!
//! Selection works over the unspent outputs in indexer discovery order and
//! is deterministic: the same output set and target always select the same
//! inputs. Outputs under an active return-to-sender condition never take
//! part in ordinary spends; they are only reachable through claim selection.

use crate::indexer::UnspentOutput;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
	#[error("transaction amount is required")]
	AmountRequired,

	#[error("insufficient funds: need {needed}, have {available}")]
	InsufficientFunds { needed: u64, available: u64 },

	#[error("no unspent output found for claim transaction {0}")]
	ClaimOutputNotFound(String),
}

/// Outcome of input selection.
#[derive(Debug, Clone)]
pub struct Selection {
	/// Selected inputs, in discovery order.
	pub inputs: Vec<UnspentOutput>,
	/// Total value of the selected inputs.
	pub consumed: u64,
	/// Excess over the target, returned to the sender as a change output.
	pub remainder: u64,
}

/// Select inputs covering `target` from the spendable outputs.
///
/// A single output matching the target exactly is preferred and selected
/// alone, avoiding a dust remainder. Otherwise outputs are accumulated in
/// discovery order until the target is covered.
pub fn select_inputs(
	outputs: &[UnspentOutput],
	target: u64,
) -> Result<Selection, SelectionError> {
	if target == 0 {
		return Err(SelectionError::AmountRequired);
	}

	let eligible: Vec<&UnspentOutput> = outputs
		.iter()
		.filter(|o| !o.is_spent && o.expiration.is_none())
		.collect();

	let available = eligible
		.iter()
		.fold(0u64, |acc, o| acc.saturating_add(o.amount));
	if available < target {
		return Err(SelectionError::InsufficientFunds {
			needed: target,
			available,
		});
	}

	if let Some(exact) = eligible.iter().find(|o| o.amount == target) {
		return Ok(Selection {
			inputs: vec![(*exact).clone()],
			consumed: target,
			remainder: 0,
		});
	}

	let mut inputs = Vec::new();
	let mut consumed = 0u64;
	for output in eligible {
		inputs.push(output.clone());
		consumed = consumed.saturating_add(output.amount);
		if consumed >= target {
			break;
		}
	}

	Ok(Selection {
		remainder: consumed - target,
		inputs,
		consumed,
	})
}

/// Select the single output a claim transaction consumes.
///
/// Claims are all-or-nothing: exactly the output created by
/// `claim_transaction_id` is consumed, for its full amount.
pub fn select_claim_input(
	outputs: &[UnspentOutput],
	claim_transaction_id: &str,
) -> Result<Selection, SelectionError> {
	let output = outputs
		.iter()
		.find(|o| !o.is_spent && o.transaction_id == claim_transaction_id)
		.ok_or_else(|| SelectionError::ClaimOutputNotFound(claim_transaction_id.to_string()))?;

	Ok(Selection {
		consumed: output.amount,
		remainder: 0,
		inputs: vec![output.clone()],
	})
}
