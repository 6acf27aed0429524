//! Account synchronization.
//!
//! Each sync resolves the watched address's unspent outputs, computes the
//! balances, fetches the operations booked since the newest confirmed one
//! already known, refreshes claim windows on prior history and merges. The
//! result is a fresh immutable snapshot; the previous snapshot is never
//! touched. At most one sync per address is in flight at a time, while
//! distinct addresses sync in parallel.

use crate::account::merge::{merge_operations, refresh_claim_status};
use crate::account::operations::fetch_operations;
use crate::account::types::{Account, SyncError, encode_account_id};
use crate::bridge::CurrencyFamily;
use crate::config::NetworkConfig;
use crate::indexer::{OutputIndex, OutputQuery};

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Orchestrates output queries, operation extraction and merging into
/// account snapshots.
pub struct AccountSynchronizer {
	index: Arc<dyn OutputIndex>,
	network: NetworkConfig,
	/// Per-address guards serializing in-flight syncs.
	in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AccountSynchronizer {
	pub fn new(index: Arc<dyn OutputIndex>, network: NetworkConfig) -> Self {
		Self {
			index,
			network,
			in_flight: Mutex::new(HashMap::new()),
		}
	}

	async fn sync_guard(&self, address: &str) -> Arc<Mutex<()>> {
		let mut guards = self.in_flight.lock().await;
		guards.entry(address.to_string()).or_default().clone()
	}

	/// Produce a fresh snapshot of the account behind `address`.
	///
	/// Incremental: operations are only fetched past the newest confirmed
	/// operation of `previous`. The input snapshot is never mutated.
	pub async fn sync(
		&self,
		address: &str,
		derivation_mode: &str,
		previous: Option<&Account>,
	) -> Result<Account, SyncError> {
		let guard = self.sync_guard(address).await;
		let _in_flight = guard.lock().await;
		info!("syncing account {}", address);

		let resolved = self
			.index
			.unspent_outputs(address, &OutputQuery::default())
			.await?;

		let mut balance = 0u64;
		let mut spendable_balance = 0u64;
		for output in &resolved.outputs {
			if output.is_spent {
				continue;
			}
			balance = balance.saturating_add(output.amount);
			// outputs awaiting claim finalization count towards the balance
			// but are not spendable
			if output.expiration.is_none() {
				spendable_balance = spendable_balance.saturating_add(output.amount);
			}
		}

		let account_id =
			encode_account_id(CurrencyFamily::Stardust.as_str(), address, derivation_mode);
		let created_after = previous.and_then(|account| {
			account
				.operations
				.iter()
				.filter(|op| op.is_confirmed())
				.map(|op| op.date.timestamp() as u64)
				.max()
		});
		let incoming = fetch_operations(
			self.index.as_ref(),
			&self.network,
			&account_id,
			address,
			created_after,
		)
		.await?;

		let mut prior = previous
			.map(|account| account.operations.clone())
			.unwrap_or_default();
		refresh_claim_status(&mut prior, self.index.as_ref()).await?;
		let operations = merge_operations(&prior, &incoming);

		info!(
			"account {} synced: balance {} ({} spendable), {} operations, ledger index {}",
			address,
			balance,
			spendable_balance,
			operations.len(),
			resolved.ledger_index
		);

		Ok(Account {
			id: account_id,
			address: address.to_string(),
			derivation_mode: derivation_mode.to_string(),
			balance,
			spendable_balance,
			operations_count: operations.len(),
			operations,
			block_height: resolved.ledger_index,
		})
	}
}

/// Sync several accounts concurrently. Serialization applies per address
/// only; the futures run independently.
pub async fn sync_accounts(
	synchronizer: &AccountSynchronizer,
	targets: &[(String, String, Option<Account>)],
) -> Vec<Result<Account, SyncError>> {
	join_all(
		targets
			.iter()
			.map(|(address, mode, previous)| synchronizer.sync(address, mode, previous.as_ref())),
	)
	.await
}
