//! The UTXO/claim-output family bridge.
//!
//! Wires the synchronizer, coin selection, builder, signing pipeline and
//! broadcaster into the bridge operation table. Selection and build run
//! before any device interaction so a draft that cannot be funded or
//! addressed fails without a wasted round trip.

use crate::account::{Account, AccountSynchronizer, ClaimAttributes, Operation};
use crate::bridge::registry::{AccountBridge, BridgeError, CurrencyBridge, CurrencyFamily};
use crate::config::NetworkConfig;
use crate::indexer::{BlockSubmitter, OutputIndex, OutputQuery};
use crate::signing::{DeviceHandle, SigningEvent, SigningPipeline, SigningRequest, SigningSession};
use crate::transaction::address::StardustAddress;
use crate::transaction::builder::{BuildError, TransactionBuilder};
use crate::transaction::selection::{SelectionError, select_claim_input, select_inputs};
use crate::transaction::sender::Broadcaster;
use crate::transaction::types::{
	DraftPatch, SignedTransaction, TransactionDraft, TransactionStatus,
};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

pub struct StardustBridge {
	index: Arc<dyn OutputIndex>,
	broadcaster: Broadcaster,
	builder: TransactionBuilder,
	synchronizer: AccountSynchronizer,
	network: NetworkConfig,
}

impl StardustBridge {
	pub fn new(
		index: Arc<dyn OutputIndex>,
		submitter: Arc<dyn BlockSubmitter>,
		network: NetworkConfig,
	) -> Self {
		Self {
			broadcaster: Broadcaster::new(submitter),
			builder: TransactionBuilder::new(network.clone()),
			synchronizer: AccountSynchronizer::new(index.clone(), network.clone()),
			index,
			network,
		}
	}

	/// Sign and, once signed, broadcast in one flow, forwarding every
	/// lifecycle event to `events`.
	///
	/// Returns the finalized operation, or `None` when the session was
	/// cancelled before assembly. Broadcast only ever happens after the
	/// pipeline reached its signed terminal state.
	pub async fn send_operation(
		&self,
		account: &Account,
		draft: &TransactionDraft,
		device: &DeviceHandle,
		events: mpsc::Sender<SigningEvent>,
	) -> Result<Option<Operation>, BridgeError> {
		let mut session = self.sign_operation(account, draft, device).await?;
		while let Some(event) = session.next_event().await {
			match event {
				SigningEvent::Signed(signed) => {
					let signed_transaction = (*signed).clone();
					let _ = events.send(SigningEvent::Signed(signed)).await;
					let operation = self.broadcast(&signed_transaction).await?;
					let _ = events
						.send(SigningEvent::Broadcasted {
							operation: operation.clone(),
						})
						.await;
					return Ok(Some(operation));
				}
				SigningEvent::Cancelled { reason } => {
					let _ = events.send(SigningEvent::Cancelled { reason }).await;
					return Ok(None);
				}
				SigningEvent::Failed(error) => {
					let _ = events.send(SigningEvent::Failed(error.clone())).await;
					return Err(BridgeError::Signing(error));
				}
				other => {
					let _ = events.send(other).await;
				}
			}
		}
		Ok(None)
	}
}

#[async_trait]
impl CurrencyBridge for StardustBridge {
	async fn scan_accounts(
		&self,
		address: &str,
		derivation_mode: &str,
	) -> Result<Account, BridgeError> {
		info!("scanning for an account behind {}", address);
		Ok(self.synchronizer.sync(address, derivation_mode, None).await?)
	}
}

#[async_trait]
impl AccountBridge for StardustBridge {
	async fn sync(
		&self,
		address: &str,
		previous: Option<&Account>,
	) -> Result<Account, BridgeError> {
		let derivation_mode = previous
			.map(|account| account.derivation_mode.clone())
			.unwrap_or_default();
		Ok(self
			.synchronizer
			.sync(address, &derivation_mode, previous)
			.await?)
	}

	fn create_transaction(&self, _account: &Account) -> TransactionDraft {
		TransactionDraft {
			family: CurrencyFamily::Stardust,
			amount: 0,
			recipient: String::new(),
			use_all_amount: false,
			claim: None,
		}
	}

	fn update_transaction(
		&self,
		mut draft: TransactionDraft,
		patch: DraftPatch,
	) -> TransactionDraft {
		if let Some(amount) = patch.amount {
			draft.amount = amount;
		}
		if let Some(recipient) = patch.recipient {
			draft.recipient = recipient;
		}
		if let Some(use_all_amount) = patch.use_all_amount {
			draft.use_all_amount = use_all_amount;
		}
		if let Some(claim) = patch.claim {
			draft.claim = Some(claim);
		}
		draft
	}

	async fn prepare_transaction(
		&self,
		account: &Account,
		mut draft: TransactionDraft,
	) -> Result<TransactionDraft, BridgeError> {
		if draft.use_all_amount {
			draft.amount = self.estimate_max_spendable(account).await?;
		}
		Ok(draft)
	}

	async fn get_transaction_status(
		&self,
		account: &Account,
		draft: &TransactionDraft,
	) -> Result<TransactionStatus, BridgeError> {
		let mut status = TransactionStatus {
			estimated_fees: 0,
			amount: draft.amount,
			total_spent: draft.amount,
			..TransactionStatus::default()
		};

		// claim drafts carry no user-entered fields to validate
		if draft.claim.is_some() {
			return Ok(status);
		}

		if draft.recipient.is_empty() {
			status.recipient_error = Some(BuildError::RecipientRequired);
		} else if let Err(e) = StardustAddress::decode(&draft.recipient, &self.network.bech32_hrp)
		{
			status.recipient_error = Some(BuildError::UnsupportedRecipientFormat(e));
		}

		if draft.amount == 0 && !draft.use_all_amount {
			status.amount_error = Some(SelectionError::AmountRequired);
		} else if draft.amount > account.spendable_balance {
			status.amount_error = Some(SelectionError::InsufficientFunds {
				needed: draft.amount,
				available: account.spendable_balance,
			});
		}

		Ok(status)
	}

	async fn estimate_max_spendable(&self, account: &Account) -> Result<u64, BridgeError> {
		Ok(account.spendable_balance)
	}

	fn receive(&self, account: &Account) -> Result<String, BridgeError> {
		Ok(account.address.clone())
	}

	async fn sign_operation(
		&self,
		account: &Account,
		draft: &TransactionDraft,
		device: &DeviceHandle,
	) -> Result<SigningSession, BridgeError> {
		let (selection, value, recipient) = match &draft.claim {
			Some(claim) => {
				let outputs = self
					.index
					.unspent_outputs(&account.address, &OutputQuery::claimable())
					.await?;
				let selection =
					select_claim_input(&outputs.outputs, &claim.claim_transaction_id)
						.map_err(BuildError::from)?;
				let value = selection.consumed;
				(selection, value, account.address.clone())
			}
			None => {
				let outputs = self
					.index
					.unspent_outputs(&account.address, &OutputQuery::spendable())
					.await?;
				let selection =
					select_inputs(&outputs.outputs, draft.amount).map_err(BuildError::from)?;
				(selection, draft.amount, draft.recipient.clone())
			}
		};

		let envelope = self.builder.build(account, draft, selection)?;
		let request = SigningRequest {
			envelope,
			draft: draft.clone(),
			account_id: account.id.clone(),
			sender_address: account.address.clone(),
			recipient,
			value,
		};
		Ok(SigningPipeline::sign(request, device)?)
	}

	async fn claim_operation(
		&self,
		account: &Account,
		claim: &ClaimAttributes,
		device: &DeviceHandle,
	) -> Result<SigningSession, BridgeError> {
		let draft = TransactionDraft {
			family: CurrencyFamily::Stardust,
			amount: 0,
			recipient: account.address.clone(),
			use_all_amount: false,
			claim: Some(claim.clone()),
		};
		self.sign_operation(account, &draft, device).await
	}

	async fn broadcast(&self, signed: &SignedTransaction) -> Result<Operation, BridgeError> {
		Ok(self.broadcaster.broadcast(signed).await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::account::encode_account_id;
	use crate::indexer::testing::{MockIndex, MockSubmitter, unspent};
	use crate::indexer::{Block, ExpirationUnlock};
	use crate::signing::device::testing::MockDevice;

	fn address(seed: u8) -> StardustAddress {
		StardustAddress {
			pub_key_hash: [seed; 32],
		}
	}

	fn account_fixture(address_bech32: &str, spendable: u64) -> Account {
		Account {
			id: encode_account_id("stardust", address_bech32, ""),
			address: address_bech32.to_string(),
			derivation_mode: String::new(),
			balance: spendable,
			spendable_balance: spendable,
			operations_count: 0,
			operations: Vec::new(),
			block_height: 0,
		}
	}

	fn bridge_with(index: MockIndex, submitter: MockSubmitter) -> StardustBridge {
		StardustBridge::new(
			Arc::new(index),
			Arc::new(submitter),
			NetworkConfig::shimmer_testnet(),
		)
	}

	fn draft(recipient: &str, amount: u64) -> TransactionDraft {
		TransactionDraft {
			family: CurrencyFamily::Stardust,
			amount,
			recipient: recipient.to_string(),
			use_all_amount: false,
			claim: None,
		}
	}

	#[tokio::test]
	async fn status_reports_field_errors() {
		let ours = address(1).encode("rms").unwrap();
		let bridge = bridge_with(MockIndex::default(), MockSubmitter::default());
		let account = account_fixture(&ours, 100);

		let status = bridge
			.get_transaction_status(&account, &draft("", 0))
			.await
			.unwrap();
		assert!(matches!(
			status.recipient_error,
			Some(BuildError::RecipientRequired)
		));
		assert!(matches!(
			status.amount_error,
			Some(SelectionError::AmountRequired)
		));
		assert!(!status.is_valid());

		let status = bridge
			.get_transaction_status(&account, &draft("garbage", 150))
			.await
			.unwrap();
		assert!(matches!(
			status.recipient_error,
			Some(BuildError::UnsupportedRecipientFormat(_))
		));
		assert!(matches!(
			status.amount_error,
			Some(SelectionError::InsufficientFunds { .. })
		));

		let recipient = address(2).encode("rms").unwrap();
		let status = bridge
			.get_transaction_status(&account, &draft(&recipient, 50))
			.await
			.unwrap();
		assert!(status.is_valid());
		assert_eq!(status.estimated_fees, 0);
		assert_eq!(status.total_spent, 50);
	}

	#[tokio::test]
	async fn prepare_resolves_send_max() {
		let ours = address(1).encode("rms").unwrap();
		let bridge = bridge_with(MockIndex::default(), MockSubmitter::default());
		let account = account_fixture(&ours, 360);

		let mut send_max = draft(&address(2).encode("rms").unwrap(), 0);
		send_max.use_all_amount = true;
		let prepared = bridge.prepare_transaction(&account, send_max).await.unwrap();
		assert_eq!(prepared.amount, 360);
	}

	#[tokio::test]
	async fn draft_lifecycle_create_then_patch() {
		let ours = address(1).encode("rms").unwrap();
		let bridge = bridge_with(MockIndex::default(), MockSubmitter::default());
		let account = account_fixture(&ours, 100);

		let created = bridge.create_transaction(&account);
		assert_eq!(created.amount, 0);
		assert!(created.recipient.is_empty());

		let patched = bridge.update_transaction(
			created,
			DraftPatch {
				amount: Some(25),
				recipient: Some("rms1qsomeone".to_string()),
				..DraftPatch::default()
			},
		);
		assert_eq!(patched.amount, 25);
		assert_eq!(patched.recipient, "rms1qsomeone");
		assert!(!patched.use_all_amount);
	}

	#[tokio::test]
	async fn selection_errors_surface_before_any_device_interaction() {
		let ours = address(1);
		let our_bech32 = ours.encode("rms").unwrap();
		let mut index = MockIndex::default();
		index.outputs = vec![unspent("0xa", 0, 30, &ours.pub_key_hash_hex(), None)];

		let bridge = bridge_with(index, MockSubmitter::default());
		let account = account_fixture(&our_bech32, 30);
		let device = Arc::new(MockDevice::default());
		let handle = DeviceHandle::new(device.clone());

		let err = bridge
			.sign_operation(
				&account,
				&draft(&address(2).encode("rms").unwrap(), 100),
				&handle,
			)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			BridgeError::Build(BuildError::Selection(SelectionError::InsufficientFunds { .. }))
		));
		// the device was never touched
		assert_eq!(device.sessions_ended(), 0);
	}

	#[tokio::test]
	async fn send_operation_signs_broadcasts_and_finalizes() {
		let ours = address(1);
		let our_bech32 = ours.encode("rms").unwrap();
		let recipient = address(2).encode("rms").unwrap();

		let mut index = MockIndex::default();
		index.outputs = vec![unspent("0xa", 0, 100, &ours.pub_key_hash_hex(), None)];
		let submitter = MockSubmitter {
			block_id: "0xb10c".to_string(),
			..MockSubmitter::default()
		};

		let bridge = bridge_with(index, submitter);
		let account = account_fixture(&our_bech32, 100);
		let handle = DeviceHandle::new(Arc::new(MockDevice::default()));
		let (event_tx, mut event_rx) = mpsc::channel(16);

		let operation = bridge
			.send_operation(&account, &draft(&recipient, 90), &handle, event_tx)
			.await
			.unwrap()
			.expect("flow was not cancelled");

		assert_eq!(operation.id, "0xb10c-OUT");
		assert_eq!(operation.hash, "0xb10c");
		assert_eq!(operation.value, 90);

		assert!(matches!(
			event_rx.recv().await,
			Some(SigningEvent::DeviceSignatureRequested)
		));
		assert!(matches!(
			event_rx.recv().await,
			Some(SigningEvent::DeviceSignatureGranted)
		));
		assert!(matches!(event_rx.recv().await, Some(SigningEvent::Signed(_))));
		assert!(matches!(
			event_rx.recv().await,
			Some(SigningEvent::Broadcasted { .. })
		));
		assert!(event_rx.recv().await.is_none());
	}

	#[tokio::test]
	async fn claim_flow_consumes_the_designated_output_in_full() {
		let ours = address(1);
		let our_bech32 = ours.encode("rms").unwrap();

		let mut index = MockIndex::default();
		index.outputs = vec![
			unspent(
				"0xclaim",
				0,
				75,
				&ours.pub_key_hash_hex(),
				Some(ExpirationUnlock {
					return_address: ours.pub_key_hash_hex(),
					unix_time: 1_600_000_000,
				}),
			),
			unspent("0xother", 0, 100, &ours.pub_key_hash_hex(), None),
		];

		let bridge = bridge_with(index, MockSubmitter::default());
		let account = account_fixture(&our_bech32, 100);
		let handle = DeviceHandle::new(Arc::new(MockDevice::default()));
		let claim = ClaimAttributes::new("0xclaim".to_string(), 0, None);

		let mut session = bridge
			.claim_operation(&account, &claim, &handle)
			.await
			.unwrap();

		let mut signed = None;
		while let Some(event) = session.next_event().await {
			if let SigningEvent::Signed(transaction) = event {
				signed = Some(transaction);
			}
		}
		let signed = signed.expect("claim flow did not sign");
		let block: Block = serde_json::from_str(&signed.signature).unwrap();
		let payload = block.payload.unwrap();
		assert_eq!(payload.essence.inputs.len(), 1);
		assert_eq!(payload.essence.inputs[0].transaction_id, "0xclaim");
		assert_eq!(payload.essence.outputs.len(), 1);
		assert_eq!(payload.essence.outputs[0].amount, "75");
		assert_eq!(
			payload.essence.outputs[0].address_pub_key_hash(),
			Some(ours.pub_key_hash_hex().as_str())
		);
		assert_eq!(signed.operation.value, 75);
	}
}
