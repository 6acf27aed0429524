//! Device signing pipeline.
//!
//! An explicit state machine running as a cancellable task:
//!
//! `Idle → AwaitingDeviceConnection → RequestSent → AwaitingUserConfirmation
//! → CollectingSignatures(i) → Assembled → Terminal(Signed|Failed|Cancelled)`
//!
//! The pipeline holds exclusive access to the device for its whole lifetime
//! and releases it on every terminal transition. Lifecycle events are
//! delivered over a channel the caller awaits; errors arrive as terminal
//! events instead of crossing the task boundary. Cancellation and device
//! disconnects end the pipeline in `Cancelled` from any state before
//! `Assembled`; once all signatures are collected the transaction is
//! finished and handed over for broadcast or discard.

use crate::account::{Operation, OperationDirection};
use crate::indexer::{
	Block, PROTOCOL_VERSION, TRANSACTION_PAYLOAD_TYPE, TransactionPayload, Unlock,
};
use crate::signing::device::{
	DeviceError, DeviceHandle, DeviceSigningRequest, ED25519_PUBLIC_KEY_LENGTH,
	ED25519_SIGNATURE_LENGTH, InputUnlock, SigningDevice,
};
use crate::transaction::types::{SignedTransaction, TransactionDraft, UnsignedEnvelope};

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedMutexGuard, mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone)]
pub enum SigningError {
	#[error("device is busy with another signing session")]
	DeviceBusy,

	#[error("signature request rejected on device")]
	DeviceRejected,

	#[error("malformed device response: {0}")]
	MalformedResponse(String),

	#[error("device transport error: {0}")]
	Transport(String),

	#[error("failed to encode signed envelope: {0}")]
	Envelope(String),
}

/// Why a pipeline ended in `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
	/// The caller cancelled or abandoned the session.
	Requested,
	/// The device went away mid-session.
	DeviceDisconnected,
}

/// Lifecycle events consumed by the host to drive its own flow.
#[derive(Debug)]
pub enum SigningEvent {
	/// Device session established, signature about to be requested.
	DeviceSignatureRequested,
	/// The user approved the request on the device.
	DeviceSignatureGranted,
	/// Terminal: the signed transaction is ready for broadcast.
	Signed(Box<SignedTransaction>),
	/// The signed transaction was accepted by the network.
	Broadcasted { operation: Operation },
	/// Terminal: the pipeline was cancelled; no partial signature survives.
	Cancelled { reason: CancelReason },
	/// Terminal: the pipeline failed; the caller restarts from scratch if
	/// desired.
	Failed(SigningError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
	Idle,
	AwaitingDeviceConnection,
	RequestSent,
	AwaitingUserConfirmation,
	CollectingSignatures(u32),
	Assembled,
}

/// Everything the pipeline needs to sign one transaction and synthesize its
/// optimistic operation.
pub struct SigningRequest {
	pub envelope: UnsignedEnvelope,
	pub draft: TransactionDraft,
	pub account_id: String,
	pub sender_address: String,
	pub recipient: String,
	pub value: u64,
}

/// Handle on a running pipeline: await its events, optionally cancel it.
///
/// Dropping the session counts as cancellation.
#[derive(Debug)]
pub struct SigningSession {
	events: mpsc::Receiver<SigningEvent>,
	cancel: Option<oneshot::Sender<()>>,
}

impl SigningSession {
	/// Next lifecycle event; `None` once the pipeline task has ended.
	pub async fn next_event(&mut self) -> Option<SigningEvent> {
		self.events.recv().await
	}

	/// Request cancellation. Honored from any state before `Assembled`;
	/// afterwards the transaction completes and must be broadcast or
	/// discarded.
	pub fn cancel(&mut self) {
		if let Some(cancel) = self.cancel.take() {
			let _ = cancel.send(());
		}
	}
}

enum Outcome {
	Signed(Box<SignedTransaction>),
	Cancelled(CancelReason),
	Failed(SigningError),
}

enum StepInterrupt {
	Cancelled,
	Device(DeviceError),
}

pub struct SigningPipeline;

impl SigningPipeline {
	/// Start a signing session against the device behind `handle`.
	///
	/// Fails synchronously with [`SigningError::DeviceBusy`] when another
	/// session holds the device; a busy device is never queued on.
	pub fn sign(
		request: SigningRequest,
		handle: &DeviceHandle,
	) -> Result<SigningSession, SigningError> {
		let guard = handle.try_acquire().map_err(|_| SigningError::DeviceBusy)?;
		let device = handle.device();
		let (event_tx, event_rx) = mpsc::channel(8);
		let (cancel_tx, cancel_rx) = oneshot::channel();

		info!(
			"starting signing session over {} inputs",
			request.envelope.input_count()
		);
		tokio::spawn(run(device, guard, request, event_tx, cancel_rx));

		Ok(SigningSession {
			events: event_rx,
			cancel: Some(cancel_tx),
		})
	}
}

async fn run(
	device: Arc<dyn SigningDevice>,
	guard: OwnedMutexGuard<()>,
	request: SigningRequest,
	events: mpsc::Sender<SigningEvent>,
	mut cancel: oneshot::Receiver<()>,
) {
	let outcome = drive(device.as_ref(), &request, &events, &mut cancel).await;
	device.end_session().await;
	// the device must be free before the terminal event becomes observable
	drop(guard);

	let terminal = match outcome {
		Outcome::Signed(signed) => {
			info!("signing session finished, transaction ready for broadcast");
			SigningEvent::Signed(signed)
		}
		Outcome::Cancelled(reason) => {
			warn!("signing session cancelled: {:?}", reason);
			SigningEvent::Cancelled { reason }
		}
		Outcome::Failed(error) => {
			warn!("signing session failed: {}", error);
			SigningEvent::Failed(error)
		}
	};
	let _ = events.send(terminal).await;
}

async fn drive(
	device: &dyn SigningDevice,
	request: &SigningRequest,
	events: &mpsc::Sender<SigningEvent>,
	cancel: &mut oneshot::Receiver<()>,
) -> Outcome {
	let mut state = PipelineState::Idle;
	debug!(?state, "signing pipeline started");

	state = PipelineState::AwaitingDeviceConnection;
	debug!(?state, "acquiring device session");
	if let Err(interrupt) = step(cancel, device.begin_session()).await {
		return interrupted(interrupt);
	}

	state = PipelineState::RequestSent;
	debug!(?state, "device session established");
	if events
		.send(SigningEvent::DeviceSignatureRequested)
		.await
		.is_err()
	{
		return Outcome::Cancelled(CancelReason::Requested);
	}

	let signing_request = DeviceSigningRequest {
		essence_bytes: request.envelope.essence_bytes.clone(),
		digest: request.envelope.digest,
		remainder_index: request.envelope.metadata.remainder_index,
		bip32_account: request.envelope.metadata.bip32_account,
		bip32_change: request.envelope.metadata.bip32_change,
	};
	if let Err(interrupt) = step(cancel, device.upload_digest(&signing_request)).await {
		return interrupted(interrupt);
	}

	state = PipelineState::AwaitingUserConfirmation;
	debug!(?state, "essence uploaded, awaiting on-device approval");
	if let Err(interrupt) = step(cancel, device.await_approval()).await {
		return interrupted(interrupt);
	}
	if events
		.send(SigningEvent::DeviceSignatureGranted)
		.await
		.is_err()
	{
		return Outcome::Cancelled(CancelReason::Requested);
	}

	// the device exposes a single signing slot: strictly one input at a time
	let input_count = request.envelope.input_count();
	let mut unlocks = Vec::with_capacity(input_count);
	for index in 0..input_count {
		state = PipelineState::CollectingSignatures(index as u32);
		debug!(?state, "requesting signature");
		let unlock = match step(cancel, device.sign_input(index as u32)).await {
			Ok(unlock) => unlock,
			Err(interrupt) => return interrupted(interrupt),
		};
		match unlock {
			InputUnlock::Signature {
				public_key,
				signature,
			} => {
				if public_key.len() != ED25519_PUBLIC_KEY_LENGTH
					|| signature.len() != ED25519_SIGNATURE_LENGTH
				{
					return Outcome::Failed(SigningError::MalformedResponse(format!(
						"unlock for input {} has a {}-byte key and a {}-byte signature",
						index,
						public_key.len(),
						signature.len()
					)));
				}
				unlocks.push(Unlock::signature(
					format!("0x{}", hex::encode(public_key)),
					format!("0x{}", hex::encode(signature)),
				));
			}
			InputUnlock::Reference { index } => unlocks.push(Unlock::reference(index)),
		}
	}

	state = PipelineState::Assembled;
	debug!(?state, "all signatures collected, cancellation window closed");

	let payload = TransactionPayload {
		kind: TRANSACTION_PAYLOAD_TYPE,
		essence: request.envelope.essence.clone(),
		unlocks,
	};
	let block = Block {
		protocol_version: PROTOCOL_VERSION,
		parents: Vec::new(),
		payload: Some(payload),
		nonce: "0".to_string(),
	};
	let signature = match serde_json::to_string(&block) {
		Ok(signature) => signature,
		Err(e) => return Outcome::Failed(SigningError::Envelope(e.to_string())),
	};

	Outcome::Signed(Box::new(SignedTransaction {
		draft: request.draft.clone(),
		operation: optimistic_operation(request),
		signature,
		expiration_date: None,
	}))
}

/// Race one device round-trip against cancellation.
async fn step<T, F>(cancel: &mut oneshot::Receiver<()>, operation: F) -> Result<T, StepInterrupt>
where
	F: Future<Output = Result<T, DeviceError>>,
{
	tokio::select! {
		biased;
		_ = &mut *cancel => Err(StepInterrupt::Cancelled),
		result = operation => result.map_err(StepInterrupt::Device),
	}
}

fn interrupted(interrupt: StepInterrupt) -> Outcome {
	match interrupt {
		StepInterrupt::Cancelled => Outcome::Cancelled(CancelReason::Requested),
		StepInterrupt::Device(DeviceError::Disconnected) => {
			Outcome::Cancelled(CancelReason::DeviceDisconnected)
		}
		StepInterrupt::Device(DeviceError::Rejected) => Outcome::Failed(SigningError::DeviceRejected),
		StepInterrupt::Device(DeviceError::Malformed(message)) => {
			Outcome::Failed(SigningError::MalformedResponse(message))
		}
		StepInterrupt::Device(DeviceError::Transport(message)) => {
			Outcome::Failed(SigningError::Transport(message))
		}
	}
}

/// The locally synthesized, unconfirmed operation attached to a signed
/// transaction before the network assigns ids.
fn optimistic_operation(request: &SigningRequest) -> Operation {
	Operation {
		id: format!("{}--OUT", request.account_id),
		hash: String::new(),
		direction: OperationDirection::Out,
		value: request.value,
		fee: 0,
		senders: vec![request.sender_address.clone()],
		recipients: vec![request.recipient.clone()],
		account_id: request.account_id.clone(),
		block_height: None,
		date: Utc::now(),
		claim: None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bridge::CurrencyFamily;
	use crate::indexer::{
		BasicOutput, REFERENCE_UNLOCK_TYPE, SIGNATURE_UNLOCK_TYPE, TRANSACTION_ESSENCE_TYPE,
		TransactionEssence, UtxoInput,
	};
	use crate::signing::device::testing::MockDevice;
	use crate::transaction::types::SigningMetadata;
	use tokio::sync::Notify;

	fn test_request(input_count: usize) -> SigningRequest {
		let essence = TransactionEssence {
			kind: TRANSACTION_ESSENCE_TYPE,
			network_id: "0".to_string(),
			inputs: (0..input_count)
				.map(|i| UtxoInput::new(format!("0x{:02x}", i), 0))
				.collect(),
			inputs_commitment: "0xc0ffee".to_string(),
			outputs: vec![BasicOutput::basic(10, "0x11")],
		};
		let envelope = UnsignedEnvelope {
			essence,
			consumed: Vec::new(),
			essence_bytes: vec![1, 2, 3, 4],
			digest: [9u8; 32],
			metadata: SigningMetadata {
				bip32_account: 0x8000_0000,
				bip32_change: 0x8000_0000,
				remainder_index: None,
			},
		};
		SigningRequest {
			envelope,
			draft: TransactionDraft {
				family: CurrencyFamily::Stardust,
				amount: 10,
				recipient: "rms1qrecipient".to_string(),
				use_all_amount: false,
				claim: None,
			},
			account_id: "stardust:2:rms1qsender:".to_string(),
			sender_address: "rms1qsender".to_string(),
			recipient: "rms1qrecipient".to_string(),
			value: 10,
		}
	}

	#[tokio::test]
	async fn full_flow_emits_requested_granted_signed() {
		let device = Arc::new(MockDevice::default().with_reference_input(1));
		let handle = DeviceHandle::new(device.clone());
		let mut session = SigningPipeline::sign(test_request(2), &handle).unwrap();

		assert!(matches!(
			session.next_event().await,
			Some(SigningEvent::DeviceSignatureRequested)
		));
		assert!(matches!(
			session.next_event().await,
			Some(SigningEvent::DeviceSignatureGranted)
		));
		let Some(SigningEvent::Signed(signed)) = session.next_event().await else {
			panic!("expected a signed terminal event");
		};
		assert!(session.next_event().await.is_none());

		let block: Block = serde_json::from_str(&signed.signature).unwrap();
		let payload = block.payload.unwrap();
		assert_eq!(payload.unlocks.len(), 2);
		assert_eq!(payload.unlocks[0].kind, SIGNATURE_UNLOCK_TYPE);
		assert_eq!(payload.unlocks[1].kind, REFERENCE_UNLOCK_TYPE);
		assert!(signed.operation.block_height.is_none());
		assert_eq!(signed.operation.value, 10);
		assert_eq!(device.sessions_ended(), 1);
	}

	#[tokio::test]
	async fn busy_device_rejects_second_session_until_released() {
		let gate = Arc::new(Notify::new());
		let device = Arc::new(MockDevice::gated(gate.clone()));
		let handle = DeviceHandle::new(device.clone());

		let mut first = SigningPipeline::sign(test_request(1), &handle).unwrap();
		assert!(matches!(
			first.next_event().await,
			Some(SigningEvent::DeviceSignatureRequested)
		));

		// the device is held by the in-flight session
		let err = SigningPipeline::sign(test_request(1), &handle).unwrap_err();
		assert!(matches!(err, SigningError::DeviceBusy));

		first.cancel();
		assert!(matches!(
			first.next_event().await,
			Some(SigningEvent::Cancelled {
				reason: CancelReason::Requested
			})
		));
		assert!(first.next_event().await.is_none());
		assert_eq!(device.sessions_ended(), 1);

		// terminal transition released the device; a new session goes through
		gate.notify_one();
		let mut third = SigningPipeline::sign(test_request(1), &handle).unwrap();
		let mut saw_signed = false;
		while let Some(event) = third.next_event().await {
			if matches!(event, SigningEvent::Signed(_)) {
				saw_signed = true;
			}
		}
		assert!(saw_signed);
	}

	#[tokio::test]
	async fn on_device_rejection_fails_the_pipeline() {
		let device = Arc::new(MockDevice::rejecting());
		let handle = DeviceHandle::new(device.clone());
		let mut session = SigningPipeline::sign(test_request(1), &handle).unwrap();

		assert!(matches!(
			session.next_event().await,
			Some(SigningEvent::DeviceSignatureRequested)
		));
		assert!(matches!(
			session.next_event().await,
			Some(SigningEvent::Failed(SigningError::DeviceRejected))
		));
		assert!(session.next_event().await.is_none());
		// the failure freed the device for a fresh session
		assert!(SigningPipeline::sign(test_request(1), &handle).is_ok());
	}

	#[tokio::test]
	async fn disconnect_mid_collection_cancels_the_pipeline() {
		let device = Arc::new(MockDevice::failing_input(1, DeviceError::Disconnected));
		let handle = DeviceHandle::new(device.clone());
		let mut session = SigningPipeline::sign(test_request(2), &handle).unwrap();

		assert!(matches!(
			session.next_event().await,
			Some(SigningEvent::DeviceSignatureRequested)
		));
		assert!(matches!(
			session.next_event().await,
			Some(SigningEvent::DeviceSignatureGranted)
		));
		assert!(matches!(
			session.next_event().await,
			Some(SigningEvent::Cancelled {
				reason: CancelReason::DeviceDisconnected
			})
		));
		assert_eq!(device.sessions_ended(), 1);
	}

	#[tokio::test]
	async fn malformed_signature_fails_the_pipeline() {
		let device = Arc::new(MockDevice::default().with_short_signature());
		let handle = DeviceHandle::new(device);
		let mut session = SigningPipeline::sign(test_request(1), &handle).unwrap();

		let mut terminal = None;
		while let Some(event) = session.next_event().await {
			terminal = Some(event);
		}
		assert!(matches!(
			terminal,
			Some(SigningEvent::Failed(SigningError::MalformedResponse(_)))
		));
	}

	#[tokio::test]
	async fn cancel_after_signed_is_a_no_op() {
		let device = Arc::new(MockDevice::default());
		let handle = DeviceHandle::new(device);
		let mut session = SigningPipeline::sign(test_request(1), &handle).unwrap();

		let mut saw_signed = false;
		while let Some(event) = session.next_event().await {
			if matches!(event, SigningEvent::Signed(_)) {
				saw_signed = true;
			}
			assert!(!matches!(event, SigningEvent::Cancelled { .. }));
		}
		assert!(saw_signed);
		// the pipeline already reached its terminal state
		session.cancel();
	}
}
