//! Signing device abstraction.
//!
//! The bridge never holds signing keys; it talks to an external device that
//! re-derives them from the key indices carried in the signing request. The
//! transport and byte framing live behind the `SigningDevice` trait; the
//! pipeline only sees the logical operations.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, TryLockError};

/// Length of an Ed25519 public key returned by the device.
pub const ED25519_PUBLIC_KEY_LENGTH: usize = 32;
/// Length of an Ed25519 signature returned by the device.
pub const ED25519_SIGNATURE_LENGTH: usize = 64;

#[derive(Error, Debug, Clone)]
pub enum DeviceError {
	#[error("signature request rejected on device")]
	Rejected,

	#[error("device disconnected")]
	Disconnected,

	#[error("malformed device response: {0}")]
	Malformed(String),

	#[error("device transport error: {0}")]
	Transport(String),
}

/// What the device answers for one input's signing slot.
#[derive(Debug, Clone)]
pub enum InputUnlock {
	/// A fresh signature over the uploaded essence.
	Signature {
		public_key: Vec<u8>,
		signature: Vec<u8>,
	},
	/// A reference to an earlier unlock produced by the same key.
	Reference { index: u16 },
}

/// Everything the device needs to display and sign one transaction.
#[derive(Debug, Clone)]
pub struct DeviceSigningRequest {
	/// Serialized essence with per-input key indices appended.
	pub essence_bytes: Vec<u8>,
	/// Digest shown on the device for confirmation.
	pub digest: [u8; 32],
	/// Position of the remainder output, so the device can recognize change
	/// returning to the sender.
	pub remainder_index: Option<u16>,
	pub bip32_account: u32,
	pub bip32_change: u32,
}

/// Logical operations of the external signing device.
///
/// The device exposes a single signing slot: signatures are requested one
/// input at a time. Every method is a suspension point.
#[async_trait]
pub trait SigningDevice: Send + Sync {
	/// Open a signing session (handshake).
	async fn begin_session(&self) -> Result<(), DeviceError>;

	/// Upload the essence and digest for on-device display.
	async fn upload_digest(&self, request: &DeviceSigningRequest) -> Result<(), DeviceError>;

	/// Wait for the user to approve the request on the device itself.
	/// Approval is never inferred host-side; a decline yields
	/// [`DeviceError::Rejected`].
	async fn await_approval(&self) -> Result<(), DeviceError>;

	/// Request the unlock for input `index`.
	async fn sign_input(&self, index: u32) -> Result<InputUnlock, DeviceError>;

	/// End the signing session. Called on every terminal transition; must be
	/// tolerant of a session that never opened.
	async fn end_session(&self);
}

/// A device plus the lock serializing access to it.
///
/// Clones share the lock, so every consumer of the same handle competes for
/// the same single in-flight session.
#[derive(Clone)]
pub struct DeviceHandle {
	device: Arc<dyn SigningDevice>,
	lock: Arc<Mutex<()>>,
}

impl DeviceHandle {
	pub fn new(device: Arc<dyn SigningDevice>) -> Self {
		Self {
			device,
			lock: Arc::new(Mutex::new(())),
		}
	}

	/// Claim exclusive access without waiting; a held lock means another
	/// signing session is in flight.
	pub(crate) fn try_acquire(&self) -> Result<OwnedMutexGuard<()>, TryLockError> {
		self.lock.clone().try_lock_owned()
	}

	pub(crate) fn device(&self) -> Arc<dyn SigningDevice> {
		self.device.clone()
	}
}
