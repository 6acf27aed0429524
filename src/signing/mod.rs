//! Device signing
//!
//! Everything between an unsigned envelope and a signed transaction: the
//! `SigningDevice` seam hiding the hardware transport, the exclusive device
//! handle, and the cancellable pipeline state machine that walks a device
//! through confirmation and per-input signature collection.

/// Device trait, signing request/response types and the exclusive handle
pub mod device;
/// The signing state machine and its lifecycle events
pub mod pipeline;

pub use device::*;
pub use pipeline::*;
