//! Currency bridge surface
//!
//! The registry resolves a currency family to its bridge implementation;
//! the `stardust` module provides the UTXO/claim-output family, the most
//! involved one. Other families plug into the same traits.

/// Family enum, bridge traits and the registry
pub mod registry;
/// The UTXO/claim-output family implementation
pub mod stardust;

pub use registry::*;
pub use stardust::*;
