//! Account bridge and transaction pipeline for Stardust-style UTXO chains.
//!
//! Synchronizes on-chain account state into a canonical operation history,
//! builds outgoing transactions with coin selection and remainder handling,
//! drives an external signing device through a cancellable pipeline, and
//! broadcasts signed transactions while reconciling optimistic local state
//! with what the network confirms.

pub mod account;
pub mod bridge;
pub mod config;
pub mod indexer;
pub mod signing;
pub mod transaction;
pub mod utils;
