//! Network configuration for the bridge.
//!
//! Carries the node endpoint, the bech32 human-readable part and the network
//! name a transaction essence is bound to. Presets cover the public networks;
//! `from_env` lets a deployment point at its own node.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Configuration of one Stardust network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
	/// Protocol network name; hashed into the essence network id.
	pub network_name: String,
	/// Base URL of the node REST API.
	pub api_base: String,
	/// Bech32 human-readable part of addresses on this network.
	pub bech32_hrp: String,
	/// Decimal places of the base unit.
	pub token_decimals: u32,
}

impl NetworkConfig {
	/// The Shimmer mainnet.
	pub fn shimmer() -> Self {
		Self {
			network_name: "shimmer".to_string(),
			api_base: "https://api.shimmer.network".to_string(),
			bech32_hrp: "smr".to_string(),
			token_decimals: 6,
		}
	}

	/// The public Shimmer testnet.
	pub fn shimmer_testnet() -> Self {
		Self {
			network_name: "testnet".to_string(),
			api_base: "https://api.testnet.shimmer.network".to_string(),
			bech32_hrp: "rms".to_string(),
			token_decimals: 6,
		}
	}

	/// Resolve the network from `STARDUST_NETWORK` (defaults to the testnet)
	/// and apply an optional `STARDUST_API_URL` endpoint override.
	pub fn from_env() -> Self {
		let mut config = match std::env::var("STARDUST_NETWORK").as_deref() {
			Ok("shimmer") => Self::shimmer(),
			_ => Self::shimmer_testnet(),
		};
		if let Ok(url) = std::env::var("STARDUST_API_URL") {
			config.api_base = url;
		}
		config
	}

	/// Network id a transaction essence commits to: the first eight bytes of
	/// the BLAKE2b-256 hash of the network name, little endian.
	pub fn network_id(&self) -> u64 {
		let mut hasher = Blake2b256::new();
		hasher.update(self.network_name.as_bytes());
		let digest = hasher.finalize();
		let mut prefix = [0u8; 8];
		prefix.copy_from_slice(&digest[..8]);
		u64::from_le_bytes(prefix)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn network_id_is_stable_and_network_specific() {
		let shimmer = NetworkConfig::shimmer();
		let testnet = NetworkConfig::shimmer_testnet();
		assert_eq!(shimmer.network_id(), NetworkConfig::shimmer().network_id());
		assert_ne!(shimmer.network_id(), testnet.network_id());
	}
}
