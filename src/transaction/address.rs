use bech32::{Bech32m, Hrp};
use thiserror::Error;

use crate::indexer::ED25519_ADDRESS_TYPE;

/// Length of an Ed25519 public-key hash.
pub const ED25519_PUB_KEY_HASH_LENGTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
	#[error("not valid bech32: {0}")]
	Encoding(String),
	#[error("address prefix '{found}' does not belong to this network (expected '{expected}')")]
	HrpMismatch { expected: String, found: String },
	#[error("unsupported address kind {0}")]
	UnsupportedKind(u8),
	#[error("address payload of {0} bytes is not an Ed25519 key hash")]
	InvalidLength(usize),
}

/// A Stardust address in its native Ed25519 key-hash form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StardustAddress {
	pub pub_key_hash: [u8; ED25519_PUB_KEY_HASH_LENGTH],
}

impl StardustAddress {
	/// Decode a bech32 address and check it belongs to the given network.
	pub fn decode(encoded: &str, expected_hrp: &str) -> Result<Self, AddressError> {
		let (hrp, data) =
			bech32::decode(encoded).map_err(|e| AddressError::Encoding(e.to_string()))?;
		if hrp.as_str() != expected_hrp {
			return Err(AddressError::HrpMismatch {
				expected: expected_hrp.to_string(),
				found: hrp.as_str().to_string(),
			});
		}
		// one kind byte followed by the key hash
		if data.len() != 1 + ED25519_PUB_KEY_HASH_LENGTH {
			return Err(AddressError::InvalidLength(data.len()));
		}
		if data[0] != ED25519_ADDRESS_TYPE {
			return Err(AddressError::UnsupportedKind(data[0]));
		}

		let mut pub_key_hash = [0u8; ED25519_PUB_KEY_HASH_LENGTH];
		pub_key_hash.copy_from_slice(&data[1..]);
		Ok(Self { pub_key_hash })
	}

	/// Rebuild an address from the hex key hash carried in output unlock
	/// conditions.
	pub fn from_pub_key_hash_hex(hex_hash: &str) -> Result<Self, AddressError> {
		let bytes = hex::decode(hex_hash.trim_start_matches("0x"))
			.map_err(|e| AddressError::Encoding(e.to_string()))?;
		if bytes.len() != ED25519_PUB_KEY_HASH_LENGTH {
			return Err(AddressError::InvalidLength(bytes.len()));
		}
		let mut pub_key_hash = [0u8; ED25519_PUB_KEY_HASH_LENGTH];
		pub_key_hash.copy_from_slice(&bytes);
		Ok(Self { pub_key_hash })
	}

	pub fn encode(&self, hrp: &str) -> Result<String, AddressError> {
		let hrp = Hrp::parse(hrp).map_err(|e| AddressError::Encoding(e.to_string()))?;
		let mut data = vec![ED25519_ADDRESS_TYPE];
		data.extend_from_slice(&self.pub_key_hash);
		bech32::encode::<Bech32m>(hrp, &data).map_err(|e| AddressError::Encoding(e.to_string()))
	}

	pub fn pub_key_hash_hex(&self) -> String {
		format!("0x{}", hex::encode(self.pub_key_hash))
	}
}
