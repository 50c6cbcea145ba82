use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
	#[error("address must start with '0x'")]
	MissingPrefix,
	#[error("address must be 40 hex characters, got {0}")]
	InvalidLength(usize),
	#[error("address contains non-hex characters")]
	InvalidHex,
	#[error("address '{0}' does not match its checksum encoding")]
	ChecksumMismatch(String),
	#[error("32-byte word does not hold a left-padded address")]
	InvalidWord,
}

/// A 20-byte ledger account identifier.
///
/// The canonical textual form is the mixed-case checksum encoding (EIP-55).
/// `Display`, `Debug` and serde all use that form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
	pub const fn from_bytes(bytes: [u8; 20]) -> Self {
		Self(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; 20] {
		&self.0
	}

	/// Render the checksum encoding: a hex letter is upper-cased when the
	/// matching nibble of keccak256(lowercase hex) is >= 8.
	pub fn to_checksum(&self) -> String {
		let lower = hex::encode(self.0);
		let hash = Keccak256::digest(lower.as_bytes());

		let mut encoded = String::with_capacity(42);
		encoded.push_str("0x");
		for (i, c) in lower.chars().enumerate() {
			let byte = hash[i / 2];
			let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
			if c.is_ascii_alphabetic() && nibble >= 8 {
				encoded.push(c.to_ascii_uppercase());
			} else {
				encoded.push(c);
			}
		}
		encoded
	}

	/// Strict parse: only the exact checksum encoding is accepted.
	pub fn parse_checksummed(s: &str) -> Result<Self, AddressError> {
		let address = Self::from_str(s)?;
		if address.to_checksum() != s {
			return Err(AddressError::ChecksumMismatch(s.to_string()));
		}
		Ok(address)
	}

	/// Decode an address stored in a 32-byte word (log topic or ABI data slot).
	pub fn from_word(word: &[u8; 32]) -> Result<Self, AddressError> {
		if word[..12].iter().any(|b| *b != 0) {
			return Err(AddressError::InvalidWord);
		}
		let mut bytes = [0u8; 20];
		bytes.copy_from_slice(&word[12..]);
		Ok(Self(bytes))
	}
}

impl FromStr for Address {
	type Err = AddressError;

	/// Lenient parse. Single-case hex is normalized, mixed-case hex must carry
	/// a valid checksum.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let digits = s.strip_prefix("0x").ok_or(AddressError::MissingPrefix)?;
		if digits.len() != 40 {
			return Err(AddressError::InvalidLength(digits.len()));
		}

		let mut bytes = [0u8; 20];
		hex::decode_to_slice(digits, &mut bytes).map_err(|_| AddressError::InvalidHex)?;
		let address = Self(bytes);

		let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
		let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
		if has_lower && has_upper && address.to_checksum() != s {
			return Err(AddressError::ChecksumMismatch(s.to_string()));
		}

		Ok(address)
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_checksum())
	}
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_checksum())
	}
}

impl Serialize for Address {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_checksum())
	}
}

impl<'de> Deserialize<'de> for Address {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Address::from_str(&s).map_err(serde::de::Error::custom)
	}
}
