//! Strict parsing of address literals taken from configuration and flags.

use alloy_primitives::Address;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAddress {
    #[error("address must start with 0x")]
    MissingPrefix,

    #[error("address must have 40 hex digits, got {digits}")]
    InvalidLength { digits: usize },

    #[error("address contains non-hex characters")]
    InvalidHex,

    #[error("mixed-case address fails its EIP-55 checksum")]
    BadChecksum,

    #[error("address is the zero address")]
    Zero,
}

/// Parses a `0x`-prefixed, 40 digit hex address.
///
/// All-lowercase and all-uppercase literals are accepted as is. Mixed-case
/// literals must carry a valid EIP-55 checksum, which catches most
/// copy-paste damage.
pub fn parse_address(literal: &str) -> Result<Address, InvalidAddress> {
    let literal = literal.trim();
    let digits = literal
        .strip_prefix("0x")
        .or_else(|| literal.strip_prefix("0X"))
        .ok_or(InvalidAddress::MissingPrefix)?;

    if digits.len() != 40 {
        return Err(InvalidAddress::InvalidLength {
            digits: digits.len(),
        });
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(InvalidAddress::InvalidHex);
    }

    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower {
        let prefixed = format!("0x{digits}");
        return Address::parse_checksummed(&prefixed, None).map_err(|_| InvalidAddress::BadChecksum);
    }

    digits
        .to_ascii_lowercase()
        .parse::<Address>()
        .map_err(|_| InvalidAddress::InvalidHex)
}

/// Rejects the zero address.
pub fn ensure_nonzero(address: Address) -> Result<Address, InvalidAddress> {
    if address.is_zero() {
        Err(InvalidAddress::Zero)
    } else {
        Ok(address)
    }
}
