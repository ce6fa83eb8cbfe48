use ethers::signers::{LocalWallet, Signer};
use ethers::utils::to_checksum;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("private key must be 64 hex characters (optionally 0x-prefixed)")]
    InvalidFormat,
}

/// Trims whitespace and ensures a `0x` prefix.
#[must_use]
pub fn normalize_private_key(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("0x") {
        trimmed.to_string()
    } else {
        format!("0x{trimmed}")
    }
}

/// Parses a user-supplied private key into a signing wallet.
///
/// # Errors
///
/// Returns `InvalidFormat` if the key is not 64 hex characters after
/// normalization or does not parse as a valid secp256k1 scalar.
pub fn parse_private_key(raw: &str) -> Result<LocalWallet, CredentialError> {
    let normalized = normalize_private_key(raw);
    let hex_part = &normalized[2..];
    if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CredentialError::InvalidFormat);
    }
    LocalWallet::from_str(hex_part).map_err(|_| CredentialError::InvalidFormat)
}

/// Checksummed account address for a wallet.
#[must_use]
pub fn wallet_address(wallet: &LocalWallet) -> String {
    to_checksum(&wallet.address(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    // secp256k1 key 0x...01 derives a well-known address.
    const KEY_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";
    const ADDR_ONE: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

    #[test]
    fn normalization_adds_prefix_once() {
        assert_eq!(normalize_private_key("abcd"), "0xabcd");
        assert_eq!(normalize_private_key("0xabcd"), "0xabcd");
        assert_eq!(normalize_private_key("  0xabcd \n"), "0xabcd");
    }

    #[test]
    fn derives_known_address() {
        let wallet = parse_private_key(KEY_ONE).unwrap();
        assert_eq!(wallet_address(&wallet), ADDR_ONE);

        // Same key with a prefix parses identically.
        let prefixed = parse_private_key(&format!("0x{KEY_ONE}")).unwrap();
        assert_eq!(wallet_address(&prefixed), ADDR_ONE);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(parse_private_key("abc").unwrap_err(), CredentialError::InvalidFormat);
        assert_eq!(
            parse_private_key(&"z".repeat(64)).unwrap_err(),
            CredentialError::InvalidFormat
        );
        assert_eq!(
            parse_private_key(&"0".repeat(64)).unwrap_err(),
            CredentialError::InvalidFormat
        );
    }
}
