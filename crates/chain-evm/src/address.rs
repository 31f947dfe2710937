use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::{EncodedPoint, PublicKey};

use crate::error::EthError;
use crate::keccak256;

/// The all-zero address, used as the native-asset sentinel.
pub const ZERO_ADDRESS: [u8; 20] = [0u8; 20];

/// Parses a `0x`-prefixed, 40-hex-digit address into raw bytes.
///
/// Only the shape is checked here; see [`validate_address`] for the EIP-55
/// checksum rule on mixed-case input.
pub fn parse_address(address: &str) -> Result<[u8; 20], EthError> {
    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| EthError::InvalidAddress("address must start with 0x".into()))?;

    if hex_part.len() != 40 {
        return Err(EthError::InvalidAddress(format!(
            "expected 40 hex characters, got {}",
            hex_part.len()
        )));
    }

    let bytes = hex::decode(hex_part)
        .map_err(|_| EthError::InvalidAddress("address contains non-hex characters".into()))?;

    let mut addr = [0u8; 20];
    addr.copy_from_slice(&bytes);
    Ok(addr)
}

/// Encodes raw address bytes with the EIP-55 mixed-case checksum.
pub fn to_checksum(addr: &[u8; 20]) -> String {
    let lower = hex::encode(addr);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        // Nibble i of the hash decides the case of character i.
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Normalises any well-formed address string to its checksummed form.
pub fn checksum_address(address: &str) -> Result<String, EthError> {
    parse_address(address).map(|bytes| to_checksum(&bytes))
}

/// Validates an address string.
///
/// All-lowercase and all-uppercase hex carry no checksum and are accepted on
/// shape alone. Mixed case must match the EIP-55 encoding exactly.
pub fn validate_address(address: &str) -> Result<(), EthError> {
    let bytes = parse_address(address)?;
    let hex_part = &address[2..];

    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    if !(has_lower && has_upper) {
        return Ok(());
    }

    if to_checksum(&bytes)[2..] == *hex_part {
        Ok(())
    } else {
        Err(EthError::InvalidAddress("EIP-55 checksum mismatch".into()))
    }
}

/// Derives the checksummed address for a secp256k1 public key given in SEC1
/// form: 33-byte compressed or 65-byte uncompressed.
pub fn pubkey_to_address(pubkey: &[u8]) -> Result<String, EthError> {
    let uncompressed = match pubkey.len() {
        65 if pubkey[0] == 0x04 => pubkey.to_vec(),
        65 => {
            return Err(EthError::InvalidPublicKey(
                "uncompressed key must start with 0x04".into(),
            ))
        }
        33 => decompress(pubkey)?,
        n => {
            return Err(EthError::InvalidPublicKey(format!(
                "expected 33 or 65 bytes, got {n}"
            )))
        }
    };

    // Last 20 bytes of keccak(x || y).
    let hash = keccak256(&uncompressed[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    Ok(to_checksum(&addr))
}

fn decompress(compressed: &[u8]) -> Result<Vec<u8>, EthError> {
    let encoded = EncodedPoint::from_bytes(compressed)
        .map_err(|e| EthError::InvalidPublicKey(format!("invalid compressed key encoding: {e}")))?;

    let pubkey: Option<PublicKey> = PublicKey::from_encoded_point(&encoded).into();
    let pubkey = pubkey
        .ok_or_else(|| EthError::InvalidPublicKey("point is not on the secp256k1 curve".into()))?;

    Ok(pubkey.to_encoded_point(false).as_bytes().to_vec())
}
