//! Base58Check address validation.
//!
//! Each currency carries one or more address version prefixes ("magic
//! bytes"); an address is acceptable for that currency when its checksum
//! verifies and its version byte is among them. Chains with other address
//! encodings plug in their own validator at the ledger seam.

/// Checks `address` against the given version prefixes.
pub fn is_valid_address(magic_bytes: &[u8], address: &str) -> bool {
    match bs58::decode(address).with_check(None).into_vec() {
        Ok(payload) => payload
            .first()
            .map(|version| magic_bytes.contains(version))
            .unwrap_or(false),
        Err(_) => false,
    }
}
