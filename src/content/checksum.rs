//! Payload checksums
//!
//! Every finalized payload carries a blake3 digest so an imported tile can
//! be compared with its reloaded counterpart.

/// Hex-encoded blake3 digest of `payload` (64 characters)
///
/// ```
/// use dc_import::content::compute_checksum;
///
/// assert_eq!(compute_checksum(b"tile").len(), 64);
/// ```
pub fn compute_checksum(payload: &[u8]) -> String {
    blake3::hash(payload).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable() {
        let tile = b"Tile_0001";
        assert_eq!(compute_checksum(tile), compute_checksum(tile));
        assert_ne!(compute_checksum(tile), compute_checksum(b"Tile_0002"));
    }

    #[test]
    fn test_empty_payload_digest() {
        assert_eq!(
            compute_checksum(b""),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }
}
