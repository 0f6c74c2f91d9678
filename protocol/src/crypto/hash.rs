//! # Hashing Utilities
//!
//! BLAKE3 is the only hash function the protocol needs. It derives account
//! addresses from public keys and contract addresses from deployment labels.
//!
//! Domain separation is done by prefixing a tag and a `0x00` separator, so
//! that a public key can never hash to the same address as a contract label
//! that happens to share its bytes.

/// Compute the BLAKE3 hash of the input data.
///
/// # Example
///
/// ```
/// use redpacket_protocol::crypto::blake3_hash;
///
/// let hash = blake3_hash(b"red packet");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hash `data` under a domain tag: `BLAKE3(tag || 0x00 || data)`.
pub fn domain_hash(tag: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(tag.as_bytes());
    hasher.update(&[0x00]);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}
