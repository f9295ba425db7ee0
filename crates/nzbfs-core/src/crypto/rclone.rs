//! rclone-crypt framing: NaCl secretbox (XSalsa20-Poly1305) blocks over a
//! fixed file header.
//!
//! Wire layout, pinned to the real rclone crypt backend:
//!
//! ```text
//! [ 8-byte magic ][ 24-byte file nonce ]  <- 32-byte header
//! [ 65536-byte block data + 16-byte Poly1305 tag ] x N  <- 65552-byte full blocks, last one short
//! ```
//!
//! The per-block nonce is the file nonce with a little-endian block
//! counter XORed into its low bytes (rclone's `nonce.increment()`).

use xsalsa20poly1305::{
    aead::{Aead, KeyInit},
    Nonce, XSalsa20Poly1305,
};

use crate::crypto::keys::RcloneKey;

pub const FILE_MAGIC: &[u8; 8] = b"RCLONE\x00\x00";
pub const HEADER_LEN: i64 = 32;
pub const NONCE_LEN: usize = 24;
pub const BLOCK_DATA_SIZE: i64 = 65536;
pub const BLOCK_OVERHEAD: i64 = 16;
pub const FULL_BLOCK_SIZE: i64 = BLOCK_DATA_SIZE + BLOCK_OVERHEAD;

#[derive(thiserror::Error, Debug)]
pub enum RcloneFramingError {
    #[error("ciphertext too short to contain the 32-byte header")]
    HeaderTooShort,

    #[error("bad file magic in rclone-crypt header")]
    BadMagic,

    #[error("block {block_index} failed authentication")]
    BlockAuthFailed { block_index: u64 },
}

/// Decrypts a single full or trailing-partial ciphertext block at index
/// `block_index` of a file whose header carries `file_nonce`.
pub fn decrypt_block(
    key: &RcloneKey,
    file_nonce: &[u8; NONCE_LEN],
    block_index: u64,
    ciphertext_block: &[u8],
) -> Result<Vec<u8>, RcloneFramingError> {
    let cipher = XSalsa20Poly1305::new(key.expose().into());
    let nonce = incremented_nonce(file_nonce, block_index);

    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext_block)
        .map_err(|_| RcloneFramingError::BlockAuthFailed { block_index })
}

/// Parse and validate the 32-byte rclone-crypt file header, returning the
/// embedded file nonce.
pub fn parse_header(header: &[u8]) -> Result<[u8; NONCE_LEN], RcloneFramingError> {
    if header.len() < HEADER_LEN as usize {
        return Err(RcloneFramingError::HeaderTooShort);
    }
    if &header[..8] != FILE_MAGIC {
        return Err(RcloneFramingError::BadMagic);
    }
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&header[8..32]);
    Ok(nonce)
}

/// rclone increments the little-endian 192-bit nonce-as-integer by
/// `block_index`, carrying across all 24 bytes.
fn incremented_nonce(file_nonce: &[u8; NONCE_LEN], block_index: u64) -> [u8; NONCE_LEN] {
    let mut nonce = *file_nonce;
    let mut carry: u128 = block_index as u128;
    for byte in nonce.iter_mut() {
        if carry == 0 {
            break;
        }
        let sum = *byte as u128 + (carry & 0xff);
        *byte = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
    nonce
}

/// Maps an underlying ciphertext byte offset (relative to the start of the
/// data region, i.e. excluding the 32-byte header) to `(block_index,
/// offset_within_block)`.
pub fn locate_block(ciphertext_data_offset: i64) -> (u64, i64) {
    let block_index = (ciphertext_data_offset / FULL_BLOCK_SIZE) as u64;
    let offset = ciphertext_data_offset % FULL_BLOCK_SIZE;
    (block_index, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_increment_carries_across_bytes() {
        let nonce = [0xffu8; NONCE_LEN];
        let next = incremented_nonce(&nonce, 1);
        assert_eq!(next, [0u8; NONCE_LEN]);
    }

    #[test]
    fn nonce_increment_zero_is_identity() {
        let nonce = [5u8; NONCE_LEN];
        assert_eq!(incremented_nonce(&nonce, 0), nonce);
    }

    #[test]
    fn locate_block_splits_on_full_block_boundary() {
        assert_eq!(locate_block(0), (0, 0));
        assert_eq!(locate_block(FULL_BLOCK_SIZE - 1), (0, FULL_BLOCK_SIZE - 1));
        assert_eq!(locate_block(FULL_BLOCK_SIZE), (1, 0));
    }

    #[test]
    fn parse_header_rejects_short_input() {
        assert!(matches!(
            parse_header(&[0u8; 10]),
            Err(RcloneFramingError::HeaderTooShort)
        ));
    }

    #[test]
    fn parse_header_rejects_bad_magic() {
        let mut header = [0u8; 32];
        header[..8].copy_from_slice(b"NOTRCLON");
        assert!(matches!(
            parse_header(&header),
            Err(RcloneFramingError::BadMagic)
        ));
    }

    #[test]
    fn parse_header_roundtrips_nonce() {
        let mut header = [0u8; 32];
        header[..8].copy_from_slice(FILE_MAGIC);
        let nonce: [u8; NONCE_LEN] = (8..32).map(|i| i as u8).collect::<Vec<_>>().try_into().unwrap();
        header[8..32].copy_from_slice(&nonce);
        assert_eq!(parse_header(&header).unwrap(), nonce);
    }
}
