//! Decryption Wrapper: turns a requested decrypted byte range into the
//! minimal encrypted range needed from the underlying reader, decrypts
//! it, and trims block prefix/suffix bytes that fall outside the
//! requested range.
//!
//! Because AES-CBC chaining and rclone-crypt block framing both require
//! decrypting whole blocks in order, a window is fetched and decrypted
//! as one unit rather than byte-by-byte; the Virtual File Reader already
//! bounds windows to `max_range_size` so this never means buffering an
//! entire file.

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::instrument;

use crate::crypto::{
    aes_cbc,
    keys::{AesKey, RcloneKey},
    rclone,
};
use crate::reader::usenet::{UsenetReadError, UsenetRangeReader};
use crate::segment::{Credentials, EncryptionKind};

#[derive(thiserror::Error, Debug)]
pub enum DecryptError {
    #[error("missing credentials for encrypted file")]
    MissingCredentials,

    #[error("unsupported cipher: {0:?}")]
    UnsupportedCipher(EncryptionKind),

    #[error("corrupted ciphertext framing: {0}")]
    CorruptedCrypt(String),

    #[error("encrypted stream is shorter than the header requires (got {got}, need {need})")]
    EncryptedFileTooShort { got: i64, need: i64 },

    #[error("underlying read failed: {0}")]
    Underlying(#[from] UsenetReadError),

    #[error("key derivation failed: {0}")]
    Key(#[from] crate::crypto::keys::KeyError),
}

/// Opens a byte range `[underlying_start, underlying_end]` (inclusive) of
/// the encrypted on-wire stream, returning a range reader over it. This
/// is the seam §4.4 composes over §4.3 through.
#[async_trait]
pub trait UnderlyingOpener: Send + Sync {
    async fn open(
        &self,
        underlying_start: i64,
        underlying_end: i64,
    ) -> Result<UsenetRangeReader, UsenetReadError>;
}

/// On-wire size of a file with the given plaintext size and encryption.
pub fn on_wire_size(plaintext_size: i64, encryption: EncryptionKind) -> i64 {
    match encryption {
        EncryptionKind::None => plaintext_size,
        EncryptionKind::Aes => plaintext_size + aes_cbc::padding_len(plaintext_size),
        EncryptionKind::Rclone => rclone_on_wire(plaintext_size),
    }
}

/// `rclone_on_wire(plaintext) = header + ceil(plaintext / block_data) * full_block`,
/// except the last block carries only `residue + overhead` when there is
/// a nonzero residue.
pub fn rclone_on_wire(plaintext_size: i64) -> i64 {
    let full_blocks = plaintext_size / rclone::BLOCK_DATA_SIZE;
    let residue = plaintext_size % rclone::BLOCK_DATA_SIZE;
    let mut total = rclone::HEADER_LEN + full_blocks * rclone::FULL_BLOCK_SIZE;
    if residue > 0 {
        total += residue + rclone::BLOCK_OVERHEAD;
    }
    total
}

/// Inverse of [`rclone_on_wire`]. `None` if `encrypted` is too short to
/// contain even the header.
pub fn rclone_decrypted_size(encrypted: i64) -> Result<i64, DecryptError> {
    if encrypted < rclone::HEADER_LEN {
        return Err(DecryptError::EncryptedFileTooShort {
            got: encrypted,
            need: rclone::HEADER_LEN,
        });
    }
    let body = encrypted - rclone::HEADER_LEN;
    let full_blocks = body / rclone::FULL_BLOCK_SIZE;
    let residue = body % rclone::FULL_BLOCK_SIZE;
    let mut plaintext = full_blocks * rclone::BLOCK_DATA_SIZE;
    if residue > 0 {
        plaintext += residue - rclone::BLOCK_OVERHEAD;
    }
    Ok(plaintext)
}

enum CipherState {
    Rclone { key: RcloneKey },
    Aes { key: AesKey, file_iv: [u8; aes_cbc::IV_LEN] },
}

/// Constructed once per logical file; produces a decrypted reader for
/// any requested plaintext range.
pub struct DecryptionWrapper {
    state: CipherState,
    plaintext_size: i64,
    encrypted_total: i64,
}

impl DecryptionWrapper {
    pub fn new(
        encryption: EncryptionKind,
        credentials: &Credentials,
        plaintext_size: i64,
    ) -> Result<Self, DecryptError> {
        let state = match encryption {
            EncryptionKind::None => return Err(DecryptError::UnsupportedCipher(encryption)),
            EncryptionKind::Rclone => {
                let password: &SecretString = credentials
                    .password
                    .as_ref()
                    .ok_or(DecryptError::MissingCredentials)?;
                let salt = credentials
                    .salt
                    .as_ref()
                    .ok_or(DecryptError::MissingCredentials)?;
                let key = RcloneKey::derive(password, salt)?;
                CipherState::Rclone { key }
            }
            EncryptionKind::Aes => {
                let aes_key = credentials
                    .aes_key
                    .as_ref()
                    .ok_or(DecryptError::MissingCredentials)?;
                let iv = credentials.aes_iv.ok_or(DecryptError::MissingCredentials)?;
                let key = AesKey::from_bytes(aes_key)?;
                CipherState::Aes { key, file_iv: iv }
            }
        };
        let encrypted_total = on_wire_size(plaintext_size, encryption);
        Ok(Self {
            state,
            plaintext_size,
            encrypted_total,
        })
    }

    /// Decrypt plaintext range `[s, e]` (inclusive, `0 <= s <= e <
    /// plaintext_size`), fetching the minimal covering encrypted range
    /// through `opener`.
    #[instrument(skip(self, opener))]
    pub async fn open_range(
        &self,
        opener: &dyn UnderlyingOpener,
        s: i64,
        e: i64,
    ) -> Result<Vec<u8>, DecryptError> {
        // EOF normalization: treat a range ending at the last plaintext
        // byte as "to end" so the last (possibly short) block is sized
        // from the real encrypted total, not recomputed block math.
        let to_end = e == self.plaintext_size - 1;

        match &self.state {
            CipherState::Rclone { key } => self.open_rclone_range(opener, key, s, e, to_end).await,
            CipherState::Aes { key, file_iv } => {
                self.open_aes_range(opener, key, file_iv, s, e, to_end).await
            }
        }
    }

    async fn open_rclone_range(
        &self,
        opener: &dyn UnderlyingOpener,
        key: &RcloneKey,
        s: i64,
        e: i64,
        to_end: bool,
    ) -> Result<Vec<u8>, DecryptError> {
        if self.encrypted_total < rclone::HEADER_LEN {
            return Err(DecryptError::EncryptedFileTooShort {
                got: self.encrypted_total,
                need: rclone::HEADER_LEN,
            });
        }

        let mut header_reader = opener.open(0, rclone::HEADER_LEN - 1).await?;
        let mut header = vec![0u8; rclone::HEADER_LEN as usize];
        read_exact_from(&mut header_reader, &mut header).await?;
        let file_nonce = rclone::parse_header(&header)
            .map_err(|e| DecryptError::CorruptedCrypt(e.to_string()))?;

        let first_block = (s / rclone::BLOCK_DATA_SIZE) as u64;
        let last_block = (e / rclone::BLOCK_DATA_SIZE) as u64;
        let skip_prefix = s - first_block as i64 * rclone::BLOCK_DATA_SIZE;
        let take_len = e - s + 1;

        let underlying_start = rclone::HEADER_LEN + first_block as i64 * rclone::FULL_BLOCK_SIZE;
        let underlying_end = if to_end {
            self.encrypted_total - 1
        } else {
            (rclone::HEADER_LEN + (last_block + 1) as i64 * rclone::FULL_BLOCK_SIZE - 1)
                .min(self.encrypted_total - 1)
        };

        let mut reader = opener.open(underlying_start, underlying_end).await?;
        let remaining = (underlying_end - underlying_start + 1) as usize;
        let mut ciphertext = vec![0u8; remaining];
        read_exact_from(&mut reader, &mut ciphertext).await?;

        let mut plaintext = Vec::with_capacity(remaining);
        let mut offset = 0usize;
        let mut block_index = first_block;
        while offset < ciphertext.len() {
            let block_len = (ciphertext.len() - offset).min(rclone::FULL_BLOCK_SIZE as usize);
            let block = &ciphertext[offset..offset + block_len];
            let decrypted = rclone::decrypt_block(key, &file_nonce, block_index, block)
                .map_err(|e| DecryptError::CorruptedCrypt(e.to_string()))?;
            plaintext.extend_from_slice(&decrypted);
            offset += block_len;
            block_index += 1;
        }

        let start = skip_prefix as usize;
        let end = (start + take_len as usize).min(plaintext.len());
        Ok(plaintext[start..end].to_vec())
    }

    async fn open_aes_range(
        &self,
        opener: &dyn UnderlyingOpener,
        key: &AesKey,
        file_iv: &[u8; aes_cbc::IV_LEN],
        s: i64,
        e: i64,
        to_end: bool,
    ) -> Result<Vec<u8>, DecryptError> {
        let block = aes_cbc::BLOCK_SIZE;
        let block_start = (s / block) * block;
        let mut block_end_excl = ((e / block) + 1) * block;
        if to_end {
            block_end_excl = self.encrypted_total;
        }
        block_end_excl = block_end_excl.min(self.encrypted_total);

        let skip_prefix = s - block_start;
        let take_len = e - s + 1;

        let needs_chaining_iv = block_start > 0;
        let fetch_start = if needs_chaining_iv {
            block_start - block
        } else {
            block_start
        };
        let fetch_end = block_end_excl - 1;

        let mut reader = opener.open(fetch_start, fetch_end).await?;
        let mut buf = vec![0u8; (fetch_end - fetch_start + 1) as usize];
        read_exact_from(&mut reader, &mut buf).await?;

        let plaintext = if needs_chaining_iv {
            let prev: [u8; aes_cbc::IV_LEN] = buf[..aes_cbc::IV_LEN].try_into().unwrap();
            let ciphertext = buf[aes_cbc::IV_LEN..].to_vec();
            aes_cbc::decrypt_chained(key, &prev, ciphertext)
        } else {
            aes_cbc::decrypt_aligned(key, file_iv, buf)
        }
        .map_err(|e| DecryptError::CorruptedCrypt(e.to_string()))?;

        let start = skip_prefix as usize;
        let end = (start + take_len as usize).min(plaintext.len());
        Ok(plaintext[start..end].to_vec())
    }
}

async fn read_exact_from(reader: &mut UsenetRangeReader, buf: &mut [u8]) -> Result<(), UsenetReadError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_on_wire_is_multiple_of_16_and_in_range() {
        for n in 0..40i64 {
            let w = on_wire_size(n, EncryptionKind::Aes);
            assert_eq!(w % 16, 0);
            assert!(w >= n && w < n + 16);
            assert_eq!(w == n, n % 16 == 0);
        }
    }

    #[test]
    fn rclone_on_wire_and_decrypted_size_invert() {
        for n in [0i64, 1, 65535, 65536, 65537, 200_000] {
            let encrypted = rclone_on_wire(n);
            let decrypted = rclone_decrypted_size(encrypted).unwrap();
            assert_eq!(decrypted, n, "failed for plaintext size {n}");
        }
    }

    #[test]
    fn rclone_too_short_is_an_error() {
        assert!(rclone_decrypted_size(rclone::HEADER_LEN - 1).is_err());
    }
}
