//! AES-CBC framing: whole-file single IV, zero-padded to a 16-byte block
//! boundary, no padding marker.
//!
//! Block-aligned CBC decryption requires decrypting from the start of a
//! block; callers must always request ciphertext starting on a 16-byte
//! boundary and discard bytes before their real start offset themselves
//! (the decryption wrapper in `reader::decrypt` does this).

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};

use crate::crypto::keys::AesKey;

pub const BLOCK_SIZE: i64 = 16;
pub const IV_LEN: usize = 16;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

#[derive(thiserror::Error, Debug)]
pub enum AesCbcFramingError {
    #[error("ciphertext length {0} is not a multiple of the 16-byte block size")]
    Unaligned(usize),
}

/// Decrypt a ciphertext buffer that starts at the very first block of the
/// file (using the file IV directly). The buffer's length must be a
/// multiple of 16; trailing zero padding in the last block of the file is
/// left in place for the caller to trim against the known plaintext size.
pub fn decrypt_aligned(
    key: &AesKey,
    iv: &[u8; IV_LEN],
    mut ciphertext: Vec<u8>,
) -> Result<Vec<u8>, AesCbcFramingError> {
    if ciphertext.len() % BLOCK_SIZE as usize != 0 {
        return Err(AesCbcFramingError::Unaligned(ciphertext.len()));
    }

    let plain_len = match key {
        AesKey::Aes128(k) => Aes128CbcDec::new(k.as_slice().into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut ciphertext)
            .expect("block-aligned buffer never fails NoPadding decrypt")
            .len(),
        AesKey::Aes192(k) => Aes192CbcDec::new(k.as_slice().into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut ciphertext)
            .expect("block-aligned buffer never fails NoPadding decrypt")
            .len(),
        AesKey::Aes256(k) => Aes256CbcDec::new(k.as_slice().into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut ciphertext)
            .expect("block-aligned buffer never fails NoPadding decrypt")
            .len(),
    };
    ciphertext.truncate(plain_len);
    Ok(ciphertext)
}

/// Decrypt starting mid-stream, given the ciphertext block immediately
/// preceding `ciphertext` to serve as the CBC chaining value (its own
/// plaintext is discarded).
pub fn decrypt_chained(
    key: &AesKey,
    previous_ciphertext_block: &[u8; BLOCK_SIZE as usize],
    mut ciphertext: Vec<u8>,
) -> Result<Vec<u8>, AesCbcFramingError> {
    if ciphertext.len() % BLOCK_SIZE as usize != 0 {
        return Err(AesCbcFramingError::Unaligned(ciphertext.len()));
    }
    let iv = previous_ciphertext_block;
    let plain_len = match key {
        AesKey::Aes128(k) => Aes128CbcDec::new(k.as_slice().into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut ciphertext)
            .expect("block-aligned buffer never fails NoPadding decrypt")
            .len(),
        AesKey::Aes192(k) => Aes192CbcDec::new(k.as_slice().into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut ciphertext)
            .expect("block-aligned buffer never fails NoPadding decrypt")
            .len(),
        AesKey::Aes256(k) => Aes256CbcDec::new(k.as_slice().into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut ciphertext)
            .expect("block-aligned buffer never fails NoPadding decrypt")
            .len(),
    };
    ciphertext.truncate(plain_len);
    Ok(ciphertext)
}

/// Number of bytes of zero padding appended to reach the 16-byte boundary,
/// given the true plaintext size.
pub fn padding_len(plaintext_size: i64) -> i64 {
    let rem = plaintext_size % BLOCK_SIZE;
    if rem == 0 {
        0
    } else {
        BLOCK_SIZE - rem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_len_covers_exact_multiples() {
        assert_eq!(padding_len(16), 0);
        assert_eq!(padding_len(15), 1);
        assert_eq!(padding_len(17), 15);
        assert_eq!(padding_len(0), 0);
    }

    #[test]
    fn rejects_unaligned_ciphertext() {
        let key = AesKey::from_bytes(&[0u8; 32]).unwrap();
        let iv = [0u8; IV_LEN];
        let err = decrypt_aligned(&key, &iv, vec![0u8; 17]).unwrap_err();
        assert!(matches!(err, AesCbcFramingError::Unaligned(17)));
    }

    #[test]
    fn decrypt_aligned_is_involution_of_encrypt_for_every_key_size() {
        use aes::cipher::BlockEncryptMut;

        let iv = [9u8; IV_LEN];
        let plaintext = b"0123456789abcdef0123456789abcdef".to_vec(); // 32 bytes, block-aligned

        for key_len in [16usize, 24, 32] {
            let key_bytes = vec![7u8; key_len];
            let key = AesKey::from_bytes(&key_bytes).unwrap();

            let mut buf = plaintext.clone();
            buf.resize(buf.len() + BLOCK_SIZE as usize, 0);
            let ct_len = match key_len {
                16 => cbc::Encryptor::<aes::Aes128>::new(key_bytes.as_slice().into(), &iv.into())
                    .encrypt_padded_mut::<NoPadding>(&mut buf, plaintext.len())
                    .unwrap()
                    .len(),
                24 => cbc::Encryptor::<aes::Aes192>::new(key_bytes.as_slice().into(), &iv.into())
                    .encrypt_padded_mut::<NoPadding>(&mut buf, plaintext.len())
                    .unwrap()
                    .len(),
                32 => cbc::Encryptor::<aes::Aes256>::new(key_bytes.as_slice().into(), &iv.into())
                    .encrypt_padded_mut::<NoPadding>(&mut buf, plaintext.len())
                    .unwrap()
                    .len(),
                _ => unreachable!(),
            };
            buf.truncate(ct_len);

            let decrypted = decrypt_aligned(&key, &iv, buf).unwrap();
            assert_eq!(decrypted, plaintext, "failed for {key_len}-byte key");
        }
    }
}
