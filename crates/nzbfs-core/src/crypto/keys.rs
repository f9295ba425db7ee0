//! Key derivation and scoped key material handling.
//!
//! Key bytes are wrapped in a zeroizing container and only ever handed to a
//! caller through a short-lived reference, never returned by value.

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

/// Parameters for the rclone-crypt key derivation, pinned to the values
/// the real rclone crypt backend uses.
const SCRYPT_LOG_N: u8 = 14; // N = 16384
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const DERIVED_KEY_LEN: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    #[error("missing password for rclone-crypt key derivation")]
    MissingPassword,

    #[error("missing salt for rclone-crypt key derivation")]
    MissingSalt,

    #[error("salt is not valid base64: {0}")]
    InvalidSaltEncoding(base64::DecodeError),

    #[error("scrypt key derivation failed: {0}")]
    ScryptFailure(scrypt::errors::InvalidParams),

    #[error("missing AES key")]
    MissingAesKey,

    #[error("AES key must be 16, 24, or 32 bytes, got {0}")]
    InvalidAesKeyLength(usize),

    #[error("missing AES IV")]
    MissingAesIv,
}

/// A derived 32-byte symmetric key, zeroized on drop, used for the
/// rclone-crypt cipher (always XSalsa20-Poly1305 with a 32-byte key).
///
/// Never exposes its bytes as an owned `Vec`/`[u8; 32]`; callers get a
/// borrow via [`RcloneKey::expose`] for the duration of a cipher
/// construction call.
pub struct RcloneKey(Zeroizing<[u8; DERIVED_KEY_LEN]>);

impl RcloneKey {
    pub fn expose(&self) -> &[u8; DERIVED_KEY_LEN] {
        &self.0
    }

    /// Derive an rclone-crypt data key from a password and base64-encoded
    /// salt using scrypt(N=16384, r=8, p=1) -> 32 bytes.
    pub fn derive(password: &SecretString, salt_b64: &str) -> Result<Self, KeyError> {
        use base64::Engine;

        let salt = base64::engine::general_purpose::STANDARD
            .decode(salt_b64)
            .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(salt_b64))
            .map_err(KeyError::InvalidSaltEncoding)?;

        let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, DERIVED_KEY_LEN)
            .map_err(KeyError::ScryptFailure)?;

        let mut out = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
        scrypt::scrypt(
            password.expose_secret().as_bytes(),
            &salt,
            &params,
            out.as_mut_slice(),
        )
        .expect("scrypt output buffer is the expected length");

        Ok(Self(out))
    }
}

impl std::fmt::Debug for RcloneKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RcloneKey(<redacted>)")
    }
}

/// An AES key of the size the logical file's credentials carry, zeroized
/// on drop. The variant selects which block cipher `crypto::aes_cbc`
/// constructs.
pub enum AesKey {
    Aes128(Zeroizing<[u8; 16]>),
    Aes192(Zeroizing<[u8; 24]>),
    Aes256(Zeroizing<[u8; 32]>),
}

impl AesKey {
    /// Wrap pre-supplied AES key bytes (spec §4.4: AES mode provides a raw
    /// key rather than a password+salt pair). Accepts 16, 24, or 32 bytes.
    pub fn from_bytes(key: &[u8]) -> Result<Self, KeyError> {
        match key.len() {
            16 => Ok(Self::Aes128(Zeroizing::new(key.try_into().unwrap()))),
            24 => Ok(Self::Aes192(Zeroizing::new(key.try_into().unwrap()))),
            32 => Ok(Self::Aes256(Zeroizing::new(key.try_into().unwrap()))),
            other => Err(KeyError::InvalidAesKeyLength(other)),
        }
    }
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use secrecy::SecretString;

    #[test]
    fn derive_rclone_is_deterministic() {
        let pw = SecretString::from("hunter2".to_string());
        let salt = base64::engine::general_purpose::STANDARD.encode("some-salt-bytes-");
        let k1 = RcloneKey::derive(&pw, &salt).unwrap();
        let k2 = RcloneKey::derive(&pw, &salt).unwrap();
        assert_eq!(k1.expose(), k2.expose());
    }

    #[test]
    fn aes_key_accepts_all_three_spec_lengths() {
        assert!(matches!(AesKey::from_bytes(&[0u8; 16]).unwrap(), AesKey::Aes128(_)));
        assert!(matches!(AesKey::from_bytes(&[0u8; 24]).unwrap(), AesKey::Aes192(_)));
        assert!(matches!(AesKey::from_bytes(&[0u8; 32]).unwrap(), AesKey::Aes256(_)));
    }

    #[test]
    fn aes_key_rejects_other_lengths() {
        assert!(AesKey::from_bytes(&[0u8; 20]).is_err());
        assert!(AesKey::from_bytes(&[]).is_err());
    }
}
