//! Sealing of stored access key material
//!
//! Values are AES-256-GCM sealed under a 32-byte key encryption key and
//! stored as `enc:v1:` followed by base64(nonce || ciphertext || tag).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use thiserror::Error;

const SEALED_PREFIX: &str = "enc:v1:";
const AAD: &[u8] = b"relaydeck:access_key";
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("Key encryption key must be base64 of 32 bytes")]
    InvalidKey,

    #[error("Stored value is not a sealed key")]
    Malformed,

    #[error("Stored value failed authentication")]
    Tampered,

    #[error("System random generator failed")]
    Random,

    #[error("Sealing failed")]
    Seal,
}

pub struct KeyCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCipher").finish_non_exhaustive()
    }
}

impl KeyCipher {
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKey);
        }
        let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| CipherError::InvalidKey)?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Key given as standard base64, as taken from configuration
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let key = BASE64
            .decode(encoded.trim())
            .map_err(|_| CipherError::InvalidKey)?;
        Self::new(&key)
    }

    /// Fresh random key encryption key, base64 encoded
    pub fn generate_key() -> Result<String, CipherError> {
        let mut key = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| CipherError::Random)?;
        Ok(BASE64.encode(key))
    }

    pub fn is_sealed(stored: &str) -> bool {
        stored.starts_with(SEALED_PREFIX)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce).map_err(|_| CipherError::Random)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::from(AAD),
                &mut in_out,
            )
            .map_err(|_| CipherError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&in_out);
        Ok(format!("{}{}", SEALED_PREFIX, BASE64.encode(sealed)))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, CipherError> {
        let encoded = stored
            .strip_prefix(SEALED_PREFIX)
            .ok_or(CipherError::Malformed)?;
        let mut sealed = BASE64.decode(encoded).map_err(|_| CipherError::Malformed)?;
        if sealed.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(CipherError::Malformed);
        }

        let (nonce, ciphertext) = sealed.split_at_mut(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| CipherError::Malformed)?;
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(AAD), ciphertext)
            .map_err(|_| CipherError::Tampered)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| CipherError::Malformed)
    }
}
