use std::fmt;
use std::str::FromStr;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, KeyInit};
use aes::Aes256Dec;
use base64::Engine;

use crate::errors::CryptoError;

const BLOCK_SIZE: usize = 16;

/// AES-256 key used to decrypt encrypted indices and entries.
///
/// Regions are encrypted in CBC mode with an all-zero IV and PKCS#7 padding.
#[derive(Clone)]
pub struct AesKey(Aes256Dec);

impl AesKey {
    pub fn from_bytes(key: &[u8; 32]) -> Self {
        AesKey(Aes256Dec::new(GenericArray::from_slice(key)))
    }

    /// Decrypts `ciphertext` into a freshly allocated buffer and strips the
    /// padding. The input is left untouched.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::UnalignedCiphertext(ciphertext.len()));
        }

        let mut plaintext = ciphertext.to_vec();
        let mut previous = [0u8; BLOCK_SIZE];
        for (chunk, cipher_block) in plaintext
            .chunks_exact_mut(BLOCK_SIZE)
            .zip(ciphertext.chunks_exact(BLOCK_SIZE))
        {
            self.0.decrypt_block(aes::Block::from_mut_slice(chunk));
            for (byte, prev) in chunk.iter_mut().zip(previous.iter()) {
                *byte ^= prev;
            }
            previous.copy_from_slice(cipher_block);
        }

        let pad = usize::from(plaintext[plaintext.len() - 1]);
        if pad == 0
            || pad > BLOCK_SIZE
            || !plaintext[plaintext.len() - pad..]
                .iter()
                .all(|&b| usize::from(b) == pad)
        {
            return Err(CryptoError::PaddingValidationFailed);
        }
        plaintext.truncate(plaintext.len() - pad);
        Ok(plaintext)
    }
}

/// Size on disk of a region of `len` plaintext bytes once encrypted.
pub(crate) fn encrypted_len(len: u64) -> u64 {
    (len | (BLOCK_SIZE as u64 - 1)) + 1
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("AES key must be 32 bytes given as 64 hex digits or base64")]
pub struct InvalidKey;

impl FromStr for AesKey {
    type Err = InvalidKey;

    /// Accepts 64 hex digits (optionally `0x`-prefixed) or standard base64.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hex_digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = if hex_digits.len() == 64 {
            hex::decode(hex_digits).map_err(|_| InvalidKey)?
        } else {
            base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|_| InvalidKey)?
        };
        let key: [u8; 32] = bytes.try_into().map_err(|_| InvalidKey)?;
        Ok(AesKey::from_bytes(&key))
    }
}
