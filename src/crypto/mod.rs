//! cryptographic operations
//!
//! The macaroon construction rests on two primitives: an HMAC-SHA256 chain
//! carried in the token's tail, and an AEAD seal used to convey the
//! third-party caveat identifiers. Every caveat added to a token advances
//! the chain with `tail' = HMAC(tail, caveat_bytes)`, so any holder can
//! append caveats while nobody can remove them without the signing key.
//!
//! Sealing uses XChaCha20-Poly1305 with a random 192-bit nonce prepended
//! to the ciphertext, which makes nonce reuse cryptographically negligible.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroize;

use crate::error::Format;

type HmacSha256 = Hmac<Sha256>;

/// size in bytes of signing and encryption keys
pub const KEY_SIZE: usize = 32;

/// size in bytes of the rolling HMAC-SHA256 tail
pub const SIGNATURE_SIZE: usize = 32;

/// size in bytes of the random AEAD nonce prepended to sealed data
pub(crate) const SEAL_NONCE_SIZE: usize = 24;

/// key used as the HMAC seed for a root macaroon
///
/// The key is wiped from memory on drop.
pub struct SigningKey(pub(crate) [u8; KEY_SIZE]);

impl SigningKey {
    /// generates a fresh random key
    pub fn new() -> Self {
        SigningKey(rand_bytes::<KEY_SIZE>())
    }

    /// deserializes from a byte slice
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Format> {
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Format::InvalidKeySize(bytes.len()))?;
        Ok(SigningKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl Default for SigningKey {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SigningKey {
    fn clone(&self) -> Self {
        SigningKey(self.0)
    }
}

impl Drop for SigningKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print full key material
        write!(f, "SigningKey({}..)", hex::encode(&self.0[..2]))
    }
}

/// symmetric key shared with a third party, used to seal caveat identifiers
///
/// The key is wiped from memory on drop.
pub struct EncryptionKey(pub(crate) [u8; KEY_SIZE]);

impl EncryptionKey {
    /// generates a fresh random key
    pub fn new() -> Self {
        EncryptionKey(rand_bytes::<KEY_SIZE>())
    }

    /// deserializes from a byte slice
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Format> {
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Format::InvalidKeySize(bytes.len()))?;
        Ok(EncryptionKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl Default for EncryptionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EncryptionKey {
    fn clone(&self) -> Self {
        EncryptionKey(self.0)
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey({}..)", hex::encode(&self.0[..2]))
    }
}

/// one HMAC-SHA256 step of the signature chain
pub(crate) fn sign(key: &[u8], payload: &[u8]) -> [u8; SIGNATURE_SIZE] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.finalize().into_bytes().into()
}

/// seals `plaintext` under `key`, prepending the random nonce
pub(crate) fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Format> {
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| Format::InvalidKeySize(key.len()))?;

    let nonce = rand_bytes::<SEAL_NONCE_SIZE>();
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| Format::Seal)?;

    let mut out = Vec::with_capacity(SEAL_NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// inverse of [seal]; fails if the buffer was tampered with or the key is wrong
pub(crate) fn unseal(key: &[u8], buf: &[u8]) -> Result<Vec<u8>, Format> {
    if buf.len() < SEAL_NONCE_SIZE {
        return Err(Format::Seal);
    }

    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| Format::InvalidKeySize(key.len()))?;

    let (nonce, ciphertext) = buf.split_at(SEAL_NONCE_SIZE);
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| Format::Seal)
}

pub(crate) fn rand_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}
