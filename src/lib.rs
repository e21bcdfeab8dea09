//! Macaroon capability tokens
//!
//! Macaroons are bearer tokens with the following properties:
//!
//! * offline attenuation: any holder can append *caveats* (restrictions) to a
//!   token without talking to the issuer, and the result remains verifiable
//!   by the original signing key;
//! * tamper evidence: caveats can never be removed or altered — the token
//!   carries a rolling HMAC-SHA256 tail recomputed over every caveat during
//!   verification;
//! * third-party caveats: a token can demand that the bearer also present a
//!   *discharge* token issued by a named third party, cryptographically
//!   chained to the root token and optionally bound to one exact version of
//!   it.
//!
//! Non goals:
//!
//! * Revocation: tokens carry expiry caveats, but revocation lists require
//!   external state.
//! * Wire compatibility with other macaroon libraries: the msgpack format
//!   here is self-defined.
//!
//! # Usage
//!
//! A service mints a token with [Macaroon::new], restricts it with
//! [Macaroon::add] or [Macaroon::add_third_party], and hands out the
//! [Macaroon::encode] bytes. Whoever receives a token back calls
//! [Macaroon::verify] with the signing key and any discharge tokens, then
//! evaluates the returned [CaveatSet] against an [Access] describing the
//! attempted operation:
//!
//! ```rust
//! use macaroon::{Macaroon, SigningKey, EncryptionKey, ValidityWindow, discharge_cid};
//!
//! fn main() -> Result<(), macaroon::Error> {
//!     let key = SigningKey::new();
//!
//!     // the key shared with the authentication service
//!     let ka = EncryptionKey::new();
//!
//!     let mut token = Macaroon::new(b"key-id", "https://api", &key)?;
//!     token.add(ValidityWindow { not_before: 0, not_after: 33_000_000_000 })?;
//!     token.add_third_party(&ka, "https://auth", vec![])?;
//!     let encoded = token.encode()?;
//!
//!     // the bearer asks https://auth to discharge the third-party caveat
//!     let decoded = Macaroon::decode(&encoded)?;
//!     let cids = decoded.third_party_cids();
//!     let (_, mut discharge) = discharge_cid(&ka, "https://auth", &cids["https://auth"])?;
//!
//!     // the third party can attenuate the discharge before returning it,
//!     // and the bearer can bind it to this exact token
//!     discharge.bind(&encoded)?;
//!
//!     // back at the API: verify the chain and collect the caveats
//!     let caveats = decoded.verify(&key, &[discharge.encode()?], &[])?;
//!     assert_eq!(caveats.get::<ValidityWindow>().len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! # Caveats
//!
//! Built-in caveats cover validity windows ([ValidityWindow]), conditional
//! scoping ([IfPresent]), third parties ([Caveat3P]) and discharge binding
//! ([BindToParentToken]). Applications define their own resource caveats by
//! implementing [Caveat] and registering the type with
//! [register_caveat_type] before decoding any tokens carrying it.

pub mod access;
pub mod caveat;
mod crypto;
pub mod error;
mod format;
mod token;

pub use access::{Access, Action};
pub use caveat::registry::register_caveat_type;
pub use caveat::set::CaveatSet;
pub use caveat::{
    BindToParentToken, Caveat, Caveat3P, CaveatType, IfPresent, ValidityWindow,
    CAV_BIND_TO_PARENT_TOKEN, CAV_IF_PRESENT, CAV_MIN_USER_DEFINED, CAV_THIRD_PARTY,
    CAV_VALIDITY_WINDOW,
};
pub use crypto::{EncryptionKey, SigningKey, KEY_SIZE, SIGNATURE_SIZE};
pub use error::Error;
pub use token::discharge::{discharge_cid, third_party_cid};
pub use token::{Macaroon, Nonce, NONCE_RND_SIZE};
