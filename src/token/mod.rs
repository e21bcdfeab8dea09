//! main structures to interact with macaroons

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::caveat::set::{encode_caveat, CaveatSet};
use crate::caveat::{Caveat, Caveat3P};
use crate::crypto::{self, EncryptionKey, SigningKey};
use crate::error::Error;

pub mod discharge;
pub(crate) mod verifier;

/// size in bytes of the random component of a [Nonce]
pub const NONCE_RND_SIZE: usize = 16;

/// uniquely identifies a token issuance
///
/// `kid` names the signing key so verifiers can find it again; `rnd`
/// makes every mint distinct even under the same key; `proof` marks
/// discharge tokens issued in proof mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nonce {
    #[serde(with = "crate::format::bytes")]
    pub kid: Vec<u8>,
    #[serde(with = "crate::format::bytes")]
    pub rnd: Vec<u8>,
    pub proof: bool,
}

impl Nonce {
    pub(crate) fn new(kid: Vec<u8>, proof: bool) -> Self {
        Nonce {
            kid,
            rnd: crypto::rand_bytes::<NONCE_RND_SIZE>().to_vec(),
            proof,
        }
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(crate::format::to_vec(self)?)
    }
}

/// a bearer token carrying caveats and a rolling HMAC tail
///
/// Tokens start their life with [Macaroon::new], are restricted with
/// [Macaroon::add] and [Macaroon::add_third_party], and travel as msgpack
/// buffers produced by [Macaroon::encode]. Decoding performs no
/// verification: the caveat list is untrusted until
/// [Macaroon::verify](crate::Macaroon::verify) succeeds, which is what the
/// `unsafe_caveats` name is there to remind you of.
///
/// ```rust
/// use macaroon::{Macaroon, SigningKey, ValidityWindow};
///
/// fn main() -> Result<(), macaroon::Error> {
///     let key = SigningKey::new();
///     let mut token = Macaroon::new(b"key-id", "https://api", &key)?;
///     token.add(ValidityWindow { not_before: 0, not_after: 2_000_000_000 })?;
///     let encoded = token.encode()?;
///
///     // any holder may attenuate: decode, add, re-encode
///     let mut held = Macaroon::decode(&encoded)?;
///     held.add(ValidityWindow { not_before: 0, not_after: 1_000_000_000 })?;
///
///     // the issuer verifies the chain and recovers the effective caveats
///     let caveats = held.verify(&key, &[], &[])?;
///     assert_eq!(caveats.len(), 2);
///     Ok(())
/// }
/// ```
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Macaroon {
    pub nonce: Nonce,
    pub location: String,
    #[serde(rename = "caveats")]
    pub unsafe_caveats: CaveatSet,
    #[serde(with = "crate::format::bytes")]
    pub tail: Vec<u8>,
}

impl Macaroon {
    /// mints a fresh root macaroon
    ///
    /// `kid` is an opaque identifier for `key`; verifiers use it to look
    /// the signing key back up and it is visible to anyone holding the
    /// token.
    pub fn new(kid: &[u8], location: impl Into<String>, key: &SigningKey) -> Result<Self, Error> {
        Macaroon::mint(Nonce::new(kid.to_vec(), false), location.into(), key)
    }

    pub(crate) fn mint(nonce: Nonce, location: String, key: &SigningKey) -> Result<Self, Error> {
        let tail = crypto::sign(key.as_bytes(), &nonce.encode()?).to_vec();

        Ok(Macaroon {
            nonce,
            location,
            unsafe_caveats: CaveatSet::default(),
            tail,
        })
    }

    /// appends a caveat, advancing the signature chain
    ///
    /// A caveat structurally equal to one already present is skipped
    /// silently. Fails only if the caveat's type is not registered.
    pub fn add(&mut self, caveat: impl Caveat) -> Result<(), Error> {
        self.add_boxed(Box::new(caveat))
    }

    /// [Macaroon::add] for caveats that are already boxed
    pub fn add_boxed(&mut self, caveat: Box<dyn Caveat>) -> Result<(), Error> {
        if self.unsafe_caveats.contains(caveat.as_ref()) {
            return Ok(());
        }

        let caveat_bytes = encode_caveat(caveat.as_ref())?;
        self.tail = crypto::sign(&self.tail, &caveat_bytes).to_vec();
        self.unsafe_caveats.push(caveat);
        Ok(())
    }

    /// adds a third-party caveat sealed to `ka`, the key shared with the
    /// third party at `location`
    ///
    /// A fresh root key for the discharge is generated and sealed twice
    /// over: under the current tail for the issuer (the VID) and under
    /// `ka` for the third party (the CID), together with `caveats`, which
    /// the third party is asked to carry on the discharge.
    pub fn add_third_party(
        &mut self,
        ka: &EncryptionKey,
        location: impl Into<String>,
        caveats: Vec<Box<dyn Caveat>>,
    ) -> Result<(), Error> {
        let rn = SigningKey::new();

        let vid = crypto::seal(&self.tail, rn.as_bytes())?;

        let wire = discharge::WireCid {
            rn: rn.as_bytes().to_vec(),
            nonce: self.nonce.clone(),
            caveats: CaveatSet::new(caveats),
        };
        let cid = crypto::seal(ka.as_bytes(), &crate::format::to_vec(&wire)?)?;

        self.add(Caveat3P {
            location: location.into(),
            vid,
            cid,
        })
    }

    /// msgpack-encodes the token
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(crate::format::to_vec(self)?)
    }

    /// parses an encoded token without verifying it
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        Ok(crate::format::from_slice(buf)?)
    }

    /// renders the token as JSON for human inspection
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self)
            .map_err(|e| crate::error::Format::SerializationError(e.to_string()).into())
    }

    /// parses the JSON form produced by [Macaroon::to_json]
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json)
            .map_err(|e| crate::error::Format::DeserializationError(e.to_string()).into())
    }

    /// binds this discharge token to the specific token `parent_encoded`
    ///
    /// The tail becomes `HMAC(parent_tail, tail)`, so the discharge can no
    /// longer satisfy a differently-attenuated version of the parent.
    /// Binding must be the last modification: adding caveats afterwards
    /// breaks verification.
    pub fn bind(&mut self, parent_encoded: &[u8]) -> Result<(), Error> {
        let parent = Macaroon::decode(parent_encoded)?;
        self.tail = crypto::sign(&parent.tail, &self.tail).to_vec();
        Ok(())
    }

    /// extracts the caveat identifiers of all third-party caveats, keyed
    /// by third-party location
    ///
    /// When several caveats name the same location, the first one wins.
    pub fn third_party_cids(&self) -> HashMap<String, Vec<u8>> {
        let mut cids = HashMap::new();

        for caveat in self.unsafe_caveats.caveats() {
            if let Some(c3p) = caveat.as_any().downcast_ref::<Caveat3P>() {
                cids.entry(c3p.location.clone())
                    .or_insert_with(|| c3p.cid.clone());
            }
        }

        cids
    }
}
