//! third-party discharge protocol

use serde::{Deserialize, Serialize};

use crate::caveat::registry;
use crate::caveat::set::CaveatSet;
use crate::caveat::{Caveat, Caveat3P};
use crate::crypto::{self, EncryptionKey, SigningKey};
use crate::error::Error;
use crate::token::{Macaroon, Nonce, NONCE_RND_SIZE};

/// interior of a caveat identifier: the discharge root key, the root
/// token's nonce, and any caveats the issuer asks the discharge to carry
#[derive(Serialize, Deserialize)]
pub(crate) struct WireCid {
    #[serde(with = "crate::format::bytes")]
    pub(crate) rn: Vec<u8>,
    pub(crate) nonce: Nonce,
    pub(crate) caveats: CaveatSet,
}

/// extracts the CID of the first third-party caveat naming `location`
/// from an encoded token, if any
pub fn third_party_cid(encoded: &[u8], location: &str) -> Result<Option<Vec<u8>>, Error> {
    let token = Macaroon::decode(encoded)?;

    Ok(token
        .unsafe_caveats
        .caveats()
        .iter()
        .filter_map(|c| c.as_any().downcast_ref::<Caveat3P>())
        .find(|c| c.location == location)
        .map(|c| c.cid.clone()))
}

/// issues a discharge token for a caveat identifier
///
/// Unseals the CID with `ka`, the key shared with the issuer, and mints a
/// discharge signed with the root key found inside. Caveats the issuer
/// asked for are added to the discharge and also returned, so the third
/// party can inspect what it is attesting to. The third party may add
/// further caveats of its own before encoding the result.
pub fn discharge_cid(
    ka: &EncryptionKey,
    location: &str,
    cid: &[u8],
) -> Result<(Vec<Box<dyn Caveat>>, Macaroon), Error> {
    discharge_cid_with_proof(ka, location, cid, true)
}

pub(crate) fn discharge_cid_with_proof(
    ka: &EncryptionKey,
    location: &str,
    cid: &[u8],
    proof: bool,
) -> Result<(Vec<Box<dyn Caveat>>, Macaroon), Error> {
    let plain = crypto::unseal(ka.as_bytes(), cid).map_err(|_| Error::BadDischarge)?;
    let wire: WireCid = crate::format::from_slice(&plain).map_err(|_| Error::BadDischarge)?;
    let rn = SigningKey::from_bytes(&wire.rn).map_err(|_| Error::BadDischarge)?;

    let kid = crypto::rand_bytes::<NONCE_RND_SIZE>().to_vec();
    let mut discharge = Macaroon::mint(Nonce::new(kid, proof), location.to_string(), &rn)?;

    let mut issued = Vec::with_capacity(wire.caveats.len());
    for caveat in wire.caveats.into_caveats() {
        issued.push(registry::clone_caveat(caveat.as_ref())?);
        discharge.add_boxed(caveat)?;
    }

    Ok((issued, discharge))
}
