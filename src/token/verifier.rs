//! signature-chain verification
//!
//! Verification replays the token's life: starting from the key derived
//! from the nonce, every caveat advances the expected tail by one HMAC
//! step. Along the way the verifier captures, for each third-party caveat,
//! the chain key in force when that caveat was added — the VID is sealed
//! under exactly that key, and unsealing it recovers the discharge root
//! key without knowing the third party's key.
//!
//! A discharge is accepted if its recomputed chain matches its stored tail
//! either plainly or after one extra HMAC under the root tail (a discharge
//! bound with [Macaroon::bind](crate::Macaroon::bind)). Accepting both
//! means an unbound discharge also satisfies a verifier that never asked
//! for binding; callers who require binding must have the third party
//! attach a [BindToParentToken] caveat, which pins the discharge to a
//! prefix of the SHA256 digest of the root tail.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::caveat::registry;
use crate::caveat::set::{encode_caveat, CaveatSet};
use crate::caveat::{BindToParentToken, Caveat3P};
use crate::crypto::{self, SigningKey};
use crate::error::Error;
use crate::token::Macaroon;

/// an outstanding third-party caveat: the discharge root key recovered
/// from its VID, waiting for a discharge token to claim it
struct DischargeSlot {
    location: String,
    rn: Vec<u8>,
    matched: bool,
}

impl Macaroon {
    /// verifies the token against the signing key it was minted with
    ///
    /// Every third-party caveat must be matched by a valid token in
    /// `discharges`; discharges that match nothing are ignored.
    /// `token_binding_ids` satisfy any [BindToParentToken] caveats on this
    /// token itself. Returns the effective caveat set, collected from the
    /// token and all accepted discharges, for evaluation against accesses.
    pub fn verify(
        &self,
        key: &SigningKey,
        discharges: &[Vec<u8>],
        token_binding_ids: &[Vec<u8>],
    ) -> Result<CaveatSet, Error> {
        self.verify_inner(key.as_bytes(), discharges, token_binding_ids, None)
    }

    fn verify_inner(
        &self,
        key: &[u8],
        discharges: &[Vec<u8>],
        token_binding_ids: &[Vec<u8>],
        parent_tail: Option<&[u8]>,
    ) -> Result<CaveatSet, Error> {
        let mut expected = crypto::sign(key, &self.nonce.encode()?).to_vec();
        let mut slots: Vec<DischargeSlot> = Vec::new();

        for caveat in self.unsafe_caveats.caveats() {
            if let Some(c3p) = caveat.as_any().downcast_ref::<Caveat3P>() {
                // the VID was sealed under the chain key in force when the
                // caveat was added: capture it before applying the step
                let rn =
                    crypto::unseal(&expected, &c3p.vid).map_err(|_| Error::BadSignature)?;
                slots.push(DischargeSlot {
                    location: c3p.location.clone(),
                    rn,
                    matched: false,
                });
            }

            expected = crypto::sign(&expected, &encode_caveat(caveat.as_ref())?).to_vec();
        }

        let chain_ok = bool::from(expected.as_slice().ct_eq(&self.tail));
        let bound_ok = match parent_tail {
            Some(parent) => {
                bool::from(crypto::sign(parent, &expected).as_slice().ct_eq(&self.tail))
            }
            None => false,
        };
        if !chain_ok && !bound_ok {
            return Err(Error::BadSignature);
        }

        for bind in self.unsafe_caveats.get::<BindToParentToken>() {
            if !token_binding_ids.iter().any(|id| id.starts_with(&bind.0)) {
                return Err(Error::BadSignature);
            }
        }

        let mut verified = CaveatSet::default();
        collect_effective(&self.unsafe_caveats, &mut verified)?;

        let tail_digest = Sha256::digest(&self.tail).to_vec();

        for (i, buf) in discharges.iter().enumerate() {
            let discharge = Macaroon::decode(buf)?;

            let Some(slot) = slots
                .iter_mut()
                .find(|s| !s.matched && s.location == discharge.location)
            else {
                // a discharge for some other token; not our problem
                continue;
            };

            // a discharge may carry third-party caveats of its own, but it
            // cannot discharge itself
            let rest: Vec<Vec<u8>> = discharges
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, b)| b.clone())
                .collect();

            let discharged = discharge.verify_inner(
                &slot.rn,
                &rest,
                std::slice::from_ref(&tail_digest),
                Some(&self.tail),
            )?;
            slot.matched = true;

            for caveat in discharged.into_caveats() {
                verified.push(caveat);
            }
        }

        if let Some(slot) = slots.iter().find(|s| !s.matched) {
            return Err(Error::Undischarged(slot.location.clone()));
        }

        Ok(verified)
    }
}

/// copies everything except verification-only caveats into `out`
fn collect_effective(set: &CaveatSet, out: &mut CaveatSet) -> Result<(), Error> {
    for caveat in set.caveats() {
        if caveat.as_any().is::<Caveat3P>() || caveat.as_any().is::<BindToParentToken>() {
            continue;
        }
        out.push(registry::clone_caveat(caveat.as_ref())?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caveat::ValidityWindow;
    use crate::crypto::EncryptionKey;
    use crate::token::discharge::{discharge_cid, WireCid};

    fn window(not_after: i64) -> ValidityWindow {
        ValidityWindow {
            not_before: 0,
            not_after,
        }
    }

    #[test]
    fn vid_key_is_snapshotted_per_caveat_position() {
        // third-party caveats at different chain positions, with
        // first-party caveats in between, must all be dischargeable
        let key = SigningKey::new();
        let ka1 = EncryptionKey::new();
        let ka2 = EncryptionKey::new();

        let mut m = Macaroon::new(b"kid", "https://api", &key).unwrap();
        m.add(window(100)).unwrap();
        m.add_third_party(&ka1, "https://auth1", vec![]).unwrap();
        m.add(window(200)).unwrap();
        m.add_third_party(&ka2, "https://auth2", vec![]).unwrap();

        let encoded = m.encode().unwrap();
        let decoded = Macaroon::decode(&encoded).unwrap();

        let cids = decoded.third_party_cids();
        let (_, d1) = discharge_cid(&ka1, "https://auth1", &cids["https://auth1"]).unwrap();
        let (_, d2) = discharge_cid(&ka2, "https://auth2", &cids["https://auth2"]).unwrap();

        // discharge order does not have to match caveat order
        let discharges = vec![d2.encode().unwrap(), d1.encode().unwrap()];
        let verified = decoded.verify(&key, &discharges, &[]).unwrap();

        assert_eq!(verified.len(), 2);
        assert_eq!(verified.get::<ValidityWindow>().len(), 2);
    }

    #[test]
    fn unbound_discharge_verifies_directly_under_rn() {
        let key = SigningKey::new();
        let ka = EncryptionKey::new();

        let mut m = Macaroon::new(b"kid", "https://api", &key).unwrap();
        m.add_third_party(&ka, "https://auth", vec![]).unwrap();
        let cids = m.third_party_cids();

        let (_, dm) = discharge_cid(&ka, "https://auth", &cids["https://auth"]).unwrap();
        let encoded = dm.encode().unwrap();

        // recover RN the way the third party does and verify the discharge
        // as a standalone token
        let plain = crypto::unseal(ka.as_bytes(), &cids["https://auth"]).unwrap();
        let wire: WireCid = crate::format::from_slice(&plain).unwrap();
        let rn = SigningKey::from_bytes(&wire.rn).unwrap();

        let unbound = Macaroon::decode(&encoded).unwrap();
        unbound.verify(&rn, &[], &[]).unwrap();

        // binding ids are irrelevant without bind-to-parent caveats
        unbound.verify(&rn, &[], &[vec![123]]).unwrap();
    }

    #[test]
    fn proof_and_legacy_discharges_both_verify() {
        use crate::token::discharge::discharge_cid_with_proof;

        for proof in [true, false] {
            let key = SigningKey::new();
            let ka = EncryptionKey::new();

            let mut m = Macaroon::new(b"kid", "https://api", &key).unwrap();
            m.add_third_party(&ka, "https://auth", vec![]).unwrap();
            let cids = m.third_party_cids();

            let (_, dm) =
                discharge_cid_with_proof(&ka, "https://auth", &cids["https://auth"], proof)
                    .unwrap();
            assert_eq!(dm.nonce.proof, proof);

            let decoded = Macaroon::decode(&m.encode().unwrap()).unwrap();
            decoded
                .verify(&key, &[dm.encode().unwrap()], &[])
                .unwrap();
        }
    }

    #[test]
    fn discharge_cannot_discharge_itself() {
        // a discharge whose own third-party caveat points at its own
        // location must not recurse onto itself forever
        let key = SigningKey::new();
        let ka = EncryptionKey::new();

        let mut m = Macaroon::new(b"kid", "https://api", &key).unwrap();
        m.add_third_party(&ka, "https://auth", vec![]).unwrap();
        let cids = m.third_party_cids();

        let (_, mut dm) = discharge_cid(&ka, "https://auth", &cids["https://auth"]).unwrap();
        dm.add_third_party(&ka, "https://auth", vec![]).unwrap();

        let decoded = Macaroon::decode(&m.encode().unwrap()).unwrap();
        let err = decoded
            .verify(&key, &[dm.encode().unwrap()], &[])
            .unwrap_err();
        assert_eq!(err, Error::Undischarged("https://auth".to_string()));
    }
}
