//! caveat containers and their codecs
//!
//! On the wire a caveat set is a flat msgpack array of `2 × n` elements
//! alternating the integer type code and the caveat value, so decoders can
//! dispatch each value through the registry. The JSON form is an array of
//! `{"type": name, "body": …}` objects.

use serde::de::{Deserializer, Error as _};
use serde::ser::{Error as _, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::access::Access;
use crate::caveat::{registry, Caveat, IfPresent};
use crate::error::{Error, Format};

/// an ordered set of caveats
///
/// Decoded sets are untrusted until the containing token passes
/// [crate::Macaroon::verify].
#[derive(Debug, Default)]
pub struct CaveatSet {
    caveats: Vec<Box<dyn Caveat>>,
}

impl CaveatSet {
    /// creates a set comprised of the specified caveats
    pub fn new(caveats: Vec<Box<dyn Caveat>>) -> Self {
        CaveatSet { caveats }
    }

    /// decodes a msgpack-encoded caveat set
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        Ok(crate::format::from_slice(buf)?)
    }

    /// msgpack-encodes the set
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(crate::format::to_vec(self)?)
    }

    pub fn caveats(&self) -> &[Box<dyn Caveat>] {
        &self.caveats
    }

    pub fn len(&self) -> usize {
        self.caveats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caveats.is_empty()
    }

    pub(crate) fn push(&mut self, caveat: Box<dyn Caveat>) {
        self.caveats.push(caveat);
    }

    pub(crate) fn contains(&self, caveat: &dyn Caveat) -> bool {
        self.caveats
            .iter()
            .any(|c| registry::caveat_eq(c.as_ref(), caveat))
    }

    pub(crate) fn into_caveats(self) -> Vec<Box<dyn Caveat>> {
        self.caveats
    }

    /// validates that the set permits the specified accesses
    ///
    /// Every access is first structurally validated, then checked against
    /// every non-attestation caveat. Evaluation does not short-circuit:
    /// the returned error accumulates all failures so callers can surface
    /// a complete denial rationale.
    pub fn validate(&self, accesses: &[&dyn Access]) -> Result<(), Error> {
        let mut merr = None;

        for access in accesses {
            if let Err(e) = access.validate() {
                merr = Error::append(merr, Some(e));
                continue;
            }

            merr = Error::append(merr, self.validate_access(*access).err());
        }

        match merr {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn validate_access(&self, access: &dyn Access) -> Result<(), Error> {
        let mut merr = None;

        for caveat in &self.caveats {
            if caveat.is_attestation() {
                continue;
            }

            merr = Error::append(merr, caveat.prohibits(access).err());
        }

        match merr {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// collects all caveats of type `T`, including those nested within
    /// [IfPresent] caveats
    pub fn get<T: Caveat>(&self) -> Vec<&T> {
        let mut found = Vec::new();
        self.collect_typed(&mut found);
        found
    }

    fn collect_typed<'a, T: Caveat>(&'a self, found: &mut Vec<&'a T>) {
        for caveat in &self.caveats {
            if let Some(typed) = caveat.as_any().downcast_ref::<T>() {
                found.push(typed);
            }
            if let Some(nested) = caveat.as_any().downcast_ref::<IfPresent>() {
                nested.ifs.collect_typed(found);
            }
        }
    }
}

impl PartialEq for CaveatSet {
    fn eq(&self, other: &Self) -> bool {
        self.caveats.len() == other.caveats.len()
            && self
                .caveats
                .iter()
                .zip(&other.caveats)
                .all(|(a, b)| registry::caveat_eq(a.as_ref(), b.as_ref()))
    }
}

/// the bytes a single caveat contributes to the signature chain: the
/// msgpack `[type, value]` pair, so the type tag is covered by the chain
pub(crate) fn encode_caveat(caveat: &dyn Caveat) -> Result<Vec<u8>, Error> {
    let vtable = registry::lookup(caveat.caveat_type())?;
    let value = (vtable.to_value)(caveat)?;
    Ok(crate::format::to_vec(&(caveat.caveat_type().0, value))?)
}

#[derive(Serialize, Deserialize)]
struct JsonCaveat {
    #[serde(rename = "type")]
    typ: String,
    body: serde_json::Value,
}

impl Serialize for CaveatSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let mut seq = serializer.serialize_seq(Some(self.caveats.len()))?;
            for caveat in &self.caveats {
                let vtable = registry::lookup(caveat.caveat_type()).map_err(S::Error::custom)?;
                let body = (vtable.to_json)(caveat.as_ref()).map_err(S::Error::custom)?;
                seq.serialize_element(&JsonCaveat {
                    typ: vtable.name.to_string(),
                    body,
                })?;
            }
            seq.end()
        } else {
            let mut seq = serializer.serialize_seq(Some(self.caveats.len() * 2))?;
            for caveat in &self.caveats {
                let vtable = registry::lookup(caveat.caveat_type()).map_err(S::Error::custom)?;
                seq.serialize_element(&caveat.caveat_type().0)?;
                seq.serialize_element(&(vtable.to_value)(caveat.as_ref()).map_err(S::Error::custom)?)?;
            }
            seq.end()
        }
    }
}

impl<'de> Deserialize<'de> for CaveatSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let tagged = Vec::<JsonCaveat>::deserialize(deserializer)?;
            let mut caveats = Vec::with_capacity(tagged.len());
            for entry in tagged {
                let vtable = registry::lookup_name(&entry.typ).map_err(D::Error::custom)?;
                caveats.push((vtable.from_json)(entry.body).map_err(D::Error::custom)?);
            }
            Ok(CaveatSet { caveats })
        } else {
            let items = Vec::<rmpv::Value>::deserialize(deserializer)?;
            if items.len() % 2 != 0 {
                return Err(D::Error::custom(Format::BadCaveatContainer));
            }

            let mut caveats = Vec::with_capacity(items.len() / 2);
            let mut items = items.into_iter();
            while let (Some(tag), Some(value)) = (items.next(), items.next()) {
                let typ = tag
                    .as_u64()
                    .ok_or_else(|| D::Error::custom(Format::BadCaveatContainer))?;
                let vtable =
                    registry::lookup(crate::caveat::CaveatType(typ)).map_err(D::Error::custom)?;
                caveats.push((vtable.from_value)(&value).map_err(D::Error::custom)?);
            }
            Ok(CaveatSet { caveats })
        }
    }
}
