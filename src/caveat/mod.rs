//! caveat types and their registry
//!
//! A caveat is an attenuating condition carried by a token. First-party
//! caveats are predicates checked locally against an [Access]; the
//! third-party caveat demands a discharge token and is consumed by the
//! verifier instead. Applications define their own caveat types and wire
//! them in through [registry::register_caveat_type].

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

use crate::access::{Access, Action};
use crate::error::Error;

pub mod registry;
pub mod set;

use set::CaveatSet;

/// stable integer tag identifying a caveat type on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaveatType(pub u64);

impl fmt::Display for CaveatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub const CAV_THIRD_PARTY: CaveatType = CaveatType(1);
pub const CAV_BIND_TO_PARENT_TOKEN: CaveatType = CaveatType(2);
pub const CAV_IF_PRESENT: CaveatType = CaveatType(3);
pub const CAV_VALIDITY_WINDOW: CaveatType = CaveatType(4);

/// first type code available to applications; codes below this are reserved
/// for built-in caveats
pub const CAV_MIN_USER_DEFINED: CaveatType = CaveatType(1 << 32);

/// an attenuating condition carried by a macaroon
///
/// Implementations must also be `Serialize`, `DeserializeOwned` and
/// `PartialEq` to be registered; the registry erases those bounds so
/// caveats can be handled uniformly as trait objects.
pub trait Caveat: Any + Send + Sync + fmt::Debug {
    /// the stable type tag this caveat serializes under
    fn caveat_type(&self) -> CaveatType;

    /// whether the caveat denies the access
    ///
    /// `Ok(())` permits. [Error::ResourceUnspecified] means the caveat's
    /// resource scope is absent from the access; [IfPresent] uses it to
    /// select its branch, everywhere else it is an ordinary denial.
    fn prohibits(&self, access: &dyn Access) -> Result<(), Error>;

    /// attestations assert a fact without restricting access and are
    /// skipped during access checks
    fn is_attestation(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

/// requirement that the token be presented along with a discharge token
/// issued by the third party at `location`
///
/// `vid` lets the original issuer verify a discharge without knowing the
/// third party's key; `cid` lets the third party construct the discharge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caveat3P {
    pub location: String,
    #[serde(with = "crate::format::bytes")]
    pub vid: Vec<u8>,
    #[serde(with = "crate::format::bytes")]
    pub cid: Vec<u8>,
}

impl Caveat for Caveat3P {
    fn caveat_type(&self) -> CaveatType {
        CAV_THIRD_PARTY
    }

    fn prohibits(&self, _access: &dyn Access) -> Result<(), Error> {
        // part of token verification, no role in access validation
        Err(Error::BadCaveat("3rd party caveat".to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// the window of time the token is valid for, in Unix seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub not_before: i64,
    pub not_after: i64,
}

impl Caveat for ValidityWindow {
    fn caveat_type(&self) -> CaveatType {
        CAV_VALIDITY_WINDOW
    }

    fn prohibits(&self, access: &dyn Access) -> Result<(), Error> {
        let now = access.now().timestamp();

        if now > self.not_after {
            return Err(Error::Unauthorized(format!(
                "token only valid until {}",
                fmt_ts(self.not_after)
            )));
        }
        if now < self.not_before {
            return Err(Error::Unauthorized(format!(
                "token not valid until {}",
                fmt_ts(self.not_before)
            )));
        }

        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn fmt_ts(secs: i64) -> String {
    match DateTime::from_timestamp(secs, 0) {
        Some(t) => t.to_rfc3339(),
        None => secs.to_string(),
    }
}

/// discharge-only caveat stating that the discharge may only be used with
/// a specific root token, or further attenuated versions of it
///
/// The parent token is identified by a prefix of the SHA256 digest of its
/// tail. The caveat may appear multiple times to iteratively clamp down
/// which versions of the root the discharge is usable with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindToParentToken(#[serde(with = "crate::format::bytes")] pub Vec<u8>);

impl Caveat for BindToParentToken {
    fn caveat_type(&self) -> CaveatType {
        CAV_BIND_TO_PARENT_TOKEN
    }

    fn prohibits(&self, _access: &dyn Access) -> Result<(), Error> {
        // part of token verification, no role in access validation
        Err(Error::BadCaveat("bind-to-parent".to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// applies the `ifs` caveats when the resources they concern are specified
/// by the access; otherwise only allows actions in `else_action`
///
/// This is only meaningful in combination with resource caveats, i.e.
/// caveats that return [Error::ResourceUnspecified] when the access does
/// not mention their resource scope. A caveat chain can thereby say "if
/// the access concerns apps, require read-only on app 5; otherwise allow
/// only reads".
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct IfPresent {
    pub ifs: CaveatSet,
    #[serde(rename = "else")]
    pub else_action: Action,
}

impl Caveat for IfPresent {
    fn caveat_type(&self) -> CaveatType {
        CAV_IF_PRESENT
    }

    fn prohibits(&self, access: &dyn Access) -> Result<(), Error> {
        let mut merr = None;
        let mut if_branch = false;

        for caveat in self.ifs.caveats() {
            // any result other than "resource unspecified" takes the if branch
            match caveat.prohibits(access) {
                Err(e) if e.is_resource_unspecified() => {}
                result => {
                    if_branch = true;
                    merr = Error::append(merr, result.err());
                }
            }
        }

        if !if_branch && !access.action().is_subset_of(self.else_action) {
            return Err(Error::UnauthorizedForAction(format!(
                "access {} ({} not allowed)",
                access.action(),
                access.action().without(self.else_action)
            )));
        }

        match merr {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
