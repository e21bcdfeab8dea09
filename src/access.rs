//! access contexts evaluated against caveats

use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

use crate::error::Error;

bitflags::bitflags! {
    /// the operation a principal is attempting
    ///
    /// Actions form a bitset so a single caveat can grant several at once.
    /// `a.is_subset_of(b)` is the authorization primitive: an access is
    /// allowed when its action set is covered by the caveat's.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Action: u16 {
        const READ = 1;
        const WRITE = 1 << 1;
        const CREATE = 1 << 2;
        const DELETE = 1 << 3;
        const CONTROL = 1 << 4;
    }
}

impl Action {
    pub const NONE: Action = Action::empty();
    pub const ALL: Action = Action::all();

    /// whether every action in `self` is also in `other`
    pub fn is_subset_of(self, other: Action) -> bool {
        other.contains(self)
    }

    /// the actions in `self` that are not in `other`
    pub fn without(self, other: Action) -> Action {
        self.difference(other)
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::NONE
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LETTERS: [(Action, char); 5] = [
            (Action::READ, 'r'),
            (Action::WRITE, 'w'),
            (Action::CREATE, 'c'),
            (Action::DELETE, 'd'),
            (Action::CONTROL, 'C'),
        ];

        if self.is_empty() {
            return write!(f, "-");
        }
        for (action, letter) in LETTERS {
            if self.contains(action) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

// Actions travel inside caveat bodies. Unknown bits are retained verbatim so
// that decoding and re-encoding a caveat reproduces the exact bytes covered
// by the signature chain.
impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.bits())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u16::deserialize(deserializer).map(Action::from_bits_retain)
    }
}

/// the context of an attempted operation
///
/// Different caveats require different contextual information; the library
/// itself only needs the action, a clock, and a structural validity check.
/// Host applications implement this for their own resource model; their
/// caveats recover the concrete type through [Access::as_any].
pub trait Access: Any {
    /// the action being attempted by the principal
    fn action(&self) -> Action;

    /// the current time; the verifier never reads a clock itself
    fn now(&self) -> DateTime<Utc>;

    /// callback for validating the structure of the access
    ///
    /// Implementations should ensure parent resources are specified when
    /// child resources are present, and that sibling resources are not
    /// combined, so an access describes a single operation on a single
    /// object. Return [Error::ResourceUnspecified] or
    /// [Error::ResourcesMutuallyExclusive] accordingly.
    fn validate(&self) -> Result<(), Error>;

    fn as_any(&self) -> &dyn Any;
}
