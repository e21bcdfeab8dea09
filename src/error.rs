//! error types
//!

use thiserror::Error;

/// the global error type for macaroon operations
#[derive(Error, Clone, Debug, PartialEq)]
pub enum Error {
    #[error("bad signature")]
    BadSignature,
    #[error("no discharge token for third party caveat: {0}")]
    Undischarged(String),
    #[error("bad discharge token")]
    BadDischarge,
    #[error("unregistered caveat type: {0}")]
    UnregisteredCaveat(String),
    #[error("error deserializing or verifying the token")]
    Format(Format),
    #[error("invalid access")]
    InvalidAccess,
    #[error("resource unspecified: {0}")]
    ResourceUnspecified(String),
    #[error("resources mutually exclusive: {0}")]
    ResourcesMutuallyExclusive(String),
    #[error("unauthorized for resource: {0}")]
    UnauthorizedForResource(String),
    #[error("unauthorized for action: {0}")]
    UnauthorizedForAction(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("bad caveat: {0}")]
    BadCaveat(String),
    #[error("{}", display_multiple(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    /// whether this error (or, for an accumulated error, any of its parts)
    /// signals that a caveat's resource scope is absent from the access
    pub fn is_resource_unspecified(&self) -> bool {
        match self {
            Error::ResourceUnspecified(_) => true,
            Error::Multiple(errs) => errs.iter().any(Error::is_resource_unspecified),
            _ => false,
        }
    }

    /// combines two optional errors, flattening into [Error::Multiple]
    pub(crate) fn append(merr: Option<Error>, err: Option<Error>) -> Option<Error> {
        match (merr, err) {
            (merr, None) => merr,
            (None, err) => err,
            (Some(Error::Multiple(mut errs)), Some(e)) => {
                errs.push(e);
                Some(Error::Multiple(errs))
            }
            (Some(m), Some(e)) => Some(Error::Multiple(vec![m, e])),
        }
    }
}

fn display_multiple(errs: &[Error]) -> String {
    errs.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<Format> for Error {
    fn from(e: Format) -> Self {
        Error::Format(e)
    }
}

/// errors related to the token's serialization format or sealing
#[derive(Error, Clone, Debug, PartialEq)]
pub enum Format {
    #[error("could not deserialize the token: {0}")]
    DeserializationError(String),
    #[error("could not serialize the token: {0}")]
    SerializationError(String),
    #[error("bad caveat container")]
    BadCaveatContainer,
    #[error("invalid key size")]
    InvalidKeySize(usize),
    #[error("sealing failed")]
    Seal,
}
