//! wire format helpers
//!
//! Tokens are msgpack on the wire and tagged JSON objects for human
//! inspection. Types shared by both forms implement serde once and branch
//! on `is_human_readable`, so the binary form stays compact (msgpack `bin`)
//! while the JSON form stays legible (base64 strings).

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Format;

/// msgpack-encodes a value
pub(crate) fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, Format> {
    rmp_serde::to_vec(value).map_err(|e| Format::SerializationError(e.to_string()))
}

/// decodes a msgpack-encoded value
pub(crate) fn from_slice<T: DeserializeOwned>(buf: &[u8]) -> Result<T, Format> {
    rmp_serde::from_slice(buf).map_err(|e| Format::DeserializationError(e.to_string()))
}

/// serde adapter for binary fields: msgpack `bin` on the wire, base64
/// strings in the JSON form
pub(crate) mod bytes {
    use serde::de::{Deserializer, Error as _};
    use serde::ser::Serializer;
    use serde::Deserialize;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&base64::encode(bytes))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        if deserializer.is_human_readable() {
            let encoded = String::deserialize(deserializer)?;
            base64::decode(&encoded).map_err(D::Error::custom)
        } else {
            serde_bytes::ByteBuf::deserialize(deserializer).map(serde_bytes::ByteBuf::into_vec)
        }
    }
}
