//! Wire format for values stored in Redis.
//!
//! Every cached payload is prefixed with a two-byte header:
//!
//! ```text
//! [magic 0xC7] [codec tag] [payload...]
//! ```
//!
//! Tag `0` marks a cached "confirmed absent" result and carries no
//! payload; tags `1` (MessagePack) and `2` (JSON) carry a serialized
//! value. Anything that fails the magic or tag check decodes as
//! [`Unwrapped::Invalid`] and is treated as a cache miss by the caller,
//! never as an error: a corrupted cache must degrade, not fail reads.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::CodecKind;
use crate::error::CacheError;

pub(crate) const MAGIC: u8 = 0xC7;

const TAG_NULL: u8 = 0;
const TAG_BINARY: u8 = 1;
const TAG_TEXT: u8 = 2;

/// Result of parsing the wire header.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Unwrapped<'a> {
    /// A cached "confirmed absent" marker.
    Null,
    /// A value payload in the tagged codec.
    Value(CodecKind, &'a [u8]),
    /// Not a corral wire value (wrong magic, unknown tag, truncated).
    Invalid,
}

fn tag_for(codec: CodecKind) -> u8 {
    match codec {
        CodecKind::Binary => TAG_BINARY,
        CodecKind::Text => TAG_TEXT,
    }
}

/// Prefix an encoded payload with the wire header.
pub(crate) fn wrap_value(codec: CodecKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(MAGIC);
    out.push(tag_for(codec));
    out.extend_from_slice(payload);
    out
}

/// The two-byte "confirmed absent" marker.
pub(crate) fn wrap_null() -> Vec<u8> {
    vec![MAGIC, TAG_NULL]
}

/// Parse the wire header off raw Redis bytes.
pub(crate) fn unwrap(bytes: &[u8]) -> Unwrapped<'_> {
    match bytes {
        [MAGIC, TAG_NULL] => Unwrapped::Null,
        [MAGIC, TAG_BINARY, payload @ ..] => Unwrapped::Value(CodecKind::Binary, payload),
        [MAGIC, TAG_TEXT, payload @ ..] => Unwrapped::Value(CodecKind::Text, payload),
        _ => Unwrapped::Invalid,
    }
}

/// Serialize a value and wrap it for the wire.
pub(crate) fn encode<V: Serialize>(value: &V, codec: CodecKind) -> Result<Vec<u8>, CacheError> {
    let payload = match codec {
        CodecKind::Binary => {
            rmp_serde::to_vec_named(value).map_err(|e| CacheError::Encode(e.to_string()))?
        }
        CodecKind::Text => {
            serde_json::to_vec(value).map_err(|e| CacheError::Encode(e.to_string()))?
        }
    };
    Ok(wrap_value(codec, &payload))
}

/// Deserialize a payload in the codec named by its wire tag.
///
/// Returns `None` on any decode failure; callers treat that as a miss.
pub(crate) fn decode<V: DeserializeOwned>(payload: &[u8], codec: CodecKind) -> Option<V> {
    match codec {
        CodecKind::Binary => rmp_serde::from_slice(payload).ok(),
        CodecKind::Text => serde_json::from_slice(payload).ok(),
    }
}
