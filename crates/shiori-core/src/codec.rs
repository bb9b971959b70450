//! Step payload encoding.
//!
//! Payloads are JSON. A value that encodes to `null` (such as `()` or `None`)
//! is stored as an absent payload.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Encodes a step's return value into payload bytes.
pub fn encode_payload<T: Serialize + ?Sized>(value: &T) -> Result<Option<Vec<u8>>, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Null => Ok(None),
        value => serde_json::to_vec(&value).map(Some),
    }
}

/// Decodes payload bytes into `T`.
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(payload)
}
