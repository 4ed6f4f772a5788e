//! Cache key construction

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Default upper bound on key length before hashing
pub const DEFAULT_MAX_KEY_LENGTH: usize = 200;

/// Build `prefix:data`; strings are used verbatim, anything else as compact JSON.
///
/// With `hash` set, keys longer than `max_len` become `prefix:<sha256 hex>`.
pub fn create_key(prefix: &str, data: &Value, hash: bool, max_len: usize) -> String {
    let body = match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let key = format!("{}:{}", prefix, body);
    if hash && key.len() > max_len {
        let digest = Sha256::digest(key.as_bytes());
        return format!("{}:{}", prefix, hex::encode(digest));
    }
    key
}
