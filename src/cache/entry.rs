//! Cache Entry Types
//!
//! Defines stored payloads and the entries that carry them.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// Compression Algorithm
// =============================================================================

/// Compression algorithm identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    #[default]
    Gzip,
    Zstd,
    Lz4,
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionAlgorithm::Gzip => write!(f, "gzip"),
            CompressionAlgorithm::Zstd => write!(f, "zstd"),
            CompressionAlgorithm::Lz4 => write!(f, "lz4"),
        }
    }
}

// =============================================================================
// Cache Payload
// =============================================================================

/// What a tier actually stores for a key
#[derive(Debug, Clone, PartialEq)]
pub enum CachePayload {
    /// The value as given to `set`
    Raw {
        data: Value,
        /// Serialized size in bytes
        size_bytes: u64,
    },
    /// Compressed serialized JSON
    Compressed {
        data: Bytes,
        algorithm: CompressionAlgorithm,
        /// Serialized size before compression
        original_size: u64,
        /// Stored size after compression
        compressed_size: u64,
    },
}

impl CachePayload {
    /// Wrap an uncompressed value
    pub fn raw(data: Value, size_bytes: u64) -> Self {
        CachePayload::Raw { data, size_bytes }
    }

    /// Wrap compressed bytes
    pub fn compressed(data: Bytes, algorithm: CompressionAlgorithm, original_size: u64) -> Self {
        let compressed_size = data.len() as u64;
        CachePayload::Compressed {
            data,
            algorithm,
            original_size,
            compressed_size,
        }
    }

    /// Whether the payload is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, CachePayload::Compressed { .. })
    }

    /// Bytes held by the tier for this payload
    pub fn stored_size(&self) -> u64 {
        match self {
            CachePayload::Raw { size_bytes, .. } => *size_bytes,
            CachePayload::Compressed {
                compressed_size, ..
            } => *compressed_size,
        }
    }

    /// Serialized size of the original value
    pub fn original_size(&self) -> u64 {
        match self {
            CachePayload::Raw { size_bytes, .. } => *size_bytes,
            CachePayload::Compressed { original_size, .. } => *original_size,
        }
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A stored value within a tier
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Key, unique within its tier
    pub key: String,
    /// Stored payload
    pub payload: Arc<CachePayload>,
    /// Wall-clock time of insertion
    pub created_at: DateTime<Utc>,
    /// Monotonic time of insertion
    pub inserted_at: Instant,
    /// Monotonic expiry deadline
    pub expires_at: Instant,
    /// TTL override supplied by the caller, if any
    pub ttl_override: Option<u64>,
}

impl CacheEntry {
    /// Create a new entry expiring `ttl` from now
    pub fn new(key: impl Into<String>, payload: CachePayload, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            key: key.into(),
            payload: Arc::new(payload),
            created_at: Utc::now(),
            inserted_at: now,
            expires_at: now + ttl,
            ttl_override: None,
        }
    }

    /// Create an entry with a caller supplied TTL
    pub fn with_ttl_override(key: impl Into<String>, payload: CachePayload, ttl_seconds: u64) -> Self {
        let mut entry = Self::new(key, payload, Duration::from_secs(ttl_seconds));
        entry.ttl_override = Some(ttl_seconds);
        entry
    }

    /// Check if the entry has expired at `now`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Time left before expiry
    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Stored size in bytes
    pub fn stored_size(&self) -> u64 {
        self.payload.stored_size()
    }
}
