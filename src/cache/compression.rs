//! Compression Support
//!
//! Transparent compression of oversized values. Values are serialized to
//! JSON; when the serialized form is larger than the configured threshold it
//! is compressed before storage and restored on read.

use crate::cache::entry::{CachePayload, CompressionAlgorithm};
use crate::error::{Error, Result};
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};

// =============================================================================
// Compression Configuration
// =============================================================================

/// Configuration for compression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompressionConfig {
    /// Global switch
    pub enabled: bool,
    /// Values whose serialized size exceeds this are compressed
    pub threshold_bytes: usize,
    /// Algorithm used for new entries
    pub algorithm: CompressionAlgorithm,
    /// Algorithm-specific level (None = algorithm default)
    pub level: Option<i32>,
    /// Payloads at or above this size are compressed on the blocking pool
    pub offload_threshold_bytes: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes: 1024,
            algorithm: CompressionAlgorithm::Gzip,
            level: None,
            offload_threshold_bytes: 256 * 1024,
        }
    }
}

// =============================================================================
// Compressor Trait
// =============================================================================

/// Trait for compression implementations
pub trait Compressor: Send + Sync {
    /// Get the algorithm identifier
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Compress data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

// =============================================================================
// Gzip Compressor
// =============================================================================

/// Gzip compressor (default)
pub struct GzipCompressor {
    level: u32,
}

impl GzipCompressor {
    pub fn new() -> Self {
        Self { level: 6 }
    }

    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for GzipCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Gzip
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(
            Vec::with_capacity(data.len() / 2),
            flate2::Compression::new(self.level),
        );
        encoder
            .write_all(data)
            .map_err(|e| Error::Compression(format!("gzip: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| Error::Compression(format!("gzip: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::with_capacity(data.len() * 2);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::Decompression(format!("gzip: {}", e)))?;
        Ok(out)
    }
}

// =============================================================================
// Zstd Compressor
// =============================================================================

/// Zstd compressor (better ratio at similar speed)
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    pub fn new() -> Self {
        Self { level: 3 }
    }

    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for ZstdCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Zstd
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::encode_all(data, self.level).map_err(|e| Error::Compression(format!("zstd: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| Error::Decompression(format!("zstd: {}", e)))
    }
}

// =============================================================================
// LZ4 Compressor
// =============================================================================

/// LZ4 compressor (fastest, lower ratio)
pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    pub fn new() -> Self {
        Self { level: 4 }
    }

    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)),
            true,
        )
        .map_err(|e| Error::Compression(format!("lz4: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::decompress(data, None).map_err(|e| Error::Decompression(format!("lz4: {}", e)))
    }
}

// =============================================================================
// Compression Manager
// =============================================================================

/// Applies the threshold policy and converts values to and from payloads
pub struct CompressionManager {
    config: CompressionConfig,
    gzip: GzipCompressor,
    zstd: ZstdCompressor,
    lz4: Lz4Compressor,
}

impl CompressionManager {
    /// Create a manager with default config
    pub fn new() -> Self {
        Self::with_config(CompressionConfig::default())
    }

    /// Create with custom config
    pub fn with_config(config: CompressionConfig) -> Self {
        let gzip = match config.level {
            Some(level) => GzipCompressor::with_level(level.max(0) as u32),
            None => GzipCompressor::new(),
        };
        let zstd = config.level.map(ZstdCompressor::with_level).unwrap_or_default();
        let lz4 = config.level.map(Lz4Compressor::with_level).unwrap_or_default();
        Self {
            config,
            gzip,
            zstd,
            lz4,
        }
    }

    fn compressor(&self, algorithm: CompressionAlgorithm) -> &dyn Compressor {
        match algorithm {
            CompressionAlgorithm::Gzip => &self.gzip,
            CompressionAlgorithm::Zstd => &self.zstd,
            CompressionAlgorithm::Lz4 => &self.lz4,
        }
    }

    /// Whether a serialized value of `size` bytes gets compressed
    pub fn should_compress(&self, size: usize) -> bool {
        self.config.enabled && size > self.config.threshold_bytes
    }

    /// Whether compressing `size` bytes should leave the async executor
    pub fn should_offload(&self, size: usize) -> bool {
        self.should_compress(size) && size >= self.config.offload_threshold_bytes
    }

    /// Compress a serialized string with the configured algorithm
    pub fn compress(&self, serialized: &[u8]) -> Result<Bytes> {
        let compressed = self.compressor(self.config.algorithm).compress(serialized)?;
        Ok(Bytes::from(compressed))
    }

    /// Decompress bytes and parse them back into the original value
    pub fn decompress(&self, data: &[u8], algorithm: CompressionAlgorithm) -> Result<Value> {
        let raw = self.compressor(algorithm).decompress(data)?;
        serde_json::from_slice(&raw)
            .map_err(|e| Error::Decompression(format!("invalid JSON after {}: {}", algorithm, e)))
    }

    /// Build the payload to store for `value`, whose JSON form is `serialized`
    pub fn pack(&self, value: Value, serialized: &[u8]) -> Result<CachePayload> {
        if !self.should_compress(serialized.len()) {
            return Ok(CachePayload::raw(value, serialized.len() as u64));
        }
        let data = self.compress(serialized)?;
        Ok(CachePayload::compressed(
            data,
            self.config.algorithm,
            serialized.len() as u64,
        ))
    }

    /// Restore the value held by a payload
    pub fn unpack(&self, payload: &CachePayload) -> Result<Value> {
        match payload {
            CachePayload::Raw { data, .. } => Ok(data.clone()),
            CachePayload::Compressed {
                data, algorithm, ..
            } => self.decompress(data, *algorithm),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }
}

impl Default for CompressionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    const TEST_DATA: &[u8] = b"Hello, this is test data that should compress well. \
        It has some repetition: Hello, this is test data that should compress well.";

    fn large_value() -> Value {
        let posts: Vec<Value> = (0..64)
            .map(|i| json!({"id": i, "title": format!("Post number {}", i), "published": true}))
            .collect();
        json!({ "posts": posts })
    }

    #[test]
    fn test_gzip_roundtrip() {
        let compressor = GzipCompressor::new();
        let compressed = compressor.compress(TEST_DATA).unwrap();
        assert!(compressed.len() < TEST_DATA.len());
        assert_eq!(compressor.decompress(&compressed).unwrap(), TEST_DATA);
    }

    #[test]
    fn test_alternate_algorithms() {
        for compressor in [
            Box::new(ZstdCompressor::new()) as Box<dyn Compressor>,
            Box::new(Lz4Compressor::new()),
        ] {
            let compressed = compressor.compress(TEST_DATA).unwrap();
            assert_eq!(compressor.decompress(&compressed).unwrap(), TEST_DATA);
        }
    }

    #[test]
    fn test_threshold_policy() {
        let manager = CompressionManager::new();
        assert!(!manager.should_compress(1024));
        assert!(manager.should_compress(1025));

        let disabled = CompressionManager::with_config(CompressionConfig {
            enabled: false,
            ..Default::default()
        });
        assert!(!disabled.should_compress(1_000_000));
    }

    #[test]
    fn test_pack_large_value_compresses() {
        let manager = CompressionManager::new();
        let value = large_value();
        let serialized = serde_json::to_vec(&value).unwrap();
        assert!(serialized.len() > 1024);

        let payload = manager.pack(value.clone(), &serialized).unwrap();
        assert!(payload.is_compressed());
        assert_eq!(payload.original_size(), serialized.len() as u64);
        assert!(payload.stored_size() < payload.original_size());
        assert_eq!(manager.unpack(&payload).unwrap(), value);
    }

    #[test]
    fn test_pack_small_value_stays_raw() {
        let manager = CompressionManager::new();
        let value = json!({"id": 1});
        let serialized = serde_json::to_vec(&value).unwrap();

        let payload = manager.pack(value.clone(), &serialized).unwrap();
        assert!(!payload.is_compressed());
        assert_eq!(manager.unpack(&payload).unwrap(), value);
    }

    #[test]
    fn test_zstd_payload_readable_by_default_manager() {
        let zstd = CompressionManager::with_config(CompressionConfig {
            algorithm: CompressionAlgorithm::Zstd,
            ..Default::default()
        });
        let value = large_value();
        let serialized = serde_json::to_vec(&value).unwrap();
        let payload = zstd.pack(value.clone(), &serialized).unwrap();

        let gzip = CompressionManager::new();
        assert_eq!(gzip.unpack(&payload).unwrap(), value);
    }

    #[test]
    fn test_corrupt_input_is_decompression_error() {
        let manager = CompressionManager::new();
        let compressed = manager.compress(TEST_DATA).unwrap();
        let truncated = &compressed[..compressed.len() / 2];

        assert_matches!(
            manager.decompress(truncated, CompressionAlgorithm::Gzip),
            Err(Error::Decompression(_))
        );
        assert_matches!(
            manager.decompress(b"definitely not gzip", CompressionAlgorithm::Gzip),
            Err(Error::Decompression(_))
        );
    }
}
