//! Optional payload compression for log entries.
//!
//! Only the `data` payload is compressed; entry metadata stays plain so that
//! sequence numbers and transaction ids remain readable without inflating
//! anything. An entry is stored compressed only when the payload meets the
//! size threshold and the codec achieves a worthwhile ratio; in every other
//! case (including codec failure) the plain form is stored.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::warn;

use docstore_core::{CoreError, CoreResult, TransactionId};

use crate::entry::{EntryKind, EntryPayload, Operation, SequenceNumber, WalEntry};

/// Minimum ratio (original / compressed) for the compressed form to be kept.
pub const MIN_COMPRESSION_RATIO: f64 = 1.05;

/// Supported compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Deflate with a gzip wrapper (levels 1-9).
    Gzip,
    /// LZ4 block format with a length prefix. Ignores the level setting.
    Lz4,
    /// Compression disabled.
    None,
}

/// Compression configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Algorithm applied to entry payloads.
    pub algorithm: CompressionAlgorithm,
    /// Gzip compression level (1-9, default: 6).
    pub level: u32,
    /// Payloads smaller than this many serialized bytes are stored plain.
    pub threshold_bytes: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Gzip,
            level: 6, // Balanced compression
            threshold_bytes: 100,
        }
    }
}

impl CompressionConfig {
    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the gzip level is outside 1-9.
    pub fn validate(&self) -> CoreResult<()> {
        if !(1..=9).contains(&self.level) {
            return Err(CoreError::invalid_config(format!(
                "compression level {} out of range (1-9)",
                self.level
            )));
        }
        Ok(())
    }

    /// Convert compression level to `flate2::Compression`.
    fn compression_level(&self) -> Compression {
        match self.level {
            1 => Compression::fast(),
            6 => Compression::default(),
            9 => Compression::best(),
            n => Compression::new(n),
        }
    }
}

/// Entry metadata carried alongside a compressed payload: every field of the
/// plain record except `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Transaction this entry belongs to.
    #[serde(rename = "transactionId")]
    pub transaction_id: TransactionId,
    /// Store-assigned position in the log.
    #[serde(rename = "sequenceNumber")]
    pub sequence: SequenceNumber,
    /// Wall-clock milliseconds at construction.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Role of the entry within its transaction.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Target collection.
    #[serde(rename = "collectionName")]
    pub collection: String,
    /// Mutation recorded by the entry.
    pub operation: Operation,
    /// Digest of the plain entry; verified after decompression.
    pub checksum: String,
}

impl From<&WalEntry> for EntryMeta {
    fn from(entry: &WalEntry) -> Self {
        Self {
            transaction_id: entry.transaction_id.clone(),
            sequence: entry.sequence,
            timestamp: entry.timestamp,
            kind: entry.kind,
            collection: entry.collection.clone(),
            operation: entry.operation,
            checksum: entry.checksum.clone(),
        }
    }
}

/// Storage form of an entry whose payload was compressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedEntry {
    /// The entry minus its payload.
    #[serde(rename = "originalEntry")]
    pub original_entry: EntryMeta,
    /// Base64 of the compressed payload bytes.
    #[serde(rename = "compressedData")]
    pub compressed_data: String,
    /// Algorithm that produced `compressed_data`.
    #[serde(rename = "compressionAlgorithm")]
    pub compression_algorithm: CompressionAlgorithm,
    /// Serialized payload size before compression.
    #[serde(rename = "originalSize")]
    pub original_size: usize,
    /// Compressed payload size.
    #[serde(rename = "compressedSize")]
    pub compressed_size: usize,
    /// `original_size / compressed_size`.
    #[serde(rename = "compressionRatio")]
    pub compression_ratio: f64,
}

impl CompressedEntry {
    fn into_entry(self, data: EntryPayload) -> WalEntry {
        WalEntry {
            transaction_id: self.original_entry.transaction_id,
            sequence: self.original_entry.sequence,
            timestamp: self.original_entry.timestamp,
            kind: self.original_entry.kind,
            collection: self.original_entry.collection,
            operation: self.original_entry.operation,
            data,
            checksum: self.original_entry.checksum,
        }
    }
}

/// On-disk form of a record: plain or compressed.
///
/// A compressed record is recognized by the presence of `compressedData`,
/// `compressionAlgorithm` and `originalSize`; a plain record carries `data`
/// instead. The untagged representation keeps the log line format identical
/// to a plain entry when compression is off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredEntry {
    /// Payload compressed by [`compress`].
    Compressed(CompressedEntry),
    /// Entry stored as-is.
    Plain(WalEntry),
}

impl StoredEntry {
    /// Sequence number, readable without decompressing.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        match self {
            Self::Compressed(c) => c.original_entry.sequence,
            Self::Plain(e) => e.sequence,
        }
    }

    /// Whether this record is stored in compressed form.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Compressed(_))
    }
}

fn encode(payload: &[u8], config: &CompressionConfig) -> CoreResult<Vec<u8>> {
    match config.algorithm {
        CompressionAlgorithm::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), config.compression_level());
            encoder
                .write_all(payload)
                .map_err(|e| CoreError::Serialization(format!("gzip compression failed: {e}")))?;
            encoder
                .finish()
                .map_err(|e| CoreError::Serialization(format!("gzip finish failed: {e}")))
        }
        CompressionAlgorithm::Lz4 => Ok(lz4_flex::compress_prepend_size(payload)),
        CompressionAlgorithm::None => Ok(payload.to_vec()),
    }
}

fn decode(data: &[u8], algorithm: CompressionAlgorithm) -> CoreResult<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::Gzip => {
            let mut decoder = GzDecoder::new(data);
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| CoreError::decompression(format!("gzip: {e}")))?;
            Ok(decompressed)
        }
        CompressionAlgorithm::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| CoreError::decompression(format!("lz4: {e}"))),
        CompressionAlgorithm::None => Ok(data.to_vec()),
    }
}

/// Compresses an entry's payload, returning the form to store.
///
/// The plain form is returned when the algorithm is `None`, the serialized
/// payload is below the threshold, the achieved ratio is below
/// [`MIN_COMPRESSION_RATIO`], or the codec fails (logged, not propagated).
#[must_use]
pub fn compress(entry: &WalEntry, config: &CompressionConfig) -> StoredEntry {
    if config.algorithm == CompressionAlgorithm::None {
        return StoredEntry::Plain(entry.clone());
    }

    let payload = match serde_json::to_vec(&entry.data) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(sequence = entry.sequence.value(), "payload serialization failed, storing plain: {e}");
            return StoredEntry::Plain(entry.clone());
        }
    };

    if payload.len() < config.threshold_bytes {
        return StoredEntry::Plain(entry.clone());
    }

    let compressed = match encode(&payload, config) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(sequence = entry.sequence.value(), "compression failed, storing plain: {e}");
            return StoredEntry::Plain(entry.clone());
        }
    };

    let ratio = payload.len() as f64 / compressed.len() as f64;
    if ratio < MIN_COMPRESSION_RATIO {
        return StoredEntry::Plain(entry.clone());
    }

    StoredEntry::Compressed(CompressedEntry {
        original_entry: EntryMeta::from(entry),
        compressed_data: BASE64.encode(&compressed),
        compression_algorithm: config.algorithm,
        original_size: payload.len(),
        compressed_size: compressed.len(),
        compression_ratio: ratio,
    })
}

/// Restores the plain entry from either stored form.
///
/// # Errors
///
/// Failure to materialise a claimed-compressed record is a hard
/// `Decompression` error.
pub fn decompress(stored: StoredEntry) -> CoreResult<WalEntry> {
    match stored {
        StoredEntry::Plain(entry) => Ok(entry),
        StoredEntry::Compressed(compressed) => {
            let raw = BASE64
                .decode(&compressed.compressed_data)
                .map_err(|e| CoreError::decompression(format!("base64: {e}")))?;

            let payload_bytes = decode(&raw, compressed.compression_algorithm)?;
            if payload_bytes.len() != compressed.original_size {
                return Err(CoreError::decompression(format!(
                    "size mismatch: expected {} bytes, got {}",
                    compressed.original_size,
                    payload_bytes.len()
                )));
            }

            let data: EntryPayload = serde_json::from_slice(&payload_bytes)
                .map_err(|e| CoreError::decompression(format!("payload parse: {e}")))?;

            Ok(compressed.into_entry(data))
        }
    }
}

/// Aggregate compression statistics over a slice of stored records.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionStats {
    /// Number of records examined.
    pub total_entries: usize,
    /// Records stored in compressed form.
    pub compressed_entries: usize,
    /// `compressed_entries / total_entries` (0.0 for an empty slice).
    pub compression_rate: f64,
    /// Sum of serialized payload sizes before compression.
    pub total_original_size: usize,
    /// Sum of stored payload sizes.
    pub total_compressed_size: usize,
    /// Mean ratio over compressed records (0.0 when none).
    pub average_compression_ratio: f64,
    /// `total_original_size - total_compressed_size`.
    pub space_saved: usize,
}

/// Computes [`CompressionStats`] for the given records.
///
/// Plain records contribute their serialized payload size to both totals.
#[must_use]
pub fn stats(entries: &[StoredEntry]) -> CompressionStats {
    let mut result = CompressionStats {
        total_entries: entries.len(),
        ..CompressionStats::default()
    };

    let mut ratio_sum = 0.0;
    for stored in entries {
        match stored {
            StoredEntry::Compressed(c) => {
                result.compressed_entries += 1;
                result.total_original_size += c.original_size;
                result.total_compressed_size += c.compressed_size;
                ratio_sum += c.compression_ratio;
            }
            StoredEntry::Plain(e) => {
                let size = serde_json::to_vec(&e.data).map(|b| b.len()).unwrap_or(0);
                result.total_original_size += size;
                result.total_compressed_size += size;
            }
        }
    }

    if result.total_entries > 0 {
        result.compression_rate = result.compressed_entries as f64 / result.total_entries as f64;
    }
    if result.compressed_entries > 0 {
        result.average_compression_ratio = ratio_sum / result.compressed_entries as f64;
    }
    result.space_saved = result.total_original_size - result.total_compressed_size;
    result
}
