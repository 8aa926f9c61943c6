//! Byte-buffer and document codecs shared by the capture writer and the loader.
//!
//! Channel payloads (depth, confidence, point cloud) are stored as raw DEFLATE
//! streams. Documents are pretty-printed JSON with keys sorted at every level so
//! that writing the same document twice yields byte-identical files.

use flate2::read::DeflateDecoder;
use flate2::{Compress, Compression, FlushCompress, Status};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Read;
use thiserror::Error;

/// Smallest scratch area handed to the compressor.
///
/// Empty and very small buffers always grow under DEFLATE, so the destination
/// bound never drops below this.
pub const MIN_SCRATCH_BYTES: usize = 64;

/// Upper bound on the up-front allocation made from a caller's size hint.
const MAX_PREALLOC_BYTES: usize = 64 * 1024 * 1024;

/// Errors raised by the codecs.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Compression failed: {input_len} bytes do not fit in a {limit} byte scratch area")]
    CompressionFailed { input_len: usize, limit: usize },

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("Failed to encode document: {0}")]
    DocumentEncodeFailed(#[source] serde_json::Error),

    #[error("Failed to decode document: {0}")]
    DocumentDecodeFailed(#[source] serde_json::Error),
}

/// Compress `bytes` into a destination no larger than the scratch area.
///
/// The scratch area is sized to the input (`max(len, MIN_SCRATCH_BYTES)`).
/// Output that would overflow it is reported as `CompressionFailed`, never
/// truncated.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let limit = bytes.len().max(MIN_SCRATCH_BYTES);
    let overflow = || CodecError::CompressionFailed {
        input_len: bytes.len(),
        limit,
    };

    let mut compressor = Compress::new(Compression::default(), false);
    let mut output = Vec::with_capacity(limit);

    let status = compressor
        .compress_vec(bytes, &mut output, FlushCompress::Finish)
        .map_err(|_| overflow())?;

    if status != Status::StreamEnd
        || compressor.total_in() != bytes.len() as u64
        || output.len() > limit
    {
        return Err(overflow());
    }

    Ok(output)
}

/// Inverse of [`compress`].
///
/// `expected_size_hint` only sizes the initial allocation; the decoded length is
/// whatever the stream holds.
pub fn decompress(bytes: &[u8], expected_size_hint: usize) -> Result<Vec<u8>, CodecError> {
    let mut decoder = DeflateDecoder::new(bytes);
    let mut output = Vec::with_capacity(expected_size_hint.min(MAX_PREALLOC_BYTES));

    decoder
        .read_to_end(&mut output)
        .map_err(|e| CodecError::DecompressionFailed(e.to_string()))?;

    Ok(output)
}

/// Encode a document as pretty JSON with sorted keys.
pub fn encode_document<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let tree = serde_json::to_value(value).map_err(CodecError::DocumentEncodeFailed)?;
    serde_json::to_vec_pretty(&sort_keys(tree)).map_err(CodecError::DocumentEncodeFailed)
}

/// Decode a document. Unknown keys are ignored.
pub fn decode_document<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::DocumentDecodeFailed)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::new();
            for (key, child) in entries {
                sorted.insert(key, sort_keys(child));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
