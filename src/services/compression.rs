//! Gzip encoding for blobs at rest.
//!
//! Every stored file is gzip-compressed on write and decompressed on read.
//! Unlike transport compression there is no size threshold: the on-disk
//! format is always gzip, including for empty files.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

use crate::utils::error::{AppError, AppResult};

/// Compress data using gzip at the default level
pub fn compress(data: &[u8]) -> AppResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| AppError::Internal(format!("Failed to compress blob: {}", e)))
}

/// Inverse of [`compress`]. Fails on anything that is not a complete gzip stream.
pub fn decompress(data: &[u8]) -> AppResult<Vec<u8>> {
    if !is_gzip(data) {
        return Err(AppError::Storage("Blob is not gzip encoded".to_string()));
    }

    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| AppError::Storage(format!("Failed to decompress blob: {}", e)))?;
    Ok(out)
}

/// Check if data is gzip compressed (magic bytes check)
#[inline]
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}
