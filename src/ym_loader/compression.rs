//! LHA/LZH extraction for archived YM files
//!
//! Most YM files in the wild are LH5-compressed single-entry archives. Data
//! without an LHA method signature passes through unchanged.

use crate::{Result, YmSerialError};
use std::io::{Read, Write};

/// Search limit for the `-lh?-` method signature (level 2 headers place it up to offset 25)
const LHA_SEARCH_LIMIT: usize = 40;

/// Length of the `-lh?-` method signature
const LHA_SIGNATURE_LENGTH: usize = 5;

/// Maximum extracted size: 100MB
///
/// Register dumps are typically 10KB-1MB.
const MAX_DECOMPRESSED_SIZE: usize = 100 * 1024 * 1024;

/// Offset of an `-lh[0-7]-` method signature near the start of `data`
fn find_lha_signature(data: &[u8]) -> Option<usize> {
    if data.len() < LHA_SIGNATURE_LENGTH + 2 {
        return None;
    }

    let search_limit = LHA_SEARCH_LIMIT.min(data.len() - LHA_SIGNATURE_LENGTH);
    (1..=search_limit).find(|&i| {
        matches!(
            &data[i..i + LHA_SIGNATURE_LENGTH],
            [b'-', b'l', b'h', b'0'..=b'7', b'-']
        )
    })
}

/// Whether `data` looks like an LHA archive
pub fn is_lha_compressed(data: &[u8]) -> bool {
    find_lha_signature(data).is_some()
}

/// Compression method name (e.g. `"LH5"`), if `data` is an LHA archive
pub fn lha_method(data: &[u8]) -> Option<String> {
    find_lha_signature(data).map(|offset| format!("LH{}", data[offset + 3] as char))
}

/// Extract the first archive entry if `data` is LHA-compressed, otherwise copy it
pub fn decompress_if_needed(data: &[u8]) -> Result<Vec<u8>> {
    let Some(method) = lha_method(data) else {
        return Ok(data.to_vec());
    };

    // delharc reads archives from the filesystem; the file is removed on drop
    let mut temp_file = tempfile::NamedTempFile::new().map_err(|e| {
        YmSerialError::DecompressionError(format!("failed to create temporary file: {}", e))
    })?;
    temp_file
        .write_all(data)
        .and_then(|_| temp_file.flush())
        .map_err(|e| {
            YmSerialError::DecompressionError(format!(
                "failed to stage {} archive bytes: {}",
                data.len(),
                e
            ))
        })?;

    let reader = delharc::parse_file(temp_file.path()).map_err(|e| {
        YmSerialError::DecompressionError(format!("failed to parse LHA archive: {}", e))
    })?;

    let mut decompressed = Vec::new();
    reader
        .take(MAX_DECOMPRESSED_SIZE as u64)
        .read_to_end(&mut decompressed)
        .map_err(|e| YmSerialError::DecompressionError(format!("LHA extraction failed: {}", e)))?;

    if decompressed.len() >= MAX_DECOMPRESSED_SIZE {
        return Err(YmSerialError::DecompressionError(
            "extracted data exceeded the 100MB limit".to_string(),
        ));
    }

    tracing::debug!(
        method = %method,
        compressed = data.len(),
        extracted = decompressed.len(),
        "extracted LHA archive"
    );
    Ok(decompressed)
}
