//! YM File Loader Domain
//!
//! Handles file I/O for song files: reading, transparent LHA extraction and
//! grouping of per-chip files into song sets.

#[cfg(feature = "compression")]
pub mod compression;
pub mod loader;

#[cfg(feature = "compression")]
pub use compression::{decompress_if_needed, is_lha_compressed};
pub use loader::{group_by_song, load_song, SongGroup, YmFileLoader};

use crate::Result;
use std::path::Path;

/// Convenience function to read a song file's (extracted) bytes from disk
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    YmFileLoader::read(path)
}
