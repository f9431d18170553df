//! YM File Loader
//!
//! Reads song files from disk, extracts archived ones and groups per-chip
//! files (`song.1.ym`, `song.2.ym`, ...) into song sets.

use crate::replayer::song_set::{slot_from_file_name, song_key};
use crate::replayer::SongSet;
use crate::ym_parser::{self, DecodedSong};
use crate::Result;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Loads YM files from disk
pub struct YmFileLoader;

impl YmFileLoader {
    /// Read a file, extracting it first when it is an LHA archive
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let file_data = fs::read(path)
            .map_err(|e| format!("Failed to read file '{}': {}", path.display(), e))?;

        #[cfg(feature = "compression")]
        let file_data = super::compression::decompress_if_needed(&file_data)?;

        Ok(file_data)
    }

    /// Read and decode one song file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DecodedSong> {
        let data = Self::read(path.as_ref())?;
        Ok(ym_parser::decode(&data)?)
    }
}

/// Read and decode one song file
pub fn load_song<P: AsRef<Path>>(path: P) -> Result<DecodedSong> {
    YmFileLoader::load(path)
}

/// The files making up one multi-chip song
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongGroup {
    key: String,
    files: Vec<PathBuf>,
}

impl SongGroup {
    /// Group holding a single file
    pub fn single<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        SongGroup {
            key: song_key(&path.to_string_lossy()),
            files: vec![path],
        }
    }

    /// Path with the chip suffix removed, shared by every file of the group
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Member files in name order
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Display name of the song
    pub fn name(&self) -> String {
        Path::new(&self.key)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.key.clone())
    }

    /// Decode every member into its chip slot
    pub fn load(&self) -> Result<SongSet> {
        let mut set = SongSet::new();
        for path in &self.files {
            let slot = slot_from_file_name(&path.to_string_lossy())?;
            let song = load_song(path)?;
            if set.insert(slot, song)?.is_some() {
                tracing::warn!(
                    path = %path.display(),
                    slot,
                    "duplicate chip slot in song group, keeping the later file"
                );
            }
        }
        Ok(set)
    }
}

impl fmt::Display for SongGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} file", self.name(), self.files.len())?;
        if self.files.len() != 1 {
            f.write_str("s")?;
        }
        f.write_str(")")
    }
}

/// Group paths by song, keeping the order in which songs first appear
pub fn group_by_song<I, P>(paths: I) -> Vec<SongGroup>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut groups: Vec<SongGroup> = Vec::new();
    for path in paths {
        let path = path.into();
        let key = song_key(&path.to_string_lossy());
        match groups.iter_mut().find(|group| group.key == key) {
            Some(group) => group.files.push(path),
            None => groups.push(SongGroup {
                key,
                files: vec![path],
            }),
        }
    }
    for group in &mut groups {
        group.files.sort();
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_ym3(dir: &Path, name: &str, frames: usize, fill: u8) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"YM3!").unwrap();
        file.write_all(&vec![fill; frames * 14]).unwrap();
        file.write_all(&[0u8; 4]).unwrap();
        path
    }

    #[test]
    fn test_group_by_song() {
        let groups = group_by_song([
            "music/b.2.ym",
            "music/a.ym",
            "music/b.1.YM",
            "music/c.3.ym",
        ]);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].key(), "music/b");
        assert_eq!(
            groups[0].files(),
            &[PathBuf::from("music/b.1.YM"), PathBuf::from("music/b.2.ym")]
        );
        assert_eq!(groups[0].name(), "b");
        assert_eq!(groups[1].files().len(), 1);
        assert_eq!(groups[2].key(), "music/c");
    }

    #[test]
    fn test_group_loads_into_slots() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_ym3(dir.path(), "tune.1.ym", 4, 1);
        let second = write_ym3(dir.path(), "tune.2.ym", 2, 2);

        let groups = group_by_song([second, first]);
        assert_eq!(groups.len(), 1);
        let set = groups[0].load().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.frame_count(), 4);
        assert_eq!(set.frame_at(1, 0).unwrap()[0], 2);
    }

    #[test]
    fn test_bad_slot_suffix_fails_group() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ym3(dir.path(), "tune.5.ym", 1, 0);
        assert!(matches!(
            SongGroup::single(path).load(),
            Err(crate::YmSerialError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_song("/nonexistent/song.ym").is_err());
    }

    #[test]
    fn test_display() {
        let groups = group_by_song(["x/song.1.ym", "x/song.2.ym"]);
        assert_eq!(groups[0].to_string(), "song (2 files)");
    }
}
