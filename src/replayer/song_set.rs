//! Multi-chip song sets
//!
//! A song may be split over up to three files, one per chip, named
//! `song.1.ym`, `song.2.ym`, `song.3.ym`. All slots play on slot 0's clock.

use crate::transport::{Packet, CHIP_SLOTS};
use crate::ym_parser::{
    effects_for_frame, ChipRegisterFrame, DecodedSong, Effect, DEFAULT_FRAME_RATE_HZ,
};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

const SLOT_SUFFIX_PATTERN: &str = r"(?i)\.(\d)\.ym$";

static SLOT_SUFFIX: OnceLock<Regex> = OnceLock::new();

fn slot_suffix() -> &'static Regex {
    SLOT_SUFFIX.get_or_init(|| Regex::new(SLOT_SUFFIX_PATTERN).expect("invalid regex pattern"))
}

/// Chip slot selected by a file name's `.<n>.ym` suffix.
///
/// No suffix selects slot 0; digits outside 1..=3 are rejected.
pub fn slot_from_file_name(name: &str) -> crate::Result<usize> {
    let Some(captures) = slot_suffix().captures(name) else {
        return Ok(0);
    };
    let digit = captures[1].parse::<usize>().unwrap_or(0);
    match digit {
        1..=CHIP_SLOTS => Ok(digit - 1),
        _ => Err(crate::YmSerialError::ConfigError(format!(
            "chip suffix .{}.ym in {:?} is outside 1..={}",
            digit, name, CHIP_SLOTS
        ))),
    }
}

/// File name with any `.<n>.ym` chip suffix removed
pub fn song_key(name: &str) -> String {
    slot_suffix().replace(name, "").into_owned()
}

/// Up to three songs, one per chip slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongSet {
    slots: [Option<DecodedSong>; CHIP_SLOTS],
}

impl SongSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `song` in `slot`, returning the song it replaces
    pub fn insert(&mut self, slot: usize, song: DecodedSong) -> crate::Result<Option<DecodedSong>> {
        let entry = self.slots.get_mut(slot).ok_or_else(|| {
            crate::YmSerialError::ConfigError(format!(
                "chip slot {} out of range (0..{})",
                slot, CHIP_SLOTS
            ))
        })?;
        Ok(entry.replace(song))
    }

    /// Build a set from `(slot, song)` pairs
    pub fn from_songs<I>(songs: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = (usize, DecodedSong)>,
    {
        let mut set = SongSet::new();
        for (slot, song) in songs {
            set.insert(slot, song)?;
        }
        Ok(set)
    }

    /// Song in `slot`
    pub fn song(&self, slot: usize) -> Option<&DecodedSong> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Populated slots in slot order
    pub fn songs(&self) -> impl Iterator<Item = (usize, &DecodedSong)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, song)| song.as_ref().map(|song| (slot, song)))
    }

    /// Number of populated slots
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Whether no slot is populated
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers of `frame` for `slot`; `None` once that slot's song is exhausted
    pub fn frame_at(&self, slot: usize, frame: usize) -> Option<&ChipRegisterFrame> {
        self.song(slot).and_then(|song| song.frame(frame))
    }

    /// Playback rate (slot 0's, or 50 Hz)
    pub fn frame_rate_hz(&self) -> u32 {
        self.song(0)
            .map_or(DEFAULT_FRAME_RATE_HZ, |song| song.metadata().frame_rate_hz)
    }

    /// Length in frames (slot 0's, or 0)
    pub fn frame_count(&self) -> usize {
        self.song(0).map_or(0, DecodedSong::frame_count)
    }

    /// Loop frame (slot 0's, or 0)
    pub fn loop_frame(&self) -> usize {
        self.song(0)
            .map_or(0, |song| song.metadata().loop_frame as usize)
    }

    /// Playing time (slot 0's, or zero)
    pub fn total_duration(&self) -> Duration {
        self.song(0).map_or(Duration::ZERO, DecodedSong::duration)
    }

    /// One packet per populated slot that still has `frame`
    pub fn packets_for_frame(&self, frame: usize, mask_registers: bool) -> Vec<Packet> {
        (0..CHIP_SLOTS)
            .filter_map(|slot| {
                self.frame_at(slot, frame).map(|registers| {
                    let packet = Packet::new(slot as u8, registers);
                    if mask_registers {
                        packet.masked()
                    } else {
                        packet
                    }
                })
            })
            .collect()
    }

    /// Effects of `frame` across all slots, tagged with their slot
    pub fn effects_for_frame(&self, frame: usize) -> Vec<(usize, Effect)> {
        self.songs()
            .flat_map(|(slot, song)| {
                effects_for_frame(song, frame)
                    .into_iter()
                    .map(move |effect| (slot, effect))
            })
            .collect()
    }
}

impl fmt::Display for SongSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (slot, song) in self.songs() {
            let meta = song.metadata();
            writeln!(f, "--- Chip {} ---", slot)?;
            writeln!(f, "Type: {}", meta.revision)?;
            writeln!(f, "Frame Count: {}", meta.frame_count)?;
            writeln!(f, "Song Attributes: {:?}", meta.attributes)?;
            writeln!(f, "Digidrum Samples: {}", song.digidrums().len())?;
            writeln!(f, "YM Frequency: {}Hz", meta.chip_clock_hz)?;
            writeln!(f, "Frame Rate: {}Hz", meta.frame_rate_hz)?;
            writeln!(f, "Loop Frame: {}", meta.loop_frame)?;
            writeln!(f, "Title: {}", meta.title.as_deref().unwrap_or(""))?;
            writeln!(f, "Artist: {}", meta.artist.as_deref().unwrap_or(""))?;
            writeln!(f, "Comment: {}", meta.comment.as_deref().unwrap_or(""))?;
        }
        Ok(())
    }
}
