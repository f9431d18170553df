//! YM6 Special Effects Decoder
//!
//! Decodes MFP timer-based effects from YM6 register frames.
//!
//! Effects live in register bits the chip ignores, in two independent slots:
//! - Slot 1: voice in r1[5-4], restart in r1[6], prescaler in r6[7-5], counter in r14
//! - Slot 2: voice in r3[5-4], prescaler in r8[7-5], counter in r15
//!
//! Slot 1 drives timer synthesis (SID voice), slot 2 triggers DigiDrum samples.

use super::digidrum::{prescaler_factor, MFP_CLOCK};
use super::{ChipRegisterFrame, DecodedSong};

/// Effect decoded from one register frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    /// Timer-driven amplitude modulation on one voice
    TimerSynth {
        /// Voice channel index (0=A, 1=B, 2=C)
        voice: u8,
        /// MFP prescaler code (0 = timer stopped)
        timer_divisor: u8,
        /// MFP timer data register
        timer_count: u8,
        /// Restart the timer phase on this frame
        restart: bool,
    },

    /// Start a DigiDrum sample on one voice
    DigiDrumTrigger {
        /// Voice channel index (0=A, 1=B, 2=C)
        voice: u8,
        /// MFP prescaler code (0 = timer stopped)
        timer_divisor: u8,
        /// MFP timer data register
        timer_count: u8,
        /// Index into [`DecodedSong::digidrums`]
        sample_index: u8,
    },
}

impl Effect {
    /// Voice the effect applies to
    pub fn voice(&self) -> u8 {
        match *self {
            Effect::TimerSynth { voice, .. } | Effect::DigiDrumTrigger { voice, .. } => voice,
        }
    }

    /// MFP timer rate in Hz, `None` while the timer is stopped
    pub fn timer_frequency_hz(&self) -> Option<u32> {
        let (divisor, count) = match *self {
            Effect::TimerSynth {
                timer_divisor,
                timer_count,
                ..
            }
            | Effect::DigiDrumTrigger {
                timer_divisor,
                timer_count,
                ..
            } => (timer_divisor, timer_count),
        };
        if divisor == 0 || count == 0 {
            return None;
        }
        Some(MFP_CLOCK / (prescaler_factor(divisor) * u32::from(count)))
    }
}

/// Voice selected by bits 5-4 of a slot's flag register
fn slot_voice(flag_reg: u8) -> Option<u8> {
    match (flag_reg >> 4) & 0x03 {
        0 => None,
        code => Some(code - 1),
    }
}

/// Decode both effect slots of a single frame
pub fn decode_frame(registers: &ChipRegisterFrame) -> Vec<Effect> {
    let mut out = Vec::with_capacity(2);

    if let Some(voice) = slot_voice(registers[1]) {
        out.push(Effect::TimerSynth {
            voice,
            timer_divisor: registers[6] >> 5,
            timer_count: registers[14],
            restart: registers[1] & 0x40 != 0,
        });
    }

    if let Some(voice) = slot_voice(registers[3]) {
        out.push(Effect::DigiDrumTrigger {
            voice,
            timer_divisor: registers[8] >> 5,
            timer_count: registers[15],
            sample_index: registers[8 + usize::from(voice)] & 0x1F,
        });
    }

    out
}

/// Effects active on `frame_index` of `song`.
///
/// Empty unless the song is YM6 and the frame exists.
pub fn effects_for_frame(song: &DecodedSong, frame_index: usize) -> Vec<Effect> {
    if !song.revision().has_effects() {
        return Vec::new();
    }
    song.frame(frame_index).map(decode_frame).unwrap_or_default()
}
