//! Playback session
//!
//! The state the tick callback works on: the playlist of song groups, the
//! current [`SongSet`], the frame position, the transport and statistics.
//! A session is owned by the pump thread while it plays.

use super::frame_pump::FramePump;
use super::timing::{MonotonicClock, WaitPolicy};
use super::SongSet;
use crate::transport::{Packet, Transport, CHIP_SLOTS};
use crate::ym_loader::SongGroup;
use crate::ym_parser::Effect;
use crate::{Result, YmSerialError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

/// How a session moves through its playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Loop the current song from its loop frame instead of advancing
    pub repeat_song: bool,
    /// Continue from the first song after the last one
    pub wrap_playlist: bool,
    /// Clear register bits the receiver ignores
    pub mask_registers: bool,
    /// Log YM6 timer effects as they occur
    pub log_effects: bool,
    /// Playlist index to start from
    pub start_index: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            repeat_song: false,
            wrap_playlist: true,
            mask_registers: false,
            log_effects: false,
            start_index: 0,
        }
    }
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still playing the same song
    Continue,
    /// A new song was loaded; it plays at `frame_rate_hz`
    SongChanged {
        /// Frame rate of the new song
        frame_rate_hz: u32,
    },
    /// Nothing left to play
    Finished,
}

/// Playback counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Ticks processed
    pub frames: u64,
    /// Packets written
    pub packets_sent: u64,
    /// Packets lost to transport errors
    pub packets_dropped: u64,
    /// Songs started, including the first
    pub songs_started: u64,
    /// Song groups that failed to load
    pub load_failures: u64,
}

/// Orchestrator state for one playback run
pub struct PlaybackSession<T: Transport> {
    groups: Vec<SongGroup>,
    group_index: usize,
    songs: SongSet,
    frame: usize,
    transport: T,
    options: SessionOptions,
    stats: SessionStats,
    finished: bool,
}

impl<T: Transport> PlaybackSession<T> {
    /// Silence every chip and load the first playable group at or after `options.start_index`
    pub fn new(groups: Vec<SongGroup>, transport: T, options: SessionOptions) -> Result<Self> {
        if groups.is_empty() {
            return Err(YmSerialError::ConfigError("no songs to play".to_string()));
        }
        if options.start_index >= groups.len() {
            return Err(YmSerialError::ConfigError(format!(
                "start index {} out of range, {} songs",
                options.start_index,
                groups.len()
            )));
        }

        let mut session = PlaybackSession {
            group_index: options.start_index,
            groups,
            songs: SongSet::new(),
            frame: 0,
            transport,
            options,
            stats: SessionStats::default(),
            finished: false,
        };
        session.silence_all();

        let start = session.group_index;
        if !session.load_from(start, false) {
            return Err(YmSerialError::Other("no playable song".to_string()));
        }
        Ok(session)
    }

    /// Send the current frame and advance
    pub fn tick(&mut self) -> TickOutcome {
        if self.finished {
            return TickOutcome::Finished;
        }

        for packet in self
            .songs
            .packets_for_frame(self.frame, self.options.mask_registers)
        {
            self.send(&packet);
        }
        if self.options.log_effects {
            self.log_effects();
        }
        tracing::trace!(frame = self.frame, "tick");

        self.stats.frames += 1;
        self.frame += 1;
        if self.frame < self.songs.frame_count() {
            return TickOutcome::Continue;
        }

        if self.options.repeat_song {
            self.frame = self.songs.loop_frame();
            return TickOutcome::Continue;
        }
        self.advance()
    }

    /// Silence the chips and move to the next playable group
    fn advance(&mut self) -> TickOutcome {
        self.silence_all();

        let next = self.group_index + 1;
        let next = if next < self.groups.len() {
            next
        } else if self.options.wrap_playlist {
            0
        } else {
            return self.finish();
        };

        if self.load_from(next, self.options.wrap_playlist) {
            TickOutcome::SongChanged {
                frame_rate_hz: self.songs.frame_rate_hz(),
            }
        } else {
            self.finish()
        }
    }

    fn finish(&mut self) -> TickOutcome {
        tracing::info!(
            frames = self.stats.frames,
            dropped = self.stats.packets_dropped,
            "playlist finished"
        );
        self.finished = true;
        TickOutcome::Finished
    }

    /// Load the first group from `start` that decodes, trying each group at most once
    fn load_from(&mut self, start: usize, wrap: bool) -> bool {
        let count = self.groups.len();
        let attempts = if wrap { count } else { count - start };

        for offset in 0..attempts {
            let index = (start + offset) % count;
            let group = &self.groups[index];
            match group.load() {
                Ok(songs) => {
                    tracing::info!(
                        song = %group,
                        index,
                        rate_hz = songs.frame_rate_hz(),
                        frames = songs.frame_count(),
                        duration = ?songs.total_duration(),
                        "now playing"
                    );
                    for (slot, song) in songs.songs() {
                        let meta = song.metadata();
                        tracing::info!(
                            slot,
                            revision = %meta.revision,
                            title = meta.title.as_deref().unwrap_or(""),
                            artist = meta.artist.as_deref().unwrap_or(""),
                            frames = meta.frame_count,
                            rate_hz = meta.frame_rate_hz,
                            clock_hz = meta.chip_clock_hz,
                            digidrums = song.digidrums().len(),
                            "chip song"
                        );
                    }
                    self.group_index = index;
                    self.songs = songs;
                    self.frame = 0;
                    self.stats.songs_started += 1;
                    return true;
                }
                Err(e) => {
                    tracing::warn!(song = %group, error = %e, "skipping song that failed to load");
                    self.stats.load_failures += 1;
                }
            }
        }
        false
    }

    fn send(&mut self, packet: &Packet) {
        match self.transport.send(packet) {
            Ok(()) => self.stats.packets_sent += 1,
            Err(e) => {
                self.stats.packets_dropped += 1;
                tracing::warn!(
                    slot = packet.slot(),
                    frame = self.frame,
                    error = %e,
                    "dropped register packet"
                );
            }
        }
    }

    /// Write all-zero registers to every chip
    pub fn silence_all(&mut self) {
        for slot in 0..CHIP_SLOTS {
            self.send(&Packet::silence(slot as u8));
        }
    }

    fn log_effects(&self) {
        for (slot, effect) in self.songs.effects_for_frame(self.frame) {
            match effect {
                Effect::DigiDrumTrigger { sample_index, .. } => {
                    let sample_len = self
                        .songs
                        .song(slot)
                        .and_then(|song| song.digidrum(usize::from(sample_index)))
                        .map(|sample| sample.len());
                    tracing::info!(
                        slot,
                        frame = self.frame,
                        ?effect,
                        timer_hz = ?effect.timer_frequency_hz(),
                        ?sample_len,
                        "digidrum"
                    );
                }
                Effect::TimerSynth { .. } => {
                    tracing::info!(
                        slot,
                        frame = self.frame,
                        ?effect,
                        timer_hz = ?effect.timer_frequency_hz(),
                        "timer synth"
                    );
                }
            }
        }
    }

    /// Songs currently playing
    pub fn songs(&self) -> &SongSet {
        &self.songs
    }

    /// Group currently playing
    pub fn current_group(&self) -> &SongGroup {
        &self.groups[self.group_index]
    }

    /// Playlist index of the current group
    pub fn group_index(&self) -> usize {
        self.group_index
    }

    /// Next frame to send
    pub fn frame_index(&self) -> usize {
        self.frame
    }

    /// Frame rate of the current song
    pub fn frame_rate_hz(&self) -> u32 {
        self.songs.frame_rate_hz()
    }

    /// Elapsed and total playing time of the current song
    pub fn position(&self) -> (Duration, Duration) {
        let elapsed = self.frame as f64 / f64::from(self.frame_rate_hz().max(1));
        (Duration::from_secs_f64(elapsed), self.songs.total_duration())
    }

    /// Counters so far
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Playback options
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Whether the playlist is exhausted
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> Drop for PlaybackSession<T> {
    fn drop(&mut self) {
        self.silence_all();
        let _ = self.transport.flush();
    }
}

/// Session on loan to a pump thread.
///
/// The session goes back to `drive` over the channel when the callback
/// hands it back, or when the pump thread drops the callback.
struct Lease<T: Transport> {
    session: Option<PlaybackSession<T>>,
    outcome: TickOutcome,
    tx: mpsc::Sender<(TickOutcome, PlaybackSession<T>)>,
}

impl<T: Transport> Lease<T> {
    fn hand_back(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = self.tx.send((self.outcome, session));
        }
    }
}

impl<T: Transport> Drop for Lease<T> {
    fn drop(&mut self) {
        self.hand_back();
    }
}

/// Play `session` on frame pumps until it finishes or `quit` is set.
///
/// The session is moved onto the pump thread and returned when the pump
/// stops. The pump is restarted whenever a song with a different frame
/// rate begins. The session is dropped (silencing the chips) before this
/// returns.
pub fn drive<T>(
    session: PlaybackSession<T>,
    policy: WaitPolicy,
    quit: &AtomicBool,
) -> Result<SessionStats>
where
    T: Transport + Send + 'static,
{
    let mut session = session;

    loop {
        let rate = session.frame_rate_hz();
        let (tx, rx) = mpsc::channel();
        let mut lease = Lease {
            session: Some(session),
            outcome: TickOutcome::Continue,
            tx,
        };

        let pump = FramePump::start_with(MonotonicClock::new(), rate, policy, move |handle| {
            let Some(playing) = lease.session.as_mut() else {
                return;
            };
            let outcome = playing.tick();
            let restart = match outcome {
                TickOutcome::Continue => false,
                TickOutcome::SongChanged { frame_rate_hz } => {
                    frame_rate_hz != handle.frame_rate_hz()
                }
                TickOutcome::Finished => true,
            };
            if restart {
                handle.stop();
                lease.outcome = outcome;
                lease.hand_back();
            }
        })?;

        let returned = loop {
            if quit.load(Ordering::SeqCst) {
                // Joining drops the callback, which hands the session back
                pump.stop();
                break rx.recv().ok();
            }
            match rx.recv_timeout(Duration::from_millis(50)) {
                Ok(returned) => break Some(returned),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break None,
            }
        };
        pump.stop();

        let Some((outcome, returned)) = returned else {
            return Err(YmSerialError::Other(
                "frame pump exited without returning the session".to_string(),
            ));
        };
        session = returned;

        if quit.load(Ordering::SeqCst) {
            let (elapsed, total) = session.position();
            tracing::info!(?elapsed, ?total, song = %session.current_group(), "playback stopped");
            break;
        }
        match outcome {
            TickOutcome::SongChanged { frame_rate_hz } => {
                tracing::debug!(rate_hz = frame_rate_hz, "restarting frame pump");
            }
            _ => break,
        }
    }

    Ok(session.stats().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportError, WriterTransport, PACKET_LEN};
    use parking_lot::Mutex;
    use std::fs;
    use std::sync::Arc;
    use std::path::{Path, PathBuf};

    /// Transport that records packets and can fail on demand
    #[derive(Default)]
    struct Recorder {
        packets: Arc<Mutex<Vec<Packet>>>,
        fail: bool,
    }

    impl Transport for Recorder {
        fn send(&mut self, packet: &Packet) -> std::result::Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Closed);
            }
            self.packets.lock().push(*packet);
            Ok(())
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    fn write_ym3(dir: &Path, name: &str, frames: usize, fill: u8) -> PathBuf {
        let path = dir.join(name);
        let mut data = b"YM3!".to_vec();
        data.extend(std::iter::repeat(fill).take(frames * 14));
        data.extend_from_slice(&[0u8; 4]);
        fs::write(&path, data).unwrap();
        path
    }

    fn recorder() -> (Recorder, Arc<Mutex<Vec<Packet>>>) {
        let recorder = Recorder::default();
        let packets = Arc::clone(&recorder.packets);
        (recorder, packets)
    }

    #[test]
    fn test_construction_silences_all_chips() {
        let dir = tempfile::tempdir().unwrap();
        let song = write_ym3(dir.path(), "a.ym", 2, 9);
        let (transport, packets) = recorder();

        let session =
            PlaybackSession::new(vec![SongGroup::single(song)], transport, SessionOptions::default())
                .unwrap();
        let sent = packets.lock().clone();
        assert_eq!(sent, (0..3).map(Packet::silence).collect::<Vec<_>>());
        assert_eq!(session.stats().songs_started, 1);

        drop(session);
        assert_eq!(packets.lock().len(), 6);
    }

    #[test]
    fn test_tick_sends_one_packet_per_slot() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_ym3(dir.path(), "a.1.ym", 3, 1);
        let b = write_ym3(dir.path(), "a.2.ym", 1, 2);
        let (transport, packets) = recorder();
        let groups = crate::ym_loader::group_by_song([a, b]);

        let mut session = PlaybackSession::new(groups, transport, SessionOptions::default()).unwrap();
        packets.lock().clear();

        assert_eq!(session.tick(), TickOutcome::Continue);
        let slots: Vec<u8> = packets.lock().iter().map(Packet::slot).collect();
        assert_eq!(slots, vec![0, 1]);

        packets.lock().clear();
        assert_eq!(session.tick(), TickOutcome::Continue);
        // Slot 1 is exhausted after one frame
        let slots: Vec<u8> = packets.lock().iter().map(Packet::slot).collect();
        assert_eq!(slots, vec![0]);
    }

    #[test]
    fn test_song_end_advances_and_silences() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_ym3(dir.path(), "first.ym", 1, 1);
        let second = write_ym3(dir.path(), "second.ym", 2, 2);
        let (transport, packets) = recorder();
        let groups = crate::ym_loader::group_by_song([first, second]);

        let mut session = PlaybackSession::new(groups, transport, SessionOptions::default()).unwrap();
        packets.lock().clear();

        assert_eq!(
            session.tick(),
            TickOutcome::SongChanged { frame_rate_hz: 50 }
        );
        assert_eq!(session.group_index(), 1);
        assert_eq!(session.frame_index(), 0);
        let sent = packets.lock().clone();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].registers()[0], 1);
        assert!(sent[1..].iter().all(|p| p.registers().iter().all(|&r| r == 0)));
    }

    #[test]
    fn test_no_wrap_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let song = write_ym3(dir.path(), "only.ym", 1, 1);
        let (transport, _packets) = recorder();
        let options = SessionOptions {
            wrap_playlist: false,
            ..SessionOptions::default()
        };

        let mut session =
            PlaybackSession::new(vec![SongGroup::single(song)], transport, options).unwrap();
        assert_eq!(session.tick(), TickOutcome::Finished);
        assert!(session.is_finished());
        assert_eq!(session.tick(), TickOutcome::Finished);
    }

    #[test]
    fn test_wrap_reloads_first_song() {
        let dir = tempfile::tempdir().unwrap();
        let song = write_ym3(dir.path(), "only.ym", 1, 1);
        let (transport, _packets) = recorder();

        let mut session =
            PlaybackSession::new(vec![SongGroup::single(song)], transport, SessionOptions::default())
                .unwrap();
        assert_eq!(
            session.tick(),
            TickOutcome::SongChanged { frame_rate_hz: 50 }
        );
        assert_eq!(session.stats().songs_started, 2);
    }

    #[test]
    fn test_repeat_song_loops() {
        let dir = tempfile::tempdir().unwrap();
        let song = write_ym3(dir.path(), "loop.ym", 2, 1);
        let (transport, _packets) = recorder();
        let options = SessionOptions {
            repeat_song: true,
            ..SessionOptions::default()
        };

        let mut session =
            PlaybackSession::new(vec![SongGroup::single(song)], transport, options).unwrap();
        for _ in 0..5 {
            assert_eq!(session.tick(), TickOutcome::Continue);
        }
        assert_eq!(session.frame_index(), 1);
        assert_eq!(session.stats().songs_started, 1);
    }

    #[test]
    fn test_broken_songs_are_skipped_once() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_ym3(dir.path(), "good.ym", 1, 1);
        let broken = dir.path().join("broken.ym");
        fs::write(&broken, b"NOPE").unwrap();
        let (transport, _packets) = recorder();
        let groups = crate::ym_loader::group_by_song([good, broken]);

        let mut session = PlaybackSession::new(groups, transport, SessionOptions::default()).unwrap();
        // broken.ym fails, playback wraps back to good.ym
        assert_eq!(
            session.tick(),
            TickOutcome::SongChanged { frame_rate_hz: 50 }
        );
        assert_eq!(session.group_index(), 0);
        assert_eq!(session.stats().load_failures, 1);
    }

    #[test]
    fn test_nothing_playable() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.ym");
        fs::write(&broken, b"YM6!short").unwrap();
        let result = PlaybackSession::new(
            vec![SongGroup::single(broken)],
            Recorder::default(),
            SessionOptions::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_start_index_out_of_range() {
        let options = SessionOptions {
            start_index: 3,
            ..SessionOptions::default()
        };
        let result = PlaybackSession::new(
            vec![SongGroup::single("a.ym")],
            Recorder::default(),
            options,
        );
        assert!(matches!(result, Err(YmSerialError::ConfigError(_))));
    }

    #[test]
    fn test_write_failures_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let song = write_ym3(dir.path(), "a.ym", 3, 1);
        let transport = Recorder {
            fail: true,
            ..Recorder::default()
        };

        let mut session =
            PlaybackSession::new(vec![SongGroup::single(song)], transport, SessionOptions::default())
                .unwrap();
        assert_eq!(session.tick(), TickOutcome::Continue);
        assert_eq!(session.stats().packets_dropped, 4);
        assert_eq!(session.stats().packets_sent, 0);
        assert_eq!(session.frame_index(), 1);
    }

    #[test]
    fn test_position_tracks_frames() {
        let dir = tempfile::tempdir().unwrap();
        let song = write_ym3(dir.path(), "a.ym", 100, 1);
        let (transport, _packets) = recorder();

        let mut session =
            PlaybackSession::new(vec![SongGroup::single(song)], transport, SessionOptions::default())
                .unwrap();
        for _ in 0..25 {
            session.tick();
        }
        let (elapsed, total) = session.position();
        assert_eq!(elapsed, Duration::from_millis(500));
        assert_eq!(total, Duration::from_secs(2));
    }

    #[test]
    fn test_drive_returns_session_on_quit() {
        let dir = tempfile::tempdir().unwrap();
        let song = write_ym3(dir.path(), "a.ym", 1000, 7);
        let (transport, packets) = recorder();
        let options = SessionOptions {
            repeat_song: true,
            ..SessionOptions::default()
        };

        let session = PlaybackSession::new(vec![SongGroup::single(song)], transport, options).unwrap();
        let quit = AtomicBool::new(true);
        let stats = drive(session, WaitPolicy::default(), &quit).unwrap();

        // The session was handed back and dropped, silencing every chip
        let sent = packets.lock().clone();
        assert_eq!(sent.len() as u64, 3 + stats.packets_sent);
        let tail: Vec<Packet> = sent[sent.len() - 3..].to_vec();
        assert_eq!(tail, (0..3).map(Packet::silence).collect::<Vec<_>>());
    }

    #[test]
    fn test_drive_plays_to_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let song = write_ym3(dir.path(), "short.ym", 5, 3);
        let out = dir.path().join("out.bin");
        let transport = WriterTransport::open(&out).unwrap();
        let options = SessionOptions {
            wrap_playlist: false,
            ..SessionOptions::default()
        };

        let session =
            PlaybackSession::new(vec![SongGroup::single(song)], transport, options).unwrap();
        let quit = AtomicBool::new(false);
        let stats = drive(session, WaitPolicy::default(), &quit).unwrap();

        assert_eq!(stats.frames, 5);
        // 3 silence + 5 frames + 3 silence at the end + 3 silence on drop
        let written = fs::read(&out).unwrap();
        assert_eq!(written.len(), 14 * PACKET_LEN);
    }
}
