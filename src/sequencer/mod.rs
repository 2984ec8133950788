//! Tempo clock and pattern dispatch. The sequencer itself never triggers
//! audio directly; it calls back into a [`SequencerObserver`] supplied by
//! the caller (the real one forwards into [`crate::voice::VoiceMixer`]; a
//! test can record calls instead).

pub mod pattern;

use std::time::Instant;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::{
    ACTIVE_STEPS, ARRHYTHMIC_PROBABILITY_PCT, MAX_PADS, MAX_PATTERNS, MAX_TRACKS, SAMPLE_RATE,
};
use crate::error::{EngineError, EngineResult};
use pattern::PatternData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopType {
    #[default]
    EveryStep,
    EveryBeat,
    HalfBeat,
    Arrhythmic,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackState {
    pub muted: bool,
    pub volume: u16,
}

/// Independent loop-processor state. Keyed by the full pad range (0..23),
/// not just the 16 sequencer tracks: live-only pads (16..23) can loop too
/// (see `SPEC_FULL.md` §3), even though they never carry pattern cells.
#[derive(Debug, Clone, Copy)]
pub struct LoopState {
    pub loop_active: bool,
    pub loop_paused: bool,
    pub loop_type: LoopType,
    pub loop_step_counter: u32,
}

impl Default for LoopState {
    fn default() -> Self {
        Self { loop_active: false, loop_paused: false, loop_type: LoopType::EveryStep, loop_step_counter: 0 }
    }
}

/// Sink for the sequencer's three callback shapes. `index` in
/// `on_step_trigger` is a track (0..15) for pattern-driven triggers or a pad
/// (0..23) for loop-driven triggers.
pub trait SequencerObserver {
    fn on_step_trigger(&mut self, index: usize, velocity: u8, volume: u16, note_len_samples: usize);
    fn on_step_change(&mut self, step: usize);
    fn on_pattern_change(&mut self, new_pattern: usize, song_length: usize);
}

/// An observer that drops every callback; useful when only pattern mutation
/// is needed and no audio-side effects should run.
pub struct NullObserver;
impl SequencerObserver for NullObserver {
    fn on_step_trigger(&mut self, _index: usize, _velocity: u8, _volume: u16, _note_len_samples: usize) {}
    fn on_step_change(&mut self, _step: usize) {}
    fn on_pattern_change(&mut self, _new_pattern: usize, _song_length: usize) {}
}

pub struct Sequencer {
    pattern: PatternData,
    tracks: [TrackState; MAX_TRACKS],
    loops: [LoopState; MAX_PADS],
    rng: Box<dyn RngCore + Send>,

    playing: bool,
    tempo_bpm: f32,
    current_pattern: usize,
    current_step: usize,
    step_interval_us: u32,
    next_step_interval_us: u32,
    humanize_timing_ms: u32,
    humanize_velocity_pct: u32,
    song_mode: bool,
    song_length: usize,
    last_step_time: Option<Instant>,
}

impl Sequencer {
    pub fn new(rng: Box<dyn RngCore + Send>) -> Self {
        let tempo_bpm = 120.0;
        let step_interval_us = Self::compute_step_interval(tempo_bpm);
        Self {
            pattern: PatternData::new(),
            tracks: [TrackState::default(); MAX_TRACKS],
            loops: [LoopState::default(); MAX_PADS],
            rng,
            playing: false,
            tempo_bpm,
            current_pattern: 0,
            current_step: 0,
            step_interval_us,
            next_step_interval_us: step_interval_us,
            humanize_timing_ms: 0,
            humanize_velocity_pct: 0,
            song_mode: false,
            song_length: 1,
            last_step_time: None,
        }
    }

    fn compute_step_interval(bpm: f32) -> u32 {
        ((60.0 / bpm / 4.0) * 1_000_000.0) as u32
    }

    pub fn start(&mut self, now: Instant) {
        self.playing = true;
        self.last_step_time = Some(now);
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn reset(&mut self, now: Instant) {
        self.current_step = 0;
        self.last_step_time = Some(now);
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn current_pattern(&self) -> usize {
        self.current_pattern
    }

    pub fn set_tempo(&mut self, bpm: f32) {
        self.tempo_bpm = bpm.clamp(40.0, 300.0);
        self.step_interval_us = Self::compute_step_interval(self.tempo_bpm);
    }

    pub fn tempo(&self) -> f32 {
        self.tempo_bpm
    }

    pub fn select_pattern(&mut self, pattern: usize) {
        if pattern < MAX_PATTERNS {
            self.current_pattern = pattern;
        }
    }

    pub fn set_song_mode(&mut self, on: bool, length: usize) {
        self.song_mode = on;
        self.song_length = length.clamp(1, MAX_PATTERNS);
    }

    pub fn set_humanize(&mut self, timing_ms: u32, velocity_pct: u32) {
        self.humanize_timing_ms = timing_ms.min(40);
        self.humanize_velocity_pct = velocity_pct.min(60);
    }

    pub fn mute_track(&mut self, track: usize, muted: bool) -> EngineResult<()> {
        self.track_mut(track)?.muted = muted;
        Ok(())
    }

    pub fn set_track_volume(&mut self, track: usize, volume: u16) -> EngineResult<()> {
        self.track_mut(track)?.volume = volume.min(150);
        Ok(())
    }

    /// Loop toggles address the full pad range (0..23): sequencer tracks
    /// 0..15 and live-only pads 16..23 alike.
    pub fn toggle_loop(&mut self, pad: usize) -> EngineResult<()> {
        let l = self.loop_mut(pad)?;
        l.loop_active = !l.loop_active;
        Ok(())
    }

    pub fn set_loop_type(&mut self, pad: usize, loop_type: LoopType) -> EngineResult<()> {
        self.loop_mut(pad)?.loop_type = loop_type;
        Ok(())
    }

    pub fn pause_loop(&mut self, pad: usize) -> EngineResult<()> {
        let l = self.loop_mut(pad)?;
        l.loop_paused = !l.loop_paused;
        Ok(())
    }

    fn track_mut(&mut self, track: usize) -> EngineResult<&mut TrackState> {
        self.tracks.get_mut(track).ok_or(EngineError::InvalidIndex("track"))
    }

    fn loop_mut(&mut self, pad: usize) -> EngineResult<&mut LoopState> {
        self.loops.get_mut(pad).ok_or(EngineError::InvalidIndex("pad"))
    }

    pub fn pattern(&self) -> &PatternData {
        &self.pattern
    }

    pub fn pattern_mut(&mut self) -> &mut PatternData {
        &mut self.pattern
    }

    /// Called frequently (≈500 Hz) by the control task. Advances the
    /// transport and dispatches a step if `now - last_step_time` has reached
    /// `next_step_interval`.
    pub fn tick(&mut self, now: Instant, observer: &mut impl SequencerObserver) {
        if !self.playing {
            return;
        }
        let last = match self.last_step_time {
            Some(t) => t,
            None => {
                self.last_step_time = Some(now);
                return;
            }
        };
        let interval = if self.next_step_interval_us > 0 { self.next_step_interval_us } else { self.step_interval_us };
        if (now.saturating_duration_since(last)).as_micros() < interval as u128 {
            return;
        }
        self.last_step_time = Some(now);

        observer.on_step_change(self.current_step);
        self.process_step(observer);

        self.current_step = (self.current_step + 1) % ACTIVE_STEPS;
        if self.current_step == 0 && self.song_mode && self.song_length > 1 {
            self.current_pattern = (self.current_pattern + 1) % self.song_length;
            observer.on_pattern_change(self.current_pattern, self.song_length);
        }

        if self.humanize_timing_ms > 0 {
            let h = self.humanize_timing_ms as i32;
            let jitter_ms = self.rng.next_u32() as i32 % (2 * h + 1) - h;
            let candidate = self.step_interval_us as i64 + (jitter_ms as i64 * 1000);
            let min_step = self.step_interval_us as i64 / 2;
            self.next_step_interval_us = candidate.max(min_step) as u32;
        } else {
            self.next_step_interval_us = self.step_interval_us;
        }
    }

    fn roll_0_99(&mut self) -> u8 {
        (self.rng.next_u32() % 100) as u8
    }

    fn process_step(&mut self, observer: &mut impl SequencerObserver) {
        self.process_loops(observer);

        for track in 0..MAX_TRACKS {
            let track_state = self.tracks[track];
            if track_state.muted {
                continue;
            }
            let cell = self.pattern.get(self.current_pattern, track, self.current_step);
            if !cell.on {
                continue;
            }
            if cell.probability < 100 {
                let roll = self.roll_0_99();
                if roll >= cell.probability {
                    continue;
                }
            }

            let out_volume = if cell.volume_lock_enabled { cell.volume_lock_value } else { track_state.volume };
            let note_len_samples = if cell.note_len_div > 1 {
                let samples = (self.step_interval_us as u64 * SAMPLE_RATE as u64)
                    / (cell.note_len_div as u64 * 1_000_000);
                samples.max(64) as usize
            } else {
                0
            };

            let ratchet = cell.ratchet.clamp(1, 4);
            for _ in 0..ratchet {
                let out_velocity = if self.humanize_velocity_pct > 0 {
                    let max_delta = (127 * self.humanize_velocity_pct / 100) as i32;
                    let jitter = if max_delta > 0 {
                        (self.rng.next_u32() as i32 % (2 * max_delta + 1)) - max_delta
                    } else {
                        0
                    };
                    ((cell.velocity as i32 + jitter).clamp(1, 127)) as u8
                } else {
                    cell.velocity
                };

                let sub_note_len = if ratchet > 1 && note_len_samples > 0 {
                    (note_len_samples / ratchet as usize).max(64)
                } else {
                    note_len_samples
                };

                observer.on_step_trigger(track, out_velocity, out_volume, sub_note_len);
            }
        }
    }

    fn process_loops(&mut self, observer: &mut impl SequencerObserver) {
        for pad in 0..MAX_PADS {
            let state = self.loops[pad];
            let muted = pad < MAX_TRACKS && self.tracks[pad].muted;
            if !(state.loop_active && !state.loop_paused && !muted) {
                continue;
            }
            let volume = if pad < MAX_TRACKS { self.tracks[pad].volume } else { 100 };
            let should_fire = match state.loop_type {
                LoopType::EveryStep => true,
                LoopType::EveryBeat => state.loop_step_counter % 4 == 0,
                LoopType::HalfBeat => state.loop_step_counter % 2 == 0,
                LoopType::Arrhythmic => self.roll_0_99() < ARRHYTHMIC_PROBABILITY_PCT,
            };
            if should_fire {
                observer.on_step_trigger(pad, 127, volume, 0);
            }
            self.loops[pad].loop_step_counter = (state.loop_step_counter + 1) % 16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        triggers: Vec<(usize, u8, u16, usize)>,
        step_changes: Vec<usize>,
        pattern_changes: Vec<(usize, usize)>,
    }
    impl SequencerObserver for Recorder {
        fn on_step_trigger(&mut self, track: usize, velocity: u8, volume: u16, note_len_samples: usize) {
            self.triggers.push((track, velocity, volume, note_len_samples));
        }
        fn on_step_change(&mut self, step: usize) {
            self.step_changes.push(step);
        }
        fn on_pattern_change(&mut self, new_pattern: usize, song_length: usize) {
            self.pattern_changes.push((new_pattern, song_length));
        }
    }

    fn seq() -> Sequencer {
        Sequencer::new(Box::new(SmallRng::seed_from_u64(42)))
    }

    #[test]
    fn ratchet_emits_exactly_r_triggers() {
        let mut s = seq();
        s.set_tempo(120.0);
        s.pattern_mut().set_step(0, 3, 4, true, 100);
        s.pattern_mut().set_step_ratchet(0, 3, 4, 4);
        s.pattern_mut().set_step_probability(0, 3, 4, 100);
        s.pattern_mut().set_step_note_len(0, 3, 4, 2);
        s.select_pattern(0);

        let start = Instant::now();
        s.start(start);
        // Force the sequencer straight to step 4 without depending on wall time.
        s.current_step = 4;
        let mut rec = Recorder::default();
        s.tick(start + Duration::from_micros(s.step_interval_us as u64 + 1), &mut rec);

        assert_eq!(rec.triggers.len(), 4);
        for (track, _, _, note_len) in &rec.triggers {
            assert_eq!(*track, 3);
            assert_eq!(*note_len, 689);
        }
    }

    #[test]
    fn probability_zero_never_fires_and_hundred_always_fires() {
        let mut s = seq();
        s.pattern_mut().set_step(0, 0, 0, true, 100);
        s.pattern_mut().set_step_probability(0, 0, 0, 0);
        s.current_step = 0;
        let start = Instant::now();
        s.start(start);
        let mut rec = Recorder::default();
        s.tick(start + Duration::from_micros(s.step_interval_us as u64 + 1), &mut rec);
        assert!(rec.triggers.is_empty());
    }

    #[test]
    fn song_advance_wraps_with_configured_length() {
        let mut s = seq();
        s.set_tempo(120.0);
        s.set_song_mode(true, 3);
        let mut rec = Recorder::default();
        let mut now = Instant::now();
        s.start(now);
        let step_us = s.step_interval_us as u64;

        for _ in 0..48 {
            now += Duration::from_micros(step_us + 1);
            s.tick(now, &mut rec);
        }
        assert_eq!(rec.pattern_changes, vec![(1, 3), (2, 3), (0, 3)]);
    }

    #[test]
    fn loop_every_beat_fires_on_quarter_steps() {
        let mut s = seq();
        s.set_tempo(120.0);
        s.set_loop_type(18, LoopType::EveryBeat).unwrap();
        s.toggle_loop(18).unwrap();
        let mut rec = Recorder::default();
        let mut now = Instant::now();
        s.start(now);
        let step_us = s.step_interval_us as u64;
        for _ in 0..16 {
            now += Duration::from_micros(step_us + 1);
            s.tick(now, &mut rec);
        }
        let fired_steps: Vec<usize> = rec
            .triggers
            .iter()
            .enumerate()
            .map(|(i, _)| i * 4)
            .collect();
        assert_eq!(rec.triggers.len(), 4);
        assert_eq!(fired_steps, vec![0, 4, 8, 12]);
    }
}
