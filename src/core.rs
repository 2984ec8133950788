//! `Core`: the root value that owns every component. No global singletons —
//! everything reachable from here is owned, not process-wide state.

use crate::command::{Command, Event};
use crate::config::MAX_VOLUME_PCT;
use crate::error::EngineResult;
use crate::filter::FilterParams;
use crate::output::AudioEngine;
use crate::sample_store::SampleStore;
use crate::sequencer::{Sequencer, SequencerObserver};
use crate::voice::VoiceMixer;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Instant;

/// Bridges sequencer callbacks into voice triggers. Constructed fresh for
/// each `tick` call so it can borrow the pieces it needs without the
/// sequencer owning a reference to the rest of `Core`.
struct TriggerBridge<'a> {
    sample_store: &'a SampleStore,
    voices: &'a VoiceMixer,
    sequencer_volume_pct: u16,
    events: Vec<Event>,
}

impl<'a> SequencerObserver for TriggerBridge<'a> {
    fn on_step_trigger(&mut self, index: usize, velocity: u8, volume: u16, note_len_samples: usize) {
        let Some(sample) = self.sample_store.get(index) else {
            log::warn!("step trigger on pad {index} with no buffer loaded");
            return;
        };
        let scaled_volume = ((volume as u32 * self.sequencer_volume_pct as u32) / 100).min(MAX_VOLUME_PCT as u32) as u16;
        self.voices.trigger_sequencer(index, sample, velocity, scaled_volume, note_len_samples);
    }

    fn on_step_change(&mut self, step: usize) {
        self.events.push(Event::StepChange(step));
    }

    fn on_pattern_change(&mut self, new_pattern: usize, song_length: usize) {
        self.events.push(Event::PatternChange(new_pattern, song_length));
    }
}

pub struct Core {
    pub sample_store: SampleStore,
    /// Shared with the audio task: `Arc` rather than a plain field, since the
    /// audio thread runs `AudioEngine::process_block` against the same
    /// instance concurrently with the control task's triggers and parameter
    /// changes (see [`crate::runtime`]).
    pub audio: Arc<AudioEngine>,
    pub sequencer: Sequencer,
    pub live_volume_pct: u16,
    pub sequencer_volume_pct: u16,
}

impl Core {
    pub fn new() -> Self {
        Self {
            sample_store: SampleStore::new(),
            audio: Arc::new(AudioEngine::new()),
            sequencer: Sequencer::new(Box::new(SmallRng::from_entropy())),
            live_volume_pct: 100,
            sequencer_volume_pct: 100,
        }
    }

    /// Seeded construction, for deterministic tests.
    pub fn with_seed(seed: u64) -> Self {
        Self { sequencer: Sequencer::new(Box::new(SmallRng::seed_from_u64(seed))), ..Self::new() }
    }

    /// Construction that shares an existing [`AudioEngine`] (typically one
    /// already handed to the audio task) instead of owning a fresh one. This
    /// is what [`crate::runtime::ControlTask`] uses.
    pub fn with_audio(audio: Arc<AudioEngine>) -> Self {
        Self { audio, ..Self::new() }
    }

    pub fn voices(&self) -> &VoiceMixer {
        &self.audio.voices
    }

    /// Drives the sequencer's tempo clock, forwarding any trigger it emits
    /// into the voice mixer, and drains the sample store's deferred-unload
    /// list. Called by the control task at its own cadence.
    pub fn tick(&mut self, now: Instant) -> Vec<Event> {
        let mut bridge = TriggerBridge {
            sample_store: &self.sample_store,
            voices: &self.audio.voices,
            sequencer_volume_pct: self.sequencer_volume_pct,
            events: Vec::new(),
        };
        self.sequencer.tick(now, &mut bridge);
        let mut events = bridge.events;

        for pad in self.sample_store.poll_pending_unloads() {
            events.push(Event::SampleUnloaded(pad));
        }
        events.push(Event::VoicesStatus(self.audio.voices.active_count()));
        events
    }

    /// Applies one externally-issued command. Errors are the caller's to
    /// observe; none of them ever reach the audio task.
    pub fn apply_command(&mut self, command: Command) -> EngineResult<Option<Event>> {
        use Command::*;
        match command {
            Start => self.sequencer.start(Instant::now()),
            Stop => self.sequencer.stop(),
            SetTempo(bpm) => self.sequencer.set_tempo(bpm),
            SelectPattern(p) => self.sequencer.select_pattern(p),
            SetSongMode(on, len) => self.sequencer.set_song_mode(on, len),
            SetHumanize(timing_ms, velocity_pct) => self.sequencer.set_humanize(timing_ms, velocity_pct),

            SetStep(p, t, s, on) => self.sequencer.pattern_mut().set_step(p, t, s, on, 127),
            SetStepVelocity(p, t, s, v) => self.sequencer.pattern_mut().set_step_velocity(p, t, s, v),
            SetStepNoteLen(p, t, s, div) => self.sequencer.pattern_mut().set_step_note_len(p, t, s, div),
            SetStepProbability(p, t, s, pct) => self.sequencer.pattern_mut().set_step_probability(p, t, s, pct),
            SetStepRatchet(p, t, s, r) => self.sequencer.pattern_mut().set_step_ratchet(p, t, s, r),
            SetStepVolumeLock(p, t, s, en, v) => self.sequencer.pattern_mut().set_step_volume_lock(p, t, s, en, v),
            SetStepCutoffLock(p, t, s, en, hz) => self.sequencer.pattern_mut().set_step_cutoff_lock(p, t, s, en, hz),
            SetStepReverbSendLock(p, t, s, en, pct) => {
                self.sequencer.pattern_mut().set_step_reverb_send_lock(p, t, s, en, pct)
            }
            SetPatternBulk(p, steps, vels) => self.sequencer.pattern_mut().set_pattern_bulk(p, &steps, &vels),
            // `steps`/`vels` are `Box<[[_; 16]; 16]>`; `&steps` derefs to the
            // inner array reference `set_pattern_bulk` expects.
            ClearPattern(p) => self.sequencer.pattern_mut().clear_pattern(p),
            ClearTrack(t) => {
                let pattern = self.sequencer.current_pattern();
                self.sequencer.pattern_mut().clear_track(pattern, t)
            }
            CopyPattern(src, dst) => self.sequencer.pattern_mut().copy_pattern(src, dst),

            MuteTrack(t, on) => self.sequencer.mute_track(t, on)?,
            SetTrackVolume(t, v) => self.sequencer.set_track_volume(t, v)?,
            SetMasterVolume(v) => self.audio.set_master_volume(v),
            SetSequencerVolume(v) => self.sequencer_volume_pct = v.min(MAX_VOLUME_PCT),
            SetLiveVolume(v) => self.live_volume_pct = v.min(MAX_VOLUME_PCT),

            TriggerLive(pad, vel) => return Ok(self.trigger_live(pad, vel)),
            TriggerSequencer(pad, vel, track_vol, note_len) => {
                if let Some(sample) = self.sample_store.get(pad) {
                    self.audio.voices.trigger_sequencer(pad, sample, vel, track_vol, note_len);
                } else {
                    log::warn!("TriggerSequencer on pad {pad} with no buffer loaded");
                }
            }
            StopVoice(pad) => self.audio.voices.stop(pad),
            StopAll => self.audio.voices.stop_all(),

            ToggleLoop(t) => self.sequencer.toggle_loop(t)?,
            SetLoopType(t, loop_type) => self.sequencer.set_loop_type(t, loop_type)?,
            PauseLoop(t) => self.sequencer.pause_loop(t)?,

            SetGlobalFilter(filter_type, cutoff, q) => {
                self.audio.filters.set_global_filter(FilterParams { filter_type, cutoff_hz: cutoff, q, gain_db: 0.0 })
            }
            SetGlobalDistortion(amount, mode) => self.audio.master_chain.set_distortion(amount, mode),
            SetBitDepth(bits) => self.audio.master_chain.set_bit_depth(bits),
            SetSampleRate(target_fs) => self.audio.master_chain.set_sample_rate(target_fs),
            SetTrackFilter(t, filter_type, cutoff, q, gain) => {
                self.audio.filters.set_track_filter(t, FilterParams { filter_type, cutoff_hz: cutoff, q, gain_db: gain })?
            }
            ClearTrackFilter(t) => self.audio.filters.clear_track_filter(t)?,
            SetPadFilter(pad, filter_type, cutoff, q, gain) => {
                self.audio.filters.set_pad_filter(pad, FilterParams { filter_type, cutoff_hz: cutoff, q, gain_db: gain })?
            }
            ClearPadFilter(pad) => self.audio.filters.clear_pad_filter(pad)?,

            LoadSample(pad, pcm, name) => self.sample_store.load(pad, pcm, name)?,
            UnloadSample(pad) => {
                self.sample_store.unload(pad)?;
            }
            UnloadAll => self.sample_store.unload_all(),
            TrimSample(pad, start, end) => self.sample_store.trim(pad, start, end)?,
            ApplyFade(pad, fade_in, fade_out) => self.sample_store.apply_fade(pad, fade_in, fade_out)?,
            RequestWaveformPeaks(pad, n_points) => {
                let peaks = self.sample_store.waveform_peaks(pad, n_points)?;
                return Ok(Some(Event::WaveformPeaks(pad, peaks)));
            }
        }
        Ok(None)
    }

    fn trigger_live(&mut self, pad: usize, velocity: u8) -> Option<Event> {
        match self.sample_store.get(pad) {
            Some(sample) => {
                self.audio.voices.trigger_live(pad, sample, velocity, self.live_volume_pct);
                None
            }
            None => {
                log::warn!("TriggerLive on pad {pad} with no buffer loaded");
                None
            }
        }
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize) -> Vec<i16> {
        (0..len).map(|i| ((i as f32 * 0.2).sin() * 12_000.0) as i16).collect()
    }

    #[test]
    fn basic_trigger_decays_to_silence_with_no_leftover_voices() {
        let mut core = Core::with_seed(1);
        core.apply_command(Command::LoadSample(0, sine(4410), "tone".into())).unwrap();
        core.apply_command(Command::TriggerLive(0, 127)).unwrap();
        assert_eq!(core.voices().active_count(), 1);

        let mut loop_state = crate::output::AudioLoopState::without_publish();
        let mut sink = crate::output::RecordingSink::default();
        for _ in 0..40 {
            core.audio.process_block(&mut loop_state, &mut sink).unwrap();
        }
        assert_eq!(core.voices().active_count(), 0);
    }

    #[test]
    fn set_step_round_trip_through_commands() {
        let mut core = Core::with_seed(2);
        core.apply_command(Command::SetStep(0, 3, 4, true)).unwrap();
        assert!(core.sequencer.pattern().get(0, 3, 4).on);
        core.apply_command(Command::SetStep(0, 3, 4, false)).unwrap();
        assert!(!core.sequencer.pattern().get(0, 3, 4).on);
    }

    #[test]
    fn distortion_mode_round_trips_through_command() {
        let mut core = Core::with_seed(3);
        core.apply_command(Command::SetGlobalDistortion(50.0, DistortionMode::Hard)).unwrap();
        assert_eq!(core.audio.master_chain.distortion_mode(), DistortionMode::Hard);
    }
}
