//! Per-track/per-pad filter bank plus the fixed-order master effect chain
//! (Distortion → Filter → Sample-rate reduction → Bit crush).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{MAX_ACTIVE_FILTERS_PER_CATEGORY, MAX_PADS, MAX_TRACKS};
use crate::error::{EngineError, EngineResult};
use crate::filter::{BiquadState, Coeffs, FilterParams, FilterType};

struct FilterSlot {
    params: FilterParams,
    coeffs: Coeffs,
    state: BiquadState,
}

impl Default for FilterSlot {
    fn default() -> Self {
        Self { params: FilterParams::default(), coeffs: Coeffs::IDENTITY, state: BiquadState::default() }
    }
}

impl FilterSlot {
    fn is_active(&self) -> bool {
        self.params.filter_type != FilterType::None
    }

    fn set(&mut self, params: FilterParams) {
        self.params = params;
        self.coeffs = params.compute_coeffs();
        self.state.reset();
    }

    fn clear(&mut self) {
        self.params = FilterParams::default();
        self.coeffs = Coeffs::IDENTITY;
        self.state.reset();
    }
}

/// Per-track (0..15), per-pad (0..23), and master filter instances. Each
/// slot is behind its own lock so the control task (writer) and the audio
/// task (reader+DSP state owner) never contend across unrelated slots; the
/// lock is held only for a struct copy or swap, never across the per-sample
/// loop or the DAC write.
pub struct FilterBank {
    track_filters: Vec<Mutex<FilterSlot>>,
    pad_filters: Vec<Mutex<FilterSlot>>,
    master_filter: Mutex<FilterSlot>,
}

impl FilterBank {
    pub fn new() -> Self {
        Self {
            track_filters: (0..MAX_TRACKS).map(|_| Mutex::new(FilterSlot::default())).collect(),
            pad_filters: (0..MAX_PADS).map(|_| Mutex::new(FilterSlot::default())).collect(),
            master_filter: Mutex::new(FilterSlot::default()),
        }
    }

    fn count_active(slots: &[Mutex<FilterSlot>]) -> usize {
        slots.iter().filter(|s| s.lock().is_active()).count()
    }

    pub fn set_track_filter(&self, track: usize, params: FilterParams) -> EngineResult<()> {
        if track >= MAX_TRACKS {
            return Err(EngineError::InvalidIndex("track"));
        }
        let params = clamp_params(params);
        let was_active = self.track_filters[track].lock().is_active();
        if !was_active && params.filter_type != FilterType::None {
            if Self::count_active(&self.track_filters) >= MAX_ACTIVE_FILTERS_PER_CATEGORY {
                return Err(EngineError::TooManyActiveFilters("track", MAX_ACTIVE_FILTERS_PER_CATEGORY));
            }
        }
        self.track_filters[track].lock().set(params);
        Ok(())
    }

    pub fn clear_track_filter(&self, track: usize) -> EngineResult<()> {
        if track >= MAX_TRACKS {
            return Err(EngineError::InvalidIndex("track"));
        }
        self.track_filters[track].lock().clear();
        Ok(())
    }

    pub fn set_pad_filter(&self, pad: usize, params: FilterParams) -> EngineResult<()> {
        if pad >= MAX_PADS {
            return Err(EngineError::InvalidIndex("pad"));
        }
        let params = clamp_params(params);
        let was_active = self.pad_filters[pad].lock().is_active();
        if !was_active && params.filter_type != FilterType::None {
            if Self::count_active(&self.pad_filters) >= MAX_ACTIVE_FILTERS_PER_CATEGORY {
                return Err(EngineError::TooManyActiveFilters("pad", MAX_ACTIVE_FILTERS_PER_CATEGORY));
            }
        }
        self.pad_filters[pad].lock().set(params);
        Ok(())
    }

    pub fn clear_pad_filter(&self, pad: usize) -> EngineResult<()> {
        if pad >= MAX_PADS {
            return Err(EngineError::InvalidIndex("pad"));
        }
        self.pad_filters[pad].lock().clear();
        Ok(())
    }

    pub fn set_global_filter(&self, params: FilterParams) {
        self.master_filter.lock().set(clamp_params(params));
    }

    /// Applied by the Voice Mixer per voice, per sample: pad filter when the
    /// voice is a live pad and that pad's filter is active, else the track
    /// filter when not-live and that track's filter is active, else identity.
    pub fn apply_voice_filter(&self, pad_index: usize, is_live_pad: bool, input: f32) -> f32 {
        if is_live_pad {
            if let Some(slot) = self.pad_filters.get(pad_index) {
                let mut slot = slot.lock();
                if slot.is_active() {
                    let coeffs = slot.coeffs;
                    return slot.state.process(&coeffs, input);
                }
            }
        } else if let Some(slot) = self.track_filters.get(pad_index) {
            let mut slot = slot.lock();
            if slot.is_active() {
                let coeffs = slot.coeffs;
                return slot.state.process(&coeffs, input);
            }
        }
        input
    }

    pub fn apply_master_filter(&self, input: f32) -> f32 {
        let mut slot = self.master_filter.lock();
        if slot.is_active() {
            let coeffs = slot.coeffs;
            slot.state.process(&coeffs, input)
        } else {
            input
        }
    }
}

impl Default for FilterBank {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_params(mut params: FilterParams) -> FilterParams {
    params.cutoff_hz = params.cutoff_hz.clamp(20.0, 20_000.0);
    params.q = params.q.clamp(0.1, 20.0);
    params.gain_db = params.gain_db.clamp(-24.0, 24.0);
    params
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistortionMode {
    #[default]
    Soft,
    Hard,
    Tube,
    Fuzz,
}

#[derive(Debug, Clone, Copy)]
struct MasterEffectParams {
    distortion_mode: DistortionMode,
    distortion_amount: f32,
    sample_rate_target_hz: u32,
    bit_depth: u8,
}

impl Default for MasterEffectParams {
    fn default() -> Self {
        Self {
            distortion_mode: DistortionMode::Soft,
            distortion_amount: 0.0,
            sample_rate_target_hz: crate::config::SAMPLE_RATE,
            bit_depth: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SampleRateReduceState {
    counter: u32,
    held: f32,
}

/// Fixed-order Distortion → Filter → SR-reduce → BitCrush chain. Params are
/// set by the control task; `process` runs on the audio task. Both sides
/// reach it through a shared reference, same locking discipline as
/// [`FilterBank`]: the lock guards only the small params/state structs, never
/// the per-sample loop itself.
pub struct MasterEffectChain {
    params: Mutex<MasterEffectParams>,
    sr_state: Mutex<SampleRateReduceState>,
}

impl Default for MasterEffectChain {
    fn default() -> Self {
        Self { params: Mutex::new(MasterEffectParams::default()), sr_state: Mutex::new(SampleRateReduceState::default()) }
    }
}

impl MasterEffectChain {
    pub fn set_distortion(&self, amount: f32, mode: DistortionMode) {
        let mut p = self.params.lock();
        p.distortion_amount = amount.clamp(0.0, 100.0);
        p.distortion_mode = mode;
    }

    pub fn set_bit_depth(&self, bits: u8) {
        self.params.lock().bit_depth = bits.clamp(1, 16);
    }

    pub fn set_sample_rate(&self, target_fs: u32) {
        self.params.lock().sample_rate_target_hz = target_fs.clamp(1, crate::config::SAMPLE_RATE);
    }

    /// For tests and diagnostics; never called from the per-sample loop.
    pub fn distortion_mode(&self) -> DistortionMode {
        self.params.lock().distortion_mode
    }

    fn distortion(&self, params: &MasterEffectParams, x: f32) -> f32 {
        if params.distortion_amount < 0.1 {
            return x;
        }
        let drive = params.distortion_amount / 100.0;
        let norm = x / i16::MAX as f32;
        let shaped = match params.distortion_mode {
            DistortionMode::Soft => norm / (1.0 + norm.abs()),
            DistortionMode::Hard => {
                let threshold = 1.0 - drive * 0.9;
                norm.clamp(-threshold, threshold)
            }
            DistortionMode::Tube => {
                if norm >= 0.0 {
                    1.0 - (-norm * (1.0 + drive * 4.0)).exp()
                } else {
                    -(1.0 - (norm * (1.0 + drive * 2.0)).exp())
                }
            }
            DistortionMode::Fuzz => {
                let soft = norm / (1.0 + norm.abs());
                soft.signum() * soft * soft
            }
        };
        let blended = norm * (1.0 - drive) + shaped * drive;
        blended * i16::MAX as f32
    }

    fn sample_rate_reduce(&self, params: &MasterEffectParams, x: f32) -> f32 {
        if params.sample_rate_target_hz >= crate::config::SAMPLE_RATE {
            return x;
        }
        let k = (crate::config::SAMPLE_RATE / params.sample_rate_target_hz.max(1)).max(1);
        let mut state = self.sr_state.lock();
        if state.counter == 0 {
            state.held = x;
        }
        state.counter = (state.counter + 1) % k;
        state.held
    }

    fn bit_crush(&self, params: &MasterEffectParams, x: f32) -> f32 {
        if params.bit_depth >= 16 {
            return x;
        }
        let shift = 16 - params.bit_depth as i32;
        let sample = x as i32;
        let crushed = (sample >> shift) << shift;
        crushed as f32
    }

    /// Runs the fixed-order chain: Distortion → Filter → SR-reduce → BitCrush.
    pub fn process(&self, filters: &FilterBank, input: f32) -> i16 {
        let params = *self.params.lock();
        let x = self.distortion(&params, input);
        let x = filters.apply_master_filter(x);
        let x = self.sample_rate_reduce(&params, x);
        let x = self.bit_crush(&params, x);
        x.clamp(i16::MIN as f32, i16::MAX as f32) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_cap_is_enforced() {
        let bank = FilterBank::new();
        for t in 0..MAX_ACTIVE_FILTERS_PER_CATEGORY {
            bank.set_track_filter(t, FilterParams { filter_type: FilterType::LowPass, ..Default::default() }).unwrap();
        }
        let result = bank.set_track_filter(
            MAX_ACTIVE_FILTERS_PER_CATEGORY,
            FilterParams { filter_type: FilterType::LowPass, ..Default::default() },
        );
        assert_eq!(result, Err(EngineError::TooManyActiveFilters("track", MAX_ACTIVE_FILTERS_PER_CATEGORY)));
    }

    #[test]
    fn master_chain_order_bitcrush_bypassed_at_16_bits() {
        let filters = FilterBank::new();
        let chain = MasterEffectChain::default();
        let out = chain.process(&filters, 12345.0);
        assert_eq!(out, 12345);
    }

    #[test]
    fn bit_crush_reduces_resolution() {
        let filters = FilterBank::new();
        let chain = MasterEffectChain::default();
        chain.set_bit_depth(8);
        let out = chain.process(&filters, 12345.0);
        assert_ne!(out, 12345);
    }
}
