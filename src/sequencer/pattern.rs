//! The pattern arena: `128 × 16 × 64` struct-of-arrays storage, allocated
//! once and never reallocated. Struct-of-arrays keyed by `(pattern, track,
//! step)` favors the sequencer's actual access pattern (iterate all tracks
//! at one fixed step) over cache locality for a single cell.
//!
//! Only step indices `0..ACTIVE_STEPS` are ever visited by playback; the
//! rest of each track's 64-step row is addressable storage headroom (see
//! `SPEC_FULL.md` §3).

use crate::config::{MAX_PATTERNS, MAX_TRACKS, STEPS_PER_PATTERN};
use crate::error::{EngineError, EngineResult};

const fn cell_count() -> usize {
    MAX_PATTERNS * MAX_TRACKS * STEPS_PER_PATTERN
}

#[inline]
fn cell_index(pattern: usize, track: usize, step: usize) -> usize {
    (pattern * MAX_TRACKS + track) * STEPS_PER_PATTERN + step
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StepCell {
    pub on: bool,
    pub velocity: u8,
    pub note_len_div: u8,
    pub probability: u8,
    pub ratchet: u8,
    pub volume_lock_enabled: bool,
    pub volume_lock_value: u16,
    pub cutoff_lock_enabled: bool,
    pub cutoff_lock_value: f32,
    pub reverb_send_lock_enabled: bool,
    pub reverb_send_lock_value: u8,
}

impl StepCell {
    fn defaults() -> Self {
        Self {
            on: false,
            velocity: 127,
            note_len_div: 1,
            probability: 100,
            ratchet: 1,
            volume_lock_enabled: false,
            volume_lock_value: 100,
            cutoff_lock_enabled: false,
            cutoff_lock_value: 1000.0,
            reverb_send_lock_enabled: false,
            reverb_send_lock_value: 0,
        }
    }
}

/// Large, slow-RAM-shaped pattern storage: single-owner, single-writer,
/// written and read only by the control task.
pub struct PatternData {
    cells: Vec<StepCell>,
}

impl PatternData {
    pub fn new() -> Self {
        Self { cells: vec![StepCell::defaults(); cell_count()] }
    }

    fn check_indices(pattern: usize, track: usize, step: usize) -> EngineResult<()> {
        if pattern >= MAX_PATTERNS {
            return Err(EngineError::InvalidIndex("pattern"));
        }
        if track >= MAX_TRACKS {
            return Err(EngineError::InvalidIndex("track"));
        }
        if step >= STEPS_PER_PATTERN {
            return Err(EngineError::InvalidIndex("step"));
        }
        Ok(())
    }

    pub fn get(&self, pattern: usize, track: usize, step: usize) -> StepCell {
        if Self::check_indices(pattern, track, step).is_err() {
            return StepCell::default();
        }
        self.cells[cell_index(pattern, track, step)]
    }

    fn cell_mut(&mut self, pattern: usize, track: usize, step: usize) -> Option<&mut StepCell> {
        if Self::check_indices(pattern, track, step).is_err() {
            return None;
        }
        Some(&mut self.cells[cell_index(pattern, track, step)])
    }

    pub fn set_step(&mut self, pattern: usize, track: usize, step: usize, on: bool, velocity: u8) {
        if let Some(cell) = self.cell_mut(pattern, track, step) {
            cell.on = on;
            cell.velocity = velocity.clamp(1, 127);
        }
    }

    pub fn set_step_velocity(&mut self, pattern: usize, track: usize, step: usize, velocity: u8) {
        if let Some(cell) = self.cell_mut(pattern, track, step) {
            cell.velocity = velocity.clamp(1, 127);
        }
    }

    pub fn set_step_note_len(&mut self, pattern: usize, track: usize, step: usize, div: u8) {
        let div = match div {
            1 | 2 | 4 | 8 => div,
            d if d < 2 => 1,
            d if d < 4 => 2,
            d if d < 8 => 4,
            _ => 8,
        };
        if let Some(cell) = self.cell_mut(pattern, track, step) {
            cell.note_len_div = div;
        }
    }

    pub fn set_step_probability(&mut self, pattern: usize, track: usize, step: usize, pct: u8) {
        if let Some(cell) = self.cell_mut(pattern, track, step) {
            cell.probability = pct.min(100);
        }
    }

    pub fn set_step_ratchet(&mut self, pattern: usize, track: usize, step: usize, ratchet: u8) {
        if let Some(cell) = self.cell_mut(pattern, track, step) {
            cell.ratchet = ratchet.clamp(1, 4);
        }
    }

    pub fn set_step_volume_lock(&mut self, pattern: usize, track: usize, step: usize, enabled: bool, value: u16) {
        if let Some(cell) = self.cell_mut(pattern, track, step) {
            cell.volume_lock_enabled = enabled;
            cell.volume_lock_value = value.min(150);
        }
    }

    pub fn set_step_cutoff_lock(&mut self, pattern: usize, track: usize, step: usize, enabled: bool, hz: f32) {
        if let Some(cell) = self.cell_mut(pattern, track, step) {
            cell.cutoff_lock_enabled = enabled;
            cell.cutoff_lock_value = hz.clamp(20.0, 20_000.0);
        }
    }

    pub fn set_step_reverb_send_lock(&mut self, pattern: usize, track: usize, step: usize, enabled: bool, pct: u8) {
        if let Some(cell) = self.cell_mut(pattern, track, step) {
            cell.reverb_send_lock_enabled = enabled;
            cell.reverb_send_lock_value = pct.min(100);
        }
    }

    /// Bulk step/velocity write for one pattern's 16x16 sequencer-visible
    /// grid (all other fields keep their current values).
    pub fn set_pattern_bulk(&mut self, pattern: usize, steps: &[[bool; 16]; 16], velocities: &[[u8; 16]; 16]) {
        if pattern >= MAX_PATTERNS {
            return;
        }
        for track in 0..16.min(MAX_TRACKS) {
            for step in 0..16.min(STEPS_PER_PATTERN) {
                self.set_step(pattern, track, step, steps[track][step], velocities[track][step]);
            }
        }
    }

    pub fn clear_pattern(&mut self, pattern: usize) {
        if pattern >= MAX_PATTERNS {
            return;
        }
        for track in 0..MAX_TRACKS {
            for step in 0..STEPS_PER_PATTERN {
                self.cells[cell_index(pattern, track, step)] = StepCell::defaults();
            }
        }
    }

    pub fn clear_track(&mut self, pattern: usize, track: usize) {
        if pattern >= MAX_PATTERNS || track >= MAX_TRACKS {
            return;
        }
        for step in 0..STEPS_PER_PATTERN {
            self.cells[cell_index(pattern, track, step)].on = false;
        }
    }

    pub fn copy_pattern(&mut self, src: usize, dst: usize) {
        if src >= MAX_PATTERNS || dst >= MAX_PATTERNS || src == dst {
            return;
        }
        for track in 0..MAX_TRACKS {
            for step in 0..STEPS_PER_PATTERN {
                let value = self.cells[cell_index(src, track, step)];
                self.cells[cell_index(dst, track, step)] = value;
            }
        }
    }
}

impl Default for PatternData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_step_round_trips() {
        let mut pd = PatternData::new();
        pd.set_step(0, 3, 4, true, 100);
        assert!(pd.get(0, 3, 4).on);
        pd.set_step(0, 3, 4, false, 100);
        assert!(!pd.get(0, 3, 4).on);
    }

    #[test]
    fn copy_pattern_matches_every_field() {
        let mut pd = PatternData::new();
        pd.set_step(0, 1, 2, true, 90);
        pd.set_step_ratchet(0, 1, 2, 3);
        pd.set_step_probability(0, 1, 2, 55);
        pd.copy_pattern(0, 1);
        let a = pd.get(0, 1, 2);
        let b = pd.get(1, 1, 2);
        assert_eq!(a.on, b.on);
        assert_eq!(a.velocity, b.velocity);
        assert_eq!(a.ratchet, b.ratchet);
        assert_eq!(a.probability, b.probability);
    }

    #[test]
    fn out_of_range_indices_are_silent_no_ops() {
        let mut pd = PatternData::new();
        pd.set_step(999, 0, 0, true, 100);
        pd.set_step(0, 999, 0, true, 100);
        pd.set_step(0, 0, 999, true, 100);
        assert!(!pd.get(0, 0, 0).on);
    }
}
