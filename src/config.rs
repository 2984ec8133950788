//! Compile-time constants shared by every component.
//!
//! These mirror the fixed sizes the original firmware bakes in at build time
//! (sample rate, block size, pool sizes). None of them are runtime-configurable
//! because the rest of the engine assumes fixed-capacity, allocation-free
//! storage sized against them.

/// Engine's fixed native sample rate, in Hz.
pub const SAMPLE_RATE: u32 = 44_100;

/// Stereo frames per audio block (≈ 2.9 ms at 44.1 kHz).
pub const BLOCK_FRAMES: usize = 128;

/// Number of polyphonic voices.
pub const MAX_VOICES: usize = 10;

/// Pads 0..15 are sequencer tracks, pads 16..23 are live-only extras.
pub const MAX_PADS: usize = 24;

/// Sequencer tracks; always pad 0..15 one-to-one.
pub const MAX_TRACKS: usize = 16;

/// Pattern slots.
pub const MAX_PATTERNS: usize = 128;

/// Storage capacity of the pattern arena per track. The active playback
/// grid only ever cycles through the first [`ACTIVE_STEPS`].
pub const STEPS_PER_PATTERN: usize = 64;

/// Hardwired sequencer grid: four 16th notes per beat, 16 per pattern cycle.
pub const ACTIVE_STEPS: usize = 16;

/// Visualization capture ring length.
pub const CAPTURE_RING_LEN: usize = 256;

/// Maximum simultaneously active filters, per category (track or pad).
pub const MAX_ACTIVE_FILTERS_PER_CATEGORY: usize = 8;

/// Arrhythmic loop mode's fixed per-step firing probability.
pub const ARRHYTHMIC_PROBABILITY_PCT: u8 = 40;

pub const MIN_TEMPO_BPM: f32 = 40.0;
pub const MAX_TEMPO_BPM: f32 = 300.0;

pub const MIN_VOLUME_PCT: u16 = 0;
pub const MAX_VOLUME_PCT: u16 = 150;

pub const MIN_VELOCITY: u8 = 1;
pub const MAX_VELOCITY: u8 = 127;

/// Minimum frames a trimmed/ratcheted/note-length-divided sample span may
/// shrink to before floor-clamping kicks in.
pub const MIN_SAMPLE_FRAMES: usize = 64;
