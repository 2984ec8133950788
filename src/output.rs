//! The audio block loop: zero the accumulator, let the voice mixer fill it,
//! apply master volume/saturate, run the master effect chain, write to the
//! sink, and push a decimated copy to the visualization capture ring.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use triple_buffer::Input;

use crate::config::{BLOCK_FRAMES, CAPTURE_RING_LEN, MAX_VOLUME_PCT, SAMPLE_RATE};
use crate::effects::{FilterBank, MasterEffectChain};
use crate::error::EngineResult;
use crate::voice::VoiceMixer;

/// Abstraction over the DAC bus. `write_block` is expected to block until
/// the block has been accepted — that block is this engine's natural paced
/// clock; nothing else on the audio thread may block.
pub trait AudioSink: Send {
    fn write_block(&mut self, frames: &[i16; 2 * BLOCK_FRAMES]) -> EngineResult<()>;
}

/// Fixed-capacity decimated capture for a non-real-time visualization
/// reader: one sample pushed per block (the first frame's left channel).
pub struct CaptureRing {
    buf: [i16; CAPTURE_RING_LEN],
    write_pos: usize,
    filled: bool,
}

impl CaptureRing {
    pub fn new() -> Self {
        Self { buf: [0; CAPTURE_RING_LEN], write_pos: 0, filled: false }
    }

    fn push(&mut self, sample: i16) {
        self.buf[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % CAPTURE_RING_LEN;
        if self.write_pos == 0 {
            self.filled = true;
        }
    }

    /// Oldest-to-newest snapshot of whatever has been captured so far.
    pub fn snapshot(&self) -> Vec<i16> {
        if !self.filled {
            self.buf[..self.write_pos].to_vec()
        } else {
            let mut out = Vec::with_capacity(CAPTURE_RING_LEN);
            out.extend_from_slice(&self.buf[self.write_pos..]);
            out.extend_from_slice(&self.buf[..self.write_pos]);
            out
        }
    }

    /// Same ordering as [`Self::snapshot`], copied into a fixed-size struct
    /// so it can be published across threads without allocating.
    fn to_fixed_snapshot(&self) -> CaptureSnapshot {
        let samples = self.snapshot();
        let mut fixed = [0i16; CAPTURE_RING_LEN];
        fixed[..samples.len()].copy_from_slice(&samples);
        CaptureSnapshot { samples: fixed, len: samples.len() }
    }
}

impl Default for CaptureRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-size copy of the capture ring's contents, published from the audio
/// task to a non-real-time visualization reader via `triple_buffer` — the
/// same producer/consumer split Flux's kernel uses for its `AudioSnapshot`.
#[derive(Debug, Clone, Copy)]
pub struct CaptureSnapshot {
    pub samples: [i16; CAPTURE_RING_LEN],
    pub len: usize,
}

impl Default for CaptureSnapshot {
    fn default() -> Self {
        Self { samples: [0; CAPTURE_RING_LEN], len: 0 }
    }
}

/// Owns the voice pool, filter bank, and master effect chain — the pieces
/// both tasks touch. Every field is reachable through `&self`: the control
/// task triggers voices, changes filters, and nudges master volume/effect
/// params directly through a shared reference (typically `Arc<AudioEngine>`)
/// without ever blocking the audio task.
pub struct AudioEngine {
    pub voices: VoiceMixer,
    pub filters: FilterBank,
    pub master_chain: MasterEffectChain,
    master_volume_pct: AtomicU32,
}

impl AudioEngine {
    pub fn new() -> Self {
        Self {
            voices: VoiceMixer::new(),
            filters: FilterBank::new(),
            master_chain: MasterEffectChain::default(),
            master_volume_pct: AtomicU32::new(100),
        }
    }

    pub fn set_master_volume(&self, pct: u16) {
        self.master_volume_pct.store(pct.min(MAX_VOLUME_PCT) as u32, Ordering::Relaxed);
    }

    pub fn master_volume_pct(&self) -> u16 {
        self.master_volume_pct.load(Ordering::Relaxed) as u16
    }

    /// Produces exactly one block and writes it to `sink`. The one blocking
    /// point is `sink.write_block`. `loop_state` holds the audio task's own
    /// bookkeeping (capture ring, CPU-load window) — it is never touched from
    /// the control task, so it stays a plain owned value rather than
    /// something behind a lock.
    pub fn process_block(&self, loop_state: &mut AudioLoopState, sink: &mut dyn AudioSink) -> EngineResult<()> {
        let mut accumulator = [0i32; 2 * BLOCK_FRAMES];
        self.voices.process_block(&mut accumulator, &self.filters);

        let master_volume_pct = self.master_volume_pct() as i32;
        let mut out = [0i16; 2 * BLOCK_FRAMES];
        for i in 0..BLOCK_FRAMES {
            let left = (accumulator[i * 2] * master_volume_pct) / 100;
            let right = (accumulator[i * 2 + 1] * master_volume_pct) / 100;
            let left = left.clamp(i16::MIN as i32, i16::MAX as i32) as f32;
            let right = right.clamp(i16::MIN as i32, i16::MAX as i32) as f32;
            out[i * 2] = self.master_chain.process(&self.filters, left);
            out[i * 2 + 1] = self.master_chain.process(&self.filters, right);
        }

        sink.write_block(&out)?;
        loop_state.capture.push(out[0]);
        loop_state.capture_publish.write(loop_state.capture.to_fixed_snapshot());

        loop_state.processed_frames += BLOCK_FRAMES as u64;
        let elapsed = loop_state.load_window_start.elapsed();
        if elapsed.as_secs() >= 1 {
            loop_state.cpu_load_pct = (loop_state.processed_frames as f32 / SAMPLE_RATE as f32) * 100.0;
            loop_state.processed_frames = 0;
            loop_state.load_window_start = Instant::now();
        }
        Ok(())
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio task's private per-block bookkeeping: visualization capture and a
/// one-second CPU-load window. Lives on the audio thread's stack; nothing
/// else ever sees it directly (see [`AudioEngine::process_block`]). The
/// capture ring's contents are additionally published each block through
/// `capture_publish`, the producer half of a `triple_buffer` whose consumer
/// half is the non-real-time visualization reader.
pub struct AudioLoopState {
    pub capture: CaptureRing,
    capture_publish: Input<CaptureSnapshot>,
    processed_frames: u64,
    load_window_start: Instant,
    cpu_load_pct: f32,
}

impl AudioLoopState {
    pub fn new(capture_publish: Input<CaptureSnapshot>) -> Self {
        Self {
            capture: CaptureRing::new(),
            capture_publish,
            processed_frames: 0,
            load_window_start: Instant::now(),
            cpu_load_pct: 0.0,
        }
    }

    pub fn cpu_load_pct(&self) -> f32 {
        self.cpu_load_pct
    }

    /// Convenience for callers with no visualization consumer attached: the
    /// capture ring is still maintained every block, but published snapshots
    /// have nowhere to go and are simply dropped.
    pub fn without_publish() -> Self {
        let (input, _unused_output) = triple_buffer::TripleBuffer::new(&CaptureSnapshot::default()).split();
        Self::new(input)
    }
}

/// A sink that simply records blocks, for tests and offline rendering.
#[derive(Default)]
pub struct RecordingSink {
    pub blocks: Vec<[i16; 2 * BLOCK_FRAMES]>,
}

impl AudioSink for RecordingSink {
    fn write_block(&mut self, frames: &[i16; 2 * BLOCK_FRAMES]) -> EngineResult<()> {
        self.blocks.push(*frames);
        Ok(())
    }
}
