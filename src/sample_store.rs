//! Owns PCM sample buffers indexed by pad.
//!
//! Buffer lifetime is reference counted: the store holds one [`Arc`] per
//! loaded pad, a playing voice holds its own clone (see
//! [`crate::voice::VoicePayload`]). `unload` drops the store's reference; if a
//! voice is still holding a clone the buffer is parked on a short pending-free
//! list instead, and the caller gets [`EngineError::Busy`]. The control task
//! drains that list once per tick via [`SampleStore::poll_pending_unloads`].

use std::sync::Arc;

use crate::config::{MAX_PADS, MIN_SAMPLE_FRAMES, SAMPLE_RATE};
use crate::error::{EngineError, EngineResult};

/// Immutable-while-referenced mono 16-bit PCM buffer at the engine's native
/// sample rate.
#[derive(Debug)]
pub struct SampleData {
    pub data: Vec<i16>,
    pub length: usize,
    pub name: String,
}

impl SampleData {
    pub fn new(data: Vec<i16>, name: impl Into<String>) -> Self {
        let length = data.len();
        Self { data, length, name: name.into() }
    }
}

struct PendingUnload {
    pad: usize,
    buffer: Arc<SampleData>,
}

pub struct SampleStore {
    slots: Vec<Option<Arc<SampleData>>>,
    pending_unload: Vec<PendingUnload>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_PADS).map(|_| None).collect(),
            pending_unload: Vec::new(),
        }
    }

    fn check_pad(pad: usize) -> EngineResult<()> {
        if pad >= MAX_PADS {
            return Err(EngineError::InvalidIndex("pad"));
        }
        Ok(())
    }

    /// Returns a clone of the buffer currently loaded at `pad`, if any. This
    /// is the one operation the audio task calls, on trigger.
    pub fn get(&self, pad: usize) -> Option<Arc<SampleData>> {
        self.slots.get(pad).and_then(|slot| slot.clone())
    }

    /// Replaces any buffer currently at `pad`. A failed load leaves the
    /// previous buffer untouched.
    pub fn load(&mut self, pad: usize, pcm_i16_mono: Vec<i16>, name: impl Into<String>) -> EngineResult<()> {
        Self::check_pad(pad)?;
        if pcm_i16_mono.is_empty() {
            return Err(EngineError::OutOfMemory(pad));
        }
        self.slots[pad] = Some(Arc::new(SampleData::new(pcm_i16_mono, name)));
        Ok(())
    }

    /// Frees the buffer at `pad`. If a voice still references it, the free is
    /// deferred and `Busy` is returned; the caller learns of completion via
    /// [`Self::poll_pending_unloads`].
    pub fn unload(&mut self, pad: usize) -> EngineResult<()> {
        Self::check_pad(pad)?;
        let Some(buffer) = self.slots[pad].take() else {
            return Ok(());
        };
        if Arc::strong_count(&buffer) > 1 {
            self.pending_unload.push(PendingUnload { pad, buffer });
            return Err(EngineError::Busy(pad));
        }
        Ok(())
    }

    pub fn unload_all(&mut self) {
        for pad in 0..MAX_PADS {
            let _ = self.unload(pad);
        }
    }

    /// Drains buffers whose last voice reference has since dropped away,
    /// returning the pads whose unload just completed.
    pub fn poll_pending_unloads(&mut self) -> Vec<usize> {
        let mut completed = Vec::new();
        self.pending_unload.retain(|pending| {
            if Arc::strong_count(&pending.buffer) <= 1 {
                completed.push(pending.pad);
                false
            } else {
                true
            }
        });
        completed
    }

    /// Reallocates a shortened buffer in `[start_norm, end_norm)` and swaps it
    /// in atomically. Does not touch voices already playing the old buffer.
    pub fn trim(&mut self, pad: usize, start_norm: f32, end_norm: f32) -> EngineResult<()> {
        Self::check_pad(pad)?;
        if !(0.0..1.0).contains(&start_norm) || !(start_norm < end_norm) || end_norm > 1.0 {
            return Err(EngineError::InvalidParameter("trim range"));
        }
        let Some(buffer) = self.slots[pad].clone() else {
            return Err(EngineError::BufferNotLoaded(pad));
        };
        let len = buffer.length;
        let mut start = (start_norm * len as f32) as usize;
        let mut end = (end_norm * len as f32) as usize;
        end = end.min(len);
        if end.saturating_sub(start) < MIN_SAMPLE_FRAMES {
            if end >= MIN_SAMPLE_FRAMES {
                start = end - MIN_SAMPLE_FRAMES;
            } else {
                start = 0;
                end = len.min(MIN_SAMPLE_FRAMES);
            }
        }
        let trimmed: Vec<i16> = buffer.data[start..end].to_vec();
        self.slots[pad] = Some(Arc::new(SampleData::new(trimmed, buffer.name.clone())));
        Ok(())
    }

    /// In-place linear fade on the first/last `fade_seconds * native_fs`
    /// frames, each clamped to half the buffer's length.
    pub fn apply_fade(&mut self, pad: usize, fade_in_seconds: f32, fade_out_seconds: f32) -> EngineResult<()> {
        Self::check_pad(pad)?;
        let Some(buffer) = self.slots[pad].clone() else {
            return Err(EngineError::BufferNotLoaded(pad));
        };
        let len = buffer.length;
        let half = len / 2;
        let fade_in_n = ((fade_in_seconds.max(0.0) * SAMPLE_RATE as f32) as usize).min(half);
        let fade_out_n = ((fade_out_seconds.max(0.0) * SAMPLE_RATE as f32) as usize).min(half);

        let mut data = buffer.data.clone();
        for i in 0..fade_in_n {
            let t = i as f32 / fade_in_n as f32;
            data[i] = (data[i] as f32 * t) as i16;
        }
        for i in 0..fade_out_n {
            let t = 1.0 - (i as f32 / fade_out_n as f32);
            let idx = len - 1 - i;
            data[idx] = (data[idx] as f32 * t) as i16;
        }
        self.slots[pad] = Some(Arc::new(SampleData::new(data, buffer.name.clone())));
        Ok(())
    }

    /// Deterministic down-mix for visualization: never called from the audio
    /// path.
    pub fn waveform_peaks(&self, pad: usize, n_points: usize) -> EngineResult<Vec<(i16, i16)>> {
        Self::check_pad(pad)?;
        let Some(buffer) = self.slots[pad].clone() else {
            return Err(EngineError::BufferNotLoaded(pad));
        };
        let points = n_points.clamp(1, 200).min(buffer.length.max(1));
        let samples_per_point = (buffer.length / points).max(1);
        let mut peaks = Vec::with_capacity(points);
        for p in 0..points {
            let start = p * samples_per_point;
            let end = (start + samples_per_point).min(buffer.length);
            if start >= end {
                peaks.push((0, 0));
                continue;
            }
            let chunk = &buffer.data[start..end];
            let max = *chunk.iter().max().unwrap();
            let min = *chunk.iter().min().unwrap();
            peaks.push((max, min));
        }
        Ok(peaks)
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<i16> {
        (0..len).map(|i| (i as i16) * 10).collect()
    }

    #[test]
    fn load_then_unload_then_load_round_trips() {
        let mut store = SampleStore::new();
        store.load(0, ramp(100), "a").unwrap();
        store.unload(0).unwrap();
        store.load(0, ramp(100), "a").unwrap();
        assert_eq!(store.get(0).unwrap().length, 100);
    }

    #[test]
    fn unload_is_deferred_while_referenced() {
        let mut store = SampleStore::new();
        store.load(0, ramp(100), "a").unwrap();
        let held = store.get(0).unwrap();
        assert_eq!(store.unload(0), Err(EngineError::Busy(0)));
        assert!(store.get(0).is_none());
        assert!(store.poll_pending_unloads().is_empty());
        drop(held);
        assert_eq!(store.poll_pending_unloads(), vec![0]);
    }

    #[test]
    fn invalid_pad_is_rejected() {
        let mut store = SampleStore::new();
        assert_eq!(store.load(999, ramp(10), "x"), Err(EngineError::InvalidIndex("pad")));
    }

    #[test]
    fn trim_respects_minimum_length() {
        let mut store = SampleStore::new();
        store.load(0, ramp(1000), "a").unwrap();
        store.trim(0, 0.0, 0.01).unwrap();
        assert!(store.get(0).unwrap().length >= MIN_SAMPLE_FRAMES);
    }

    #[test]
    fn waveform_peaks_covers_full_range() {
        let mut store = SampleStore::new();
        store.load(0, ramp(200), "a").unwrap();
        let peaks = store.waveform_peaks(0, 20).unwrap();
        assert_eq!(peaks.len(), 20);
    }
}
