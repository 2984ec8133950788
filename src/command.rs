//! The narrow command/event surface the control task exposes to an outer
//! transport. Serialization is the transport's business; these types just
//! derive `Serialize`/`Deserialize` so one exists to hand it.

use serde::{Deserialize, Serialize};

use crate::effects::DistortionMode;
use crate::filter::FilterType;
use crate::sequencer::LoopType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    Start,
    Stop,
    SetTempo(f32),
    SelectPattern(usize),
    SetSongMode(bool, usize),
    SetHumanize(u32, u32),

    SetStep(usize, usize, usize, bool),
    SetStepVelocity(usize, usize, usize, u8),
    SetStepNoteLen(usize, usize, usize, u8),
    SetStepProbability(usize, usize, usize, u8),
    SetStepRatchet(usize, usize, usize, u8),
    SetStepVolumeLock(usize, usize, usize, bool, u16),
    SetStepCutoffLock(usize, usize, usize, bool, f32),
    SetStepReverbSendLock(usize, usize, usize, bool, u8),
    SetPatternBulk(usize, Box<[[bool; 16]; 16]>, Box<[[u8; 16]; 16]>),
    ClearPattern(usize),
    ClearTrack(usize),
    CopyPattern(usize, usize),

    MuteTrack(usize, bool),
    SetTrackVolume(usize, u16),
    SetMasterVolume(u16),
    SetSequencerVolume(u16),
    SetLiveVolume(u16),

    TriggerLive(usize, u8),
    TriggerSequencer(usize, u8, u16, usize),
    StopVoice(usize),
    StopAll,

    ToggleLoop(usize),
    SetLoopType(usize, LoopType),
    PauseLoop(usize),

    SetGlobalFilter(FilterType, f32, f32),
    SetGlobalDistortion(f32, DistortionMode),
    SetBitDepth(u8),
    SetSampleRate(u32),
    SetTrackFilter(usize, FilterType, f32, f32, f32),
    ClearTrackFilter(usize),
    SetPadFilter(usize, FilterType, f32, f32, f32),
    ClearPadFilter(usize),

    LoadSample(usize, Vec<i16>, String),
    UnloadSample(usize),
    UnloadAll,
    TrimSample(usize, f32, f32),
    ApplyFade(usize, f32, f32),
    RequestWaveformPeaks(usize, usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StepChange(usize),
    PatternChange(usize, usize),
    VoicesStatus(usize),
    WaveformPeaks(usize, Vec<(i16, i16)>),
    SampleUnloaded(usize),
}
