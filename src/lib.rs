//! Real-time step sequencer and sample-playback engine for a dual-core
//! drum machine: a polyphonic voice mixer with per-track/per-pad biquad
//! filtering and a master effect chain, a tempo-locked step sequencer with
//! probability/ratchet/humanize/parameter-lock/song-chaining, and the
//! two-task wiring that keeps the audio path free of anything that can
//! block or allocate.
//!
//! An outer transport — wifi/web, USB MIDI, SPI, whatever the embedding
//! application needs — sits outside this crate entirely; [`command::Command`]
//! and [`command::Event`] are the narrow, serializable surface it talks
//! through.

pub mod command;
pub mod config;
pub mod core;
pub mod cpal_sink;
pub mod effects;
pub mod error;
pub mod filter;
pub mod output;
pub mod runtime;
pub mod sample_store;
pub mod sequencer;
pub mod voice;

pub use command::{Command, Event};
pub use core::Core;
pub use error::{EngineError, EngineResult};
pub use runtime::{spawn_audio_task, ControlTask};
