//! Two-thread wiring: an audio task pinned to its own OS thread at elevated
//! priority, and a control task that owns [`Core`] and drains the external
//! command intake at its own, much slower, cadence.
//!
//! Nothing here is itself real-time — it is the glue that gets a real
//! [`AudioSink`] onto a dedicated thread and keeps [`Core::tick`] running.
//! An outer transport (not part of this crate) owns the `crossbeam_channel`
//! senders/receivers and decides how `Command`/`Event` values reach it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use thread_priority::{set_current_thread_priority, ThreadPriority};
use triple_buffer::{Output, TripleBuffer};

use crate::command::{Command, Event};
use crate::core::Core;
use crate::output::{AudioEngine, AudioLoopState, AudioSink, CaptureSnapshot};

/// How often the control task polls its command queue and ticks the
/// sequencer. 500 Hz matches the cadence `SPEC_FULL.md` names for transport
/// timing precision; far above it buys nothing since the sequencer itself
/// only resolves to microsecond step intervals on top of this loop.
const CONTROL_TASK_HZ: u64 = 500;

/// Spawns the audio task and returns a handle, the shared [`AudioEngine`]
/// the control task should hand to its [`Core`], and the consumer half of
/// the capture-ring snapshot publisher — the non-real-time visualization
/// reader's connection into the audio thread. `build_sink` runs on the new
/// thread, after priority elevation, so platform audio APIs that pin a
/// stream to its constructing thread (as `cpal` does) behave correctly.
pub fn spawn_audio_task<S, F>(build_sink: F) -> (JoinHandle<()>, Arc<AudioEngine>, Output<CaptureSnapshot>)
where
    S: AudioSink + 'static,
    F: FnOnce() -> S + Send + 'static,
{
    let audio = Arc::new(AudioEngine::new());
    let audio_for_thread = audio.clone();
    let (capture_input, capture_output) = TripleBuffer::new(&CaptureSnapshot::default()).split();

    let handle = thread::Builder::new()
        .name("octastep-audio".into())
        .spawn(move || {
            if let Err(e) = set_current_thread_priority(ThreadPriority::Max) {
                log::warn!("failed to raise audio thread priority: {e:?}");
            }
            let mut sink = build_sink();
            let mut loop_state = AudioLoopState::new(capture_input);
            loop {
                if let Err(e) = audio_for_thread.process_block(&mut loop_state, &mut sink) {
                    log::error!("audio block failed: {e}");
                }
            }
        })
        .expect("failed to spawn audio thread");

    (handle, audio, capture_output)
}

/// Owns [`Core`] and the external command/event channel ends. Call
/// [`ControlTask::run_once`] in a loop (or [`ControlTask::run`] to own the
/// loop outright) at roughly [`CONTROL_TASK_HZ`].
pub struct ControlTask {
    pub core: Core,
    commands_in: Receiver<Command>,
    events_out: Sender<Event>,
}

impl ControlTask {
    pub fn new(audio: Arc<AudioEngine>, commands_in: Receiver<Command>, events_out: Sender<Event>) -> Self {
        Self { core: Core::with_audio(audio), commands_in, events_out }
    }

    /// Drains every currently-queued command, applies it to `core`, ticks the
    /// sequencer once, and forwards every resulting event. Never blocks: a
    /// closed event channel just means nobody is listening, which is not
    /// this task's problem to raise.
    pub fn run_once(&mut self, now: Instant) {
        while let Ok(command) = self.commands_in.try_recv() {
            match self.core.apply_command(command) {
                Ok(Some(event)) => {
                    let _ = self.events_out.try_send(event);
                }
                Ok(None) => {}
                Err(e) => log::warn!("command rejected: {e}"),
            }
        }

        for event in self.core.tick(now) {
            let _ = self.events_out.try_send(event);
        }
    }

    /// Runs [`Self::run_once`] forever at [`CONTROL_TASK_HZ`]. Intended for a
    /// dedicated control thread; an embedding application that already has
    /// its own scheduling loop should call `run_once` directly instead.
    pub fn run(mut self) -> ! {
        let period = Duration::from_micros(1_000_000 / CONTROL_TASK_HZ);
        loop {
            let tick_start = Instant::now();
            self.run_once(tick_start);
            let elapsed = tick_start.elapsed();
            if elapsed < period {
                thread::sleep(period - elapsed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RecordingSink;

    #[test]
    fn run_once_drains_queued_commands_and_emits_events() {
        let audio = Arc::new(AudioEngine::new());
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (evt_tx, evt_rx) = crossbeam_channel::unbounded();
        let mut task = ControlTask::new(audio, cmd_rx, evt_tx);

        cmd_tx.send(Command::LoadSample(0, vec![1000; 4410], "tone".into())).unwrap();
        cmd_tx.send(Command::TriggerLive(0, 127)).unwrap();
        task.run_once(Instant::now());

        assert_eq!(task.core.voices().active_count(), 1);
        let events: Vec<_> = evt_rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, Event::VoicesStatus(1))));
    }

    #[test]
    fn audio_engine_shared_via_arc_accepts_triggers_from_another_thread() {
        // Exercises the same sharing pattern `spawn_audio_task` relies on —
        // one side triggers through the Arc, the other drives process_block —
        // without actually leaving a thread spinning past the test.
        let audio = Arc::new(AudioEngine::new());
        let trigger_side = audio.clone();
        let sample = Arc::new(crate::sample_store::SampleData::new(vec![5000; 1000], "x"));
        let joined = thread::spawn(move || trigger_side.voices.trigger_live(0, sample, 127, 100));
        joined.join().unwrap();

        let mut loop_state = AudioLoopState::without_publish();
        let mut sink = RecordingSink::default();
        for _ in 0..20 {
            audio.process_block(&mut loop_state, &mut sink).unwrap();
        }
        assert!(audio.voices.active_count() <= 1);
    }
}
