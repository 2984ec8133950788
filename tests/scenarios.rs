//! Cross-component scenarios driven entirely through [`Core`] and the
//! public `Command`/`Event` surface — no direct access to `Sequencer` or
//! `VoiceMixer` internals. These complement the narrower, component-local
//! unit tests living next to each module.

use std::time::{Duration, Instant};

use octastep::command::{Command, Event};
use octastep::core::Core;
use octastep::output::{AudioLoopState, RecordingSink};
use octastep::sequencer::LoopType;

fn sine(len: usize) -> Vec<i16> {
    (0..len).map(|i| ((i as f32 * 0.25).sin() * 12_000.0) as i16).collect()
}

fn advance(core: &mut Core, now: &mut Instant, step_us: u64, steps: usize) -> Vec<Event> {
    let mut events = Vec::new();
    for _ in 0..steps {
        *now += Duration::from_micros(step_us + 1);
        events.extend(core.tick(*now));
    }
    events
}

/// Scenario 1: a short sample triggered live decays to silence with no
/// leftover voices and without ever touching `unload`.
#[test]
fn basic_trigger_decays_to_silence() {
    let mut core = Core::with_seed(1);
    core.apply_command(Command::LoadSample(0, sine(4_410), "kick".into())).unwrap();
    core.apply_command(Command::TriggerLive(0, 127)).unwrap();
    assert_eq!(core.voices().active_count(), 1);

    let mut loop_state = AudioLoopState::without_publish();
    let mut sink = RecordingSink::default();
    for _ in 0..40 {
        core.audio.process_block(&mut loop_state, &mut sink).unwrap();
    }
    assert_eq!(core.voices().active_count(), 0);
}

/// Scenario 2: stealing the pool keeps it full and restarts the stolen
/// voice, all driven through `TriggerLive` commands rather than calling
/// the voice mixer directly.
#[test]
fn voice_stealing_keeps_pool_full() {
    let mut core = Core::with_seed(2);
    core.apply_command(Command::LoadSample(0, sine(200_000), "loop".into())).unwrap();
    for _ in 0..10 {
        core.apply_command(Command::TriggerLive(0, 100)).unwrap();
    }
    assert_eq!(core.voices().active_count(), 10);

    core.apply_command(Command::TriggerLive(0, 100)).unwrap();
    assert_eq!(core.voices().active_count(), 10);
}

/// Scenario 3: a ratcheted, probability-100 cell fires exactly `ratchet`
/// triggers, observed here as `VoicesStatus` growth rather than a raw
/// trigger count, since `Core::tick` only forwards sequencer-observer
/// events, and each ratchet sub-hit steals/allocates a voice.
#[test]
fn ratchet_cell_fires_voices_for_every_sub_hit() {
    let mut core = Core::with_seed(3);
    core.apply_command(Command::LoadSample(3, sine(4_410), "snare".into())).unwrap();
    core.apply_command(Command::SetStep(0, 3, 4, true)).unwrap();
    core.apply_command(Command::SetStepRatchet(0, 3, 4, 4)).unwrap();
    core.apply_command(Command::SetStepProbability(0, 3, 4, 100)).unwrap();
    core.apply_command(Command::SetStepNoteLen(0, 3, 4, 2)).unwrap();
    core.apply_command(Command::SetTempo(120.0)).unwrap();
    core.apply_command(Command::SelectPattern(0)).unwrap();
    core.apply_command(Command::Start).unwrap();

    let mut now = Instant::now();
    core.tick(now);
    let step_us = (60.0 / 120.0 / 4.0 * 1_000_000.0) as u64;

    // Each tick processes the *current* step before advancing, so reaching
    // step 4's dispatch takes 5 ticks (steps 0,1,2,3 dispatch-and-advance,
    // the 5th dispatches step 4 itself).
    let events = advance(&mut core, &mut now, step_us, 5);
    let active_before = events
        .iter()
        .filter_map(|e| if let Event::VoicesStatus(n) = e { Some(*n) } else { None })
        .last()
        .unwrap();

    assert_eq!(active_before, 4, "ratchet=4 should allocate 4 voices on its step");
}

/// Scenario 5: song-chaining advances pattern at steps 16, 32, wrapping to
/// pattern 0 at 48, matching the configured song length.
#[test]
fn song_mode_advances_and_wraps() {
    let mut core = Core::with_seed(5);
    core.apply_command(Command::SetTempo(120.0)).unwrap();
    core.apply_command(Command::SetSongMode(true, 3)).unwrap();
    core.apply_command(Command::SetStep(0, 0, 0, true)).unwrap();
    core.apply_command(Command::Start).unwrap();

    let mut now = Instant::now();
    core.tick(now);
    let step_us = (60.0 / 120.0 / 4.0 * 1_000_000.0) as u64;
    let events = advance(&mut core, &mut now, step_us, 48);

    let pattern_changes: Vec<(usize, usize)> = events
        .into_iter()
        .filter_map(|e| if let Event::PatternChange(p, len) = e { Some((p, len)) } else { None })
        .collect();
    assert_eq!(pattern_changes, vec![(1, 3), (2, 3), (0, 3)]);
}

/// Scenario 6: a live pad's loop toggles on, fires on the configured
/// subdivision, and a pause/resume pair silences then restores emission.
#[test]
fn live_pad_loop_toggle_and_pause_resume() {
    let mut core = Core::with_seed(6);
    core.apply_command(Command::LoadSample(18, sine(4_410), "hat".into())).unwrap();
    core.apply_command(Command::SetTempo(120.0)).unwrap();
    core.apply_command(Command::SetLoopType(18, LoopType::EveryBeat)).unwrap();
    core.apply_command(Command::ToggleLoop(18)).unwrap();
    core.apply_command(Command::Start).unwrap();

    let mut now = Instant::now();
    core.tick(now);
    let step_us = (60.0 / 120.0 / 4.0 * 1_000_000.0) as u64;

    let before = core.voices().active_count();
    advance(&mut core, &mut now, step_us, 1);
    assert!(core.voices().active_count() >= before, "EveryBeat should fire on step 0");

    core.apply_command(Command::PauseLoop(18)).unwrap();
    let paused_count = core.voices().active_count();
    advance(&mut core, &mut now, step_us, 16);
    assert_eq!(core.voices().active_count(), paused_count, "paused loop emits no further triggers");

    core.apply_command(Command::PauseLoop(18)).unwrap();
    advance(&mut core, &mut now, step_us, 4);
    assert!(core.voices().active_count() >= paused_count, "second PauseLoop resumes emission");
}

/// Round-trip properties from the testable-properties section: `SetStep`
/// toggles cleanly, and `CopyPattern` makes every per-step field at the
/// destination equal to the source.
#[test]
fn set_step_and_copy_pattern_round_trip() {
    let mut core = Core::with_seed(7);
    core.apply_command(Command::SetStep(0, 2, 5, true)).unwrap();
    assert!(core.sequencer.pattern().get(0, 2, 5).on);
    core.apply_command(Command::SetStep(0, 2, 5, false)).unwrap();
    assert!(!core.sequencer.pattern().get(0, 2, 5).on);

    core.apply_command(Command::SetStep(0, 2, 5, true)).unwrap();
    core.apply_command(Command::SetStepVelocity(0, 2, 5, 99)).unwrap();
    core.apply_command(Command::SetStepRatchet(0, 2, 5, 3)).unwrap();
    core.apply_command(Command::CopyPattern(0, 1)).unwrap();

    let src = core.sequencer.pattern().get(0, 2, 5);
    let dst = core.sequencer.pattern().get(1, 2, 5);
    assert_eq!(src.on, dst.on);
    assert_eq!(src.velocity, dst.velocity);
    assert_eq!(src.ratchet, dst.ratchet);
}

/// `LoadSample(p, X); UnloadSample(p); LoadSample(p, X)` leaves pad `p`
/// with an identical buffer, and triggering it still works afterward.
#[test]
fn reload_after_unload_restores_playable_buffer() {
    let mut core = Core::with_seed(8);
    let pcm = sine(2_000);
    core.apply_command(Command::LoadSample(0, pcm.clone(), "tom".into())).unwrap();
    core.apply_command(Command::UnloadSample(0)).unwrap();
    core.apply_command(Command::LoadSample(0, pcm, "tom".into())).unwrap();

    core.apply_command(Command::TriggerLive(0, 127)).unwrap();
    assert_eq!(core.voices().active_count(), 1);
}
