//! Loop player: plays authored loop material at a user-chosen tempo.
//!
//! The sink does the actual playback; this controller keeps its rate at
//! `bpm / base_bpm` and runs a one-beat-per-cycle scheduler so front ends
//! can draw progress through the loop.

use super::{ModeController, ModeState, publish};
use crate::clock::Clock;
use crate::scheduler::{BeatPattern, BeatScheduler, SchedulerEvent, playback_rate};
use crate::sink::{AudioSession, AudioSink};
use crate::tempo::{DEFAULT_BPM, Tempo};
use crossbeam_channel::Sender;
use serde::Serialize;
use std::time::Duration;

/// Loop material and the tempo it was recorded at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioLoop {
    pub name: String,
    pub base_bpm: f64,
}

impl Default for AudioLoop {
    fn default() -> Self {
        Self {
            name: "La Bourtsadoros".to_string(),
            base_bpm: DEFAULT_BPM,
        }
    }
}

/// Changes the loop player reports to its listener.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum LoopUpdate {
    Playing,
    Paused,
    Restarted,
    Progress(f64),
    /// A full pass through the loop completed; count since playback started.
    Cycle(u64),
    TempoChanged { bpm: f64, rate: f64 },
    VolumeChanged(f64),
}

/// Tempo-locked loop playback.
#[derive(Debug)]
pub struct LoopPlayer<S, C> {
    sink: S,
    clock: C,
    tempo: Tempo,
    audio_loop: AudioLoop,
    scheduler: BeatScheduler,
    state: ModeState,
    progress: f64,
    cycles: u64,
    volume: f64,
    error_message: Option<String>,
    listener: Option<Sender<LoopUpdate>>,
}

impl<S: AudioSink, C: Clock> LoopPlayer<S, C> {
    /// Prepares the sink at the right rate and full volume, paused.
    pub fn new(mut sink: S, clock: C, tempo: Tempo, audio_loop: AudioLoop) -> Self {
        sink.set_playback_rate(playback_rate(tempo.bpm(), audio_loop.base_bpm));
        sink.set_volume(1.0);
        Self {
            sink,
            clock,
            tempo,
            audio_loop,
            scheduler: BeatScheduler::new(BeatPattern::LOOP),
            state: ModeState::Idle,
            progress: 0.0,
            cycles: 0,
            volume: 1.0,
            error_message: None,
            listener: None,
        }
    }

    pub fn set_listener(&mut self, listener: Sender<LoopUpdate>) {
        self.listener = Some(listener);
    }

    pub fn is_playing(&self) -> bool {
        self.state == ModeState::Active
    }

    pub fn bpm(&self) -> f64 {
        self.tempo.bpm()
    }

    pub fn audio_loop(&self) -> &AudioLoop {
        &self.audio_loop
    }

    /// Current sink rate relative to the authored tempo.
    pub fn rate(&self) -> f64 {
        playback_rate(self.tempo.bpm(), self.audio_loop.base_bpm)
    }

    /// Position inside the current loop cycle, `[0, 1)`.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.volume == 0.0
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn play(&mut self) {
        if self.is_playing() {
            return;
        }
        if let Err(e) = self.sink.activate(&AudioSession::PLAYBACK) {
            log::warn!("loop player continuing without sound: {e}");
            self.error_message = Some(e.user_message());
        }
        self.sink.set_playback_rate(self.rate());
        self.sink.play();
        self.scheduler.start(self.clock.now(), self.tempo.bpm());
        self.state = ModeState::Active;
        self.progress = 0.0;
        self.cycles = 0;
        log::info!(
            "playing '{}' at {:.0} BPM (rate {:.3})",
            self.audio_loop.name,
            self.tempo.bpm(),
            self.rate()
        );
        publish(&mut self.listener, LoopUpdate::Playing);
    }

    /// Pauses the sink and drops the scheduler.
    pub fn pause(&mut self) {
        if !self.is_playing() {
            return;
        }
        self.sink.pause();
        self.scheduler.stop();
        self.state = ModeState::Idle;
        self.progress = 0.0;
        log::info!("loop paused");
        publish(&mut self.listener, LoopUpdate::Paused);
    }

    /// Rewinds to the start of the loop. Calling it twice is the same as once.
    pub fn restart(&mut self) {
        self.sink.seek(Duration::ZERO);
        self.scheduler.restart(self.clock.now());
        self.progress = 0.0;
        self.cycles = 0;
        publish(&mut self.listener, LoopUpdate::Restarted);
    }

    /// Sets the tempo and re-issues the sink rate, playing or not.
    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        let stored = self.tempo.set_bpm(bpm);
        self.apply_tempo();
        stored
    }

    pub fn increment(&mut self) -> f64 {
        self.tempo.increment();
        self.apply_tempo();
        self.tempo.bpm()
    }

    pub fn decrement(&mut self) -> f64 {
        self.tempo.decrement();
        self.apply_tempo();
        self.tempo.bpm()
    }

    /// Flips between silent and full volume.
    pub fn toggle_mute(&mut self) -> bool {
        self.volume = if self.is_muted() { 1.0 } else { 0.0 };
        self.sink.set_volume(self.volume);
        publish(&mut self.listener, LoopUpdate::VolumeChanged(self.volume));
        self.is_muted()
    }

    fn apply_tempo(&mut self) {
        let bpm = self.tempo.bpm();
        let rate = self.rate();
        self.sink.set_playback_rate(rate);
        if self.scheduler.retempo(self.clock.now(), bpm) {
            self.progress = 0.0;
        }
        log::debug!("loop tempo {bpm:.0} BPM, rate {rate:.3}");
        publish(&mut self.listener, LoopUpdate::TempoChanged { bpm, rate });
    }
}

impl<S: AudioSink, C: Clock> ModeController for LoopPlayer<S, C> {
    fn name(&self) -> &'static str {
        "loop-player"
    }

    fn state(&self) -> ModeState {
        self.state
    }

    fn toggle(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    fn update(&mut self) {
        if !self.is_playing() {
            return;
        }
        for event in self.scheduler.advance(self.clock.now()) {
            match event {
                SchedulerEvent::Tick(tick) => {
                    self.cycles = tick.number;
                    publish(&mut self.listener, LoopUpdate::Cycle(tick.number));
                }
                SchedulerEvent::Phase(phase) => {
                    self.progress = phase;
                    publish(&mut self.listener, LoopUpdate::Progress(phase));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::controller::testing::{RecordingSink, SinkCommand};

    fn player(bpm: f64) -> (LoopPlayer<RecordingSink, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let p = LoopPlayer::new(
            RecordingSink::default(),
            clock.clone(),
            Tempo::new(bpm),
            AudioLoop::default(),
        );
        (p, clock)
    }

    #[test]
    fn bpm_is_clamped() {
        let (mut p, _clock) = player(120.0);
        assert_eq!(p.set_bpm(500.0), 240.0);
        assert_eq!(p.bpm(), 240.0);
        assert_eq!(p.set_bpm(20.0), 40.0);
        assert_eq!(p.bpm(), 40.0);
    }

    #[test]
    fn play_pause_toggle() {
        let (mut p, _clock) = player(120.0);
        assert!(!p.is_playing());
        p.toggle();
        assert!(p.is_playing());
        p.toggle();
        assert!(!p.is_playing());

        let commands = p.sink().commands();
        assert!(commands.contains(&SinkCommand::Play));
        assert_eq!(commands.last(), Some(&SinkCommand::Pause));
    }

    #[test]
    fn rate_follows_tempo_even_while_paused() {
        let (mut p, _clock) = player(120.0);
        assert_eq!(p.sink().commands()[0], SinkCommand::Rate(1.0));
        p.set_bpm(90.0);
        assert_eq!(p.rate(), 0.75);
        assert_eq!(p.sink().commands().last(), Some(&SinkCommand::Rate(0.75)));
        assert!(!p.is_playing());
    }

    #[test]
    fn rate_uses_the_loop_base_tempo() {
        let clock = ManualClock::new();
        let mut p = LoopPlayer::new(
            RecordingSink::default(),
            clock,
            Tempo::new(100.0),
            AudioLoop {
                name: "slow groove".to_string(),
                base_bpm: 80.0,
            },
        );
        assert_eq!(p.rate(), 1.25);
        p.increment();
        assert_eq!(p.sink().commands().last(), Some(&SinkCommand::Rate(101.0 / 80.0)));
    }

    #[test]
    fn progress_tracks_loop_cycle() {
        let (mut p, clock) = player(60.0);
        p.play();
        clock.advance(Duration::from_millis(2_500));
        p.update();
        assert_eq!(p.cycles(), 2);
        assert!((p.progress() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn tempo_change_while_playing_rebuilds_the_clock() {
        let (mut p, clock) = player(60.0);
        p.play();
        clock.advance(Duration::from_millis(700));
        p.update();
        p.set_bpm(120.0);
        assert_eq!(p.progress(), 0.0);
        clock.advance(Duration::from_millis(250));
        p.update();
        assert!((p.progress() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn restart_is_idempotent() {
        let (mut p, clock) = player(100.0);
        p.play();
        clock.advance(Duration::from_millis(900));
        p.update();

        p.restart();
        let once = (p.progress(), p.cycles());
        p.restart();
        assert_eq!((p.progress(), p.cycles()), once);
        assert_eq!(once, (0.0, 0));

        let seeks = p
            .sink()
            .commands()
            .into_iter()
            .filter(|c| *c == SinkCommand::Seek(Duration::ZERO))
            .count();
        assert_eq!(seeks, 2);

        p.update();
        assert_eq!(p.progress(), 0.0);
    }

    #[test]
    fn pause_resets_progress_and_stops_updates() {
        let (mut p, clock) = player(60.0);
        p.play();
        clock.advance(Duration::from_millis(400));
        p.update();
        p.pause();
        assert_eq!(p.progress(), 0.0);
        clock.advance(Duration::from_millis(400));
        p.update();
        assert_eq!(p.progress(), 0.0);
    }

    #[test]
    fn mute_toggles_volume() {
        let (mut p, _clock) = player(120.0);
        assert!(p.toggle_mute());
        assert_eq!(p.sink().commands().last(), Some(&SinkCommand::Volume(0.0)));
        assert!(!p.toggle_mute());
        assert_eq!(p.volume(), 1.0);
    }
}
