//! Metronome: one click per beat, accented on the downbeat.

use super::{ModeController, ModeState, publish};
use crate::clock::Clock;
use crate::scheduler::{BeatScheduler, SchedulerEvent, playback_rate};
use crate::sink::{AudioSession, AudioSink, SampleId};
use crate::tempo::{DEFAULT_BPM, Meter, Tempo};
use crossbeam_channel::Sender;
use serde::Serialize;

/// Changes the metronome reports to its listener.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum MetronomeUpdate {
    Started { bpm: f64 },
    Stopped,
    Beat { beat: u32, accented: bool },
    Progress(f64),
    TempoChanged(f64),
    MeterChanged { beats_per_measure: u32, accent_first_beat: bool },
}

/// Tempo the click samples are authored at.
const CLICK_REFERENCE_BPM: f64 = DEFAULT_BPM;

/// Clicks a sink in time with a tempo and meter.
#[derive(Debug)]
pub struct Metronome<S, C> {
    sink: S,
    clock: C,
    tempo: Tempo,
    meter: Meter,
    scheduler: BeatScheduler,
    state: ModeState,
    progress: f64,
    error_message: Option<String>,
    listener: Option<Sender<MetronomeUpdate>>,
}

impl<S: AudioSink, C: Clock> Metronome<S, C> {
    pub fn new(sink: S, clock: C, tempo: Tempo, meter: Meter) -> Self {
        Self {
            sink,
            clock,
            tempo,
            meter,
            scheduler: BeatScheduler::new(meter.into()),
            state: ModeState::Idle,
            progress: 0.0,
            error_message: None,
            listener: None,
        }
    }

    pub fn set_listener(&mut self, listener: Sender<MetronomeUpdate>) {
        self.listener = Some(listener);
    }

    pub fn is_playing(&self) -> bool {
        self.state == ModeState::Active
    }

    pub fn bpm(&self) -> f64 {
        self.tempo.bpm()
    }

    pub fn meter(&self) -> Meter {
        self.meter
    }

    /// Beat the next click will sound, 0-based.
    pub fn beat_number(&self) -> u32 {
        self.scheduler.beat_index()
    }

    /// Position inside the current beat, `[0, 1)`.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn start(&mut self) {
        if self.is_playing() {
            return;
        }
        if let Err(e) = self.sink.activate(&AudioSession::PLAYBACK) {
            log::warn!("metronome continuing without sound: {e}");
            self.error_message = Some(e.user_message());
        }
        self.issue_rate();
        self.state = ModeState::Active;
        self.progress = 0.0;
        self.scheduler.start(self.clock.now(), self.tempo.bpm());
        log::info!(
            "metronome started at {:.0} BPM, {} beats per measure",
            self.tempo.bpm(),
            self.meter.beats_per_measure()
        );
        publish(
            &mut self.listener,
            MetronomeUpdate::Started {
                bpm: self.tempo.bpm(),
            },
        );
    }

    /// Stops clicking. Returns with nothing left due.
    pub fn stop(&mut self) {
        if !self.is_playing() {
            return;
        }
        self.scheduler.stop();
        self.state = ModeState::Idle;
        self.progress = 0.0;
        log::info!("metronome stopped");
        publish(&mut self.listener, MetronomeUpdate::Stopped);
    }

    /// Starts over from the downbeat. No-op when stopped.
    pub fn restart(&mut self) {
        if self.scheduler.restart(self.clock.now()) {
            self.progress = 0.0;
        }
    }

    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        let stored = self.tempo.set_bpm(bpm);
        self.retempo();
        stored
    }

    pub fn increment(&mut self) -> f64 {
        self.tempo.increment();
        self.retempo();
        self.tempo.bpm()
    }

    pub fn decrement(&mut self) -> f64 {
        self.tempo.decrement();
        self.retempo();
        self.tempo.bpm()
    }

    /// Changes the measure length. The count restarts from the downbeat.
    pub fn set_beats_per_measure(&mut self, beats: i64) -> u32 {
        let stored = self.meter.set_beats_per_measure(beats);
        self.scheduler.set_pattern(self.meter.into());
        self.restart();
        self.publish_meter();
        stored
    }

    pub fn set_accent_first_beat(&mut self, accent: bool) {
        self.meter.set_accent_first_beat(accent);
        self.scheduler.set_accent_first(accent);
        self.publish_meter();
    }

    fn retempo(&mut self) {
        let bpm = self.tempo.bpm();
        if self.scheduler.retempo(self.clock.now(), bpm) {
            self.progress = 0.0;
            self.issue_rate();
        }
        publish(&mut self.listener, MetronomeUpdate::TempoChanged(bpm));
    }

    fn issue_rate(&mut self) {
        self.sink
            .set_playback_rate(playback_rate(self.tempo.bpm(), CLICK_REFERENCE_BPM));
    }

    fn publish_meter(&mut self) {
        publish(
            &mut self.listener,
            MetronomeUpdate::MeterChanged {
                beats_per_measure: self.meter.beats_per_measure(),
                accent_first_beat: self.meter.accent_first_beat(),
            },
        );
    }
}

impl<S: AudioSink, C: Clock> ModeController for Metronome<S, C> {
    fn name(&self) -> &'static str {
        "metronome"
    }

    fn state(&self) -> ModeState {
        self.state
    }

    fn toggle(&mut self) {
        if self.is_playing() {
            self.stop();
        } else {
            self.start();
        }
    }

    fn update(&mut self) {
        if !self.is_playing() {
            return;
        }
        for event in self.scheduler.advance(self.clock.now()) {
            match event {
                SchedulerEvent::Tick(tick) => {
                    let sample = if tick.accented {
                        SampleId::AccentClick
                    } else {
                        SampleId::Click
                    };
                    self.sink.play_one_shot(sample);
                    log::trace!("tick {} (beat {})", tick.number, tick.beat);
                    publish(
                        &mut self.listener,
                        MetronomeUpdate::Beat {
                            beat: tick.beat,
                            accented: tick.accented,
                        },
                    );
                }
                SchedulerEvent::Phase(phase) => {
                    self.progress = phase;
                    publish(&mut self.listener, MetronomeUpdate::Progress(phase));
                }
            }
        }
    }
}
