//! # Beat Scheduler Module
//!
//! Drift-free beat timing for the metronome and the loop player.
//!
//! The scheduler never accumulates time per callback. Each start captures a
//! [`BeatClock`] (start instant plus tempo) and every later question, "how
//! many ticks are due?" or "where are we inside the beat?", is answered from
//! the time elapsed since that start. Tick `n` is due at
//! `start + n * beat_duration`, so a late timer callback only delays a tick,
//! it never shifts the ones after it.
//!
//! A tempo change while running throws the clock away and captures a new one
//! from `now`, rather than nudging the old one.
//!
//! The scheduler holds no timer of its own. Callers advance it with explicit
//! timestamps (see [`crate::pacemaker`] for the periodic driver).

use crate::tempo::Meter;
use std::time::{Duration, Instant};

/// How ticks group into measures and which of them are accented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatPattern {
    beats: u32,
    accent_first: bool,
}

impl BeatPattern {
    /// One unaccented beat per cycle: a loop that restarts every beat.
    pub const LOOP: BeatPattern = BeatPattern {
        beats: 1,
        accent_first: false,
    };

    /// Pattern of `beats` ticks per cycle. Zero is raised to one.
    pub fn new(beats: u32, accent_first: bool) -> Self {
        Self {
            beats: beats.max(1),
            accent_first,
        }
    }

    pub fn beats(&self) -> u32 {
        self.beats
    }

    pub fn accent_first(&self) -> bool {
        self.accent_first
    }

    /// Whether `beat` (0-based within the measure) gets the accent.
    pub fn is_accented(&self, beat: u32) -> bool {
        beat == 0 && self.accent_first
    }
}

impl From<Meter> for BeatPattern {
    fn from(meter: Meter) -> Self {
        BeatPattern::new(meter.beats_per_measure(), meter.accent_first_beat())
    }
}

/// Timing captured when playback starts. Never mutated; replaced on change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatClock {
    start: Instant,
    bpm: f64,
    beat_duration: f64,
}

impl BeatClock {
    /// Captures a clock at `start` for a tempo already clamped to a valid range.
    pub fn new(start: Instant, bpm: f64) -> Self {
        Self {
            start,
            bpm,
            beat_duration: 60.0 / bpm,
        }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Seconds per beat.
    pub fn beat_duration(&self) -> f64 {
        self.beat_duration
    }

    /// Beats elapsed since start, fractional.
    pub fn elapsed_beats(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.start).as_secs_f64() / self.beat_duration
    }

    /// Number of whole beats elapsed since start.
    pub fn due_ticks(&self, now: Instant) -> u64 {
        let beats = self.elapsed_beats(now);
        if beats.is_finite() { beats.floor() as u64 } else { 0 }
    }

    /// Fractional position inside the current beat, in `[0, 1)`.
    pub fn phase(&self, now: Instant) -> f64 {
        let phase = self.elapsed_beats(now).fract();
        if phase.is_finite() && (0.0..1.0).contains(&phase) {
            phase
        } else {
            0.0
        }
    }

    /// Offset from start at which tick `n` is due.
    pub fn nominal_offset(&self, n: u64) -> Duration {
        Duration::from_secs_f64(self.beat_duration * n as f64)
    }
}

/// Whether the scheduler has a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// One beat boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// 1-based count of ticks since the clock started.
    pub number: u64,
    /// Beat within the measure that this tick sounds, 0-based.
    pub beat: u32,
    pub accented: bool,
    /// When the tick was due, relative to the clock start.
    pub nominal_offset: Duration,
}

/// Something the scheduler tells its owner during [`BeatScheduler::advance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerEvent {
    Tick(Tick),
    /// Current phase in `[0, 1)`; emitted once per advance, after any ticks.
    Phase(f64),
}

/// Stopped/Running beat scheduler driven by explicit timestamps.
#[derive(Debug, Clone)]
pub struct BeatScheduler {
    pattern: BeatPattern,
    clock: Option<BeatClock>,
    ticks_emitted: u64,
    beat_index: u32,
}

impl BeatScheduler {
    pub fn new(pattern: BeatPattern) -> Self {
        Self {
            pattern,
            clock: None,
            ticks_emitted: 0,
            beat_index: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.clock.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_some()
    }

    pub fn clock(&self) -> Option<&BeatClock> {
        self.clock.as_ref()
    }

    pub fn pattern(&self) -> BeatPattern {
        self.pattern
    }

    /// Beat that the next tick will sound.
    pub fn beat_index(&self) -> u32 {
        self.beat_index
    }

    pub fn ticks_emitted(&self) -> u64 {
        self.ticks_emitted
    }

    /// Captures a fresh clock at `now`. Also used for a running tempo change.
    pub fn start(&mut self, now: Instant, bpm: f64) {
        self.clock = Some(BeatClock::new(now, bpm));
        self.ticks_emitted = 0;
        self.beat_index = 0;
        log::debug!("beat clock started at {bpm:.1} BPM");
    }

    /// Drops the clock. Nothing is due afterwards.
    pub fn stop(&mut self) {
        self.clock = None;
        self.ticks_emitted = 0;
        self.beat_index = 0;
    }

    /// Starts over from beat 0 at the current tempo. No-op when stopped.
    pub fn restart(&mut self, now: Instant) -> bool {
        match self.clock {
            Some(clock) => {
                self.start(now, clock.bpm());
                true
            }
            None => false,
        }
    }

    /// Rebuilds the clock at a new tempo if running. No-op when stopped.
    pub fn retempo(&mut self, now: Instant, bpm: f64) -> bool {
        if self.is_running() {
            self.start(now, bpm);
            true
        } else {
            false
        }
    }

    /// Replaces the beat pattern and resets the beat index.
    ///
    /// The clock is left alone; a running owner is expected to restart.
    pub fn set_pattern(&mut self, pattern: BeatPattern) {
        self.pattern = pattern;
        self.beat_index = 0;
    }

    /// Turns the downbeat accent on or off without disturbing the count.
    pub fn set_accent_first(&mut self, accent_first: bool) {
        self.pattern.accent_first = accent_first;
    }

    /// Phase inside the current beat; 0 when stopped.
    pub fn phase(&self, now: Instant) -> f64 {
        self.clock.map_or(0.0, |clock| clock.phase(now))
    }

    /// Emits every tick that has become due since the last call, then the
    /// current phase.
    ///
    /// # Arguments
    /// * `now` - Current time from the controller's clock
    ///
    /// # Returns
    /// The missed ticks in order followed by one phase event, or nothing
    /// while stopped.
    pub fn advance(&mut self, now: Instant) -> Vec<SchedulerEvent> {
        let Some(clock) = self.clock else {
            return Vec::new();
        };

        let due = clock.due_ticks(now);
        let mut events = Vec::with_capacity((due.saturating_sub(self.ticks_emitted)) as usize + 1);
        while self.ticks_emitted < due {
            self.ticks_emitted += 1;
            let beat = self.beat_index;
            events.push(SchedulerEvent::Tick(Tick {
                number: self.ticks_emitted,
                beat,
                accented: self.pattern.is_accented(beat),
                nominal_offset: clock.nominal_offset(self.ticks_emitted),
            }));
            self.beat_index = (beat + 1) % self.pattern.beats();
        }
        events.push(SchedulerEvent::Phase(clock.phase(now)));
        events
    }
}

/// Sink playback rate for `bpm` against material authored at `reference_bpm`.
pub fn playback_rate(bpm: f64, reference_bpm: f64) -> f64 {
    if reference_bpm.is_finite() && reference_bpm > 0.0 {
        bpm / reference_bpm
    } else {
        1.0
    }
}
