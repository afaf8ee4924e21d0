//! Tuner: turns incoming frequency samples into a note, a target and a
//! needle reading.
//!
//! The tuner has no timer. Its cadence is whatever the frequency source
//! delivers; [`Tuner::pump`] drains the samples that arrived since the last
//! call.

use super::{ModeController, ModeState, publish};
use crate::clock::Clock;
use crate::deviation::{Deviation, DeviationSettings, deviation};
use crate::error::ResourceError;
use crate::source::{FrequencySource, PitchSample};
use crate::sink::AudioSession;
use crate::tuning::{A4_HZ, Instrument, PitchClass, TuningProfile, nearest_note_with_reference};
use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use std::time::{Duration, Instant};

/// How the target frequency is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TuningMode {
    /// Target follows the detected note.
    #[default]
    Auto,
    /// Target is fixed to one string of the current profile.
    Manual { string_index: usize },
}

/// Everything the tuner displays for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TunerReading {
    /// Hz; zero when there is no signal.
    pub frequency: f64,
    pub note: Option<PitchClass>,
    pub target_frequency: f64,
    /// Profile string the target came from, if any.
    pub string_index: Option<usize>,
    pub deviation: Deviation,
}

impl TunerReading {
    pub fn no_signal(reference_hz: f64) -> Self {
        Self {
            frequency: 0.0,
            note: None,
            target_frequency: reference_hz,
            string_index: None,
            deviation: Deviation::NEUTRAL,
        }
    }

    pub fn has_signal(&self) -> bool {
        self.frequency > 0.0
    }
}

/// Changes the tuner reports to its listener.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TunerUpdate {
    Listening { simulated: bool },
    Stopped,
    Reading(TunerReading),
    InstrumentChanged(Instrument),
    ModeChanged(TuningMode),
    /// A resource failed and the tuner fell back; the text is user-facing.
    Degraded(String),
}

/// Chromatic tuner over a pluggable frequency source.
pub struct Tuner<C> {
    source: Box<dyn FrequencySource>,
    fallback: Option<Box<dyn FrequencySource>>,
    using_fallback: bool,
    samples: Option<Receiver<PitchSample>>,
    clock: C,
    instrument: Instrument,
    mode: TuningMode,
    settings: DeviationSettings,
    reference_hz: f64,
    signal_timeout: Duration,
    reading: TunerReading,
    last_sample_at: Option<Instant>,
    state: ModeState,
    error_message: Option<String>,
    listener: Option<Sender<TunerUpdate>>,
}

impl<C> std::fmt::Debug for Tuner<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tuner")
            .field("state", &self.state)
            .field("instrument", &self.instrument)
            .field("mode", &self.mode)
            .field("using_fallback", &self.using_fallback)
            .field("reading", &self.reading)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> Tuner<C> {
    pub fn new(source: Box<dyn FrequencySource>, clock: C, instrument: Instrument) -> Self {
        Self {
            source,
            fallback: None,
            using_fallback: false,
            samples: None,
            clock,
            instrument,
            mode: TuningMode::Auto,
            settings: DeviationSettings::default(),
            reference_hz: A4_HZ,
            signal_timeout: Duration::from_secs(1),
            reading: TunerReading::no_signal(A4_HZ),
            last_sample_at: None,
            state: ModeState::Idle,
            error_message: None,
            listener: None,
        }
    }

    /// Source to switch to when the primary one cannot start.
    pub fn with_fallback(mut self, fallback: Box<dyn FrequencySource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_settings(mut self, settings: DeviationSettings) -> Self {
        self.settings = settings.sanitized();
        self
    }

    /// A4 used for note names and as the target when nothing matches.
    pub fn with_reference(mut self, reference_hz: f64) -> Self {
        if reference_hz.is_finite() && reference_hz > 0.0 {
            self.reference_hz = reference_hz;
            self.reading = TunerReading::no_signal(reference_hz);
        }
        self
    }

    pub fn with_signal_timeout(mut self, timeout: Duration) -> Self {
        self.signal_timeout = timeout;
        self
    }

    pub fn set_listener(&mut self, listener: Sender<TunerUpdate>) {
        self.listener = Some(listener);
    }

    pub fn is_listening(&self) -> bool {
        self.state == ModeState::Active
    }

    /// True while running on the fallback source.
    pub fn is_simulated(&self) -> bool {
        self.using_fallback
    }

    pub fn reading(&self) -> &TunerReading {
        &self.reading
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    pub fn profile(&self) -> &'static TuningProfile {
        self.instrument.profile()
    }

    pub fn mode(&self) -> TuningMode {
        self.mode
    }

    pub fn settings(&self) -> &DeviationSettings {
        &self.settings
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Starts listening, falling back to the secondary source if needed.
    ///
    /// Only fails when neither source could start. A successful fallback
    /// is reported through [`Tuner::error_message`] instead.
    pub fn start(&mut self) -> Result<(), ResourceError> {
        if self.is_listening() {
            return Ok(());
        }
        let session = AudioSession::MEASUREMENT;
        let samples = match self.source.start(&session) {
            Ok(rx) => {
                self.using_fallback = false;
                self.error_message = None;
                rx
            }
            Err(e) => {
                log::warn!("frequency source failed: {e}");
                let message = e.user_message();
                self.error_message = Some(message.clone());
                let Some(fallback) = self.fallback.as_mut() else {
                    return Err(e);
                };
                let rx = fallback.start(&session)?;
                self.using_fallback = true;
                publish(&mut self.listener, TunerUpdate::Degraded(message));
                rx
            }
        };

        self.samples = Some(samples);
        self.state = ModeState::Active;
        self.last_sample_at = None;
        self.reading = TunerReading::no_signal(self.reference_hz);
        log::info!(
            "tuner listening for {} ({})",
            self.instrument,
            if self.using_fallback { "simulated" } else { "live" }
        );
        publish(
            &mut self.listener,
            TunerUpdate::Listening {
                simulated: self.using_fallback,
            },
        );
        Ok(())
    }

    /// Stops the active source. Samples still queued are discarded.
    pub fn stop(&mut self) {
        if !self.is_listening() {
            return;
        }
        if self.using_fallback {
            if let Some(fallback) = self.fallback.as_mut() {
                fallback.stop();
            }
        } else {
            self.source.stop();
        }
        self.samples = None;
        self.using_fallback = false;
        self.state = ModeState::Idle;
        self.reading = TunerReading::no_signal(self.reference_hz);
        log::info!("tuner stopped");
        publish(&mut self.listener, TunerUpdate::Stopped);
    }

    /// Handles every sample that arrived since the last call and expires a
    /// stale reading. Returns how many samples were handled.
    pub fn pump(&mut self) -> usize {
        let Some(samples) = &self.samples else {
            return 0;
        };
        let pending: Vec<PitchSample> = samples.try_iter().collect();
        let count = pending.len();
        for sample in pending {
            self.on_sample(sample);
        }

        if let Some(last) = self.last_sample_at {
            let age = self.clock.now().saturating_duration_since(last);
            if age > self.signal_timeout && self.reading.has_signal() {
                log::debug!("no sample for {age:?}, clearing reading");
                self.last_sample_at = None;
                self.set_reading(TunerReading::no_signal(self.reference_hz));
            }
        }
        count
    }

    /// Resolves one sample into a reading and publishes it.
    pub fn on_sample(&mut self, sample: PitchSample) {
        if !self.is_listening() {
            return;
        }
        self.last_sample_at = Some(sample.measured_at);
        let reading = self.evaluate(sample.frequency);
        log::trace!("{:.2} Hz -> {:?}", sample.frequency, reading.note);
        self.set_reading(reading);
    }

    /// Reading for `frequency` under the current instrument and mode.
    pub fn evaluate(&self, frequency: f64) -> TunerReading {
        let Some(note) = nearest_note_with_reference(frequency, self.reference_hz) else {
            return TunerReading::no_signal(self.reference_hz);
        };
        let profile = self.profile();
        let (string_index, target_frequency) = match self.mode {
            TuningMode::Auto => profile.target_for(note, frequency, self.reference_hz),
            TuningMode::Manual { string_index } => (
                Some(string_index),
                profile
                    .string(string_index)
                    .map_or(self.reference_hz, |s| s.target_frequency),
            ),
        };

        TunerReading {
            frequency,
            note: Some(note),
            target_frequency,
            string_index,
            deviation: deviation(frequency, target_frequency, &self.settings),
        }
    }

    /// Whether the current frequency is within tolerance of string `index`.
    pub fn string_in_tune(&self, index: usize) -> bool {
        let Some(string) = self.profile().string(index) else {
            return false;
        };
        self.reading.has_signal()
            && (self.reading.frequency - string.target_frequency).abs() < self.settings.tolerance_hz
    }

    /// Switches instrument. The tuning mode goes back to automatic.
    pub fn set_instrument(&mut self, instrument: Instrument) {
        if self.instrument == instrument {
            return;
        }
        self.instrument = instrument;
        self.mode = TuningMode::Auto;
        log::info!("tuner instrument set to {instrument}");
        publish(&mut self.listener, TunerUpdate::InstrumentChanged(instrument));
        self.reevaluate();
    }

    /// Fixes the target to one string. Selecting the same string again
    /// returns to automatic mode. Out-of-range indices are ignored.
    pub fn select_string(&mut self, index: usize) -> TuningMode {
        if index >= self.profile().len() {
            return self.mode;
        }
        let mode = match self.mode {
            TuningMode::Manual { string_index } if string_index == index => TuningMode::Auto,
            _ => TuningMode::Manual {
                string_index: index,
            },
        };
        self.set_mode(mode);
        mode
    }

    pub fn auto_mode(&mut self) {
        self.set_mode(TuningMode::Auto);
    }

    fn set_mode(&mut self, mode: TuningMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        publish(&mut self.listener, TunerUpdate::ModeChanged(mode));
        self.reevaluate();
    }

    fn reevaluate(&mut self) {
        if self.reading.has_signal() {
            let reading = self.evaluate(self.reading.frequency);
            self.set_reading(reading);
        }
    }

    fn set_reading(&mut self, reading: TunerReading) {
        self.reading = reading;
        publish(&mut self.listener, TunerUpdate::Reading(reading));
    }
}

impl<C: Clock> ModeController for Tuner<C> {
    fn name(&self) -> &'static str {
        "tuner"
    }

    fn state(&self) -> ModeState {
        self.state
    }

    fn toggle(&mut self) {
        if self.is_listening() {
            self.stop();
        } else if let Err(e) = self.start() {
            log::error!("tuner could not start: {e}");
        }
    }

    fn update(&mut self) {
        self.pump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::source::{ChannelSource, FrequencyFeed};
    use std::sync::Arc;

    #[derive(Debug)]
    struct DeniedSource;

    impl FrequencySource for DeniedSource {
        fn start(&mut self, _: &AudioSession) -> Result<Receiver<PitchSample>, ResourceError> {
            Err(ResourceError::InputUnavailable("permission denied".to_string()))
        }

        fn stop(&mut self) {}
    }

    fn tuner(instrument: Instrument) -> (Tuner<ManualClock>, FrequencyFeed, ManualClock) {
        let clock = ManualClock::new();
        let (source, feed) = ChannelSource::new(Arc::new(clock.clone()));
        let tuner = Tuner::new(Box::new(source), clock.clone(), instrument);
        (tuner, feed, clock)
    }

    #[test]
    fn reading_follows_detected_note() {
        let (mut t, feed, _clock) = tuner(Instrument::Guitar);
        t.start().unwrap();
        feed.push(196.5);
        assert_eq!(t.pump(), 1);

        let reading = t.reading();
        assert_eq!(reading.note, Some(PitchClass::G));
        assert_eq!(reading.target_frequency, 196.0);
        assert_eq!(reading.string_index, Some(2));
        assert!(reading.deviation.cents > 0.0);
        assert!(reading.deviation.in_tune);
    }

    #[test]
    fn unmatched_note_targets_the_reference() {
        let (mut t, feed, _clock) = tuner(Instrument::Bass);
        t.start().unwrap();
        feed.push(466.16);
        t.pump();
        assert_eq!(t.reading().note, Some(PitchClass::ASharp));
        assert_eq!(t.reading().target_frequency, 440.0);
        assert_eq!(t.reading().string_index, None);
    }

    #[test]
    fn zero_frequency_is_no_signal() {
        let (mut t, feed, _clock) = tuner(Instrument::Guitar);
        t.start().unwrap();
        feed.push(440.0);
        feed.push(0.0);
        assert_eq!(t.pump(), 2);
        assert!(!t.reading().has_signal());
        assert_eq!(t.reading().note, None);
        assert_eq!(t.reading().deviation, Deviation::NEUTRAL);
    }

    #[test]
    fn stale_reading_expires() {
        let (t, feed, clock) = tuner(Instrument::Guitar);
        let mut t = t.with_signal_timeout(Duration::from_millis(500));
        t.start().unwrap();
        feed.push(110.0);
        t.pump();
        assert!(t.reading().has_signal());

        clock.advance(Duration::from_millis(400));
        t.pump();
        assert!(t.reading().has_signal());

        clock.advance(Duration::from_millis(200));
        t.pump();
        assert!(!t.reading().has_signal());
    }

    #[test]
    fn manual_mode_pins_the_target() {
        let (mut t, feed, _clock) = tuner(Instrument::Guitar);
        t.start().unwrap();
        assert_eq!(t.select_string(5), TuningMode::Manual { string_index: 5 });
        feed.push(110.0);
        t.pump();
        assert_eq!(t.reading().note, Some(PitchClass::A));
        assert_eq!(t.reading().target_frequency, 82.41);
        assert_eq!(t.reading().deviation.needle_position, 100.0);

        // Selecting the same string again returns to auto.
        assert_eq!(t.select_string(5), TuningMode::Auto);
        assert_eq!(t.reading().target_frequency, 110.0);
    }

    #[test]
    fn out_of_range_string_is_ignored() {
        let (mut t, _feed, _clock) = tuner(Instrument::Bass);
        assert_eq!(t.select_string(4), TuningMode::Auto);
    }

    #[test]
    fn instrument_switch_resets_mode_and_retargets() {
        let (mut t, feed, _clock) = tuner(Instrument::Guitar);
        t.start().unwrap();
        t.select_string(0);
        feed.push(98.2);
        t.pump();
        t.set_instrument(Instrument::Bass);
        assert_eq!(t.mode(), TuningMode::Auto);
        assert_eq!(t.reading().target_frequency, 98.0);
        assert!(t.string_in_tune(0));
        assert!(!t.string_in_tune(1));
        assert!(!t.string_in_tune(9));
    }

    #[test]
    fn duplicate_e_strings_resolve_by_pitch() {
        let (mut t, feed, _clock) = tuner(Instrument::Guitar);
        t.start().unwrap();
        feed.push(82.0);
        t.pump();
        assert_eq!(t.reading().string_index, Some(5));
        assert!(t.string_in_tune(5));
        assert!(!t.string_in_tune(0));
    }

    #[test]
    fn samples_after_stop_are_dropped() {
        let (mut t, feed, _clock) = tuner(Instrument::Guitar);
        t.start().unwrap();
        t.stop();
        feed.push(329.6);
        assert_eq!(t.pump(), 0);
        assert!(!t.reading().has_signal());
    }

    #[test]
    fn denied_input_falls_back_to_simulation() {
        let clock = ManualClock::new();
        let (fallback, feed) = ChannelSource::new(Arc::new(clock.clone()));
        let mut t = Tuner::new(Box::new(DeniedSource), clock, Instrument::Guitar)
            .with_fallback(Box::new(fallback));
        let (tx, rx) = crossbeam_channel::unbounded();
        t.set_listener(tx);

        t.start().unwrap();
        assert!(t.is_listening());
        assert!(t.is_simulated());
        assert!(t.error_message().unwrap().contains("simulation"));

        feed.push(440.0);
        t.pump();
        assert_eq!(t.reading().note, Some(PitchClass::A));

        let updates: Vec<_> = rx.try_iter().collect();
        assert!(matches!(updates[0], TunerUpdate::Degraded(_)));
        assert_eq!(updates[1], TunerUpdate::Listening { simulated: true });
    }

    #[test]
    fn denied_input_without_fallback_stays_idle() {
        let mut t = Tuner::new(Box::new(DeniedSource), ManualClock::new(), Instrument::Guitar);
        assert!(t.start().is_err());
        assert!(!t.is_listening());
        assert!(t.error_message().is_some());
    }
}
