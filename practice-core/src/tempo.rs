//! # Tempo Module
//!
//! Tempo and meter values with clamp-on-write setters.
//!
//! Out-of-range input is never an error here: the UI contract is that every
//! value the user can reach produces a playable state, so setters clamp and
//! report what they actually stored. Neither type knows anything about
//! playback; controllers rebuild their scheduler after a change.

use serde::{Deserialize, Serialize};

/// Slowest supported tempo in beats per minute.
pub const MIN_BPM: f64 = 40.0;
/// Fastest supported tempo in beats per minute.
pub const MAX_BPM: f64 = 240.0;
/// Tempo used when nothing else is configured.
pub const DEFAULT_BPM: f64 = 120.0;
/// Amount `increment`/`decrement` move the tempo by.
pub const BPM_STEP: f64 = 1.0;

/// Fewest beats a measure may have.
pub const MIN_BEATS_PER_MEASURE: u32 = 2;
/// Most beats a measure may have.
pub const MAX_BEATS_PER_MEASURE: u32 = 8;

/// Inclusive tempo bounds plus the step used by increment/decrement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for TempoRange {
    fn default() -> Self {
        Self {
            min: MIN_BPM,
            max: MAX_BPM,
            step: BPM_STEP,
        }
    }
}

impl TempoRange {
    /// Builds a range, repairing whatever would make clamping ill-defined.
    ///
    /// Swapped bounds are put back in order, and non-positive or non-finite
    /// values fall back to the defaults so `60 / bpm` always stays finite.
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        let defaults = Self::default();
        let valid = |v: f64| v.is_finite() && v > 0.0;
        let min = if valid(min) { min } else { defaults.min };
        let max = if valid(max) { max } else { defaults.max };
        let step = if valid(step) { step } else { defaults.step };
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self { min, max, step }
    }

    /// Pins `bpm` into `min..=max`.
    pub fn clamp(&self, bpm: f64) -> f64 {
        bpm.clamp(self.min, self.max)
    }
}

/// A tempo that is always inside its range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
    range: TempoRange,
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl Tempo {
    /// Creates a tempo with the default 40–240 BPM range.
    pub fn new(bpm: f64) -> Self {
        Self::with_range(bpm, TempoRange::default())
    }

    /// Creates a tempo bounded by `range`. A NaN `bpm` starts at the
    /// default tempo clamped into the range.
    pub fn with_range(bpm: f64, range: TempoRange) -> Self {
        let mut tempo = Self {
            bpm: range.clamp(DEFAULT_BPM),
            range,
        };
        tempo.set_bpm(bpm);
        tempo
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn range(&self) -> TempoRange {
        self.range
    }

    /// Stores `value` clamped into range and returns what was stored.
    ///
    /// NaN leaves the tempo as it was.
    pub fn set_bpm(&mut self, value: f64) -> f64 {
        if !value.is_nan() {
            self.bpm = self.range.clamp(value);
        }
        self.bpm
    }

    pub fn increment(&mut self) -> f64 {
        self.set_bpm(self.bpm + self.range.step)
    }

    pub fn decrement(&mut self) -> f64 {
        self.set_bpm(self.bpm - self.range.step)
    }

    /// Length of one beat in seconds. Always positive.
    pub fn beat_duration(&self) -> f64 {
        60.0 / self.bpm
    }
}

/// Beats per measure and whether the first one is accented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    beats_per_measure: u32,
    accent_first_beat: bool,
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            beats_per_measure: 4,
            accent_first_beat: true,
        }
    }
}

impl Meter {
    /// Builds a meter with `beats_per_measure` clamped to 2..=8.
    pub fn new(beats_per_measure: i64, accent_first_beat: bool) -> Self {
        let mut meter = Self {
            beats_per_measure: MIN_BEATS_PER_MEASURE,
            accent_first_beat,
        };
        meter.set_beats_per_measure(beats_per_measure);
        meter
    }

    pub fn beats_per_measure(&self) -> u32 {
        self.beats_per_measure
    }

    pub fn accent_first_beat(&self) -> bool {
        self.accent_first_beat
    }

    /// Stores `beats` clamped to 2..=8 and returns what was stored.
    ///
    /// Takes a signed count so zero and negative input from a config file or
    /// the command line clamps like any other out-of-range value.
    pub fn set_beats_per_measure(&mut self, beats: i64) -> u32 {
        let clamped = beats.clamp(
            i64::from(MIN_BEATS_PER_MEASURE),
            i64::from(MAX_BEATS_PER_MEASURE),
        );
        self.beats_per_measure = u32::try_from(clamped).unwrap_or(MIN_BEATS_PER_MEASURE);
        self.beats_per_measure
    }

    pub fn set_accent_first_beat(&mut self, accent: bool) {
        self.accent_first_beat = accent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn set_bpm_clamps_to_bounds() {
        let mut tempo = Tempo::default();
        assert_eq!(tempo.set_bpm(500.0), 240.0);
        assert_eq!(tempo.set_bpm(5.0), 40.0);
        assert_eq!(tempo.set_bpm(97.5), 97.5);
    }

    #[test]
    fn increment_and_decrement_stop_at_the_edges() {
        let mut tempo = Tempo::new(239.0);
        assert_eq!(tempo.increment(), 240.0);
        assert_eq!(tempo.increment(), 240.0);

        let mut tempo = Tempo::new(41.0);
        assert_eq!(tempo.decrement(), 40.0);
        assert_eq!(tempo.decrement(), 40.0);
    }

    #[test]
    fn nan_leaves_tempo_untouched() {
        let mut tempo = Tempo::new(100.0);
        assert_eq!(tempo.set_bpm(f64::NAN), 100.0);
    }

    #[test]
    fn infinite_input_clamps() {
        let mut tempo = Tempo::default();
        assert_eq!(tempo.set_bpm(f64::INFINITY), 240.0);
        assert_eq!(tempo.set_bpm(f64::NEG_INFINITY), 40.0);
    }

    #[test]
    fn inverted_range_is_normalized() {
        let range = TempoRange::new(200.0, 60.0, 2.0);
        assert_eq!(range.min, 60.0);
        assert_eq!(range.max, 200.0);

        let mut tempo = Tempo::with_range(300.0, range);
        assert_eq!(tempo.bpm(), 200.0);
        assert_eq!(tempo.decrement(), 198.0);
    }

    #[test]
    fn bad_range_values_fall_back_to_defaults() {
        let range = TempoRange::new(0.0, f64::NAN, -1.0);
        assert_eq!(range, TempoRange::default());
    }

    #[test]
    fn beat_duration_follows_tempo() {
        assert_eq!(Tempo::new(120.0).beat_duration(), 0.5);
        assert_eq!(Tempo::new(60.0).beat_duration(), 1.0);
    }

    #[test]
    fn meter_clamps_beats() {
        let mut meter = Meter::default();
        assert_eq!(meter.beats_per_measure(), 4);
        assert!(meter.accent_first_beat());
        assert_eq!(meter.set_beats_per_measure(1), 2);
        assert_eq!(meter.set_beats_per_measure(12), 8);
        assert_eq!(Meter::new(0, false).beats_per_measure(), 2);
        assert_eq!(meter.set_beats_per_measure(-3), 2);
        assert_eq!(meter.set_beats_per_measure(i64::MAX), 8);
    }

    proptest! {
        #[test]
        fn any_bpm_lands_in_range(value in proptest::num::f64::ANY) {
            let mut tempo = Tempo::default();
            let stored = tempo.set_bpm(value);
            prop_assert!((MIN_BPM..=MAX_BPM).contains(&stored));
            prop_assert!(tempo.beat_duration() > 0.0);
        }

        #[test]
        fn any_meter_lands_in_range(beats in any::<i64>()) {
            let meter = Meter::new(beats, true);
            prop_assert!((MIN_BEATS_PER_MEASURE..=MAX_BEATS_PER_MEASURE)
                .contains(&meter.beats_per_measure()));
        }
    }
}
