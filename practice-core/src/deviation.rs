//! # Pitch Deviation Module
//!
//! Turns a measured frequency and a target frequency into the numbers a
//! tuner displays: signed cents, a clamped needle position and an in-tune
//! flag.
//!
//! Cents are a logarithmic unit of pitch measurement where:
//! - 100 cents = 1 semitone
//! - 1200 cents = 1 octave
//! - Positive values indicate sharpness, negative values indicate flatness
//!
//! The in-tune test is an absolute window in Hz, not in cents, so the same
//! window is proportionally tighter on high strings than on low ones.

use serde::{Deserialize, Serialize};

/// Cents that move the needle one full `max_offset`.
pub const DEFAULT_CENTS_PER_UNIT: f64 = 50.0;
/// Half-range of the needle.
pub const DEFAULT_MAX_OFFSET: f64 = 100.0;
/// Largest |measured - target| that still counts as in tune.
pub const DEFAULT_TOLERANCE_HZ: f64 = 1.0;

/// Needle sensitivity and in-tune window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationSettings {
    pub cents_per_unit: f64,
    pub max_offset: f64,
    pub tolerance_hz: f64,
}

impl Default for DeviationSettings {
    fn default() -> Self {
        Self {
            cents_per_unit: DEFAULT_CENTS_PER_UNIT,
            max_offset: DEFAULT_MAX_OFFSET,
            tolerance_hz: DEFAULT_TOLERANCE_HZ,
        }
    }
}

impl DeviationSettings {
    /// Replaces non-positive or non-finite fields with their defaults.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let pick = |v: f64, d: f64| if v.is_finite() && v > 0.0 { v } else { d };
        Self {
            cents_per_unit: pick(self.cents_per_unit, defaults.cents_per_unit),
            max_offset: pick(self.max_offset, defaults.max_offset),
            tolerance_hz: pick(self.tolerance_hz, defaults.tolerance_hz),
        }
    }
}

/// How far a measurement is from its target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Deviation {
    /// Signed distance in cents, positive when sharp.
    pub cents: f64,
    /// Needle position in `[-max_offset, max_offset]`.
    pub needle_position: f64,
    pub in_tune: bool,
}

impl Deviation {
    /// The reading shown while there is no usable signal.
    pub const NEUTRAL: Deviation = Deviation {
        cents: 0.0,
        needle_position: 0.0,
        in_tune: false,
    };
}

/// Calculates the deviation from a target frequency in cents.
///
/// Returns `None` when either frequency is not a positive finite number.
pub fn cents_between(freq: f64, target_freq: f64) -> Option<f64> {
    let valid = |f: f64| f.is_finite() && f > 0.0;
    if valid(freq) && valid(target_freq) {
        Some(1200.0 * (freq / target_freq).log2())
    } else {
        None
    }
}

/// Maps cents onto the needle's half-range, clamped to it.
///
/// Unusable settings (zero, negative or non-finite) are replaced by their
/// defaults first, so the result is always on the dial.
pub fn needle_position(cents: f64, settings: &DeviationSettings) -> f64 {
    let settings = settings.sanitized();
    let max = settings.max_offset;
    let position = cents / settings.cents_per_unit * max;
    if position.is_nan() {
        return 0.0;
    }
    position.clamp(-max, max)
}

/// Calculates the full deviation of a measured frequency from its target.
///
/// # Arguments
/// * `measured` - Frequency reported by the source in Hz
/// * `target` - Frequency the player is aiming for in Hz
/// * `settings` - Needle sensitivity and in-tune window
///
/// # Returns
/// Signed cents, the needle position in `[-max_offset, max_offset]` and
/// whether `|measured - target|` is inside the tolerance.
///
/// Invalid input (a frequency of zero means "no signal yet") yields
/// [`Deviation::NEUTRAL`] rather than an error. Unusable settings fall back
/// to their defaults.
pub fn deviation(measured: f64, target: f64, settings: &DeviationSettings) -> Deviation {
    let Some(cents) = cents_between(measured, target) else {
        return Deviation::NEUTRAL;
    };
    let settings = settings.sanitized();
    Deviation {
        cents,
        needle_position: needle_position(cents, &settings),
        in_tune: (measured - target).abs() < settings.tolerance_hz,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn unison_is_in_tune() {
        let d = deviation(440.0, 440.0, &DeviationSettings::default());
        assert_eq!(d.cents, 0.0);
        assert_eq!(d.needle_position, 0.0);
        assert!(d.in_tune);
    }

    #[test]
    fn sharp_is_positive_and_flat_is_negative() {
        let settings = DeviationSettings::default();
        assert!(deviation(445.0, 440.0, &settings).cents > 0.0);
        assert!(deviation(435.0, 440.0, &settings).cents < 0.0);
    }

    #[test]
    fn five_hz_off_is_out_of_tune() {
        let d = deviation(435.0, 440.0, &DeviationSettings::default());
        assert!(!d.in_tune);
    }

    #[test]
    fn tolerance_is_exclusive() {
        let settings = DeviationSettings::default();
        assert!(deviation(440.5, 440.0, &settings).in_tune);
        assert!(!deviation(441.0, 440.0, &settings).in_tune);
    }

    #[test]
    fn octave_is_twelve_hundred_cents() {
        assert!(approx(cents_between(880.0, 440.0).unwrap(), 1200.0));
        assert!(approx(cents_between(220.0, 440.0).unwrap(), -1200.0));
    }

    #[test]
    fn quarter_tone_moves_needle_to_the_stop() {
        let settings = DeviationSettings::default();
        // 50 cents sharp is one full unit.
        let sharp = 440.0 * 2f64.powf(50.0 / 1200.0);
        assert!(approx(deviation(sharp, 440.0, &settings).needle_position, 100.0));
        let slightly = 440.0 * 2f64.powf(10.0 / 1200.0);
        assert!(approx(deviation(slightly, 440.0, &settings).needle_position, 20.0));
    }

    #[test]
    fn no_signal_is_neutral() {
        let settings = DeviationSettings::default();
        assert_eq!(deviation(0.0, 440.0, &settings), Deviation::NEUTRAL);
        assert_eq!(deviation(440.0, 0.0, &settings), Deviation::NEUTRAL);
        assert_eq!(deviation(-3.0, 440.0, &settings), Deviation::NEUTRAL);
        assert_eq!(deviation(f64::NAN, 440.0, &settings), Deviation::NEUTRAL);
    }

    #[test]
    fn extremes_stay_on_the_dial() {
        let settings = DeviationSettings::default();
        assert_eq!(deviation(1.0, 440.0, &settings).needle_position, -100.0);
        assert_eq!(deviation(20_000.0, 440.0, &settings).needle_position, 100.0);
    }

    #[test]
    fn sanitized_repairs_bad_settings() {
        let settings = DeviationSettings {
            cents_per_unit: 0.0,
            max_offset: -5.0,
            tolerance_hz: f64::NAN,
        }
        .sanitized();
        assert_eq!(settings, DeviationSettings::default());
    }

    #[test]
    fn bad_settings_do_not_panic() {
        let settings = DeviationSettings {
            max_offset: -5.0,
            ..DeviationSettings::default()
        };
        let d = deviation(445.0, 440.0, &settings);
        assert!(d.needle_position > 0.0 && d.needle_position <= 100.0);

        let broken = DeviationSettings {
            cents_per_unit: f64::NAN,
            max_offset: f64::INFINITY,
            tolerance_hz: -1.0,
        };
        assert_eq!(deviation(20_000.0, 440.0, &broken).needle_position, 100.0);
        assert!(deviation(440.2, 440.0, &broken).in_tune);
        assert_eq!(needle_position(-500.0, &broken), -100.0);
    }

    proptest! {
        #[test]
        fn any_settings_keep_the_needle_finite(
            cents in -5000.0f64..5000.0,
            cents_per_unit in proptest::num::f64::ANY,
            max_offset in proptest::num::f64::ANY,
        ) {
            let settings = DeviationSettings {
                cents_per_unit,
                max_offset,
                ..DeviationSettings::default()
            };
            let position = needle_position(cents, &settings);
            let bound = settings.sanitized().max_offset;
            prop_assert!(position.is_finite());
            prop_assert!(position.abs() <= bound);
        }

        #[test]
        fn needle_is_always_bounded(
            measured in 1e-6f64..1e6,
            target in 1e-6f64..1e6,
            max_offset in 1.0f64..500.0,
        ) {
            let settings = DeviationSettings { max_offset, ..DeviationSettings::default() };
            let d = deviation(measured, target, &settings);
            prop_assert!(d.needle_position >= -max_offset);
            prop_assert!(d.needle_position <= max_offset);
        }

        #[test]
        fn any_finite_input_is_bounded(
            measured in proptest::num::f64::NORMAL | proptest::num::f64::ZERO,
            target in proptest::num::f64::NORMAL | proptest::num::f64::ZERO,
        ) {
            let d = deviation(measured, target, &DeviationSettings::default());
            prop_assert!(d.needle_position.abs() <= DEFAULT_MAX_OFFSET);
            prop_assert!(!d.cents.is_nan());
        }
    }
}
