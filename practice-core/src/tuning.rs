//! # Musical Tuning Module
//!
//! Pitch reference data for the tuner: the twelve equal-tempered pitch
//! classes, nearest-note resolution from a frequency, and the built-in
//! string tunings for each supported instrument.
//!
//! ## Features
//! - Nearest pitch class from any frequency, relative to A4 = 440 Hz
//! - Note label parsing, including flat spellings ("Bb" -> A#)
//! - Closed set of instruments with compiled-in tuning profiles
//! - Target selection for a detected note within a profile

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Concert pitch: A4 in Hz.
pub const A4_HZ: f64 = 440.0;

/// Label shown when a frequency has no note (silence or invalid input).
pub const NO_NOTE: &str = "--";

/// Index of A within [`NOTE_NAMES`].
const A_INDEX: i64 = 9;

/// Sharp-spelled names of the twelve pitch classes, starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One of the twelve chromatic pitch classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Position within the octave, C = 0.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 12]
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES[self.index()]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every accepted spelling of every pitch class.
static NOTE_MAP: Lazy<BTreeMap<&'static str, PitchClass>> = Lazy::new(|| {
    const FLATS: [(&str, PitchClass); 7] = [
        ("Db", PitchClass::CSharp),
        ("Eb", PitchClass::DSharp),
        ("Fb", PitchClass::E),
        ("Gb", PitchClass::FSharp),
        ("Ab", PitchClass::GSharp),
        ("Bb", PitchClass::ASharp),
        ("Cb", PitchClass::B),
    ];
    PitchClass::ALL
        .iter()
        .map(|&pc| (pc.name(), pc))
        .chain(FLATS)
        .collect()
});

/// The given label is not a note name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown note name '{0}'")]
pub struct UnknownNote(pub String);

impl FromStr for PitchClass {
    type Err = UnknownNote;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        // Normalise the letter's case so "bb" and "Bb" both parse.
        let normalised: String = match chars.next() {
            Some(letter) => letter.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        };
        NOTE_MAP
            .get(normalised.as_str())
            .copied()
            .ok_or_else(|| UnknownNote(s.to_string()))
    }
}

/// Finds the pitch class nearest to `freq`, relative to A4 = 440 Hz.
///
/// # Arguments
/// * `freq` - Measured frequency in Hz
///
/// # Returns
/// The nearest pitch class, or `None` for non-positive or non-finite input.
/// `None` is the steady-state "no note" value, not an error.
pub fn nearest_note(freq: f64) -> Option<PitchClass> {
    nearest_note_with_reference(freq, A4_HZ)
}

/// Same as [`nearest_note`] with a custom A4 reference.
pub fn nearest_note_with_reference(freq: f64, a4_hz: f64) -> Option<PitchClass> {
    if !(freq.is_finite() && freq > 0.0 && a4_hz.is_finite() && a4_hz > 0.0) {
        return None;
    }
    let semitone_offset = (12.0 * (freq / a4_hz).log2()).round() as i64;
    let index = (A_INDEX + semitone_offset).rem_euclid(12);
    Some(PitchClass::from_index(index as usize))
}

/// Display label for [`nearest_note`]: the note name, or [`NO_NOTE`].
pub fn note_label(note: Option<PitchClass>) -> &'static str {
    note.map_or(NO_NOTE, PitchClass::name)
}

/// Instruments with a built-in tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    #[default]
    Guitar,
    Bass,
}

impl Instrument {
    pub const ALL: [Instrument; 2] = [Instrument::Guitar, Instrument::Bass];

    pub fn name(self) -> &'static str {
        match self {
            Instrument::Guitar => "guitar",
            Instrument::Bass => "bass",
        }
    }

    /// The compiled-in tuning for this instrument.
    pub fn profile(self) -> &'static TuningProfile {
        match self {
            Instrument::Guitar => &GUITAR,
            Instrument::Bass => &BASS,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The given name is not a supported instrument.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown instrument '{0}' (expected guitar or bass)")]
pub struct UnknownInstrument(pub String);

impl FromStr for Instrument {
    type Err = UnknownInstrument;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Instrument::ALL
            .into_iter()
            .find(|i| i.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownInstrument(s.to_string()))
    }
}

/// One string of an instrument and the frequency it should sound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TuningString {
    pub note: PitchClass,
    pub target_frequency: f64,
}

impl TuningString {
    pub const fn new(note: PitchClass, target_frequency: f64) -> Self {
        Self {
            note,
            target_frequency,
        }
    }
}

/// Strings of one instrument in physical order (highest first).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TuningProfile {
    pub instrument: Instrument,
    pub strings: &'static [TuningString],
}

/// Standard six-string guitar tuning, high E to low E.
pub static GUITAR: TuningProfile = TuningProfile {
    instrument: Instrument::Guitar,
    strings: &[
        TuningString::new(PitchClass::E, 329.63),
        TuningString::new(PitchClass::B, 246.94),
        TuningString::new(PitchClass::G, 196.00),
        TuningString::new(PitchClass::D, 146.83),
        TuningString::new(PitchClass::A, 110.00),
        TuningString::new(PitchClass::E, 82.41),
    ],
};

/// Standard four-string bass tuning, G to low E.
pub static BASS: TuningProfile = TuningProfile {
    instrument: Instrument::Bass,
    strings: &[
        TuningString::new(PitchClass::G, 98.0),
        TuningString::new(PitchClass::D, 73.42),
        TuningString::new(PitchClass::A, 55.0),
        TuningString::new(PitchClass::E, 41.20),
    ],
};

impl TuningProfile {
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn string(&self, index: usize) -> Option<&TuningString> {
        self.strings.get(index)
    }

    /// Index of the string whose note matches `note`, nearest to `measured`.
    ///
    /// Several strings can share a note (the two E strings of a guitar);
    /// the one closest in pitch to what was measured wins. Without a usable
    /// measurement the first match in physical order is returned.
    pub fn matching_string(&self, note: PitchClass, measured: f64) -> Option<usize> {
        let candidates = self
            .strings
            .iter()
            .enumerate()
            .filter(|(_, s)| s.note == note);

        if !(measured.is_finite() && measured > 0.0) {
            return candidates.map(|(i, _)| i).next();
        }

        candidates
            .min_by(|(_, a), (_, b)| {
                let da = (measured / a.target_frequency).log2().abs();
                let db = (measured / b.target_frequency).log2().abs();
                da.total_cmp(&db)
            })
            .map(|(i, _)| i)
    }

    /// String and target frequency for a detected note.
    ///
    /// # Returns
    /// The matching string's index and frequency, or `(None, fallback_hz)`
    /// when no string carries `note`.
    pub fn target_for(&self, note: PitchClass, measured: f64, fallback_hz: f64) -> (Option<usize>, f64) {
        match self.matching_string(note, measured) {
            Some(index) => (Some(index), self.strings[index].target_frequency),
            None => (None, fallback_hz),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concert_a_is_a() {
        assert_eq!(nearest_note(440.0), Some(PitchClass::A));
        assert_eq!(note_label(nearest_note(440.0)), "A");
    }

    #[test]
    fn a_sharp_resolves() {
        assert_eq!(note_label(nearest_note(466.16)), "A#");
    }

    #[test]
    fn octaves_share_a_pitch_class() {
        assert_eq!(nearest_note(220.0), Some(PitchClass::A));
        assert_eq!(nearest_note(880.0), Some(PitchClass::A));
        assert_eq!(nearest_note(27.5), Some(PitchClass::A));
    }

    #[test]
    fn below_reference_wraps_to_non_negative_index() {
        // C4 is nine semitones below A4.
        assert_eq!(nearest_note(261.63), Some(PitchClass::C));
        assert_eq!(nearest_note(82.41), Some(PitchClass::E));
        assert_eq!(nearest_note(41.20), Some(PitchClass::E));
    }

    #[test]
    fn invalid_frequencies_have_no_note() {
        assert_eq!(nearest_note(0.0), None);
        assert_eq!(nearest_note(-12.0), None);
        assert_eq!(nearest_note(f64::NAN), None);
        assert_eq!(nearest_note(f64::INFINITY), None);
        assert_eq!(note_label(nearest_note(0.0)), NO_NOTE);
    }

    #[test]
    fn custom_reference_shifts_resolution() {
        // 432 Hz is "A" under A4 = 432.
        assert_eq!(nearest_note_with_reference(432.0, 432.0), Some(PitchClass::A));
    }

    #[test]
    fn parses_sharps_and_flats() {
        assert_eq!("A#".parse::<PitchClass>(), Ok(PitchClass::ASharp));
        assert_eq!("Bb".parse::<PitchClass>(), Ok(PitchClass::ASharp));
        assert_eq!("e".parse::<PitchClass>(), Ok(PitchClass::E));
        assert!("H".parse::<PitchClass>().is_err());
        assert!("".parse::<PitchClass>().is_err());
    }

    #[test]
    fn profiles_are_in_physical_order() {
        let guitar = Instrument::Guitar.profile();
        let labels: Vec<_> = guitar.strings.iter().map(|s| s.note.name()).collect();
        assert_eq!(labels, ["E", "B", "G", "D", "A", "E"]);

        let bass = Instrument::Bass.profile();
        assert_eq!(bass.len(), 4);
        assert_eq!(bass.strings[3].target_frequency, 41.20);
    }

    #[test]
    fn profile_notes_agree_with_their_frequencies() {
        for instrument in Instrument::ALL {
            for string in instrument.profile().strings {
                assert_eq!(nearest_note(string.target_frequency), Some(string.note));
            }
        }
    }

    #[test]
    fn duplicate_labels_pick_the_nearest_string() {
        let guitar = Instrument::Guitar.profile();
        assert_eq!(guitar.matching_string(PitchClass::E, 83.0), Some(5));
        assert_eq!(guitar.matching_string(PitchClass::E, 330.0), Some(0));
        assert_eq!(guitar.matching_string(PitchClass::E, 0.0), Some(0));
    }

    #[test]
    fn unmatched_note_falls_back_to_reference() {
        let guitar = Instrument::Guitar.profile();
        assert_eq!(guitar.target_for(PitchClass::CSharp, 277.0, A4_HZ), (None, 440.0));
        assert_eq!(guitar.target_for(PitchClass::G, 195.0, A4_HZ), (Some(2), 196.0));
        assert_eq!(guitar.target_for(PitchClass::E, 84.0, A4_HZ), (Some(5), 82.41));
    }

    #[test]
    fn instrument_names_round_trip() {
        assert_eq!("Guitar".parse::<Instrument>(), Ok(Instrument::Guitar));
        assert_eq!(" bass ".parse::<Instrument>(), Ok(Instrument::Bass));
        assert!("ukulele".parse::<Instrument>().is_err());
    }
}
