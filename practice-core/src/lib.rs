// practice-core/src/lib.rs

//! The core logic for the practice toolkit: loop player, metronome and
//! chromatic tuner.
//! This crate is responsible for tempo scheduling, pitch reference data and
//! tuning deviation. It is completely headless and contains no audio device
//! or GUI code; front ends plug in an [`sink::AudioSink`] and a
//! [`source::FrequencySource`].

pub mod clock;
pub mod config;
pub mod controller;
pub mod deviation;
pub mod error;
pub mod pacemaker;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod tempo;
pub mod tuning;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PracticeConfig;
pub use controller::{
    AudioLoop, LoopPlayer, Metronome, ModeController, ModeState, Tuner, TunerReading, TuningMode,
};
pub use deviation::{Deviation, DeviationSettings, deviation};
pub use error::{ConfigError, ResourceError};
pub use scheduler::{BeatPattern, BeatScheduler, SchedulerEvent, Tick};
pub use sink::{AudioSession, AudioSink, SampleId};
pub use source::{FrequencySource, PitchSample};
pub use tempo::{Meter, Tempo};
pub use tuning::{Instrument, PitchClass, TuningProfile, TuningString, nearest_note};
