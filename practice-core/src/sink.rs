//! # Audio Sink Module
//!
//! The output side of the controllers. The core never decodes or mixes
//! audio; it only tells a sink what to do. Front ends implement
//! [`AudioSink`] on top of a real device.

use crate::error::ResourceError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One-shot samples a controller can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleId {
    Click,
    AccentClick,
}

/// What the audio session is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionCategory {
    /// Output only (metronome, loop player).
    Playback,
    /// Input and output (tuner).
    PlayAndRecord,
}

/// Audio-session settings handed to whichever controller is starting.
///
/// Each controller passes its own session explicitly instead of relying on
/// process-wide state, so two modes never fight over one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSession {
    pub category: SessionCategory,
    pub mix_with_others: bool,
}

impl AudioSession {
    pub const PLAYBACK: AudioSession = AudioSession {
        category: SessionCategory::Playback,
        mix_with_others: false,
    };

    pub const MEASUREMENT: AudioSession = AudioSession {
        category: SessionCategory::PlayAndRecord,
        mix_with_others: true,
    };
}

/// Commands the controllers issue to the audio output.
pub trait AudioSink: Send {
    /// Prepares the device for `session`. Failure leaves the controller
    /// running without sound.
    fn activate(&mut self, session: &AudioSession) -> Result<(), ResourceError>;

    /// Playback speed of the looping material; 1.0 is the authored tempo.
    fn set_playback_rate(&mut self, ratio: f64);

    fn play(&mut self);

    fn pause(&mut self);

    fn seek(&mut self, to: Duration);

    fn play_one_shot(&mut self, sample: SampleId);

    /// Output gain in `[0, 1]`.
    fn set_volume(&mut self, volume: f64);
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn activate(&mut self, session: &AudioSession) -> Result<(), ResourceError> {
        (**self).activate(session)
    }

    fn set_playback_rate(&mut self, ratio: f64) {
        (**self).set_playback_rate(ratio)
    }

    fn play(&mut self) {
        (**self).play()
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn seek(&mut self, to: Duration) {
        (**self).seek(to)
    }

    fn play_one_shot(&mut self, sample: SampleId) {
        (**self).play_one_shot(sample)
    }

    fn set_volume(&mut self, volume: f64) {
        (**self).set_volume(volume)
    }
}

/// A sink with no device behind it. Every command is logged and dropped.
///
/// Used when no output device can be opened, and handy for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

impl AudioSink for LoggingSink {
    fn activate(&mut self, session: &AudioSession) -> Result<(), ResourceError> {
        log::info!("silent sink activated for {:?}", session.category);
        Ok(())
    }

    fn set_playback_rate(&mut self, ratio: f64) {
        log::debug!("sink: rate {ratio:.3}");
    }

    fn play(&mut self) {
        log::debug!("sink: play");
    }

    fn pause(&mut self) {
        log::debug!("sink: pause");
    }

    fn seek(&mut self, to: Duration) {
        log::debug!("sink: seek {to:?}");
    }

    fn play_one_shot(&mut self, sample: SampleId) {
        log::trace!("sink: one-shot {sample:?}");
    }

    fn set_volume(&mut self, volume: f64) {
        log::debug!("sink: volume {volume:.2}");
    }
}
