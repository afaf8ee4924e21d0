//! Test doubles shared by the controller tests.

use crate::error::ResourceError;
use crate::sink::{AudioSession, AudioSink, SampleId};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCommand {
    Activate(AudioSession),
    Rate(f64),
    Play,
    Pause,
    Seek(Duration),
    OneShot(SampleId),
    Volume(f64),
}

/// Remembers every command. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    commands: Arc<Mutex<Vec<SinkCommand>>>,
    fail_activation: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail_activation: true,
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<SinkCommand> {
        self.commands.lock().unwrap().clone()
    }

    fn record(&self, command: SinkCommand) {
        self.commands.lock().unwrap().push(command);
    }
}

impl AudioSink for RecordingSink {
    fn activate(&mut self, session: &AudioSession) -> Result<(), ResourceError> {
        if self.fail_activation {
            return Err(ResourceError::OutputUnavailable("no device".to_string()));
        }
        self.record(SinkCommand::Activate(*session));
        Ok(())
    }

    fn set_playback_rate(&mut self, ratio: f64) {
        self.record(SinkCommand::Rate(ratio));
    }

    fn play(&mut self) {
        self.record(SinkCommand::Play);
    }

    fn pause(&mut self) {
        self.record(SinkCommand::Pause);
    }

    fn seek(&mut self, to: Duration) {
        self.record(SinkCommand::Seek(to));
    }

    fn play_one_shot(&mut self, sample: SampleId) {
        self.record(SinkCommand::OneShot(sample));
    }

    fn set_volume(&mut self, volume: f64) {
        self.record(SinkCommand::Volume(volume));
    }
}
