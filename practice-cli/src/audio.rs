//! # Audio Output Module
//!
//! Opens the default output device with CPAL and renders the shared
//! [`Mixer`] from the stream callback. [`CpalSink`] is the
//! [`AudioSink`] the controllers talk to.

use crate::playback::Mixer;
use crate::synth;
use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use practice_core::{AudioSession, AudioSink, ResourceError, SampleId};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Rate we ask the device for when it supports it.
const PREFERRED_SAMPLE_RATE: u32 = 44_100;

/// A running output stream. Dropping it closes the device.
pub struct AudioOutput {
    _stream: cpal::Stream,
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
}

impl AudioOutput {
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))?;

        log::info!("using audio output device: {}", device.name()?);

        let configs = device.supported_output_configs()?.collect::<Vec<_>>();
        let supported = find_supported_config(configs, PREFERRED_SAMPLE_RATE)
            .ok_or_else(|| anyhow!("No suitable f32 output format found"))?;

        let sample_rate = PREFERRED_SAMPLE_RATE
            .clamp(supported.min_sample_rate().0, supported.max_sample_rate().0);
        let config: cpal::StreamConfig = supported
            .with_sample_rate(cpal::SampleRate(sample_rate))
            .into();
        let channels = config.channels as usize;

        log::info!("output stream: {sample_rate} Hz, {channels} channel(s)");

        let mixer = Arc::new(Mutex::new(Mixer::new(
            sample_rate,
            synth::beat_click(sample_rate),
            synth::accent_click(sample_rate),
        )));

        let callback_mixer = Arc::clone(&mixer);
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // Never block the device thread; a contended frame is silence.
                match callback_mixer.try_lock() {
                    Ok(mut mixer) => mixer.render(data, channels),
                    Err(_) => data.fill(0.0),
                }
            },
            |err| log::error!("audio output stream error: {err}"),
            None,
        )?;
        stream.play()?;

        Ok(Self {
            _stream: stream,
            mixer,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn mixer(&self) -> Arc<Mutex<Mixer>> {
        Arc::clone(&self.mixer)
    }

    pub fn sink(&self) -> CpalSink {
        CpalSink {
            mixer: self.mixer(),
        }
    }
}

/// Picks an f32 configuration whose rate range is closest to `target_rate`.
/// Fewer channels win ties.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let distance = if (min..=max).contains(&target_rate) {
                0
            } else {
                min.abs_diff(target_rate).min(max.abs_diff(target_rate))
            };
            (distance, c.channels())
        })
}

/// Sink that forwards controller commands to the output mixer.
#[derive(Debug, Clone)]
pub struct CpalSink {
    mixer: Arc<Mutex<Mixer>>,
}

impl CpalSink {
    fn with_mixer(&self, f: impl FnOnce(&mut Mixer)) {
        let mut mixer = self.mixer.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut mixer);
    }
}

impl AudioSink for CpalSink {
    fn activate(&mut self, session: &AudioSession) -> Result<(), ResourceError> {
        log::debug!("output session {:?}", session.category);
        Ok(())
    }

    fn set_playback_rate(&mut self, ratio: f64) {
        self.with_mixer(|m| m.set_rate(ratio));
    }

    fn play(&mut self) {
        self.with_mixer(|m| m.set_playing(true));
    }

    fn pause(&mut self) {
        self.with_mixer(|m| m.set_playing(false));
    }

    fn seek(&mut self, to: Duration) {
        self.with_mixer(|m| m.seek(to));
    }

    fn play_one_shot(&mut self, sample: SampleId) {
        self.with_mixer(|m| m.trigger(sample));
    }

    fn set_volume(&mut self, volume: f64) {
        self.with_mixer(|m| m.set_volume(volume));
    }
}
