//! # Playback Mixer
//!
//! The state the output callback renders from. Controllers never touch
//! it directly; [`crate::audio::CpalSink`] translates their commands into
//! mixer calls.

use crate::synth::{LoopBuffer, SineTone};
use practice_core::SampleId;
use std::sync::Arc;
use std::time::Duration;

/// Voices beyond this are dropped rather than allocated in the callback.
const MAX_VOICES: usize = 16;

#[derive(Debug, Clone)]
struct Voice {
    samples: Arc<Vec<f32>>,
    position: usize,
}

/// Mono mixer: one looping buffer, any number of one-shots and an optional
/// sine tone.
#[derive(Debug)]
pub struct Mixer {
    output_rate: u32,
    looped: Option<LoopBuffer>,
    /// Read position into `looped`, in source frames.
    cursor: f64,
    rate: f64,
    playing: bool,
    volume: f32,
    click: Arc<Vec<f32>>,
    accent: Arc<Vec<f32>>,
    voices: Vec<Voice>,
    tone: Option<SineTone>,
}

impl Mixer {
    pub fn new(output_rate: u32, click: Vec<f32>, accent: Vec<f32>) -> Self {
        Self {
            output_rate: output_rate.max(1),
            looped: None,
            cursor: 0.0,
            rate: 1.0,
            playing: false,
            volume: 1.0,
            click: Arc::new(click),
            accent: Arc::new(accent),
            voices: Vec::with_capacity(MAX_VOICES),
            tone: None,
        }
    }

    pub fn set_loop(&mut self, buffer: LoopBuffer) {
        self.looped = Some(buffer);
        self.cursor = 0.0;
    }

    pub fn set_rate(&mut self, rate: f64) {
        if rate.is_finite() && rate > 0.0 {
            self.rate = rate;
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn seek(&mut self, to: Duration) {
        let Some(buffer) = &self.looped else {
            return;
        };
        let frames = to.as_secs_f64() * buffer.sample_rate as f64;
        self.cursor = if buffer.is_empty() {
            0.0
        } else {
            frames % buffer.len() as f64
        };
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0) as f32;
    }

    pub fn trigger(&mut self, sample: SampleId) {
        if self.voices.len() >= MAX_VOICES {
            return;
        }
        let samples = match sample {
            SampleId::Click => Arc::clone(&self.click),
            SampleId::AccentClick => Arc::clone(&self.accent),
        };
        self.voices.push(Voice {
            samples,
            position: 0,
        });
    }

    pub fn set_tone(&mut self, frequency: Option<f64>) {
        self.tone = frequency.map(|f| SineTone::new(f, self.output_rate));
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Fills an interleaved buffer, writing the same mono sample to every
    /// channel.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in out.chunks_mut(channels) {
            let sample = self.next_sample() * self.volume;
            frame.fill(sample);
        }
        self.voices.retain(|v| v.position < v.samples.len());
    }

    fn next_sample(&mut self) -> f32 {
        let mut sum = 0.0;

        if self.playing {
            if let Some(buffer) = &self.looped {
                let len = buffer.len();
                if len > 0 {
                    let index = self.cursor.floor() as usize % len;
                    let next = (index + 1) % len;
                    let frac = (self.cursor - self.cursor.floor()) as f32;
                    sum += buffer.samples[index] * (1.0 - frac) + buffer.samples[next] * frac;

                    let step = self.rate * buffer.sample_rate as f64 / self.output_rate as f64;
                    self.cursor = (self.cursor + step) % len as f64;
                }
            }
        }

        for voice in &mut self.voices {
            if let Some(s) = voice.samples.get(voice.position) {
                sum += *s;
                voice.position += 1;
            }
        }

        if let Some(tone) = &mut self.tone {
            sum += tone.next_sample();
        }

        sum.clamp(-1.0, 1.0)
    }
}
