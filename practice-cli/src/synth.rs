//! # Sound Material Module
//!
//! Everything the front end plays that does not come from a file:
//! metronome clicks, the built-in one-beat loop and the reference tone.
//! Also loads loop material from WAV files.

use hound::{SampleFormat, WavReader};
use practice_core::ResourceError;
use std::path::Path;
use std::sync::Arc;

/// Mono audio plus the rate it was recorded at.
#[derive(Debug, Clone)]
pub struct LoopBuffer {
    pub samples: Arc<Vec<f32>>,
    pub sample_rate: u32,
}

impl LoopBuffer {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A sine burst with an exponential decay.
pub fn click(sample_rate: u32, freq: f32, duration: f32, gain: f32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let envelope = (-t * 40.0).exp();
            (t * freq * std::f32::consts::TAU).sin() * envelope * gain
        })
        .collect()
}

pub fn accent_click(sample_rate: u32) -> Vec<f32> {
    click(sample_rate, 1000.0, 0.015, 0.8)
}

pub fn beat_click(sample_rate: u32) -> Vec<f32> {
    click(sample_rate, 800.0, 0.012, 0.5)
}

/// One beat of a simple groove at `bpm`: a low thump on the beat and a
/// short tick on the off-beat. Used when no loop file is configured.
pub fn default_loop(sample_rate: u32, bpm: f64) -> LoopBuffer {
    let beat_len = (sample_rate as f64 * 60.0 / bpm).round().max(1.0) as usize;
    let mut samples = vec![0.0f32; beat_len];

    for (i, s) in samples.iter_mut().enumerate() {
        let t = i as f32 / sample_rate as f32;
        // Pitch falls from 120 Hz towards 50 Hz for a kick-like thump.
        let freq = 50.0 + 70.0 * (-t * 30.0).exp();
        *s += (t * freq * std::f32::consts::TAU).sin() * (-t * 12.0).exp() * 0.8;
    }

    let tick = click(sample_rate, 3000.0, 0.02, 0.25);
    let off_beat = beat_len / 2;
    for (dst, src) in samples[off_beat..].iter_mut().zip(tick) {
        *dst += src;
    }

    LoopBuffer {
        samples: Arc::new(samples),
        sample_rate,
    }
}

/// Continuous sine for the reference tone.
#[derive(Debug, Clone, Copy)]
pub struct SineTone {
    phase: f64,
    step: f64,
    amplitude: f32,
}

impl SineTone {
    pub fn new(frequency: f64, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            step: frequency / sample_rate as f64,
            amplitude: 0.1,
        }
    }

    pub fn next_sample(&mut self) -> f32 {
        let sample = (std::f64::consts::TAU * self.phase).sin() as f32 * self.amplitude;
        self.phase += self.step;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        sample
    }
}

/// Reads a WAV file and mixes it down to mono.
pub fn load_wav(path: &Path) -> Result<LoopBuffer, ResourceError> {
    let missing = |reason: String| ResourceError::SampleMissing {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = WavReader::open(path).map_err(|e| missing(e.to_string()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>(),
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / i8::MAX as f32))
            .collect(),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect(),
        (SampleFormat::Int, bits @ (24 | 32)) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect()
        }
        (format, bits) => {
            return Err(missing(format!("unsupported format {format:?} {bits}-bit")));
        }
    }
    .map_err(|e| missing(e.to_string()))?;

    let channels = spec.channels.max(1) as usize;
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    if mono.is_empty() {
        return Err(missing("file contains no audio".to_string()));
    }

    log::info!(
        "loaded loop {} ({} frames at {} Hz)",
        path.display(),
        mono.len(),
        spec.sample_rate
    );
    Ok(LoopBuffer {
        samples: Arc::new(mono),
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clicks_decay_and_differ() {
        let accent = accent_click(48_000);
        let beat = beat_click(48_000);
        assert_eq!(accent.len(), 720);
        assert_eq!(beat.len(), 576);
        let head: f32 = accent[..100].iter().map(|s| s.abs()).sum();
        let tail: f32 = accent[620..].iter().map(|s| s.abs()).sum();
        assert!(head > tail);
    }

    #[test]
    fn default_loop_is_one_beat_long() {
        let buffer = default_loop(44_100, 120.0);
        assert_eq!(buffer.len(), 22_050);
        assert!(buffer.samples.iter().all(|s| s.abs() <= 1.5));
    }

    #[test]
    fn sine_tone_stays_within_amplitude() {
        let mut tone = SineTone::new(440.0, 44_100);
        for _ in 0..44_100 {
            assert!(tone.next_sample().abs() <= 0.1 + f32::EPSILON);
        }
    }

    #[test]
    fn stereo_wav_is_mixed_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..10 {
            writer.write_sample(i16::MAX).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let buffer = load_wav(&path).unwrap();
        assert_eq!(buffer.sample_rate, 22_050);
        assert_eq!(buffer.len(), 10);
        assert!((buffer.samples[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn missing_wav_is_a_resource_error() {
        let err = load_wav(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, ResourceError::SampleMissing { .. }));
        assert!(err.user_message().contains("not found"));
    }
}
