//! # Configuration Module
//!
//! Start-up defaults read from an optional TOML file. The file is only ever
//! read; settings changed while running are not written back.
//!
//! Like every other input to the core, configuration values are clamped
//! rather than rejected: [`PracticeConfig::sanitized`] repairs anything out
//! of range so a bad file still yields a playable state.
//!
//! ```toml
//! [tempo]
//! default = 96
//!
//! [metronome]
//! beats_per_measure = 3
//!
//! [tuner]
//! instrument = "bass"
//! tolerance_hz = 0.5
//! ```

use crate::deviation::DeviationSettings;
use crate::error::ConfigError;
use crate::pacemaker::DEFAULT_FRAME_RATE_HZ;
use crate::tempo::{DEFAULT_BPM, Meter, Tempo, TempoRange};
use crate::tuning::{A4_HZ, Instrument};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a tuner reading stays valid without a new sample.
pub const DEFAULT_SIGNAL_TIMEOUT_MS: u64 = 1_000;

/// Everything a front end needs to build the three controllers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeConfig {
    pub tempo: TempoConfig,
    pub metronome: MetronomeConfig,
    pub looper: LooperConfig,
    pub tuner: TunerConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        let range = TempoRange::default();
        Self {
            min: range.min,
            max: range.max,
            step: range.step,
            default: DEFAULT_BPM,
        }
    }
}

impl TempoConfig {
    pub fn range(&self) -> TempoRange {
        TempoRange::new(self.min, self.max, self.step)
    }

    /// The configured starting tempo, clamped into the configured range.
    pub fn tempo(&self) -> Tempo {
        Tempo::with_range(self.default, self.range())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Signed so a negative value clamps instead of failing the whole file.
    pub beats_per_measure: i64,
    pub accent_first_beat: bool,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        let meter = Meter::default();
        Self {
            beats_per_measure: i64::from(meter.beats_per_measure()),
            accent_first_beat: meter.accent_first_beat(),
        }
    }
}

impl MetronomeConfig {
    pub fn meter(&self) -> Meter {
        Meter::new(self.beats_per_measure, self.accent_first_beat)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LooperConfig {
    pub name: String,
    /// Tempo the loop material was recorded at.
    pub base_bpm: f64,
    /// WAV file to loop; the front end synthesizes one when absent.
    pub file: Option<PathBuf>,
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            name: "La Bourtsadoros".to_string(),
            base_bpm: DEFAULT_BPM,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub instrument: Instrument,
    pub tolerance_hz: f64,
    pub cents_per_unit: f64,
    pub max_offset: f64,
    /// A4 used for note names and as the fallback target.
    pub reference_hz: f64,
    /// A reading older than this counts as "no signal".
    pub signal_timeout_ms: i64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        let deviation = DeviationSettings::default();
        Self {
            instrument: Instrument::default(),
            tolerance_hz: deviation.tolerance_hz,
            cents_per_unit: deviation.cents_per_unit,
            max_offset: deviation.max_offset,
            reference_hz: A4_HZ,
            signal_timeout_ms: DEFAULT_SIGNAL_TIMEOUT_MS as i64,
        }
    }
}

impl TunerConfig {
    pub fn deviation(&self) -> DeviationSettings {
        DeviationSettings {
            cents_per_unit: self.cents_per_unit,
            max_offset: self.max_offset,
            tolerance_hz: self.tolerance_hz,
        }
        .sanitized()
    }

    pub fn signal_timeout(&self) -> Duration {
        let millis = u64::try_from(self.signal_timeout_ms).unwrap_or(DEFAULT_SIGNAL_TIMEOUT_MS);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often phase updates are computed.
    pub frame_rate_hz: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: DEFAULT_FRAME_RATE_HZ,
        }
    }
}

impl PracticeConfig {
    /// Parses TOML text. Missing sections and fields take their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: PracticeConfig = toml::from_str(text)?;
        Ok(config.sanitized())
    }

    /// Reads `path`, or returns the defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml(&text)?;
                log::info!("loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::ReadFile {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Clamps or replaces every out-of-range value.
    pub fn sanitized(mut self) -> Self {
        let range = self.tempo.range();
        self.tempo = TempoConfig {
            min: range.min,
            max: range.max,
            step: range.step,
            default: Tempo::with_range(self.tempo.default, range).bpm(),
        };

        self.metronome.beats_per_measure = i64::from(self.metronome.meter().beats_per_measure());

        if !(self.looper.base_bpm.is_finite() && self.looper.base_bpm > 0.0) {
            log::warn!("invalid loop base tempo {}, using {DEFAULT_BPM}", self.looper.base_bpm);
            self.looper.base_bpm = DEFAULT_BPM;
        }

        let deviation = self.tuner.deviation();
        self.tuner.cents_per_unit = deviation.cents_per_unit;
        self.tuner.max_offset = deviation.max_offset;
        self.tuner.tolerance_hz = deviation.tolerance_hz;
        if !(self.tuner.reference_hz.is_finite() && self.tuner.reference_hz > 0.0) {
            self.tuner.reference_hz = A4_HZ;
        }
        if self.tuner.signal_timeout_ms <= 0 {
            log::warn!(
                "invalid signal timeout {} ms, using {DEFAULT_SIGNAL_TIMEOUT_MS}",
                self.tuner.signal_timeout_ms
            );
            self.tuner.signal_timeout_ms = DEFAULT_SIGNAL_TIMEOUT_MS as i64;
        }

        if !(self.scheduler.frame_rate_hz.is_finite() && self.scheduler.frame_rate_hz > 0.0) {
            self.scheduler.frame_rate_hz = DEFAULT_FRAME_RATE_HZ;
        }
        self
    }
}
