//! # Frequency Source Module
//!
//! The input side of the tuner. A [`FrequencySource`] delivers
//! [`PitchSample`]s over a crossbeam channel at its own cadence; the core
//! never estimates pitch itself.
//!
//! ## Sources
//! - [`ChannelSource`]: samples pushed in from outside through a [`FrequencyFeed`]
//! - [`SimulatedSource`]: a slow drift around A440, used when no real input
//!   is available

use crate::clock::Clock;
use crate::error::ResourceError;
use crate::pacemaker::Pacemaker;
use crate::sink::AudioSession;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A frequency reading from the outside world. Consumed once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSample {
    /// Hz; zero or less means "no signal".
    pub frequency: f64,
    pub measured_at: Instant,
}

/// Something that produces frequency readings.
pub trait FrequencySource: Send {
    /// Begins delivering samples on the returned channel.
    fn start(&mut self, session: &AudioSession) -> Result<Receiver<PitchSample>, ResourceError>;

    /// Stops delivery. Samples already queued may still be drained.
    fn stop(&mut self);
}

/// Push side of a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct FrequencyFeed {
    tx: Sender<PitchSample>,
    clock: Arc<dyn Clock>,
}

impl FrequencyFeed {
    /// Sends a reading stamped with the feed's clock. Returns false once the
    /// source has been dropped.
    pub fn push(&self, frequency: f64) -> bool {
        self.tx
            .send(PitchSample {
                frequency,
                measured_at: self.clock.now(),
            })
            .is_ok()
    }
}

/// Source fed from outside the core (stdin, a file, another thread).
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<PitchSample>,
    listening: bool,
}

impl ChannelSource {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, FrequencyFeed) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            Self {
                rx,
                listening: false,
            },
            FrequencyFeed { tx, clock },
        )
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }
}

impl FrequencySource for ChannelSource {
    fn start(&mut self, _session: &AudioSession) -> Result<Receiver<PitchSample>, ResourceError> {
        // Anything pushed while idle is stale.
        while self.rx.try_recv().is_ok() {}
        self.listening = true;
        Ok(self.rx.clone())
    }

    fn stop(&mut self) {
        self.listening = false;
    }
}

/// Centre of the simulated drift.
const SIMULATED_CENTER_HZ: f64 = 440.0;
/// Peak deviation of the simulated drift.
const SIMULATED_SWING_HZ: f64 = 10.0;

/// Stand-in input: `440 + 10 * sin(t)` Hz, one reading per interval.
#[derive(Debug)]
pub struct SimulatedSource {
    clock: Arc<dyn Clock>,
    interval: Duration,
    worker: Option<Pacemaker>,
}

impl SimulatedSource {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            worker: None,
        }
    }

    /// Frequency the simulation reports `elapsed` after it started.
    pub fn frequency_at(elapsed: Duration) -> f64 {
        SIMULATED_CENTER_HZ + elapsed.as_secs_f64().sin() * SIMULATED_SWING_HZ
    }
}

impl FrequencySource for SimulatedSource {
    fn start(&mut self, _session: &AudioSession) -> Result<Receiver<PitchSample>, ResourceError> {
        self.stop();
        let (tx, rx) = crossbeam_channel::unbounded();
        let clock = Arc::clone(&self.clock);
        let origin = clock.now();

        let worker = Pacemaker::spawn("simulated-source", self.interval, move || {
            let now = clock.now();
            let frequency = Self::frequency_at(now.saturating_duration_since(origin));
            let _ = tx.send(PitchSample {
                frequency,
                measured_at: now,
            });
        })
        .map_err(|e| ResourceError::InputUnavailable(format!("simulation thread: {e}")))?;

        log::info!("running in simulation mode");
        self.worker = Some(worker);
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};

    #[test]
    fn channel_source_delivers_pushed_samples() {
        let clock = ManualClock::new();
        let (mut source, feed) = ChannelSource::new(Arc::new(clock.clone()));
        let rx = source.start(&AudioSession::MEASUREMENT).unwrap();
        assert!(source.is_listening());

        assert!(feed.push(329.6));
        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.frequency, 329.6);
        assert_eq!(sample.measured_at, clock.now());
    }

    #[test]
    fn channel_source_discards_samples_pushed_while_idle() {
        let (mut source, feed) = ChannelSource::new(Arc::new(SystemClock));
        feed.push(100.0);
        let rx = source.start(&AudioSession::MEASUREMENT).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn simulated_frequency_swings_around_a440() {
        assert_eq!(SimulatedSource::frequency_at(Duration::ZERO), 440.0);
        let peak = SimulatedSource::frequency_at(Duration::from_secs_f64(std::f64::consts::FRAC_PI_2));
        assert!((peak - 450.0).abs() < 1e-9);
        for ms in (0..10_000).step_by(137) {
            let f = SimulatedSource::frequency_at(Duration::from_millis(ms));
            assert!((430.0..=450.0).contains(&f));
        }
    }

    #[test]
    fn simulated_source_produces_samples_until_stopped() {
        let mut source = SimulatedSource::new(Arc::new(SystemClock), Duration::from_millis(2));
        let rx = source.start(&AudioSession::MEASUREMENT).unwrap();
        let sample = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!((430.0..=450.0).contains(&sample.frequency));
        source.stop();
        while rx.try_recv().is_ok() {}
        std::thread::sleep(Duration::from_millis(10));
        assert!(rx.try_recv().is_err());
    }
}
