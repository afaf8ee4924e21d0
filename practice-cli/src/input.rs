//! Line-based commands read from stdin, and a frequency source backed by a
//! text stream.

use crossbeam_channel::{Receiver, Sender};
use practice_core::source::{ChannelSource, FrequencyFeed};
use practice_core::{AudioSession, Clock, FrequencySource, Instrument, PitchSample, ResourceError};
use std::io::BufRead;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Something the user typed.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Increment,
    Decrement,
    SetBpm(f64),
    /// Clamped to the meter's range by the metronome.
    SetBeats(i64),
    ToggleAccent,
    Restart,
    ToggleMute,
    Toggle,
    /// 1-based string number as typed.
    SelectString(usize),
    Auto,
    Instrument(Instrument),
    /// A bare number: a frequency reading for the tuner.
    Frequency(f64),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised command: {0}")]
pub struct ParseCommandError(String);

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let err = || ParseCommandError(line.trim().to_string());
        let mut words = line.split_whitespace();
        let head = words.next().ok_or_else(err)?;
        let arg = words.next();
        if words.next().is_some() {
            return Err(err());
        }

        let command = match (head.to_ascii_lowercase().as_str(), arg) {
            ("+", None) => Command::Increment,
            ("-", None) => Command::Decrement,
            ("bpm", Some(n)) => Command::SetBpm(n.parse().map_err(|_| err())?),
            ("beats", Some(n)) => Command::SetBeats(n.parse().map_err(|_| err())?),
            ("accent", None) => Command::ToggleAccent,
            ("restart", None) => Command::Restart,
            ("mute", None) => Command::ToggleMute,
            ("toggle" | "p", None) => Command::Toggle,
            ("string", Some(n)) => match n.parse::<usize>() {
                Ok(n) if n >= 1 => Command::SelectString(n),
                _ => return Err(err()),
            },
            ("auto", None) => Command::Auto,
            ("instrument", Some(name)) => Command::Instrument(name.parse().map_err(|_| err())?),
            ("q" | "quit", None) => Command::Quit,
            (number, None) => match number.parse::<f64>() {
                Ok(f) if f.is_finite() => Command::Frequency(f),
                _ => return Err(err()),
            },
            _ => return Err(err()),
        };
        Ok(command)
    }
}

/// Reads commands from stdin on a background thread. The channel closes
/// when stdin does.
pub fn spawn_stdin_reader() -> std::io::Result<Receiver<Command>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || read_commands(std::io::stdin().lock(), &tx))?;
    Ok(rx)
}

fn read_commands(reader: impl BufRead, tx: &Sender<Command>) {
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if tx.send(command).is_err() {
                    break;
                }
            }
            Err(e) => log::warn!("{e}"),
        }
    }
}

/// Frequencies read one per line from a file, paced at `interval`.
///
/// Opening the file happens in `start`, so a missing file surfaces as
/// [`ResourceError::InputUnavailable`] and the tuner can fall back.
pub struct FileSource {
    path: PathBuf,
    interval: Duration,
    clock: Arc<dyn Clock>,
    inner: Option<(ChannelSource, JoinHandle<()>)>,
}

impl FileSource {
    pub fn new(path: PathBuf, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            path,
            interval,
            clock,
            inner: None,
        }
    }
}

impl FrequencySource for FileSource {
    fn start(&mut self, session: &AudioSession) -> Result<Receiver<PitchSample>, ResourceError> {
        self.stop();
        let file = std::fs::File::open(&self.path).map_err(|e| {
            ResourceError::InputUnavailable(format!("{}: {e}", self.path.display()))
        })?;

        let (mut source, feed) = ChannelSource::new(Arc::clone(&self.clock));
        let rx = source.start(session)?;
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("file-source".into())
            .spawn(move || feed_lines(std::io::BufReader::new(file), &feed, interval))
            .map_err(|e| ResourceError::InputUnavailable(format!("reader thread: {e}")))?;

        log::info!("reading frequencies from {}", self.path.display());
        self.inner = Some((source, handle));
        Ok(rx)
    }

    fn stop(&mut self) {
        // The reader exits once every receiver of the feed is gone.
        if let Some((mut source, _handle)) = self.inner.take() {
            source.stop();
        }
    }
}

fn feed_lines(reader: impl BufRead, feed: &FrequencyFeed, interval: Duration) {
    for line in reader.lines() {
        let Ok(line) = line else { break };
        let Ok(frequency) = line.trim().parse::<f64>() else {
            continue;
        };
        if !feed.push(frequency) {
            break;
        }
        thread::sleep(interval);
    }
    log::debug!("frequency file exhausted");
}
