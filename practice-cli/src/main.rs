//! # practice - loop player, metronome and tuner for the terminal
//!
//! ## Architecture
//! - **Driver thread**: a [`practice_core::pacemaker::Pacemaker`] calls the
//!   active controller's `update` at the frame rate
//! - **Audio thread**: the CPAL callback renders the shared mixer
//! - **Input thread**: stdin lines parsed into [`input::Command`]s
//! - **Main thread**: selects over commands, controller updates and the
//!   optional deadline, and prints what happened

mod audio;
mod display;
mod input;
mod playback;
mod synth;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{Receiver, select};
use input::Command;
use practice_core::controller::drive;
use practice_core::pacemaker::frame_interval;
use practice_core::sink::LoggingSink;
use practice_core::source::{ChannelSource, FrequencyFeed, SimulatedSource};
use practice_core::{
    AudioLoop, AudioSink, Clock, FrequencySource, Instrument, LoopPlayer, Metronome,
    ModeController, PracticeConfig, ResourceError, SystemClock, Tuner,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "practice", version, about = "Loop player, metronome and tuner")]
struct Cli {
    /// TOML file with start-up defaults; missing is fine.
    #[arg(long, global = true, default_value = "practice.toml")]
    config: PathBuf,

    /// Do not open an audio device.
    #[arg(long, global = true)]
    silent: bool,

    /// Print one JSON object per event instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Click in time. Commands: + - bpm N, beats N, accent, restart, toggle, q
    Metronome {
        #[arg(long)]
        bpm: Option<f64>,
        /// Beats per measure, clamped to 2..=8.
        #[arg(long, allow_negative_numbers = true)]
        beats: Option<i64>,
        #[arg(long)]
        no_accent: bool,
        /// Stop after this many seconds.
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Play a loop at any tempo. Commands: + - bpm N, restart, mute, toggle, q
    Loop {
        /// WAV file; a built-in groove is used when absent.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Tempo the loop was recorded at.
        #[arg(long)]
        base_bpm: Option<f64>,
        #[arg(long)]
        bpm: Option<f64>,
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Chromatic tuner. Type frequencies in Hz, or: string N, auto,
    /// instrument guitar|bass, toggle, q
    Tune {
        #[arg(long)]
        instrument: Option<Instrument>,
        /// Read frequencies from a file, one per line.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Pace of file and simulated readings.
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
        /// Use the simulated input from the start.
        #[arg(long)]
        simulate: bool,
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Play a reference sine tone.
    Tone {
        #[arg(long, default_value_t = 440.0)]
        freq: f64,
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = PracticeConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?
        .sanitized();
    log::debug!("configuration: {config:?}");

    let output = open_output(cli.silent);
    let printer = Printer { json: cli.json };

    match cli.mode {
        Mode::Metronome {
            bpm,
            beats,
            no_accent,
            duration,
        } => run_metronome(&config, &output, printer, bpm, beats, no_accent, duration),
        Mode::Loop {
            file,
            base_bpm,
            bpm,
            duration,
        } => run_loop(&config, &output, printer, file, base_bpm, bpm, duration),
        Mode::Tune {
            instrument,
            input,
            interval_ms,
            simulate,
            duration,
        } => {
            let options = TuneOptions {
                instrument: instrument.unwrap_or(config.tuner.instrument),
                input,
                interval: Duration::from_millis(interval_ms.max(1)),
                simulate,
                duration: seconds(duration),
            };
            run_tuner(&config, printer, options)
        }
        Mode::Tone { freq, seconds } => run_tone(&output, freq, seconds),
    }
}

/// Opens the default output, or logs why not and carries on silently.
fn open_output(silent: bool) -> Option<audio::AudioOutput> {
    if silent {
        return None;
    }
    match audio::AudioOutput::open() {
        Ok(output) => Some(output),
        Err(e) => {
            let err = ResourceError::OutputUnavailable(e.to_string());
            log::warn!("{err}");
            eprintln!("{}", err.user_message());
            None
        }
    }
}

fn sink_for(output: &Option<audio::AudioOutput>) -> Box<dyn AudioSink> {
    match output {
        Some(output) => Box::new(output.sink()),
        None => Box::new(LoggingSink),
    }
}

fn seconds(value: Option<f64>) -> Option<Duration> {
    value
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(Duration::from_secs_f64)
}

#[derive(Debug, Clone, Copy)]
struct Printer {
    json: bool,
}

impl Printer {
    fn emit<U: Serialize>(&self, mode: &str, update: &U, text: impl FnOnce(&U) -> Option<String>) {
        if self.json {
            println!("{}", display::json_line(mode, update));
        } else if let Some(line) = text(update) {
            println!("{line}");
        }
    }
}

enum Event<U> {
    Command(Command),
    InputClosed,
    Update(U),
    UpdatesClosed,
    Deadline,
}

/// Drives `controller` until `q`, the deadline or Ctrl-C, printing every
/// update and routing commands through `on_command`. `finish` runs under
/// the lock before the driver stops.
fn run_session<T, U>(
    controller: &Arc<Mutex<T>>,
    updates: Receiver<U>,
    frame: Duration,
    duration: Option<Duration>,
    mut on_update: impl FnMut(&U),
    mut on_command: impl FnMut(&mut T, Command),
    finish: impl FnOnce(&mut T),
) -> Result<()>
where
    T: ModeController + 'static,
{
    let pacemaker = drive(Arc::clone(controller), frame).context("starting the driver thread")?;
    let mut commands = input::spawn_stdin_reader().context("starting the input thread")?;
    let deadline = duration.map_or_else(crossbeam_channel::never, crossbeam_channel::after);

    loop {
        let event = select! {
            recv(commands) -> msg => msg.map_or(Event::InputClosed, Event::Command),
            recv(updates) -> msg => msg.map_or(Event::UpdatesClosed, Event::Update),
            recv(deadline) -> _ => Event::Deadline,
        };

        match event {
            Event::Command(Command::Quit) | Event::UpdatesClosed | Event::Deadline => break,
            Event::Command(command) => {
                let mut controller = controller.lock().unwrap_or_else(|e| e.into_inner());
                on_command(&mut controller, command);
            }
            Event::InputClosed => {
                log::debug!("stdin closed");
                commands = crossbeam_channel::never();
            }
            Event::Update(update) => on_update(&update),
        }
    }

    {
        let mut controller = controller.lock().unwrap_or_else(|e| e.into_inner());
        finish(&mut controller);
    }
    pacemaker.stop();
    for update in updates.try_iter() {
        on_update(&update);
    }
    Ok(())
}

fn run_metronome(
    config: &PracticeConfig,
    output: &Option<audio::AudioOutput>,
    printer: Printer,
    bpm: Option<f64>,
    beats: Option<i64>,
    no_accent: bool,
    duration: Option<f64>,
) -> Result<()> {
    let mut tempo = config.tempo.tempo();
    if let Some(bpm) = bpm {
        tempo.set_bpm(bpm);
    }
    let mut meter = config.metronome.meter();
    if let Some(beats) = beats {
        meter.set_beats_per_measure(beats);
    }
    if no_accent {
        meter.set_accent_first_beat(false);
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut metronome = Metronome::new(sink_for(output), SystemClock, tempo, meter);
    metronome.set_listener(tx);
    metronome.start();
    if let Some(message) = metronome.error_message() {
        eprintln!("{message}");
    }
    let metronome = Arc::new(Mutex::new(metronome));

    run_session(
        &metronome,
        rx,
        frame_interval(config.scheduler.frame_rate_hz),
        seconds(duration),
        |update| printer.emit("metronome", update, display::metronome_update),
        |metronome, command| match command {
            Command::Increment => {
                metronome.increment();
            }
            Command::Decrement => {
                metronome.decrement();
            }
            Command::SetBpm(bpm) => {
                metronome.set_bpm(bpm);
            }
            Command::SetBeats(beats) => {
                metronome.set_beats_per_measure(beats);
            }
            Command::ToggleAccent => {
                let accent = metronome.meter().accent_first_beat();
                metronome.set_accent_first_beat(!accent);
            }
            Command::Restart => metronome.restart(),
            Command::Toggle => metronome.toggle(),
            other => log::warn!("{other:?} does nothing in metronome mode"),
        },
        |metronome| metronome.stop(),
    )
}

fn run_loop(
    config: &PracticeConfig,
    output: &Option<audio::AudioOutput>,
    printer: Printer,
    file: Option<PathBuf>,
    base_bpm: Option<f64>,
    bpm: Option<f64>,
    duration: Option<f64>,
) -> Result<()> {
    let mut tempo = config.tempo.tempo();
    if let Some(bpm) = bpm {
        tempo.set_bpm(bpm);
    }

    let file = file.or_else(|| config.looper.file.clone());
    let audio_loop = AudioLoop {
        name: file
            .as_deref()
            .and_then(|f| f.file_stem())
            .map_or_else(|| config.looper.name.clone(), |s| s.to_string_lossy().into_owned()),
        base_bpm: base_bpm
            .filter(|b| b.is_finite() && *b > 0.0)
            .unwrap_or(config.looper.base_bpm),
    };

    if let Some(output) = output {
        let buffer = match file.as_deref().map(synth::load_wav) {
            Some(Ok(buffer)) => buffer,
            Some(Err(e)) => {
                log::warn!("{e}");
                eprintln!("{}", e.user_message());
                synth::default_loop(output.sample_rate(), audio_loop.base_bpm)
            }
            None => synth::default_loop(output.sample_rate(), audio_loop.base_bpm),
        };
        output
            .mixer()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .set_loop(buffer);
    }

    log::info!("loop '{}' recorded at {:.0} BPM", audio_loop.name, audio_loop.base_bpm);
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut player = LoopPlayer::new(sink_for(output), SystemClock, tempo, audio_loop);
    player.set_listener(tx);
    player.play();
    if let Some(message) = player.error_message() {
        eprintln!("{message}");
    }
    let player = Arc::new(Mutex::new(player));

    run_session(
        &player,
        rx,
        frame_interval(config.scheduler.frame_rate_hz),
        seconds(duration),
        |update| printer.emit("loop", update, display::loop_update),
        |player, command| match command {
            Command::Increment => {
                player.increment();
            }
            Command::Decrement => {
                player.decrement();
            }
            Command::SetBpm(bpm) => {
                player.set_bpm(bpm);
            }
            Command::Restart => player.restart(),
            Command::ToggleMute => {
                player.toggle_mute();
            }
            Command::Toggle => player.toggle(),
            other => log::warn!("{other:?} does nothing in loop mode"),
        },
        |player| player.pause(),
    )
}

struct TuneOptions {
    instrument: Instrument,
    input: Option<PathBuf>,
    interval: Duration,
    simulate: bool,
    duration: Option<Duration>,
}

fn run_tuner(config: &PracticeConfig, printer: Printer, options: TuneOptions) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let simulated = || -> Box<dyn FrequencySource> {
        Box::new(SimulatedSource::new(Arc::clone(&clock), options.interval))
    };

    // Typed frequencies go through the feed when stdin is the live source.
    let mut feed: Option<FrequencyFeed> = None;
    let primary: Box<dyn FrequencySource> = match (&options.input, options.simulate) {
        (_, true) => simulated(),
        (Some(path), false) => Box::new(input::FileSource::new(
            path.clone(),
            options.interval,
            Arc::clone(&clock),
        )),
        (None, false) => {
            let (source, tx) = ChannelSource::new(Arc::clone(&clock));
            feed = Some(tx);
            Box::new(source)
        }
    };

    let settings = config.tuner.deviation();
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut tuner = Tuner::new(primary, SystemClock, options.instrument)
        .with_fallback(simulated())
        .with_settings(settings)
        .with_reference(config.tuner.reference_hz)
        .with_signal_timeout(config.tuner.signal_timeout());
    tuner.set_listener(tx);
    tuner.start().context("no frequency source could be started")?;
    let tuner = Arc::new(Mutex::new(tuner));

    run_session(
        &tuner,
        rx,
        frame_interval(config.scheduler.frame_rate_hz),
        options.duration,
        |update| printer.emit("tuner", update, |u| display::tuner_update(u, &settings)),
        |tuner, command| match command {
            Command::Frequency(frequency) => match &feed {
                Some(feed) if tuner.is_listening() && !tuner.is_simulated() => {
                    feed.push(frequency);
                }
                _ => log::warn!("typed frequencies are ignored with this input"),
            },
            Command::SelectString(number) => {
                if number > tuner.profile().len() {
                    log::warn!("{} has {} strings", tuner.instrument(), tuner.profile().len());
                } else {
                    tuner.select_string(number - 1);
                }
            }
            Command::Auto => tuner.auto_mode(),
            Command::Instrument(instrument) => tuner.set_instrument(instrument),
            Command::Toggle => tuner.toggle(),
            other => log::warn!("{other:?} does nothing in tuner mode"),
        },
        |tuner| tuner.stop(),
    )
}

fn run_tone(output: &Option<audio::AudioOutput>, freq: f64, seconds: f64) -> Result<()> {
    let Some(output) = output else {
        log::warn!("no audio output; nothing to play");
        return Ok(());
    };
    if !(freq.is_finite() && freq > 0.0) {
        anyhow::bail!("tone frequency must be positive, got {freq}");
    }

    let mixer = output.mixer();
    mixer.lock().unwrap_or_else(|e| e.into_inner()).set_tone(Some(freq));
    log::info!("playing {freq:.2} Hz for {seconds:.1} s");
    std::thread::sleep(Duration::from_secs_f64(seconds.clamp(0.0, 3600.0)));
    mixer.lock().unwrap_or_else(|e| e.into_inner()).set_tone(None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_each_mode() {
        let cli = Cli::try_parse_from([
            "practice", "--json", "metronome", "--bpm", "90", "--beats", "3",
        ])
        .unwrap();
        assert!(cli.json);
        let Mode::Metronome {
            bpm,
            beats,
            no_accent,
            duration,
        } = cli.mode
        else {
            panic!("expected metronome mode");
        };
        assert_eq!(bpm, Some(90.0));
        assert_eq!(beats, Some(3));
        assert!(!no_accent);
        assert_eq!(duration, None);

        let cli = Cli::try_parse_from(["practice", "tune", "--instrument", "bass", "--simulate"])
            .unwrap();
        let Mode::Tune {
            instrument,
            simulate,
            interval_ms,
            ..
        } = cli.mode
        else {
            panic!("expected tune mode");
        };
        assert_eq!(instrument, Some(Instrument::Bass));
        assert!(simulate);
        assert_eq!(interval_ms, 100);

        let cli = Cli::try_parse_from(["practice", "loop", "--silent", "--base-bpm", "100"]).unwrap();
        assert!(cli.silent);
        assert!(matches!(cli.mode, Mode::Loop { base_bpm: Some(b), .. } if b == 100.0));
    }

    #[test]
    fn negative_beats_reach_the_meter_and_clamp() {
        let cli = Cli::try_parse_from(["practice", "metronome", "--beats", "-1"]).unwrap();
        let Mode::Metronome { beats, .. } = cli.mode else {
            panic!("expected metronome mode");
        };
        assert_eq!(beats, Some(-1));

        let mut meter = practice_core::Meter::default();
        assert_eq!(meter.set_beats_per_measure(beats.unwrap()), 2);
    }

    #[test]
    fn cli_rejects_unknown_instrument() {
        assert!(Cli::try_parse_from(["practice", "tune", "--instrument", "ukulele"]).is_err());
    }

    #[test]
    fn durations_must_be_positive() {
        assert_eq!(seconds(Some(1.5)), Some(Duration::from_millis(1500)));
        assert_eq!(seconds(Some(0.0)), None);
        assert_eq!(seconds(Some(f64::NAN)), None);
        assert_eq!(seconds(None), None);
    }
}
