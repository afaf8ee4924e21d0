//! Terminal rendering of controller updates: a short text line per event,
//! or one JSON object per line with `--json`.

use practice_core::controller::{LoopUpdate, MetronomeUpdate, TunerUpdate};
use practice_core::tuning::note_label;
use practice_core::{DeviationSettings, TunerReading, TuningMode};
use serde::Serialize;

/// Cells on each side of the centre mark.
const NEEDLE_HALF_WIDTH: usize = 20;

/// Tagged wrapper so every JSON line says which mode produced it.
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    mode: &'a str,
    event: &'a T,
}

pub fn json_line<T: Serialize>(mode: &str, event: &T) -> String {
    serde_json::to_string(&Envelope { mode, event })
        .unwrap_or_else(|e| format!("{{\"mode\":\"{mode}\",\"error\":\"{e}\"}}"))
}

/// `[-----------|---*-------]` with the marker at the needle position.
pub fn needle_bar(position: f64, settings: &DeviationSettings) -> String {
    let width = NEEDLE_HALF_WIDTH * 2 + 1;
    let normalized = if settings.max_offset > 0.0 {
        (position / settings.max_offset).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let marker = ((normalized + 1.0) * NEEDLE_HALF_WIDTH as f64).round() as usize;

    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    for i in 0..width {
        bar.push(if i == marker {
            '*'
        } else if i == NEEDLE_HALF_WIDTH {
            '|'
        } else {
            '-'
        });
    }
    bar.push(']');
    bar
}

pub fn tuner_reading(reading: &TunerReading, settings: &DeviationSettings) -> String {
    if !reading.has_signal() {
        return format!("{:>3}  {:>9}  {}", note_label(None), "---", needle_bar(0.0, settings));
    }
    let status = if reading.deviation.in_tune { "in tune" } else { "" };
    format!(
        "{:>3}  {:>7.2} Hz  {}  {:+6.1} c  -> {:.2} Hz  {}",
        note_label(reading.note),
        reading.frequency,
        needle_bar(reading.deviation.needle_position, settings),
        reading.deviation.cents,
        reading.target_frequency,
        status
    )
    .trim_end()
    .to_string()
}

/// Text for a tuner event, or `None` for events not worth a line.
pub fn tuner_update(update: &TunerUpdate, settings: &DeviationSettings) -> Option<String> {
    let line = match update {
        TunerUpdate::Listening { simulated: true } => "listening (simulated input)".to_string(),
        TunerUpdate::Listening { simulated: false } => "listening".to_string(),
        TunerUpdate::Stopped => "stopped".to_string(),
        TunerUpdate::Reading(reading) => tuner_reading(reading, settings),
        TunerUpdate::InstrumentChanged(instrument) => format!("instrument: {instrument}"),
        TunerUpdate::ModeChanged(TuningMode::Auto) => "mode: auto".to_string(),
        TunerUpdate::ModeChanged(TuningMode::Manual { string_index }) => {
            format!("mode: string {}", string_index + 1)
        }
        TunerUpdate::Degraded(message) => message.clone(),
    };
    Some(line)
}

pub fn metronome_update(update: &MetronomeUpdate) -> Option<String> {
    let line = match update {
        MetronomeUpdate::Started { bpm } => format!("metronome started at {bpm:.0} BPM"),
        MetronomeUpdate::Stopped => "metronome stopped".to_string(),
        MetronomeUpdate::Beat { beat, accented } => {
            format!("{} {}", beat + 1, if *accented { "●" } else { "○" })
        }
        MetronomeUpdate::Progress(_) => return None,
        MetronomeUpdate::TempoChanged(bpm) => format!("tempo: {bpm:.0} BPM"),
        MetronomeUpdate::MeterChanged {
            beats_per_measure,
            accent_first_beat,
        } => format!(
            "meter: {beats_per_measure} beats{}",
            if *accent_first_beat { ", accented" } else { "" }
        ),
    };
    Some(line)
}

pub fn loop_update(update: &LoopUpdate) -> Option<String> {
    let line = match update {
        LoopUpdate::Playing => "loop playing".to_string(),
        LoopUpdate::Paused => "loop paused".to_string(),
        LoopUpdate::Restarted => "loop restarted".to_string(),
        LoopUpdate::Progress(_) => return None,
        LoopUpdate::Cycle(n) => format!("cycle {n}"),
        LoopUpdate::TempoChanged { bpm, rate } => format!("tempo: {bpm:.0} BPM (rate {rate:.3})"),
        LoopUpdate::VolumeChanged(v) if *v == 0.0 => "muted".to_string(),
        LoopUpdate::VolumeChanged(_) => "unmuted".to_string(),
    };
    Some(line)
}
