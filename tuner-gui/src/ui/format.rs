//! Text formatting for the display.

use tuner_core::frequency::{self, STRINGS};
use tuner_core::reference_pitch::{MAX_REFERENCE_PITCH, MIN_REFERENCE_PITCH};
use tuner_core::{Event, ReferencePitchManager, TuningStatus};

pub fn format_frequency(hz: f64) -> String {
    format!("{:.2} Hz", hz)
}

pub fn format_reference(hz: f64) -> String {
    format!("{:.1} Hz", hz)
}

pub fn format_cents(cents: f64) -> String {
    format!("{:+.1} cents", cents)
}

pub fn format_level(db: f64) -> String {
    if db.is_finite() {
        format!("{:.1} dB", db)
    } else {
        "-inf dB".to_string()
    }
}

/// Text shown in the reference pitch entry field.
pub fn reference_input_text(hz: f64) -> String {
    format!("{:.1}", hz)
}

/// Parses a typed reference pitch, rounded to the slider step.
pub fn parse_reference_input(input: &str) -> Result<f64, String> {
    let trimmed = input.trim().trim_end_matches("Hz").trim_end();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| format!("'{}' is not a number", input.trim()))?;
    ReferencePitchManager::validate_and_normalize(value).ok_or_else(|| {
        format!(
            "Reference must be between {:.1} and {:.1} Hz",
            MIN_REFERENCE_PITCH, MAX_REFERENCE_PITCH
        )
    })
}

/// Offset of a reference pitch from 440 Hz, e.g. "+2.0 Hz (+7.9 cents)".
pub fn format_reference_offset(reference_pitch: f64, standard: f64) -> String {
    format!(
        "{:+.1} Hz ({})",
        reference_pitch - standard,
        format_cents(frequency::frequency_to_cents(reference_pitch, standard))
    )
}

pub fn status_label(status: TuningStatus) -> &'static str {
    match status {
        TuningStatus::Silent => "Play a string",
        TuningStatus::Analyzing => "Listening...",
        TuningStatus::Tuned => "In tune",
        TuningStatus::Sharp => "Sharp - tune down",
        TuningStatus::Flat => "Flat - tune up",
        TuningStatus::OutOfRange => "Out of range",
    }
}

fn string_label(index: usize) -> &'static str {
    STRINGS.get(index).map_or("?", |string| string.display_name)
}

/// Status line text for a bus event, if it is worth showing.
pub fn describe_event(event: &Event) -> Option<String> {
    let message = match event {
        Event::AudioInitialized { sample_rate } => format!("Audio ready ({} Hz)", sample_rate),
        Event::MicrophoneStarted { .. } => "Microphone active".to_string(),
        Event::ToneStarted {
            frequency,
            duration: Some(seconds),
            ..
        } => format!("Playing {} for {:.0}s", format_frequency(*frequency), seconds),
        Event::ToneStarted { frequency, .. } => format!("Playing {}", format_frequency(*frequency)),
        Event::ToneStopped { .. } => "Tone stopped".to_string(),
        Event::ReferencePitchReset { value } => {
            format!("Reference reset to {}", format_reference(*value))
        }
        Event::StringDetected { index, .. } => format!("Detected {}", string_label(*index)),
        Event::ErrorOccurred { kind, message } => format!("Error ({}): {}", kind, message),
        _ => return None,
    };
    Some(message)
}
