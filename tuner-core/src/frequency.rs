//! # Frequency Model
//!
//! Equal-temperament calculations for a six-string guitar tuned against an adjustable
//! Concert A reference.
//!
//! ## Features
//! - Fixed standard-tuning string table (E4 down to E2)
//! - Target frequency of every string for a given reference pitch
//! - Cent deviation and its inverse
//! - Nearest-string lookup for a measured frequency
//!
//! Every function here is pure: no state, no I/O.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

use crate::error::{TunerError, TunerResult};

/// Number of strings on the instrument.
pub const STRING_COUNT: usize = 6;

/// A single guitar string of the standard tuning table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringDefinition {
    /// Stable position in the table (0 is the thinnest string).
    pub index: usize,
    /// Note name (e.g., "E4", "A2")
    pub name: &'static str,
    /// Semitones relative to the A2 string.
    pub semitones: i32,
    /// Label shown to the user.
    pub display_name: &'static str,
}

/// Standard tuning, thinnest string first.
pub const STRINGS: [StringDefinition; STRING_COUNT] = [
    StringDefinition { index: 0, name: "E4", semitones: 19, display_name: "1st (E4)" },
    StringDefinition { index: 1, name: "B3", semitones: 14, display_name: "2nd (B3)" },
    StringDefinition { index: 2, name: "G3", semitones: 10, display_name: "3rd (G3)" },
    StringDefinition { index: 3, name: "D3", semitones: 5, display_name: "4th (D3)" },
    StringDefinition { index: 4, name: "A2", semitones: 0, display_name: "5th (A2)" },
    StringDefinition { index: 5, name: "E2", semitones: -5, display_name: "6th (E2)" },
];

/// Static map for note name to string index lookups.
static STRING_MAP: Lazy<BTreeMap<&'static str, usize>> = Lazy::new(|| {
    STRINGS
        .iter()
        .map(|string| (string.name, string.index))
        .collect()
});

/// The string closest to a measured frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StringMatch {
    /// Index into [`STRINGS`].
    pub index: usize,
    /// Target frequency of that string in Hz.
    pub target_frequency: f64,
    /// Signed deviation in cents (positive = sharp, negative = flat).
    pub deviation_cents: f64,
}

impl StringMatch {
    /// The matched string's definition.
    pub fn definition(&self) -> &'static StringDefinition {
        &STRINGS[self.index]
    }
}

/// Looks up a string definition by index.
pub fn string_definition(index: usize) -> TunerResult<&'static StringDefinition> {
    STRINGS
        .get(index)
        .ok_or(TunerError::InvalidStringIndex { index })
}

/// Gets the string index from a note name such as "A2".
pub fn string_index_by_name(name: &str) -> Option<usize> {
    STRING_MAP.get(name).copied()
}

/// Calculates the target frequency of a string for the given reference pitch.
///
/// The reference is doubled before the semitone offset is applied, so the A2 string (offset 0)
/// sits at twice the reference: 880 Hz for a 440 Hz reference.
///
/// # Arguments
/// * `string_index` - Index into [`STRINGS`] (0-5)
/// * `reference_pitch` - Concert A in Hz
///
/// # Returns
/// * `Ok(frequency)` - Target frequency in Hz
/// * `Err(TunerError::InvalidStringIndex)` - Index outside the table
pub fn string_target_frequency(string_index: usize, reference_pitch: f64) -> TunerResult<f64> {
    let string = string_definition(string_index)?;
    Ok(target_for(string, reference_pitch))
}

/// Target frequencies of every string, in table order.
pub fn string_target_frequencies(reference_pitch: f64) -> [f64; STRING_COUNT] {
    STRINGS.map(|string| target_for(&string, reference_pitch))
}

fn target_for(string: &StringDefinition, reference_pitch: f64) -> f64 {
    let octave_base = reference_pitch * 2.0;
    octave_base * 2.0_f64.powf(string.semitones as f64 / 12.0)
}

/// Calculates the deviation from a reference frequency in cents.
///
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
///
/// Returns 0 when either frequency is not positive (silence guard).
pub fn frequency_to_cents(frequency: f64, reference: f64) -> f64 {
    if frequency <= 0.0 || reference <= 0.0 {
        return 0.0;
    }
    1200.0 * (frequency / reference).log2()
}

/// Converts a cent offset back into a frequency. Exact inverse of [`frequency_to_cents`].
pub fn cents_to_frequency(cents: f64, reference: f64) -> f64 {
    reference * 2.0_f64.powf(cents / 1200.0)
}

/// Finds the string whose target is closest (in cents) to a measured frequency.
///
/// Strings are scanned in index order and only a strictly smaller deviation replaces the
/// current best, so ties go to the lower index.
///
/// # Returns
/// * `Some(match)` - Closest string, if its deviation is within `max_deviation_cents`
/// * `None` - Every string is farther away than `max_deviation_cents`
pub fn nearest_string(
    frequency: f64,
    reference_pitch: f64,
    max_deviation_cents: f64,
) -> Option<StringMatch> {
    let mut closest: Option<StringMatch> = None;

    for string in &STRINGS {
        let target_frequency = target_for(string, reference_pitch);
        let deviation_cents = frequency_to_cents(frequency, target_frequency);

        let better = closest
            .as_ref()
            .map_or(true, |best| deviation_cents.abs() < best.deviation_cents.abs());
        if better {
            closest = Some(StringMatch {
                index: string.index,
                target_frequency,
                deviation_cents,
            });
        }
    }

    closest.filter(|best| best.deviation_cents.abs() <= max_deviation_cents)
}

/// Converts a linear amplitude (0-1) to decibels. Silence maps to negative infinity.
pub fn amplitude_to_db(amplitude: f64) -> f64 {
    if amplitude <= 0.0 {
        return f64::NEG_INFINITY;
    }
    20.0 * amplitude.log10()
}
