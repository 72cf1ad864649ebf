//! # Tuner Module
//!
//! The coordinator the GUI talks to. It owns the reference pitch manager and the audio backend,
//! shares the event bus with them and keeps the user-facing state: mode, selected string, tone
//! duration and the tuning indicator.
//!
//! Pitch detection is not done here. Measured frequencies come from whatever detector the host
//! plugs in, through [`Tuner::update_input`].

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::audio::{AudioBackend, AudioStatus};
use crate::config::{TunerConfig, TunerSettings};
use crate::error::TunerResult;
use crate::events::{Event, EventBus, EventKind};
use crate::frequency;
use crate::reference_pitch::{ReferencePitchManager, ReferencePitchStats};
use crate::storage::Storage;

/// What the user is doing with the tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TunerMode {
    /// Playing reference tones.
    #[default]
    Reference,
    /// Tuning against the selected string.
    Tuner,
    /// Tuning against whichever string is closest to the input.
    Auto,
}

impl TunerMode {
    pub const ALL: [TunerMode; 3] = [TunerMode::Reference, TunerMode::Tuner, TunerMode::Auto];

    pub fn as_str(&self) -> &'static str {
        match self {
            TunerMode::Reference => "reference",
            TunerMode::Tuner => "tuner",
            TunerMode::Auto => "auto",
        }
    }

    /// Button label.
    pub fn label(&self) -> &'static str {
        match self {
            TunerMode::Reference => "Reference",
            TunerMode::Tuner => "Tuner",
            TunerMode::Auto => "Auto",
        }
    }
}

impl fmt::Display for TunerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a reference tone plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToneDuration {
    /// Stops by itself after the timed tone length (two seconds unless configured otherwise).
    #[default]
    TwoSeconds,
    /// Plays until stopped.
    Infinite,
}

/// Timed tone length used when the configured one is not a representable duration.
const FALLBACK_TIMED_TONE: Duration = Duration::from_secs(2);

impl ToneDuration {
    /// `None` plays until stopped. A timed length that cannot be represented (negative, NaN,
    /// too large) falls back to two seconds.
    pub fn to_duration(self, timed_tone_seconds: f64) -> Option<Duration> {
        match self {
            ToneDuration::TwoSeconds => Some(
                Duration::try_from_secs_f64(timed_tone_seconds).unwrap_or(FALLBACK_TIMED_TONE),
            ),
            ToneDuration::Infinite => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ToneDuration::TwoSeconds => "2s",
            ToneDuration::Infinite => "∞",
        }
    }
}

/// State of the tuning indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TuningStatus {
    /// Input below the silence threshold.
    #[default]
    Silent,
    /// Sound, but no frequency to compare.
    Analyzing,
    Tuned,
    Sharp,
    Flat,
    /// Too far from any usable target.
    OutOfRange,
}

impl TuningStatus {
    /// Classifies a deviation. `tolerance` is exclusive, `max_deviation` inclusive.
    pub fn from_cents(cents: f64, tolerance: f64, max_deviation: f64) -> Self {
        if !cents.is_finite() || cents.abs() > max_deviation {
            TuningStatus::OutOfRange
        } else if cents.abs() < tolerance {
            TuningStatus::Tuned
        } else if cents > 0.0 {
            TuningStatus::Sharp
        } else {
            TuningStatus::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TuningStatus::Silent => "silent",
            TuningStatus::Analyzing => "analyzing",
            TuningStatus::Tuned => "tuned",
            TuningStatus::Sharp => "sharp",
            TuningStatus::Flat => "flat",
            TuningStatus::OutOfRange => "out-of-range",
        }
    }
}

impl fmt::Display for TuningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one [`Tuner::update_input`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuningReading {
    pub status: TuningStatus,
    pub level_db: f64,
    pub measured_frequency: Option<f64>,
    /// String the reading was compared against.
    pub string_index: Option<usize>,
    pub target_frequency: Option<f64>,
    /// Smoothed deviation from the target.
    pub cents: Option<f64>,
    pub is_stable: bool,
}

/// Moving average of cent readings with a stability check.
#[derive(Debug, Clone)]
pub struct CentsSmoother {
    window: usize,
    stabilization_count: usize,
    tolerance: f64,
    values: VecDeque<f64>,
}

impl CentsSmoother {
    pub fn new(window: usize, stabilization_count: usize, tolerance: f64) -> Self {
        let window = window.max(1);
        let stabilization_count = stabilization_count.max(1);
        Self {
            window,
            stabilization_count,
            tolerance,
            values: VecDeque::with_capacity(window.max(stabilization_count)),
        }
    }

    pub fn from_settings(settings: &TunerSettings) -> Self {
        Self::new(
            settings.smoothing_window,
            settings.stabilization_count,
            settings.stabilization_tolerance_cents,
        )
    }

    /// Adds a reading and returns the new average.
    pub fn push(&mut self, cents: f64) -> f64 {
        self.values.push_back(cents);
        while self.values.len() > self.window.max(self.stabilization_count) {
            self.values.pop_front();
        }
        self.recent(self.window).sum::<f64>() / self.values.len().min(self.window) as f64
    }

    /// Average of the last `window` readings.
    pub fn average(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let count = self.values.len().min(self.window);
        Some(self.recent(self.window).sum::<f64>() / count as f64)
    }

    /// True once the last `stabilization_count` readings all sit within the tolerance of their
    /// mean.
    pub fn is_stable(&self) -> bool {
        if self.values.len() < self.stabilization_count {
            return false;
        }
        let mean = self.recent(self.stabilization_count).sum::<f64>() / self.stabilization_count as f64;
        self.recent(self.stabilization_count)
            .all(|value| (value - mean).abs() <= self.tolerance)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn recent(&self, count: usize) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .skip(self.values.len().saturating_sub(count))
            .copied()
    }
}

/// Diagnostics snapshot, serializable for logging or a debug view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TunerStats {
    pub mode: TunerMode,
    pub duration: ToneDuration,
    pub status: TuningStatus,
    pub selected_string: Option<usize>,
    pub playing_string: Option<usize>,
    pub detected_string: Option<usize>,
    pub readings: u64,
    pub reference: ReferencePitchStats,
    pub audio: AudioStatus,
    /// Listener count per event name, for kinds that have any.
    pub listeners: BTreeMap<&'static str, usize>,
}

/// Top-level coordinator.
pub struct Tuner<A: AudioBackend> {
    bus: Rc<EventBus>,
    reference: ReferencePitchManager,
    audio: A,
    settings: TunerSettings,
    mode: TunerMode,
    duration: ToneDuration,
    selected_string: Option<usize>,
    playing_string: Option<usize>,
    detected_string: Option<usize>,
    status: TuningStatus,
    smoother: CentsSmoother,
    last_reading: Option<TuningReading>,
    readings: u64,
}

impl<A: AudioBackend> fmt::Debug for Tuner<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tuner")
            .field("reference", &self.reference)
            .field("mode", &self.mode)
            .field("duration", &self.duration)
            .field("selected_string", &self.selected_string)
            .field("playing_string", &self.playing_string)
            .field("status", &self.status)
            .finish()
    }
}

impl<A: AudioBackend> Tuner<A> {
    /// Builds the coordinator around a shared bus. `audio` should emit on the same bus.
    pub fn new(
        bus: Rc<EventBus>,
        config: &TunerConfig,
        storage: Option<Box<dyn Storage>>,
        audio: A,
    ) -> TunerResult<Self> {
        config.validate()?;

        let reference = ReferencePitchManager::new(Rc::clone(&bus), storage);
        info!(
            "Tuner created with reference pitch {:.1} Hz",
            reference.reference_pitch()
        );

        Ok(Self {
            bus,
            reference,
            audio,
            smoother: CentsSmoother::from_settings(&config.tuner),
            settings: config.tuner.clone(),
            mode: TunerMode::default(),
            duration: ToneDuration::default(),
            selected_string: None,
            playing_string: None,
            detected_string: None,
            status: TuningStatus::default(),
            last_reading: None,
            readings: 0,
        })
    }

    /// Opens the audio output and then the microphone. Returns the resulting status; failures
    /// are reported on the bus by the backend.
    pub fn start(&mut self) -> AudioStatus {
        if self.audio.initialize() {
            self.audio.start_microphone();
        }
        self.audio.status()
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn reference(&self) -> &ReferencePitchManager {
        &self.reference
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut A {
        &mut self.audio
    }

    pub fn settings(&self) -> &TunerSettings {
        &self.settings
    }

    pub fn mode(&self) -> TunerMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TunerMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        self.detected_string = None;
        self.smoother.clear();
        info!("Mode changed to {}", mode);
        self.bus.emit(Event::ModeChanged { mode });
    }

    pub fn selected_string(&self) -> Option<usize> {
        self.selected_string
    }

    pub fn select_string(&mut self, index: usize) -> TunerResult<()> {
        frequency::string_definition(index)?;
        if self.selected_string != Some(index) {
            self.smoother.clear();
        }
        self.selected_string = Some(index);
        self.bus.emit(Event::StringSelected { index });
        Ok(())
    }

    /// Target frequency of the selected string at the current reference pitch.
    pub fn selected_frequency(&self) -> Option<f64> {
        self.selected_string
            .and_then(|index| self.reference.string_frequency(index).ok())
    }

    pub fn duration(&self) -> ToneDuration {
        self.duration
    }

    pub fn set_duration(&mut self, duration: ToneDuration) {
        self.duration = duration;
    }

    /// Plays the reference tone of a string with the current duration setting.
    ///
    /// Returns `Ok(false)` when the backend could not start the tone.
    pub fn play_string_tone(&mut self, index: usize) -> TunerResult<bool> {
        let frequency = self.reference.string_frequency(index)?;
        let duration = self.duration.to_duration(self.settings.timed_tone_seconds);

        let started = self.audio.start_tone(frequency, duration);
        self.playing_string = started.then_some(index);
        Ok(started)
    }

    pub fn stop_tone(&mut self) {
        self.audio.stop_tone();
        self.playing_string = None;
    }

    pub fn playing_string(&self) -> Option<usize> {
        self.playing_string
    }

    pub fn is_playing(&self, index: usize) -> bool {
        self.playing_string == Some(index) && self.audio.is_generating_tone()
    }

    pub fn reference_pitch(&self) -> f64 {
        self.reference.reference_pitch()
    }

    pub fn set_reference_pitch(&mut self, value: f64) -> bool {
        self.reference.set_reference_pitch(value)
    }

    pub fn reset_reference_pitch(&mut self) -> bool {
        self.reference.reset()
    }

    pub fn status(&self) -> TuningStatus {
        self.status
    }

    pub fn last_reading(&self) -> Option<&TuningReading> {
        self.last_reading.as_ref()
    }

    /// Reads the backend's input level and updates the indicator without a frequency.
    pub fn sample_input(&mut self) -> TuningReading {
        let level_db = self.audio.input_level();
        self.update_input(level_db, None)
    }

    /// Feeds one input measurement into the tuning indicator.
    ///
    /// In auto mode the nearest string within the maximum deviation becomes the target and a
    /// change of string is announced. Otherwise the selected string is the target, or the
    /// nearest string when nothing is selected.
    pub fn update_input(&mut self, level_db: f64, measured_frequency: Option<f64>) -> TuningReading {
        self.readings += 1;

        let measured_frequency = measured_frequency.filter(|f| f.is_finite() && *f > 0.0);
        let mut reading = TuningReading {
            status: TuningStatus::Silent,
            level_db,
            measured_frequency,
            string_index: None,
            target_frequency: None,
            cents: None,
            is_stable: false,
        };

        // NaN compares false, so it counts as silence too.
        if !(level_db >= self.settings.silence_threshold_db) {
            self.smoother.clear();
            return self.finish_reading(reading);
        }

        let Some(measured) = measured_frequency else {
            reading.status = TuningStatus::Analyzing;
            return self.finish_reading(reading);
        };

        let Some((index, target)) = self.target_for(measured) else {
            self.smoother.clear();
            reading.status = TuningStatus::OutOfRange;
            return self.finish_reading(reading);
        };

        let cents = self.smoother.push(frequency::frequency_to_cents(measured, target));
        reading.string_index = Some(index);
        reading.target_frequency = Some(target);
        reading.cents = Some(cents);
        reading.is_stable = self.smoother.is_stable();
        reading.status = TuningStatus::from_cents(
            cents,
            self.settings.tuned_tolerance_cents,
            self.settings.max_deviation_cents,
        );
        self.finish_reading(reading)
    }

    fn target_for(&mut self, measured: f64) -> Option<(usize, f64)> {
        let reference_pitch = self.reference.reference_pitch();

        match (self.mode, self.selected_string) {
            (TunerMode::Auto, _) => {
                let found = frequency::nearest_string(
                    measured,
                    reference_pitch,
                    self.settings.max_deviation_cents,
                )?;
                if self.detected_string != Some(found.index) {
                    self.detected_string = Some(found.index);
                    self.smoother.clear();
                    debug!("Detected string {}", found.definition().name);
                    self.bus.emit(Event::StringDetected {
                        index: found.index,
                        target_frequency: found.target_frequency,
                        cents: found.deviation_cents,
                    });
                }
                Some((found.index, found.target_frequency))
            }
            (_, Some(index)) => self
                .reference
                .string_frequency(index)
                .ok()
                .map(|target| (index, target)),
            (_, None) => frequency::nearest_string(measured, reference_pitch, f64::INFINITY)
                .map(|found| (found.index, found.target_frequency)),
        }
    }

    fn finish_reading(&mut self, reading: TuningReading) -> TuningReading {
        if reading.status != self.status {
            self.status = reading.status;
            self.bus.emit(Event::TuningStatusChanged {
                status: reading.status,
                cents: reading.cents,
            });
        }
        self.last_reading = Some(reading.clone());
        reading
    }

    /// Host loop housekeeping: expires timed tones and delivers deferred events.
    pub fn tick(&mut self) {
        self.audio.poll();
        if !self.audio.is_generating_tone() {
            self.playing_string = None;
        }
        self.bus.run_deferred();
    }

    pub fn stats(&self) -> TunerStats {
        let listeners = EventKind::ALL
            .iter()
            .filter_map(|kind| {
                let count = self.bus.listener_count(*kind);
                (count > 0).then(|| (kind.as_str(), count))
            })
            .collect();

        TunerStats {
            mode: self.mode,
            duration: self.duration,
            status: self.status,
            selected_string: self.selected_string,
            playing_string: self.playing_string,
            detected_string: self.detected_string,
            readings: self.readings,
            reference: self.reference.stats(),
            audio: self.audio.status(),
            listeners,
        }
    }

    /// Stops all audio and releases the manager and the bus. The tuner is inert afterwards.
    pub fn stop(&mut self) {
        self.audio.stop_all();
        self.playing_string = None;
        self.reference.teardown();
        self.bus.teardown();
        info!("Tuner stopped");
    }
}
