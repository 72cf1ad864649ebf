//! # Reference Pitch Module
//!
//! Owns the Concert A value (435-445 Hz) and the per-string target frequencies derived from it.
//! Changes are validated, persisted through the storage collaborator and announced on the
//! event bus.

use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

use crate::error::{TunerError, TunerResult};
use crate::events::{ErrorKind, Event, EventBus};
use crate::frequency::{self, StringDefinition, STRING_COUNT};
use crate::storage::{Storage, REFERENCE_PITCH_KEY};

/// Lowest accepted reference pitch in Hz.
pub const MIN_REFERENCE_PITCH: f64 = 435.0;
/// Highest accepted reference pitch in Hz.
pub const MAX_REFERENCE_PITCH: f64 = 445.0;
/// Standard concert pitch.
pub const STANDARD_REFERENCE_PITCH: f64 = 440.0;
/// Resolution of the reference pitch.
pub const REFERENCE_PITCH_STEP: f64 = 0.1;

/// Tolerance of [`ReferencePitchManager::is_standard`]; absorbs float rounding only.
const STANDARD_TOLERANCE: f64 = 0.05;

/// A string together with its current target frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StringInfo {
    pub definition: &'static StringDefinition,
    pub frequency: f64,
    pub reference_pitch: f64,
}

/// Snapshot of the manager's state for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferencePitchStats {
    pub current_value: f64,
    pub is_standard: bool,
    pub deviation_from_standard: f64,
    pub cache_size: usize,
    pub string_frequencies: Vec<f64>,
}

/// Single owner of the current reference pitch and the string frequency cache.
pub struct ReferencePitchManager {
    bus: Option<Rc<EventBus>>,
    storage: Option<Box<dyn Storage>>,
    current: f64,
    string_frequencies: Vec<f64>,
}

impl fmt::Debug for ReferencePitchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferencePitchManager")
            .field("current", &self.current)
            .field("string_frequencies", &self.string_frequencies)
            .field("has_storage", &self.storage.is_some())
            .field("released", &self.bus.is_none())
            .finish()
    }
}

impl ReferencePitchManager {
    /// Creates the manager, restoring the stored value when there is a valid one.
    ///
    /// Initialization neither saves nor emits change events.
    pub fn new(bus: Rc<EventBus>, storage: Option<Box<dyn Storage>>) -> Self {
        let mut manager = Self {
            bus: Some(bus),
            storage,
            current: STANDARD_REFERENCE_PITCH,
            string_frequencies: Vec::with_capacity(STRING_COUNT),
        };
        manager.current = manager.load_from_storage();
        manager.rebuild_cache();
        manager
    }

    /// Sets a new reference pitch.
    ///
    /// # Returns
    /// * `true` - The value was accepted, rounded to 0.1 Hz, cached and announced
    /// * `false` - The value is not a finite number in [435.0, 445.0] (an error event is
    ///   emitted), or the manager was torn down
    pub fn set_reference_pitch(&mut self, value: f64) -> bool {
        let Some(bus) = self.bus.clone() else {
            warn!("Reference pitch manager released, ignoring {} Hz", value);
            return false;
        };

        if !is_valid(value) {
            warn!(
                "Invalid reference pitch: {}. Must be between {} and {}",
                value, MIN_REFERENCE_PITCH, MAX_REFERENCE_PITCH
            );
            bus.emit(Event::error(
                ErrorKind::ReferencePitchValidation,
                format!(
                    "Reference pitch must be between {:.1} and {:.1} Hz",
                    MIN_REFERENCE_PITCH, MAX_REFERENCE_PITCH
                ),
            ));
            return false;
        }

        let old_value = self.current;
        self.current = round_to_step(value);
        self.rebuild_cache();
        self.save_to_storage(&bus);

        bus.emit(Event::ReferencePitchChanged {
            old_value,
            new_value: self.current,
            string_frequencies: self.string_frequencies.clone(),
        });

        info!("Reference pitch changed: {} Hz -> {} Hz", old_value, self.current);
        true
    }

    pub fn reference_pitch(&self) -> f64 {
        self.current
    }

    /// Cached target frequency of a string.
    pub fn string_frequency(&self, string_index: usize) -> TunerResult<f64> {
        if string_index >= STRING_COUNT {
            return Err(TunerError::InvalidStringIndex { index: string_index });
        }
        self.string_frequencies
            .get(string_index)
            .copied()
            .ok_or(TunerError::ManagerReleased)
    }

    /// Cached target frequencies of all strings, in table order.
    pub fn string_frequencies(&self) -> Vec<f64> {
        self.string_frequencies.clone()
    }

    /// Definition and current target of a string, or `None` for an unknown index.
    pub fn string_info(&self, string_index: usize) -> Option<StringInfo> {
        let definition = frequency::string_definition(string_index).ok()?;
        let frequency = self.string_frequency(string_index).ok()?;
        Some(StringInfo {
            definition,
            frequency,
            reference_pitch: self.current,
        })
    }

    /// Returns to 440.0 Hz and additionally announces the reset.
    pub fn reset(&mut self) -> bool {
        let success = self.set_reference_pitch(STANDARD_REFERENCE_PITCH);

        if success {
            if let Some(bus) = &self.bus {
                bus.emit(Event::ReferencePitchReset {
                    value: STANDARD_REFERENCE_PITCH,
                });
            }
            info!("Reference pitch reset to standard {:.1} Hz", STANDARD_REFERENCE_PITCH);
        }

        success
    }

    pub fn is_standard(&self) -> bool {
        (self.current - STANDARD_REFERENCE_PITCH).abs() < STANDARD_TOLERANCE
    }

    /// Signed distance from 440 Hz, in Hz.
    pub fn deviation_from_standard(&self) -> f64 {
        self.current - STANDARD_REFERENCE_PITCH
    }

    pub fn stats(&self) -> ReferencePitchStats {
        ReferencePitchStats {
            current_value: self.current,
            is_standard: self.is_standard(),
            deviation_from_standard: self.deviation_from_standard(),
            cache_size: self.string_frequencies.len(),
            string_frequencies: self.string_frequencies(),
        }
    }

    /// Releases the cache and the collaborators. Every setter fails afterwards.
    pub fn teardown(&mut self) {
        self.string_frequencies.clear();
        self.bus = None;
        self.storage = None;
    }

    pub fn is_released(&self) -> bool {
        self.bus.is_none()
    }

    /// Rounds a valid value to the 0.1 Hz grid; `None` if it is out of range or not finite.
    pub fn validate_and_normalize(value: f64) -> Option<f64> {
        is_valid(value).then(|| round_to_step(value))
    }

    /// Every selectable value from 435.0 to 445.0 in 0.1 Hz steps.
    pub fn allowed_values() -> Vec<f64> {
        let steps = ((MAX_REFERENCE_PITCH - MIN_REFERENCE_PITCH) / REFERENCE_PITCH_STEP).round() as usize;
        (0..=steps)
            .map(|step| round_to_step(MIN_REFERENCE_PITCH + step as f64 * REFERENCE_PITCH_STEP))
            .collect()
    }

    /// Clamps into range and rounds to the grid. NaN gives the standard pitch.
    pub fn nearest_allowed_value(value: f64) -> f64 {
        if value.is_nan() {
            return STANDARD_REFERENCE_PITCH;
        }
        round_to_step(value.clamp(MIN_REFERENCE_PITCH, MAX_REFERENCE_PITCH))
    }

    fn rebuild_cache(&mut self) {
        self.string_frequencies.clear();
        self.string_frequencies
            .extend(frequency::string_target_frequencies(self.current));
    }

    fn load_from_storage(&self) -> f64 {
        let stored = self
            .storage
            .as_ref()
            .and_then(|storage| storage.load(REFERENCE_PITCH_KEY));

        match stored.as_deref().map(str::trim).map(str::parse::<f64>) {
            Some(Ok(value)) if is_valid(value) => {
                info!("Reference pitch loaded from storage: {} Hz", value);
                round_to_step(value)
            }
            Some(_) => {
                warn!("Ignoring stored reference pitch {:?}", stored);
                STANDARD_REFERENCE_PITCH
            }
            None => {
                info!("Using default reference pitch: {:.1} Hz", STANDARD_REFERENCE_PITCH);
                STANDARD_REFERENCE_PITCH
            }
        }
    }

    fn save_to_storage(&mut self, bus: &EventBus) {
        let Some(storage) = self.storage.as_mut() else {
            return;
        };
        if let Err(e) = storage.save(REFERENCE_PITCH_KEY, &self.current.to_string()) {
            warn!("Failed to save reference pitch to storage: {:#}", e);
            bus.emit(Event::error(
                ErrorKind::StorageError,
                "Could not save the reference pitch setting",
            ));
        }
    }
}

fn is_valid(value: f64) -> bool {
    value.is_finite() && (MIN_REFERENCE_PITCH..=MAX_REFERENCE_PITCH).contains(&value)
}

fn round_to_step(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, SubscribeOptions};
    use crate::storage::MemoryStorage;
    use anyhow::anyhow;
    use std::cell::RefCell;

    struct FailingStorage;

    impl Storage for FailingStorage {
        fn load(&self, _key: &str) -> Option<String> {
            None
        }

        fn save(&mut self, _key: &str, _value: &str) -> anyhow::Result<()> {
            Err(anyhow!("disk full"))
        }
    }

    fn capture(bus: &EventBus, kind: EventKind) -> Rc<RefCell<Vec<Event>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        bus.subscribe(kind, move |event| sink.borrow_mut().push(event.clone()), SubscribeOptions::default());
        events
    }

    #[test]
    fn defaults_to_standard_without_storage() {
        let manager = ReferencePitchManager::new(Rc::new(EventBus::default()), None);
        assert_eq!(manager.reference_pitch(), 440.0);
        assert!(manager.is_standard());
        assert_eq!(manager.string_frequency(4).unwrap(), 880.0);
    }

    #[test]
    fn restores_stored_value_without_events() {
        let bus = Rc::new(EventBus::default());
        let changes = capture(&bus, EventKind::ReferencePitchChanged);
        let storage = MemoryStorage::with_entry(REFERENCE_PITCH_KEY, "442.5");

        let manager = ReferencePitchManager::new(Rc::clone(&bus), Some(Box::new(storage)));
        assert_eq!(manager.reference_pitch(), 442.5);
        assert_eq!(manager.string_frequency(4).unwrap(), 885.0);
        assert!(changes.borrow().is_empty());
    }

    #[test]
    fn invalid_stored_values_fall_back_to_standard() {
        for stored in ["abc", "450", "", "NaN"] {
            let storage = MemoryStorage::with_entry(REFERENCE_PITCH_KEY, stored);
            let manager = ReferencePitchManager::new(Rc::new(EventBus::default()), Some(Box::new(storage)));
            assert_eq!(manager.reference_pitch(), 440.0, "stored {:?}", stored);
        }
    }

    #[test]
    fn accepted_value_is_rounded_saved_and_announced() {
        let bus = Rc::new(EventBus::default());
        let changes = capture(&bus, EventKind::ReferencePitchChanged);
        let storage = MemoryStorage::new();
        let mut manager = ReferencePitchManager::new(Rc::clone(&bus), Some(Box::new(storage.clone())));

        assert!(manager.set_reference_pitch(441.26));
        assert_eq!(manager.reference_pitch(), 441.3);
        assert_eq!(storage.get(REFERENCE_PITCH_KEY).as_deref(), Some("441.3"));

        let changes = changes.borrow();
        assert_eq!(changes.len(), 1);
        match &changes[0] {
            Event::ReferencePitchChanged {
                old_value,
                new_value,
                string_frequencies,
            } => {
                assert_eq!(*old_value, 440.0);
                assert_eq!(*new_value, 441.3);
                assert_eq!(string_frequencies.len(), STRING_COUNT);
                assert_eq!(*string_frequencies, manager.string_frequencies());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn cache_follows_every_change() {
        let mut manager = ReferencePitchManager::new(Rc::new(EventBus::default()), None);
        manager.set_reference_pitch(436.0);
        for index in 0..STRING_COUNT {
            assert_eq!(
                manager.string_frequency(index).unwrap(),
                frequency::string_target_frequency(index, 436.0).unwrap()
            );
        }
    }

    #[test]
    fn rejected_values_leave_state_untouched() {
        let bus = Rc::new(EventBus::default());
        let errors = capture(&bus, EventKind::ErrorOccurred);
        let changes = capture(&bus, EventKind::ReferencePitchChanged);
        let mut manager = ReferencePitchManager::new(Rc::clone(&bus), None);

        for value in [434.9, 445.1, f64::NAN, f64::INFINITY] {
            assert!(!manager.set_reference_pitch(value));
        }

        assert_eq!(manager.reference_pitch(), 440.0);
        assert!(changes.borrow().is_empty());
        assert_eq!(errors.borrow().len(), 4);
        assert!(matches!(
            errors.borrow()[0],
            Event::ErrorOccurred { kind: ErrorKind::ReferencePitchValidation, .. }
        ));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let mut manager = ReferencePitchManager::new(Rc::new(EventBus::default()), None);
        assert!(manager.set_reference_pitch(435.0));
        assert!(manager.set_reference_pitch(445.0));
        assert_eq!(manager.reference_pitch(), 445.0);
    }

    #[test]
    fn storage_failure_keeps_new_value() {
        let bus = Rc::new(EventBus::default());
        let errors = capture(&bus, EventKind::ErrorOccurred);
        let changes = capture(&bus, EventKind::ReferencePitchChanged);
        let mut manager = ReferencePitchManager::new(Rc::clone(&bus), Some(Box::new(FailingStorage)));

        assert!(manager.set_reference_pitch(438.0));
        assert_eq!(manager.reference_pitch(), 438.0);
        assert_eq!(changes.borrow().len(), 1);
        assert!(matches!(
            errors.borrow()[0],
            Event::ErrorOccurred { kind: ErrorKind::StorageError, .. }
        ));
    }

    #[test]
    fn reset_announces_change_then_reset() {
        let bus = Rc::new(EventBus::default());
        let order = Rc::new(RefCell::new(Vec::new()));
        for kind in [EventKind::ReferencePitchChanged, EventKind::ReferencePitchReset] {
            let order = Rc::clone(&order);
            bus.subscribe(kind, move |event| order.borrow_mut().push(event.kind()), SubscribeOptions::default());
        }
        let mut manager = ReferencePitchManager::new(Rc::clone(&bus), None);
        manager.set_reference_pitch(443.0);
        order.borrow_mut().clear();

        assert!(manager.reset());
        assert_eq!(manager.reference_pitch(), 440.0);
        assert_eq!(
            *order.borrow(),
            vec![EventKind::ReferencePitchChanged, EventKind::ReferencePitchReset]
        );
    }

    #[test]
    fn standard_check_uses_tolerance() {
        let mut manager = ReferencePitchManager::new(Rc::new(EventBus::default()), None);
        manager.set_reference_pitch(440.1);
        assert!(!manager.is_standard());
        assert!((manager.deviation_from_standard() - 0.1).abs() < 1e-9);

        manager.set_reference_pitch(440.04);
        assert!(manager.is_standard());
        assert_eq!(manager.deviation_from_standard(), 0.0);
    }

    #[test]
    fn allowed_values_cover_the_range() {
        let values = ReferencePitchManager::allowed_values();
        assert_eq!(values.len(), 101);
        assert_eq!(values[0], 435.0);
        assert_eq!(values[50], 440.0);
        assert_eq!(values[100], 445.0);
    }

    #[test]
    fn normalization_helpers() {
        assert_eq!(ReferencePitchManager::validate_and_normalize(441.27), Some(441.3));
        assert_eq!(ReferencePitchManager::validate_and_normalize(430.0), None);
        assert_eq!(ReferencePitchManager::nearest_allowed_value(450.0), 445.0);
        assert_eq!(ReferencePitchManager::nearest_allowed_value(200.0), 435.0);
        assert_eq!(ReferencePitchManager::nearest_allowed_value(f64::NAN), 440.0);
        assert_eq!(ReferencePitchManager::nearest_allowed_value(438.66), 438.7);
    }

    #[test]
    fn string_info_reports_current_reference() {
        let mut manager = ReferencePitchManager::new(Rc::new(EventBus::default()), None);
        manager.set_reference_pitch(442.0);

        let info = manager.string_info(4).unwrap();
        assert_eq!(info.definition.name, "A2");
        assert_eq!(info.frequency, 884.0);
        assert_eq!(info.reference_pitch, 442.0);
        assert!(manager.string_info(6).is_none());
        assert!(matches!(
            manager.string_frequency(9),
            Err(TunerError::InvalidStringIndex { index: 9 })
        ));
    }

    #[test]
    fn stats_snapshot() {
        let manager = ReferencePitchManager::new(Rc::new(EventBus::default()), None);
        let stats = manager.stats();
        assert_eq!(stats.current_value, 440.0);
        assert!(stats.is_standard);
        assert_eq!(stats.cache_size, STRING_COUNT);
    }

    #[test]
    fn teardown_releases_everything() {
        let mut manager = ReferencePitchManager::new(Rc::new(EventBus::default()), None);
        manager.teardown();

        assert!(manager.is_released());
        assert!(!manager.set_reference_pitch(441.0));
        assert!(!manager.reset());
        assert!(matches!(manager.string_frequency(0), Err(TunerError::ManagerReleased)));
    }
}
