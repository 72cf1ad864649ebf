//! # Event Bus Module
//!
//! Synchronous, single-threaded publish/subscribe used to decouple the audio engine, the
//! reference pitch manager and the display layer.
//!
//! ## Features
//! - Closed set of event kinds with typed payloads
//! - One-shot listeners
//! - Dispatch over a snapshot of the listener list, so listeners may subscribe or
//!   unsubscribe while an event is being delivered
//! - Panicking listeners are isolated from their siblings and from the emitter
//! - Optional deferred dispatch, drained by the host loop on its next turn
//!
//! The bus owns every listener record. Subscribers only hold an opaque [`Subscription`].

use log::{debug, error, warn};
use serde::Serialize;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::config::BusConfig;
use crate::tuner::{TunerMode, TuningStatus};

/// A shared listener callback. Two registrations are "the same callback" when they point to
/// the same allocation.
pub type Callback = Rc<dyn Fn(&Event)>;

/// The kinds of events that flow through the bus. Used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    AudioInitialized,
    MicrophoneStarted,
    ToneStarted,
    ToneStopped,
    ReferencePitchChanged,
    ReferencePitchReset,
    ModeChanged,
    StringSelected,
    StringDetected,
    TuningStatusChanged,
    ErrorOccurred,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::AudioInitialized,
        EventKind::MicrophoneStarted,
        EventKind::ToneStarted,
        EventKind::ToneStopped,
        EventKind::ReferencePitchChanged,
        EventKind::ReferencePitchReset,
        EventKind::ModeChanged,
        EventKind::StringSelected,
        EventKind::StringDetected,
        EventKind::TuningStatusChanged,
        EventKind::ErrorOccurred,
    ];

    /// Wire-style name of the event, as used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AudioInitialized => "audio-initialized",
            EventKind::MicrophoneStarted => "microphone-started",
            EventKind::ToneStarted => "tone-started",
            EventKind::ToneStopped => "tone-stopped",
            EventKind::ReferencePitchChanged => "reference-pitch-changed",
            EventKind::ReferencePitchReset => "reference-pitch-reset",
            EventKind::ModeChanged => "mode-changed",
            EventKind::StringSelected => "string-selected",
            EventKind::StringDetected => "string-detected",
            EventKind::TuningStatusChanged => "tuning-status-changed",
            EventKind::ErrorOccurred => "error-occurred",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category carried by [`Event::ErrorOccurred`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    AudioInit,
    MicrophoneAccess,
    ToneGeneration,
    ReferencePitchValidation,
    StorageError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AudioInit => "audio-init",
            ErrorKind::MicrophoneAccess => "microphone-access",
            ErrorKind::ToneGeneration => "tone-generation",
            ErrorKind::ReferencePitchValidation => "reference-pitch-validation",
            ErrorKind::StorageError => "storage-error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event together with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The audio output was opened.
    AudioInitialized { sample_rate: u32 },
    /// Microphone capture is running.
    MicrophoneStarted { sample_rate: u32, channels: u16 },
    /// A reference tone started. `duration` is `None` for an endless tone.
    ToneStarted {
        frequency: f64,
        duration: Option<f64>,
        timestamp: f64,
    },
    /// The reference tone stopped.
    ToneStopped { timestamp: f64 },
    /// The reference pitch changed; carries every string's new target, in string order.
    ReferencePitchChanged {
        old_value: f64,
        new_value: f64,
        string_frequencies: Vec<f64>,
    },
    /// The reference pitch was reset to the standard value.
    ReferencePitchReset { value: f64 },
    /// The tuner switched mode.
    ModeChanged { mode: TunerMode },
    /// The user selected a string.
    StringSelected { index: usize },
    /// Auto mode recognised a string from a measured frequency.
    StringDetected {
        index: usize,
        target_frequency: f64,
        cents: f64,
    },
    /// The tuning indicator changed state.
    TuningStatusChanged {
        status: TuningStatus,
        cents: Option<f64>,
    },
    /// A recoverable failure that should be shown to the user.
    ErrorOccurred { kind: ErrorKind, message: String },
}

impl Event {
    /// The subscription key of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::AudioInitialized { .. } => EventKind::AudioInitialized,
            Event::MicrophoneStarted { .. } => EventKind::MicrophoneStarted,
            Event::ToneStarted { .. } => EventKind::ToneStarted,
            Event::ToneStopped { .. } => EventKind::ToneStopped,
            Event::ReferencePitchChanged { .. } => EventKind::ReferencePitchChanged,
            Event::ReferencePitchReset { .. } => EventKind::ReferencePitchReset,
            Event::ModeChanged { .. } => EventKind::ModeChanged,
            Event::StringSelected { .. } => EventKind::StringSelected,
            Event::StringDetected { .. } => EventKind::StringDetected,
            Event::TuningStatusChanged { .. } => EventKind::TuningStatusChanged,
            Event::ErrorOccurred { .. } => EventKind::ErrorOccurred,
        }
    }

    /// Create an error notification
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Event::ErrorOccurred {
            kind,
            message: message.into(),
        }
    }
}

/// Options for [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Remove the listener after its first delivery.
    pub once: bool,
}

impl SubscribeOptions {
    pub fn once() -> Self {
        Self { once: true }
    }
}

/// Options for [`EventBus::emit_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitOptions {
    /// Queue each delivery for the next [`EventBus::run_deferred`] instead of running it inline.
    pub deferred: bool,
}

#[derive(Clone)]
struct Listener {
    id: u64,
    callback: Callback,
    once: bool,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Registry {
    listeners: HashMap<EventKind, Vec<Listener>>,
    max_listeners: usize,
    debug_mode: bool,
    next_id: u64,
    torn_down: bool,
}

impl Registry {
    fn remove_by_id(&mut self, kind: EventKind, id: u64) -> bool {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let Some(position) = list.iter().position(|listener| listener.id == id) else {
            return false;
        };
        list.remove(position);
        let remaining = list.len();
        if remaining == 0 {
            self.listeners.remove(&kind);
        }
        if self.debug_mode {
            debug!("EventBus: removed listener for '{}' (remaining: {})", kind, remaining);
        }
        true
    }
}

struct DeferredDelivery {
    callback: Callback,
    event: Event,
}

/// Handle returned by [`EventBus::subscribe`]. Removes exactly the registration it came from.
///
/// Dropping the handle does not unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<RefCell<Registry>>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// The event kind this subscription listens to.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the registration. Returns false when it was already gone (fired once-listener,
    /// explicit unsubscribe or bus teardown).
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.borrow_mut().remove_by_id(self.kind, self.id),
            None => false,
        }
    }
}

/// Single-threaded publish/subscribe bus.
pub struct EventBus {
    registry: Rc<RefCell<Registry>>,
    deferred: RefCell<VecDeque<DeferredDelivery>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("registry", &self.registry)
            .field("deferred", &self.deferred.borrow().len())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(&BusConfig::default())
    }
}

impl EventBus {
    pub fn new(config: &BusConfig) -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                listeners: HashMap::new(),
                max_listeners: config.max_listeners,
                debug_mode: config.debug_mode,
                next_id: 1,
                torn_down: false,
            })),
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    /// Register a listener for `kind`.
    ///
    /// Registration always succeeds; exceeding the soft listener limit only logs a warning.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F, options: SubscribeOptions) -> Subscription
    where
        F: Fn(&Event) + 'static,
    {
        self.subscribe_shared(kind, Rc::new(callback), options)
    }

    /// Like [`subscribe`](Self::subscribe), keeping the callback shareable so that it can later be
    /// removed by identity through [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe_shared(
        &self,
        kind: EventKind,
        callback: Callback,
        options: SubscribeOptions,
    ) -> Subscription {
        let mut registry = self.registry.borrow_mut();

        if registry.torn_down {
            warn!("EventBus: subscribe to '{}' after teardown ignored", kind);
            return Subscription {
                registry: Weak::new(),
                kind,
                id: 0,
            };
        }

        let id = registry.next_id;
        registry.next_id += 1;
        let max_listeners = registry.max_listeners;
        let debug_mode = registry.debug_mode;

        let list = registry.listeners.entry(kind).or_default();
        if list.len() >= max_listeners {
            warn!(
                "EventBus: maximum listeners ({}) exceeded for event '{}'",
                max_listeners, kind
            );
        }
        list.push(Listener {
            id,
            callback,
            once: options.once,
        });

        if debug_mode {
            debug!("EventBus: added listener for '{}' (total: {})", kind, list.len());
        }

        Subscription {
            registry: Rc::downgrade(&self.registry),
            kind,
            id,
        }
    }

    /// Register a listener that is removed after its first delivery.
    pub fn subscribe_once<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&Event) + 'static,
    {
        self.subscribe(kind, callback, SubscribeOptions::once())
    }

    /// Remove the first registration of `callback` for `kind`. Does nothing if it is not
    /// registered.
    pub fn unsubscribe(&self, kind: EventKind, callback: &Callback) {
        let mut registry = self.registry.borrow_mut();
        let id = registry.listeners.get(&kind).and_then(|list| {
            list.iter()
                .find(|listener| Rc::ptr_eq(&listener.callback, callback))
                .map(|listener| listener.id)
        });
        if let Some(id) = id {
            registry.remove_by_id(kind, id);
        }
    }

    /// Deliver `event` synchronously. See [`emit_with`](Self::emit_with).
    pub fn emit(&self, event: Event) -> bool {
        self.emit_with(event, EmitOptions::default())
    }

    /// Deliver `event` to every listener of its kind.
    ///
    /// Returns false, without doing anything, when nobody listens. Otherwise the current
    /// listener list is copied and each copy entry is invoked in registration order (or queued,
    /// when `options.deferred` is set). Once-listeners from the copy are removed afterwards,
    /// whether or not they panicked.
    pub fn emit_with(&self, event: Event, options: EmitOptions) -> bool {
        let kind = event.kind();

        let (snapshot, debug_mode) = {
            let registry = self.registry.borrow();
            match registry.listeners.get(&kind) {
                Some(list) if !list.is_empty() => (list.clone(), registry.debug_mode),
                _ => {
                    if registry.debug_mode {
                        debug!("EventBus: no listeners for '{}'", kind);
                    }
                    return false;
                }
            }
        };

        if debug_mode {
            debug!(
                "EventBus: emitting '{}' to {} listeners: {:?}",
                kind,
                snapshot.len(),
                event
            );
        }

        for listener in &snapshot {
            if options.deferred {
                self.deferred.borrow_mut().push_back(DeferredDelivery {
                    callback: Rc::clone(&listener.callback),
                    event: event.clone(),
                });
            } else {
                invoke(&listener.callback, &event);
            }
        }

        let mut registry = self.registry.borrow_mut();
        for listener in snapshot.iter().filter(|listener| listener.once) {
            registry.remove_by_id(kind, listener.id);
        }

        true
    }

    /// Run every delivery queued by deferred emits so far. Deliveries queued while this runs
    /// wait for the next call. Returns how many ran.
    pub fn run_deferred(&self) -> usize {
        let batch: Vec<DeferredDelivery> = self.deferred.borrow_mut().drain(..).collect();
        for delivery in &batch {
            invoke(&delivery.callback, &delivery.event);
        }
        batch.len()
    }

    /// Number of deliveries waiting for [`run_deferred`](Self::run_deferred).
    pub fn pending_deferred(&self) -> usize {
        self.deferred.borrow().len()
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.listener_count(kind) > 0
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry
            .borrow()
            .listeners
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Set the soft listener limit per event kind.
    pub fn set_max_listeners(&self, max_listeners: usize) {
        self.registry.borrow_mut().max_listeners = max_listeners;
    }

    pub fn max_listeners(&self) -> usize {
        self.registry.borrow().max_listeners
    }

    /// Toggle verbose tracing of registrations and emits.
    pub fn set_debug_mode(&self, enabled: bool) {
        self.registry.borrow_mut().debug_mode = enabled;
    }

    /// Drop every registration and queued delivery. The bus is inert afterwards.
    pub fn teardown(&self) {
        {
            let mut registry = self.registry.borrow_mut();
            registry.listeners.clear();
            registry.debug_mode = false;
            registry.max_listeners = 0;
            registry.torn_down = true;
        }
        self.deferred.borrow_mut().clear();
    }

    pub fn is_torn_down(&self) -> bool {
        self.registry.borrow().torn_down
    }
}

fn invoke(callback: &Callback, event: &Event) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
        error!(
            "EventBus: error in listener for '{}': {}",
            event.kind(),
            panic_message(payload.as_ref())
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&'static str) -> Callback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_for_factory = Rc::clone(&log);
        let factory = move |name: &'static str| -> Callback {
            let log = Rc::clone(&log_for_factory);
            Rc::new(move |_event: &Event| log.borrow_mut().push(name.to_string()))
        };
        (log, factory)
    }

    fn reset_event() -> Event {
        Event::ReferencePitchReset { value: 440.0 }
    }

    #[test]
    fn emit_without_listeners_returns_false() {
        let bus = EventBus::default();
        assert!(!bus.emit(reset_event()));
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = EventBus::default();
        let (log, make) = recorder();
        bus.subscribe_shared(EventKind::ReferencePitchReset, make("a"), SubscribeOptions::default());
        bus.subscribe_shared(EventKind::ReferencePitchReset, make("b"), SubscribeOptions::default());
        bus.subscribe_shared(EventKind::ReferencePitchReset, make("c"), SubscribeOptions::default());

        assert!(bus.emit(reset_event()));
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn listeners_only_see_their_kind() {
        let bus = EventBus::default();
        let (log, make) = recorder();
        bus.subscribe_shared(EventKind::ToneStopped, make("tone"), SubscribeOptions::default());

        assert!(!bus.emit(reset_event()));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn payload_is_delivered() {
        let bus = EventBus::default();
        let seen = Rc::new(Cell::new(0.0));
        let seen_in_listener = Rc::clone(&seen);
        bus.subscribe(
            EventKind::ToneStarted,
            move |event| {
                if let Event::ToneStarted { frequency, .. } = event {
                    seen_in_listener.set(*frequency);
                }
            },
            SubscribeOptions::default(),
        );

        bus.emit(Event::ToneStarted {
            frequency: 659.25,
            duration: None,
            timestamp: 0.0,
        });
        assert_eq!(seen.get(), 659.25);
    }

    #[test]
    fn once_listener_fires_a_single_time() {
        let bus = EventBus::default();
        let count = Rc::new(Cell::new(0));
        let counter = Rc::clone(&count);
        bus.subscribe_once(EventKind::ReferencePitchReset, move |_| counter.set(counter.get() + 1));

        assert!(bus.emit(reset_event()));
        assert!(!bus.emit(reset_event()));
        assert_eq!(count.get(), 1);
        assert!(!bus.has_listeners(EventKind::ReferencePitchReset));
    }

    #[test]
    fn subscription_handle_removes_only_its_registration() {
        let bus = EventBus::default();
        let (log, make) = recorder();
        let shared = make("same");
        let first = bus.subscribe_shared(EventKind::ReferencePitchReset, Rc::clone(&shared), SubscribeOptions::default());
        let _second = bus.subscribe_shared(EventKind::ReferencePitchReset, shared, SubscribeOptions::default());

        assert!(first.unsubscribe());
        assert_eq!(bus.listener_count(EventKind::ReferencePitchReset), 1);
        bus.emit(reset_event());
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn unsubscribe_by_identity_removes_first_match() {
        let bus = EventBus::default();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");
        bus.subscribe_shared(EventKind::ReferencePitchReset, Rc::clone(&a), SubscribeOptions::default());
        bus.subscribe_shared(EventKind::ReferencePitchReset, Rc::clone(&b), SubscribeOptions::default());
        bus.subscribe_shared(EventKind::ReferencePitchReset, Rc::clone(&a), SubscribeOptions::default());

        bus.unsubscribe(EventKind::ReferencePitchReset, &a);
        bus.emit(reset_event());
        assert_eq!(*log.borrow(), vec!["b", "a"]);
    }

    #[test]
    fn unsubscribe_unknown_callback_is_a_no_op() {
        let bus = EventBus::default();
        let (_log, make) = recorder();
        bus.subscribe_shared(EventKind::ReferencePitchReset, make("a"), SubscribeOptions::default());

        bus.unsubscribe(EventKind::ReferencePitchReset, &make("other"));
        bus.unsubscribe(EventKind::ToneStopped, &make("other"));
        assert_eq!(bus.listener_count(EventKind::ReferencePitchReset), 1);
    }

    #[test]
    fn emptied_kind_is_removed() {
        let bus = EventBus::default();
        let (_log, make) = recorder();
        let a = make("a");
        bus.subscribe_shared(EventKind::ReferencePitchReset, Rc::clone(&a), SubscribeOptions::default());
        bus.unsubscribe(EventKind::ReferencePitchReset, &a);

        assert!(!bus.has_listeners(EventKind::ReferencePitchReset));
        assert!(bus.registry.borrow().listeners.is_empty());
    }

    #[test]
    fn listener_added_during_dispatch_waits_for_next_emit() {
        let bus = Rc::new(EventBus::default());
        let late_calls = Rc::new(Cell::new(0));

        let bus_in_listener = Rc::downgrade(&bus);
        let late_calls_in_listener = Rc::clone(&late_calls);
        bus.subscribe_once(EventKind::ReferencePitchReset, move |_| {
            if let Some(bus) = bus_in_listener.upgrade() {
                let late_calls = Rc::clone(&late_calls_in_listener);
                bus.subscribe(
                    EventKind::ReferencePitchReset,
                    move |_| late_calls.set(late_calls.get() + 1),
                    SubscribeOptions::default(),
                );
            }
        });

        bus.emit(reset_event());
        assert_eq!(late_calls.get(), 0);
        bus.emit(reset_event());
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn panicking_listener_does_not_stop_siblings() {
        let bus = EventBus::default();
        let (log, make) = recorder();
        bus.subscribe(
            EventKind::ReferencePitchReset,
            |_| panic!("listener failure"),
            SubscribeOptions::default(),
        );
        bus.subscribe_shared(EventKind::ReferencePitchReset, make("after"), SubscribeOptions::default());

        assert!(bus.emit(reset_event()));
        assert_eq!(*log.borrow(), vec!["after"]);
    }

    #[test]
    fn nested_emit_from_listener() {
        let bus = Rc::new(EventBus::default());
        let (log, make) = recorder();
        bus.subscribe_shared(EventKind::ToneStopped, make("inner"), SubscribeOptions::default());

        let weak = Rc::downgrade(&bus);
        bus.subscribe(
            EventKind::ReferencePitchReset,
            move |_| {
                if let Some(bus) = weak.upgrade() {
                    bus.emit(Event::ToneStopped { timestamp: 1.0 });
                }
            },
            SubscribeOptions::default(),
        );
        bus.subscribe_shared(EventKind::ReferencePitchReset, make("outer"), SubscribeOptions::default());

        bus.emit(reset_event());
        assert_eq!(*log.borrow(), vec!["inner", "outer"]);
    }

    #[test]
    fn deferred_emit_runs_on_next_turn_in_order() {
        let bus = EventBus::default();
        let (log, make) = recorder();
        bus.subscribe_shared(EventKind::ReferencePitchReset, make("a"), SubscribeOptions::default());
        bus.subscribe_shared(EventKind::ReferencePitchReset, make("b"), SubscribeOptions::default());

        assert!(bus.emit_with(reset_event(), EmitOptions { deferred: true }));
        assert!(log.borrow().is_empty());
        assert_eq!(bus.pending_deferred(), 2);

        assert_eq!(bus.run_deferred(), 2);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(bus.run_deferred(), 0);
    }

    #[test]
    fn deferred_once_listener_is_removed_at_emit_time() {
        let bus = EventBus::default();
        let (log, make) = recorder();
        bus.subscribe_shared(EventKind::ReferencePitchReset, make("once"), SubscribeOptions::once());

        bus.emit_with(reset_event(), EmitOptions { deferred: true });
        assert_eq!(bus.listener_count(EventKind::ReferencePitchReset), 0);
        bus.run_deferred();
        assert_eq!(*log.borrow(), vec!["once"]);
    }

    /// Collects warnings emitted anywhere in the test binary.
    struct WarningLog;

    static WARNINGS: std::sync::Mutex<Vec<String>> = std::sync::Mutex::new(Vec::new());

    impl log::Log for WarningLog {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Warn
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                WARNINGS.lock().unwrap().push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    fn capture_warnings() {
        static LOGGER: WarningLog = WarningLog;
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Warn);
        }
    }

    #[test]
    fn soft_limit_warns_but_keeps_registering() {
        capture_warnings();
        let bus = EventBus::default();
        bus.set_max_listeners(3);
        for _ in 0..6 {
            bus.subscribe(EventKind::MicrophoneStarted, |_| {}, SubscribeOptions::default());
        }
        assert_eq!(bus.listener_count(EventKind::MicrophoneStarted), 6);
        assert_eq!(bus.max_listeners(), 3);

        let expected = "EventBus: maximum listeners (3) exceeded for event 'microphone-started'";
        let warnings = WARNINGS.lock().unwrap();
        assert_eq!(warnings.iter().filter(|w| w.as_str() == expected).count(), 3);
    }

    #[test]
    fn teardown_makes_bus_inert() {
        let bus = EventBus::default();
        let (log, make) = recorder();
        let subscription =
            bus.subscribe_shared(EventKind::ReferencePitchReset, make("a"), SubscribeOptions::default());
        bus.subscribe_shared(EventKind::ToneStopped, make("b"), SubscribeOptions::default());
        bus.emit_with(Event::ToneStopped { timestamp: 0.0 }, EmitOptions { deferred: true });

        bus.teardown();

        assert!(bus.is_torn_down());
        assert!(!bus.emit(reset_event()));
        assert_eq!(bus.run_deferred(), 0);
        assert!(!subscription.unsubscribe());
        assert!(log.borrow().is_empty());

        bus.subscribe(EventKind::ReferencePitchReset, |_| {}, SubscribeOptions::default());
        assert_eq!(bus.listener_count(EventKind::ReferencePitchReset), 0);
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(ErrorKind::ReferencePitchValidation.to_string(), "reference-pitch-validation");
        assert_eq!(ErrorKind::StorageError.as_str(), "storage-error");
        assert_eq!(EventKind::ReferencePitchChanged.to_string(), "reference-pitch-changed");
    }
}
