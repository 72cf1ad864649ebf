// tuner-core/src/lib.rs

//! The core logic for the guitar tuner.
//! This crate is responsible for string frequency calculations, the adjustable
//! reference pitch, reference tone output and the event bus that ties them
//! together. It is completely headless and contains no GUI code.

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod frequency;
pub mod reference_pitch;
pub mod storage;
pub mod tuner;

pub use audio::{AudioBackend, AudioEngine, AudioStatus};
pub use config::TunerConfig;
pub use error::{TunerError, TunerResult};
pub use events::{ErrorKind, Event, EventBus, EventKind, SubscribeOptions, Subscription};
pub use reference_pitch::ReferencePitchManager;
pub use tuner::{ToneDuration, Tuner, TunerMode, TuningReading, TuningStatus};
