//! # Guitar Tuner - Desktop GUI
//!
//! This module contains the main GUI application for the guitar tuner.
//! It provides reference pitch adjustment, reference tones for the six strings
//! and a live tuning indicator.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme, owning the tuner core
//! - **Audio Threads**: CPAL callbacks inside the core's audio engine
//! - **Events**: The core's event bus feeds an inbox that the GUI drains after every update
//! - **Updates**: 60 FPS continuous updates via subscription system

mod ui;

use anyhow::Context;
use iced::{Element, Subscription, Theme};
use log::{error, info, warn};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tuner_core::config::TunerConfig;
use tuner_core::storage::{JsonFileStorage, MemoryStorage, Storage};
use tuner_core::{
    AudioBackend, AudioEngine, AudioStatus, Event, EventBus, EventKind, SubscribeOptions,
    ToneDuration, Tuner, TunerMode, TuningReading,
};
use ui::main_display::create_main_view;

/// Optional configuration file, read from the working directory.
const CONFIG_PATH: &str = "tuner_config.json";

/// Events shown in the status line.
const STATUS_EVENTS: [EventKind; 7] = [
    EventKind::AudioInitialized,
    EventKind::MicrophoneStarted,
    EventKind::ToneStarted,
    EventKind::ToneStopped,
    EventKind::ReferencePitchReset,
    EventKind::StringDetected,
    EventKind::ErrorOccurred,
];

/// Main entry point for the guitar tuner application.
///
/// Initializes logging and the Iced GUI application with dark theme
/// and continuous updates.
pub fn main() -> iced::Result {
    colog::init();
    info!("Starting Guitar Tuner...");
    let result = iced::application("Guitar Tuner", TunerApp::update, TunerApp::view)
        .subscription(TunerApp::subscription)
        .theme(TunerApp::theme)
        .run();
    info!("Application finished with result: {:?}", result);
    result
}

/// Application message types for the Iced GUI framework.
#[derive(Debug, Clone)]
pub enum Message {
    // Reference pitch controls
    ReferencePitchChanged(f64),    // Slider moved (Hz)
    ReferencePitchInput(String),   // Entry field edited
    ReferencePitchSubmitted,       // Entry field confirmed
    ResetReferencePitch,           // Back to 440 Hz

    // Tuner controls
    ModeSelected(TunerMode),
    StringPressed(usize),           // String button (0 = high E)
    DurationSelected(ToneDuration), // Reference tone length
    StopTone,

    // Continuous update message
    Tick,
}

/// UI-specific data needed for rendering the interface.
///
/// Refreshed from the tuner after every message so the view never touches the core.
#[derive(Debug, Clone, Default)]
pub struct AppDisplayData {
    pub reference_pitch: f64,
    /// Contents of the reference entry field, kept while the user types.
    pub reference_input: String,
    pub is_standard: bool,
    pub string_frequencies: Vec<f64>,
    pub mode: TunerMode,
    pub duration: ToneDuration,
    pub selected_string: Option<usize>,
    pub playing_string: Option<usize>,
    pub reading: Option<TuningReading>,
    pub audio: AudioStatus,
    /// In-tune band of the cent meter.
    pub tuned_tolerance_cents: f64,
    /// Full scale of the cent meter.
    pub max_deviation_cents: f64,
    /// Latest notification from the event bus.
    pub status_message: String,
    /// Set when the tuner could not be created.
    pub startup_error: Option<String>,
}

/// Main application state for the guitar tuner.
#[derive(Debug)]
struct TunerApp {
    tuner: Option<Tuner<AudioEngine>>,
    // Events collected by bus listeners, drained after every update
    inbox: Rc<RefCell<VecDeque<Event>>>,
    // Single source of truth for all display data
    display_data: AppDisplayData,
}

impl Default for TunerApp {
    /// Creates a new TunerApp instance.
    ///
    /// Loads the configuration, restores the stored reference pitch, subscribes the status
    /// inbox to the bus and opens the audio devices.
    fn default() -> Self {
        let config = load_config(CONFIG_PATH);
        let bus = Rc::new(EventBus::new(&config.bus));

        let inbox = Rc::new(RefCell::new(VecDeque::new()));
        for kind in STATUS_EVENTS {
            let inbox = Rc::clone(&inbox);
            bus.subscribe(
                kind,
                move |event| inbox.borrow_mut().push_back(event.clone()),
                SubscribeOptions::default(),
            );
        }

        let engine = AudioEngine::new(Rc::clone(&bus), config.audio.clone());
        let storage = open_storage(&config);

        let mut app = Self {
            tuner: None,
            inbox,
            display_data: AppDisplayData::default(),
        };

        match Tuner::new(bus, &config, Some(storage), engine) {
            Ok(mut tuner) => {
                let status = tuner.start();
                info!("Audio status at start-up: {:?}", status);
                app.tuner = Some(tuner);
            }
            Err(e) => {
                error!("Failed to create tuner: {}", e);
                app.display_data.startup_error = Some(e.to_string());
            }
        }

        app.drain_events();
        app.refresh_display();
        app.sync_reference_input();
        app
    }
}

impl TunerApp {
    /// Handles application state updates based on incoming messages.
    fn update(&mut self, message: Message) {
        let Some(tuner) = self.tuner.as_mut() else {
            return;
        };
        let mut sync_input = false;

        match message {
            Message::ReferencePitchChanged(value) => {
                tuner.set_reference_pitch(value);
                sync_input = true;
            }
            Message::ReferencePitchInput(input) => {
                self.display_data.reference_input = input;
            }
            Message::ReferencePitchSubmitted => {
                match ui::format::parse_reference_input(&self.display_data.reference_input) {
                    Ok(value) => {
                        tuner.set_reference_pitch(value);
                    }
                    Err(message) => {
                        warn!("Rejected reference pitch entry: {}", message);
                        self.display_data.status_message = message;
                    }
                }
                sync_input = true;
            }
            Message::ResetReferencePitch => {
                tuner.reset_reference_pitch();
                sync_input = true;
            }
            Message::ModeSelected(mode) => {
                if mode != TunerMode::Reference {
                    tuner.stop_tone();
                }
                tuner.set_mode(mode);
            }
            Message::StringPressed(index) => {
                if let Err(e) = tuner.select_string(index) {
                    warn!("Ignoring string button: {}", e);
                } else if tuner.mode() == TunerMode::Reference {
                    // A second press on the sounding string silences it
                    if tuner.is_playing(index) {
                        tuner.stop_tone();
                    } else if let Err(e) = tuner.play_string_tone(index) {
                        warn!("Could not play string {}: {}", index, e);
                    }
                }
            }
            Message::DurationSelected(duration) => {
                tuner.set_duration(duration);
            }
            Message::StopTone => {
                tuner.stop_tone();
            }
            Message::Tick => {
                tuner.tick();
                tuner.sample_input();
            }
        }

        self.drain_events();
        self.refresh_display();
        if sync_input {
            self.sync_reference_input();
        }
    }

    /// Shows the current reference pitch in the entry field.
    fn sync_reference_input(&mut self) {
        self.display_data.reference_input =
            ui::format::reference_input_text(self.display_data.reference_pitch);
    }

    /// Turns queued bus events into the status line.
    fn drain_events(&mut self) {
        let events: Vec<Event> = self.inbox.borrow_mut().drain(..).collect();
        for event in &events {
            if let Some(message) = ui::format::describe_event(event) {
                self.display_data.status_message = message;
            }
        }
    }

    /// Copies the tuner state into the display data.
    fn refresh_display(&mut self) {
        let Some(tuner) = &self.tuner else {
            return;
        };
        let data = &mut self.display_data;

        data.reference_pitch = tuner.reference_pitch();
        data.is_standard = tuner.reference().is_standard();
        data.string_frequencies = tuner.reference().string_frequencies();
        data.mode = tuner.mode();
        data.duration = tuner.duration();
        data.selected_string = tuner.selected_string();
        data.playing_string = tuner.playing_string().filter(|&index| tuner.is_playing(index));
        data.reading = tuner.last_reading().cloned();
        data.audio = tuner.audio().status();
        data.tuned_tolerance_cents = tuner.settings().tuned_tolerance_cents;
        data.max_deviation_cents = tuner.settings().max_deviation_cents;
    }

    /// Renders the main application interface.
    ///
    /// Delegates all UI rendering to the main_display module.
    fn view(&self) -> Element<'_, Message> {
        create_main_view(&self.display_data)
    }

    /// Creates a subscription for continuous application updates.
    ///
    /// Returns a timer subscription that fires every 16ms (60 FPS) so timed tones stop on
    /// schedule and the input level stays current.
    fn subscription(&self) -> Subscription<Message> {
        iced::time::every(std::time::Duration::from_millis(16)).map(|_| Message::Tick)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

impl Drop for TunerApp {
    fn drop(&mut self) {
        if let Some(tuner) = self.tuner.as_mut() {
            if let Ok(stats) = serde_json::to_string(&tuner.stats()) {
                info!("Final tuner state: {}", stats);
            }
            tuner.stop();
        }
    }
}

/// Reads the configuration file, falling back to defaults when it is missing or invalid.
fn load_config(path: &str) -> TunerConfig {
    if !std::path::Path::new(path).exists() {
        info!("No {} found, using default configuration", path);
        return TunerConfig::default();
    }
    match TunerConfig::load(path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path);
            config
        }
        Err(e) => {
            warn!("Ignoring configuration: {:#}", e);
            TunerConfig::default()
        }
    }
}

/// Opens the settings file. An unreadable file must not block the tuner, so it falls back to
/// storage that only lasts for this session.
fn open_storage(config: &TunerConfig) -> Box<dyn Storage> {
    match JsonFileStorage::open(config.storage_path())
        .context("Reference pitch changes will not be saved")
    {
        Ok(storage) => {
            info!("Reference pitch stored in {}", storage.path().display());
            Box::new(storage)
        }
        Err(e) => {
            warn!("{:#}", e);
            Box::new(MemoryStorage::new())
        }
    }
}
