//! # Audio Module
//!
//! Reference tone output and microphone level capture on top of CPAL (Cross-Platform Audio
//! Library).
//!
//! ## Features
//! - Sine reference tone with short fade in/out ramps to avoid clicks
//! - Optional tone duration, expired by [`AudioBackend::poll`]
//! - Input level metering from the default input device
//! - Lifecycle and failure notifications on the event bus
//!
//! The audio callbacks run on CPAL's threads and only talk to the engine through
//! crossbeam channels: tone commands go out, RMS measurements come back.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SupportedStreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, Sender};
use log::{error, info, warn};
use serde::Serialize;
use std::f32::consts::TAU;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::config::AudioConfig;
use crate::events::{ErrorKind, Event, EventBus};
use crate::frequency::amplitude_to_db;

/// Preferred capture sample rate.
const TARGET_INPUT_RATE: u32 = 44100;

/// The tone/capture collaborator as seen by the tuner.
pub trait AudioBackend {
    /// Opens the audio output. Safe to call again once initialized.
    fn initialize(&mut self) -> bool;

    /// Starts input level capture. Requires [`initialize`](Self::initialize).
    fn start_microphone(&mut self) -> bool;

    /// Starts a reference tone, replacing any tone already playing. `None` plays until
    /// [`stop_tone`](Self::stop_tone).
    fn start_tone(&mut self, frequency: f64, duration: Option<Duration>) -> bool;

    fn stop_tone(&mut self);

    /// Current input level in dB, negative infinity when there is no input.
    fn input_level(&mut self) -> f64;

    fn is_generating_tone(&self) -> bool;

    /// Housekeeping for the host loop: stops timed tones whose duration has elapsed.
    fn poll(&mut self);

    fn status(&self) -> AudioStatus;

    /// Stops the tone and releases every stream.
    fn stop_all(&mut self);
}

/// State summary of an audio backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioStatus {
    pub is_initialized: bool,
    pub is_microphone_active: bool,
    pub is_generating_tone: bool,
    pub sample_rate: Option<u32>,
}

/// Commands sent to the output callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToneCommand {
    /// Fade in a tone at this frequency (Hz).
    Start { frequency: f32 },
    /// Fade out to silence.
    Stop,
}

/// Sine oscillator with linear gain ramps. Runs inside the output callback.
#[derive(Debug, Clone)]
pub struct ToneVoice {
    sample_rate: f32,
    tone_gain: f32,
    fade_samples: f32,
    frequency: f32,
    phase: f32,
    gain: f32,
    target_gain: f32,
    gain_step: f32,
}

impl ToneVoice {
    pub fn new(sample_rate: u32, tone_gain: f32, fade_seconds: f32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            tone_gain,
            fade_samples: (fade_seconds * sample_rate as f32).max(1.0),
            frequency: 0.0,
            phase: 0.0,
            gain: 0.0,
            target_gain: 0.0,
            gain_step: 0.0,
        }
    }

    pub fn apply(&mut self, command: ToneCommand) {
        match command {
            ToneCommand::Start { frequency } => {
                self.frequency = frequency;
                self.gain = 0.0;
                self.ramp_to(self.tone_gain);
            }
            ToneCommand::Stop => self.ramp_to(0.0),
        }
    }

    fn ramp_to(&mut self, target: f32) {
        self.target_gain = target;
        self.gain_step = (target - self.gain).abs() / self.fade_samples;
    }

    /// Produces the next mono sample.
    pub fn next_sample(&mut self) -> f32 {
        if self.gain < self.target_gain {
            self.gain = (self.gain + self.gain_step).min(self.target_gain);
        } else if self.gain > self.target_gain {
            self.gain = (self.gain - self.gain_step).max(self.target_gain);
        }

        if self.is_silent() {
            return 0.0;
        }

        let sample = (self.phase * TAU).sin() * self.gain;
        self.phase = (self.phase + self.frequency / self.sample_rate).fract();
        sample
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn is_silent(&self) -> bool {
        self.gain == 0.0 && self.target_gain == 0.0
    }
}

struct OutputState {
    stream: cpal::Stream,
    commands: Sender<ToneCommand>,
    sample_rate: u32,
}

struct InputState {
    stream: cpal::Stream,
    levels: Receiver<f32>,
}

/// CPAL-backed [`AudioBackend`].
pub struct AudioEngine {
    bus: Rc<EventBus>,
    config: AudioConfig,
    started_at: Instant,
    output: Option<OutputState>,
    input: Option<InputState>,
    last_rms: f32,
    is_generating_tone: bool,
    tone_deadline: Option<Instant>,
}

impl AudioEngine {
    /// Creates an engine. No device is opened until [`AudioBackend::initialize`].
    pub fn new(bus: Rc<EventBus>, config: AudioConfig) -> Self {
        Self {
            bus,
            config,
            started_at: Instant::now(),
            output: None,
            input: None,
            last_rms: 0.0,
            is_generating_tone: false,
            tone_deadline: None,
        }
    }

    /// Seconds since the engine was created; used as event timestamps.
    fn current_time(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

impl AudioBackend for AudioEngine {
    fn initialize(&mut self) -> bool {
        if self.output.is_some() {
            info!("Audio engine already initialized");
            return true;
        }

        match start_tone_output(&self.config) {
            Ok(output) => {
                let sample_rate = output.sample_rate;
                self.output = Some(output);
                info!("Audio engine initialized: {} Hz", sample_rate);
                self.bus.emit(Event::AudioInitialized { sample_rate });
                true
            }
            Err(e) => {
                error!("Failed to initialize audio engine: {:#}", e);
                self.bus.emit(Event::error(
                    ErrorKind::AudioInit,
                    format!("Could not initialize the audio system: {}", e),
                ));
                false
            }
        }
    }

    fn start_microphone(&mut self) -> bool {
        if self.output.is_none() {
            error!("Audio engine not initialized");
            return false;
        }
        if self.input.is_some() {
            info!("Microphone already active");
            return true;
        }

        match start_level_capture(self.config.level_channel_capacity) {
            Ok((input, sample_rate, channels)) => {
                self.input = Some(input);
                info!("Microphone started: {} Hz, {} channel(s)", sample_rate, channels);
                self.bus.emit(Event::MicrophoneStarted {
                    sample_rate,
                    channels,
                });
                true
            }
            Err(e) => {
                error!("Failed to start microphone: {:#}", e);
                self.bus.emit(Event::error(
                    ErrorKind::MicrophoneAccess,
                    format!("Could not access the microphone: {}", e),
                ));
                false
            }
        }
    }

    fn start_tone(&mut self, frequency: f64, duration: Option<Duration>) -> bool {
        if self.output.is_none() {
            error!("Audio engine not initialized");
            return false;
        }
        if !(frequency.is_finite() && frequency > 0.0) {
            self.bus.emit(Event::error(
                ErrorKind::ToneGeneration,
                format!("Cannot play a tone at {} Hz", frequency),
            ));
            return false;
        }

        self.stop_tone();

        let sent = self.output.as_ref().map(|output| {
            output.commands.send(ToneCommand::Start {
                frequency: frequency as f32,
            })
        });
        if !matches!(sent, Some(Ok(()))) {
            error!("Failed to generate tone: output callback is gone");
            self.bus.emit(Event::error(
                ErrorKind::ToneGeneration,
                "Could not start the reference tone",
            ));
            return false;
        }

        let duration = duration.filter(|d| !d.is_zero());
        self.is_generating_tone = true;
        self.tone_deadline = duration.map(|d| Instant::now() + d);

        match duration {
            Some(d) => info!("Tone started: {:.2} Hz for {:.1}s", frequency, d.as_secs_f64()),
            None => info!("Tone started: {:.2} Hz, infinite", frequency),
        }

        self.bus.emit(Event::ToneStarted {
            frequency,
            duration: duration.map(|d| d.as_secs_f64()),
            timestamp: self.current_time(),
        });
        true
    }

    fn stop_tone(&mut self) {
        if !self.is_generating_tone {
            return;
        }
        if let Some(output) = &self.output {
            if output.commands.send(ToneCommand::Stop).is_err() {
                warn!("Error stopping tone: output callback is gone");
            }
        }
        self.is_generating_tone = false;
        self.tone_deadline = None;
        self.bus.emit(Event::ToneStopped {
            timestamp: self.current_time(),
        });
    }

    fn input_level(&mut self) -> f64 {
        let Some(input) = &self.input else {
            return f64::NEG_INFINITY;
        };
        while let Ok(rms) = input.levels.try_recv() {
            self.last_rms = rms;
        }
        amplitude_to_db(self.last_rms as f64)
    }

    fn is_generating_tone(&self) -> bool {
        self.is_generating_tone
    }

    fn poll(&mut self) {
        if let Some(deadline) = self.tone_deadline {
            if Instant::now() >= deadline {
                self.stop_tone();
            }
        }
    }

    fn status(&self) -> AudioStatus {
        AudioStatus {
            is_initialized: self.output.is_some(),
            is_microphone_active: self.input.is_some(),
            is_generating_tone: self.is_generating_tone,
            sample_rate: self.output.as_ref().map(|output| output.sample_rate),
        }
    }

    fn stop_all(&mut self) {
        self.stop_tone();

        if let Some(input) = self.input.take() {
            if let Err(e) = input.stream.pause() {
                warn!("Error pausing input stream: {}", e);
            }
        }
        if let Some(output) = self.output.take() {
            if let Err(e) = output.stream.pause() {
                warn!("Error pausing output stream: {}", e);
            }
        }
        self.last_rms = 0.0;

        info!("Audio engine stopped and cleaned up");
    }
}

/// Opens the default output device and starts a stream driven by a [`ToneVoice`].
///
/// The stream plays silence until a [`ToneCommand::Start`] arrives.
fn start_tone_output(config: &AudioConfig) -> Result<OutputState> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;

    info!("Using audio output device: {}", device.name()?);

    let supported = device.default_output_config()?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(anyhow!(
            "Output device uses {:?} samples, f32 required",
            supported.sample_format()
        ));
    }

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let stream_config: cpal::StreamConfig = supported.into();

    let (command_tx, command_rx) = crossbeam_channel::unbounded::<ToneCommand>();
    let mut voice = ToneVoice::new(sample_rate, config.tone_gain, config.fade_seconds);

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            while let Ok(command) = command_rx.try_recv() {
                voice.apply(command);
            }
            for frame in data.chunks_mut(channels) {
                let sample = voice.next_sample();
                for out in frame.iter_mut() {
                    *out = sample;
                }
            }
        },
        |err: cpal::StreamError| error!("An error occurred on the output stream: {}", err),
        None,
    )?;

    stream.play()?;

    Ok(OutputState {
        stream,
        commands: command_tx,
        sample_rate,
    })
}

/// Opens the default input device and streams the RMS of every callback buffer.
fn start_level_capture(channel_capacity: usize) -> Result<(InputState, u32, u16)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported = find_supported_config(configs, TARGET_INPUT_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let stream_config: cpal::StreamConfig = supported.into();

    let (level_tx, level_rx) = crossbeam_channel::bounded::<f32>(channel_capacity);

    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if data.is_empty() {
                return;
            }
            let rms = (data.iter().map(|&s| s * s).sum::<f32>() / data.len() as f32).sqrt();
            // A full channel means nobody is reading; dropping the measurement is fine.
            let _ = level_tx.try_send(rms);
        },
        |err: cpal::StreamError| error!("An error occurred on the input stream: {}", err),
        None,
    )?;

    stream.play()?;

    Ok((
        InputState {
            stream,
            levels: level_rx,
        },
        sample_rate,
        channels,
    ))
}

/// Picks an f32 input configuration, preferring fewer channels and then the range closest to
/// `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfig> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            let in_range = (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_rate);
            let rate_distance = if in_range { 0 } else { min_diff.min(max_diff) };
            (c.channels(), rate_distance)
        })
        .map(|c| {
            let rate = target_rate.clamp(c.min_sample_rate().0, c.max_sample_rate().0);
            c.with_sample_rate(cpal::SampleRate(rate))
        })
}
