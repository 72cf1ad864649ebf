//! # Main Display Module
//!
//! This module contains the main display components and layout logic
//! for the guitar tuner application.

use iced::widget::{
    button, column, container, horizontal_space, row, slider, text, text_input, Row, Space,
};
use iced::{Alignment, Background, Color, Element, Length};
use tuner_core::frequency::STRINGS;
use tuner_core::reference_pitch::{
    MAX_REFERENCE_PITCH, MIN_REFERENCE_PITCH, REFERENCE_PITCH_STEP, STANDARD_REFERENCE_PITCH,
};
use tuner_core::{ToneDuration, TunerMode};

use super::cent_meter;
use super::format;
use crate::{AppDisplayData, Message};

/// Different highlight states of a control button
#[derive(Debug, Clone, Copy, PartialEq)]
enum ButtonType {
    /// Standard button with no special styling
    Standard,
    /// Currently selected option
    Active,
    /// String whose reference tone is sounding
    Playing,
}

/// Creates the complete main application view
pub fn create_main_view(data: &AppDisplayData) -> Element<'static, Message> {
    if let Some(error) = &data.startup_error {
        return container(text(format!("Tuner unavailable: {}", error)).size(24))
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .into();
    }

    let title = text("Guitar Tuner").size(28);

    let main_content = column![
        row![title, horizontal_space(), create_mode_selector(data.mode)].align_y(Alignment::Center),
        Space::with_height(10),
        create_reference_panel(data),
        create_strings_panel(data),
        create_meter_panel(data),
        Space::with_height(10),
        create_status_bar(data),
    ]
    .spacing(10)
    .padding(20);

    container(main_content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

/// Reference pitch slider, entry field and reset button.
fn create_reference_panel(data: &AppDisplayData) -> Element<'static, Message> {
    let offset = if data.is_standard {
        "Standard".to_string()
    } else {
        format::format_reference_offset(data.reference_pitch, STANDARD_REFERENCE_PITCH)
    };

    let reset = make_button(
        "Reset to 440".to_string(),
        ButtonType::Standard,
        (!data.is_standard).then_some(Message::ResetReferencePitch),
    );

    let content = column![
        row![
            text("Reference pitch (A4)").size(14),
            horizontal_space(),
            text(offset).size(14),
        ],
        row![
            text(format::format_reference(data.reference_pitch)).size(24),
            Space::with_width(20),
            slider(
                MIN_REFERENCE_PITCH..=MAX_REFERENCE_PITCH,
                data.reference_pitch,
                Message::ReferencePitchChanged,
            )
            .step(REFERENCE_PITCH_STEP),
            Space::with_width(20),
            text_input("440.0", &data.reference_input)
                .on_input(Message::ReferencePitchInput)
                .on_submit(Message::ReferencePitchSubmitted)
                .size(14)
                .width(Length::Fixed(70.0)),
            text("Hz").size(14),
            Space::with_width(20),
            reset,
        ]
        .spacing(5)
        .align_y(Alignment::Center),
    ]
    .spacing(5);

    panel("Reference", content.into(), 120.0)
}

/// One button per string plus the tone duration controls.
fn create_strings_panel(data: &AppDisplayData) -> Element<'static, Message> {
    let strings = Row::with_children(STRINGS.iter().map(|string| {
        let frequency = data
            .string_frequencies
            .get(string.index)
            .map(|hz| format::format_frequency(*hz))
            .unwrap_or_else(|| "--".to_string());

        let button_type = if data.playing_string == Some(string.index) {
            ButtonType::Playing
        } else if data.selected_string == Some(string.index) {
            ButtonType::Active
        } else {
            ButtonType::Standard
        };

        make_button(
            format!("{}\n{}", string.display_name, frequency),
            button_type,
            Some(Message::StringPressed(string.index)),
        )
    }))
    .spacing(10);

    let durations = [ToneDuration::TwoSeconds, ToneDuration::Infinite].map(|duration| {
        let button_type = if data.duration == duration {
            ButtonType::Active
        } else {
            ButtonType::Standard
        };
        make_button(
            duration.label().to_string(),
            button_type,
            Some(Message::DurationSelected(duration)),
        )
    });
    let [timed, infinite] = durations;

    let tone_controls = row![
        text("Tone").size(14),
        timed,
        infinite,
        horizontal_space(),
        make_button(
            "Stop".to_string(),
            ButtonType::Standard,
            data.playing_string.map(|_| Message::StopTone),
        ),
    ]
    .spacing(10)
    .align_y(Alignment::Center);

    let content = column![strings, tone_controls].spacing(10);
    panel("Strings", content.into(), 150.0)
}

/// Tuning status, deviation and the cent meter.
fn create_meter_panel(data: &AppDisplayData) -> Element<'static, Message> {
    let reading = data.reading.as_ref();

    let status = reading
        .map(|reading| format::status_label(reading.status))
        .unwrap_or_else(|| format::status_label(Default::default()));
    let cents = reading
        .and_then(|reading| reading.cents)
        .map(format::format_cents)
        .unwrap_or_else(|| "--".to_string());
    let target = reading
        .and_then(|reading| reading.string_index)
        .and_then(|index| STRINGS.get(index))
        .map(|string| string.display_name)
        .unwrap_or("--");
    let level = reading
        .map(|reading| format::format_level(reading.level_db))
        .unwrap_or_else(|| format::format_level(f64::NEG_INFINITY));

    let content = column![
        row![
            text("String").size(14),
            horizontal_space(),
            text(format!("Input {}", level)).size(14),
        ],
        row![
            text(target).size(24),
            Space::with_width(10),
            text(cents).size(24),
            horizontal_space(),
            text(status).size(16),
        ]
        .align_y(Alignment::Center),
        cent_meter::CentMeter::new(
            reading.and_then(|reading| reading.cents),
            data.tuned_tolerance_cents,
            data.max_deviation_cents,
        )
        .view(),
    ]
    .spacing(5);

    let title = if data.mode == TunerMode::Reference {
        "Input"
    } else {
        "Cent Meter"
    };
    panel(title, content.into(), 190.0)
}

fn create_mode_selector(current: TunerMode) -> Element<'static, Message> {
    Row::with_children(TunerMode::ALL.iter().map(|mode| {
        let button_type = if *mode == current {
            ButtonType::Active
        } else {
            ButtonType::Standard
        };
        make_button(
            mode.label().to_string(),
            button_type,
            Some(Message::ModeSelected(*mode)),
        )
    }))
    .spacing(5)
    .into()
}

fn create_status_bar(data: &AppDisplayData) -> Element<'static, Message> {
    let audio = match (data.audio.is_initialized, data.audio.is_microphone_active) {
        (true, true) => "Audio + microphone",
        (true, false) => "Audio only",
        _ => "No audio",
    };
    row![
        text(data.status_message.clone()).size(14),
        horizontal_space(),
        text(audio).size(14),
    ]
    .into()
}

/// Wraps content in a titled panel of fixed height.
fn panel(title: &'static str, content: Element<'static, Message>, height: f32) -> Element<'static, Message> {
    container(
        column![text(title).size(18), content]
            .spacing(5)
            .padding(15),
    )
    .width(Length::Fill)
    .height(Length::Fixed(height))
    .into()
}

/// Creates a button styled for its state. Without a message the button is disabled.
fn make_button(
    label: String,
    button_type: ButtonType,
    message: Option<Message>,
) -> Element<'static, Message> {
    let mut button = button(text(label).size(14)).padding([6, 10]);

    match button_type {
        ButtonType::Standard => {}
        ButtonType::Active => {
            button = button.style(|_theme, _status| button::Style {
                background: Some(Background::Color(Color::from_rgb(0.2, 0.4, 0.8))),
                text_color: Color::WHITE,
                ..button::Style::default()
            });
        }
        ButtonType::Playing => {
            button = button.style(|_theme, _status| button::Style {
                background: Some(Background::Color(Color::from_rgb(0.2, 0.7, 0.4))),
                text_color: Color::WHITE,
                ..button::Style::default()
            });
        }
    }

    button.on_press_maybe(message).into()
}
