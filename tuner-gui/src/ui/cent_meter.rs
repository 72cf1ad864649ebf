//! # Cent Meter Widget
//!
//! Horizontal tuning meter. The needle shows the smoothed deviation of the input from the
//! target string, and the band around the centre marks the in-tune tolerance.

use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::widget::container;
use iced::{mouse, Color, Element, Point, Rectangle, Renderer, Size, Theme};

/// Ticks drawn on each side of the centre line.
const TICKS_PER_SIDE: u8 = 5;

/// Range used when the configured one is unusable.
const FALLBACK_RANGE: f32 = 50.0;

pub struct CentMeter {
    /// Deviation to show, `None` hides the needle
    cents: Option<f32>,
    /// Half-width of the in-tune band, in cents
    tolerance: f32,
    /// Cent deviation at either end of the meter
    range: f32,
}

impl CentMeter {
    /// `tolerance` is the tuned band and `range` the full scale, both in cents.
    pub fn new(cents: Option<f64>, tolerance: f64, range: f64) -> Self {
        let range = range as f32;
        let range = if range.is_finite() && range > 0.0 {
            range
        } else {
            FALLBACK_RANGE
        };
        Self {
            cents: cents.map(|c| c as f32),
            tolerance: (tolerance as f32).clamp(0.0, range),
            range,
        }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fixed(80.0)),
        )
        .into()
    }

    fn needle_color(&self, cents: f32) -> Color {
        if cents.abs() < self.tolerance {
            Color::from_rgb8(0x34, 0xDB, 0x98) // Green
        } else if cents.abs() < self.range * 0.4 {
            Color::from_rgb8(0xFF, 0xC3, 0x00) // Yellow
        } else {
            Color::from_rgb8(0xFF, 0x33, 0x33) // Red
        }
    }
}

/// Horizontal position of a deviation on a meter `width` pixels wide spanning `±range` cents.
fn position(cents: f32, width: f32, range: f32) -> f32 {
    (cents.clamp(-range, range) + range) / (2.0 * range) * width
}

impl<Message> canvas::Program<Message> for CentMeter {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        let background = Path::rectangle(Point::ORIGIN, bounds.size());
        frame.fill(&background, Color::from_rgb8(0x40, 0x40, 0x40));

        // In-tune band
        let band_left = position(-self.tolerance, bounds.width, self.range);
        let band_right = position(self.tolerance, bounds.width, self.range);
        let band = Path::rectangle(
            Point::new(band_left, 0.0),
            Size::new(band_right - band_left, bounds.height),
        );
        frame.fill(&band, Color::from_rgba8(0x34, 0xDB, 0x98, 0.2));

        let tick_step = self.range / f32::from(TICKS_PER_SIDE);
        let ticks = i16::from(TICKS_PER_SIDE);
        for step in -ticks..=ticks {
            let x = position(f32::from(step) * tick_step, bounds.width, self.range);
            let (length, width, color) = if step == 0 {
                (bounds.height, 2.0, Color::WHITE)
            } else {
                (bounds.height * 0.25, 1.0, Color::from_rgb8(0xA0, 0xA0, 0xA0))
            };
            let line = Path::line(Point::new(x, 0.0), Point::new(x, length));
            frame.stroke(&line, Stroke::default().with_width(width).with_color(color));
        }

        if let Some(c) = self.cents {
            let needle_pos = position(c, bounds.width, self.range);
            let needle =
                Path::rectangle(Point::new(needle_pos - 2.0, 0.0), Size::new(4.0, bounds.height));
            frame.fill(&needle, self.needle_color(c));
        }

        vec![frame.into_geometry()]
    }
}
