//! Draws face boxes and match labels onto RGB frames.

use crate::frame_loop::Annotation;
use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{PrimitiveStyleBuilder, Rectangle, StrokeAlignment},
    text::{Baseline, Text},
};
use image::{Rgb, RgbImage};
use std::convert::Infallible;

pub const KNOWN_COLOR: Rgb888 = Rgb888::new(0, 255, 0);
pub const UNKNOWN_COLOR: Rgb888 = Rgb888::new(255, 0, 0);
const STROKE_WIDTH: u32 = 2;
/// Gap between the top of the box and the label baseline.
const LABEL_GAP: i32 = 4;

/// Draw every annotation onto `frame`. Shapes are clipped to the frame.
pub fn annotate(frame: &mut RgbImage, annotations: &[Annotation]) {
    let mut target = Target(frame);
    for annotation in annotations {
        let color = if annotation.result.is_known() {
            KNOWN_COLOR
        } else {
            UNKNOWN_COLOR
        };
        let region = &annotation.region;
        let top_left = Point::new(region.x.round() as i32, region.y.round() as i32);
        let size = Size::new(
            region.width.max(0.0).round() as u32,
            region.height.max(0.0).round() as u32,
        );

        let style = PrimitiveStyleBuilder::new()
            .stroke_color(color)
            .stroke_width(STROKE_WIDTH)
            .stroke_alignment(StrokeAlignment::Inside)
            .build();
        match Rectangle::new(top_left, size).into_styled(style).draw(&mut target) {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }

        // Above the box when there is room, otherwise just inside it.
        let (anchor, baseline) = if top_left.y - LABEL_GAP >= FONT_10X20.character_size.height as i32 {
            (Point::new(top_left.x, top_left.y - LABEL_GAP), Baseline::Bottom)
        } else {
            (Point::new(top_left.x + LABEL_GAP, top_left.y + LABEL_GAP), Baseline::Top)
        };
        let label = annotation.result.to_string();
        let style = MonoTextStyle::new(&FONT_10X20, color);
        match Text::with_baseline(&label, anchor, style, baseline).draw(&mut target) {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

struct Target<'a>(&'a mut RgbImage);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle::new(Point::zero(), Size::new(self.0.width(), self.0.height()))
    }
}

impl DrawTarget for Target<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.0.dimensions();
        for Pixel(point, color) in pixels {
            if point.x >= 0 && point.y >= 0 && (point.x as u32) < width && (point.y as u32) < height {
                self.0
                    .put_pixel(point.x as u32, point.y as u32, Rgb([color.r(), color.g(), color.b()]));
            }
        }
        Ok(())
    }
}
