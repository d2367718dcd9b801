//! Debug overlays and the versioned per-picture debug dump.
//!
//! Overlays are plain shapes in picture pixel coordinates. Calibration errors
//! carry them so a caller can show where the engine looked; the reviewer uses
//! them to colour checkboxes by status.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationRecord;
use crate::checkbox::CheckboxStatus;
use crate::geometry::Pixel;
use crate::identify::Identification;
use crate::matrix::IntensityMatrix;

pub const DEBUG_SCHEMA_V1: &str = "mcqscan.debug.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayColor {
    Red,
    Green,
    Blue,
    Cyan,
    Magenta,
    Pink,
}

impl OverlayColor {
    pub const fn rgb(self) -> [u8; 3] {
        match self {
            Self::Red => [255, 0, 0],
            Self::Green => [0, 255, 0],
            Self::Blue => [0, 0, 255],
            Self::Cyan => [0, 255, 255],
            Self::Magenta => [255, 0, 255],
            Self::Pink => [255, 192, 203],
        }
    }

    /// Display colour of a checkbox, brighter when the operator amended it.
    pub fn for_checkbox(status: CheckboxStatus, amended: bool) -> Self {
        match (status, amended) {
            (CheckboxStatus::Checked, true) => Self::Cyan,
            (CheckboxStatus::Unchecked, true) => Self::Red,
            (CheckboxStatus::Checked, false) => Self::Blue,
            (CheckboxStatus::ProbablyChecked, _) => Self::Green,
            (CheckboxStatus::ProbablyUnchecked, _) => Self::Magenta,
            (CheckboxStatus::Unchecked, false) => Self::Pink,
        }
    }
}

/// A shape drawn on top of a picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Overlay {
    /// Square of side `size` whose top-left pixel is `position`.
    Rectangle {
        position: Pixel,
        size: usize,
        color: OverlayColor,
        thickness: u32,
    },
    /// Search area delimited by two opposite pixels.
    Area {
        top_left: Pixel,
        bottom_right: Pixel,
        color: OverlayColor,
    },
}

impl Overlay {
    pub fn square(position: Pixel, size: usize, color: OverlayColor) -> Self {
        Self::Rectangle {
            position,
            size,
            color,
            thickness: 1,
        }
    }

    pub fn area(top_left: Pixel, bottom_right: Pixel, color: OverlayColor) -> Self {
        Self::Area {
            top_left,
            bottom_right,
            color,
        }
    }
}

fn draw_box(canvas: &mut RgbImage, top_left: Pixel, height: i32, width: i32, color: OverlayColor, thickness: u32) {
    for t in 0..thickness as i32 {
        let (h, w) = (height - 2 * t, width - 2 * t);
        if h <= 0 || w <= 0 {
            break;
        }
        let rect = Rect::at(top_left.col + t, top_left.row + t).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, Rgb(color.rgb()));
    }
}

/// Render a picture with overlays for visual inspection.
pub fn render_overlays(matrix: &IntensityMatrix, overlays: &[Overlay]) -> RgbImage {
    let gray = matrix.to_gray();
    let mut canvas = RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });
    for overlay in overlays {
        match *overlay {
            Overlay::Rectangle {
                position,
                size,
                color,
                thickness,
            } => draw_box(&mut canvas, position, size as i32, size as i32, color, thickness.max(1)),
            Overlay::Area {
                top_left,
                bottom_right,
                color,
            } => draw_box(
                &mut canvas,
                top_left,
                bottom_right.row - top_left.row,
                bottom_right.col - top_left.col,
                color,
                1,
            ),
        }
    }
    canvas
}

/// Per-checkbox entry of a debug dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckboxDebug {
    pub question: u32,
    pub answer: u32,
    pub position: Pixel,
    pub status: CheckboxStatus,
}

/// Everything known about one picture, for offline inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PictureDebug {
    pub schema_version: String,
    pub picture: String,
    pub width: usize,
    pub height: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibrationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identification: Option<Identification>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checkboxes: Vec<CheckboxDebug>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub overlays: Vec<Overlay>,
}

impl PictureDebug {
    pub fn new(picture: impl Into<String>, width: usize, height: usize) -> Self {
        Self {
            schema_version: DEBUG_SCHEMA_V1.to_string(),
            picture: picture.into(),
            width,
            height,
            calibration: None,
            identification: None,
            checkboxes: Vec::new(),
            failure: None,
            overlays: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_serialization_is_tagged() {
        let o = Overlay::square(Pixel::new(3, 4), 5, OverlayColor::Cyan);
        let json = serde_json::to_string(&o).expect("serialize overlay");
        assert!(json.contains("\"kind\":\"rectangle\""));
        assert!(json.contains("\"color\":\"cyan\""));
        let back: Overlay = serde_json::from_str(&json).expect("parse overlay");
        assert_eq!(back, o);
    }

    #[test]
    fn render_draws_rectangle_outline() {
        let m = IntensityMatrix::white(20, 20);
        let img = render_overlays(&m, &[Overlay::square(Pixel::new(5, 5), 6, OverlayColor::Red)]);
        assert_eq!(img.get_pixel(5, 5).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(7, 7).0, [255, 255, 255]);
    }

    #[test]
    fn amended_checkboxes_use_distinct_colors() {
        assert_eq!(
            OverlayColor::for_checkbox(CheckboxStatus::Checked, true),
            OverlayColor::Cyan
        );
        assert_eq!(
            OverlayColor::for_checkbox(CheckboxStatus::Checked, false),
            OverlayColor::Blue
        );
    }

    #[test]
    fn debug_dump_carries_schema_version() {
        let dump = PictureDebug::new("abc/0", 10, 20);
        let json = serde_json::to_value(&dump).expect("serialize dump");
        assert_eq!(json["schema_version"], DEBUG_SCHEMA_V1);
        assert!(json.get("calibration").is_none());
    }
}
