//! Calibration engine: corner squares, rotation correction, scale and the
//! identification-band anchor.
//!
//! Stages, in order:
//!
//! 1. **Orientation** – landscape input is turned a quarter counterclockwise.
//! 2. **Corners** – the four calibration squares are searched with a relaxing
//!    tolerance schedule; a torn or implausible corner is rebuilt from the
//!    three others.
//! 3. **Rotation** – the sheet tilt is estimated from the corners, corrected
//!    with one bicubic rotation, and the corners are searched again.
//! 4. **Scale** – pixels per millimeter from the corner spans, vertical
//!    estimate weighted 1.5.
//! 5. **Id band** – the first dark square right of the top-left corner; when
//!    missing the sheet is assumed upside-down and turned 180°.

mod config;
mod corners;
mod reject;
mod rotation;
pub(crate) mod square;

pub use config::CalibrationConfig;
pub use reject::{CalibrationError, CalibrationRejectContext, CalibrationRejectReason};

use crate::debug_dump::{Overlay, OverlayColor};
use crate::geometry::{Corner, CornerPositions, Pixel, SheetGeometry};
use crate::matrix::IntensityMatrix;

use corners::{alignment_warnings, detect_four_squares};
use rotation::{estimate_rotation_deg, rotate};
use square::find_black_square;

/// Everything learned about a picture's geometry.
///
/// Positions refer to the rectified matrix returned alongside the record
/// (rotated, and turned 180° when `upside_down`).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CalibrationRecord {
    pub corners: CornerPositions,
    /// Corners rebuilt from the three others.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reconstructed: Vec<Corner>,
    pub h_pixels_per_mm: f64,
    pub v_pixels_per_mm: f64,
    /// Combined scale `(h + 1.5 v) / 2.5`.
    pub pixels_per_mm: f64,
    /// Identification-band square side, in pixels.
    pub square_size: f64,
    /// Checkbox side, in pixels.
    pub cell_size: f64,
    /// Calibration square side used for the corner search, in pixels.
    pub calibration_square_size: usize,
    /// Top-left pixel of the identification-band anchor square.
    pub id_band: Pixel,
    /// Applied correction, in degrees (clockwise tilt of the scan).
    pub rotation_deg: f64,
    pub upside_down: bool,
    /// Input was landscape and turned a quarter counterclockwise.
    pub transposed: bool,
    /// Physical position (mm from the bottom-left paper corner) of the
    /// top-left calibration square's top-left pixel.
    pub origin_mm: [f64; 2],
}

impl CalibrationRecord {
    /// Pixel `(row, col)` of the physical point `(x, y)`, in millimeters from
    /// the sheet's bottom-left corner.
    pub fn xy_to_ij(&self, x: f64, y: f64) -> Pixel {
        let (top_left, _) = self.corners.area();
        let [x0, y0] = self.origin_mm;
        Pixel::new(
            ((y0 - y) * self.v_pixels_per_mm + f64::from(top_left.row)).round() as i32,
            ((x - x0) * self.h_pixels_per_mm + f64::from(top_left.col)).round() as i32,
        )
    }

    /// Identification-band square side rounded to whole pixels.
    pub fn square_size_px(&self) -> usize {
        self.square_size.round().max(1.0) as usize
    }

    /// Checkbox side rounded to whole pixels.
    pub fn cell_size_px(&self) -> usize {
        self.cell_size.round().max(1.0) as usize
    }

    /// Overlay shapes for the corners and the id-band anchor.
    pub fn overlays(&self) -> Vec<Overlay> {
        let mut out: Vec<Overlay> = Corner::ALL
            .into_iter()
            .map(|c| {
                let color = if self.reconstructed.contains(&c) {
                    OverlayColor::Green
                } else {
                    OverlayColor::Blue
                };
                Overlay::square(self.corners.get(c), self.calibration_square_size, color)
            })
            .collect();
        out.push(Overlay::square(self.id_band, self.square_size_px(), OverlayColor::Cyan));
        out
    }
}

/// Rectified picture and its calibration.
#[derive(Debug, Clone)]
pub struct Calibrated {
    pub matrix: IntensityMatrix,
    pub record: CalibrationRecord,
    pub overlays: Vec<Overlay>,
}

/// Search window `(top_left, bottom_right)` of the id-band anchor.
fn id_band_window(corners: &CornerPositions, square: usize) -> (Pixel, Pixel) {
    let (top_left, bottom_right) = corners.area();
    let s = square as i32;
    (
        Pixel::new(top_left.row - s, top_left.col + 3 * s),
        Pixel::new(top_left.row + 2 * s, bottom_right.col - 2 * s),
    )
}

fn scale(corners: &CornerPositions, geometry: &SheetGeometry) -> (f64, f64, f64) {
    let (top_left, bottom_right) = corners.area();
    let h = f64::from(bottom_right.col - top_left.col) / geometry.horizontal_span_mm();
    let v = f64::from(bottom_right.row - top_left.row) / geometry.vertical_span_mm();
    (h, v, (h + 1.5 * v) / 2.5)
}

/// Calibrate one scanned side.
///
/// Returns the rectified matrix with its [`CalibrationRecord`]. A failure
/// carries a typed reason and the overlays collected so far; callers skip the
/// picture and continue.
pub fn calibrate(
    input: &IntensityMatrix,
    geometry: &SheetGeometry,
    config: &CalibrationConfig,
) -> Result<Calibrated, CalibrationError> {
    let transposed = input.cols() > input.rows();
    let mut matrix = if transposed {
        tracing::debug!(rows = input.rows(), cols = input.cols(), "landscape input turned to portrait");
        input.rotated_90_ccw()
    } else {
        input.clone()
    };

    let nominal_ppmm = matrix.cols() as f64 / geometry.paper_width_mm;
    let calib_size = (geometry.calibration_square_size_mm * nominal_ppmm).round().max(1.0) as usize;

    let mut overlays = Vec::new();
    let first = detect_four_squares(&matrix, calib_size, config, &mut overlays)?;
    let mut rotation_deg = estimate_rotation_deg(&first.corners);
    let detection = if rotation_deg.abs() >= config.min_rotation_deg {
        tracing::debug!(rotation_deg, "correcting sheet rotation");
        matrix = rotate(&matrix, rotation_deg);
        overlays.clear();
        detect_four_squares(&matrix, calib_size, config, &mut overlays)?
    } else {
        rotation_deg = 0.0;
        first
    };

    let mut corners = detection.corners;
    let mut reconstructed = detection.reconstructed;
    let (h, v, ppmm) = scale(&corners, geometry);
    for warning in alignment_warnings(&corners, h, v, config.max_alignment_error_mm) {
        tracing::warn!("{warning}");
    }

    let square = (geometry.square_size_mm * ppmm).round().max(1.0) as usize;
    let search = |m: &IntensityMatrix, c: &CornerPositions| {
        let (from, to) = id_band_window(c, square);
        find_black_square(
            m,
            from,
            to,
            square,
            config.id_band_error,
            config.id_band_gray_level,
            config.max_refine_steps,
        )
    };

    let mut upside_down = false;
    let id_band = match search(&matrix, &corners) {
        Some(p) => p,
        None => {
            tracing::debug!("id band not found, trying upside-down");
            let (rows, cols) = (matrix.rows() as i32, matrix.cols() as i32);
            let s = calib_size as i32;
            matrix = matrix.rotated_180();
            corners = corners
                .map(|p| Pixel::new(rows - p.row - s, cols - p.col - s))
                .flipped();
            reconstructed = reconstructed.into_iter().map(Corner::opposite).collect();
            upside_down = true;
            match search(&matrix, &corners) {
                Some(p) => p,
                None => {
                    let (search_top_left, search_bottom_right) = id_band_window(&corners, square);
                    overlays.push(Overlay::area(
                        search_top_left,
                        search_bottom_right,
                        OverlayColor::Red,
                    ));
                    return Err(CalibrationError::new(
                        CalibrationRejectReason::IdBandNotFound,
                        CalibrationRejectContext::IdBandNotFound {
                            search_top_left,
                            search_bottom_right,
                            retried_upside_down: true,
                        },
                        overlays,
                    ));
                }
            }
        }
    };

    let (h, v, ppmm) = scale(&corners, geometry);
    let record = CalibrationRecord {
        corners,
        reconstructed,
        h_pixels_per_mm: h,
        v_pixels_per_mm: v,
        pixels_per_mm: ppmm,
        square_size: geometry.square_size_mm * ppmm,
        cell_size: geometry.cell_size_mm * ppmm,
        calibration_square_size: calib_size,
        id_band,
        rotation_deg,
        upside_down,
        transposed,
        origin_mm: geometry.origin_mm(),
    };
    tracing::debug!(
        ppmm = record.pixels_per_mm,
        rotation_deg,
        upside_down,
        tolerance = detection.tolerance,
        id_band = %record.id_band,
        "picture calibrated"
    );
    Ok(Calibrated {
        overlays: record.overlays(),
        matrix,
        record,
    })
}
