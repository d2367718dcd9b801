//! Rotation estimate from the corner squares and its correction.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

use crate::geometry::{CornerPositions, Pixel};
use crate::matrix::IntensityMatrix;

/// Clockwise tilt of the printed sheet, in degrees.
///
/// Averages the slope of the top and bottom edges with the slope of the left
/// and right edges, weighting the vertical estimate 1.5 times more: the
/// vertical edges are longer and their angle is more stable.
pub(crate) fn estimate_rotation_deg(c: &CornerPositions) -> f64 {
    let slope = |a: Pixel, b: Pixel| f64::from(b.row - a.row).atan2(f64::from(b.col - a.col));
    let lean = |top: Pixel, bottom: Pixel| {
        f64::from(top.col - bottom.col).atan2(f64::from(bottom.row - top.row))
    };
    let horizontal = (slope(c.tl, c.tr) + slope(c.bl, c.br)) / 2.0;
    let vertical = (lean(c.tl, c.bl) + lean(c.tr, c.br)) / 2.0;
    ((horizontal + 1.5 * vertical) / 2.5).to_degrees()
}

/// Rotate the sheet counterclockwise by `degrees` about its center.
///
/// The picture is first laid on a white canvas large enough to keep every
/// pixel after rotation; uncovered areas stay white.
pub(crate) fn rotate(m: &IntensityMatrix, degrees: f64) -> IntensityMatrix {
    let gray = m.to_gray();
    let (w, h) = gray.dimensions();
    let theta = degrees.to_radians();
    let pad = (f64::from(w.max(h)) * theta.sin().abs() / 2.0).ceil() as u32 + 1;
    let mut canvas = GrayImage::from_pixel(w + 2 * pad, h + 2 * pad, Luma([255]));
    image::imageops::overlay(&mut canvas, &gray, i64::from(pad), i64::from(pad));
    let rotated = rotate_about_center(&canvas, -theta as f32, Interpolation::Bicubic, Luma([255]));
    IntensityMatrix::from_gray(&rotated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Corners of an upright rectangle turned clockwise by `deg` around (0, 0).
    fn tilted(deg: f64) -> CornerPositions {
        let (s, c) = deg.to_radians().sin_cos();
        let turn = |p: Pixel| {
            let (x, y) = (f64::from(p.col), f64::from(p.row));
            Pixel::new((x * s + y * c).round() as i32, (x * c - y * s).round() as i32)
        };
        CornerPositions {
            tl: Pixel::new(0, 0),
            tr: Pixel::new(0, 7400),
            bl: Pixel::new(10880, 0),
            br: Pixel::new(10880, 7400),
        }
        .map(turn)
    }

    #[test]
    fn upright_sheet_has_no_rotation() {
        assert_abs_diff_eq!(estimate_rotation_deg(&tilted(0.0)), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn clockwise_tilt_is_positive() {
        assert_abs_diff_eq!(estimate_rotation_deg(&tilted(1.5)), 1.5, epsilon = 0.05);
        assert_abs_diff_eq!(estimate_rotation_deg(&tilted(-3.0)), -3.0, epsilon = 0.05);
    }

    #[test]
    fn rotation_keeps_the_whole_picture() {
        let mut m = IntensityMatrix::white(100, 60);
        m.fill_rect(Pixel::new(45, 25), 10, 10, 0.0);
        let r = rotate(&m, 10.0);
        assert!(r.rows() > 100 && r.cols() > 60);
        // the centered square stays dark, the canvas corners stay white
        let (ci, cj) = (r.rows() as i32 / 2, r.cols() as i32 / 2);
        assert!(r.get(ci, cj) < 0.2);
        assert!(r.get(0, 0) > 0.9);
    }
}
