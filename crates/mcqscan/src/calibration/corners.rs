//! Four-corner detection with plausibility filters and reconstruction.

use crate::debug_dump::{Overlay, OverlayColor};
use crate::geometry::{Corner, CornerPositions, PartialCorners, Pixel};
use crate::matrix::IntensityMatrix;

use super::reject::{CalibrationError, CalibrationRejectContext, CalibrationRejectReason};
use super::square::{eval_square_color, find_corner_square};
use super::CalibrationConfig;

/// Corners accepted by [`detect_four_squares`].
#[derive(Debug, Clone)]
pub(crate) struct CornerDetection {
    pub corners: CornerPositions,
    /// Corners rebuilt from the three others rather than observed.
    pub reconstructed: Vec<Corner>,
    pub tolerance: f32,
}

/// `|cos|` of the angle at `corner` between its two sheet edges.
fn corner_cosine(found: &PartialCorners, corner: Corner) -> Option<f64> {
    let at = found.get(corner)?.as_vector();
    let u = found.get(corner.same_row())?.as_vector() - at;
    let v = found.get(corner.same_column())?.as_vector() - at;
    let norms = u.norm() * v.norm();
    if norms <= f64::EPSILON {
        return Some(1.0);
    }
    Some((u.dot(&v) / norms).abs())
}

/// Parallelogram rule: the missing corner completes the three others.
fn reconstruct(found: &PartialCorners, corner: Corner) -> Option<Pixel> {
    let row_mate = found.get(corner.same_row())?.as_vector();
    let col_mate = found.get(corner.same_column())?.as_vector();
    let opposite = found.get(corner.opposite())?.as_vector();
    Some(Pixel::from_vector(row_mate + (col_mate - opposite)))
}

enum Attempt {
    Accepted(CornerDetection),
    Rejected(CalibrationRejectContext),
}

fn attempt(
    m: &IntensityMatrix,
    size: usize,
    tolerance: f32,
    config: &CalibrationConfig,
    overlays: &mut Vec<Overlay>,
) -> Attempt {
    let mut found = PartialCorners::default();
    for corner in Corner::ALL {
        match find_corner_square(m, corner, size, tolerance, config) {
            Ok(p) => found.set(corner, p),
            Err(miss) => {
                if let Some(candidate) = miss.candidate {
                    let overlay = Overlay::square(candidate, size, OverlayColor::Red);
                    let err = CalibrationError::new(
                        CalibrationRejectReason::SquareMissing,
                        CalibrationRejectContext::SquareMissing {
                            corner,
                            candidate,
                            whiteness: miss.whiteness,
                            max_whiteness: config.max_whiteness,
                        },
                        vec![overlay.clone()],
                    );
                    tracing::debug!(tolerance, error = %err, "corner candidate rejected");
                    overlays.push(overlay);
                }
            }
        }
    }

    if found.len() <= 2 {
        return Attempt::Rejected(CalibrationRejectContext::TooFewCorners {
            found: found.iter().map(|(c, _)| c).collect(),
            tolerance,
        });
    }

    if found.len() == 4 {
        let orthogonal: Vec<Corner> = Corner::ALL
            .into_iter()
            .filter(|&c| {
                corner_cosine(&found, c).is_some_and(|cos| cos < config.max_orthogonality_cos)
            })
            .collect();
        tracing::debug!(tolerance, ?orthogonal, "corner orthogonality");

        // A single right angle means its diagonal opposite is the misplaced one.
        if let [good] = orthogonal.as_slice() {
            let dropped = good.opposite();
            tracing::debug!(corner = %dropped, "dropping corner opposite the only right angle");
            found.remove(dropped);
        }

        if found.len() == 4 {
            let lightest = Corner::ALL
                .into_iter()
                .filter_map(|c| found.get(c).map(|p| (c, eval_square_color(m, p, size, 0))))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((corner, darkness)) = lightest {
                if darkness < config.min_square_darkness {
                    tracing::debug!(%corner, darkness, "dropping light corner square");
                    found.remove(corner);
                }
            }
        }

        if found.len() == 4 && orthogonal.len() <= 2 {
            return Attempt::Rejected(CalibrationRejectContext::InconsistentCorners {
                orthogonal_corners: orthogonal.len(),
                tolerance,
            });
        }
    }

    let mut reconstructed = Vec::new();
    for corner in Corner::ALL {
        if found.get(corner).is_none() {
            if let Some(p) = reconstruct(&found, corner) {
                tracing::debug!(%corner, position = %p, "corner reconstructed");
                found.set(corner, p);
                reconstructed.push(corner);
            }
        }
    }

    match found.complete() {
        Some(corners) => Attempt::Accepted(CornerDetection {
            corners,
            reconstructed,
            tolerance,
        }),
        None => Attempt::Rejected(CalibrationRejectContext::TooFewCorners {
            found: found.iter().map(|(c, _)| c).collect(),
            tolerance,
        }),
    }
}

/// Find the four calibration squares, relaxing the tolerance until an
/// attempt passes the plausibility filters.
pub(crate) fn detect_four_squares(
    m: &IntensityMatrix,
    size: usize,
    config: &CalibrationConfig,
    overlays: &mut Vec<Overlay>,
) -> Result<CornerDetection, CalibrationError> {
    let mut last = CalibrationRejectContext::TooFewCorners {
        found: Vec::new(),
        tolerance: 0.0,
    };
    for &tolerance in &config.tolerances {
        let mut attempt_overlays = Vec::new();
        match attempt(m, size, tolerance, config, &mut attempt_overlays) {
            Attempt::Accepted(detection) => {
                for corner in Corner::ALL {
                    let color = if detection.reconstructed.contains(&corner) {
                        OverlayColor::Green
                    } else {
                        OverlayColor::Blue
                    };
                    overlays.push(Overlay::square(detection.corners.get(corner), size, color));
                }
                return Ok(detection);
            }
            Attempt::Rejected(context) => {
                tracing::debug!(tolerance, ?context, "corner detection attempt rejected");
                overlays.extend(attempt_overlays);
                last = context;
            }
        }
    }
    Err(CalibrationError::new(
        CalibrationRejectReason::CalibrationSquaresNotFound,
        last,
        overlays.clone(),
    ))
}

/// Facing corners that disagree by more than `max_error_mm` on their shared
/// axis. Returned as human-readable notes; none of them is fatal.
pub(crate) fn alignment_warnings(
    corners: &CornerPositions,
    h_pixels_per_mm: f64,
    v_pixels_per_mm: f64,
    max_error_mm: f64,
) -> Vec<String> {
    let pairs = [
        (Corner::TopLeft, Corner::TopRight, true),
        (Corner::BottomLeft, Corner::BottomRight, true),
        (Corner::TopLeft, Corner::BottomLeft, false),
        (Corner::TopRight, Corner::BottomRight, false),
    ];
    let mut warnings = Vec::new();
    for (a, b, same_row) in pairs {
        let (pa, pb) = (corners.get(a), corners.get(b));
        let error_mm = if same_row {
            (pa.row - pb.row).abs() as f64 / v_pixels_per_mm
        } else {
            (pa.col - pb.col).abs() as f64 / h_pixels_per_mm
        };
        if error_mm > max_error_mm {
            warnings.push(format!("{a} and {b} are misaligned by {error_mm:.1} mm"));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: usize = 20;

    fn sheet(corners: &[Pixel]) -> IntensityMatrix {
        let mut m = IntensityMatrix::white(1188, 840);
        for &p in corners {
            m.fill_rect(p, SIZE, SIZE, 0.0);
        }
        m
    }

    const TL: Pixel = Pixel::new(40, 40);
    const TR: Pixel = Pixel::new(40, 780);
    const BL: Pixel = Pixel::new(1128, 40);
    const BR: Pixel = Pixel::new(1128, 780);

    #[test]
    fn four_clean_corners_are_accepted() {
        let m = sheet(&[TL, TR, BL, BR]);
        let mut overlays = Vec::new();
        let det = detect_four_squares(&m, SIZE, &CalibrationConfig::default(), &mut overlays)
            .expect("corners found");
        assert_eq!(det.corners, CornerPositions { tl: TL, tr: TR, bl: BL, br: BR });
        assert!(det.reconstructed.is_empty());
        assert_eq!(overlays.len(), 4);
    }

    #[test]
    fn torn_corner_is_reconstructed() {
        let m = sheet(&[TL, TR, BL]);
        let mut overlays = Vec::new();
        let det = detect_four_squares(&m, SIZE, &CalibrationConfig::default(), &mut overlays)
            .expect("three corners suffice");
        assert_eq!(det.reconstructed, vec![Corner::BottomRight]);
        assert_eq!(det.corners.br, BR);
    }

    #[test]
    fn two_corners_fail_calibration() {
        let m = sheet(&[TL, BR]);
        let mut overlays = Vec::new();
        let err = detect_four_squares(&m, SIZE, &CalibrationConfig::default(), &mut overlays)
            .unwrap_err();
        assert_eq!(err.reason, CalibrationRejectReason::CalibrationSquaresNotFound);
        match err.context {
            CalibrationRejectContext::TooFewCorners { found, .. } => assert!(found.len() <= 2),
            other => panic!("unexpected context {other:?}"),
        }
    }

    #[test]
    fn misplaced_corner_is_replaced_by_reconstruction() {
        // The BR mark is torn off and a smudge sits in its quadrant.
        let smudge = Pixel::new(1000, 700);
        let mut m = sheet(&[TL, TR, BL]);
        m.fill_rect(smudge, SIZE, SIZE, 0.0);
        let mut found = PartialCorners::default();
        found.set(Corner::TopLeft, TL);
        found.set(Corner::TopRight, TR);
        found.set(Corner::BottomLeft, BL);
        found.set(Corner::BottomRight, smudge);
        let right_angles: Vec<Corner> = Corner::ALL
            .into_iter()
            .filter(|&c| corner_cosine(&found, c).is_some_and(|cos| cos < 0.06))
            .collect();
        assert_eq!(right_angles, vec![Corner::TopLeft]);

        let mut overlays = Vec::new();
        let det = detect_four_squares(&m, SIZE, &CalibrationConfig::default(), &mut overlays)
            .expect("smudge replaced");
        assert_eq!(det.corners.br, BR);
        assert_eq!(det.reconstructed, vec![Corner::BottomRight]);
    }

    #[test]
    fn alignment_warning_reports_skewed_pairs() {
        let corners = CornerPositions {
            tl: TL,
            tr: Pixel::new(70, 780),
            bl: BL,
            br: BR,
        };
        let warnings = alignment_warnings(&corners, 4.0, 4.0, 4.0);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("TL and TR"));
    }
}
