//! Typed calibration failures.
//!
//! Every failure carries a stable reason code, a structured context and the
//! overlay shapes collected up to the failure point, so a skipped picture can
//! be inspected later without re-running the engine.

use crate::debug_dump::Overlay;
use crate::geometry::{Corner, Pixel};

/// Stable reject code for a calibration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationRejectReason {
    /// A corner square candidate was too light to be a printed mark.
    SquareMissing,
    /// Too few usable corner squares to calibrate.
    CalibrationSquaresNotFound,
    /// The identification band could not be located, even upside-down.
    IdBandNotFound,
}

impl CalibrationRejectReason {
    pub const fn code(self) -> &'static str {
        match self {
            Self::SquareMissing => "square_missing",
            Self::CalibrationSquaresNotFound => "calibration_squares_not_found",
            Self::IdBandNotFound => "id_band_not_found",
        }
    }
}

impl std::fmt::Display for CalibrationRejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Structured reject context for calibration diagnostics.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationRejectContext {
    SquareMissing {
        corner: Corner,
        candidate: Pixel,
        whiteness: f32,
        max_whiteness: f32,
    },
    TooFewCorners {
        found: Vec<Corner>,
        tolerance: f32,
    },
    InconsistentCorners {
        orthogonal_corners: usize,
        tolerance: f32,
    },
    IdBandNotFound {
        search_top_left: Pixel,
        search_bottom_right: Pixel,
        retried_upside_down: bool,
    },
}

#[derive(Debug, Clone)]
pub struct CalibrationError {
    pub reason: CalibrationRejectReason,
    pub context: CalibrationRejectContext,
    pub overlays: Vec<Overlay>,
}

impl CalibrationError {
    pub(crate) fn new(
        reason: CalibrationRejectReason,
        context: CalibrationRejectContext,
        overlays: Vec<Overlay>,
    ) -> Self {
        Self {
            reason,
            context,
            overlays,
        }
    }
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.context {
            CalibrationRejectContext::SquareMissing {
                corner, whiteness, ..
            } => write!(
                f,
                "{}: {} corner square not dark enough (whiteness {:.3})",
                self.reason, corner, whiteness
            ),
            CalibrationRejectContext::TooFewCorners { found, .. } => write!(
                f,
                "{}: only {} corner square(s) found",
                self.reason,
                found.len()
            ),
            CalibrationRejectContext::InconsistentCorners {
                orthogonal_corners, ..
            } => write!(
                f,
                "{}: corner squares are inconsistent ({} orthogonal corner(s))",
                self.reason, orthogonal_corners
            ),
            CalibrationRejectContext::IdBandNotFound { .. } => {
                write!(f, "{}: identification band not found", self.reason)
            }
        }
    }
}

impl std::error::Error for CalibrationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_reason_serialization_is_stable() {
        let reason = CalibrationRejectReason::IdBandNotFound;
        assert_eq!(reason.to_string(), "id_band_not_found");
        let json = serde_json::to_string(&reason).expect("serialize reject reason");
        assert_eq!(json, "\"id_band_not_found\"");
    }

    #[test]
    fn reject_context_is_tagged_by_kind() {
        let ctx = CalibrationRejectContext::TooFewCorners {
            found: vec![Corner::TopLeft, Corner::BottomRight],
            tolerance: 0.45,
        };
        let json = serde_json::to_value(&ctx).expect("serialize context");
        assert_eq!(json["kind"], "too_few_corners");
        assert_eq!(json["found"][1], "BR");
    }
}
