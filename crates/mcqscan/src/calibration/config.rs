/// Tuning of the corner search, plausibility filters and id-band lookup.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CalibrationConfig {
    /// Fraction of each image dimension searched from a corner.
    /// Default: [`CalibrationConfig::DEFAULT_QUADRANT_FRACTION`].
    pub quadrant_fraction: f64,
    /// A candidate square whose mean intensity exceeds this is rejected.
    /// Default: [`CalibrationConfig::DEFAULT_MAX_WHITENESS`].
    pub max_whiteness: f32,
    /// Detection tolerances tried in order until four squares are accepted.
    ///
    /// Each value interpolates the darkness threshold between the darkest
    /// mesh cell (0) and pure white (1).
    pub tolerances: Vec<f32>,
    /// Upper bound on one-pixel refinement steps per axis.
    /// Default: [`CalibrationConfig::DEFAULT_MAX_REFINE_STEPS`].
    pub max_refine_steps: usize,
    /// `|cos|` below which a corner is considered a right angle.
    /// Default: [`CalibrationConfig::DEFAULT_MAX_ORTHOGONALITY_COS`].
    pub max_orthogonality_cos: f64,
    /// A corner square lighter than this darkness is dropped and rebuilt.
    /// Default: [`CalibrationConfig::DEFAULT_MIN_SQUARE_DARKNESS`].
    pub min_square_darkness: f32,
    /// Facing corners further apart than this (mm) trigger a warning.
    /// Default: [`CalibrationConfig::DEFAULT_MAX_ALIGNMENT_ERROR_MM`].
    #[serde(default = "CalibrationConfig::default_max_alignment_error_mm")]
    pub max_alignment_error_mm: f64,
    /// Rotations smaller than this (degrees) are not applied.
    /// Default: [`CalibrationConfig::DEFAULT_MIN_ROTATION_DEG`].
    #[serde(default = "CalibrationConfig::default_min_rotation_deg")]
    pub min_rotation_deg: f64,
    /// Ratio of light pixels tolerated inside the id-band anchor square.
    /// Default: [`CalibrationConfig::DEFAULT_ID_BAND_ERROR`].
    #[serde(default = "CalibrationConfig::default_id_band_error")]
    pub id_band_error: f32,
    /// Gray level under which a pixel counts as dark in the id-band search.
    /// Default: [`CalibrationConfig::DEFAULT_ID_BAND_GRAY_LEVEL`].
    #[serde(default = "CalibrationConfig::default_id_band_gray_level")]
    pub id_band_gray_level: f32,
}

impl CalibrationConfig {
    pub const DEFAULT_QUADRANT_FRACTION: f64 = 0.25;
    pub const DEFAULT_MAX_WHITENESS: f32 = 0.55;
    pub const DEFAULT_TOLERANCES: [f32; 6] = [0.20, 0.25, 0.30, 0.35, 0.40, 0.45];
    pub const DEFAULT_MAX_REFINE_STEPS: usize = 50;
    pub const DEFAULT_MAX_ORTHOGONALITY_COS: f64 = 0.06;
    pub const DEFAULT_MIN_SQUARE_DARKNESS: f32 = 0.4;
    pub const DEFAULT_MAX_ALIGNMENT_ERROR_MM: f64 = 4.0;
    pub const DEFAULT_MIN_ROTATION_DEG: f64 = 0.01;
    pub const DEFAULT_ID_BAND_ERROR: f32 = 0.3;
    pub const DEFAULT_ID_BAND_GRAY_LEVEL: f32 = 0.5;

    fn default_max_alignment_error_mm() -> f64 {
        Self::DEFAULT_MAX_ALIGNMENT_ERROR_MM
    }

    fn default_min_rotation_deg() -> f64 {
        Self::DEFAULT_MIN_ROTATION_DEG
    }

    fn default_id_band_error() -> f32 {
        Self::DEFAULT_ID_BAND_ERROR
    }

    fn default_id_band_gray_level() -> f32 {
        Self::DEFAULT_ID_BAND_GRAY_LEVEL
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            quadrant_fraction: Self::DEFAULT_QUADRANT_FRACTION,
            max_whiteness: Self::DEFAULT_MAX_WHITENESS,
            tolerances: Self::DEFAULT_TOLERANCES.to_vec(),
            max_refine_steps: Self::DEFAULT_MAX_REFINE_STEPS,
            max_orthogonality_cos: Self::DEFAULT_MAX_ORTHOGONALITY_COS,
            min_square_darkness: Self::DEFAULT_MIN_SQUARE_DARKNESS,
            max_alignment_error_mm: Self::DEFAULT_MAX_ALIGNMENT_ERROR_MM,
            min_rotation_deg: Self::DEFAULT_MIN_ROTATION_DEG,
            id_band_error: Self::DEFAULT_ID_BAND_ERROR,
            id_band_gray_level: Self::DEFAULT_ID_BAND_GRAY_LEVEL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn calibration_config_defaults_are_stable() {
        let cfg = CalibrationConfig::default();
        assert_abs_diff_eq!(cfg.max_whiteness, 0.55);
        assert_eq!(cfg.tolerances.len(), 6);
        assert_abs_diff_eq!(cfg.tolerances[0], 0.20);
        assert_abs_diff_eq!(cfg.max_orthogonality_cos, 0.06);
        assert_abs_diff_eq!(cfg.min_square_darkness, 0.4);
    }

    #[test]
    fn calibration_config_deserialize_missing_optional_fields_uses_defaults() {
        let json = r#"{
            "quadrant_fraction": 0.25,
            "max_whiteness": 0.5,
            "tolerances": [0.3],
            "max_refine_steps": 10,
            "max_orthogonality_cos": 0.05,
            "min_square_darkness": 0.35
        }"#;
        let cfg: CalibrationConfig = serde_json::from_str(json).expect("config json should parse");
        assert_abs_diff_eq!(cfg.max_whiteness, 0.5);
        assert_abs_diff_eq!(cfg.id_band_error, CalibrationConfig::DEFAULT_ID_BAND_ERROR);
        assert_abs_diff_eq!(
            cfg.max_alignment_error_mm,
            CalibrationConfig::DEFAULT_MAX_ALIGNMENT_ERROR_MM
        );
    }
}
