use crate::calibration::square::{eval_square_color, test_square_color};
use crate::geometry::Pixel;
use crate::matrix::IntensityMatrix;

use super::{CheckboxConfig, CheckboxStatus, DarkTest};

/// Per-box measurements feeding the batch classifier.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CheckboxMetrics {
    /// Darkness inside the wide margin.
    pub blackness: f32,
    /// Darkness inside the core margin.
    pub core_blackness: f32,
    /// Passed one of the marked tests.
    pub marked: bool,
    /// Passed the confident test.
    pub confident: bool,
    /// Passed the faint test.
    pub faint: bool,
}

/// Measure the checkbox whose top-left pixel is `at`.
pub fn measure(m: &IntensityMatrix, at: Pixel, size: usize, config: &CheckboxConfig) -> CheckboxMetrics {
    let passes = |t: &DarkTest| test_square_color(m, at, size, t.proportion, t.gray_level, config.test_margin);
    CheckboxMetrics {
        blackness: eval_square_color(m, at, size, config.blackness_margin),
        core_blackness: eval_square_color(m, at, size, config.core_margin),
        marked: config.marked_tests.iter().any(passes),
        confident: passes(&config.confident_test),
        faint: passes(&config.faint_test),
    }
}

/// Adaptive thresholds derived from one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchThresholds {
    pub floor: f32,
    pub upper_floor: f32,
    pub core_floor: f32,
    pub upper_core_floor: f32,
    pub ceil: f32,
    pub core_ceil: f32,
}

impl BatchThresholds {
    pub fn from_metrics(batch: &[CheckboxMetrics], config: &CheckboxConfig) -> Self {
        let max = batch.iter().map(|b| b.blackness).fold(0.0, f32::max);
        let core_max = batch.iter().map(|b| b.core_blackness).fold(0.0, f32::max);
        let n = batch.len().max(1) as f32;
        let mean = batch.iter().map(|b| b.blackness).sum::<f32>() / n;
        let core_mean = batch.iter().map(|b| b.core_blackness).sum::<f32>() / n;
        let floor = |top: f32, offset: f32| (config.floor_ratio * top).max(top - offset);
        Self {
            floor: floor(max, config.floor_offset),
            upper_floor: floor(max, config.upper_floor_offset),
            core_floor: floor(core_max, config.floor_offset),
            upper_core_floor: floor(core_max, config.upper_floor_offset),
            ceil: config.ceil_factor * mean + config.ceil_bias,
            core_ceil: config.core_ceil_factor * core_mean + config.core_ceil_bias,
        }
    }
}

fn first_pass(b: &CheckboxMetrics, t: &BatchThresholds) -> CheckboxStatus {
    if b.marked {
        if b.confident {
            CheckboxStatus::Checked
        } else {
            CheckboxStatus::ProbablyChecked
        }
    } else if b.faint && b.blackness > t.upper_floor {
        CheckboxStatus::ProbablyUnchecked
    } else {
        CheckboxStatus::Unchecked
    }
}

/// Classify every checkbox of one document together.
///
/// The first pass looks at each box alone. The second compares each box with
/// the batch: a box notably darker than the average is promoted to probably
/// checked, and a checked box much lighter than the darkest one is demoted.
/// A respondent's marking style is assumed consistent within a document.
pub fn classify_batch(batch: &[CheckboxMetrics], config: &CheckboxConfig) -> Vec<CheckboxStatus> {
    let t = BatchThresholds::from_metrics(batch, config);
    batch
        .iter()
        .map(|b| {
            let mut status = first_pass(b, &t);
            if !status.seems_checked() && (b.blackness > t.ceil || b.core_blackness > t.core_ceil) {
                tracing::debug!(blackness = b.blackness, ceil = t.ceil, "probable false negative");
                status = CheckboxStatus::ProbablyChecked;
            }
            if status.seems_checked()
                && (b.blackness < t.upper_floor || b.core_blackness < t.upper_core_floor)
            {
                status = if b.blackness < t.floor || b.core_blackness < t.core_floor {
                    tracing::debug!(blackness = b.blackness, floor = t.floor, "probable false positive");
                    CheckboxStatus::ProbablyUnchecked
                } else {
                    CheckboxStatus::ProbablyChecked
                };
            }
            status
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn metrics(blackness: f32, marked: bool) -> CheckboxMetrics {
        CheckboxMetrics {
            blackness,
            core_blackness: blackness,
            marked,
            confident: marked,
            faint: marked,
        }
    }

    fn painted(ink: f32) -> IntensityMatrix {
        let mut m = IntensityMatrix::white(20, 20);
        m.fill_rect(Pixel::new(0, 0), 20, 1, 0.2);
        m.fill_rect(Pixel::new(0, 0), 1, 20, 0.2);
        m.fill_rect(Pixel::new(0, 19), 20, 1, 0.2);
        m.fill_rect(Pixel::new(19, 0), 1, 20, 0.2);
        if ink > 0.0 {
            m.fill_rect(Pixel::new(3, 3), 14, 14, 1.0 - ink);
        }
        m
    }

    fn rank(s: CheckboxStatus) -> u8 {
        match s {
            CheckboxStatus::Unchecked => 0,
            CheckboxStatus::ProbablyUnchecked => 1,
            CheckboxStatus::ProbablyChecked => 2,
            CheckboxStatus::Checked => 3,
        }
    }

    #[test]
    fn two_dark_boxes_among_four() {
        let batch = [
            metrics(0.05, false),
            metrics(0.06, false),
            metrics(0.55, true),
            metrics(0.50, true),
        ];
        let cfg = CheckboxConfig::default();
        let t = BatchThresholds::from_metrics(&batch, &cfg);
        assert_abs_diff_eq!(t.floor, 0.15, epsilon = 1e-6);
        assert_abs_diff_eq!(t.upper_floor, 0.25, epsilon = 1e-6);
        let status = classify_batch(&batch, &cfg);
        assert_eq!(status[0], CheckboxStatus::Unchecked);
        assert_eq!(status[1], CheckboxStatus::Unchecked);
        assert!(status[2].seems_checked());
        assert!(status[3].seems_checked());
    }

    #[test]
    fn dark_unmarked_box_is_promoted() {
        let batch = [
            metrics(0.02, false),
            metrics(0.02, false),
            metrics(0.02, false),
            metrics(0.30, false),
        ];
        let status = classify_batch(&batch, &CheckboxConfig::default());
        assert_eq!(status[3], CheckboxStatus::ProbablyChecked);
        assert_eq!(status[0], CheckboxStatus::Unchecked);
    }

    #[test]
    fn light_checked_box_is_demoted() {
        let batch = [
            metrics(0.90, true),
            metrics(0.88, true),
            metrics(0.55, true),
            metrics(0.30, true),
        ];
        let status = classify_batch(&batch, &CheckboxConfig::default());
        assert_eq!(status[0], CheckboxStatus::Checked);
        assert_eq!(status[2], CheckboxStatus::ProbablyChecked);
        assert_eq!(status[3], CheckboxStatus::ProbablyUnchecked);
    }

    #[test]
    fn measure_ignores_the_printed_border() {
        let cfg = CheckboxConfig::default();
        let empty = measure(&painted(0.0), Pixel::new(0, 0), 20, &cfg);
        assert_abs_diff_eq!(empty.blackness, 0.0);
        assert!(!empty.marked && !empty.faint);
        let full = measure(&painted(0.85), Pixel::new(0, 0), 20, &cfg);
        assert_abs_diff_eq!(full.blackness, 144.0 * 0.85 / 256.0, epsilon = 1e-4);
        assert!(full.marked && full.confident);
    }

    #[test]
    fn darker_box_never_moves_towards_unchecked() {
        let cfg = CheckboxConfig::default();
        let others: Vec<CheckboxMetrics> = [0.0, 0.0, 0.9, 0.85, 0.0]
            .into_iter()
            .map(|ink| measure(&painted(ink), Pixel::new(0, 0), 20, &cfg))
            .collect();
        let mut previous = 0;
        for step in 0..=20 {
            let ink = step as f32 * 0.05;
            let mut batch = others.clone();
            batch.push(measure(&painted(ink), Pixel::new(0, 0), 20, &cfg));
            let status = classify_batch(&batch, &cfg);
            let r = rank(status[5]);
            assert!(r >= previous, "ink {ink}: {:?} after rank {previous}", status[5]);
            previous = r;
        }
        assert_eq!(previous, 3);
    }
}
