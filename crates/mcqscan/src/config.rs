//! Aggregate configuration of a scan run.

use std::path::Path;

use crate::calibration::CalibrationConfig;
use crate::checkbox::CheckboxConfig;
use crate::error::ScanError;
use crate::geometry::SheetGeometry;
use crate::identify::IdentifyConfig;
use crate::student_id::StudentIdConfig;

/// Scheduling of the batch stages.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    /// Worker threads for extraction and analysis. `1` runs sequentially on
    /// the calling thread; `0` lets rayon pick one per core.
    /// Default: [`PipelineConfig::DEFAULT_WORKERS`].
    #[serde(default = "PipelineConfig::default_workers")]
    pub workers: usize,
    /// Write a `<n>.debug.json` dump next to every cached picture.
    #[serde(default)]
    pub write_debug_dumps: bool,
}

impl PipelineConfig {
    pub const DEFAULT_WORKERS: usize = 0;

    fn default_workers() -> usize {
        Self::DEFAULT_WORKERS
    }

    /// Single-threaded configuration.
    pub fn sequential() -> Self {
        Self {
            workers: 1,
            ..Self::default()
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: Self::DEFAULT_WORKERS,
            write_debug_dumps: false,
        }
    }
}

/// Every tunable of the scanner. Missing sections fall back to defaults,
/// so a JSON file only needs the values it changes.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub geometry: SheetGeometry,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub identify: IdentifyConfig,
    #[serde(default)]
    pub checkbox: CheckboxConfig,
    #[serde(default)]
    pub student_id: StudentIdConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl ScanConfig {
    /// Load a config file; values the decoder cannot represent are rejected.
    pub fn from_json_file(path: &Path) -> Result<Self, ScanError> {
        let data = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ScanError::json(path, e))?;
        config.identify.validate().map_err(|message| ScanError::invalid(path, message))?;
        Ok(config)
    }
}
