//! Batch scan pipeline.
//!
//! Glue between the detection stages and the store:
//! extraction (render -> calibrate -> identify -> persist) ->
//! analysis (per-document checkbox batch + student grid) -> load.
//!
//! Extraction and analysis run on a rayon pool sized by
//! [`PipelineConfig::workers`](crate::config::PipelineConfig); workers share
//! nothing but the read-only inputs and each writes only the store entries of
//! its own pictures.

mod result;
mod run;
mod source;

pub use result::{PictureAnalysis, PictureRejected, ScanSummary, SkippedPicture};
pub use run::{analyze_picture, scan};
pub use source::{collect_inputs, ImageFileSource, PageSource};
