//! Document identifier: decodes the identification band.
//!
//! The band is a row of `cells` squares right after the anchor. A dark
//! square is a 1 bit; bit 0 is the leftmost cell. The low `page_bits` bits
//! hold the page number, the rest the document id. The code carries no
//! checksum, so a misread cell yields a wrong but plausible identification.

use crate::calibration::square::test_square_color;
use crate::calibration::CalibrationRecord;
use crate::debug_dump::{Overlay, OverlayColor};
use crate::geometry::Pixel;
use crate::matrix::IntensityMatrix;
use crate::{DocumentId, PageNum};

/// Decoded `(document id, page)` of a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Identification {
    pub document_id: DocumentId,
    pub page: PageNum,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IdentifyConfig {
    /// Number of code cells after the anchor.
    /// Default: [`IdentifyConfig::DEFAULT_CELLS`].
    pub cells: usize,
    /// Low bits holding the page number.
    /// Default: [`IdentifyConfig::DEFAULT_PAGE_BITS`].
    pub page_bits: u32,
    /// Share of dark pixels that makes a cell a 1 bit.
    pub proportion: f32,
    /// Gray level under which a pixel is dark.
    pub gray_level: f32,
}

impl IdentifyConfig {
    pub const DEFAULT_CELLS: usize = 24;
    pub const DEFAULT_PAGE_BITS: u32 = 8;
    pub const DEFAULT_PROPORTION: f32 = 0.5;
    pub const DEFAULT_GRAY_LEVEL: f32 = 0.5;
    /// The band is decoded into a `u64`.
    pub const MAX_CELLS: usize = 64;

    /// Check that the band fits the decoded value and both id types.
    pub fn validate(&self) -> Result<(), String> {
        if self.cells == 0 || self.cells > Self::MAX_CELLS {
            return Err(format!("identify.cells must be in 1..={}, got {}", Self::MAX_CELLS, self.cells));
        }
        let page_bits = self.page_bits as usize;
        if page_bits > self.cells || page_bits > PageNum::BITS as usize {
            return Err(format!(
                "identify.page_bits must not exceed cells ({}) nor {}, got {}",
                self.cells,
                PageNum::BITS,
                self.page_bits
            ));
        }
        if self.cells - page_bits > DocumentId::BITS as usize {
            return Err(format!(
                "identify: {} document id bits do not fit a {}-bit id",
                self.cells - page_bits,
                DocumentId::BITS
            ));
        }
        Ok(())
    }
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            cells: Self::DEFAULT_CELLS,
            page_bits: Self::DEFAULT_PAGE_BITS,
            proportion: Self::DEFAULT_PROPORTION,
            gray_level: Self::DEFAULT_GRAY_LEVEL,
        }
    }
}

/// Top-left pixel of each code cell.
fn code_cells(record: &CalibrationRecord, cells: usize) -> impl Iterator<Item = Pixel> + '_ {
    let Pixel { row, col } = record.id_band;
    (0..cells).map(move |k| {
        let offset = (k as f64 + 1.0) * record.square_size;
        Pixel::new(row, (f64::from(col) + offset).round() as i32)
    })
}

/// Read the identification band of a calibrated picture.
pub fn read_doc_id_and_page(
    m: &IntensityMatrix,
    record: &CalibrationRecord,
    config: &IdentifyConfig,
) -> Identification {
    let size = record.square_size_px();
    let mut value: u64 = 0;
    let cells = config.cells.min(IdentifyConfig::MAX_CELLS);
    for (k, cell) in code_cells(record, cells).enumerate() {
        if test_square_color(m, cell, size, config.proportion, config.gray_level, 0) {
            value |= 1 << k;
        }
    }
    let page_mask = 1u64.checked_shl(config.page_bits).map_or(u64::MAX, |bit| bit - 1);
    let id = Identification {
        document_id: value.checked_shr(config.page_bits).unwrap_or(0) as DocumentId,
        page: (value & page_mask) as PageNum,
    };
    tracing::trace!(value, document_id = id.document_id, page = id.page, "identification band decoded");
    id
}

/// Code cells as overlays; dark cells in blue, light ones in pink.
pub fn identification_overlays(
    m: &IntensityMatrix,
    record: &CalibrationRecord,
    config: &IdentifyConfig,
) -> Vec<Overlay> {
    let size = record.square_size_px();
    code_cells(record, config.cells)
        .map(|cell| {
            let dark = test_square_color(m, cell, size, config.proportion, config.gray_level, 0);
            let color = if dark { OverlayColor::Blue } else { OverlayColor::Pink };
            Overlay::square(cell, size, color)
        })
        .collect()
}
