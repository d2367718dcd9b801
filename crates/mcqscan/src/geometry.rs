//! Sheet geometry: pixel positions, corner labels and printed dimensions.

/// Pixel position as `(row, col)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Pixel {
    pub row: i32,
    pub col: i32,
}

impl Pixel {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    pub(crate) fn as_vector(self) -> nalgebra::Vector2<f64> {
        nalgebra::Vector2::new(self.row as f64, self.col as f64)
    }

    pub(crate) fn from_vector(v: nalgebra::Vector2<f64>) -> Self {
        Self::new(v.x.round() as i32, v.y.round() as i32)
    }
}

impl std::fmt::Display for Pixel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// One of the four sheet corners carrying a calibration square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Corner {
    #[serde(rename = "TL")]
    TopLeft,
    #[serde(rename = "TR")]
    TopRight,
    #[serde(rename = "BL")]
    BottomLeft,
    #[serde(rename = "BR")]
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Self::TopLeft => "TL",
            Self::TopRight => "TR",
            Self::BottomLeft => "BL",
            Self::BottomRight => "BR",
        }
    }

    pub const fn is_bottom(self) -> bool {
        matches!(self, Self::BottomLeft | Self::BottomRight)
    }

    pub const fn is_right(self) -> bool {
        matches!(self, Self::TopRight | Self::BottomRight)
    }

    /// Diagonally opposite corner.
    pub const fn opposite(self) -> Self {
        match self {
            Self::TopLeft => Self::BottomRight,
            Self::TopRight => Self::BottomLeft,
            Self::BottomLeft => Self::TopRight,
            Self::BottomRight => Self::TopLeft,
        }
    }

    /// Other corner on the same horizontal edge.
    pub const fn same_row(self) -> Self {
        match self {
            Self::TopLeft => Self::TopRight,
            Self::TopRight => Self::TopLeft,
            Self::BottomLeft => Self::BottomRight,
            Self::BottomRight => Self::BottomLeft,
        }
    }

    /// Other corner on the same vertical edge.
    pub const fn same_column(self) -> Self {
        match self {
            Self::TopLeft => Self::BottomLeft,
            Self::TopRight => Self::BottomRight,
            Self::BottomLeft => Self::TopLeft,
            Self::BottomRight => Self::TopRight,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::TopLeft => 0,
            Self::TopRight => 1,
            Self::BottomLeft => 2,
            Self::BottomRight => 3,
        }
    }
}

impl std::fmt::Display for Corner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Corner positions found so far (any subset of the four).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialCorners {
    slots: [Option<Pixel>; 4],
}

impl PartialCorners {
    pub fn get(&self, corner: Corner) -> Option<Pixel> {
        self.slots[corner.index()]
    }

    pub fn set(&mut self, corner: Corner, position: Pixel) {
        self.slots[corner.index()] = Some(position);
    }

    pub fn remove(&mut self, corner: Corner) -> Option<Pixel> {
        self.slots[corner.index()].take()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Corner, Pixel)> + '_ {
        Corner::ALL
            .into_iter()
            .filter_map(|c| self.get(c).map(|p| (c, p)))
    }

    pub fn complete(&self) -> Option<CornerPositions> {
        Some(CornerPositions {
            tl: self.get(Corner::TopLeft)?,
            tr: self.get(Corner::TopRight)?,
            bl: self.get(Corner::BottomLeft)?,
            br: self.get(Corner::BottomRight)?,
        })
    }
}

/// Top-left pixel of each of the four calibration squares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CornerPositions {
    pub tl: Pixel,
    pub tr: Pixel,
    pub bl: Pixel,
    pub br: Pixel,
}

impl CornerPositions {
    pub fn get(&self, corner: Corner) -> Pixel {
        match corner {
            Corner::TopLeft => self.tl,
            Corner::TopRight => self.tr,
            Corner::BottomLeft => self.bl,
            Corner::BottomRight => self.br,
        }
    }

    /// Relabel every corner with its opposite (sheet turned upside-down).
    pub fn flipped(&self) -> Self {
        Self {
            tl: self.br,
            tr: self.bl,
            bl: self.tr,
            br: self.tl,
        }
    }

    pub fn map(&self, f: impl Fn(Pixel) -> Pixel) -> Self {
        Self {
            tl: f(self.tl),
            tr: f(self.tr),
            bl: f(self.bl),
            br: f(self.br),
        }
    }

    /// Averaged bounding box `(top_left, bottom_right)` defined by the corners.
    pub fn area(&self) -> (Pixel, Pixel) {
        let avg = |a: i32, b: i32| ((a + b) as f64 / 2.0).round() as i32;
        (
            Pixel::new(avg(self.tl.row, self.tr.row), avg(self.tl.col, self.bl.col)),
            Pixel::new(avg(self.bl.row, self.br.row), avg(self.tr.col, self.br.col)),
        )
    }
}

/// Printed dimensions of the answer sheet, in millimeters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SheetGeometry {
    /// Paper width. Default: [`SheetGeometry::DEFAULT_PAPER_WIDTH_MM`] (A4).
    pub paper_width_mm: f64,
    /// Paper height. Default: [`SheetGeometry::DEFAULT_PAPER_HEIGHT_MM`] (A4).
    pub paper_height_mm: f64,
    /// Distance from the paper edges to each calibration square.
    pub calibration_square_position_mm: f64,
    /// Side of a calibration square.
    pub calibration_square_size_mm: f64,
    /// Side of an identification-band square.
    #[serde(default = "SheetGeometry::default_square_size_mm")]
    pub square_size_mm: f64,
    /// Side of a checkbox (and of a student-id grid cell).
    #[serde(default = "SheetGeometry::default_cell_size_mm")]
    pub cell_size_mm: f64,
}

impl SheetGeometry {
    pub const DEFAULT_PAPER_WIDTH_MM: f64 = 210.0;
    pub const DEFAULT_PAPER_HEIGHT_MM: f64 = 297.0;
    pub const DEFAULT_CALIBRATION_SQUARE_POSITION_MM: f64 = 10.0;
    pub const DEFAULT_CALIBRATION_SQUARE_SIZE_MM: f64 = 5.0;
    pub const DEFAULT_SQUARE_SIZE_MM: f64 = 2.5;
    pub const DEFAULT_CELL_SIZE_MM: f64 = 5.0;

    fn default_square_size_mm() -> f64 {
        Self::DEFAULT_SQUARE_SIZE_MM
    }

    fn default_cell_size_mm() -> f64 {
        Self::DEFAULT_CELL_SIZE_MM
    }

    /// Distance between the top-left pixels of two facing calibration squares
    /// is the paper dimension minus this shift.
    pub fn calibration_shift_mm(&self) -> f64 {
        2.0 * self.calibration_square_position_mm + self.calibration_square_size_mm
    }

    /// Horizontal distance between left and right calibration squares.
    pub fn horizontal_span_mm(&self) -> f64 {
        self.paper_width_mm - self.calibration_shift_mm()
    }

    /// Vertical distance between top and bottom calibration squares.
    pub fn vertical_span_mm(&self) -> f64 {
        self.paper_height_mm - self.calibration_shift_mm()
    }

    /// Physical coordinates (from the bottom-left paper corner) of the
    /// top-left calibration square's top-left pixel.
    pub fn origin_mm(&self) -> [f64; 2] {
        [
            self.calibration_square_position_mm,
            self.paper_height_mm - self.calibration_square_position_mm,
        ]
    }
}

impl Default for SheetGeometry {
    fn default() -> Self {
        Self {
            paper_width_mm: Self::DEFAULT_PAPER_WIDTH_MM,
            paper_height_mm: Self::DEFAULT_PAPER_HEIGHT_MM,
            calibration_square_position_mm: Self::DEFAULT_CALIBRATION_SQUARE_POSITION_MM,
            calibration_square_size_mm: Self::DEFAULT_CALIBRATION_SQUARE_SIZE_MM,
            square_size_mm: Self::DEFAULT_SQUARE_SIZE_MM,
            cell_size_mm: Self::DEFAULT_CELL_SIZE_MM,
        }
    }
}
