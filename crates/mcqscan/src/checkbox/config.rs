/// `(proportion, gray_level)` pair for a dark-pixel share test.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DarkTest {
    pub proportion: f32,
    pub gray_level: f32,
}

impl DarkTest {
    pub const fn new(proportion: f32, gray_level: f32) -> Self {
        Self {
            proportion,
            gray_level,
        }
    }
}

/// Checkbox analyzer tuning.
///
/// The constants were tuned empirically on real scans; they are kept as
/// defaults rather than derived.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CheckboxConfig {
    /// Border excluded from the blackness metric (pixels).
    pub blackness_margin: usize,
    /// Border excluded from the core blackness metric (pixels).
    pub core_margin: usize,
    /// Border excluded from the dark-share tests (pixels).
    pub test_margin: usize,
    /// A box passing any of these is at least probably checked.
    pub marked_tests: Vec<DarkTest>,
    /// A marked box passing this one is checked.
    pub confident_test: DarkTest,
    /// An unmarked box passing this one, and darker than the upper floor, is
    /// probably unchecked.
    pub faint_test: DarkTest,
    /// `floor = max(floor_ratio * max, max - floor_offset)`.
    #[serde(default = "CheckboxConfig::default_floor_ratio")]
    pub floor_ratio: f32,
    #[serde(default = "CheckboxConfig::default_floor_offset")]
    pub floor_offset: f32,
    #[serde(default = "CheckboxConfig::default_upper_floor_offset")]
    pub upper_floor_offset: f32,
    /// `ceil = ceil_factor * mean + ceil_bias`.
    #[serde(default = "CheckboxConfig::default_ceil_factor")]
    pub ceil_factor: f32,
    #[serde(default = "CheckboxConfig::default_ceil_bias")]
    pub ceil_bias: f32,
    #[serde(default = "CheckboxConfig::default_core_ceil_factor")]
    pub core_ceil_factor: f32,
    #[serde(default = "CheckboxConfig::default_core_ceil_bias")]
    pub core_ceil_bias: f32,
    /// Edge darkness under which a box position is re-aligned.
    #[serde(default = "CheckboxConfig::default_align_level1")]
    pub align_level1: f32,
    /// Edge darkness a re-aligned position must reach.
    #[serde(default = "CheckboxConfig::default_align_level2")]
    pub align_level2: f32,
    /// Largest shift tried by the re-alignment (pixels).
    #[serde(default = "CheckboxConfig::default_align_delta")]
    pub align_delta: i32,
}

impl CheckboxConfig {
    pub const DEFAULT_BLACKNESS_MARGIN: usize = 4;
    pub const DEFAULT_CORE_MARGIN: usize = 7;
    pub const DEFAULT_TEST_MARGIN: usize = 5;
    pub const DEFAULT_MARKED_TESTS: [DarkTest; 3] = [
        DarkTest::new(0.2, 0.65),
        DarkTest::new(0.4, 0.90),
        DarkTest::new(0.6, 0.95),
    ];
    pub const DEFAULT_CONFIDENT_TEST: DarkTest = DarkTest::new(0.4, 0.90);
    pub const DEFAULT_FAINT_TEST: DarkTest = DarkTest::new(0.2, 0.95);
    pub const DEFAULT_FLOOR_RATIO: f32 = 0.2;
    pub const DEFAULT_FLOOR_OFFSET: f32 = 0.4;
    pub const DEFAULT_UPPER_FLOOR_OFFSET: f32 = 0.3;
    pub const DEFAULT_CEIL_FACTOR: f32 = 1.5;
    pub const DEFAULT_CEIL_BIAS: f32 = 0.02;
    pub const DEFAULT_CORE_CEIL_FACTOR: f32 = 1.2;
    pub const DEFAULT_CORE_CEIL_BIAS: f32 = 0.01;
    pub const DEFAULT_ALIGN_LEVEL1: f32 = 0.5;
    pub const DEFAULT_ALIGN_LEVEL2: f32 = 0.6;
    pub const DEFAULT_ALIGN_DELTA: i32 = 5;

    fn default_floor_ratio() -> f32 {
        Self::DEFAULT_FLOOR_RATIO
    }
    fn default_floor_offset() -> f32 {
        Self::DEFAULT_FLOOR_OFFSET
    }
    fn default_upper_floor_offset() -> f32 {
        Self::DEFAULT_UPPER_FLOOR_OFFSET
    }
    fn default_ceil_factor() -> f32 {
        Self::DEFAULT_CEIL_FACTOR
    }
    fn default_ceil_bias() -> f32 {
        Self::DEFAULT_CEIL_BIAS
    }
    fn default_core_ceil_factor() -> f32 {
        Self::DEFAULT_CORE_CEIL_FACTOR
    }
    fn default_core_ceil_bias() -> f32 {
        Self::DEFAULT_CORE_CEIL_BIAS
    }
    fn default_align_level1() -> f32 {
        Self::DEFAULT_ALIGN_LEVEL1
    }
    fn default_align_level2() -> f32 {
        Self::DEFAULT_ALIGN_LEVEL2
    }
    fn default_align_delta() -> i32 {
        Self::DEFAULT_ALIGN_DELTA
    }
}

impl Default for CheckboxConfig {
    fn default() -> Self {
        Self {
            blackness_margin: Self::DEFAULT_BLACKNESS_MARGIN,
            core_margin: Self::DEFAULT_CORE_MARGIN,
            test_margin: Self::DEFAULT_TEST_MARGIN,
            marked_tests: Self::DEFAULT_MARKED_TESTS.to_vec(),
            confident_test: Self::DEFAULT_CONFIDENT_TEST,
            faint_test: Self::DEFAULT_FAINT_TEST,
            floor_ratio: Self::DEFAULT_FLOOR_RATIO,
            floor_offset: Self::DEFAULT_FLOOR_OFFSET,
            upper_floor_offset: Self::DEFAULT_UPPER_FLOOR_OFFSET,
            ceil_factor: Self::DEFAULT_CEIL_FACTOR,
            ceil_bias: Self::DEFAULT_CEIL_BIAS,
            core_ceil_factor: Self::DEFAULT_CORE_CEIL_FACTOR,
            core_ceil_bias: Self::DEFAULT_CORE_CEIL_BIAS,
            align_level1: Self::DEFAULT_ALIGN_LEVEL1,
            align_level2: Self::DEFAULT_ALIGN_LEVEL2,
            align_delta: Self::DEFAULT_ALIGN_DELTA,
        }
    }
}
