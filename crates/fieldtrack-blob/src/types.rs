use fieldtrack_core::Hsv;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Inclusive HSV box in the 8-bit convention (`h` in `[0, 180)`).
///
/// `h_min > h_max` selects the wrapped hue interval `[h_min, 180) ∪ [0, h_max]`,
/// which is how reds are usually expressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub h_min: u8,
    pub h_max: u8,
    pub s_min: u8,
    pub s_max: u8,
    pub v_min: u8,
    pub v_max: u8,
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self {
            h_min: lower[0],
            h_max: upper[0],
            s_min: lower[1],
            s_max: upper[1],
            v_min: lower[2],
            v_max: upper[2],
        }
    }

    /// Saturated orange of a ping-pong ball.
    pub const ORANGE: HsvRange = HsvRange::new([0, 100, 100], [25, 255, 255]);
    /// Blue band used to reject blue objects.
    pub const BLUE: HsvRange = HsvRange::new([90, 50, 50], [130, 255, 255]);

    #[inline]
    pub fn contains(&self, p: Hsv) -> bool {
        let hue_ok = if self.h_min <= self.h_max {
            (self.h_min..=self.h_max).contains(&p.h)
        } else {
            p.h >= self.h_min || p.h <= self.h_max
        };
        hue_ok
            && (self.s_min..=self.s_max).contains(&p.s)
            && (self.v_min..=self.v_max).contains(&p.v)
    }

    /// Saturation and value bounds are ordered.
    pub fn is_ordered(&self) -> bool {
        self.s_min <= self.s_max && self.v_min <= self.v_max
    }
}

/// Blob locator configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobParams {
    pub include: HsvRange,
    pub exclude: Option<HsvRange>,
    /// Enclosing-circle radius bounds in pixels, inclusive.
    pub min_radius: f32,
    pub max_radius: f32,
    /// `4π·area / perimeter²`; 1.0 for a perfect circle.
    pub min_circularity: f32,
    /// Contour area floor in square pixels.
    pub min_area: f32,
    /// Side of the square structuring element.
    pub kernel_size: usize,
    /// Erode iterations followed by the same number of dilate iterations.
    pub morph_iterations: usize,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            include: HsvRange::ORANGE,
            exclude: None,
            min_radius: 5.0,
            max_radius: 50.0,
            min_circularity: 0.6,
            min_area: 20.0,
            kernel_size: 5,
            morph_iterations: 1,
        }
    }
}

/// Coarse hue name of a tracked object.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColorName {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
}

impl ColorName {
    pub fn from_hue(h: u8) -> Self {
        match h {
            0..=10 => ColorName::Red,
            11..=24 => ColorName::Orange,
            25..=34 => ColorName::Yellow,
            35..=84 => ColorName::Green,
            85..=129 => ColorName::Blue,
            130..=169 => ColorName::Purple,
            _ => ColorName::Red,
        }
    }
}

/// A scored blob that passed every gate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlobCandidate {
    /// Centroid from the blob's pixel moments.
    pub centroid: Point2<f32>,
    /// Contour (polygon) area in square pixels.
    pub area: f32,
    pub perimeter: f32,
    pub circle_center: Point2<f32>,
    pub radius: f32,
    pub circularity: f32,
    /// Hue name at the centroid pixel.
    pub color: ColorName,
}
