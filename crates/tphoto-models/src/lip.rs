//! Normalized lip regions.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// A normalized rectangle (0.0 to 1.0) locating the mouth on a poster.
///
/// Every field is validated into `[0, 1]` on construction, including when
/// deserialized from backend JSON or a cache sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLipCoordinates")]
pub struct LipCoordinates {
    /// X coordinate of the top-left corner (0.0 = left, 1.0 = right)
    #[serde(rename = "lipX")]
    pub x: f64,
    /// Y coordinate of the top-left corner (0.0 = top, 1.0 = bottom)
    #[serde(rename = "lipY")]
    pub y: f64,
    /// Width relative to the poster width
    #[serde(rename = "lipWidth")]
    pub width: f64,
    /// Height relative to the poster height
    #[serde(rename = "lipHeight")]
    pub height: f64,
}

#[derive(Deserialize)]
struct RawLipCoordinates {
    #[serde(rename = "lipX")]
    x: f64,
    #[serde(rename = "lipY")]
    y: f64,
    #[serde(rename = "lipWidth")]
    width: f64,
    #[serde(rename = "lipHeight")]
    height: f64,
}

impl TryFrom<RawLipCoordinates> for LipCoordinates {
    type Error = ModelError;

    fn try_from(raw: RawLipCoordinates) -> Result<Self, Self::Error> {
        LipCoordinates::new(raw.x, raw.y, raw.width, raw.height)
    }
}

fn check_unit(field: &'static str, value: f64) -> ModelResult<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ModelError::CoordinateOutOfRange { field, value })
    }
}

impl LipCoordinates {
    /// Create a validated lip rectangle.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> ModelResult<Self> {
        Ok(Self {
            x: check_unit("lipX", x)?,
            y: check_unit("lipY", y)?,
            width: check_unit("lipWidth", width)?,
            height: check_unit("lipHeight", height)?,
        })
    }

    /// Right edge in normalized space.
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge in normalized space.
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Whether the normalized point lies inside the rectangle.
    pub fn contains(&self, nx: f64, ny: f64) -> bool {
        nx >= self.x && nx <= self.right() && ny >= self.y && ny <= self.bottom()
    }

    /// Signed distance from a normalized point to the nearest edge.
    ///
    /// Positive inside the rectangle, negative outside.
    pub fn signed_edge_distance(&self, nx: f64, ny: f64) -> f64 {
        let dx = (nx - self.x).min(self.right() - nx);
        let dy = (ny - self.y).min(self.bottom() - ny);
        if dx >= 0.0 && dy >= 0.0 {
            dx.min(dy)
        } else {
            // Outside: Euclidean distance to the rectangle, negated.
            let ox = dx.min(0.0);
            let oy = dy.min(0.0);
            -(ox * ox + oy * oy).sqrt()
        }
    }

    /// Project into pixel space for a poster of the given size.
    pub fn to_pixels(&self, poster_width: f64, poster_height: f64) -> ModelResult<PixelRect> {
        validate_dimensions(poster_width, poster_height)?;
        Ok(PixelRect {
            x: self.x * poster_width,
            y: self.y * poster_height,
            width: self.width * poster_width,
            height: self.height * poster_height,
        })
    }
}

/// A lip rectangle expressed in poster pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    /// Convert back to normalized coordinates for a poster of the given size.
    pub fn to_normalized(&self, poster_width: f64, poster_height: f64) -> ModelResult<LipCoordinates> {
        validate_dimensions(poster_width, poster_height)?;
        LipCoordinates::new(
            self.x / poster_width,
            self.y / poster_height,
            self.width / poster_width,
            self.height / poster_height,
        )
    }

    /// Integer pixel bounds `(x0, y0, x1, y1)` clamped to the image, end-exclusive.
    pub fn clamped_bounds(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let clamp = |v: f64, max: u32| -> u32 { v.max(0.0).min(max as f64) as u32 };
        let x0 = clamp(self.x.floor(), image_width);
        let y0 = clamp(self.y.floor(), image_height);
        let x1 = clamp((self.x + self.width).ceil(), image_width);
        let y1 = clamp((self.y + self.height).ceil(), image_height);
        (x0, y0, x1, y1)
    }
}

fn validate_dimensions(width: f64, height: f64) -> ModelResult<()> {
    if width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0 {
        Ok(())
    } else {
        Err(ModelError::InvalidDimensions { width, height })
    }
}
