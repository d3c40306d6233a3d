use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GenError, Result};

/// Backends reject sizes that are not multiples of this.
pub const DIMENSION_STEP: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    width: u32,
    height: u32,
}

impl AspectRatio {
    pub const SQUARE: AspectRatio = AspectRatio {
        width: 1,
        height: 1,
    };

    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GenError::ValidationError(format!(
                "Aspect ratio parts must be positive, got {}/{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::SQUARE
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.width, self.height)
    }
}

/// Accepts `16/9` as well as `16:9`.
impl FromStr for AspectRatio {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || GenError::ValidationError(format!("Invalid aspect ratio: '{}'", s));

        let (w, h) = s.trim().split_once(['/', ':']).ok_or_else(invalid)?;
        let width = w.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = h.trim().parse::<u32>().map_err(|_| invalid())?;

        Self::new(width, height)
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = GenError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(ratio: AspectRatio) -> Self {
        ratio.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Scales the ratio so the area is close to `base_size²`, then floors each
/// side to a multiple of [`DIMENSION_STEP`]. Sides never drop below one step.
pub fn compute_dimensions(aspect_ratio: AspectRatio, base_size: u32) -> Dimensions {
    let w = f64::from(aspect_ratio.width);
    let h = f64::from(aspect_ratio.height);
    let scale = f64::from(base_size) / (w * h).sqrt();

    Dimensions {
        width: quantize((w * scale).round()),
        height: quantize((h * scale).round()),
    }
}

fn quantize(side: f64) -> u32 {
    let floored = (side as u32 / DIMENSION_STEP) * DIMENSION_STEP;
    floored.max(DIMENSION_STEP)
}
