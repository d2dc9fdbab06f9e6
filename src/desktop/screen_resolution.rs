use std::fmt;
use std::str::FromStr;

use crate::common::WebdeskError;

/// The `ScreenResolution` struct represents the geometry of the virtual display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScreenResolution {
    width: u32,
    height: u32
}

impl ScreenResolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl FromStr for ScreenResolution {
    type Err = WebdeskError;

    /// Parses a geometry in the format "widthxheight".
    fn from_str(geometry: &str) -> Result<Self, Self::Err> {
        let invalid = || WebdeskError::SystemError(format!("Invalid display geometry \"{}\", expected WIDTHxHEIGHT", geometry));

        let (width, height) = geometry.trim().split_once(|c: char| c == 'x' || c == 'X').ok_or_else(invalid)?;
        let width: u32 = width.parse().map_err(|_| invalid())?;
        let height: u32 = height.parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }

        Ok(Self::new(width, height))
    }
}

impl fmt::Display for ScreenResolution {
    /// Formats the `ScreenResolution` as a string in the format "widthxheight".
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}x{}", self.width, self.height)
    }
}
