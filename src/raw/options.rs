//! RAW conversion settings.
//!
//! Every value that reaches the converter's argument vector is an enumerated
//! or range-checked number, never a caller string.

use crate::error::{Result, TranscodeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Output color space of the converted PNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    #[default]
    #[serde(rename = "sRGB", alias = "srgb")]
    Srgb,
    #[serde(rename = "AdobeRGB", alias = "adobergb")]
    AdobeRgb,
    #[serde(rename = "ProPhoto", alias = "prophoto")]
    ProPhoto,
}

impl ColorSpace {
    /// darktable's export colorspace id.
    pub fn code(self) -> &'static str {
        match self {
            Self::Srgb => "2",
            Self::AdobeRgb => "1",
            Self::ProPhoto => "3",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Srgb => "sRGB",
            Self::AdobeRgb => "AdobeRGB",
            Self::ProPhoto => "ProPhoto",
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorSpace {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "srgb" => Ok(Self::Srgb),
            "adobergb" => Ok(Self::AdobeRgb),
            "prophoto" => Ok(Self::ProPhoto),
            _ => Err(TranscodeError::validation(
                "colorspace",
                s,
                "must be sRGB, AdobeRGB, or ProPhoto",
            )),
        }
    }
}

/// White balance mode passed through to the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhiteBalance {
    #[default]
    Camera,
    Auto,
    Manual,
}

impl WhiteBalance {
    pub fn token(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for WhiteBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for WhiteBalance {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "camera" => Ok(Self::Camera),
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            _ => Err(TranscodeError::validation(
                "whitebalance",
                s,
                "must be camera, auto, or manual",
            )),
        }
    }
}

/// Settings for one RAW → PNG conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConversionOptions {
    /// PNG bit depth: 8 or 16.
    pub bitness: u32,
    /// PNG compression level, 0-9.
    pub compression: u32,
    pub color_space: ColorSpace,
    pub white_balance: WhiteBalance,
    /// Carried for callers; the converter is not told about these.
    pub exposure: f64,
    pub contrast: f64,
    pub saturation: f64,
    /// Overrides the policy's temp directory for this conversion.
    pub temp_dir: Option<PathBuf>,
    /// Leave the converter's output file behind after reading it.
    pub keep_temp: bool,
}

impl Default for RawConversionOptions {
    fn default() -> Self {
        Self {
            bitness: 16,
            compression: 6,
            color_space: ColorSpace::default(),
            white_balance: WhiteBalance::default(),
            exposure: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            temp_dir: None,
            keep_temp: false,
        }
    }
}

impl RawConversionOptions {
    pub fn validate(&self) -> Result<()> {
        if self.bitness != 8 && self.bitness != 16 {
            return Err(TranscodeError::validation(
                "bitness",
                self.bitness,
                "must be 8 or 16",
            ));
        }
        if self.compression > 9 {
            return Err(TranscodeError::validation(
                "compression",
                self.compression,
                "must be between 0 and 9",
            ));
        }
        for (field, value) in [
            ("exposure", self.exposure),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
        ] {
            if !value.is_finite() {
                return Err(TranscodeError::validation(field, value, "must be finite"));
            }
        }
        Ok(())
    }

    /// True when any tone adjustment is set.
    pub fn has_adjustments(&self) -> bool {
        self.exposure != 0.0 || self.contrast != 0.0 || self.saturation != 0.0
    }
}
