//! Parameter types for encoding.
//!
//! - [`Quality`]: lossy encoding quality (1–100, default 85).
//! - [`OutputFormat`]: the two supported encodings, lossy (JPEG) and lossless (PNG).
//! - [`EncodingConstraints`]: byte budget, optional dimension caps, quality and format.

use crate::error::{Result, TranscodeError};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default byte budget (7 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 7 * 1024 * 1024;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    /// Clamp into range.
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    /// Reject values outside 1-100.
    pub fn try_new(value: u32) -> Result<Self> {
        if (1..=100).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TranscodeError::validation(
                "quality",
                value,
                "must be between 1 and 100",
            ))
        }
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Output encoding. Quality applies to [`OutputFormat::Lossy`] only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JPEG.
    #[serde(alias = "jpeg", alias = "jpg")]
    Lossy,
    /// PNG.
    #[default]
    #[serde(alias = "png")]
    Lossless,
}

impl OutputFormat {
    /// Canonical file extension, with leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Lossy => ".jpg",
            Self::Lossless => ".png",
        }
    }

    /// Every extension a file of this format may already carry.
    pub fn accepted_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Lossy => &[".jpg", ".jpeg"],
            Self::Lossless => &[".png"],
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Lossy => ImageFormat::Jpeg,
            Self::Lossless => ImageFormat::Png,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Lossy => "lossy",
            Self::Lossless => "lossless",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lossy" | "jpeg" | "jpg" => Ok(Self::Lossy),
            "lossless" | "png" => Ok(Self::Lossless),
            _ => Err(TranscodeError::validation(
                "output_format",
                s,
                "must be lossy (jpeg) or lossless (png)",
            )),
        }
    }
}

/// What the adaptive encoder must produce.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingConstraints {
    pub max_bytes: u64,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    /// 1-100, lossy only.
    pub quality: u32,
    pub format: OutputFormat,
}

impl Default for EncodingConstraints {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_width: None,
            max_height: None,
            quality: Quality::default().value(),
            format: OutputFormat::default(),
        }
    }
}

impl EncodingConstraints {
    pub fn new(format: OutputFormat, max_bytes: u64) -> Self {
        Self {
            format,
            max_bytes,
            ..Self::default()
        }
    }

    /// Check every field. Called before any decoding happens.
    pub fn validate(&self) -> Result<()> {
        if self.max_bytes == 0 {
            return Err(TranscodeError::validation(
                "max_bytes",
                self.max_bytes,
                "must be greater than zero",
            ));
        }
        if self.max_width == Some(0) {
            return Err(TranscodeError::validation(
                "max_width",
                0,
                "must be greater than zero",
            ));
        }
        if self.max_height == Some(0) {
            return Err(TranscodeError::validation(
                "max_height",
                0,
                "must be greater than zero",
            ));
        }
        Quality::try_new(self.quality)?;
        Ok(())
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_try_new_rejects_out_of_range() {
        assert!(Quality::try_new(1).is_ok());
        assert!(Quality::try_new(100).is_ok());
        assert_eq!(
            Quality::try_new(0).unwrap_err().validation_field(),
            Some("quality")
        );
        assert!(Quality::try_new(101).is_err());
    }

    #[test]
    fn output_format_parses_names_and_aliases() {
        assert_eq!("lossy".parse::<OutputFormat>().unwrap(), OutputFormat::Lossy);
        assert_eq!("JPEG".parse::<OutputFormat>().unwrap(), OutputFormat::Lossy);
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Lossless);
        assert_eq!(
            "lossless".parse::<OutputFormat>().unwrap(),
            OutputFormat::Lossless
        );
    }

    #[test]
    fn unknown_output_format_is_validation_error() {
        let err = "gif".parse::<OutputFormat>().unwrap_err();
        assert_eq!(err.validation_field(), Some("output_format"));
    }

    #[test]
    fn output_format_extensions() {
        assert_eq!(OutputFormat::Lossy.extension(), ".jpg");
        assert_eq!(OutputFormat::Lossless.extension(), ".png");
        assert!(OutputFormat::Lossy.accepted_extensions().contains(&".jpeg"));
    }

    #[test]
    fn default_constraints() {
        let c = EncodingConstraints::default();
        assert_eq!(c.max_bytes, 7 * 1024 * 1024);
        assert_eq!(c.quality, 85);
        assert_eq!(c.format, OutputFormat::Lossless);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn constraints_validation_names_field() {
        let mut c = EncodingConstraints::default();
        c.max_bytes = 0;
        assert_eq!(c.validate().unwrap_err().validation_field(), Some("max_bytes"));

        let mut c = EncodingConstraints::default();
        c.max_width = Some(0);
        assert_eq!(c.validate().unwrap_err().validation_field(), Some("max_width"));

        let mut c = EncodingConstraints::default();
        c.quality = 101;
        assert_eq!(c.validate().unwrap_err().validation_field(), Some("quality"));
    }
}
