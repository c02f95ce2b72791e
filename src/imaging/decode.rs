//! Decoding path or byte inputs into a [`Raster`].
//!
//! Path inputs go through the full validation chain
//! ([`validate_input_path`]); byte inputs only get the size ceiling since
//! there is no path to check. Format detection is an explicit ordered list:
//! the content sniff first, then each entry of [`DECODE_CANDIDATES`].

use crate::error::{Result, TranscodeError};
use crate::security::{SecurityPolicy, is_raw_extension, validate_byte_len, validate_input_path};
use image::error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind};
use image::{DynamicImage, ImageError, ImageFormat};
use std::path::Path;

/// Decoders tried, in order, after the content sniff.
pub const DECODE_CANDIDATES: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Tiff,
    ImageFormat::Bmp,
];

/// Where the pixels come from.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    /// Relative path, validated against the policy.
    Path(&'a Path),
    /// In-memory encoded image.
    Bytes(&'a [u8]),
}

/// A decoded image owned by one pipeline invocation.
#[derive(Debug, Clone)]
pub struct Raster {
    image: DynamicImage,
    format_hint: Option<ImageFormat>,
}

impl Raster {
    pub fn new(image: DynamicImage, format_hint: Option<ImageFormat>) -> Self {
        Self { image, format_hint }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    /// Format the decoder recognized, if any.
    pub fn format_hint(&self) -> Option<ImageFormat> {
        self.format_hint
    }

    /// Lowercase name of the detected format, `"unknown"` when there is none.
    pub fn format_name(&self) -> &'static str {
        self.format_hint
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("unknown")
    }
}

impl From<DynamicImage> for Raster {
    fn from(image: DynamicImage) -> Self {
        Self::new(image, None)
    }
}

/// Decode `input` after validating it against `policy`.
///
/// RAW files are refused here; run them through
/// [`convert_raw`](crate::raw::convert_raw) first.
pub fn decode(input: Input<'_>, policy: &SecurityPolicy) -> Result<Raster> {
    match input {
        Input::Path(path) => {
            let resolved = validate_input_path(path, policy)?;
            if is_raw_extension(&resolved) {
                return Err(TranscodeError::validation(
                    "input",
                    path.display(),
                    "RAW files must be converted before decoding",
                ));
            }
            let data = std::fs::read(&resolved).map_err(|e| {
                TranscodeError::resource(format!("failed to read {}", resolved.display()), e)
            })?;
            decode_bytes(&data)
        }
        Input::Bytes(data) => {
            validate_byte_len(data.len() as u64, policy.max_file_size)?;
            decode_bytes(data)
        }
    }
}

/// Decode already validated bytes.
pub(crate) fn decode_bytes(data: &[u8]) -> Result<Raster> {
    let mut last_error = None;

    let sniffed = image::guess_format(data)
        .ok()
        .filter(|f| DECODE_CANDIDATES.contains(f));
    if let Some(format) = sniffed {
        match image::load_from_memory_with_format(data, format) {
            Ok(image) => return Ok(Raster::new(image, Some(format))),
            Err(e) => last_error = Some(e),
        }
    }

    for &format in DECODE_CANDIDATES {
        if Some(format) == sniffed {
            continue;
        }
        match image::load_from_memory_with_format(data, format) {
            Ok(image) => {
                log::debug!("decoded with fallback decoder {format:?}");
                return Ok(Raster::new(image, Some(format)));
            }
            Err(e) => last_error = Some(e),
        }
    }

    let error = last_error.unwrap_or_else(|| {
        ImageError::Unsupported(UnsupportedError::from_format_and_kind(
            ImageFormatHint::Unknown,
            UnsupportedErrorKind::Format(ImageFormatHint::Unknown),
        ))
    });
    Err(TranscodeError::codec("unsupported or corrupt image data", error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SecurityErrorKind;
    use crate::test_helpers::{encoded_png, gradient_image, write_image};
    use image::ImageFormat;
    use tempfile::TempDir;

    #[test]
    fn decode_png_bytes_with_hint() {
        let data = encoded_png(40, 30);
        let raster = decode(Input::Bytes(&data), &SecurityPolicy::default()).unwrap();
        assert_eq!(raster.dimensions(), (40, 30));
        assert_eq!(raster.format_hint(), Some(ImageFormat::Png));
        assert_eq!(raster.format_name(), "png");
    }

    #[test]
    fn decode_every_candidate_format_from_disk() {
        let tmp = TempDir::new().unwrap();
        let policy = SecurityPolicy::default().with_input_root(tmp.path());
        let img = gradient_image(24, 16);

        for (name, format) in [
            ("a.png", ImageFormat::Png),
            ("a.jpg", ImageFormat::Jpeg),
            ("a.tiff", ImageFormat::Tiff),
            ("a.bmp", ImageFormat::Bmp),
            ("a.webp", ImageFormat::WebP),
        ] {
            write_image(&tmp.path().join(name), &img, format);
            let raster = decode(Input::Path(Path::new(name)), &policy).unwrap();
            assert_eq!(raster.dimensions(), (24, 16), "{name}");
            assert_eq!(raster.format_hint(), Some(format), "{name}");
        }
    }

    #[test]
    fn decode_ignores_misleading_extension() {
        let tmp = TempDir::new().unwrap();
        let policy = SecurityPolicy::default().with_input_root(tmp.path());
        // PNG content under a .jpg name
        std::fs::write(tmp.path().join("lying.jpg"), encoded_png(8, 8)).unwrap();

        let raster = decode(Input::Path(Path::new("lying.jpg")), &policy).unwrap();
        assert_eq!(raster.format_hint(), Some(ImageFormat::Png));
    }

    #[test]
    fn decode_corrupt_bytes_is_codec_error() {
        let err = decode(
            Input::Bytes(b"definitely not an image"),
            &SecurityPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TranscodeError::Codec { .. }));
    }

    #[test]
    fn decode_truncated_png_is_codec_error() {
        let data = encoded_png(64, 64);
        let err = decode(Input::Bytes(&data[..data.len() / 2]), &SecurityPolicy::default())
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Codec { .. }));
    }

    #[test]
    fn decode_oversize_bytes_is_security_error() {
        let data = encoded_png(8, 8);
        let policy = SecurityPolicy::default().with_max_file_size(16);
        let err = decode(Input::Bytes(&data), &policy).unwrap_err();
        assert_eq!(err.security_kind(), Some(SecurityErrorKind::FileTooLarge));
    }

    #[test]
    fn decode_rejects_traversal_before_reading() {
        let err = decode(
            Input::Path(Path::new("a/../../etc/passwd.png")),
            &SecurityPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.security_kind(), Some(SecurityErrorKind::PathTraversal));
    }

    #[test]
    fn decode_refuses_raw_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("photo.arw"), b"II*\0SONY").unwrap();
        let policy = SecurityPolicy::default().with_input_root(tmp.path());

        let err = decode(Input::Path(Path::new("photo.arw")), &policy).unwrap_err();
        assert_eq!(err.validation_field(), Some("input"));
    }
}
