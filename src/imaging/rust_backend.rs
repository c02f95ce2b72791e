//! Pure Rust image backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → lossy | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → lossless | `image::codecs::png::PngEncoder` (best compression, adaptive filter) |

use super::backend::ImageBackend;
use super::params::{OutputFormat, Quality};
use crate::error::{Result, TranscodeError};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage};
use std::borrow::Cow;

/// Production backend. See the [module docs](self) for the crate mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// JPEG carries 8-bit gray or RGB only; alpha and deep images are flattened to RGB8.
fn jpeg_compatible(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image.color() {
        ColorType::L8 | ColorType::Rgb8 => Cow::Borrowed(image),
        _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
    }
}

/// PNG has no float samples; those are stored as 16-bit.
fn png_compatible(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image.color() {
        ColorType::Rgb32F => Cow::Owned(DynamicImage::ImageRgb16(image.to_rgb16())),
        ColorType::Rgba32F => Cow::Owned(DynamicImage::ImageRgba16(image.to_rgba16())),
        _ => Cow::Borrowed(image),
    }
}

fn encode_jpeg(image: &DynamicImage, quality: Quality) -> Result<Vec<u8>> {
    let image = jpeg_compatible(image);
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.value() as u8);
    image
        .write_with_encoder(encoder)
        .map_err(|e| TranscodeError::codec("JPEG encode failed", e))?;
    Ok(buffer)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let image = png_compatible(image);
    let mut buffer = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, PngFilter::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| TranscodeError::codec("PNG encode failed", e))?;
    Ok(buffer)
}

impl ImageBackend for RustBackend {
    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        image.resize_exact(width, height, FilterType::Lanczos3)
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>> {
        match format {
            OutputFormat::Lossy => encode_jpeg(image, quality),
            OutputFormat::Lossless => encode_png(image),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::gradient_image;
    use image::{GenericImageView, ImageFormat};

    #[test]
    fn resize_is_exact() {
        let backend = RustBackend::new();
        let resized = backend.resize(&gradient_image(200, 150), 77, 31);
        assert_eq!(resized.dimensions(), (77, 31));
    }

    #[test]
    fn encode_lossless_produces_png() {
        let backend = RustBackend::new();
        let bytes = backend
            .encode(&gradient_image(64, 48), OutputFormat::Lossless, Quality::default())
            .unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn encode_lossy_produces_jpeg() {
        let backend = RustBackend::new();
        let bytes = backend
            .encode(&gradient_image(64, 48), OutputFormat::Lossy, Quality::new(80))
            .unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn lower_quality_gives_smaller_jpeg() {
        let backend = RustBackend::new();
        let img = gradient_image(256, 256);
        let high = backend
            .encode(&img, OutputFormat::Lossy, Quality::new(95))
            .unwrap();
        let low = backend
            .encode(&img, OutputFormat::Lossy, Quality::new(20))
            .unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn lossy_flattens_alpha() {
        let backend = RustBackend::new();
        let rgba = DynamicImage::ImageRgba8(gradient_image(32, 32).to_rgba8());
        let bytes = backend
            .encode(&rgba, OutputFormat::Lossy, Quality::default())
            .unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn lossless_handles_float_images() {
        let backend = RustBackend::new();
        let float = DynamicImage::ImageRgb32F(gradient_image(16, 16).to_rgb32f());
        let bytes = backend
            .encode(&float, OutputFormat::Lossless, Quality::default())
            .unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    }
}
