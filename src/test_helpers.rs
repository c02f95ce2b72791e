//! Shared test utilities for the rawfit test suite.
//!
//! Synthetic rasters, encoded fixtures, and stand-in converter scripts.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let raster = Raster::from(gradient_image(64, 48));
//! let png = encoded_png(64, 48);
//! let converter = write_script(bin_dir, "fake-darktable", r#"cat fixture.png > "$2""#);
//! ```

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

// =========================================================================
// Synthetic rasters
// =========================================================================

/// Smooth RGB gradient. Compresses well.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    DynamicImage::ImageRgb8(img)
}

/// Deterministic pseudo-random RGB noise. Compresses badly.
pub fn noise_image(width: u32, height: u32) -> DynamicImage {
    let mut state: u32 = 0x9E37_79B9;
    let img = RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            // xorshift32
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        };
        Rgb([next(), next(), next()])
    });
    DynamicImage::ImageRgb8(img)
}

// =========================================================================
// Encoded fixtures
// =========================================================================

/// A gradient encoded as PNG bytes.
pub fn encoded_png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient_image(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Write `img` to `path` in `format`.
pub fn write_image(path: &Path, img: &DynamicImage, format: ImageFormat) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    // BMP and WebP encoders in `image` only take 8-bit RGB(A)
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.save_with_format(path, format).unwrap();
}

// =========================================================================
// Stand-in converter
// =========================================================================

/// Write an executable `/bin/sh` script named `name` into `dir`.
///
/// Used in place of darktable-cli: the converter is called as
/// `name <input> <output> ...`, so `$1` is the input and `$2` the output.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
