//! Image backend trait.
//!
//! The [`ImageBackend`] trait defines the two pixel operations the adaptive
//! encoder needs: resize and encode. The search logic in
//! [`adaptive`](super::adaptive) only talks to this trait, so tests can drive
//! it with a mock that records every candidate without encoding real pixels.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::{OutputFormat, Quality};
use crate::error::Result;
use image::DynamicImage;

pub trait ImageBackend: Sync {
    /// Resize to exactly `width` × `height`.
    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage;

    /// Encode into `format`. `quality` is ignored for lossless output.
    fn encode(&self, image: &DynamicImage, format: OutputFormat, quality: Quality)
    -> Result<Vec<u8>>;
}
