//! Budget-driven encoder.
//!
//! Encodes a [`Raster`] so the output fits [`EncodingConstraints::max_bytes`],
//! preferring full resolution and never upscaling:
//!
//! 1. Encode at the original dimensions. Done if it fits.
//! 2. Pick a starting scale from the pixel count
//!    ([`base_scale_factor`](super::calculations::base_scale_factor)), tightened
//!    by the optional width/height caps.
//! 3. Resize (Lanczos3) to `multiplier × base` and re-encode. After a miss
//!    the multiplier becomes that target times 0.8, so the base compounds.
//! 4. Stop once the multiplier is under 0.1 and return the smallest candidate
//!    with `budget_met = false`.
//!
//! A 12 MP image with a 2 MiB lossless budget therefore tries 4000×3000,
//! 2400×1800, then 1152×864.

use super::backend::ImageBackend;
use super::calculations::{initial_scale, scale_schedule, scaled_dimensions};
use super::decode::Raster;
use super::params::{EncodingConstraints, OutputFormat};
use super::rust_backend::RustBackend;
use crate::cancel::CancelToken;
use crate::error::Result;

/// Output of the adaptive encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// Scale relative to the source; 1.0 means full resolution.
    pub scale: f64,
    pub source_width: u32,
    pub source_height: u32,
    /// Number of encode calls made, the full-resolution one included.
    pub attempts: u32,
    /// False when the scale floor was reached first and `bytes` is the
    /// smallest candidate rather than one within budget.
    pub budget_met: bool,
}

impl Encoded {
    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_downscaled(&self) -> bool {
        (self.width, self.height) != (self.source_width, self.source_height)
    }
}

struct Candidate {
    bytes: Vec<u8>,
    dimensions: (u32, u32),
    scale: f64,
}

/// Encode with the default backend.
pub fn encode(raster: &Raster, constraints: &EncodingConstraints) -> Result<Encoded> {
    encode_with_cancel(raster, constraints, &CancelToken::new())
}

/// Like [`encode`], checking `cancel` before every attempt.
pub fn encode_with_cancel(
    raster: &Raster,
    constraints: &EncodingConstraints,
    cancel: &CancelToken,
) -> Result<Encoded> {
    encode_with_backend(&RustBackend::new(), raster, constraints, cancel)
}

/// The search itself, generic over the pixel backend.
pub fn encode_with_backend(
    backend: &impl ImageBackend,
    raster: &Raster,
    constraints: &EncodingConstraints,
    cancel: &CancelToken,
) -> Result<Encoded> {
    constraints.validate()?;
    cancel.check()?;

    let format = constraints.format;
    let quality = constraints.quality();
    let budget = constraints.max_bytes;
    let original = raster.dimensions();

    let full = backend.encode(raster.image(), format, quality)?;
    let mut attempts = 1;
    log::debug!(
        "full resolution {}x{} encoded to {} bytes (budget {budget})",
        original.0,
        original.1,
        full.len()
    );

    let finish = |candidate: Candidate, attempts: u32, budget_met: bool| Encoded {
        bytes: candidate.bytes,
        format,
        width: candidate.dimensions.0,
        height: candidate.dimensions.1,
        scale: candidate.scale,
        source_width: original.0,
        source_height: original.1,
        attempts,
        budget_met,
    };

    let mut best = Candidate {
        bytes: full,
        dimensions: original,
        scale: 1.0,
    };
    if best.bytes.len() as u64 <= budget {
        return Ok(finish(best, attempts, true));
    }

    let base = initial_scale(original, constraints.max_width, constraints.max_height);
    let mut previous = original;
    for scale in scale_schedule(base) {
        cancel.check()?;

        let dimensions = scaled_dimensions(original, scale);
        if dimensions == previous {
            log::debug!(
                "scale {scale:.3} gives {}x{} again, skipping",
                dimensions.0,
                dimensions.1
            );
            continue;
        }
        previous = dimensions;

        let resized = backend.resize(raster.image(), dimensions.0, dimensions.1);
        let bytes = backend.encode(&resized, format, quality)?;
        attempts += 1;
        log::debug!(
            "scale {scale:.3} → {}x{}: {} bytes",
            dimensions.0,
            dimensions.1,
            bytes.len()
        );

        let fits = bytes.len() as u64 <= budget;
        if fits || bytes.len() <= best.bytes.len() {
            best = Candidate {
                bytes,
                dimensions,
                scale,
            };
        }
        if fits {
            return Ok(finish(best, attempts, true));
        }
    }

    log::warn!(
        "could not reach {budget} bytes; smallest candidate is {}x{} at {} bytes",
        best.dimensions.0,
        best.dimensions.1,
        best.bytes.len()
    );
    Ok(finish(best, attempts, false))
}
