//! Pure calculation functions for the budget search.
//!
//! All functions here are pure and testable without any I/O or images.

/// After a miss the running multiplier becomes the last target times this.
pub const SCALE_DECAY: f64 = 0.8;

/// The search ends once the running multiplier drops below this.
pub const MIN_SCALE: f64 = 0.1;

/// Starting scale factor from the original pixel count.
///
/// | Pixels | Factor |
/// |---|---|
/// | ≥ 8,000,000 | 0.60 |
/// | ≥ 4,000,000 | 0.75 |
/// | ≥ 2,000,000 | 0.85 |
/// | otherwise | 1.00 |
pub fn base_scale_factor(pixels: u64) -> f64 {
    match pixels {
        p if p >= 8_000_000 => 0.60,
        p if p >= 4_000_000 => 0.75,
        p if p >= 2_000_000 => 0.85,
        _ => 1.0,
    }
}

/// Factor that fits `(width, height)` inside the caller's caps, never above 1.0.
///
/// Absent caps do not constrain.
pub fn clamp_scale_factor(
    (width, height): (u32, u32),
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> f64 {
    let fit = |limit: Option<u32>, actual: u32| match limit {
        Some(limit) if actual > 0 => limit as f64 / actual as f64,
        _ => 1.0,
    };
    fit(max_width, width).min(fit(max_height, height)).min(1.0)
}

/// Base factor for [`scale_schedule`]: the pixel-count breakpoint, or the
/// dimension cap when that is tighter. Also the first scale tried.
pub fn initial_scale(
    dimensions: (u32, u32),
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> f64 {
    let pixels = dimensions.0 as u64 * dimensions.1 as u64;
    let base = base_scale_factor(pixels);
    let clamp = clamp_scale_factor(dimensions, max_width, max_height);
    base.min(clamp).min(1.0)
}

/// Every scale the search may try, largest first.
///
/// A running multiplier starts at 1.0. Each target is
/// `min(1, multiplier × base)` and the multiplier then becomes
/// `target × SCALE_DECAY`, so `base` compounds: 0.60 gives 0.60, 0.288,
/// 0.138, 0.066. The search stops once the multiplier is below [`MIN_SCALE`];
/// the target computed just before that can itself be under the floor.
pub fn scale_schedule(base: f64) -> Vec<f64> {
    let base = base.min(1.0);
    let mut schedule = Vec::new();
    let mut multiplier = 1.0;
    while multiplier >= MIN_SCALE {
        let target = (multiplier * base).min(1.0);
        schedule.push(target);
        multiplier = target * SCALE_DECAY;
    }
    schedule
}

/// Dimensions at `factor`, floored, at least 1px, never above the original.
pub fn scaled_dimensions((width, height): (u32, u32), factor: f64) -> (u32, u32) {
    let factor = factor.min(1.0);
    // Epsilon absorbs float noise such as 4000 * 0.288 landing on 1151.999…
    let scale = |v: u32| ((v as f64 * factor + 1e-9).floor() as u32).clamp(1, v.max(1));
    (scale(width), scale(height))
}
