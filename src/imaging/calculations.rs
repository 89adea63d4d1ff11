//! Pure calculation functions for image dimensions and encode attempts.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{CompressionProfile, Quality};

/// Quality points dropped per retry while above the profile's floor.
pub const QUALITY_STEP: u32 = 5;

/// Dimension scale applied per retry once quality sits at the floor.
pub const SHRINK_FACTOR: f64 = 0.85;

/// Fit dimensions inside a long-edge cap, preserving aspect ratio.
///
/// Images already within the cap are returned unchanged (never upscaled).
///
/// # Examples
/// ```
/// # use listing_gallery::imaging::fit_long_edge;
/// assert_eq!(fit_long_edge((4000, 3000), 1920), (1920, 1440));
/// assert_eq!(fit_long_edge((800, 600), 1920), (800, 600));
/// ```
pub fn fit_long_edge(dims: (u32, u32), max_long_edge: u32) -> (u32, u32) {
    let (w, h) = dims;
    let long = w.max(h);
    if long <= max_long_edge || long == 0 {
        return dims;
    }
    let scale = max_long_edge as f64 / long as f64;
    if w >= h {
        (max_long_edge, scaled(h, scale))
    } else {
        (scaled(w, scale), max_long_edge)
    }
}

fn scaled(edge: u32, scale: f64) -> u32 {
    ((edge as f64 * scale).round() as u32).max(1)
}

/// Parameters for a single encode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeAttempt {
    pub quality: Quality,
    pub width: u32,
    pub height: u32,
}

/// Plan encode attempt number `attempt` (0-based) for an image of `source` size.
///
/// Attempt 0 encodes at the profile quality within the long-edge cap. Each
/// retry lowers quality by [`QUALITY_STEP`] until `min_quality`; retries past
/// the floor shrink the fitted dimensions by [`SHRINK_FACTOR`] per step.
pub fn plan_attempt(
    profile: &CompressionProfile,
    source: (u32, u32),
    attempt: u32,
) -> EncodeAttempt {
    let floor = profile.min_quality.min(profile.quality);
    let (fit_w, fit_h) = fit_long_edge(source, profile.max_long_edge);

    let steps_to_floor = (profile.quality.value() - floor.value()).div_ceil(QUALITY_STEP);
    let quality = profile.quality.lowered(attempt * QUALITY_STEP, floor);
    let shrink_steps = attempt.saturating_sub(steps_to_floor);

    if shrink_steps == 0 {
        return EncodeAttempt {
            quality,
            width: fit_w,
            height: fit_h,
        };
    }
    let scale = SHRINK_FACTOR.powi(shrink_steps as i32);
    EncodeAttempt {
        quality,
        width: scaled(fit_w, scale),
        height: scaled(fit_h, scale),
    }
}
