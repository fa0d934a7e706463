//! Pyramid sizing.
//!
//! The number of downsample steps follows the working height so that a given
//! radius covers the same fraction of the screen at any resolution:
//!
//! ```text
//! logh        = log2(working_height) + radius - 8
//! iterations  = clamp(floor(logh), 1, 16)
//! sample_scale = 0.5 + fract(logh)
//! ```
//!
//! `sample_scale` lets the upsample filter interpolate between two discrete
//! pyramid depths, which keeps the radius control continuous.

use crate::settings::BloomParameters;

/// Upper bound on downsample steps (and pyramid levels).
pub const MAX_ITERATIONS: u32 = 16;

#[inline]
fn log_height(height: u32, radius: f32) -> f32 {
    (height.max(1) as f32).log2() + radius - 8.0
}

/// Downsample step count for a working height and radius.
#[must_use]
pub fn iteration_count(height: u32, radius: f32) -> u32 {
    let logh = log_height(height, radius).floor();
    (logh as i64).clamp(1, i64::from(MAX_ITERATIONS)) as u32
}

/// Fractional upsample sample scale for a working height and radius.
#[must_use]
pub fn sample_scale(height: u32, radius: f32) -> f32 {
    let logh = log_height(height, radius);
    0.5 + (logh - logh.floor())
}

#[inline]
fn half_extent(x: u32) -> u32 {
    (x / 2).max(1)
}

/// Resolved sizes and counts for one frame of the bloom pyramid.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PyramidPlan {
    /// Size of the glow source buffer.
    pub source_width: u32,
    pub source_height: u32,
    /// Size of the prefiltered buffer (source, halved in low quality).
    pub working_width: u32,
    pub working_height: u32,
    /// Number of downsample steps.
    pub iterations: u32,
    pub sample_scale: f32,
}

impl PyramidPlan {
    /// Plans the pyramid for a glow source of the given size.
    #[must_use]
    pub fn new(source_width: u32, source_height: u32, params: &BloomParameters) -> Self {
        let (working_width, working_height) = if params.high_quality() {
            (source_width.max(1), source_height.max(1))
        } else {
            (half_extent(source_width), half_extent(source_height))
        };

        let radius = params.radius();
        Self {
            source_width,
            source_height,
            working_width,
            working_height,
            iterations: iteration_count(working_height, radius),
            sample_scale: sample_scale(working_height, radius),
        }
    }

    /// Size of downsample level `level` (level 0 is half the working size).
    ///
    /// Extents never drop below one pixel.
    #[must_use]
    pub fn level_size(&self, level: u32) -> (u32, u32) {
        let mut size = (self.working_width, self.working_height);
        for _ in 0..=level {
            size = (half_extent(size.0), half_extent(size.1));
        }
        size
    }

    /// Number of upsample steps (one per level above the coarsest).
    #[must_use]
    pub fn upsample_steps(&self) -> u32 {
        self.iterations.saturating_sub(1)
    }
}
