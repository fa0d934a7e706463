//! Bloom Parameters
//!
//! This module defines the user-facing bloom configuration as pure data,
//! following the same pattern as the engine's other post-processing settings:
//! private fields, clamping setters, and getters that are always safe to feed
//! into the filter passes.
//!
//! Every field may be changed at any time; the compositor reads the
//! parameters once per frame, so changes take effect on the next frame.
//!
//! # Threshold color space
//!
//! The brightness threshold is stored **gamma-encoded** (that is what a user
//! tunes by eye) and converted to linear space with the standard sRGB
//! transfer function when the prefilter uniforms are built. Both views are
//! exposed: [`BloomParameters::threshold_gamma`] and
//! [`BloomParameters::threshold_linear`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut params = BloomParameters::default();
//! params.set_threshold_gamma(0.9);
//! params.set_radius(4.0);
//! params.set_high_quality(false);
//!
//! // Or from a JSON config file
//! let params = BloomParameters::from_json(r#"{ "intensity": 1.5 }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Smallest accepted radius.
pub const MIN_RADIUS: f32 = 1.0;
/// Largest accepted radius.
pub const MAX_RADIUS: f32 = 7.0;

/// Converts a gamma-encoded (sRGB) value to linear space.
#[inline]
#[must_use]
pub fn gamma_to_linear(x: f32) -> f32 {
    if x <= 0.040_45 {
        x / 12.92
    } else {
        ((x + 0.055) / 1.055).powf(2.4)
    }
}

/// Converts a linear value to gamma-encoded (sRGB) space.
#[inline]
#[must_use]
pub fn linear_to_gamma(x: f32) -> f32 {
    if x <= 0.003_130_8 {
        12.92 * x
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

/// Selective bloom configuration.
///
/// | Field            | Range   | Default |
/// |------------------|---------|---------|
/// | `threshold`      | ≥ 0     | `0.8`   |
/// | `soft_knee`      | 0 – 1   | `0.5`   |
/// | `radius`         | 1 – 7   | `2.5`   |
/// | `intensity`      | ≥ 0     | `0.8`   |
/// | `base_intensity` | 0 – 1   | `1.0`   |
/// | `high_quality`   | bool    | `true`  |
/// | `anti_flicker`   | bool    | `true`  |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomParameters {
    /// Prefilter threshold, gamma-encoded.
    ///
    /// Filters out pixels under this level of brightness.
    threshold: f32,

    /// Makes the transition between under/over-threshold gradual.
    soft_knee: f32,

    /// Extent of the veiling effect, independent of screen resolution.
    radius: f32,

    /// Blend factor of the bloom result.
    intensity: f32,

    /// Blend factor of the unbloomed glow image.
    base_intensity: f32,

    /// Full-resolution processing and tent filters when `true`,
    /// half-resolution processing and box filters otherwise.
    high_quality: bool,

    /// Extra filtering of bright point samples to reduce flicker.
    anti_flicker: bool,
}

impl Default for BloomParameters {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            soft_knee: 0.5,
            radius: 2.5,
            intensity: 0.8,
            base_intensity: 1.0,
            high_quality: true,
            anti_flicker: true,
        }
    }
}

impl BloomParameters {
    /// Creates parameters with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses parameters from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the parameters to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    // ── Getters ────────────────────────────────────────────────────────────

    /// Gamma-encoded threshold (never negative).
    #[inline]
    #[must_use]
    pub fn threshold_gamma(&self) -> f32 {
        self.threshold.max(0.0)
    }

    /// Linear-space threshold, as consumed by the prefilter pass.
    #[inline]
    #[must_use]
    pub fn threshold_linear(&self) -> f32 {
        gamma_to_linear(self.threshold_gamma())
    }

    #[inline]
    #[must_use]
    pub fn soft_knee(&self) -> f32 {
        self.soft_knee.clamp(0.0, 1.0)
    }

    #[inline]
    #[must_use]
    pub fn radius(&self) -> f32 {
        self.radius.clamp(MIN_RADIUS, MAX_RADIUS)
    }

    #[inline]
    #[must_use]
    pub fn intensity(&self) -> f32 {
        self.intensity.max(0.0)
    }

    #[inline]
    #[must_use]
    pub fn base_intensity(&self) -> f32 {
        self.base_intensity.clamp(0.0, 1.0)
    }

    #[inline]
    #[must_use]
    pub fn high_quality(&self) -> bool {
        self.high_quality
    }

    #[inline]
    #[must_use]
    pub fn anti_flicker(&self) -> bool {
        self.anti_flicker
    }

    // ── Setters ────────────────────────────────────────────────────────────

    /// Sets the gamma-encoded threshold.
    pub fn set_threshold_gamma(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    /// Sets the threshold from a linear-space value.
    pub fn set_threshold_linear(&mut self, threshold: f32) {
        self.threshold = linear_to_gamma(threshold);
    }

    pub fn set_soft_knee(&mut self, soft_knee: f32) {
        self.soft_knee = soft_knee.clamp(0.0, 1.0);
    }

    /// Sets the bloom radius (clamped to `1..=7`).
    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius.clamp(MIN_RADIUS, MAX_RADIUS);
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity.max(0.0);
    }

    pub fn set_base_intensity(&mut self, base_intensity: f32) {
        self.base_intensity = base_intensity.clamp(0.0, 1.0);
    }

    pub fn set_high_quality(&mut self, high_quality: bool) {
        self.high_quality = high_quality;
    }

    pub fn set_anti_flicker(&mut self, anti_flicker: bool) {
        self.anti_flicker = anti_flicker;
    }
}
