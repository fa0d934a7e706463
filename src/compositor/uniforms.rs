//! Filter pass table and the uniform block shared by every pass.

use glam::Vec3;

use crate::compositor::pyramid::PyramidPlan;
use crate::settings::BloomParameters;

/// Added to the knee width so the curve never divides by zero.
pub const KNEE_EPSILON: f32 = 1e-5;

/// Prefilter sampling offset (in texels) used by anti-flicker at half resolution.
pub const ANTI_FLICKER_PREFILTER_OFFSET: f32 = -0.5;

/// The bloom filter passes, indexed the way the bloom shader orders them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BloomPass {
    /// Threshold the glow source.
    Prefilter = 0,
    /// Threshold with extra filtering of bright samples.
    PrefilterAntiFlicker = 1,
    /// First downsample from the prefiltered buffer.
    DownsampleFirst = 2,
    /// First downsample with luminance-weighted averaging.
    DownsampleFirstAntiFlicker = 3,
    /// Plain downsample.
    Downsample = 4,
    /// Box-filtered upsample combined with the base texture.
    Upsample = 5,
    /// Tent-filtered upsample combined with the base texture.
    UpsampleTent = 6,
    /// Box-filtered final blend onto the glow source.
    Composite = 7,
    /// Tent-filtered final blend onto the glow source.
    CompositeTent = 8,
}

impl BloomPass {
    pub const ALL: [Self; 9] = [
        Self::Prefilter,
        Self::PrefilterAntiFlicker,
        Self::DownsampleFirst,
        Self::DownsampleFirstAntiFlicker,
        Self::Downsample,
        Self::Upsample,
        Self::UpsampleTent,
        Self::Composite,
        Self::CompositeTent,
    ];

    /// Shader pass index.
    #[inline]
    #[must_use]
    pub fn index(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn prefilter(anti_flicker: bool) -> Self {
        if anti_flicker {
            Self::PrefilterAntiFlicker
        } else {
            Self::Prefilter
        }
    }

    #[must_use]
    pub fn first_downsample(anti_flicker: bool) -> Self {
        if anti_flicker {
            Self::DownsampleFirstAntiFlicker
        } else {
            Self::DownsampleFirst
        }
    }

    #[must_use]
    pub fn upsample(high_quality: bool) -> Self {
        if high_quality {
            Self::UpsampleTent
        } else {
            Self::Upsample
        }
    }

    #[must_use]
    pub fn composite(high_quality: bool) -> Self {
        if high_quality {
            Self::CompositeTent
        } else {
            Self::Composite
        }
    }

    /// `true` for passes that read a base texture.
    #[must_use]
    pub fn uses_base_texture(self) -> bool {
        matches!(
            self,
            Self::Upsample | Self::UpsampleTent | Self::Composite | Self::CompositeTent
        )
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Prefilter => "Bloom Prefilter",
            Self::PrefilterAntiFlicker => "Bloom Prefilter (Anti-Flicker)",
            Self::DownsampleFirst => "Bloom Downsample First",
            Self::DownsampleFirstAntiFlicker => "Bloom Downsample First (Anti-Flicker)",
            Self::Downsample => "Bloom Downsample",
            Self::Upsample => "Bloom Upsample",
            Self::UpsampleTent => "Bloom Upsample (Tent)",
            Self::Composite => "Bloom Composite",
            Self::CompositeTent => "Bloom Composite (Tent)",
        }
    }
}

/// GPU uniform data for every bloom pass (32 bytes, no padding).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BloomUniforms {
    /// Soft-knee curve: `(threshold - knee, 2 * knee, 0.25 / knee)`.
    pub curve: [f32; 3],
    /// Linear-space threshold.
    pub threshold: f32,
    /// Prefilter sampling offset in texels.
    pub prefilter_offset: f32,
    /// Upsample filter scale, interpolating between pyramid depths.
    pub sample_scale: f32,
    /// Blend weight of the bloom result.
    pub intensity: f32,
    /// Blend weight of the glow source in the composite.
    pub base_intensity: f32,
}

impl BloomUniforms {
    /// Builds the per-frame uniforms from the parameters and the pyramid plan.
    #[must_use]
    pub fn new(params: &BloomParameters, plan: &PyramidPlan) -> Self {
        let threshold = params.threshold_linear();
        let knee = threshold * params.soft_knee() + KNEE_EPSILON;

        let prefilter_offset = if !params.high_quality() && params.anti_flicker() {
            ANTI_FLICKER_PREFILTER_OFFSET
        } else {
            0.0
        };

        Self {
            curve: [threshold - knee, knee * 2.0, 0.25 / knee],
            threshold,
            prefilter_offset,
            sample_scale: plan.sample_scale,
            intensity: params.intensity(),
            base_intensity: params.base_intensity(),
        }
    }

    #[inline]
    #[must_use]
    pub fn curve(&self) -> Vec3 {
        Vec3::from_array(self.curve)
    }

    /// Raw bytes for uploading into a uniform buffer.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
