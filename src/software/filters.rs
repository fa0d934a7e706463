//! CPU versions of the bloom filter passes.
//!
//! These follow the usual threshold / box / tent formulation of the bloom
//! shader closely enough to reason about energy (black in, black out; bright
//! in, wider bright out) but are not meant to match a GPU bit for bit.

use glam::{Vec2, Vec4, Vec4Swizzles};

use super::SoftImage;
use crate::compositor::{BloomPass, BloomUniforms};

#[inline]
fn brightness(c: Vec4) -> f32 {
    c.xyz().max_element()
}

#[inline]
fn median(a: Vec4, b: Vec4, c: Vec4) -> Vec4 {
    a + b + c - a.min(b).min(c) - a.max(b).max(c)
}

/// Soft-knee threshold of one color sample.
fn threshold(m: Vec4, uniforms: &BloomUniforms) -> Vec4 {
    let curve = uniforms.curve();
    let br = brightness(m);

    let mut rq = (br - curve.x).clamp(0.0, curve.y);
    rq = curve.z * rq * rq;

    m * (rq.max(br - uniforms.threshold) / br.max(1e-5))
}

fn prefilter(source: &SoftImage, uv: Vec2, uniforms: &BloomUniforms, anti_flicker: bool) -> Vec4 {
    let ts = source.texel_size();
    let uv = uv + ts * uniforms.prefilter_offset;

    let m = if anti_flicker {
        let d = ts;
        let s0 = source.sample(uv);
        let s1 = source.sample(uv + Vec2::new(d.x, d.y));
        let s2 = source.sample(uv - Vec2::new(d.x, d.y));
        let s3 = source.sample(uv + Vec2::new(0.0, d.y));
        let s4 = source.sample(uv - Vec2::new(0.0, d.y));
        median(median(s0, s1, s2), s3, s4)
    } else {
        source.sample(uv)
    };

    threshold(m, uniforms)
}

const BOX_OFFSETS: [Vec2; 4] = [
    Vec2::new(-1.0, -1.0),
    Vec2::new(1.0, -1.0),
    Vec2::new(-1.0, 1.0),
    Vec2::new(1.0, 1.0),
];

fn downsample(source: &SoftImage, uv: Vec2, karis: bool) -> Vec4 {
    let ts = source.texel_size();
    let taps = BOX_OFFSETS.map(|offset| source.sample(uv + ts * offset));

    if karis {
        // Luminance-weighted average suppresses single bright texels.
        let (sum, weight) = taps.iter().fold((Vec4::ZERO, 0.0), |(sum, weight), &s| {
            let w = 1.0 / (1.0 + brightness(s));
            (sum + s * w, weight + w)
        });
        sum / weight
    } else {
        taps.iter().copied().sum::<Vec4>() * 0.25
    }
}

fn upsample_filter(source: &SoftImage, uv: Vec2, sample_scale: f32, tent: bool) -> Vec4 {
    let ts = source.texel_size();

    if tent {
        let d = ts * sample_scale;
        let mut s = Vec4::ZERO;
        for (x, y, w) in [
            (-1.0, -1.0, 1.0),
            (0.0, -1.0, 2.0),
            (1.0, -1.0, 1.0),
            (-1.0, 0.0, 2.0),
            (0.0, 0.0, 4.0),
            (1.0, 0.0, 2.0),
            (-1.0, 1.0, 1.0),
            (0.0, 1.0, 2.0),
            (1.0, 1.0, 1.0),
        ] {
            s += source.sample(uv + d * Vec2::new(x, y)) * w;
        }
        s / 16.0
    } else {
        let d = ts * (sample_scale * 0.5);
        BOX_OFFSETS
            .iter()
            .map(|&offset| source.sample(uv + d * offset))
            .sum::<Vec4>()
            * 0.25
    }
}

/// Runs `pass` for every pixel of a `width`×`height` destination.
pub(super) fn run_pass(
    pass: BloomPass,
    source: &SoftImage,
    base: Option<&SoftImage>,
    width: u32,
    height: u32,
    uniforms: &BloomUniforms,
) -> Vec<Vec4> {
    let size = Vec2::new(width as f32, height as f32);
    let base_at = |uv: Vec2| base.map_or(Vec4::ZERO, |b| b.sample(uv));

    let mut out = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let uv = (Vec2::new(x as f32, y as f32) + 0.5) / size;
            let color = match pass {
                BloomPass::Prefilter => prefilter(source, uv, uniforms, false),
                BloomPass::PrefilterAntiFlicker => prefilter(source, uv, uniforms, true),
                BloomPass::DownsampleFirst | BloomPass::Downsample => {
                    downsample(source, uv, false)
                }
                BloomPass::DownsampleFirstAntiFlicker => downsample(source, uv, true),
                BloomPass::Upsample | BloomPass::UpsampleTent => {
                    let tent = pass == BloomPass::UpsampleTent;
                    base_at(uv) + upsample_filter(source, uv, uniforms.sample_scale, tent)
                }
                BloomPass::Composite | BloomPass::CompositeTent => {
                    let tent = pass == BloomPass::CompositeTent;
                    let bloom = upsample_filter(source, uv, uniforms.sample_scale, tent);
                    base_at(uv) * uniforms.base_intensity + bloom * uniforms.intensity
                }
            };
            out.push(color);
        }
    }
    out
}

/// Bilinear resample of `source` into a `width`×`height` buffer.
pub(super) fn resample(source: &SoftImage, width: u32, height: u32) -> Vec<Vec4> {
    let size = Vec2::new(width as f32, height as f32);
    (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| source.sample((Vec2::new(x as f32, y as f32) + 0.5) / size))
        .collect()
}
