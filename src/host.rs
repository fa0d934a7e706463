//! Host Engine Interfaces
//!
//! The glow subsystem never talks to a GPU API directly. Everything it needs
//! from the host engine goes through two traits:
//!
//! - [`RenderDevice`]: render target creation, clears, draws and the
//!   fullscreen filter passes ("blits") of the bloom pyramid.
//! - [`MaterialServer`]: the drawable → material → shader lookups and the
//!   material cloning used to derive glow materials.
//!
//! The per-frame callback sequence (pre-cull → pre-render → image effect) is
//! driven by the host calling the matching [`BloomCompositor`] hooks.
//!
//! [`BloomCompositor`]: crate::compositor::BloomCompositor

use bitflags::bitflags;
use glam::Vec4;

use crate::compositor::{BloomPass, BloomUniforms};
use crate::errors::{GlowError, Result};

slotmap::new_key_type! {
    /// Handle to a render target owned by the host device.
    pub struct RenderTargetId;
}

/// Host handle to a drawable primitive (a mesh renderer, sprite, ...).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawableId(pub u64);

/// Host handle to a material instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

/// Host handle to a compiled shader.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u64);

/// Color format of a render target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum TargetFormat {
    /// The platform's default LDR format (8 bits per channel).
    ///
    /// Used for the glow source buffer and, on RGBM platforms, the blur chain.
    #[default]
    Default,
    /// Half-float HDR format.
    Hdr,
}

impl TargetFormat {
    /// Returns `true` if values written to this format are clamped to `[0, 1]`.
    #[inline]
    #[must_use]
    pub fn is_ldr(self) -> bool {
        matches!(self, Self::Default)
    }
}

/// Descriptor for requesting a render target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub width: u32,
    pub height: u32,
    pub depth_bits: u32,
    pub format: TargetFormat,
    pub label: &'static str,
}

impl RenderTargetDesc {
    /// Color-only target (no depth buffer).
    #[must_use]
    pub fn color(width: u32, height: u32, format: TargetFormat, label: &'static str) -> Self {
        Self {
            width,
            height,
            depth_bits: 0,
            format,
            label,
        }
    }

    /// Rejects zero-sized requests before they reach the host.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GlowError::InvalidTargetSize {
                width: self.width,
                height: self.height,
                label: self.label,
            });
        }
        Ok(())
    }
}

bitflags! {
    /// Flags applied to materials created by the glow subsystem.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u32 {
        /// Runtime-only material, excluded from serialization and saving.
        const DONT_SAVE = 1 << 0;
    }
}

/// One draw of a drawable with its glow material into the glow buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GlowDraw {
    pub drawable: DrawableId,
    pub material: MaterialId,
    pub submesh_index: u32,
    pub shader_pass: u32,
}

impl GlowDraw {
    /// Draws the first sub-mesh with the first shader pass.
    #[must_use]
    pub fn new(drawable: DrawableId, material: MaterialId) -> Self {
        Self {
            drawable,
            material,
            submesh_index: 0,
            shader_pass: 0,
        }
    }
}

/// A fullscreen filter pass from `source` into `destination`.
#[derive(Copy, Clone, Debug)]
pub struct Blit<'a> {
    pub source: RenderTargetId,
    pub destination: RenderTargetId,
    /// Secondary input ("base texture") for upsample and composite passes.
    pub base: Option<RenderTargetId>,
    pub pass: BloomPass,
    pub uniforms: &'a BloomUniforms,
}

/// Render target and command services provided by the host engine.
pub trait RenderDevice {
    /// Creates a new render target. Errors are propagated to the host
    /// unchanged; nothing in the glow subsystem retries.
    fn create_target(&mut self, desc: &RenderTargetDesc) -> Result<RenderTargetId>;

    /// Destroys a render target created by [`create_target`](Self::create_target).
    fn destroy_target(&mut self, target: RenderTargetId);

    /// Returns `(width, height)` of a live target.
    fn target_size(&self, target: RenderTargetId) -> Option<(u32, u32)>;

    /// Clears color (and depth, if present) of a target.
    fn clear(&mut self, target: RenderTargetId, color: Vec4);

    /// Draws a drawable with the given material into `target`.
    fn draw(&mut self, target: RenderTargetId, draw: &GlowDraw);

    /// Runs one bloom filter pass.
    fn blit(&mut self, blit: &Blit<'_>);

    /// Copies `source` into `destination`, resampling if sizes differ.
    fn copy(&mut self, source: RenderTargetId, destination: RenderTargetId);
}

/// Drawable and material services provided by the host engine.
pub trait MaterialServer {
    /// The material currently assigned to a drawable.
    fn material_of(&self, drawable: DrawableId) -> Option<MaterialId>;

    /// The shader used by a material.
    fn shader_of(&self, material: MaterialId) -> Option<ShaderId>;

    /// The shader-defined render queue, used as the glow draw sort key.
    fn render_queue(&self, shader: ShaderId) -> i32;

    /// Clones `original` (keeping its property block) with `shader` swapped in.
    fn instantiate(
        &mut self,
        original: MaterialId,
        shader: ShaderId,
        flags: MaterialFlags,
    ) -> Result<MaterialId>;

    /// Destroys a material immediately.
    fn destroy_material(&mut self, material: MaterialId);
}
