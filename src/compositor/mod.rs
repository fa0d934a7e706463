//! Selective Bloom Compositor
//!
//! Renders only the objects registered in the [`SharedGlowRegistry`] into an
//! isolated glow buffer, blurs that buffer through a mip pyramid, and blends
//! the result into the host's output image.
//!
//! # Per-frame hooks
//!
//! The host calls three hooks per frame, in this order:
//!
//! 1. [`prepare`](BloomCompositor::prepare) (before visibility culling):
//!    swaps in a fresh full-resolution glow buffer.
//! 2. [`populate`](BloomCompositor::populate) (before rendering): clears the
//!    glow buffer and draws every registered object with its glow material,
//!    in ascending render queue order.
//! 3. [`render_image`](BloomCompositor::render_image) (image-effect stage):
//!    runs the pyramid and composites into the destination.
//!
//! # Pyramid
//!
//! ```text
//! glow source ──prefilter──▶ prefiltered (working size)
//!                                │
//!                 downsample ×N  ▼
//!   down[0] ─▶ down[1] ─▶ … ─▶ down[N-1]
//!      ▲          ▲                │
//!      │ base     │ base   upsample│ ×(N-1)
//!   up[0]  ◀─  up[1]  ◀─ … ◀───────┘
//!      │
//!      └──composite (base = glow source)──▶ destination
//! ```
//!
//! Every pyramid buffer comes from the [`FrameBufferPool`] through a
//! [`FrameScope`](crate::frame_pool::FrameScope) and is released when the
//! image-effect hook returns, whatever the iteration count and even when a
//! later allocation fails. The glow buffer itself lives until the next
//! `prepare`.

pub mod pyramid;
pub mod uniforms;

use glam::Vec4;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub use pyramid::{MAX_ITERATIONS, PyramidPlan, iteration_count, sample_scale};
pub use uniforms::{BloomPass, BloomUniforms};

use crate::errors::{GlowError, Result};
use crate::frame_pool::FrameBufferPool;
use crate::host::{Blit, RenderDevice, RenderTargetDesc, RenderTargetId, TargetFormat};
use crate::registry::SharedGlowRegistry;
use crate::settings::BloomParameters;

const GLOW_SOURCE_LABEL: &str = "Bloom Glow Source";
const PREFILTER_LABEL: &str = "Bloom Prefiltered";
const DOWNSAMPLE_LABEL: &str = "Bloom Downsample";
const UPSAMPLE_LABEL: &str = "Bloom Upsample";

/// Compositor-level options that are fixed for a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorSettings {
    /// Use LDR (RGBM-encoded) blur buffers instead of HDR ones.
    ///
    /// Mobile platforms without cheap half-float targets set this.
    pub use_rgbm: bool,

    /// Free pool targets unused for this many frames are destroyed.
    pub pool_trim_frames: u32,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            use_rgbm: false,
            pool_trim_frames: 8,
        }
    }
}

impl CompositorSettings {
    /// Format of the prefilter, downsample and upsample buffers.
    #[must_use]
    pub fn blur_format(&self) -> TargetFormat {
        if self.use_rgbm {
            TargetFormat::Default
        } else {
            TargetFormat::Hdr
        }
    }
}

/// Diagnostics for one run of the image-effect hook.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub plan: PyramidPlan,
    /// Draws issued into the glow buffer by the last `populate`.
    pub glow_draws: usize,
    /// Filter passes issued (prefilter + downsamples + upsamples + composite).
    pub blits: usize,
    /// Temporary targets acquired (and released) for the pyramid.
    pub temporary_targets: usize,
    /// Registry version the glow buffer was populated from.
    pub registry_version: u64,
}

/// Selective bloom image effect.
pub struct BloomCompositor {
    params: BloomParameters,
    settings: CompositorSettings,
    registry: SharedGlowRegistry,
    pool: FrameBufferPool,
    /// Glow buffer of the current frame, held from `prepare` to the next `prepare`.
    glow_source: Option<RenderTargetId>,
    enabled: bool,
    last_draw_count: usize,
    /// Registry version seen by the last `populate`.
    registry_version: Option<u64>,
}

impl BloomCompositor {
    /// Creates an enabled compositor drawing the objects of `registry`.
    #[must_use]
    pub fn new(registry: &SharedGlowRegistry, params: BloomParameters) -> Self {
        Self::with_settings(registry, params, CompositorSettings::default())
    }

    #[must_use]
    pub fn with_settings(
        registry: &SharedGlowRegistry,
        params: BloomParameters,
        settings: CompositorSettings,
    ) -> Self {
        Self {
            params,
            settings,
            registry: registry.clone(),
            pool: FrameBufferPool::new(),
            glow_source: None,
            enabled: true,
            last_draw_count: 0,
            registry_version: None,
        }
    }

    // ── Configuration ──────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn params(&self) -> &BloomParameters {
        &self.params
    }

    /// Parameters are read at the image-effect hook; edits apply from the next frame run.
    #[inline]
    pub fn params_mut(&mut self) -> &mut BloomParameters {
        &mut self.params
    }

    pub fn set_params(&mut self, params: BloomParameters) {
        self.params = params;
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &CompositorSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SharedGlowRegistry {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn pool(&self) -> &FrameBufferPool {
        &self.pool
    }

    #[inline]
    #[must_use]
    pub fn glow_source(&self) -> Option<RenderTargetId> {
        self.glow_source
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    pub fn enable(&mut self) {
        if !self.enabled {
            log::info!("Bloom compositor enabled");
        }
        self.enabled = true;
    }

    /// Disables the effect and gives back the held glow buffer.
    pub fn disable<D>(&mut self, device: &mut D)
    where
        D: RenderDevice + ?Sized,
    {
        if self.enabled {
            log::info!("Bloom compositor disabled");
        }
        self.enabled = false;
        self.release_glow_source();
        self.pool.trim(device, self.settings.pool_trim_frames);
    }

    /// Disables the effect and destroys every pooled target.
    pub fn shutdown<D>(&mut self, device: &mut D)
    where
        D: RenderDevice + ?Sized,
    {
        self.disable(device);
        self.pool.clear(device);
    }

    fn release_glow_source(&mut self) {
        if let Some(previous) = self.glow_source.take() {
            self.pool.release(previous);
        }
    }

    // ── Frame hooks ────────────────────────────────────────────────────────

    /// Pre-cull hook: swaps the glow buffer for one matching `screen_size`.
    pub fn prepare<D>(&mut self, device: &mut D, screen_size: (u32, u32)) -> Result<()>
    where
        D: RenderDevice + ?Sized,
    {
        if !self.enabled {
            return Ok(());
        }

        // Trim before handing back the glow buffer so last frame's targets
        // are not aged by the swap itself.
        self.pool.trim(device, self.settings.pool_trim_frames);
        self.release_glow_source();

        let (width, height) = screen_size;
        let desc = RenderTargetDesc::color(width, height, TargetFormat::Default, GLOW_SOURCE_LABEL);
        self.glow_source = Some(self.pool.acquire(device, &desc)?);
        Ok(())
    }

    /// Pre-render hook: draws every registered glow object into the glow buffer.
    ///
    /// Returns the number of draws issued. Objects without a glow material are
    /// skipped.
    pub fn populate<D>(&mut self, device: &mut D) -> usize
    where
        D: RenderDevice + ?Sized,
    {
        self.last_draw_count = 0;
        if !self.enabled {
            return 0;
        }
        let Some(target) = self.glow_source else {
            return 0;
        };

        device.clear(target, Vec4::ZERO);

        let (version, draws) = self.registry.snapshot();
        if self.registry_version != Some(version) {
            log::debug!(
                "Glow registry changed (version {version}), {} objects to draw",
                draws.len()
            );
            self.registry_version = Some(version);
        }

        for draw in &draws {
            device.draw(target, draw);
        }

        self.last_draw_count = draws.len();
        draws.len()
    }

    /// Image-effect hook: blurs the glow buffer and composites into `destination`.
    ///
    /// Without a glow buffer (disabled, or `prepare` never ran) the source is
    /// copied through unchanged and `None` is returned.
    pub fn render_image<D>(
        &mut self,
        device: &mut D,
        source: RenderTargetId,
        destination: RenderTargetId,
    ) -> Result<Option<FrameReport>>
    where
        D: RenderDevice + ?Sized,
    {
        let glow = match self.glow_source {
            Some(glow) if self.enabled => glow,
            _ => {
                device.copy(source, destination);
                return Ok(None);
            }
        };

        let (glow_width, glow_height) = device
            .target_size(glow)
            .ok_or(GlowError::UnknownTarget(glow))?;

        let params = &self.params;
        let plan = PyramidPlan::new(glow_width, glow_height, params);
        let uniforms = BloomUniforms::new(params, &plan);
        let high_quality = params.high_quality();
        let anti_flicker = params.anti_flicker();
        let format = self.settings.blur_format();

        let mut scope = self.pool.scope(device);
        let mut blits = 0;

        // Prefilter
        let prefiltered = scope.acquire(&RenderTargetDesc::color(
            plan.working_width,
            plan.working_height,
            format,
            PREFILTER_LABEL,
        ))?;
        scope.device().blit(&Blit {
            source: glow,
            destination: prefiltered,
            base: None,
            pass: BloomPass::prefilter(anti_flicker),
            uniforms: &uniforms,
        });
        blits += 1;

        // Downsample chain
        let mut down: SmallVec<[RenderTargetId; MAX_ITERATIONS as usize]> = SmallVec::new();
        let mut last = prefiltered;
        for level in 0..plan.iterations {
            let (width, height) = plan.level_size(level);
            let target = scope.acquire(&RenderTargetDesc::color(
                width,
                height,
                format,
                DOWNSAMPLE_LABEL,
            ))?;

            let pass = if level == 0 {
                BloomPass::first_downsample(anti_flicker)
            } else {
                BloomPass::Downsample
            };
            scope.device().blit(&Blit {
                source: last,
                destination: target,
                base: None,
                pass,
                uniforms: &uniforms,
            });
            blits += 1;

            down.push(target);
            last = target;
        }

        // Upsample and combine, coarse to fine
        for level in (0..plan.upsample_steps()).rev() {
            let base = down[level as usize];
            let (width, height) = plan.level_size(level);
            let target = scope.acquire(&RenderTargetDesc::color(
                width,
                height,
                format,
                UPSAMPLE_LABEL,
            ))?;

            scope.device().blit(&Blit {
                source: last,
                destination: target,
                base: Some(base),
                pass: BloomPass::upsample(high_quality),
                uniforms: &uniforms,
            });
            blits += 1;

            last = target;
        }

        // Composite over the glow source
        scope.device().blit(&Blit {
            source: last,
            destination,
            base: Some(glow),
            pass: BloomPass::composite(high_quality),
            uniforms: &uniforms,
        });
        blits += 1;

        let temporary_targets = scope.held_count();
        drop(scope);

        Ok(Some(FrameReport {
            plan,
            glow_draws: self.last_draw_count,
            blits,
            temporary_targets,
            registry_version: self.registry_version.unwrap_or_default(),
        }))
    }

    /// Runs the three frame hooks in order.
    pub fn render_frame<D>(
        &mut self,
        device: &mut D,
        screen_size: (u32, u32),
        source: RenderTargetId,
        destination: RenderTargetId,
    ) -> Result<Option<FrameReport>>
    where
        D: RenderDevice + ?Sized,
    {
        self.prepare(device, screen_size)?;
        self.populate(device);
        self.render_image(device, source, destination)
    }
}

impl Drop for BloomCompositor {
    fn drop(&mut self) {
        self.release_glow_source();
        if self.pool.total_target_count() > 0 {
            log::warn!(
                "Bloom compositor dropped without shutdown(); {} pooled targets not destroyed",
                self.pool.total_target_count()
            );
        }
    }
}
