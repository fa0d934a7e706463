//! Bloom Compositor Tests
//!
//! Tests for:
//! - populate: draw order (render queue, then registration), draw count, registry version
//! - render_image: pass sequence, working size in low quality, pyramid depth
//! - Pass inputs: base textures where the pass reads one, uploaded uniform block
//! - Energy: black in gives black out, a bright shape spreads glow around it
//! - Pool accounting: only the glow buffer survives a frame, targets are reused
//! - Disabled / missing glow buffer: source copied through unchanged
//! - Failure: allocation errors propagate without leaking pool targets
//! - Configuration from JSON

use glam::Vec4;

use myth_glow::{
    Blit, BloomCompositor, BloomParameters, BloomPass, BloomUniforms, CompositorSettings,
    DeviceCommand, DrawableId, FrameReport, GlowError, GlowObjectHandle, GlowShaderTable,
    RenderDevice, RenderTargetId, SharedGlowRegistry, SoftRect, SoftwareDevice, TargetFormat,
};

struct Fixture {
    device: SoftwareDevice,
    registry: SharedGlowRegistry,
    shaders: GlowShaderTable,
    handles: Vec<GlowObjectHandle>,
    source: RenderTargetId,
    destination: RenderTargetId,
    size: (u32, u32),
}

impl Fixture {
    fn new(width: u32, height: u32) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut device = SoftwareDevice::new();
        let source = device
            .create_image(width, height, TargetFormat::Default)
            .unwrap();
        let destination = device.create_image(width, height, TargetFormat::Hdr).unwrap();

        Self {
            device,
            registry: SharedGlowRegistry::new(),
            shaders: GlowShaderTable::new(),
            handles: Vec::new(),
            source,
            destination,
            size: (width, height),
        }
    }

    /// Adds an enabled glowing rectangle rendered by a shader with `queue`.
    fn glow_rect(&mut self, name: &str, rect: SoftRect, color: Vec4, queue: i32) -> DrawableId {
        let shader = self.device.add_shader(format!("{name} Shader"), queue);
        let material = self.device.add_material(shader, color);
        let drawable = self.device.add_drawable(rect, Some(material));

        let mut handle = GlowObjectHandle::new(
            &self.registry,
            name,
            Some(drawable),
            &mut self.device,
            &self.shaders,
        )
        .unwrap();
        handle.enable();
        self.handles.push(handle);
        drawable
    }

    fn compositor(&self, params: BloomParameters) -> BloomCompositor {
        BloomCompositor::new(&self.registry, params)
    }

    fn frame(&mut self, compositor: &mut BloomCompositor) -> myth_glow::Result<Option<FrameReport>> {
        compositor.render_frame(&mut self.device, self.size, self.source, self.destination)
    }

    fn output(&self) -> &[Vec4] {
        self.device.image(self.destination).unwrap().pixels()
    }

    fn output_at(&self, x: u32, y: u32) -> Vec4 {
        self.device.image(self.destination).unwrap().get(x, y)
    }

    fn finish(mut self, mut compositor: BloomCompositor) {
        compositor.shutdown(&mut self.device);
        for handle in self.handles.drain(..) {
            handle.destroy(&mut self.device);
        }
        assert!(self.registry.is_empty());
    }
}

fn white() -> Vec4 {
    Vec4::ONE
}

fn center_square() -> SoftRect {
    SoftRect::new(0.375, 0.375, 0.625, 0.625)
}

// ============================================================================
// Glow Buffer Population
// ============================================================================

#[test]
fn populate_draws_by_queue_then_registration() {
    let mut f = Fixture::new(32, 32);
    let late = f.glow_rect("late", SoftRect::full(), white(), 3000);
    let early_a = f.glow_rect("early_a", SoftRect::full(), white(), 1000);
    let early_b = f.glow_rect("early_b", SoftRect::full(), white(), 1000);
    let mut compositor = f.compositor(BloomParameters::default());

    compositor.prepare(&mut f.device, f.size).unwrap();
    let count = compositor.populate(&mut f.device);

    assert_eq!(count, 3);
    let order: Vec<DrawableId> = f.device.draws().iter().map(|d| d.drawable).collect();
    assert_eq!(order, [early_a, early_b, late]);

    let glow = compositor.glow_source().unwrap();
    assert!(matches!(
        f.device.commands().first(),
        Some(DeviceCommand::Clear { target }) if *target == glow
    ));
    f.finish(compositor);
}

#[test]
fn populate_skips_inert_objects() {
    let mut f = Fixture::new(32, 32);
    f.glow_rect("lamp", center_square(), white(), 2000);
    let bare = f.device.add_drawable(SoftRect::full(), None);
    let mut inert =
        GlowObjectHandle::new(&f.registry, "bare", Some(bare), &mut f.device, &f.shaders).unwrap();
    inert.enable();
    let mut compositor = f.compositor(BloomParameters::default());

    let report = f.frame(&mut compositor).unwrap().unwrap();

    assert_eq!(report.glow_draws, 1);
    assert_eq!(f.device.draws().len(), 1);
    f.finish(compositor);
}

#[test]
fn populate_renders_glow_material_colors() {
    let mut f = Fixture::new(16, 16);
    let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
    f.glow_rect("left", SoftRect::new(0.0, 0.0, 0.5, 1.0), red, 2000);
    let mut compositor = f.compositor(BloomParameters::default());

    compositor.prepare(&mut f.device, f.size).unwrap();
    compositor.populate(&mut f.device);

    let glow = f.device.image(compositor.glow_source().unwrap()).unwrap();
    assert_eq!(glow.get(2, 8), red);
    assert_eq!(glow.get(12, 8), Vec4::ZERO);
    f.finish(compositor);
}

#[test]
fn report_tracks_registry_version() {
    let mut f = Fixture::new(32, 32);
    f.glow_rect("lamp", center_square(), white(), 2000);
    let mut compositor = f.compositor(BloomParameters::default());

    let first = f.frame(&mut compositor).unwrap().unwrap();
    let unchanged = f.frame(&mut compositor).unwrap().unwrap();
    assert_eq!(first.registry_version, f.registry.version());
    assert_eq!(unchanged.registry_version, first.registry_version);

    f.glow_rect("sign", SoftRect::full(), white(), 2000);
    let changed = f.frame(&mut compositor).unwrap().unwrap();
    assert_ne!(changed.registry_version, first.registry_version);
    assert_eq!(changed.glow_draws, 2);
    f.finish(compositor);
}

// ============================================================================
// Pyramid
// ============================================================================

#[test]
fn high_quality_pass_sequence() {
    let mut f = Fixture::new(256, 256);
    f.glow_rect("lamp", center_square(), white(), 2000);
    let mut params = BloomParameters::default();
    params.set_radius(4.0);
    let mut compositor = f.compositor(params);

    let report = f.frame(&mut compositor).unwrap().unwrap();

    assert_eq!(report.plan.iterations, 4);
    assert_eq!(report.blits, 9);
    assert_eq!(report.temporary_targets, 8);
    assert_eq!(
        f.device.blit_passes(),
        [
            BloomPass::PrefilterAntiFlicker,
            BloomPass::DownsampleFirstAntiFlicker,
            BloomPass::Downsample,
            BloomPass::Downsample,
            BloomPass::Downsample,
            BloomPass::UpsampleTent,
            BloomPass::UpsampleTent,
            BloomPass::UpsampleTent,
            BloomPass::CompositeTent,
        ]
    );
    f.finish(compositor);
}

#[test]
fn upsample_chain_uses_matching_downsample_as_base() {
    let mut f = Fixture::new(256, 256);
    let mut params = BloomParameters::default();
    params.set_radius(4.0);
    params.set_anti_flicker(false);
    let mut compositor = f.compositor(params);

    f.frame(&mut compositor).unwrap().unwrap();

    let blits: Vec<_> = f
        .device
        .commands()
        .iter()
        .filter_map(|command| match command {
            DeviceCommand::Blit {
                destination, base, ..
            } => Some((*destination, *base)),
            _ => None,
        })
        .collect();

    // prefilter, down[0..4], up[2], up[1], up[0], composite
    let down: Vec<RenderTargetId> = blits[1..5].iter().map(|(d, _)| *d).collect();
    assert_eq!(blits[5].1, Some(down[2]));
    assert_eq!(blits[6].1, Some(down[1]));
    assert_eq!(blits[7].1, Some(down[0]));
    assert_eq!(blits[8].0, f.destination);
    assert_eq!(blits[8].1, compositor.glow_source());

    assert_eq!(f.device.target_size(down[0]), Some((128, 128)));
    assert_eq!(f.device.target_size(down[3]), Some((16, 16)));
    assert_eq!(f.device.target_size(blits[7].0), Some((128, 128)));
    f.finish(compositor);
}

#[test]
fn every_pass_receives_its_base_texture_and_uniform_block() {
    let mut f = Fixture::new(128, 128);
    f.glow_rect("lamp", center_square(), white(), 2000);
    let params = BloomParameters::default();
    let mut compositor = f.compositor(params.clone());

    let report = f.frame(&mut compositor).unwrap().unwrap();

    assert_eq!(f.device.mismatched_blit_count(), 0);
    let upload = f.device.uniform_upload();
    assert_eq!(upload.len(), 32);
    let uploaded: BloomUniforms = bytemuck::pod_read_unaligned(upload);
    assert_eq!(uploaded, BloomUniforms::new(&params, &report.plan));
    f.finish(compositor);
}

#[test]
fn blit_without_required_base_is_counted() {
    let mut f = Fixture::new(16, 16);
    let uniforms = BloomUniforms::default();

    f.device.blit(&Blit {
        source: f.source,
        destination: f.destination,
        base: None,
        pass: BloomPass::Upsample,
        uniforms: &uniforms,
    });
    f.device.blit(&Blit {
        source: f.source,
        destination: f.destination,
        base: Some(f.source),
        pass: BloomPass::Downsample,
        uniforms: &uniforms,
    });

    assert_eq!(f.device.mismatched_blit_count(), 2);
    assert_eq!(f.device.blit_passes().len(), 2);
}

#[test]
fn low_quality_halves_working_size() {
    let mut f = Fixture::new(256, 256);
    f.glow_rect("lamp", center_square(), white(), 2000);
    let mut params = BloomParameters::default();
    params.set_high_quality(false);
    let mut compositor = f.compositor(params);

    let report = f.frame(&mut compositor).unwrap().unwrap();

    assert_eq!(
        (report.plan.working_width, report.plan.working_height),
        (128, 128)
    );
    assert_eq!(report.plan.iterations, 1);
    assert_eq!(
        f.device.blit_passes(),
        [
            BloomPass::PrefilterAntiFlicker,
            BloomPass::DownsampleFirstAntiFlicker,
            BloomPass::Composite,
        ]
    );

    let prefiltered = f.device.commands().iter().find_map(|command| match command {
        DeviceCommand::Blit { destination, .. } => Some(*destination),
        _ => None,
    });
    assert_eq!(f.device.target_size(prefiltered.unwrap()), Some((128, 128)));
    f.finish(compositor);
}

#[test]
fn rgbm_settings_use_ldr_blur_buffers() {
    let mut f = Fixture::new(64, 64);
    let settings = CompositorSettings {
        use_rgbm: true,
        ..Default::default()
    };
    let mut compositor =
        BloomCompositor::with_settings(&f.registry, BloomParameters::default(), settings);

    f.frame(&mut compositor).unwrap().unwrap();

    let prefiltered = f
        .device
        .commands()
        .iter()
        .find_map(|command| match command {
            DeviceCommand::Blit { destination, .. } => Some(*destination),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        f.device.image(prefiltered).unwrap().format(),
        TargetFormat::Default
    );
    f.finish(compositor);
}

// ============================================================================
// Image Output
// ============================================================================

#[test]
fn no_glow_objects_produce_black_output() {
    let mut f = Fixture::new(64, 64);
    f.device.image_mut(f.source).unwrap().fill(Vec4::splat(0.5));
    f.device
        .image_mut(f.destination)
        .unwrap()
        .fill(Vec4::new(7.0, 3.0, 9.0, 1.0));
    let mut compositor = f.compositor(BloomParameters::default());

    let report = f.frame(&mut compositor).unwrap().unwrap();

    assert_eq!(report.glow_draws, 0);
    assert!(f.output().iter().all(|p| *p == Vec4::ZERO));
    f.finish(compositor);
}

#[test]
fn bright_shape_spreads_glow() {
    let mut f = Fixture::new(128, 128);
    f.glow_rect("lamp", center_square(), white(), 2000);
    let mut params = BloomParameters::default();
    params.set_radius(4.0);
    let mut compositor = f.compositor(params);

    f.frame(&mut compositor).unwrap().unwrap();

    // The square covers pixels 48..80 on both axes.
    let inside = f.output_at(64, 64);
    let near = f.output_at(44, 64);
    let far = f.output_at(0, 0);

    assert!(inside.x >= 1.0, "inside {inside}");
    assert!(near.x > 0.0, "near {near}");
    assert!(near.x > far.x, "near {near} far {far}");
    f.finish(compositor);
}

#[test]
fn zero_intensity_passes_glow_through() {
    let mut f = Fixture::new(32, 32);
    f.glow_rect("lamp", center_square(), white(), 2000);
    let mut params = BloomParameters::default();
    params.set_intensity(0.0);
    let mut compositor = f.compositor(params);

    f.frame(&mut compositor).unwrap().unwrap();

    let glow = f.device.image(compositor.glow_source().unwrap()).unwrap();
    assert_eq!(f.output(), glow.pixels());
    f.finish(compositor);
}

#[test]
fn dim_glow_below_threshold_adds_no_bloom() {
    let mut f = Fixture::new(32, 32);
    f.glow_rect("ember", center_square(), Vec4::new(0.1, 0.1, 0.1, 1.0), 2000);
    let mut params = BloomParameters::default();
    params.set_base_intensity(0.0);
    let mut compositor = f.compositor(params);

    f.frame(&mut compositor).unwrap().unwrap();

    assert!(f.output().iter().all(|p| p.x == 0.0 && p.y == 0.0 && p.z == 0.0));
    f.finish(compositor);
}

// ============================================================================
// Pool Accounting
// ============================================================================

#[test]
fn only_glow_buffer_survives_a_frame() {
    let mut f = Fixture::new(128, 128);
    f.glow_rect("lamp", center_square(), white(), 2000);
    let mut compositor = f.compositor(BloomParameters::default());

    f.frame(&mut compositor).unwrap().unwrap();
    assert_eq!(compositor.pool().active_count(), 1);
    assert!(compositor.pool().is_active(compositor.glow_source().unwrap()));
    let created = compositor.pool().stats().created;

    for _ in 0..3 {
        f.frame(&mut compositor).unwrap().unwrap();
    }

    let stats = compositor.pool().stats();
    assert_eq!(compositor.pool().active_count(), 1);
    assert_eq!(stats.acquired - stats.released, 1);
    assert_eq!(stats.rejected_releases, 0);
    assert_eq!(stats.created, created);
    f.finish(compositor);
}

#[test]
fn zero_trim_window_reuses_targets_every_frame() {
    let mut f = Fixture::new(64, 64);
    f.glow_rect("lamp", center_square(), white(), 2000);
    let mut compositor = BloomCompositor::with_settings(
        &f.registry,
        BloomParameters::default(),
        CompositorSettings {
            pool_trim_frames: 0,
            ..Default::default()
        },
    );

    f.frame(&mut compositor).unwrap().unwrap();
    let created = compositor.pool().stats().created;

    for _ in 0..5 {
        f.frame(&mut compositor).unwrap().unwrap();
    }

    let stats = compositor.pool().stats();
    assert_eq!(stats.created, created, "{stats:?}");
    assert_eq!(stats.destroyed, 0);
    f.finish(compositor);
}

#[test]
fn resize_trims_stale_targets() {
    let mut f = Fixture::new(64, 64);
    let mut compositor = BloomCompositor::with_settings(
        &f.registry,
        BloomParameters::default(),
        CompositorSettings {
            pool_trim_frames: 2,
            ..Default::default()
        },
    );

    f.frame(&mut compositor).unwrap().unwrap();
    assert_eq!(compositor.pool().stats().destroyed, 0);

    let small = f.device.create_image(32, 32, TargetFormat::Hdr).unwrap();
    for _ in 0..6 {
        compositor
            .render_frame(&mut f.device, (32, 32), f.source, small)
            .unwrap()
            .unwrap();
    }

    // The 64x64 glow and prefilter buffers went unused for more than two frames.
    let stats = compositor.pool().stats();
    assert!(stats.destroyed >= 2, "{stats:?}");
    assert_eq!(stats.rejected_releases, 0);
    f.finish(compositor);
}

#[test]
fn shutdown_destroys_pooled_targets() {
    let mut f = Fixture::new(64, 64);
    let mut compositor = f.compositor(BloomParameters::default());
    f.frame(&mut compositor).unwrap().unwrap();

    compositor.shutdown(&mut f.device);

    assert!(!compositor.is_enabled());
    assert_eq!(compositor.pool().total_target_count(), 0);
    assert_eq!(f.device.live_target_count(), 2);
    f.finish(compositor);
}

// ============================================================================
// Copy-Through and Failures
// ============================================================================

#[test]
fn disabled_compositor_copies_source() {
    let mut f = Fixture::new(32, 32);
    f.glow_rect("lamp", center_square(), white(), 2000);
    f.device.image_mut(f.source).unwrap().fill(Vec4::splat(0.25));
    let mut compositor = f.compositor(BloomParameters::default());
    compositor.disable(&mut f.device);

    let report = f.frame(&mut compositor).unwrap();

    assert!(report.is_none());
    assert!(f.device.draws().is_empty());
    assert!(f.output().iter().all(|p| *p == Vec4::splat(0.25)));
    assert!(matches!(
        f.device.commands().last(),
        Some(DeviceCommand::Copy { .. })
    ));

    compositor.enable();
    assert!(f.frame(&mut compositor).unwrap().is_some());
    f.finish(compositor);
}

#[test]
fn render_without_prepare_copies_source() {
    let mut f = Fixture::new(16, 16);
    let mut compositor = f.compositor(BloomParameters::default());

    let report = compositor
        .render_image(&mut f.device, f.source, f.destination)
        .unwrap();

    assert!(report.is_none());
    assert_eq!(f.device.blit_passes().len(), 0);
    f.finish(compositor);
}

#[test]
fn zero_sized_screen_is_an_error() {
    let mut f = Fixture::new(16, 16);
    let mut compositor = f.compositor(BloomParameters::default());

    let err = compositor.prepare(&mut f.device, (0, 0)).unwrap_err();

    assert!(matches!(err, GlowError::InvalidTargetSize { .. }));
    assert_eq!(compositor.glow_source(), None);
    f.finish(compositor);
}

#[test]
fn allocation_failure_leaks_nothing() {
    let mut f = Fixture::new(64, 64);
    f.glow_rect("lamp", center_square(), white(), 2000);
    let mut compositor = f.compositor(BloomParameters::default());

    compositor.prepare(&mut f.device, f.size).unwrap();
    compositor.populate(&mut f.device);
    f.device.set_fail_allocations(true);

    let err = compositor
        .render_image(&mut f.device, f.source, f.destination)
        .unwrap_err();

    assert!(matches!(err, GlowError::TargetAllocationFailed { .. }));
    assert_eq!(compositor.pool().active_count(), 1);
    assert_eq!(compositor.pool().stats().rejected_releases, 0);

    f.device.set_fail_allocations(false);
    assert!(f.frame(&mut compositor).unwrap().is_some());
    assert_eq!(compositor.pool().active_count(), 1);
    f.finish(compositor);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn parameters_from_json_drive_the_pyramid() {
    let mut f = Fixture::new(256, 256);
    let params =
        BloomParameters::from_json(r#"{ "radius": 4.0, "high_quality": false }"#).unwrap();
    let mut compositor = f.compositor(params);

    let report = f.frame(&mut compositor).unwrap().unwrap();

    // 256 → working height 128: log2(128) + 4 - 8 = 3
    assert_eq!(report.plan.iterations, 3);
    assert!((report.plan.sample_scale - 0.5).abs() < 1e-5);
    f.finish(compositor);
}

#[test]
fn params_edits_apply_next_frame() {
    let mut f = Fixture::new(256, 256);
    let mut compositor = f.compositor(BloomParameters::default());

    let before = f.frame(&mut compositor).unwrap().unwrap();
    compositor.params_mut().set_radius(7.0);
    let after = f.frame(&mut compositor).unwrap().unwrap();

    assert!(after.plan.iterations > before.plan.iterations);
    f.finish(compositor);
}
