//! Headless Glow Demo
//!
//! Renders a small scene with two glowing objects and one non-glowing object
//! on the software device, then prints the composited image as ASCII art.
//!
//! ```text
//! cargo run -p headless_glow -- [params.json]
//! ```
//!
//! The optional JSON file overrides bloom parameters, e.g.
//! `{ "radius": 5.0, "intensity": 1.5 }`.

use anyhow::Context;
use glam::Vec4;
use log::LevelFilter;

use myth_glow::glow_object::GLOW_SHADER_SUFFIX;
use myth_glow::{
    BloomCompositor, BloomParameters, GlowObjectHandle, GlowShaderTable, SharedGlowRegistry,
    SoftImage, SoftRect, SoftwareDevice, TargetFormat,
};

const WIDTH: u32 = 96;
const HEIGHT: u32 = 48;
const FRAMES: u32 = 3;

const RAMP: &[u8] = b" .:-=+*#%@";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .init();

    let params = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading bloom parameters from {path}"))?;
            BloomParameters::from_json(&json)?
        }
        None => BloomParameters::default(),
    };
    log::info!("Bloom parameters: {params:?}");

    let mut device = SoftwareDevice::new();

    // Shaders: "Standard" has a glow variant, "Unlit" does not.
    let standard = device.add_shader("Standard", 2000);
    device.add_shader(format!("Standard{GLOW_SHADER_SUFFIX}"), 2000);
    let unlit = device.add_shader("Unlit", 3000);
    let shaders = GlowShaderTable::from_shader_names(device.shaders());

    let orange = device.add_material(standard, Vec4::new(1.0, 0.6, 0.1, 1.0));
    let cyan = device.add_material(unlit, Vec4::new(0.2, 1.0, 1.0, 1.0));

    let lamp = device.add_drawable(SoftRect::new(0.15, 0.3, 0.3, 0.7), Some(orange));
    let sign = device.add_drawable(SoftRect::new(0.55, 0.4, 0.85, 0.55), Some(cyan));
    let wall = device.add_drawable(SoftRect::new(0.4, 0.1, 0.45, 0.9), Some(orange));

    let registry = SharedGlowRegistry::new();
    let mut compositor = BloomCompositor::new(&registry, params);

    let mut handles = vec![
        GlowObjectHandle::new(&registry, "Lamp", Some(lamp), &mut device, &shaders)?,
        GlowObjectHandle::new(&registry, "Sign", Some(sign), &mut device, &shaders)?,
    ];
    for handle in &mut handles {
        handle.enable();
    }
    log::info!(
        "{} glow objects registered; '{:?}' is not glowing",
        registry.len(),
        wall
    );

    let scene_color = device.create_image(WIDTH, HEIGHT, TargetFormat::Default)?;
    let output = device.create_image(WIDTH, HEIGHT, TargetFormat::Hdr)?;

    for frame in 0..FRAMES {
        device.take_commands();
        let report = compositor.render_frame(&mut device, (WIDTH, HEIGHT), scene_color, output)?;
        if let Some(report) = report {
            log::info!(
                "Frame {frame}: {} draws, {} passes, {} temporary targets, {} pyramid levels",
                report.glow_draws,
                report.blits,
                report.temporary_targets,
                report.plan.iterations,
            );
        }
    }

    let stats = compositor.pool().stats();
    log::info!(
        "Pool: {} created, {} acquired, {} released, {} live",
        stats.created,
        stats.acquired,
        stats.released,
        compositor.pool().total_target_count()
    );

    let image = device
        .image(output)
        .context("output image missing from the device")?;
    print_ascii(image);

    compositor.shutdown(&mut device);
    for handle in handles {
        handle.destroy(&mut device);
    }
    registry.shutdown();

    Ok(())
}

fn print_ascii(image: &SoftImage) {
    let peak = image.max_rgb().max(1e-5);
    for y in 0..image.height() {
        let line: String = (0..image.width())
            .map(|x| {
                let p = image.get(x, y);
                let v = p.x.max(p.y).max(p.z) / peak;
                let index = (v * (RAMP.len() - 1) as f32).round() as usize;
                RAMP[index.min(RAMP.len() - 1)] as char
            })
            .collect();
        println!("{line}");
    }
}
