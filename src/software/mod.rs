//! Software Device
//!
//! A CPU implementation of [`RenderDevice`] and [`MaterialServer`].
//!
//! Render targets are plain `Vec<Vec4>` images, drawables are axis-aligned
//! rectangles in normalized screen coordinates, and materials are flat
//! colors. That is enough to run the whole selective bloom pipeline headless
//! and to check what reached the glow buffer and the output image.
//!
//! Every command is appended to a log ([`SoftwareDevice::commands`]) so the
//! order of draws and passes can be asserted directly.
//!
//! ```rust,ignore
//! let mut device = SoftwareDevice::new();
//! let shader = device.add_shader("Unlit", 2000);
//! let material = device.add_material(shader, Vec4::ONE);
//! let quad = device.add_drawable(SoftRect::new(0.25, 0.25, 0.75, 0.75), Some(material));
//! ```

mod filters;

use glam::{Vec2, Vec4};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::compositor::{BloomPass, BloomUniforms};
use crate::errors::{GlowError, Result};
use crate::host::{
    Blit, DrawableId, GlowDraw, MaterialFlags, MaterialId, MaterialServer, RenderDevice,
    RenderTargetDesc, RenderTargetId, ShaderId, TargetFormat,
};

// ─── Images ───────────────────────────────────────────────────────────────────

/// A CPU render target.
#[derive(Clone, Debug, PartialEq)]
pub struct SoftImage {
    width: u32,
    height: u32,
    format: TargetFormat,
    pixels: Vec<Vec4>,
}

impl SoftImage {
    /// Creates a transparent black image.
    #[must_use]
    pub fn new(width: u32, height: u32, format: TargetFormat) -> Self {
        Self {
            width,
            height,
            format,
            pixels: vec![Vec4::ZERO; (width * height) as usize],
        }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> TargetFormat {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    #[inline]
    #[must_use]
    pub fn texel_size(&self) -> Vec2 {
        Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32)
    }

    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Writes a pixel, clamping to `[0, 1]` for LDR formats.
    pub fn set(&mut self, x: u32, y: u32, color: Vec4) {
        let index = (y * self.width + x) as usize;
        self.pixels[index] = self.encode(color);
    }

    /// Fills the whole image with one color.
    pub fn fill(&mut self, color: Vec4) {
        let color = self.encode(color);
        self.pixels.fill(color);
    }

    /// Largest RGB channel value in the image.
    #[must_use]
    pub fn max_rgb(&self) -> f32 {
        self.pixels
            .iter()
            .map(|p| p.x.max(p.y).max(p.z))
            .fold(0.0, f32::max)
    }

    fn encode(&self, color: Vec4) -> Vec4 {
        if self.format.is_ldr() {
            color.clamp(Vec4::ZERO, Vec4::ONE)
        } else {
            color
        }
    }

    fn replace_pixels(&mut self, pixels: Vec<Vec4>) {
        debug_assert_eq!(pixels.len(), self.pixels.len());
        self.pixels = pixels;
        if self.format.is_ldr() {
            for p in &mut self.pixels {
                *p = p.clamp(Vec4::ZERO, Vec4::ONE);
            }
        }
    }

    #[inline]
    fn texel_clamped(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, i64::from(self.width) - 1) as u32;
        let y = y.clamp(0, i64::from(self.height) - 1) as u32;
        self.get(x, y)
    }

    /// Bilinear sample with clamp-to-edge addressing.
    #[must_use]
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let x = uv.x * self.width as f32 - 0.5;
        let y = uv.y * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (ix, iy) = (x0 as i64, y0 as i64);

        let top = self
            .texel_clamped(ix, iy)
            .lerp(self.texel_clamped(ix + 1, iy), fx);
        let bottom = self
            .texel_clamped(ix, iy + 1)
            .lerp(self.texel_clamped(ix + 1, iy + 1), fx);
        top.lerp(bottom, fy)
    }
}

// ─── Scene Data ───────────────────────────────────────────────────────────────

/// Axis-aligned rectangle in normalized `[0, 1]` screen coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SoftRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl SoftRect {
    #[must_use]
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min: Vec2::new(min_x, min_y),
            max: Vec2::new(max_x, max_y),
        }
    }

    /// The whole screen.
    #[must_use]
    pub fn full() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    #[inline]
    fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.y >= self.min.y && p.x < self.max.x && p.y < self.max.y
    }
}

#[derive(Clone, Debug)]
struct SoftShader {
    name: String,
    render_queue: i32,
}

#[derive(Clone, Debug)]
struct SoftMaterial {
    shader: ShaderId,
    color: Vec4,
    flags: MaterialFlags,
}

#[derive(Clone, Debug)]
struct SoftDrawable {
    rect: SoftRect,
    material: Option<MaterialId>,
}

/// One recorded device command.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCommand {
    Clear {
        target: RenderTargetId,
    },
    Draw {
        target: RenderTargetId,
        draw: GlowDraw,
    },
    Blit {
        source: RenderTargetId,
        destination: RenderTargetId,
        base: Option<RenderTargetId>,
        pass: BloomPass,
    },
    Copy {
        source: RenderTargetId,
        destination: RenderTargetId,
    },
}

// ─── Device ───────────────────────────────────────────────────────────────────

/// CPU render device and material server.
#[derive(Default)]
pub struct SoftwareDevice {
    targets: SlotMap<RenderTargetId, SoftImage>,
    shaders: FxHashMap<ShaderId, SoftShader>,
    materials: FxHashMap<MaterialId, SoftMaterial>,
    drawables: FxHashMap<DrawableId, SoftDrawable>,
    next_id: u64,
    commands: Vec<DeviceCommand>,
    created_targets: u64,
    destroyed_targets: u64,
    mismatched_blits: u64,
    uniform_upload: Vec<u8>,
    fail_allocations: bool,
}

impl SoftwareDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // ── Scene setup ────────────────────────────────────────────────────────

    pub fn add_shader(&mut self, name: impl Into<String>, render_queue: i32) -> ShaderId {
        let id = ShaderId(self.next_id());
        self.shaders.insert(
            id,
            SoftShader {
                name: name.into(),
                render_queue,
            },
        );
        id
    }

    #[must_use]
    pub fn shader_by_name(&self, name: &str) -> Option<ShaderId> {
        self.shaders
            .iter()
            .find(|(_, shader)| shader.name == name)
            .map(|(&id, _)| id)
    }

    /// All shaders with their names, in id order.
    #[must_use]
    pub fn shaders(&self) -> Vec<(ShaderId, &str)> {
        let mut shaders: Vec<(ShaderId, &str)> = self
            .shaders
            .iter()
            .map(|(&id, shader)| (id, shader.name.as_str()))
            .collect();
        shaders.sort_by_key(|&(id, _)| id);
        shaders
    }

    pub fn add_material(&mut self, shader: ShaderId, color: Vec4) -> MaterialId {
        let id = MaterialId(self.next_id());
        self.materials.insert(
            id,
            SoftMaterial {
                shader,
                color,
                flags: MaterialFlags::empty(),
            },
        );
        id
    }

    #[must_use]
    pub fn has_material(&self, material: MaterialId) -> bool {
        self.materials.contains_key(&material)
    }

    #[must_use]
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    #[must_use]
    pub fn material_color(&self, material: MaterialId) -> Option<Vec4> {
        self.materials.get(&material).map(|m| m.color)
    }

    #[must_use]
    pub fn material_flags(&self, material: MaterialId) -> Option<MaterialFlags> {
        self.materials.get(&material).map(|m| m.flags)
    }

    pub fn add_drawable(&mut self, rect: SoftRect, material: Option<MaterialId>) -> DrawableId {
        let id = DrawableId(self.next_id());
        self.drawables.insert(id, SoftDrawable { rect, material });
        id
    }

    // ── Targets ────────────────────────────────────────────────────────────

    /// Creates a target outside of any pool (e.g. the host's scene color).
    pub fn create_image(&mut self, width: u32, height: u32, format: TargetFormat) -> Result<RenderTargetId> {
        self.create_target(&RenderTargetDesc::color(width, height, format, "Software Image"))
    }

    #[must_use]
    pub fn image(&self, target: RenderTargetId) -> Option<&SoftImage> {
        self.targets.get(target)
    }

    pub fn image_mut(&mut self, target: RenderTargetId) -> Option<&mut SoftImage> {
        self.targets.get_mut(target)
    }

    #[must_use]
    pub fn live_target_count(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn created_target_count(&self) -> u64 {
        self.created_targets
    }

    #[must_use]
    pub fn destroyed_target_count(&self) -> u64 {
        self.destroyed_targets
    }

    /// Blits whose base texture did not match what the pass reads.
    #[must_use]
    pub fn mismatched_blit_count(&self) -> u64 {
        self.mismatched_blits
    }

    /// Bytes of the uniform block uploaded by the most recent blit.
    #[must_use]
    pub fn uniform_upload(&self) -> &[u8] {
        &self.uniform_upload
    }

    /// Makes every following `create_target` call fail.
    pub fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    // ── Command log ────────────────────────────────────────────────────────

    #[must_use]
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Draws recorded so far, in submission order.
    #[must_use]
    pub fn draws(&self) -> Vec<GlowDraw> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                DeviceCommand::Draw { draw, .. } => Some(*draw),
                _ => None,
            })
            .collect()
    }

    /// Passes recorded so far, in submission order.
    #[must_use]
    pub fn blit_passes(&self) -> Vec<BloomPass> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                DeviceCommand::Blit { pass, .. } => Some(*pass),
                _ => None,
            })
            .collect()
    }
}

impl RenderDevice for SoftwareDevice {
    fn create_target(&mut self, desc: &RenderTargetDesc) -> Result<RenderTargetId> {
        desc.validate()?;
        if self.fail_allocations {
            return Err(GlowError::TargetAllocationFailed {
                label: desc.label,
                reason: "software device allocations disabled".to_string(),
            });
        }

        self.created_targets += 1;
        Ok(self
            .targets
            .insert(SoftImage::new(desc.width, desc.height, desc.format)))
    }

    fn destroy_target(&mut self, target: RenderTargetId) {
        if self.targets.remove(target).is_some() {
            self.destroyed_targets += 1;
        } else {
            log::warn!("Software device: destroy of unknown target {target:?}");
        }
    }

    fn target_size(&self, target: RenderTargetId) -> Option<(u32, u32)> {
        self.targets.get(target).map(|image| (image.width, image.height))
    }

    fn clear(&mut self, target: RenderTargetId, color: Vec4) {
        self.commands.push(DeviceCommand::Clear { target });
        if let Some(image) = self.targets.get_mut(target) {
            image.fill(color);
        }
    }

    fn draw(&mut self, target: RenderTargetId, draw: &GlowDraw) {
        self.commands.push(DeviceCommand::Draw {
            target,
            draw: *draw,
        });

        let Some(rect) = self.drawables.get(&draw.drawable).map(|d| d.rect) else {
            return;
        };
        let Some(color) = self.material_color(draw.material) else {
            return;
        };
        let Some(image) = self.targets.get_mut(target) else {
            return;
        };

        let size = Vec2::new(image.width as f32, image.height as f32);
        for y in 0..image.height {
            for x in 0..image.width {
                let center = (Vec2::new(x as f32, y as f32) + 0.5) / size;
                if rect.contains(center) {
                    let dst = image.get(x, y);
                    let a = color.w;
                    let rgb = color.truncate() * a + dst.truncate() * (1.0 - a);
                    image.set(x, y, rgb.extend(a + dst.w * (1.0 - a)));
                }
            }
        }
    }

    fn blit(&mut self, blit: &Blit<'_>) {
        self.commands.push(DeviceCommand::Blit {
            source: blit.source,
            destination: blit.destination,
            base: blit.base,
            pass: blit.pass,
        });

        let label = blit.pass.label();
        if blit.pass.uses_base_texture() != blit.base.is_some() {
            log::warn!(
                "Software device: '{label}' expects a base texture: {}, got {:?}",
                blit.pass.uses_base_texture(),
                blit.base
            );
            self.mismatched_blits += 1;
        }

        let Some((width, height)) = self.target_size(blit.destination) else {
            log::warn!("Software device: '{label}' into unknown target {:?}", blit.destination);
            return;
        };
        let Some(source) = self.targets.get(blit.source) else {
            log::warn!("Software device: '{label}' from unknown target {:?}", blit.source);
            return;
        };
        let base = blit
            .base
            .filter(|_| blit.pass.uses_base_texture())
            .and_then(|base| self.targets.get(base));

        // Passes read their uniforms back from the upload buffer.
        self.uniform_upload.clear();
        self.uniform_upload.extend_from_slice(blit.uniforms.as_bytes());
        let uniforms = match bytemuck::try_pod_read_unaligned::<BloomUniforms>(&self.uniform_upload)
        {
            Ok(uniforms) => uniforms,
            Err(err) => {
                log::warn!("Software device: '{label}' uniform upload rejected: {err}");
                return;
            }
        };

        let pixels = filters::run_pass(blit.pass, source, base, width, height, &uniforms);
        if let Some(destination) = self.targets.get_mut(blit.destination) {
            destination.replace_pixels(pixels);
        }
    }

    fn copy(&mut self, source: RenderTargetId, destination: RenderTargetId) {
        self.commands.push(DeviceCommand::Copy {
            source,
            destination,
        });

        let (Some(src), Some((width, height))) =
            (self.targets.get(source), self.target_size(destination))
        else {
            return;
        };
        let pixels = filters::resample(src, width, height);
        if let Some(dst) = self.targets.get_mut(destination) {
            dst.replace_pixels(pixels);
        }
    }
}

impl MaterialServer for SoftwareDevice {
    fn material_of(&self, drawable: DrawableId) -> Option<MaterialId> {
        self.drawables.get(&drawable).and_then(|d| d.material)
    }

    fn shader_of(&self, material: MaterialId) -> Option<ShaderId> {
        self.materials
            .get(&material)
            .map(|m| m.shader)
            .filter(|shader| self.shaders.contains_key(shader))
    }

    fn render_queue(&self, shader: ShaderId) -> i32 {
        self.shaders.get(&shader).map_or(0, |s| s.render_queue)
    }

    fn instantiate(
        &mut self,
        original: MaterialId,
        shader: ShaderId,
        flags: MaterialFlags,
    ) -> Result<MaterialId> {
        let Some(source) = self.materials.get(&original) else {
            return Err(GlowError::MaterialInstantiationFailed(format!(
                "unknown material {original:?}"
            )));
        };

        let material = SoftMaterial {
            shader,
            color: source.color,
            flags,
        };
        let id = MaterialId(self.next_id());
        self.materials.insert(id, material);
        Ok(id)
    }

    fn destroy_material(&mut self, material: MaterialId) {
        self.materials.remove(&material);
    }
}
