//! # Myth Glow
//!
//! Selective bloom post-processing: only objects that opt in glow.
//!
//! - [`registry`]: ordered index of glowing objects, shared as a service.
//! - [`glow_object`]: per-object adapter deriving glow materials and
//!   registering on enable.
//! - [`frame_pool`]: per-frame render target pool.
//! - [`compositor`]: glow buffer population and the bloom pyramid.
//! - [`host`]: the traits a host engine implements.
//! - [`software`]: a CPU implementation of the host traits for headless use
//!   and tests.
//!
//! ```rust,ignore
//! let registry = SharedGlowRegistry::new();
//! let mut compositor = BloomCompositor::new(&registry, BloomParameters::default());
//!
//! let mut lamp = GlowObjectHandle::new(&registry, "Lamp", Some(drawable), &mut materials, &shaders)?;
//! lamp.enable();
//!
//! // every frame
//! compositor.prepare(&mut device, (width, height))?;
//! compositor.populate(&mut device);
//! compositor.render_image(&mut device, scene_color, output)?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod compositor;
pub mod errors;
pub mod frame_pool;
pub mod glow_object;
pub mod host;
pub mod registry;
pub mod settings;
pub mod software;

pub use compositor::{
    BloomCompositor, BloomPass, BloomUniforms, CompositorSettings, FrameReport, PyramidPlan,
};
pub use errors::{GlowError, GlowIssue, Result};
pub use frame_pool::{FrameBufferPool, FrameScope, PoolStats};
pub use glow_object::{GlowObjectHandle, GlowShaderTable, GlowState};
pub use host::{
    Blit, DrawableId, GlowDraw, MaterialFlags, MaterialId, MaterialServer, RenderDevice,
    RenderTargetDesc, RenderTargetId, ShaderId, TargetFormat,
};
pub use registry::{GlowEntry, GlowObjectId, GlowRegistry, SharedGlowRegistry};
pub use settings::BloomParameters;
pub use software::{DeviceCommand, SoftImage, SoftRect, SoftwareDevice};
