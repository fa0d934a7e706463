//! Error Types
//!
//! This module defines the error types used throughout the glow subsystem.
//!
//! # Overview
//!
//! The main error type [`GlowError`] covers the failure modes that are
//! reported back to the host:
//! - Render target allocation failures
//! - Material instantiation failures
//! - Configuration parsing errors
//!
//! Expected steady-state conditions (an object without a drawable, a
//! material without a glow shader variant, ...) are **not** errors. They are
//! described by [`GlowIssue`] and only ever logged.
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, GlowError>`.
//!
//! ```rust,ignore
//! use myth_glow::errors::Result;
//!
//! fn render(compositor: &mut BloomCompositor, device: &mut impl RenderDevice) -> Result<()> {
//!     compositor.prepare(device, (1920, 1080))?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::host::RenderTargetId;

/// The main error type for the glow subsystem.
#[derive(Error, Debug)]
pub enum GlowError {
    // ========================================================================
    // Render Target Errors
    // ========================================================================
    /// A render target was requested with a zero-sized extent.
    #[error("Invalid render target size: {width}x{height} ({label})")]
    InvalidTargetSize {
        /// Requested width in pixels
        width: u32,
        /// Requested height in pixels
        height: u32,
        /// Debug label of the request
        label: &'static str,
    },

    /// The host failed to create a render target.
    #[error("Failed to allocate render target '{label}': {reason}")]
    TargetAllocationFailed {
        /// Debug label of the request
        label: &'static str,
        /// Host-provided failure description
        reason: String,
    },

    /// A render target handle does not refer to a live target.
    #[error("Unknown render target: {0:?}")]
    UnknownTarget(RenderTargetId),

    // ========================================================================
    // Material Errors
    // ========================================================================
    /// The host failed to clone a material for glow rendering.
    #[error("Failed to instantiate glow material: {0}")]
    MaterialInstantiationFailed(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Alias for `Result<T, GlowError>`.
pub type Result<T> = std::result::Result<T, GlowError>;

/// Expected conditions that make an object skip or degrade glow rendering.
///
/// None of these abort anything: a handle reporting [`MissingDrawable`] or
/// [`MissingMaterial`] stays inert for its whole lifetime, and
/// [`MissingGlowShader`] falls back to the original shader.
///
/// [`MissingDrawable`]: GlowIssue::MissingDrawable
/// [`MissingMaterial`]: GlowIssue::MissingMaterial
/// [`MissingGlowShader`]: GlowIssue::MissingGlowShader
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlowIssue {
    /// The object has no drawable component.
    #[error("object has no drawable")]
    MissingDrawable,

    /// The object's drawable has no material (or the material has no shader).
    #[error("drawable has no material")]
    MissingMaterial,

    /// No glow variant exists for the material's shader.
    #[error("no glow shader variant, falling back to the original shader")]
    MissingGlowShader,
}
