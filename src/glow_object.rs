//! Glow Objects
//!
//! [`GlowObjectHandle`] is the per-object adapter between a renderable object
//! and the [`SharedGlowRegistry`]. It follows the object's lifecycle:
//!
//! | Host event  | Handle call                         | Effect                                  |
//! |-------------|-------------------------------------|-----------------------------------------|
//! | activation  | [`GlowObjectHandle::new`]           | resolve material, derive glow material  |
//! | enable      | [`GlowObjectHandle::enable`]        | register under the render queue         |
//! | disable     | [`GlowObjectHandle::disable`]       | unregister                              |
//! | teardown    | [`GlowObjectHandle::destroy`]       | destroy the derived glow material       |
//!
//! Glow shader resolution is a table lookup ([`GlowShaderTable`]): the host
//! registers which shader renders the glow variant of which original shader.
//! When no variant exists the original shader is reused, which still renders
//! the object into the glow buffer with its regular look.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::errors::{GlowIssue, Result};
use crate::host::{DrawableId, MaterialFlags, MaterialId, MaterialServer, ShaderId};
use crate::registry::{GlowEntry, GlowObjectId, SharedGlowRegistry};

/// Name suffix marking the glow variant of a shader: `"Standard"` → `"Standard (Bloom)"`.
pub const GLOW_SHADER_SUFFIX: &str = " (Bloom)";

/// Maps original shaders to their glow variants.
#[derive(Debug, Clone, Default)]
pub struct GlowShaderTable {
    variants: FxHashMap<ShaderId, ShaderId>,
}

impl GlowShaderTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table from the host's shader names using the
    /// [`GLOW_SHADER_SUFFIX`] naming convention.
    pub fn from_shader_names<'a, I>(shaders: I) -> Self
    where
        I: IntoIterator<Item = (ShaderId, &'a str)>,
    {
        let shaders: Vec<(ShaderId, &str)> = shaders.into_iter().collect();
        let by_name: FxHashMap<&str, ShaderId> =
            shaders.iter().map(|&(id, name)| (name, id)).collect();

        let mut table = Self::new();
        for &(id, name) in &shaders {
            let glow_name = format!("{name}{GLOW_SHADER_SUFFIX}");
            if let Some(&glow) = by_name.get(glow_name.as_str()) {
                table.insert(id, glow);
            }
        }
        table
    }

    /// Declares `glow` as the glow variant of `original`.
    pub fn insert(&mut self, original: ShaderId, glow: ShaderId) {
        self.variants.insert(original, glow);
    }

    /// The glow variant of `original`, if one is registered.
    #[must_use]
    pub fn resolve(&self, original: ShaderId) -> Option<ShaderId> {
        self.variants.get(&original).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// Registration state of a [`GlowObjectHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlowState {
    /// Ready, not registered.
    Disabled,
    /// Registered with the glow registry.
    Enabled,
    /// Never registers.
    Inert(GlowIssue),
}

/// One object's participation in selective bloom.
pub struct GlowObjectHandle {
    entry: Option<Arc<GlowEntry>>,
    sort_key: i32,
    registry: SharedGlowRegistry,
    state: GlowState,
    /// `true` when the glow material was derived here and must be destroyed here.
    owns_material: bool,
    /// Set when the handle works in a degraded mode (original shader fallback).
    degraded: Option<GlowIssue>,
}

impl GlowObjectHandle {
    /// Activates glow for an object, deriving its glow material.
    ///
    /// `drawable` is `None` for objects without a drawable component; such
    /// handles, and handles whose drawable has no material, are inert.
    pub fn new<M>(
        registry: &SharedGlowRegistry,
        name: impl Into<String>,
        drawable: Option<DrawableId>,
        materials: &mut M,
        shaders: &GlowShaderTable,
    ) -> Result<Self>
    where
        M: MaterialServer + ?Sized,
    {
        Self::with_glow_material(registry, name, drawable, None, materials, shaders)
    }

    /// Like [`new`](Self::new), but uses `glow_material` as-is when given.
    ///
    /// A supplied material stays owned by the caller and is not destroyed
    /// on teardown. It also registers drawables that have no material of
    /// their own. The sort key is then the render queue of the supplied
    /// material's shader, or `0` when it has none.
    pub fn with_glow_material<M>(
        registry: &SharedGlowRegistry,
        name: impl Into<String>,
        drawable: Option<DrawableId>,
        glow_material: Option<MaterialId>,
        materials: &mut M,
        shaders: &GlowShaderTable,
    ) -> Result<Self>
    where
        M: MaterialServer + ?Sized,
    {
        let name = name.into();

        let Some(drawable) = drawable else {
            return Ok(Self::inert(registry, &name, GlowIssue::MissingDrawable));
        };
        let original = materials
            .material_of(drawable)
            .and_then(|material| Some((material, materials.shader_of(material)?)));

        let sort_key = match (glow_material, original) {
            (_, Some((_, shader))) => materials.render_queue(shader),
            (Some(glow_material), None) => {
                let queue = materials
                    .shader_of(glow_material)
                    .map_or(0, |shader| materials.render_queue(shader));
                log::debug!(
                    "Glow object '{name}' has no material, drawing the supplied glow material (queue {queue})"
                );
                queue
            }
            (None, None) => {
                return Ok(Self::inert(registry, &name, GlowIssue::MissingMaterial));
            }
        };

        let mut handle = Self {
            entry: Some(GlowEntry::new(name, drawable)),
            sort_key,
            registry: registry.clone(),
            state: GlowState::Disabled,
            owns_material: false,
            degraded: None,
        };

        match (glow_material, original) {
            (Some(glow_material), _) => handle.set_entry_material(Some(glow_material)),
            (None, Some((material, shader))) => {
                handle.derive_glow_material(material, shader, materials, shaders)?;
            }
            (None, None) => {}
        }

        Ok(handle)
    }

    fn inert(registry: &SharedGlowRegistry, name: &str, issue: GlowIssue) -> Self {
        log::debug!("Glow object '{name}' is inert: {issue}");
        Self {
            entry: None,
            sort_key: 0,
            registry: registry.clone(),
            state: GlowState::Inert(issue),
            owns_material: false,
            degraded: None,
        }
    }

    fn derive_glow_material<M>(
        &mut self,
        original: MaterialId,
        shader: ShaderId,
        materials: &mut M,
        shaders: &GlowShaderTable,
    ) -> Result<()>
    where
        M: MaterialServer + ?Sized,
    {
        let glow_shader = match shaders.resolve(shader) {
            Some(glow_shader) => glow_shader,
            None => {
                log::warn!(
                    "Glow object '{}': {}",
                    self.name(),
                    GlowIssue::MissingGlowShader
                );
                self.degraded = Some(GlowIssue::MissingGlowShader);
                shader
            }
        };

        let derived = materials.instantiate(original, glow_shader, MaterialFlags::DONT_SAVE)?;
        self.set_entry_material(Some(derived));
        self.owns_material = true;
        Ok(())
    }

    fn set_entry_material(&self, material: Option<MaterialId>) {
        if let Some(entry) = &self.entry {
            entry.set_glow_material(material);
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Registers the object with the glow registry. No-op for inert handles.
    pub fn enable(&mut self) {
        if self.state != GlowState::Disabled {
            return;
        }
        if let Some(entry) = &self.entry {
            self.registry.add(self.sort_key, entry);
            self.state = GlowState::Enabled;
        }
    }

    /// Unregisters the object. No-op unless enabled.
    pub fn disable(&mut self) {
        if self.state != GlowState::Enabled {
            return;
        }
        if let Some(entry) = &self.entry {
            self.registry.remove(self.sort_key, entry);
        }
        self.state = GlowState::Disabled;
    }

    /// Tears the object down, destroying its derived glow material right away.
    pub fn destroy<M>(mut self, materials: &mut M)
    where
        M: MaterialServer + ?Sized,
    {
        if self.owns_material
            && let Some(material) = self.glow_material()
        {
            self.set_entry_material(None);
            materials.destroy_material(material);
        }
        self.owns_material = false;
        // Drop removes any registration still in place.
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn state(&self) -> GlowState {
        self.state
    }

    #[must_use]
    pub fn is_inert(&self) -> bool {
        matches!(self.state, GlowState::Inert(_))
    }

    /// Why the handle is inert or degraded, if it is.
    #[must_use]
    pub fn issue(&self) -> Option<GlowIssue> {
        match self.state {
            GlowState::Inert(issue) => Some(issue),
            _ => self.degraded,
        }
    }

    /// Render queue the handle registers under.
    #[must_use]
    pub fn sort_key(&self) -> i32 {
        self.sort_key
    }

    #[must_use]
    pub fn id(&self) -> Option<GlowObjectId> {
        self.entry.as_ref().map(|entry| entry.id())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.entry.as_ref().map_or("<inert>", |entry| entry.name())
    }

    #[must_use]
    pub fn entry(&self) -> Option<&Arc<GlowEntry>> {
        self.entry.as_ref()
    }

    #[must_use]
    pub fn glow_material(&self) -> Option<MaterialId> {
        self.entry.as_ref().and_then(|entry| entry.glow_material())
    }
}

impl Drop for GlowObjectHandle {
    fn drop(&mut self) {
        self.disable();
        if self.owns_material {
            log::warn!(
                "Glow object '{}' dropped without destroy(); its glow material was not released",
                self.name()
            );
        }
    }
}

impl std::fmt::Debug for GlowObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlowObjectHandle")
            .field("name", &self.name())
            .field("sort_key", &self.sort_key)
            .field("state", &self.state)
            .field("glow_material", &self.glow_material())
            .finish_non_exhaustive()
    }
}
