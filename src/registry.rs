//! Glow Registry
//!
//! Ordered index of every object that currently wants to glow.
//!
//! Entries are bucketed by an integer sort key (the render queue of the
//! object's material) so the compositor draws them in a deterministic order:
//! ascending sort key, and insertion order within a key. Objects sharing a
//! render queue overdraw each other in the glow buffer, so this order is
//! observable in the final image.
//!
//! # Sharing
//!
//! The registry is an explicit service: the application creates one
//! [`SharedGlowRegistry`] at startup and hands clones of it to the
//! compositor and to every [`GlowObjectHandle`]. Mutations happen between
//! frames (object enable/disable); the compositor takes a consistent
//! snapshot of the draw list once per frame.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 GlowRegistry                     │
//! │                                                  │
//! │  buckets: BTreeMap<i32, Vec<Arc<GlowEntry>>>     │
//! │  keys:    HashMap<GlowObjectId, i32>             │
//! │                                                  │
//! │  add(key, entry)     O(log n) + O(k)             │
//! │  remove(key, entry)  O(log n) + O(k)             │
//! │  iter()              ascending key, stable       │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! [`GlowObjectHandle`]: crate::glow_object::GlowObjectHandle

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashMap;

use crate::host::{DrawableId, GlowDraw, MaterialId};

static NEXT_GLOW_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a glowing object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlowObjectId(u64);

impl GlowObjectId {
    fn next() -> Self {
        Self(NEXT_GLOW_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Registry-visible state of one glowing object.
///
/// Shared (`Arc`) between the object's handle, which owns the glow material,
/// and the registry, which only reads it.
#[derive(Debug)]
pub struct GlowEntry {
    id: GlowObjectId,
    name: String,
    drawable: DrawableId,
    glow_material: RwLock<Option<MaterialId>>,
}

impl GlowEntry {
    /// Creates an entry for `drawable`, initially without a glow material.
    #[must_use]
    pub fn new(name: impl Into<String>, drawable: DrawableId) -> Arc<Self> {
        Arc::new(Self {
            id: GlowObjectId::next(),
            name: name.into(),
            drawable,
            glow_material: RwLock::new(None),
        })
    }

    /// Creates an entry that draws with an existing material.
    #[must_use]
    pub fn with_material(
        name: impl Into<String>,
        drawable: DrawableId,
        material: MaterialId,
    ) -> Arc<Self> {
        let entry = Self::new(name, drawable);
        entry.set_glow_material(Some(material));
        entry
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> GlowObjectId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn drawable(&self) -> DrawableId {
        self.drawable
    }

    #[inline]
    #[must_use]
    pub fn glow_material(&self) -> Option<MaterialId> {
        *self.glow_material.read()
    }

    pub fn set_glow_material(&self, material: Option<MaterialId>) {
        *self.glow_material.write() = material;
    }

    /// The draw this entry contributes to the glow buffer, if it has a material.
    #[must_use]
    pub fn glow_draw(&self) -> Option<GlowDraw> {
        self.glow_material()
            .map(|material| GlowDraw::new(self.drawable, material))
    }
}

/// Ordered index of glowing objects, keyed by render order.
#[derive(Debug, Default)]
pub struct GlowRegistry {
    buckets: BTreeMap<i32, Vec<Arc<GlowEntry>>>,
    /// Reverse index so re-registration under a different key is cheap.
    keys: FxHashMap<GlowObjectId, i32>,
    /// Bumped on every mutation.
    version: u64,
}

impl GlowRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` under `sort_key`.
    ///
    /// Any previous registration of the same entry, under any key, is
    /// removed first, so calling this twice leaves exactly one registration.
    pub fn add(&mut self, sort_key: i32, entry: &Arc<GlowEntry>) {
        if let Some(previous_key) = self.keys.get(&entry.id()).copied() {
            self.remove(previous_key, entry);
        }

        self.buckets
            .entry(sort_key)
            .or_default()
            .push(Arc::clone(entry));
        self.keys.insert(entry.id(), sort_key);
        self.version = self.version.wrapping_add(1);

        log::debug!("Added glow object '{}' (queue {})", entry.name(), sort_key);
    }

    /// Removes `entry` from the `sort_key` bucket.
    ///
    /// Returns `false` (and does nothing) if it was not registered there.
    pub fn remove(&mut self, sort_key: i32, entry: &GlowEntry) -> bool {
        let Some(bucket) = self.buckets.get_mut(&sort_key) else {
            return false;
        };
        let Some(position) = bucket.iter().position(|e| e.id() == entry.id()) else {
            return false;
        };

        bucket.remove(position);
        if bucket.is_empty() {
            self.buckets.remove(&sort_key);
        }
        if self.keys.get(&entry.id()) == Some(&sort_key) {
            self.keys.remove(&entry.id());
        }
        self.version = self.version.wrapping_add(1);

        log::debug!("Removed glow object '{}' (queue {})", entry.name(), sort_key);
        true
    }

    /// All registrations in draw order: ascending sort key, then insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &Arc<GlowEntry>)> + '_ {
        self.buckets
            .iter()
            .flat_map(|(&key, bucket)| bucket.iter().map(move |entry| (key, entry)))
    }

    /// Draws for every registered entry that has a glow material, in draw order.
    #[must_use]
    pub fn draw_list(&self) -> Vec<GlowDraw> {
        self.iter()
            .filter_map(|(_, entry)| entry.glow_draw())
            .collect()
    }

    /// Sort key an entry is registered under.
    #[must_use]
    pub fn sort_key_of(&self, id: GlowObjectId) -> Option<i32> {
        self.keys.get(&id).copied()
    }

    #[must_use]
    pub fn contains(&self, id: GlowObjectId) -> bool {
        self.keys.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Counter bumped by every change to the registrations.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Drops every registration.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.keys.clear();
        self.version = self.version.wrapping_add(1);
    }
}

/// Cloneable handle to the application's glow registry.
#[derive(Clone, Debug, Default)]
pub struct SharedGlowRegistry {
    inner: Arc<RwLock<GlowRegistry>>,
}

impl SharedGlowRegistry {
    /// Creates the registry service. Call once during application init.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, GlowRegistry> {
        self.inner.read()
    }

    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, GlowRegistry> {
        self.inner.write()
    }

    /// See [`GlowRegistry::add`].
    pub fn add(&self, sort_key: i32, entry: &Arc<GlowEntry>) {
        self.write().add(sort_key, entry);
    }

    /// See [`GlowRegistry::remove`].
    pub fn remove(&self, sort_key: i32, entry: &GlowEntry) -> bool {
        self.write().remove(sort_key, entry)
    }

    /// Consistent snapshot of the current draw list.
    #[must_use]
    pub fn draw_list(&self) -> Vec<GlowDraw> {
        self.read().draw_list()
    }

    /// Draw list together with the registry version it was taken at.
    #[must_use]
    pub fn snapshot(&self) -> (u64, Vec<GlowDraw>) {
        let registry = self.read();
        (registry.version(), registry.draw_list())
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.read().version()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Tears the service down at application shutdown.
    ///
    /// Outstanding handles keep working; their later removals become no-ops.
    pub fn shutdown(&self) {
        let mut registry = self.write();
        if !registry.is_empty() {
            log::info!(
                "Glow registry shut down with {} registered objects",
                registry.len()
            );
        }
        registry.clear();
    }
}
