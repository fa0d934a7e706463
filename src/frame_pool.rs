//! Frame Buffer Pool
//!
//! Provides a render target pool for short-lived, per-frame allocations.
//! The compositor acquires targets while building the bloom pyramid and
//! releases them when the frame ends; released targets stay alive in the
//! free list and are handed out again on the next matching request.
//!
//! # Design
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 FrameBufferPool                     │
//! │                                                     │
//! │  active: HashMap<RenderTargetId, Key>               │
//! │  free:   HashMap<Key, Vec<PooledTarget>>            │
//! │                                                     │
//! │  acquire(desc) → Id   (reuse or create)             │
//! │  release(Id)          (back to free list)           │
//! │  scope()              (releases on drop)            │
//! │  trim(n)              (destroy idle targets)        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Memory Strategy
//!
//! - Targets are **never** destroyed during normal rendering; they remain
//!   in the free list for reuse.
//! - The pool grows on demand: if no compatible free target exists, a new
//!   one is created through the host [`RenderDevice`].
//! - [`FrameBufferPool::trim`] destroys targets that have not been reused for
//!   a number of frames (e.g. after a resolution change).
//!
//! # Accounting
//!
//! A target id is either active or free, never both. Releasing an id that is
//! not active (a double release, or an id from elsewhere) is rejected, logged
//! and counted in [`PoolStats::rejected_releases`].

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::Result;
use crate::host::{RenderDevice, RenderTargetDesc, RenderTargetId, TargetFormat};

// ─── Internal Types ───────────────────────────────────────────────────────────

/// Key for target recycling. Only exact matches are reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct PoolKey {
    width: u32,
    height: u32,
    depth_bits: u32,
    format: TargetFormat,
}

impl PoolKey {
    fn from_desc(desc: &RenderTargetDesc) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            depth_bits: desc.depth_bits,
            format: desc.format,
        }
    }
}

struct PooledTarget {
    id: RenderTargetId,
    /// Trims survived in the free list since the target was last released.
    idle_frames: u32,
}

// ─── Public Types ─────────────────────────────────────────────────────────────

/// Lifetime counters of a [`FrameBufferPool`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Successful `acquire` calls.
    pub acquired: u64,
    /// Successful `release` calls.
    pub released: u64,
    /// Targets created through the device.
    pub created: u64,
    /// Targets destroyed through the device.
    pub destroyed: u64,
    /// Releases of ids that were not active.
    pub rejected_releases: u64,
}

// ─── Pool Implementation ──────────────────────────────────────────────────────

/// Render target pool for transient per-frame allocations.
#[derive(Default)]
pub struct FrameBufferPool {
    active: FxHashMap<RenderTargetId, PoolKey>,
    free: FxHashMap<PoolKey, Vec<PooledTarget>>,
    stats: PoolStats,
}

impl FrameBufferPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a target matching `desc`, reusing a free one when possible.
    ///
    /// Zero-sized requests and device failures are returned as errors and
    /// leave the pool unchanged.
    pub fn acquire<D>(&mut self, device: &mut D, desc: &RenderTargetDesc) -> Result<RenderTargetId>
    where
        D: RenderDevice + ?Sized,
    {
        desc.validate()?;
        let key = PoolKey::from_desc(desc);

        let id = if let Some(pooled) = self.free.get_mut(&key).and_then(Vec::pop) {
            pooled.id
        } else {
            let id = device.create_target(desc)?;
            self.stats.created += 1;
            log::debug!(
                "Frame buffer pool grew: '{}' {}x{} {:?} ({} targets)",
                desc.label,
                desc.width,
                desc.height,
                desc.format,
                self.total_target_count() + 1,
            );
            id
        };

        self.active.insert(id, key);
        self.stats.acquired += 1;
        Ok(id)
    }

    /// Return an active target to the free list.
    ///
    /// Returns `false` if `id` was not active.
    pub fn release(&mut self, id: RenderTargetId) -> bool {
        let Some(key) = self.active.remove(&id) else {
            log::warn!("Rejected release of render target {id:?}: not active in this pool");
            self.stats.rejected_releases += 1;
            return false;
        };

        self.free.entry(key).or_default().push(PooledTarget { id, idle_frames: 0 });
        self.stats.released += 1;
        true
    }

    /// Opens a scope whose acquisitions are all released when it is dropped.
    pub fn scope<'a, D>(&'a mut self, device: &'a mut D) -> FrameScope<'a, D>
    where
        D: RenderDevice + ?Sized,
    {
        FrameScope {
            pool: self,
            device,
            held: SmallVec::new(),
        }
    }

    /// Destroy free targets that went unused for more than `max_idle_frames`
    /// trims in a row.
    ///
    /// A target released since the previous trim counts as used, so with a
    /// window of `0` the buffers of a steady-state frame are still reused.
    /// Returns the number of destroyed targets.
    pub fn trim<D>(&mut self, device: &mut D, max_idle_frames: u32) -> usize
    where
        D: RenderDevice + ?Sized,
    {
        let mut destroyed = 0;
        for bucket in self.free.values_mut() {
            bucket.retain_mut(|target| {
                if target.idle_frames > max_idle_frames {
                    device.destroy_target(target.id);
                    destroyed += 1;
                    false
                } else {
                    target.idle_frames += 1;
                    true
                }
            });
        }
        self.free.retain(|_, bucket| !bucket.is_empty());

        self.stats.destroyed += destroyed as u64;
        destroyed
    }

    /// Destroy every target the pool manages, active ones included.
    pub fn clear<D>(&mut self, device: &mut D)
    where
        D: RenderDevice + ?Sized,
    {
        if !self.active.is_empty() {
            log::warn!(
                "Frame buffer pool cleared with {} targets still active",
                self.active.len()
            );
        }

        let active = self.active.drain().map(|(id, _)| id);
        let free = self
            .free
            .drain()
            .flat_map(|(_, bucket)| bucket.into_iter().map(|target| target.id));
        for id in active.chain(free) {
            device.destroy_target(id);
            self.stats.destroyed += 1;
        }
    }

    /// `true` if `id` is currently acquired.
    #[must_use]
    pub fn is_active(&self, id: RenderTargetId) -> bool {
        self.active.contains_key(&id)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Returns the total number of targets managed by the pool
    /// (both active and free).
    #[must_use]
    pub fn total_target_count(&self) -> usize {
        self.active_count() + self.free_count()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

// ─── Scoped Acquisition ───────────────────────────────────────────────────────

/// Scoped access to a pool and its device for one frame stage.
///
/// Every target acquired through the scope is released exactly once when the
/// scope is dropped, including on early `?` returns.
pub struct FrameScope<'a, D: RenderDevice + ?Sized> {
    pool: &'a mut FrameBufferPool,
    device: &'a mut D,
    /// Prefilter + 16 downsample + 15 upsample levels fit inline.
    held: SmallVec<[RenderTargetId; 32]>,
}

impl<D: RenderDevice + ?Sized> FrameScope<'_, D> {
    /// Acquire a target that lives until the scope ends.
    pub fn acquire(&mut self, desc: &RenderTargetDesc) -> Result<RenderTargetId> {
        let id = self.pool.acquire(&mut *self.device, desc)?;
        self.held.push(id);
        Ok(id)
    }

    /// The device, for recording passes against the acquired targets.
    #[inline]
    pub fn device(&mut self) -> &mut D {
        &mut *self.device
    }

    /// Number of targets held by this scope.
    #[inline]
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}

impl<D: RenderDevice + ?Sized> Drop for FrameScope<'_, D> {
    fn drop(&mut self) {
        for id in self.held.drain(..) {
            self.pool.release(id);
        }
    }
}
