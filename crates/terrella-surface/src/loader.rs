//! Background tile loader: a bounded FIFO of build requests drained by a
//! single worker thread.
//!
//! One worker serializes all mesh construction so tile streaming never
//! competes with the render thread for more than one core. The queue is a
//! plain [`VecDeque`] behind one mutex; the same lock serializes every tile
//! state transition the loader performs, which is what makes the state
//! machine in [`TileState`] race-free.
//!
//! The worker paces itself: it parks for `1000 / load_frequency_hz`
//! milliseconds between wakes and claims at most one entry per wake, so
//! load cadence is a config knob rather than a function of queue depth.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use terrella_geom::{
    build_hemisphere_cancelable, build_quadpatch_cancelable, ElevationSource, GeometryError,
    HemisphereParams, PatchGeometry, QuadPatchParams, TexCoordRange, TileId,
};

use crate::tile::{ManagerId, Tile, TileMesh, TileState};

/// Tuning knobs for the loader, typically mapped from the `[loader]`
/// config section.
#[derive(Clone, Debug)]
pub struct LoaderSettings {
    /// Worker wake rate. One queue entry is claimed per wake.
    pub load_frequency_hz: f64,
    /// Maximum number of pending entries before eviction kicks in.
    pub queue_capacity: usize,
    /// How long shutdown waits for the worker before detaching it.
    pub shutdown_grace: Duration,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            load_frequency_hz: 20.0,
            queue_capacity: 32,
            shutdown_grace: Duration::from_millis(1000),
        }
    }
}

/// Everything the worker needs to build a tile's mesh, snapshotted at
/// submission time. The texture range in particular must not be re-read
/// later: the mesh uvs have to match the texture the tile was bound to
/// when the request was made.
#[derive(Clone)]
pub struct BuildRecipe {
    /// Cells per patch edge.
    pub grid: u32,
    /// Planet radius in metres.
    pub radius: f64,
    /// Uniform offset added to the reference sphere, in metres.
    pub base_elevation: f64,
    /// Texture subrange the vertex uvs should cover.
    pub tex_range: TexCoordRange,
    /// Whether vertices are rebased on the patch centre (always on for
    /// level >= 1; roots span too much sphere to benefit).
    pub shift_origin: bool,
    /// Elevation provider. `None` renders the reference sphere.
    pub elevation: Option<Arc<dyn ElevationSource>>,
}

impl BuildRecipe {
    fn build(&self, id: TileId, cancel: &AtomicBool) -> Result<PatchGeometry, GeometryError> {
        if id.level == 0 {
            let params = HemisphereParams {
                id,
                grid: self.grid,
                radius: self.radius,
                base_elevation: self.base_elevation,
            };
            build_hemisphere_cancelable(&params, cancel)
        } else {
            let patch = self
                .elevation
                .as_ref()
                .and_then(|source| source.elevation_patch(id, self.grid));
            let params = QuadPatchParams {
                id,
                grid: self.grid,
                radius: self.radius,
                base_elevation: self.base_elevation,
                tex_range: self.tex_range,
                shift_origin: self.shift_origin,
            };
            build_quadpatch_cancelable(&params, patch.as_ref(), cancel)
        }
    }
}

/// A pending mesh build: the tile to fill and the recipe to fill it with.
#[derive(Clone)]
pub struct LoadRequest {
    pub tile: Arc<Tile>,
    pub recipe: BuildRecipe,
}

/// What [`TileLoader::submit`] did with a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Appended to the queue; the tile is now `InQueue`.
    Queued,
    /// The queue was full but a worse (higher-level) entry was evicted and
    /// this request took its slot. The victim reverted to `Invalid`.
    Evicted,
    /// The same tile is already pending; nothing changed.
    Duplicate,
    /// The queue was full and every pending entry is at least as urgent.
    /// The tile stays `Invalid`; resubmit on a later frame.
    Saturated,
    /// The tile was not `Invalid` — it is already queued, building, or
    /// holds finished geometry.
    AlreadyActive,
}

impl SubmitOutcome {
    /// Whether the request ended up in the queue.
    #[must_use]
    pub fn accepted(self) -> bool {
        matches!(self, Self::Queued | Self::Evicted)
    }
}

struct LoaderShared {
    queue: Mutex<VecDeque<LoadRequest>>,
    capacity: usize,
    wake_interval: Duration,
    stop: AtomicBool,
}

/// Handle to the loader queue and its worker thread.
///
/// Cloned `Arc<TileLoader>`s may be shared by several tile managers; each
/// entry remembers its owner so [`TileLoader::withdraw_all`] can clear one
/// manager's requests without touching the others'.
pub struct TileLoader {
    shared: Arc<LoaderShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    exit_rx: Receiver<()>,
    grace: Duration,
}

impl TileLoader {
    /// Spawn the worker and return the queue handle.
    #[must_use]
    pub fn new(settings: &LoaderSettings) -> Self {
        let shared = Arc::new(LoaderShared {
            queue: Mutex::new(VecDeque::with_capacity(settings.queue_capacity)),
            capacity: settings.queue_capacity.max(1),
            wake_interval: Duration::from_secs_f64(1.0 / settings.load_frequency_hz.max(0.001)),
            stop: AtomicBool::new(false),
        });
        let (exit_tx, exit_rx) = crossbeam_channel::bounded(1);
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("tile-loader".into())
            .spawn(move || worker_loop(&worker_shared, &exit_tx))
            .expect("Failed to spawn tile loader worker thread");
        Self {
            shared,
            worker: Mutex::new(Some(worker)),
            exit_rx,
            grace: settings.shutdown_grace,
        }
    }

    /// Offer a request to the queue. Only an `Invalid` tile is eligible;
    /// see [`SubmitOutcome`] for the ways a request can bounce.
    ///
    /// When the queue is full, the first pending entry with the highest
    /// quadtree level is evicted in place, but only if the new tile is
    /// coarser than it: near-the-camera detail never starves a coarse tile
    /// the whole subtree is waiting on.
    pub fn submit(&self, request: LoadRequest) -> SubmitOutcome {
        let mut queue = self.shared.queue.lock().unwrap();
        if queue
            .iter()
            .any(|pending| Arc::ptr_eq(&pending.tile, &request.tile))
        {
            return SubmitOutcome::Duplicate;
        }
        if request.tile.state() != TileState::Invalid {
            return SubmitOutcome::AlreadyActive;
        }
        if queue.len() >= self.shared.capacity {
            let mut worst = 0;
            for (i, pending) in queue.iter().enumerate() {
                if pending.tile.id().level > queue[worst].tile.id().level {
                    worst = i;
                }
            }
            if queue[worst].tile.id().level <= request.tile.id().level {
                return SubmitOutcome::Saturated;
            }
            request.tile.set_state(TileState::InQueue);
            let victim = std::mem::replace(&mut queue[worst], request);
            victim.tile.set_state(TileState::Invalid);
            log::debug!(
                "evicted {} from the load queue for {}",
                victim.tile.id(),
                queue[worst].tile.id()
            );
            return SubmitOutcome::Evicted;
        }
        request.tile.set_state(TileState::InQueue);
        queue.push_back(request);
        SubmitOutcome::Queued
    }

    /// Remove a pending entry for `tile`, reverting it to `Invalid`.
    /// Returns false when the tile was not in the queue (already claimed,
    /// finished, or never submitted). Queue order of the rest is kept.
    pub fn withdraw(&self, tile: &Arc<Tile>) -> bool {
        let mut queue = self.shared.queue.lock().unwrap();
        Self::withdraw_locked(&mut queue, tile)
    }

    fn withdraw_locked(queue: &mut VecDeque<LoadRequest>, tile: &Arc<Tile>) -> bool {
        let Some(index) = queue
            .iter()
            .position(|pending| Arc::ptr_eq(&pending.tile, tile))
        else {
            return false;
        };
        queue.remove(index);
        tile.set_state(TileState::Invalid);
        true
    }

    /// Drop every pending entry owned by `owner`, reverting the tiles to
    /// `Invalid`. Called on manager teardown so no completed build lands in
    /// a tree that is going away.
    pub fn withdraw_all(&self, owner: ManagerId) {
        let mut queue = self.shared.queue.lock().unwrap();
        let before = queue.len();
        queue.retain(|pending| {
            if pending.tile.owner() == owner {
                pending.tile.set_state(TileState::Invalid);
                false
            } else {
                true
            }
        });
        let dropped = before - queue.len();
        if dropped > 0 {
            log::debug!("withdrew {dropped} pending loads for {owner:?}");
        }
    }

    /// Whether `tile` may be freed right now. An `InQueue` tile is
    /// withdrawn as a side effect; a `Loading` tile must not be freed while
    /// the worker holds it, so the caller retries on a later frame.
    pub fn prepare_for_removal(&self, tile: &Arc<Tile>) -> bool {
        let mut queue = self.shared.queue.lock().unwrap();
        // Reading the state under the queue lock is exact: the worker only
        // flips states while holding the same lock.
        match tile.state() {
            TileState::Loading => false,
            TileState::InQueue => {
                Self::withdraw_locked(&mut queue, tile);
                true
            }
            TileState::Invalid | TileState::Inactive => true,
        }
    }

    /// Number of pending entries.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    /// Quadtree levels of the pending entries in queue order, for
    /// diagnostics overlays.
    #[must_use]
    pub fn pending_levels(&self) -> Vec<u8> {
        self.shared
            .queue
            .lock()
            .unwrap()
            .iter()
            .map(|pending| pending.tile.id().level)
            .collect()
    }

    /// Stop the worker. Waits up to the configured grace period for it to
    /// acknowledge; a worker stuck inside a mesh build is detached instead
    /// of killed, so it can still finish its checkpointed cancellation and
    /// exit on its own. Idempotent.
    pub fn shutdown(&self) {
        let Some(handle) = self.worker.lock().unwrap().take() else {
            return;
        };
        self.shared.stop.store(true, Ordering::Release);
        handle.thread().unpark();
        match self.exit_rx.recv_timeout(self.grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
            }
            Err(RecvTimeoutError::Timeout) => {
                log::error!(
                    "tile loader worker missed the {} ms shutdown grace period, detaching it",
                    self.grace.as_millis()
                );
                drop(handle);
            }
        }
    }
}

impl Drop for TileLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &LoaderShared, exit_tx: &Sender<()>) {
    log::debug!(
        "tile loader worker up, waking every {} ms",
        shared.wake_interval.as_millis()
    );
    loop {
        std::thread::park_timeout(shared.wake_interval);
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        let claimed = {
            let mut queue = shared.queue.lock().unwrap();
            match queue.pop_front() {
                Some(request) if request.tile.state() == TileState::InQueue => {
                    request.tile.set_state(TileState::Loading);
                    Some(request)
                }
                Some(request) => {
                    // Withdraw and eviction both fix the queue up in place,
                    // so a dequeued entry in another state is unexpected.
                    log::debug!("dropping stale queue entry for {}", request.tile.id());
                    None
                }
                None => None,
            }
        };
        let Some(request) = claimed else {
            continue;
        };
        let id = request.tile.id();
        let started = Instant::now();
        // Built without holding the lock: submissions and withdrawals keep
        // flowing while this runs. The stop flag doubles as the build's
        // cancellation token.
        match request.recipe.build(id, &shared.stop) {
            Ok(geometry) => {
                let mut slot = request.tile.mesh();
                match slot.as_mut() {
                    // A rebuild keeps the GPU lease: the grid is unchanged,
                    // so the render thread can rewrite buffers in place.
                    Some(mesh) => {
                        mesh.geometry = geometry;
                        mesh.gpu_dirty = true;
                    }
                    None => *slot = Some(TileMesh::new(geometry)),
                }
                drop(slot);
                request.tile.reset_neighbor_levels();
                log::debug!("built {} in {} ms", id, started.elapsed().as_millis());
            }
            Err(GeometryError::Cancelled) => {
                log::debug!("build of {id} cancelled by shutdown");
            }
            Err(err) => {
                log::error!("mesh build for {id} failed: {err}");
            }
        }
        {
            let _queue = shared.queue.lock().unwrap();
            request.tile.set_state(TileState::Inactive);
        }
    }
    let _ = exit_tx.send(());
    log::debug!("tile loader worker exit");
}
