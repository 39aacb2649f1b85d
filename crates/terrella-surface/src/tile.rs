//! Quadtree tile nodes and their lifecycle state.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use glam::DMat4;

use terrella_geom::{PatchGeometry, TexCoordRange, TileId};
use terrella_render::{GpuMesh, TileTexture};

/// Sentinel for a neighbor level that has never been applied.
pub(crate) const NEIGHBOR_UNSET: u8 = u8::MAX;

/// Lifecycle state of a tile's geometry.
///
/// The only transitions are `Invalid → InQueue` (submission),
/// `InQueue → Loading` (worker claim), `Loading → Inactive` (build done)
/// and `InQueue → Invalid` (withdrawal). A resident tile re-enters
/// `Invalid` solely through [`Tile::invalidate`], which starts the cycle
/// over for a rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TileState {
    /// No geometry and no request outstanding.
    Invalid = 0,
    /// Waiting in the loader queue.
    InQueue = 1,
    /// The worker is building the mesh; mesh fields must not be read.
    Loading = 2,
    /// Geometry resident (or build abandoned); safe to read and to free.
    Inactive = 3,
}

impl TileState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TileState::Invalid,
            1 => TileState::InQueue,
            2 => TileState::Loading,
            _ => TileState::Inactive,
        }
    }
}

/// Identifies the [`TileManager`](crate::TileManager) owning a tile, so
/// loader withdrawal can target one manager's requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ManagerId(u64);

impl ManagerId {
    /// Allocate a process-unique id.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        ManagerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A tile's built geometry and its GPU residency.
pub struct TileMesh {
    /// CPU-side mesh, kept for restitching and bounds tests.
    pub geometry: PatchGeometry,
    /// Uploaded buffers, absent until the render thread uploads.
    pub gpu: Option<GpuMesh>,
    /// Set when CPU vertices changed after upload (edge restitch).
    pub gpu_dirty: bool,
}

impl TileMesh {
    pub(crate) fn new(geometry: PatchGeometry) -> Self {
        Self {
            geometry,
            gpu: None,
            gpu_dirty: false,
        }
    }
}

/// A tile's texture reference.
///
/// Tiles start out sampling a sub-rectangle of an ancestor's texture;
/// `owned` flips when the tile's own texture arrives. Shared references
/// are never released by the tile holding them.
#[derive(Clone)]
pub struct TextureBinding {
    /// The bound texture, if any ancestor (or the tile itself) has one.
    pub texture: Option<Arc<TileTexture>>,
    /// Sub-rectangle of `texture` this tile samples.
    pub range: TexCoordRange,
    /// Whether `texture` belongs to this tile rather than an ancestor.
    pub owned: bool,
}

impl Default for TextureBinding {
    fn default() -> Self {
        Self {
            texture: None,
            range: TexCoordRange::FULL,
            owned: false,
        }
    }
}

/// One node of a planet's surface quadtree.
///
/// Tiles are shared between the render thread and the loader worker via
/// `Arc`; the state machine above governs who may touch the mesh. The
/// parent link is weak: it reaches back for texture inheritance but never
/// extends a parent's lifetime.
pub struct Tile {
    id: TileId,
    owner: ManagerId,
    state: AtomicU8,
    mesh: Mutex<Option<TileMesh>>,
    texture: Mutex<TextureBinding>,
    parent: Weak<Tile>,
    children: Mutex<[Option<Arc<Tile>>; 4]>,
    // last neighbor levels applied to the mesh edges, for stitch dirtiness
    lng_neighbor: AtomicU8,
    lat_neighbor: AtomicU8,
    dia_neighbor: AtomicU8,
}

impl Tile {
    /// Create a root-level tile.
    pub fn new_root(id: TileId, owner: ManagerId) -> Arc<Self> {
        Arc::new(Self::bare(id, owner, Weak::new()))
    }

    /// Create a child of `parent`, inheriting its texture binding at the
    /// matching quadrant.
    pub fn new_child(id: TileId, parent: &Arc<Tile>) -> Arc<Self> {
        let tile = Self::bare(id, parent.owner, Arc::downgrade(parent));
        let inherited = parent.inherited_texture_subrange(id);
        *tile.texture.lock().unwrap() = inherited;
        Arc::new(tile)
    }

    fn bare(id: TileId, owner: ManagerId, parent: Weak<Tile>) -> Self {
        Self {
            id,
            owner,
            state: AtomicU8::new(TileState::Invalid as u8),
            mesh: Mutex::new(None),
            texture: Mutex::new(TextureBinding::default()),
            parent,
            children: Mutex::new([None, None, None, None]),
            lng_neighbor: AtomicU8::new(NEIGHBOR_UNSET),
            lat_neighbor: AtomicU8::new(NEIGHBOR_UNSET),
            dia_neighbor: AtomicU8::new(NEIGHBOR_UNSET),
        }
    }

    /// Lattice address of this tile.
    #[must_use]
    pub fn id(&self) -> TileId {
        self.id
    }

    /// The manager this tile belongs to.
    #[must_use]
    pub fn owner(&self) -> ManagerId {
        self.owner
    }

    /// Current lifecycle state (lock-free read).
    #[must_use]
    pub fn state(&self) -> TileState {
        TileState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Store a new state. Transition points are serialized by the loader
    /// queue lock; this is the raw store they share.
    pub(crate) fn set_state(&self, state: TileState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Re-enter the build cycle from `Inactive` (mesh rebuild, texture
    /// adoption). Returns false if the tile was not `Inactive`.
    pub fn invalidate(&self) -> bool {
        self.state
            .compare_exchange(
                TileState::Inactive as u8,
                TileState::Invalid as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Lock the mesh slot. Render-side readers should first check that the
    /// state is not [`TileState::Loading`].
    pub fn mesh(&self) -> MutexGuard<'_, Option<TileMesh>> {
        self.mesh.lock().unwrap()
    }

    /// Whether built geometry is resident (regardless of GPU residency).
    #[must_use]
    pub fn has_geometry(&self) -> bool {
        self.state() == TileState::Inactive && self.mesh().is_some()
    }

    /// Whether the tile can be drawn this frame. A stale mesh on an
    /// invalidated or re-queued tile still renders; only [`TileState::Loading`]
    /// rules the mesh slot out while the worker owns it.
    #[must_use]
    pub fn renderable(&self) -> bool {
        self.state() != TileState::Loading && self.mesh().is_some()
    }

    /// Lock the texture binding.
    pub fn texture(&self) -> MutexGuard<'_, TextureBinding> {
        self.texture.lock().unwrap()
    }

    /// The texture binding a child at `child_id` should start with: the
    /// same texture, narrowed to the child's quadrant, never owned.
    #[must_use]
    pub fn inherited_texture_subrange(&self, child_id: TileId) -> TextureBinding {
        let own = self.texture.lock().unwrap();
        TextureBinding {
            texture: own.texture.clone(),
            range: own
                .range
                .quadrant(child_id.is_east_child(), child_id.is_south_child()),
            owned: false,
        }
    }

    /// Install this tile's own texture and queue a rebuild so vertex uvs
    /// cover the full range. Returns false when the tile is mid-build and
    /// the caller should retry later.
    pub fn adopt_texture(&self, texture: Arc<TileTexture>) -> bool {
        {
            let mut binding = self.texture.lock().unwrap();
            binding.texture = Some(texture);
            binding.range = TexCoordRange::FULL;
            binding.owned = true;
        }
        match self.state() {
            TileState::Inactive => self.invalidate(),
            TileState::Invalid => true,
            TileState::InQueue | TileState::Loading => false,
        }
    }

    /// Lock the child slots (NW, NE, SW, SE).
    pub fn children(&self) -> MutexGuard<'_, [Option<Arc<Tile>>; 4]> {
        self.children.lock().unwrap()
    }

    /// The parent tile, while it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<Tile>> {
        self.parent.upgrade()
    }

    /// Conservative frustum test: true if any corner of the bounding box
    /// satisfies all six clip half-spaces. Root tiles and tiles without a
    /// mesh have no reliable box and count as visible.
    #[must_use]
    pub fn visible_in(&self, planet_to_clip: &DMat4) -> bool {
        if self.id.level == 0 || self.state() == TileState::Loading {
            return true;
        }
        let mesh = self.mesh();
        match mesh.as_ref() {
            Some(m) => {
                let local_to_clip =
                    *planet_to_clip * self.id.local_to_planet(m.geometry.origin_shift);
                m.geometry.bounds.any_corner_in_clip(&local_to_clip)
            }
            None => true,
        }
    }

    pub(crate) fn neighbor_levels(&self) -> (u8, u8, u8) {
        (
            self.lng_neighbor.load(Ordering::Relaxed),
            self.lat_neighbor.load(Ordering::Relaxed),
            self.dia_neighbor.load(Ordering::Relaxed),
        )
    }

    pub(crate) fn set_neighbor_levels(&self, lng: u8, lat: u8, dia: u8) {
        self.lng_neighbor.store(lng, Ordering::Relaxed);
        self.lat_neighbor.store(lat, Ordering::Relaxed);
        self.dia_neighbor.store(dia, Ordering::Relaxed);
    }

    pub(crate) fn reset_neighbor_levels(&self) {
        self.set_neighbor_levels(NEIGHBOR_UNSET, NEIGHBOR_UNSET, NEIGHBOR_UNSET);
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
