//! Per-planet tile tree: refinement and pruning against the camera, seam
//! repair between mismatched neighbors, GPU residency, and the frame
//! render walk.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use terrella_geom::{ElevationSource, MAX_LEVEL, PatchEdge, TileId, stitch_edge};
use terrella_render::{BufferPool, GpuMesh, PoolStats, PooledBuffer, RenderError, TileGpu, TileTexture};

use crate::loader::{BuildRecipe, LoadRequest, TileLoader};
use crate::tile::{ManagerId, Tile, TileState};
use crate::view::ViewParams;

/// Per-planet tuning, typically mapped from the `[surface]` config
/// section.
#[derive(Clone, Debug)]
pub struct SurfaceSettings {
    /// Planet radius in metres.
    pub radius_m: f64,
    /// Cells per patch edge, shared by every tile of the planet.
    pub grid_resolution: u32,
    /// Hard refinement cap for this planet's tree.
    pub max_level: u8,
    /// Additive bias on the refinement target: +1 doubles surface detail
    /// at a given camera distance.
    pub resolution_bias: f64,
    /// Uniform offset added to the reference sphere, in metres.
    pub base_elevation_m: f64,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            radius_m: 6.371e6,
            grid_resolution: 32,
            max_level: 10,
            resolution_bias: 2.0,
            base_elevation_m: 0.0,
        }
    }
}

/// Counters from one [`TileManager::traverse_and_render`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraverseStats {
    /// Tiles the walk looked at.
    pub visited: u32,
    /// Leaves handed to the render callback.
    pub rendered: u32,
    /// Build requests the loader accepted.
    pub submitted: u32,
    /// Subtrees skipped because they fell outside the view volume.
    pub culled: u32,
    /// Prunes postponed because a descendant was still building.
    pub deferred_prunes: u32,
    /// GPU buffer uploads and in-place rewrites.
    pub uploads: u32,
}

/// Owner of one planet's tile quadtree.
///
/// All methods are render-thread only; the sole cross-thread contact is
/// the loader queue. The manager keeps the two hemisphere roots alive for
/// its whole lifetime and grows and shrinks the tree beneath them as the
/// camera moves.
pub struct TileManager {
    id: ManagerId,
    gpu: Arc<TileGpu>,
    loader: Arc<TileLoader>,
    pool: BufferPool,
    settings: SurfaceSettings,
    elevation: Option<Arc<dyn ElevationSource>>,
    roots: [Arc<Tile>; 2],
    view: Option<ViewParams>,
    /// Frame-leaf ids from the latest walk, the lookup table for
    /// neighbor effective levels.
    leaves: FxHashSet<TileId>,
}

impl TileManager {
    /// Create the tree for one planet. The two roots start `Invalid` and
    /// untextured; the first traversal submits them.
    #[must_use]
    pub fn new(
        gpu: Arc<TileGpu>,
        loader: Arc<TileLoader>,
        pool: BufferPool,
        settings: SurfaceSettings,
        elevation: Option<Arc<dyn ElevationSource>>,
    ) -> Self {
        let id = ManagerId::next();
        let roots = TileId::roots().map(|root| Tile::new_root(root, id));
        log::info!(
            "tile manager up: radius {:.0} m, grid {}, max level {}",
            settings.radius_m,
            settings.grid_resolution,
            settings.max_level
        );
        Self {
            id,
            gpu,
            loader,
            pool,
            settings,
            elevation,
            roots,
            view: None,
            leaves: FxHashSet::default(),
        }
    }

    /// This manager's id, the ownership tag on its tiles.
    #[must_use]
    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// The two hemisphere roots (west, east).
    #[must_use]
    pub fn roots(&self) -> &[Arc<Tile>; 2] {
        &self.roots
    }

    /// The shared loader handle.
    #[must_use]
    pub fn loader(&self) -> &Arc<TileLoader> {
        &self.loader
    }

    /// Hand the hemisphere base textures to the roots. Children created
    /// later inherit quadrant subranges of these until they adopt their
    /// own. Returns false if a root was mid-build and the call should be
    /// retried.
    pub fn set_root_textures(&self, west: Arc<TileTexture>, east: Arc<TileTexture>) -> bool {
        let a = self.roots[0].adopt_texture(west);
        let b = self.roots[1].adopt_texture(east);
        a && b
    }

    /// Install the camera state for subsequent traversals. Must be called
    /// before the first [`TileManager::traverse_and_render`].
    pub fn set_view_parameters(&mut self, view: ViewParams) {
        self.view = Some(view);
    }

    /// Walk the tree once: refine toward the camera, prune what fell out
    /// of interest, repair seams, make leaves GPU-resident and hand each
    /// renderable leaf to `render` front-to-nothing in tree order.
    ///
    /// A device allocation failure aborts the pass and is returned; the
    /// affected tile keeps its CPU mesh and is retried next frame.
    pub fn traverse_and_render<F>(&mut self, mut render: F) -> Result<TraverseStats, RenderError>
    where
        F: FnMut(&Arc<Tile>),
    {
        let Some(view) = self.view else {
            log::warn!("traverse_and_render before set_view_parameters; rendering nothing");
            return Ok(TraverseStats::default());
        };
        let mut stats = TraverseStats::default();
        let mut frame_leaves = Vec::new();
        let roots = self.roots.clone();
        for root in &roots {
            self.select_tiles(root, &view, &mut frame_leaves, &mut stats);
        }

        self.leaves.clear();
        self.leaves
            .extend(frame_leaves.iter().map(|(tile, _)| tile.id()));

        for (tile, visible) in &frame_leaves {
            if !tile.renderable() {
                continue;
            }
            if tile.id().level > 0 {
                self.refresh_neighbor_levels(tile);
            }
            if !visible {
                continue;
            }
            if let Err(err) = self.ensure_gpu_resident(tile, &mut stats) {
                log::error!("gpu upload for {} failed: {err}", tile.id());
                return Err(err);
            }
            render(tile);
            stats.rendered += 1;
        }
        self.gpu.flush();
        Ok(stats)
    }

    /// Buffer pool counters.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Lease a vertex buffer sized for exactly `vertex_count` vertices.
    pub fn lease_vertex_buffer(&mut self, vertex_count: u32) -> Result<PooledBuffer, RenderError> {
        self.pool.lease_vertex_buffer(&self.gpu, vertex_count)
    }

    /// Lease an index buffer sized for exactly `triangle_count` triangles.
    pub fn lease_index_buffer(&mut self, triangle_count: u32) -> Result<PooledBuffer, RenderError> {
        self.pool.lease_index_buffer(&self.gpu, triangle_count)
    }

    /// Park a buffer back on its free stack.
    pub fn return_buffer(&mut self, buffer: PooledBuffer) {
        self.pool.return_buffer(buffer);
    }

    /// Depth-first leaf selection. Descends only where the camera asks
    /// for more detail than the tile has, all four children can already
    /// be drawn, and the tile is inside the view volume; otherwise the
    /// tile itself becomes a frame leaf. Invisible tiles are neither
    /// refined nor submitted, but an over-refined subtree is pruned no
    /// matter where the camera points.
    fn select_tiles(
        &mut self,
        tile: &Arc<Tile>,
        view: &ViewParams,
        out: &mut Vec<(Arc<Tile>, bool)>,
        stats: &mut TraverseStats,
    ) {
        stats.visited += 1;
        let id = tile.id();
        let visible = tile.visible_in(&view.planet_to_clip);
        if !visible {
            stats.culled += 1;
        }
        let target = self.target_level(tile, view);
        let cap = self.settings.max_level.min(MAX_LEVEL);

        if visible && id.level < target && id.level < cap {
            if let Some(children) = self.ensure_children(tile) {
                if children.iter().all(|child| child.renderable()) {
                    for child in &children {
                        self.select_tiles(child, view, out, stats);
                    }
                    return;
                }
                // Children still streaming in: request the missing ones
                // and keep rendering this tile so no hole opens up.
                // Off-screen children are requested too; descent waits on
                // all four.
                for child in &children {
                    if !child.renderable() {
                        self.request_build(child, stats);
                    }
                }
            }
        } else if id.level >= target && has_live_children(tile) {
            if !self.release_children(tile) {
                stats.deferred_prunes += 1;
            }
        }

        if visible {
            self.request_build(tile, stats);
        }
        out.push((Arc::clone(tile), visible));
    }

    /// Desired refinement depth over this tile: one more level per
    /// halving of the camera's distance to the tile centre, shifted by
    /// the resolution bias. Scale-free, so small moons and giants refine
    /// at the same apparent rate.
    fn target_level(&self, tile: &Arc<Tile>, view: &ViewParams) -> u8 {
        let radius = self.settings.radius_m;
        let mean_elevation = tile
            .mesh()
            .as_ref()
            .map_or(0.0, |mesh| mesh.geometry.mean_elevation);
        let centre = tile.id().centre_dir() * (radius + mean_elevation);
        let distance = (view.camera_pos(radius) - centre).length().max(1.0);
        let target = self.settings.resolution_bias + (radius / distance).log2();
        if target <= 0.0 {
            0
        } else {
            target.min(f64::from(MAX_LEVEL)) as u8
        }
    }

    /// Fill empty child slots with fresh `Invalid` tiles and return all
    /// four. `None` only at the lattice's absolute maximum level.
    fn ensure_children(&self, tile: &Arc<Tile>) -> Option<[Arc<Tile>; 4]> {
        let ids = tile.id().children()?;
        let mut slots = tile.children();
        Some(std::array::from_fn(|i| {
            Arc::clone(slots[i].get_or_insert_with(|| Tile::new_child(ids[i], tile)))
        }))
    }

    /// Submit a build for a tile that has none in flight. An `Inactive`
    /// tile whose build produced no mesh is re-invalidated first so it
    /// becomes eligible again.
    fn request_build(&self, tile: &Arc<Tile>, stats: &mut TraverseStats) {
        let eligible = match tile.state() {
            TileState::Invalid => true,
            TileState::Inactive if tile.mesh().is_none() => tile.invalidate(),
            _ => false,
        };
        if !eligible {
            return;
        }
        let recipe = BuildRecipe {
            grid: self.settings.grid_resolution,
            radius: self.settings.radius_m,
            base_elevation: self.settings.base_elevation_m,
            tex_range: tile.texture().range,
            shift_origin: tile.id().level > 0,
            elevation: self.elevation.clone(),
        };
        let outcome = self.loader.submit(LoadRequest {
            tile: Arc::clone(tile),
            recipe,
        });
        if outcome.accepted() {
            stats.submitted += 1;
        } else {
            log::trace!("submit of {} bounced: {outcome:?}", tile.id());
        }
    }

    /// Tear down the subtree below `tile`, returning GPU leases to the
    /// pool. Grandchildren go first so a deep subtree drains bottom-up
    /// over a few frames. Returns false when a descendant was still
    /// building and had to stay.
    fn release_children(&mut self, tile: &Arc<Tile>) -> bool {
        let mut complete = true;
        let mut slots = tile.children();
        for slot in slots.iter_mut() {
            let Some(child) = slot.clone() else { continue };
            if !self.release_children(&child) || !self.loader.prepare_for_removal(&child) {
                complete = false;
                continue;
            }
            if let Some(mesh) = child.mesh().take() {
                if let Some(gpu_mesh) = mesh.gpu {
                    let (vertices, indices) = gpu_mesh.into_buffers();
                    self.pool.return_buffer(vertices);
                    self.pool.return_buffer(indices);
                }
            }
            *slot = None;
        }
        complete
    }

    /// Re-resolve the effective rendered level across each of the three
    /// neighbors and restitch the adaptable edges when anything changed.
    /// Neighbors past a pole, and areas nothing rendered over, count as
    /// same-level, which keeps the edge pristine.
    fn refresh_neighbor_levels(&self, tile: &Arc<Tile>) {
        let id = tile.id();
        let lng = self.effective_level(id.lng_neighbor());
        let lat = id
            .lat_neighbor()
            .map_or(id.level, |n| self.effective_level(n));
        let dia = id
            .diagonal_neighbor()
            .map_or(id.level, |n| self.effective_level(n));
        if (lng, lat, dia) == tile.neighbor_levels() {
            return;
        }
        let mut slot = tile.mesh();
        if let Some(mesh) = slot.as_mut() {
            let stitched = stitch_edge(
                &mut mesh.geometry,
                id,
                PatchEdge::Longitude,
                u32::from(id.level.saturating_sub(lng)),
            ) | stitch_edge(
                &mut mesh.geometry,
                id,
                PatchEdge::Latitude,
                u32::from(id.level.saturating_sub(lat)),
            );
            if stitched {
                mesh.gpu_dirty = true;
            }
        }
        drop(slot);
        tile.set_neighbor_levels(lng, lat, dia);
    }

    /// The level actually rendered over `id`'s area this frame: the
    /// nearest ancestor-or-self in the frame leaf set. Areas covered by
    /// finer leaves (or by nothing) resolve to `id`'s own level.
    fn effective_level(&self, id: TileId) -> u8 {
        let mut probe = id;
        loop {
            if self.leaves.contains(&probe) {
                return probe.level;
            }
            match probe.parent() {
                Some(parent) => probe = parent,
                None => return id.level,
            }
        }
    }

    /// Upload a leaf's mesh on first use; rewrite the vertices in place
    /// after a restitch or an in-slot rebuild.
    fn ensure_gpu_resident(
        &mut self,
        tile: &Arc<Tile>,
        stats: &mut TraverseStats,
    ) -> Result<(), RenderError> {
        let mut slot = tile.mesh();
        let Some(mesh) = slot.as_mut() else {
            return Ok(());
        };
        if mesh.gpu.is_none() {
            mesh.gpu = Some(GpuMesh::upload(&self.gpu, &mut self.pool, &mesh.geometry)?);
            mesh.gpu_dirty = false;
            stats.uploads += 1;
        } else if mesh.gpu_dirty {
            if let Some(gpu_mesh) = mesh.gpu.as_ref() {
                gpu_mesh.rewrite_vertices(&self.gpu, &mesh.geometry);
            }
            mesh.gpu_dirty = false;
            stats.uploads += 1;
        }
        Ok(())
    }
}

impl Drop for TileManager {
    /// Withdraw everything still pending so no finished build lands in a
    /// tree that is going away. A tile mid-build is kept alive by the
    /// loader's own `Arc` until the build finishes.
    fn drop(&mut self) {
        self.loader.withdraw_all(self.id);
    }
}

fn has_live_children(tile: &Tile) -> bool {
    tile.children().iter().any(Option::is_some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderSettings;
    use glam::{DMat4, DVec3};
    use std::time::{Duration, Instant};

    fn test_gpu() -> Option<TileGpu> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .ok()?;
            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor::default())
                .await
                .ok()?;
            Some(TileGpu { device, queue })
        })
    }

    const RADIUS: f64 = 1.0e6;

    fn settings(max_level: u8) -> SurfaceSettings {
        SurfaceSettings {
            radius_m: RADIUS,
            grid_resolution: 8,
            max_level,
            resolution_bias: 2.0,
            base_elevation_m: 0.0,
        }
    }

    fn fast_loader() -> Arc<TileLoader> {
        Arc::new(TileLoader::new(&LoaderSettings {
            load_frequency_hz: 500.0,
            queue_capacity: 32,
            shutdown_grace: Duration::from_millis(1000),
        }))
    }

    /// Camera on `dir` at `distance` planet radii, looking at the centre.
    fn view_from(dir: DVec3, distance: f64) -> ViewParams {
        let eye = dir * (distance * RADIUS);
        let clip = DMat4::perspective_rh(60f64.to_radians(), 1.0, 0.001 * RADIUS, 100.0 * RADIUS)
            * DMat4::look_at_rh(eye, DVec3::ZERO, DVec3::Y);
        ViewParams::from_camera(clip, eye, DVec3::X, RADIUS)
    }

    /// Run traversals until `done` says so or the deadline passes.
    fn settle<F>(manager: &mut TileManager, view: ViewParams, mut done: F) -> TraverseStats
    where
        F: FnMut(&TraverseStats, &[TileId]) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            manager.set_view_parameters(view);
            let mut rendered = Vec::new();
            let stats = manager
                .traverse_and_render(|tile| rendered.push(tile.id()))
                .unwrap();
            if done(&stats, &rendered) {
                return stats;
            }
            assert!(Instant::now() < deadline, "tree never settled");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_traverse_without_view_renders_nothing() {
        let Some(gpu) = test_gpu() else { return };
        let mut manager = TileManager::new(
            Arc::new(gpu),
            fast_loader(),
            BufferPool::new(16),
            settings(4),
            None,
        );
        let stats = manager.traverse_and_render(|_| {}).unwrap();
        assert_eq!(stats, TraverseStats::default());
    }

    #[test]
    fn test_far_camera_renders_exactly_the_roots() {
        let Some(gpu) = test_gpu() else { return };
        let mut manager = TileManager::new(
            Arc::new(gpu),
            fast_loader(),
            BufferPool::new(16),
            settings(4),
            None,
        );
        let view = view_from(DVec3::X, 10.0);
        let stats = settle(&mut manager, view, |stats, _| stats.rendered == 2);
        assert_eq!(stats.visited, 2);
        let mut rendered = Vec::new();
        manager.set_view_parameters(view);
        manager
            .traverse_and_render(|tile| rendered.push(tile.id()))
            .unwrap();
        rendered.sort_by_key(|id| id.col);
        assert_eq!(rendered, TileId::roots().to_vec());
    }

    #[test]
    fn test_near_camera_refines_under_camera_only() {
        let Some(gpu) = test_gpu() else { return };
        let mut manager = TileManager::new(
            Arc::new(gpu),
            fast_loader(),
            BufferPool::new(16),
            settings(4),
            None,
        );
        // Over the west hemisphere's central meridian, 5% of a radius up.
        let overhead = DVec3::new(0.0, 0.0, -1.0);
        let view = view_from(overhead, 1.05);
        settle(&mut manager, view, |_, rendered| {
            rendered
                .iter()
                .any(|id| id.level >= 2 && id.centre_dir().dot(overhead) > 0.7)
        });

        // The far side must stay coarse no matter how long we stream.
        let mut rendered = Vec::new();
        manager.set_view_parameters(view);
        manager
            .traverse_and_render(|tile| rendered.push(tile.id()))
            .unwrap();
        for id in rendered {
            if id.centre_dir().dot(overhead) < -0.5 {
                assert!(id.level <= 1, "{id} is over-refined antipodally");
            }
        }
    }

    /// Keep traversing under `view` until both roots are childless.
    fn settle_pruned(manager: &mut TileManager, view: ViewParams) {
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            manager.set_view_parameters(view);
            manager.traverse_and_render(|_| {}).unwrap();
            if !has_live_children(&manager.roots[0]) && !has_live_children(&manager.roots[1]) {
                return;
            }
            assert!(Instant::now() < deadline, "prune never completed");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_retreating_camera_prunes_and_recycles() {
        let Some(gpu) = test_gpu() else { return };
        let mut manager = TileManager::new(
            Arc::new(gpu),
            fast_loader(),
            BufferPool::new(16),
            settings(3),
            None,
        );
        let overhead = DVec3::new(0.0, 0.0, -1.0);
        settle(&mut manager, view_from(overhead, 1.05), |_, rendered| {
            rendered.iter().any(|id| id.level >= 2)
        });

        let far = view_from(DVec3::X, 10.0);
        settle_pruned(&mut manager, far);
        manager.set_view_parameters(far);
        let stats = manager.traverse_and_render(|_| {}).unwrap();
        assert_eq!(stats.visited, 2);
        assert_eq!(stats.rendered, 2);
        // Pruned leases went back on the free stacks, not to the device.
        assert!(manager.pool_stats().returned > 0);
        assert_eq!(manager.pool_stats().released, 0);
    }

    #[test]
    fn test_prune_defers_while_descendant_loads() {
        let Some(gpu) = test_gpu() else { return };
        let mut manager = TileManager::new(
            Arc::new(gpu),
            fast_loader(),
            BufferPool::new(16),
            settings(3),
            None,
        );
        let overhead = DVec3::new(0.0, 0.0, -1.0);
        settle(&mut manager, view_from(overhead, 1.05), |_, rendered| {
            rendered.iter().any(|id| id.level >= 1)
        });
        let held = manager.roots[0].children()[0]
            .clone()
            .expect("west root has no children");
        held.set_state(TileState::Loading);

        let far = view_from(DVec3::X, 10.0);
        manager.set_view_parameters(far);
        let stats = manager.traverse_and_render(|_| {}).unwrap();
        assert!(stats.deferred_prunes > 0);
        assert!(has_live_children(&manager.roots[0]));

        // Once the build lands the next pass finishes the prune.
        held.set_state(TileState::Inactive);
        settle_pruned(&mut manager, far);
    }

    #[test]
    fn test_drop_withdraws_pending_loads() {
        let Some(gpu) = test_gpu() else { return };
        // A dormant loader keeps everything queued until the drop.
        let loader = Arc::new(TileLoader::new(&LoaderSettings {
            load_frequency_hz: 0.001,
            queue_capacity: 32,
            shutdown_grace: Duration::from_millis(200),
        }));
        let mut manager = TileManager::new(
            Arc::new(gpu),
            Arc::clone(&loader),
            BufferPool::new(16),
            settings(4),
            None,
        );
        manager.set_view_parameters(view_from(DVec3::X, 10.0));
        let stats = manager.traverse_and_render(|_| {}).unwrap();
        assert_eq!(stats.submitted, 2);
        assert_eq!(loader.pending_count(), 2);

        drop(manager);
        assert_eq!(loader.pending_count(), 0);
    }

    #[test]
    fn test_neighbor_refresh_stitches_against_coarser_cover() {
        use crate::tile::TileMesh;
        use terrella_geom::{QuadPatchParams, TexCoordRange, build_quadpatch};

        let Some(gpu) = test_gpu() else { return };
        let mut manager = TileManager::new(
            Arc::new(gpu),
            fast_loader(),
            BufferPool::new(16),
            settings(4),
            None,
        );
        let root = Arc::clone(&manager.roots[0]);
        let level1 = manager.ensure_children(&root).unwrap();
        let level2 = manager.ensure_children(&level1[3]).unwrap();
        let tile = Arc::clone(&level2[0]);
        let geometry = build_quadpatch(
            &QuadPatchParams {
                id: tile.id(),
                grid: 8,
                radius: RADIUS,
                base_elevation: 0.0,
                tex_range: TexCoordRange::FULL,
                shift_origin: true,
            },
            None,
        )
        .unwrap();
        *tile.mesh() = Some(TileMesh::new(geometry));
        tile.set_state(TileState::Inactive);

        // Frame cover: the tile itself, and across its longitudinal edge
        // only the neighbor's level-1 parent rendered.
        let coarse_cover = tile.id().lng_neighbor().parent().unwrap();
        manager.leaves.insert(tile.id());
        manager.leaves.insert(coarse_cover);

        manager.refresh_neighbor_levels(&tile);
        assert_eq!(tile.neighbor_levels(), (1, 2, 2));
        assert!(tile.mesh().as_ref().unwrap().gpu_dirty);

        // Same cover again: nothing changed, nothing re-stitched.
        tile.mesh().as_mut().unwrap().gpu_dirty = false;
        manager.refresh_neighbor_levels(&tile);
        assert!(!tile.mesh().as_ref().unwrap().gpu_dirty);
    }
}
