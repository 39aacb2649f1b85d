//! Streaming surface quadtree: tiles, the background loader, and the
//! per-planet tile manager.
//!
//! The render thread owns a [`TileManager`] per planet and calls
//! [`TileManager::traverse_and_render`] once a frame; a single
//! [`TileLoader`] worker, shared by all managers, builds tile meshes in
//! the background at a fixed cadence. Tiles move through the
//! [`TileState`] lifecycle as they are queued, built, and drawn; the only
//! cross-thread contact is the loader's queue lock.

mod loader;
mod manager;
mod tile;
mod view;

pub use loader::{BuildRecipe, LoadRequest, LoaderSettings, SubmitOutcome, TileLoader};
pub use manager::{SurfaceSettings, TileManager, TraverseStats};
pub use tile::{ManagerId, TextureBinding, Tile, TileMesh, TileState};
pub use view::ViewParams;
