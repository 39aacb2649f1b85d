//! Buffer pool recycling GPU storage across tile churn.
//!
//! Camera movement retires and rebuilds many tiles of identical grid
//! resolution in quick succession, so their buffers come in a handful of
//! exact sizes. The pool keeps returned buffers on per-size free stacks
//! and hands them back on the next lease, keeping driver allocations off
//! the per-frame path. Size classes are registered lazily, bounded by a
//! class-table capacity; once the table is full, leases of unseen sizes
//! degrade to direct allocation and their returns release the buffer.

use rustc_hash::FxHashMap;

use crate::error::RenderError;
use crate::gpu::TileGpu;
use terrella_geom::PatchVertex;

/// Which pool a buffer belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    /// Sized in vertices.
    Vertex,
    /// Sized in triangles.
    Index,
}

/// A leased GPU buffer plus the bookkeeping to return it.
#[derive(Debug)]
pub struct PooledBuffer {
    /// The GPU handle.
    pub buffer: wgpu::Buffer,
    kind: BufferKind,
    capacity: u32,
}

impl PooledBuffer {
    /// Vertex or triangle capacity this buffer was leased at.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Which pool this buffer belongs to.
    #[must_use]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }
}

/// Pool counters, for diagnostics overlays and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers created on the device.
    pub created: u64,
    /// Leases served from a free stack without allocation.
    pub reused: u64,
    /// Returns parked on a free stack.
    pub returned: u64,
    /// Returns released outright (class table full).
    pub released: u64,
}

/// Free stacks bucketed by exact capacity, with bounded class registration.
struct ClassTable<B> {
    classes: FxHashMap<u32, Vec<B>>,
    max_classes: usize,
}

impl<B> ClassTable<B> {
    fn new(max_classes: usize) -> Self {
        Self {
            classes: FxHashMap::default(),
            max_classes,
        }
    }

    /// Ensure a class exists for `capacity`. False if the table is full
    /// and the class is unknown.
    fn register(&mut self, capacity: u32) -> bool {
        if self.classes.contains_key(&capacity) {
            return true;
        }
        if self.classes.len() >= self.max_classes {
            return false;
        }
        self.classes.insert(capacity, Vec::new());
        true
    }

    /// Pop a free buffer of exactly `capacity`, if one is parked.
    fn checkout(&mut self, capacity: u32) -> Option<B> {
        self.classes.get_mut(&capacity)?.pop()
    }

    /// Park a buffer on its class's free stack. Hands the buffer back when
    /// no class is registered for its capacity.
    fn checkin(&mut self, capacity: u32, buffer: B) -> Result<(), B> {
        match self.classes.get_mut(&capacity) {
            Some(stack) => {
                stack.push(buffer);
                Ok(())
            }
            None => Err(buffer),
        }
    }

    fn class_count(&self) -> usize {
        self.classes.len()
    }

    fn free_count(&self) -> usize {
        self.classes.values().map(Vec::len).sum()
    }
}

/// Per-manager pool of tile vertex and index buffers.
pub struct BufferPool {
    vertex_classes: ClassTable<wgpu::Buffer>,
    index_classes: ClassTable<wgpu::Buffer>,
    stats: PoolStats,
}

impl BufferPool {
    /// Create a pool allowing up to `max_classes` distinct sizes per
    /// buffer kind.
    #[must_use]
    pub fn new(max_classes: usize) -> Self {
        Self {
            vertex_classes: ClassTable::new(max_classes),
            index_classes: ClassTable::new(max_classes),
            stats: PoolStats::default(),
        }
    }

    /// Lease a vertex buffer holding exactly `vertex_count` patch
    /// vertices: recycled from the free stack when one is parked,
    /// otherwise freshly allocated.
    pub fn lease_vertex_buffer(
        &mut self,
        gpu: &TileGpu,
        vertex_count: u32,
    ) -> Result<PooledBuffer, RenderError> {
        if let Some(buffer) = self.vertex_classes.checkout(vertex_count) {
            self.stats.reused += 1;
            return Ok(PooledBuffer {
                buffer,
                kind: BufferKind::Vertex,
                capacity: vertex_count,
            });
        }
        self.vertex_classes.register(vertex_count);
        let buffer = gpu.create_vertex_buffer::<PatchVertex>(vertex_count)?;
        self.stats.created += 1;
        Ok(PooledBuffer {
            buffer,
            kind: BufferKind::Vertex,
            capacity: vertex_count,
        })
    }

    /// Lease an index buffer holding exactly `triangle_count` triangles.
    pub fn lease_index_buffer(
        &mut self,
        gpu: &TileGpu,
        triangle_count: u32,
    ) -> Result<PooledBuffer, RenderError> {
        if let Some(buffer) = self.index_classes.checkout(triangle_count) {
            self.stats.reused += 1;
            return Ok(PooledBuffer {
                buffer,
                kind: BufferKind::Index,
                capacity: triangle_count,
            });
        }
        self.index_classes.register(triangle_count);
        let buffer = gpu.create_index_buffer(triangle_count)?;
        self.stats.created += 1;
        Ok(PooledBuffer {
            buffer,
            kind: BufferKind::Index,
            capacity: triangle_count,
        })
    }

    /// Return a leased buffer for reuse. Buffers whose size class never
    /// made it into the table are released instead of parked.
    pub fn return_buffer(&mut self, pooled: PooledBuffer) {
        let table = match pooled.kind {
            BufferKind::Vertex => &mut self.vertex_classes,
            BufferKind::Index => &mut self.index_classes,
        };
        match table.checkin(pooled.capacity, pooled.buffer) {
            Ok(()) => self.stats.returned += 1,
            Err(buffer) => {
                drop(buffer);
                self.stats.released += 1;
            }
        }
    }

    /// Counters since construction.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Distinct size classes currently registered (vertex, index).
    #[must_use]
    pub fn class_counts(&self) -> (usize, usize) {
        (self.vertex_classes.class_count(), self.index_classes.class_count())
    }

    /// Parked free buffers across all classes.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.vertex_classes.free_count() + self.index_classes.free_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_class_table_returns_same_handle() {
        let mut table: ClassTable<u32> = ClassTable::new(4);
        assert!(table.register(25));
        assert_eq!(table.checkin(25, 42), Ok(()));
        assert_eq!(table.checkout(25), Some(42));
        assert_eq!(table.checkout(25), None);
    }

    #[test]
    fn test_class_table_bounds_registration() {
        let mut table: ClassTable<u32> = ClassTable::new(2);
        assert!(table.register(10));
        assert!(table.register(20));
        assert!(!table.register(30));
        // existing classes keep registering fine
        assert!(table.register(10));
        assert_eq!(table.class_count(), 2);
    }

    #[test]
    fn test_class_table_rejects_unregistered_checkin() {
        let mut table: ClassTable<u32> = ClassTable::new(1);
        assert!(table.register(10));
        assert!(!table.register(99));
        assert_eq!(table.checkin(99, 7), Err(7));
        assert_eq!(table.free_count(), 0);
    }

    #[test]
    fn test_classes_never_mix_capacities() {
        let mut table: ClassTable<u32> = ClassTable::new(4);
        table.register(10);
        table.register(20);
        table.checkin(10, 1).unwrap();
        assert_eq!(table.checkout(20), None);
        assert_eq!(table.checkout(10), Some(1));
    }

    #[test]
    fn test_lease_return_lease_recycles() {
        let Some(gpu) = test_gpu() else {
            return; // graceful skip when no GPU
        };
        let mut pool = BufferPool::new(8);

        let buf = pool.lease_vertex_buffer(&gpu, 25).unwrap();
        assert_eq!(pool.stats().created, 1);
        pool.return_buffer(buf);
        assert_eq!(pool.free_count(), 1);

        let again = pool.lease_vertex_buffer(&gpu, 25).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.created, 1, "second lease must not allocate");
        assert_eq!(stats.reused, 1);
        assert_eq!(pool.free_count(), 0);
        pool.return_buffer(again);
    }

    #[test]
    fn test_full_table_degrades_to_direct_allocation() {
        let Some(gpu) = test_gpu() else {
            return;
        };
        let mut pool = BufferPool::new(1);

        let first = pool.lease_index_buffer(&gpu, 32).unwrap();
        let odd_size = pool.lease_index_buffer(&gpu, 99).unwrap();
        assert_eq!(pool.class_counts().1, 1);

        pool.return_buffer(first);
        pool.return_buffer(odd_size);
        let stats = pool.stats();
        assert_eq!(stats.returned, 1);
        assert_eq!(stats.released, 1, "unregistered class releases outright");
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_vertex_and_index_pools_are_independent() {
        let Some(gpu) = test_gpu() else {
            return;
        };
        let mut pool = BufferPool::new(4);
        let vb = pool.lease_vertex_buffer(&gpu, 16).unwrap();
        let ib = pool.lease_index_buffer(&gpu, 16).unwrap();
        assert_eq!(vb.kind(), BufferKind::Vertex);
        assert_eq!(ib.kind(), BufferKind::Index);
        pool.return_buffer(vb);
        pool.return_buffer(ib);
        assert_eq!(pool.class_counts(), (1, 1));
        assert_eq!(pool.free_count(), 2);
    }
}
