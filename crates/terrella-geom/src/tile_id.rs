//! Tile addressing on the planetary lat/lon lattice.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use glam::{DMat4, DVec3};

/// Deepest supported quadtree level.
pub const MAX_LEVEL: u8 = 24;

/// Uniquely identifies a tile on the planetary quadtree lattice.
///
/// - `level`: quadtree depth. Level 0 is the two root hemispheres; each
///   level quadruples the tile count.
/// - `row`: latitude band, 0 = northernmost. At level `l` there are
///   `2^l` rows.
/// - `col`: longitude slot, increasing eastward from the date line. At
///   level `l` there are `2·2^l` columns (the lattice is twice as wide as
///   it is tall).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    /// Quadtree depth (0 = root hemispheres).
    pub level: u8,
    /// Latitude band index, 0 at the north pole edge.
    pub row: u32,
    /// Longitude slot index, wrapping at the date line.
    pub col: u32,
}

/// Latitude/longitude extent of a tile, radians.
///
/// Latitude is geodetic (`-π/2..π/2`, north positive); longitude spans
/// `-π..π` with 0 at the lattice midline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatLonBounds {
    /// Southern edge.
    pub lat_min: f64,
    /// Northern edge.
    pub lat_max: f64,
    /// Western edge.
    pub lng_min: f64,
    /// Eastern edge.
    pub lng_max: f64,
}

impl LatLonBounds {
    /// Latitude extent in radians.
    #[must_use]
    pub fn lat_span(&self) -> f64 {
        self.lat_max - self.lat_min
    }

    /// Longitude extent in radians.
    #[must_use]
    pub fn lng_span(&self) -> f64 {
        self.lng_max - self.lng_min
    }
}

impl TileId {
    /// Number of latitude rows at a level.
    ///
    /// # Panics
    ///
    /// Panics if `level` exceeds [`MAX_LEVEL`].
    #[must_use]
    pub fn rows(level: u8) -> u32 {
        assert!(level <= MAX_LEVEL, "level {level} exceeds MAX_LEVEL {MAX_LEVEL}");
        1 << level
    }

    /// Number of longitude columns at a level (twice the row count).
    #[must_use]
    pub fn cols(level: u8) -> u32 {
        2 * Self::rows(level)
    }

    /// Construct a `TileId`, validating lattice bounds.
    ///
    /// # Panics
    ///
    /// Panics if `level` exceeds [`MAX_LEVEL`] or `row`/`col` are out of
    /// range for it.
    #[must_use]
    pub fn new(level: u8, row: u32, col: u32) -> Self {
        let rows = Self::rows(level);
        let cols = Self::cols(level);
        assert!(row < rows, "row={row} out of range for level {level} (max {rows})");
        assert!(col < cols, "col={col} out of range for level {level} (max {cols})");
        Self { level, row, col }
    }

    /// The two level-0 roots: western and eastern hemisphere.
    #[must_use]
    pub fn roots() -> [TileId; 2] {
        [TileId::new(0, 0, 0), TileId::new(0, 0, 1)]
    }

    /// Latitude/longitude extent of this tile.
    #[must_use]
    pub fn bounds(&self) -> LatLonBounds {
        let rows = f64::from(Self::rows(self.level));
        let cols = f64::from(Self::cols(self.level));
        let half_cols = f64::from(Self::cols(self.level) / 2);
        LatLonBounds {
            lat_min: PI * (0.5 - f64::from(self.row + 1) / rows),
            lat_max: PI * (0.5 - f64::from(self.row) / rows),
            lng_min: TAU * (f64::from(self.col) - half_cols) / cols,
            lng_max: TAU * (f64::from(self.col) + 1.0 - half_cols) / cols,
        }
    }

    /// Unit direction from the planet centre to the tile centre, planet
    /// frame (y = polar axis, north positive).
    #[must_use]
    pub fn centre_dir(&self) -> DVec3 {
        let rows = f64::from(Self::rows(self.level));
        let cols = f64::from(Self::cols(self.level));
        let lat = FRAC_PI_2 - PI * (f64::from(self.row) + 0.5) / rows;
        let lng = TAU * (f64::from(self.col) + 0.5) / cols - PI;
        let (slat, clat) = lat.sin_cos();
        let (slng, clng) = lng.sin_cos();
        DVec3::new(clat * clng, slat, clat * slng)
    }

    /// The four children at the next level, ordered NW, NE, SW, SE.
    ///
    /// Returns `None` at [`MAX_LEVEL`].
    #[must_use]
    pub fn children(&self) -> Option<[TileId; 4]> {
        if self.level >= MAX_LEVEL {
            return None;
        }
        let level = self.level + 1;
        let (r, c) = (self.row * 2, self.col * 2);
        Some([
            TileId::new(level, r, c),
            TileId::new(level, r, c + 1),
            TileId::new(level, r + 1, c),
            TileId::new(level, r + 1, c + 1),
        ])
    }

    /// The parent tile, or `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<TileId> {
        if self.level == 0 {
            return None;
        }
        Some(TileId::new(self.level - 1, self.row / 2, self.col / 2))
    }

    /// Whether this tile is the eastern child of its parent pair.
    #[must_use]
    pub fn is_east_child(&self) -> bool {
        self.col & 1 == 1
    }

    /// Whether this tile is the southern child of its parent pair.
    #[must_use]
    pub fn is_south_child(&self) -> bool {
        self.row & 1 == 1
    }

    /// Whether the tile lies in the northern hemisphere band set.
    #[must_use]
    pub fn is_north(&self) -> bool {
        self.row < Self::rows(self.level) / 2
    }

    /// Same-level neighbor across the adaptable longitude edge (the west
    /// edge for even columns, the east edge for odd ones). Longitude wraps
    /// at the date line.
    #[must_use]
    pub fn lng_neighbor(&self) -> TileId {
        let cols = Self::cols(self.level);
        let col = if self.is_east_child() {
            (self.col + 1) % cols
        } else {
            (self.col + cols - 1) % cols
        };
        TileId::new(self.level, self.row, col)
    }

    /// Same-level neighbor across the adaptable latitude edge (the north
    /// edge for even rows, the south edge for odd ones). `None` past the
    /// poles.
    #[must_use]
    pub fn lat_neighbor(&self) -> Option<TileId> {
        let rows = Self::rows(self.level);
        let row = if self.is_south_child() {
            self.row + 1
        } else {
            self.row.checked_sub(1)?
        };
        (row < rows).then(|| TileId::new(self.level, row, self.col))
    }

    /// Same-level neighbor across the shared corner of the two adaptable
    /// edges. `None` past the poles.
    #[must_use]
    pub fn diagonal_neighbor(&self) -> Option<TileId> {
        let lat = self.lat_neighbor()?;
        Some(TileId::new(self.level, lat.row, self.lng_neighbor().col))
    }

    /// Transform from the tile's mesh-local frame to the planet frame.
    ///
    /// Patch meshes are built with longitude 0 at their western edge (and,
    /// when origin shifting is enabled, translated by `origin_shift`); this
    /// undoes both.
    #[must_use]
    pub fn local_to_planet(&self, origin_shift: DVec3) -> DMat4 {
        DMat4::from_rotation_y(-self.bounds().lng_min) * DMat4::from_translation(origin_shift)
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}[{},{}]", self.level, self.row, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_lattice_dimensions() {
        assert_eq!(TileId::rows(0), 1);
        assert_eq!(TileId::cols(0), 2);
        assert_eq!(TileId::rows(3), 8);
        assert_eq!(TileId::cols(3), 16);
    }

    #[test]
    fn test_root_bounds_cover_sphere() {
        let [west, east] = TileId::roots();
        let wb = west.bounds();
        let eb = east.bounds();
        assert!((wb.lat_min + FRAC_PI_2).abs() < EPS);
        assert!((wb.lat_max - FRAC_PI_2).abs() < EPS);
        assert!((wb.lng_min + PI).abs() < EPS);
        assert!(wb.lng_max.abs() < EPS);
        assert!(eb.lng_min.abs() < EPS);
        assert!((eb.lng_max - PI).abs() < EPS);
    }

    #[test]
    fn test_children_cover_parent_bounds() {
        let parent = TileId::new(3, 2, 9);
        let pb = parent.bounds();
        let children = parent.children().expect("below MAX_LEVEL");

        let lat_min = children.iter().map(|c| c.bounds().lat_min).fold(f64::MAX, f64::min);
        let lat_max = children.iter().map(|c| c.bounds().lat_max).fold(f64::MIN, f64::max);
        let lng_min = children.iter().map(|c| c.bounds().lng_min).fold(f64::MAX, f64::min);
        let lng_max = children.iter().map(|c| c.bounds().lng_max).fold(f64::MIN, f64::max);

        assert!((lat_min - pb.lat_min).abs() < EPS);
        assert!((lat_max - pb.lat_max).abs() < EPS);
        assert!((lng_min - pb.lng_min).abs() < EPS);
        assert!((lng_max - pb.lng_max).abs() < EPS);
    }

    #[test]
    fn test_parent_of_child_is_self() {
        let parent = TileId::new(5, 13, 40);
        for child in parent.children().unwrap() {
            assert_eq!(child.parent(), Some(parent));
        }
        assert_eq!(TileId::new(0, 0, 1).parent(), None);
    }

    #[test]
    fn test_quadrant_parity() {
        let parent = TileId::new(2, 1, 3);
        let [nw, ne, sw, se] = parent.children().unwrap();
        assert!(!nw.is_east_child() && !nw.is_south_child());
        assert!(ne.is_east_child() && !ne.is_south_child());
        assert!(!sw.is_east_child() && sw.is_south_child());
        assert!(se.is_east_child() && se.is_south_child());
    }

    #[test]
    fn test_centre_dir_is_unit_and_placed() {
        // level 1, row 0, col 2 spans lat 0..π/2, lng 0..π/2
        let id = TileId::new(1, 0, 2);
        let dir = id.centre_dir();
        assert!((dir.length() - 1.0).abs() < EPS);
        let quarter = FRAC_PI_2 / 2.0;
        let expect = DVec3::new(
            quarter.cos() * quarter.cos(),
            quarter.sin(),
            quarter.cos() * quarter.sin(),
        );
        assert!((dir - expect).length() < EPS);
    }

    #[test]
    fn test_lng_neighbor_wraps() {
        // even column: west neighbor, wrapping under the date line
        let id = TileId::new(1, 0, 0);
        assert_eq!(id.lng_neighbor(), TileId::new(1, 0, 3));
        // odd column: east neighbor
        let id = TileId::new(1, 0, 3);
        assert_eq!(id.lng_neighbor(), TileId::new(1, 0, 0));
    }

    #[test]
    fn test_lat_neighbor_stops_at_poles() {
        // level 1: row 0 faces the north pole, row 1 the south pole
        assert_eq!(TileId::new(1, 0, 0).lat_neighbor(), None);
        assert_eq!(TileId::new(1, 1, 0).lat_neighbor(), None);
        // level 2: interior rows have neighbors
        assert_eq!(TileId::new(2, 1, 0).lat_neighbor(), Some(TileId::new(2, 2, 0)));
        assert_eq!(TileId::new(2, 2, 5).lat_neighbor(), Some(TileId::new(2, 1, 5)));
    }

    #[test]
    fn test_diagonal_neighbor_combines_edges() {
        let id = TileId::new(2, 1, 2);
        // odd row → south, even col → west
        assert_eq!(id.diagonal_neighbor(), Some(TileId::new(2, 2, 1)));
        assert_eq!(TileId::new(2, 0, 0).diagonal_neighbor(), None);
    }

    #[test]
    fn test_local_to_planet_places_centre() {
        let id = TileId::new(2, 1, 5);
        let b = id.bounds();
        let lat = 0.5 * (b.lat_min + b.lat_max);
        let lng_local = 0.5 * b.lng_span();
        let local = DVec3::new(
            lat.cos() * lng_local.cos(),
            lat.sin(),
            lat.cos() * lng_local.sin(),
        );
        let placed = id.local_to_planet(DVec3::ZERO).transform_point3(local);
        assert!((placed - id.centre_dir()).length() < 1e-9);
    }

    #[test]
    fn test_local_to_planet_applies_shift_first() {
        let id = TileId::new(1, 0, 2);
        let shift = DVec3::new(0.25, -0.5, 0.0);
        let a = id.local_to_planet(shift).transform_point3(DVec3::ZERO);
        let b = id.local_to_planet(DVec3::ZERO).transform_point3(shift);
        assert!((a - b).length() < EPS);
    }

    #[test]
    fn test_display() {
        let id = TileId::new(4, 3, 17);
        assert_eq!(format!("{id}"), "L4[3,17]");
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_col_panics() {
        let _ = TileId::new(1, 0, 4);
    }
}
