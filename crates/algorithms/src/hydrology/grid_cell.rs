//! Priority-queue entries with a total, deterministic ordering
//!
//! Every queue-driven tool pops cells by ascending elevation. Ties are broken
//! by row, then column, so two runs over the same DEM visit cells in exactly
//! the same order.

use std::cmp::Ordering;
use drainflow_core::Raster;

/// A cell keyed by its elevation.
///
/// Ordering is ascending `z` (via `f64::total_cmp`), then `row`, then `col`.
/// Wrap in `std::cmp::Reverse` for a min-heap.
#[derive(Debug, Clone, Copy)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub z: f64,
}

impl GridCell {
    pub fn new(row: usize, col: usize, z: f64) -> Self {
        Self { row, col, z }
    }
}

impl PartialEq for GridCell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GridCell {}

impl PartialOrd for GridCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GridCell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.z
            .total_cmp(&other.z)
            .then(self.row.cmp(&other.row))
            .then(self.col.cmp(&other.col))
    }
}

/// A cell keyed by a quantised elevation packed with its position.
///
/// Field order is the ordering: `priority`, then `row`, then `col`. The
/// position digits folded into `priority` repeat every 1000 rows/columns, so
/// the explicit fields keep the order total on larger grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackedCell {
    pub priority: i64,
    pub row: usize,
    pub col: usize,
}

/// Maps elevations to integer priorities with a fixed number of significant
/// digits across the DEM's relief.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationQuantizer {
    /// Elevation subtracted before quantising
    pub z_min: f64,
    /// `10^(8 - digits(relief))`
    pub elev_multiplier: f64,
    /// Smallest elevation step the quantiser resolves
    pub small_num: f64,
}

impl ElevationQuantizer {
    pub fn new(z_min: f64, z_max: f64) -> Self {
        let relief = (z_max - z_min).max(0.0).trunc();
        let elev_digits = (relief as u64).to_string().len() as i32;
        let elev_multiplier = 10f64.powi(8 - elev_digits);
        Self {
            z_min,
            elev_multiplier,
            small_num: 1.0 / elev_multiplier,
        }
    }

    /// Quantiser for the valid cells of a DEM, `None` if it has none
    pub fn for_raster(dem: &Raster<f64>) -> Option<Self> {
        let stats = dem.statistics();
        Some(Self::new(stats.min?, stats.max?))
    }

    #[inline]
    pub fn key(&self, z: f64, row: usize, col: usize) -> PackedCell {
        let level = ((z - self.z_min) * self.elev_multiplier).floor() as i64;
        let priority = level * 1_000_000 + ((row % 1000) * 1000 + col % 1000) as i64;
        PackedCell { priority, row, col }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;

    #[test]
    fn test_grid_cell_min_heap_breaks_ties_by_position() {
        let mut heap = BinaryHeap::new();
        heap.push(Reverse(GridCell::new(2, 0, 5.0)));
        heap.push(Reverse(GridCell::new(0, 3, 5.0)));
        heap.push(Reverse(GridCell::new(0, 1, 5.0)));
        heap.push(Reverse(GridCell::new(9, 9, 1.0)));

        let order: Vec<(usize, usize)> = std::iter::from_fn(|| heap.pop())
            .map(|Reverse(c)| (c.row, c.col))
            .collect();
        assert_eq!(order, vec![(9, 9), (0, 1), (0, 3), (2, 0)]);
    }

    #[test]
    fn test_quantizer_digits() {
        let q = ElevationQuantizer::new(100.0, 1350.5);
        // relief 1250 has 4 digits
        assert_relative_eq!(q.elev_multiplier, 1e4);
        assert_relative_eq!(q.small_num, 1e-4);

        let flat = ElevationQuantizer::new(3.0, 3.2);
        assert_relative_eq!(flat.elev_multiplier, 1e7);
    }

    #[test]
    fn test_packed_order_follows_elevation_then_position() {
        let q = ElevationQuantizer::new(0.0, 500.0);
        let low = q.key(10.0, 999, 999);
        let high = q.key(10.001, 0, 0);
        assert!(low < high);

        // Same elevation, positions that alias modulo 1000
        let a = q.key(10.0, 5, 7);
        let b = q.key(10.0, 1005, 7);
        assert_eq!(a.priority, b.priority);
        assert!(a < b);
    }

    #[test]
    fn test_key_stays_in_range_for_high_datum() {
        let q = ElevationQuantizer::new(8000.0, 8848.0);
        let k = q.key(8848.0, 12, 34);
        assert!(k.priority > 0);
        assert_eq!(k.priority % 1_000_000, 12_034);
    }

    #[test]
    fn test_quantizer_needs_a_valid_cell() {
        let mut dem = Raster::filled(3, 3, -9999.0);
        dem.set_nodata(Some(-9999.0));
        assert!(ElevationQuantizer::for_raster(&dem).is_none());

        dem.set(1, 1, 42.0).unwrap();
        let q = ElevationQuantizer::for_raster(&dem).unwrap();
        assert_eq!(q.z_min, 42.0);
    }
}
