//! Fast depression breaching
//!
//! A single Priority-Flood pass from the grid edge fixes, for every cell, a
//! back-link toward the neighbour it was reached from. Whenever the flood
//! reaches a pit, the back-link chain from the pit toward the edge is carved
//! into a strictly descending trench.
//!
//! With a maximum breach depth or length, trenches that would exceed either
//! limit are not carved; those pits are removed by a second, filling pass
//! over the partially breached surface.
//!
//! Reference:
//! Lindsay, J.B. (2016). Efficient hybrid breaching-filling sink removal
//! methods for flow path enforcement in digital elevation models.
//! *Hydrological Processes*, 30(6), 846–857.

use super::flow_accumulation::{flow_accumulation_d8, AccumParams};
use super::grid_cell::{ElevationQuantizer, PackedCell};
use super::no_flow::is_interior_pit;
use drainflow_core::raster::neighborhood::{back_link, offset, POINTER_CODES};
use drainflow_core::raster::try_array2;
use drainflow_core::{Algorithm, Error, Progress, ProgressTracker, Raster, Result};
use ndarray::Array2;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Parameters for fast breaching
#[derive(Debug, Clone, Default)]
pub struct BreachFastParams {
    /// Deepest cut allowed along a trench, in elevation units
    pub max_depth: Option<f64>,
    /// Most cells a trench may lower
    pub max_length: Option<usize>,
    /// Constrained breaching (cut only as deep as the limits allow). Not
    /// supported: pits outside the limits are filled instead.
    pub constrained: bool,
    /// Produce the D8 pointer implied by the breach paths
    pub output_pointer: bool,
    /// Produce D8 flow accumulation from that pointer; needs `output_pointer`
    pub flow_accumulation: bool,
}

impl BreachFastParams {
    pub fn validate(&self) -> Result<()> {
        if let Some(d) = self.max_depth {
            if !d.is_finite() || d < 0.0 {
                return Err(Error::invalid_param("max_depth", d, "must be a non-negative number"));
            }
        }
        Ok(())
    }

    fn is_limited(&self) -> bool {
        self.max_depth.is_some() || self.max_length.is_some()
    }
}

/// Output of [`breach_depressions_fast`]
#[derive(Debug, Clone)]
pub struct BreachFastResult {
    /// Breached (and, where needed, filled) DEM
    pub dem: Raster<f64>,
    /// D8 pointer following the breach/fill paths
    pub pointer: Option<Raster<f64>>,
    /// D8 flow accumulation of `pointer`, in cells
    pub accumulation: Option<Raster<f64>>,
    /// Interior pits found in the input
    pub pits: usize,
    /// Pits removed by carving a trench
    pub breached: usize,
    /// Pits left to the filling pass
    pub deferred: usize,
    /// Elevation step between consecutive trench cells
    pub small_num: f64,
}

/// Fast breaching algorithm
#[derive(Debug, Clone, Default)]
pub struct BreachDepressionsFast;

impl Algorithm for BreachDepressionsFast {
    type Input = Raster<f64>;
    type Output = BreachFastResult;
    type Params = BreachFastParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "BreachDepressionsFast"
    }

    fn description(&self) -> &'static str {
        "Breach depressions along Priority-Flood paths, filling pits beyond the breach limits"
    }

    fn execute(&self, input: Self::Input, params: Self::Params, progress: &dyn Progress) -> Result<Self::Output> {
        breach_depressions_fast(&input, &params, progress)
    }
}

/// Working state shared by the breach and fill passes.
struct Surface {
    z: Array2<f64>,
    valid: Array2<bool>,
    /// 0 for none, otherwise 1 + index of the neighbour the cell drains to
    flowdir: Array2<u8>,
    in_queue: Array2<bool>,
    quantizer: ElevationQuantizer,
}

impl Surface {
    fn neighbour(&self, row: usize, col: usize, i: usize) -> Option<(usize, usize)> {
        let (nr, nc) = offset(row, col, i);
        if nr < 0 || nc < 0 {
            return None;
        }
        let (nr, nc) = (nr as usize, nc as usize);
        match self.valid.get((nr, nc)) {
            Some(true) => Some((nr, nc)),
            _ => None,
        }
    }

    fn downstream(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        match self.flowdir[(row, col)] {
            0 => None,
            d => self.neighbour(row, col, usize::from(d - 1)),
        }
    }

    /// Measure the trench from `pit`: cells to lower and deepest cut. Stops
    /// early once `limit` says the trench is already too long or deep.
    fn measure_trench(&self, pit: (usize, usize), limit: impl Fn(usize, f64) -> bool) -> (usize, f64) {
        let small_num = self.quantizer.small_num;
        let mut z_test = self.z[pit];
        let mut cell = pit;
        let mut length = 0usize;
        let mut depth = 0.0_f64;
        while let Some(next) = self.downstream(cell.0, cell.1) {
            z_test -= small_num;
            let zn = self.z[next];
            if zn <= z_test {
                break;
            }
            length += 1;
            depth = depth.max(zn - z_test);
            if limit(length, depth) {
                break;
            }
            cell = next;
        }
        (length, depth)
    }

    /// Lower every cell on the back-link path from `pit` that sits above a
    /// profile descending by one step per cell.
    fn carve_trench(&mut self, pit: (usize, usize)) {
        let small_num = self.quantizer.small_num;
        let mut z_test = self.z[pit];
        let mut cell = pit;
        while let Some(next) = self.downstream(cell.0, cell.1) {
            z_test -= small_num;
            if self.z[next] <= z_test {
                break;
            }
            self.z[next] = z_test;
            cell = next;
        }
    }

    /// Reset queue state and seed with every edge cell.
    fn seed_edges(&mut self, heap: &mut BinaryHeap<Reverse<PackedCell>>) {
        heap.clear();
        self.flowdir.fill(0);
        self.in_queue.fill(false);
        let (rows, cols) = self.z.dim();
        for row in 0..rows {
            for col in 0..cols {
                if !self.valid[(row, col)] {
                    continue;
                }
                let is_edge = (0..8).any(|i| self.neighbour(row, col, i).is_none());
                if is_edge {
                    heap.push(Reverse(self.quantizer.key(self.z[(row, col)], row, col)));
                    self.in_queue[(row, col)] = true;
                }
            }
        }
    }
}

/// Breach every depression of a DEM in one Priority-Flood pass.
///
/// # Algorithm
/// 1. Flag interior pits and set each to just below its lowest neighbour
/// 2. Seed a min-queue with every edge cell and flood inward; each newly
///    reached cell records a back-link to the cell that reached it
/// 3. When the flood reaches a pit, walk its back-links, lowering each
///    cell above the descending profile; stop at the first cell already
///    below it
/// 4. With depth or length limits, measure the trench first and leave pits
///    outside the limits for a final Priority-Flood fill
///
/// Each cell's back-link is fixed exactly once, so the whole run is
/// `O(N log N)`.
pub fn breach_depressions_fast(
    dem: &Raster<f64>,
    params: &BreachFastParams,
    progress: &dyn Progress,
) -> Result<BreachFastResult> {
    params.validate()?;
    let limited = params.is_limited();
    if params.constrained && limited {
        tracing::warn!("Constrained breaching is not supported; pits beyond the limits will be filled");
    }
    if params.flow_accumulation && !params.output_pointer {
        tracing::warn!("Flow accumulation requires the pointer output and is ignored");
    }

    let (rows, cols) = dem.shape();
    let nodata = dem.nodata_value();
    let Some(quantizer) = ElevationQuantizer::for_raster(dem) else {
        tracing::warn!("DEM has no valid cells, nothing to breach");
        return without_valid_cells(dem, params);
    };
    let small_num = quantizer.small_num;
    let mut tracker = ProgressTracker::new(progress, "Finding pits:");

    let mut surface = Surface {
        z: try_array2(rows, cols, nodata)?,
        valid: try_array2(rows, cols, false)?,
        flowdir: try_array2(rows, cols, 0u8)?,
        in_queue: try_array2(rows, cols, false)?,
        quantizer,
    };
    let mut pits = try_array2(rows, cols, false)?;
    let mut num_pits = 0usize;
    let mut num_valid = 0usize;

    // Step 1: flag and pre-raise pits
    for row in 0..rows {
        for col in 0..cols {
            let z = dem.value_at(row as isize, col as isize);
            if dem.is_nodata(z) {
                continue;
            }
            num_valid += 1;
            surface.valid[(row, col)] = true;
            surface.z[(row, col)] = z;
            if is_interior_pit(dem, row, col) {
                let lowest = dem
                    .neighbours(row, col)
                    .map(|n| n.value)
                    .fold(f64::INFINITY, f64::min);
                surface.z[(row, col)] = lowest - small_num;
                pits[(row, col)] = true;
                num_pits += 1;
            }
        }
        tracker.step(row, rows)?;
    }

    // Step 2: flood from the edge, breaching pits as they are reached
    tracker.set_label("Breaching:");
    let mut heap = BinaryHeap::new();
    surface.seed_edges(&mut heap);
    let mut breached = 0usize;
    let mut deferred = 0usize;
    let mut popped = 0usize;

    while let Some(Reverse(cell)) = heap.pop() {
        popped += 1;
        tracker.tick(popped, num_valid)?;

        for i in 0..8 {
            let Some((nr, nc)) = surface.neighbour(cell.row, cell.col, i) else {
                continue;
            };
            if surface.in_queue[(nr, nc)] {
                continue;
            }
            surface.flowdir[(nr, nc)] = back_link(i) as u8 + 1;

            if pits[(nr, nc)] {
                let within = !limited || {
                    let max_length = params.max_length.unwrap_or(usize::MAX);
                    let max_depth = params.max_depth.unwrap_or(f64::INFINITY);
                    let (length, depth) = surface
                        .measure_trench((nr, nc), |len, d| len > max_length || d > max_depth);
                    length <= max_length && depth <= max_depth
                };
                if within {
                    surface.carve_trench((nr, nc));
                    breached += 1;
                } else {
                    deferred += 1;
                }
            }

            let zn = surface.z[(nr, nc)];
            heap.push(Reverse(surface.quantizer.key(zn, nr, nc)));
            surface.in_queue[(nr, nc)] = true;
        }
    }

    // Step 3: fill whatever could not be breached
    if deferred > 0 {
        tracker.set_label("Filling:");
        surface.seed_edges(&mut heap);
        popped = 0;
        while let Some(Reverse(cell)) = heap.pop() {
            popped += 1;
            tracker.tick(popped, num_valid)?;

            let z = surface.z[(cell.row, cell.col)];
            for i in 0..8 {
                let Some((nr, nc)) = surface.neighbour(cell.row, cell.col, i) else {
                    continue;
                };
                if surface.in_queue[(nr, nc)] {
                    continue;
                }
                surface.flowdir[(nr, nc)] = back_link(i) as u8 + 1;
                if surface.z[(nr, nc)] <= z {
                    surface.z[(nr, nc)] = z + small_num;
                }
                let zn = surface.z[(nr, nc)];
                heap.push(Reverse(surface.quantizer.key(zn, nr, nc)));
                surface.in_queue[(nr, nc)] = true;
            }
        }
    }
    tracker.report(num_valid, num_valid);

    tracing::info!(
        "{} pits: {} breached, {} filled",
        num_pits,
        breached,
        deferred
    );

    let pointer = if params.output_pointer {
        let mut pntr = Raster::try_from_template(dem, 0.0, Some(nodata))?;
        for ((row, col), v) in pntr.data_mut().indexed_iter_mut() {
            *v = if !surface.valid[(row, col)] {
                nodata
            } else {
                match surface.flowdir[(row, col)] {
                    0 => 0.0,
                    d => f64::from(POINTER_CODES[usize::from(d - 1)]),
                }
            };
        }
        Some(pntr)
    } else {
        None
    };

    let accumulation = match (&pointer, params.flow_accumulation) {
        (Some(pntr), true) => Some(flow_accumulation_d8(pntr, &AccumParams::default(), progress)?),
        _ => None,
    };

    let mut output = Raster::from_template(dem, nodata, Some(nodata));
    *output.data_mut() = surface.z;

    Ok(BreachFastResult {
        dem: output,
        pointer,
        accumulation,
        pits: num_pits,
        breached,
        deferred,
        small_num,
    })
}

/// Result for a DEM made only of no-data: the input copied through, with
/// all-no-data pointer and accumulation grids when requested.
fn without_valid_cells(dem: &Raster<f64>, params: &BreachFastParams) -> Result<BreachFastResult> {
    let nodata = dem.nodata_value();
    let pointer = if params.output_pointer {
        Some(Raster::try_from_template(dem, nodata, Some(nodata))?)
    } else {
        None
    };
    let accumulation = match (&pointer, params.flow_accumulation) {
        (Some(_), true) => Some(Raster::try_from_template(dem, nodata, Some(nodata))?),
        _ => None,
    };

    Ok(BreachFastResult {
        dem: dem.clone(),
        pointer,
        accumulation,
        pits: 0,
        breached: 0,
        deferred: 0,
        small_num: ElevationQuantizer::new(0.0, 0.0).small_num,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::no_flow::interior_pits;
    use drainflow_core::{GeoTransform, SilentProgress};

    fn create_dem_with_sink() -> Raster<f64> {
        let mut dem = Raster::new(7, 7);
        dem.set_transform(GeoTransform::new(0.0, 7.0, 1.0, -1.0));

        let values = [
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
            9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 7.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 3.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 7.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 9.0,
            9.0, 9.0, 9.0, 1.0, 9.0, 9.0, 9.0,
        ];

        for (idx, &val) in values.iter().enumerate() {
            dem.set(idx / 7, idx % 7, val).unwrap();
        }

        dem
    }

    fn remaining_pits(dem: &Raster<f64>) -> usize {
        let mut tracker = ProgressTracker::new(&SilentProgress, "");
        interior_pits(dem, &mut tracker).unwrap().len()
    }

    #[test]
    fn test_fast_breach_drains_the_sink() {
        let dem = create_dem_with_sink();
        let result = breach_depressions_fast(&dem, &BreachFastParams::default(), &SilentProgress).unwrap();

        assert_eq!(result.pits, 1);
        assert_eq!(result.breached, 1);
        assert_eq!(result.deferred, 0);
        assert_eq!(remaining_pits(&result.dem), 0, "Breaching should leave no interior pits");

        let pit = result.dem.get(3, 3).unwrap();
        assert!(pit < 7.0, "Pit sits just below its lowest neighbour, got {}", pit);
        assert_eq!(result.dem.get(6, 3).unwrap(), 1.0, "Outlet is untouched");
    }

    #[test]
    fn test_trench_descends_to_the_outlet() {
        let dem = create_dem_with_sink();
        let result = breach_depressions_fast(&dem, &BreachFastParams::default(), &SilentProgress).unwrap();
        let out = &result.dem;

        // Follow the steepest descent from the pit to the grid edge
        let (mut row, mut col) = (3usize, 3usize);
        let mut steps = 0;
        while row > 0 && row < 6 && col > 0 && col < 6 {
            let z = out.get(row, col).unwrap();
            let next = out
                .neighbours(row, col)
                .filter(|n| n.value < z)
                .min_by(|a, b| a.value.total_cmp(&b.value))
                .expect("every interior cell must have a lower neighbour");
            row = next.row as usize;
            col = next.col as usize;
            steps += 1;
            assert!(steps < 10);
        }
    }

    #[test]
    fn test_depth_limit_defers_pit_to_filling() {
        let dem = create_dem_with_sink();
        let params = BreachFastParams {
            max_depth: Some(0.5),
            ..Default::default()
        };
        let result = breach_depressions_fast(&dem, &params, &SilentProgress).unwrap();

        assert_eq!(result.breached, 0);
        assert_eq!(result.deferred, 1);
        assert_eq!(remaining_pits(&result.dem), 0);
        assert!(result.dem.get(3, 3).unwrap() > 8.0, "Pit should be filled to the spill level");
    }

    #[test]
    fn test_length_limit_allows_short_trenches() {
        let dem = create_dem_with_sink();
        let params = BreachFastParams {
            max_length: Some(5),
            ..Default::default()
        };
        let result = breach_depressions_fast(&dem, &params, &SilentProgress).unwrap();
        assert_eq!(result.breached, 1);
        assert_eq!(result.deferred, 0);
    }

    #[test]
    fn test_pointer_and_accumulation_cover_every_cell() {
        let dem = create_dem_with_sink();
        let params = BreachFastParams {
            output_pointer: true,
            flow_accumulation: true,
            ..Default::default()
        };
        let result = breach_depressions_fast(&dem, &params, &SilentProgress).unwrap();
        let pntr = result.pointer.unwrap();
        let acc = result.accumulation.unwrap();

        let mut outlet_total = 0.0;
        for row in 0..7 {
            for col in 0..7 {
                let edge = row == 0 || row == 6 || col == 0 || col == 6;
                let code = pntr.get(row, col).unwrap();
                if edge {
                    assert_eq!(code, 0.0, "Edge cells are outlets");
                    outlet_total += acc.get(row, col).unwrap();
                } else {
                    assert!(code > 0.0, "Interior cell ({}, {}) has no pointer", row, col);
                }
            }
        }
        assert_eq!(outlet_total, 49.0, "Every cell drains to exactly one outlet");
    }

    #[test]
    fn test_nodata_is_preserved() {
        let mut dem = create_dem_with_sink();
        dem.set_nodata(Some(-9999.0));
        dem.set(0, 0, -9999.0).unwrap();
        let result = breach_depressions_fast(&dem, &BreachFastParams::default(), &SilentProgress).unwrap();
        assert!(result.dem.is_nodata_at(0, 0).unwrap());
        assert_eq!(result.dem.nodata(), Some(-9999.0));
    }

    #[test]
    fn test_all_nodata_dem_is_copied_through() {
        let mut dem = Raster::filled(4, 4, -9999.0);
        dem.set_nodata(Some(-9999.0));
        let params = BreachFastParams {
            output_pointer: true,
            flow_accumulation: true,
            ..Default::default()
        };
        let result = breach_depressions_fast(&dem, &params, &SilentProgress).unwrap();

        assert_eq!(result.pits, 0);
        assert_eq!(result.breached, 0);
        assert_eq!(result.deferred, 0);
        assert_eq!(result.dem.data(), dem.data());
        for grid in [result.pointer.unwrap(), result.accumulation.unwrap()] {
            assert_eq!(grid.shape(), (4, 4));
            assert!(grid.data().iter().all(|&v| grid.is_nodata(v)));
        }
    }
}
