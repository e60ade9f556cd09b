//! Breach depressions for hydrological conditioning
//!
//! Removes depressions by "breaching": carving a channel from each pit cell
//! toward lower terrain instead of filling it. Breaching preserves more of
//! the original DEM surface than filling.
//!
//! Algorithm (least-cost breaching):
//! 1. Queue every interior pit (no lower neighbour) by elevation
//! 2. For each pit still without an outlet, try a two-cell breach through
//!    the ring of cells at distance 2
//! 3. Otherwise find the least-cost path to a lower cell inside a square
//!    window around the pit, widening the window up to `max_radius`
//! 4. Lower every cell on the path so that elevations strictly decrease
//!
//! Pits that cannot be drained within the largest window are left untouched
//! and reported as unsolved.
//!
//! Reference:
//! Lindsay, J.B. (2016). Efficient hybrid breaching-filling sink removal
//! methods for flow path enforcement in digital elevation models.
//! *Hydrological Processes*, 30(6), 846–857.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use drainflow_core::raster::neighborhood::{
    DX, DY, RING2_BRIDGES, RING2_DX, RING2_DY,
};
use drainflow_core::raster::try_array2;
use drainflow_core::{Algorithm, Error, Progress, ProgressTracker, Raster, Result};
use ndarray::Array2;

use super::grid_cell::GridCell;
use super::no_flow::{interior_pits, is_interior_pit};

const NO_LINK: i8 = -1;

/// Parameters for breach depressions
#[derive(Debug, Clone)]
pub struct BreachParams {
    /// Radius in cells of the first search window
    pub radius: usize,

    /// Largest window radius tried before a pit is reported unsolved.
    /// `None` searches only at `radius`.
    pub max_radius: Option<usize>,

    /// Maximum elevation decrement a single cell may receive. Cells whose
    /// entry cost exceeds it are barriers.
    pub max_cost: Option<f64>,

    /// Elevation step between consecutive path cells. Derived from the DEM
    /// relief when `None`.
    pub a_small_value: Option<f64>,
}

impl Default for BreachParams {
    fn default() -> Self {
        Self {
            radius: 5,
            max_radius: None,
            max_cost: None,
            a_small_value: None,
        }
    }
}

impl BreachParams {
    pub fn validate(&self) -> Result<()> {
        if self.radius == 0 {
            return Err(Error::invalid_param("radius", self.radius, "must be at least 1"));
        }
        if let Some(max) = self.max_radius {
            if max < self.radius {
                return Err(Error::invalid_param(
                    "max_radius",
                    max,
                    format!("must not be smaller than radius ({})", self.radius),
                ));
            }
        }
        if let Some(cost) = self.max_cost {
            if !(cost >= 0.0) {
                return Err(Error::invalid_param("max_cost", cost, "must be non-negative"));
            }
        }
        if let Some(a) = self.a_small_value {
            if !(a > 0.0 && a.is_finite()) {
                return Err(Error::invalid_param(
                    "a_small_value",
                    a,
                    "must be a positive finite number",
                ));
            }
        }
        Ok(())
    }
}

/// Outcome of a breaching run
#[derive(Debug, Clone)]
pub struct BreachResult {
    /// Breached DEM
    pub dem: Raster<f64>,
    /// Interior pits found in the input
    pub pits: usize,
    /// Pits given an outlet
    pub solved: usize,
    /// Pits left without an outlet
    pub unsolved: usize,
    /// Elevation step used along breach paths
    pub a_small_value: f64,
}

/// Elevation step appropriate for a DEM whose largest absolute value is
/// `max_abs`. Stricter for larger magnitudes so the step stays above the
/// data's floating-point noise.
pub fn default_small_value(max_abs: f64) -> f64 {
    match max_abs {
        z if z <= 9.0 => 0.00001,
        z if z <= 99.0 => 0.0001,
        z if z <= 9999.0 => 0.001,
        z if z <= 99999.0 => 0.01,
        _ => 1.0,
    }
}

/// Exhaustive breacher
#[derive(Debug, Clone, Default)]
pub struct BreachDepressions;

impl Algorithm for BreachDepressions {
    type Input = Raster<f64>;
    type Output = BreachResult;
    type Params = BreachParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "BreachDepressions"
    }

    fn description(&self) -> &'static str {
        "Remove depressions by carving least-cost channels out of each pit"
    }

    fn execute(&self, input: Self::Input, params: Self::Params, progress: &dyn Progress) -> Result<Self::Output> {
        breach_depressions(&input, &params, progress)
    }
}

/// Breach every interior pit of a DEM.
///
/// # Arguments
/// * `dem` - Input DEM raster
/// * `params` - Search window and elevation step
/// * `progress` - Progress sink, polled for cancellation once per pit
///
/// # Returns
/// The breached DEM with solved/unsolved pit counts
pub fn breach_depressions(
    dem: &Raster<f64>,
    params: &BreachParams,
    progress: &dyn Progress,
) -> Result<BreachResult> {
    params.validate()?;

    let stats = dem.statistics();
    let max_abs = stats.max.map_or(0.0, f64::abs);
    let a = params.a_small_value.unwrap_or_else(|| default_small_value(max_abs));
    let max_cost = params.max_cost.unwrap_or(f64::INFINITY);
    let max_radius = params.max_radius.unwrap_or(params.radius);

    let mut output = dem.clone();
    let mut tracker = ProgressTracker::new(progress, "Loop 1 of 2:");

    let mut queue: BinaryHeap<Reverse<GridCell>> = interior_pits(dem, &mut tracker)?
        .into_iter()
        .map(|(row, col)| Reverse(GridCell::new(row, col, dem.value_at(row as isize, col as isize))))
        .collect();
    let num_pits = queue.len();
    tracing::debug!("{} interior pits, step {}", num_pits, a);

    tracker.set_label("Loop 2 of 2:");
    let mut solved = 0usize;
    let mut unsolved = 0usize;
    let mut visited = 0usize;

    while let Some(Reverse(cell)) = queue.pop() {
        tracker.step(visited, num_pits)?;
        visited += 1;

        let (row, col) = (cell.row, cell.col);
        // An earlier breach path may already drain this cell.
        if !is_interior_pit(&output, row, col) {
            solved += 1;
            continue;
        }
        let z = output.value_at(row as isize, col as isize);

        if breach_through_ring(&mut output, row, col, z, a, max_cost) {
            solved += 1;
            continue;
        }

        let mut radius = params.radius;
        let mut path = None;
        loop {
            if let Some(mut surface) = CostSurface::build(&output, row, col, z, radius, a, max_cost)? {
                surface.solve();
                path = surface.path_from_centre();
            }
            if path.is_some() || radius >= max_radius {
                break;
            }
            radius = (radius * 2).min(max_radius);
        }

        match path {
            Some(steps) => {
                carve(&mut output, row, col, z, a, &steps);
                solved += 1;
            }
            None => {
                unsolved += 1;
                tracing::debug!("no breach path for pit at ({}, {})", row, col);
            }
        }
    }

    if unsolved > 0 {
        tracing::warn!("{} of {} pits could not be breached", unsolved, num_pits);
    }
    tracing::info!("Breached {} pits", solved);

    Ok(BreachResult {
        dem: output,
        pits: num_pits,
        solved,
        unsolved,
        a_small_value: a,
    })
}

/// Two-cell breach: if some cell two steps away is more than `a` below the
/// pit, lower the cheapest connecting neighbour to `z - a`. Bridges that
/// would need a decrement above `max_cost` are barriers.
fn breach_through_ring(
    dem: &mut Raster<f64>,
    row: usize,
    col: usize,
    z: f64,
    a: f64,
    max_cost: f64,
) -> bool {
    let (r, c) = (row as isize, col as isize);
    let target = z - a;
    // (bridge row, bridge col, ring elevation)
    let mut best: Option<(isize, isize, f64)> = None;
    for k in 0..16 {
        let zn2 = dem.value_at(r + RING2_DY[k], c + RING2_DX[k]);
        if dem.is_nodata(zn2) || zn2 >= target {
            continue;
        }
        if best.map_or(false, |(_, _, lowest)| zn2 >= lowest) {
            continue;
        }

        let mut cheapest: Option<(isize, isize, f64)> = None;
        for &b in RING2_BRIDGES[k] {
            let (br, bc) = (r + DY[b], c + DX[b]);
            let zb = dem.value_at(br, bc);
            if dem.is_nodata(zb) {
                continue;
            }
            let decrement = (zb - target).max(0.0);
            if decrement > max_cost {
                continue;
            }
            if cheapest.map_or(true, |(_, _, lowest)| decrement < lowest) {
                cheapest = Some((br, bc, decrement));
            }
        }
        if let Some((br, bc, _)) = cheapest {
            best = Some((br, bc, zn2));
        }
    }

    let Some((br, bc, _)) = best else {
        return false;
    };
    let cell = (br as usize, bc as usize);
    let data = dem.data_mut();
    if data[cell] > target {
        data[cell] = target;
    }
    true
}

/// Walk `steps` (neighbour indices) away from the pit, lowering each cell to
/// just below its predecessor.
fn carve(dem: &mut Raster<f64>, row: usize, col: usize, z: f64, a: f64, steps: &[usize]) {
    let (mut r, mut c) = (row as isize, col as isize);
    let mut previous_z = z;
    let data = dem.data_mut();
    for &b in steps {
        r += DY[b];
        c += DX[b];
        let cell = (r as usize, c as usize);
        if data[cell] > previous_z - a {
            data[cell] = previous_z - a;
        }
        previous_z = data[cell];
    }
}

/// Accumulated breach cost over a square window centred on a pit.
///
/// `cost` is the price of lowering each window cell onto a strictly
/// descending path; `acc` the cheapest known cost to reach a lower cell from
/// there, and `back_link` the neighbour that achieves it.
pub(crate) struct CostSurface {
    size: usize,
    cost: Array2<f64>,
    acc: Array2<f64>,
    back_link: Array2<i8>,
    dist: [f64; 8],
}

impl CostSurface {
    /// Window of the given radius around `(row, col)`; `None` when no cell
    /// in it is low enough to drain the pit.
    pub(crate) fn build(
        dem: &Raster<f64>,
        row: usize,
        col: usize,
        z: f64,
        radius: usize,
        a: f64,
        max_cost: f64,
    ) -> Result<Option<Self>> {
        let size = 2 * radius + 1;
        let mut cost = try_array2(size, size, f64::INFINITY)?;
        let mut acc = try_array2(size, size, f64::INFINITY)?;
        let back_link = try_array2(size, size, NO_LINK)?;
        let rad = radius as isize;
        let mut any_source = false;

        for k in 0..size {
            for j in 0..size {
                let dr = k as isize - rad;
                let dc = j as isize - rad;
                let zn = dem.value_at(row as isize + dr, col as isize + dc);
                if dem.is_nodata(zn) {
                    continue;
                }
                let decrement = (dr.unsigned_abs() + dc.unsigned_abs()) as f64 * a;
                if zn + decrement < z {
                    cost[(k, j)] = 0.0;
                    acc[(k, j)] = 0.0;
                    any_source = true;
                } else {
                    let entry = (zn - z) + decrement;
                    if entry <= max_cost {
                        cost[(k, j)] = entry;
                    }
                }
            }
        }
        cost[(radius, radius)] = 0.0;
        acc[(radius, radius)] = f64::INFINITY;

        if !any_source {
            return Ok(None);
        }

        let (csx, csy) = (dem.cell_size_x(), dem.cell_size_y());
        let min_size = csx.min(csy);
        let diag = (csx * csx + csy * csy).sqrt() / min_size;
        let dist = [
            diag,
            csx / min_size,
            diag,
            csy / min_size,
            diag,
            csx / min_size,
            diag,
            csy / min_size,
        ];

        Ok(Some(Self {
            size,
            cost,
            acc,
            back_link,
            dist,
        }))
    }

    /// Offer cell `(k, j)` every neighbour's accumulated cost.
    fn relax(&mut self, k: usize, j: usize) -> bool {
        let own = self.cost[(k, j)];
        if own.is_infinite() || self.acc[(k, j)] == 0.0 {
            return false;
        }
        let mut changed = false;
        for n in 0..8 {
            let kn = k as isize + DY[n];
            let jn = j as isize + DX[n];
            if kn < 0 || jn < 0 || kn as usize >= self.size || jn as usize >= self.size {
                continue;
            }
            let neighbour = (kn as usize, jn as usize);
            let reach = self.acc[neighbour];
            if reach.is_infinite() {
                continue;
            }
            let candidate = reach + (own + self.cost[neighbour]) / 2.0 * self.dist[n];
            if candidate < self.acc[(k, j)] {
                self.acc[(k, j)] = candidate;
                self.back_link[(k, j)] = n as i8;
                changed = true;
            }
        }
        changed
    }

    /// One round of five raster sweeps. Returns whether any cost dropped.
    pub(crate) fn relax_round(&mut self) -> bool {
        let n = self.size;
        let mut changed = false;
        for order in 0..5u8 {
            for outer in 0..n {
                for inner in 0..n {
                    let (k, j) = match order {
                        0 => (outer, inner),
                        1 => (n - 1 - outer, n - 1 - inner),
                        2 => (outer, n - 1 - inner),
                        3 => (n - 1 - outer, inner),
                        _ => (inner, outer),
                    };
                    changed |= self.relax(k, j);
                }
            }
        }
        changed
    }

    /// Relax until a round makes no change. Each improving round fixes at
    /// least one more shortest path, so `size^2 + 1` rounds always suffice.
    pub(crate) fn solve(&mut self) -> usize {
        let limit = self.size * self.size + 1;
        let mut rounds = 0;
        while rounds < limit {
            rounds += 1;
            if !self.relax_round() {
                break;
            }
        }
        rounds
    }

    /// Neighbour steps from the centre to the cheapest lower cell
    pub(crate) fn path_from_centre(&self) -> Option<Vec<usize>> {
        let centre = self.size / 2;
        if self.acc[(centre, centre)].is_infinite() {
            return None;
        }
        let (mut k, mut j) = (centre, centre);
        let mut steps = Vec::new();
        while self.back_link[(k, j)] != NO_LINK {
            if steps.len() > self.size * self.size {
                return None;
            }
            let b = self.back_link[(k, j)] as usize;
            steps.push(b);
            k = (k as isize + DY[b]) as usize;
            j = (j as isize + DX[b]) as usize;
        }
        Some(steps)
    }

    #[cfg(test)]
    fn accumulated(&self) -> &Array2<f64> {
        &self.acc
    }
}
