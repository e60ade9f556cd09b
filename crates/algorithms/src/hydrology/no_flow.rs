//! Cells without a downslope neighbour
//!
//! A valid cell is a no-flow cell when none of its valid neighbours is
//! strictly lower. After breaching or filling, only cells draining off the
//! grid or into no-data should remain.

use drainflow_core::{Algorithm, Error, Progress, ProgressTracker, Raster, Result};

/// Whether any valid neighbour of `(row, col)` is strictly lower than `z`
#[inline]
pub fn has_lower_neighbour(dem: &Raster<f64>, row: usize, col: usize, z: f64) -> bool {
    dem.neighbours(row, col)
        .any(|n| n.value < z && !dem.is_nodata(n.value))
}

/// Whether `(row, col)` is an interior pit: valid, every neighbour valid
/// and none of them lower.
#[inline]
pub fn is_interior_pit(dem: &Raster<f64>, row: usize, col: usize) -> bool {
    let z = dem.value_at(row as isize, col as isize);
    if dem.is_nodata(z) {
        return false;
    }
    let mut lower = false;
    for n in dem.neighbours(row, col) {
        if dem.is_nodata(n.value) {
            return false;
        }
        if n.value < z {
            lower = true;
        }
    }
    !lower
}

/// Interior pits in row-major order
pub fn interior_pits(dem: &Raster<f64>, tracker: &mut ProgressTracker<'_>) -> Result<Vec<(usize, usize)>> {
    let (rows, cols) = dem.shape();
    let mut pits = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            if is_interior_pit(dem, row, col) {
                pits.push((row, col));
            }
        }
        tracker.step(row, rows)?;
    }
    Ok(pits)
}

/// Flag every valid cell with no lower valid neighbour.
///
/// Output is 1 for a no-flow cell, 0 for any other valid cell and no-data
/// where the DEM is no-data.
pub fn find_no_flow_cells(dem: &Raster<f64>, progress: &dyn Progress) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let nodata = dem.nodata_value();
    let mut output: Raster<f64> = Raster::try_from_template(dem, 0.0, Some(nodata))?;
    let mut tracker = ProgressTracker::new(progress, "Finding no-flow cells:");
    let mut count = 0usize;

    for row in 0..rows {
        for col in 0..cols {
            let z = dem.value_at(row as isize, col as isize);
            let flag = if dem.is_nodata(z) {
                nodata
            } else if has_lower_neighbour(dem, row, col, z) {
                0.0
            } else {
                count += 1;
                1.0
            };
            output.data_mut()[(row, col)] = flag;
        }
        tracker.step(row, rows)?;
    }

    tracing::info!("{} no-flow cells", count);
    Ok(output)
}

/// No-flow cell finder
#[derive(Debug, Clone, Default)]
pub struct FindNoFlowCells;

impl Algorithm for FindNoFlowCells {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "FindNoFlowCells"
    }

    fn description(&self) -> &'static str {
        "Flag cells that have no lower neighbour"
    }

    fn execute(&self, input: Self::Input, _params: (), progress: &dyn Progress) -> Result<Self::Output> {
        find_no_flow_cells(&input, progress)
    }
}
