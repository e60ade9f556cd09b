//! D8 flow pointer
//!
//! Points each cell at its steepest downslope neighbour using the D8
//! (deterministic eight-node) method.
//!
//! Pointer encoding:
//! ```text
//!   64 128   1
//!   32   0   2
//!   16   8   4
//! ```
//! 0 = pit or flat (no outflow).

use crate::maybe_rayon::map_rows;
use drainflow_core::raster::neighborhood::{DISTANCES, POINTER_CODES};
use drainflow_core::{Algorithm, Error, Progress, ProgressTracker, Raster, Result};
use ndarray::Array2;

/// D8 flow pointer
#[derive(Debug, Clone, Default)]
pub struct D8Pointer;

impl Algorithm for D8Pointer {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "D8Pointer"
    }

    fn description(&self) -> &'static str {
        "Calculate the D8 flow pointer of a DEM"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params, progress: &dyn Progress) -> Result<Self::Output> {
        d8_pointer(&input, progress)
    }
}

/// Steepest-descent neighbour index of `(row, col)`, `None` for sinks.
///
/// Drops are divided by the distance to each neighbour; ties go to the
/// first neighbour clockwise from north-east.
pub fn steepest_neighbour(dem: &Raster<f64>, row: usize, col: usize) -> Option<usize> {
    let z = dem.value_at(row as isize, col as isize);
    if dem.is_nodata(z) {
        return None;
    }
    let cell_size = dem.cell_size();
    let mut max_slope = 0.0_f64;
    let mut best = None;
    for n in dem.neighbours(row, col) {
        if dem.is_nodata(n.value) {
            continue;
        }
        let slope = (z - n.value) / (DISTANCES[n.index] * cell_size);
        if slope > max_slope {
            max_slope = slope;
            best = Some(n.index);
        }
    }
    best
}

/// Calculate the D8 flow pointer of a DEM.
///
/// The input DEM should ideally be hydrologically conditioned (breached or
/// filled) for meaningful results.
///
/// # Arguments
/// * `dem` - Input DEM
/// * `progress` - Progress sink
///
/// # Returns
/// Raster<f64> with pointer codes, no-data where the DEM is no-data
pub fn d8_pointer(dem: &Raster<f64>, progress: &dyn Progress) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let nodata = dem.nodata_value();
    let mut tracker = ProgressTracker::new(progress, "Calculating D8 pointer:");

    let data = map_rows(rows, cols, &mut tracker, |row| {
        (0..cols)
            .map(|col| {
                if dem.is_nodata(dem.value_at(row as isize, col as isize)) {
                    nodata
                } else {
                    steepest_neighbour(dem, row, col)
                        .map_or(0.0, |i| f64::from(POINTER_CODES[i]))
                }
            })
            .collect()
    })?;

    let mut output = Raster::from_template(dem, 0.0, Some(nodata));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drainflow_core::{GeoTransform, SilentProgress};

    fn plane(f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let mut dem = Raster::new(5, 5);
        dem.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));
        for row in 0..5 {
            for col in 0..5 {
                dem.set(row, col, f(row, col)).unwrap();
            }
        }
        dem
    }

    #[test]
    fn test_pointer_slope_east() {
        let dem = plane(|_, col| (5 - col) as f64 * 10.0);
        let pntr = d8_pointer(&dem, &SilentProgress).unwrap();
        let center = pntr.get(2, 2).unwrap();
        assert_eq!(center, 2.0, "Expected pointer E (2), got {}", center);
    }

    #[test]
    fn test_pointer_slope_south() {
        let dem = plane(|row, _| (5 - row) as f64 * 10.0);
        let pntr = d8_pointer(&dem, &SilentProgress).unwrap();
        let center = pntr.get(2, 2).unwrap();
        assert_eq!(center, 8.0, "Expected pointer S (8), got {}", center);
    }

    #[test]
    fn test_pointer_pit_is_zero() {
        let dem = plane(|row, col| {
            let dr = row as f64 - 2.0;
            let dc = col as f64 - 2.0;
            dr * dr + dc * dc
        });
        let pntr = d8_pointer(&dem, &SilentProgress).unwrap();
        assert_eq!(pntr.get(2, 2).unwrap(), 0.0, "Pit should have no pointer");
        assert_eq!(pntr.get(0, 0).unwrap(), 4.0, "Corner should point SE toward the pit");
    }

    #[test]
    fn test_pointer_propagates_nodata() {
        let mut dem = plane(|_, col| (5 - col) as f64);
        dem.set_nodata(Some(-9999.0));
        dem.set(2, 3, -9999.0).unwrap();

        let pntr = d8_pointer(&dem, &SilentProgress).unwrap();
        assert!(pntr.is_nodata_at(2, 3).unwrap());
        assert_eq!(pntr.nodata(), Some(-9999.0));
        // (2, 2) can no longer drain east; NE and SE tie, NE comes first
        assert_eq!(pntr.get(2, 2).unwrap(), 1.0);
    }
}
