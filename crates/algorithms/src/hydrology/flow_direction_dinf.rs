//! D-infinity (D∞) flow pointer
//!
//! Computes continuous flow direction angles based on the eight triangular
//! facets formed by the centre cell and each pair of adjacent neighbours.
//! The direction is the steepest downslope angle over all facets.
//!
//! Output azimuths are in degrees clockwise from north, in [0, 360),
//! rounded to a tenth of a degree. Cells with no downslope facet hold -1.
//!
//! Reference:
//! Tarboton, D.G. (1997). A new method for the determination of flow
//! directions and upslope areas in grid digital elevation models.
//! *Water Resources Research*, 33(2), 309–319.

use crate::maybe_rayon::map_rows;
use drainflow_core::{Algorithm, Error, Progress, ProgressTracker, Raster, Result};
use ndarray::Array2;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, SQRT_2};

/// Value written for cells without a downslope facet
pub const NO_FLOW: f64 = -1.0;

/// Cardinal corner of each facet, as (row, col) offsets
const FACET_E1: [(isize, isize); 8] = [
    (0, 1),  // E
    (-1, 0), // N
    (-1, 0), // N
    (0, -1), // W
    (0, -1), // W
    (1, 0),  // S
    (1, 0),  // S
    (0, 1),  // E
];

/// Diagonal corner of each facet, as (row, col) offsets
const FACET_E2: [(isize, isize); 8] = [
    (-1, 1),  // NE
    (-1, 1),  // NE
    (-1, -1), // NW
    (-1, -1), // NW
    (1, -1),  // SW
    (1, -1),  // SW
    (1, 1),   // SE
    (1, 1),   // SE
];

/// Quarter turns from east to the facet's cardinal edge
const FACET_AC: [f64; 8] = [0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0];

/// Whether the in-facet angle runs counter-clockwise (+1) or clockwise (-1)
const FACET_AF: [f64; 8] = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];

/// D-infinity flow pointer
#[derive(Debug, Clone, Default)]
pub struct DInfPointer;

impl Algorithm for DInfPointer {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "DInfPointer"
    }

    fn description(&self) -> &'static str {
        "Calculate the D-infinity flow direction of a DEM"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params, progress: &dyn Progress) -> Result<Self::Output> {
        dinf_pointer(&input, progress)
    }
}

/// Steepest facet direction at a valid cell.
///
/// Returns `(angle, slope)` with the angle in radians counter-clockwise from
/// east, or `None` when no facet descends.
fn steepest_facet(dem: &Raster<f64>, row: usize, col: usize, res: f64) -> Option<(f64, f64)> {
    let e0 = dem.value_at(row as isize, col as isize);
    let diag = res * SQRT_2;
    let mut best: Option<(f64, f64)> = None;

    for a in 0..8 {
        let (r1, c1) = FACET_E1[a];
        let (r2, c2) = FACET_E2[a];
        let e1 = dem.value_at(row as isize + r1, col as isize + c1);
        let e2 = dem.value_at(row as isize + r2, col as isize + c2);
        if dem.is_nodata(e1) || dem.is_nodata(e2) {
            continue;
        }

        let (r, s) = if e0 > e1 && e0 > e2 {
            let s1 = (e0 - e1) / res;
            let s2 = (e1 - e2) / res;
            let r = (s2 / s1).atan();
            if r < 0.0 {
                (0.0, s1)
            } else if r > FRAC_PI_4 {
                (FRAC_PI_4, (e0 - e2) / diag)
            } else {
                (r, s1.hypot(s2))
            }
        } else if e0 > e1 {
            (0.0, (e0 - e1) / res)
        } else if e0 > e2 {
            (FRAC_PI_4, (e0 - e2) / diag)
        } else {
            continue;
        };

        if best.map_or(true, |(_, max)| s >= max) {
            best = Some((FACET_AF[a] * r + FACET_AC[a] * FRAC_PI_2, s));
        }
    }

    best.filter(|&(_, s)| s > 0.0)
}

/// Convert a counter-clockwise-from-east angle to a compass azimuth.
fn to_azimuth(angle: f64) -> f64 {
    let degrees = (angle.to_degrees() * 10.0).round() / 10.0;
    let mut azimuth = 450.0 - degrees;
    while azimuth >= 360.0 {
        azimuth -= 360.0;
    }
    azimuth
}

/// Calculate the D-infinity flow direction of every cell.
///
/// # Arguments
/// * `dem` - Input DEM, ideally hydrologically conditioned
/// * `progress` - Progress sink
///
/// # Returns
/// Raster<f64> of azimuths in degrees, [`NO_FLOW`] for cells without a
/// downslope facet, no-data where the DEM is no-data
pub fn dinf_pointer(dem: &Raster<f64>, progress: &dyn Progress) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let nodata = dem.nodata_value();
    let res = dem.cell_size();
    let mut tracker = ProgressTracker::new(progress, "Calculating D-infinity pointer:");

    let data = map_rows(rows, cols, &mut tracker, |row| {
        (0..cols)
            .map(|col| {
                if dem.is_nodata(dem.value_at(row as isize, col as isize)) {
                    return nodata;
                }
                match steepest_facet(dem, row, col, res) {
                    Some((angle, _)) => to_azimuth(angle),
                    None => NO_FLOW,
                }
            })
            .collect()
    })?;

    let mut output = Raster::from_template(dem, 0.0, Some(nodata));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}
