//! D-infinity flow accumulation
//!
//! Routes each cell's accumulated value to the two neighbours bracketing
//! its D∞ azimuth, split in proportion to the angular distance from each.
//! Input is a pointer grid produced by
//! [`dinf_pointer`](super::flow_direction_dinf::dinf_pointer).

use super::flow_accumulation::{finalize, AccumParams};
use drainflow_core::raster::neighborhood::{back_link, offset};
use drainflow_core::raster::try_array2;
use drainflow_core::{Algorithm, Error, Progress, ProgressTracker, Raster, Result};
use ndarray::Array2;

/// Flow proportions sent from a cell with the given azimuth.
///
/// Returns the two receiving neighbour indices (see
/// [`neighborhood`](drainflow_core::raster::neighborhood)) with their
/// shares, or `None` for negative azimuths (no flow). Shares sum to 1; one
/// of them is 0 when the azimuth is exactly grid-aligned.
pub fn dinf_proportions(azimuth: f64) -> Option<[(usize, f64); 2]> {
    if !(0.0..=360.0).contains(&azimuth) {
        return None;
    }
    let k = ((azimuth / 45.0).floor() as usize).min(7);
    let upper = (k + 1) as f64 * 45.0;
    let lower = k as f64 * 45.0;
    Some([
        ((k + 7) % 8, (upper - azimuth) / 45.0),
        (k, (azimuth - lower) / 45.0),
    ])
}

/// Whether a pointer value can be routed, `Err` for azimuths past 360°.
fn checked_azimuth(pointer: &Raster<f64>, row: usize, col: usize) -> Result<Option<f64>> {
    let value = pointer.value_at(row as isize, col as isize);
    if pointer.is_nodata(value) {
        return Ok(None);
    }
    if value > 360.0 {
        return Err(Error::InvalidPointer { row, col, value });
    }
    Ok(Some(value))
}

/// Number of valid neighbours sending a positive share into `(row, col)`
fn inflow_count(pointer: &Raster<f64>, row: usize, col: usize) -> i8 {
    pointer
        .neighbours(row, col)
        .filter(|n| !pointer.is_nodata(n.value))
        .filter(|n| {
            let toward_centre = back_link(n.index);
            dinf_proportions(n.value)
                .is_some_and(|shares| shares.iter().any(|&(i, p)| i == toward_centre && p > 0.0))
        })
        .count() as i8
}

/// D-infinity flow accumulation.
///
/// Every valid cell starts at 1. A cell is released once every neighbour
/// draining into it has been processed; released cells are handled from an
/// explicit stack, so arbitrarily long flow paths cost no call depth.
///
/// # Errors
/// [`Error::InvalidPointer`] for azimuths greater than 360.
pub fn flow_accumulation_dinf(
    pointer: &Raster<f64>,
    params: &AccumParams,
    progress: &dyn Progress,
) -> Result<Raster<f64>> {
    let (rows, cols) = pointer.shape();
    let nodata = pointer.nodata_value();
    let mut tracker = ProgressTracker::new(progress, "Counting inflowing neighbours:");

    let mut inflow: Array2<i8> = try_array2(rows, cols, -1)?;
    for row in 0..rows {
        for col in 0..cols {
            if checked_azimuth(pointer, row, col)?.is_some() {
                inflow[(row, col)] = inflow_count(pointer, row, col);
            }
        }
        tracker.step(row, rows)?;
    }

    let mut output = Raster::try_from_template(pointer, 1.0, Some(nodata))?;
    for ((row, col), &n) in inflow.indexed_iter() {
        if n < 0 {
            output.data_mut()[(row, col)] = nodata;
        }
    }

    tracker.set_label("Accumulating flow:");
    let mut stack: Vec<(usize, usize)> = Vec::new();
    {
        let acc = output.data_mut();
        for row in 0..rows {
            for col in 0..cols {
                if inflow[(row, col)] != 0 {
                    continue;
                }
                inflow[(row, col)] = -1;
                stack.push((row, col));

                while let Some((r, c)) = stack.pop() {
                    let Some(shares) = dinf_proportions(pointer.value_at(r as isize, c as isize)) else {
                        continue;
                    };
                    let value = acc[(r, c)];
                    for (i, p) in shares {
                        if p <= 0.0 {
                            continue;
                        }
                        let (nr, nc) = offset(r, c, i);
                        if !pointer.is_valid_at(nr, nc) {
                            continue;
                        }
                        let (nr, nc) = (nr as usize, nc as usize);
                        acc[(nr, nc)] += value * p;
                        inflow[(nr, nc)] -= 1;
                        if inflow[(nr, nc)] == 0 {
                            inflow[(nr, nc)] = -1;
                            stack.push((nr, nc));
                        }
                    }
                }
            }
            tracker.step(row, rows)?;
        }
    }

    finalize(&mut output, params, &mut tracker)?;
    Ok(output)
}

/// D-infinity flow accumulation
#[derive(Debug, Clone, Default)]
pub struct FlowAccumDinf;

impl Algorithm for FlowAccumDinf {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = AccumParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "FlowAccumDinf"
    }

    fn description(&self) -> &'static str {
        "Calculate D-infinity flow accumulation from a D-infinity pointer grid"
    }

    fn execute(&self, input: Self::Input, params: Self::Params, progress: &dyn Progress) -> Result<Self::Output> {
        flow_accumulation_dinf(&input, &params, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::flow_direction_dinf::dinf_pointer;
    use approx::assert_relative_eq;
    use drainflow_core::{GeoTransform, SilentProgress};

    #[test]
    fn test_proportions_sum_to_one() {
        for tenth in 0..=3600 {
            let azimuth = tenth as f64 / 10.0;
            let shares = dinf_proportions(azimuth).unwrap();
            let total: f64 = shares.iter().map(|&(_, p)| p).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-12);
            assert!(shares.iter().all(|&(_, p)| (0.0..=1.0).contains(&p)));
        }
        assert!(dinf_proportions(-1.0).is_none());
    }

    #[test]
    fn test_proportions_bracket_the_azimuth() {
        // 0° is due north
        assert_eq!(dinf_proportions(0.0).unwrap(), [(7, 1.0), (0, 0.0)]);
        // 90° is due east
        assert_eq!(dinf_proportions(90.0).unwrap(), [(1, 1.0), (2, 0.0)]);
        // 360° wraps to north
        assert_eq!(dinf_proportions(360.0).unwrap(), [(6, 0.0), (7, 1.0)]);

        let shares = dinf_proportions(112.5).unwrap();
        assert_eq!((shares[0].0, shares[1].0), (1, 2), "Between E and SE");
        assert_relative_eq!(shares[0].1, 0.5);
    }

    #[test]
    fn test_split_flow_conserves_mass() {
        // One cell splitting toward E and SE, both of which drain off-grid
        let pntr = Raster::from_vec(
            vec![
                -1.0, -1.0, -1.0,
                -1.0, 112.5, 90.0,
                -1.0, -1.0, 90.0,
            ],
            3,
            3,
        )
        .unwrap();
        let acc = flow_accumulation_dinf(&pntr, &AccumParams::default(), &SilentProgress).unwrap();
        assert_relative_eq!(acc.get(1, 2).unwrap(), 1.5);
        assert_relative_eq!(acc.get(2, 2).unwrap(), 1.5);
        assert_relative_eq!(acc.get(1, 1).unwrap(), 1.0);
    }

    #[test]
    fn test_plane_accumulates_along_rows() {
        let mut dem = Raster::new(4, 4);
        dem.set_transform(GeoTransform::new(0.0, 4.0, 1.0, -1.0));
        for row in 0..4 {
            for col in 0..4 {
                dem.set(row, col, 10.0 - col as f64).unwrap();
            }
        }
        let pntr = dinf_pointer(&dem, &SilentProgress).unwrap();
        let acc = flow_accumulation_dinf(&pntr, &AccumParams::default(), &SilentProgress).unwrap();
        for row in 0..4 {
            assert_relative_eq!(acc.get(row, 2).unwrap(), 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_azimuth_past_full_turn_is_rejected() {
        let pntr: Raster<f64> = Raster::filled(2, 2, 400.0);
        let err = flow_accumulation_dinf(&pntr, &AccumParams::default(), &SilentProgress).unwrap_err();
        assert!(matches!(err, Error::InvalidPointer { row: 0, col: 0, .. }));
    }
}
