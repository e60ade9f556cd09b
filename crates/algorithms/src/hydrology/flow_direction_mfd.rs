//! FD8 (Quinn) multiple flow direction accumulation
//!
//! Distributes flow from each cell to ALL lower neighbours, in proportion
//! to the elevation drop raised to a power:
//!
//!   f_i = Δz_i^p / Σ Δz_j^p
//!
//! Larger exponents concentrate flow on the steepest neighbour and the
//! routing converges toward D8. An optional threshold switches cells whose
//! accumulation reaches it to single-neighbour (D8) routing, which keeps
//! channels from dispersing.
//!
//! References:
//! - Quinn, P. et al. (1991). The prediction of hillslope flow paths.
//!   *Hydrological Processes*, 5(1), 59–79.
//! - Freeman, T.G. (1991). Calculating catchment area with divergent flow
//!   based on a regular grid. *Computers & Geosciences*, 17(3), 413–422.

use super::flow_accumulation::{finalize, AccumOutput, AccumParams};
use drainflow_core::raster::neighborhood::{offset, DISTANCES};
use drainflow_core::raster::try_array2;
use drainflow_core::{Algorithm, Error, Progress, ProgressTracker, Raster, Result};
use ndarray::Array2;

/// Exponents above this are clamped; the routing is D8 in all but name.
pub const MAX_POWER: f64 = 10.0;

/// Parameters for FD8 flow accumulation
#[derive(Debug, Clone)]
pub struct Fd8Params {
    /// Exponent applied to elevation drops (default 1.0)
    pub power: f64,
    /// Accumulation at which a cell switches to D8 routing
    pub threshold: Option<f64>,
    /// Unit of the output grid
    pub output_type: AccumOutput,
    /// Natural-log transform of the output
    pub log_transform: bool,
}

impl Default for Fd8Params {
    fn default() -> Self {
        Self {
            power: 1.0,
            threshold: None,
            output_type: AccumOutput::Cells,
            log_transform: false,
        }
    }
}

impl Fd8Params {
    pub fn validate(&self) -> Result<()> {
        if !self.power.is_finite() || self.power < 0.0 {
            return Err(Error::invalid_param("power", self.power, "must be a non-negative number"));
        }
        if let Some(t) = self.threshold {
            if !t.is_finite() || t <= 0.0 {
                return Err(Error::invalid_param("threshold", t, "must be positive"));
            }
        }
        Ok(())
    }

    /// Exponent actually used
    pub fn effective_power(&self) -> f64 {
        self.power.min(MAX_POWER)
    }

    fn accum_params(&self) -> AccumParams {
        AccumParams {
            output_type: self.output_type,
            log_transform: self.log_transform,
        }
    }
}

/// Share of flow sent to each neighbour of a valid cell.
///
/// Shares are zero for neighbours that are not lower or not valid. When no
/// neighbour is lower every share is zero and the cell contributes nothing
/// downstream; otherwise the shares sum to 1.
pub fn fd8_proportions(dem: &Raster<f64>, row: usize, col: usize, power: f64) -> [f64; 8] {
    let z = dem.value_at(row as isize, col as isize);
    let mut shares = [0.0; 8];
    if dem.is_nodata(z) {
        return shares;
    }

    let mut total_relief = 0.0;
    for n in dem.neighbours(row, col) {
        if n.value < z && !dem.is_nodata(n.value) {
            let w = (z - n.value).powf(power);
            shares[n.index] = w;
            total_relief += w;
        }
    }

    if total_relief > 0.0 && total_relief.is_finite() {
        for s in shares.iter_mut() {
            *s /= total_relief;
        }
    } else {
        shares = [0.0; 8];
    }
    shares
}

/// Steepest lower neighbour by distance-weighted drop
fn steepest_lower(dem: &Raster<f64>, row: usize, col: usize, z: f64, cell_size: f64) -> Option<usize> {
    let mut max_slope = f64::NEG_INFINITY;
    let mut best = None;
    for n in dem.neighbours(row, col) {
        if n.value < z && !dem.is_nodata(n.value) {
            let slope = (z - n.value) / (DISTANCES[n.index] * cell_size);
            if slope > max_slope {
                max_slope = slope;
                best = Some(n.index);
            }
        }
    }
    best
}

/// Compute FD8 flow accumulation from a DEM.
///
/// Every valid cell starts at 1 and is released once all of its higher
/// neighbours have passed their flow on. Released cells are processed from
/// an explicit stack.
///
/// # Arguments
/// * `dem` - Input DEM (should be hydrologically conditioned)
/// * `params` - Exponent, threshold and output unit
/// * `progress` - Progress sink
pub fn flow_accumulation_fd8(
    dem: &Raster<f64>,
    params: &Fd8Params,
    progress: &dyn Progress,
) -> Result<Raster<f64>> {
    params.validate()?;
    let power = params.effective_power();
    if power < params.power {
        tracing::warn!("FD8 exponent {} clamped to {}", params.power, MAX_POWER);
    }

    let (rows, cols) = dem.shape();
    let nodata = dem.nodata_value();
    let cell_size = dem.cell_size();
    let mut tracker = ProgressTracker::new(progress, "Counting inflowing neighbours:");

    let mut inflow: Array2<i8> = try_array2(rows, cols, -1)?;
    let mut output = Raster::try_from_template(dem, 1.0, Some(nodata))?;
    for row in 0..rows {
        for col in 0..cols {
            let z = dem.value_at(row as isize, col as isize);
            if dem.is_nodata(z) {
                output.data_mut()[(row, col)] = nodata;
                continue;
            }
            inflow[(row, col)] = dem
                .neighbours(row, col)
                .filter(|n| n.value > z && !dem.is_nodata(n.value))
                .count() as i8;
        }
        tracker.step(row, rows)?;
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
                    let value = acc[(r, c)];
                    let z = dem.value_at(r as isize, c as isize);

                    let shares = match params.threshold {
                        Some(t) if value >= t => {
                            let mut single = [0.0; 8];
                            if let Some(i) = steepest_lower(dem, r, c, z, cell_size) {
                                single[i] = 1.0;
                            }
                            single
                        }
                        _ => fd8_proportions(dem, r, c, power),
                    };

                    for i in 0..8 {
                        let (nr, nc) = offset(r, c, i);
                        let zn = dem.value_at(nr, nc);
                        if dem.is_nodata(zn) || zn >= z {
                            continue;
                        }
                        let (nr, nc) = (nr as usize, nc as usize);
                        acc[(nr, nc)] += value * shares[i];
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

    finalize(&mut output, &params.accum_params(), &mut tracker)?;
    Ok(output)
}

/// FD8 flow accumulation
#[derive(Debug, Clone, Default)]
pub struct FlowAccumFd8;

impl Algorithm for FlowAccumFd8 {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = Fd8Params;
    type Error = Error;

    fn name(&self) -> &'static str {
        "FlowAccumFD8"
    }

    fn description(&self) -> &'static str {
        "Calculate FD8 (Quinn) multiple flow direction accumulation from a DEM"
    }

    fn execute(&self, input: Self::Input, params: Self::Params, progress: &dyn Progress) -> Result<Self::Output> {
        flow_accumulation_fd8(&input, &params, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use drainflow_core::{GeoTransform, SilentProgress};

    /// Cone sloping down to a single corner at (4, 4)
    fn corner_slope() -> Raster<f64> {
        let mut dem = Raster::new(5, 5);
        dem.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));
        for row in 0..5 {
            for col in 0..5 {
                dem.set(row, col, 20.0 - row as f64 - col as f64).unwrap();
            }
        }
        dem
    }

    #[test]
    fn test_proportions_sum_to_one() {
        let dem = corner_slope();
        for row in 0..4 {
            for col in 0..4 {
                let total: f64 = fd8_proportions(&dem, row, col, 1.1).iter().sum();
                assert_relative_eq!(total, 1.0, epsilon = 1e-12);
            }
        }
        let outlet: f64 = fd8_proportions(&dem, 4, 4, 1.0).iter().sum();
        assert_eq!(outlet, 0.0, "Lowest cell has no lower neighbour");
    }

    #[test]
    fn test_proportions_weight_by_drop() {
        let dem = corner_slope();
        // From (2, 2): E and S drop 1, SE drops 2, NE and SW drop 0
        let shares = fd8_proportions(&dem, 2, 2, 1.0);
        assert_relative_eq!(shares[1], 0.25);
        assert_relative_eq!(shares[3], 0.25);
        assert_relative_eq!(shares[2], 0.5);
        assert_eq!(shares[0], 0.0);
    }

    #[test]
    fn test_all_flow_reaches_outlet() {
        let dem = corner_slope();
        let acc = flow_accumulation_fd8(&dem, &Fd8Params::default(), &SilentProgress).unwrap();
        assert_relative_eq!(acc.get(4, 4).unwrap(), 25.0, epsilon = 1e-9);
        assert_relative_eq!(acc.get(0, 0).unwrap(), 1.0);
    }

    #[test]
    fn test_threshold_switches_to_single_direction() {
        let dem = corner_slope();
        let params = Fd8Params {
            threshold: Some(1.0),
            ..Default::default()
        };
        let acc = flow_accumulation_fd8(&dem, &params, &SilentProgress).unwrap();
        // Interior cells route to their SE neighbour only, so (1, 1) receives
        // nothing but (0, 0)
        assert_relative_eq!(acc.get(1, 1).unwrap(), 2.0);
        assert_relative_eq!(acc.get(0, 1).unwrap(), 1.0);
        assert_relative_eq!(acc.get(4, 4).unwrap(), 25.0, epsilon = 1e-9);

        let dispersed = flow_accumulation_fd8(&dem, &Fd8Params::default(), &SilentProgress).unwrap();
        assert!(dispersed.get(1, 1).unwrap() > 2.0);
    }

    #[test]
    fn test_power_is_clamped_and_validated() {
        let params = Fd8Params {
            power: 25.0,
            ..Default::default()
        };
        assert_eq!(params.effective_power(), MAX_POWER);
        assert!(params.validate().is_ok());

        let bad = Fd8Params {
            power: -1.0,
            ..Default::default()
        };
        let err = flow_accumulation_fd8(&corner_slope(), &bad, &SilentProgress).unwrap_err();
        assert!(err.is_configuration());
    }
}
