//! D8 flow accumulation
//!
//! Counts the cells draining through each cell of a D8 pointer grid by
//! pushing accumulated values down the pointer chains, starting from cells
//! with no inflowing neighbours.
//!
//! Every valid cell contributes one unit, so a cell with nothing upstream
//! holds 1 and an outlet holds the cell count of its whole basin.

use drainflow_core::raster::neighborhood::{code_to_index, is_conformant_code, offset, INFLOWING_CODES};
use drainflow_core::raster::try_array2;
use drainflow_core::{Algorithm, Error, Progress, ProgressTracker, Raster, RasterElement, Result};
use ndarray::Array2;
use std::fmt;
use std::str::FromStr;

/// Unit of an accumulation grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccumOutput {
    /// Number of contributing cells
    #[default]
    Cells,
    /// Contributing area per unit contour width (cells × cell size)
    SpecificCatchmentArea,
    /// Contributing area (cells × cell area)
    TotalCatchmentArea,
}

impl AccumOutput {
    /// Factor turning a cell count into this unit
    pub fn scale(self, cell_size: f64) -> f64 {
        match self {
            AccumOutput::Cells => 1.0,
            AccumOutput::SpecificCatchmentArea => cell_size,
            AccumOutput::TotalCatchmentArea => cell_size * cell_size,
        }
    }
}

impl FromStr for AccumOutput {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        if lower.contains("specific") || lower == "sca" {
            Ok(AccumOutput::SpecificCatchmentArea)
        } else if lower.contains("total") || lower == "tca" {
            Ok(AccumOutput::TotalCatchmentArea)
        } else if lower.contains("cell") {
            Ok(AccumOutput::Cells)
        } else {
            Err(Error::invalid_param(
                "output_type",
                s,
                "expected cells, specific catchment area or total catchment area",
            ))
        }
    }
}

impl fmt::Display for AccumOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccumOutput::Cells => "cells",
            AccumOutput::SpecificCatchmentArea => "specific catchment area",
            AccumOutput::TotalCatchmentArea => "total catchment area",
        };
        f.write_str(name)
    }
}

/// Parameters shared by the accumulation engines
#[derive(Debug, Clone, Default)]
pub struct AccumParams {
    /// Unit of the output grid
    pub output_type: AccumOutput,
    /// Replace every value by its natural logarithm
    pub log_transform: bool,
}

/// Convert raw cell counts in place to the requested unit.
///
/// No-data cells are left alone. With a log transform, values that are not
/// strictly positive become no-data.
pub(crate) fn finalize(
    acc: &mut Raster<f64>,
    params: &AccumParams,
    tracker: &mut ProgressTracker<'_>,
) -> Result<()> {
    let scale = params.output_type.scale(acc.cell_size());
    let configured = acc.nodata();
    let nodata = acc.nodata_value();
    let rows = acc.rows();
    tracker.set_label("Correcting values:");

    for (row, mut line) in acc.data_mut().rows_mut().into_iter().enumerate() {
        for v in line.iter_mut() {
            if v.is_nodata(configured) {
                continue;
            }
            let scaled = *v * scale;
            *v = if !params.log_transform {
                scaled
            } else if scaled > 0.0 {
                scaled.ln()
            } else {
                nodata
            };
        }
        tracker.step(row, rows)?;
    }
    Ok(())
}

/// Pointer value at `(row, col)`, rejecting anything that is not a D8 code
fn checked_code(pointer: &Raster<f64>, row: usize, col: usize) -> Result<Option<f64>> {
    let code = pointer.value_at(row as isize, col as isize);
    if pointer.is_nodata(code) {
        return Ok(None);
    }
    if !is_conformant_code(code) {
        return Err(Error::InvalidPointer { row, col, value: code });
    }
    Ok(Some(code))
}

/// Number of valid neighbours whose pointer drains into `(row, col)`
fn inflow_count(pointer: &Raster<f64>, row: usize, col: usize) -> i8 {
    pointer
        .neighbours(row, col)
        .filter(|n| !pointer.is_nodata(n.value) && n.value == f64::from(INFLOWING_CODES[n.index]))
        .count() as i8
}

/// Inflow counts for every cell; -1 marks no-data.
fn inflow_grid(pointer: &Raster<f64>, tracker: &mut ProgressTracker<'_>) -> Result<Array2<i8>> {
    let (rows, cols) = pointer.shape();
    let mut inflow = try_array2(rows, cols, -1i8)?;
    for row in 0..rows {
        for col in 0..cols {
            if checked_code(pointer, row, col)?.is_some() {
                inflow[(row, col)] = inflow_count(pointer, row, col);
            }
        }
        tracker.step(row, rows)?;
    }
    Ok(inflow)
}

/// Flow accumulation from a D8 pointer grid.
///
/// # Algorithm
/// 1. Count inflowing neighbours per cell, validating every pointer code
/// 2. From each cell with no inflow, walk down the pointer chain, adding the
///    upstream total to each downstream cell and releasing it once all of
///    its inflows have arrived
/// 3. Convert to the requested unit
///
/// Walks stop at sinks and at cells pointing off the grid or into no-data.
///
/// # Errors
/// [`Error::InvalidPointer`] if a valid cell holds anything other than 0 or
/// one of the eight pointer codes.
pub fn flow_accumulation_d8(
    pointer: &Raster<f64>,
    params: &AccumParams,
    progress: &dyn Progress,
) -> Result<Raster<f64>> {
    let (rows, cols) = pointer.shape();
    let nodata = pointer.nodata_value();
    let mut tracker = ProgressTracker::new(progress, "Counting inflowing neighbours:");

    let mut inflow = inflow_grid(pointer, &mut tracker)?;

    let mut output = Raster::try_from_template(pointer, 1.0, Some(nodata))?;
    for ((row, col), &n) in inflow.indexed_iter() {
        if n < 0 {
            output.data_mut()[(row, col)] = nodata;
        }
    }

    tracker.set_label("Accumulating flow:");
    {
        let acc = output.data_mut();
        for row in 0..rows {
            for col in 0..cols {
                if inflow[(row, col)] != 0 {
                    continue;
                }
                let (mut r, mut c) = (row, col);
                loop {
                    inflow[(r, c)] = -1;
                    let Some(i) = code_to_index(pointer.value_at(r as isize, c as isize)) else {
                        break;
                    };
                    let (nr, nc) = offset(r, c, i);
                    if !pointer.is_valid_at(nr, nc) {
                        break;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    let upstream = acc[(r, c)];
                    acc[(nr, nc)] += upstream;
                    inflow[(nr, nc)] -= 1;
                    if inflow[(nr, nc)] != 0 {
                        break;
                    }
                    r = nr;
                    c = nc;
                }
            }
            tracker.step(row, rows)?;
        }
    }

    finalize(&mut output, params, &mut tracker)?;
    Ok(output)
}

/// Number of inflowing neighbours for every cell of a D8 pointer grid.
///
/// No-data cells stay no-data. Fails like [`flow_accumulation_d8`] on
/// non-conformant pointers.
pub fn num_inflowing_neighbours(pointer: &Raster<f64>, progress: &dyn Progress) -> Result<Raster<f64>> {
    let nodata = pointer.nodata_value();
    let mut tracker = ProgressTracker::new(progress, "Counting inflowing neighbours:");
    let inflow = inflow_grid(pointer, &mut tracker)?;

    let mut output = Raster::try_from_template(pointer, 0.0, Some(nodata))?;
    output
        .data_mut()
        .zip_mut_with(&inflow, |v, &n| *v = if n < 0 { nodata } else { f64::from(n) });
    Ok(output)
}

/// D8 flow accumulation
#[derive(Debug, Clone, Default)]
pub struct FlowAccumD8;

impl Algorithm for FlowAccumD8 {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = AccumParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "FlowAccumD8"
    }

    fn description(&self) -> &'static str {
        "Calculate D8 flow accumulation from a D8 pointer grid"
    }

    fn execute(&self, input: Self::Input, params: Self::Params, progress: &dyn Progress) -> Result<Self::Output> {
        flow_accumulation_d8(&input, &params, progress)
    }
}

/// D8 inflowing-neighbour count
#[derive(Debug, Clone, Default)]
pub struct NumInflowingNeighbours;

impl Algorithm for NumInflowingNeighbours {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "NumInflowingNeighbours"
    }

    fn description(&self) -> &'static str {
        "Count the neighbours draining into each cell of a D8 pointer grid"
    }

    fn execute(&self, input: Self::Input, _params: (), progress: &dyn Progress) -> Result<Self::Output> {
        num_inflowing_neighbours(&input, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::flow_direction::d8_pointer;
    use approx::assert_relative_eq;
    use drainflow_core::{GeoTransform, SilentProgress};

    fn ramp() -> Raster<f64> {
        let mut dem = Raster::from_vec(
            vec![
                3.0, 2.0, 1.0,
                3.0, 2.0, 1.0,
                3.0, 2.0, 1.0,
            ],
            3,
            3,
        )
        .unwrap();
        dem.set_transform(GeoTransform::new(0.0, 3.0, 1.0, -1.0));
        dem
    }

    #[test]
    fn test_ramp_rows_funnel_to_right_column() {
        let pntr = d8_pointer(&ramp(), &SilentProgress).unwrap();
        let acc = flow_accumulation_d8(&pntr, &AccumParams::default(), &SilentProgress).unwrap();

        for row in 0..3 {
            assert_eq!(acc.get(row, 0).unwrap(), 1.0, "Left column has no upslope cells");
            assert_eq!(acc.get(row, 1).unwrap(), 2.0);
            assert_eq!(acc.get(row, 2).unwrap(), 3.0, "Row {} should funnel 3 cells", row);
        }
    }

    #[test]
    fn test_converging_rows_reach_single_outlet() {
        // All cells drain to (2, 2): E along rows 0 and 1 into column 2, then S.
        let pntr = Raster::from_vec(
            vec![
                2.0, 2.0, 8.0,
                2.0, 2.0, 8.0,
                2.0, 2.0, 0.0,
            ],
            3,
            3,
        )
        .unwrap();
        let acc = flow_accumulation_d8(&pntr, &AccumParams::default(), &SilentProgress).unwrap();
        assert_eq!(acc.get(2, 2).unwrap(), 9.0);
        assert_eq!(acc.get(1, 2).unwrap(), 6.0);
    }

    #[test]
    fn test_non_conformant_pointer_is_rejected() {
        let mut pntr: Raster<f64> = Raster::filled(3, 3, 2.0);
        pntr.set(1, 1, 3.0).unwrap();
        let err = flow_accumulation_d8(&pntr, &AccumParams::default(), &SilentProgress).unwrap_err();
        match err {
            Error::InvalidPointer { row, col, value } => {
                assert_eq!((row, col), (1, 1));
                assert_eq!(value, 3.0);
            }
            other => panic!("Expected InvalidPointer, got {:?}", other),
        }
    }

    #[test]
    fn test_nodata_blocks_flow() {
        let mut pntr = Raster::from_vec(vec![2.0, 2.0, 2.0, 0.0], 1, 4).unwrap();
        pntr.set_nodata(Some(-1.0));
        pntr.set(0, 2, -1.0).unwrap();

        let acc = flow_accumulation_d8(&pntr, &AccumParams::default(), &SilentProgress).unwrap();
        assert_eq!(acc.get(0, 1).unwrap(), 2.0);
        assert!(acc.is_nodata_at(0, 2).unwrap());
        assert_eq!(acc.get(0, 3).unwrap(), 1.0, "Nothing crosses the no-data gap");
    }

    #[test]
    fn test_output_units_and_log() {
        let mut pntr = Raster::from_vec(vec![2.0, 2.0, 0.0], 1, 3).unwrap();
        pntr.set_transform(GeoTransform::new(0.0, 1.0, 10.0, -10.0));

        let sca = AccumParams {
            output_type: AccumOutput::SpecificCatchmentArea,
            log_transform: false,
        };
        let acc = flow_accumulation_d8(&pntr, &sca, &SilentProgress).unwrap();
        assert_relative_eq!(acc.get(0, 2).unwrap(), 30.0);

        let tca_log = AccumParams {
            output_type: AccumOutput::TotalCatchmentArea,
            log_transform: true,
        };
        let acc = flow_accumulation_d8(&pntr, &tca_log, &SilentProgress).unwrap();
        assert_relative_eq!(acc.get(0, 2).unwrap(), 300.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_output_type_parsing() {
        assert_eq!("Specific Catchment Area (SCA)".parse::<AccumOutput>().unwrap(), AccumOutput::SpecificCatchmentArea);
        assert_eq!("total catchment area".parse::<AccumOutput>().unwrap(), AccumOutput::TotalCatchmentArea);
        assert_eq!("number of upslope grid cells".parse::<AccumOutput>().unwrap(), AccumOutput::Cells);
        assert!("hectares".parse::<AccumOutput>().unwrap_err().is_configuration());
        assert_eq!(AccumOutput::TotalCatchmentArea.to_string(), "total catchment area");
    }

    #[test]
    fn test_num_inflowing_neighbours() {
        let pntr = Raster::from_vec(
            vec![
                4.0, 8.0, 16.0,
                2.0, 0.0, 32.0,
                1.0, 128.0, 64.0,
            ],
            3,
            3,
        )
        .unwrap();
        let counts = num_inflowing_neighbours(&pntr, &SilentProgress).unwrap();
        assert_eq!(counts.get(1, 1).unwrap(), 8.0, "Every neighbour points at the centre");
        assert_eq!(counts.get(0, 0).unwrap(), 0.0);
    }
}
