//! 8-connected neighbour model shared by all hydrology tools
//!
//! Neighbours are indexed 0..8 clockwise starting at north-east:
//!
//! ```text
//!   6 7 0        NW  N NE       64 128   1
//!   5 x 1   ==   W   x  E   ==  32   x   2
//!   4 3 2        SW  S SE       16   8   4
//! ```
//!
//! The right-hand grid shows the pointer code stored in a D8 flow-direction
//! raster for each neighbour (`2^index`). A code of 0 marks a sink.

use super::{Raster, RasterElement};
use std::f64::consts::SQRT_2;

/// Column offsets, indexed by neighbour
pub const DX: [isize; 8] = [1, 1, 1, 0, -1, -1, -1, 0];

/// Row offsets, indexed by neighbour
pub const DY: [isize; 8] = [-1, 0, 1, 1, 1, 0, -1, -1];

/// Pointer code written for flow towards each neighbour
pub const POINTER_CODES: [u8; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

/// Code neighbour `i` must hold for its flow to enter the centre cell
pub const INFLOWING_CODES: [u8; 8] = [16, 32, 64, 128, 1, 2, 4, 8];

/// Distance multipliers in cell units (cardinal 1, diagonal sqrt 2)
pub const DISTANCES: [f64; 8] = [SQRT_2, 1.0, SQRT_2, 1.0, SQRT_2, 1.0, SQRT_2, 1.0];

/// Column offsets of the 16-cell ring at Chebyshev distance 2
pub const RING2_DX: [isize; 16] = [2, 2, 2, 2, 2, 1, 0, -1, -2, -2, -2, -2, -2, -1, 0, 1];

/// Row offsets of the 16-cell ring at Chebyshev distance 2
pub const RING2_DY: [isize; 16] = [-2, -1, 0, 1, 2, 2, 2, 2, 2, 1, 0, -1, -2, -2, -2, -2];

/// First-order neighbours adjacent to each ring cell. Corner cells have one,
/// axis cells three with the straight-line bridge first, the rest two.
pub const RING2_BRIDGES: [&[usize]; 16] = [
    &[0],
    &[0, 1],
    &[1, 0, 2],
    &[1, 2],
    &[2],
    &[2, 3],
    &[3, 2, 4],
    &[3, 4],
    &[4],
    &[4, 5],
    &[5, 4, 6],
    &[5, 6],
    &[6],
    &[6, 7],
    &[7, 6, 0],
    &[0, 7],
];

/// Index of the neighbour code, `None` for anything but the 8 pointer codes.
///
/// Zero (no flow) is not a direction and also maps to `None`.
pub fn code_to_index(code: f64) -> Option<usize> {
    if !(1.0..=128.0).contains(&code) || code.fract() != 0.0 {
        return None;
    }
    POINTER_CODES.iter().position(|&c| f64::from(c) == code)
}

/// Whether a raw pointer value is a member of `{0, 1, 2, 4, ..., 128}`
pub fn is_conformant_code(code: f64) -> bool {
    code == 0.0 || code_to_index(code).is_some()
}

/// Neighbour index that looks back at the centre from neighbour `i`
#[inline]
pub const fn back_link(i: usize) -> usize {
    (i + 4) % 8
}

/// Signed coordinates of neighbour `i` of `(row, col)`
#[inline]
pub fn offset(row: usize, col: usize, i: usize) -> (isize, isize) {
    (row as isize + DY[i], col as isize + DX[i])
}

/// Iterator over the eight neighbours of a cell.
///
/// Out-of-grid neighbours are yielded with the raster's no-data sentinel so
/// callers treat the grid edge and interior no-data identically.
pub struct NeighborhoodIterator<'a, T: RasterElement> {
    raster: &'a Raster<T>,
    center_row: usize,
    center_col: usize,
    index: usize,
}

impl<'a, T: RasterElement> NeighborhoodIterator<'a, T> {
    pub fn new(raster: &'a Raster<T>, row: usize, col: usize) -> Self {
        Self {
            raster,
            center_row: row,
            center_col: col,
            index: 0,
        }
    }
}

/// A neighbour visited by [`NeighborhoodIterator`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour<T> {
    pub index: usize,
    pub row: isize,
    pub col: isize,
    pub value: T,
}

impl<'a, T: RasterElement> Iterator for NeighborhoodIterator<'a, T> {
    type Item = Neighbour<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= 8 {
            return None;
        }
        let i = self.index;
        self.index += 1;

        let (row, col) = offset(self.center_row, self.center_col, i);
        Some(Neighbour {
            index: i,
            row,
            col,
            value: self.raster.value_at(row, col),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = 8 - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a, T: RasterElement> ExactSizeIterator for NeighborhoodIterator<'a, T> {}

impl<T: RasterElement> Raster<T> {
    /// The eight neighbours of `(row, col)` in NE-clockwise order
    pub fn neighbours(&self, row: usize, col: usize) -> NeighborhoodIterator<'_, T> {
        NeighborhoodIterator::new(self, row, col)
    }

    /// Whether any neighbour is off-grid or no-data
    pub fn is_edge_cell(&self, row: usize, col: usize) -> bool {
        self.neighbours(row, col).any(|n| self.is_nodata(n.value))
    }
}
