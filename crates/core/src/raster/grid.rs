//! Main Raster type

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::Array2;

/// A georeferenced 2D raster grid.
///
/// Cells are addressed as `(row, col)` with row 0 at the northern edge.
/// Reads outside the grid through [`Raster::value_at`] return the no-data
/// sentinel, so every algorithm can treat the grid as if it were surrounded
/// by a one-cell no-data border.
///
/// # Example
///
/// ```ignore
/// use drainflow_core::Raster;
///
/// let mut dem: Raster<f64> = Raster::filled(100, 100, 0.0);
/// dem.set_nodata(Some(-32768.0));
/// dem.set(10, 20, 42.0)?;
///
/// assert_eq!(dem.value_at(-1, 0), -32768.0);
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    /// Affine transformation
    transform: GeoTransform,
    /// No-data value
    nodata: Option<T>,
}

/// Allocate a `rows x cols` array without aborting the process when the
/// allocation cannot be satisfied.
pub fn try_array2<U: Clone>(rows: usize, cols: usize, value: U) -> Result<Array2<U>> {
    let len = rows.checked_mul(cols).ok_or(Error::InvalidDimensions {
        width: cols,
        height: rows,
    })?;
    let mut buf: Vec<U> = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::OutOfMemory {
        bytes: len.saturating_mul(std::mem::size_of::<U>()),
    })?;
    buf.resize(len, value);
    Array2::from_shape_vec((rows, cols), buf).map_err(|e| Error::Other(e.to_string()))
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from existing row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            nodata: None,
        }
    }

    /// Create a raster with the dimensions and georeferencing of `template`,
    /// every cell set to `fill`.
    pub fn from_template<U: RasterElement>(template: &Raster<U>, fill: T, nodata: Option<T>) -> Self {
        Self {
            data: Array2::from_elem(template.shape(), fill),
            transform: template.transform,
            nodata,
        }
    }

    /// Fallible version of [`Raster::from_template`].
    pub fn try_from_template<U: RasterElement>(
        template: &Raster<U>,
        fill: T,
        nodata: Option<T>,
    ) -> Result<Self> {
        let (rows, cols) = template.shape();
        Ok(Self {
            data: try_array2(rows, cols, fill)?,
            transform: template.transform,
            nodata,
        })
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether a signed coordinate falls inside the grid
    #[inline]
    pub fn in_bounds(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.rows() && (col as usize) < self.cols()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Value at a signed coordinate; the no-data sentinel outside the grid.
    #[inline]
    pub fn value_at(&self, row: isize, col: isize) -> T {
        if self.in_bounds(row, col) {
            self.data[(row as usize, col as usize)]
        } else {
            self.nodata_value()
        }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the configured no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// The sentinel written into no-data cells: the configured value, or the
    /// element type's default (NaN for floats).
    pub fn nodata_value(&self) -> T {
        self.nodata.unwrap_or_else(T::default_nodata)
    }

    /// Cell size in X
    pub fn cell_size_x(&self) -> f64 {
        self.transform.cell_size_x()
    }

    /// Cell size in Y
    pub fn cell_size_y(&self) -> f64 {
        self.transform.cell_size_y()
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    // Value checks

    /// Check if a value is no-data
    #[inline]
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Check if cell at (row, col) contains no-data
    pub fn is_nodata_at(&self, row: usize, col: usize) -> Result<bool> {
        let value = self.get(row, col)?;
        Ok(self.is_nodata(value))
    }

    /// Whether a signed coordinate holds a valid (in-grid, not no-data) value
    #[inline]
    pub fn is_valid_at(&self, row: isize, col: isize) -> bool {
        self.in_bounds(row, col) && !self.is_nodata(self.data[(row as usize, col as usize)])
    }

    // Statistics

    /// Calculate basic statistics (min, max, mean, count of valid cells)
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum: f64 = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }

            if min.map_or(true, |m| value < m) {
                min = Some(value);
            }
            if max.map_or(true, |m| value > m) {
                max = Some(value);
            }

            if let Some(v) = value.to_f64() {
                sum += v;
                count += 1;
            }
        }

        let mean = if count > 0 {
            Some(sum / count as f64)
        } else {
            None
        };

        RasterStatistics {
            min,
            max,
            mean,
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f64> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_out_of_grid_reads_return_nodata() {
        let mut raster: Raster<f64> = Raster::filled(3, 3, 1.0);
        raster.set_nodata(Some(-32768.0));

        assert_eq!(raster.value_at(-1, 0), -32768.0);
        assert_eq!(raster.value_at(0, 3), -32768.0);
        assert_eq!(raster.value_at(3, 3), -32768.0);
        assert_eq!(raster.value_at(1, 1), 1.0);
        assert!(!raster.is_valid_at(-1, -1));
        assert!(raster.is_valid_at(2, 2));
    }

    #[test]
    fn test_default_sentinel_is_nan() {
        let raster: Raster<f64> = Raster::filled(2, 2, 5.0);
        assert!(raster.value_at(5, 5).is_nan());
        assert!(raster.is_nodata(raster.value_at(-1, 0)));
    }

    #[test]
    fn test_from_template_inherits_georeferencing() {
        let mut dem: Raster<f64> = Raster::filled(4, 6, 10.0);
        dem.set_transform(GeoTransform::new(500.0, 900.0, 30.0, -30.0));

        let mask: Raster<u8> = Raster::from_template(&dem, 0, Some(255));
        assert_eq!(mask.shape(), (4, 6));
        assert_eq!(mask.transform(), dem.transform());
        assert_eq!(mask.nodata(), Some(255));

        let acc: Raster<f64> = Raster::try_from_template(&dem, 1.0, None).unwrap();
        assert_eq!(acc.get(3, 5).unwrap(), 1.0);
    }

    #[test]
    fn test_try_array2_rejects_overflowing_dimensions() {
        let err = try_array2(usize::MAX, 2, 0u8).unwrap_err();
        assert!(matches!(err, Error::InvalidDimensions { .. }));
    }

    #[test]
    fn test_raster_statistics_skip_nodata() {
        let mut raster: Raster<f64> = Raster::new(10, 10);
        raster.set_nodata(Some(-1.0));
        for i in 0..10 {
            for j in 0..10 {
                raster.set(i, j, (i * 10 + j) as f64).unwrap();
            }
        }
        raster.set(0, 0, -1.0).unwrap();

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(99.0));
        assert_eq!(stats.valid_count, 99);
        assert_eq!(stats.nodata_count, 1);
    }
}
