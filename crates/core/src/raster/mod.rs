//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;
pub mod neighborhood;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{try_array2, Raster, RasterStatistics};
pub use neighborhood::{Neighbour, NeighborhoodIterator};
