//! # Drainflow Core
//!
//! Core types, traits and I/O for the drainflow hydrology toolkit.
//!
//! This crate provides:
//! - `Raster<T>`: generic raster grid with a no-data border model
//! - `GeoTransform`: north-up georeferencing
//! - The 8-connected neighbour model and D8 pointer codes
//! - `Progress`: progress reporting and cooperative cancellation
//! - GeoTIFF I/O

pub mod error;
pub mod io;
pub mod progress;
pub mod raster;

pub use error::{Error, Result};
pub use progress::{LogProgress, Progress, ProgressTracker, SilentProgress};
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::progress::{Progress, ProgressTracker, SilentProgress};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::Algorithm;
}

/// Common shape of every drainflow tool.
///
/// Tools are pure functions of their input and parameters; the progress sink
/// only observes them and may ask them to stop.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
        progress: &dyn Progress,
    ) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters and no progress reporting
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default(), &SilentProgress)
    }
}
