//! Compatibility layer for rayon/sequential execution.
//!
//! When the `parallel` feature is enabled, this re-exports rayon's parallel iterators.
//! When disabled, it provides sequential fallbacks that implement the same API
//! surface used by our algorithms.

#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

use drainflow_core::{Error, ProgressTracker, Result};

#[cfg(not(feature = "parallel"))]
mod sequential {
    /// Sequential stand-in for `rayon::prelude::IntoParallelIterator`.
    ///
    /// Calls `into_iter()` instead of `into_par_iter()`, so the rest of the
    /// iterator chain (`.map()`, `.collect()`, etc.) resolves to the
    /// standard `Iterator` methods.
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;

/// Compute every output row independently and return them row-major.
///
/// Workers stop as soon as the tracker's sink reports cancellation; the
/// tracker then emits its single cancellation notice.
pub(crate) fn map_rows<F>(
    rows: usize,
    cols: usize,
    tracker: &mut ProgressTracker<'_>,
    row_fn: F,
) -> Result<Vec<f64>>
where
    F: Fn(usize) -> Vec<f64> + Sync + Send,
{
    tracker.step(0, rows)?;
    let sink = tracker.sink();

    let computed: Result<Vec<Vec<f64>>> = (0..rows)
        .into_par_iter()
        .map(|row| {
            if sink.is_cancelled() {
                return Err(Error::Cancelled);
            }
            Ok(row_fn(row))
        })
        .collect();

    let row_data = match computed {
        Ok(r) => r,
        Err(Error::Cancelled) => {
            tracker.check()?;
            return Err(Error::Cancelled);
        }
        Err(e) => return Err(e),
    };

    let mut data = Vec::new();
    data.try_reserve_exact(rows * cols).map_err(|_| Error::OutOfMemory {
        bytes: rows * cols * std::mem::size_of::<f64>(),
    })?;
    for r in row_data {
        data.extend(r);
    }
    tracker.report(rows, rows);
    Ok(data)
}
