//! Merge step shared by all running estimators
//!
//! Folding a chunk of `chunk_n` samples with mean `chunk_mean` into a running
//! mean over `n` samples (Chan et al., generalised by Pebay 2008):
//!
//! ```text
//! delta = chunk_mean - mean
//! mean' = mean + chunk_n * delta / (n + chunk_n)
//! ```
//!
//! The covariance estimator additionally needs `delta` and the adjustment
//! factor `n * chunk_n / (n + chunk_n)` for its cross term.

use ndarray::{ArrayD, Zip};

use crate::dtype::Real;
use crate::tensor::broadcast_into;
use crate::traits::StatsError;

/// Result of one mean merge
#[derive(Clone, Debug)]
pub(crate) struct MeanStep<F> {
    /// `chunk_mean - mean`
    pub delta: ArrayD<F>,
    /// Updated running mean
    pub mean: ArrayD<F>,
}

/// Fold `chunk_mean` over `chunk_n` samples into `mean`, giving `new_n` samples in total
///
/// `chunk_mean` is broadcast onto the shape of `mean` first.
pub(crate) fn merge_mean<F: Real>(
    mean: &ArrayD<F>,
    chunk_mean: ArrayD<F>,
    chunk_n: F,
    new_n: F,
) -> Result<MeanStep<F>, StatsError> {
    let chunk_mean = broadcast_into(chunk_mean, mean.shape())?;
    let delta = chunk_mean - mean;
    let mean = Zip::from(mean)
        .and(&delta)
        .map_collect(|&m, &d| m + chunk_n * d / new_n);
    Ok(MeanStep { delta, mean })
}

/// Weight of the cross term when merging `chunk_n` samples into `n`
#[inline]
pub(crate) fn adjustment<F: Real>(n: F, chunk_n: F) -> F {
    n * chunk_n / (n + chunk_n)
}
