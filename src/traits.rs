//! Core contract for running estimators
//!
//! Every estimator is an immutable configuration value. The running state
//! lives outside it: [`RunningStatistic::initialize`] creates an empty state,
//! [`RunningStatistic::update`] folds a sample (or a chunk of samples) into a
//! fresh state, and [`RunningStatistic::finalize`] reads off the estimate.

use core::fmt::Debug;

use ndarray::ShapeError;
use thiserror::Error;

/// Error raised by an estimator
#[derive(Debug, Error)]
pub enum StatsError {
    /// The estimator was configured with values it cannot work with
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A sample did not fit the configured shape, or the chunk axis was out of range
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// Two trees that should be paired up have different topologies
    #[error("structure mismatch: {0}")]
    StructureMismatch(String),
}

/// Streaming estimator over n-dimensional samples
///
/// Implementations never mutate a state in place, so any number of
/// independent streams can share one estimator.
pub trait RunningStatistic {
    /// Sample type accepted by `update`
    type Sample;

    /// Accumulated statistics
    type State: Clone + Debug;

    /// Point estimate produced by `finalize`
    type Output;

    /// State representing a stream with no samples
    fn initialize(&self) -> Self::State;

    /// Fold `new_sample` into `state`
    ///
    /// With `axis = None` the sample is a single observation. With
    /// `axis = Some(k)` it holds a chunk of observations stacked along axis `k`.
    fn update(
        &self,
        state: &Self::State,
        new_sample: &Self::Sample,
        axis: Option<usize>,
    ) -> Result<Self::State, StatsError>;

    /// Current estimate
    fn finalize(&self, state: &Self::State) -> Self::Output;

    /// Fold a sequence of single observations
    fn update_all<'a, I>(&self, state: &Self::State, samples: I) -> Result<Self::State, StatsError>
    where
        I: IntoIterator<Item = &'a Self::Sample>,
        Self::Sample: 'a,
    {
        samples
            .into_iter()
            .try_fold(state.clone(), |acc, sample| self.update(&acc, sample, None))
    }
}
