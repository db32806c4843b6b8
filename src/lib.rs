//! # Flowmoments
//!
//! One-pass running statistics over n-dimensional samples.
//!
//! Flowmoments computes means, covariances, variances and expectations of
//! arbitrary functions from a stream of samples without keeping the samples
//! around. Samples can arrive one at a time or in chunks; both paths use the
//! same numerically stable merge step, so the result does not depend on how
//! the stream was chunked.
//!
//! ## Features
//!
//! - **Covariance**: batched covariance over any number of event dimensions
//! - **Variance**: elementwise variance as the zero-event special case
//! - **Expectations**: running `E[f(X)]` for a tree of functions
//! - **Chunking**: fold a whole chunk of samples in one call along any axis
//!
//! ## Quick Start
//!
//! ```rust
//! use flowmoments::prelude::*;
//! use ndarray::array;
//!
//! let cov = RunningCovariance::<f64>::new(&[2], 1).unwrap();
//! let mut state = cov.initialize();
//!
//! for x in [array![1.0, 0.0], array![0.0, 1.0], array![1.0, 1.0]] {
//!     state = cov.update(&state, &x, None).unwrap();
//! }
//!
//! let matrix = cov.finalize(&state);
//! assert_eq!(matrix.shape(), &[2, 2]);
//! ```
//!
//! ## State handling
//!
//! Estimators are immutable configuration values and hold no data. Every
//! stream owns its state value, obtained from `initialize` and replaced by
//! the result of each `update`:
//!
//! ```rust
//! use flowmoments::covariance::RunningVariance;
//! use ndarray::array;
//!
//! let var = RunningVariance::<f64>::scalar();
//!
//! // a chunk of 4 samples stacked along axis 0
//! let state = var.update(&var.initialize(), &array![1.0, 2.0, 3.0, 4.0], Some(0)).unwrap();
//! let state = var.update(&state, &ndarray::arr0(5.0), None).unwrap();
//!
//! assert_eq!(state.num_samples(), 5);
//! ```
//!
//! ## Feature Flags
//!
//! - `covariance` (default): running covariance and variance
//! - `expectations` (default): running expectations
//! - `full`: Enable all algorithm families

#![cfg_attr(docsrs, feature(doc_cfg))]

// Core pieces always available
pub mod dtype;
#[cfg(any(feature = "covariance", feature = "expectations"))]
mod math;
pub mod tensor;
pub mod traits;
pub mod tree;

#[cfg(feature = "covariance")]
#[cfg_attr(docsrs, doc(cfg(feature = "covariance")))]
pub mod covariance;

#[cfg(feature = "expectations")]
#[cfg_attr(docsrs, doc(cfg(feature = "expectations")))]
pub mod expectations;

pub mod prelude {
    pub use crate::dtype::{Element, Real};
    pub use crate::traits::*;
    pub use crate::tree::Tree;

    #[cfg(feature = "covariance")]
    pub use crate::covariance::{RunningCovariance, RunningCovarianceState, RunningVariance};

    #[cfg(feature = "expectations")]
    pub use crate::expectations::{
        expectation, structured_expectation, RunningExpectations, RunningExpectationsState,
    };
}

pub use traits::{RunningStatistic, StatsError};

#[cfg(feature = "covariance")]
pub use covariance::{RunningCovariance, RunningVariance};

#[cfg(feature = "expectations")]
pub use expectations::RunningExpectations;
