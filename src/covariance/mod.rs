//! Running covariance and variance
//!
//! One-pass estimators for the covariance of samples whose shape splits into
//! a batch part (independent estimators computed side by side) and an event
//! part (the axes cross terms are computed over).
//!
//! # Example
//!
//! ```
//! use flowmoments::covariance::RunningVariance;
//! use ndarray::arr0;
//!
//! let var = RunningVariance::<f64>::scalar();
//! let mut state = var.initialize();
//!
//! for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
//!     state = var.update(&state, &arr0(value), None).unwrap();
//! }
//!
//! assert_eq!(state.mean().first(), Some(&3.0));
//!
//! let population = var.finalize(&state);
//! let sample = var.finalize_with_ddof(&state, 1);
//! assert!((*population.first().unwrap() - 2.0_f64).abs() < 1e-12);
//! assert!((*sample.first().unwrap() - 2.5_f64).abs() < 1e-12);
//! ```

mod running;

pub use running::{RunningCovariance, RunningCovarianceState, RunningVariance, MAX_EVENT_NDIMS};
