//! Running expectations of arbitrary functions
//!
//! Tracks `E[f(X)]` for one function or a whole [`Tree`](crate::tree::Tree)
//! of functions, sharing the sample count between them. Samples are single
//! arrays, or trees of arrays for functions built with
//! [`structured_expectation`].
//!
//! # Example
//!
//! ```
//! use flowmoments::expectations::{expectation, RunningExpectations};
//! use flowmoments::tree::Tree;
//! use ndarray::{arr0, ArrayViewD};
//!
//! let moments = RunningExpectations::<f64>::new(
//!     &[],
//!     Tree::named([
//!         ("mean", expectation(|x: ArrayViewD<f64>| x.to_owned())),
//!         ("second", expectation(|x: ArrayViewD<f64>| x.mapv(|v| v * v))),
//!     ]),
//! );
//!
//! let mut state = moments.initialize();
//! for value in [1.0, 2.0, 3.0] {
//!     state = moments.update(&state, &arr0(value), None).unwrap();
//! }
//!
//! let result = moments.finalize(&state);
//! let second = result.get("second").and_then(Tree::as_leaf).unwrap();
//! assert!((*second.first().unwrap() - 14.0_f64 / 3.0).abs() < 1e-12);
//! ```

mod running;

pub use running::{
    expectation, structured_expectation, Expectation, RunningExpectations,
    RunningExpectationsState,
};
