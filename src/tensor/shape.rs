//! Batch/event shape bookkeeping

use ndarray::{ArrayD, Axis, ErrorKind, ShapeError};

use crate::dtype::Real;
use crate::traits::StatsError;

/// Split `shape` into `(batch, event)` where `event` holds the last `event_ndims` entries
pub(crate) fn split_batch_event(
    shape: &[usize],
    event_ndims: usize,
) -> Result<(&[usize], &[usize]), StatsError> {
    if event_ndims > shape.len() {
        return Err(StatsError::Config(format!(
            "cannot calculate cross-products in {} dimensions for samples of rank {}",
            event_ndims,
            shape.len()
        )));
    }
    Ok(shape.split_at(shape.len() - event_ndims))
}

/// Trailing `event_ndims` entries of `shape`
///
/// `event_ndims` must not exceed the rank of `shape`.
pub(crate) fn event_shape(shape: &[usize], event_ndims: usize) -> &[usize] {
    &shape[shape.len() - event_ndims..]
}

/// Leading entries of `shape` that are not part of the event
///
/// `event_ndims` must not exceed the rank of `shape`.
pub(crate) fn batch_shape(shape: &[usize], event_ndims: usize) -> &[usize] {
    &shape[..shape.len() - event_ndims]
}

/// Shape of the accumulated residuals: `shape + event_shape`
///
/// `event_ndims` must not exceed the rank of `shape`.
pub(crate) fn covariance_shape(shape: &[usize], event_ndims: usize) -> Vec<usize> {
    let mut out = shape.to_vec();
    out.extend_from_slice(event_shape(shape, event_ndims));
    out
}

/// Validate a chunk axis against the rank of the sample it indexes
pub(crate) fn check_axis(ndim: usize, axis: usize) -> Result<Axis, StatsError> {
    if axis >= ndim {
        return Err(ShapeError::from_kind(ErrorKind::OutOfBounds).into());
    }
    Ok(Axis(axis))
}

/// Broadcast `value` onto `dim`, leaving it untouched when it already matches
pub(crate) fn broadcast_into<F: Real>(value: ArrayD<F>, dim: &[usize]) -> Result<ArrayD<F>, StatsError> {
    if value.shape() == dim {
        return Ok(value);
    }
    match value.broadcast(dim) {
        Some(view) => Ok(view.to_owned()),
        None => Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into()),
    }
}
