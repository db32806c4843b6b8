//! Event-wise outer product

use ndarray::{ArrayBase, ArrayD, Axis, Data, Dimension};

use super::shape::split_batch_event;
use crate::dtype::Real;
use crate::traits::StatsError;

/// Outer product of `target` with itself across its trailing `event_ndims` axes
///
/// For `target` of shape `B + E` (with `E` the last `event_ndims` entries) the
/// result has shape `B + E + E` and holds
/// `out[b, i, j] = target[b, i] * target[b, j]` for every batch index `b` and
/// every pair of event multi-indices `i`, `j`. Nothing is summed: with
/// `event_ndims = 0` this is the elementwise square.
///
/// The event axes are flattened into a single index, so there is no limit on
/// `event_ndims` beyond the rank of `target`.
///
/// # Example
///
/// ```
/// use flowmoments::tensor::outer_product;
/// use ndarray::array;
///
/// let x = array![[1.0, 2.0], [3.0, 4.0]];
/// let out = outer_product(&x, 1).unwrap();
/// assert_eq!(out.shape(), &[2, 2, 2]);
/// assert_eq!(out[[1, 0, 1]], 12.0);
/// ```
pub fn outer_product<F, S, D>(target: &ArrayBase<S, D>, event_ndims: usize) -> Result<ArrayD<F>, StatsError>
where
    F: Real,
    S: Data<Elem = F>,
    D: Dimension,
{
    let (batch, event) = split_batch_event(target.shape(), event_ndims)?;
    let batch_size: usize = batch.iter().product();
    let event_size: usize = event.iter().product();

    let mut out_shape = target.shape().to_vec();
    out_shape.extend_from_slice(event);

    let flat = target.to_shape((batch_size, event_size))?;
    let left = flat.view().insert_axis(Axis(2));
    let right = flat.view().insert_axis(Axis(1));
    let product = &left * &right;

    Ok(product.to_shape(out_shape)?.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, array, Array, IxDyn};

    #[test]
    fn test_scalar_event_squares() {
        let x = array![1.0, -2.0, 3.0];
        let out = outer_product(&x, 0).unwrap();
        assert_eq!(out, array![1.0, 4.0, 9.0].into_dyn());

        let out = outer_product(&arr0(5.0f32), 0).unwrap();
        assert_eq!(out.ndim(), 0);
        assert_eq!(out[IxDyn(&[])], 25.0);
    }

    #[test]
    fn test_vector_event() {
        let x = array![1.0, 2.0, 3.0];
        let out = outer_product(&x, 1).unwrap();
        assert_eq!(out.shape(), &[3, 3]);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(out[[i, j]], x[i] * x[j]);
            }
        }
    }

    #[test]
    fn test_batched_vector_event() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let out = outer_product(&x, 1).unwrap();
        assert_eq!(out.shape(), &[3, 2, 2]);
        for b in 0..3 {
            for i in 0..2 {
                for j in 0..2 {
                    assert_eq!(out[[b, i, j]], x[[b, i]] * x[[b, j]]);
                }
            }
        }
    }

    #[test]
    fn test_matrix_event() {
        let x = Array::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as f64 + 1.0);
        let out = outer_product(&x, 2).unwrap();
        assert_eq!(out.shape(), &[2, 3, 2, 3]);
        assert_eq!(out[[1, 2, 0, 1]], x[[1, 2]] * x[[0, 1]]);
        assert_eq!(out[[0, 1, 1, 2]], out[[1, 2, 0, 1]]);
    }

    #[test]
    fn test_non_standard_layout() {
        let x = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let t = x.t();
        let out = outer_product(&t, 1).unwrap();
        assert_eq!(out.shape(), &[3, 2, 2]);
        assert_eq!(out[[2, 0, 1]], 3.0 * 6.0);
    }

    #[test]
    fn test_event_ndims_beyond_rank() {
        let x = array![1.0, 2.0];
        assert!(matches!(outer_product(&x, 2), Err(StatsError::Config(_))));
    }
}
