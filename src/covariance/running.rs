//! Running covariance using Pebay's one-pass update
//!
//! Reference: Philippe Pebay, "Formulas for Robust, One-Pass Parallel
//! Computation of Covariances and Arbitrary-Order Statistical Moments",
//! Sandia Technical Report SAND2008-6212, 2008.

use core::marker::PhantomData;

use log::{debug, trace};
use ndarray::{ArrayBase, ArrayD, Data, Dimension, ErrorKind, ShapeError};
use num_traits::AsPrimitive;

use crate::dtype::Real;
use crate::math::{adjustment, merge_mean};
use crate::tensor::{
    batch_shape, broadcast_into, check_axis, covariance_shape, event_shape, outer_product,
    split_batch_event,
};
use crate::traits::{RunningStatistic, StatsError};

/// Largest supported number of event dimensions
///
/// The outer product itself has no such limit; this caps the rank of the
/// accumulated residuals at `2 * MAX_EVENT_NDIMS` plus the batch rank.
pub const MAX_EVENT_NDIMS: usize = 32;

/// Accumulated covariance statistics
///
/// Produced by [`RunningCovariance::initialize`] and
/// [`RunningCovariance::update`]; never modified after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct RunningCovarianceState<F> {
    /// Number of samples folded in so far
    num_samples: u64,
    /// Running mean, shape `batch + event`
    mean: ArrayD<F>,
    /// Mean-centred sum of outer products (M2), shape `batch + event + event`
    sum_squared_residuals: ArrayD<F>,
}

impl<F: Real> RunningCovarianceState<F> {
    /// Number of samples seen
    pub fn num_samples(&self) -> u64 {
        self.num_samples
    }

    /// Running mean of the samples
    pub fn mean(&self) -> &ArrayD<F> {
        &self.mean
    }

    /// Sum of mean-centred outer products
    pub fn sum_squared_residuals(&self) -> &ArrayD<F> {
        &self.sum_squared_residuals
    }

    /// Check if no samples have been seen
    pub fn is_empty(&self) -> bool {
        self.num_samples == 0
    }
}

/// Streaming covariance over samples of a fixed shape
///
/// The configured shape splits into a batch part and an event part of
/// `event_ndims` trailing dimensions. Each batch entry gets its own
/// estimator; cross terms are computed across the event dimensions only.
///
/// For samples of shape `[5, 7]`:
/// - `event_ndims = 0` tracks 35 independent variances, result shape `[5, 7]`
/// - `event_ndims = 1` tracks 5 covariance matrices, result shape `[5, 7, 7]`
/// - `event_ndims = 2` tracks one covariance, result shape `[5, 7, 5, 7]`
///
/// The estimator holds no state. Each stream threads its own
/// [`RunningCovarianceState`] through [`update`](Self::update).
///
/// # Example
///
/// ```
/// use flowmoments::covariance::RunningCovariance;
/// use ndarray::Array3;
///
/// // 3 samples of 5 independent vector variables of shape [2]
/// let sample = Array3::<f64>::ones((3, 5, 2));
/// let cov = RunningCovariance::<f64>::new(&[5, 2], 1).unwrap();
///
/// let state = cov.initialize();
/// let state = cov.update(&state, &sample, Some(0)).unwrap();
///
/// assert_eq!(state.num_samples(), 3);
/// assert_eq!(cov.finalize(&state).shape(), &[5, 2, 2]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RunningCovariance<F: Real = f64> {
    shape: Vec<usize>,
    event_ndims: usize,
    _dtype: PhantomData<F>,
}

impl<F: Real> RunningCovariance<F> {
    /// Create a covariance estimator for samples of `shape`
    ///
    /// # Arguments
    ///
    /// * `shape` - Shape of one incoming sample
    /// * `event_ndims` - Number of trailing dimensions to compute cross terms over
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Config`] if `event_ndims` exceeds the rank of
    /// `shape` or [`MAX_EVENT_NDIMS`].
    pub fn new(shape: &[usize], event_ndims: usize) -> Result<Self, StatsError> {
        split_batch_event(shape, event_ndims)?;
        if event_ndims > MAX_EVENT_NDIMS {
            return Err(StatsError::Config(format!(
                "event_ndims over {} not supported (got {})",
                MAX_EVENT_NDIMS, event_ndims
            )));
        }

        debug!(
            "running covariance: shape {:?}, event_ndims {}",
            shape, event_ndims
        );

        Ok(Self::unchecked(shape, event_ndims))
    }

    /// Covariance across every dimension of `shape`, with no batching
    pub fn full(shape: &[usize]) -> Result<Self, StatsError> {
        Self::new(shape, shape.len())
    }

    fn unchecked(shape: &[usize], event_ndims: usize) -> Self {
        Self {
            shape: shape.to_vec(),
            event_ndims,
            _dtype: PhantomData,
        }
    }

    /// Shape of one sample
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of trailing event dimensions
    pub fn event_ndims(&self) -> usize {
        self.event_ndims
    }

    /// Trailing dimensions cross terms are computed over
    pub fn event_shape(&self) -> &[usize] {
        event_shape(&self.shape, self.event_ndims)
    }

    /// Leading dimensions holding independent estimators
    pub fn batch_shape(&self) -> &[usize] {
        batch_shape(&self.shape, self.event_ndims)
    }

    /// State representing a stream with no samples
    pub fn initialize(&self) -> RunningCovarianceState<F> {
        RunningCovarianceState {
            num_samples: 0,
            mean: ArrayD::zeros(self.shape.as_slice()),
            sum_squared_residuals: ArrayD::zeros(covariance_shape(&self.shape, self.event_ndims)),
        }
    }

    /// Fold a sample, or a chunk of samples, into `state`
    ///
    /// With `axis = None` the sample is one observation of the configured
    /// shape. With `axis = Some(k)` it holds observations stacked along
    /// axis `k`, which are merged as a single chunk. The chunk axis must
    /// index a batch position, not an event dimension.
    ///
    /// The sample is cast to `F` before any arithmetic. `state` is left
    /// untouched; the updated statistics are returned as a new state.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Shape`] when the sample does not broadcast to
    /// the configured shape, `axis` is out of range, or `state` was built by
    /// an estimator with a different shape or `event_ndims`.
    pub fn update<S, D>(
        &self,
        state: &RunningCovarianceState<F>,
        new_sample: &ArrayBase<S, D>,
        axis: Option<usize>,
    ) -> Result<RunningCovarianceState<F>, StatsError>
    where
        S: Data,
        S::Elem: AsPrimitive<F>,
        D: Dimension,
    {
        let new_sample = new_sample.mapv(|x| x.as_()).into_dyn();
        self.fold(state, new_sample, axis)
    }

    fn fold(
        &self,
        state: &RunningCovarianceState<F>,
        new_sample: ArrayD<F>,
        axis: Option<usize>,
    ) -> Result<RunningCovarianceState<F>, StatsError> {
        if state.mean.shape() != self.shape.as_slice()
            || state.sum_squared_residuals.shape()
                != covariance_shape(&self.shape, self.event_ndims).as_slice()
        {
            return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
        }

        let (chunk_count, chunk_mean, chunk_ssr) = match axis {
            None => (1, new_sample, None),
            Some(axis) => {
                let axis = check_axis(new_sample.ndim(), axis)?;
                let count = new_sample.len_of(axis) as u64;
                let chunk_n = F::from_count(count);

                let chunk_mean = new_sample.sum_axis(axis).mapv_into(|v| v / chunk_n);
                let chunk_delta = &new_sample - &chunk_mean.view().insert_axis(axis);
                let chunk_ssr = outer_product(&chunk_delta, self.event_ndims)?.sum_axis(axis);

                (count, chunk_mean, Some(chunk_ssr))
            }
        };

        let n = F::from_count(state.num_samples);
        let chunk_n = F::from_count(chunk_count);
        let num_samples = state.num_samples + chunk_count;

        let step = merge_mean(&state.mean, chunk_mean, chunk_n, n + chunk_n)?;
        let adj = adjustment(n, chunk_n);
        let cross = outer_product(&step.delta, self.event_ndims)?.mapv_into(|v| adj * v);

        let mut sum_squared_residuals = &state.sum_squared_residuals + &cross;
        if let Some(chunk_ssr) = chunk_ssr {
            sum_squared_residuals += &broadcast_into(chunk_ssr, state.sum_squared_residuals.shape())?;
        }

        trace!(
            "covariance update: {} new samples, {} total",
            chunk_count,
            num_samples
        );

        Ok(RunningCovarianceState {
            num_samples,
            mean: step.mean,
            sum_squared_residuals,
        })
    }

    /// Population covariance, `sum_squared_residuals / num_samples`
    pub fn finalize(&self, state: &RunningCovarianceState<F>) -> ArrayD<F> {
        self.finalize_with_ddof(state, 0)
    }

    /// Covariance with a degrees-of-freedom adjustment
    ///
    /// Divides by `num_samples - ddof`: `ddof = 0` gives the population
    /// covariance, `ddof = 1` the Bessel-corrected sample covariance.
    /// No check is made that `num_samples > ddof`; otherwise the result
    /// holds infinities or NaNs.
    pub fn finalize_with_ddof(&self, state: &RunningCovarianceState<F>, ddof: usize) -> ArrayD<F> {
        let denom = F::from_count(state.num_samples) - F::from_count(ddof as u64);
        state.sum_squared_residuals.mapv(|v| v / denom)
    }
}

impl<F: Real> RunningStatistic for RunningCovariance<F> {
    type Sample = ArrayD<F>;
    type State = RunningCovarianceState<F>;
    type Output = ArrayD<F>;

    fn initialize(&self) -> Self::State {
        RunningCovariance::initialize(self)
    }

    fn update(
        &self,
        state: &Self::State,
        new_sample: &Self::Sample,
        axis: Option<usize>,
    ) -> Result<Self::State, StatsError> {
        self.fold(state, new_sample.clone(), axis)
    }

    fn finalize(&self, state: &Self::State) -> Self::Output {
        RunningCovariance::finalize(self, state)
    }
}

/// Streaming variance, a [`RunningCovariance`] with no event dimensions
///
/// Every entry of the sample is treated as an independent scalar variable.
#[derive(Clone, Debug, PartialEq)]
pub struct RunningVariance<F: Real = f64> {
    inner: RunningCovariance<F>,
}

impl<F: Real> Default for RunningVariance<F> {
    fn default() -> Self {
        Self::scalar()
    }
}

impl<F: Real> RunningVariance<F> {
    /// Create a variance estimator for samples of `shape`
    pub fn new(shape: &[usize]) -> Self {
        debug!("running variance: shape {:?}", shape);
        Self {
            inner: RunningCovariance::unchecked(shape, 0),
        }
    }

    /// Variance of a stream of scalars
    pub fn scalar() -> Self {
        Self::new(&[])
    }

    /// Shape of one sample
    pub fn shape(&self) -> &[usize] {
        self.inner.shape()
    }

    /// The underlying covariance estimator
    pub fn as_covariance(&self) -> &RunningCovariance<F> {
        &self.inner
    }

    /// State representing a stream with no samples
    pub fn initialize(&self) -> RunningCovarianceState<F> {
        self.inner.initialize()
    }

    /// Fold a sample, or a chunk of samples along `axis`, into `state`
    pub fn update<S, D>(
        &self,
        state: &RunningCovarianceState<F>,
        new_sample: &ArrayBase<S, D>,
        axis: Option<usize>,
    ) -> Result<RunningCovarianceState<F>, StatsError>
    where
        S: Data,
        S::Elem: AsPrimitive<F>,
        D: Dimension,
    {
        self.inner.update(state, new_sample, axis)
    }

    /// Population variance
    pub fn finalize(&self, state: &RunningCovarianceState<F>) -> ArrayD<F> {
        self.inner.finalize(state)
    }

    /// Variance divided by `num_samples - ddof`
    pub fn finalize_with_ddof(&self, state: &RunningCovarianceState<F>, ddof: usize) -> ArrayD<F> {
        self.inner.finalize_with_ddof(state, ddof)
    }
}

impl<F: Real> From<RunningVariance<F>> for RunningCovariance<F> {
    fn from(variance: RunningVariance<F>) -> Self {
        variance.inner
    }
}

impl<F: Real> RunningStatistic for RunningVariance<F> {
    type Sample = ArrayD<F>;
    type State = RunningCovarianceState<F>;
    type Output = ArrayD<F>;

    fn initialize(&self) -> Self::State {
        self.inner.initialize()
    }

    fn update(
        &self,
        state: &Self::State,
        new_sample: &Self::Sample,
        axis: Option<usize>,
    ) -> Result<Self::State, StatsError> {
        self.inner.fold(state, new_sample.clone(), axis)
    }

    fn finalize(&self, state: &Self::State) -> Self::Output {
        self.inner.finalize(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, array, Array, Array2, Axis};

    fn approx_eq(a: &ArrayD<f64>, b: &ArrayD<f64>, tol: f64) -> bool {
        a.shape() == b.shape() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < tol)
    }

    fn scalar(a: &ArrayD<f64>) -> f64 {
        *a.first().unwrap()
    }

    #[test]
    fn test_variance_basic() {
        let var = RunningVariance::<f64>::scalar();
        let mut state = var.initialize();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            state = var.update(&state, &arr0(v), None).unwrap();
        }

        assert_eq!(state.num_samples(), 5);
        assert!((scalar(state.mean()) - 3.0).abs() < 1e-12);
        assert!((scalar(&var.finalize(&state)) - 2.0).abs() < 1e-12);
        assert!((scalar(&var.finalize_with_ddof(&state, 1)) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_covariance_matrix() {
        let cov = RunningCovariance::<f64>::new(&[2], 1).unwrap();
        let mut state = cov.initialize();
        for x in [array![1.0, 0.0], array![0.0, 1.0], array![1.0, 1.0]] {
            state = cov.update(&state, &x, None).unwrap();
        }

        let result = cov.finalize(&state);
        let expected = array![[2.0 / 9.0, -1.0 / 9.0], [-1.0 / 9.0, 2.0 / 9.0]].into_dyn();
        assert!(approx_eq(&result, &expected, 1e-12), "got {:?}", result);
        assert_eq!(result[[0, 1]], result[[1, 0]]);
    }

    #[test]
    fn test_chunked_matches_unchunked() {
        let data = Array::from_shape_fn((6, 3, 2), |(i, j, k)| {
            ((i * 7 + j * 3 + k * 5) % 11) as f64 - 4.5
        });
        let cov = RunningCovariance::<f64>::new(&[3, 2], 1).unwrap();

        let mut one_by_one = cov.initialize();
        for sample in data.axis_iter(Axis(0)) {
            one_by_one = cov.update(&one_by_one, &sample, None).unwrap();
        }

        let first = data.slice(ndarray::s![..2, .., ..]);
        let rest = data.slice(ndarray::s![2.., .., ..]);
        let chunked = cov.initialize();
        let chunked = cov.update(&chunked, &first, Some(0)).unwrap();
        let chunked = cov.update(&chunked, &rest, Some(0)).unwrap();

        assert_eq!(chunked.num_samples(), 6);
        assert!(approx_eq(chunked.mean(), one_by_one.mean(), 1e-10));
        assert!(approx_eq(
            chunked.sum_squared_residuals(),
            one_by_one.sum_squared_residuals(),
            1e-10
        ));
    }

    #[test]
    fn test_chunk_axis_inside_batch() {
        // [batch 4, chunk 3, event 2]
        let data = Array::from_shape_fn((4, 3, 2), |(b, m, e)| (b + 2 * m + 3 * e) as f64);
        let cov = RunningCovariance::<f64>::new(&[4, 2], 1).unwrap();

        let chunked = cov.update(&cov.initialize(), &data, Some(1)).unwrap();

        let mut expected = cov.initialize();
        for sample in data.axis_iter(Axis(1)) {
            expected = cov.update(&expected, &sample, None).unwrap();
        }

        assert_eq!(cov.finalize(&chunked).shape(), &[4, 2, 2]);
        assert!(approx_eq(
            chunked.sum_squared_residuals(),
            expected.sum_squared_residuals(),
            1e-10
        ));
    }

    #[test]
    fn test_ones_have_zero_covariance() {
        let cov = RunningCovariance::<f64>::new(&[5, 2], 1).unwrap();
        let sample = ndarray::Array3::<f64>::ones((3, 5, 2));
        let state = cov.update(&cov.initialize(), &sample, Some(0)).unwrap();

        let result = cov.finalize(&state);
        assert_eq!(result.shape(), &[5, 2, 2]);
        assert!(result.iter().all(|&v| v == 0.0));
        assert!(state.mean().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_full_covariance() {
        let cov = RunningCovariance::<f64>::full(&[2, 3]).unwrap();
        assert_eq!(cov.event_ndims(), 2);
        assert!(cov.batch_shape().is_empty());

        let state = cov.initialize();
        assert_eq!(state.sum_squared_residuals().shape(), &[2, 3, 2, 3]);
    }

    #[test]
    fn test_event_ndims_beyond_rank() {
        let err = RunningCovariance::<f64>::new(&[2], 2).unwrap_err();
        assert!(matches!(err, StatsError::Config(_)));
        assert!(err.to_string().contains("rank 1"));
    }

    #[test]
    fn test_event_ndims_over_limit() {
        let shape = vec![1; MAX_EVENT_NDIMS + 1];
        let err = RunningCovariance::<f64>::new(&shape, MAX_EVENT_NDIMS + 1).unwrap_err();
        assert!(matches!(err, StatsError::Config(_)));

        // beyond the old single-letter label alphabet
        assert!(RunningCovariance::<f64>::new(&[1; 14], 14).is_ok());

        let at_limit = RunningCovariance::<f64>::new(&[1; MAX_EVENT_NDIMS], MAX_EVENT_NDIMS).unwrap();
        assert_eq!(at_limit.event_ndims(), MAX_EVENT_NDIMS);
        assert!(at_limit.batch_shape().is_empty());
    }

    #[test]
    fn test_state_from_other_configuration() {
        let cov = RunningCovariance::<f64>::new(&[2, 3], 1).unwrap();
        let variance_state = RunningCovariance::<f64>::new(&[2, 3], 0).unwrap().initialize();

        let res = cov.update(&variance_state, &Array2::<f64>::zeros((2, 3)), None);
        match res {
            Err(StatsError::Shape(e)) => assert_eq!(e.kind(), ErrorKind::IncompatibleShape),
            other => panic!("expected shape error, got {:?}", other),
        }

        let other_shape = RunningCovariance::<f64>::new(&[3, 3], 1).unwrap().initialize();
        let res = cov.update(&other_shape, &Array2::<f64>::zeros((2, 3)), None);
        assert!(matches!(res, Err(StatsError::Shape(_))));
    }

    #[test]
    fn test_shapes() {
        let cov = RunningCovariance::<f32>::new(&[5, 7], 1).unwrap();
        assert_eq!(cov.shape(), &[5, 7]);
        assert_eq!(cov.batch_shape(), &[5]);
        assert_eq!(cov.event_shape(), &[7]);

        let state = cov.initialize();
        assert_eq!(state.mean().shape(), &[5, 7]);
        assert_eq!(state.sum_squared_residuals().shape(), &[5, 7, 7]);
        assert!(state.is_empty());
    }

    #[test]
    fn test_empty_finalize_is_nan() {
        let cov = RunningCovariance::<f64>::new(&[2], 1).unwrap();
        let result = cov.finalize(&cov.initialize());
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_single_sample_ddof_one_not_finite() {
        let var = RunningVariance::<f64>::scalar();
        let state = var.update(&var.initialize(), &arr0(4.0), None).unwrap();
        let result = var.finalize_with_ddof(&state, 1);
        assert!(!scalar(&result).is_finite());
    }

    #[test]
    fn test_update_leaves_input_state() {
        let var = RunningVariance::<f64>::new(&[2]);
        let before = var.update(&var.initialize(), &array![1.0, 2.0], None).unwrap();
        let snapshot = before.clone();

        let after = var.update(&before, &array![3.0, 6.0], None).unwrap();

        assert_eq!(before, snapshot);
        assert_eq!(after.num_samples(), 2);
        assert_eq!(after.mean(), &array![2.0, 4.0].into_dyn());
    }

    #[test]
    fn test_integer_samples_are_cast() {
        let var = RunningVariance::<f64>::scalar();
        let mut state = var.initialize();
        for v in [1i32, 2, 3, 4] {
            state = var.update(&state, &arr0(v), None).unwrap();
        }
        assert!((scalar(state.mean()) - 2.5).abs() < 1e-12);
        assert!((scalar(&var.finalize(&state)) - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_f32() {
        let var = RunningVariance::<f32>::scalar();
        let samples = array![2.0f32, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let state = var.update(&var.initialize(), &samples, Some(0)).unwrap();
        assert!((*var.finalize(&state).first().unwrap() - 4.0_f32).abs() < 1e-5);
    }

    #[test]
    fn test_shape_mismatch() {
        let var = RunningVariance::<f64>::new(&[2]);
        let res = var.update(&var.initialize(), &array![1.0, 2.0, 3.0], None);
        assert!(matches!(res, Err(StatsError::Shape(_))));
    }

    #[test]
    fn test_axis_out_of_range() {
        let var = RunningVariance::<f64>::new(&[2]);
        let res = var.update(&var.initialize(), &Array2::<f64>::zeros((3, 2)), Some(2));
        assert!(matches!(res, Err(StatsError::Shape(_))));
    }

    #[test]
    fn test_numerical_stability() {
        let var = RunningVariance::<f64>::scalar();
        let base = 1e9;
        let mut state = var.initialize();
        for v in [4.0, 7.0, 13.0, 16.0] {
            state = var.update(&state, &arr0(base + v), None).unwrap();
        }
        // variance of [4, 7, 13, 16] is 22.5
        let result = scalar(&var.finalize(&state));
        assert!((result - 22.5).abs() < 1e-6, "variance: {}", result);
    }

    #[test]
    fn test_trait_update_all() {
        let var = RunningVariance::<f64>::scalar();
        let samples: Vec<ArrayD<f64>> = [1.0, 2.0, 3.0, 4.0, 5.0]
            .iter()
            .map(|&v| arr0(v).into_dyn())
            .collect();
        let state = var.update_all(&RunningStatistic::initialize(&var), &samples).unwrap();
        let result = RunningStatistic::finalize(&var, &state);
        assert!((scalar(&result) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_variance_into_covariance() {
        let cov: RunningCovariance<f64> = RunningVariance::new(&[3]).into();
        assert_eq!(cov.event_ndims(), 0);
        assert_eq!(cov.shape(), &[3]);
    }
}
