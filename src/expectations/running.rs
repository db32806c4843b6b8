//! Running expectations over a tree of functions

use core::fmt;
use core::marker::PhantomData;
use std::sync::Arc;

use log::{debug, trace};
use ndarray::{ArrayBase, ArrayD, ArrayViewD, Axis, Data, Dimension, ErrorKind, ShapeError};
use num_traits::AsPrimitive;

use crate::dtype::{Element, Real};
use crate::math::merge_mean;
use crate::tensor::{broadcast_into, check_axis};
use crate::traits::{RunningStatistic, StatsError};
use crate::tree::Tree;

/// Function whose expectation is tracked
///
/// It receives one whole sample: a one-leaf tree for plain array samples,
/// or the full tree of parts for structured samples.
pub type Expectation<F> = Arc<
    dyn for<'a, 'b> Fn(&'b Tree<ArrayViewD<'a, F>>) -> Result<ArrayD<F>, StatsError>
        + Send
        + Sync,
>;

fn erase<F, C>(f: C) -> Expectation<F>
where
    C: for<'a, 'b> Fn(&'b Tree<ArrayViewD<'a, F>>) -> Result<ArrayD<F>, StatsError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Wrap a function of a single array as a one-leaf tree of expectations
///
/// Feeding it a structured sample fails with
/// [`StatsError::StructureMismatch`].
pub fn expectation<F, C>(f: C) -> Tree<Expectation<F>>
where
    F: Real,
    C: Fn(ArrayViewD<'_, F>) -> ArrayD<F> + Send + Sync + 'static,
{
    Tree::Leaf(erase(move |sample| match sample.as_leaf() {
        Some(view) => Ok(f(view.view())),
        None => Err(StatsError::StructureMismatch(format!(
            "function of one array given a sample with {} parts",
            sample.num_leaves()
        ))),
    }))
}

/// Wrap a function of a structured sample as a one-leaf tree of expectations
///
/// # Examples
///
/// ```
/// use flowmoments::prelude::*;
/// use ndarray::{arr0, ArrayViewD};
///
/// // E[|x|^2 + v^2] over samples {"x": [2], "v": []}
/// let energy = structured_expectation(|s: &Tree<ArrayViewD<f64>>| {
///     let x = s.get("x").and_then(Tree::as_leaf).map_or(0.0, |x| x.mapv(|a| a * a).sum());
///     let v = s.get("v").and_then(Tree::as_leaf).map_or(0.0, |v| v.sum());
///     arr0(x + v * v).into_dyn()
/// });
///
/// let exp = RunningExpectations::<f64>::new(&[], energy);
/// let sample = Tree::named([
///     ("x", Tree::leaf(ndarray::array![1.0, 2.0].into_dyn())),
///     ("v", Tree::leaf(arr0(3.0).into_dyn())),
/// ]);
/// let state = exp.update_structured(&exp.initialize(), &sample, None).unwrap();
/// let result = exp.finalize(&state);
/// assert_eq!(*result.as_leaf().unwrap().first().unwrap(), 14.0);
/// ```
pub fn structured_expectation<F, C>(f: C) -> Tree<Expectation<F>>
where
    F: Real,
    C: for<'a, 'b> Fn(&'b Tree<ArrayViewD<'a, F>>) -> ArrayD<F> + Send + Sync + 'static,
{
    Tree::Leaf(erase(move |sample| Ok(f(sample))))
}

/// Accumulated expectations
///
/// `expectation` mirrors the topology of the estimator's functions; every
/// leaf holds the running mean of its function's output.
#[derive(Clone, Debug, PartialEq)]
pub struct RunningExpectationsState<F> {
    num_samples: u64,
    expectation: Tree<ArrayD<F>>,
}

impl<F: Real> RunningExpectationsState<F> {
    /// Number of samples seen
    pub fn num_samples(&self) -> u64 {
        self.num_samples
    }

    /// Running means, one per function
    pub fn expectation(&self) -> &Tree<ArrayD<F>> {
        &self.expectation
    }
}

/// Streaming estimator of `E[f(X)]` for a tree of functions `f`
///
/// `T` is the requested element type. Floating types accumulate in
/// themselves; integral types accumulate in `f64` (see
/// [`Element`](crate::dtype::Element)). Every function maps one sample,
/// cast to the accumulation type, to an array of the configured shape.
///
/// A sample is either one array ([`update`](Self::update)) or a tree of
/// arrays ([`update_structured`](Self::update_structured)). When a chunk is
/// supplied, every part of the sample is sliced along the same axis and all
/// functions advance by the same sample count.
#[derive(Clone)]
pub struct RunningExpectations<T: Element = f64> {
    shape: Vec<usize>,
    callables: Tree<Expectation<T::Acc>>,
    _dtype: PhantomData<T>,
}

impl<T: Element> fmt::Debug for RunningExpectations<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningExpectations")
            .field("shape", &self.shape)
            .field("callables", &self.callables.map(|_| "<fn>"))
            .field("dtype", &core::any::type_name::<T::Acc>())
            .finish()
    }
}

impl<T: Element> RunningExpectations<T> {
    /// Create an estimator for the expectations of `callables`
    ///
    /// # Arguments
    ///
    /// * `shape` - Shape of each function's output
    /// * `callables` - Functions to average, in any tree topology
    pub fn new(shape: &[usize], callables: Tree<Expectation<T::Acc>>) -> Self {
        debug!(
            "running expectations: shape {:?}, {} functions, accumulating in {}",
            shape,
            callables.num_leaves(),
            core::any::type_name::<T::Acc>()
        );

        Self {
            shape: shape.to_vec(),
            callables,
            _dtype: PhantomData,
        }
    }

    /// Estimator for a single function
    pub fn single<C>(shape: &[usize], f: C) -> Self
    where
        C: Fn(ArrayViewD<'_, T::Acc>) -> ArrayD<T::Acc> + Send + Sync + 'static,
    {
        Self::new(shape, expectation(f))
    }

    /// Shape of each expectation
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The functions being averaged
    pub fn callables(&self) -> &Tree<Expectation<T::Acc>> {
        &self.callables
    }

    /// State representing a stream with no samples
    pub fn initialize(&self) -> RunningExpectationsState<T::Acc> {
        RunningExpectationsState {
            num_samples: 0,
            expectation: self
                .callables
                .map(|_| ArrayD::<T::Acc>::zeros(self.shape.as_slice())),
        }
    }

    /// Fold a sample, or a chunk of samples along `axis`, into `state`
    ///
    /// With `axis = Some(k)` every function is applied to each slice along
    /// axis `k` and the results are averaged before merging.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Shape`] when `axis` is out of range or a
    /// function's output does not broadcast to the configured shape, and
    /// [`StatsError::StructureMismatch`] when `state` came from an
    /// estimator with a different tree of functions or a function expects a
    /// structured sample.
    pub fn update<S, D>(
        &self,
        state: &RunningExpectationsState<T::Acc>,
        new_sample: &ArrayBase<S, D>,
        axis: Option<usize>,
    ) -> Result<RunningExpectationsState<T::Acc>, StatsError>
    where
        S: Data,
        S::Elem: AsPrimitive<T::Acc>,
        D: Dimension,
    {
        let new_sample = new_sample.mapv(|x| x.as_()).into_dyn();
        self.fold(state, Tree::Leaf(new_sample), axis)
    }

    /// Fold a structured sample, or a chunk of them, into `state`
    ///
    /// Every part is cast to the accumulation type. With `axis = Some(k)`
    /// the number of samples is the length of the first part along axis
    /// `k`, and all parts are sliced together along that axis.
    ///
    /// # Errors
    ///
    /// As [`update`](Self::update), plus [`StatsError::Shape`] when the
    /// parts of a chunk disagree on its length and
    /// [`StatsError::StructureMismatch`] when a chunk has no parts.
    pub fn update_structured<S, D>(
        &self,
        state: &RunningExpectationsState<T::Acc>,
        new_sample: &Tree<ArrayBase<S, D>>,
        axis: Option<usize>,
    ) -> Result<RunningExpectationsState<T::Acc>, StatsError>
    where
        S: Data,
        S::Elem: AsPrimitive<T::Acc>,
        D: Dimension,
    {
        let new_sample = new_sample.map(|part| part.mapv(|x| x.as_()).into_dyn());
        self.fold(state, new_sample, axis)
    }

    fn fold(
        &self,
        state: &RunningExpectationsState<T::Acc>,
        new_sample: Tree<ArrayD<T::Acc>>,
        axis: Option<usize>,
    ) -> Result<RunningExpectationsState<T::Acc>, StatsError> {
        let chunk = match axis {
            None => None,
            Some(axis) => Some(chunk_len(&new_sample, axis)?),
        };
        let chunk_count = chunk.map_or(1, |(_, len)| len as u64);
        let num_samples = state.num_samples + chunk_count;
        let chunk_n = <T::Acc as Real>::from_count(chunk_count);
        let new_n = <T::Acc as Real>::from_count(num_samples);

        let expectation = self
            .callables
            .try_zip_with(&state.expectation, |f, old_mean| {
                let chunk_mean = self.chunk_mean(f, &new_sample, chunk)?;
                Ok(merge_mean(old_mean, chunk_mean, chunk_n, new_n)?.mean)
            })?;

        trace!(
            "expectations update: {} new samples, {} total",
            chunk_count,
            num_samples
        );

        Ok(RunningExpectationsState {
            num_samples,
            expectation,
        })
    }

    fn chunk_mean(
        &self,
        f: &Expectation<T::Acc>,
        sample: &Tree<ArrayD<T::Acc>>,
        chunk: Option<(Axis, usize)>,
    ) -> Result<ArrayD<T::Acc>, StatsError> {
        let (axis, len) = match chunk {
            None => return f(&sample.map(|part| part.view())),
            Some(chunk) => chunk,
        };

        let mut total = ArrayD::<T::Acc>::zeros(self.shape.as_slice());
        for i in 0..len {
            let slice = sample.map(|part| part.index_axis(axis, i));
            total += &broadcast_into(f(&slice)?, &self.shape)?;
        }
        let len = <T::Acc as Real>::from_count(len as u64);
        Ok(total.mapv_into(|v| v / len))
    }

    /// Current expectations, in the topology of the functions
    ///
    /// A state with no samples yields all zeros.
    pub fn finalize(&self, state: &RunningExpectationsState<T::Acc>) -> Tree<ArrayD<T::Acc>> {
        state.expectation.clone()
    }
}

/// Chunk axis and length shared by every part of `sample`
fn chunk_len<F>(sample: &Tree<ArrayD<F>>, axis: usize) -> Result<(Axis, usize), StatsError> {
    let parts = sample.leaves();
    let first = parts
        .first()
        .ok_or_else(|| StatsError::StructureMismatch("chunk has no parts".to_string()))?;
    let axis = check_axis(first.ndim(), axis)?;
    let len = first.len_of(axis);

    for part in &parts[1..] {
        let part_axis = check_axis(part.ndim(), axis.index())?;
        if part.len_of(part_axis) != len {
            return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
        }
    }
    Ok((axis, len))
}

impl<T: Element> RunningStatistic for RunningExpectations<T> {
    type Sample = ArrayD<T>;
    type State = RunningExpectationsState<T::Acc>;
    type Output = Tree<ArrayD<T::Acc>>;

    fn initialize(&self) -> Self::State {
        RunningExpectations::initialize(self)
    }

    fn update(
        &self,
        state: &Self::State,
        new_sample: &Self::Sample,
        axis: Option<usize>,
    ) -> Result<Self::State, StatsError> {
        self.fold(state, Tree::Leaf(new_sample.mapv(T::to_acc)), axis)
    }

    fn finalize(&self, state: &Self::State) -> Self::Output {
        RunningExpectations::finalize(self, state)
    }
}
