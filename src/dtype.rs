//! Accumulation types
//!
//! Every estimator accumulates in a floating point type. Requesting an
//! integral sample type is allowed, but the running means are then kept in
//! `f64`: dividing by the sample count in an integer type would truncate.

use core::fmt::Debug;

use ndarray::ScalarOperand;
use num_traits::{Float, FromPrimitive, NumAssign};

/// Floating point type the estimators accumulate in
pub trait Real:
    Float + NumAssign + FromPrimitive + ScalarOperand + Debug + Send + Sync + 'static
{
    /// Convert a sample count into this type
    fn from_count(n: u64) -> Self;
}

impl Real for f32 {
    #[inline]
    fn from_count(n: u64) -> Self {
        n as f32
    }
}

impl Real for f64 {
    #[inline]
    fn from_count(n: u64) -> Self {
        n as f64
    }
}

/// Element type a caller may request for an estimator
///
/// `Acc` is the type the statistics are actually held in.
pub trait Element: Copy + Debug + Send + Sync + 'static {
    /// Accumulation type
    type Acc: Real;

    /// Widen one element into the accumulation type
    fn to_acc(self) -> Self::Acc;
}

macro_rules! float_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                type Acc = $t;

                #[inline]
                fn to_acc(self) -> $t {
                    self
                }
            }
        )*
    };
}

macro_rules! integer_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                type Acc = f64;

                #[inline]
                fn to_acc(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

float_element!(f32, f64);
integer_element!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
