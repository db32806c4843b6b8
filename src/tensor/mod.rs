//! Array plumbing shared by the estimators
//!
//! - [`outer_product`]: event-wise cross product of a value with itself
//! - shape helpers splitting a sample shape into batch and event parts

mod outer;
mod shape;

pub use outer::outer_product;
pub(crate) use shape::{
    batch_shape, broadcast_into, check_axis, covariance_shape, event_shape, split_batch_event,
};
