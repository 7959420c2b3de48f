//! Pairwise box-overlap scores on tch tensors.
//!
//! The crate computes IoU and GIoU between a dense grid of predicted
//! boxes and a variable-length set of ground-truth boxes, along with
//! the box-format conversions the consumers of those scores need.

mod convert;
mod overlap;

pub use convert::*;
pub use overlap::*;

/// Guards the IoU denominator when both boxes are degenerate.
pub const EPSILON: f64 = 1e-10;
