//! Loss function building blocks.

mod bce_with_logit_loss;
mod scale_loss;

pub use bce_with_logit_loss::*;
pub use scale_loss::*;
