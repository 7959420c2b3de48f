//! YOLOv3-style detection head: feature-map decoding and the
//! multi-scale training loss.
//!
//! The crate takes the three raw feature maps a backbone produces and
//! turns them into either a flat list of decoded detections
//! ([`YoloHead::predict`]) or the composite training loss
//! ([`YoloHead::compute_loss`]). The convolutional backbone, NMS and
//! the training loop live elsewhere.

mod common;
pub mod config;
pub mod decode;
pub mod error;
pub mod head;
pub mod loss;

pub use config::*;
pub use decode::*;
pub use error::*;
pub use head::*;
pub use loss::*;
