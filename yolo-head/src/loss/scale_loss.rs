use super::{BceWithLogitsLoss, BceWithLogitsLossInit};
use crate::{common::*, decode::ScaleDecoder, error::ShapeError};
use tch_overlap::{pairwise_giou, pairwise_iou};

#[derive(Debug)]
pub struct ScaleLossInit {
    pub decoder: ScaleDecoder,
    pub use_giou_loss: bool,
    pub use_focal_loss: bool,
    pub use_label_smooth: bool,
    pub focal_alpha: f64,
    pub focal_gamma: f64,
    pub label_smooth_delta: f64,
}

impl ScaleLossInit {
    pub fn build(self) -> ScaleLoss {
        let Self {
            decoder,
            use_giou_loss,
            use_focal_loss,
            use_label_smooth,
            focal_alpha,
            focal_gamma,
            label_smooth_delta,
        } = self;

        ScaleLoss {
            decoder,
            bce: BceWithLogitsLossInit::default(Reduction::None).build(),
            use_giou_loss,
            use_focal_loss,
            use_label_smooth,
            focal_alpha,
            focal_gamma,
            label_smooth_delta,
        }
    }
}

/// The composite loss of one feature-map scale.
///
/// The ground truth layout along the last axis is
/// `[cx, cy, w, h, objectness, one-hot classes.., mixup weight]`, all
/// box fields in input-image pixels.
#[derive(Debug)]
pub struct ScaleLoss {
    decoder: ScaleDecoder,
    bce: BceWithLogitsLoss,
    use_giou_loss: bool,
    use_focal_loss: bool,
    use_label_smooth: bool,
    focal_alpha: f64,
    focal_gamma: f64,
    label_smooth_delta: f64,
}

#[derive(Debug, TensorLike)]
pub struct ScaleLossOutput {
    pub iou_loss: Tensor,
    pub conf_loss: Tensor,
    pub class_loss: Tensor,
}

impl ScaleLoss {
    pub fn decoder(&self) -> &ScaleDecoder {
        &self.decoder
    }

    pub fn forward(&self, feature_map: &Tensor, y_true: &Tensor) -> Result<ScaleLossOutput> {
        let class_num = self.decoder.class_num();
        let decoded = self.decoder.decode(feature_map)?;
        let pred_size = decoded.boxes.size();
        let (batch_size, grid_h, grid_w) = (pred_size[0], pred_size[1], pred_size[2]);

        match y_true.size().as_slice() {
            &[b, h, w, a, e]
                if b == batch_size
                    && h == grid_h
                    && w == grid_w
                    && a == 3
                    && e == class_num + 6 => {}
            found => {
                return Err(ShapeError::new(
                    "ground truth",
                    format!(
                        "[{}, {}, {}, 3, {}]",
                        batch_size,
                        grid_h,
                        grid_w,
                        class_num + 6
                    ),
                    format!("{:?}", found),
                )
                .into());
            }
        }

        let device = feature_map.device();
        let batch_size_f = batch_size as f64;

        let object_mask = y_true.narrow(-1, 4, 1);
        let mix_weight = y_true.narrow(-1, 5 + class_num, 1);

        // best overlap and near-miss mask, image by image since the
        // number of valid boxes varies within a batch
        let (best_overlap, ignore_mask) = {
            let mut best_vec = Vec::with_capacity(batch_size as usize);
            let mut ignore_vec = Vec::with_capacity(batch_size as usize);

            for index in 0..batch_size {
                let pred_boxes = decoded.boxes.i((index, .., .., .., ..));
                let valid_true_boxes = {
                    let selectors = object_mask
                        .i((index, .., .., .., 0))
                        .reshape(&[-1])
                        .nonzero()
                        .view([-1]);
                    y_true
                        .i((index, .., .., .., ..))
                        .narrow(-1, 0, 4)
                        .reshape(&[-1, 4])
                        .index_select(0, &selectors)
                };

                if valid_true_boxes.size()[0] == 0 {
                    // no ground truth: every cell is a plain negative
                    best_vec.push(Tensor::zeros(&[grid_h, grid_w, 3], (Kind::Float, device)));
                    ignore_vec.push(Tensor::ones(&[grid_h, grid_w, 3], (Kind::Float, device)));
                    continue;
                }

                let (iou, best) = if self.use_giou_loss {
                    let (iou, giou) = pairwise_giou(&pred_boxes, &valid_true_boxes)?;
                    let best = giou.amax(&[-1], false);
                    (iou, best)
                } else {
                    let iou = pairwise_iou(&pred_boxes, &valid_true_boxes)?;
                    let best = iou.amax(&[-1], false);
                    (iou, best)
                };

                // the near-miss threshold always reads plain IoU, even
                // when the overlap loss itself is GIoU
                let best_iou = iou.amax(&[-1], false);
                ignore_vec.push(best_iou.lt(0.5).to_kind(Kind::Float));
                best_vec.push(best);
            }

            (
                Tensor::stack(&best_vec, 0).unsqueeze(-1),
                Tensor::stack(&ignore_vec, 0).unsqueeze(-1),
            )
        };

        let best_overlap = if self.use_giou_loss {
            best_overlap.clamp(-1.0, 1.0)
        } else {
            best_overlap.clamp(0.0, 1.0)
        };

        let iou_loss =
            ((1.0f64 - &best_overlap) * &object_mask * &mix_weight).sum(Kind::Float) / batch_size_f;

        let conf_loss = {
            let bce = self.bce.forward(&decoded.conf_logits, &object_mask);
            let positive = &object_mask * &bce;
            let negative = (1.0f64 - &object_mask) * &ignore_mask * bce;
            let conf_loss = positive + negative;
            let conf_loss = if self.use_focal_loss {
                let focal = (&object_mask - decoded.conf_logits.sigmoid())
                    .abs()
                    .pow(&self.focal_gamma.into())
                    * self.focal_alpha;
                conf_loss * focal
            } else {
                conf_loss
            };
            (conf_loss * &mix_weight).sum(Kind::Float) / batch_size_f
        };

        let class_loss = {
            let labels = y_true.narrow(-1, 5, class_num);
            let target = if self.use_label_smooth {
                smooth_labels(&labels, self.label_smooth_delta, class_num)
            } else {
                labels
            };
            let bce = self.bce.forward(&decoded.prob_logits, &target);
            (&object_mask * bce * &mix_weight).sum(Kind::Float) / batch_size_f
        };

        Ok(ScaleLossOutput {
            iou_loss,
            conf_loss,
            class_loss,
        })
    }
}

/// Blends one-hot labels toward the uniform distribution.
pub(crate) fn smooth_labels(labels: &Tensor, delta: f64, class_num: i64) -> Tensor {
    labels * (1.0 - delta) + delta / class_num as f64
}
