use crate::{
    common::*,
    loss::{ScaleLoss, ScaleLossOutput},
};
use tch_overlap::cxcywh_to_xyxy;

/// The three-scale detection head.
///
/// Built from [`YoloHeadInit`](crate::config::YoloHeadInit). Holds one
/// [`ScaleLoss`] per feature-map scale, ordered coarse to fine; the
/// `predict` and `compute_loss` inputs follow the same order.
#[derive(Debug)]
pub struct YoloHead {
    pub(crate) class_num: i64,
    pub(crate) scales: Vec<ScaleLoss>,
    pub(crate) use_static_shape: bool,
}

/// Inference outputs, flattened across all scales.
///
/// The flattening order is scale-major: all boxes of the coarsest grid
/// first, row-major within a grid, the three anchors innermost.
#[derive(Debug, TensorLike)]
pub struct Prediction {
    /// Corner boxes `(x_min, y_min, x_max, y_max)`, shape `[batch, boxes, 4]`.
    pub boxes: Tensor,
    /// Objectness scores in `[0, 1]`, shape `[batch, boxes, 1]`.
    pub confs: Tensor,
    /// Per-class scores in `[0, 1]`, shape `[batch, boxes, class_num]`.
    pub probs: Tensor,
}

/// Aggregated training loss terms. Each is a scalar tensor.
#[derive(Debug, TensorLike)]
pub struct YoloLossOutput {
    pub total_loss: Tensor,
    pub iou_loss: Tensor,
    pub conf_loss: Tensor,
    pub class_loss: Tensor,
}

impl YoloHead {
    pub fn class_num(&self) -> i64 {
        self.class_num
    }

    pub fn use_static_shape(&self) -> bool {
        self.use_static_shape
    }

    /// Decodes and activates all three scales for inference.
    pub fn predict(&self, feature_maps: &[Tensor; 3]) -> Result<Prediction> {
        let class_num = self.class_num;

        let (boxes_vec, confs_vec, probs_vec) = izip!(feature_maps.iter(), self.scales.iter())
            .map(|(feature_map, scale)| -> Result<_> {
                let decoded = scale.decoder().decode(feature_map)?;
                let decoded_size = decoded.boxes.size();
                let (batch_size, grid_h, grid_w) =
                    (decoded_size[0], decoded_size[1], decoded_size[2]);
                let num_flat = grid_h * grid_w * 3;

                let boxes = decoded.boxes.reshape(&[batch_size, num_flat, 4]);
                let confs = decoded
                    .conf_logits
                    .reshape(&[batch_size, num_flat, 1])
                    .sigmoid();
                let probs = decoded
                    .prob_logits
                    .reshape(&[batch_size, num_flat, class_num])
                    .sigmoid();

                Ok((boxes, confs, probs))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip_n_vec();

        let boxes = cxcywh_to_xyxy(&Tensor::cat(&boxes_vec, 1))?;
        let confs = Tensor::cat(&confs_vec, 1);
        let probs = Tensor::cat(&probs_vec, 1);

        Ok(Prediction {
            boxes,
            confs,
            probs,
        })
    }

    /// Sums the per-scale losses over all three scales.
    pub fn compute_loss(
        &self,
        feature_maps: &[Tensor; 3],
        ground_truths: &[Tensor; 3],
    ) -> Result<YoloLossOutput> {
        let device = feature_maps[0].device();
        let zero = || Tensor::zeros(&[], (Kind::Float, device));

        let (mut iou_loss, mut conf_loss, mut class_loss) = (zero(), zero(), zero());
        for (feature_map, y_true, scale) in
            izip!(feature_maps.iter(), ground_truths.iter(), self.scales.iter())
        {
            let ScaleLossOutput {
                iou_loss: iou,
                conf_loss: conf,
                class_loss: class,
            } = scale.forward(feature_map, y_true)?;

            iou_loss = iou_loss + iou;
            conf_loss = conf_loss + conf;
            class_loss = class_loss + class;
        }
        let total_loss = &iou_loss + &conf_loss + &class_loss;

        Ok(YoloLossOutput {
            total_loss,
            iou_loss,
            conf_loss,
            class_loss,
        })
    }
}
