use crate::EPSILON;
use anyhow::{ensure, Result};
use tch::Tensor;

/// Computes pairwise IoU between a grid of predicted boxes and a set of
/// ground-truth boxes.
///
/// `pred_boxes` has shape `[h, w, a, 4]` and `true_boxes` has shape
/// `[V, 4]`, both in `(center_x, center_y, w, h)` format and in the
/// same length unit. The output has shape `[h, w, a, V]`. `V` may be
/// zero, in which case the output has a zero-length last axis.
pub fn pairwise_iou(pred_boxes: &Tensor, true_boxes: &Tensor) -> Result<Tensor> {
    let parts = OverlapParts::new(pred_boxes, true_boxes)?;
    Ok(parts.iou())
}

/// Computes pairwise IoU and GIoU in one pass.
///
/// Same shape contract as [`pairwise_iou`]. Returns `(iou, giou)`,
/// each of shape `[h, w, a, V]`. GIoU subtracts the enclosing-box
/// penalty from IoU and therefore lies in `[-1, 1]`.
pub fn pairwise_giou(pred_boxes: &Tensor, true_boxes: &Tensor) -> Result<(Tensor, Tensor)> {
    let parts = OverlapParts::new(pred_boxes, true_boxes)?;
    let iou = parts.iou();
    let giou = parts.giou(&iou);
    Ok((iou, giou))
}

/// Intermediate areas shared by the IoU and GIoU formulas.
struct OverlapParts {
    // [h, w, a, 1, 2]
    pred_xy: Tensor,
    pred_wh: Tensor,
    // [V, 2]
    true_xy: Tensor,
    true_wh: Tensor,
    // [h, w, a, V]
    intersect_area: Tensor,
    // [h, w, a, 1]
    pred_area: Tensor,
    // [V]
    true_area: Tensor,
}

impl OverlapParts {
    fn new(pred_boxes: &Tensor, true_boxes: &Tensor) -> Result<Self> {
        let pred_size = pred_boxes.size();
        let true_size = true_boxes.size();
        ensure!(
            pred_size.len() == 4 && pred_size[3] == 4,
            "expect predicted boxes of shape [h, w, a, 4], found {:?}",
            pred_size
        );
        ensure!(
            true_size.len() == 2 && true_size[1] == 4,
            "expect ground-truth boxes of shape [V, 4], found {:?}",
            true_size
        );

        // add a trailing ground-truth axis so the grid broadcasts
        // against [V, 2]
        let pred_xy = pred_boxes.narrow(-1, 0, 2).unsqueeze(-2);
        let pred_wh = pred_boxes.narrow(-1, 2, 2).unsqueeze(-2);

        let true_xy = true_boxes.narrow(1, 0, 2);
        let true_wh = true_boxes.narrow(1, 2, 2);

        // [h, w, a, 1, 2] & [V, 2] => [h, w, a, V, 2]
        let intersect_mins = (&pred_xy - &pred_wh / 2.0).maximum(&(&true_xy - &true_wh / 2.0));
        let intersect_maxs = (&pred_xy + &pred_wh / 2.0).minimum(&(&true_xy + &true_wh / 2.0));
        let intersect_wh = (intersect_maxs - intersect_mins).clamp_min(0.0);

        // [h, w, a, V]
        let intersect_area = intersect_wh.select(-1, 0) * intersect_wh.select(-1, 1);
        // [h, w, a, 1]
        let pred_area = pred_wh.select(-1, 0) * pred_wh.select(-1, 1);
        // [V]
        let true_area = true_wh.select(-1, 0) * true_wh.select(-1, 1);

        Ok(Self {
            pred_xy,
            pred_wh,
            true_xy,
            true_wh,
            intersect_area,
            pred_area,
            true_area,
        })
    }

    fn union_area(&self) -> Tensor {
        &self.pred_area + &self.true_area - &self.intersect_area
    }

    fn iou(&self) -> Tensor {
        &self.intersect_area / (self.union_area() + EPSILON)
    }

    fn giou(&self, iou: &Tensor) -> Tensor {
        // smallest box enclosing both the prediction and the truth
        let enclose_mins =
            (&self.pred_xy - &self.pred_wh / 2.0).minimum(&(&self.true_xy - &self.true_wh / 2.0));
        let enclose_maxs =
            (&self.pred_xy + &self.pred_wh / 2.0).maximum(&(&self.true_xy + &self.true_wh / 2.0));
        let enclose_wh = enclose_maxs - enclose_mins;

        // [h, w, a, V]
        let enclose_area = enclose_wh.select(-1, 0) * enclose_wh.select(-1, 1);
        let union_area = self.union_area();

        iou - (&enclose_area - union_area) / (enclose_area + EPSILON)
    }
}
