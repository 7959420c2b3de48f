use crate::{common::*, error::ShapeError};

/// One decoded feature-map scale.
///
/// Boxes are in `(center_x, center_y, w, h)` format, rescaled to
/// input-image pixels. Objectness and class logits are returned raw;
/// activating them is the caller's concern so the loss can keep logit
/// semantics.
#[derive(Debug, TensorLike)]
pub struct DecodedScale {
    /// Integer mesh offsets in `(x, y)` order, shape `[h, w, 1, 2]`.
    pub xy_offset: Tensor,
    /// Pixel-space boxes, shape `[batch, h, w, 3, 4]`.
    pub boxes: Tensor,
    /// Raw objectness logits, shape `[batch, h, w, 3, 1]`.
    pub conf_logits: Tensor,
    /// Raw class logits, shape `[batch, h, w, 3, class_num]`.
    pub prob_logits: Tensor,
}

/// Decodes one scale's raw feature map into boxes and logits.
#[derive(Debug, Clone)]
pub struct ScaleDecoder {
    pub(crate) class_num: i64,
    /// This scale's three anchors as `(w, h)` in input-image pixels.
    pub(crate) anchors: [(f64, f64); 3],
    pub(crate) image_height: i64,
    pub(crate) image_width: i64,
    pub(crate) clamp_box_size: bool,
}

impl ScaleDecoder {
    /// Decodes a feature map of shape `[batch, h, w, 3 * (5 + class_num)]`.
    pub fn decode(&self, feature_map: &Tensor) -> Result<DecodedScale> {
        let Self {
            class_num,
            anchors,
            image_height,
            image_width,
            clamp_box_size,
        } = *self;

        let (batch_size, grid_h, grid_w, channels) = feature_map.size4()?;
        let num_entries = 5 + class_num;
        if channels != 3 * num_entries {
            return Err(ShapeError::new(
                "feature map channels",
                3 * num_entries,
                channels,
            )
            .into());
        }
        if image_height % grid_h != 0 || image_width % grid_w != 0 {
            return Err(ShapeError::new(
                "feature map grid",
                format!("an integer divisor of {}x{}", image_height, image_width),
                format!("{}x{}", grid_h, grid_w),
            )
            .into());
        }

        let device = feature_map.device();
        // downscale ratio per axis, height and width independently
        let ratio_h = image_height as f64 / grid_h as f64;
        let ratio_w = image_width as f64 / grid_w as f64;

        // anchors in grid units, shape [3, 2] as (w, h)
        let rescaled_anchors = {
            let values: Vec<f32> = anchors
                .iter()
                .flat_map(|&(w, h)| [(w / ratio_w) as f32, (h / ratio_h) as f32])
                .collect();
            Tensor::of_slice(&values)
                .view([3, 2])
                .to_device(device)
                .set_requires_grad(false)
        };

        let feature_map = feature_map.view([batch_size, grid_h, grid_w, 3, num_entries]);
        let splits = feature_map.split_with_sizes(&[2, 2, 1, class_num], -1);
        let (raw_centers, raw_sizes, conf_logits, prob_logits) =
            match splits.as_slice() {
                [centers, sizes, conf, prob] => (
                    centers.shallow_clone(),
                    sizes.shallow_clone(),
                    conf.shallow_clone(),
                    prob.shallow_clone(),
                ),
                _ => unreachable!(),
            };

        // per-cell integer offsets, shape [h, w, 1, 2] in (x, y) order
        let xy_offset = tch::no_grad(|| {
            let grid_x = Tensor::arange(grid_w, (Kind::Float, device))
                .view([1, grid_w, 1, 1])
                .expand(&[grid_h, grid_w, 1, 1], false);
            let grid_y = Tensor::arange(grid_h, (Kind::Float, device))
                .view([grid_h, 1, 1, 1])
                .expand(&[grid_h, grid_w, 1, 1], false);
            Tensor::cat(&[grid_x, grid_y], -1)
        });

        // (x, y) axis order: width ratio applies to x, height to y
        let ratio_wh = Tensor::of_slice(&[ratio_w as f32, ratio_h as f32])
            .to_device(device)
            .set_requires_grad(false);

        let box_centers = (raw_centers.sigmoid() + &xy_offset) * &ratio_wh;

        // the exponential is unclamped by default; large raw values
        // overflow rather than error (parity with reference weights)
        let box_sizes = {
            let scale = raw_sizes.exp();
            let scale = if clamp_box_size {
                scale.clamp(1e-9, 100.0)
            } else {
                scale
            };
            scale * &rescaled_anchors * &ratio_wh
        };

        let boxes = Tensor::cat(&[box_centers, box_sizes], -1);

        Ok(DecodedScale {
            xy_offset,
            boxes,
            conf_logits,
            prob_logits,
        })
    }

    pub fn class_num(&self) -> i64 {
        self.class_num
    }

    pub fn anchors(&self) -> &[(f64, f64); 3] {
        &self.anchors
    }
}
