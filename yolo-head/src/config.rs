use crate::{
    common::*,
    decode::ScaleDecoder,
    head::YoloHead,
    loss::ScaleLossInit,
};

/// The recognized options of the detection head.
///
/// `anchors` holds the global nine-anchor list in input-image pixels,
/// ordered from the smallest anchor to the largest. The scale-to-anchor
/// pairing is fixed by that ordering: the coarsest feature map takes
/// anchors 6..9, the middle one 3..6 and the finest 0..3, so large
/// anchors land on the grids with the largest receptive fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloHeadInit {
    pub class_num: usize,
    pub anchors: Vec<(R64, R64)>,
    /// The letterboxed input size decoded boxes are mapped back to.
    pub image_height: usize,
    pub image_width: usize,
    #[serde(default)]
    pub use_label_smooth: bool,
    #[serde(default)]
    pub use_focal_loss: bool,
    #[serde(default)]
    pub use_giou_loss: bool,
    /// Performance hint only; never changes numeric results.
    #[serde(default = "default_use_static_shape")]
    pub use_static_shape: bool,
    /// Clamps the exponential in box-size decoding to `[1e-9, 100]`.
    /// Off by default for parity with reference weights.
    #[serde(default)]
    pub clamp_box_size: bool,
    #[serde(default = "default_focal_alpha")]
    pub focal_alpha: f64,
    #[serde(default = "default_focal_gamma")]
    pub focal_gamma: f64,
    #[serde(default = "default_label_smooth_delta")]
    pub label_smooth_delta: f64,
}

impl YoloHeadInit {
    pub fn new(
        class_num: usize,
        anchors: Vec<(R64, R64)>,
        image_height: usize,
        image_width: usize,
    ) -> Self {
        Self {
            class_num,
            anchors,
            image_height,
            image_width,
            use_label_smooth: false,
            use_focal_loss: false,
            use_giou_loss: false,
            use_static_shape: default_use_static_shape(),
            clamp_box_size: false,
            focal_alpha: default_focal_alpha(),
            focal_gamma: default_focal_gamma(),
            label_smooth_delta: default_label_smooth_delta(),
        }
    }

    pub fn build(self) -> Result<YoloHead> {
        let Self {
            class_num,
            anchors,
            image_height,
            image_width,
            use_label_smooth,
            use_focal_loss,
            use_giou_loss,
            use_static_shape,
            clamp_box_size,
            focal_alpha,
            focal_gamma,
            label_smooth_delta,
        } = self;

        ensure!(class_num >= 1, "class_num must be at least 1");
        ensure!(
            anchors.len() == 9,
            "expect 9 anchors, found {}",
            anchors.len()
        );
        ensure!(
            anchors
                .iter()
                .all(|&(w, h)| w.raw() > 0.0 && h.raw() > 0.0),
            "anchor dimensions must be positive"
        );
        ensure!(
            image_height >= 1 && image_width >= 1,
            "image dimensions must be positive"
        );
        ensure!(focal_alpha >= 0.0, "focal_alpha must be non-negative");
        ensure!(focal_gamma >= 0.0, "focal_gamma must be non-negative");
        ensure!(
            (0.0..=1.0).contains(&label_smooth_delta),
            "label_smooth_delta must be in range [0, 1]"
        );

        if use_focal_loss && focal_gamma == 0.0 {
            warn!("focal loss enabled with focal_gamma = 0; the modulating factor is constant");
        }
        if use_label_smooth && label_smooth_delta == 0.0 {
            warn!("label smoothing enabled with label_smooth_delta = 0; labels pass through unchanged");
        }

        // coarse-to-fine scale order; the anchor list is ordered
        // smallest first, so the coarsest grid takes the last triple
        let anchor_groups = [&anchors[6..9], &anchors[3..6], &anchors[0..3]];

        let scales = anchor_groups
            .iter()
            .enumerate()
            .map(|(scale_index, group)| {
                let to_raw = |(w, h): (R64, R64)| (w.raw(), h.raw());
                let anchors = [to_raw(group[0]), to_raw(group[1]), to_raw(group[2])];
                info!("scale {} anchors: {:?}", scale_index, anchors);

                let decoder = ScaleDecoder {
                    class_num: class_num as i64,
                    anchors,
                    image_height: image_height as i64,
                    image_width: image_width as i64,
                    clamp_box_size,
                };

                ScaleLossInit {
                    decoder,
                    use_giou_loss,
                    use_focal_loss,
                    use_label_smooth,
                    focal_alpha,
                    focal_gamma,
                    label_smooth_delta,
                }
                .build()
            })
            .collect();

        Ok(YoloHead {
            class_num: class_num as i64,
            scales,
            use_static_shape,
        })
    }
}

fn default_use_static_shape() -> bool {
    true
}

fn default_focal_alpha() -> f64 {
    1.0
}

fn default_focal_gamma() -> f64 {
    2.0
}

fn default_label_smooth_delta() -> f64 {
    0.01
}
