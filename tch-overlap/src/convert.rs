use anyhow::{ensure, Result};
use tch::Tensor;

/// Converts boxes on the last axis from `(center_x, center_y, w, h)` to
/// `(x_min, y_min, x_max, y_max)`.
///
/// Accepts a tensor of any rank whose last axis has length 4.
pub fn cxcywh_to_xyxy(boxes: &Tensor) -> Result<Tensor> {
    ensure_box_axis(boxes)?;

    let center = boxes.narrow(-1, 0, 2);
    let half_size = boxes.narrow(-1, 2, 2) / 2.0;

    let mins = &center - &half_size;
    let maxs = &center + &half_size;
    Ok(Tensor::cat(&[mins, maxs], -1))
}

/// Converts boxes on the last axis from `(x_min, y_min, x_max, y_max)`
/// to `(center_x, center_y, w, h)`.
pub fn xyxy_to_cxcywh(boxes: &Tensor) -> Result<Tensor> {
    ensure_box_axis(boxes)?;

    let mins = boxes.narrow(-1, 0, 2);
    let maxs = boxes.narrow(-1, 2, 2);

    let size = &maxs - &mins;
    let center = mins + &size / 2.0;
    Ok(Tensor::cat(&[center, size], -1))
}

fn ensure_box_axis(boxes: &Tensor) -> Result<()> {
    let size = boxes.size();
    ensure!(
        size.last() == Some(&4),
        "expect a box tensor with a last axis of length 4, found {:?}",
        size
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn corner_conversion_matches_hand_computation() -> Result<()> {
        let boxes = Tensor::of_slice(&[24.0f32, 20.0, 16.0, 8.0]).view([1, 1, 4]);
        let corners = cxcywh_to_xyxy(&boxes)?;

        let values = Vec::<f32>::from(corners.view([4]));
        assert_abs_diff_eq!(values.as_slice(), [16.0f32, 16.0, 32.0, 24.0].as_slice());
        Ok(())
    }

    #[test]
    fn corner_conversion_inverts() -> Result<()> {
        let boxes = Tensor::of_slice(&[
            24.0f32, 20.0, 16.0, 8.0, //
            5.0, 7.5, 3.0, 1.0, //
        ])
        .view([2, 4]);

        let recovered = xyxy_to_cxcywh(&cxcywh_to_xyxy(&boxes)?)?;
        assert!(bool::from((&recovered - &boxes).abs().le(1e-6).all()));
        Ok(())
    }

    #[test]
    fn rejects_non_box_axis() {
        let boxes = Tensor::zeros(&[3, 5], tch::kind::FLOAT_CPU);
        assert!(cxcywh_to_xyxy(&boxes).is_err());
    }
}
