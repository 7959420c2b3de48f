use crate::common::*;

#[derive(Debug)]
pub struct BceWithLogitsLossInit {
    pub weight: Option<Tensor>,
    pub pos_weight: Option<Tensor>,
    pub reduction: Reduction,
}

impl BceWithLogitsLossInit {
    pub fn default(reduction: Reduction) -> Self {
        Self {
            weight: None,
            pos_weight: None,
            reduction,
        }
    }

    pub fn build(self) -> BceWithLogitsLoss {
        let Self {
            weight,
            pos_weight,
            reduction,
        } = self;

        BceWithLogitsLoss {
            weight,
            pos_weight,
            reduction,
        }
    }
}

/// Binary cross entropy on raw logits, any rank.
///
/// With `Reduction::None` the output keeps the input shape, which is
/// what the masked objectness and classification terms need.
#[derive(Debug)]
pub struct BceWithLogitsLoss {
    weight: Option<Tensor>,
    pos_weight: Option<Tensor>,
    reduction: Reduction,
}

impl BceWithLogitsLoss {
    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Tensor {
        debug_assert_eq!(
            input.size(),
            target.size(),
            "input and target tensors must have equal shape"
        );
        debug_assert!(
            bool::from(target.ge(0.0).logical_and(&target.le(1.0)).all()),
            "target values must be in range of [0.0, 1.0]"
        );

        // return zero tensor if (1) input is empty and (2) using mean reduction
        if input.numel() == 0 && self.reduction == Reduction::Mean {
            return Tensor::zeros(&[], (Kind::Float, input.device())).set_requires_grad(false);
        }

        input.binary_cross_entropy_with_logits(
            target,
            self.weight.as_ref(),
            self.pos_weight.as_ref(),
            self.reduction,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn elementwise_bce_matches_the_softplus_form() {
        let loss_fn = BceWithLogitsLossInit::default(Reduction::None).build();

        let logits = Tensor::of_slice(&[0.0f32, 2.0, -3.0]).view([1, 3]);
        let targets = Tensor::of_slice(&[1.0f32, 0.0, 1.0]).view([1, 3]);

        let loss = loss_fn.forward(&logits, &targets);
        assert_eq!(loss.size(), [1, 3]);

        // bce(x, t) = max(x, 0) - x * t + ln(1 + exp(-|x|))
        let expect = |x: f64, t: f64| x.max(0.0) - x * t + (1.0 + (-x.abs()).exp()).ln();
        let values = Vec::<f32>::from(loss.view([3]));
        assert_abs_diff_eq!(values[0] as f64, expect(0.0, 1.0), epsilon = 1e-6);
        assert_abs_diff_eq!(values[1] as f64, expect(2.0, 0.0), epsilon = 1e-6);
        assert_abs_diff_eq!(values[2] as f64, expect(-3.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn keeps_the_input_rank_with_no_reduction() {
        let loss_fn = BceWithLogitsLossInit::default(Reduction::None).build();

        let logits = Tensor::zeros(&[2, 4, 4, 3, 1], tch::kind::FLOAT_CPU);
        let targets = Tensor::zeros(&[2, 4, 4, 3, 1], tch::kind::FLOAT_CPU);

        let loss = loss_fn.forward(&logits, &targets);
        assert_eq!(loss.size(), [2, 4, 4, 3, 1]);
    }

    #[test]
    fn agrees_with_the_manual_formula_on_random_batches() {
        use rand::prelude::*;

        let mut rng = rand::thread_rng();
        let n_batch = rng.gen_range(1..8);
        let n_class = rng.gen_range(1..10);

        let loss_fn = BceWithLogitsLossInit::default(Reduction::None).build();

        let logits = Tensor::randn(&[n_batch, n_class], tch::kind::FLOAT_CPU) * 4.0;
        let targets = Tensor::rand(&[n_batch, n_class], tch::kind::FLOAT_CPU)
            .ge(0.5)
            .to_kind(Kind::Float);

        let loss = loss_fn.forward(&logits, &targets);

        let expect = |x: f64, t: f64| x.max(0.0) - x * t + (1.0 + (-x.abs()).exp()).ln();
        let logit_values = Vec::<f32>::from(logits.view([-1]));
        let target_values = Vec::<f32>::from(targets.view([-1]));
        let loss_values = Vec::<f32>::from(loss.view([-1]));

        for ((&x, &t), &l) in logit_values
            .iter()
            .zip(target_values.iter())
            .zip(loss_values.iter())
        {
            assert_abs_diff_eq!(l as f64, expect(x as f64, t as f64), epsilon = 1e-4);
        }
    }
}
