use std::marker::PhantomData;

use burn::module::{Module, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};

const NORM_EPSILON: f64 = 1e-6;

/// Rescales every gradient of `module` by one shared factor so that the L2
/// norm over all of them together is at most `max_norm`.
///
/// Returns the norm measured before scaling.
pub fn clip_grad_norm<B, M>(module: &M, grads: &mut GradientsParams, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let mut squared = SquaredNorm::<B> {
        grads,
        total: None,
        _backend: PhantomData,
    };
    module.visit(&mut squared);
    let total_norm = squared
        .total
        .map(|total| total.into_scalar().elem::<f64>().sqrt())
        .unwrap_or(0.0);

    let scale = max_norm / (total_norm + NORM_EPSILON);
    if scale < 1.0 {
        module.visit(&mut ScaleGrads::<B> {
            grads,
            scale,
            _backend: PhantomData,
        });
    }
    total_norm
}

struct SquaredNorm<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    total: Option<Tensor<B::InnerBackend, 1>>,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) else {
            return;
        };
        let squared = grad.powi_scalar(2).sum();
        self.total = Some(match self.total.take() {
            Some(total) => total + squared,
            None => squared,
        });
    }
}

struct ScaleGrads<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    scale: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for ScaleGrads<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.scale));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::module::Param;
    use burn::tensor::TensorData;
    use burn::tensor::backend::Backend;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray<f32>>;
    type Inner = NdArray<f32>;

    #[derive(Module, Debug)]
    struct TwoWeights<B: Backend> {
        a: Param<Tensor<B, 1>>,
        b: Param<Tensor<B, 1>>,
    }

    /// Builds a module whose gradients equal `grad_a` and `grad_b`.
    fn module_with_grads(
        grad_a: [f32; 2],
        grad_b: [f32; 2],
    ) -> (TwoWeights<TestBackend>, GradientsParams) {
        let device = Default::default();
        let module = TwoWeights {
            a: Param::from_tensor(Tensor::<TestBackend, 1>::zeros([2], &device)),
            b: Param::from_tensor(Tensor::<TestBackend, 1>::zeros([2], &device)),
        };
        let coeff_a = Tensor::<TestBackend, 1>::from_data(TensorData::from(grad_a), &device);
        let coeff_b = Tensor::<TestBackend, 1>::from_data(TensorData::from(grad_b), &device);
        let loss = (module.a.val() * coeff_a).sum() + (module.b.val() * coeff_b).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &module);
        (module, grads)
    }

    fn grad_values(grads: &GradientsParams, id: ParamId) -> Vec<f32> {
        grads
            .get::<Inner, 1>(id)
            .expect("gradient registered")
            .into_data()
            .convert::<f32>()
            .into_vec::<f32>()
            .expect("to vec")
    }

    #[test]
    fn scales_all_gradients_by_the_combined_norm() {
        let (module, mut grads) = module_with_grads([0.8, 0.0], [0.0, 0.8]);

        let norm = clip_grad_norm(&module, &mut grads, 1.0);
        assert!((norm - 0.8 * 2f64.sqrt()).abs() < 1e-5, "norm {norm}");

        let scale = 1.0 / (0.8 * 2f32.sqrt());
        assert!((scale - 0.884).abs() < 1e-3);
        let a = grad_values(&grads, module.a.id);
        let b = grad_values(&grads, module.b.id);
        assert!((a[0] - 0.8 * scale).abs() < 1e-4, "a = {a:?}");
        assert!(a[1].abs() < 1e-6);
        assert!(b[0].abs() < 1e-6);
        assert!((b[1] - 0.8 * scale).abs() < 1e-4, "b = {b:?}");
    }

    #[test]
    fn leaves_small_gradients_untouched() {
        let (module, mut grads) = module_with_grads([0.3, 0.4], [0.0, 0.0]);

        let norm = clip_grad_norm(&module, &mut grads, 1.0);
        assert!((norm - 0.5).abs() < 1e-5);
        assert_eq!(grad_values(&grads, module.a.id), vec![0.3, 0.4]);
    }
}
