//! Serialised access to a network.
//!
//! A [`Session`] owns the autodiff network used for gradients and the
//! autodiff-free copy used for prediction. Both live behind one lock, so
//! predictions and gradient evaluations never interleave.

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use parking_lot::Mutex;

struct SessionState<N, I> {
    graph: N,
    inference: Option<I>,
}

/// A network shared between prediction and gradient evaluation.
pub struct Session<B: AutodiffBackend, N: AutodiffModule<B>> {
    device: B::Device,
    state: Mutex<SessionState<N, N::InnerModule>>,
}

impl<B: AutodiffBackend, N: AutodiffModule<B>> Session<B, N> {
    /// Wrap a restored network.
    pub fn new(network: N, device: B::Device) -> Self {
        Self {
            device,
            state: Mutex::new(SessionState {
                graph: network,
                inference: None,
            }),
        }
    }

    /// Device the network lives on.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Whether the inference copy has been created.
    pub fn has_inference(&self) -> bool {
        self.state.lock().inference.is_some()
    }

    /// Run `f` against the inference network, creating it on first use.
    pub fn infer<R>(&self, f: impl FnOnce(&N::InnerModule, &B::Device) -> R) -> R {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let inner = state.inference.get_or_insert_with(|| {
            tracing::debug!("Creating inference network");
            state.graph.valid()
        });
        f(inner, &self.device)
    }

    /// Run `f` against the autodiff network.
    pub fn with_graph<R>(&self, f: impl FnOnce(&N, &B::Device) -> R) -> R {
        let state = self.state.lock();
        f(&state.graph, &self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::FcnNetConfig;
    use burn::prelude::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_inference_is_created_lazily() {
        let device = Default::default();
        let network = FcnNetConfig::new(3, 2).with_filters(vec![2]).init::<TestBackend>(&device);
        let session = Session::<TestBackend, _>::new(network, device);

        assert!(!session.has_inference());
        let dims = session.infer(|net, device| net.forward(Tensor::zeros([1, 3, 4, 4], device)).dims());
        assert_eq!(dims, [1, 2, 4, 4]);
        assert!(session.has_inference());
    }

    #[test]
    fn test_graph_access() {
        let device = Default::default();
        let network = FcnNetConfig::new(1, 2).with_filters(vec![]).init::<TestBackend>(&device);
        let session = Session::<TestBackend, _>::new(network, device);
        let params = session.with_graph(|net, _| net.num_params());
        assert!(params > 0);
        assert!(!session.has_inference());
    }
}
