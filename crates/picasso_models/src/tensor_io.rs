//! Moving data between `ndarray` arrays and burn tensors.

use burn::prelude::*;
use ndarray::{Array2, Array4};

use crate::error::{ModelError, Result};

/// Build a tensor with the same `(N, H, W, C)` layout as `array`.
pub fn array4_to_tensor<B: Backend>(array: &Array4<f32>, device: &B::Device) -> Tensor<B, 4> {
    let (n, h, w, c) = array.dim();
    let values: Vec<f32> = array.iter().copied().collect();
    let data = TensorData::new(values, [n, h, w, c]).convert::<B::FloatElem>();
    Tensor::from_data(data, device)
}

fn values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ModelError::Inference(format!("{:?}", e)))
}

/// Copy a 2-D tensor into an array.
pub fn tensor_to_array2<B: Backend>(tensor: Tensor<B, 2>) -> Result<Array2<f32>> {
    let [rows, cols] = tensor.dims();
    Array2::from_shape_vec((rows, cols), values(tensor)?)
        .map_err(|e| ModelError::Inference(e.to_string()))
}

/// Copy a 4-D tensor into an array.
pub fn tensor_to_array4<B: Backend>(tensor: Tensor<B, 4>) -> Result<Array4<f32>> {
    let [a, b, c, d] = tensor.dims();
    Array4::from_shape_vec((a, b, c, d), values(tensor)?)
        .map_err(|e| ModelError::Inference(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    #[test]
    fn test_layout_is_preserved() {
        let device = Default::default();
        let array = Array4::from_shape_fn((1, 2, 3, 2), |(_, h, w, c)| (h * 100 + w * 10 + c) as f32);

        let tensor = array4_to_tensor::<NdArray>(&array, &device);
        assert_eq!(tensor.dims(), [1, 2, 3, 2]);

        let back = tensor_to_array4(tensor).unwrap();
        assert_eq!(back, array);
        assert_eq!(back[[0, 1, 2, 1]], 121.0);
    }
}
