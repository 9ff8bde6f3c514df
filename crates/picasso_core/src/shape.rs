//! Model input shape metadata.

use std::fmt;

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Spatial shape a model expects for a single example.
///
/// Images follow the `(H, W, C)` convention; batches are `(N, H, W, C)`.
/// Fully convolutional models accept any spatial size and leave `height` and
/// `width` unset.
///
/// # Example
///
/// ```rust
/// use picasso_core::InputShape;
///
/// let shape = InputShape::new(28, 28, 1);
/// assert_eq!(shape.spatial(), Some((28, 28)));
/// assert!(InputShape::dynamic(3).spatial().is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    height: Option<usize>,
    width: Option<usize>,
    channels: usize,
}

impl InputShape {
    /// Create a fixed input shape.
    #[must_use]
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height: Some(height),
            width: Some(width),
            channels,
        }
    }

    /// Create a shape accepting any spatial size.
    #[must_use]
    pub const fn dynamic(channels: usize) -> Self {
        Self {
            height: None,
            width: None,
            channels,
        }
    }

    /// Fixed `(height, width)`, if any.
    #[must_use]
    pub fn spatial(&self) -> Option<(usize, usize)> {
        self.height.zip(self.width)
    }

    /// Number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Whether any declared dimension is zero.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.channels == 0 || self.height == Some(0) || self.width == Some(0)
    }

    /// Check that a `(N, H, W, C)` batch matches this shape.
    pub fn check_batch(&self, batch: &Array4<f32>) -> Result<()> {
        let (n, h, w, c) = batch.dim();
        if n == 0 {
            return Err(CoreError::InvalidInput("empty batch".to_string()));
        }
        self.check_example(h, w, c)
    }

    /// Check the dimensions of a single `(H, W, C)` example.
    pub fn check_example(&self, height: usize, width: usize, channels: usize) -> Result<()> {
        let height_ok = self.height.map_or(true, |h| h == height);
        let width_ok = self.width.map_or(true, |w| w == width);
        if height_ok && width_ok && channels == self.channels {
            Ok(())
        } else {
            Err(CoreError::InvalidShape {
                expected: self.to_string(),
                got: format!("({}, {}, {})", height, width, channels),
            })
        }
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dim = |d: Option<usize>| d.map_or_else(|| "?".to_string(), |v| v.to_string());
        write!(f, "({}, {}, {})", dim(self.height), dim(self.width), self.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_shape() {
        let shape = InputShape::new(28, 28, 1);
        assert_eq!(shape.spatial(), Some((28, 28)));
        assert_eq!(shape.channels(), 1);
        assert!(!shape.is_degenerate());
        assert_eq!(shape.to_string(), "(28, 28, 1)");
    }

    #[test]
    fn test_check_batch() {
        let shape = InputShape::new(4, 4, 3);
        assert!(shape.check_batch(&Array4::zeros((2, 4, 4, 3))).is_ok());
        assert!(shape.check_batch(&Array4::zeros((2, 4, 5, 3))).is_err());
        assert!(shape.check_batch(&Array4::zeros((0, 4, 4, 3))).is_err());
    }

    #[test]
    fn test_dynamic_shape_accepts_any_size() {
        let shape = InputShape::dynamic(3);
        assert!(shape.check_example(64, 96, 3).is_ok());
        assert!(shape.check_example(64, 96, 1).is_err());
        assert_eq!(shape.to_string(), "(?, ?, 3)");
    }

    #[test]
    fn test_degenerate_shape() {
        assert!(InputShape::new(0, 10, 3).is_degenerate());
        assert!(InputShape::dynamic(0).is_degenerate());
    }
}
