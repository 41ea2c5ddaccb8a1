//! Image Transforms
//!
//! Tensor-level transforms over `[C, H, W]` and `[N, C, H, W]` images.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use image::RgbImage;
use tessera_tensor::Tensor;

use crate::error::{VisionError, VisionResult};

// =============================================================================
// Transform Trait
// =============================================================================

/// A preprocessing step applied to an image tensor.
pub trait Transform: Send + Sync {
    /// Applies the transform.
    fn apply(&self, input: &Tensor<f32>) -> VisionResult<Tensor<f32>>;
}

/// Applies transforms in order.
#[derive(Default)]
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    /// Creates an empty pipeline.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Appends a transform.
    pub fn add<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Number of transforms.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Returns true if no transforms were added.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl Transform for Compose {
    fn apply(&self, input: &Tensor<f32>) -> VisionResult<Tensor<f32>> {
        let mut current = input.clone();
        for t in &self.transforms {
            current = t.apply(&current)?;
        }
        Ok(current)
    }
}

/// Converts 8-bit RGB pixels to a `[3, H, W]` tensor of raw values in `0..=255`.
pub fn image_to_tensor(image: &RgbImage) -> VisionResult<Tensor<f32>> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut data = vec![0.0f32; 3 * h * w];
    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            data[c * h * w + y * w + x] = f32::from(pixel.0[c]);
        }
    }
    Ok(Tensor::from_vec(data, &[3, h, w])?)
}

/// Splits a `[C, H, W]` or `[N, C, H, W]` shape into `(N, C, H, W)`.
fn image_dims(shape: &[usize]) -> VisionResult<(usize, usize, usize, usize)> {
    match *shape {
        [c, h, w] => Ok((1, c, h, w)),
        [n, c, h, w] => Ok((n, c, h, w)),
        _ => Err(VisionError::InvalidConfig(format!(
            "expected a [C, H, W] or [N, C, H, W] image, got {shape:?}"
        ))),
    }
}

// =============================================================================
// Rescale
// =============================================================================

/// Multiplies every value by a constant factor.
#[derive(Debug, Clone, Copy)]
pub struct Rescale {
    factor: f32,
}

impl Rescale {
    /// Creates a rescale by `factor`.
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }

    /// Maps 8-bit pixel values into `[0, 1]`.
    pub fn unit() -> Self {
        Self::new(1.0 / 255.0)
    }
}

impl Transform for Rescale {
    fn apply(&self, input: &Tensor<f32>) -> VisionResult<Tensor<f32>> {
        Ok(input.mul_scalar(self.factor))
    }
}

// =============================================================================
// Normalize
// =============================================================================

/// Normalizes each channel with its own mean and standard deviation.
#[derive(Debug, Clone)]
pub struct ImageNormalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl ImageNormalize {
    /// Creates a per-channel normalization.
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> VisionResult<Self> {
        if mean.len() != std.len() {
            return Err(VisionError::InvalidConfig(format!(
                "{} means but {} standard deviations",
                mean.len(),
                std.len()
            )));
        }
        if std.iter().any(|s| *s <= 0.0 || !s.is_finite()) {
            return Err(VisionError::InvalidConfig(format!(
                "standard deviations must be positive, got {std:?}"
            )));
        }
        Ok(Self { mean, std })
    }

    /// Statistics CLIP models were trained with.
    pub fn clip() -> Self {
        Self {
            mean: vec![0.481_454_66, 0.457_827_5, 0.408_210_73],
            std: vec![0.268_629_54, 0.261_302_58, 0.275_777_11],
        }
    }

    /// ImageNet statistics.
    pub fn imagenet() -> Self {
        Self {
            mean: vec![0.485, 0.456, 0.406],
            std: vec![0.229, 0.224, 0.225],
        }
    }
}

impl Transform for ImageNormalize {
    fn apply(&self, input: &Tensor<f32>) -> VisionResult<Tensor<f32>> {
        let (n, c, h, w) = image_dims(input.shape())?;
        if c != self.mean.len() {
            return Err(VisionError::InvalidConfig(format!(
                "normalization has {} channels, image has {c}",
                self.mean.len()
            )));
        }
        let plane = h * w;
        let mut data = input.to_vec();
        for (i, v) in data.iter_mut().enumerate() {
            let ch = (i / plane) % c;
            *v = (*v - self.mean[ch]) / self.std[ch];
        }
        debug_assert_eq!(data.len(), n * c * plane);
        Ok(Tensor::from_vec(data, input.shape())?)
    }
}

// =============================================================================
// CenterCrop
// =============================================================================

/// Crops the central region of an image tensor.
#[derive(Debug, Clone, Copy)]
pub struct CenterCrop {
    height: usize,
    width: usize,
}

impl CenterCrop {
    /// Creates a crop of `height` x `width`.
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Creates a square crop.
    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    /// Top-left corner of the crop inside an `h` x `w` image.
    pub fn offsets(&self, h: usize, w: usize) -> VisionResult<(usize, usize)> {
        if self.height > h || self.width > w {
            return Err(VisionError::InvalidConfig(format!(
                "crop {}x{} is larger than the {h}x{w} image",
                self.height, self.width
            )));
        }
        Ok(((h - self.height) / 2, (w - self.width) / 2))
    }
}

impl Transform for CenterCrop {
    fn apply(&self, input: &Tensor<f32>) -> VisionResult<Tensor<f32>> {
        let (n, c, h, w) = image_dims(input.shape())?;
        let (top, left) = self.offsets(h, w)?;
        let src = input.as_slice();

        let mut data = Vec::with_capacity(n * c * self.height * self.width);
        for plane in 0..n * c {
            let base = plane * h * w;
            for y in top..top + self.height {
                let row = base + y * w + left;
                data.extend_from_slice(&src[row..row + self.width]);
            }
        }

        let mut shape = input.shape().to_vec();
        let rank = shape.len();
        shape[rank - 2] = self.height;
        shape[rank - 1] = self.width;
        Ok(Tensor::from_vec(data, &shape)?)
    }
}

// =============================================================================
// Tests
// =============================================================================
