//! CLIP Image Preprocessing
//!
//! Produces the fixed-shape model input from a decoded image: resize so the
//! shortest edge matches `shortest_edge` (bicubic), center crop to
//! `crop_size`, rescale to `[0, 1]`, then normalize with the CLIP channel
//! statistics. The result is `[1, 3, crop_size, crop_size]`.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::fmt;
use std::str::FromStr;

use half::f16;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tessera_tensor::Tensor;
use tracing::debug;

use crate::error::{VisionError, VisionResult};
use crate::transforms::{image_to_tensor, CenterCrop, Compose, ImageNormalize, Rescale, Transform};

// =============================================================================
// Precision
// =============================================================================

/// Numeric precision of the produced tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Single precision.
    #[default]
    F32,
    /// Values rounded through half precision.
    F16,
}

impl Precision {
    /// Applies the precision to a tensor.
    pub fn apply(self, tensor: Tensor<f32>) -> Tensor<f32> {
        match self {
            Precision::F32 => tensor,
            Precision::F16 => tensor.map(|v| f16::from_f32(v).to_f32()),
        }
    }

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Precision::F32 => "f32",
            Precision::F16 => "f16",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Precision {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "f32" | "float" | "float32" => Ok(Precision::F32),
            "f16" | "half" | "float16" => Ok(Precision::F16),
            other => Err(VisionError::InvalidConfig(format!(
                "unknown precision '{other}' (expected f32 or f16)"
            ))),
        }
    }
}

// =============================================================================
// ClipPreprocessor
// =============================================================================

/// Image preprocessing matching CLIP's image processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipPreprocessor {
    /// Target length of the shorter image edge after resizing.
    pub shortest_edge: u32,
    /// Side of the square center crop.
    pub crop_size: u32,
    /// Factor mapping pixel values into `[0, 1]`.
    pub rescale_factor: f32,
    /// Per-channel mean.
    pub image_mean: [f32; 3],
    /// Per-channel standard deviation.
    pub image_std: [f32; 3],
    /// Output precision.
    pub precision: Precision,
}

impl Default for ClipPreprocessor {
    fn default() -> Self {
        Self {
            shortest_edge: 224,
            crop_size: 224,
            rescale_factor: 1.0 / 255.0,
            image_mean: [0.481_454_66, 0.457_827_5, 0.408_210_73],
            image_std: [0.268_629_54, 0.261_302_58, 0.275_777_11],
            precision: Precision::F32,
        }
    }
}

impl ClipPreprocessor {
    /// Sets the output precision.
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Sets resize and crop to the same square size.
    pub fn with_size(mut self, size: u32) -> Self {
        self.shortest_edge = size;
        self.crop_size = size;
        self
    }

    /// Rejects settings that cannot produce a crop.
    pub fn validate(&self) -> VisionResult<()> {
        if self.crop_size == 0 || self.shortest_edge == 0 {
            return Err(VisionError::InvalidConfig("image sizes must be non-zero".to_string()));
        }
        if self.crop_size > self.shortest_edge {
            return Err(VisionError::InvalidConfig(format!(
                "crop size {} exceeds the resized shortest edge {}",
                self.crop_size, self.shortest_edge
            )));
        }
        Ok(())
    }

    /// Output shape for a single image.
    pub fn output_shape(&self) -> [usize; 4] {
        let s = self.crop_size as usize;
        [1, 3, s, s]
    }

    /// Size of the image after shortest-edge resizing; the long edge is
    /// scaled proportionally and truncated.
    pub fn resized_dims(&self, width: u32, height: u32) -> (u32, u32) {
        let target = self.shortest_edge;
        if width <= height {
            let h = (u64::from(target) * u64::from(height) / u64::from(width.max(1))) as u32;
            (target, h.max(target))
        } else {
            let w = (u64::from(target) * u64::from(width) / u64::from(height.max(1))) as u32;
            (w.max(target), target)
        }
    }

    /// Preprocesses one image into `[1, 3, crop, crop]`.
    pub fn preprocess(&self, image: &RgbImage) -> VisionResult<Tensor<f32>> {
        self.validate()?;
        if image.width() == 0 || image.height() == 0 {
            return Err(VisionError::InvalidConfig("image has no pixels".to_string()));
        }

        let (w, h) = self.resized_dims(image.width(), image.height());
        let resized = imageops::resize(image, w, h, FilterType::CatmullRom);
        let crop = CenterCrop::square(self.crop_size as usize);
        let (top, left) = crop.offsets(h as usize, w as usize)?;
        let cropped = imageops::crop_imm(
            &resized,
            left as u32,
            top as u32,
            self.crop_size,
            self.crop_size,
        )
        .to_image();

        let pixels = image_to_tensor(&cropped)?;
        let normalized = self.tensor_pipeline()?.apply(&pixels)?;
        let tensor = self.precision.apply(normalized.unsqueeze(0)?);
        debug!(
            original = ?(image.width(), image.height()),
            resized = ?(w, h),
            shape = ?tensor.shape(),
            precision = %self.precision,
            "Preprocessed image"
        );
        Ok(tensor)
    }

    /// Preprocesses several images into `[N, 3, crop, crop]`.
    pub fn preprocess_batch(&self, images: &[RgbImage]) -> VisionResult<Tensor<f32>> {
        if images.is_empty() {
            return Err(VisionError::InvalidConfig("empty image batch".to_string()));
        }
        let tensors = images
            .iter()
            .map(|img| self.preprocess(img))
            .collect::<VisionResult<Vec<_>>>()?;
        let refs: Vec<&Tensor<f32>> = tensors.iter().collect();
        Ok(Tensor::concat(&refs, 0)?)
    }

    fn tensor_pipeline(&self) -> VisionResult<Compose> {
        let normalize = ImageNormalize::new(self.image_mean.to_vec(), self.image_std.to_vec())?;
        Ok(Compose::empty().add(Rescale::new(self.rescale_factor)).add(normalize))
    }
}

// =============================================================================
// Tests
// =============================================================================
