//! Tessera Vision - Image Input and Vision Towers
//!
//! Everything needed to turn a picture into the sample tensor an exporter
//! traces with, plus the model being exported:
//!
//! - **Sources**: local files and http(s) URLs decoded to RGB
//! - **Preprocessing**: CLIP resize / center crop / rescale / normalize
//! - **Transforms**: tensor-level image transforms used by preprocessing
//! - **Models**: a CLIP-style vision tower built from traceable layers
//!
//! # Example
//!
//! ```ignore
//! use tessera_vision::prelude::*;
//!
//! let image = load_image(&ImageSource::parse("dog.jpg"))?;
//! let sample = ClipPreprocessor::default().preprocess(&image)?;
//! let tower = VisionTower::new(VisionTowerConfig::tiny())?;
//! ```
//!
//! @version 0.1.0
//! @author Tessera Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::similar_names)]

pub mod error;
pub mod models;
pub mod preprocess;
pub mod source;
pub mod transforms;

pub use error::{VisionError, VisionResult};
pub use models::{VisionTower, VisionTowerConfig};
pub use preprocess::{ClipPreprocessor, Precision};
pub use source::{load_image, synthetic_image, ImageSource, DEFAULT_SAMPLE_URL};
pub use transforms::{image_to_tensor, CenterCrop, Compose, ImageNormalize, Rescale, Transform};

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for vision work.
pub mod prelude {
    pub use crate::error::{VisionError, VisionResult};
    pub use crate::models::{VisionTower, VisionTowerConfig};
    pub use crate::preprocess::{ClipPreprocessor, Precision};
    pub use crate::source::{load_image, ImageSource};
    pub use crate::transforms::{Compose, Transform};
}
