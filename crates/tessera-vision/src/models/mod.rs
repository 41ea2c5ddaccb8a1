//! Vision Models
//!
//! Traceable vision encoders.
//!
//! # Available Models
//!
//! - **`VisionTower`**: CLIP-style ViT image encoder with a projection head
//!
//! @version 0.1.0
//! @author Tessera Development Team

pub mod clip;

pub use clip::{EncoderLayer, VisionTower, VisionTowerConfig, PRESETS};
