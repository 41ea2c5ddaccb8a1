//! Traced Layers
//!
//! Building blocks for transformer-style vision encoders.
//!
//! @version 0.1.0
//! @author Tessera Development Team

pub mod attention;
pub mod conv;
pub mod linear;
pub mod mlp;
pub mod norm;

// Re-exports
pub use attention::MultiHeadAttention;
pub use conv::Conv2d;
pub use linear::Linear;
pub use mlp::{Activation, Mlp};
pub use norm::LayerNorm;
