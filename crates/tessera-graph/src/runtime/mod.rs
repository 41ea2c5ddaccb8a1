//! Reference Runtime
//!
//! A straightforward interpreter for computation graphs. It exists so export
//! can be verified against eager execution and so quantized graphs can be
//! compared with their float originals.
//!
//! @version 0.1.0
//! @author Tessera Development Team

mod value;

pub mod operators;
pub mod quantized;
pub mod session;

pub use operators::{create_operator, Operator};
pub use quantized::dequantize_linear;
pub use session::Session;
pub use value::Value;
