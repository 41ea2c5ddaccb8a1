//! Tessera Trace - Graph Export by Tracing
//!
//! Runs a model once over a sample input, recording every tensor operation
//! as a graph node while computing its value eagerly. The recorded graph is
//! generalized over the batch dimension, checked against the eager run and
//! written as a graph artifact.
//!
//! # Features
//! - `Tracer` and `TracedTensor` recording operations into a `GraphBuilder`
//! - `Module` trait with named parameters recorded once as initializers
//! - Traced layers: Linear, Conv2d, LayerNorm, MultiHeadAttention, Mlp
//! - `GraphExporter` with trace checking on a second batch size
//!
//! # Example
//! ```ignore
//! use tessera_trace::{ExportOptions, GraphExporter};
//!
//! let exporter = GraphExporter::new(ExportOptions::default());
//! let exported = exporter.export(&model, &sample)?;
//! println!("{}", exported.path.display());
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
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]

pub mod error;
pub mod export;
pub mod init;
pub mod layers;
pub mod module;
pub mod tracer;

pub use error::{TraceError, TraceResult};
pub use export::{ExportOptions, ExportedGraph, GraphExporter, TracedGraph};
pub use layers::{Conv2d, LayerNorm, Linear, Mlp, MultiHeadAttention};
pub use module::{Module, Parameter};
pub use tracer::{TracedTensor, Tracer};
