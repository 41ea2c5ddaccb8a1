//! Commands - CLI Command Implementations
//!
//! This module contains the implementations for all CLI commands.
//!
//! @version 0.1.0
//! @author Tessera Development Team

pub mod compare;
pub mod export;
pub mod inspect;
pub mod pipeline;
pub mod quantize;

pub(crate) mod utils;
