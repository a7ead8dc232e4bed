//! qx-core - Core library for qx
//!
//! This crate provides the XR query tree and its type lattice, the traversal
//! utilities shared by every compiler phase, the error taxonomy, compiler
//! configuration and the diagnostic trace side channel.

pub mod config;
pub mod error;
pub mod trace;
pub mod xr;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use config::{CompilerConfig, DialectKind, ParamStyle, TraceConfig};
pub use error::{CompileError, CompileResult, ConfigError, ConfigResult};
pub use trace::{TraceType, Tracer};
pub use xr::{Action, Expr, Ident, ProductType, Query, XrType};
