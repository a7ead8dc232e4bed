//! qx-sql - SQL generation for qx
//!
//! This crate turns normalized XR trees into SQL: relational flattening,
//! post-processing of the relational model, boolean vendorization for
//! databases without a boolean type, the token model with deferred
//! placeholders, dialect-specific rendering and the compile entry point.

pub mod compile;
pub mod dialect;
pub mod flatten;
pub mod model;
pub mod post;
pub mod splice;
pub mod token;
pub mod tokenize;
pub mod vendorize;

pub use compile::{CompiledQuery, CompiledStatement, SqlCompiler};
pub use dialect::{dialect_for, SqlDialect};
pub use flatten::{flatten, Flattener};
pub use model::{FlattenSqlQuery, FromContext, SelectValue, SqlQuery};
pub use splice::SpliceMap;
pub use token::{BoundParam, ParamSet, ParamValue, Token};
pub use tokenize::{ActionTokens, Tokenizer};
