//! qx-norm: normalization of XR query trees
//!
//! This crate provides the capture-avoiding substitution engine and the
//! rewrite pipeline that brings a query tree to the normal form expected by
//! relational flattening.

pub mod beta;
pub mod normalize;
pub mod pass;

pub use beta::{reduce_action, reduce_expr, reduce_query, substitute, FreshNames};
pub use normalize::Normalizer;
pub use pass::{NormalizePass, PassContext};
