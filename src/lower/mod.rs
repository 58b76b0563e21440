// src/lower/mod.rs

//! Lowering of the abstract term dialect.
//!
//! - [`TypeConverter`] maps abstract types to lowered ones.
//! - [`encoding`] emits the tag/untag bit manipulation.
//! - [`patterns`] holds one rewrite rule per abstract operation kind.
//! - [`ConversionDriver`] applies the rules to a whole module.

pub mod driver;
pub mod encoding;
pub mod patterns;
pub mod rewriter;
pub mod type_converter;

pub use driver::ConversionDriver;
pub use patterns::{ConversionPattern, MatchedOp, PatternSet, Rewrite};
pub use rewriter::Rewriter;
pub use type_converter::TypeConverter;
