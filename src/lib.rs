// src/lib.rs

//! termlower - term encoding and lowering for a dynamically-typed language.
//!
//! Earlier compiler stages produce an abstract dialect in which every value
//! is an opaque term. This crate fixes a tagged-pointer/immediate encoding
//! for terms on a given target and rewrites every abstract operation into a
//! word-level instruction set plus calls to a small runtime ABI.
//!
//! # Primary Usage
//!
//! ```ignore
//! use termlower::ir::parser::parse_module;
//! use termlower::lower::ConversionDriver;
//! use termlower::target::TargetInfo;
//!
//! let target = TargetInfo::x86_64();
//! let module = parse_module("m", source)?;
//! let lowered = ConversionDriver::new(&target).run(module)?;
//! println!("{lowered}");
//! ```
//!
//! # Architecture
//!
//! - [`target`] - encoding parameters (tags, masks, header layout)
//! - [`ir`] - both dialects, the literal pool, parser and printer
//! - [`lower`] - type converter, encoding primitives, patterns, driver
//! - [`runtime`] - builtin symbols and signatures
//! - [`interp`] - reference evaluator for lowered code
//! - [`core`] - errors and the arena-backed session

pub mod core;
pub mod interp;
pub mod ir;
pub mod lower;
pub mod runtime;
pub mod target;

pub use core::{LowerError, LowerResult, LoweringSession, SessionStats};
pub use ir::{Module, ValueType};
pub use lower::{ConversionDriver, TypeConverter};
pub use target::{TargetInfo, TermKind};
