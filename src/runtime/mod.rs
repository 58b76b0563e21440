// src/runtime/mod.rs

//! Runtime builtin ABI.
//!
//! Lowered code calls into the companion runtime through a fixed set of
//! symbols. Every argument and result is a word, an `i32` kind code, a
//! pointer or an `i1`; there are no aggregates at this boundary.

use std::fmt;

use crate::ir::LoweredType;
use crate::target::TargetInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `(bytes: word) -> ptr<i8>`
    Alloc,
    /// `(kind: i32, value: term) -> i1`
    IsType,
    /// `(arity: word, value: term) -> i1`
    IsTuple,
    /// `(kind: i32, value: term) -> i1`
    IsBoxedType,
    /// `(lhs: term, rhs: term) -> i1`
    CmpEq,
    /// `(value: term) -> term`
    Print,
    /// `() -> term`
    TraceCapture,
    /// `(trace: term) -> term`
    TraceConstruct,
    /// `() -> void`
    Yield,
}

impl Builtin {
    pub const ALL: [Builtin; 9] = [
        Builtin::Alloc,
        Builtin::IsType,
        Builtin::IsTuple,
        Builtin::IsBoxedType,
        Builtin::CmpEq,
        Builtin::Print,
        Builtin::TraceCapture,
        Builtin::TraceConstruct,
        Builtin::Yield,
    ];

    pub const fn symbol(self) -> &'static str {
        match self {
            Builtin::Alloc => "__rt_alloc",
            Builtin::IsType => "__rt_is_type",
            Builtin::IsTuple => "__rt_is_tuple",
            Builtin::IsBoxedType => "__rt_is_boxed_type",
            Builtin::CmpEq => "__rt_cmpeq",
            Builtin::Print => "__rt_print",
            Builtin::TraceCapture => "__rt_trace_capture",
            Builtin::TraceConstruct => "__rt_trace_construct",
            Builtin::Yield => "__rt_yield",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.symbol() == symbol)
    }

    /// Parameter types and result type on `target`.
    pub fn signature(self, target: &TargetInfo) -> (Vec<LoweredType>, LoweredType) {
        let term = target.term_type().clone();
        let word = target.usize_type().clone();
        let i1 = target.i1_type().clone();
        let kind = LoweredType::Int(32);
        match self {
            Builtin::Alloc => (vec![word], LoweredType::Int(8).ptr_to()),
            Builtin::IsType | Builtin::IsBoxedType => (vec![kind, term], i1),
            Builtin::IsTuple => (vec![word, term], i1),
            Builtin::CmpEq => (vec![term.clone(), term], i1),
            Builtin::Print => (vec![term.clone()], term),
            Builtin::TraceCapture => (vec![], term),
            Builtin::TraceConstruct => (vec![term.clone()], term),
            Builtin::Yield => (vec![], LoweredType::Void),
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_round_trip() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_symbol(builtin.symbol()), Some(builtin));
        }
        assert_eq!(Builtin::from_symbol("__rt_nope"), None);
    }

    #[test]
    fn signatures_use_target_word() {
        let wasm = TargetInfo::wasm32();
        let (params, result) = Builtin::IsTuple.signature(&wasm);
        assert_eq!(params, vec![LoweredType::Int(32), LoweredType::Int(32)]);
        assert_eq!(result, LoweredType::Int(1));
        let (params, result) = Builtin::Yield.signature(&TargetInfo::x86_64());
        assert!(params.is_empty());
        assert_eq!(result, LoweredType::Void);
    }
}
