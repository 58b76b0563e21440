// This module defines the conversion pattern contract and the pattern table. A pattern is
// bound to one abstract operation kind; given the matched operation (with operands and
// successor arguments already mapped to lowered values) and a Rewriter, it either replaces
// the operation completely, returning the values that stand in for its results, or declines.
// Internal-consistency failures are returned as errors and abort the module. The table is
// built by an exhaustive match over EirOpKind, so a new abstract operation does not compile
// until it has at least one pattern; each kind holds a priority-ordered list of candidates.

//! Conversion patterns for the abstract dialect.

mod constants;
mod control;
mod terms;

use hashbrown::HashMap;

use crate::core::{LowerError, LowerResult};
use crate::ir::{EirOp, EirOpKind, Location, Successor, ValueId, ValueType};

use super::Rewriter;

pub use constants::{
    BigIntLowering, BinaryLowering, ImmediateLowering, ListLiteralLowering, NativeFloatLowering,
    PackedFloatLowering, TupleLiteralLowering,
};
pub use control::{
    BranchLowering, CallLowering, CondBranchLowering, ReturnLowering, UnreachableLowering,
};
pub use terms::{
    CastLowering, CmpEqLowering, ConsLowering, GepLowering, IsTypeLowering, LoadLowering,
    PrintLowering, TraceCaptureLowering, TraceConstructLowering, TupleLowering, YieldLowering,
};

/// Outcome of one pattern application.
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    /// The operation is fully replaced; one value per original result.
    Replaced(Vec<ValueId>),
    /// Not applicable; the driver tries the next candidate.
    Declined,
}

/// An abstract operation presented to a pattern.
#[derive(Debug, Clone)]
pub struct MatchedOp<'o> {
    pub op: &'o EirOp,
    /// Lowered replacements of the original operands.
    pub operands: Vec<ValueId>,
    /// Successors with lowered block arguments.
    pub successors: Vec<Successor>,
    /// Original (usually abstract) result types.
    pub result_types: &'o [ValueType],
    pub loc: Location,
}

impl MatchedOp<'_> {
    pub fn name(&self) -> &'static str {
        self.op.kind().name()
    }

    pub fn operand(&self, index: usize) -> LowerResult<ValueId> {
        self.operands.get(index).copied().ok_or_else(|| LowerError::MalformedIr {
            reason: format!("`{}` at {} is missing operand {index}", self.name(), self.loc),
        })
    }

    pub fn result_type(&self, index: usize) -> LowerResult<&ValueType> {
        self.result_types.get(index).ok_or_else(|| LowerError::MalformedIr {
            reason: format!("`{}` at {} is missing result {index}", self.name(), self.loc),
        })
    }

    pub(crate) fn unsupported(&self, reason: impl Into<String>) -> LowerError {
        LowerError::Unsupported {
            op: self.name(),
            reason: reason.into(),
            loc: self.loc,
        }
    }
}

/// Rewrite rule for one abstract operation kind.
pub trait ConversionPattern: Send + Sync {
    /// Short name used in logs and statistics.
    fn name(&self) -> &'static str;

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite>;
}

/// Priority-ordered candidates per operation kind.
pub struct PatternSet {
    table: HashMap<EirOpKind, Vec<Box<dyn ConversionPattern>>>,
}

impl PatternSet {
    /// The full lowering pattern set.
    pub fn standard() -> Self {
        let table = EirOpKind::ALL
            .into_iter()
            .map(|kind| (kind, standard_patterns(kind)))
            .collect();
        Self { table }
    }

    /// A set with no patterns at all.
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn candidates(&self, kind: EirOpKind) -> &[Box<dyn ConversionPattern>] {
        self.table.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Try `pattern` before the existing candidates for `kind`.
    pub fn prepend(&mut self, kind: EirOpKind, pattern: Box<dyn ConversionPattern>) {
        self.table.entry(kind).or_default().insert(0, pattern);
    }

    /// Try `pattern` after the existing candidates for `kind`.
    pub fn push(&mut self, kind: EirOpKind, pattern: Box<dyn ConversionPattern>) {
        self.table.entry(kind).or_default().push(pattern);
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_patterns(kind: EirOpKind) -> Vec<Box<dyn ConversionPattern>> {
    match kind {
        EirOpKind::Branch => vec![Box::new(BranchLowering)],
        EirOpKind::CondBranch => vec![Box::new(CondBranchLowering)],
        EirOpKind::Call => vec![Box::new(CallLowering)],
        EirOpKind::Return => vec![Box::new(ReturnLowering)],
        EirOpKind::Unreachable => vec![Box::new(UnreachableLowering)],
        EirOpKind::Load => vec![Box::new(LoadLowering)],
        EirOpKind::GetElementPtr => vec![Box::new(GepLowering)],
        EirOpKind::IsType => vec![Box::new(IsTypeLowering)],
        EirOpKind::Cast => vec![Box::new(CastLowering)],
        EirOpKind::CmpEq => vec![Box::new(CmpEqLowering)],
        EirOpKind::Tuple => vec![Box::new(TupleLowering)],
        EirOpKind::Cons => vec![Box::new(ConsLowering)],
        EirOpKind::ConstInt
        | EirOpKind::ConstAtom
        | EirOpKind::ConstBool
        | EirOpKind::ConstNil
        | EirOpKind::ConstNone => vec![Box::new(ImmediateLowering)],
        EirOpKind::ConstBigInt => vec![Box::new(BigIntLowering)],
        EirOpKind::ConstFloat => vec![Box::new(NativeFloatLowering), Box::new(PackedFloatLowering)],
        EirOpKind::ConstBinary => vec![Box::new(BinaryLowering)],
        EirOpKind::ConstTuple => vec![Box::new(TupleLiteralLowering)],
        EirOpKind::ConstList => vec![Box::new(ListLiteralLowering)],
        EirOpKind::Yield => vec![Box::new(YieldLowering)],
        EirOpKind::TraceCapture => vec![Box::new(TraceCaptureLowering)],
        EirOpKind::TraceConstruct => vec![Box::new(TraceConstructLowering)],
        EirOpKind::Print => vec![Box::new(PrintLowering)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_candidate() {
        let set = PatternSet::standard();
        for kind in EirOpKind::ALL {
            assert!(!set.candidates(kind).is_empty(), "{}", kind.name());
        }
    }

    #[test]
    fn float_candidates_try_native_first() {
        let set = PatternSet::standard();
        let names: Vec<_> = set
            .candidates(EirOpKind::ConstFloat)
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(names, ["float.native", "float.packed"]);
    }

    #[test]
    fn empty_set_has_no_candidates() {
        let set = PatternSet::empty();
        assert!(set.candidates(EirOpKind::Branch).is_empty());
    }
}
