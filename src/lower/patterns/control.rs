// src/lower/patterns/control.rs

//! Control flow and calls.

use crate::core::LowerResult;
use crate::ir::{BinOp, EirOp, LowOp, LoweredType};
use crate::lower::Rewriter;

use super::{ConversionPattern, MatchedOp, Rewrite};

pub struct BranchLowering;

impl ConversionPattern for BranchLowering {
    fn name(&self) -> &'static str {
        "br"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::Branch = op.op else {
            return Ok(Rewrite::Declined);
        };
        rw.emit(LowOp::Br, Vec::new(), Vec::new(), op.successors.clone());
        Ok(Rewrite::Replaced(Vec::new()))
    }
}

/// Native `i1` conditions are used as is. A term condition has the truth
/// bit of the `true` atom extracted inline: mask the payload, shift it
/// down to bit 0 when the payload is shifted, truncate to `i1`.
pub struct CondBranchLowering;

impl ConversionPattern for CondBranchLowering {
    fn name(&self) -> &'static str {
        "cond_br"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::CondBranch = op.op else {
            return Ok(Rewrite::Declined);
        };
        if op.successors.len() != 2 {
            return Err(op.unsupported(format!("expected 2 successors, found {}", op.successors.len())));
        }
        let cond = op.operand(0)?;
        let cond_ty = rw.value_type(cond)?;
        let target = rw.target();

        let flag = if cond_ty == *target.i1_type() {
            cond
        } else if cond_ty == *target.term_type() {
            let imm = target.immediate_mask();
            let mask = rw.word(imm.mask);
            let masked = rw.binary(BinOp::And, cond, mask)?;
            let bit = if imm.requires_shift() {
                let shift = rw.word(u64::from(imm.shift));
                rw.binary(BinOp::LShr, masked, shift)?
            } else {
                masked
            };
            rw.emit_value(LowOp::Trunc, vec![bit], target.i1_type().clone())
        } else {
            return Err(op.unsupported(format!("condition of type {cond_ty}")));
        };

        rw.emit(LowOp::CondBr, vec![flag], Vec::new(), op.successors.clone());
        Ok(Rewrite::Replaced(Vec::new()))
    }
}

pub struct ReturnLowering;

impl ConversionPattern for ReturnLowering {
    fn name(&self) -> &'static str {
        "return"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::Return = op.op else {
            return Ok(Rewrite::Declined);
        };
        rw.emit_effect(LowOp::Return, op.operands.clone());
        Ok(Rewrite::Replaced(Vec::new()))
    }
}

pub struct UnreachableLowering;

impl ConversionPattern for UnreachableLowering {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::Unreachable = op.op else {
            return Ok(Rewrite::Declined);
        };
        rw.emit_effect(LowOp::Unreachable, Vec::new());
        Ok(Rewrite::Replaced(Vec::new()))
    }
}

/// Direct calls. Callees the module does not define are declared with the
/// lowered argument types of the first call site.
pub struct CallLowering;

impl ConversionPattern for CallLowering {
    fn name(&self) -> &'static str {
        "call"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::Call { callee } = op.op else {
            return Ok(Rewrite::Declined);
        };
        let result = match op.result_types {
            [] => LoweredType::Void,
            [ty] => rw.converter().convert_value_type(ty)?,
            _ => {
                return Err(op.unsupported(format!(
                    "calls with {} results are not supported",
                    op.result_types.len()
                )))
            }
        };

        let params = op
            .operands
            .iter()
            .map(|&v| rw.value_type(v))
            .collect::<LowerResult<Vec<_>>>()?;
        rw.get_or_insert_function(callee, params, result.clone());

        let results = rw.call(callee, op.operands.clone(), result);
        Ok(Rewrite::Replaced(results.into_iter().collect()))
    }
}
