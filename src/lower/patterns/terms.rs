// src/lower/patterns/terms.rs

//! Term operations: memory access, type tests, casts, construction and the
//! operations that only exist as runtime calls.

use crate::core::LowerResult;
use crate::ir::{AbstractType, BinOp, EirOp, LowOp, LoweredType, ValueId};
use crate::lower::{encoding, Rewriter, TypeConverter};
use crate::runtime::Builtin;
use crate::target::TermKind;

use super::{ConversionPattern, MatchedOp, Rewrite};

pub struct LoadLowering;

impl ConversionPattern for LoadLowering {
    fn name(&self) -> &'static str {
        "load"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::Load = op.op else {
            return Ok(Rewrite::Declined);
        };
        let ptr = op.operand(0)?;
        let ptr_ty = rw.value_type(ptr)?;
        let ty = match ptr_ty.pointee() {
            Some(pointee) => pointee.clone(),
            None => return Err(op.unsupported(format!("load through {ptr_ty}"))),
        };
        Ok(Rewrite::Replaced(vec![rw.emit_value(LowOp::Load, vec![ptr], ty)]))
    }
}

/// Field address; the index counts lowered fields, header included.
pub struct GepLowering;

impl ConversionPattern for GepLowering {
    fn name(&self) -> &'static str {
        "gep"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::GetElementPtr { index } = op.op else {
            return Ok(Rewrite::Declined);
        };
        let base = op.operand(0)?;
        let base_ty = rw.value_type(base)?;
        let field = base_ty.pointee().and_then(|p| p.field(*index as usize));
        let Some(field) = field else {
            return Err(op.unsupported(format!("no field {index} behind {base_ty}")));
        };
        let ptr = rw.emit_value(
            LowOp::Gep {
                indices: vec![0, *index],
            },
            vec![base],
            field.ptr_to(),
        );
        Ok(Rewrite::Replaced(vec![ptr]))
    }
}

/// Type tests. Boxed lists are a fixed bit pattern and tested inline;
/// every other test goes through a runtime builtin.
pub struct IsTypeLowering;

impl ConversionPattern for IsTypeLowering {
    fn name(&self) -> &'static str {
        "is_type"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::IsType { match_type } = op.op else {
            return Ok(Rewrite::Declined);
        };
        let value = op.operand(0)?;
        let target = rw.target();

        let result = match match_type {
            AbstractType::Box(inner) if **inner == AbstractType::Cons => {
                let mask = rw.word(target.list_mask());
                let masked = rw.binary(BinOp::And, value, mask)?;
                let tag = rw.word(target.list_tag());
                rw.emit_value(LowOp::ICmpEq, vec![masked, tag], target.i1_type().clone())
            }
            AbstractType::Box(inner) => match inner.static_arity() {
                Some(arity) => {
                    let arity = rw.word(arity as u64);
                    rw.builtin_value(Builtin::IsTuple, vec![arity, value])?
                }
                None => {
                    let kind = kind_code(rw, inner.kind());
                    rw.builtin_value(Builtin::IsBoxedType, vec![kind, value])?
                }
            },
            other => {
                let kind = kind_code(rw, other.kind());
                rw.builtin_value(Builtin::IsType, vec![kind, value])?
            }
        };
        Ok(Rewrite::Replaced(vec![result]))
    }
}

fn kind_code(rw: &mut Rewriter<'_, '_>, kind: TermKind) -> ValueId {
    rw.int_const(u64::from(kind.code()), LoweredType::Int(32))
}

/// Term to pointer casts. Anything other than an identity or an unbox
/// declines.
pub struct CastLowering;

impl ConversionPattern for CastLowering {
    fn name(&self) -> &'static str {
        "cast"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::Cast = op.op else {
            return Ok(Rewrite::Declined);
        };
        let value = op.operand(0)?;
        let dst_ty = op.result_type(0)?;
        let src = rw.value_type(value)?;
        let dst = rw.converter().convert_value_type(dst_ty)?;

        if src == dst {
            return Ok(Rewrite::Replaced(vec![value]));
        }
        let Some(pointee) = dst.pointee() else {
            return Ok(Rewrite::Declined);
        };
        if src != *rw.target().term_type() {
            return Ok(Rewrite::Declined);
        }

        let is_cons = dst_ty
            .as_abstract()
            .is_some_and(TypeConverter::denotes_cons);
        let ptr = if is_cons {
            encoding::unbox_list(rw, pointee, value)?
        } else {
            encoding::unbox(rw, pointee, value)?
        };
        Ok(Rewrite::Replaced(vec![ptr]))
    }
}

pub struct CmpEqLowering;

impl ConversionPattern for CmpEqLowering {
    fn name(&self) -> &'static str {
        "cmpeq"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::CmpEq = op.op else {
            return Ok(Rewrite::Declined);
        };
        let lhs = op.operand(0)?;
        let rhs = op.operand(1)?;
        let eq = rw.builtin_value(Builtin::CmpEq, vec![lhs, rhs])?;
        Ok(Rewrite::Replaced(vec![eq]))
    }
}

/// Runtime aggregates hold terms only.
fn require_terms(op: &MatchedOp<'_>, rw: &Rewriter<'_, '_>) -> LowerResult<()> {
    for &value in &op.operands {
        let ty = rw.value_type(value)?;
        if ty != *rw.target().term_type() {
            return Err(op.unsupported(format!("element {value} of type {ty} is not a term")));
        }
    }
    Ok(())
}

/// Heap-allocate `ty`, store `fields` into it and return the typed pointer.
fn allocate(rw: &mut Rewriter<'_, '_>, ty: LoweredType, fields: &[ValueId]) -> LowerResult<ValueId> {
    let target = rw.target();
    let words = fields.len() as u64;
    let size = rw.word(target.pointer_size_in_bytes() * words);
    let raw = rw.builtin_value(Builtin::Alloc, vec![size])?;
    let ptr = rw.emit_value(LowOp::Bitcast, vec![raw], ty.ptr_to());
    let value = rw.aggregate(ty, fields)?;
    rw.emit_effect(LowOp::Store, vec![value, ptr]);
    Ok(ptr)
}

/// Runtime tuple: `{header, elements...}` on the heap, boxed.
pub struct TupleLowering;

impl ConversionPattern for TupleLowering {
    fn name(&self) -> &'static str {
        "tuple"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::Tuple = op.op else {
            return Ok(Rewrite::Declined);
        };
        require_terms(op, rw)?;
        let target = rw.target();
        if op.operands.len() as u64 > target.max_arity() {
            return Err(op.unsupported(format!("tuple of {} elements is too wide", op.operands.len())));
        }
        let element_types = op
            .operands
            .iter()
            .map(|&v| rw.value_type(v))
            .collect::<LowerResult<Vec<_>>>()?;
        let ty = target.make_tuple_type(&element_types);

        let header = rw.word(target.encode_header(TermKind::Tuple, op.operands.len() as u64));
        let mut fields = Vec::with_capacity(op.operands.len() + 1);
        fields.push(header);
        fields.extend_from_slice(&op.operands);

        let ptr = allocate(rw, ty, &fields)?;
        Ok(Rewrite::Replaced(vec![encoding::make_box(rw, ptr)?]))
    }
}

/// Runtime cons cell, tagged as a list.
pub struct ConsLowering;

impl ConversionPattern for ConsLowering {
    fn name(&self) -> &'static str {
        "cons"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::Cons = op.op else {
            return Ok(Rewrite::Declined);
        };
        let head = op.operand(0)?;
        let tail = op.operand(1)?;
        require_terms(op, rw)?;
        let ty = rw.target().cons_type().clone();
        let ptr = allocate(rw, ty, &[head, tail])?;
        Ok(Rewrite::Replaced(vec![encoding::make_list(rw, ptr)?]))
    }
}

pub struct YieldLowering;

impl ConversionPattern for YieldLowering {
    fn name(&self) -> &'static str {
        "yield"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::Yield = op.op else {
            return Ok(Rewrite::Declined);
        };
        rw.call_builtin(Builtin::Yield, Vec::new());
        Ok(Rewrite::Replaced(Vec::new()))
    }
}

pub struct TraceCaptureLowering;

impl ConversionPattern for TraceCaptureLowering {
    fn name(&self) -> &'static str {
        "trace_capture"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::TraceCapture = op.op else {
            return Ok(Rewrite::Declined);
        };
        let trace = rw.builtin_value(Builtin::TraceCapture, Vec::new())?;
        Ok(Rewrite::Replaced(vec![trace]))
    }
}

pub struct TraceConstructLowering;

impl ConversionPattern for TraceConstructLowering {
    fn name(&self) -> &'static str {
        "trace_construct"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::TraceConstruct = op.op else {
            return Ok(Rewrite::Declined);
        };
        let trace = op.operand(0)?;
        let term = rw.builtin_value(Builtin::TraceConstruct, vec![trace])?;
        Ok(Rewrite::Replaced(vec![term]))
    }
}

/// One print call per operand; a print of nothing is erased.
pub struct PrintLowering;

impl ConversionPattern for PrintLowering {
    fn name(&self) -> &'static str {
        "print"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let EirOp::Print = op.op else {
            return Ok(Rewrite::Declined);
        };
        for &value in &op.operands {
            rw.builtin_value(Builtin::Print, vec![value])?;
        }
        Ok(Rewrite::Replaced(Vec::new()))
    }
}
