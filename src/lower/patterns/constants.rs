// This module lowers literal operations. Immediates (integers, atoms, booleans, nil, none)
// become a single encoded word. Floats are native constants or a by-value packed descriptor
// depending on the target. Binaries, tuple literals and long list literals are laid out as
// read-only globals in the module's literal pool and referenced through a tagged address;
// nested literals are pooled recursively, so every pooled aggregate holds only words and
// tagged addresses. Short lists stay unboxed cons cell values.

//! Literal lowering.

use crate::core::{LowerError, LowerResult};
use crate::ir::{Constant, ConstInit, EirOp, GlobalId, LowOp, LoweredType, ValueId};
use crate::lower::{encoding, Rewriter};
use crate::target::{TargetInfo, TermKind};

use super::{ConversionPattern, MatchedOp, Rewrite};

/// Encoded word for an immediate literal, or `None` for other shapes.
fn immediate_word(
    op: &MatchedOp<'_>,
    target: &TargetInfo,
    constant: &Constant,
) -> LowerResult<Option<u64>> {
    let word = match constant {
        Constant::Int(value) => {
            if !target.is_representable(TermKind::Fixnum, *value) {
                return Err(op.unsupported(format!("{value} does not fit in a fixnum")));
            }
            target.encode_immediate(TermKind::Fixnum, *value as u64)
        }
        Constant::Atom(id) => {
            if !target.is_representable(TermKind::Atom, *id as i64) {
                return Err(op.unsupported(format!("atom id {id} does not fit in an immediate")));
            }
            target.encode_immediate(TermKind::Atom, *id)
        }
        // `false` and `true` are the atoms 0 and 1.
        Constant::Bool(value) => target.encode_immediate(TermKind::Atom, u64::from(*value)),
        Constant::Nil => target.nil_value(),
        Constant::None => target.none_value(),
        _ => return Ok(None),
    };
    Ok(Some(word))
}

/// Pool-level form of a literal: an encoded word or a tagged address.
fn literal_init(op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>, constant: &Constant) -> LowerResult<ConstInit> {
    let target = rw.target();
    if let Some(word) = immediate_word(op, target, constant)? {
        return Ok(ConstInit::Word(word));
    }
    let boxed = target.box_tag() | target.literal_tag();
    let init = match constant {
        Constant::Float(value) => {
            let ty = target.boxed_float_type().clone();
            let header = target.encode_header(TermKind::Float, 2);
            let global = rw.intern_global(
                ty,
                ConstInit::Aggregate(vec![ConstInit::Word(header), ConstInit::Float(*value)]),
            );
            ConstInit::Address { global, tag: boxed }
        }
        Constant::Binary {
            bytes,
            header,
            flags,
        } => ConstInit::Address {
            global: binary_global(op, rw, bytes, *header, *flags)?,
            tag: boxed,
        },
        Constant::Tuple(elements) => ConstInit::Address {
            global: tuple_global(op, rw, elements)?,
            tag: boxed,
        },
        Constant::List(elements) => proper_list(op, rw, elements)?,
        Constant::BigInt(_) => return Err(bigint_unsupported(op)),
        _ => {
            return Err(LowerError::MalformedIr {
                reason: format!("literal `{constant}` has no pool form"),
            })
        }
    };
    Ok(init)
}

fn bigint_unsupported(op: &MatchedOp<'_>) -> LowerError {
    op.unsupported("arbitrary-precision integer literals are not implemented")
}

/// Bytes plus a `{header, flags, data}` descriptor pointing at them.
fn binary_global(
    op: &MatchedOp<'_>,
    rw: &mut Rewriter<'_, '_>,
    bytes: &[u8],
    header: Option<u64>,
    flags: Option<u64>,
) -> LowerResult<GlobalId> {
    let target = rw.target();
    let len = bytes.len() as u64;
    if len > target.max_arity() {
        return Err(op.unsupported(format!(
            "binary of {len} bytes exceeds the header limit of {}",
            target.max_arity()
        )));
    }
    let data = rw.intern_global(
        LoweredType::Array(Box::new(LoweredType::Int(8)), len),
        ConstInit::Bytes(bytes.to_vec()),
    );
    let header = header.unwrap_or_else(|| target.encode_header(TermKind::Binary, len));
    let flags = flags.unwrap_or_else(|| u64::from(std::str::from_utf8(bytes).is_ok()));
    Ok(rw.intern_global(
        target.binary_type().clone(),
        ConstInit::Aggregate(vec![
            ConstInit::Word(header),
            ConstInit::Word(flags),
            ConstInit::Address { global: data, tag: 0 },
        ]),
    ))
}

fn tuple_global(op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>, elements: &[Constant]) -> LowerResult<GlobalId> {
    let target = rw.target();
    if elements.len() as u64 > target.max_arity() {
        return Err(op.unsupported(format!("tuple of {} elements is too wide", elements.len())));
    }
    let mut fields = Vec::with_capacity(elements.len() + 1);
    fields.push(ConstInit::Word(target.encode_header(TermKind::Tuple, elements.len() as u64)));
    for element in elements {
        fields.push(literal_init(op, rw, element)?);
    }
    let words = vec![target.term_type().clone(); elements.len()];
    let ty = target.make_tuple_type(&words);
    Ok(rw.intern_global(ty, ConstInit::Aggregate(fields)))
}

/// Pool cells for `elements`, built tail to head; Nil ends the list.
/// Each tail field holds the list-tagged address of the cell after it.
fn proper_list(op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>, elements: &[Constant]) -> LowerResult<ConstInit> {
    let target = rw.target();
    let mut tail = ConstInit::Word(target.nil_value());
    for element in elements.iter().rev() {
        let head = literal_init(op, rw, element)?;
        let cell = rw.intern_global(
            target.cons_type().clone(),
            ConstInit::Aggregate(vec![head, tail]),
        );
        tail = ConstInit::Address {
            global: cell,
            tag: target.list_tag(),
        };
    }
    Ok(tail)
}

/// Emit the word a pool-level initialiser stands for.
fn materialize(rw: &mut Rewriter<'_, '_>, init: &ConstInit) -> LowerResult<ValueId> {
    match init {
        ConstInit::Word(word) => Ok(rw.word(*word)),
        ConstInit::Address { global, tag } => {
            let ptr = rw.address_of(*global);
            encoding::tag_pointer(rw, ptr, *tag)
        }
        other => Err(LowerError::MalformedIr {
            reason: format!("initialiser `{other}` is not a word"),
        }),
    }
}

fn constant_of<'o>(op: &MatchedOp<'o>) -> Option<&'o Constant> {
    match op.op {
        EirOp::Constant(constant) => Some(constant),
        _ => None,
    }
}

/// Integer, atom, boolean, nil and none literals.
pub struct ImmediateLowering;

impl ConversionPattern for ImmediateLowering {
    fn name(&self) -> &'static str {
        "immediate"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let Some(constant) = constant_of(op) else {
            return Ok(Rewrite::Declined);
        };
        match immediate_word(op, rw.target(), constant)? {
            Some(word) => Ok(Rewrite::Replaced(vec![rw.word(word)])),
            None => Ok(Rewrite::Declined),
        }
    }
}

pub struct BigIntLowering;

impl ConversionPattern for BigIntLowering {
    fn name(&self) -> &'static str {
        "bigint"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, _rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        match constant_of(op) {
            Some(Constant::BigInt(_)) => Err(bigint_unsupported(op)),
            _ => Ok(Rewrite::Declined),
        }
    }
}

/// Float literal on targets with machine floats.
pub struct NativeFloatLowering;

impl ConversionPattern for NativeFloatLowering {
    fn name(&self) -> &'static str {
        "float.native"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let Some(Constant::Float(value)) = constant_of(op) else {
            return Ok(Rewrite::Declined);
        };
        if rw.target().requires_packed_floats() {
            return Ok(Rewrite::Declined);
        }
        let x = rw.emit_value(LowOp::FConstant { value: *value }, Vec::new(), LoweredType::F64);
        Ok(Rewrite::Replaced(vec![x]))
    }
}

/// Float literal as a by-value `{header, f64}` descriptor. Storing and
/// boxing it is up to the consumer.
pub struct PackedFloatLowering;

impl ConversionPattern for PackedFloatLowering {
    fn name(&self) -> &'static str {
        "float.packed"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let Some(Constant::Float(value)) = constant_of(op) else {
            return Ok(Rewrite::Declined);
        };
        let target = rw.target();
        if !target.requires_packed_floats() {
            return Ok(Rewrite::Declined);
        }
        let header = rw.word(target.encode_header(TermKind::Float, 2));
        let bits = rw.emit_value(LowOp::FConstant { value: *value }, Vec::new(), LoweredType::F64);
        let packed = rw.aggregate(target.float_type().clone(), &[header, bits])?;
        Ok(Rewrite::Replaced(vec![packed]))
    }
}

pub struct BinaryLowering;

impl ConversionPattern for BinaryLowering {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let Some(constant @ Constant::Binary { .. }) = constant_of(op) else {
            return Ok(Rewrite::Declined);
        };
        let init = literal_init(op, rw, constant)?;
        Ok(Rewrite::Replaced(vec![materialize(rw, &init)?]))
    }
}

pub struct TupleLiteralLowering;

impl ConversionPattern for TupleLiteralLowering {
    fn name(&self) -> &'static str {
        "const_tuple"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let Some(constant @ Constant::Tuple(_)) = constant_of(op) else {
            return Ok(Rewrite::Declined);
        };
        let init = literal_init(op, rw, constant)?;
        Ok(Rewrite::Replaced(vec![materialize(rw, &init)?]))
    }
}

/// `[]` is Nil and one or two elements form an unboxed cons value. Longer
/// lists are pooled cells and the result is the list-tagged head.
pub struct ListLiteralLowering;

impl ConversionPattern for ListLiteralLowering {
    fn name(&self) -> &'static str {
        "const_list"
    }

    fn match_and_rewrite(&self, op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        let Some(Constant::List(elements)) = constant_of(op) else {
            return Ok(Rewrite::Declined);
        };
        let target = rw.target();
        let result = match elements.as_slice() {
            [] => rw.word(target.nil_value()),
            [head] => {
                let init = literal_init(op, rw, head)?;
                let head = materialize(rw, &init)?;
                let nil = rw.word(target.nil_value());
                rw.aggregate(target.cons_type().clone(), &[head, nil])?
            }
            [head, tail] => {
                let head_init = literal_init(op, rw, head)?;
                let tail_init = literal_init(op, rw, tail)?;
                let head = materialize(rw, &head_init)?;
                let tail = materialize(rw, &tail_init)?;
                rw.aggregate(target.cons_type().clone(), &[head, tail])?
            }
            _ => {
                let init = proper_list(op, rw, elements)?;
                materialize(rw, &init)?
            }
        };
        Ok(Rewrite::Replaced(vec![result]))
    }
}
