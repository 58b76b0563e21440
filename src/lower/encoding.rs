// src/lower/encoding.rs

//! Tagging and untagging primitives.
//!
//! These emit straight-line bit manipulation only. Untagging never checks
//! the tag: callers strip a tag after a type test has proven it, so hot
//! paths pay for one test and no redundant checks.

use crate::core::{LowerError, LowerResult};
use crate::ir::{BinOp, LowOp, LoweredType, ValueId};

use super::Rewriter;

/// Tag a cons cell pointer as a list term.
pub fn make_list(rw: &mut Rewriter<'_, '_>, cons_ptr: ValueId) -> LowerResult<ValueId> {
    let tag = rw.target().list_tag();
    tag_pointer(rw, cons_ptr, tag)
}

/// Tag a heap pointer as a boxed term. A zero box tag leaves the bits alone.
pub fn make_box(rw: &mut Rewriter<'_, '_>, ptr: ValueId) -> LowerResult<ValueId> {
    let tag = rw.target().box_tag();
    tag_pointer(rw, ptr, tag)
}

/// Tag a pointer into the literal pool.
pub fn make_literal_box(rw: &mut Rewriter<'_, '_>, ptr: ValueId) -> LowerResult<ValueId> {
    let target = rw.target();
    tag_pointer(rw, ptr, target.box_tag() | target.literal_tag())
}

pub fn tag_pointer(rw: &mut Rewriter<'_, '_>, ptr: ValueId, tag: u64) -> LowerResult<ValueId> {
    if !rw.value_type(ptr)?.is_pointer() {
        return Err(LowerError::MalformedIr {
            reason: format!("tagging non-pointer value {ptr}"),
        });
    }
    let word_ty = rw.target().usize_type().clone();
    let raw = rw.emit_value(LowOp::PtrToInt, vec![ptr], word_ty);
    if tag == 0 {
        return Ok(raw);
    }
    let tag = rw.word(tag);
    rw.binary(BinOp::Or, raw, tag)
}

/// Strip the box and literal tags and reinterpret as a pointer to `inner`.
pub fn unbox(rw: &mut Rewriter<'_, '_>, inner: &LoweredType, term: ValueId) -> LowerResult<ValueId> {
    let target = rw.target();
    untag(rw, inner, term, target.box_tag() | target.literal_tag())
}

/// Strip the list tag and reinterpret as a pointer to `inner`.
pub fn unbox_list(rw: &mut Rewriter<'_, '_>, inner: &LoweredType, term: ValueId) -> LowerResult<ValueId> {
    let mask = rw.target().list_mask();
    untag(rw, inner, term, mask)
}

fn untag(rw: &mut Rewriter<'_, '_>, inner: &LoweredType, term: ValueId, bits: u64) -> LowerResult<ValueId> {
    let keep = rw.word(!bits);
    let raw = rw.binary(BinOp::And, term, keep)?;
    Ok(rw.emit_value(LowOp::IntToPtr, vec![raw], inner.ptr_to()))
}
