// This module defines TargetInfo, the immutable per-target description of the term
// encoding: pointer width, the box/list/literal tags, the list mask, the layout of
// immediates (tag bits, kind field, value field) and of heap header words, the Nil and None
// sentinels, whether floats are heap-packed, and the canonical lowered types for terms,
// words, floats, cons cells and binary descriptors. Every magic number used by the lowering
// patterns comes from here. TargetInfo is built from a preset (x86_64, wasm32), from a
// target triple, or through TargetInfoBuilder, which validates that the tag spaces are
// disjoint before handing out an instance.

//! Target encoding parameters.
//!
//! The default layout reserves the low three bits of every word:
//!
//! | low bits | meaning                               |
//! |----------|---------------------------------------|
//! | `000`    | header word (never a term)            |
//! | `001`    | boxed pointer                         |
//! | `011`    | boxed pointer into the literal pool   |
//! | `100`    | list (cons cell pointer)              |
//! | `111`    | immediate; kind in bits 3..7          |
//!
//! Immediate payloads start at bit 7, header arities at bit 8.

mod kind;

pub use kind::TermKind;

use crate::core::{LowerError, LowerResult};
use crate::ir::LoweredType;

/// A contiguous bit field within a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskInfo {
    pub shift: u32,
    pub mask: u64,
}

impl MaskInfo {
    pub fn requires_shift(&self) -> bool {
        self.shift != 0
    }

    /// Width of the field in bits.
    pub fn width(&self) -> u32 {
        self.mask.count_ones()
    }

    fn extract(&self, word: u64) -> u64 {
        (word & self.mask) >> self.shift
    }
}

/// Where the tag, kind and value of an immediate live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmediateLayout {
    pub tag: u64,
    pub tag_mask: u64,
    pub kind_shift: u32,
    pub kind_mask: u64,
    pub value: MaskInfo,
}

impl ImmediateLayout {
    /// Tag and kind in the low bits, payload shifted above them.
    pub fn low_tag(pointer_width: u32) -> Self {
        Self {
            tag: 0b111,
            tag_mask: 0b111,
            kind_shift: 3,
            kind_mask: 0xF,
            value: MaskInfo {
                shift: 7,
                mask: (!0u64 << 7) & word_mask(pointer_width),
            },
        }
    }

    /// Tag and kind in the high bits, payload unshifted in the low bits.
    /// Widths outside `8..=64` are clamped into that range.
    pub fn high_tag(pointer_width: u32) -> Self {
        let w = pointer_width.clamp(8, 64);
        Self {
            tag: 0b111 << (w - 3),
            tag_mask: 0b111 << (w - 3),
            kind_shift: w - 8,
            kind_mask: 0x1F,
            value: MaskInfo {
                shift: 0,
                mask: (1u64 << (w - 8)) - 1,
            },
        }
    }
}

/// Layout of the header word prefixing heap aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLayout {
    pub tag: u64,
    pub tag_mask: u64,
    pub kind_shift: u32,
    pub kind_mask: u64,
    pub arity: MaskInfo,
}

impl HeaderLayout {
    pub fn standard(pointer_width: u32) -> Self {
        Self {
            tag: 0,
            tag_mask: 0b111,
            kind_shift: 3,
            kind_mask: 0x1F,
            arity: MaskInfo {
                shift: 8,
                mask: (!0u64 << 8) & word_mask(pointer_width),
            },
        }
    }
}

/// Immutable per-target encoding parameters.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    triple: String,
    pointer_width: u32,
    packed_floats: bool,
    box_tag: u64,
    list_tag: u64,
    list_mask: u64,
    literal_tag: u64,
    immediate: ImmediateLayout,
    header: HeaderLayout,
    nil: u64,
    none: u64,
    word_ty: LoweredType,
    i1_ty: LoweredType,
    float_ty: LoweredType,
    boxed_float_ty: LoweredType,
    cons_ty: LoweredType,
    binary_ty: LoweredType,
}

impl TargetInfo {
    pub fn builder(pointer_width: u32) -> TargetInfoBuilder {
        TargetInfoBuilder::new(pointer_width)
    }

    /// 64-bit target with native machine floats.
    pub fn x86_64() -> Self {
        TargetInfoBuilder::new(64)
            .triple("x86_64-unknown-linux-gnu")
            .packed_floats(false)
            .assemble()
    }

    /// 32-bit target with heap-packed floats.
    pub fn wasm32() -> Self {
        TargetInfoBuilder::new(32)
            .triple("wasm32-unknown-unknown")
            .packed_floats(true)
            .assemble()
    }

    /// Derive the encoding from the architecture component of a triple.
    ///
    /// Only x86_64 keeps floats in native registers; every other
    /// architecture uses packed float descriptors.
    pub fn from_triple(triple: &str) -> LowerResult<Self> {
        let arch = triple.split('-').next().unwrap_or_default();
        let (width, packed) = match arch {
            "x86_64" => (64, false),
            "aarch64" | "arm64" | "riscv64" | "powerpc64" | "s390x" => (64, true),
            "wasm32" | "i386" | "i686" | "arm" | "armv7" | "thumbv7em" | "riscv32" => (32, true),
            _ => {
                return Err(LowerError::InvalidTarget {
                    reason: format!("unsupported architecture `{arch}` in `{triple}`"),
                })
            }
        };
        TargetInfoBuilder::new(width)
            .triple(triple)
            .packed_floats(packed)
            .build()
    }

    pub fn triple(&self) -> &str {
        &self.triple
    }

    pub fn pointer_size_in_bits(&self) -> u32 {
        self.pointer_width
    }

    pub fn pointer_size_in_bytes(&self) -> u64 {
        u64::from(self.pointer_width / 8)
    }

    /// Mask selecting every bit of a word on this target.
    pub fn word_mask(&self) -> u64 {
        word_mask(self.pointer_width)
    }

    /// Alignment of pooled literals: enough that the low tag bits of their
    /// address are zero, and never below the pointer size.
    pub fn pool_alignment(&self) -> u64 {
        let tags = self.box_tag | self.literal_tag | self.list_tag;
        let tag_bits = u64::BITS - tags.leading_zeros();
        (1u64 << tag_bits).max(self.pointer_size_in_bytes())
    }

    pub fn requires_packed_floats(&self) -> bool {
        self.packed_floats
    }

    pub fn box_tag(&self) -> u64 {
        self.box_tag
    }

    pub fn list_tag(&self) -> u64 {
        self.list_tag
    }

    pub fn list_mask(&self) -> u64 {
        self.list_mask
    }

    pub fn literal_tag(&self) -> u64 {
        self.literal_tag
    }

    /// Bits that identify a boxed pointer, literal flag excluded.
    pub fn box_mask(&self) -> u64 {
        self.list_mask & !self.literal_tag
    }

    /// The immediate payload field.
    pub fn immediate_mask(&self) -> MaskInfo {
        self.immediate.value
    }

    pub fn immediate_layout(&self) -> &ImmediateLayout {
        &self.immediate
    }

    pub fn header_mask(&self) -> MaskInfo {
        self.header.arity
    }

    pub fn header_layout(&self) -> &HeaderLayout {
        &self.header
    }

    /// Largest arity or byte length a header can carry.
    pub fn max_arity(&self) -> u64 {
        self.header.arity.mask >> self.header.arity.shift
    }

    pub fn nil_value(&self) -> u64 {
        self.nil
    }

    pub fn none_value(&self) -> u64 {
        self.none
    }

    pub fn encode_immediate(&self, kind: TermKind, value: u64) -> u64 {
        let imm = &self.immediate;
        let kind_bits = (u64::from(kind.code()) & imm.kind_mask) << imm.kind_shift;
        let value_bits = (value << imm.value.shift) & imm.value.mask;
        (imm.tag | kind_bits | value_bits) & self.word_mask()
    }

    /// Inverse of [`encode_immediate`](Self::encode_immediate). Fixnum
    /// payloads are sign-extended.
    pub fn decode_immediate(&self, word: u64) -> Option<(TermKind, u64)> {
        let imm = &self.immediate;
        if word & imm.tag_mask != imm.tag {
            return None;
        }
        let code = (word >> imm.kind_shift) & imm.kind_mask;
        let kind = TermKind::from_code(code as u32)?;
        let raw = imm.value.extract(word);
        let value = if kind == TermKind::Fixnum {
            sign_extend(raw, imm.value.width())
        } else {
            raw
        };
        Some((kind, value))
    }

    /// Whether `value` survives an encode/decode round trip for `kind`.
    pub fn is_representable(&self, kind: TermKind, value: i64) -> bool {
        let width = self.immediate.value.width();
        match kind {
            TermKind::Fixnum => {
                let min = -(1i128 << (width - 1));
                let max = (1i128 << (width - 1)) - 1;
                (min..=max).contains(&i128::from(value))
            }
            _ => value >= 0 && (width >= 64 || (value as u64) < (1u64 << width)),
        }
    }

    pub fn encode_header(&self, kind: TermKind, arity: u64) -> u64 {
        let h = &self.header;
        let kind_bits = (u64::from(kind.code()) & h.kind_mask) << h.kind_shift;
        let arity_bits = (arity << h.arity.shift) & h.arity.mask;
        (h.tag | kind_bits | arity_bits) & self.word_mask()
    }

    pub fn decode_header(&self, word: u64) -> Option<(TermKind, u64)> {
        let h = &self.header;
        if word & h.tag_mask != h.tag {
            return None;
        }
        let kind = TermKind::from_code(((word >> h.kind_shift) & h.kind_mask) as u32)?;
        Some((kind, h.arity.extract(word)))
    }

    pub fn term_type(&self) -> &LoweredType {
        &self.word_ty
    }

    pub fn usize_type(&self) -> &LoweredType {
        &self.word_ty
    }

    pub fn i1_type(&self) -> &LoweredType {
        &self.i1_ty
    }

    pub fn float_type(&self) -> &LoweredType {
        &self.float_ty
    }

    /// The `{header, f64}` descriptor a boxed float points at, on every target.
    pub fn boxed_float_type(&self) -> &LoweredType {
        &self.boxed_float_ty
    }

    pub fn cons_type(&self) -> &LoweredType {
        &self.cons_ty
    }

    pub fn binary_type(&self) -> &LoweredType {
        &self.binary_ty
    }

    /// Packed `{header, elements...}` aggregate.
    pub fn make_tuple_type(&self, elements: &[LoweredType]) -> LoweredType {
        let mut fields = Vec::with_capacity(elements.len() + 1);
        fields.push(self.word_ty.clone());
        fields.extend_from_slice(elements);
        LoweredType::Struct { name: None, fields }
    }
}

/// Builder for custom encodings; defaults to the low-tag layout.
#[derive(Debug, Clone)]
pub struct TargetInfoBuilder {
    triple: Option<String>,
    pointer_width: u32,
    packed_floats: bool,
    box_tag: u64,
    list_tag: u64,
    list_mask: u64,
    literal_tag: u64,
    immediate: ImmediateLayout,
    header: HeaderLayout,
}

impl TargetInfoBuilder {
    pub fn new(pointer_width: u32) -> Self {
        let width = layout_width(pointer_width);
        Self {
            triple: None,
            pointer_width,
            packed_floats: pointer_width != 64,
            box_tag: 0b001,
            list_tag: 0b100,
            list_mask: 0b111,
            literal_tag: 0b010,
            immediate: ImmediateLayout::low_tag(width),
            header: HeaderLayout::standard(width),
        }
    }

    pub fn triple(mut self, triple: &str) -> Self {
        self.triple = Some(triple.to_string());
        self
    }

    pub fn packed_floats(mut self, packed: bool) -> Self {
        self.packed_floats = packed;
        self
    }

    pub fn box_tag(mut self, tag: u64) -> Self {
        self.box_tag = tag;
        self
    }

    pub fn list_tag(mut self, tag: u64) -> Self {
        self.list_tag = tag;
        self
    }

    pub fn list_mask(mut self, mask: u64) -> Self {
        self.list_mask = mask;
        self
    }

    pub fn literal_tag(mut self, tag: u64) -> Self {
        self.literal_tag = tag;
        self
    }

    pub fn immediate_layout(mut self, layout: ImmediateLayout) -> Self {
        self.immediate = layout;
        self
    }

    /// Switch to [`ImmediateLayout::high_tag`] and widen the list mask so
    /// that immediates never pass the list test.
    pub fn high_tag_immediates(mut self) -> Self {
        let layout = ImmediateLayout::high_tag(layout_width(self.pointer_width));
        self.list_mask |= layout.tag_mask;
        self.immediate = layout;
        self
    }

    pub fn header_layout(mut self, layout: HeaderLayout) -> Self {
        self.header = layout;
        self
    }

    pub fn build(self) -> LowerResult<TargetInfo> {
        self.validate()?;
        Ok(self.assemble())
    }

    /// Build without validating; the presets are known-good layouts.
    fn assemble(self) -> TargetInfo {
        let w = self.pointer_width;
        let word_ty = LoweredType::Int(w);
        let boxed_float_ty = LoweredType::Struct {
            name: Some("float"),
            fields: vec![word_ty.clone(), LoweredType::F64],
        };
        let float_ty = if self.packed_floats {
            boxed_float_ty.clone()
        } else {
            LoweredType::F64
        };
        let cons_ty = LoweredType::Struct {
            name: Some("cons"),
            fields: vec![word_ty.clone(), word_ty.clone()],
        };
        let binary_ty = LoweredType::Struct {
            name: Some("binary"),
            fields: vec![word_ty.clone(), word_ty.clone(), LoweredType::Int(8).ptr_to()],
        };
        let mut info = TargetInfo {
            triple: self.triple.unwrap_or_else(|| format!("custom{w}")),
            pointer_width: w,
            packed_floats: self.packed_floats,
            box_tag: self.box_tag,
            list_tag: self.list_tag,
            list_mask: self.list_mask,
            literal_tag: self.literal_tag,
            immediate: self.immediate,
            header: self.header,
            nil: 0,
            none: 0,
            word_ty,
            i1_ty: LoweredType::Int(1),
            float_ty,
            boxed_float_ty,
            cons_ty,
            binary_ty,
        };
        info.nil = info.encode_immediate(TermKind::Nil, 0);
        info.none = info.encode_immediate(TermKind::None, 0);
        log::debug!(
            "target {}: box={:#x} list={:#x}/{:#x} literal={:#x} imm shift={}",
            info.triple,
            info.box_tag,
            info.list_tag,
            info.list_mask,
            info.literal_tag,
            info.immediate.value.shift
        );
        info
    }

    fn validate(&self) -> LowerResult<()> {
        let invalid = |reason: String| Err(LowerError::InvalidTarget { reason });
        if self.pointer_width != 32 && self.pointer_width != 64 {
            return invalid(format!("pointer width {} is not 32 or 64", self.pointer_width));
        }
        let word = word_mask(self.pointer_width);
        let imm = &self.immediate;
        let fields = [
            ("box tag", self.box_tag),
            ("list tag", self.list_tag),
            ("list mask", self.list_mask),
            ("literal tag", self.literal_tag),
            ("immediate tag", imm.tag_mask),
            ("immediate value", imm.value.mask),
            ("header arity", self.header.arity.mask),
        ];
        for (name, bits) in fields {
            if bits & !word != 0 {
                return invalid(format!("{name} {bits:#x} does not fit in {} bits", self.pointer_width));
            }
        }
        if self.list_tag & !self.list_mask != 0 {
            return invalid("list tag has bits outside the list mask".into());
        }
        if self.box_tag & self.literal_tag != 0 {
            return invalid("box tag and literal tag overlap".into());
        }
        for (name, word) in [
            ("boxed", self.box_tag),
            ("boxed literal", self.box_tag | self.literal_tag),
            ("immediate", imm.tag),
        ] {
            if word & self.list_mask == self.list_tag {
                return invalid(format!("{name} values would pass the list test"));
            }
        }
        if imm.tag & !imm.tag_mask != 0 {
            return invalid("immediate tag has bits outside its mask".into());
        }
        let kind_field = imm.kind_mask << imm.kind_shift;
        if imm.tag_mask & imm.value.mask != 0
            || kind_field & (imm.tag_mask | imm.value.mask) != 0
        {
            return invalid("immediate tag, kind and value fields overlap".into());
        }
        if (imm.value.mask >> imm.value.shift) & 1 != 1 {
            return invalid("immediate value field does not start at its shift".into());
        }
        // An immediate tag the list test cannot see lets payload bits alias the list tag.
        if imm.tag & self.list_mask == 0 && imm.value.mask & self.list_mask != 0 {
            return invalid("immediate payloads can collide with the list tag".into());
        }
        Ok(())
    }
}

/// Width the default layouts are computed for; `validate` rejects the rest.
fn layout_width(pointer_width: u32) -> u32 {
    if pointer_width == 32 {
        32
    } else {
        64
    }
}

pub(crate) fn word_mask(pointer_width: u32) -> u64 {
    if pointer_width >= 64 {
        !0
    } else {
        (1u64 << pointer_width) - 1
    }
}

fn sign_extend(raw: u64, width: u32) -> u64 {
    if width == 0 || width >= 64 {
        return raw;
    }
    let shift = 64 - width;
    (((raw << shift) as i64) >> shift) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> Vec<TargetInfo> {
        vec![
            TargetInfo::x86_64(),
            TargetInfo::wasm32(),
            TargetInfo::builder(64).high_tag_immediates().build().unwrap(),
            TargetInfo::builder(32).high_tag_immediates().build().unwrap(),
        ]
    }

    #[test]
    fn immediates_round_trip() {
        for target in targets() {
            for value in [0u64, 1, 2, 42, 1 << 20] {
                for kind in [TermKind::Atom, TermKind::Fixnum] {
                    let word = target.encode_immediate(kind, value);
                    assert_eq!(target.decode_immediate(word), Some((kind, value)), "{}", target.triple());
                }
            }
            let neg = target.encode_immediate(TermKind::Fixnum, (-7i64) as u64);
            assert_eq!(target.decode_immediate(neg), Some((TermKind::Fixnum, (-7i64) as u64)));
        }
    }

    #[test]
    fn headers_round_trip() {
        for target in targets() {
            for arity in [0u64, 1, 8, 1000] {
                let word = target.encode_header(TermKind::Tuple, arity);
                assert_eq!(target.decode_header(word), Some((TermKind::Tuple, arity)));
                assert_eq!(target.decode_immediate(word), None);
            }
        }
    }

    #[test]
    fn sentinels_are_distinct_immediates() {
        for target in targets() {
            assert_ne!(target.nil_value(), target.none_value());
            assert_eq!(target.decode_immediate(target.nil_value()), Some((TermKind::Nil, 0)));
            assert_eq!(target.decode_immediate(target.none_value()), Some((TermKind::None, 0)));
        }
    }

    #[test]
    fn presets_validate() {
        TargetInfoBuilder::new(64).packed_floats(false).validate().unwrap();
        TargetInfoBuilder::new(32).packed_floats(true).validate().unwrap();
    }

    #[test]
    fn presets_follow_architecture() {
        assert!(!TargetInfo::x86_64().requires_packed_floats());
        assert_eq!(TargetInfo::x86_64().float_type(), &LoweredType::F64);
        let wasm = TargetInfo::wasm32();
        assert!(wasm.requires_packed_floats());
        assert_eq!(wasm.pointer_size_in_bits(), 32);
        assert!(matches!(wasm.float_type(), LoweredType::Struct { name: Some("float"), .. }));
        assert!(TargetInfo::from_triple("aarch64-apple-darwin").unwrap().requires_packed_floats());
        assert!(matches!(
            TargetInfo::from_triple("sparc-sun-solaris"),
            Err(LowerError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn builder_rejects_overlapping_tags() {
        let err = TargetInfo::builder(64).box_tag(0b100).build().unwrap_err();
        assert!(matches!(err, LowerError::InvalidTarget { .. }));
        let err = TargetInfo::builder(64).literal_tag(0b001).build().unwrap_err();
        assert!(matches!(err, LowerError::InvalidTarget { .. }));
        assert!(TargetInfo::builder(48).build().is_err());
    }

    #[test]
    fn high_tag_on_odd_widths_is_an_error() {
        for width in [0, 4, 7, 100] {
            let err = TargetInfo::builder(width).high_tag_immediates().build().unwrap_err();
            assert!(matches!(err, LowerError::InvalidTarget { .. }), "width {width}");
        }
        let clamped = ImmediateLayout::high_tag(4);
        assert_eq!(clamped.kind_shift, 0);
    }

    #[test]
    fn header_arity_width() {
        assert_eq!(TargetInfo::wasm32().max_arity(), (1 << 24) - 1);
        assert_eq!(TargetInfo::x86_64().max_arity(), (1 << 56) - 1);
    }

    #[test]
    fn representable_range_tracks_payload_width() {
        let target = TargetInfo::wasm32();
        let width = target.immediate_mask().width();
        assert_eq!(width, 25);
        assert!(target.is_representable(TermKind::Fixnum, (1 << 24) - 1));
        assert!(!target.is_representable(TermKind::Fixnum, 1 << 24));
        assert!(target.is_representable(TermKind::Fixnum, -(1 << 24)));
        assert!(!target.is_representable(TermKind::Atom, -1));
    }
}
