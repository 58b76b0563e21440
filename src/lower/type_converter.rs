// src/lower/type_converter.rs

//! Abstract-to-lowered type mapping.

use crate::core::{LowerError, LowerResult};
use crate::ir::{AbstractType, LoweredType, ValueType};
use crate::target::TargetInfo;

/// Maps abstract term types onto the target's concrete representation.
#[derive(Debug, Clone, Copy)]
pub struct TypeConverter<'t> {
    target: &'t TargetInfo,
}

impl<'t> TypeConverter<'t> {
    pub fn new(target: &'t TargetInfo) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &'t TargetInfo {
        self.target
    }

    /// Lowered types pass through unchanged.
    pub fn convert_value_type(&self, ty: &ValueType) -> LowerResult<LoweredType> {
        match ty {
            ValueType::Lowered(ty) => Ok(ty.clone()),
            ValueType::Abstract(ty) => self.convert_type(ty),
        }
    }

    pub fn convert_type(&self, ty: &AbstractType) -> LowerResult<LoweredType> {
        let target = self.target;
        let lowered = match ty {
            // A boxed float addresses its heap descriptor, not a bare f64.
            AbstractType::Ref(inner) | AbstractType::Box(inner) if **inner == AbstractType::Float => {
                target.boxed_float_type().ptr_to()
            }
            AbstractType::Ref(inner) | AbstractType::Box(inner) => {
                self.convert_type(inner)?.ptr_to()
            }
            // Checked before the immediates: native and packed floats differ.
            AbstractType::Float => target.float_type().clone(),
            ty if ty.is_immediate() || ty.is_opaque() => target.term_type().clone(),
            AbstractType::List => target.term_type().clone(),
            AbstractType::Cons => target.cons_type().clone(),
            AbstractType::Tuple(Some(elements)) => {
                let fields = elements
                    .iter()
                    .map(|e| self.convert_type(e))
                    .collect::<LowerResult<Vec<_>>>()?;
                target.make_tuple_type(&fields)
            }
            AbstractType::Tuple(None) => target.term_type().clone(),
            AbstractType::Binary => target.binary_type().clone(),
            // Map, Closure and BigInt have no lowering.
            _ => return Err(LowerError::UnsupportedType { ty: ty.to_string() }),
        };
        Ok(lowered)
    }

    /// Whether `ty` denotes a cons cell behind a box or reference.
    pub fn denotes_cons(ty: &AbstractType) -> bool {
        matches!(ty, AbstractType::Box(inner) | AbstractType::Ref(inner) if **inner == AbstractType::Cons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_and_immediates_are_words() {
        let target = TargetInfo::x86_64();
        let conv = TypeConverter::new(&target);
        for ty in [
            AbstractType::Term,
            AbstractType::Atom,
            AbstractType::Fixnum,
            AbstractType::Nil,
            AbstractType::List,
            AbstractType::dynamic_tuple(),
        ] {
            assert_eq!(conv.convert_type(&ty).unwrap(), LoweredType::Int(64), "{ty}");
        }
    }

    #[test]
    fn boxes_and_refs_become_pointers() {
        let target = TargetInfo::wasm32();
        let conv = TypeConverter::new(&target);
        let boxed = AbstractType::boxed(AbstractType::Cons);
        assert_eq!(conv.convert_type(&boxed).unwrap(), target.cons_type().ptr_to());
        let r = AbstractType::reference(AbstractType::Term);
        assert_eq!(conv.convert_type(&r).unwrap(), LoweredType::Int(32).ptr_to());
    }

    #[test]
    fn static_tuples_prefix_a_header() {
        let target = TargetInfo::x86_64();
        let conv = TypeConverter::new(&target);
        let ty = AbstractType::tuple(vec![AbstractType::Atom, AbstractType::Cons]);
        let expected = LoweredType::Struct {
            name: None,
            fields: vec![LoweredType::Int(64), LoweredType::Int(64), target.cons_type().clone()],
        };
        assert_eq!(conv.convert_type(&ty).unwrap(), expected);
    }

    #[test]
    fn floats_follow_the_target() {
        let native = TargetInfo::x86_64();
        assert_eq!(TypeConverter::new(&native).convert_type(&AbstractType::Float).unwrap(), LoweredType::F64);
        let packed = TargetInfo::wasm32();
        assert_eq!(
            TypeConverter::new(&packed).convert_type(&AbstractType::Float).unwrap(),
            packed.float_type().clone()
        );
    }

    #[test]
    fn boxed_floats_point_at_the_descriptor() {
        for target in [TargetInfo::x86_64(), TargetInfo::wasm32()] {
            let conv = TypeConverter::new(&target);
            let expected = target.boxed_float_type().ptr_to();
            assert_eq!(conv.convert_type(&AbstractType::boxed(AbstractType::Float)).unwrap(), expected);
            assert_eq!(conv.convert_type(&AbstractType::reference(AbstractType::Float)).unwrap(), expected);
            match target.boxed_float_type() {
                LoweredType::Struct { fields, .. } => {
                    assert_eq!(fields, &vec![target.usize_type().clone(), LoweredType::F64]);
                }
                other => panic!("unexpected descriptor {other}"),
            }
        }
    }

    #[test]
    fn closed_vocabulary_rejects_the_rest() {
        let target = TargetInfo::x86_64();
        let conv = TypeConverter::new(&target);
        let err = conv.convert_type(&AbstractType::boxed(AbstractType::Map)).unwrap_err();
        assert_eq!(err, LowerError::UnsupportedType { ty: "map".into() });
        assert!(err.is_internal());
        let native = ValueType::Lowered(LoweredType::Int(1));
        assert_eq!(conv.convert_value_type(&native).unwrap(), LoweredType::Int(1));
    }
}
