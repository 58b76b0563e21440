// src/ir/types.rs

//! Type vocabulary shared by both dialects.
//!
//! [`AbstractType`] is the closed set of term types produced by earlier
//! stages. [`LoweredType`] is the word/pointer/aggregate vocabulary the pass
//! emits. A value in a function carries a [`ValueType`], which is one or the
//! other; native types may already appear in the abstract dialect (for
//! example the `i1` produced by a type test).

use std::fmt;

use crate::target::TermKind;

/// Term types of the abstract dialect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AbstractType {
    /// Fully opaque term.
    Term,
    Atom,
    Boolean,
    Fixnum,
    Float,
    Nil,
    None,
    /// A list that may be empty.
    List,
    /// A non-empty list.
    Cons,
    /// `Some(elements)` for a static shape, `None` when the arity is only
    /// known at runtime.
    Tuple(Option<Vec<AbstractType>>),
    Binary,
    Map,
    Closure,
    BigInt,
    Box(Box<AbstractType>),
    Ref(Box<AbstractType>),
}

impl AbstractType {
    pub fn boxed(inner: AbstractType) -> Self {
        AbstractType::Box(Box::new(inner))
    }

    pub fn reference(inner: AbstractType) -> Self {
        AbstractType::Ref(Box::new(inner))
    }

    pub fn tuple(elements: Vec<AbstractType>) -> Self {
        AbstractType::Tuple(Some(elements))
    }

    pub fn dynamic_tuple() -> Self {
        AbstractType::Tuple(None)
    }

    /// The runtime kind this type denotes.
    pub fn kind(&self) -> TermKind {
        match self {
            AbstractType::Term => TermKind::Term,
            AbstractType::Atom => TermKind::Atom,
            AbstractType::Boolean => TermKind::Boolean,
            AbstractType::Fixnum => TermKind::Fixnum,
            AbstractType::Float => TermKind::Float,
            AbstractType::Nil => TermKind::Nil,
            AbstractType::None => TermKind::None,
            AbstractType::List => TermKind::List,
            AbstractType::Cons => TermKind::Cons,
            AbstractType::Tuple(_) => TermKind::Tuple,
            AbstractType::Binary => TermKind::Binary,
            AbstractType::Map => TermKind::Map,
            AbstractType::Closure => TermKind::Closure,
            AbstractType::BigInt => TermKind::BigInt,
            AbstractType::Box(_) | AbstractType::Ref(_) => TermKind::Box,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, AbstractType::Term)
    }

    /// Types whose values fit entirely in one word.
    pub fn is_immediate(&self) -> bool {
        matches!(
            self,
            AbstractType::Atom
                | AbstractType::Boolean
                | AbstractType::Fixnum
                | AbstractType::Float
                | AbstractType::Nil
                | AbstractType::None
        )
    }

    pub fn is_box(&self) -> bool {
        matches!(self, AbstractType::Box(_))
    }

    /// Static tuple arity, if any.
    pub fn static_arity(&self) -> Option<usize> {
        match self {
            AbstractType::Tuple(Some(elements)) => Some(elements.len()),
            _ => None,
        }
    }
}

impl fmt::Display for AbstractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractType::Term => f.write_str("term"),
            AbstractType::Atom => f.write_str("atom"),
            AbstractType::Boolean => f.write_str("bool"),
            AbstractType::Fixnum => f.write_str("fixnum"),
            AbstractType::Float => f.write_str("float"),
            AbstractType::Nil => f.write_str("nil"),
            AbstractType::None => f.write_str("none"),
            AbstractType::List => f.write_str("list"),
            AbstractType::Cons => f.write_str("cons"),
            AbstractType::Tuple(None) => f.write_str("tuple<?>"),
            AbstractType::Tuple(Some(elements)) => {
                f.write_str("tuple<")?;
                write_list(f, elements)?;
                f.write_str(">")
            }
            AbstractType::Binary => f.write_str("binary"),
            AbstractType::Map => f.write_str("map"),
            AbstractType::Closure => f.write_str("closure"),
            AbstractType::BigInt => f.write_str("bigint"),
            AbstractType::Box(inner) => write!(f, "box<{inner}>"),
            AbstractType::Ref(inner) => write!(f, "ref<{inner}>"),
        }
    }
}

/// Concrete representation emitted by the pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoweredType {
    Void,
    Int(u32),
    F64,
    Ptr(Box<LoweredType>),
    /// Packed aggregate. Canonical target types carry a name.
    Struct {
        name: Option<&'static str>,
        fields: Vec<LoweredType>,
    },
    Array(Box<LoweredType>, u64),
}

impl LoweredType {
    pub fn ptr_to(&self) -> LoweredType {
        LoweredType::Ptr(Box::new(self.clone()))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, LoweredType::Ptr(_))
    }

    pub fn is_int(&self, bits: u32) -> bool {
        matches!(self, LoweredType::Int(b) if *b == bits)
    }

    pub fn pointee(&self) -> Option<&LoweredType> {
        match self {
            LoweredType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn field(&self, index: usize) -> Option<&LoweredType> {
        match self {
            LoweredType::Struct { fields, .. } => fields.get(index),
            LoweredType::Array(elem, len) if (index as u64) < *len => Some(elem),
            _ => None,
        }
    }
}

impl fmt::Display for LoweredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoweredType::Void => f.write_str("void"),
            LoweredType::Int(bits) => write!(f, "i{bits}"),
            LoweredType::F64 => f.write_str("f64"),
            LoweredType::Ptr(inner) => write!(f, "ptr<{inner}>"),
            LoweredType::Struct { name: Some(name), .. } => write!(f, "%{name}"),
            LoweredType::Struct { name: None, fields } => {
                f.write_str("{")?;
                write_list(f, fields)?;
                f.write_str("}")
            }
            LoweredType::Array(elem, len) => write!(f, "[{len} x {elem}]"),
        }
    }
}

/// Type of an SSA value during conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Abstract(AbstractType),
    Lowered(LoweredType),
}

impl ValueType {
    pub fn is_lowered(&self) -> bool {
        matches!(self, ValueType::Lowered(_))
    }

    pub fn as_lowered(&self) -> Option<&LoweredType> {
        match self {
            ValueType::Lowered(ty) => Some(ty),
            ValueType::Abstract(_) => None,
        }
    }

    pub fn as_abstract(&self) -> Option<&AbstractType> {
        match self {
            ValueType::Abstract(ty) => Some(ty),
            ValueType::Lowered(_) => None,
        }
    }
}

impl From<AbstractType> for ValueType {
    fn from(ty: AbstractType) -> Self {
        ValueType::Abstract(ty)
    }
}

impl From<LoweredType> for ValueType {
    fn from(ty: LoweredType) -> Self {
        ValueType::Lowered(ty)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Abstract(ty) => fmt::Display::fmt(ty, f),
            ValueType::Lowered(ty) => fmt::Display::fmt(ty, f),
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        fmt::Display::fmt(item, f)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips_nested_types() {
        let ty = AbstractType::boxed(AbstractType::tuple(vec![
            AbstractType::Atom,
            AbstractType::reference(AbstractType::Cons),
        ]));
        assert_eq!(ty.to_string(), "box<tuple<atom, ref<cons>>>");
        assert_eq!(AbstractType::dynamic_tuple().to_string(), "tuple<?>");

        let low = LoweredType::Struct {
            name: None,
            fields: vec![LoweredType::Int(64), LoweredType::Int(64).ptr_to()],
        };
        assert_eq!(low.to_string(), "{i64, ptr<i64>}");
    }

    #[test]
    fn classification() {
        assert!(AbstractType::Boolean.is_immediate());
        assert!(!AbstractType::Cons.is_immediate());
        assert!(AbstractType::Term.is_opaque());
        assert_eq!(AbstractType::tuple(vec![AbstractType::Term; 3]).static_arity(), Some(3));
        assert_eq!(AbstractType::dynamic_tuple().static_arity(), None);
    }
}
