// src/target/kind.rs

//! Runtime kind codes shared with the companion runtime.

use std::fmt;

/// Kind code passed to the type-test builtins and stored in header and
/// immediate kind fields. The numbering is part of the runtime ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TermKind {
    None = 0,
    Term = 1,
    List = 2,
    Number = 3,
    Integer = 4,
    Float = 5,
    Atom = 6,
    Boolean = 7,
    Fixnum = 8,
    BigInt = 9,
    Nil = 10,
    Cons = 11,
    Tuple = 12,
    Map = 13,
    Closure = 14,
    Binary = 15,
    Box = 16,
}

impl TermKind {
    pub const ALL: [TermKind; 17] = [
        TermKind::None,
        TermKind::Term,
        TermKind::List,
        TermKind::Number,
        TermKind::Integer,
        TermKind::Float,
        TermKind::Atom,
        TermKind::Boolean,
        TermKind::Fixnum,
        TermKind::BigInt,
        TermKind::Nil,
        TermKind::Cons,
        TermKind::Tuple,
        TermKind::Map,
        TermKind::Closure,
        TermKind::Binary,
        TermKind::Box,
    ];

    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            TermKind::None => "none",
            TermKind::Term => "term",
            TermKind::List => "list",
            TermKind::Number => "number",
            TermKind::Integer => "integer",
            TermKind::Float => "float",
            TermKind::Atom => "atom",
            TermKind::Boolean => "bool",
            TermKind::Fixnum => "fixnum",
            TermKind::BigInt => "bigint",
            TermKind::Nil => "nil",
            TermKind::Cons => "cons",
            TermKind::Tuple => "tuple",
            TermKind::Map => "map",
            TermKind::Closure => "closure",
            TermKind::Binary => "binary",
            TermKind::Box => "box",
        }
    }
}

impl fmt::Display for TermKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_index_the_table() {
        for kind in TermKind::ALL {
            assert_eq!(TermKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(TermKind::from_code(99), None);
    }
}
