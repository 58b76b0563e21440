// src/ir/ops.rs

//! Operation vocabularies of the abstract and the lowered dialect.

use std::fmt;

use super::pool::GlobalId;
use super::types::AbstractType;

/// Compile-time constant carried by a literal operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    /// Decimal digits of an arbitrary-precision integer.
    BigInt(String),
    Float(f64),
    Atom(u64),
    Bool(bool),
    Nil,
    None,
    Binary {
        bytes: Vec<u8>,
        header: Option<u64>,
        flags: Option<u64>,
    },
    Tuple(Vec<Constant>),
    List(Vec<Constant>),
}

impl Constant {
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Constant::Binary {
            bytes: bytes.into(),
            header: None,
            flags: None,
        }
    }

    /// The abstract type a literal of this shape produces. Pooled literals
    /// are already tagged terms; short lists are unboxed cons cells.
    pub fn default_type(&self) -> AbstractType {
        match self {
            Constant::Int(_) => AbstractType::Fixnum,
            Constant::BigInt(_) => AbstractType::BigInt,
            Constant::Float(_) => AbstractType::Float,
            Constant::Atom(_) => AbstractType::Atom,
            Constant::Bool(_) => AbstractType::Boolean,
            Constant::Nil => AbstractType::Nil,
            Constant::None => AbstractType::None,
            Constant::Binary { .. } | Constant::Tuple(_) => AbstractType::Term,
            Constant::List(elements) => match elements.len() {
                0 => AbstractType::Nil,
                1 | 2 => AbstractType::Cons,
                _ => AbstractType::List,
            },
        }
    }

    fn kind(&self) -> EirOpKind {
        match self {
            Constant::Int(_) => EirOpKind::ConstInt,
            Constant::BigInt(_) => EirOpKind::ConstBigInt,
            Constant::Float(_) => EirOpKind::ConstFloat,
            Constant::Atom(_) => EirOpKind::ConstAtom,
            Constant::Bool(_) => EirOpKind::ConstBool,
            Constant::Nil => EirOpKind::ConstNil,
            Constant::None => EirOpKind::ConstNone,
            Constant::Binary { .. } => EirOpKind::ConstBinary,
            Constant::Tuple(_) => EirOpKind::ConstTuple,
            Constant::List(_) => EirOpKind::ConstList,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(i) => write!(f, "int {i}"),
            Constant::BigInt(digits) => write!(f, "bigint {digits}"),
            Constant::Float(x) => write!(f, "float {x:?}"),
            Constant::Atom(id) => write!(f, "atom {id}"),
            Constant::Bool(b) => write!(f, "bool {b}"),
            Constant::Nil => f.write_str("nil"),
            Constant::None => f.write_str("none"),
            Constant::Binary { bytes, .. } => {
                write!(f, "binary \"{}\"", bytes.escape_ascii())
            }
            Constant::Tuple(elements) => write_seq(f, "const_tuple", elements),
            Constant::List(elements) => write_seq(f, "const_list", elements),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, head: &str, elements: &[Constant]) -> fmt::Result {
    write!(f, "{head} [")?;
    for (i, element) in elements.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        fmt::Display::fmt(element, f)?;
    }
    f.write_str("]")
}

/// Abstract-dialect operations.
#[derive(Debug, Clone, PartialEq)]
pub enum EirOp {
    Branch,
    CondBranch,
    Call { callee: String },
    Return,
    Unreachable,
    Load,
    /// Address of field `index` of the aggregate behind the base pointer.
    GetElementPtr { index: u32 },
    IsType { match_type: AbstractType },
    Cast,
    CmpEq,
    /// Runtime tuple construction from operand terms.
    Tuple,
    /// Runtime cons cell construction from head and tail.
    Cons,
    Constant(Constant),
    Yield,
    TraceCapture,
    TraceConstruct,
    Print,
}

impl EirOp {
    pub fn kind(&self) -> EirOpKind {
        match self {
            EirOp::Branch => EirOpKind::Branch,
            EirOp::CondBranch => EirOpKind::CondBranch,
            EirOp::Call { .. } => EirOpKind::Call,
            EirOp::Return => EirOpKind::Return,
            EirOp::Unreachable => EirOpKind::Unreachable,
            EirOp::Load => EirOpKind::Load,
            EirOp::GetElementPtr { .. } => EirOpKind::GetElementPtr,
            EirOp::IsType { .. } => EirOpKind::IsType,
            EirOp::Cast => EirOpKind::Cast,
            EirOp::CmpEq => EirOpKind::CmpEq,
            EirOp::Tuple => EirOpKind::Tuple,
            EirOp::Cons => EirOpKind::Cons,
            EirOp::Constant(c) => c.kind(),
            EirOp::Yield => EirOpKind::Yield,
            EirOp::TraceCapture => EirOpKind::TraceCapture,
            EirOp::TraceConstruct => EirOpKind::TraceConstruct,
            EirOp::Print => EirOpKind::Print,
        }
    }
}

/// Discriminant of [`EirOp`], one per pattern slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EirOpKind {
    Branch,
    CondBranch,
    Call,
    Return,
    Unreachable,
    Load,
    GetElementPtr,
    IsType,
    Cast,
    CmpEq,
    Tuple,
    Cons,
    ConstInt,
    ConstBigInt,
    ConstFloat,
    ConstAtom,
    ConstBool,
    ConstNil,
    ConstNone,
    ConstBinary,
    ConstTuple,
    ConstList,
    Yield,
    TraceCapture,
    TraceConstruct,
    Print,
}

impl EirOpKind {
    pub const ALL: [EirOpKind; 26] = [
        EirOpKind::Branch,
        EirOpKind::CondBranch,
        EirOpKind::Call,
        EirOpKind::Return,
        EirOpKind::Unreachable,
        EirOpKind::Load,
        EirOpKind::GetElementPtr,
        EirOpKind::IsType,
        EirOpKind::Cast,
        EirOpKind::CmpEq,
        EirOpKind::Tuple,
        EirOpKind::Cons,
        EirOpKind::ConstInt,
        EirOpKind::ConstBigInt,
        EirOpKind::ConstFloat,
        EirOpKind::ConstAtom,
        EirOpKind::ConstBool,
        EirOpKind::ConstNil,
        EirOpKind::ConstNone,
        EirOpKind::ConstBinary,
        EirOpKind::ConstTuple,
        EirOpKind::ConstList,
        EirOpKind::Yield,
        EirOpKind::TraceCapture,
        EirOpKind::TraceConstruct,
        EirOpKind::Print,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            EirOpKind::Branch => "br",
            EirOpKind::CondBranch => "cond_br",
            EirOpKind::Call => "call",
            EirOpKind::Return => "return",
            EirOpKind::Unreachable => "unreachable",
            EirOpKind::Load => "load",
            EirOpKind::GetElementPtr => "gep",
            EirOpKind::IsType => "is_type",
            EirOpKind::Cast => "cast",
            EirOpKind::CmpEq => "cmpeq",
            EirOpKind::Tuple => "tuple",
            EirOpKind::Cons => "cons",
            EirOpKind::ConstInt => "int",
            EirOpKind::ConstBigInt => "bigint",
            EirOpKind::ConstFloat => "float",
            EirOpKind::ConstAtom => "atom",
            EirOpKind::ConstBool => "bool",
            EirOpKind::ConstNil => "nil",
            EirOpKind::ConstNone => "none",
            EirOpKind::ConstBinary => "binary",
            EirOpKind::ConstTuple => "const_tuple",
            EirOpKind::ConstList => "const_list",
            EirOpKind::Yield => "yield",
            EirOpKind::TraceCapture => "trace_capture",
            EirOpKind::TraceConstruct => "trace_construct",
            EirOpKind::Print => "print",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    LShr,
}

impl BinOp {
    pub const fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Mul => "mul",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
        }
    }
}

/// Lowered-dialect instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum LowOp {
    /// Integer constant of the result type.
    Constant { value: u64 },
    FConstant { value: f64 },
    Undef,
    Binary(BinOp),
    ICmpEq,
    Trunc,
    PtrToInt,
    IntToPtr,
    Bitcast,
    InsertValue { index: u32 },
    ExtractValue { index: u32 },
    Load,
    Store,
    /// Field address; indices follow the `[0, field]` convention.
    Gep { indices: Vec<u32> },
    AddressOf { global: GlobalId },
    Call { callee: String },
    Br,
    CondBr,
    Return,
    Unreachable,
}

impl LowOp {
    pub fn name(&self) -> &'static str {
        match self {
            LowOp::Constant { .. } => "const",
            LowOp::FConstant { .. } => "fconst",
            LowOp::Undef => "undef",
            LowOp::Binary(op) => op.name(),
            LowOp::ICmpEq => "icmp.eq",
            LowOp::Trunc => "trunc",
            LowOp::PtrToInt => "ptrtoint",
            LowOp::IntToPtr => "inttoptr",
            LowOp::Bitcast => "bitcast",
            LowOp::InsertValue { .. } => "insertvalue",
            LowOp::ExtractValue { .. } => "extractvalue",
            LowOp::Load => "load",
            LowOp::Store => "store",
            LowOp::Gep { .. } => "gep",
            LowOp::AddressOf { .. } => "addressof",
            LowOp::Call { .. } => "call",
            LowOp::Br => "br",
            LowOp::CondBr => "cond_br",
            LowOp::Return => "ret",
            LowOp::Unreachable => "unreachable",
        }
    }
}

/// Either dialect; the legality predicate of the driver is
/// [`OpKind::is_lowered`].
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Eir(EirOp),
    Low(LowOp),
}

impl OpKind {
    pub fn is_lowered(&self) -> bool {
        matches!(self, OpKind::Low(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Eir(op) => op.kind().name(),
            OpKind::Low(op) => op.name(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            OpKind::Eir(EirOp::Branch | EirOp::CondBranch | EirOp::Return | EirOp::Unreachable)
                | OpKind::Low(LowOp::Br | LowOp::CondBr | LowOp::Return | LowOp::Unreachable)
        )
    }
}
