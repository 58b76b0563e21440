// This module implements a reference evaluator for the lowered dialect. It gives lowered
// code a meaning independent of any backend so the encoding can be checked end to end:
// memory is a sparse map from byte addresses to scalar cells, aggregates are laid out packed
// in field order, the literal pool is placed first at word-aligned addresses and initialised
// from its ConstInit trees, and the heap is a bump allocator above it. Every runtime builtin
// is implemented here against the same TargetInfo the lowering used, so a type test, an
// equality or a print sees exactly the bits the lowered code produced.

//! Reference evaluator for lowered modules.

use std::fmt::Write as _;

use hashbrown::HashMap;
use log::trace;
use thiserror::Error;

use crate::ir::{
    BinOp, BlockId, ConstInit, Function, GlobalId, LowOp, LoweredType, Module, OpKind, ValueId,
};
use crate::runtime::Builtin;
use crate::target::{TargetInfo, TermKind};

const POOL_BASE: u64 = 0x1000;
const HEAP_ALIGN: u64 = 8;
const DEFAULT_FUEL: u64 = 1_000_000;
const MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(u64),
    Float(f64),
    Aggregate(Vec<Value>),
    Undef,
}

impl Value {
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn fields(&self) -> Option<&[Value]> {
        match self {
            Value::Aggregate(fields) => Some(fields),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum InterpError {
    #[error("missing function `{0}`")]
    MissingFunction(String),
    #[error("function `{function}` expects {expected} args but got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("invalid memory access at {addr:#x}")]
    BadAddress { addr: u64 },
    #[error("`{op}` is not a lowered operation")]
    NotLowered { op: &'static str },
    #[error("reached unreachable in `{function}`")]
    Unreachable { function: String },
    #[error("type error: {0}")]
    Type(String),
    #[error("use of undefined value {0}")]
    UndefinedValue(ValueId),
    #[error("out of fuel")]
    OutOfFuel,
    #[error("call depth exceeded in `{0}`")]
    CallDepth(String),
}

pub type InterpResult<T> = Result<T, InterpError>;

/// Observable runtime side effects, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    Print(String),
    TraceCapture,
    TraceConstruct,
    Yield,
}

pub struct Interpreter<'m> {
    module: &'m Module,
    target: &'m TargetInfo,
    memory: HashMap<u64, Value>,
    globals: Vec<u64>,
    heap: u64,
    fuel: u64,
    depth: usize,
    events: Vec<RuntimeEvent>,
}

impl<'m> Interpreter<'m> {
    /// Lay out and initialise the module's literal pool.
    pub fn new(module: &'m Module, target: &'m TargetInfo) -> InterpResult<Self> {
        let mut interp = Self {
            module,
            target,
            memory: HashMap::new(),
            globals: Vec::with_capacity(module.pool.len()),
            heap: 0,
            fuel: DEFAULT_FUEL,
            depth: 0,
            events: Vec::new(),
        };

        let mut next = POOL_BASE;
        for (_, global) in module.pool.iter() {
            next = next.next_multiple_of(global.align.max(1));
            interp.globals.push(next);
            next += interp.size_of(&global.ty).max(1);
        }
        interp.heap = align(next + 0x1000);

        for (id, global) in module.pool.iter() {
            let addr = interp.global_address(id);
            interp.write_init(addr, &global.ty, &global.init)?;
        }
        Ok(interp)
    }

    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = fuel;
        self
    }

    pub fn target(&self) -> &TargetInfo {
        self.target
    }

    pub fn events(&self) -> &[RuntimeEvent] {
        &self.events
    }

    /// Text of every print, in order.
    pub fn printed(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RuntimeEvent::Print(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn global_address(&self, id: GlobalId) -> u64 {
        self.globals[id.index()]
    }

    /// Packed size in bytes.
    pub fn size_of(&self, ty: &LoweredType) -> u64 {
        match ty {
            LoweredType::Void => 0,
            LoweredType::Int(bits) => u64::from(bits.div_ceil(8)),
            LoweredType::F64 => 8,
            LoweredType::Ptr(_) => self.target.pointer_size_in_bytes(),
            LoweredType::Struct { fields, .. } => fields.iter().map(|f| self.size_of(f)).sum(),
            LoweredType::Array(elem, len) => self.size_of(elem) * len,
        }
    }

    fn field_offset(&self, ty: &LoweredType, index: usize) -> InterpResult<u64> {
        match ty {
            LoweredType::Struct { fields, .. } if index < fields.len() => {
                Ok(fields[..index].iter().map(|f| self.size_of(f)).sum())
            }
            LoweredType::Array(elem, len) if (index as u64) < *len => Ok(self.size_of(elem) * index as u64),
            _ => Err(InterpError::Type(format!("no field {index} in {ty}"))),
        }
    }

    pub fn alloc(&mut self, bytes: u64) -> u64 {
        let addr = self.heap;
        self.heap = align(addr + bytes.max(1));
        addr
    }

    pub fn read(&self, addr: u64, ty: &LoweredType) -> InterpResult<Value> {
        match ty {
            LoweredType::Struct { fields, .. } => {
                let mut offset = addr;
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    values.push(self.read(offset, field)?);
                    offset += self.size_of(field);
                }
                Ok(Value::Aggregate(values))
            }
            LoweredType::Array(elem, len) => {
                let size = self.size_of(elem);
                (0..*len)
                    .map(|i| self.read(addr + i * size, elem))
                    .collect::<InterpResult<Vec<_>>>()
                    .map(Value::Aggregate)
            }
            LoweredType::Void => Ok(Value::Undef),
            _ => self
                .memory
                .get(&addr)
                .cloned()
                .ok_or(InterpError::BadAddress { addr }),
        }
    }

    pub fn write(&mut self, addr: u64, ty: &LoweredType, value: Value) -> InterpResult<()> {
        match (ty, value) {
            (LoweredType::Struct { fields, .. }, Value::Aggregate(values)) if fields.len() == values.len() => {
                let mut offset = addr;
                for (field, value) in fields.iter().zip(values) {
                    self.write(offset, field, value)?;
                    offset += self.size_of(field);
                }
                Ok(())
            }
            (LoweredType::Array(elem, len), Value::Aggregate(values)) if values.len() as u64 == *len => {
                let size = self.size_of(elem);
                for (i, value) in values.into_iter().enumerate() {
                    self.write(addr + i as u64 * size, elem, value)?;
                }
                Ok(())
            }
            (LoweredType::Struct { .. } | LoweredType::Array(..), Value::Undef) => Ok(()),
            (LoweredType::Struct { .. } | LoweredType::Array(..), other) => {
                Err(InterpError::Type(format!("storing {other:?} as {ty}")))
            }
            (_, value) => {
                self.memory.insert(addr, value);
                Ok(())
            }
        }
    }

    /// The word stored at `addr`.
    pub fn read_word(&self, addr: u64) -> InterpResult<u64> {
        let word = self.target.usize_type().clone();
        self.read(addr, &word)?
            .as_int()
            .ok_or(InterpError::BadAddress { addr })
    }

    fn write_init(&mut self, addr: u64, ty: &LoweredType, init: &ConstInit) -> InterpResult<()> {
        match init {
            ConstInit::Word(word) => self.write(addr, ty, Value::Int(*word)),
            ConstInit::Float(x) => self.write(addr, ty, Value::Float(*x)),
            ConstInit::Bytes(bytes) => {
                for (i, byte) in bytes.iter().enumerate() {
                    self.memory.insert(addr + i as u64, Value::Int(u64::from(*byte)));
                }
                Ok(())
            }
            ConstInit::Address { global, tag } => {
                let target = self.global_address(*global) | tag;
                self.write(addr, ty, Value::Int(target))
            }
            ConstInit::Aggregate(fields) => {
                for (i, field) in fields.iter().enumerate() {
                    let offset = self.field_offset(ty, i)?;
                    let field_ty = ty
                        .field(i)
                        .ok_or_else(|| InterpError::Type(format!("no field {i} in {ty}")))?
                        .clone();
                    self.write_init(addr + offset, &field_ty, field)?;
                }
                Ok(())
            }
        }
    }

    /// Run `name` to completion and return its results.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> InterpResult<Vec<Value>> {
        let module = self.module;
        let func = module
            .function(name)
            .ok_or_else(|| InterpError::MissingFunction(name.to_string()))?;
        if args.len() != func.params().len() {
            return Err(InterpError::ArgumentCount {
                function: name.to_string(),
                expected: func.params().len(),
                got: args.len(),
            });
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(InterpError::CallDepth(name.to_string()));
        }
        self.depth += 1;
        let result = self.run_function(func, args);
        self.depth -= 1;
        result
    }

    fn run_function(&mut self, func: &'m Function, args: Vec<Value>) -> InterpResult<Vec<Value>> {
        let mut env: HashMap<ValueId, Value> = HashMap::new();
        for (&param, arg) in func.params().iter().zip(args) {
            env.insert(param, arg);
        }

        let mut block = func.entry();
        loop {
            let mut next: Option<(BlockId, Vec<Value>)> = None;
            for &id in &func.block(block).ops {
                let op = func.op(id);
                if op.is_dead() {
                    continue;
                }
                self.fuel = self.fuel.checked_sub(1).ok_or(InterpError::OutOfFuel)?;
                let OpKind::Low(low) = &op.kind else {
                    return Err(InterpError::NotLowered { op: op.name() });
                };
                let operands = op
                    .operands
                    .iter()
                    .map(|v| env.get(v).cloned().ok_or(InterpError::UndefinedValue(*v)))
                    .collect::<InterpResult<Vec<_>>>()?;
                let result_ty = op.results.first().map(|&r| lowered_type(func, r)).transpose()?;

                let value = match low {
                    LowOp::Br | LowOp::CondBr => {
                        let taken = match low {
                            LowOp::CondBr => {
                                if int(&operands, 0)? & 1 == 1 {
                                    0
                                } else {
                                    1
                                }
                            }
                            _ => 0,
                        };
                        let succ = op
                            .successors
                            .get(taken)
                            .ok_or_else(|| InterpError::Type(format!("missing successor {taken}")))?;
                        let args = succ
                            .args
                            .iter()
                            .map(|v| env.get(v).cloned().ok_or(InterpError::UndefinedValue(*v)))
                            .collect::<InterpResult<Vec<_>>>()?;
                        next = Some((succ.block, args));
                        break;
                    }
                    LowOp::Return => return Ok(operands),
                    LowOp::Unreachable => {
                        return Err(InterpError::Unreachable {
                            function: func.name.clone(),
                        })
                    }
                    LowOp::Store => {
                        let value_ty = lowered_type(func, operand_id(&op.operands, 0)?)?;
                        let addr = int(&operands, 1)?;
                        let value = operand(&operands, 0)?.clone();
                        self.write(addr, &value_ty, value)?;
                        None
                    }
                    LowOp::Gep { indices } => {
                        let base_ty = lowered_type(func, operand_id(&op.operands, 0)?)?;
                        Some(Value::Int(self.gep(int(&operands, 0)?, &base_ty, indices)?))
                    }
                    LowOp::Call { callee } => self.dispatch(callee, operands)?,
                    other => {
                        let ty = result_ty
                            .as_ref()
                            .ok_or_else(|| InterpError::Type(format!("`{}` has no result", other.name())))?;
                        Some(self.eval(other, &operands, ty)?)
                    }
                };

                if let (Some(&result), Some(value)) = (op.results.first(), value) {
                    trace!("{} = {:?}", result, value);
                    env.insert(result, value);
                }
            }

            let Some((target, args)) = next else {
                return Err(InterpError::Type(format!(
                    "block ^{} of `{}` has no terminator",
                    func.block(block).name,
                    func.name
                )));
            };
            for (&arg, value) in func.block(target).args.iter().zip(args) {
                env.insert(arg, value);
            }
            block = target;
        }
    }

    /// Pure operations.
    fn eval(&self, op: &LowOp, operands: &[Value], ty: &LoweredType) -> InterpResult<Value> {
        let bits = int_width(ty, self.target);
        let value = match op {
            LowOp::Constant { value } => Value::Int(value & bits),
            LowOp::FConstant { value } => Value::Float(*value),
            LowOp::Undef => undef_of(ty),
            LowOp::Binary(bin) => {
                let (lhs, rhs) = (int(operands, 0)?, int(operands, 1)?);
                let result = match bin {
                    BinOp::Add => lhs.wrapping_add(rhs),
                    BinOp::Mul => lhs.wrapping_mul(rhs),
                    BinOp::And => lhs & rhs,
                    BinOp::Or => lhs | rhs,
                    BinOp::Xor => lhs ^ rhs,
                    BinOp::Shl => u32::try_from(rhs).ok().and_then(|s| lhs.checked_shl(s)).unwrap_or(0),
                    BinOp::LShr => u32::try_from(rhs).ok().and_then(|s| lhs.checked_shr(s)).unwrap_or(0),
                };
                Value::Int(result & bits)
            }
            LowOp::ICmpEq => Value::Int(u64::from(int(operands, 0)? == int(operands, 1)?)),
            LowOp::Trunc | LowOp::PtrToInt | LowOp::IntToPtr | LowOp::Bitcast => {
                Value::Int(int(operands, 0)? & bits)
            }
            LowOp::InsertValue { index } => {
                let mut fields = match operand(operands, 0)? {
                    Value::Aggregate(fields) => fields.clone(),
                    Value::Undef => match undef_of(ty) {
                        Value::Aggregate(fields) => fields,
                        _ => return Err(InterpError::Type(format!("insertvalue into {ty}"))),
                    },
                    other => return Err(InterpError::Type(format!("insertvalue into {other:?}"))),
                };
                let slot = fields
                    .get_mut(*index as usize)
                    .ok_or_else(|| InterpError::Type(format!("no field {index} in {ty}")))?;
                *slot = operand(operands, 1)?.clone();
                Value::Aggregate(fields)
            }
            LowOp::ExtractValue { index } => {
                let aggregate = operand(operands, 0)?;
                aggregate
                    .fields()
                    .and_then(|fields| fields.get(*index as usize))
                    .cloned()
                    .ok_or_else(|| InterpError::Type(format!("extractvalue {index} of {aggregate:?}")))?
            }
            LowOp::Load => self.read(int(operands, 0)?, ty)?,
            LowOp::AddressOf { global } => Value::Int(self.global_address(*global)),
            other => return Err(InterpError::Type(format!("`{}` is not a pure operation", other.name()))),
        };
        Ok(value)
    }

    fn gep(&self, base: u64, base_ty: &LoweredType, indices: &[u32]) -> InterpResult<u64> {
        let mut ty = base_ty
            .pointee()
            .ok_or_else(|| InterpError::Type(format!("gep through {base_ty}")))?;
        let Some((&first, rest)) = indices.split_first() else {
            return Ok(base);
        };
        let mut addr = base + u64::from(first) * self.size_of(ty);
        for &index in rest {
            addr += self.field_offset(ty, index as usize)?;
            ty = ty
                .field(index as usize)
                .ok_or_else(|| InterpError::Type(format!("no field {index} in {ty}")))?;
        }
        Ok(addr)
    }

    fn dispatch(&mut self, callee: &str, args: Vec<Value>) -> InterpResult<Option<Value>> {
        if let Some(builtin) = Builtin::from_symbol(callee) {
            return self.builtin(builtin, &args);
        }
        Ok(self.call(callee, args)?.into_iter().next())
    }

    fn builtin(&mut self, builtin: Builtin, args: &[Value]) -> InterpResult<Option<Value>> {
        let flag = |b: bool| Some(Value::Int(u64::from(b)));
        let result = match builtin {
            Builtin::Alloc => Some(Value::Int(self.alloc(int(args, 0)?))),
            Builtin::IsType => {
                let kind = kind_arg(args)?;
                flag(self.is_type(kind, int(args, 1)?)?)
            }
            Builtin::IsTuple => {
                let arity = int(args, 0)?;
                flag(self.boxed_header(int(args, 1)?)? == Some((TermKind::Tuple, arity)))
            }
            Builtin::IsBoxedType => {
                let kind = kind_arg(args)?;
                flag(self.boxed_header(int(args, 1)?)?.is_some_and(|(k, _)| k == kind))
            }
            Builtin::CmpEq => flag(self.terms_equal(int(args, 0)?, int(args, 1)?)?),
            Builtin::Print => {
                let term = int(args, 0)?;
                let text = self.render(term)?;
                self.events.push(RuntimeEvent::Print(text));
                Some(Value::Int(term))
            }
            Builtin::TraceCapture => {
                self.events.push(RuntimeEvent::TraceCapture);
                Some(Value::Int(self.target.none_value()))
            }
            Builtin::TraceConstruct => {
                self.events.push(RuntimeEvent::TraceConstruct);
                Some(Value::Int(self.target.nil_value()))
            }
            Builtin::Yield => {
                self.events.push(RuntimeEvent::Yield);
                None
            }
        };
        Ok(result)
    }

    pub fn is_list_cell(&self, term: u64) -> bool {
        term & self.target.list_mask() == self.target.list_tag()
    }

    pub fn is_boxed(&self, term: u64) -> bool {
        term & self.target.box_mask() == self.target.box_tag()
    }

    /// Address behind a boxed term.
    pub fn unbox(&self, term: u64) -> u64 {
        term & !(self.target.box_tag() | self.target.literal_tag()) & self.target.word_mask()
    }

    /// Address of the cell behind a list term.
    pub fn unbox_list(&self, term: u64) -> u64 {
        term & !self.target.list_mask() & self.target.word_mask()
    }

    /// Decoded header of a boxed term, `None` for anything else.
    pub fn boxed_header(&self, term: u64) -> InterpResult<Option<(TermKind, u64)>> {
        if !self.is_boxed(term) {
            return Ok(None);
        }
        let header = self.read_word(self.unbox(term))?;
        Ok(self.target.decode_header(header))
    }

    fn immediate(&self, term: u64) -> Option<(TermKind, u64)> {
        if self.is_boxed(term) || self.is_list_cell(term) {
            return None;
        }
        self.target.decode_immediate(term)
    }

    /// Runtime semantics of `__rt_is_type`.
    pub fn is_type(&self, kind: TermKind, term: u64) -> InterpResult<bool> {
        let imm = self.immediate(term);
        let boxed = self.boxed_header(term)?.map(|(k, _)| k);
        let result = match kind {
            TermKind::Term => true,
            TermKind::None => term == self.target.none_value(),
            TermKind::Nil => term == self.target.nil_value(),
            TermKind::List => term == self.target.nil_value() || self.is_list_cell(term),
            TermKind::Cons => self.is_list_cell(term),
            TermKind::Atom => matches!(imm, Some((TermKind::Atom, _))),
            TermKind::Boolean => matches!(imm, Some((TermKind::Atom, 0 | 1))),
            TermKind::Fixnum => matches!(imm, Some((TermKind::Fixnum, _))),
            TermKind::Integer => {
                matches!(imm, Some((TermKind::Fixnum, _))) || boxed == Some(TermKind::BigInt)
            }
            TermKind::Number => {
                matches!(imm, Some((TermKind::Fixnum, _)))
                    || matches!(boxed, Some(TermKind::BigInt | TermKind::Float))
            }
            TermKind::Box => self.is_boxed(term),
            TermKind::Float
            | TermKind::BigInt
            | TermKind::Tuple
            | TermKind::Map
            | TermKind::Closure
            | TermKind::Binary => boxed == Some(kind),
        };
        Ok(result)
    }

    /// Runtime semantics of `__rt_cmpeq`: structural equality.
    pub fn terms_equal(&self, lhs: u64, rhs: u64) -> InterpResult<bool> {
        if lhs == rhs {
            return Ok(true);
        }
        if self.is_list_cell(lhs) && self.is_list_cell(rhs) {
            let (l, r) = (self.unbox_list(lhs), self.unbox_list(rhs));
            let ptr = self.target.pointer_size_in_bytes();
            return Ok(self.terms_equal(self.read_word(l)?, self.read_word(r)?)?
                && self.terms_equal(self.read_word(l + ptr)?, self.read_word(r + ptr)?)?);
        }
        let (Some((lk, la)), Some((rk, ra))) = (self.boxed_header(lhs)?, self.boxed_header(rhs)?) else {
            return Ok(false);
        };
        if lk != rk {
            return Ok(false);
        }
        let (l, r) = (self.unbox(lhs), self.unbox(rhs));
        let ptr = self.target.pointer_size_in_bytes();
        match lk {
            TermKind::Tuple => {
                if la != ra {
                    return Ok(false);
                }
                for i in 1..=la {
                    if !self.terms_equal(self.read_word(l + i * ptr)?, self.read_word(r + i * ptr)?)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            TermKind::Binary => Ok(self.binary_bytes(lhs)? == self.binary_bytes(rhs)?),
            TermKind::Float => {
                let (x, y) = (self.read(l + ptr, &LoweredType::F64)?, self.read(r + ptr, &LoweredType::F64)?);
                Ok(x == y)
            }
            _ => Ok(false),
        }
    }

    /// Bytes of a boxed binary: `{header(len), flags, data}`.
    pub fn binary_bytes(&self, term: u64) -> InterpResult<Vec<u8>> {
        let Some((TermKind::Binary, len)) = self.boxed_header(term)? else {
            return Err(InterpError::Type(format!("{term:#x} is not a binary")));
        };
        let ptr = self.target.pointer_size_in_bytes();
        let data = self.read_word(self.unbox(term) + 2 * ptr)?;
        (0..len)
            .map(|i| {
                self.read(data + i, &LoweredType::Int(8))?
                    .as_int()
                    .map(|b| b as u8)
                    .ok_or(InterpError::BadAddress { addr: data + i })
            })
            .collect()
    }

    /// Human-readable form of a term, as `__rt_print` writes it.
    pub fn render(&self, term: u64) -> InterpResult<String> {
        let mut out = String::new();
        self.render_into(&mut out, term)?;
        Ok(out)
    }

    fn render_into(&self, out: &mut String, term: u64) -> InterpResult<()> {
        let ptr = self.target.pointer_size_in_bytes();
        if term == self.target.nil_value() {
            out.push_str("[]");
        } else if term == self.target.none_value() {
            out.push_str("none");
        } else if self.is_list_cell(term) {
            out.push('[');
            let mut cell = term;
            loop {
                let addr = self.unbox_list(cell);
                self.render_into(out, self.read_word(addr)?)?;
                let tail = self.read_word(addr + ptr)?;
                if tail == self.target.nil_value() {
                    break;
                }
                if !self.is_list_cell(tail) {
                    out.push_str(" | ");
                    self.render_into(out, tail)?;
                    break;
                }
                out.push_str(", ");
                cell = tail;
            }
            out.push(']');
        } else if let Some((kind, arity)) = self.boxed_header(term)? {
            let addr = self.unbox(term);
            match kind {
                TermKind::Tuple => {
                    out.push('{');
                    for i in 1..=arity {
                        if i > 1 {
                            out.push_str(", ");
                        }
                        self.render_into(out, self.read_word(addr + i * ptr)?)?;
                    }
                    out.push('}');
                }
                TermKind::Binary => {
                    let bytes = self.binary_bytes(term)?;
                    let _ = write!(out, "\"{}\"", bytes.escape_ascii());
                }
                TermKind::Float => {
                    let x = self.read(addr + ptr, &LoweredType::F64)?;
                    let _ = write!(out, "{:?}", x.as_float().unwrap_or(f64::NAN));
                }
                other => {
                    let _ = write!(out, "#{}<{addr:#x}>", other.name());
                }
            }
        } else {
            match self.target.decode_immediate(term) {
                Some((TermKind::Fixnum, value)) => {
                    let _ = write!(out, "{}", value as i64);
                }
                Some((TermKind::Atom, id)) => {
                    let _ = write!(out, "atom#{id}");
                }
                Some((kind, value)) => {
                    let _ = write!(out, "{}#{value}", kind.name());
                }
                None => {
                    let _ = write!(out, "<{term:#x}>");
                }
            }
        }
        Ok(())
    }
}

fn align(addr: u64) -> u64 {
    addr.next_multiple_of(HEAP_ALIGN)
}

fn lowered_type(func: &Function, value: ValueId) -> InterpResult<LoweredType> {
    func.value_type(value)
        .and_then(|ty| ty.as_lowered())
        .cloned()
        .ok_or_else(|| InterpError::Type(format!("{value} has no lowered type")))
}

fn operand(values: &[Value], index: usize) -> InterpResult<&Value> {
    values
        .get(index)
        .ok_or_else(|| InterpError::Type(format!("missing operand {index}")))
}

fn operand_id(ids: &[ValueId], index: usize) -> InterpResult<ValueId> {
    ids.get(index)
        .copied()
        .ok_or_else(|| InterpError::Type(format!("missing operand {index}")))
}

fn int(values: &[Value], index: usize) -> InterpResult<u64> {
    match values.get(index) {
        Some(Value::Int(v)) => Ok(*v),
        other => Err(InterpError::Type(format!("operand {index} is {other:?}, expected an integer"))),
    }
}

fn kind_arg(args: &[Value]) -> InterpResult<TermKind> {
    let code = int(args, 0)?;
    u32::try_from(code)
        .ok()
        .and_then(TermKind::from_code)
        .ok_or_else(|| InterpError::Type(format!("invalid kind code {code}")))
}

/// All-ones mask of an integer type; pointers are words.
fn int_width(ty: &LoweredType, target: &TargetInfo) -> u64 {
    match ty {
        LoweredType::Int(bits) if *bits >= 64 => !0,
        LoweredType::Int(bits) => (1u64 << bits) - 1,
        _ => target.word_mask(),
    }
}

fn undef_of(ty: &LoweredType) -> Value {
    match ty {
        LoweredType::Struct { fields, .. } => Value::Aggregate(fields.iter().map(undef_of).collect()),
        LoweredType::Array(elem, len) => Value::Aggregate((0..*len).map(|_| undef_of(elem)).collect()),
        _ => Value::Undef,
    }
}
