// src/ir/builder.rs

//! Programmatic construction of abstract-dialect functions.

use super::ops::{Constant, EirOp, OpKind};
use super::types::{AbstractType, LoweredType, ValueType};
use super::{BlockId, Function, Location, Operation, Successor, ValueId};

/// Appends abstract operations to the current block of a function.
pub struct FunctionBuilder {
    func: Function,
    current: BlockId,
    loc: Location,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, params: Vec<ValueType>, results: Vec<ValueType>) -> Self {
        let func = Function::new(name, params, results);
        let current = func.entry();
        Self {
            func,
            current,
            loc: Location::unknown(),
        }
    }

    pub fn param(&self, index: usize) -> ValueId {
        self.func.params()[index]
    }

    pub fn create_block(&mut self, name: impl Into<String>, arg_types: Vec<ValueType>) -> BlockId {
        self.func.add_block(name, arg_types)
    }

    pub fn block_arg(&self, block: BlockId, index: usize) -> ValueId {
        self.func.block(block).args[index]
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn set_loc(&mut self, loc: Location) {
        self.loc = loc;
    }

    /// Append `op` producing one value per entry of `result_types`.
    pub fn op(
        &mut self,
        op: EirOp,
        operands: Vec<ValueId>,
        result_types: Vec<ValueType>,
        successors: Vec<Successor>,
    ) -> Vec<ValueId> {
        let results: Vec<ValueId> = result_types
            .into_iter()
            .map(|ty| self.func.add_value(ty))
            .collect();
        let operation = Operation::new(OpKind::Eir(op), operands, results.clone())
            .with_successors(successors)
            .at(self.loc);
        self.func.append_op(self.current, operation);
        results
    }

    fn single(&mut self, op: EirOp, operands: Vec<ValueId>, ty: ValueType) -> ValueId {
        self.op(op, operands, vec![ty], Vec::new())[0]
    }

    pub fn constant(&mut self, value: Constant) -> ValueId {
        let ty = value.default_type().into();
        self.single(EirOp::Constant(value), Vec::new(), ty)
    }

    pub fn int(&mut self, value: i64) -> ValueId {
        self.constant(Constant::Int(value))
    }

    pub fn atom(&mut self, id: u64) -> ValueId {
        self.constant(Constant::Atom(id))
    }

    pub fn boolean(&mut self, value: bool) -> ValueId {
        self.constant(Constant::Bool(value))
    }

    pub fn nil(&mut self) -> ValueId {
        self.constant(Constant::Nil)
    }

    pub fn tuple(&mut self, elements: &[ValueId]) -> ValueId {
        self.single(EirOp::Tuple, elements.to_vec(), AbstractType::Term.into())
    }

    pub fn cons(&mut self, head: ValueId, tail: ValueId) -> ValueId {
        self.single(EirOp::Cons, vec![head, tail], AbstractType::Term.into())
    }

    pub fn is_type(&mut self, value: ValueId, match_type: AbstractType) -> ValueId {
        self.single(
            EirOp::IsType { match_type },
            vec![value],
            LoweredType::Int(1).into(),
        )
    }

    pub fn cast(&mut self, value: ValueId, to: AbstractType) -> ValueId {
        self.single(EirOp::Cast, vec![value], to.into())
    }

    pub fn cmp_eq(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.single(EirOp::CmpEq, vec![lhs, rhs], LoweredType::Int(1).into())
    }

    pub fn load(&mut self, ptr: ValueId, ty: AbstractType) -> ValueId {
        self.single(EirOp::Load, vec![ptr], ty.into())
    }

    pub fn gep(&mut self, base: ValueId, index: u32, ty: AbstractType) -> ValueId {
        self.single(EirOp::GetElementPtr { index }, vec![base], ty.into())
    }

    pub fn call(&mut self, callee: &str, args: &[ValueId], results: Vec<ValueType>) -> Vec<ValueId> {
        self.op(
            EirOp::Call {
                callee: callee.to_string(),
            },
            args.to_vec(),
            results,
            Vec::new(),
        )
    }

    pub fn print(&mut self, values: &[ValueId]) {
        self.op(EirOp::Print, values.to_vec(), Vec::new(), Vec::new());
    }

    pub fn yield_now(&mut self) {
        self.op(EirOp::Yield, Vec::new(), Vec::new(), Vec::new());
    }

    pub fn trace_capture(&mut self) -> ValueId {
        self.single(EirOp::TraceCapture, Vec::new(), AbstractType::Term.into())
    }

    pub fn trace_construct(&mut self, trace: ValueId) -> ValueId {
        self.single(EirOp::TraceConstruct, vec![trace], AbstractType::Term.into())
    }

    pub fn branch(&mut self, dest: BlockId, args: &[ValueId]) {
        let succ = Successor::new(dest, args.to_vec());
        self.op(EirOp::Branch, Vec::new(), Vec::new(), vec![succ]);
    }

    pub fn cond_branch(
        &mut self,
        cond: ValueId,
        if_true: (BlockId, &[ValueId]),
        if_false: (BlockId, &[ValueId]),
    ) {
        let succs = vec![
            Successor::new(if_true.0, if_true.1.to_vec()),
            Successor::new(if_false.0, if_false.1.to_vec()),
        ];
        self.op(EirOp::CondBranch, vec![cond], Vec::new(), succs);
    }

    pub fn ret(&mut self, values: &[ValueId]) {
        self.op(EirOp::Return, values.to_vec(), Vec::new(), Vec::new());
    }

    pub fn unreachable(&mut self) {
        self.op(EirOp::Unreachable, Vec::new(), Vec::new(), Vec::new());
    }

    pub fn finish(self) -> Function {
        self.func
    }
}
