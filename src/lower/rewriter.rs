// src/lower/rewriter.rs

//! Emission context handed to conversion patterns.

use hashbrown::HashSet;

use crate::core::{LowerError, LowerResult, LoweringSession};
use crate::ir::{
    BinOp, ConstInit, ConstantPool, ExternTable, Function, GlobalId, Location, LowOp,
    LoweredType, OpId, OpKind, Operation, Successor, ValueId, ValueType,
};
use crate::runtime::Builtin;
use crate::target::TargetInfo;

use super::TypeConverter;

/// Appends lowered operations to the arena of the function being converted
/// and gives patterns access to the module's declarations and literal pool.
///
/// Emitted operations are not placed in any block; the driver splices
/// [`Rewriter::finish`]'s ids in place of the operation being replaced.
pub struct Rewriter<'a, 's> {
    func: &'a mut Function,
    externs: &'a mut ExternTable,
    pool: &'a mut ConstantPool,
    defined: &'a HashSet<String>,
    converter: TypeConverter<'a>,
    session: &'a LoweringSession<'s>,
    loc: Location,
    emitted: Vec<OpId>,
}

impl<'a, 's> Rewriter<'a, 's> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        func: &'a mut Function,
        externs: &'a mut ExternTable,
        pool: &'a mut ConstantPool,
        defined: &'a HashSet<String>,
        converter: TypeConverter<'a>,
        session: &'a LoweringSession<'s>,
        loc: Location,
    ) -> Self {
        Self {
            func,
            externs,
            pool,
            defined,
            converter,
            session,
            loc,
            emitted: Vec::new(),
        }
    }

    pub fn target(&self) -> &'a TargetInfo {
        self.converter.target()
    }

    pub fn converter(&self) -> TypeConverter<'a> {
        self.converter
    }

    pub fn loc(&self) -> Location {
        self.loc
    }

    /// Lowered type of an already-converted value.
    pub fn value_type(&self, value: ValueId) -> LowerResult<LoweredType> {
        match self.func.value_type(value) {
            Some(ValueType::Lowered(ty)) => Ok(ty.clone()),
            _ => Err(LowerError::UnmappedValue { value: value.0 }),
        }
    }

    pub fn emit(
        &mut self,
        op: LowOp,
        operands: Vec<ValueId>,
        result_types: Vec<LoweredType>,
        successors: Vec<Successor>,
    ) -> Vec<ValueId> {
        let results: Vec<ValueId> = result_types
            .into_iter()
            .map(|ty| self.func.add_value(ty.into()))
            .collect();
        log::trace!("  emit {} {:?} -> {:?}", op.name(), operands, results);
        let operation = Operation::new(OpKind::Low(op), operands, results.clone())
            .with_successors(successors)
            .at(self.loc);
        self.emitted.push(self.func.push_op(operation));
        results
    }

    pub fn emit_value(&mut self, op: LowOp, operands: Vec<ValueId>, ty: LoweredType) -> ValueId {
        let result = self.func.add_value(ty.into());
        log::trace!("  emit {} {:?} -> {}", op.name(), operands, result);
        let operation = Operation::new(OpKind::Low(op), operands, vec![result]).at(self.loc);
        self.emitted.push(self.func.push_op(operation));
        result
    }

    pub fn emit_effect(&mut self, op: LowOp, operands: Vec<ValueId>) {
        self.emit(op, operands, Vec::new(), Vec::new());
    }

    pub fn int_const(&mut self, value: u64, ty: LoweredType) -> ValueId {
        self.emit_value(LowOp::Constant { value }, Vec::new(), ty)
    }

    /// Constant of the target word type.
    pub fn word(&mut self, value: u64) -> ValueId {
        let ty = self.target().term_type().clone();
        self.int_const(value & self.target().word_mask(), ty)
    }

    /// Integer arithmetic; the result has the type of `lhs`.
    pub fn binary(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId) -> LowerResult<ValueId> {
        let ty = self.value_type(lhs)?;
        Ok(self.emit_value(LowOp::Binary(op), vec![lhs, rhs], ty))
    }

    pub fn undef(&mut self, ty: LoweredType) -> ValueId {
        self.emit_value(LowOp::Undef, Vec::new(), ty)
    }

    pub fn insert_value(&mut self, aggregate: ValueId, value: ValueId, index: u32) -> LowerResult<ValueId> {
        let ty = self.value_type(aggregate)?;
        Ok(self.emit_value(LowOp::InsertValue { index }, vec![aggregate, value], ty))
    }

    /// Build an aggregate of type `ty` from `fields` by successive inserts.
    pub fn aggregate(&mut self, ty: LoweredType, fields: &[ValueId]) -> LowerResult<ValueId> {
        let mut agg = self.undef(ty);
        for (i, &field) in fields.iter().enumerate() {
            agg = self.insert_value(agg, field, i as u32)?;
        }
        Ok(agg)
    }

    pub fn address_of(&mut self, global: GlobalId) -> ValueId {
        let ty = self.pool.get(global).ty.ptr_to();
        self.emit_value(LowOp::AddressOf { global }, Vec::new(), ty)
    }

    /// Direct call; returns the result value unless `result` is void.
    pub fn call(&mut self, callee: &str, args: Vec<ValueId>, result: LoweredType) -> Option<ValueId> {
        let op = LowOp::Call {
            callee: callee.to_string(),
        };
        if result == LoweredType::Void {
            self.emit_effect(op, args);
            None
        } else {
            Some(self.emit_value(op, args, result))
        }
    }

    /// Call a runtime builtin, declaring it in the module on first use.
    pub fn call_builtin(&mut self, builtin: Builtin, args: Vec<ValueId>) -> Option<ValueId> {
        let result = self.get_or_insert_builtin(builtin);
        self.call(builtin.symbol(), args, result)
    }

    /// Like [`call_builtin`](Self::call_builtin) for builtins that return a value.
    pub fn builtin_value(&mut self, builtin: Builtin, args: Vec<ValueId>) -> LowerResult<ValueId> {
        self.call_builtin(builtin, args).ok_or_else(|| LowerError::MalformedIr {
            reason: format!("builtin {builtin} has no result"),
        })
    }

    /// Idempotent per module; returns the builtin's result type.
    pub fn get_or_insert_builtin(&mut self, builtin: Builtin) -> LoweredType {
        let (params, result) = builtin.signature(self.target());
        let (decl, created) = self.externs.get_or_insert(builtin.symbol(), params, result);
        if created {
            self.session.record_builtin_declared(builtin.symbol());
        }
        decl.result.clone()
    }

    /// Declare an external callee unless the module defines it.
    pub fn get_or_insert_function(&mut self, name: &str, params: Vec<LoweredType>, result: LoweredType) {
        if self.defined.contains(name) {
            return;
        }
        let (_, created) = self.externs.get_or_insert(name, params, result);
        if created {
            log::debug!("declared external function {name}");
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defined.contains(name)
    }

    pub fn intern_global(&mut self, ty: LoweredType, init: ConstInit) -> GlobalId {
        let align = self.target().pool_alignment();
        let (id, created) = self.pool.intern(ty, init, align);
        if created {
            self.session.record_global_created();
        }
        id
    }

    pub fn pool(&self) -> &ConstantPool {
        &*self.pool
    }

    pub(crate) fn finish(self) -> Vec<OpId> {
        self.emitted
    }
}
