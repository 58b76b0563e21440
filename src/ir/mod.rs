// This module defines the in-memory IR that the lowering pass consumes and produces. A Module
// owns its functions, a table of external declarations (runtime builtins and callees defined
// elsewhere) and the per-module literal pool. A Function keeps every Operation in an arena
// addressed by OpId; blocks list the live operation ids in order, so a rewrite can append
// replacement operations, splice their ids into the block and mark the original dead without
// invalidating anything a traversal is holding. Values live in a per-function table that
// records each value's type, abstract or lowered. compact() drops dead operations and
// renumbers values once a pass is done with the arena.

//! IR substrate shared by both dialects.

pub mod builder;
pub mod ops;
pub mod parser;
pub mod pool;
pub mod printer;
pub mod types;

use std::fmt;

use hashbrown::HashMap;

pub use builder::FunctionBuilder;
pub use ops::{BinOp, Constant, EirOp, EirOpKind, LowOp, OpKind};
pub use pool::{ConstInit, ConstantPool, Global, GlobalId};
pub use types::{AbstractType, LoweredType, ValueType};

/// Source position of an operation; `0:0` when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_known(&self) -> bool {
        self.line != 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}:{}", self.line, self.column)
        } else {
            f.write_str("<unknown>")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl OpId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A branch target together with the values bound to its block arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Successor {
    pub block: BlockId,
    pub args: Vec<ValueId>,
}

impl Successor {
    pub fn new(block: BlockId, args: Vec<ValueId>) -> Self {
        Self { block, args }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OpKind,
    pub operands: Vec<ValueId>,
    pub results: Vec<ValueId>,
    pub successors: Vec<Successor>,
    pub loc: Location,
    pub(crate) dead: bool,
}

impl Operation {
    pub fn new(kind: OpKind, operands: Vec<ValueId>, results: Vec<ValueId>) -> Self {
        Self {
            kind,
            operands,
            results,
            successors: Vec::new(),
            loc: Location::unknown(),
            dead: false,
        }
    }

    pub fn with_successors(mut self, successors: Vec<Successor>) -> Self {
        self.successors = successors;
        self
    }

    pub fn at(mut self, loc: Location) -> Self {
        self.loc = loc;
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn as_eir(&self) -> Option<&EirOp> {
        match &self.kind {
            OpKind::Eir(op) => Some(op),
            OpKind::Low(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub args: Vec<ValueId>,
    pub ops: Vec<OpId>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub results: Vec<ValueType>,
    pub blocks: Vec<Block>,
    pub loc: Location,
    ops: Vec<Operation>,
    values: Vec<ValueType>,
}

impl Function {
    /// A function with an empty entry block whose arguments are the parameters.
    pub fn new(name: impl Into<String>, params: Vec<ValueType>, results: Vec<ValueType>) -> Self {
        let mut func = Self {
            name: name.into(),
            results,
            blocks: Vec::new(),
            loc: Location::unknown(),
            ops: Vec::new(),
            values: Vec::new(),
        };
        func.add_block("entry", params);
        func
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn params(&self) -> &[ValueId] {
        &self.blocks[0].args
    }

    pub fn add_block(&mut self, name: impl Into<String>, arg_types: Vec<ValueType>) -> BlockId {
        let args = arg_types.into_iter().map(|ty| self.add_value(ty)).collect();
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            name: name.into(),
            args,
            ops: Vec::new(),
        });
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn add_value(&mut self, ty: ValueType) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ty);
        id
    }

    pub fn value_type(&self, value: ValueId) -> Option<&ValueType> {
        self.values.get(value.index())
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> impl Iterator<Item = (ValueId, &ValueType)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, ty)| (ValueId(i as u32), ty))
    }

    /// Append an operation to the arena without placing it in a block.
    pub fn push_op(&mut self, op: Operation) -> OpId {
        let id = OpId(self.ops.len() as u32);
        self.ops.push(op);
        id
    }

    /// Append an operation at the end of `block`.
    pub fn append_op(&mut self, block: BlockId, op: Operation) -> OpId {
        let id = self.push_op(op);
        self.blocks[block.index()].ops.push(id);
        id
    }

    pub fn op(&self, id: OpId) -> &Operation {
        &self.ops[id.index()]
    }

    pub fn op_mut(&mut self, id: OpId) -> &mut Operation {
        &mut self.ops[id.index()]
    }

    pub fn mark_dead(&mut self, id: OpId) {
        self.ops[id.index()].dead = true;
    }

    /// Live operations in block order.
    pub fn ops(&self) -> impl Iterator<Item = (BlockId, &Operation)> + '_ {
        self.blocks.iter().enumerate().flat_map(move |(b, block)| {
            block
                .ops
                .iter()
                .map(move |id| (BlockId(b as u32), &self.ops[id.index()]))
                .filter(|(_, op)| !op.dead)
        })
    }

    pub fn terminator(&self, block: BlockId) -> Option<&Operation> {
        let id = self.blocks[block.index()].ops.last()?;
        let op = &self.ops[id.index()];
        op.kind.is_terminator().then_some(op)
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block)
            .map(|op| op.successors.iter().map(|s| s.block).collect())
            .unwrap_or_default()
    }

    /// Drop dead operations from the arena and renumber values densely in
    /// definition order. Values nothing refers to are discarded.
    pub fn compact(&mut self) {
        let old_ops = std::mem::take(&mut self.ops);
        let old_values = std::mem::take(&mut self.values);
        let mut remap: HashMap<ValueId, ValueId> = HashMap::new();
        let mut new_values = Vec::new();
        let mut renumber = |v: ValueId, remap: &mut HashMap<ValueId, ValueId>| -> ValueId {
            *remap.entry(v).or_insert_with(|| {
                let id = ValueId(new_values.len() as u32);
                new_values.push(old_values[v.index()].clone());
                id
            })
        };

        let mut new_ops = Vec::with_capacity(old_ops.len());
        for block in &mut self.blocks {
            for arg in &mut block.args {
                *arg = renumber(*arg, &mut remap);
            }
            let ids = std::mem::take(&mut block.ops);
            for id in ids {
                let mut op = old_ops[id.index()].clone();
                if op.dead {
                    continue;
                }
                for v in op.operands.iter_mut().chain(op.results.iter_mut()) {
                    *v = renumber(*v, &mut remap);
                }
                for succ in &mut op.successors {
                    for v in &mut succ.args {
                        *v = renumber(*v, &mut remap);
                    }
                }
                block.ops.push(OpId(new_ops.len() as u32));
                new_ops.push(op);
            }
        }
        drop(renumber);
        self.ops = new_ops;
        self.values = new_values;
    }
}

/// External function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub params: Vec<LoweredType>,
    pub result: LoweredType,
}

/// Declarations of a module, at most one per symbol.
#[derive(Debug, Clone, Default)]
pub struct ExternTable {
    decls: Vec<Declaration>,
    index: HashMap<String, usize>,
}

impl ExternTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the declaration for `name`, creating it with the given
    /// signature on first use. The flag reports whether it was created.
    pub fn get_or_insert(
        &mut self,
        name: &str,
        params: Vec<LoweredType>,
        result: LoweredType,
    ) -> (&Declaration, bool) {
        if let Some(&i) = self.index.get(name) {
            return (&self.decls[i], false);
        }
        let i = self.decls.len();
        self.decls.push(Declaration {
            name: name.to_string(),
            params,
            result,
        });
        self.index.insert(name.to_string(), i);
        (&self.decls[i], true)
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.index.get(name).map(|&i| &self.decls[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

/// The unit of conversion.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    pub externs: ExternTable,
    pub pool: ConstantPool,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            externs: ExternTable::new(),
            pool: ConstantPool::new(),
        }
    }

    pub fn add_function(&mut self, func: Function) {
        self.functions.push(func);
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Whether any abstract operation or type remains.
    pub fn is_lowered(&self) -> bool {
        self.functions.iter().all(|f| {
            f.results.iter().all(ValueType::is_lowered)
                && f.ops().all(|(_, op)| op.kind.is_lowered())
                && f.values.iter().all(ValueType::is_lowered)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_drops_dead_ops_and_renumbers() {
        let word = || ValueType::Lowered(LoweredType::Int(64));
        let mut f = Function::new("f", vec![word()], vec![word()]);
        let entry = f.entry();
        let p = f.params()[0];
        let unused = f.add_value(word());
        let a = f.add_value(word());
        let dead = f.append_op(
            entry,
            Operation::new(OpKind::Low(LowOp::Constant { value: 1 }), vec![], vec![unused]),
        );
        f.append_op(
            entry,
            Operation::new(OpKind::Low(LowOp::Binary(BinOp::Add)), vec![p, p], vec![a]),
        );
        f.append_op(entry, Operation::new(OpKind::Low(LowOp::Return), vec![a], vec![]));
        f.mark_dead(dead);
        f.compact();

        assert_eq!(f.num_values(), 2);
        let ops: Vec<_> = f.ops().map(|(_, op)| op.name()).collect();
        assert_eq!(ops, ["add", "ret"]);
        assert_eq!(f.ops().next().map(|(_, op)| op.results.clone()), Some(vec![ValueId(1)]));
    }

    #[test]
    fn extern_table_is_idempotent() {
        let mut table = ExternTable::new();
        let (_, created) = table.get_or_insert("g", vec![], LoweredType::Void);
        assert!(created);
        let (decl, created) = table.get_or_insert("g", vec![LoweredType::Int(64)], LoweredType::Void);
        assert!(!created);
        assert!(decl.params.is_empty());
        assert_eq!(table.len(), 1);
    }
}
