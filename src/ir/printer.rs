// src/ir/printer.rs

//! Textual form of modules in either dialect.
//!
//! Abstract operations print in the syntax [`parse_module`] reads, so an
//! abstract module survives a print/parse round trip.
//!
//! [`parse_module`]: super::parser::parse_module

use std::fmt::{self, Write};

use super::ops::{EirOp, LowOp, OpKind};
use super::pool::{ConstInit, ConstantPool};
use super::{Function, Module, Operation, Successor, ValueId};

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module @{}", self.name)?;
        if !self.pool.is_empty() {
            writeln!(f)?;
            for (_, global) in self.pool.iter() {
                write!(f, "global @{} : {}, align {} = ", global.name, global.ty, global.align)?;
                write_init(f, &self.pool, &global.init)?;
                writeln!(f)?;
            }
        }
        if !self.externs.is_empty() {
            writeln!(f)?;
            for decl in self.externs.iter() {
                write!(f, "declare @{}(", decl.name)?;
                write_list(f, &decl.params)?;
                writeln!(f, ") -> {}", decl.result)?;
            }
        }
        for func in &self.functions {
            writeln!(f)?;
            write_function(f, &self.pool, func)?;
        }
        Ok(())
    }
}

fn write_init(f: &mut fmt::Formatter<'_>, pool: &ConstantPool, init: &ConstInit) -> fmt::Result {
    match init {
        ConstInit::Address { global, tag } => {
            write!(f, "@{}", pool.get(*global).name)?;
            if *tag != 0 {
                write!(f, " | {tag:#x}")?;
            }
            Ok(())
        }
        ConstInit::Aggregate(fields) => {
            f.write_str("{")?;
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_init(f, pool, field)?;
            }
            f.write_str("}")
        }
        other => write!(f, "{other}"),
    }
}

fn write_function(f: &mut fmt::Formatter<'_>, pool: &ConstantPool, func: &Function) -> fmt::Result {
    write!(f, "func @{}(", func.name)?;
    write_args(f, func, func.params())?;
    f.write_str(")")?;
    if !func.results.is_empty() {
        f.write_str(" -> ")?;
        write_list(f, &func.results)?;
    }
    writeln!(f, " {{")?;
    for (b, block) in func.blocks.iter().enumerate() {
        write!(f, "^{}", block.name)?;
        if b != 0 && !block.args.is_empty() {
            f.write_str("(")?;
            write_args(f, func, &block.args)?;
            f.write_str(")")?;
        }
        writeln!(f, ":")?;
        for id in &block.ops {
            let op = func.op(*id);
            if op.is_dead() {
                continue;
            }
            let mut line = String::new();
            write_op(&mut line, pool, func, op)?;
            writeln!(f, "  {line}")?;
        }
    }
    writeln!(f, "}}")
}

fn write_args(f: &mut fmt::Formatter<'_>, func: &Function, args: &[ValueId]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        match func.value_type(*arg) {
            Some(ty) => write!(f, "{arg}: {ty}")?,
            None => write!(f, "{arg}: ?")?,
        }
    }
    Ok(())
}

fn write_list<T: fmt::Display>(f: &mut impl Write, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_successor(out: &mut String, func: &Function, succ: &Successor) -> fmt::Result {
    write!(out, "^{}", func.block(succ.block).name)?;
    if !succ.args.is_empty() {
        out.push('(');
        write_list(out, &succ.args)?;
        out.push(')');
    }
    Ok(())
}

fn write_op(out: &mut String, pool: &ConstantPool, func: &Function, op: &Operation) -> fmt::Result {
    if !op.results.is_empty() {
        write_list(out, &op.results)?;
        out.push_str(" = ");
    }
    out.push_str(op.name());

    let result_types = || {
        op.results
            .iter()
            .map(|r| func.value_type(*r).map(ToString::to_string).unwrap_or_else(|| "?".into()))
            .collect::<Vec<_>>()
    };
    let mut typed = false;

    match &op.kind {
        OpKind::Eir(eir) => match eir {
            EirOp::Constant(constant) => {
                // The constant prints its own keyword.
                out.clear();
                write_list(out, &op.results)?;
                write!(out, " = {constant}")?;
            }
            EirOp::Call { callee } => {
                write!(out, " @{callee}(")?;
                write_list(out, &op.operands)?;
                out.push(')');
                typed = true;
            }
            EirOp::GetElementPtr { index } => {
                write!(out, " {}, {index}", op.operands.first().map(ToString::to_string).unwrap_or_default())?;
                typed = true;
            }
            EirOp::IsType { match_type } => {
                out.push(' ');
                write_list(out, &op.operands)?;
                write!(out, ", {match_type}")?;
            }
            EirOp::Load | EirOp::Cast => {
                out.push(' ');
                write_list(out, &op.operands)?;
                typed = true;
            }
            _ => {
                if !op.operands.is_empty() {
                    out.push(' ');
                    write_list(out, &op.operands)?;
                }
            }
        },
        OpKind::Low(low) => match low {
            LowOp::Constant { value } => {
                write!(out, " {value:#x}")?;
                typed = true;
            }
            LowOp::FConstant { value } => write!(out, " {value:?}")?,
            LowOp::InsertValue { index } => {
                let agg = op.operands.first().map(ToString::to_string).unwrap_or_default();
                let value = op.operands.get(1).map(ToString::to_string).unwrap_or_default();
                write!(out, " {agg}[{index}], {value}")?;
            }
            LowOp::ExtractValue { index } => {
                let agg = op.operands.first().map(ToString::to_string).unwrap_or_default();
                write!(out, " {agg}[{index}]")?;
                typed = true;
            }
            LowOp::Gep { indices } => {
                let base = op.operands.first().map(ToString::to_string).unwrap_or_default();
                write!(out, " {base}[")?;
                write_list(out, indices)?;
                out.push(']');
                typed = true;
            }
            LowOp::AddressOf { global } => write!(out, " @{}", pool.get(*global).name)?,
            LowOp::Call { callee } => {
                write!(out, " @{callee}(")?;
                write_list(out, &op.operands)?;
                out.push(')');
                typed = true;
            }
            LowOp::Undef => typed = true,
            LowOp::ICmpEq | LowOp::Store | LowOp::Br | LowOp::CondBr | LowOp::Return | LowOp::Unreachable => {
                if !op.operands.is_empty() {
                    out.push(' ');
                    write_list(out, &op.operands)?;
                }
            }
            LowOp::Binary(_) | LowOp::Trunc | LowOp::PtrToInt | LowOp::IntToPtr | LowOp::Bitcast | LowOp::Load => {
                out.push(' ');
                write_list(out, &op.operands)?;
                typed = true;
            }
        },
    }

    for (i, succ) in op.successors.iter().enumerate() {
        out.push_str(if i == 0 && op.operands.is_empty() { " " } else { ", " });
        write_successor(out, func, succ)?;
    }

    if typed && !op.results.is_empty() {
        out.push_str(" : ");
        write_list(out, &result_types())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::ir::{AbstractType, FunctionBuilder, Module, ValueType};

    #[test]
    fn prints_abstract_functions() {
        let term = || ValueType::Abstract(AbstractType::Term);
        let mut b = FunctionBuilder::new("f", vec![term()], vec![term()]);
        let p = b.param(0);
        let exit = b.create_block("exit", vec![term()]);
        let t = b.is_type(p, AbstractType::boxed(AbstractType::Cons));
        b.cond_branch(t, (exit, &[p]), (exit, &[p]));
        b.switch_to(exit);
        let x = b.block_arg(exit, 0);
        b.ret(&[x]);
        let mut module = Module::new("m");
        module.add_function(b.finish());

        let text = module.to_string();
        assert!(text.contains("func @f(%0: term) -> term {"), "{text}");
        assert!(text.contains("%2 = is_type %0, box<cons>"), "{text}");
        assert!(text.contains("cond_br %2, ^exit(%0), ^exit(%0)"), "{text}");
        assert!(text.contains("^exit(%1: term):"), "{text}");
        assert!(text.contains("return %1"), "{text}");
    }
}
