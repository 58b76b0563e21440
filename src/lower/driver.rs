// This module implements the conversion driver. For each function it first converts the
// result types and every block argument (the entry block's arguments are the parameters), so
// a value flowing along an edge has its lowered type before any consumer is visited. Blocks
// are then walked in reverse post-order, computed with an explicit stack, and each abstract
// operation is offered to the candidate patterns of its kind in priority order. The first
// pattern that does not decline replaces the operation: its emitted operations are spliced
// into the block, the original is marked dead and its results are mapped to the replacement
// values. Lowered operations already present only have their operands remapped. After the walk the function is compacted and
// checked for legality: any surviving abstract operation or abstract-typed value fails the
// whole module. The driver holds no mutable state and can be shared across threads.

//! Whole-module conversion.

use bumpalo::Bump;
use hashbrown::{HashMap, HashSet};
use log::{debug, trace, warn};

use crate::core::{LowerError, LowerResult, LoweringSession};
use crate::ir::{
    BlockId, ConstantPool, ExternTable, Function, Module, OpId, OpKind, Successor, ValueId,
    ValueType,
};
use crate::target::TargetInfo;

use super::patterns::{MatchedOp, PatternSet, Rewrite};
use super::{Rewriter, TypeConverter};

/// Applies a [`PatternSet`] to whole modules.
pub struct ConversionDriver<'t> {
    target: &'t TargetInfo,
    patterns: PatternSet,
}

/// Module-wide state borrowed by every function conversion.
struct ModuleContext<'m, 's> {
    externs: &'m mut ExternTable,
    pool: &'m mut ConstantPool,
    defined: &'m HashSet<String>,
    session: &'m LoweringSession<'s>,
}

impl<'t> ConversionDriver<'t> {
    pub fn new(target: &'t TargetInfo) -> Self {
        Self::with_patterns(target, PatternSet::standard())
    }

    pub fn with_patterns(target: &'t TargetInfo, patterns: PatternSet) -> Self {
        Self { target, patterns }
    }

    pub fn target(&self) -> &'t TargetInfo {
        self.target
    }

    pub fn patterns_mut(&mut self) -> &mut PatternSet {
        &mut self.patterns
    }

    /// Lower `module` completely or fail. On failure the module is consumed.
    pub fn run(&self, module: Module) -> LowerResult<Module> {
        let arena = Bump::new();
        let session = LoweringSession::new(&arena);
        self.run_with_session(module, &session)
    }

    /// As [`run`](Self::run), recording statistics into `session`.
    pub fn run_with_session(&self, mut module: Module, session: &LoweringSession<'_>) -> LowerResult<Module> {
        debug!(
            "lowering module `{}` ({} functions) for {}",
            module.name,
            module.functions.len(),
            self.target.triple()
        );
        let defined: HashSet<String> = module.functions.iter().map(|f| f.name.clone()).collect();
        let converter = TypeConverter::new(self.target);
        let Module {
            functions,
            externs,
            pool,
            ..
        } = &mut module;
        let mut cx = ModuleContext {
            externs,
            pool,
            defined: &defined,
            session,
        };

        for func in functions.iter_mut() {
            self.convert_function(func, &mut cx, converter)
                .map_err(|err| err.in_function(&func.name))?;
        }
        Ok(module)
    }

    fn convert_function(
        &self,
        func: &mut Function,
        cx: &mut ModuleContext<'_, '_>,
        converter: TypeConverter<'_>,
    ) -> LowerResult<()> {
        cx.session.begin_function(&func.name);
        debug!("lowering function `{}`", func.name);

        func.results = func
            .results
            .iter()
            .map(|ty| converter.convert_value_type(ty).map(ValueType::from))
            .collect::<LowerResult<_>>()?;

        let mut mapping: HashMap<ValueId, ValueId> = HashMap::new();
        for b in 0..func.blocks.len() {
            let args = func.blocks[b].args.clone();
            let mut lowered_args = Vec::with_capacity(args.len());
            for arg in args {
                let ty = func
                    .value_type(arg)
                    .cloned()
                    .ok_or(LowerError::UnmappedValue { value: arg.0 })?;
                let new = if ty.is_lowered() {
                    arg
                } else {
                    let lowered = converter.convert_value_type(&ty)?;
                    func.add_value(lowered.into())
                };
                mapping.insert(arg, new);
                lowered_args.push(new);
            }
            func.blocks[b].args = lowered_args;
        }

        let layout = cx.session.alloc_layout(&block_order(func));
        for &block in layout {
            let ids = func.block(block).ops.clone();
            let mut spliced = Vec::with_capacity(ids.len());
            for id in ids {
                let op = func.op(id).clone();
                let operands = op
                    .operands
                    .iter()
                    .map(|&v| lookup(&mapping, v))
                    .collect::<LowerResult<Vec<_>>>()?;
                let successors = op
                    .successors
                    .iter()
                    .map(|s| {
                        let args = s
                            .args
                            .iter()
                            .map(|&v| lookup(&mapping, v))
                            .collect::<LowerResult<Vec<_>>>()?;
                        Ok(Successor::new(s.block, args))
                    })
                    .collect::<LowerResult<Vec<_>>>()?;

                let eir = match &op.kind {
                    OpKind::Low(_) => {
                        for &r in &op.results {
                            mapping.insert(r, r);
                        }
                        let kept = func.op_mut(id);
                        kept.operands = operands;
                        kept.successors = successors;
                        spliced.push(id);
                        continue;
                    }
                    OpKind::Eir(eir) => eir,
                };

                let result_types = op
                    .results
                    .iter()
                    .map(|&r| {
                        func.value_type(r)
                            .cloned()
                            .ok_or(LowerError::UnmappedValue { value: r.0 })
                    })
                    .collect::<LowerResult<Vec<_>>>()?;
                let matched = MatchedOp {
                    op: eir,
                    operands,
                    successors,
                    result_types: &result_types,
                    loc: op.loc,
                };

                let (values, emitted) = self.apply(&matched, func, cx, converter)?;
                if values.len() != op.results.len() {
                    return Err(LowerError::MalformedIr {
                        reason: format!(
                            "`{}` at {} was replaced by {} values for {} results",
                            matched.name(),
                            op.loc,
                            values.len(),
                            op.results.len()
                        ),
                    });
                }
                for (&old, &new) in op.results.iter().zip(&values) {
                    mapping.insert(old, new);
                }
                func.mark_dead(id);
                spliced.extend(emitted);
                cx.session.record_rewrite(matched.name());
            }
            func.block_mut(block).ops = spliced;
        }

        func.compact();
        check_legality(func)?;
        cx.session.record_function_lowered(func.ops().count());
        Ok(())
    }

    /// Offer `matched` to each candidate until one replaces it.
    fn apply(
        &self,
        matched: &MatchedOp<'_>,
        func: &mut Function,
        cx: &mut ModuleContext<'_, '_>,
        converter: TypeConverter<'_>,
    ) -> LowerResult<(Vec<ValueId>, Vec<OpId>)> {
        let kind = matched.op.kind();
        for pattern in self.patterns.candidates(kind) {
            let mut rw = Rewriter::new(
                func,
                cx.externs,
                cx.pool,
                cx.defined,
                converter,
                cx.session,
                matched.loc,
            );
            let outcome = pattern.match_and_rewrite(matched, &mut rw)?;
            let emitted = rw.finish();
            match outcome {
                Rewrite::Replaced(values) => {
                    trace!(
                        "{} at {} -> {} ops via {}",
                        kind.name(),
                        matched.loc,
                        emitted.len(),
                        pattern.name()
                    );
                    return Ok((values, emitted));
                }
                Rewrite::Declined => {
                    for id in emitted {
                        func.mark_dead(id);
                    }
                    cx.session.record_decline(pattern.name());
                }
            }
        }
        warn!("no pattern lowered `{}` at {}", kind.name(), matched.loc);
        Err(LowerError::NoLegalLowering {
            op: kind.name(),
            loc: matched.loc,
        })
    }
}

fn lookup(mapping: &HashMap<ValueId, ValueId>, value: ValueId) -> LowerResult<ValueId> {
    mapping
        .get(&value)
        .copied()
        .ok_or(LowerError::UnmappedValue { value: value.0 })
}

/// Reverse post-order from the entry block, then unreachable blocks in
/// index order.
fn block_order(func: &Function) -> Vec<BlockId> {
    let mut post = Vec::with_capacity(func.blocks.len());
    let mut stack = vec![(func.entry(), false)];
    let mut visited = HashSet::new();
    while let Some((block, processed)) = stack.pop() {
        if processed {
            post.push(block);
            continue;
        }
        if !visited.insert(block) {
            continue;
        }
        stack.push((block, true));
        for succ in func.successors(block).into_iter().rev() {
            stack.push((succ, false));
        }
    }
    post.reverse();
    for b in 0..func.blocks.len() {
        let block = BlockId(b as u32);
        if !visited.contains(&block) {
            post.push(block);
        }
    }
    post
}

fn check_legality(func: &Function) -> LowerResult<()> {
    for (_, op) in func.ops() {
        if !op.kind.is_lowered() {
            return Err(LowerError::IllegalOperation {
                op: op.name(),
                loc: op.loc,
            });
        }
        for &result in &op.results {
            if !func.value_type(result).is_some_and(ValueType::is_lowered) {
                return Err(LowerError::IllegalOperation {
                    op: op.name(),
                    loc: op.loc,
                });
            }
        }
    }
    if let Some((value, _)) = func.values().find(|(_, ty)| !ty.is_lowered()) {
        return Err(LowerError::MalformedIr {
            reason: format!("value {value} keeps an abstract type"),
        });
    }
    Ok(())
}
