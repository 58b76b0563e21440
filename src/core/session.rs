// This module provides the arena-backed lowering session. A LoweringSession borrows a bumpalo
// arena for the duration of one pass invocation and hands out arena slices for per-function
// block layouts (the reverse post-order the driver walks), so the driver can hold the layout
// while it mutates the function's own block lists. The session also interns function names
// and accumulates SessionStats: functions lowered, operations rewritten broken down by
// operation name, pattern declines, builtin declarations created and literal-pool globals
// created. Sessions use interior mutability and are therefore per-thread; run one session per
// module when converting modules concurrently.

//! Arena-based lowering session and statistics.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::{Cell, RefCell};
use std::fmt;

use crate::ir::BlockId;

/// Per-invocation state shared by the driver and the patterns.
pub struct LoweringSession<'arena> {
    arena: &'arena Bump,
    stats: RefCell<SessionStats>,
    interned_strings: RefCell<HashMap<String, &'arena str>>,
    current_function: Cell<Option<&'arena str>>,
}

impl<'arena> LoweringSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            current_function: Cell::new(None),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Copy a block layout into the arena.
    pub fn alloc_layout(&self, blocks: &[BlockId]) -> &'arena [BlockId] {
        self.arena.alloc_slice_copy(blocks)
    }

    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }
        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    pub fn begin_function(&self, name: &str) {
        self.current_function.set(Some(self.intern_str(name)));
    }

    pub fn current_function(&self) -> Option<&'arena str> {
        self.current_function.get()
    }

    pub fn record_function_lowered(&self, ops_emitted: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_lowered += 1;
        stats.ops_emitted += ops_emitted;
        if ops_emitted > stats.largest_function_ops {
            stats.largest_function_ops = ops_emitted;
            stats.largest_function_name = self.current_function().unwrap_or_default().to_string();
        }
        self.current_function.set(None);
    }

    pub fn record_rewrite(&self, op_name: &'static str) {
        let mut stats = self.stats.borrow_mut();
        stats.ops_rewritten += 1;
        *stats.rewrite_counts.entry(op_name).or_insert(0) += 1;
    }

    pub fn record_decline(&self, pattern: &'static str) {
        self.stats.borrow_mut().declines += 1;
        log::debug!("pattern `{pattern}` declined");
    }

    pub fn record_builtin_declared(&self, symbol: &str) {
        self.stats.borrow_mut().builtins_declared += 1;
        log::debug!("declared builtin {symbol}");
    }

    pub fn record_global_created(&self) {
        self.stats.borrow_mut().globals_created += 1;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Lowering statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub functions_lowered: usize,
    pub ops_rewritten: usize,
    /// Lowered operations present after conversion.
    pub ops_emitted: usize,
    pub rewrite_counts: HashMap<&'static str, usize>,
    pub declines: usize,
    pub builtins_declared: usize,
    pub globals_created: usize,
    pub largest_function_ops: usize,
    pub largest_function_name: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Lowering Session Statistics:")?;
        writeln!(f, "  Functions lowered: {}", self.functions_lowered)?;
        writeln!(f, "  Operations rewritten: {}", self.ops_rewritten)?;
        writeln!(f, "  Operations emitted: {}", self.ops_emitted)?;
        writeln!(f, "  Pattern declines: {}", self.declines)?;
        writeln!(f, "  Builtins declared: {}", self.builtins_declared)?;
        writeln!(f, "  Literal globals: {}", self.globals_created)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} ops)",
                self.largest_function_name, self.largest_function_ops
            )?;
        }

        if !self.rewrite_counts.is_empty() {
            writeln!(f, "  Rewrite breakdown:")?;
            let mut sorted: Vec<_> = self.rewrite_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (name, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", name, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let arena = Bump::new();
        let session = LoweringSession::new(&arena);
        let stats = session.stats();
        assert_eq!(stats.functions_lowered, 0);
        assert_eq!(stats.ops_rewritten, 0);
        assert!(session.current_function().is_none());
    }

    #[test]
    fn test_layout_allocation() {
        let arena = Bump::new();
        let session = LoweringSession::new(&arena);
        let layout = session.alloc_layout(&[BlockId(0), BlockId(2), BlockId(1)]);
        assert_eq!(layout, &[BlockId(0), BlockId(2), BlockId(1)]);
    }

    #[test]
    fn test_string_interning() {
        let arena = Bump::new();
        let session = LoweringSession::new(&arena);
        let s1 = session.intern_str("main");
        let s2 = session.intern_str("main");
        let s3 = session.intern_str("other");
        assert_eq!(s1.as_ptr(), s2.as_ptr());
        assert_ne!(s1.as_ptr(), s3.as_ptr());
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let session = LoweringSession::new(&arena);

        session.begin_function("f");
        session.record_rewrite("tuple");
        session.record_rewrite("is_type");
        session.record_rewrite("tuple");
        session.record_decline("float.native");
        session.record_builtin_declared("__rt_alloc");
        session.record_global_created();
        session.record_function_lowered(17);

        let stats = session.stats();
        assert_eq!(stats.functions_lowered, 1);
        assert_eq!(stats.ops_rewritten, 3);
        assert_eq!(stats.rewrite_counts.get("tuple"), Some(&2));
        assert_eq!(stats.declines, 1);
        assert_eq!(stats.largest_function_name, "f");

        let report = stats.to_string();
        assert!(report.contains("Functions lowered: 1"));
        assert!(report.contains("tuple: 2"));
    }
}
