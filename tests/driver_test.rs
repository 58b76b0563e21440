// tests/driver_test.rs

//! Module-level behaviour of the conversion driver: failure classes,
//! declarations, the literal pool, statistics and sharing across threads.

use bumpalo::Bump;
use termlower::interp::{Interpreter, RuntimeEvent, Value};
use termlower::ir::parser::parse_module;
use termlower::ir::{EirOpKind, LoweredType};
use termlower::lower::{ConversionPattern, MatchedOp, PatternSet, Rewrite, Rewriter};
use termlower::target::{HeaderLayout, MaskInfo};
use termlower::{ConversionDriver, LowerError, LowerResult, LoweringSession, Module, TargetInfo};

fn parse(text: &str) -> Module {
    let _ = env_logger::builder().is_test(true).try_init();
    parse_module("test", text).expect("module should parse")
}

fn lower_err(text: &str) -> LowerError {
    let target = TargetInfo::x86_64();
    match ConversionDriver::new(&target).run(parse(text)) {
        Ok(module) => panic!("expected failure, got:\n{module}"),
        Err(err) => err,
    }
}

fn function_of(err: &LowerError) -> &str {
    match err {
        LowerError::InFunction { function, .. } => function,
        other => panic!("error is not attributed to a function: {other:?}"),
    }
}

#[test]
fn test_declined_cast_has_no_legal_lowering() {
    let err = lower_err("func @f(%x: term) -> float {\n^entry:\n  %y = cast %x : float\n  return %y\n}\n");
    assert_eq!(function_of(&err), "f");
    match err.root() {
        LowerError::NoLegalLowering { op, loc } => {
            assert_eq!(*op, "cast");
            assert_eq!(loc.line, 3);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!err.root().is_internal());
}

#[test]
fn test_multi_result_calls_are_unsupported() {
    let err = lower_err(
        "func @f(%x: term) -> term {\n^entry:\n  %a, %b = call @g(%x) : term, term\n  return %a\n}\n",
    );
    assert!(matches!(err.root(), LowerError::Unsupported { op: "call", .. }), "{err}");
    assert!(err.root().is_internal());
}

#[test]
fn test_bigint_literals_are_unsupported() {
    let err = lower_err(
        "func @big() -> term {\n^entry:\n  %b = bigint 123456789012345678901234567890\n  return %b\n}\n",
    );
    assert_eq!(function_of(&err), "big");
    assert!(matches!(err.root(), LowerError::Unsupported { op: "bigint", .. }), "{err}");
}

#[test]
fn test_oversized_fixnums_are_unsupported() {
    let err = lower_err("func @f() -> term {\n^entry:\n  %i = int 9223372036854775807\n  return %i\n}\n");
    assert!(matches!(err.root(), LowerError::Unsupported { op: "int", .. }), "{err}");
}

#[test]
fn test_maps_have_no_lowered_type() {
    let err = lower_err("func @m(%x: map) -> term {\n^entry:\n  return %x\n}\n");
    assert_eq!(function_of(&err), "m");
    assert_eq!(
        err.root(),
        &LowerError::UnsupportedType {
            ty: "map".to_string()
        }
    );
}

#[test]
fn test_non_term_tuple_elements_are_unsupported() {
    let err = lower_err(
        "func @f() -> term {\n^entry:\n  %x = float 2.0\n  %t = tuple %x\n  return %t\n}\n",
    );
    assert!(matches!(err.root(), LowerError::Unsupported { op: "tuple", .. }), "{err}");
}

#[test]
fn test_failure_names_the_failing_function() {
    let err = lower_err(
        "func @good(%x: term) -> term {\n^entry:\n  return %x\n}\nfunc @bad(%x: map) -> term {\n^entry:\n  return %x\n}\n",
    );
    assert_eq!(function_of(&err), "bad");
    assert!(err.to_string().contains("bad"), "{err}");
}

#[test]
fn test_builtins_are_declared_once_per_module() {
    let text = "
func @a(%x: term) {
^entry:
  print %x, %x
  return
}
func @b(%x: term) -> i1 {
^entry:
  print %x
  %t = is_type %x, atom
  %u = is_type %x, fixnum
  return %t
}
";
    let target = TargetInfo::x86_64();
    let arena = Bump::new();
    let session = LoweringSession::new(&arena);
    let module = ConversionDriver::new(&target)
        .run_with_session(parse(text), &session)
        .unwrap();

    let symbols: Vec<_> = module.externs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(symbols, ["__rt_print", "__rt_is_type"]);
    let print = module.externs.get("__rt_print").unwrap();
    assert_eq!(print.params, vec![LoweredType::Int(64)]);

    let stats = session.stats();
    assert_eq!(stats.functions_lowered, 2);
    assert_eq!(stats.builtins_declared, 2);
    assert_eq!(stats.rewrite_counts.get("print"), Some(&2));
    assert_eq!(stats.rewrite_counts.get("is_type"), Some(&2));
    assert!(stats.to_string().contains("Lowering Session Statistics"));

    let mut interp = Interpreter::new(&module, &target).unwrap();
    let atom = target.encode_immediate(termlower::TermKind::Atom, 4);
    interp.call("a", vec![Value::Int(atom)]).unwrap();
    assert_eq!(interp.printed(), ["atom#4", "atom#4"]);
}

#[test]
fn test_external_callees_are_declared_from_the_first_call() {
    let text = "
func @caller(%x: term) -> term {
^entry:
  %r = call @callee(%x) : term
  call @local(%r)
  return %r
}
func @local(%y: term) {
^entry:
  yield
  return
}
";
    let target = TargetInfo::wasm32();
    let module = ConversionDriver::new(&target).run(parse(text)).unwrap();
    let callee = module.externs.get("callee").unwrap();
    assert_eq!(callee.params, vec![LoweredType::Int(32)]);
    assert_eq!(callee.result, LoweredType::Int(32));
    assert!(module.externs.get("local").is_none());
    assert!(module.externs.get("__rt_yield").is_some());
    assert!(module.is_lowered());
}

#[test]
fn test_binaries_are_pooled_per_module() {
    let text = "
func @one() -> term {
^entry:
  %b = binary \"hello\"
  return %b
}
func @two() -> term {
^entry:
  %b = binary \"hello\"
  return %b
}
";
    let target = TargetInfo::x86_64();
    let driver = ConversionDriver::new(&target);
    let first = driver.run(parse(text)).unwrap();
    let second = driver.run(parse(text)).unwrap();

    // The bytes and one descriptor, shared by both functions.
    assert_eq!(first.pool.len(), 2);
    let mut interp = Interpreter::new(&first, &target).unwrap();
    let a = interp.call("one", Vec::new()).unwrap();
    let b = interp.call("two", Vec::new()).unwrap();
    assert_eq!(a, b);
    let term = a[0].as_int().unwrap();
    assert_eq!(interp.binary_bytes(term).unwrap(), b"hello");

    // Separate modules get their own globals with the same content names.
    let names = |m: &Module| m.pool.iter().map(|(_, g)| g.name.clone()).collect::<Vec<_>>();
    assert_eq!(names(&first), names(&second));
    assert!(names(&first).iter().all(|n| n.starts_with("lit.") && n.len() == 20));
}

#[test]
fn test_pooled_literals_keep_tag_bits_clear() {
    let text = "
func @lits() -> term, term, term {
^entry:
  %b = binary \"abcde\"
  %t = const_tuple [int 1, binary \"xyz\", float 2.5]
  %l = const_list [int 1, int 2, int 3]
  return %b, %t, %l
}
";
    let target = TargetInfo::wasm32();
    assert_eq!(target.pool_alignment(), 8);
    let module = ConversionDriver::new(&target).run(parse(text)).unwrap();
    let mut interp = Interpreter::new(&module, &target).unwrap();
    for (id, global) in module.pool.iter() {
        assert_eq!(global.align, 8, "{}", global.name);
        assert_eq!(interp.global_address(id) % 8, 0, "{}", global.name);
    }
    let terms = interp.call("lits", Vec::new()).unwrap();
    let tuple = terms[1].as_int().unwrap();
    assert_eq!(tuple & 0b111, target.box_tag() | target.literal_tag());
    assert_eq!(interp.render(terms[2].as_int().unwrap()).unwrap(), "[1, 2, 3]");
}

#[test]
fn test_binaries_longer_than_the_header_arity_are_unsupported() {
    let target = TargetInfo::builder(64)
        .header_layout(HeaderLayout {
            arity: MaskInfo {
                shift: 8,
                mask: 0xFF << 8,
            },
            ..HeaderLayout::standard(64)
        })
        .build()
        .unwrap();
    assert_eq!(target.max_arity(), 255);
    let module_with = |literal: String| {
        parse(&format!("func @f() -> term {{\n^entry:\n  %b = {literal}\n  return %b\n}}\n"))
    };
    let driver = ConversionDriver::new(&target);

    let fits = driver.run(module_with(format!("binary \"{}\"", "a".repeat(255)))).unwrap();
    assert_eq!(fits.pool.len(), 2);

    let err = driver
        .run(module_with(format!("binary \"{}\"", "a".repeat(256))))
        .unwrap_err();
    assert!(matches!(err.root(), LowerError::Unsupported { op: "binary", .. }), "{err}");

    let err = driver
        .run(module_with(format!("const_tuple [binary \"{}\"]", "b".repeat(300))))
        .unwrap_err();
    assert!(matches!(err.root(), LowerError::Unsupported { op: "const_tuple", .. }), "{err}");
}

#[test]
fn test_effects_reach_the_runtime() {
    let text = "
func @main() -> term {
^entry:
  yield
  %t = trace_capture
  %s = trace_construct %t
  print
  return %s
}
";
    let target = TargetInfo::x86_64();
    let module = ConversionDriver::new(&target).run(parse(text)).unwrap();
    let mut interp = Interpreter::new(&module, &target).unwrap();
    interp.call("main", Vec::new()).unwrap();
    assert_eq!(
        interp.events(),
        [RuntimeEvent::Yield, RuntimeEvent::TraceCapture, RuntimeEvent::TraceConstruct]
    );
}

/// Declines every cast so the standard pattern has to take over.
struct Reluctant;

impl ConversionPattern for Reluctant {
    fn name(&self) -> &'static str {
        "reluctant"
    }

    fn match_and_rewrite(&self, _op: &MatchedOp<'_>, rw: &mut Rewriter<'_, '_>) -> LowerResult<Rewrite> {
        // Emitted work is discarded with the decline.
        rw.word(0xdead);
        Ok(Rewrite::Declined)
    }
}

#[test]
fn test_declined_patterns_fall_through() {
    let text = "
func @head(%l: term) -> term {
^entry:
  %p = cast %l : box<cons>
  %h = gep %p, 0 : ref<term>
  %v = load %h : term
  return %v
}
";
    let target = TargetInfo::x86_64();
    let mut patterns = PatternSet::standard();
    patterns.prepend(EirOpKind::Cast, Box::new(Reluctant));
    let driver = ConversionDriver::with_patterns(&target, patterns);

    let arena = Bump::new();
    let session = LoweringSession::new(&arena);
    let module = driver.run_with_session(parse(text), &session).unwrap();
    assert_eq!(session.stats().declines, 1);
    let printed = module.to_string();
    assert!(!printed.contains("0xdead"), "{printed}");
}

#[test]
fn test_empty_pattern_set_reports_every_op() {
    let target = TargetInfo::x86_64();
    let driver = ConversionDriver::with_patterns(&target, PatternSet::empty());
    let err = driver
        .run(parse("func @f(%x: term) -> term {\n^entry:\n  return %x\n}\n"))
        .unwrap_err();
    assert!(matches!(err.root(), LowerError::NoLegalLowering { op: "return", .. }));
}

#[test]
fn test_driver_is_shared_across_threads() {
    let target = TargetInfo::wasm32();
    let driver = ConversionDriver::new(&target);
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let driver = &driver;
                scope.spawn(move || {
                    let text = format!(
                        "func @f{i}(%x: term) -> term {{\n^entry:\n  %t = const_tuple [int {i}, atom 1]\n  %u = tuple %t, %x\n  return %u\n}}\n"
                    );
                    driver.run(parse(&text)).map(|m| m.pool.len())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for result in results {
        assert_eq!(result.unwrap(), 1);
    }
}

#[test]
fn test_lowered_modules_print_declarations_and_globals() {
    let text = "
func @f() -> term {
^entry:
  %b = binary \"hi\"
  print %b
  return %b
}
";
    let target = TargetInfo::x86_64();
    let module = ConversionDriver::new(&target).run(parse(text)).unwrap();
    let printed = module.to_string();
    assert!(printed.contains("declare @__rt_print(i64) -> i64"), "{printed}");
    assert!(printed.contains("global @lit."), "{printed}");
    assert!(printed.contains(", align 8 = "), "{printed}");
    assert!(printed.contains("addressof @lit."), "{printed}");
    assert!(printed.contains("call @__rt_print("), "{printed}");
    assert!(!printed.contains("binary \"hi\""), "{printed}");
}
