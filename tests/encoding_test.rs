// tests/encoding_test.rs

//! End-to-end checks of the term encoding.
//!
//! Each test lowers a small abstract module, runs it on the reference
//! evaluator and inspects the resulting words and heap cells.

use termlower::interp::{Interpreter, Value};
use termlower::ir::parser::parse_module;
use termlower::{ConversionDriver, Module, TargetInfo, TermKind};

fn lower(text: &str, target: &TargetInfo) -> Module {
    let _ = env_logger::builder().is_test(true).try_init();
    let module = parse_module("test", text).expect("module should parse");
    ConversionDriver::new(target)
        .run(module)
        .expect("module should lower")
}

fn targets() -> Vec<TargetInfo> {
    vec![
        TargetInfo::x86_64(),
        TargetInfo::wasm32(),
        TargetInfo::builder(64)
            .triple("hightag64")
            .high_tag_immediates()
            .build()
            .expect("high-tag layout is valid"),
    ]
}

fn int(value: &Value) -> u64 {
    value.as_int().expect("expected a word")
}

fn params(n: usize) -> String {
    (0..n)
        .map(|i| format!("%p{i}: term"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn operands(n: usize) -> String {
    (0..n).map(|i| format!("%p{i}")).collect::<Vec<_>>().join(", ")
}

#[test]
fn test_unbox_inverts_make_box() {
    let text = "
func @first(%a: term, %b: term) -> term {
^entry:
  %t = tuple %a, %b
  %p = cast %t : box<tuple<term, term>>
  %f = gep %p, 2 : ref<term>
  %v = load %f : term
  return %v
}
";
    for target in targets() {
        let module = lower(text, &target);
        let mut interp = Interpreter::new(&module, &target).unwrap();
        let a = target.encode_immediate(TermKind::Fixnum, 1);
        let b = target.encode_immediate(TermKind::Fixnum, 2);
        let result = interp.call("first", vec![Value::Int(a), Value::Int(b)]).unwrap();
        assert_eq!(result, vec![Value::Int(b)], "target {}", target.triple());
    }
}

#[test]
fn test_unbox_list_inverts_make_list() {
    let text = "
func @split(%h: term, %t: term) -> term, term {
^entry:
  %c = cons %h, %t
  %p = cast %c : box<cons>
  %hp = gep %p, 0 : ref<term>
  %tp = gep %p, 1 : ref<term>
  %head = load %hp : term
  %tail = load %tp : term
  return %head, %tail
}
";
    for target in targets() {
        let module = lower(text, &target);
        let mut interp = Interpreter::new(&module, &target).unwrap();
        let h = target.encode_immediate(TermKind::Atom, 9);
        let t = target.nil_value();
        let result = interp.call("split", vec![Value::Int(h), Value::Int(t)]).unwrap();
        assert_eq!(result, vec![Value::Int(h), Value::Int(t)], "target {}", target.triple());
    }
}

#[test]
fn test_type_tests_are_mutually_exclusive() {
    let tests = [
        ("is_cons", "box<cons>"),
        ("is_pair", "box<tuple<term, term>>"),
        ("is_binary", "binary"),
        ("is_fixnum", "fixnum"),
        ("is_atom", "atom"),
        ("is_nil", "nil"),
    ];
    let mut text = String::from(
        "
func @samples(%x: term) -> term, term, term, term, term, term {
^entry:
  %l = nil
  %c = cons %x, %l
  %t = tuple %x, %x
  %s = binary \"bin\"
  %f = int 7
  %a = atom 3
  return %c, %t, %s, %f, %a, %l
}
",
    );
    for (name, ty) in tests {
        text.push_str(&format!(
            "func @{name}(%x: term) -> i1 {{\n^entry:\n  %r = is_type %x, {ty}\n  return %r\n}}\n"
        ));
    }

    for target in targets() {
        let module = lower(&text, &target);
        let mut interp = Interpreter::new(&module, &target).unwrap();
        let seed = target.encode_immediate(TermKind::Fixnum, 5);
        let samples = interp.call("samples", vec![Value::Int(seed)]).unwrap();
        assert_eq!(samples.len(), tests.len());

        for (i, sample) in samples.iter().enumerate() {
            for (j, (name, _)) in tests.iter().enumerate() {
                let result = interp.call(name, vec![sample.clone()]).unwrap();
                assert_eq!(
                    result,
                    vec![Value::Int(u64::from(i == j))],
                    "{name} on sample {i} for {}",
                    target.triple()
                );
            }
        }
    }
}

#[test]
fn test_boxed_cons_test_is_inline() {
    let target = TargetInfo::x86_64();
    let module = lower(
        "func @f(%x: term) -> i1 {\n^entry:\n  %r = is_type %x, box<cons>\n  return %r\n}\n",
        &target,
    );
    assert!(module.externs.is_empty());
    let names: Vec<_> = module.functions[0].ops().map(|(_, op)| op.name()).collect();
    assert_eq!(names, ["const", "and", "const", "icmp.eq", "ret"]);
}

#[test]
fn test_list_type_accepts_nil_and_cells() {
    let text = "
func @is_list(%x: term) -> i1 {
^entry:
  %r = is_type %x, list
  return %r
}
func @cell(%x: term) -> term {
^entry:
  %n = nil
  %c = cons %x, %n
  return %c
}
";
    let target = TargetInfo::x86_64();
    let module = lower(text, &target);
    let mut interp = Interpreter::new(&module, &target).unwrap();
    let one = Value::Int(target.encode_immediate(TermKind::Fixnum, 1));
    let cell = interp.call("cell", vec![one.clone()]).unwrap().remove(0);
    for (value, expected) in [(Value::Int(target.nil_value()), 1), (cell, 1), (one, 0)] {
        assert_eq!(interp.call("is_list", vec![value]).unwrap(), vec![Value::Int(expected)]);
    }
}

#[test]
fn test_immediates_round_trip() {
    for target in targets() {
        for value in [0i64, 1, -1, 42, -42, 1 << 20, -(1 << 20)] {
            let word = target.encode_immediate(TermKind::Fixnum, value as u64);
            assert_eq!(
                target.decode_immediate(word),
                Some((TermKind::Fixnum, value as u64)),
                "{value} on {}",
                target.triple()
            );
        }
        for id in [0u64, 1, 77] {
            let word = target.encode_immediate(TermKind::Atom, id);
            assert_eq!(target.decode_immediate(word), Some((TermKind::Atom, id)));
        }
    }
}

#[test]
fn test_cond_br_follows_boolean_atoms() {
    let text = "
func @branch(%c: term) -> term {
^entry:
  cond_br %c, ^yes, ^no
^yes:
  %a = int 1
  return %a
^no:
  %b = int 0
  return %b
}
";
    for target in targets() {
        let module = lower(text, &target);
        let mut interp = Interpreter::new(&module, &target).unwrap();
        for (flag, expected) in [(true, 1), (false, 0)] {
            let cond = target.encode_immediate(TermKind::Atom, u64::from(flag));
            let result = interp.call("branch", vec![Value::Int(cond)]).unwrap();
            assert_eq!(
                target.decode_immediate(int(&result[0])),
                Some((TermKind::Fixnum, expected)),
                "{flag} on {}",
                target.triple()
            );
        }
    }
}

#[test]
fn test_cond_br_on_bool_literal() {
    let text = "
func @pick() -> term {
^entry:
  %c = bool false
  cond_br %c, ^yes, ^no
^yes:
  %a = atom 10
  return %a
^no:
  %b = atom 20
  return %b
}
";
    let target = TargetInfo::wasm32();
    let module = lower(text, &target);
    let mut interp = Interpreter::new(&module, &target).unwrap();
    let result = interp.call("pick", Vec::new()).unwrap();
    assert_eq!(result, vec![Value::Int(target.encode_immediate(TermKind::Atom, 20))]);
}

#[test]
fn test_runtime_tuples_carry_their_arity() {
    for target in targets() {
        let ptr = target.pointer_size_in_bytes();
        for n in [0usize, 1, 8] {
            let text = format!(
                "func @make({}) -> term {{\n^entry:\n  %t = tuple {}\n  return %t\n}}\n",
                params(n),
                operands(n)
            );
            let module = lower(&text, &target);
            let mut interp = Interpreter::new(&module, &target).unwrap();
            let args: Vec<_> = (0..n)
                .map(|i| Value::Int(target.encode_immediate(TermKind::Fixnum, i as u64 * 3)))
                .collect();
            let tuple = int(&interp.call("make", args.clone()).unwrap()[0]);

            assert_eq!(tuple & 0b111, target.box_tag());
            assert_eq!(
                interp.boxed_header(tuple).unwrap(),
                Some((TermKind::Tuple, n as u64)),
                "arity {n} on {}",
                target.triple()
            );
            let base = interp.unbox(tuple);
            for (i, arg) in args.iter().enumerate() {
                assert_eq!(interp.read_word(base + (i as u64 + 1) * ptr).unwrap(), int(arg));
            }
        }
    }
}

#[test]
fn test_tuple_type_test_checks_the_arity() {
    let tuple_of = |n: usize| format!("box<tuple<{}>>", vec!["term"; n].join(", "));
    for target in targets() {
        for n in [0usize, 1, 8] {
            let text = format!(
                "func @check({}) -> i1, i1 {{\n^entry:\n  %t = tuple {}\n  %same = is_type %t, {}\n  %wider = is_type %t, {}\n  return %same, %wider\n}}\n",
                params(n),
                operands(n),
                tuple_of(n),
                tuple_of(n + 1)
            );
            let module = lower(&text, &target);
            let mut interp = Interpreter::new(&module, &target).unwrap();
            let args = vec![Value::Int(target.encode_immediate(TermKind::Atom, 9)); n];
            assert_eq!(
                interp.call("check", args).unwrap(),
                vec![Value::Int(1), Value::Int(0)],
                "arity {n} on {}",
                target.triple()
            );
        }
    }
}

#[test]
fn test_tuple_literal_points_into_the_pool() {
    let text = "
func @lit() -> term {
^entry:
  %t = const_tuple [atom 5, int 42]
  return %t
}
";
    for target in [TargetInfo::x86_64(), TargetInfo::wasm32()] {
        let module = lower(text, &target);
        let mut interp = Interpreter::new(&module, &target).unwrap();
        let term = int(&interp.call("lit", Vec::new()).unwrap()[0]);

        assert_eq!(term & 0b111, 0b011);
        let base = interp.unbox(term);
        let ptr = target.pointer_size_in_bytes();
        let header = interp.read_word(base).unwrap();
        assert_eq!(target.decode_header(header), Some((TermKind::Tuple, 2)));
        assert_eq!(
            interp.read_word(base + ptr).unwrap(),
            target.encode_immediate(TermKind::Atom, 5)
        );
        assert_eq!(
            interp.read_word(base + 2 * ptr).unwrap(),
            target.encode_immediate(TermKind::Fixnum, 42)
        );
        assert_eq!(module.pool.len(), 1);
    }
}

#[test]
fn test_list_literal_shapes() {
    let text = "
func @lists() -> nil, cons, cons, list {
^entry:
  %e = const_list []
  %one = const_list [int 1]
  %two = const_list [int 1, int 2]
  %three = const_list [int 1, int 2, int 3]
  return %e, %one, %two, %three
}
";
    let target = TargetInfo::x86_64();
    let module = lower(text, &target);
    let mut interp = Interpreter::new(&module, &target).unwrap();
    let results = interp.call("lists", Vec::new()).unwrap();
    let fix = |v: u64| Value::Int(target.encode_immediate(TermKind::Fixnum, v));
    let nil = Value::Int(target.nil_value());

    assert_eq!(results[0], nil);
    assert_eq!(results[1], Value::Aggregate(vec![fix(1), nil.clone()]));
    assert_eq!(results[2], Value::Aggregate(vec![fix(1), fix(2)]));

    // Three pool cells linked head to tail, ending in Nil.
    assert_eq!(module.pool.len(), 3);
    let mut cell = int(&results[3]);
    for expected in 1..=3 {
        assert!(interp.is_list_cell(cell));
        let addr = interp.unbox_list(cell);
        assert_eq!(Value::Int(interp.read_word(addr).unwrap()), fix(expected));
        cell = interp.read_word(addr + 8).unwrap();
    }
    assert_eq!(cell, target.nil_value());
    assert_eq!(interp.render(int(&results[3])).unwrap(), "[1, 2, 3]");
}

#[test]
fn test_floats_follow_the_target() {
    let text = "func @f() -> float {\n^entry:\n  %x = float 1.5\n  return %x\n}\n";

    let native = TargetInfo::x86_64();
    let module = lower(text, &native);
    let mut interp = Interpreter::new(&module, &native).unwrap();
    assert_eq!(interp.call("f", Vec::new()).unwrap(), vec![Value::Float(1.5)]);

    let packed = TargetInfo::wasm32();
    let module = lower(text, &packed);
    let mut interp = Interpreter::new(&module, &packed).unwrap();
    let header = packed.encode_header(TermKind::Float, 2);
    assert_eq!(
        interp.call("f", Vec::new()).unwrap(),
        vec![Value::Aggregate(vec![Value::Int(header), Value::Float(1.5)])]
    );
}

#[test]
fn test_boxed_float_reads_through_its_descriptor() {
    let text = "
func @unbox_float() -> f64 {
^entry:
  %t = const_tuple [float 1.5]
  %p = cast %t : box<tuple<term>>
  %e = gep %p, 1 : ref<term>
  %x = load %e : term
  %b = cast %x : box<float>
  %v = gep %b, 1 : ref<float>
  %f = load %v : f64
  return %f
}
";
    for target in [TargetInfo::x86_64(), TargetInfo::wasm32()] {
        let module = lower(text, &target);
        let mut interp = Interpreter::new(&module, &target).unwrap();
        assert_eq!(
            interp.call("unbox_float", Vec::new()).unwrap(),
            vec![Value::Float(1.5)],
            "target {}",
            target.triple()
        );
    }
}

#[test]
fn test_structural_equality_of_runtime_and_literal_terms() {
    let text = "
func @eq(%a: term) -> i1 {
^entry:
  %x = atom 1
  %lit = const_tuple [atom 1, binary \"abc\"]
  %s = binary \"abc\"
  %t = tuple %x, %s
  %r = cmpeq %t, %lit
  return %r
}
";
    let target = TargetInfo::x86_64();
    let module = lower(text, &target);
    let mut interp = Interpreter::new(&module, &target).unwrap();
    let result = interp.call("eq", vec![Value::Int(target.nil_value())]).unwrap();
    assert_eq!(result, vec![Value::Int(1)]);
}
