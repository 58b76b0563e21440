// src/ir/parser.rs

//! Parser for the textual abstract dialect.
//!
//! ```text
//! ; comment
//! func @pick(%x: term) -> term {
//! ^entry:
//!   %t = is_type %x, box<cons>
//!   cond_br %t, ^yes, ^no(%x)
//! ^yes:
//!   %a = atom 1
//!   return %a
//! ^no(%y: term):
//!   %p = const_tuple [atom 2, int 42, binary "hi"]
//!   return %p
//! }
//! ```
//!
//! An optional `module @name` line names the module. The first block of a
//! function is its entry block; its arguments are the function
//! parameters. Blocks may be referenced before they are defined; values
//! must be defined before use.

use hashbrown::{HashMap, HashSet};

use crate::core::{LowerError, LowerResult};

use super::ops::{Constant, EirOp, OpKind};
use super::types::{AbstractType, LoweredType, ValueType};
use super::{BlockId, Function, Location, Module, Operation, Successor, ValueId};

pub fn parse_module(name: &str, text: &str) -> LowerResult<Module> {
    Parser::new(text).parse(name)
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    line_starts: Vec<usize>,

    // Per-function maps
    values: HashMap<&'a str, ValueId>,
    blocks: HashMap<&'a str, BlockId>,
    defined_blocks: HashSet<&'a str>,
    block_refs: Vec<&'a str>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            text,
            pos: 0,
            line_starts,
            values: HashMap::new(),
            blocks: HashMap::new(),
            defined_blocks: HashSet::new(),
            block_refs: Vec::new(),
        }
    }

    fn parse(mut self, name: &str) -> LowerResult<Module> {
        self.skip_whitespace(true);
        let module_name = if self.text[self.pos..].starts_with("module") {
            self.expect_str("module")?;
            self.expect(b'@')?;
            self.read_identifier()?
        } else {
            name
        };
        let mut module = Module::new(module_name);
        self.skip_whitespace(true);
        while !self.is_eof() {
            let func = self.parse_function()?;
            if module.function(&func.name).is_some() {
                return Err(self.error(format!("function @{} is defined twice", func.name)));
            }
            module.add_function(func);
            self.skip_whitespace(true);
        }
        Ok(module)
    }

    fn location_at(&self, pos: usize) -> Location {
        let line = self.line_starts.partition_point(|&start| start <= pos);
        let column = pos - self.line_starts[line - 1] + 1;
        Location::new(line as u32, column as u32)
    }

    fn location(&self) -> Location {
        self.location_at(self.pos)
    }

    fn error(&self, message: impl Into<String>) -> LowerError {
        let loc = self.location();
        LowerError::Parse {
            line: loc.line,
            column: loc.column,
            message: message.into(),
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current() {
            if ch == b';' {
                while let Some(ch) = self.current() {
                    if ch == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else if ch.is_ascii_whitespace() {
                if ch == b'\n' && !skip_newlines {
                    break;
                }
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: u8) -> bool {
        self.skip_whitespace(true);
        if self.current() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Like [`try_read`](Self::try_read) without crossing a line break.
    fn try_read_same_line(&mut self, ch: u8) -> bool {
        self.skip_whitespace(false);
        if self.current() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_same_line(&mut self, ch: u8) -> bool {
        self.skip_whitespace(false);
        self.current() == Some(ch)
    }

    fn expect(&mut self, ch: u8) -> LowerResult<()> {
        if !self.try_read(ch) {
            let found = match self.current() {
                Some(c) => format!("'{}'", c as char),
                None => "end of input".to_string(),
            };
            return Err(self.error(format!("expected '{}' but found {found}", ch as char)));
        }
        Ok(())
    }

    fn expect_str(&mut self, s: &str) -> LowerResult<()> {
        self.skip_whitespace(true);
        if self.text[self.pos..].starts_with(s) {
            self.pos += s.len();
            Ok(())
        } else {
            Err(self.error(format!("expected `{s}`")))
        }
    }

    fn read_identifier(&mut self) -> LowerResult<&'a str> {
        self.skip_whitespace(true);
        let start = self.pos;
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'.' || ch == b'$' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error("expected identifier"));
        }
        Ok(&self.text[start..self.pos])
    }

    /// A numeric token: sign, digits, and for floats `.eE+-`.
    fn read_number_token(&mut self) -> LowerResult<&'a str> {
        self.skip_whitespace(true);
        let start = self.pos;
        if matches!(self.current(), Some(b'-' | b'+')) {
            self.pos += 1;
        }
        while let Some(ch) = self.current() {
            let exponent_sign = matches!(ch, b'-' | b'+')
                && matches!(self.text.as_bytes().get(self.pos - 1), Some(b'e' | b'E'));
            if ch.is_ascii_alphanumeric() || ch == b'.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error("expected number"));
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_int<T: std::str::FromStr>(&mut self) -> LowerResult<T> {
        let token = self.read_number_token()?;
        token
            .parse()
            .map_err(|_| self.error(format!("invalid integer `{token}`")))
    }

    fn read_string(&mut self) -> LowerResult<Vec<u8>> {
        self.expect(b'"')?;
        let mut bytes = Vec::new();
        loop {
            let Some(ch) = self.current() else {
                return Err(self.error("unterminated string"));
            };
            self.pos += 1;
            match ch {
                b'"' => break,
                b'\\' => {
                    let Some(esc) = self.current() else {
                        return Err(self.error("unterminated escape"));
                    };
                    self.pos += 1;
                    match esc {
                        b'n' => bytes.push(b'\n'),
                        b't' => bytes.push(b'\t'),
                        b'r' => bytes.push(b'\r'),
                        b'0' => bytes.push(0),
                        b'\\' | b'"' | b'\'' => bytes.push(esc),
                        b'x' => {
                            let hex = self
                                .text
                                .get(self.pos..self.pos + 2)
                                .ok_or_else(|| self.error("truncated \\x escape"))?;
                            let byte = u8::from_str_radix(hex, 16)
                                .map_err(|_| self.error(format!("invalid \\x escape `{hex}`")))?;
                            bytes.push(byte);
                            self.pos += 2;
                        }
                        other => {
                            return Err(self.error(format!("unknown escape '\\{}'", other as char)))
                        }
                    }
                }
                _ => bytes.push(ch),
            }
        }
        Ok(bytes)
    }

    fn parse_type(&mut self) -> LowerResult<ValueType> {
        let start = self.pos;
        let name = self.read_identifier()?;
        let abstract_ty = match name {
            "term" => AbstractType::Term,
            "atom" => AbstractType::Atom,
            "bool" => AbstractType::Boolean,
            "fixnum" => AbstractType::Fixnum,
            "float" => AbstractType::Float,
            "nil" => AbstractType::Nil,
            "none" => AbstractType::None,
            "list" => AbstractType::List,
            "cons" => AbstractType::Cons,
            "binary" => AbstractType::Binary,
            "map" => AbstractType::Map,
            "closure" => AbstractType::Closure,
            "bigint" => AbstractType::BigInt,
            "tuple" => {
                self.expect(b'<')?;
                if self.try_read(b'?') {
                    self.expect(b'>')?;
                    AbstractType::dynamic_tuple()
                } else {
                    let mut elements = Vec::new();
                    if !self.try_read(b'>') {
                        loop {
                            elements.push(self.parse_abstract_type()?);
                            if !self.try_read(b',') {
                                break;
                            }
                        }
                        self.expect(b'>')?;
                    }
                    AbstractType::tuple(elements)
                }
            }
            "box" | "ref" => {
                self.expect(b'<')?;
                let inner = self.parse_abstract_type()?;
                self.expect(b'>')?;
                if name == "box" {
                    AbstractType::boxed(inner)
                } else {
                    AbstractType::reference(inner)
                }
            }
            "f64" => return Ok(LoweredType::F64.into()),
            _ => match name.strip_prefix('i').and_then(|bits| bits.parse::<u32>().ok()) {
                Some(bits) if (1..=64).contains(&bits) => return Ok(LoweredType::Int(bits).into()),
                _ => {
                    self.pos = start;
                    return Err(self.error(format!("unknown type `{name}`")));
                }
            },
        };
        Ok(abstract_ty.into())
    }

    fn parse_abstract_type(&mut self) -> LowerResult<AbstractType> {
        match self.parse_type()? {
            ValueType::Abstract(ty) => Ok(ty),
            ValueType::Lowered(ty) => Err(self.error(format!("`{ty}` is not a term type"))),
        }
    }

    fn parse_function(&mut self) -> LowerResult<Function> {
        self.values.clear();
        self.blocks.clear();
        self.defined_blocks.clear();
        self.block_refs.clear();

        let loc = self.location();
        self.expect_str("func")?;
        self.expect(b'@')?;
        let name = self.read_identifier()?;

        self.expect(b'(')?;
        let mut param_names = Vec::new();
        let mut param_types = Vec::new();
        if !self.try_read(b')') {
            loop {
                self.expect(b'%')?;
                param_names.push(self.read_identifier()?);
                self.expect(b':')?;
                param_types.push(self.parse_type()?);
                if !self.try_read(b',') {
                    break;
                }
            }
            self.expect(b')')?;
        }

        let mut results = Vec::new();
        if self.try_read(b'-') {
            self.expect(b'>')?;
            loop {
                results.push(self.parse_type()?);
                if !self.try_read(b',') {
                    break;
                }
            }
        }

        let mut func = Function::new(name, param_types, results);
        func.loc = loc;
        for (i, param) in param_names.into_iter().enumerate() {
            let id = func.params()[i];
            self.define_value(param, id)?;
        }

        self.expect(b'{')?;
        let mut current = None;
        loop {
            self.skip_whitespace(true);
            match self.current() {
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                Some(b'^') => current = Some(self.parse_block_header(&mut func, current.is_none())?),
                Some(_) => {
                    let Some(block) = current else {
                        return Err(self.error("operation outside of a block"));
                    };
                    self.parse_operation(&mut func, block)?;
                }
                None => return Err(self.error("unexpected end of input in function body")),
            }
        }

        if current.is_none() {
            return Err(self.error(format!("function @{name} has no blocks")));
        }
        for block_name in &self.block_refs {
            if !self.defined_blocks.contains(block_name) {
                return Err(self.error(format!("block ^{block_name} is referenced but never defined")));
            }
        }
        Ok(func)
    }

    fn define_value(&mut self, name: &'a str, id: ValueId) -> LowerResult<()> {
        if self.values.insert(name, id).is_some() {
            return Err(self.error(format!("value %{name} is defined twice")));
        }
        Ok(())
    }

    /// Resolve a block name, creating a placeholder for forward references.
    fn block_ref(&mut self, func: &mut Function, name: &'a str) -> BlockId {
        if let Some(&id) = self.blocks.get(name) {
            return id;
        }
        let id = func.add_block(name, Vec::new());
        self.blocks.insert(name, id);
        self.block_refs.push(name);
        id
    }

    fn parse_block_header(&mut self, func: &mut Function, is_entry: bool) -> LowerResult<BlockId> {
        self.expect(b'^')?;
        let name = self.read_identifier()?;
        if !self.defined_blocks.insert(name) {
            return Err(self.error(format!("block ^{name} is defined twice")));
        }

        let id = if is_entry {
            if self.blocks.contains_key(name) {
                return Err(self.error("the entry block cannot be a branch target"));
            }
            let entry = func.entry();
            func.block_mut(entry).name = name.to_string();
            self.blocks.insert(name, entry);
            entry
        } else {
            self.block_ref(func, name)
        };

        if self.try_read_same_line(b'(') {
            if is_entry {
                return Err(self.error("entry block arguments are the function parameters"));
            }
            loop {
                self.expect(b'%')?;
                let arg = self.read_identifier()?;
                self.expect(b':')?;
                let ty = self.parse_type()?;
                let value = func.add_value(ty);
                func.block_mut(id).args.push(value);
                self.define_value(arg, value)?;
                if !self.try_read(b',') {
                    break;
                }
            }
            self.expect(b')')?;
        }
        self.expect(b':')?;
        Ok(id)
    }

    fn read_value(&mut self) -> LowerResult<ValueId> {
        self.expect(b'%')?;
        let name = self.read_identifier()?;
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| self.error(format!("use of undefined value %{name}")))
    }

    fn read_values(&mut self) -> LowerResult<Vec<ValueId>> {
        let mut values = vec![self.read_value()?];
        while self.try_read_same_line(b',') {
            values.push(self.read_value()?);
        }
        Ok(values)
    }

    /// Zero or more comma-separated values on the rest of the line.
    fn read_optional_values(&mut self) -> LowerResult<Vec<ValueId>> {
        if self.peek_same_line(b'%') {
            self.read_values()
        } else {
            Ok(Vec::new())
        }
    }

    fn read_successor(&mut self, func: &mut Function) -> LowerResult<Successor> {
        self.expect(b'^')?;
        let name = self.read_identifier()?;
        let block = self.block_ref(func, name);
        let mut args = Vec::new();
        if self.try_read_same_line(b'(') && !self.try_read(b')') {
            args = self.read_values()?;
            self.expect(b')')?;
        }
        Ok(Successor::new(block, args))
    }

    fn parse_constant(&mut self, keyword: &str) -> LowerResult<Constant> {
        let constant = match keyword {
            "int" => Constant::Int(self.read_int()?),
            "bigint" => {
                let digits = self.read_number_token()?;
                if !digits.trim_start_matches('-').bytes().all(|b| b.is_ascii_digit()) {
                    return Err(self.error(format!("invalid bigint `{digits}`")));
                }
                Constant::BigInt(digits.to_string())
            }
            "float" => {
                let token = self.read_number_token()?;
                Constant::Float(
                    token
                        .parse()
                        .map_err(|_| self.error(format!("invalid float `{token}`")))?,
                )
            }
            "atom" => Constant::Atom(self.read_int()?),
            "bool" => match self.read_identifier()? {
                "true" => Constant::Bool(true),
                "false" => Constant::Bool(false),
                other => return Err(self.error(format!("invalid bool `{other}`"))),
            },
            "nil" => Constant::Nil,
            "none" => Constant::None,
            "binary" => Constant::binary(self.read_string()?),
            "const_tuple" => Constant::Tuple(self.parse_constant_list()?),
            "const_list" => Constant::List(self.parse_constant_list()?),
            other => return Err(self.error(format!("unknown constant `{other}`"))),
        };
        Ok(constant)
    }

    fn parse_constant_list(&mut self) -> LowerResult<Vec<Constant>> {
        self.expect(b'[')?;
        let mut elements = Vec::new();
        if self.try_read(b']') {
            return Ok(elements);
        }
        loop {
            let keyword = self.read_identifier()?;
            elements.push(self.parse_constant(keyword)?);
            if !self.try_read(b',') {
                break;
            }
        }
        self.expect(b']')?;
        Ok(elements)
    }

    fn parse_operation(&mut self, func: &mut Function, block: BlockId) -> LowerResult<()> {
        let loc = self.location();

        let mut result_names = Vec::new();
        if self.current() == Some(b'%') {
            loop {
                self.expect(b'%')?;
                result_names.push(self.read_identifier()?);
                if !self.try_read(b',') {
                    break;
                }
            }
            self.expect(b'=')?;
        }

        let opname = self.read_identifier()?;
        let mut operands = Vec::new();
        let mut successors = Vec::new();
        let term = || ValueType::Abstract(AbstractType::Term);
        let i1 = || ValueType::Lowered(LoweredType::Int(1));

        let (op, result_types) = match opname {
            "br" => {
                successors.push(self.read_successor(func)?);
                (EirOp::Branch, vec![])
            }
            "cond_br" => {
                operands.push(self.read_value()?);
                self.expect(b',')?;
                successors.push(self.read_successor(func)?);
                self.expect(b',')?;
                successors.push(self.read_successor(func)?);
                (EirOp::CondBranch, vec![])
            }
            "return" => {
                operands = self.read_optional_values()?;
                (EirOp::Return, vec![])
            }
            "unreachable" => (EirOp::Unreachable, vec![]),
            "call" => {
                self.expect(b'@')?;
                let callee = self.read_identifier()?.to_string();
                self.expect(b'(')?;
                if !self.try_read(b')') {
                    operands = self.read_values()?;
                    self.expect(b')')?;
                }
                let mut types = Vec::new();
                if self.try_read_same_line(b':') {
                    loop {
                        types.push(self.parse_type()?);
                        if !self.try_read_same_line(b',') {
                            break;
                        }
                    }
                }
                (EirOp::Call { callee }, types)
            }
            "load" => {
                operands.push(self.read_value()?);
                self.expect(b':')?;
                (EirOp::Load, vec![self.parse_type()?])
            }
            "gep" => {
                operands.push(self.read_value()?);
                self.expect(b',')?;
                let index = self.read_int()?;
                self.expect(b':')?;
                (EirOp::GetElementPtr { index }, vec![self.parse_type()?])
            }
            "is_type" => {
                operands.push(self.read_value()?);
                self.expect(b',')?;
                let match_type = self.parse_abstract_type()?;
                (EirOp::IsType { match_type }, vec![i1()])
            }
            "cast" => {
                operands.push(self.read_value()?);
                self.expect(b':')?;
                (EirOp::Cast, vec![self.parse_type()?])
            }
            "cmpeq" => {
                operands.push(self.read_value()?);
                self.expect(b',')?;
                operands.push(self.read_value()?);
                (EirOp::CmpEq, vec![i1()])
            }
            "tuple" => {
                operands = self.read_optional_values()?;
                (EirOp::Tuple, vec![term()])
            }
            "cons" => {
                operands.push(self.read_value()?);
                self.expect(b',')?;
                operands.push(self.read_value()?);
                (EirOp::Cons, vec![term()])
            }
            "yield" => (EirOp::Yield, vec![]),
            "trace_capture" => (EirOp::TraceCapture, vec![term()]),
            "trace_construct" => {
                operands.push(self.read_value()?);
                (EirOp::TraceConstruct, vec![term()])
            }
            "print" => {
                operands = self.read_optional_values()?;
                (EirOp::Print, vec![])
            }
            keyword => {
                let constant = self.parse_constant(keyword)?;
                let ty = constant.default_type().into();
                (EirOp::Constant(constant), vec![ty])
            }
        };

        if result_names.len() != result_types.len() {
            return Err(LowerError::Parse {
                line: loc.line,
                column: loc.column,
                message: format!(
                    "`{opname}` defines {} results but {} names were given",
                    result_types.len(),
                    result_names.len()
                ),
            });
        }

        let mut results = Vec::with_capacity(result_types.len());
        for (name, ty) in result_names.into_iter().zip(result_types) {
            let id = func.add_value(ty);
            self.define_value(name, id)?;
            results.push(id);
        }

        let operation = Operation::new(OpKind::Eir(op), operands, results)
            .with_successors(successors)
            .at(loc);
        func.append_op(block, operation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_blocks_and_forward_references() {
        let text = r#"
; pick a branch
func @pick(%x: term) -> term {
^entry:
  %t = is_type %x, box<cons>
  cond_br %t, ^yes, ^no(%x)
^yes:
  %a = atom 1
  return %a
^no(%y: term):
  %p = const_tuple [atom 2, int -42, binary "hi\n"]
  return %p
}
"#;
        let module = parse_module("m", text).unwrap();
        let func = module.function("pick").unwrap();
        assert_eq!(func.blocks.len(), 3);
        assert_eq!(func.blocks[0].name, "entry");
        assert_eq!(func.successors(func.entry()).len(), 2);
        let no = func.blocks.iter().find(|b| b.name == "no").unwrap();
        assert_eq!(no.args.len(), 1);

        let names: Vec<_> = func.ops().map(|(_, op)| op.name()).collect();
        assert_eq!(names, ["is_type", "cond_br", "atom", "return", "const_tuple", "return"]);
        let (_, op) = func.ops().nth(4).unwrap();
        assert_eq!(
            op.as_eir(),
            Some(&EirOp::Constant(Constant::Tuple(vec![
                Constant::Atom(2),
                Constant::Int(-42),
                Constant::binary(b"hi\n".to_vec()),
            ])))
        );
        assert_eq!(op.loc.line, 11);
    }

    #[test]
    fn parses_calls_and_optional_operands() {
        let text = "func @f(%a: term, %b: term) {\n^entry:\n  %r = call @g(%a, %b) : term\n  call @h()\n  print\n  print %r, %a\n  yield\n  return\n}\n";
        let module = parse_module("m", text).unwrap();
        let func = module.function("f").unwrap();
        let ops: Vec<_> = func.ops().map(|(_, op)| (op.name(), op.operands.len(), op.results.len())).collect();
        assert_eq!(
            ops,
            [("call", 2, 1), ("call", 0, 0), ("print", 0, 0), ("print", 2, 0), ("yield", 0, 0), ("return", 0, 0)]
        );
        assert!(func.results.is_empty());
    }

    #[test]
    fn reports_positions() {
        let err = parse_module("m", "func @f() {\n^entry:\n  return %nope\n}\n").unwrap_err();
        match err {
            LowerError::Parse { line, message, .. } => {
                assert_eq!(line, 3);
                assert!(message.contains("%nope"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = parse_module("m", "func @f() {\n^entry:\n  br ^missing\n}\n").unwrap_err();
        assert!(err.to_string().contains("^missing"));

        let err = parse_module("m", "func @f() {\n^entry:\n  %x = tuple<?> 3\n}\n").unwrap_err();
        assert!(matches!(err, LowerError::Parse { .. }));
    }

    #[test]
    fn printed_modules_parse_back() {
        let text = r#"
func @main(%a: term, %b: fixnum) -> term {
^entry:
  %l = const_list [int 1, float 2.5, const_tuple [], nil]
  %c = cons %a, %l
  %t = tuple %c, %b
  %e = cmpeq %t, %a
  cond_br %e, ^other, ^done(%t)
^other:
  %s = call @helper(%t) : term
  print %s
  br ^done(%s)
^done(%r: term):
  %x = trace_capture
  %y = trace_construct %x
  return %r
}
"#;
        let first = parse_module("m", text).unwrap().to_string();
        let second = parse_module("m", &first).unwrap().to_string();
        assert_eq!(first, second);
        assert!(first.contains("const_list [int 1, float 2.5, const_tuple [], nil]"), "{first}");
    }

    #[test]
    fn parses_nested_types() {
        let text = "func @f(%p: ref<tuple<atom, box<cons>>>, %q: tuple<?>) -> i1 {\n^entry:\n  %v = load %p : tuple<atom, box<cons>>\n  %c = cast %q : box<tuple<term, term>>\n  %t = is_type %c, box<tuple<term, term>>\n  return %t\n}\n";
        let module = parse_module("m", text).unwrap();
        let func = module.function("f").unwrap();
        assert_eq!(
            func.value_type(func.params()[0]).unwrap().to_string(),
            "ref<tuple<atom, box<cons>>>"
        );
        assert_eq!(func.results, vec![ValueType::Lowered(LoweredType::Int(1))]);
    }
}
