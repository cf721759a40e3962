//! The single-pass Pratt compiler: parsing and bytecode emission fused into
//! one pass, with no intermediate AST. See spec.md §4.2–§4.3.

use crate::scanner::{Scanner, Token, TokenKind};
use loxide_core::{Chunk, Heap, ObjRef, OpCode, Param, Signature, Value};

/// `loxide-core::object::FunctionObj`, imported through the crate root
/// rather than the `object` module directly since that's all this crate
/// touches of the object model.
use loxide_core::object::FunctionObj;

const LOCALS_MAX: usize = 256;
const UPVALUES_MAX: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("compilation failed")]
    HadErrors,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

type ParseFn<'src> = fn(&mut Compiler<'src, '_>, bool);

struct ParseRule<'src> {
    prefix: Option<ParseFn<'src>>,
    infix: Option<ParseFn<'src>>,
    precedence: Precedence,
}

fn rule<'src>(kind: TokenKind) -> ParseRule<'src> {
    use Precedence as P;
    use TokenKind::*;
    match kind {
        LeftParen => ParseRule { prefix: Some(Compiler::grouping), infix: Some(Compiler::call), precedence: P::Call },
        LeftBracket => ParseRule { prefix: None, infix: Some(Compiler::index_), precedence: P::Call },
        Dot => ParseRule { prefix: None, infix: Some(Compiler::dot), precedence: P::Call },
        Minus => ParseRule { prefix: Some(Compiler::unary), infix: Some(Compiler::binary), precedence: P::Term },
        Plus => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: P::Term },
        Slash => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: P::Factor },
        Star => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: P::Factor },
        Bang => ParseRule { prefix: Some(Compiler::unary), infix: None, precedence: P::None },
        BangEqual => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: P::Equality },
        EqualEqual => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: P::Equality },
        Greater | GreaterEqual | Less | LessEqual => {
            ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: P::Comparison }
        }
        Identifier => ParseRule { prefix: Some(Compiler::variable), infix: None, precedence: P::None },
        String => ParseRule { prefix: Some(Compiler::string), infix: None, precedence: P::None },
        Number => ParseRule { prefix: Some(Compiler::number), infix: None, precedence: P::None },
        And => ParseRule { prefix: None, infix: Some(Compiler::and_), precedence: P::And },
        Or => ParseRule { prefix: None, infix: Some(Compiler::or_), precedence: P::Or },
        False | True | Nil => ParseRule { prefix: Some(Compiler::literal), infix: None, precedence: P::None },
        This => ParseRule { prefix: Some(Compiler::this_), infix: None, precedence: P::None },
        _ => ParseRule { prefix: None, infix: None, precedence: P::None },
    }
}

struct Local {
    name: String,
    depth: i32,
    is_captured: bool,
}

struct UpvalueDesc {
    index: u8,
    is_local: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Script,
    Function,
    Method,
}

struct FunctionCompiler {
    name: String,
    kind: FunctionKind,
    chunk: Chunk,
    params: Vec<String>,
    locals: Vec<Local>,
    upvalues: Vec<UpvalueDesc>,
    scope_depth: i32,
}

impl FunctionCompiler {
    fn new(name: String, kind: FunctionKind) -> Self {
        let slot0_name = if kind == FunctionKind::Method { "this".to_string() } else { String::new() };
        FunctionCompiler {
            name,
            kind,
            chunk: Chunk::new(),
            params: Vec::new(),
            locals: vec![Local { name: slot0_name, depth: 0, is_captured: false }],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

/// Drives the scanner and emits bytecode in one pass. Holds a stack of
/// [`FunctionCompiler`] contexts, one per nested function currently being
/// compiled (spec.md §4.2, "function compiler stack").
pub struct Compiler<'src, 'heap> {
    scanner: Scanner<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    preceded_by_newline: bool,
    had_error: bool,
    panic_mode: bool,
    heap: &'heap mut Heap,
    function_stack: Vec<FunctionCompiler>,
    repl_echo: bool,
}

/// Compiles `source` into a top-level function object. `repl_echo`, when
/// set, makes the final bare-expression statement at top level print its
/// result instead of discarding it (spec.md SPEC_FULL §4).
pub fn compile(source: &str, heap: &mut Heap, repl_echo: bool) -> Result<ObjRef, CompileError> {
    let placeholder = Token { kind: TokenKind::Bof, lexeme: "", line: 0 };
    let mut c = Compiler {
        scanner: Scanner::new(source),
        previous: placeholder,
        current: placeholder,
        preceded_by_newline: false,
        had_error: false,
        panic_mode: false,
        heap,
        function_stack: vec![FunctionCompiler::new("script".to_string(), FunctionKind::Script)],
        repl_echo,
    };
    c.advance();
    while !c.check(TokenKind::Eof) {
        c.declaration();
    }
    c.consume(TokenKind::Eof, "Expect end of expression.");
    let (func_ref, _upvalues) = c.end_function(0);
    if c.had_error {
        Err(CompileError::HadErrors)
    } else {
        Ok(func_ref)
    }
}

impl<'src, 'heap> Compiler<'src, 'heap> {
    // ---- token stream -----------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        self.preceded_by_newline = false;
        loop {
            let tok = self.scanner.scan_token();
            match tok.kind {
                TokenKind::Ignorable | TokenKind::Bof => continue,
                TokenKind::Newline | TokenKind::MultilineComment => {
                    self.preceded_by_newline = true;
                    continue;
                }
                TokenKind::Error => {
                    self.current = tok;
                    self.error_at_current(tok.lexeme);
                    continue;
                }
                _ => {
                    self.current = tok;
                    break;
                }
            }
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    /// Implements the "optional semicolon" rule (spec.md §4.2): a prior
    /// newline/comment, or an upcoming `}`/EOF, stands in for `;`.
    fn consume_statement_end(&mut self) {
        if self.match_token(TokenKind::Semicolon) {
            return;
        }
        if self.preceded_by_newline || self.check(TokenKind::RightBrace) || self.check(TokenKind::Eof) {
            return;
        }
        self.error_at_current("Expect ';' after statement.");
    }

    // ---- error reporting ----------------------------------------------

    fn error_at(&mut self, token: Token<'src>, msg: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        eprint!("[line {}] Error", token.line);
        match token.kind {
            TokenKind::Eof => eprint!(" at end"),
            TokenKind::Error => {}
            _ => eprint!(" at '{}'", token.lexeme),
        }
        eprintln!(": {msg}");
        log::debug!("compile error recorded, entering panic mode");
    }

    fn error(&mut self, msg: &str) {
        let t = self.previous;
        self.error_at(t, msg);
    }

    fn error_at_current(&mut self, msg: &str) {
        let t = self.current;
        self.error_at(t, msg);
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    // ---- chunk / constant emission -----------------------------------

    fn current_chunk(&self) -> &Chunk {
        &self.function_stack.last().unwrap().chunk
    }

    fn current_chunk_mut(&mut self) -> &mut Chunk {
        &mut self.function_stack.last_mut().unwrap().chunk
    }

    fn line(&self) -> u32 {
        self.previous.line
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.line();
        self.current_chunk_mut().write_byte(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        let line = self.line();
        self.current_chunk_mut().write_op(op, line);
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        let line = self.line();
        self.current_chunk_mut().emit_jump(op, line)
    }

    fn patch_jump(&mut self, offset: usize) {
        if self.current_chunk_mut().patch_jump(offset).is_err() {
            self.error("Too much code to jump over.");
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        let line = self.line();
        if self.current_chunk_mut().emit_loop(loop_start, line).is_err() {
            self.error("Loop body too large.");
        }
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.current_chunk_mut().add_constant(value) {
            Ok(i) => i,
            Err(_) => {
                self.error("Too many constants in one function.");
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit_op(OpCode::LoadConstant);
        self.emit_byte(idx);
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let r = self.heap.intern(name);
        self.make_constant(Value::Obj(r))
    }

    // ---- scopes & locals ------------------------------------------------

    fn begin_scope(&mut self) {
        self.function_stack.last_mut().unwrap().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let fi = self.function_stack.len() - 1;
        self.function_stack[fi].scope_depth -= 1;
        let depth = self.function_stack[fi].scope_depth;
        loop {
            let should_pop = matches!(self.function_stack[fi].locals.last(), Some(l) if l.depth > depth);
            if !should_pop {
                break;
            }
            let captured = self.function_stack[fi].locals.last().unwrap().is_captured;
            if captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.function_stack[fi].locals.pop();
        }
    }

    fn declare_variable(&mut self) {
        let fi = self.function_stack.len() - 1;
        if self.function_stack[fi].scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme.to_string();
        let depth = self.function_stack[fi].scope_depth;
        let mut duplicate = false;
        for local in self.function_stack[fi].locals.iter().rev() {
            if local.depth != -1 && local.depth < depth {
                break;
            }
            if local.name == name {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
            return;
        }
        self.add_local(name);
    }

    fn add_local(&mut self, name: String) {
        let fi = self.function_stack.len() - 1;
        if self.function_stack[fi].locals.len() >= LOCALS_MAX {
            self.error("Too many local variables in function.");
            return;
        }
        self.function_stack[fi].locals.push(Local { name, depth: -1, is_captured: false });
    }

    fn mark_initialized(&mut self) {
        let fi = self.function_stack.len() - 1;
        if self.function_stack[fi].scope_depth == 0 {
            return;
        }
        let depth = self.function_stack[fi].scope_depth;
        let last = self.function_stack[fi].locals.len() - 1;
        self.function_stack[fi].locals[last].depth = depth;
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.function_stack.last().unwrap().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.lexeme)
    }

    fn define_variable(&mut self, global: u8) {
        if self.function_stack.last().unwrap().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op(OpCode::DefineGlobal);
        self.emit_byte(global);
    }

    fn resolve_local(&self, fi: usize, name: &str) -> Option<(u8, bool)> {
        let f = &self.function_stack[fi];
        for (i, local) in f.locals.iter().enumerate().rev() {
            if local.name == name {
                return Some((i as u8, local.depth == -1));
            }
        }
        None
    }

    fn resolve_upvalue(&mut self, fi: usize, name: &str) -> Option<u8> {
        if fi == 0 {
            return None;
        }
        let enclosing = fi - 1;
        if let Some((slot, _uninitialized)) = self.resolve_local(enclosing, name) {
            self.function_stack[enclosing].locals[slot as usize].is_captured = true;
            return Some(self.add_upvalue(fi, slot, true));
        }
        if let Some(slot) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(fi, slot, false));
        }
        None
    }

    fn add_upvalue(&mut self, fi: usize, index: u8, is_local: bool) -> u8 {
        {
            let upvalues = &self.function_stack[fi].upvalues;
            for (i, uv) in upvalues.iter().enumerate() {
                if uv.index == index && uv.is_local == is_local {
                    return i as u8;
                }
            }
        }
        if self.function_stack[fi].upvalues.len() >= UPVALUES_MAX {
            self.error("Too many closure variables in function.");
            return 0;
        }
        self.function_stack[fi].upvalues.push(UpvalueDesc { index, is_local });
        (self.function_stack[fi].upvalues.len() - 1) as u8
    }

    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let fi = self.function_stack.len() - 1;
        let (get_op, set_op, arg) = if let Some((slot, uninitialized)) = self.resolve_local(fi, name.lexeme) {
            if uninitialized {
                self.error("Can't read local variable in its own initializer.");
            }
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue(fi, name.lexeme) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, slot)
        } else {
            let slot = self.identifier_constant(name.lexeme);
            (OpCode::GetGlobal, OpCode::SetGlobal, slot)
        };
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op(set_op);
            self.emit_byte(arg);
        } else {
            self.emit_op(get_op);
            self.emit_byte(arg);
        }
    }

    // ---- functions --------------------------------------------------

    fn end_function(&mut self, arity: u8) -> (ObjRef, Vec<UpvalueDesc>) {
        self.emit_op(OpCode::Nil);
        self.emit_op(OpCode::Return);
        let f = self.function_stack.pop().unwrap();
        let params = f
            .params
            .iter()
            .map(|p| Param { name: p.clone(), type_name: None, default: None })
            .collect();
        let signature = Signature { name: f.name, arity, min_arity: arity, params };
        let func_ref = self.heap.alloc(loxide_core::ObjKind::Function(FunctionObj {
            signature,
            chunk: f.chunk,
            upvalue_count: f.upvalues.len() as u8,
            doc: None,
        }));
        (func_ref, f.upvalues)
    }

    fn compile_function(&mut self, kind: FunctionKind) {
        let name = self.previous.lexeme.to_string();
        self.function_stack.push(FunctionCompiler::new(name, kind));
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        let mut arity: u32 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                arity += 1;
                if arity > 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                self.consume(TokenKind::Identifier, "Expect parameter name.");
                let pname = self.previous.lexeme.to_string();
                self.declare_variable();
                self.mark_initialized();
                self.function_stack.last_mut().unwrap().params.push(pname);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();
        let (func_ref, upvalues) = self.end_function(arity.min(255) as u8);
        let const_idx = self.make_constant(Value::Obj(func_ref));
        self.emit_op(OpCode::NewClosure);
        self.emit_byte(const_idx);
        for uv in upvalues {
            self.emit_byte(uv.is_local as u8);
            self.emit_byte(uv.index);
        }
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.compile_function(FunctionKind::Function);
        self.define_variable(global);
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let name_const = self.identifier_constant(self.previous.lexeme);
        self.compile_function(FunctionKind::Method);
        self.emit_op(OpCode::NewMethod);
        self.emit_byte(name_const);
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let name_tok = self.previous;
        let name_const = self.identifier_constant(name_tok.lexeme);
        self.declare_variable();
        self.emit_op(OpCode::NewClass);
        self.emit_byte(name_const);
        self.define_variable(name_const);

        self.named_variable(name_tok, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_op(OpCode::Pop);
    }

    // ---- statements -----------------------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume_statement_end();
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume_statement_end();
        self.emit_op(OpCode::Print);
    }

    fn return_statement(&mut self) {
        if self.function_stack.last().unwrap().kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(TokenKind::Semicolon) || self.check(TokenKind::RightBrace) || self.check(TokenKind::Eof) {
            self.emit_op(OpCode::Nil);
        } else {
            self.expression();
            self.consume_statement_end();
        }
        self.emit_op(OpCode::Return);
    }

    fn expression_statement(&mut self) {
        self.expression();
        let is_top_level_repl_tail =
            self.repl_echo && self.function_stack.len() == 1 && self.check(TokenKind::Eof);
        self.consume_statement_end();
        if is_top_level_repl_tail {
            self.emit_op(OpCode::Println);
        } else {
            self.emit_op(OpCode::Pop);
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");
        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);
        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().code.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");
        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);
        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Semicolon) {
            // no initializer
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().code.len();
        let mut exit_jump: Option<usize> = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.check(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let incr_start = self.current_chunk().code.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");
            self.emit_loop(loop_start);
            loop_start = incr_start;
            self.patch_jump(body_jump);
        } else {
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");
        }

        self.statement();
        self.emit_loop(loop_start);
        if let Some(ej) = exit_jump {
            self.patch_jump(ej);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    // ---- expressions ------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix_fn) = rule::<'src>(self.previous.kind).prefix else {
            self.error("Unexpected token in primary expression.");
            return;
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix_fn(self, can_assign);

        while precedence <= rule::<'src>(self.current.kind).precedence {
            self.advance();
            let infix_fn = rule::<'src>(self.previous.kind).infix.expect("rule table precedence implies infix_fn");
            infix_fn(self, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let op_kind = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match op_kind {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!("unary rule only registered for ! and -"),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let op_kind = self.previous.kind;
        let next_precedence = rule::<'src>(op_kind).precedence.next();
        self.parse_precedence(next_precedence);
        match op_kind {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            _ => unreachable!("binary rule only registered for arithmetic/comparison tokens"),
        }
    }

    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_op(OpCode::Call);
        self.emit_byte(arg_count);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u32 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                count += 1;
                if count > 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count.min(255) as u8
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name_const = self.identifier_constant(self.previous.lexeme);
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op(OpCode::SetProperty);
            self.emit_byte(name_const);
        } else {
            self.emit_op(OpCode::GetProperty);
            self.emit_byte(name_const);
        }
    }

    fn index_(&mut self, can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightBracket, "Expect ']' after index.");
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op(OpCode::SetIndex);
        } else {
            self.emit_op(OpCode::GetIndex);
        }
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            _ => unreachable!("literal rule only registered for false/true/nil"),
        }
    }

    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self.previous.lexeme.parse().unwrap_or(f64::NAN);
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self, _can_assign: bool) {
        let raw = self.previous.lexeme;
        let content = &raw[1..raw.len() - 1];
        let unescaped = unescape(content);
        let r = self.heap.intern(&unescaped);
        self.emit_constant(Value::Obj(r));
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous;
        self.named_variable(name, can_assign);
    }

    fn this_(&mut self, _can_assign: bool) {
        if self.function_stack.last().unwrap().kind != FunctionKind::Method {
            self.error("Can't use 'this' outside of a method.");
        }
        let this_tok = Token { kind: TokenKind::This, lexeme: "this", line: self.previous.line };
        self.named_variable(this_tok, false);
    }
}

/// Translates `\n`, `\t`, `\\`; an unrecognized `\X` drops the backslash and
/// keeps `X` verbatim. This preserves clox's laxity deliberately (spec.md
/// §9, open question on escape handling) rather than rejecting unknown
/// escapes.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use loxide_core::disasm::disassemble_chunk;

    fn compile_ok(src: &str) -> (ObjRef, Heap) {
        let mut heap = Heap::new();
        let r = compile(src, &mut heap, false).expect("expected compilation to succeed");
        (r, heap)
    }

    #[test]
    fn compiles_an_arithmetic_expression_statement() {
        let (r, heap) = compile_ok("print 1 + 2 * 3;");
        let f = heap.as_function(r).unwrap();
        let text = disassemble_chunk(&f.chunk, "script", &heap);
        assert!(text.contains("LOAD_CONSTANT"));
        assert!(text.contains("MULTIPLY"));
        assert!(text.contains("ADD"));
        assert!(text.contains("PRINT"));
    }

    #[test]
    fn reports_error_on_invalid_assignment_target() {
        let mut heap = Heap::new();
        let err = compile("1 + 2 = 3;", &mut heap, false);
        assert!(err.is_err());
    }

    #[test]
    fn implicit_semicolon_before_closing_brace() {
        let mut heap = Heap::new();
        let r = compile("fun f() { return 1 }", &mut heap, false);
        assert!(r.is_ok());
    }

    #[test]
    fn repl_echo_emits_println_for_trailing_expression() {
        let mut heap = Heap::new();
        let r = compile("1 + 1", &mut heap, true).unwrap();
        let f = heap.as_function(r).unwrap();
        let text = disassemble_chunk(&f.chunk, "script", &heap);
        assert!(text.contains("PRINTLN"));
    }

    #[test]
    fn this_outside_method_is_an_error() {
        let mut heap = Heap::new();
        let r = compile("print this;", &mut heap, false);
        assert!(r.is_err());
    }

    #[test]
    fn unescape_handles_known_and_unknown_sequences() {
        assert_eq!(unescape("a\\nb"), "a\nb");
        assert_eq!(unescape("a\\qb"), "aqb");
    }
}
