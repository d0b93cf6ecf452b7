//! Single-pass Pratt-style compiler (spec.md §4.5). One [`Compiler`] context
//! exists per function body being compiled; contexts are linked through the
//! `Parser.compilers` stack (innermost last) so upvalue resolution can walk
//! outward to enclosing functions.

use crate::chunk::{Chunk, OpCode};
use crate::constants::{MAX_ARGUMENTS, MAX_EXCEPTION_HANDLERS, MAX_PARAMETERS};
use crate::heap::Heap;
use crate::objects::ObjectFunction;
use crate::scanner::{Scanner, Token, TokenType};
use crate::value::{make_function_value, make_number_value, Value};

struct Local<'a> {
    name: Token<'a>,
    depth: i32,
    captured: bool,
}

#[derive(Clone)]
struct Upvalue {
    index: usize,
    is_local: bool,
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum FunctionType {
    Script,
    Function,
    Lambda,
    Method,
    Initializer,
}

/// A `try` statement currently being compiled, still open for its protected
/// body/catch clause. `return` inside that span redirects through the
/// pending-action locals instead of emitting `OpCode::Return` directly, so
/// the statement's `finally` block (if any) still runs (spec.md §4.6, §8).
struct TryContext {
    kind_slot: u8,
    value_slot: u8,
    exit_jumps: Vec<u16>,
}

struct Compiler<'a> {
    function: Box<ObjectFunction>,
    function_type: FunctionType,
    locals: Vec<Local<'a>>,
    upvalues: Vec<Upvalue>,
    scope_depth: i32,
    handler_depth: usize,
    try_contexts: Vec<TryContext>,
}

impl<'a> Compiler<'a> {
    fn new(function_type: FunctionType) -> Compiler<'a> {
        let this_slot_name = if matches!(function_type, FunctionType::Method | FunctionType::Initializer) {
            "this"
        } else {
            ""
        };
        Compiler {
            function: ObjectFunction::new(0, String::new()),
            function_type,
            locals: vec![Local {
                name: Token {
                    token_type: TokenType::Identifier,
                    value: this_slot_name,
                    line: 0,
                },
                depth: 0,
                captured: false,
            }],
            upvalues: vec![],
            scope_depth: 0,
            handler_depth: 0,
            try_contexts: vec![],
        }
    }
}

struct ClassCompiler {
    has_superclass: bool,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
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

impl From<u8> for Precedence {
    fn from(value: u8) -> Self {
        match value {
            0 => Precedence::None,
            1 => Precedence::Assignment,
            2 => Precedence::Or,
            3 => Precedence::And,
            4 => Precedence::Equality,
            5 => Precedence::Comparison,
            6 => Precedence::Term,
            7 => Precedence::Factor,
            8 => Precedence::Unary,
            9 => Precedence::Call,
            _ => Precedence::Primary,
        }
    }
}

type ParseFn = fn(&mut Parser<'_>, bool);

#[derive(Clone, Copy)]
struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

impl ParseRule {
    const fn new(prefix: Option<ParseFn>, infix: Option<ParseFn>, precedence: Precedence) -> Self {
        ParseRule { prefix, infix, precedence }
    }
}

const RULE_COUNT: usize = TokenType::Eof as usize + 1;

fn rules() -> [ParseRule; RULE_COUNT] {
    let mut rules = [ParseRule::new(None, None, Precedence::None); RULE_COUNT];
    let mut set = |t: TokenType, prefix: Option<ParseFn>, infix: Option<ParseFn>, prec: Precedence| {
        rules[t as usize] = ParseRule::new(prefix, infix, prec);
    };

    set(TokenType::LeftParen, Some(Parser::grouping), Some(Parser::call), Precedence::Call);
    set(TokenType::LeftBracket, Some(Parser::list_literal), Some(Parser::index_access), Precedence::Call);
    set(TokenType::LeftBrace, Some(Parser::dict_literal), None, Precedence::None);
    set(TokenType::Minus, Some(Parser::unary), Some(Parser::binary), Precedence::Term);
    set(TokenType::Plus, None, Some(Parser::binary), Precedence::Term);
    set(TokenType::Slash, None, Some(Parser::binary), Precedence::Factor);
    set(TokenType::Star, None, Some(Parser::binary), Precedence::Factor);
    set(TokenType::Percent, None, Some(Parser::binary), Precedence::Factor);
    set(TokenType::Number, Some(Parser::number), None, Precedence::None);
    set(TokenType::String, Some(Parser::string), None, Precedence::None);
    set(TokenType::False, Some(Parser::literal), None, Precedence::None);
    set(TokenType::True, Some(Parser::literal), None, Precedence::None);
    set(TokenType::Nil, Some(Parser::literal), None, Precedence::None);
    set(TokenType::Empty, Some(Parser::literal), None, Precedence::None);
    set(TokenType::Bang, Some(Parser::unary), None, Precedence::None);
    set(TokenType::PlusPlus, Some(Parser::prefix_step), None, Precedence::None);
    set(TokenType::MinusMinus, Some(Parser::prefix_step), None, Precedence::None);
    set(TokenType::BangEqual, None, Some(Parser::binary), Precedence::Equality);
    set(TokenType::EqualEqual, None, Some(Parser::binary), Precedence::Equality);
    set(TokenType::Greater, None, Some(Parser::binary), Precedence::Comparison);
    set(TokenType::GreaterEqual, None, Some(Parser::binary), Precedence::Comparison);
    set(TokenType::Less, None, Some(Parser::binary), Precedence::Comparison);
    set(TokenType::LessEqual, None, Some(Parser::binary), Precedence::Comparison);
    set(TokenType::Identifier, Some(Parser::variable), None, Precedence::None);
    set(TokenType::And, None, Some(Parser::and), Precedence::And);
    set(TokenType::Or, None, Some(Parser::or), Precedence::Or);
    set(TokenType::This, Some(Parser::this), None, Precedence::None);
    set(TokenType::Super, Some(Parser::super_), None, Precedence::None);
    set(TokenType::Dot, None, Some(Parser::dot), Precedence::Call);
    set(TokenType::Pipe, Some(Parser::lambda), None, Precedence::None);
    set(TokenType::Arrow, Some(Parser::lambda), None, Precedence::None);

    rules
}

pub struct Parser<'a> {
    current: Token<'a>,
    previous: Token<'a>,
    scanner: Option<Box<Scanner<'a>>>,
    has_error: bool,
    panic_mode: bool,
    compilers: Vec<Compiler<'a>>,
    class_compilers: Vec<ClassCompiler>,
    heap: &'a mut Heap,
    interpolation_depth: usize,
    rules: [ParseRule; RULE_COUNT],
}

enum Segment<'a> {
    Literal(String),
    Expr(&'a str),
}

impl<'a> Parser<'a> {
    pub fn new(heap: &'a mut Heap) -> Box<Parser<'a>> {
        let eof = Token { token_type: TokenType::Eof, value: "", line: 0 };
        let mut parser = Box::new(Parser {
            current: eof.clone(),
            previous: eof,
            scanner: None,
            has_error: false,
            panic_mode: false,
            compilers: vec![],
            class_compilers: vec![],
            heap,
            interpolation_depth: 0,
            rules: rules(),
        });
        parser.compilers.push(Compiler::new(FunctionType::Script));
        parser
    }

    pub fn compile(&mut self, source: &'a str) -> Option<Box<ObjectFunction>> {
        self.scanner = Some(Scanner::new(source));
        self.current = Token { token_type: TokenType::Eof, value: "", line: 0 };
        self.previous = self.current.clone();
        self.advance();

        while !self.match_token(TokenType::Eof) {
            self.declaration();
        }

        let function = self.end_compiler();
        if self.has_error {
            None
        } else {
            function
        }
    }

    fn current_compiler(&self) -> &Compiler<'a> {
        self.compilers.last().expect("no active compiler")
    }
    fn current_compiler_mut(&mut self) -> &mut Compiler<'a> {
        self.compilers.last_mut().expect("no active compiler")
    }
    fn specific_compiler(&self, index: usize) -> &Compiler<'a> {
        &self.compilers[index]
    }
    fn specific_compiler_mut(&mut self, index: usize) -> &mut Compiler<'a> {
        &mut self.compilers[index]
    }
    fn current_chunk(&self) -> &Chunk {
        &self.current_compiler().function.chunk
    }
    fn current_chunk_mut(&mut self) -> &mut Chunk {
        &mut self.current_compiler_mut().function.chunk
    }
    fn current_locals(&self) -> &Vec<Local<'a>> {
        &self.current_compiler().locals
    }
    fn current_locals_mut(&mut self) -> &mut Vec<Local<'a>> {
        &mut self.current_compiler_mut().locals
    }

    fn advance(&mut self) {
        self.previous = self.current.clone();
        loop {
            let next = self.scanner.as_mut().expect("scanner not set").scan_token();
            self.current = next;
            if self.current.token_type != TokenType::Error {
                break;
            }
            let message = self.current.value;
            self.error_at_current(message);
        }
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current.token_type == token_type
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if !self.check(token_type) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, token_type: TokenType, message: &'static str) {
        if self.current.token_type == token_type {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk_mut().write(byte, line);
    }
    fn emit_bytes(&mut self, a: u8, b: u8) {
        self.emit_byte(a);
        self.emit_byte(b);
    }
    fn emit_return(&mut self) {
        if self.current_compiler().function_type == FunctionType::Initializer {
            self.emit_bytes(OpCode::GetLocal.to_byte(), 0);
        } else {
            self.emit_byte(OpCode::Nil.to_byte());
        }
        self.emit_protected_return();
    }

    /// Emits the actual return for the value already on the stack top,
    /// unless a lexically enclosing `try` is still open — then the value is
    /// stashed and control jumps to that try's `finally` instead, so the
    /// finally block still runs before the function actually returns
    /// (spec.md §4.6, §8: a return inside a try/catch doesn't skip finally).
    fn emit_protected_return(&mut self) {
        if self.current_compiler().try_contexts.is_empty() {
            self.emit_byte(OpCode::Return.to_byte());
        } else {
            self.emit_pending_exit(1.0);
        }
    }

    /// Stashes the value on the stack top into the innermost open try's
    /// pending-action locals and jumps to its finally/landing-pad code.
    /// `kind` is 1.0 for a pending return, 2.0 for a pending re-raise.
    fn emit_pending_exit(&mut self, kind: f64) {
        let index = self.current_compiler().try_contexts.len() - 1;
        let kind_slot = self.current_compiler().try_contexts[index].kind_slot;
        let value_slot = self.current_compiler().try_contexts[index].value_slot;
        self.emit_bytes(OpCode::SetLocal.to_byte(), value_slot);
        self.emit_byte(OpCode::Pop.to_byte());
        self.emit_constant(make_number_value(kind));
        self.emit_bytes(OpCode::SetLocal.to_byte(), kind_slot);
        self.emit_byte(OpCode::Pop.to_byte());
        let jump = self.emit_jump_bytes(OpCode::Jump.to_byte());
        self.current_compiler_mut().try_contexts[index].exit_jumps.push(jump);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        if let Some(index) = self.current_chunk().find_constant(value) {
            return index as u8;
        }
        let index = self.current_chunk_mut().add_constant(value);
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_bytes(OpCode::Constant.to_byte(), index);
    }

    fn string_constant(&mut self, text: &str) -> Value {
        let ptr = self.heap.alloc_string(text);
        crate::value::make_string_value(ptr)
    }

    fn identifier_constant(&mut self, text: &str) -> u8 {
        let value = self.string_constant(text);
        self.make_constant(value)
    }

    fn init_compiler(&mut self, function_type: FunctionType, name: &str) {
        let mut compiler = Compiler::new(function_type);
        compiler.function.name = if name.is_empty() { None } else { Some(name.to_string()) };
        self.compilers.push(compiler);
    }

    fn end_compiler(&mut self) -> Option<Box<ObjectFunction>> {
        self.emit_return();
        #[cfg(feature = "debug_print_code")]
        {
            if !self.has_error {
                let name = self
                    .current_compiler()
                    .function
                    .display_name()
                    .to_string();
                crate::debug::disassemble_chunk(self.current_chunk(), &name);
            }
        }
        let compiler = self.compilers.pop().expect("no active compiler");
        Some(compiler.function)
    }

    fn begin_scope(&mut self) {
        self.current_compiler_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.current_compiler_mut().scope_depth -= 1;
        let depth = self.current_compiler().scope_depth;
        while let Some(local) = self.current_locals().last() {
            if local.depth <= depth {
                break;
            }
            if local.captured {
                self.emit_byte(OpCode::CloseUpvalue.to_byte());
            } else {
                self.emit_byte(OpCode::Pop.to_byte());
            }
            self.current_locals_mut().pop();
        }
    }

    // ---- declarations ----

    fn declaration(&mut self) {
        if self.match_token(TokenType::Var) {
            self.variable_declaration();
        } else if self.match_token(TokenType::Def) {
            self.function_declaration();
        } else if self.match_token(TokenType::Class) {
            self.class_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn variable_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenType::Equal) {
            self.expression();
        } else {
            self.emit_byte(OpCode::Nil.to_byte());
        }
        self.consume(TokenType::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn parse_variable(&mut self, message: &'static str) -> u8 {
        self.consume(TokenType::Identifier, message);
        self.declare_variable();
        if self.current_compiler().scope_depth > 0 {
            return 0;
        }
        let name = self.previous.value.to_string();
        self.identifier_constant(&name)
    }

    fn declare_variable(&mut self) {
        if self.current_compiler().scope_depth == 0 {
            return;
        }
        let name = self.previous.clone();
        let depth = self.current_compiler().scope_depth;
        let mut duplicate = false;
        for local in self.current_locals().iter().rev() {
            if local.depth != -1 && local.depth < depth {
                break;
            }
            if local.name.value == name.value {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn add_local(&mut self, name: Token<'a>) {
        if self.current_locals().len() >= MAX_PARAMETERS + 1 {
            self.error("Too many local variables in function.");
            return;
        }
        self.current_locals_mut().push(Local { name, depth: -1, captured: false });
    }

    fn mark_initialized(&mut self) {
        if self.current_compiler().scope_depth == 0 {
            return;
        }
        let depth = self.current_compiler().scope_depth;
        self.current_locals_mut().last_mut().unwrap().depth = depth;
    }

    fn define_variable(&mut self, global: u8) {
        if self.current_compiler().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_bytes(OpCode::DefineGlobal.to_byte(), global);
    }

    fn function_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        let name = self.previous.value.to_string();
        self.function(FunctionType::Function, &name);
        self.define_variable(global);
    }

    fn function(&mut self, function_type: FunctionType, name: &str) {
        self.init_compiler(function_type, name);
        self.begin_scope();

        self.consume(TokenType::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenType::RightParen) {
            loop {
                let is_variadic = self.match_token(TokenType::Star);
                self.current_compiler_mut().function.arity += 1;
                if self.current_compiler().function.arity as usize > MAX_PARAMETERS {
                    self.error("Can't have more than 255 parameters.");
                }
                if is_variadic {
                    self.current_compiler_mut().function.is_variadic = true;
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.");
        self.consume(TokenType::LeftBrace, "Expect '{' before function body.");
        self.block();

        self.emit_closure_from_current()
    }

    fn emit_closure_from_current(&mut self) {
        let upvalues = self.current_compiler().upvalues.clone();
        let mut function = self.end_compiler().expect("function body always compiles");
        function.upvalue_count = upvalues.len();
        let ptr = self.heap_alloc_function_from(function);
        let index = self.make_constant(make_function_value(ptr));
        self.emit_bytes(OpCode::Closure.to_byte(), index);
        for upvalue in &upvalues {
            self.emit_byte(if upvalue.is_local { 1 } else { 0 });
            self.emit_byte(upvalue.index as u8);
        }
    }

    fn heap_alloc_function_from(&mut self, function: Box<ObjectFunction>) -> *mut ObjectFunction {
        self.heap.adopt_function(function)
    }

    fn class_declaration(&mut self) {
        self.consume(TokenType::Identifier, "Expect class name.");
        let class_name = self.previous.clone();
        let name_const = self.identifier_constant(class_name.value);
        self.declare_variable();

        self.emit_bytes(OpCode::Class.to_byte(), name_const);
        self.define_variable(name_const);

        self.class_compilers.push(ClassCompiler { has_superclass: false });

        if self.match_token(TokenType::Less) {
            self.consume(TokenType::Identifier, "Expect superclass name.");
            if self.previous.value == class_name.value {
                self.error("A class can't inherit from itself.");
            }
            self.variable(false);

            self.begin_scope();
            self.add_local(Self::synthetic_token("super"));
            self.mark_initialized();

            self.named_variable(class_name.clone(), false);
            self.emit_byte(OpCode::Inherit.to_byte());
            self.class_compilers.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(class_name.clone(), false);
        self.consume(TokenType::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.class_member();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after class body.");
        self.emit_byte(OpCode::Pop.to_byte());

        if self.class_compilers.last().unwrap().has_superclass {
            self.end_scope();
        }
        self.class_compilers.pop();
    }

    fn class_member(&mut self) {
        let at_sign = self.match_token(TokenType::At);
        self.consume(TokenType::Identifier, "Expect method or field name.");
        let raw_name = self.previous.value.to_string();
        let member_name = if at_sign { format!("@{}", raw_name) } else { raw_name };

        if self.check(TokenType::LeftParen) {
            let function_type = if member_name == "@new" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            let name_const = self.identifier_constant(&member_name);
            self.function(function_type, &member_name);
            self.emit_bytes(OpCode::Method.to_byte(), name_const);
        } else {
            let name_const = self.identifier_constant(&member_name);
            if self.match_token(TokenType::Equal) {
                self.expression();
            } else {
                self.emit_byte(OpCode::Nil.to_byte());
            }
            self.consume(TokenType::Semicolon, "Expect ';' after field default.");
            self.emit_bytes(OpCode::Field.to_byte(), name_const);
        }
    }

    fn synthetic_token(text: &'static str) -> Token<'a> {
        Token { token_type: TokenType::Identifier, value: text, line: 0 }
    }

    // ---- statements ----

    fn statement(&mut self) {
        if self.match_token(TokenType::If) {
            self.if_statement();
        } else if self.match_token(TokenType::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else if self.match_token(TokenType::While) {
            self.while_statement();
        } else if self.match_token(TokenType::For) {
            self.for_statement();
        } else if self.match_token(TokenType::Foreach) {
            self.foreach_statement();
        } else if self.match_token(TokenType::Return) {
            self.return_statement();
        } else if self.match_token(TokenType::Echo) {
            self.echo_statement();
        } else if self.match_token(TokenType::Try) {
            self.try_statement();
        } else if self.match_token(TokenType::Raise) {
            self.raise_statement();
        } else if self.match_token(TokenType::Import) {
            self.import_statement();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.declaration();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after block.");
    }

    fn echo_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after value.");
        self.emit_byte(OpCode::Echo.to_byte());
    }

    fn return_statement(&mut self) {
        if self.current_compiler().function_type == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(TokenType::Semicolon) {
            self.emit_return();
        } else {
            if self.current_compiler().function_type == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after return value.");
            self.emit_protected_return();
        }
    }

    fn import_statement(&mut self) {
        // Module/path resolution is out of scope; only the grammar slot is
        // kept so scripts referencing it still parse.
        self.consume(TokenType::String, "Expect module path string.");
        self.consume(TokenType::Semicolon, "Expect ';' after import.");
        self.emit_byte(OpCode::Import.to_byte());
    }

    fn raise_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after raise expression.");
        self.emit_byte(OpCode::Raise.to_byte());
    }

    fn try_statement(&mut self) {
        if self.current_compiler().handler_depth >= MAX_EXCEPTION_HANDLERS {
            self.error("Too many nested try handlers in one function.");
        }
        self.current_compiler_mut().handler_depth += 1;
        self.begin_scope();

        // Pending-action locals: what a `return` or a re-raise inside the
        // protected region leaves for the landing pad below to act on once
        // `finally` has run. kind 0 = nothing pending, 1 = return, 2 = raise.
        self.emit_constant(make_number_value(0.0));
        self.add_local(Self::synthetic_token("@try_kind"));
        self.mark_initialized();
        let kind_slot = (self.current_locals().len() - 1) as u8;

        self.emit_byte(OpCode::Nil.to_byte());
        self.add_local(Self::synthetic_token("@try_value"));
        self.mark_initialized();
        let value_slot = (self.current_locals().len() - 1) as u8;

        self.current_compiler_mut().try_contexts.push(TryContext { kind_slot, value_slot, exit_jumps: vec![] });

        let push_try = self.emit_jump_bytes(OpCode::PushTry.to_byte());
        self.consume(TokenType::LeftBrace, "Expect '{' after 'try'.");
        self.begin_scope();
        self.block();
        self.end_scope();
        self.emit_byte(OpCode::PopTry.to_byte());
        let jump_over_catch = self.emit_jump_bytes(OpCode::Jump.to_byte());

        self.patch_jump_offset(push_try);
        if self.match_token(TokenType::Catch) {
            self.consume(TokenType::LeftParen, "Expect '(' after 'catch'.");
            self.consume(TokenType::Identifier, "Expect exception type name.");
            let class_name = self.previous.value.to_string();
            let class_const = self.identifier_constant(&class_name);
            let mut bound_name = None;
            if self.match_token(TokenType::As) {
                self.consume(TokenType::Identifier, "Expect binding name.");
                bound_name = Some(self.previous.clone());
            }
            self.consume(TokenType::RightParen, "Expect ')' after catch clause.");

            // Stack: [exception]. Only run this catch's body if the raised
            // instance's class chain contains the declared type; otherwise
            // this clause doesn't apply and the exception keeps propagating.
            self.emit_bytes(OpCode::GetGlobal.to_byte(), class_const);
            self.emit_byte(OpCode::MatchClass.to_byte());
            let mismatch_jump = self.emit_jump_bytes(OpCode::JumpIfFalse.to_byte());
            self.emit_byte(OpCode::Pop.to_byte());

            self.begin_scope();
            match bound_name {
                Some(name) => {
                    self.add_local(name);
                    self.mark_initialized();
                }
                None => self.emit_byte(OpCode::Pop.to_byte()),
            }
            self.consume(TokenType::LeftBrace, "Expect '{' after catch clause.");
            self.block();
            self.end_scope();
            let skip_rethrow = self.emit_jump_bytes(OpCode::Jump.to_byte());

            self.patch_jump_offset(mismatch_jump);
            self.emit_byte(OpCode::Pop.to_byte());
            self.emit_pending_exit(2.0);
            self.patch_jump_offset(skip_rethrow);
        } else {
            // No catch clause at all: whatever reaches here must keep
            // propagating once finally has run, not be swallowed.
            self.emit_pending_exit(2.0);
        }
        self.patch_jump_offset(jump_over_catch);

        let ctx = self.current_compiler_mut().try_contexts.pop().expect("try context");

        // Every exit from the protected region — normal completion, a
        // matched catch, a type-mismatch/no-catch re-raise, and a redirected
        // return — converges here, so `finally` runs exactly once no matter
        // which path was taken.
        for jump in &ctx.exit_jumps {
            self.patch_jump_offset(*jump);
        }

        if self.match_token(TokenType::Finally) {
            self.consume(TokenType::LeftBrace, "Expect '{' after 'finally'.");
            self.begin_scope();
            self.block();
            self.end_scope();
        }

        // Landing pad: resume whatever was pending once finally has had its
        // say. A `return` inside finally itself bypasses this entirely
        // (compiled as a real `OpCode::Return`, or redirected to an outer
        // try's own landing pad), which is how it supersedes these.
        self.emit_bytes(OpCode::GetLocal.to_byte(), ctx.kind_slot);
        self.emit_constant(make_number_value(1.0));
        self.emit_byte(OpCode::Equal.to_byte());
        let not_return = self.emit_jump_bytes(OpCode::JumpIfFalse.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());
        self.emit_bytes(OpCode::GetLocal.to_byte(), ctx.value_slot);
        self.emit_byte(OpCode::Return.to_byte());
        self.patch_jump_offset(not_return);
        self.emit_byte(OpCode::Pop.to_byte());

        self.emit_bytes(OpCode::GetLocal.to_byte(), ctx.kind_slot);
        self.emit_constant(make_number_value(2.0));
        self.emit_byte(OpCode::Equal.to_byte());
        let not_raise = self.emit_jump_bytes(OpCode::JumpIfFalse.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());
        self.emit_bytes(OpCode::GetLocal.to_byte(), ctx.value_slot);
        self.emit_byte(OpCode::Raise.to_byte());
        self.patch_jump_offset(not_raise);
        self.emit_byte(OpCode::Pop.to_byte());

        self.end_scope();
        self.current_compiler_mut().handler_depth -= 1;
    }

    fn if_statement(&mut self) {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump_bytes(OpCode::JumpIfFalse.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());
        self.statement();

        let else_jump = self.emit_jump_bytes(OpCode::Jump.to_byte());
        self.patch_jump_offset(then_jump);
        self.emit_byte(OpCode::Pop.to_byte());

        if self.match_token(TokenType::Else) {
            self.statement();
        }
        self.patch_jump_offset(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().len();
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump_bytes(OpCode::JumpIfFalse.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump_offset(exit_jump);
        self.emit_byte(OpCode::Pop.to_byte());
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenType::Semicolon) {
            // no initializer
        } else if self.match_token(TokenType::Var) {
            self.variable_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().len();
        let mut exit_jump: Option<u16> = None;
        if !self.match_token(TokenType::Semicolon) {
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump_bytes(OpCode::JumpIfFalse.to_byte()));
            self.emit_byte(OpCode::Pop.to_byte());
        }

        if !self.match_token(TokenType::RightParen) {
            let body_jump = self.emit_jump_bytes(OpCode::Jump.to_byte());
            let increment_start = self.current_chunk().len();
            self.expression();
            self.emit_byte(OpCode::Pop.to_byte());
            self.consume(TokenType::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump_offset(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(offset) = exit_jump {
            self.patch_jump_offset(offset);
            self.emit_byte(OpCode::Pop.to_byte());
        }
        self.end_scope();
    }

    fn foreach_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after 'foreach'.");
        self.consume(TokenType::Var, "Expect 'var' in foreach clause.");
        self.consume(TokenType::Identifier, "Expect loop variable name.");
        let item_name = self.previous.clone();
        self.consume(TokenType::In, "Expect 'in' after foreach variable.");

        self.expression();
        self.add_local(Self::synthetic_token("@iter"));
        self.mark_initialized();
        let iter_slot = (self.current_locals().len() - 1) as u8;
        self.consume(TokenType::RightParen, "Expect ')' after foreach clause.");

        self.emit_constant(make_number_value(0.0));
        self.add_local(Self::synthetic_token("@index"));
        self.mark_initialized();
        let index_slot = (self.current_locals().len() - 1) as u8;

        let loop_start = self.current_chunk().len();
        self.emit_bytes(OpCode::GetLocal.to_byte(), index_slot);
        self.emit_len_call(iter_slot);
        self.emit_byte(OpCode::Less.to_byte());
        let exit_jump = self.emit_jump_bytes(OpCode::JumpIfFalse.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());

        self.begin_scope();
        self.emit_bytes(OpCode::GetLocal.to_byte(), iter_slot);
        self.emit_bytes(OpCode::GetLocal.to_byte(), index_slot);
        self.emit_byte(OpCode::ForeachGet.to_byte());
        self.add_local(item_name);
        self.mark_initialized();

        self.statement();
        self.end_scope();

        self.emit_bytes(OpCode::GetLocal.to_byte(), index_slot);
        self.emit_constant(make_number_value(1.0));
        self.emit_byte(OpCode::Add.to_byte());
        self.emit_bytes(OpCode::SetLocal.to_byte(), index_slot);
        self.emit_byte(OpCode::Pop.to_byte());

        self.emit_loop(loop_start);
        self.patch_jump_offset(exit_jump);
        self.emit_byte(OpCode::Pop.to_byte());
        self.end_scope();
    }

    fn emit_len_call(&mut self, local_slot: u8) {
        let name_const = self.identifier_constant("len");
        self.emit_bytes(OpCode::GetGlobal.to_byte(), name_const);
        self.emit_bytes(OpCode::GetLocal.to_byte(), local_slot);
        self.emit_bytes(OpCode::Call.to_byte(), 1);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after expression.");
        self.emit_byte(OpCode::Pop.to_byte());
    }

    fn emit_jump_bytes(&mut self, instruction: u8) -> u16 {
        self.emit_byte(instruction);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        (self.current_chunk().len() - 2) as u16
    }

    fn patch_jump_offset(&mut self, offset: u16) {
        let jump = self.current_chunk().len() as u16 - offset - 2;
        let chunk = self.current_chunk_mut();
        chunk.write_by_offset(offset as usize, ((jump >> 8) & 0xff) as u8);
        chunk.write_by_offset(offset as usize + 1, (jump & 0xff) as u8);
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_byte(OpCode::Loop.to_byte());
        let offset = self.current_chunk().len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        self.emit_byte(((offset as u16 >> 8) & 0xff) as u8);
        self.emit_byte((offset as u16 & 0xff) as u8);
    }

    // ---- expressions ----

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        let prefix = self.rules[self.previous.token_type as usize].prefix;
        match prefix {
            Some(rule) => rule(self, can_assign),
            None => {
                self.error("Expect expression.");
                return;
            }
        }

        while precedence as u8 <= self.rules[self.current.token_type as usize].precedence as u8 {
            self.advance();
            let infix = self.rules[self.previous.token_type as usize].infix;
            match infix {
                Some(rule) => rule(self, can_assign),
                None => {
                    self.error("Expect infix expression.");
                    return;
                }
            }
        }

        if can_assign && self.match_token(TokenType::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self, _can_assign: bool) {
        let text = self.previous.value;
        let value = Self::parse_number_literal(text);
        self.emit_constant(make_number_value(value));
    }

    fn parse_number_literal(text: &str) -> f64 {
        if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            return i64::from_str_radix(rest, 16).unwrap_or(0) as f64;
        }
        if let Some(rest) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
            return i64::from_str_radix(rest, 2).unwrap_or(0) as f64;
        }
        if let Some(rest) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
            return i64::from_str_radix(rest, 8).unwrap_or(0) as f64;
        }
        text.parse::<f64>().unwrap_or(0.0)
    }

    /// Each interpolated segment is coerced to a string with a dedicated
    /// opcode before concatenation, so `Add` itself never has to guess
    /// whether a mixed-type `+` came from an interpolation or user code
    /// (spec.md §4.4: "concatenated with the + operator applied to the
    /// string coercion of each expression").
    fn string(&mut self, _can_assign: bool) {
        let raw = self.previous.value;
        let segments = self.parse_interpolated_string(raw);
        let mut first = true;
        for segment in segments {
            match segment {
                Segment::Literal(text) => {
                    let value = self.string_constant(&text);
                    self.emit_constant(value);
                }
                Segment::Expr(source) => {
                    self.compile_nested_expression(source);
                    self.emit_byte(OpCode::ToString.to_byte());
                }
            }
            if !first {
                self.emit_byte(OpCode::Add.to_byte());
            }
            first = false;
        }
    }

    fn parse_interpolated_string(&self, raw: &'a str) -> Vec<Segment<'a>> {
        let inner = &raw[1..raw.len() - 1];
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = inner.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some(&(_, esc)) = chars.peek() {
                        chars.next();
                        literal.push(match esc {
                            'n' => '\n',
                            't' => '\t',
                            '"' => '"',
                            '\\' => '\\',
                            '{' => '{',
                            '}' => '}',
                            other => other,
                        });
                    }
                }
                '{' => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let start = idx + c.len_utf8();
                    let mut depth = 1usize;
                    let mut end = start;
                    while let Some(&(j, cc)) = chars.peek() {
                        if cc == '{' {
                            depth += 1;
                        } else if cc == '}' {
                            depth -= 1;
                            if depth == 0 {
                                end = j;
                                chars.next();
                                break;
                            }
                        }
                        chars.next();
                        end = j + cc.len_utf8();
                    }
                    segments.push(Segment::Expr(&inner[start..end]));
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() || segments.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        segments
    }

    /// Compiles `source` (a slice of the enclosing source text) as a
    /// standalone expression, reusing the current function context so locals
    /// in scope remain visible inside `{…}` interpolations.
    fn compile_nested_expression(&mut self, source: &'a str) {
        self.interpolation_depth += 1;
        if self.interpolation_depth > crate::constants::INTERPOLATION_MAX_DEPTH {
            self.error("String interpolation nested too deeply.");
        }
        let saved_scanner = self.scanner.take();
        let saved_current = self.current.clone();
        let saved_previous = self.previous.clone();

        self.scanner = Some(Scanner::new(source));
        self.current = Token { token_type: TokenType::Eof, value: "", line: 0 };
        self.previous = self.current.clone();
        self.advance();
        self.expression();

        self.scanner = saved_scanner;
        self.current = saved_current;
        self.previous = saved_previous;
        self.interpolation_depth -= 1;
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.token_type {
            TokenType::False => self.emit_byte(OpCode::False.to_byte()),
            TokenType::True => self.emit_byte(OpCode::True.to_byte()),
            TokenType::Nil => self.emit_byte(OpCode::Nil.to_byte()),
            TokenType::Empty => self.emit_byte(OpCode::Empty.to_byte()),
            _ => unreachable!("unexpected literal token"),
        }
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.token_type;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenType::Bang => self.emit_byte(OpCode::Not.to_byte()),
            TokenType::Minus => self.emit_byte(OpCode::Negate.to_byte()),
            _ => unreachable!("expected unary operator"),
        }
    }

    /// Prefix `++x` / `--x`: increments the named local/global then leaves the
    /// new value on the stack, matching the `|-> ++n` counter idiom.
    fn prefix_step(&mut self, _can_assign: bool) {
        let operator = self.previous.token_type;
        self.consume(TokenType::Identifier, "Expect variable after '++' or '--'.");
        let name = self.previous.clone();

        let (get_op, set_op, slot) = self.resolve_named(name);
        self.emit_bytes(get_op, slot);
        self.emit_constant(make_number_value(1.0));
        self.emit_byte(if operator == TokenType::PlusPlus {
            OpCode::Add.to_byte()
        } else {
            OpCode::Subtract.to_byte()
        });
        self.emit_bytes(set_op, slot);
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.token_type;
        let rule_precedence = self.rules[operator as usize].precedence as u8;
        self.parse_precedence((rule_precedence + 1).into());

        match operator {
            TokenType::BangEqual => self.emit_bytes(OpCode::Equal.to_byte(), OpCode::Not.to_byte()),
            TokenType::EqualEqual => self.emit_byte(OpCode::Equal.to_byte()),
            TokenType::Greater => self.emit_byte(OpCode::Greater.to_byte()),
            TokenType::GreaterEqual => self.emit_bytes(OpCode::Less.to_byte(), OpCode::Not.to_byte()),
            TokenType::Less => self.emit_byte(OpCode::Less.to_byte()),
            TokenType::LessEqual => self.emit_bytes(OpCode::Greater.to_byte(), OpCode::Not.to_byte()),
            TokenType::Plus => self.emit_byte(OpCode::Add.to_byte()),
            TokenType::Minus => self.emit_byte(OpCode::Subtract.to_byte()),
            TokenType::Star => self.emit_byte(OpCode::Multiply.to_byte()),
            TokenType::Slash => self.emit_byte(OpCode::Divide.to_byte()),
            TokenType::Percent => self.emit_byte(OpCode::Modulo.to_byte()),
            _ => unreachable!("unexpected binary operator"),
        }
    }

    fn and(&mut self, _can_assign: bool) {
        let jump = self.emit_jump_bytes(OpCode::JumpIfFalse.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());
        self.parse_precedence(Precedence::And);
        self.patch_jump_offset(jump);
    }

    fn or(&mut self, _can_assign: bool) {
        let jump = self.emit_jump_bytes(OpCode::JumpIfTrue.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());
        self.parse_precedence(Precedence::Or);
        self.patch_jump_offset(jump);
    }

    fn call(&mut self, _can_assign: bool) {
        let argument_count = self.argument_list();
        self.emit_bytes(OpCode::Call.to_byte(), argument_count);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count = 0u32;
        if !self.check(TokenType::RightParen) {
            loop {
                self.expression();
                if count as usize >= MAX_ARGUMENTS {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after arguments.");
        count as u8
    }

    fn list_literal(&mut self, _can_assign: bool) {
        let mut count = 0u32;
        if !self.check(TokenType::RightBracket) {
            loop {
                self.expression();
                count += 1;
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightBracket, "Expect ']' after list literal.");
        self.emit_bytes(OpCode::BuildList.to_byte(), count as u8);
    }

    fn dict_literal(&mut self, _can_assign: bool) {
        let mut count = 0u32;
        if !self.check(TokenType::RightBrace) {
            loop {
                self.expression();
                self.consume(TokenType::Colon, "Expect ':' after dict key.");
                self.expression();
                count += 1;
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightBrace, "Expect '}' after dict literal.");
        self.emit_bytes(OpCode::BuildDict.to_byte(), count as u8);
    }

    fn index_access(&mut self, can_assign: bool) {
        self.expression();
        self.consume(TokenType::RightBracket, "Expect ']' after index.");
        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_byte(OpCode::SetIndex.to_byte());
        } else {
            self.emit_byte(OpCode::GetIndex.to_byte());
        }
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenType::Identifier, "Expect property name after '.'.");
        let name_const = self.identifier_constant(self.previous.value);
        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_bytes(OpCode::SetProperty.to_byte(), name_const);
        } else if self.match_token(TokenType::LeftParen) {
            let argument_count = self.argument_list();
            self.emit_bytes(OpCode::Invoke.to_byte(), name_const);
            self.emit_byte(argument_count);
        } else {
            self.emit_bytes(OpCode::GetProperty.to_byte(), name_const);
        }
    }

    fn this(&mut self, _can_assign: bool) {
        if self.class_compilers.is_empty() {
            self.error("Can't use 'this' outside of a class method.");
        }
        self.variable(false);
    }

    fn super_(&mut self, _can_assign: bool) {
        if self.class_compilers.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self.class_compilers.last().unwrap().has_superclass {
            self.error("Can't use 'super' in a class with no superclass.");
        }
        self.consume(TokenType::Dot, "Expect '.' after 'super'.");
        self.consume(TokenType::Identifier, "Expect superclass method name.");
        let name_const = self.identifier_constant(self.previous.value);

        self.named_variable(Self::synthetic_token("this"), false);
        if self.match_token(TokenType::LeftParen) {
            let argument_count = self.argument_list();
            self.named_variable(Self::synthetic_token("super"), false);
            self.emit_bytes(OpCode::SuperInvoke.to_byte(), name_const);
            self.emit_byte(argument_count);
        } else {
            self.named_variable(Self::synthetic_token("super"), false);
            self.emit_bytes(OpCode::GetSuper.to_byte(), name_const);
        }
    }

    /// `|a, b| -> expr` or `|-> expr` (no parameters): an anonymous function
    /// whose body is a single expression, implicitly returned.
    fn lambda(&mut self, _can_assign: bool) {
        self.init_compiler(FunctionType::Lambda, "");
        self.begin_scope();

        if self.previous.token_type == TokenType::Pipe {
            if !self.check(TokenType::Pipe) {
                loop {
                    self.current_compiler_mut().function.arity += 1;
                    let constant = self.parse_variable("Expect parameter name.");
                    self.define_variable(constant);
                    if !self.match_token(TokenType::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenType::Pipe, "Expect '|' after lambda parameters.");
            self.consume(TokenType::Arrow, "Expect '->' after lambda parameters.");
        }

        self.expression();
        self.emit_byte(OpCode::Return.to_byte());

        self.emit_closure_from_current();
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.clone();
        self.named_variable(name, can_assign);
    }

    fn resolve_named(&mut self, name: Token<'a>) -> (u8, u8, u8) {
        let compiler_index = self.compilers.len() - 1;
        let mut slot = self.resolve_local(compiler_index, &name);
        if slot >= 0 {
            return (OpCode::GetLocal.to_byte(), OpCode::SetLocal.to_byte(), slot as u8);
        }
        slot = self.resolve_upvalue(compiler_index, &name);
        if slot >= 0 {
            return (OpCode::GetUpvalue.to_byte(), OpCode::SetUpvalue.to_byte(), slot as u8);
        }
        let global = self.identifier_constant(name.value);
        (OpCode::GetGlobal.to_byte(), OpCode::SetGlobal.to_byte(), global)
    }

    fn named_variable(&mut self, name: Token<'a>, can_assign: bool) {
        let (get_op, set_op, slot) = self.resolve_named(name);
        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_bytes(set_op, slot);
        } else {
            self.emit_bytes(get_op, slot);
        }
    }

    fn resolve_local(&self, compiler_index: usize, name: &Token<'a>) -> i32 {
        let compiler = self.specific_compiler(compiler_index);
        for (index, local) in compiler.locals.iter().enumerate().rev() {
            if local.name.value == name.value {
                if local.depth == -1 {
                    self.error_static("Can't read local variable in its own initializer.");
                }
                return index as i32;
            }
        }
        -1
    }

    fn resolve_upvalue(&mut self, compiler_index: usize, name: &Token<'a>) -> i32 {
        if compiler_index == 0 {
            return -1;
        }
        let local = self.resolve_local(compiler_index - 1, name);
        if local != -1 {
            self.specific_compiler_mut(compiler_index - 1).locals[local as usize].captured = true;
            return self.add_upvalue(compiler_index, local, true) as i32;
        }
        let upvalue = self.resolve_upvalue(compiler_index - 1, name);
        if upvalue != -1 {
            return self.add_upvalue(compiler_index, upvalue, false) as i32;
        }
        -1
    }

    fn add_upvalue(&mut self, compiler_index: usize, index: i32, is_local: bool) -> usize {
        let compiler = self.specific_compiler_mut(compiler_index);
        for (i, upvalue) in compiler.upvalues.iter().enumerate() {
            if upvalue.is_local == is_local && upvalue.index == index as usize {
                return i;
            }
        }
        if compiler.upvalues.len() >= MAX_PARAMETERS {
            self.error("Too many closure variables in one function.");
            return 0;
        }
        let compiler = self.specific_compiler_mut(compiler_index);
        compiler.upvalues.push(Upvalue { index: index as usize, is_local });
        compiler.upvalues.len() - 1
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.token_type != TokenType::Eof {
            if self.previous.token_type == TokenType::Semicolon {
                return;
            }
            match self.current.token_type {
                TokenType::Class
                | TokenType::Def
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Echo
                | TokenType::Return
                | TokenType::Try => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn error(&mut self, message: &'static str) {
        self.panic_mode = true;
        self.has_error = true;
        eprintln!("[line {}] Error: {}", self.previous.line, message);
    }

    fn error_static(&self, message: &'static str) {
        eprintln!("[line {}] Error: {}", self.previous.line, message);
    }

    fn error_at_current(&mut self, message: &'static str) {
        self.panic_mode = true;
        self.has_error = true;
        eprintln!("[line {}] Error: {}", self.current.line, message);
    }
}
