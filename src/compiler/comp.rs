use std::collections::HashMap;
use std::rc::Rc;

use crate::{
    core::Loc,
    errors,
    lexer::{Scanner, Token},
    vm::StringPool,
    LoxError,
};

use super::{Chunk, Constant, Function, OpCode, VarRef};

// Local and upvalue slots are single-byte operands.
const MAX_LOCALS: usize = 256;
const MAX_UPVALUES: usize = 256;

/// What kind of function body the current compiler state is emitting
/// into; methods and initializers get `this` in slot zero and
/// initializers return their receiver implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

/// Binding precedence, weakest first. Each infix operator binds its right
/// operand at the next level up (left associativity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
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
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn<'a, 'p> = fn(&mut Parser<'a, 'p>, bool);

struct ParseRule<'a, 'p> {
    prefix: Option<ParseFn<'a, 'p>>,
    infix: Option<ParseFn<'a, 'p>>,
    precedence: Precedence,
}

struct Local {
    name: String,
    // None until the initializer finishes; reading the variable before
    // then is an error.
    depth: Option<usize>,
    captured: bool,
}

/// Per-function compilation state. One of these lives on the parser's
/// stack for every function body currently open.
struct FnCompiler {
    function: Function,
    kind: FunctionKind,
    locals: Vec<Local>,
    upvalues: Vec<VarRef>,
    scope_depth: usize,
    // Identifier lexeme -> constant index, so repeated references to one
    // name share a single pool entry.
    identifiers: HashMap<String, u8>,
}

struct ClassCompiler {
    has_superclass: bool,
}

macro_rules! check {
    ($self:ident, $($token:ident)|+) => {
        matches!($self.current, $(Some(Token::$token(..)))|+)
    };
}

macro_rules! matches_token {
    ($self:ident, $($token:ident)|+) => {
        if check!($self, $($token)|+) {
            $self.advance();
            true
        } else {
            false
        }
    };
}

macro_rules! consume {
    ($self:ident, $token:ident, $message:expr) => {
        if check!($self, $token) {
            $self.advance();
        } else {
            $self.error_at_current($message);
        }
    };
}

/// The single-pass compiler: a Pratt parser which emits bytecode straight
/// into the function under construction, no syntax tree in between.
pub(super) struct Parser<'a, 'p> {
    scanner: Scanner<'a>,
    strings: &'p mut StringPool,
    previous: Option<Token>,
    current: Option<Token>,
    last_loc: Loc,
    compilers: Vec<FnCompiler>,
    classes: Vec<ClassCompiler>,
    errors: Vec<LoxError>,
    panic_mode: bool,
}

impl<'a, 'p> Parser<'a, 'p> {
    pub fn new(source: &'a str, strings: &'p mut StringPool) -> Self {
        let mut parser = Self {
            scanner: Scanner::new(source),
            strings,
            previous: None,
            current: None,
            last_loc: Loc::new(1, 1),
            compilers: Vec::new(),
            classes: Vec::new(),
            errors: Vec::new(),
            panic_mode: false,
        };

        parser.push_compiler(FunctionKind::Script, None);
        parser
    }

    pub fn compile(mut self) -> Result<Rc<Function>, Vec<LoxError>> {
        self.advance();
        while self.current.is_some() {
            self.declaration();
        }

        let (function, _) = self.pop_compiler();
        if self.errors.is_empty() {
            Ok(Rc::new(function))
        } else {
            Err(self.errors)
        }
    }

    // ---- token pump and diagnostics ----

    fn advance(&mut self) {
        self.previous = self.current.take();

        loop {
            match self.scanner.next() {
                // Lexical faults arrive as tokens; report and keep pumping
                // so the parser only ever sees well-formed tokens.
                Some(Token::Error(loc, message)) => {
                    self.last_loc = loc;
                    if !self.panic_mode {
                        self.panic_mode = true;
                        self.errors.push(errors::lexical(loc, message));
                    }
                }
                token => {
                    if let Some(token) = &token {
                        self.last_loc = token.location();
                    }
                    self.current = token;
                    break;
                }
            }
        }
    }

    fn error(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(token, message);
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current.clone();
        self.error_at(token, message);
    }

    fn error_at(&mut self, token: Option<Token>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;

        let err = match token {
            Some(token) => errors::parse(token.location(), token.lexeme(), message),
            None => errors::parse_at_end(self.last_loc, message),
        };
        self.errors.push(err);
    }

    /// Skips to a statement boundary after an error so one mistake does
    /// not cascade into a wall of diagnostics.
    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.is_some() {
            if matches!(self.previous, Some(Token::Semicolon(..))) {
                return;
            }

            if check!(self, Class | Fun | Var | For | If | While | Print | Return) {
                return;
            }

            self.advance();
        }
    }

    fn previous_lexeme(&self) -> String {
        self.previous
            .as_ref()
            .map(|token| token.lexeme().to_string())
            .unwrap_or_default()
    }

    fn line(&self) -> usize {
        self.previous
            .as_ref()
            .map(|token| token.location().line())
            .unwrap_or_else(|| self.last_loc.line())
    }

    // ---- compiler-state stack ----

    fn push_compiler(&mut self, kind: FunctionKind, name: Option<String>) {
        let name = name.map(|name| self.strings.intern(name));
        let mut compiler = FnCompiler {
            function: Function::new(name),
            kind,
            locals: Vec::new(),
            upvalues: Vec::new(),
            scope_depth: 0,
            identifiers: HashMap::new(),
        };

        // Slot zero holds the callee; methods and initializers see it as
        // `this`, plain functions cannot name it.
        let slot_zero = match kind {
            FunctionKind::Method | FunctionKind::Initializer => "this",
            _ => "",
        };
        compiler.locals.push(Local {
            name: slot_zero.to_string(),
            depth: Some(0),
            captured: false,
        });

        self.compilers.push(compiler);
    }

    fn pop_compiler(&mut self) -> (Function, Vec<VarRef>) {
        self.emit_return();

        let compiler = self
            .compilers
            .pop()
            .expect("the compiler stack is never empty");
        let mut function = compiler.function;
        function.upvalue_count = compiler.upvalues.len();
        (function, compiler.upvalues)
    }

    fn compiler(&mut self) -> &mut FnCompiler {
        self.compilers
            .last_mut()
            .expect("the compiler stack is never empty")
    }

    fn compiler_kind(&self) -> FunctionKind {
        self.compilers
            .last()
            .map(|compiler| compiler.kind)
            .unwrap_or(FunctionKind::Script)
    }

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.compiler().function.chunk
    }

    fn chunk_len(&mut self) -> usize {
        self.chunk().len()
    }

    // ---- emitters ----

    fn emit_byte(&mut self, byte: u8) {
        let line = self.line();
        self.chunk().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        let line = self.line();
        self.chunk().write_op(op, line);
    }

    fn emit_ops(&mut self, first: OpCode, second: OpCode) {
        self.emit_op(first);
        self.emit_op(second);
    }

    fn emit_return(&mut self) {
        if self.compiler_kind() == FunctionKind::Initializer {
            // An initializer implicitly returns its receiver.
            self.emit_op(OpCode::GetLocal);
            self.emit_byte(0);
        } else {
            self.emit_op(OpCode::Nil);
        }

        self.emit_op(OpCode::Return);
    }

    fn make_constant(&mut self, constant: Constant) -> u8 {
        let index = self.chunk().add_constant(constant);
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }

        index as u8
    }

    fn emit_constant(&mut self, constant: Constant) {
        let index = self.make_constant(constant);
        self.emit_op(OpCode::Constant);
        self.emit_byte(index);
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        if let Some(index) = self.compiler().identifiers.get(name) {
            return *index;
        }

        let string = self.strings.intern(name);
        let index = self.make_constant(Constant::String(string));
        self.compiler().identifiers.insert(name.to_string(), index);
        index
    }

    /// Emits a forward jump with a placeholder offset and returns the
    /// offset operand's position for patching.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk_len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        // The offset is measured from just past the two operand bytes.
        let jump = self.chunk_len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }

        self.chunk().patch(offset, ((jump >> 8) & 0xff) as u8);
        self.chunk().patch(offset + 1, (jump & 0xff) as u8);
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);

        let offset = self.chunk_len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }

        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    // ---- scopes, locals, upvalues ----

    fn begin_scope(&mut self) {
        self.compiler().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let depth = {
            let compiler = self.compiler();
            compiler.scope_depth -= 1;
            compiler.scope_depth
        };

        loop {
            let captured = {
                let compiler = self.compiler();
                match compiler.locals.last() {
                    Some(local) if local.depth.map_or(false, |d| d > depth) => {
                        Some(local.captured)
                    }
                    _ => None,
                }
            };

            match captured {
                Some(true) => {
                    self.compiler().locals.pop();
                    self.emit_op(OpCode::CloseUpvalue);
                }
                Some(false) => {
                    self.compiler().locals.pop();
                    self.emit_op(OpCode::Pop);
                }
                None => break,
            }
        }
    }

    fn declare_variable(&mut self, name: &str) {
        let scope_depth = self.compiler().scope_depth;
        if scope_depth == 0 {
            return;
        }

        let mut duplicate = false;
        for local in self.compiler().locals.iter().rev() {
            if local.depth.map_or(false, |depth| depth < scope_depth) {
                break;
            }
            if local.name == name {
                duplicate = true;
                break;
            }
        }

        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }

        self.add_local(name);
    }

    fn add_local(&mut self, name: &str) {
        if self.compiler().locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }

        self.compiler().locals.push(Local {
            name: name.to_string(),
            depth: None,
            captured: false,
        });
    }

    fn mark_initialized(&mut self) {
        let compiler = self.compiler();
        if compiler.scope_depth == 0 {
            return;
        }

        let depth = compiler.scope_depth;
        if let Some(local) = compiler.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        consume!(self, Identifier, message);

        let name = self.previous_lexeme();
        self.declare_variable(&name);
        if self.compiler().scope_depth > 0 {
            return 0;
        }

        self.identifier_constant(&name)
    }

    fn define_variable(&mut self, global: u8) {
        if self.compiler().scope_depth > 0 {
            self.mark_initialized();
            return;
        }

        self.emit_op(OpCode::DefineGlobal);
        self.emit_byte(global);
    }

    fn resolve_local(&mut self, compiler: usize, name: &str) -> Option<u8> {
        let found = self.compilers[compiler]
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| local.name == name)
            .map(|(slot, local)| (slot, local.depth.is_none()));

        match found {
            Some((slot, uninitialized)) => {
                if uninitialized {
                    self.error("Can't read local variable in its own initializer.");
                }
                Some(slot as u8)
            }
            None => None,
        }
    }

    /// Looks the name up in enclosing functions, threading a chain of
    /// upvalues down to the requesting one. The enclosing local is marked
    /// captured so scope exit closes it instead of popping it.
    fn resolve_upvalue(&mut self, compiler: usize, name: &str) -> Option<u8> {
        if compiler == 0 {
            return None;
        }
        let enclosing = compiler - 1;

        if let Some(local) = self.resolve_local(enclosing, name) {
            self.compilers[enclosing].locals[local as usize].captured = true;
            return self.add_upvalue(compiler, VarRef::Local(local));
        }

        if let Some(upvalue) = self.resolve_upvalue(enclosing, name) {
            return self.add_upvalue(compiler, VarRef::Upvalue(upvalue));
        }

        None
    }

    fn add_upvalue(&mut self, compiler: usize, reference: VarRef) -> Option<u8> {
        let existing = self.compilers[compiler]
            .upvalues
            .iter()
            .position(|upvalue| *upvalue == reference);
        if let Some(index) = existing {
            return Some(index as u8);
        }

        if self.compilers[compiler].upvalues.len() >= MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return Some(0);
        }

        self.compilers[compiler].upvalues.push(reference);
        Some((self.compilers[compiler].upvalues.len() - 1) as u8)
    }

    fn named_variable(&mut self, name: &str, can_assign: bool) {
        let top = self.compilers.len() - 1;
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(top, name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue(top, name) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, slot)
        } else {
            let index = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, index)
        };

        if can_assign && matches_token!(self, Equal) {
            self.expression();
            self.emit_op(set_op);
        } else {
            self.emit_op(get_op);
        }
        self.emit_byte(arg);
    }

    // ---- declarations and statements ----

    fn declaration(&mut self) {
        if matches_token!(self, Class) {
            self.class_declaration();
        } else if matches_token!(self, Fun) {
            self.fun_declaration();
        } else if matches_token!(self, Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        consume!(self, Identifier, "Expect class name.");
        let class_name = self.previous_lexeme();
        let name_constant = self.identifier_constant(&class_name);
        self.declare_variable(&class_name);

        self.emit_op(OpCode::Class);
        self.emit_byte(name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassCompiler {
            has_superclass: false,
        });

        if matches_token!(self, Less) {
            consume!(self, Identifier, "Expect superclass name.");
            let superclass_name = self.previous_lexeme();
            self.variable(false);

            if superclass_name == class_name {
                self.error("A class can't inherit from itself.");
            }

            // `super` lives in a scope of its own so every method closure
            // of this class captures the same superclass binding.
            self.begin_scope();
            self.add_local("super");
            self.define_variable(0);

            self.named_variable(&class_name, false);
            self.emit_op(OpCode::Inherit);

            if let Some(class) = self.classes.last_mut() {
                class.has_superclass = true;
            }
        }

        self.named_variable(&class_name, false);
        consume!(self, LeftBrace, "Expect '{' before class body.");
        while !check!(self, RightBrace) && self.current.is_some() {
            self.method();
        }
        consume!(self, RightBrace, "Expect '}' after class body.");
        self.emit_op(OpCode::Pop);

        let has_superclass = self
            .classes
            .last()
            .map(|class| class.has_superclass)
            .unwrap_or_default();
        if has_superclass {
            self.end_scope();
        }
        self.classes.pop();
    }

    fn method(&mut self) {
        consume!(self, Identifier, "Expect method name.");
        let name = self.previous_lexeme();
        let constant = self.identifier_constant(&name);

        let kind = if name == "init" {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };
        self.function(kind);

        self.emit_op(OpCode::Method);
        self.emit_byte(constant);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        // Initialized before the body so the function can call itself.
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    fn function(&mut self, kind: FunctionKind) {
        let name = self.previous_lexeme();
        self.push_compiler(kind, Some(name));
        self.begin_scope();

        consume!(self, LeftParen, "Expect '(' after function name.");
        if !check!(self, RightParen) {
            loop {
                let arity = {
                    let compiler = self.compiler();
                    compiler.function.arity += 1;
                    compiler.function.arity
                };
                if arity > 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }

                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);

                if !matches_token!(self, Comma) {
                    break;
                }
            }
        }
        consume!(self, RightParen, "Expect ')' after parameters.");

        consume!(self, LeftBrace, "Expect '{' before function body.");
        self.block();

        // No end_scope: the whole compiler state goes away with the body.
        let (function, upvalues) = self.pop_compiler();
        let index = self.make_constant(Constant::Function(Rc::new(function)));
        self.emit_op(OpCode::Closure);
        self.emit_byte(index);

        for upvalue in upvalues {
            match upvalue {
                VarRef::Local(slot) => {
                    self.emit_byte(1);
                    self.emit_byte(slot);
                }
                VarRef::Upvalue(slot) => {
                    self.emit_byte(0);
                    self.emit_byte(slot);
                }
            }
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if matches_token!(self, Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        consume!(self, Semicolon, "Expect ';' after variable declaration.");

        self.define_variable(global);
    }

    fn statement(&mut self) {
        if matches_token!(self, Print) {
            self.print_statement();
        } else if matches_token!(self, For) {
            self.for_statement();
        } else if matches_token!(self, If) {
            self.if_statement();
        } else if matches_token!(self, Return) {
            self.return_statement();
        } else if matches_token!(self, While) {
            self.while_statement();
        } else if matches_token!(self, LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !check!(self, RightBrace) && self.current.is_some() {
            self.declaration();
        }

        consume!(self, RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        consume!(self, Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        consume!(self, Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        consume!(self, LeftParen, "Expect '(' after 'if'.");
        self.expression();
        consume!(self, RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if matches_token!(self, Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk_len();
        consume!(self, LeftParen, "Expect '(' after 'while'.");
        self.expression();
        consume!(self, RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        consume!(self, LeftParen, "Expect '(' after 'for'.");

        if matches_token!(self, Semicolon) {
            // No initializer.
        } else if matches_token!(self, Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk_len();
        let mut exit_jump = None;
        if !matches_token!(self, Semicolon) {
            self.expression();
            consume!(self, Semicolon, "Expect ';' after loop condition.");

            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !matches_token!(self, RightParen) {
            // The body runs before the increment: jump over it, and have
            // the increment loop back to the condition while the body
            // loops back to the increment.
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.chunk_len();
            self.expression();
            self.emit_op(OpCode::Pop);
            consume!(self, RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }

        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.compiler_kind() == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }

        if matches_token!(self, Semicolon) {
            self.emit_return();
        } else {
            if self.compiler_kind() == FunctionKind::Initializer {
                self.error("Can't return a value from an initializer.");
            }

            self.expression();
            consume!(self, Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    // ---- expressions ----

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let prefix = self
            .previous
            .as_ref()
            .and_then(|token| Self::rule(token).prefix);
        let prefix = match prefix {
            Some(prefix) => prefix,
            None => {
                self.error("Expect expression.");
                return;
            }
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while self
            .current
            .as_ref()
            .map(|token| Self::rule(token).precedence >= precedence)
            .unwrap_or_default()
        {
            self.advance();
            let infix = self
                .previous
                .as_ref()
                .and_then(|token| Self::rule(token).infix);
            if let Some(infix) = infix {
                infix(self, can_assign);
            }
        }

        // An `=` nobody consumed means the target was not assignable.
        if can_assign && matches_token!(self, Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn rule(token: &Token) -> ParseRule<'a, 'p> {
        macro_rules! rule {
            ($prefix:expr, $infix:expr, $precedence:ident) => {
                ParseRule {
                    prefix: $prefix,
                    infix: $infix,
                    precedence: Precedence::$precedence,
                }
            };
        }

        match token {
            Token::LeftParen(..) => rule!(Some(Parser::grouping), Some(Parser::call), Call),
            Token::Dot(..) => rule!(None, Some(Parser::dot), Call),

            Token::Minus(..) => rule!(Some(Parser::unary), Some(Parser::binary), Term),
            Token::Plus(..) => rule!(None, Some(Parser::binary), Term),
            Token::Slash(..) | Token::Star(..) => rule!(None, Some(Parser::binary), Factor),

            Token::Bang(..) => rule!(Some(Parser::unary), None, None),
            Token::BangEqual(..) | Token::EqualEqual(..) => {
                rule!(None, Some(Parser::binary), Equality)
            }
            Token::Greater(..)
            | Token::GreaterEqual(..)
            | Token::Less(..)
            | Token::LessEqual(..) => rule!(None, Some(Parser::binary), Comparison),

            Token::Identifier(..) => rule!(Some(Parser::variable), None, None),
            Token::String(..) => rule!(Some(Parser::string), None, None),
            Token::Number(..) => rule!(Some(Parser::number), None, None),

            Token::And(..) => rule!(None, Some(Parser::and), And),
            Token::Or(..) => rule!(None, Some(Parser::or), Or),

            Token::False(..) | Token::Nil(..) | Token::True(..) => {
                rule!(Some(Parser::literal), None, None)
            }
            Token::Super(..) => rule!(Some(Parser::super_), None, None),
            Token::This(..) => rule!(Some(Parser::this), None, None),

            _ => rule!(None, None, None),
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        consume!(self, RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self, _can_assign: bool) {
        match self.previous_lexeme().parse::<f64>() {
            Ok(value) => self.emit_constant(Constant::Number(value)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    fn string(&mut self, _can_assign: bool) {
        let lexeme = self.previous_lexeme();
        // The lexeme keeps its quotes; the value drops them.
        let string = self.strings.intern(&lexeme[1..lexeme.len() - 1]);
        self.emit_constant(Constant::String(string));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous {
            Some(Token::False(..)) => self.emit_op(OpCode::False),
            Some(Token::Nil(..)) => self.emit_op(OpCode::Nil),
            Some(Token::True(..)) => self.emit_op(OpCode::True),
            _ => {}
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous_lexeme();
        self.named_variable(&name, can_assign);
    }

    fn this(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }

        self.named_variable("this", false);
    }

    fn super_(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self
            .classes
            .last()
            .map(|class| class.has_superclass)
            .unwrap_or_default()
        {
            self.error("Can't use 'super' in a class with no superclass.");
        }

        consume!(self, Dot, "Expect '.' after 'super'.");
        consume!(self, Identifier, "Expect superclass method name.");
        let name = self.previous_lexeme();
        let constant = self.identifier_constant(&name);

        self.named_variable("this", false);
        if matches_token!(self, LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable("super", false);
            self.emit_op(OpCode::SuperInvoke);
            self.emit_byte(constant);
            self.emit_byte(arg_count);
        } else {
            self.named_variable("super", false);
            self.emit_op(OpCode::GetSuper);
            self.emit_byte(constant);
        }
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.clone();
        self.parse_precedence(Precedence::Unary);

        match operator {
            Some(Token::Minus(..)) => self.emit_op(OpCode::Negate),
            Some(Token::Bang(..)) => self.emit_op(OpCode::Not),
            _ => {}
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.clone();
        let precedence = operator
            .as_ref()
            .map(|token| Self::rule(token).precedence)
            .unwrap_or(Precedence::None);
        self.parse_precedence(precedence.next());

        match operator {
            Some(Token::Plus(..)) => self.emit_op(OpCode::Add),
            Some(Token::Minus(..)) => self.emit_op(OpCode::Subtract),
            Some(Token::Star(..)) => self.emit_op(OpCode::Multiply),
            Some(Token::Slash(..)) => self.emit_op(OpCode::Divide),

            Some(Token::EqualEqual(..)) => self.emit_op(OpCode::Equal),
            Some(Token::BangEqual(..)) => self.emit_ops(OpCode::Equal, OpCode::Not),
            Some(Token::Greater(..)) => self.emit_op(OpCode::Greater),
            Some(Token::GreaterEqual(..)) => self.emit_ops(OpCode::Less, OpCode::Not),
            Some(Token::Less(..)) => self.emit_op(OpCode::Less),
            Some(Token::LessEqual(..)) => self.emit_ops(OpCode::Greater, OpCode::Not),
            _ => {}
        }
    }

    fn and(&mut self, _can_assign: bool) {
        // Short-circuit: the left operand is the result when falsey.
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or(&mut self, _can_assign: bool) {
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

    fn dot(&mut self, can_assign: bool) {
        consume!(self, Identifier, "Expect property name after '.'.");
        let name = self.previous_lexeme();
        let constant = self.identifier_constant(&name);

        if can_assign && matches_token!(self, Equal) {
            self.expression();
            self.emit_op(OpCode::SetProperty);
            self.emit_byte(constant);
        } else if matches_token!(self, LeftParen) {
            let arg_count = self.argument_list();
            self.emit_op(OpCode::Invoke);
            self.emit_byte(constant);
            self.emit_byte(arg_count);
        } else {
            self.emit_op(OpCode::GetProperty);
            self.emit_byte(constant);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: usize = 0;
        if !check!(self, RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                } else {
                    count += 1;
                }

                if !matches_token!(self, Comma) {
                    break;
                }
            }
        }

        consume!(self, RightParen, "Expect ')' after arguments.");
        count as u8
    }
}
