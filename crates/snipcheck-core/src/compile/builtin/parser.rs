//! Recursive-descent parser for the checked TypeScript subset.
//!
//! Arrow functions and explicit generic calls are recognized by
//! speculative parsing: the parser records a checkpoint, tries the
//! construct, and rewinds (discarding any errors) when it does not fit.

use super::SyntaxIssue;
use super::ast::*;
use super::lexer::{TemplatePart, Tok, Token, tokenize};

/// Words that can never name a binding.
const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw", "true", "try",
    "typeof", "var", "void", "while", "with",
];

const ASSIGN_OPS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "**=", "<<=", "&=", "|=", "^=", "&&=", "||=", "??=",
];

const MODIFIERS: &[&str] = &[
    "static",
    "public",
    "private",
    "protected",
    "readonly",
    "abstract",
    "override",
    "declare",
    "accessor",
    "async",
];

/// Deepest nesting of statements, expressions and types the parser descends
/// into. Keeps parser and checker recursion within a default thread stack.
pub const MAX_NESTING: usize = 96;

/// Longest run of binary operators in one expression. Each operator nests
/// the tree built so far one level deeper.
const MAX_OPERATOR_CHAIN: usize = 256;

/// Parse a unit. Syntax errors are returned alongside the (partial) tree.
pub fn parse(source: &str) -> (Program, Vec<SyntaxIssue>) {
    let mut issues = Vec::new();
    let tokens = tokenize(source, &mut issues);
    let mut parser = Parser {
        tokens,
        i: 0,
        issues,
        no_in: false,
        namespace_depth: 0,
        ambient_depth: 0,
        depth: 0,
        too_deep: false,
        is_module: false,
    };

    let mut body = Vec::new();
    while !parser.at_eof() {
        let before = parser.i;
        body.push(parser.parse_statement());
        if parser.i == before {
            parser.error_here("TS1128", "Declaration or statement expected.");
            parser.advance();
        }
    }

    let program = Program {
        body,
        is_module: parser.is_module,
        too_deep: parser.too_deep,
    };
    (program, parser.issues)
}

struct Parser {
    tokens: Vec<Token>,
    i: usize,
    issues: Vec<SyntaxIssue>,
    /// Inside a `for (...)` head: `in` is not a binary operator.
    no_in: bool,
    namespace_depth: usize,
    /// Inside `declare namespace` / `declare module`: declarations need no
    /// initializer.
    ambient_depth: usize,
    depth: usize,
    too_deep: bool,
    is_module: bool,
}

#[derive(Clone, Copy)]
struct Checkpoint {
    i: usize,
    issues: usize,
}

impl Parser {
    // =========================================================================
    // Token helpers
    // =========================================================================

    fn peek(&self) -> &Token {
        &self.tokens[self.i.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        &self.tokens[(self.i + ahead).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.i < self.tokens.len() - 1 {
            self.i += 1;
        }
        tok
    }

    fn at(&self, punct: &str) -> bool {
        self.peek().is(punct)
    }

    fn at_word(&self, word: &str) -> bool {
        self.peek().is_word(word)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().tok, Tok::Eof)
    }

    /// Enter one nesting level. Past [`MAX_NESTING`] the rest of the input
    /// is abandoned and `false` is returned; the caller must not recurse.
    fn enter(&mut self) -> bool {
        if self.too_deep || self.depth >= MAX_NESTING {
            self.abandon();
            return false;
        }
        self.depth += 1;
        true
    }

    fn abandon(&mut self) {
        self.too_deep = true;
        self.i = self.tokens.len() - 1;
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn eat(&mut self, punct: &str) -> bool {
        if self.at(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.at_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn pos(&self) -> Pos {
        self.peek().pos
    }

    fn error(&mut self, pos: Pos, code: &str, message: impl Into<String>) {
        self.issues.push(SyntaxIssue {
            pos,
            code: code.to_string(),
            message: message.into(),
        });
    }

    fn error_here(&mut self, code: &str, message: impl Into<String>) {
        let pos = self.pos();
        self.error(pos, code, message);
    }

    fn expect(&mut self, punct: &str) -> bool {
        if self.eat(punct) {
            true
        } else {
            self.error_here("TS1005", format!("'{punct}' expected."));
            false
        }
    }

    fn expect_word(&mut self, word: &str) -> bool {
        if self.eat_word(word) {
            true
        } else {
            self.error_here("TS1005", format!("'{word}' expected."));
            false
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            i: self.i,
            issues: self.issues.len(),
        }
    }

    fn restore(&mut self, cp: Checkpoint) {
        self.i = cp.i;
        self.issues.truncate(cp.issues);
    }

    fn clean_since(&self, cp: Checkpoint) -> bool {
        self.issues.len() == cp.issues
    }

    /// Automatic semicolon insertion.
    fn semicolon(&mut self) {
        if self.eat(";") {
            return;
        }
        let tok = self.peek();
        if tok.is("}") || matches!(tok.tok, Tok::Eof) || tok.newline_before {
            return;
        }
        self.error_here("TS1005", "';' expected.");
    }

    /// Whether the next token is adjacent to the current one (no whitespace).
    fn adjacent(&self, ahead: usize) -> bool {
        self.peek_at(ahead).start == self.peek_at(ahead - 1).end
    }

    fn next_on_same_line(&self) -> bool {
        !self.peek_at(1).newline_before
    }

    // =========================================================================
    // Names
    // =========================================================================

    fn is_identifier(&self) -> bool {
        matches!(&self.peek().tok, Tok::Ident(w) if !RESERVED.contains(&w.as_str()))
    }

    fn parse_ident(&mut self) -> Name {
        let pos = self.pos();
        if self.is_identifier() {
            let tok = self.advance();
            Name {
                text: tok.ident().unwrap_or_default().to_string(),
                pos,
            }
        } else {
            self.error_here("TS1003", "Identifier expected.");
            Name {
                text: String::new(),
                pos,
            }
        }
    }

    /// Property name after `.` or in a literal/member position.
    fn parse_property_name(&mut self) -> Option<PropKey> {
        let tok = self.peek().clone();
        match tok.tok {
            Tok::Ident(w) | Tok::PrivateName(w) | Tok::Str(w) | Tok::Number(w) => {
                self.advance();
                Some(PropKey::Name(w))
            }
            Tok::Punct("[") => {
                self.advance();
                let expr = self.parse_assign();
                self.expect("]");
                Some(PropKey::Computed(Box::new(expr)))
            }
            _ => {
                self.error_here("TS1003", "Identifier expected.");
                None
            }
        }
    }

    fn at_property_name(&self, ahead: usize) -> bool {
        matches!(
            self.peek_at(ahead).tok,
            Tok::Ident(_) | Tok::PrivateName(_) | Tok::Str(_) | Tok::Number(_) | Tok::Punct("[")
        )
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_block_body(&mut self) -> Vec<Stmt> {
        self.expect("{");
        let mut body = Vec::new();
        while !self.at("}") && !self.at_eof() {
            let before = self.i;
            body.push(self.parse_statement());
            if self.i == before {
                self.error_here("TS1128", "Declaration or statement expected.");
                self.advance();
            }
        }
        self.expect("}");
        body
    }

    fn parse_statement(&mut self) -> Stmt {
        let pos = self.pos();
        if !self.enter() {
            return Stmt {
                kind: StmtKind::Block(Vec::new()),
                pos,
            };
        }
        let kind = self.parse_statement_kind();
        self.leave();
        Stmt { kind, pos }
    }

    fn parse_statement_kind(&mut self) -> StmtKind {
        let tok = self.peek().clone();
        match &tok.tok {
            Tok::Punct("{") => StmtKind::Block(self.parse_block_body()),
            Tok::Punct(";") => {
                self.advance();
                StmtKind::Empty
            }
            Tok::Punct("@") => {
                self.skip_decorators();
                self.parse_statement_kind()
            }
            Tok::Ident(word) => self.parse_word_statement(word.clone()),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_word_statement(&mut self, word: String) -> StmtKind {
        let next = self.peek_at(1).clone();
        match word.as_str() {
            "var" => self.parse_var_statement(),
            "const" if next.is_word("enum") => {
                self.advance();
                self.parse_enum()
            }
            "const" => self.parse_var_statement(),
            "let" if matches!(next.tok, Tok::Ident(_)) || next.is("[") || next.is("{") => {
                self.parse_var_statement()
            }
            "function" => StmtKind::Function(self.parse_function(false)),
            "async" if next.is_word("function") && !next.newline_before => {
                self.advance();
                StmtKind::Function(self.parse_function(true))
            }
            "class" => StmtKind::Class(self.parse_class(false)),
            "abstract" if next.is_word("class") => {
                self.advance();
                StmtKind::Class(self.parse_class(true))
            }
            "interface" if matches!(next.tok, Tok::Ident(_)) && !next.newline_before => self.parse_interface(),
            "type" if matches!(next.tok, Tok::Ident(_))
                && !next.newline_before
                && (self.peek_at(2).is("=") || self.peek_at(2).is("<")) =>
            {
                self.parse_type_alias()
            }
            "enum" if matches!(next.tok, Tok::Ident(_)) => self.parse_enum(),
            "declare" if matches!(next.tok, Tok::Ident(_)) && !next.newline_before => self.parse_declare(),
            "namespace" | "module" if matches!(next.tok, Tok::Ident(_) | Tok::Str(_)) && !next.newline_before => {
                self.parse_namespace()
            }
            "global" if next.is("{") => self.parse_namespace(),
            "import" if !next.is("(") && !next.is(".") => self.parse_import(),
            "export" => self.parse_export(),
            "if" => self.parse_if(),
            "for" => self.parse_for(),
            "while" => {
                self.advance();
                self.expect("(");
                let test = self.parse_expression();
                self.expect(")");
                let body = Box::new(self.parse_statement());
                StmtKind::While { test, body }
            }
            "do" => {
                self.advance();
                let body = Box::new(self.parse_statement());
                self.expect_word("while");
                self.expect("(");
                let test = self.parse_expression();
                self.expect(")");
                self.eat(";");
                StmtKind::DoWhile { body, test }
            }
            "return" => {
                self.advance();
                let value = if self.at(";") || self.at("}") || self.at_eof() || self.peek().newline_before {
                    None
                } else {
                    Some(self.parse_expression())
                };
                self.semicolon();
                StmtKind::Return(value)
            }
            "throw" => {
                self.advance();
                let value = self.parse_expression();
                self.semicolon();
                StmtKind::Throw(value)
            }
            "break" | "continue" => {
                self.advance();
                if self.is_identifier() && !self.peek().newline_before {
                    self.advance();
                }
                self.semicolon();
                if word == "break" {
                    StmtKind::Break
                } else {
                    StmtKind::Continue
                }
            }
            "switch" => self.parse_switch(),
            "try" => self.parse_try(),
            "debugger" => {
                self.advance();
                self.semicolon();
                StmtKind::Empty
            }
            _ if next.is(":") && self.is_identifier() => {
                self.advance();
                self.advance();
                StmtKind::Labeled(Box::new(self.parse_statement()))
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> StmtKind {
        let expr = self.parse_expression();
        self.semicolon();
        StmtKind::Expr(expr)
    }

    fn skip_decorators(&mut self) {
        while self.eat("@") {
            self.parse_call_member();
        }
    }

    fn parse_var_kind(&mut self) -> VarKind {
        match self.advance().ident() {
            Some("var") => VarKind::Var,
            Some("let") => VarKind::Let,
            _ => VarKind::Const,
        }
    }

    fn parse_var_statement(&mut self) -> StmtKind {
        let kind = self.parse_var_kind();
        let decls = self.parse_var_decls();
        self.semicolon();
        StmtKind::Var {
            kind,
            decls,
            declare: self.ambient_depth > 0,
        }
    }

    fn parse_var_decls(&mut self) -> Vec<VarDecl> {
        let mut decls = Vec::new();
        loop {
            decls.push(self.parse_var_decl());
            if !self.eat(",") {
                break;
            }
        }
        decls
    }

    fn parse_var_decl(&mut self) -> VarDecl {
        let pattern = self.parse_binding_pattern();
        let definite = self.eat("!");
        let ty = if self.eat(":") { Some(self.parse_type()) } else { None };
        let init = if self.eat("=") { Some(self.parse_assign()) } else { None };
        VarDecl {
            pattern,
            ty,
            init,
            definite,
        }
    }

    fn parse_binding_pattern(&mut self) -> Pattern {
        let pos = self.pos();
        if self.eat("{") {
            let mut props = Vec::new();
            let mut rest = None;
            while !self.at("}") && !self.at_eof() {
                if self.eat("...") {
                    rest = Some(Box::new(self.parse_binding_pattern()));
                } else {
                    let key_pos = self.pos();
                    let key = match self.parse_property_name() {
                        Some(PropKey::Name(name)) => name,
                        Some(PropKey::Computed(_)) => String::from("[computed]"),
                        None => {
                            self.advance();
                            String::new()
                        }
                    };
                    let pattern = if self.eat(":") {
                        self.parse_binding_pattern()
                    } else {
                        Pattern::Ident(Name {
                            text: key.clone(),
                            pos: key_pos,
                        })
                    };
                    let default = if self.eat("=") { Some(self.parse_assign()) } else { None };
                    props.push((key, pattern, default));
                }
                if !self.eat(",") {
                    break;
                }
            }
            self.expect("}");
            return Pattern::Object { props, rest, pos };
        }

        if self.eat("[") {
            let mut elems = Vec::new();
            let mut rest = None;
            while !self.at("]") && !self.at_eof() {
                if self.at(",") {
                    self.advance();
                    elems.push(None);
                    continue;
                }
                if self.eat("...") {
                    rest = Some(Box::new(self.parse_binding_pattern()));
                } else {
                    let pattern = self.parse_binding_pattern();
                    let default = if self.eat("=") { Some(self.parse_assign()) } else { None };
                    elems.push(Some((pattern, default)));
                }
                if !self.eat(",") {
                    break;
                }
            }
            self.expect("]");
            return Pattern::Array { elems, rest, pos };
        }

        Pattern::Ident(self.parse_ident())
    }

    fn parse_function(&mut self, is_async: bool) -> Function {
        let pos = self.pos();
        self.expect_word("function");
        let is_generator = self.eat("*");
        let name = if self.is_identifier() { Some(self.parse_ident()) } else { None };
        self.parse_function_rest(name, pos, is_async, is_generator)
    }

    /// Type parameters, parameters, return type and body.
    fn parse_function_rest(&mut self, name: Option<Name>, pos: Pos, is_async: bool, is_generator: bool) -> Function {
        let type_params = self.parse_type_params();
        let params = self.parse_params();
        let ret = if self.eat(":") { Some(self.parse_return_type()) } else { None };
        let body = if self.at("{") {
            FunctionBody::Block(self.parse_block_body())
        } else {
            self.semicolon();
            FunctionBody::None
        };
        Function {
            name,
            type_params,
            params,
            ret,
            body,
            is_arrow: false,
            is_async,
            is_generator,
            pos,
        }
    }

    fn parse_params(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        if !self.expect("(") {
            return params;
        }
        while !self.at(")") && !self.at_eof() {
            self.skip_decorators();
            let mut property = false;
            let mut readonly = false;
            while let Some(word) = self.peek().ident()
                && matches!(word, "public" | "private" | "protected" | "readonly" | "override")
                && (matches!(self.peek_at(1).tok, Tok::Ident(_)) || self.peek_at(1).is("{") || self.peek_at(1).is("["))
            {
                readonly |= word == "readonly";
                property = true;
                self.advance();
            }
            let rest = self.eat("...");
            let pattern = if self.at_word("this") {
                let pos = self.pos();
                self.advance();
                Pattern::Ident(Name {
                    text: "this".into(),
                    pos,
                })
            } else {
                self.parse_binding_pattern()
            };
            let optional = self.eat("?");
            let ty = if self.eat(":") { Some(self.parse_type()) } else { None };
            let default = if self.eat("=") { Some(self.parse_assign()) } else { None };
            params.push(Param {
                pattern,
                ty,
                default,
                optional,
                rest,
                property,
                readonly,
            });
            if !self.eat(",") {
                break;
            }
        }
        self.expect(")");
        params
    }

    fn parse_return_type(&mut self) -> TypeExpr {
        // `x is T`, `asserts x`, `asserts x is T`
        if self.at_word("asserts") && matches!(self.peek_at(1).tok, Tok::Ident(_)) && self.next_on_same_line() {
            self.advance();
            self.advance();
            if self.eat_word("is") {
                self.parse_type();
            }
            return TypeExpr::Named {
                name: "void".into(),
                args: Vec::new(),
                pos: Pos::default(),
            };
        }
        if matches!(self.peek().tok, Tok::Ident(_)) && self.peek_at(1).is_word("is") && self.next_on_same_line() {
            self.advance();
            self.advance();
            self.parse_type();
            return TypeExpr::Predicate;
        }
        self.parse_type()
    }

    fn parse_class(&mut self, is_abstract: bool) -> Class {
        let pos = self.pos();
        self.expect_word("class");
        let name = if self.is_identifier() && !self.at_word("extends") && !self.at_word("implements") {
            Some(self.parse_ident())
        } else {
            None
        };
        let type_params = self.parse_type_params();
        let extends = if self.eat_word("extends") {
            let base = self.parse_call_member();
            if self.at("<") {
                self.parse_type_args();
            }
            Some(base)
        } else {
            None
        };
        let mut implements = Vec::new();
        if self.eat_word("implements") {
            loop {
                implements.push(self.parse_type());
                if !self.eat(",") {
                    break;
                }
            }
        }

        self.expect("{");
        let mut members = Vec::new();
        while !self.at("}") && !self.at_eof() {
            let before = self.i;
            if let Some(member) = self.parse_class_member() {
                members.push(member);
            }
            if self.i == before {
                self.error_here("TS1068", "Unexpected token. A constructor, method, accessor, or property was expected.");
                self.advance();
            }
        }
        self.expect("}");

        Class {
            name,
            type_params,
            extends,
            implements,
            members,
            is_abstract,
            pos,
        }
    }

    fn parse_class_member(&mut self) -> Option<ClassMember> {
        if self.eat(";") {
            return None;
        }
        self.skip_decorators();

        let mut is_static = false;
        let mut readonly = false;
        let mut is_async = false;
        while let Some(word) = self.peek().ident()
            && MODIFIERS.contains(&word)
            && self.next_on_same_line()
            && (self.at_property_name(1) || self.peek_at(1).is("*") || self.peek_at(1).is("{"))
        {
            match word {
                "static" if self.peek_at(1).is("{") => {
                    self.advance();
                    return Some(ClassMember::StaticBlock(self.parse_block_body()));
                }
                "static" => is_static = true,
                "readonly" => readonly = true,
                "async" => is_async = true,
                _ => {}
            }
            if self.peek_at(1).is("{") {
                break;
            }
            self.advance();
        }

        let mut kind = MethodKind::Method;
        if let Some(word) = self.peek().ident()
            && (word == "get" || word == "set")
            && self.at_property_name(1)
            && self.next_on_same_line()
        {
            kind = if word == "get" { MethodKind::Getter } else { MethodKind::Setter };
            self.advance();
        }
        let is_generator = self.eat("*");

        // Index signature.
        if self.at("[") && matches!(self.peek_at(1).tok, Tok::Ident(_)) && self.peek_at(2).is(":") {
            self.advance();
            self.advance();
            self.advance();
            self.parse_type();
            self.expect("]");
            if self.eat(":") {
                self.parse_type();
            }
            self.semicolon();
            return Some(ClassMember::Index);
        }

        let pos = self.pos();
        let key = self.parse_property_name()?;
        let text = match key {
            PropKey::Name(name) => name,
            PropKey::Computed(_) => "[computed]".to_string(),
        };
        let name = Name { text, pos };

        if name.text == "constructor" && (self.at("(") || self.at("<")) {
            let func = self.parse_function_rest(Some(name), pos, false, false);
            return Some(ClassMember::Constructor(func));
        }

        let optional = self.eat("?");
        let definite = self.eat("!");

        if self.at("(") || self.at("<") {
            let func = self.parse_function_rest(Some(name.clone()), pos, is_async, is_generator);
            return Some(ClassMember::Method {
                name,
                func,
                is_static,
                kind,
                optional,
            });
        }

        let ty = if self.eat(":") { Some(self.parse_type()) } else { None };
        let init = if self.eat("=") { Some(self.parse_assign()) } else { None };
        self.semicolon();
        Some(ClassMember::Property {
            name,
            ty,
            init,
            is_static,
            optional,
            definite,
            readonly,
        })
    }

    fn parse_interface(&mut self) -> StmtKind {
        self.advance();
        let name = self.parse_ident();
        let type_params = self.parse_type_params();
        let mut extends = Vec::new();
        if self.eat_word("extends") {
            loop {
                extends.push(self.parse_type());
                if !self.eat(",") {
                    break;
                }
            }
        }
        let members = self.parse_type_members();
        StmtKind::Interface {
            name,
            type_params,
            extends,
            members,
        }
    }

    fn parse_type_alias(&mut self) -> StmtKind {
        self.advance();
        let name = self.parse_ident();
        let type_params = self.parse_type_params();
        self.expect("=");
        let ty = self.parse_type();
        self.semicolon();
        StmtKind::TypeAlias { name, type_params, ty }
    }

    fn parse_enum(&mut self) -> StmtKind {
        self.expect_word("enum");
        let name = self.parse_ident();
        self.expect("{");
        let mut members = Vec::new();
        while !self.at("}") && !self.at_eof() {
            let pos = self.pos();
            let text = match self.parse_property_name() {
                Some(PropKey::Name(text)) => text,
                _ => {
                    self.advance();
                    String::new()
                }
            };
            let init = if self.eat("=") { Some(self.parse_assign()) } else { None };
            members.push(EnumMember {
                name: Name { text, pos },
                init,
            });
            if !self.eat(",") {
                break;
            }
        }
        self.expect("}");
        StmtKind::Enum { name, members }
    }

    fn parse_declare(&mut self) -> StmtKind {
        self.advance();
        let word = self.peek().ident().unwrap_or_default().to_string();
        match word.as_str() {
            "var" | "let" | "const" => {
                let kind = self.parse_var_kind();
                let decls = self.parse_var_decls();
                self.semicolon();
                StmtKind::Var {
                    kind,
                    decls,
                    declare: true,
                }
            }
            "module" | "namespace" | "global" => {
                self.ambient_depth += 1;
                let namespace = self.parse_namespace();
                self.ambient_depth -= 1;
                namespace
            }
            _ => self.parse_statement_kind(),
        }
    }

    fn parse_namespace(&mut self) -> StmtKind {
        let keyword = self.advance();
        let name = if keyword.is_word("global") {
            None
        } else {
            let tok = self.advance();
            let name = match tok.tok {
                Tok::Ident(text) => Some(Name { text, pos: tok.pos }),
                // `declare module "pkg" { }` describes another module; its
                // contents are parsed and then dropped.
                _ => {
                    if self.at("{") {
                        self.namespace_depth += 1;
                        self.parse_block_body();
                        self.namespace_depth -= 1;
                    } else {
                        self.semicolon();
                    }
                    return StmtKind::Block(Vec::new());
                }
            };
            // `namespace A.B.C`
            while self.eat(".") {
                self.parse_ident();
            }
            name
        };
        if !self.at("{") {
            self.semicolon();
            return StmtKind::Namespace { name, body: Vec::new() };
        }
        self.namespace_depth += 1;
        let body = self.parse_block_body();
        self.namespace_depth -= 1;
        StmtKind::Namespace { name, body }
    }

    fn mark_module(&mut self) {
        if self.namespace_depth == 0 {
            self.is_module = true;
        }
    }

    fn parse_import(&mut self) -> StmtKind {
        self.advance();
        self.mark_module();
        let mut bindings = Vec::new();

        if matches!(self.peek().tok, Tok::Str(_)) {
            self.advance();
            self.semicolon();
            return StmtKind::Import { bindings };
        }
        if self.at_word("type") && (self.peek_at(1).is("{") || self.peek_at(1).is("*") || (matches!(self.peek_at(1).tok, Tok::Ident(_)) && !self.peek_at(1).is_word("from"))) {
            self.advance();
        }

        loop {
            if self.eat("*") {
                self.expect_word("as");
                bindings.push(self.parse_ident());
            } else if self.eat("{") {
                while !self.at("}") && !self.at_eof() {
                    if self.at_word("type") && matches!(self.peek_at(1).tok, Tok::Ident(_)) && !self.peek_at(1).is_word("as") {
                        self.advance();
                    }
                    let imported = self.advance();
                    let local = if self.eat_word("as") {
                        self.parse_ident()
                    } else {
                        Name {
                            text: imported.ident().unwrap_or_default().to_string(),
                            pos: imported.pos,
                        }
                    };
                    bindings.push(local);
                    if !self.eat(",") {
                        break;
                    }
                }
                self.expect("}");
            } else if self.is_identifier() && !self.at_word("from") {
                let name = self.parse_ident();
                if self.eat("=") {
                    // `import x = require("m")` / `import x = A.B`
                    self.parse_assign();
                    self.semicolon();
                    bindings.push(name);
                    return StmtKind::Import { bindings };
                }
                bindings.push(name);
            } else {
                self.error_here("TS1141", "String literal expected.");
                break;
            }
            if !self.eat(",") {
                break;
            }
        }

        self.expect_word("from");
        if matches!(self.peek().tok, Tok::Str(_)) {
            self.advance();
        } else {
            self.error_here("TS1141", "String literal expected.");
        }
        self.semicolon();
        StmtKind::Import { bindings }
    }

    fn parse_export(&mut self) -> StmtKind {
        self.advance();
        self.mark_module();

        if self.eat_word("default") {
            if self.at_word("function") {
                return StmtKind::Function(self.parse_function(false));
            }
            if self.at_word("async") && self.peek_at(1).is_word("function") {
                self.advance();
                return StmtKind::Function(self.parse_function(true));
            }
            if self.at_word("class") {
                return StmtKind::Class(self.parse_class(false));
            }
            if self.at_word("abstract") && self.peek_at(1).is_word("class") {
                self.advance();
                return StmtKind::Class(self.parse_class(true));
            }
            if self.at_word("interface") {
                return self.parse_interface();
            }
            let expr = self.parse_assign();
            self.semicolon();
            return StmtKind::ExportDefault(expr);
        }

        if self.eat("=") {
            let expr = self.parse_assign();
            self.semicolon();
            return StmtKind::ExportDefault(expr);
        }

        if self.at_word("as") {
            // `export as namespace X;`
            self.advance();
            self.advance();
            self.parse_ident();
            self.semicolon();
            return StmtKind::Empty;
        }

        if self.at_word("type") && self.peek_at(1).is("{") {
            self.advance();
        }

        if self.eat("*") {
            if self.eat_word("as") {
                self.parse_ident();
            }
            self.expect_word("from");
            self.advance();
            self.semicolon();
            return StmtKind::Empty;
        }

        if self.eat("{") {
            let mut names = Vec::new();
            while !self.at("}") && !self.at_eof() {
                if self.at_word("type") && matches!(self.peek_at(1).tok, Tok::Ident(_)) && !self.peek_at(1).is_word("as") {
                    self.advance();
                }
                let tok = self.advance();
                if let Tok::Ident(text) = tok.tok {
                    names.push(Name { text, pos: tok.pos });
                }
                if self.eat_word("as") {
                    self.advance();
                }
                if !self.eat(",") {
                    break;
                }
            }
            self.expect("}");
            if self.eat_word("from") {
                self.advance();
                self.semicolon();
                return StmtKind::Empty;
            }
            self.semicolon();
            return StmtKind::ExportNames(names);
        }

        self.parse_statement_kind()
    }

    fn parse_if(&mut self) -> StmtKind {
        self.advance();
        self.expect("(");
        let test = self.parse_expression();
        self.expect(")");
        let then = Box::new(self.parse_statement());
        let otherwise = if self.eat_word("else") {
            Some(Box::new(self.parse_statement()))
        } else {
            None
        };
        StmtKind::If { test, then, otherwise }
    }

    fn parse_for(&mut self) -> StmtKind {
        self.advance();
        self.eat_word("await");
        self.expect("(");

        let mut init = None;
        if !self.at(";") {
            let is_decl = self.at_word("var")
                || self.at_word("const")
                || (self.at_word("let")
                    && (matches!(self.peek_at(1).tok, Tok::Ident(_)) || self.peek_at(1).is("[") || self.peek_at(1).is("{")));
            if is_decl {
                let kind = self.parse_var_kind();
                let pattern = self.parse_binding_pattern();
                if self.at_word("of") || self.at_word("in") {
                    let of = self.advance().is_word("of");
                    return self.parse_for_in_of(ForHead::Var(kind, pattern), of);
                }
                let definite = self.eat("!");
                let ty = if self.eat(":") { Some(self.parse_type()) } else { None };
                self.no_in = true;
                let first_init = if self.eat("=") { Some(self.parse_assign()) } else { None };
                self.no_in = false;
                let mut decls = vec![VarDecl {
                    pattern,
                    ty,
                    init: first_init,
                    definite,
                }];
                while self.eat(",") {
                    decls.push(self.parse_var_decl());
                }
                init = Some(ForInit::Var(kind, decls));
            } else {
                self.no_in = true;
                let expr = self.parse_expression();
                self.no_in = false;
                if self.at_word("of") || self.at_word("in") {
                    let of = self.advance().is_word("of");
                    return self.parse_for_in_of(ForHead::Expr(expr), of);
                }
                init = Some(ForInit::Expr(expr));
            }
        }

        self.expect(";");
        let test = if self.at(";") { None } else { Some(self.parse_expression()) };
        self.expect(";");
        let update = if self.at(")") { None } else { Some(self.parse_expression()) };
        self.expect(")");
        let body = Box::new(self.parse_statement());
        StmtKind::For {
            init,
            test,
            update,
            body,
        }
    }

    fn parse_for_in_of(&mut self, head: ForHead, of: bool) -> StmtKind {
        let iter = if of { self.parse_assign() } else { self.parse_expression() };
        self.expect(")");
        let body = Box::new(self.parse_statement());
        StmtKind::ForInOf { head, iter, body, of }
    }

    fn parse_switch(&mut self) -> StmtKind {
        self.advance();
        self.expect("(");
        let discriminant = self.parse_expression();
        self.expect(")");
        self.expect("{");
        let mut cases = Vec::new();
        while !self.at("}") && !self.at_eof() {
            let test = if self.eat_word("case") {
                Some(self.parse_expression())
            } else if self.eat_word("default") {
                None
            } else {
                self.error_here("TS1130", "'case' or 'default' expected.");
                self.advance();
                continue;
            };
            self.expect(":");
            let mut body = Vec::new();
            while !self.at("}") && !self.at_word("case") && !self.at_word("default") && !self.at_eof() {
                let before = self.i;
                body.push(self.parse_statement());
                if self.i == before {
                    self.advance();
                }
            }
            cases.push(SwitchCase { test, body });
        }
        self.expect("}");
        StmtKind::Switch { discriminant, cases }
    }

    fn parse_try(&mut self) -> StmtKind {
        self.advance();
        let block = self.parse_block_body();
        let mut param = None;
        let mut handler = None;
        if self.eat_word("catch") {
            if self.eat("(") {
                let pattern = self.parse_binding_pattern();
                let ty = if self.eat(":") { Some(self.parse_type()) } else { None };
                self.expect(")");
                param = Some((pattern, ty));
            }
            handler = Some(self.parse_block_body());
        }
        let finalizer = if self.eat_word("finally") {
            Some(self.parse_block_body())
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            self.error_here("TS1472", "'catch' or 'finally' expected.");
        }
        StmtKind::Try {
            block,
            param,
            handler,
            finalizer,
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expression(&mut self) -> Expr {
        let pos = self.pos();
        let first = self.parse_assign();
        if !self.at(",") {
            return first;
        }
        let mut exprs = vec![first];
        while self.eat(",") {
            exprs.push(self.parse_assign());
        }
        Expr {
            kind: ExprKind::Sequence(exprs),
            pos,
        }
    }

    fn parse_assign(&mut self) -> Expr {
        let pos = self.pos();
        if !self.enter() {
            return Expr {
                kind: ExprKind::Null,
                pos,
            };
        }
        let expr = self.parse_assign_inner();
        self.leave();
        expr
    }

    fn parse_assign_inner(&mut self) -> Expr {
        if let Some(arrow) = self.try_arrow() {
            return arrow;
        }

        let pos = self.pos();
        if self.at_word("yield") && !matches!(self.peek_at(1).tok, Tok::Punct(_)) {
            self.advance();
            self.eat("*");
            let value = if self.at(")") || self.at("]") || self.at("}") || self.at(",") || self.at(";") || self.peek().newline_before {
                None
            } else {
                Some(Box::new(self.parse_assign()))
            };
            return Expr {
                kind: ExprKind::Yield(value),
                pos,
            };
        }

        let target = self.parse_conditional();

        if let Some(op) = self.assign_operator() {
            let value = self.parse_assign();
            return Expr {
                kind: ExprKind::Assign {
                    op,
                    target: Box::new(target),
                    value: Box::new(value),
                },
                pos,
            };
        }
        target
    }

    /// Consume an assignment operator, recombining split `>` tokens.
    fn assign_operator(&mut self) -> Option<&'static str> {
        if let Tok::Punct(p) = self.peek().tok
            && ASSIGN_OPS.contains(&p)
        {
            self.advance();
            return Some(p);
        }
        if self.at(">") && self.peek_at(1).is(">") && self.adjacent(1) {
            if self.peek_at(2).is(">") && self.adjacent(2) && self.peek_at(3).is("=") && self.adjacent(3) {
                for _ in 0..4 {
                    self.advance();
                }
                return Some(">>>=");
            }
            if self.peek_at(2).is("=") && self.adjacent(2) {
                for _ in 0..3 {
                    self.advance();
                }
                return Some(">>=");
            }
        }
        None
    }

    /// Try to parse an arrow function at the current position.
    fn try_arrow(&mut self) -> Option<Expr> {
        let pos = self.pos();
        let is_async = self.at_word("async")
            && self.next_on_same_line()
            && (self.peek_at(1).is("(") || self.peek_at(1).is("<") || matches!(self.peek_at(1).tok, Tok::Ident(_)));

        let start = if is_async { 1 } else { 0 };

        // `x => ...`
        if matches!(self.peek_at(start).tok, Tok::Ident(_)) && self.peek_at(start + 1).is("=>") {
            if is_async {
                self.advance();
            }
            let name = self.parse_ident();
            self.advance();
            let params = vec![Param {
                pattern: Pattern::Ident(name),
                ty: None,
                default: None,
                optional: false,
                rest: false,
                property: false,
                readonly: false,
            }];
            return Some(self.finish_arrow(params, Vec::new(), None, is_async, pos));
        }

        if !(self.peek_at(start).is("(") || self.peek_at(start).is("<")) {
            return None;
        }

        let cp = self.checkpoint();
        if is_async {
            self.advance();
        }
        let type_params = self.parse_type_params();
        if !self.at("(") {
            self.restore(cp);
            return None;
        }
        let params = self.parse_params();
        let ret = if self.at(":") {
            self.advance();
            Some(self.parse_return_type())
        } else {
            None
        };
        if self.clean_since(cp) && self.at("=>") {
            self.advance();
            return Some(self.finish_arrow(params, type_params, ret, is_async, pos));
        }
        self.restore(cp);
        None
    }

    fn finish_arrow(
        &mut self,
        params: Vec<Param>,
        type_params: Vec<String>,
        ret: Option<TypeExpr>,
        is_async: bool,
        pos: Pos,
    ) -> Expr {
        let body = if self.at("{") {
            FunctionBody::Block(self.parse_block_body())
        } else {
            FunctionBody::Expr(Box::new(self.parse_assign()))
        };
        Expr {
            kind: ExprKind::Function(Box::new(Function {
                name: None,
                type_params,
                params,
                ret,
                body,
                is_arrow: true,
                is_async,
                is_generator: false,
                pos,
            })),
            pos,
        }
    }

    fn parse_conditional(&mut self) -> Expr {
        let pos = self.pos();
        let test = self.parse_binary(0);
        if !self.eat("?") {
            return test;
        }
        let saved = self.no_in;
        self.no_in = false;
        let then = self.parse_assign();
        self.no_in = saved;
        self.expect(":");
        let otherwise = self.parse_assign();
        Expr {
            kind: ExprKind::Conditional {
                test: Box::new(test),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            pos,
        }
    }

    /// Peek a binary operator and its precedence without consuming it.
    fn binary_operator(&self) -> Option<(&'static str, u8, usize)> {
        let tok = self.peek();
        if let Tok::Ident(word) = &tok.tok {
            return match word.as_str() {
                "instanceof" => Some(("instanceof", 8, 1)),
                "in" if !self.no_in => Some(("in", 8, 1)),
                "as" if !tok.newline_before => Some(("as", 8, 1)),
                "satisfies" if !tok.newline_before => Some(("satisfies", 8, 1)),
                _ => None,
            };
        }
        let Tok::Punct(p) = tok.tok else {
            return None;
        };
        if p == ">" {
            let a1 = self.peek_at(1).is(">") && self.adjacent(1);
            let a2 = a1 && self.peek_at(2).is(">") && self.adjacent(2);
            let eq1 = self.peek_at(1).is("=") && self.adjacent(1);
            let eq2 = a1 && self.peek_at(2).is("=") && self.adjacent(2);
            let eq3 = a2 && self.peek_at(3).is("=") && self.adjacent(3);
            return if eq3 || eq2 {
                // Compound assignment, handled by the caller.
                None
            } else if a2 {
                Some((">>>", 9, 3))
            } else if a1 {
                Some((">>", 9, 2))
            } else if eq1 {
                Some((">=", 8, 2))
            } else {
                Some((">", 8, 1))
            };
        }
        let prec = match p {
            "??" => 1,
            "||" => 2,
            "&&" => 3,
            "|" => 4,
            "^" => 5,
            "&" => 6,
            "==" | "!=" | "===" | "!==" => 7,
            "<" | "<=" => 8,
            "<<" => 9,
            "+" | "-" => 10,
            "*" | "/" | "%" => 11,
            "**" => 12,
            _ => return None,
        };
        Some((p, prec, 1))
    }

    fn parse_binary(&mut self, min_prec: u8) -> Expr {
        let pos = self.pos();
        let mut left = self.parse_unary();
        let mut chain = 0;

        while let Some((op, prec, width)) = self.binary_operator() {
            if prec <= min_prec {
                break;
            }
            chain += 1;
            if chain > MAX_OPERATOR_CHAIN {
                self.abandon();
                break;
            }
            for _ in 0..width {
                self.advance();
            }

            if op == "as" || op == "satisfies" {
                let ty = if self.at_word("const") {
                    self.advance();
                    TypeExpr::Opaque
                } else {
                    self.parse_type()
                };
                let kind = if op == "as" {
                    ExprKind::As {
                        expr: Box::new(left),
                        ty,
                    }
                } else {
                    ExprKind::Satisfies {
                        expr: Box::new(left),
                        ty,
                    }
                };
                left = Expr { kind, pos };
                continue;
            }

            // `**` is right-associative.
            let next_min = if op == "**" { prec - 1 } else { prec };
            let right = self.parse_binary(next_min);
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            };
        }
        left
    }

    fn parse_unary(&mut self) -> Expr {
        let pos = self.pos();
        if !self.enter() {
            return Expr {
                kind: ExprKind::Null,
                pos,
            };
        }
        let expr = self.parse_unary_inner();
        self.leave();
        expr
    }

    fn parse_unary_inner(&mut self) -> Expr {
        let pos = self.pos();
        let tok = self.peek().clone();
        let op = match &tok.tok {
            Tok::Punct(p @ ("!" | "~" | "+" | "-")) => Some(*p),
            Tok::Ident(w) if matches!(w.as_str(), "typeof" | "void" | "delete") => Some(match w.as_str() {
                "typeof" => "typeof",
                "void" => "void",
                _ => "delete",
            }),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary();
            return Expr {
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
                pos,
            };
        }

        if tok.is_word("await") && !matches!(self.peek_at(1).tok, Tok::Punct(")" | ";" | "," | "]" | "}" | "=" | ".")) {
            self.advance();
            let expr = self.parse_unary();
            return Expr {
                kind: ExprKind::Await(Box::new(expr)),
                pos,
            };
        }

        if tok.is("++") || tok.is("--") {
            self.advance();
            let expr = self.parse_unary();
            let op = if tok.is("++") { "++" } else { "--" };
            return Expr {
                kind: ExprKind::Update {
                    op,
                    expr: Box::new(expr),
                },
                pos,
            };
        }

        // `<T>expr` type assertion.
        if tok.is("<") {
            self.advance();
            let ty = self.parse_type();
            self.expect(">");
            let expr = self.parse_unary();
            return Expr {
                kind: ExprKind::As {
                    expr: Box::new(expr),
                    ty,
                },
                pos,
            };
        }

        let expr = self.parse_call_member();
        if (self.at("++") || self.at("--")) && !self.peek().newline_before {
            let op = if self.at("++") { "++" } else { "--" };
            self.advance();
            return Expr {
                kind: ExprKind::Update {
                    op,
                    expr: Box::new(expr),
                },
                pos,
            };
        }
        expr
    }

    fn parse_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        self.expect("(");
        let saved = self.no_in;
        self.no_in = false;
        while !self.at(")") && !self.at_eof() {
            let pos = self.pos();
            if self.eat("...") {
                let inner = self.parse_assign();
                args.push(Expr {
                    kind: ExprKind::Spread(Box::new(inner)),
                    pos,
                });
            } else {
                args.push(self.parse_assign());
            }
            if !self.eat(",") {
                break;
            }
        }
        self.no_in = saved;
        self.expect(")");
        args
    }

    /// Try `<T, U>` followed by `(` as explicit call type arguments.
    fn try_call_type_args(&mut self) -> Option<Vec<TypeExpr>> {
        let cp = self.checkpoint();
        let args = self.parse_type_args();
        if self.clean_since(cp) && (self.at("(") || matches!(self.peek().tok, Tok::Template(_))) {
            return Some(args);
        }
        self.restore(cp);
        None
    }

    fn parse_call_member(&mut self) -> Expr {
        let pos = self.pos();
        let mut expr = if self.at_word("new") {
            self.parse_new()
        } else {
            self.parse_primary()
        };

        loop {
            let tok = self.peek().clone();
            match &tok.tok {
                Tok::Punct(".") => {
                    self.advance();
                    let property = self.parse_member_name();
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property,
                            optional: false,
                        },
                        pos,
                    };
                }
                Tok::Punct("?.") => {
                    self.advance();
                    if self.at("(") {
                        let args = self.parse_args();
                        expr = Expr {
                            kind: ExprKind::Call {
                                callee: Box::new(expr),
                                type_args: Vec::new(),
                                args,
                                optional: true,
                            },
                            pos,
                        };
                    } else if self.eat("[") {
                        let index = self.parse_expression();
                        self.expect("]");
                        expr = Expr {
                            kind: ExprKind::Index {
                                object: Box::new(expr),
                                index: Box::new(index),
                                optional: true,
                            },
                            pos,
                        };
                    } else {
                        let property = self.parse_member_name();
                        expr = Expr {
                            kind: ExprKind::Member {
                                object: Box::new(expr),
                                property,
                                optional: true,
                            },
                            pos,
                        };
                    }
                }
                Tok::Punct("[") => {
                    self.advance();
                    let saved = self.no_in;
                    self.no_in = false;
                    let index = self.parse_expression();
                    self.no_in = saved;
                    self.expect("]");
                    expr = Expr {
                        kind: ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                            optional: false,
                        },
                        pos,
                    };
                }
                Tok::Punct("(") => {
                    let args = self.parse_args();
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            type_args: Vec::new(),
                            args,
                            optional: false,
                        },
                        pos,
                    };
                }
                Tok::Punct("!") if !tok.newline_before => {
                    self.advance();
                    expr = Expr {
                        kind: ExprKind::NonNull(Box::new(expr)),
                        pos,
                    };
                }
                Tok::Template(TemplatePart::Whole | TemplatePart::Head) => {
                    let exprs = match self.parse_template().kind {
                        ExprKind::Template(exprs) => exprs,
                        _ => Vec::new(),
                    };
                    expr = Expr {
                        kind: ExprKind::TaggedTemplate {
                            tag: Box::new(expr),
                            exprs,
                        },
                        pos,
                    };
                }
                Tok::Punct("<") => {
                    let Some(type_args) = self.try_call_type_args() else {
                        break;
                    };
                    if self.at("(") {
                        let args = self.parse_args();
                        expr = Expr {
                            kind: ExprKind::Call {
                                callee: Box::new(expr),
                                type_args,
                                args,
                                optional: false,
                            },
                            pos,
                        };
                    }
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_member_name(&mut self) -> Name {
        let tok = self.peek().clone();
        match tok.tok {
            Tok::Ident(text) | Tok::PrivateName(text) => {
                self.advance();
                Name { text, pos: tok.pos }
            }
            _ => {
                self.error_here("TS1003", "Identifier expected.");
                Name {
                    text: String::new(),
                    pos: tok.pos,
                }
            }
        }
    }

    fn parse_new(&mut self) -> Expr {
        let pos = self.pos();
        self.advance();
        if self.eat(".") {
            // `new.target`
            self.parse_member_name();
            return Expr {
                kind: ExprKind::Invalid,
                pos,
            };
        }

        let mut callee = if self.at_word("new") {
            self.parse_new()
        } else {
            self.parse_primary()
        };
        loop {
            if self.eat(".") {
                let property = self.parse_member_name();
                callee = Expr {
                    kind: ExprKind::Member {
                        object: Box::new(callee),
                        property,
                        optional: false,
                    },
                    pos,
                };
            } else if self.at("[") {
                self.advance();
                let index = self.parse_expression();
                self.expect("]");
                callee = Expr {
                    kind: ExprKind::Index {
                        object: Box::new(callee),
                        index: Box::new(index),
                        optional: false,
                    },
                    pos,
                };
            } else {
                break;
            }
        }

        let type_args = if self.at("<") {
            self.try_call_type_args().unwrap_or_default()
        } else {
            Vec::new()
        };
        let args = if self.at("(") { self.parse_args() } else { Vec::new() };
        Expr {
            kind: ExprKind::New {
                callee: Box::new(callee),
                type_args,
                args,
            },
            pos,
        }
    }

    fn parse_template(&mut self) -> Expr {
        let pos = self.pos();
        let first = self.advance();
        let mut exprs = Vec::new();
        if matches!(first.tok, Tok::Template(TemplatePart::Head)) {
            loop {
                exprs.push(self.parse_expression());
                match self.peek().tok {
                    Tok::Template(TemplatePart::Middle) => {
                        self.advance();
                    }
                    Tok::Template(TemplatePart::Tail) => {
                        self.advance();
                        break;
                    }
                    _ => {
                        self.error_here("TS1005", "'}' expected.");
                        break;
                    }
                }
            }
        }
        Expr {
            kind: ExprKind::Template(exprs),
            pos,
        }
    }

    fn parse_primary(&mut self) -> Expr {
        let tok = self.peek().clone();
        let pos = tok.pos;
        let kind = match tok.tok {
            Tok::Number(n) => {
                self.advance();
                ExprKind::Number(n)
            }
            Tok::BigInt(_) => {
                self.advance();
                ExprKind::BigInt
            }
            Tok::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            Tok::Template(_) => return self.parse_template(),
            Tok::Regex => {
                self.advance();
                ExprKind::Regex
            }
            Tok::PrivateName(name) => {
                // `#x in obj`
                self.advance();
                ExprKind::Str(name)
            }
            Tok::Punct("(") => {
                self.advance();
                let saved = self.no_in;
                self.no_in = false;
                let inner = self.parse_expression();
                self.no_in = saved;
                self.expect(")");
                ExprKind::Paren(Box::new(inner))
            }
            Tok::Punct("[") => self.parse_array_literal(),
            Tok::Punct("{") => self.parse_object_literal(),
            Tok::Punct("@") => {
                self.skip_decorators();
                return self.parse_primary();
            }
            Tok::Ident(word) => match word.as_str() {
                "this" => {
                    self.advance();
                    ExprKind::This
                }
                "super" => {
                    self.advance();
                    ExprKind::Super
                }
                "null" => {
                    self.advance();
                    ExprKind::Null
                }
                "true" | "false" => {
                    self.advance();
                    ExprKind::Bool(word == "true")
                }
                "function" => ExprKind::Function(Box::new(self.parse_function(false))),
                "async" if self.peek_at(1).is_word("function") && self.next_on_same_line() => {
                    self.advance();
                    ExprKind::Function(Box::new(self.parse_function(true)))
                }
                "class" => ExprKind::Class(Box::new(self.parse_class(false))),
                "import" => {
                    // `import(...)` / `import.meta`
                    self.advance();
                    ExprKind::Ident("import".into())
                }
                w if RESERVED.contains(&w) => {
                    self.error_here("TS1109", "Expression expected.");
                    ExprKind::Invalid
                }
                _ => {
                    self.advance();
                    ExprKind::Ident(word.clone())
                }
            },
            _ => {
                self.error_here("TS1109", "Expression expected.");
                if !matches!(tok.tok, Tok::Eof | Tok::Punct(")" | "}" | "]" | ";" | ",")) {
                    self.advance();
                }
                ExprKind::Invalid
            }
        };
        Expr { kind, pos }
    }

    fn parse_array_literal(&mut self) -> ExprKind {
        self.advance();
        let saved = self.no_in;
        self.no_in = false;
        let mut elems = Vec::new();
        while !self.at("]") && !self.at_eof() {
            if self.eat(",") {
                elems.push(None);
                continue;
            }
            let pos = self.pos();
            if self.eat("...") {
                let inner = self.parse_assign();
                elems.push(Some(Expr {
                    kind: ExprKind::Spread(Box::new(inner)),
                    pos,
                }));
            } else {
                elems.push(Some(self.parse_assign()));
            }
            if !self.eat(",") {
                break;
            }
        }
        self.no_in = saved;
        self.expect("]");
        ExprKind::Array(elems)
    }

    fn parse_object_literal(&mut self) -> ExprKind {
        self.advance();
        let saved = self.no_in;
        self.no_in = false;
        let mut props = Vec::new();
        while !self.at("}") && !self.at_eof() {
            let pos = self.pos();
            if self.eat("...") {
                props.push(Prop::Spread(self.parse_assign()));
                if !self.eat(",") {
                    break;
                }
                continue;
            }

            let mut kind = MethodKind::Method;
            let mut is_async = false;
            let ends_key = |t: &Token| t.is(":") || t.is("(") || t.is(",") || t.is("}") || t.is("=") || t.is("<") || t.is("?");
            if let Some(word) = self.peek().ident()
                && matches!(word, "get" | "set" | "async")
                && !ends_key(self.peek_at(1))
            {
                match word {
                    "get" => kind = MethodKind::Getter,
                    "set" => kind = MethodKind::Setter,
                    _ => is_async = true,
                }
                self.advance();
            }
            let is_generator = self.eat("*");

            let key_tok = self.peek().clone();
            let Some(key) = self.parse_property_name() else {
                self.advance();
                continue;
            };

            if self.at("(") || self.at("<") {
                let name = match &key {
                    PropKey::Name(text) => Some(Name {
                        text: text.clone(),
                        pos: key_tok.pos,
                    }),
                    PropKey::Computed(_) => None,
                };
                let func = self.parse_function_rest(name, pos, is_async, is_generator);
                props.push(Prop::Method { key, func, kind, pos });
            } else if self.eat(":") {
                let value = self.parse_assign();
                props.push(Prop::KeyValue { key, value, pos });
            } else {
                match (&key, &key_tok.tok) {
                    (PropKey::Name(text), Tok::Ident(_)) => {
                        // `{ a = 1 }` only appears in destructuring targets.
                        if self.eat("=") {
                            self.parse_assign();
                        }
                        props.push(Prop::Shorthand(Name {
                            text: text.clone(),
                            pos: key_tok.pos,
                        }));
                    }
                    _ => {
                        self.expect(":");
                    }
                }
            }

            if !self.eat(",") {
                break;
            }
        }
        self.no_in = saved;
        self.expect("}");
        ExprKind::Object(props)
    }

    // =========================================================================
    // Types
    // =========================================================================

    fn parse_type_params(&mut self) -> Vec<String> {
        let mut params = Vec::new();
        if !self.at("<") {
            return params;
        }
        self.advance();
        while !self.at(">") && !self.at_eof() {
            while (self.at_word("const") || self.at_word("in") || self.at_word("out"))
                && matches!(self.peek_at(1).tok, Tok::Ident(_))
            {
                self.advance();
            }
            let name = self.parse_ident();
            if self.eat_word("extends") {
                self.parse_type();
            }
            if self.eat("=") {
                self.parse_type();
            }
            params.push(name.text);
            if !self.eat(",") {
                break;
            }
        }
        self.expect(">");
        params
    }

    fn parse_type_args(&mut self) -> Vec<TypeExpr> {
        let mut args = Vec::new();
        self.expect("<");
        while !self.at(">") && !self.at_eof() {
            args.push(self.parse_type());
            if !self.eat(",") {
                break;
            }
        }
        self.expect(">");
        args
    }

    fn parse_type(&mut self) -> TypeExpr {
        if !self.enter() {
            return TypeExpr::Opaque;
        }
        let ty = self.parse_type_inner();
        self.leave();
        ty
    }

    fn parse_type_inner(&mut self) -> TypeExpr {
        if self.at("<") || (self.at("(") && self.looks_like_function_type()) {
            return self.parse_function_type();
        }
        if self.at_word("new") || (self.at_word("abstract") && self.peek_at(1).is_word("new")) {
            self.eat_word("abstract");
            self.advance();
            self.parse_function_type();
            return TypeExpr::Opaque;
        }

        let ty = self.parse_union_type();
        if self.at_word("extends") && !self.peek().newline_before {
            self.advance();
            self.parse_union_type();
            self.expect("?");
            self.parse_type();
            self.expect(":");
            self.parse_type();
            return TypeExpr::Opaque;
        }
        ty
    }

    fn looks_like_function_type(&mut self) -> bool {
        let cp = self.checkpoint();
        self.parse_params();
        let ok = self.clean_since(cp) && self.at("=>");
        self.restore(cp);
        ok
    }

    fn parse_function_type(&mut self) -> TypeExpr {
        let type_params = self.parse_type_params();
        let params = self.parse_params();
        self.expect("=>");
        let ret = self.parse_return_type();
        TypeExpr::Function {
            type_params,
            params: params.into_iter().map(param_sig).collect(),
            ret: Box::new(ret),
        }
    }

    fn parse_union_type(&mut self) -> TypeExpr {
        self.eat("|");
        let first = self.parse_intersection_type();
        if !self.at("|") {
            return first;
        }
        let mut members = vec![first];
        while self.eat("|") {
            members.push(self.parse_intersection_type());
        }
        TypeExpr::Union(members)
    }

    fn parse_intersection_type(&mut self) -> TypeExpr {
        self.eat("&");
        let first = self.parse_type_operator();
        if !self.at("&") {
            return first;
        }
        let mut members = vec![first];
        while self.eat("&") {
            members.push(self.parse_type_operator());
        }
        TypeExpr::Intersection(members)
    }

    fn parse_type_operator(&mut self) -> TypeExpr {
        if self.eat_word("keyof") {
            return TypeExpr::Keyof(Box::new(self.parse_type_operator()));
        }
        if self.at_word("readonly") && self.next_on_same_line() {
            self.advance();
            return self.parse_type_operator();
        }
        if self.at_word("unique") && self.peek_at(1).is_word("symbol") {
            self.advance();
            self.advance();
            return named("symbol");
        }
        if self.eat_word("infer") {
            self.parse_ident();
            return TypeExpr::Opaque;
        }
        self.parse_postfix_type()
    }

    fn parse_postfix_type(&mut self) -> TypeExpr {
        let mut ty = self.parse_primary_type();
        while self.at("[") && !self.peek().newline_before {
            self.advance();
            if self.eat("]") {
                ty = TypeExpr::Array(Box::new(ty));
            } else {
                self.parse_type();
                self.expect("]");
                ty = TypeExpr::Opaque;
            }
        }
        ty
    }

    fn parse_primary_type(&mut self) -> TypeExpr {
        let tok = self.peek().clone();
        match tok.tok {
            Tok::Str(s) => {
                self.advance();
                TypeExpr::StrLit(s)
            }
            Tok::Number(n) => {
                self.advance();
                TypeExpr::NumLit(n)
            }
            Tok::BigInt(_) => {
                self.advance();
                named("bigint")
            }
            Tok::Punct("-") if matches!(self.peek_at(1).tok, Tok::Number(_)) => {
                self.advance();
                match self.advance().tok {
                    Tok::Number(n) => TypeExpr::NumLit(format!("-{n}")),
                    _ => TypeExpr::Opaque,
                }
            }
            Tok::Template(part) => {
                self.advance();
                if part == TemplatePart::Head {
                    loop {
                        self.parse_type();
                        match self.advance().tok {
                            Tok::Template(TemplatePart::Middle) => continue,
                            _ => break,
                        }
                    }
                }
                named("string")
            }
            Tok::Punct("(") => {
                self.advance();
                let inner = self.parse_type();
                self.expect(")");
                inner
            }
            Tok::Punct("[") => self.parse_tuple_type(),
            Tok::Punct("{") => {
                if self.looks_like_mapped_type() {
                    self.skip_balanced("{", "}");
                    TypeExpr::Opaque
                } else {
                    TypeExpr::Object(self.parse_type_members())
                }
            }
            Tok::Ident(word) => match word.as_str() {
                "typeof" => {
                    self.advance();
                    let pos = self.pos();
                    let mut path = vec![self.parse_member_name().text];
                    while self.eat(".") {
                        path.push(self.parse_member_name().text);
                    }
                    if self.at("<") {
                        self.parse_type_args();
                    }
                    TypeExpr::Typeof(path, pos)
                }
                "true" | "false" => {
                    self.advance();
                    TypeExpr::BoolLit(word == "true")
                }
                _ => {
                    self.advance();
                    let mut name = word.clone();
                    while self.at(".") && matches!(self.peek_at(1).tok, Tok::Ident(_)) {
                        self.advance();
                        name.push('.');
                        name.push_str(self.advance().ident().unwrap_or_default());
                    }
                    let args = if self.at("<") && !self.peek().newline_before {
                        self.parse_type_args()
                    } else {
                        Vec::new()
                    };
                    TypeExpr::Named {
                        name,
                        args,
                        pos: tok.pos,
                    }
                }
            },
            _ => {
                self.error_here("TS1110", "Type expected.");
                TypeExpr::Opaque
            }
        }
    }

    fn parse_tuple_type(&mut self) -> TypeExpr {
        self.advance();
        let mut elems = Vec::new();
        while !self.at("]") && !self.at_eof() {
            let rest = self.eat("...");
            // Labeled element `name: T` / `name?: T`.
            if matches!(self.peek().tok, Tok::Ident(_)) && (self.peek_at(1).is(":") || (self.peek_at(1).is("?") && self.peek_at(2).is(":"))) {
                self.advance();
                self.eat("?");
                self.advance();
            }
            let mut ty = self.parse_type();
            self.eat("?");
            if rest {
                ty = TypeExpr::Opaque;
            }
            elems.push(ty);
            if !self.eat(",") {
                break;
            }
        }
        self.expect("]");
        TypeExpr::Tuple(elems)
    }

    fn looks_like_mapped_type(&self) -> bool {
        let mut k = 1;
        if self.peek_at(k).is("+") || self.peek_at(k).is("-") {
            k += 1;
        }
        if self.peek_at(k).is_word("readonly") {
            k += 1;
        }
        self.peek_at(k).is("[") && matches!(self.peek_at(k + 1).tok, Tok::Ident(_)) && self.peek_at(k + 2).is_word("in")
    }

    fn skip_balanced(&mut self, open: &str, close: &str) {
        let mut depth = 0usize;
        loop {
            if self.at_eof() {
                self.error_here("TS1005", format!("'{close}' expected."));
                return;
            }
            let tok = self.advance();
            if tok.is(open) {
                depth += 1;
            } else if tok.is(close) {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
        }
    }

    fn parse_type_members(&mut self) -> Vec<TypeMember> {
        let mut members = Vec::new();
        self.expect("{");
        while !self.at("}") && !self.at_eof() {
            let before = self.i;
            if let Some(member) = self.parse_type_member() {
                members.push(member);
            }
            if !self.eat(";") && !self.eat(",") && !self.at("}") && !self.peek().newline_before {
                self.error_here("TS1005", "';' expected.");
            }
            if self.i == before {
                self.advance();
            }
        }
        self.expect("}");
        members
    }

    fn parse_type_member(&mut self) -> Option<TypeMember> {
        if self.at("(") || self.at("<") {
            let type_params = self.parse_type_params();
            let params = self.parse_params().into_iter().map(param_sig).collect();
            let ret = if self.eat(":") { Some(self.parse_return_type()) } else { None };
            return Some(TypeMember::Call {
                type_params,
                params,
                ret,
            });
        }
        if self.at_word("new") && (self.peek_at(1).is("(") || self.peek_at(1).is("<")) {
            self.advance();
            let type_params = self.parse_type_params();
            let params = self.parse_params().into_iter().map(param_sig).collect();
            let ret = if self.eat(":") { Some(self.parse_return_type()) } else { None };
            return Some(TypeMember::Construct {
                type_params,
                params,
                ret,
            });
        }

        let mut readonly = false;
        if self.at_word("readonly") && self.at_property_name(1) {
            self.advance();
            readonly = true;
        }
        if (self.at_word("get") || self.at_word("set")) && self.at_property_name(1) {
            self.advance();
        }

        if self.at("[") && matches!(self.peek_at(1).tok, Tok::Ident(_)) && self.peek_at(2).is(":") {
            self.advance();
            self.advance();
            self.advance();
            let key = self.parse_type();
            self.expect("]");
            self.expect(":");
            let ty = self.parse_type();
            return Some(TypeMember::Index { key, ty });
        }

        let name = match self.parse_property_name()? {
            PropKey::Name(name) => name,
            PropKey::Computed(_) => "[computed]".to_string(),
        };
        let optional = self.eat("?");

        if self.at("(") || self.at("<") {
            let type_params = self.parse_type_params();
            let params = self.parse_params().into_iter().map(param_sig).collect();
            let ret = if self.eat(":") { Some(self.parse_return_type()) } else { None };
            return Some(TypeMember::Method {
                name,
                optional,
                type_params,
                params,
                ret,
            });
        }

        let ty = if self.eat(":") { Some(self.parse_type()) } else { None };
        Some(TypeMember::Property {
            name,
            ty,
            optional,
            readonly,
        })
    }
}

fn named(name: &str) -> TypeExpr {
    TypeExpr::Named {
        name: name.to_string(),
        args: Vec::new(),
        pos: Pos::default(),
    }
}

fn param_sig(param: Param) -> ParamSig {
    let name = match &param.pattern {
        Pattern::Ident(name) => name.text.clone(),
        _ => "__0".to_string(),
    };
    ParamSig {
        name,
        ty: param.ty,
        optional: param.optional || param.default.is_some(),
        rest: param.rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        let (program, issues) = parse(source);
        assert!(issues.is_empty(), "unexpected syntax errors: {issues:?}");
        program
    }

    #[test]
    fn test_declarations() {
        let program = parse_ok(
            "const a: number = 1;\nlet [b, c] = [1, 2];\nfunction f<T>(x: T, ...rest: T[]): T { return x; }\nclass C extends Base implements I { private x = 1; constructor(public y: string) { super(); } get z() { return 1; } }\ninterface I { a?: number; m(x: string): void; [k: string]: any }\ntype U = 'a' | 'b' | Array<Map<string, number>>;\nenum E { A, B = 3 }\n",
        );
        assert_eq!(program.body.len(), 7);
        assert!(!program.is_module);
    }

    #[test]
    fn test_arrows_and_generic_calls() {
        let program = parse_ok(
            "const f = (a: number, b = 2) => a + b;\nconst g = async x => { await x; };\nconst h = <T,>(x: T): T => x;\nconst m = make<string>('x');\nconst cmp = a < b && c > d;\n",
        );
        let StmtKind::Var { decls, .. } = &program.body[0].kind else {
            panic!("expected variable statement");
        };
        assert!(matches!(decls[0].init.as_ref().map(|e| &e.kind), Some(ExprKind::Function(_))));

        let StmtKind::Var { decls, .. } = &program.body[3].kind else {
            panic!("expected variable statement");
        };
        let Some(ExprKind::Call { type_args, .. }) = decls[0].init.as_ref().map(|e| &e.kind) else {
            panic!("expected call");
        };
        assert_eq!(type_args.len(), 1);

        let StmtKind::Var { decls, .. } = &program.body[4].kind else {
            panic!("expected variable statement");
        };
        assert!(matches!(
            decls[0].init.as_ref().map(|e| &e.kind),
            Some(ExprKind::Binary { op: "&&", .. })
        ));
    }

    #[test]
    fn test_parenthesized_is_not_arrow() {
        let program = parse_ok("const x = (a + b) * c;\nconst y = cond ? (a) : b;\n");
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn test_nested_generics_close() {
        parse_ok("let m: Map<string, Array<number>> = new Map();\nlet n: Array<Array<number>>= [];\nx >>= 1;\ny = a >> b;\n");
    }

    #[test]
    fn test_asi() {
        let program = parse_ok("let a = 1\nlet b = a\nb++\n");
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn test_missing_semicolon() {
        let (_, issues) = parse("let a = 1 let b = 2;");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "TS1005");
        assert_eq!(issues[0].message, "';' expected.");
        assert_eq!(issues[0].pos, Pos { line: 1, column: 11 });
    }

    #[test]
    fn test_modules() {
        let program = parse_ok("import { a, b as c } from './m';\nimport * as ns from 'ns';\nexport const d = a + c;\nexport default ns;\n");
        assert!(program.is_module);
        let StmtKind::Import { bindings } = &program.body[0].kind else {
            panic!("expected import");
        };
        let names: Vec<&str> = bindings.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_control_flow() {
        parse_ok(
            "for (let i = 0; i < 3; i++) {}\nfor (const x of xs) {}\nfor (const k in obj) {}\nwhile (a) { break; }\ndo { a--; } while (a > 0);\nswitch (x) { case 1: y(); break; default: z(); }\ntry { f(); } catch (e) { g(e); } finally { h(); }\n",
        );
    }

    #[test]
    fn test_object_and_templates() {
        parse_ok(
            "const o = { a, b: 1, [k]: 2, m() { return 1; }, get g() { return 2; }, ...rest };\nconst s = `x ${o.a} y ${`nested ${1}`}`;\nconst t = tag`a${b}`;\n",
        );
    }

    #[test]
    fn test_types() {
        parse_ok(
            "let a: (x: number) => string;\nlet b: { readonly [K in Keys]?: T[K] };\nlet c: [string, number?];\nlet d: typeof a;\nlet e: keyof T;\nlet f: T extends string ? 1 : 2;\nlet g: -1 | 'x' | `p${string}`;\nfunction isS(x: unknown): x is string { return typeof x === 'string'; }\n",
        );
    }

    #[test]
    fn test_nesting_limit_abandons_parse() {
        let depth = 500;
        let source = format!("const v = {}1{};\n", "[".repeat(depth), "]".repeat(depth));
        let (program, _) = parse(&source);
        assert!(program.too_deep);

        let chain = format!("const n = 1{};\n", " + 1".repeat(1000));
        assert!(parse(&chain).0.too_deep);

        assert!(!parse_ok("const v = [[[[1]]]];\nconst n = 1 + 2 + 3;\n").too_deep);
    }

    #[test]
    fn test_declare_module_body_is_dropped() {
        let program = parse_ok("declare module \"foo\" {\n  export const x: number;\n}\n");
        assert!(matches!(&program.body[0].kind, StmtKind::Block(body) if body.is_empty()));
        assert!(!program.is_module);
    }
}
