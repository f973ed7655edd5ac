//! Scoped type checker: declarations, hoisting and statements.
//!
//! Expressions live in `expr.rs`, type relations in `relate.rs` and flow
//! narrowing in `narrow.rs`; all of them extend [`Checker`].

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::ast::*;
use super::lib;
use super::types::{DeclRef, EnumType, NamedType, ParamType, Property, Shape, Signature, Type};
use crate::compile::types::RawDiagnostic;
use crate::profile::Target;

pub(super) type BindingId = usize;
pub(super) type ScopeId = usize;

/// A narrowable reference: a binding (or `this`) plus a `.a.b` member path.
pub(super) type RefKey = (BindingId, String);

/// Binding id standing in for `this` in reference keys.
pub(super) const THIS_REF: BindingId = usize::MAX;

/// Options that change checking behavior.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub target: Target,
    pub strict: bool,
    pub no_implicit_any: bool,
    pub no_unused_locals: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BindingKind {
    Var,
    Let,
    Const,
    Param,
    Function,
    Class,
    Enum,
    Import,
    Namespace,
}

impl BindingKind {
    fn is_block_scoped(self) -> bool {
        matches!(self, BindingKind::Let | BindingKind::Const)
    }
}

#[derive(Debug, Clone)]
pub(super) struct Binding {
    pub name: String,
    pub kind: BindingKind,
    pub ty: Type,
    pub pos: Pos,
    pub read: bool,
    pub track_unused: bool,
    pub redeclared: bool,
    /// The type came from an annotation.
    pub annotated: bool,
    pub has_body: bool,
    pub overloads: Vec<Rc<Signature>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ScopeKind {
    Lib,
    Script,
    Module,
    Function,
    Block,
}

#[derive(Clone)]
pub(super) enum TypeDecl<'a> {
    Interface(usize),
    Class(usize),
    Alias {
        params: &'a [String],
        ty: &'a TypeExpr,
        scope: ScopeId,
    },
    Enum(Rc<EnumType>),
    Param(Rc<str>),
    /// Names usable as types that are not modeled (namespaces, opaque globals).
    Opaque,
}

pub(super) struct Scope<'a> {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    pub values: FxHashMap<String, BindingId>,
    pub types: FxHashMap<String, TypeDecl<'a>>,
    /// Declaration order, for unused-local reports.
    pub order: Vec<BindingId>,
}

pub(super) struct InterfacePart<'a> {
    pub extends: &'a [TypeExpr],
    pub members: &'a [TypeMember],
    pub scope: ScopeId,
}

pub(super) struct InterfaceInfo<'a> {
    pub name: Rc<str>,
    pub params: &'a [String],
    pub parts: Vec<InterfacePart<'a>>,
}

pub(super) struct ClassInfo<'a> {
    pub name: Rc<str>,
    pub ast: &'a Class,
    pub scope: ScopeId,
    pub params: Vec<Rc<str>>,
    /// Instance type of the base class, once the heritage clause is checked.
    pub base: Option<Type>,
    /// Constructor type of the base class.
    pub base_ctor: Option<Type>,
    pub method_returns: FxHashMap<String, Type>,
    pub prop_types: FxHashMap<String, Type>,
    pub checked: bool,
}

/// State of the innermost function being checked.
pub(super) struct FnContext {
    pub declared: Option<Type>,
    pub returns: Vec<Type>,
    pub is_async: bool,
    pub is_generator: bool,
}

pub(super) struct Checker<'a> {
    pub options: Options,
    pub scopes: Vec<Scope<'a>>,
    pub current: ScopeId,
    pub bindings: Vec<Binding>,
    pub interfaces: Vec<InterfaceInfo<'a>>,
    pub classes: Vec<ClassInfo<'a>>,
    pub functions: Vec<FnContext>,
    pub this_types: Vec<Type>,
    pub narrowing: Vec<FxHashMap<RefKey, Type>>,
    pub diagnostics: Vec<RawDiagnostic>,
    /// Suppresses diagnostics while > 0.
    pub quiet: usize,
    pub depth: usize,
    pub expansions: FxHashMap<(DeclRef, String), Rc<Shape>>,
    /// Type aliases being resolved, to cut recursive references.
    pub resolving: Vec<(ScopeId, String)>,
    /// Type pairs being related, assumed assignable on re-entry.
    pub relating: Vec<(Type, Type)>,
}

/// Check a parsed unit.
pub fn check_program(program: &Program, options: Options) -> Vec<RawDiagnostic> {
    let mut checker = Checker::new(options);
    checker.load_lib();

    let kind = if program.is_module { ScopeKind::Module } else { ScopeKind::Script };
    checker.push_scope(kind);
    checker.hoist_vars(&program.body);
    checker.hoist(&program.body);
    checker.check_statements(&program.body);
    checker.pop_scope();

    let mut diagnostics = checker.diagnostics;
    diagnostics.sort_by_key(|d| (d.line, d.column));
    diagnostics.dedup();
    diagnostics
}

impl<'a> Checker<'a> {
    fn new(options: Options) -> Self {
        Self {
            options,
            scopes: Vec::new(),
            current: 0,
            bindings: Vec::new(),
            interfaces: Vec::new(),
            classes: Vec::new(),
            functions: Vec::new(),
            this_types: Vec::new(),
            narrowing: vec![FxHashMap::default()],
            diagnostics: Vec::new(),
            quiet: 0,
            depth: 0,
            expansions: FxHashMap::default(),
            resolving: Vec::new(),
            relating: Vec::new(),
        }
    }

    fn load_lib(&mut self) {
        self.scopes.push(Scope {
            parent: None,
            kind: ScopeKind::Lib,
            values: FxHashMap::default(),
            types: FxHashMap::default(),
            order: Vec::new(),
        });
        self.current = 0;

        for name in lib::OPAQUE_GLOBALS {
            self.scopes[0].types.insert(name.to_string(), TypeDecl::Opaque);
            self.declare_value(name, BindingKind::Var, Type::Any, Pos::default());
        }

        self.quiet += 1;
        let programs: Vec<&'static Program> = lib::programs(self.options.target).collect();
        for program in &programs {
            self.hoist_vars(&program.body);
        }
        for program in &programs {
            for stmt in &program.body {
                self.hoist_type(stmt);
            }
        }
        for program in &programs {
            for stmt in &program.body {
                self.hoist_value(stmt);
            }
        }
        self.quiet -= 1;
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub(super) fn error(&mut self, pos: Pos, code: &str, message: impl Into<String>) {
        if self.quiet == 0 {
            self.diagnostics
                .push(RawDiagnostic::error(pos.line, pos.column, code, message));
        }
    }

    pub(super) fn warning(&mut self, pos: Pos, code: &str, message: impl Into<String>) {
        if self.quiet == 0 {
            self.diagnostics
                .push(RawDiagnostic::warning(pos.line, pos.column, code, message));
        }
    }

    // =========================================================================
    // Scopes and bindings
    // =========================================================================

    pub(super) fn push_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            parent: Some(self.current),
            kind,
            values: FxHashMap::default(),
            types: FxHashMap::default(),
            order: Vec::new(),
        });
        self.current = id;
        self.narrowing.push(FxHashMap::default());
        id
    }

    pub(super) fn pop_scope(&mut self) {
        let scope = self.current;
        self.report_unused(scope);
        let frame = self.narrowing.pop().unwrap_or_default();
        self.current = self.scopes[scope].parent.unwrap_or(0);

        // Assignments to outer references inside a block stay visible after it.
        if self.scopes[scope].kind == ScopeKind::Block
            && let Some(top) = self.narrowing.last_mut()
        {
            let owned: Vec<BindingId> = self.scopes[scope].values.values().copied().collect();
            for (key, ty) in frame {
                if !owned.contains(&key.0) {
                    top.insert(key, ty);
                }
            }
        }
    }

    fn report_unused(&mut self, scope: ScopeId) {
        if !self.options.no_unused_locals {
            return;
        }
        if !matches!(self.scopes[scope].kind, ScopeKind::Function | ScopeKind::Block) {
            return;
        }
        let order = self.scopes[scope].order.clone();
        for id in order {
            let binding = &self.bindings[id];
            if binding.track_unused && !binding.read {
                let (pos, name) = (binding.pos, binding.name.clone());
                self.warning(pos, "TS6133", format!("'{name}' is declared but its value is never read."));
            }
        }
    }

    /// Nearest scope that owns `var` declarations.
    fn function_scope(&self) -> ScopeId {
        let mut id = self.current;
        loop {
            let scope = &self.scopes[id];
            if !matches!(scope.kind, ScopeKind::Block) {
                return id;
            }
            match scope.parent {
                Some(parent) => id = parent,
                None => return id,
            }
        }
    }

    pub(super) fn lookup_value(&self, name: &str) -> Option<BindingId> {
        let mut id = Some(self.current);
        while let Some(scope_id) = id {
            let scope = &self.scopes[scope_id];
            if let Some(binding) = scope.values.get(name) {
                return Some(*binding);
            }
            id = scope.parent;
        }
        None
    }

    pub(super) fn lookup_type(&self, name: &str) -> Option<TypeDecl<'a>> {
        let mut id = Some(self.current);
        while let Some(scope_id) = id {
            let scope = &self.scopes[scope_id];
            if let Some(decl) = scope.types.get(name) {
                return Some(decl.clone());
            }
            id = scope.parent;
        }
        None
    }

    pub(super) fn declare_value(&mut self, name: &str, kind: BindingKind, ty: Type, pos: Pos) -> BindingId {
        let scope_id = if kind == BindingKind::Var {
            self.function_scope()
        } else {
            self.current
        };
        self.declare_value_in(scope_id, name, kind, ty, pos)
    }

    fn declare_value_in(&mut self, scope_id: ScopeId, name: &str, kind: BindingKind, ty: Type, pos: Pos) -> BindingId {
        if let Some(&existing) = self.scopes[scope_id].values.get(name) {
            let existing_kind = self.bindings[existing].kind;
            let merges = matches!(
                (existing_kind, kind),
                (BindingKind::Var, BindingKind::Var)
                    | (BindingKind::Param, BindingKind::Var)
                    | (BindingKind::Function, BindingKind::Function)
                    | (BindingKind::Enum, BindingKind::Enum)
                    | (BindingKind::Namespace, _)
                    | (_, BindingKind::Namespace)
            );
            if merges {
                return existing;
            }

            let (code, message) = if existing_kind.is_block_scoped() || kind.is_block_scoped() {
                ("TS2451", format!("Cannot redeclare block-scoped variable '{name}'."))
            } else {
                ("TS2300", format!("Duplicate identifier '{name}'."))
            };
            if !self.bindings[existing].redeclared {
                self.bindings[existing].redeclared = true;
                let first = self.bindings[existing].pos;
                self.error(first, code, message.clone());
            }
            self.error(pos, code, message);
            return existing;
        }

        let scope_kind = self.scopes[scope_id].kind;
        let track_unused = matches!(scope_kind, ScopeKind::Function | ScopeKind::Block)
            && !matches!(kind, BindingKind::Param | BindingKind::Namespace);

        let id = self.bindings.len();
        self.bindings.push(Binding {
            name: name.to_string(),
            kind,
            ty,
            pos,
            read: false,
            track_unused,
            redeclared: false,
            annotated: false,
            has_body: false,
            overloads: Vec::new(),
        });
        let scope = &mut self.scopes[scope_id];
        scope.values.insert(name.to_string(), id);
        scope.order.push(id);
        id
    }

    fn declare_type(&mut self, name: &Name, decl: TypeDecl<'a>) {
        let scope = &mut self.scopes[self.current];
        if let Some(existing) = scope.types.get(&name.text) {
            let mergeable = matches!(
                (existing, &decl),
                (TypeDecl::Interface(_), TypeDecl::Interface(_))
                    | (TypeDecl::Class(_), TypeDecl::Interface(_))
                    | (TypeDecl::Interface(_), TypeDecl::Class(_))
                    | (TypeDecl::Enum(_), TypeDecl::Enum(_))
                    | (TypeDecl::Opaque, _)
            );
            if !mergeable {
                let message = format!("Duplicate identifier '{}'.", name.text);
                self.error(name.pos, "TS2300", message);
            }
            return;
        }
        scope.types.insert(name.text.clone(), decl);
    }

    /// Declare type parameters as `Param` types in the current scope.
    pub(super) fn declare_type_params(&mut self, params: &[String]) -> Vec<Rc<str>> {
        let mut out = Vec::with_capacity(params.len());
        for param in params {
            let name: Rc<str> = Rc::from(param.as_str());
            self.scopes[self.current]
                .types
                .insert(param.clone(), TypeDecl::Param(name.clone()));
            out.push(name);
        }
        out
    }

    /// Type of a binding as seen at the current point of flow.
    pub(super) fn binding_type(&self, id: BindingId) -> Type {
        self.narrowed(&(id, String::new()))
            .unwrap_or_else(|| self.bindings[id].ty.clone())
    }

    /// Flow type of a reference, if it has been narrowed.
    pub(super) fn narrowed(&self, key: &RefKey) -> Option<Type> {
        self.narrowing
            .iter()
            .rev()
            .find_map(|frame| frame.get(key))
            .cloned()
    }

    pub(super) fn mark_read(&mut self, name: &str) {
        if let Some(id) = self.lookup_value(name) {
            self.bindings[id].read = true;
        }
    }

    // =========================================================================
    // Hoisting
    // =========================================================================

    /// Declare every `var` in `stmts` (not crossing function boundaries)
    /// in the current function scope.
    pub(super) fn hoist_vars(&mut self, stmts: &'a [Stmt]) {
        for stmt in stmts {
            self.hoist_vars_in(stmt);
        }
    }

    fn hoist_vars_in(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Var {
                kind: VarKind::Var,
                decls,
                ..
            } => {
                for decl in decls {
                    self.declare_pattern_names(&decl.pattern, BindingKind::Var, decl.ty.is_some());
                }
            }
            StmtKind::Block(body) => self.hoist_vars(body),
            StmtKind::If { then, otherwise, .. } => {
                self.hoist_vars_in(then);
                if let Some(otherwise) = otherwise {
                    self.hoist_vars_in(otherwise);
                }
            }
            StmtKind::For { init, body, .. } => {
                if let Some(ForInit::Var(VarKind::Var, decls)) = init {
                    for decl in decls {
                        self.declare_pattern_names(&decl.pattern, BindingKind::Var, decl.ty.is_some());
                    }
                }
                self.hoist_vars_in(body);
            }
            StmtKind::ForInOf { head, body, .. } => {
                if let ForHead::Var(VarKind::Var, pattern) = head {
                    self.declare_pattern_names(pattern, BindingKind::Var, false);
                }
                self.hoist_vars_in(body);
            }
            StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } | StmtKind::Labeled(body) => {
                self.hoist_vars_in(body)
            }
            StmtKind::Switch { cases, .. } => {
                for case in cases {
                    self.hoist_vars(&case.body);
                }
            }
            StmtKind::Try {
                block,
                handler,
                finalizer,
                ..
            } => {
                self.hoist_vars(block);
                if let Some(handler) = handler {
                    self.hoist_vars(handler);
                }
                if let Some(finalizer) = finalizer {
                    self.hoist_vars(finalizer);
                }
            }
            _ => {}
        }
    }

    fn declare_pattern_names(&mut self, pattern: &Pattern, kind: BindingKind, annotated: bool) {
        let single = matches!(pattern, Pattern::Ident(_));
        for name in pattern.names() {
            let id = self.declare_value(&name.text, kind, Type::Any, name.pos);
            if single && annotated {
                self.bindings[id].annotated = true;
            }
        }
    }

    /// Declare the block-level names of `stmts` in the current scope.
    pub(super) fn hoist(&mut self, stmts: &'a [Stmt]) {
        // Types first so that value annotations can refer to them.
        for stmt in stmts {
            self.hoist_type(stmt);
        }
        for stmt in stmts {
            self.hoist_value(stmt);
        }
    }

    fn hoist_type(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Interface {
                name,
                type_params,
                extends,
                members,
            } => {
                let part = InterfacePart {
                    extends,
                    members,
                    scope: self.current,
                };
                if let Some(TypeDecl::Interface(id)) = self.scopes[self.current].types.get(&name.text) {
                    let id = *id;
                    self.interfaces[id].parts.push(part);
                    return;
                }
                // Interfaces merge across scopes with a same-named one further out
                // (library augmentation).
                if let Some(TypeDecl::Interface(id)) = self.lookup_type(&name.text)
                    && self.scopes[self.current].kind != ScopeKind::Block
                    && self.scopes[self.current].kind != ScopeKind::Function
                {
                    self.interfaces[id].parts.push(part);
                    self.scopes[self.current]
                        .types
                        .insert(name.text.clone(), TypeDecl::Interface(id));
                    return;
                }
                let id = self.interfaces.len();
                self.interfaces.push(InterfaceInfo {
                    name: Rc::from(name.text.as_str()),
                    params: type_params,
                    parts: vec![part],
                });
                self.declare_type(name, TypeDecl::Interface(id));
            }
            StmtKind::TypeAlias { name, type_params, ty } => {
                let decl = TypeDecl::Alias {
                    params: type_params,
                    ty,
                    scope: self.current,
                };
                self.declare_type(name, decl);
            }
            StmtKind::Class(class) => {
                if let Some(name) = &class.name {
                    let id = self.register_class(class, &name.text);
                    self.declare_type(name, TypeDecl::Class(id));
                }
            }
            StmtKind::Enum { name, members } => {
                let numeric = members
                    .iter()
                    .all(|m| !matches!(m.init.as_ref().map(|e| &e.kind), Some(ExprKind::Str(_) | ExprKind::Template(_))));
                let enum_type = Rc::new(EnumType {
                    name: Rc::from(name.text.as_str()),
                    numeric,
                });
                self.declare_type(name, TypeDecl::Enum(enum_type));
            }
            StmtKind::Namespace { name: Some(name), .. } => {
                self.scopes[self.current]
                    .types
                    .entry(name.text.clone())
                    .or_insert(TypeDecl::Opaque);
            }
            StmtKind::Namespace { name: None, body } => {
                // `declare global { ... }` augments the enclosing scope.
                for stmt in body {
                    self.hoist_type(stmt);
                }
            }
            StmtKind::Import { bindings } => {
                for binding in bindings {
                    self.scopes[self.current]
                        .types
                        .entry(binding.text.clone())
                        .or_insert(TypeDecl::Opaque);
                }
            }
            _ => {}
        }
    }

    pub(super) fn register_class(&mut self, class: &'a Class, name: &str) -> usize {
        let id = self.classes.len();
        self.classes.push(ClassInfo {
            name: Rc::from(name),
            ast: class,
            scope: self.current,
            params: class.type_params.iter().map(|p| Rc::from(p.as_str())).collect(),
            base: None,
            base_ctor: None,
            method_returns: FxHashMap::default(),
            prop_types: FxHashMap::default(),
            checked: false,
        });
        id
    }

    fn hoist_value(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Var { kind, decls, .. } if *kind != VarKind::Var => {
                let binding_kind = if *kind == VarKind::Const {
                    BindingKind::Const
                } else {
                    BindingKind::Let
                };
                for decl in decls {
                    self.declare_pattern_names(&decl.pattern, binding_kind, decl.ty.is_some());
                }
            }
            StmtKind::Var {
                kind: VarKind::Var,
                decls,
                ..
            } => {
                // Already declared by `hoist_vars`; resolve annotations now that
                // types are known.
                for decl in decls {
                    self.resolve_decl_annotation(decl);
                }
                return;
            }
            StmtKind::Function(func) => {
                self.hoist_function(func);
                return;
            }
            StmtKind::Class(class) => {
                if let Some(name) = &class.name
                    && let Some(TypeDecl::Class(id)) = self.scopes[self.current].types.get(&name.text).cloned()
                {
                    let ty = class_static_type(&self.classes[id].name, id);
                    self.declare_value(&name.text, BindingKind::Class, ty, name.pos);
                }
                return;
            }
            StmtKind::Enum { name, members } => {
                if let Some(TypeDecl::Enum(enum_type)) = self.lookup_type(&name.text) {
                    let shape = Shape {
                        props: members
                            .iter()
                            .map(|m| Property {
                                name: Rc::from(m.name.text.as_str()),
                                ty: Type::Enum(enum_type.clone()),
                                optional: false,
                                readonly: true,
                            })
                            .collect(),
                        name: Some(Rc::from(format!("typeof {}", name.text).as_str())),
                        ..Shape::default()
                    };
                    self.declare_value(&name.text, BindingKind::Enum, Type::Object(Rc::new(shape)), name.pos);
                }
                return;
            }
            StmtKind::Import { bindings } => {
                for binding in bindings {
                    self.declare_value(&binding.text, BindingKind::Import, Type::Any, binding.pos);
                }
                return;
            }
            StmtKind::Namespace { name: Some(name), .. } => {
                self.declare_value(&name.text, BindingKind::Namespace, Type::Any, name.pos);
                return;
            }
            StmtKind::Namespace { name: None, body } => {
                for stmt in body {
                    self.hoist_value(stmt);
                }
                return;
            }
            _ => return,
        }

        if let StmtKind::Var { decls, .. } = &stmt.kind {
            for decl in decls {
                self.resolve_decl_annotation(decl);
            }
        }
    }

    /// Store the annotated type of a single-name declaration on its binding.
    fn resolve_decl_annotation(&mut self, decl: &'a VarDecl) {
        if let (Pattern::Ident(name), Some(ty)) = (&decl.pattern, &decl.ty)
            && let Some(id) = self.lookup_value(&name.text)
        {
            let resolved = self.resolve_type(ty);
            self.bindings[id].ty = resolved;
            self.bindings[id].annotated = true;
        }
    }

    fn hoist_function(&mut self, func: &'a Function) {
        let Some(name) = &func.name else {
            return;
        };
        let sig = self.signature_from_annotations(func);
        let id = self.declare_value(&name.text, BindingKind::Function, Type::Fn(sig.clone()), name.pos);
        if self.bindings[id].kind != BindingKind::Function {
            return;
        }

        let has_body = !matches!(func.body, FunctionBody::None);
        if has_body {
            if self.bindings[id].has_body {
                let first = self.bindings[id].pos;
                self.error(first, "TS2393", "Duplicate function implementation.");
                self.error(name.pos, "TS2393", "Duplicate function implementation.");
            }
            self.bindings[id].has_body = true;
        } else {
            self.bindings[id].overloads.push(sig.clone());
        }

        let binding = &mut self.bindings[id];
        binding.ty = match binding.overloads.len() {
            0 => Type::Fn(sig),
            1 => Type::Fn(binding.overloads[0].clone()),
            _ => Type::Object(Rc::new(Shape {
                calls: binding.overloads.clone(),
                ..Shape::default()
            })),
        };
    }

    /// Signature of a function from its annotations alone.
    pub(super) fn signature_from_annotations(&mut self, func: &'a Function) -> Rc<Signature> {
        self.push_scope(ScopeKind::Block);
        let type_params = self.declare_type_params(&func.type_params);
        let mut params = Vec::with_capacity(func.params.len());
        for param in &func.params {
            if matches!(&param.pattern, Pattern::Ident(n) if n.text == "this") {
                continue;
            }
            let ty = match &param.ty {
                Some(ty) => self.resolve_type(ty),
                None => Type::Any,
            };
            params.push(ParamType {
                name: param_name(param),
                ty,
                optional: param.optional || param.default.is_some(),
                rest: param.rest,
            });
        }
        let ret = match &func.ret {
            Some(ret) => self.resolve_type(ret),
            None => Type::Any,
        };
        self.scopes[self.current].order.clear();
        self.pop_scope();
        Rc::new(Signature {
            type_params,
            params,
            ret,
        })
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub(super) fn check_statements(&mut self, stmts: &'a [Stmt]) {
        for stmt in stmts {
            self.check_stmt(stmt);
        }
    }

    /// Check a block in a fresh scope.
    fn check_block(&mut self, stmts: &'a [Stmt]) {
        self.push_scope(ScopeKind::Block);
        self.hoist(stmts);
        self.check_statements(stmts);
        self.pop_scope();
    }

    pub(super) fn check_stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Var { kind, decls, declare } => {
                for decl in decls {
                    self.check_var_decl(*kind, decl, *declare);
                }
            }
            StmtKind::Function(func) => self.check_function_decl(func),
            StmtKind::Class(class) => {
                if let Some(name) = &class.name
                    && let Some(TypeDecl::Class(id)) = self.lookup_type(&name.text)
                {
                    self.check_class(id);
                }
            }
            StmtKind::Interface { extends, members, .. } => {
                for ty in extends {
                    self.resolve_type(ty);
                }
                self.push_scope(ScopeKind::Block);
                if let StmtKind::Interface { type_params, .. } = &stmt.kind {
                    self.declare_type_params(type_params);
                }
                self.resolve_object_type(members);
                self.pop_scope();
            }
            StmtKind::TypeAlias { type_params, ty, .. } => {
                self.push_scope(ScopeKind::Block);
                self.declare_type_params(type_params);
                self.resolve_type(ty);
                self.pop_scope();
            }
            StmtKind::Enum { members, .. } => {
                for member in members {
                    if let Some(init) = &member.init {
                        self.check_expr(init, None);
                    }
                }
            }
            StmtKind::Import { .. } => {}
            StmtKind::ExportNames(names) => {
                for name in names {
                    if self.lookup_value(&name.text).is_some() {
                        self.mark_read(&name.text);
                    } else if self.lookup_type(&name.text).is_none() {
                        let message = format!("Cannot find name '{}'.", name.text);
                        self.error(name.pos, "TS2304", message);
                    }
                }
            }
            StmtKind::ExportDefault(expr) => {
                self.check_expr(expr, None);
            }
            StmtKind::Namespace { name, body } => {
                if name.is_some() {
                    self.push_scope(ScopeKind::Module);
                    self.hoist_vars(body);
                    self.hoist(body);
                    self.check_statements(body);
                    self.pop_scope();
                } else {
                    self.check_statements(body);
                }
            }
            StmtKind::Expr(expr) => {
                self.check_expr(expr, None);
            }
            StmtKind::Block(body) => self.check_block(body),
            StmtKind::If { test, then, otherwise } => self.check_if(test, then, otherwise.as_deref()),
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.push_scope(ScopeKind::Block);
                match init {
                    Some(ForInit::Var(kind, decls)) => {
                        if *kind != VarKind::Var {
                            let binding_kind = if *kind == VarKind::Const {
                                BindingKind::Const
                            } else {
                                BindingKind::Let
                            };
                            for decl in decls {
                                self.declare_pattern_names(&decl.pattern, binding_kind, decl.ty.is_some());
                                self.resolve_decl_annotation(decl);
                            }
                        }
                        for decl in decls {
                            self.check_var_decl(*kind, decl, false);
                        }
                    }
                    Some(ForInit::Expr(expr)) => {
                        self.check_expr(expr, None);
                    }
                    None => {}
                }
                if let Some(test) = test {
                    self.check_condition(test);
                }
                self.check_loop(test.as_ref(), |c| {
                    c.check_stmt(body);
                    if let Some(update) = update {
                        c.check_expr(update, None);
                    }
                });
                self.pop_scope();
            }
            StmtKind::ForInOf { head, iter, body, of } => {
                self.push_scope(ScopeKind::Block);
                let iter_ty = self.check_expr(iter, None);
                let elem = if *of {
                    self.iterated_type(&iter_ty)
                } else {
                    Type::String
                };
                match head {
                    ForHead::Var(kind, pattern) => {
                        let binding_kind = match kind {
                            VarKind::Var => BindingKind::Var,
                            VarKind::Let => BindingKind::Let,
                            VarKind::Const => BindingKind::Const,
                        };
                        if *kind != VarKind::Var {
                            self.declare_pattern_names(pattern, binding_kind, false);
                        }
                        self.bind_pattern(pattern, &elem);
                    }
                    ForHead::Expr(expr) => {
                        self.check_expr(expr, None);
                    }
                }
                self.check_loop(None, |c| c.check_stmt(body));
                self.pop_scope();
            }
            StmtKind::While { test, body } => {
                self.check_condition(test);
                self.check_loop(Some(test), |c| c.check_stmt(body));
            }
            StmtKind::DoWhile { body, test } => {
                self.check_loop(None, |c| c.check_stmt(body));
                self.check_condition(test);
            }
            StmtKind::Return(value) => self.check_return(stmt.pos, value.as_ref()),
            StmtKind::Throw(value) => {
                self.check_expr(value, None);
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {}
            StmtKind::Switch { discriminant, cases } => self.check_switch(discriminant, cases),
            StmtKind::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                self.check_block(block);
                if let Some(handler) = handler {
                    self.push_scope(ScopeKind::Block);
                    if let Some((pattern, ty)) = param {
                        let declared = match ty {
                            Some(ty) => self.resolve_type(ty),
                            None if self.options.strict => Type::Unknown,
                            None => Type::Any,
                        };
                        self.declare_pattern_names(pattern, BindingKind::Let, false);
                        for name in pattern.names() {
                            if let Some(id) = self.lookup_value(&name.text) {
                                self.bindings[id].track_unused = false;
                            }
                        }
                        self.bind_pattern(pattern, &declared);
                    }
                    self.hoist(handler);
                    self.check_statements(handler);
                    self.pop_scope();
                }
                if let Some(finalizer) = finalizer {
                    self.check_block(finalizer);
                }
            }
            StmtKind::Labeled(inner) => self.check_stmt(inner),
        }
    }

    fn check_var_decl(&mut self, kind: VarKind, decl: &'a VarDecl, declare: bool) {
        let declared = match (&decl.pattern, &decl.ty) {
            (Pattern::Ident(name), Some(_)) => self.lookup_value(&name.text).map(|id| self.bindings[id].ty.clone()),
            (_, Some(ty)) => Some(self.resolve_type(ty)),
            (_, None) => None,
        };

        if kind == VarKind::Const && decl.init.is_none() && !declare {
            if let Pattern::Ident(name) = &decl.pattern {
                self.error(name.pos, "TS1155", "'const' declarations must be initialized.");
            }
        }

        // An array literal destructured by an array pattern is a tuple.
        let context = match (&declared, &decl.pattern, decl.init.as_ref().map(|i| &i.kind)) {
            (None, Pattern::Array { .. }, Some(ExprKind::Array(elems))) => {
                Some(Type::Tuple(elems.iter().map(|_| Type::Any).collect()))
            }
            _ => declared.clone(),
        };
        let init_ty = decl
            .init
            .as_ref()
            .map(|init| (init, self.check_expr(init, context.as_ref())));

        match (&declared, init_ty) {
            (Some(declared), Some((init, ty))) => {
                self.check_assignable_expr(init, &ty, declared, decl.pattern.pos());
                if !matches!(decl.pattern, Pattern::Ident(_)) {
                    self.bind_pattern(&decl.pattern, declared);
                } else if let Pattern::Ident(name) = &decl.pattern {
                    // A declared union is narrowed by the initializer.
                    if let Some(id) = self.lookup_value(&name.text)
                        && matches!(declared, Type::Union(_))
                        && !ty.is_opaque()
                    {
                        let narrowed = self.narrow_to_assigned(declared, &ty);
                        self.set_narrowing((id, String::new()), narrowed);
                    }
                }
            }
            (Some(declared), None) => {
                if !matches!(decl.pattern, Pattern::Ident(_)) {
                    self.bind_pattern(&decl.pattern, declared);
                }
            }
            (None, Some((_, ty))) => {
                let ty = self.declaration_type(kind, ty);
                self.bind_pattern(&decl.pattern, &ty);
            }
            (None, None) => {}
        }
    }

    /// Type given to an unannotated declaration by its initializer.
    fn declaration_type(&self, kind: VarKind, init: Type) -> Type {
        let ty = if kind == VarKind::Const { init } else { init.widen() };
        match ty {
            Type::Null | Type::Undefined if !self.options.strict => Type::Any,
            Type::Null | Type::Undefined if kind != VarKind::Const => Type::Any,
            Type::Array(elem) if matches!(*elem, Type::Never) => Type::array(Type::Any),
            other => other,
        }
    }

    /// Assign types to the names of a binding pattern.
    pub(super) fn bind_pattern(&mut self, pattern: &'a Pattern, ty: &Type) {
        match pattern {
            Pattern::Ident(name) => {
                if let Some(id) = self.lookup_value(&name.text)
                    && !self.bindings[id].annotated
                {
                    self.bindings[id].ty = ty.clone();
                }
            }
            Pattern::Object { props, rest, .. } => {
                let source = if self.options.strict { ty.non_nullable() } else { ty.clone() };
                for (key, pattern, default) in props {
                    let mut prop_ty = match self.property_type(&source, key) {
                        Some(t) => t,
                        None => {
                            if !source.is_opaque() && self.is_closed_object(&source) {
                                let message = format!("Property '{key}' does not exist on type '{source}'.");
                                self.error(pattern.pos(), "TS2339", message);
                            }
                            Type::Any
                        }
                    };
                    if let Some(default) = default {
                        let default_ty = self.check_expr(default, Some(&prop_ty));
                        prop_ty = Type::union([prop_ty.non_nullable(), default_ty.widen()]);
                    }
                    self.bind_pattern(pattern, &prop_ty);
                }
                if let Some(rest) = rest {
                    self.bind_pattern(rest, &Type::Any);
                }
            }
            Pattern::Array { elems, rest, .. } => {
                for (i, elem) in elems.iter().enumerate() {
                    let Some((pattern, default)) = elem else {
                        continue;
                    };
                    let mut elem_ty = match ty {
                        Type::Tuple(items) => items.get(i).cloned().unwrap_or(Type::Undefined),
                        other => self.iterated_type(other),
                    };
                    if let Some(default) = default {
                        let default_ty = self.check_expr(default, Some(&elem_ty));
                        elem_ty = Type::union([elem_ty.non_nullable(), default_ty.widen()]);
                    }
                    self.bind_pattern(pattern, &elem_ty);
                }
                if let Some(rest) = rest {
                    let rest_ty = match ty {
                        Type::Tuple(items) => Type::array(Type::union(items.iter().skip(elems.len()).cloned())),
                        Type::Array(_) => ty.clone(),
                        _ => Type::array(Type::Any),
                    };
                    self.bind_pattern(rest, &rest_ty);
                }
            }
        }
    }

    fn check_if(&mut self, test: &'a Expr, then: &'a Stmt, otherwise: Option<&'a Stmt>) {
        self.check_condition(test);
        let truthy = self.narrow(test, true);
        let falsy = self.narrow(test, false);

        let then_state = self.branch(truthy, |c| c.check_stmt(then));
        let then_terminates = terminates(then);

        let (else_state, else_terminates) = match otherwise {
            Some(otherwise) => (self.branch(falsy, |c| c.check_stmt(otherwise)), terminates(otherwise)),
            None => (falsy.into_iter().collect(), false),
        };

        self.merge_branches(
            [
                (!then_terminates).then_some(then_state),
                (!else_terminates).then_some(else_state),
            ]
            .into_iter()
            .flatten()
            .collect(),
        );
    }

    fn check_switch(&mut self, discriminant: &'a Expr, cases: &'a [SwitchCase]) {
        let disc_ty = self.check_expr(discriminant, None);
        self.push_scope(ScopeKind::Block);
        for case in cases {
            self.hoist(&case.body);
        }

        let mut pending: Vec<&'a Expr> = Vec::new();
        let mut all_tests: Vec<&'a Expr> = Vec::new();
        let mut has_default = false;
        let mut falls_through = false;
        for case in cases {
            match &case.test {
                Some(test) => {
                    let test_ty = self.check_expr(test, None);
                    self.check_comparable(test.pos, &disc_ty, &test_ty, "case");
                    pending.push(test);
                    all_tests.push(test);
                }
                None => has_default = true,
            }
            if case.body.is_empty() {
                continue;
            }
            // Bodies reached by falling through from the previous one are not narrowed.
            let narrowed = match (falls_through, has_default) {
                (true, _) => Vec::new(),
                (false, false) => self.narrow_switch(discriminant, &pending),
                (false, true) if pending.is_empty() => self.narrow_switch_default(discriminant, &all_tests),
                (false, true) => Vec::new(),
            };
            pending.clear();
            has_default = false;
            falls_through = !case.body.last().is_some_and(terminates);
            self.with_narrowing(narrowed, |c| c.check_statements(&case.body));
        }
        self.pop_scope();
    }

    fn check_return(&mut self, pos: Pos, value: Option<&'a Expr>) {
        let Some(context) = self.functions.last() else {
            self.error(pos, "TS1108", "A 'return' statement can only be used within a function body.");
            if let Some(value) = value {
                self.check_expr(value, None);
            }
            return;
        };
        let is_async = context.is_async;
        let is_generator = context.is_generator;
        let declared = context.declared.clone().map(|t| if is_async { self.awaited(&t) } else { t });

        let ty = match value {
            Some(value) => {
                let ty = self.check_expr(value, declared.as_ref());
                let ty = if is_async { self.awaited(&ty) } else { ty };
                if let Some(declared) = &declared
                    && !is_generator
                {
                    self.check_assignable_expr(value, &ty, declared, pos);
                }
                ty
            }
            None => Type::Undefined,
        };
        if let Some(context) = self.functions.last_mut() {
            context.returns.push(ty);
        }
    }

    // =========================================================================
    // Functions and classes
    // =========================================================================

    fn check_function_decl(&mut self, func: &'a Function) {
        let sig = self.check_function(func, None);
        if func.ret.is_none()
            && !matches!(func.body, FunctionBody::None)
            && let Some(name) = &func.name
            && let Some(id) = self.lookup_value(&name.text)
            && self.bindings[id].kind == BindingKind::Function
            && self.bindings[id].overloads.is_empty()
        {
            self.bindings[id].ty = Type::Fn(sig);
        }
    }

    /// Check a function body and return its (inferred) signature.
    ///
    /// `context` types unannotated parameters of function expressions.
    pub(super) fn check_function(&mut self, func: &'a Function, context: Option<Rc<Signature>>) -> Rc<Signature> {
        self.push_scope(ScopeKind::Function);
        let type_params = self.declare_type_params(&func.type_params);

        let mut params = Vec::with_capacity(func.params.len());
        let mut index = 0;
        let mut pushed_this = false;
        for param in &func.params {
            if let Pattern::Ident(name) = &param.pattern
                && name.text == "this"
            {
                if let Some(ty) = &param.ty {
                    let this_ty = self.resolve_type(ty);
                    self.this_types.push(this_ty);
                    pushed_this = true;
                }
                continue;
            }

            let contextual = context.as_ref().and_then(|sig| {
                if param.rest {
                    sig.params.get(index).filter(|p| p.rest).map(|p| p.ty.clone())
                } else {
                    sig.param_type(index)
                }
            });
            let mut ty = match (&param.ty, &param.default) {
                (Some(ty), _) => self.resolve_type(ty),
                (None, Some(default)) => self.check_expr(default, contextual.as_ref()).widen(),
                (None, None) => match contextual {
                    Some(ty) => ty,
                    None => {
                        self.report_implicit_any(param);
                        if param.rest { Type::array(Type::Any) } else { Type::Any }
                    }
                },
            };
            if let (Some(_), Some(default)) = (&param.ty, &param.default) {
                let default_ty = self.check_expr(default, Some(&ty));
                self.check_assignable_expr(default, &default_ty, &ty, default.pos);
            }

            let optional = param.optional || param.default.is_some();
            let inner_ty = if param.optional && self.options.strict && param.default.is_none() {
                Type::union([ty.clone(), Type::Undefined])
            } else {
                ty.clone()
            };
            for name in param.pattern.names() {
                let id = self.declare_value(&name.text, BindingKind::Param, Type::Any, name.pos);
                self.bindings[id].read = true;
            }
            self.bind_pattern(&param.pattern, &inner_ty);
            if param.rest && !matches!(ty, Type::Array(_) | Type::Tuple(_) | Type::Any) {
                ty = Type::array(Type::Any);
            }
            params.push(ParamType {
                name: param_name(param),
                ty,
                optional,
                rest: param.rest,
            });
            index += 1;
        }

        let declared = match &func.ret {
            Some(ret) => Some(self.resolve_type(ret)),
            None => None,
        };
        let contextual_ret = context.as_ref().map(|sig| sig.ret.clone());

        self.functions.push(FnContext {
            declared: declared.clone(),
            returns: Vec::new(),
            is_async: func.is_async,
            is_generator: func.is_generator,
        });

        let mut falls_through = true;
        match &func.body {
            FunctionBody::Block(body) => {
                self.hoist_vars(body);
                self.hoist(body);
                self.check_statements(body);
                falls_through = !body.last().is_some_and(terminates);
            }
            FunctionBody::Expr(expr) => {
                let expected = declared.clone().or_else(|| contextual_ret.filter(|t| !t.is_opaque() && *t != Type::Void));
                let expected = expected.map(|t| if func.is_async { self.awaited(&t) } else { t });
                let ty = self.check_expr(expr, expected.as_ref());
                let ty = if func.is_async { self.awaited(&ty) } else { ty };
                if let Some(declared) = &declared {
                    let declared = if func.is_async { self.awaited(declared) } else { declared.clone() };
                    self.check_assignable_expr(expr, &ty, &declared, expr.pos);
                }
                if let Some(context) = self.functions.last_mut() {
                    context.returns.push(ty);
                }
                falls_through = false;
            }
            FunctionBody::None => {}
        }

        let context_state = self.functions.pop();
        if pushed_this {
            self.this_types.pop();
        }
        self.pop_scope();

        let ret = match declared {
            Some(declared) => declared,
            None => {
                let returns = context_state.map(|c| c.returns).unwrap_or_default();
                if func.is_generator || matches!(func.body, FunctionBody::None) {
                    Type::Any
                } else {
                    let mut members: Vec<Type> = returns.into_iter().map(|t| t.widen()).collect();
                    if members.is_empty() {
                        members.push(Type::Void);
                    } else if falls_through && self.options.strict {
                        members.push(Type::Undefined);
                    }
                    let inferred = Type::union(members);
                    if func.is_async { self.promise_of(inferred) } else { inferred }
                }
            }
        };

        Rc::new(Signature {
            type_params,
            params,
            ret,
        })
    }

    fn report_implicit_any(&mut self, param: &'a Param) {
        if !self.options.no_implicit_any {
            return;
        }
        match &param.pattern {
            Pattern::Ident(name) if param.rest => {
                let message = format!("Rest parameter '{}' implicitly has an 'any[]' type.", name.text);
                self.error(name.pos, "TS7019", message);
            }
            Pattern::Ident(name) => {
                let message = format!("Parameter '{}' implicitly has an 'any' type.", name.text);
                self.error(name.pos, "TS7006", message);
            }
            pattern => {
                for name in pattern.names() {
                    let message = format!("Binding element '{}' implicitly has an 'any' type.", name.text);
                    self.error(name.pos, "TS7031", message);
                }
            }
        }
    }

    /// Check a class declaration or expression body.
    pub(super) fn check_class(&mut self, id: usize) {
        if self.classes[id].checked {
            return;
        }
        self.classes[id].checked = true;
        let class = self.classes[id].ast;

        if let Some(extends) = &class.extends {
            let base_ctor = self.check_expr(extends, None);
            let base = self.instance_type_of(&base_ctor);
            self.classes[id].base = Some(base);
            self.classes[id].base_ctor = Some(base_ctor);
            self.forget_class_expansions(id);
        }

        self.push_scope(ScopeKind::Block);
        let params = self.declare_type_params(&class.type_params);
        for ty in &class.implements {
            self.resolve_type(ty);
        }

        let instance = Type::Named(Rc::new(NamedType {
            name: self.classes[id].name.clone(),
            decl: DeclRef::Class(id),
            args: params.iter().map(|p| Type::Param(p.clone())).collect(),
        }));
        let statics = class_static_type(&self.classes[id].name, id);

        let assigned_in_ctor = constructor_assignments(class);

        for member in &class.members {
            match member {
                ClassMember::Property {
                    name,
                    ty,
                    init,
                    is_static,
                    optional,
                    definite,
                    ..
                } => {
                    let declared = ty.as_ref().map(|t| self.resolve_type(t));
                    self.this_types.push(if *is_static { statics.clone() } else { instance.clone() });
                    if let Some(init) = init {
                        let init_ty = self.check_expr(init, declared.as_ref());
                        match &declared {
                            Some(declared) => self.check_assignable_expr(init, &init_ty, declared, name.pos),
                            None => {
                                self.classes[id].prop_types.insert(name.text.clone(), init_ty.widen());
                            }
                        }
                    }
                    self.this_types.pop();

                    if self.options.strict
                        && !*is_static
                        && !*optional
                        && !*definite
                        && init.is_none()
                        && !class.is_abstract
                        && let Some(declared) = &declared
                        && !declared.has_undefined()
                        && !declared.is_opaque()
                        && !assigned_in_ctor.contains(&name.text.as_str())
                    {
                        let message = format!(
                            "Property '{}' has no initializer and is not definitely assigned in the constructor.",
                            name.text
                        );
                        self.error(name.pos, "TS2564", message);
                    }
                }
                ClassMember::Method {
                    name,
                    func,
                    is_static,
                    kind,
                    ..
                } => {
                    self.this_types.push(if *is_static { statics.clone() } else { instance.clone() });
                    let sig = self.check_function(func, None);
                    self.this_types.pop();
                    if func.ret.is_none() && !*is_static {
                        let ty = match kind {
                            MethodKind::Getter => sig.ret.clone(),
                            _ => Type::Fn(sig),
                        };
                        self.classes[id].method_returns.insert(name.text.clone(), ty);
                    }
                }
                ClassMember::Constructor(func) => {
                    self.this_types.push(instance.clone());
                    self.check_function(func, None);
                    self.this_types.pop();
                }
                ClassMember::StaticBlock(body) => {
                    self.this_types.push(statics.clone());
                    self.check_block(body);
                    self.this_types.pop();
                }
                ClassMember::Index => {}
            }
        }
        self.pop_scope();
        self.forget_class_expansions(id);
    }

    /// Drop cached shapes of class `id` once more of it is known.
    fn forget_class_expansions(&mut self, id: usize) {
        self.expansions
            .retain(|(decl, _), _| !matches!(decl, DeclRef::Class(c) | DeclRef::ClassStatic(c) if *c == id));
    }
}

/// `typeof C` for class `id`.
pub(super) fn class_static_type(name: &Rc<str>, id: usize) -> Type {
    Type::Named(Rc::new(NamedType {
        name: Rc::from(format!("typeof {name}").as_str()),
        decl: DeclRef::ClassStatic(id),
        args: Vec::new(),
    }))
}

pub(super) fn param_name(param: &Param) -> Rc<str> {
    match &param.pattern {
        Pattern::Ident(name) => Rc::from(name.text.as_str()),
        _ => Rc::from("__0"),
    }
}

/// Properties assigned as `this.x = ...` at the top level of the constructor.
fn constructor_assignments(class: &Class) -> Vec<&str> {
    let mut names = Vec::new();
    for member in &class.members {
        if let ClassMember::Constructor(func) = member {
            for param in &func.params {
                if param.property
                    && let Pattern::Ident(name) = &param.pattern
                {
                    names.push(name.text.as_str());
                }
            }
            if let FunctionBody::Block(body) = &func.body {
                for stmt in body {
                    if let StmtKind::Expr(Expr {
                        kind: ExprKind::Assign { target, .. },
                        ..
                    }) = &stmt.kind
                        && let ExprKind::Member { object, property, .. } = &target.kind
                        && matches!(object.kind, ExprKind::This)
                    {
                        names.push(property.text.as_str());
                    }
                }
            }
        }
    }
    names
}

/// Control never continues past `stmt`.
pub(super) fn terminates(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) | StmtKind::Throw(_) | StmtKind::Break | StmtKind::Continue => true,
        StmtKind::Block(body) => body.last().is_some_and(terminates),
        StmtKind::If {
            then,
            otherwise: Some(otherwise),
            ..
        } => terminates(then) && terminates(otherwise),
        _ => false,
    }
}
