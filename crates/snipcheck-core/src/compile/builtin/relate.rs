//! Type resolution, expansion of named types and assignability.

use std::rc::Rc;

use super::ast::*;
use super::checker::{Checker, ScopeId, ScopeKind, TypeDecl};
use super::lib;
use super::types::{DeclRef, NamedType, ParamType, Property, Shape, Signature, Type};

/// Nesting limit for expansion and relation checks.
const MAX_DEPTH: usize = 40;

/// Largest number of missing properties listed before "and N more".
const MISSING_LISTED: usize = 4;

impl<'a> Checker<'a> {
    // =========================================================================
    // Resolution of type syntax
    // =========================================================================

    pub(super) fn resolve_type(&mut self, ty: &TypeExpr) -> Type {
        match ty {
            TypeExpr::Named { name, args, pos } => self.resolve_named(name, args, *pos),
            TypeExpr::StrLit(s) => Type::str_lit(s),
            TypeExpr::NumLit(n) => n.parse::<f64>().map(Type::NumLit).unwrap_or(Type::Number),
            TypeExpr::BoolLit(b) => Type::BoolLit(*b),
            TypeExpr::Array(elem) => Type::array(self.resolve_type(elem)),
            TypeExpr::Tuple(elems) => Type::Tuple(elems.iter().map(|e| self.resolve_type(e)).collect()),
            TypeExpr::Union(members) => {
                let members: Vec<Type> = members.iter().map(|m| self.resolve_type(m)).collect();
                let union = Type::union(members.iter().cloned());
                if self.options.strict || members.iter().all(Type::is_nullish) {
                    union
                } else {
                    union.non_nullable()
                }
            }
            TypeExpr::Intersection(members) => {
                let members: Vec<Type> = members.iter().map(|m| self.resolve_type(m)).collect();
                self.intersect(members)
            }
            TypeExpr::Function {
                type_params,
                params,
                ret,
            } => {
                let sig = self.resolve_signature(type_params, params, Some(ret));
                Type::Fn(sig)
            }
            TypeExpr::Object(members) => self.resolve_object_type(members),
            TypeExpr::Typeof(path, pos) => self.resolve_typeof(path, *pos),
            TypeExpr::Keyof(inner) => {
                let inner = self.resolve_type(inner);
                match self.apparent_shape(&inner) {
                    Some(shape) if !shape.open && shape.string_index.is_none() && !matches!(inner, Type::Param(_)) => {
                        Type::union(shape.props.iter().map(|p| Type::StrLit(p.name.clone())))
                    }
                    _ => Type::Any,
                }
            }
            TypeExpr::Predicate => Type::Boolean,
            TypeExpr::Opaque => Type::Any,
        }
    }

    fn resolve_named(&mut self, name: &str, args: &[TypeExpr], pos: Pos) -> Type {
        match name {
            "any" => return Type::Any,
            "unknown" => return Type::Unknown,
            "never" => return Type::Never,
            "void" => return Type::Void,
            "undefined" => return Type::Undefined,
            "null" => return Type::Null,
            "number" => return Type::Number,
            "string" => return Type::String,
            "boolean" => return Type::Boolean,
            "bigint" => return Type::BigInt,
            "symbol" => return Type::Symbol,
            "object" => return Type::NonPrimitive,
            "this" => return self.this_types.last().cloned().unwrap_or(Type::Any),
            _ => {}
        }
        if name.contains('.') {
            return Type::Any;
        }

        let args: Vec<Type> = args.iter().map(|a| self.resolve_type(a)).collect();

        if let Some(decl) = self.lookup_type(name) {
            return match decl {
                TypeDecl::Interface(id) => {
                    if (name == "Array" || name == "ReadonlyArray") && args.len() == 1 {
                        return Type::array(args[0].clone());
                    }
                    let params = self.interfaces[id].params.len();
                    Type::Named(Rc::new(NamedType {
                        name: self.interfaces[id].name.clone(),
                        decl: DeclRef::Interface(id),
                        args: pad_args(args, params),
                    }))
                }
                TypeDecl::Class(id) => {
                    let params = self.classes[id].params.len();
                    Type::Named(Rc::new(NamedType {
                        name: self.classes[id].name.clone(),
                        decl: DeclRef::Class(id),
                        args: pad_args(args, params),
                    }))
                }
                TypeDecl::Alias { params, ty, scope } => self.resolve_alias(name, params, ty, scope, args),
                TypeDecl::Enum(e) => Type::Enum(e),
                TypeDecl::Param(p) => Type::Param(p),
                TypeDecl::Opaque => Type::Any,
            };
        }

        if let Some(ty) = self.resolve_utility(name, &args) {
            return ty;
        }

        if self.lookup_value(name).is_some() {
            let message =
                format!("'{name}' refers to a value, but is being used as a type here. Did you mean 'typeof {name}'?");
            self.error(pos, "TS2749", message);
        } else if let Some(level) = lib::missing_global(name, self.options.target) {
            let message = format!(
                "Cannot find name '{name}'. Do you need to change your target library? Try changing the 'lib' compiler option to '{level}' or later."
            );
            self.error(pos, "TS2583", message);
        } else {
            self.error(pos, "TS2304", format!("Cannot find name '{name}'."));
        }
        Type::Any
    }

    fn resolve_alias(
        &mut self,
        name: &str,
        params: &'a [String],
        body: &'a TypeExpr,
        scope: ScopeId,
        args: Vec<Type>,
    ) -> Type {
        let key = (scope, name.to_string());
        if self.resolving.contains(&key) || self.resolving.len() > MAX_DEPTH {
            return Type::Any;
        }
        self.resolving.push(key);
        let resolved = self.in_scope(scope, |c| {
            c.declare_type_params(params);
            c.resolve_type(body)
        });
        self.resolving.pop();

        if params.is_empty() {
            return resolved;
        }
        let args = pad_args(args, params.len());
        resolved.substitute(&|p: &str| params.iter().position(|q| q == p).map(|i| args[i].clone()))
    }

    /// Built-in utility types, when not shadowed by a declaration.
    fn resolve_utility(&mut self, name: &str, args: &[Type]) -> Option<Type> {
        let first = args.first().cloned().unwrap_or(Type::Any);
        let second = args.get(1).cloned().unwrap_or(Type::Any);
        let ty = match name {
            "Record" => {
                let mut shape = Shape::default();
                match &first {
                    key if key.members().iter().all(|k| matches!(k, Type::StrLit(_) | Type::NumLit(_))) => {
                        for key in key.members() {
                            let name: Rc<str> = match key {
                                Type::StrLit(s) => s,
                                other => Rc::from(other.to_string().as_str()),
                            };
                            shape.props.push(Property {
                                name,
                                ty: second.clone(),
                                optional: false,
                                readonly: false,
                            });
                        }
                    }
                    Type::Number => shape.number_index = Some(second.clone()),
                    _ => shape.string_index = Some(second.clone()),
                }
                shape.name = Some(Rc::from(format!("Record<{first}, {second}>").as_str()));
                Type::Object(Rc::new(shape))
            }
            "Partial" | "Required" | "Readonly" => {
                let Some(shape) = self.mappable_shape(&first) else {
                    return Some(Type::Any);
                };
                let mut shape = (*shape).clone();
                for prop in &mut shape.props {
                    match name {
                        "Partial" => prop.optional = true,
                        "Required" => prop.optional = false,
                        _ => prop.readonly = true,
                    }
                }
                shape.calls.clear();
                shape.constructs.clear();
                shape.name = Some(Rc::from(format!("{name}<{first}>").as_str()));
                Type::Object(Rc::new(shape))
            }
            "Pick" | "Omit" => {
                let Some(shape) = self.mappable_shape(&first) else {
                    return Some(Type::Any);
                };
                if second.is_opaque() {
                    return Some(Type::Any);
                }
                let keys: Vec<Rc<str>> = second
                    .members()
                    .into_iter()
                    .filter_map(|k| match k {
                        Type::StrLit(s) => Some(s),
                        _ => None,
                    })
                    .collect();
                let pick = name == "Pick";
                let mut shape = (*shape).clone();
                shape.props.retain(|p| keys.contains(&p.name) == pick);
                shape.calls.clear();
                shape.constructs.clear();
                shape.name = Some(Rc::from(format!("{name}<{first}, {second}>").as_str()));
                Type::Object(Rc::new(shape))
            }
            "NonNullable" => first.non_nullable(),
            "ReturnType" => match self.call_signatures(&first).first() {
                Some(sig) => sig.ret.clone(),
                None => Type::Any,
            },
            "Parameters" => match self.call_signatures(&first).first() {
                Some(sig) if sig.params.iter().all(|p| !p.rest && !p.optional) => {
                    Type::Tuple(sig.params.iter().map(|p| p.ty.clone()).collect())
                }
                _ => Type::Any,
            },
            "Awaited" => self.awaited(&first),
            "Exclude" | "Extract" => {
                if first.is_opaque() || second.is_opaque() {
                    return Some(Type::Any);
                }
                let keep = name == "Extract";
                let members = first.members();
                let mut kept = Vec::new();
                for member in members {
                    if self.is_assignable(&member, &second) == keep {
                        kept.push(member);
                    }
                }
                Type::union(kept)
            }
            _ => return None,
        };
        Some(ty)
    }

    /// Object shape a mapped utility can rewrite, `None` for generic input.
    fn mappable_shape(&mut self, ty: &Type) -> Option<Rc<Shape>> {
        if ty.is_opaque() {
            return None;
        }
        match ty {
            Type::Object(_) | Type::Named(_) => self.apparent_shape(ty),
            _ => None,
        }
    }

    fn resolve_typeof(&mut self, path: &[String], pos: Pos) -> Type {
        let Some((first, rest)) = path.split_first() else {
            return Type::Any;
        };
        let Some(id) = self.lookup_value(first) else {
            self.error(pos, "TS2304", format!("Cannot find name '{first}'."));
            return Type::Any;
        };
        self.bindings[id].read = true;
        let mut ty = self.binding_type(id);
        for segment in rest {
            ty = self.property_type(&ty, segment).unwrap_or(Type::Any);
        }
        ty
    }

    fn intersect(&mut self, members: Vec<Type>) -> Type {
        if members.iter().any(|m| m.is_opaque()) {
            return Type::Any;
        }
        let mut shape = Shape::default();
        for member in &members {
            if !matches!(member, Type::Object(_) | Type::Named(_)) {
                return Type::Any;
            }
            let Some(part) = self.apparent_shape(member) else {
                return Type::Any;
            };
            for prop in &part.props {
                if shape.prop(&prop.name).is_none() {
                    shape.props.push(prop.clone());
                }
            }
            shape.calls.extend(part.calls.iter().cloned());
            shape.open |= part.open;
            if part.string_index.is_some() {
                shape.string_index = part.string_index.clone();
            }
        }
        let name = members.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(" & ");
        shape.name = Some(Rc::from(name.as_str()));
        Type::Object(Rc::new(shape))
    }

    pub(super) fn resolve_object_type(&mut self, members: &[TypeMember]) -> Type {
        let mut shape = Shape::default();
        for member in members {
            match member {
                TypeMember::Property {
                    name,
                    ty,
                    optional,
                    readonly,
                } => {
                    let ty = match ty {
                        Some(ty) => self.resolve_type(ty),
                        None => Type::Any,
                    };
                    shape.props.push(Property {
                        name: Rc::from(name.as_str()),
                        ty,
                        optional: *optional,
                        readonly: *readonly,
                    });
                }
                TypeMember::Method {
                    name,
                    optional,
                    type_params,
                    params,
                    ret,
                } => {
                    let sig = self.resolve_signature(type_params, params, ret.as_ref());
                    add_method(&mut shape, name, sig, *optional);
                }
                TypeMember::Call {
                    type_params,
                    params,
                    ret,
                } => {
                    let sig = self.resolve_signature(type_params, params, ret.as_ref());
                    shape.calls.push(sig);
                }
                TypeMember::Construct {
                    type_params,
                    params,
                    ret,
                } => {
                    let sig = self.resolve_signature(type_params, params, ret.as_ref());
                    shape.constructs.push(sig);
                }
                TypeMember::Index { key, ty } => {
                    let key = self.resolve_type(key);
                    let ty = self.resolve_type(ty);
                    if key == Type::Number {
                        shape.number_index = Some(ty);
                    } else {
                        shape.string_index = Some(ty);
                    }
                }
            }
        }
        Type::Object(Rc::new(shape))
    }

    pub(super) fn resolve_signature(
        &mut self,
        type_params: &[String],
        params: &[ParamSig],
        ret: Option<&TypeExpr>,
    ) -> Rc<Signature> {
        let scope = self.current;
        self.in_scope(scope, |c| {
            let type_params = c.declare_type_params(type_params);
            let params = params
                .iter()
                .map(|p| {
                    let mut ty = match &p.ty {
                        Some(ty) => c.resolve_type(ty),
                        None => Type::Any,
                    };
                    if p.rest && !matches!(ty, Type::Array(_) | Type::Tuple(_) | Type::Any) {
                        ty = Type::array(Type::Any);
                    }
                    ParamType {
                        name: Rc::from(p.name.as_str()),
                        ty,
                        optional: p.optional,
                        rest: p.rest,
                    }
                })
                .collect();
            let ret = match ret {
                Some(ret) => c.resolve_type(ret),
                None => Type::Any,
            };
            Rc::new(Signature {
                type_params,
                params,
                ret,
            })
        })
    }

    /// Run `f` in a fresh block scope nested in `scope`.
    pub(super) fn in_scope<R>(&mut self, scope: ScopeId, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.current;
        self.current = scope;
        self.push_scope(ScopeKind::Block);
        let result = f(self);
        self.pop_scope();
        self.current = saved;
        result
    }

    // =========================================================================
    // Expansion
    // =========================================================================

    /// Structural shape of an interface or class type.
    pub(super) fn expand(&mut self, named: &NamedType) -> Rc<Shape> {
        let key = (
            named.decl,
            named.args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(","),
        );
        if let Some(shape) = self.expansions.get(&key) {
            return shape.clone();
        }
        if self.depth > MAX_DEPTH {
            return Rc::new(Shape {
                open: true,
                ..Shape::default()
            });
        }

        // Placeholder for recursive references while expanding.
        self.expansions.insert(
            key.clone(),
            Rc::new(Shape {
                open: true,
                ..Shape::default()
            }),
        );
        self.depth += 1;
        self.quiet += 1;
        let shape = match named.decl {
            DeclRef::Interface(id) => self.expand_interface(id, &named.args),
            DeclRef::Class(id) => self.expand_class(id, &named.args),
            DeclRef::ClassStatic(id) => self.expand_class_statics(id),
        };
        self.quiet -= 1;
        self.depth -= 1;

        let shape = Rc::new(shape);
        self.expansions.insert(key, shape.clone());
        shape
    }

    fn expand_interface(&mut self, id: usize, args: &[Type]) -> Shape {
        let params = self.interfaces[id].params;
        let parts: Vec<(&'a [TypeExpr], &'a [TypeMember], ScopeId)> = self.interfaces[id]
            .parts
            .iter()
            .map(|p| (p.extends, p.members, p.scope))
            .collect();

        let mut shape = Shape::default();
        let mut bases = Vec::new();
        for (extends, members, scope) in parts {
            let (own, heritage) = self.in_scope(scope, |c| {
                c.declare_type_params(params);
                let own = c.resolve_object_type(members);
                let heritage: Vec<Type> = extends.iter().map(|e| c.resolve_type(e)).collect();
                (own, heritage)
            });
            if let Type::Object(own) = own {
                merge_shape(&mut shape, &own, true);
            }
            bases.extend(heritage);
        }
        for base in bases {
            if base.is_opaque() {
                shape.open = true;
                continue;
            }
            if let Some(base) = self.apparent_shape(&base) {
                merge_shape(&mut shape, &base, false);
            }
        }

        if !params.is_empty() {
            let args = pad_args(args.to_vec(), params.len());
            let lookup = |p: &str| params.iter().position(|q| q == p).map(|i| args[i].clone());
            if let Type::Object(substituted) = Type::Object(Rc::new(shape)).substitute(&lookup) {
                return (*substituted).clone();
            }
            return Shape::default();
        }
        shape
    }

    fn expand_class(&mut self, id: usize, args: &[Type]) -> Shape {
        let class = self.classes[id].ast;
        let scope = self.classes[id].scope;
        let base = self.classes[id].base.clone();
        let method_returns = self.classes[id].method_returns.clone();
        let prop_types = self.classes[id].prop_types.clone();

        let mut own = Shape::default();
        self.in_scope(scope, |c| {
            c.declare_type_params(&class.type_params);
            for member in &class.members {
                match member {
                    ClassMember::Property {
                        name,
                        ty,
                        is_static: false,
                        optional,
                        readonly,
                        ..
                    } => {
                        let ty = match ty {
                            Some(ty) => c.resolve_type(ty),
                            None => prop_types.get(&name.text).cloned().unwrap_or(Type::Any),
                        };
                        own.props.push(Property {
                            name: Rc::from(name.text.as_str()),
                            ty,
                            optional: *optional,
                            readonly: *readonly,
                        });
                    }
                    ClassMember::Method {
                        name,
                        func,
                        is_static: false,
                        kind,
                        optional,
                    } => {
                        let mut sig = (*c.signature_from_annotations(func)).clone();
                        if func.ret.is_none() {
                            sig.ret = match method_returns.get(&name.text) {
                                Some(Type::Fn(inferred)) => inferred.ret.clone(),
                                Some(other) if *kind == MethodKind::Getter => other.clone(),
                                _ => Type::Any,
                            };
                        }
                        match kind {
                            MethodKind::Method => add_method(&mut own, &name.text, Rc::new(sig), *optional),
                            MethodKind::Getter => {
                                if let Some(prop) = own.props.iter_mut().find(|p| *p.name == *name.text) {
                                    prop.ty = sig.ret;
                                } else {
                                    let has_setter = class.members.iter().any(|m| {
                                        matches!(m, ClassMember::Method { name: n, kind: MethodKind::Setter, is_static: false, .. } if n.text == name.text)
                                    });
                                    own.props.push(Property {
                                        name: Rc::from(name.text.as_str()),
                                        ty: sig.ret,
                                        optional: false,
                                        readonly: !has_setter,
                                    });
                                }
                            }
                            MethodKind::Setter => {
                                if own.prop(&name.text).is_none() {
                                    let ty = sig.params.first().map(|p| p.ty.clone()).unwrap_or(Type::Any);
                                    own.props.push(Property {
                                        name: Rc::from(name.text.as_str()),
                                        ty,
                                        optional: false,
                                        readonly: false,
                                    });
                                }
                            }
                        }
                    }
                    ClassMember::Constructor(func) => {
                        for param in func.params.iter().filter(|p| p.property) {
                            if let Pattern::Ident(name) = &param.pattern {
                                let ty = match &param.ty {
                                    Some(ty) => c.resolve_type(ty),
                                    None => Type::Any,
                                };
                                own.props.push(Property {
                                    name: Rc::from(name.text.as_str()),
                                    ty,
                                    optional: param.optional,
                                    readonly: param.readonly,
                                });
                            }
                        }
                    }
                    ClassMember::Index => own.open = true,
                    _ => {}
                }
            }
        });

        match (&class.extends, base) {
            (Some(_), None) => own.open = true,
            (_, Some(base)) => {
                if base.is_opaque() {
                    own.open = true;
                } else if let Some(base) = self.apparent_shape(&base) {
                    merge_shape(&mut own, &base, false);
                }
            }
            (None, None) => {}
        }

        let params = self.classes[id].params.clone();
        if !params.is_empty() && !args.is_empty() {
            let args = pad_args(args.to_vec(), params.len());
            let lookup = |p: &str| params.iter().position(|q| &**q == p).map(|i| args[i].clone());
            if let Type::Object(substituted) = Type::Object(Rc::new(own.clone())).substitute(&lookup) {
                return (*substituted).clone();
            }
        }
        own
    }

    fn expand_class_statics(&mut self, id: usize) -> Shape {
        let class = self.classes[id].ast;
        let scope = self.classes[id].scope;
        let name = self.classes[id].name.clone();
        let params = self.classes[id].params.clone();
        let base_ctor = self.classes[id].base_ctor.clone();

        let instance = Type::Named(Rc::new(NamedType {
            name: name.clone(),
            decl: DeclRef::Class(id),
            args: params.iter().map(|p| Type::Param(p.clone())).collect(),
        }));

        let mut shape = Shape {
            name: Some(Rc::from(format!("typeof {name}").as_str())),
            ..Shape::default()
        };
        self.in_scope(scope, |c| {
            c.declare_type_params(&class.type_params);
            for member in &class.members {
                match member {
                    ClassMember::Property {
                        name,
                        ty,
                        is_static: true,
                        optional,
                        readonly,
                        ..
                    } => {
                        let ty = match ty {
                            Some(ty) => c.resolve_type(ty),
                            None => Type::Any,
                        };
                        shape.props.push(Property {
                            name: Rc::from(name.text.as_str()),
                            ty,
                            optional: *optional,
                            readonly: *readonly,
                        });
                    }
                    ClassMember::Method {
                        name,
                        func,
                        is_static: true,
                        optional,
                        ..
                    } => {
                        let mut sig = (*c.signature_from_annotations(func)).clone();
                        if func.ret.is_none() {
                            sig.ret = Type::Any;
                        }
                        add_method(&mut shape, &name.text, Rc::new(sig), *optional);
                    }
                    ClassMember::Constructor(func) if !matches!(func.body, FunctionBody::None) || shape.constructs.is_empty() => {
                        let sig = c.signature_from_annotations(func);
                        let ctor = Signature {
                            type_params: params.clone(),
                            params: sig.params.clone(),
                            ret: instance.clone(),
                        };
                        shape.constructs.push(Rc::new(ctor));
                    }
                    _ => {}
                }
            }
        });

        if shape.constructs.len() > 1 {
            // Overload signatures precede the implementation, which is not callable.
            shape.constructs.pop();
        }

        let base_statics = match &base_ctor {
            Some(base) if base.is_opaque() => {
                shape.open = true;
                None
            }
            Some(base) => self.apparent_shape(base),
            None if class.extends.is_some() => {
                shape.open = true;
                None
            }
            None => None,
        };

        if shape.constructs.is_empty() {
            let inherited: Vec<Rc<Signature>> = base_statics
                .as_ref()
                .map(|b| b.constructs.clone())
                .unwrap_or_default();
            if inherited.is_empty() {
                shape.constructs.push(Rc::new(Signature {
                    type_params: params.clone(),
                    params: Vec::new(),
                    ret: instance.clone(),
                }));
            } else {
                for sig in inherited {
                    shape.constructs.push(Rc::new(Signature {
                        type_params: params.clone(),
                        params: sig.params.clone(),
                        ret: instance.clone(),
                    }));
                }
            }
        }
        if let Some(base) = base_statics {
            let constructs = std::mem::take(&mut shape.constructs);
            merge_shape(&mut shape, &base, false);
            shape.constructs = constructs;
        }
        shape.props.push(Property {
            name: Rc::from("prototype"),
            ty: instance,
            optional: false,
            readonly: true,
        });
        shape
    }

    /// Interface declared in the standard library scope.
    pub(super) fn lib_type(&mut self, name: &str, args: Vec<Type>) -> Option<Type> {
        match self.scopes[0].types.get(name) {
            Some(TypeDecl::Interface(id)) => {
                let id = *id;
                let params = self.interfaces[id].params.len();
                Some(Type::Named(Rc::new(NamedType {
                    name: self.interfaces[id].name.clone(),
                    decl: DeclRef::Interface(id),
                    args: pad_args(args, params),
                })))
            }
            _ => None,
        }
    }

    /// Shape used for member access on `ty`. `None` for types without
    /// a structural model (`any`, unions, type parameters).
    pub(super) fn apparent_shape(&mut self, ty: &Type) -> Option<Rc<Shape>> {
        match ty {
            Type::Object(shape) => Some(shape.clone()),
            Type::Named(named) => Some(self.expand(named)),
            Type::Array(elem) => self.lib_shape("Array", vec![(**elem).clone()]),
            Type::Tuple(elems) => {
                let elem = Type::union(elems.iter().cloned());
                let base = self.lib_shape("Array", vec![elem])?;
                let mut shape = (*base).clone();
                for (i, elem) in elems.iter().enumerate() {
                    shape.props.push(Property {
                        name: Rc::from(i.to_string().as_str()),
                        ty: elem.clone(),
                        optional: false,
                        readonly: false,
                    });
                }
                if let Some(length) = shape.props.iter_mut().find(|p| &*p.name == "length") {
                    length.ty = Type::NumLit(elems.len() as f64);
                }
                Some(Rc::new(shape))
            }
            Type::Fn(sig) => {
                let mut shape = self
                    .lib_shape("Function", Vec::new())
                    .map(|s| (*s).clone())
                    .unwrap_or_default();
                shape.calls = vec![sig.clone()];
                shape.name = None;
                Some(Rc::new(shape))
            }
            Type::NonPrimitive => self.lib_shape("Object", Vec::new()),
            other => {
                let name = other.apparent_name()?;
                self.lib_shape(name, Vec::new())
            }
        }
    }

    fn lib_shape(&mut self, name: &str, args: Vec<Type>) -> Option<Rc<Shape>> {
        match self.lib_type(name, args)? {
            Type::Named(named) => Some(self.expand(&named)),
            _ => None,
        }
    }

    /// Whether a missing property on `ty` is an error rather than unknown.
    pub(super) fn is_closed_object(&mut self, ty: &Type) -> bool {
        if ty.is_opaque() {
            return false;
        }
        ty.members().iter().all(|m| match self.apparent_shape(m) {
            Some(shape) => !shape.open && shape.string_index.is_none(),
            None => false,
        })
    }

    // =========================================================================
    // Members
    // =========================================================================

    /// Type of property `name` on `ty`, `None` when it does not exist.
    ///
    /// On a union the property must be missing from every member to be
    /// reported; a partial miss reads as `any`.
    pub(super) fn property_type(&mut self, ty: &Type, name: &str) -> Option<Type> {
        match ty {
            Type::Any | Type::Param(_) | Type::Never => Some(Type::Any),
            Type::Union(members) => {
                let mut found = Vec::new();
                let mut missing = false;
                for member in members.iter() {
                    match self.property_type(member, name) {
                        Some(t) => found.push(t),
                        None => missing = true,
                    }
                }
                match (found.is_empty(), missing) {
                    (true, _) => None,
                    (false, false) => Some(Type::union(found)),
                    (false, true) => Some(Type::Any),
                }
            }
            _ => {
                let shape = self.apparent_shape(ty)?;
                if let Some(prop) = shape.prop(name) {
                    let ty = if prop.optional && self.options.strict {
                        Type::union([prop.ty.clone(), Type::Undefined])
                    } else {
                        prop.ty.clone()
                    };
                    return Some(ty);
                }
                if let Some(index) = &shape.number_index
                    && name.parse::<f64>().is_ok()
                {
                    return Some(index.clone());
                }
                if let Some(index) = &shape.string_index {
                    return Some(index.clone());
                }
                if shape.open {
                    return Some(Type::Any);
                }
                // Object members are available on every non-primitive.
                if !ty.is_primitive()
                    && !matches!(ty, Type::Named(n) if &*n.name == "Object")
                    && let Some(object) = self.lib_shape("Object", Vec::new())
                    && let Some(prop) = object.prop(name)
                {
                    return Some(prop.ty.clone());
                }
                None
            }
        }
    }

    /// Property declaration of `name` on a non-union type.
    pub(super) fn property_decl(&mut self, ty: &Type, name: &str) -> Option<Property> {
        let shape = self.apparent_shape(ty)?;
        shape.prop(name).cloned()
    }

    /// Interface name used for target-library member diagnostics.
    pub(super) fn lib_interface_name(&self, ty: &Type) -> Option<String> {
        match ty {
            Type::Array(_) | Type::Tuple(_) => Some("Array".into()),
            Type::Named(named) if matches!(named.decl, DeclRef::Interface(_)) => Some(named.name.to_string()),
            other => other.apparent_name().map(str::to_string),
        }
    }

    pub(super) fn call_signatures(&mut self, ty: &Type) -> Vec<Rc<Signature>> {
        match ty {
            Type::Fn(sig) => vec![sig.clone()],
            Type::Object(_) | Type::Named(_) => self.apparent_shape(ty).map(|s| s.calls.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub(super) fn construct_signatures(&mut self, ty: &Type) -> Vec<Rc<Signature>> {
        match ty {
            Type::Object(_) | Type::Named(_) => self
                .apparent_shape(ty)
                .map(|s| s.constructs.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Instance type produced by `new` on a constructor type.
    pub(super) fn instance_type_of(&mut self, ctor: &Type) -> Type {
        if let Type::Named(named) = ctor
            && let DeclRef::ClassStatic(id) = named.decl
        {
            let params = self.classes[id].params.len();
            return Type::Named(Rc::new(NamedType {
                name: self.classes[id].name.clone(),
                decl: DeclRef::Class(id),
                args: vec![Type::Any; params],
            }));
        }
        match self.construct_signatures(ctor).first() {
            Some(sig) => sig
                .ret
                .substitute(&|p: &str| sig.type_params.iter().any(|q| &**q == p).then_some(Type::Any)),
            None => Type::Any,
        }
    }

    /// Element type produced by iterating `ty`.
    pub(super) fn iterated_type(&mut self, ty: &Type) -> Type {
        match ty {
            Type::Array(elem) => (**elem).clone(),
            Type::Tuple(elems) => Type::union(elems.iter().cloned()),
            Type::String | Type::StrLit(_) => Type::String,
            Type::Union(members) => {
                let members = members.to_vec();
                Type::union(members.iter().map(|m| self.iterated_type(m)))
            }
            Type::Named(named) => match (&*named.name, named.args.as_slice()) {
                ("Map", [k, v]) => Type::Tuple(Rc::from(vec![k.clone(), v.clone()])),
                ("Set" | "Iterable" | "IterableIterator", [t]) => t.clone(),
                _ => Type::Any,
            },
            _ => Type::Any,
        }
    }

    /// Type after `await`.
    pub(super) fn awaited(&mut self, ty: &Type) -> Type {
        match ty {
            Type::Named(named) if matches!(&*named.name, "Promise" | "PromiseLike") && named.args.len() == 1 => {
                self.awaited(&named.args[0])
            }
            Type::Union(members) => {
                let members = members.to_vec();
                Type::union(members.iter().map(|m| self.awaited(m)))
            }
            other => other.clone(),
        }
    }

    pub(super) fn promise_of(&mut self, ty: Type) -> Type {
        self.lib_type("Promise", vec![ty]).unwrap_or(Type::Any)
    }

    // =========================================================================
    // Assignability
    // =========================================================================

    pub(super) fn is_assignable(&mut self, source: &Type, target: &Type) -> bool {
        if source == target {
            return true;
        }
        match (source, target) {
            (_, Type::Any | Type::Unknown) | (Type::Any | Type::Never, _) => return true,
            (Type::Param(_), _) | (_, Type::Param(_)) => return true,
            (Type::Union(members), _) => {
                let members = members.to_vec();
                return members.iter().all(|m| self.is_assignable(m, target));
            }
            (_, Type::Union(members)) => {
                let members = members.to_vec();
                return members.iter().any(|m| self.is_assignable(source, m));
            }
            (Type::Undefined, Type::Void) => return true,
            (Type::Undefined | Type::Null, _) if !self.options.strict => return true,
            _ => {}
        }

        if self.relating.len() > MAX_DEPTH
            || self
                .relating
                .iter()
                .any(|(s, t)| s == source && t == target)
        {
            return true;
        }
        self.relating.push((source.clone(), target.clone()));
        let result = self.is_assignable_inner(source, target);
        self.relating.pop();
        result
    }

    fn is_assignable_inner(&mut self, source: &Type, target: &Type) -> bool {
        match (source, target) {
            (Type::StrLit(_), Type::String)
            | (Type::NumLit(_), Type::Number)
            | (Type::BoolLit(_), Type::Boolean) => true,
            (Type::Enum(a), Type::Enum(b)) => a.name == b.name,
            (Type::Enum(e), Type::Number) | (Type::Number | Type::NumLit(_), Type::Enum(e)) => e.numeric,
            (Type::Enum(e), Type::String) => !e.numeric,
            (Type::Array(a), Type::Array(b)) => self.is_assignable(a, b),
            (Type::Tuple(items), Type::Array(b)) => {
                let items = items.to_vec();
                items.iter().all(|i| self.is_assignable(i, b))
            }
            (Type::Tuple(a), Type::Tuple(b)) => {
                let (a, b) = (a.to_vec(), b.to_vec());
                a.len() == b.len() && a.iter().zip(&b).all(|(s, t)| self.is_assignable(s, t))
            }
            (Type::Array(_), Type::Tuple(_)) => false,
            (_, Type::NonPrimitive) => matches!(
                source,
                Type::Object(_) | Type::Named(_) | Type::Array(_) | Type::Tuple(_) | Type::Fn(_) | Type::NonPrimitive
            ),
            (Type::Named(a), Type::Named(b)) if a.decl == b.decl => {
                let pairs: Vec<(Type, Type)> = a.args.iter().cloned().zip(b.args.iter().cloned()).collect();
                pairs.iter().all(|(s, t)| self.is_assignable(s, t))
            }
            (_, Type::Fn(target_sig)) => {
                let sigs = self.call_signatures(source);
                sigs.iter().any(|s| self.is_signature_assignable(s, target_sig))
            }
            (_, Type::Object(_) | Type::Named(_)) => {
                if source.is_nullish()
                    || matches!(source, Type::Unknown | Type::Void | Type::Null | Type::Undefined)
                {
                    return false;
                }
                if matches!(target, Type::Named(n) if &*n.name == "Object") {
                    return true;
                }
                self.is_structurally_assignable(source, target)
            }
            _ => false,
        }
    }

    fn is_structurally_assignable(&mut self, source: &Type, target: &Type) -> bool {
        let (Some(src), Some(tgt)) = (self.apparent_shape(source), self.apparent_shape(target)) else {
            return true;
        };
        if src.open || tgt.open {
            return true;
        }

        for prop in &tgt.props {
            match src.prop(&prop.name) {
                Some(src_prop) => {
                    if src_prop.optional && !prop.optional && self.options.strict {
                        return false;
                    }
                    let target_ty = if prop.optional && self.options.strict {
                        Type::union([prop.ty.clone(), Type::Undefined])
                    } else {
                        prop.ty.clone()
                    };
                    if !self.is_assignable(&src_prop.ty, &target_ty) {
                        return false;
                    }
                }
                None if prop.optional => {}
                None => {
                    if src.string_index.is_some() {
                        continue;
                    }
                    return false;
                }
            }
        }

        if let Some(index) = &tgt.string_index {
            for prop in &src.props {
                if !self.is_assignable(&prop.ty, index) {
                    return false;
                }
            }
            if let Some(src_index) = &src.string_index
                && !self.is_assignable(src_index, index)
            {
                return false;
            }
        }

        if !tgt.calls.is_empty() {
            let target_sig = tgt.calls[0].clone();
            if !src.calls.iter().any(|s| self.is_signature_assignable(s, &target_sig)) {
                return false;
            }
        }
        true
    }

    fn is_signature_assignable(&mut self, source: &Signature, target: &Signature) -> bool {
        if !source.type_params.is_empty() || !target.type_params.is_empty() {
            return true;
        }
        let target_has_rest = target.params.iter().any(|p| p.rest);
        if source.min_args() > target.params.len() && !target_has_rest {
            return false;
        }
        let count = source.params.len().min(target.params.len());
        for i in 0..count {
            let (Some(s), Some(t)) = (source.param_type(i), target.param_type(i)) else {
                continue;
            };
            if !self.is_assignable(&t, &s) && !self.is_assignable(&s, &t) {
                return false;
            }
        }
        matches!(target.ret, Type::Void) || self.is_assignable(&source.ret, &target.ret)
    }

    // =========================================================================
    // Assignment diagnostics
    // =========================================================================

    /// Report `source` (the type of `expr`) not being assignable to `target`.
    pub(super) fn check_assignable_expr(&mut self, expr: &'a Expr, source: &Type, target: &Type, pos: Pos) {
        if self.report_excess_properties(expr, target) {
            return;
        }
        if self.is_assignable(source, target) {
            return;
        }
        if self.elaborate(expr, target) {
            return;
        }
        self.report_not_assignable(pos, source, target);
    }

    pub(super) fn report_not_assignable(&mut self, pos: Pos, source: &Type, target: &Type) {
        let shown = source.for_message(target);
        let missing = self.missing_properties(source, target);
        match missing.len() {
            0 => {
                let message = format!("Type '{shown}' is not assignable to type '{target}'.");
                self.error(pos, "TS2322", message);
            }
            1 => {
                let message = format!(
                    "Property '{}' is missing in type '{shown}' but required in type '{target}'.",
                    missing[0]
                );
                self.error(pos, "TS2741", message);
            }
            n if n <= MISSING_LISTED => {
                let message = format!(
                    "Type '{shown}' is missing the following properties from type '{target}': {}",
                    missing.join(", ")
                );
                self.error(pos, "TS2739", message);
            }
            n => {
                let message = format!(
                    "Type '{shown}' is missing the following properties from type '{target}': {}, and {} more.",
                    missing[..MISSING_LISTED].join(", "),
                    n - MISSING_LISTED
                );
                self.error(pos, "TS2740", message);
            }
        }
    }

    /// Required properties of `target` absent from `source`.
    fn missing_properties(&mut self, source: &Type, target: &Type) -> Vec<String> {
        let object_like = |t: &Type| matches!(t, Type::Object(_) | Type::Named(_));
        if !object_like(source) || !object_like(target) {
            return Vec::new();
        }
        let (Some(src), Some(tgt)) = (self.apparent_shape(source), self.apparent_shape(target)) else {
            return Vec::new();
        };
        if src.open || src.string_index.is_some() {
            return Vec::new();
        }
        tgt.props
            .iter()
            .filter(|p| !p.optional && src.prop(&p.name).is_none())
            .map(|p| p.name.to_string())
            .collect()
    }

    /// Excess property check for fresh object literals. Returns whether an
    /// error was reported.
    fn report_excess_properties(&mut self, expr: &'a Expr, target: &Type) -> bool {
        let ExprKind::Object(props) = &unparen(expr).kind else {
            return false;
        };
        if !matches!(target, Type::Object(_) | Type::Named(_)) || target.is_opaque() {
            return false;
        }
        let Some(shape) = self.apparent_shape(target) else {
            return false;
        };
        // `{}` accepts any object literal.
        if shape.open || shape.string_index.is_some() || shape.props.is_empty() {
            return false;
        }

        let mut reported = false;
        for prop in props {
            let (key, pos, value) = match prop {
                Prop::KeyValue {
                    key: PropKey::Name(key),
                    pos,
                    value,
                } => (key.as_str(), *pos, Some(value)),
                Prop::Shorthand(name) => (name.text.as_str(), name.pos, None),
                Prop::Method {
                    key: PropKey::Name(key),
                    pos,
                    ..
                } => (key.as_str(), *pos, None),
                _ => continue,
            };
            match shape.prop(key) {
                None => {
                    let message = format!(
                        "Object literal may only specify known properties, and '{key}' does not exist in type '{target}'."
                    );
                    self.error(pos, "TS2353", message);
                    reported = true;
                }
                Some(declared) => {
                    if let Some(value) = value {
                        let declared = declared.ty.clone();
                        reported |= self.report_excess_properties(value, &declared);
                    }
                }
            }
        }
        reported
    }

    /// Report mismatches inside array and object literals at the element
    /// that causes them. Returns whether anything was reported.
    fn elaborate(&mut self, expr: &'a Expr, target: &Type) -> bool {
        match &unparen(expr).kind {
            ExprKind::Array(elems) => {
                let Type::Array(elem_target) = target else {
                    return false;
                };
                let elem_target = (**elem_target).clone();
                let mut reported = false;
                for elem in elems.iter().flatten() {
                    if matches!(elem.kind, ExprKind::Spread(_)) {
                        continue;
                    }
                    self.quiet += 1;
                    let ty = self.check_expr(elem, Some(&elem_target));
                    self.quiet -= 1;
                    if !self.is_assignable(&ty, &elem_target) {
                        if !self.elaborate(elem, &elem_target) {
                            self.report_not_assignable(elem.pos, &ty, &elem_target);
                        }
                        reported = true;
                    }
                }
                reported
            }
            ExprKind::Object(props) => {
                if !matches!(target, Type::Object(_) | Type::Named(_)) {
                    return false;
                }
                let source_shape_missing = {
                    self.quiet += 1;
                    let source = self.check_expr(expr, Some(target));
                    self.quiet -= 1;
                    !self.missing_properties(&source, target).is_empty()
                };
                if source_shape_missing {
                    return false;
                }
                let mut reported = false;
                for prop in props {
                    let Prop::KeyValue {
                        key: PropKey::Name(key),
                        value,
                        pos,
                    } = prop
                    else {
                        continue;
                    };
                    let Some(declared) = self.property_decl(target, key) else {
                        continue;
                    };
                    let declared_ty = if declared.optional && self.options.strict {
                        Type::union([declared.ty.clone(), Type::Undefined])
                    } else {
                        declared.ty.clone()
                    };
                    self.quiet += 1;
                    let ty = self.check_expr(value, Some(&declared_ty));
                    self.quiet -= 1;
                    if !self.is_assignable(&ty, &declared_ty) {
                        if !self.elaborate(value, &declared_ty) {
                            self.report_not_assignable(*pos, &ty, &declared_ty);
                        }
                        reported = true;
                    }
                }
                reported
            }
            _ => false,
        }
    }
}

/// Pad or truncate type arguments to `count`, defaulting to `any`.
pub(super) fn pad_args(mut args: Vec<Type>, count: usize) -> Vec<Type> {
    args.resize(count, Type::Any);
    args
}

pub(super) fn unparen(expr: &Expr) -> &Expr {
    match &expr.kind {
        ExprKind::Paren(inner) => unparen(inner),
        _ => expr,
    }
}

/// Add a method, turning repeated declarations into an overload set.
fn add_method(shape: &mut Shape, name: &str, sig: Rc<Signature>, optional: bool) {
    if let Some(existing) = shape.props.iter_mut().find(|p| &*p.name == name) {
        let mut calls = match &existing.ty {
            Type::Fn(first) => vec![first.clone()],
            Type::Object(overloads) if overloads.props.is_empty() => overloads.calls.clone(),
            _ => return,
        };
        calls.push(sig);
        existing.ty = Type::Object(Rc::new(Shape {
            calls,
            ..Shape::default()
        }));
        return;
    }
    shape.props.push(Property {
        name: Rc::from(name),
        ty: Type::Fn(sig),
        optional,
        readonly: false,
    });
}

/// Add members of `from` that `into` does not declare yet. With `overload`,
/// a method declared on both sides becomes an overload set.
fn merge_shape(into: &mut Shape, from: &Shape, overload: bool) {
    for prop in &from.props {
        match into.props.iter_mut().find(|p| p.name == prop.name) {
            Some(existing) => {
                if overload
                    && let (Type::Fn(a), Type::Fn(b)) = (&existing.ty, &prop.ty)
                    && a != b
                    && !existing.optional
                {
                    existing.ty = Type::Object(Rc::new(Shape {
                        calls: vec![a.clone(), b.clone()],
                        ..Shape::default()
                    }));
                }
            }
            None => into.props.push(prop.clone()),
        }
    }
    into.calls.extend(from.calls.iter().cloned());
    into.constructs.extend(from.constructs.iter().cloned());
    if into.string_index.is_none() {
        into.string_index = from.string_index.clone();
    }
    if into.number_index.is_none() {
        into.number_index = from.number_index.clone();
    }
    into.open |= from.open;
}
