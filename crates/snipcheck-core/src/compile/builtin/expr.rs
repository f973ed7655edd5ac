//! Expression checking: operators, member access, calls and literals.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::ast::*;
use super::checker::{BindingKind, Checker, ScopeKind, TypeDecl, class_static_type};
use super::lib;
use super::relate::unparen;
use super::types::{DeclRef, Property, Shape, Signature, Type};
use crate::profile::Target;

/// Where a possibly-nullish value was used.
#[derive(Clone, Copy, PartialEq, Eq)]
enum NullUse {
    Access,
    Call,
}

impl<'a> Checker<'a> {
    pub(super) fn check_expr(&mut self, expr: &'a Expr, expected: Option<&Type>) -> Type {
        match &expr.kind {
            ExprKind::Number(text) => parse_number(text).map(Type::NumLit).unwrap_or(Type::Number),
            ExprKind::BigInt => {
                if self.options.target < Target::Es2020 {
                    self.error(
                        expr.pos,
                        "TS2737",
                        "BigInt literals are not available when targeting lower than ES2020.",
                    );
                }
                Type::BigInt
            }
            ExprKind::Str(s) => Type::str_lit(s),
            ExprKind::Template(parts) => {
                for part in parts {
                    self.check_expr(part, None);
                }
                Type::String
            }
            ExprKind::TaggedTemplate { tag, exprs } => {
                let tag_ty = self.check_expr(tag, None);
                for part in exprs {
                    self.check_expr(part, None);
                }
                match self.call_signatures(&tag_ty).first() {
                    Some(sig) if sig.type_params.is_empty() => sig.ret.clone(),
                    _ => Type::Any,
                }
            }
            ExprKind::Regex => self.lib_type("RegExp", Vec::new()).unwrap_or(Type::Any),
            ExprKind::Bool(b) => Type::BoolLit(*b),
            ExprKind::Null => Type::Null,
            ExprKind::This => {
                let ty = self.this_types.last().cloned().unwrap_or(Type::Any);
                self.narrowed_reference(expr).unwrap_or(ty)
            }
            ExprKind::Super => Type::Any,
            ExprKind::Ident(name) => self.check_identifier(name, expr.pos),
            ExprKind::Array(elems) => self.check_array_literal(elems, expected),
            ExprKind::Object(props) => self.check_object_literal(props, expected),
            ExprKind::Function(func) => self.check_function_expr(func, expected),
            ExprKind::Class(class) => self.check_class_expr(class),
            ExprKind::Unary { op, expr: operand } => self.check_unary(op, operand),
            ExprKind::Update { expr: operand, .. } => {
                let ty = self.check_assign_target(operand);
                self.mark_reference_read(operand);
                let ty = self.check_non_null(operand, &ty, NullUse::Access);
                if !ty.is_opaque() && !ty.is_number_like() && !ty.is_bigint_like() {
                    self.error(
                        operand.pos,
                        "TS2356",
                        "An arithmetic operand must be of type 'any', 'number', 'bigint' or an enum type.",
                    );
                }
                if ty.is_bigint_like() { Type::BigInt } else { Type::Number }
            }
            ExprKind::Binary { op, left, right } => self.check_binary(expr, op, left, right),
            ExprKind::Assign { op, target, value } => self.check_assignment(op, target, value),
            ExprKind::Conditional { test, then, otherwise } => {
                self.check_condition(test);
                let truthy = self.narrow(test, true);
                let falsy = self.narrow(test, false);
                let then_ty = self.with_narrowing(truthy, |c| c.check_expr(then, expected));
                let else_ty = self.with_narrowing(falsy, |c| c.check_expr(otherwise, expected));
                Type::union([then_ty, else_ty])
            }
            ExprKind::Call {
                callee,
                type_args,
                args,
                optional,
            } => self.check_call(callee, type_args, args, *optional),
            ExprKind::New { callee, type_args, args } => self.check_new(expr, callee, type_args, args),
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                let ty = self.check_member(object, property, *optional);
                self.narrowed_reference(expr).unwrap_or(ty)
            }
            ExprKind::Index { object, index, optional } => self.check_index(object, index, *optional),
            ExprKind::As { expr: inner, ty } => {
                let target = self.resolve_type(ty);
                let context = (!target.is_opaque()).then_some(&target);
                self.check_expr(inner, context);
                target
            }
            ExprKind::Satisfies { expr: inner, ty } => {
                let target = self.resolve_type(ty);
                let source = self.check_expr(inner, Some(&target));
                if !self.is_assignable(&source, &target) {
                    let shown = source.for_message(&target);
                    let message = format!("Type '{shown}' does not satisfy the expected type '{target}'.");
                    self.error(inner.pos, "TS1360", message);
                }
                source
            }
            ExprKind::NonNull(inner) => self.check_expr(inner, expected).non_nullable(),
            ExprKind::Spread(inner) => self.check_expr(inner, None),
            ExprKind::Await(inner) => {
                let ty = self.check_expr(inner, None);
                self.awaited(&ty)
            }
            ExprKind::Yield(value) => {
                if let Some(value) = value {
                    self.check_expr(value, None);
                }
                Type::Any
            }
            ExprKind::Sequence(exprs) => {
                let mut last = Type::Undefined;
                for (i, e) in exprs.iter().enumerate() {
                    last = self.check_expr(e, if i + 1 == exprs.len() { expected } else { None });
                }
                last
            }
            ExprKind::Paren(inner) => self.check_expr(inner, expected),
            ExprKind::Invalid => Type::Any,
        }
    }

    // =========================================================================
    // Names
    // =========================================================================

    fn check_identifier(&mut self, name: &str, pos: Pos) -> Type {
        if let Some(id) = self.lookup_value(name) {
            self.bindings[id].read = true;
            return self.binding_type(id);
        }
        match name {
            "undefined" => return Type::Undefined,
            "arguments" if !self.functions.is_empty() => return Type::Any,
            _ => {}
        }

        match self.lookup_type(name) {
            Some(TypeDecl::Interface(_) | TypeDecl::Alias { .. } | TypeDecl::Param(_)) => {
                let message = format!("'{name}' only refers to a type, but is being used as a value here.");
                self.error(pos, "TS2693", message);
            }
            Some(_) => {}
            None => {
                if let Some(level) = lib::missing_global(name, self.options.target) {
                    let message = format!(
                        "Cannot find name '{name}'. Do you need to change your target library? Try changing the 'lib' compiler option to '{level}' or later."
                    );
                    self.error(pos, "TS2583", message);
                } else {
                    self.error(pos, "TS2304", format!("Cannot find name '{name}'."));
                }
            }
        }
        Type::Any
    }

    /// Dotted source text of a name expression (`a.b.c`), for messages.
    fn entity_name(expr: &Expr) -> Option<String> {
        match &expr.kind {
            ExprKind::Ident(name) => Some(name.clone()),
            ExprKind::This => Some("this".into()),
            ExprKind::Member {
                object,
                property,
                optional: false,
            } => Some(format!("{}.{}", Self::entity_name(object)?, property.text)),
            ExprKind::Paren(inner) => Self::entity_name(inner),
            _ => None,
        }
    }

    /// Report a possibly-nullish or unknown value in a position that needs
    /// a value, and return the type with `null`/`undefined` removed.
    fn check_non_null(&mut self, expr: &Expr, ty: &Type, usage: NullUse) -> Type {
        if matches!(ty, Type::Unknown) {
            match Self::entity_name(expr) {
                Some(name) => self.error(expr.pos, "TS18046", format!("'{name}' is of type 'unknown'.")),
                None => self.error(expr.pos, "TS2571", "Object is of type 'unknown'."),
            }
            return Type::Any;
        }
        if !self.options.strict || matches!(ty, Type::Any) {
            return ty.non_nullable();
        }

        let (null, undefined) = (ty.has_null(), ty.has_undefined());
        if !null && !undefined {
            return ty.clone();
        }
        let what = match (null, undefined) {
            (true, true) => "'null' or 'undefined'",
            (true, false) => "'null'",
            _ => "'undefined'",
        };
        match (usage, Self::entity_name(expr)) {
            (NullUse::Call, _) => {
                let code = match (null, undefined) {
                    (true, true) => "TS2723",
                    (true, false) => "TS2721",
                    _ => "TS2722",
                };
                self.error(expr.pos, code, format!("Cannot invoke an object which is possibly {what}."));
            }
            (NullUse::Access, Some(name)) => {
                let code = match (null, undefined) {
                    (true, true) => "TS18049",
                    (true, false) => "TS18047",
                    _ => "TS18048",
                };
                self.error(expr.pos, code, format!("'{name}' is possibly {what}."));
            }
            (NullUse::Access, None) => {
                let code = match (null, undefined) {
                    (true, true) => "TS2533",
                    (true, false) => "TS2531",
                    _ => "TS2532",
                };
                self.error(expr.pos, code, format!("Object is possibly {what}."));
            }
        }
        ty.non_nullable()
    }

    fn mark_reference_read(&mut self, expr: &Expr) {
        if let ExprKind::Ident(name) = &unparen(expr).kind {
            self.mark_read(name);
        }
    }

    // =========================================================================
    // Literals
    // =========================================================================

    fn check_array_literal(&mut self, elems: &'a [Option<Expr>], expected: Option<&Type>) -> Type {
        let expected = expected.map(|t| self.array_context(t));
        let tuple = matches!(expected, Some(Type::Tuple(_)));

        let mut types = Vec::with_capacity(elems.len());
        for (i, elem) in elems.iter().enumerate() {
            let Some(elem) = elem else {
                types.push(Type::Undefined);
                continue;
            };
            let context = match &expected {
                Some(Type::Tuple(items)) => items.get(i).cloned(),
                Some(Type::Array(item)) => Some((**item).clone()),
                _ => None,
            };
            if let ExprKind::Spread(inner) = &elem.kind {
                let spread = self.check_expr(inner, expected.as_ref());
                types.push(self.iterated_type(&spread));
                continue;
            }
            let ty = self.check_expr(elem, context.as_ref());
            let keep_literal = context.as_ref().is_some_and(|c| c.has_literal() || matches!(c, Type::Enum(_)));
            types.push(if keep_literal { ty } else { ty.widen() });
        }

        if tuple && !elems.iter().flatten().any(|e| matches!(e.kind, ExprKind::Spread(_))) {
            return Type::Tuple(types.into());
        }
        Type::array(Type::union(types))
    }

    /// Array or tuple member of a contextual type.
    fn array_context(&mut self, expected: &Type) -> Type {
        match expected {
            Type::Array(_) | Type::Tuple(_) => expected.clone(),
            Type::Union(members) => members
                .iter()
                .find(|m| matches!(m, Type::Array(_) | Type::Tuple(_)))
                .cloned()
                .unwrap_or(Type::Any),
            Type::Named(named) if matches!(&*named.name, "Iterable" | "ArrayLike") && named.args.len() == 1 => {
                Type::array(named.args[0].clone())
            }
            _ => Type::Any,
        }
    }

    fn check_object_literal(&mut self, props: &'a [Prop], expected: Option<&Type>) -> Type {
        let context = match expected {
            Some(t @ (Type::Object(_) | Type::Named(_))) if !t.is_opaque() => self.apparent_shape(t),
            Some(Type::Union(members)) => {
                let objects: Vec<Type> = members
                    .iter()
                    .filter(|m| matches!(m, Type::Object(_) | Type::Named(_)))
                    .cloned()
                    .collect();
                match objects.as_slice() {
                    [only] => self.apparent_shape(only),
                    _ => None,
                }
            }
            _ => None,
        };
        let prop_context = |name: &str| {
            context.as_ref().and_then(|shape| {
                shape
                    .prop(name)
                    .map(|p| p.ty.clone())
                    .or_else(|| shape.string_index.clone())
            })
        };

        let mut shape = Shape::default();
        let set = |shape: &mut Shape, name: &str, ty: Type| {
            match shape.props.iter_mut().find(|p| &*p.name == name) {
                Some(existing) => existing.ty = ty,
                None => shape.props.push(Property {
                    name: Rc::from(name),
                    ty,
                    optional: false,
                    readonly: false,
                }),
            }
        };

        for prop in props {
            match prop {
                Prop::KeyValue { key, value, .. } => {
                    let name = match key {
                        PropKey::Name(name) => name.as_str(),
                        PropKey::Computed(key) => {
                            self.check_expr(key, None);
                            self.check_expr(value, None);
                            shape.open = true;
                            continue;
                        }
                    };
                    let expected = prop_context(name);
                    let ty = self.check_expr(value, expected.as_ref());
                    let keep_literal = expected
                        .as_ref()
                        .is_some_and(|c| c.has_literal() || matches!(c, Type::Enum(_)));
                    set(&mut shape, name, if keep_literal { ty } else { ty.widen() });
                }
                Prop::Shorthand(name) => {
                    let ty = self.check_identifier(&name.text, name.pos);
                    let keep_literal = prop_context(&name.text).is_some_and(|c| c.has_literal());
                    set(&mut shape, &name.text, if keep_literal { ty } else { ty.widen() });
                }
                Prop::Method { key, func, kind, .. } => {
                    let name = match key {
                        PropKey::Name(name) => Some(name.as_str()),
                        PropKey::Computed(key) => {
                            self.check_expr(key, None);
                            shape.open = true;
                            None
                        }
                    };
                    let contextual = name
                        .and_then(|n| prop_context(n))
                        .and_then(|t| self.call_signatures(&t).into_iter().next());
                    self.this_types.push(Type::Any);
                    let sig = self.check_function(func, contextual);
                    self.this_types.pop();
                    if let Some(name) = name {
                        let ty = match kind {
                            MethodKind::Method => Type::Fn(sig),
                            MethodKind::Getter => sig.ret.clone(),
                            MethodKind::Setter => match shape.prop(name) {
                                Some(_) => continue,
                                None => sig.params.first().map(|p| p.ty.clone()).unwrap_or(Type::Any),
                            },
                        };
                        set(&mut shape, name, ty);
                    }
                }
                Prop::Spread(inner) => {
                    let ty = self.check_expr(inner, None);
                    let ty = ty.non_nullable();
                    if ty.is_opaque() {
                        shape.open = true;
                        continue;
                    }
                    match self.apparent_shape(&ty) {
                        Some(spread) if matches!(ty, Type::Object(_) | Type::Named(_)) => {
                            for p in &spread.props {
                                if !matches!(p.ty, Type::Fn(_)) || matches!(ty, Type::Object(_)) {
                                    set(&mut shape, &p.name, p.ty.clone());
                                    if let Some(copied) = shape.props.iter_mut().find(|q| q.name == p.name) {
                                        copied.optional = p.optional;
                                    }
                                }
                            }
                            shape.open |= spread.open;
                            if spread.string_index.is_some() {
                                shape.string_index = spread.string_index.clone();
                            }
                        }
                        _ => shape.open = true,
                    }
                }
            }
        }
        Type::Object(Rc::new(shape))
    }

    fn check_function_expr(&mut self, func: &'a Function, expected: Option<&Type>) -> Type {
        let contextual = expected.and_then(|t| {
            let t = t.non_nullable();
            let sigs = self.call_signatures(&t);
            (sigs.len() == 1).then(|| sigs[0].clone())
        });

        let named = func.name.as_ref().filter(|_| !func.is_arrow);
        if let Some(name) = named {
            self.push_scope(ScopeKind::Block);
            let id = self.declare_value(&name.text, BindingKind::Function, Type::Any, name.pos);
            self.bindings[id].track_unused = false;
        }
        let sig = self.check_function(func, contextual);
        if named.is_some() {
            self.pop_scope();
        }
        Type::Fn(sig)
    }

    fn check_class_expr(&mut self, class: &'a Class) -> Type {
        self.push_scope(ScopeKind::Block);
        let name = class.name.as_ref().map(|n| n.text.as_str()).unwrap_or("(Anonymous class)");
        let id = self.register_class(class, name);
        if let Some(name) = &class.name {
            self.scopes[self.current]
                .types
                .insert(name.text.clone(), TypeDecl::Class(id));
            let binding = self.declare_value(&name.text, BindingKind::Class, class_static_type(&Rc::from(name.text.as_str()), id), name.pos);
            self.bindings[binding].track_unused = false;
        }
        self.check_class(id);
        self.pop_scope();
        class_static_type(&self.classes[id].name.clone(), id)
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn check_unary(&mut self, op: &str, operand: &'a Expr) -> Type {
        let ty = self.check_expr(operand, None);
        match op {
            "!" | "delete" => Type::Boolean,
            "void" => Type::Undefined,
            "typeof" => Type::union(
                ["string", "number", "bigint", "boolean", "symbol", "undefined", "object", "function"]
                    .iter()
                    .map(|s| Type::str_lit(s)),
            ),
            "-" => match ty {
                Type::NumLit(n) => Type::NumLit(-n),
                t if t.is_bigint_like() => Type::BigInt,
                _ => Type::Number,
            },
            "~" if ty.is_bigint_like() => Type::BigInt,
            _ => Type::Number,
        }
    }

    fn check_binary(&mut self, expr: &'a Expr, op: &str, left: &'a Expr, right: &'a Expr) -> Type {
        match op {
            "&&" => {
                let left_ty = self.check_expr(left, None);
                let facts = self.narrow(left, true);
                let right_ty = self.with_narrowing(facts, |c| c.check_expr(right, None));
                Type::union([self.falsy_part(&left_ty), right_ty])
            }
            "||" => {
                let left_ty = self.check_expr(left, None);
                let facts = self.narrow(left, false);
                let right_ty = self.with_narrowing(facts, |c| c.check_expr(right, None));
                Type::union([self.truthy_part(&left_ty), right_ty])
            }
            "??" => {
                let left_ty = self.check_expr(left, None);
                let right_ty = self.check_expr(right, None);
                Type::union([left_ty.non_nullable(), right_ty])
            }
            "===" | "!==" | "==" | "!=" => {
                let left_ty = self.check_expr(left, None);
                let right_ty = self.check_expr(right, None);
                self.check_comparable(expr.pos, &left_ty, &right_ty, op);
                Type::Boolean
            }
            "instanceof" | "in" => {
                self.check_expr(left, None);
                self.check_expr(right, None);
                Type::Boolean
            }
            "<" | ">" | "<=" | ">=" => {
                let left_ty = self.check_expr(left, None);
                let right_ty = self.check_expr(right, None);
                let mixed = (left_ty.is_number_like() && right_ty.is_string_like())
                    || (left_ty.is_string_like() && right_ty.is_number_like());
                if mixed && !left_ty.is_opaque() && !right_ty.is_opaque() {
                    self.report_operator(expr.pos, op, &left_ty, &right_ty);
                }
                Type::Boolean
            }
            "+" => {
                let left_ty = self.check_expr(left, None);
                let right_ty = self.check_expr(right, None);
                self.plus_result(expr.pos, &left_ty, &right_ty)
            }
            _ => {
                let left_ty = self.check_expr(left, None);
                let right_ty = self.check_expr(right, None);
                self.arithmetic_result(expr.pos, op, (left, &left_ty), (right, &right_ty))
            }
        }
    }

    fn report_operator(&mut self, pos: Pos, op: &str, left: &Type, right: &Type) {
        let message = format!(
            "Operator '{op}' cannot be applied to types '{}' and '{}'.",
            left.widen(),
            right.widen()
        );
        self.error(pos, "TS2365", message);
    }

    fn plus_result(&mut self, pos: Pos, left: &Type, right: &Type) -> Type {
        if left.is_string_like() || right.is_string_like() {
            return Type::String;
        }
        if matches!(left, Type::Any) || matches!(right, Type::Any) {
            return Type::Any;
        }
        if left.is_opaque() || right.is_opaque() {
            return Type::Any;
        }
        if left.is_number_like() && right.is_number_like() {
            return Type::Number;
        }
        if left.is_bigint_like() && right.is_bigint_like() {
            return Type::BigInt;
        }
        if !self.options.strict && (left.is_nullish() || right.is_nullish()) {
            return Type::Any;
        }
        self.report_operator(pos, "+", left, right);
        Type::Any
    }

    fn arithmetic_result(&mut self, pos: Pos, op: &str, left: (&Expr, &Type), right: (&Expr, &Type)) -> Type {
        let left_ty = self.check_non_null(left.0, left.1, NullUse::Access);
        let right_ty = self.check_non_null(right.0, right.1, NullUse::Access);
        let ok = |t: &Type| t.is_opaque() || t.is_number_like() || t.is_bigint_like();

        let mut reported = false;
        if !ok(&left_ty) {
            self.error(
                left.0.pos,
                "TS2362",
                "The left-hand side of an arithmetic operation must be of type 'any', 'number', 'bigint' or an enum type.",
            );
            reported = true;
        }
        if !ok(&right_ty) {
            self.error(
                right.0.pos,
                "TS2363",
                "The right-hand side of an arithmetic operation must be of type 'any', 'number', 'bigint' or an enum type.",
            );
            reported = true;
        }
        if reported {
            return Type::Number;
        }

        let bigint = (left_ty.is_bigint_like(), right_ty.is_bigint_like());
        let number = (
            left_ty.is_number_like() && !matches!(left_ty, Type::Any),
            right_ty.is_number_like() && !matches!(right_ty, Type::Any),
        );
        match (bigint, number) {
            ((true, true), _) => Type::BigInt,
            ((true, false), (_, true)) | ((false, true), (true, _)) => {
                self.report_operator(pos, op, &left_ty, &right_ty);
                Type::Any
            }
            _ => Type::Number,
        }
    }

    /// Report `===`-style comparisons between primitive types that can
    /// never be equal.
    pub(super) fn check_comparable(&mut self, pos: Pos, left: &Type, right: &Type, op: &str) {
        let comparable_kind = |t: &Type| t.members().iter().all(|m| m.is_primitive());
        if left.is_opaque() || right.is_opaque() || !comparable_kind(left) || !comparable_kind(right) {
            return;
        }
        let left_members = left.members();
        let right_members = right.members();
        for l in &left_members {
            for r in &right_members {
                if self.is_assignable(l, r) || self.is_assignable(r, l) {
                    return;
                }
                if l.widen() == r.widen() && !(l.has_literal() && r.has_literal()) {
                    return;
                }
            }
        }
        if op == "case" {
            self.error(pos, "TS2678", format!("Type '{right}' is not comparable to type '{left}'."));
        } else {
            let message =
                format!("This comparison appears to be unintentional because the types '{left}' and '{right}' have no overlap.");
            self.error(pos, "TS2367", message);
        }
    }

    // =========================================================================
    // Assignment
    // =========================================================================

    /// Check an assignment target and return its declared type.
    fn check_assign_target(&mut self, target: &'a Expr) -> Type {
        match &target.kind {
            ExprKind::Ident(name) => {
                let Some(id) = self.lookup_value(name) else {
                    if self.lookup_type(name).is_none() {
                        self.error(target.pos, "TS2304", format!("Cannot find name '{name}'."));
                    }
                    return Type::Any;
                };
                let (code, what) = match self.bindings[id].kind {
                    BindingKind::Const => ("TS2588", "a constant"),
                    BindingKind::Class => ("TS2629", "a class"),
                    BindingKind::Function => ("TS2630", "a function"),
                    BindingKind::Enum => ("TS2628", "an enum"),
                    BindingKind::Import => ("TS2632", "an import"),
                    BindingKind::Namespace => ("TS2631", "a namespace"),
                    _ => return self.bindings[id].ty.clone(),
                };
                self.error(target.pos, code, format!("Cannot assign to '{name}' because it is {what}."));
                Type::Any
            }
            ExprKind::Member { object, property, .. } => {
                let object_ty = self.check_expr(object, None);
                let object_ty = self.check_non_null(object, &object_ty, NullUse::Access);
                if object_ty.is_opaque() {
                    return Type::Any;
                }
                for member in object_ty.members() {
                    if let Some(prop) = self.property_decl(&member, &property.text)
                        && prop.readonly
                    {
                        let message = format!(
                            "Cannot assign to '{}' because it is a read-only property.",
                            property.text
                        );
                        self.error(property.pos, "TS2540", message);
                        break;
                    }
                }
                match self.property_type(&object_ty, &property.text) {
                    Some(ty) => ty,
                    None => {
                        self.report_missing_property(&object_ty, property);
                        Type::Any
                    }
                }
            }
            ExprKind::Index { object, index, .. } => self.check_index(object, index, false),
            ExprKind::Paren(inner) | ExprKind::NonNull(inner) => self.check_assign_target(inner),
            ExprKind::Object(_) | ExprKind::Array(_) => {
                self.quiet += 1;
                self.check_expr(target, None);
                self.quiet -= 1;
                Type::Any
            }
            _ => {
                self.check_expr(target, None);
                self.error(
                    target.pos,
                    "TS2364",
                    "The left-hand side of an assignment expression must be a variable or a property access.",
                );
                Type::Any
            }
        }
    }

    fn check_assignment(&mut self, op: &str, target: &'a Expr, value: &'a Expr) -> Type {
        let declared = self.check_assign_target(target);
        match op {
            "=" => {
                let context = (!declared.is_opaque()).then_some(&declared);
                let value_ty = self.check_expr(value, context);
                self.check_assignable_expr(value, &value_ty, &declared, target.pos);
                self.assign_reference(target, &declared, &value_ty);
                value_ty
            }
            "??=" | "||=" | "&&=" => {
                self.mark_reference_read(target);
                let value_ty = self.check_expr(value, Some(&declared));
                self.check_assignable_expr(value, &value_ty, &declared, target.pos);
                declared
            }
            _ => {
                self.mark_reference_read(target);
                let current = match self.reference_key(target) {
                    Some(key) => self.narrowed(&key).unwrap_or_else(|| declared.clone()),
                    None => declared.clone(),
                };
                let value_ty = self.check_expr(value, None);
                let result = if op == "+=" {
                    self.plus_result(target.pos, &current, &value_ty)
                } else {
                    let binary_op = op.trim_end_matches('=');
                    self.arithmetic_result(target.pos, binary_op, (target, &current), (value, &value_ty))
                };
                if !self.is_assignable(&result, &declared) {
                    self.report_not_assignable(target.pos, &result, &declared);
                }
                self.assign_reference(target, &declared, &result);
                result
            }
        }
    }

    // =========================================================================
    // Members
    // =========================================================================

    fn check_member(&mut self, object: &'a Expr, property: &Name, optional: bool) -> Type {
        let object_ty = self.check_expr(object, None);
        if matches!(object.kind, ExprKind::Null) {
            self.error(object.pos, "TS18050", "The value 'null' cannot be used here.");
            return Type::Any;
        }

        let has_nullish = object_ty.members().iter().any(Type::is_nullish);
        let target = if optional {
            object_ty.non_nullable()
        } else {
            self.check_non_null(object, &object_ty, NullUse::Access)
        };
        if matches!(target, Type::Any | Type::Unknown) {
            return Type::Any;
        }

        let ty = match self.property_type(&target, &property.text) {
            Some(ty) => ty,
            None => {
                self.report_missing_property(&target, property);
                Type::Any
            }
        };
        if optional && has_nullish {
            Type::union([ty, Type::Undefined])
        } else {
            ty
        }
    }

    fn report_missing_property(&mut self, object: &Type, property: &Name) {
        if object.is_opaque() || !self.is_closed_object(object) {
            return;
        }
        let name = &property.text;
        if let Some(interface) = self.lib_interface_name(object)
            && let Some(level) = lib::missing_member(&interface, name, self.options.target)
        {
            let message = format!(
                "Property '{name}' does not exist on type '{object}'. Do you need to change your target library? Try changing the 'lib' compiler option to '{level}' or later."
            );
            self.error(property.pos, "TS2550", message);
            return;
        }
        self.error(
            property.pos,
            "TS2339",
            format!("Property '{name}' does not exist on type '{object}'."),
        );
    }

    fn check_index(&mut self, object: &'a Expr, index: &'a Expr, optional: bool) -> Type {
        let object_ty = self.check_expr(object, None);
        let index_ty = self.check_expr(index, None);
        let target = if optional {
            object_ty.non_nullable()
        } else {
            self.check_non_null(object, &object_ty, NullUse::Access)
        };

        match (&target, &index_ty) {
            (Type::Any | Type::Unknown | Type::Param(_), _) => Type::Any,
            (_, Type::StrLit(name)) => {
                let name = name.clone();
                self.property_type(&target, &name).unwrap_or(Type::Any)
            }
            (Type::Tuple(items), Type::NumLit(n)) => items.get(*n as usize).cloned().unwrap_or(Type::Any),
            (Type::Tuple(items), _) => Type::union(items.iter().cloned()),
            (Type::Array(elem), _) => (**elem).clone(),
            (Type::String | Type::StrLit(_), _) => Type::String,
            _ => {
                let Some(shape) = self.apparent_shape(&target) else {
                    return Type::Any;
                };
                if index_ty.is_number_like()
                    && let Some(ty) = &shape.number_index
                {
                    return ty.clone();
                }
                shape.string_index.clone().unwrap_or(Type::Any)
            }
        }
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn check_call(&mut self, callee: &'a Expr, type_args: &'a [TypeExpr], args: &'a [Expr], optional: bool) -> Type {
        if matches!(callee.kind, ExprKind::Super) {
            for arg in args {
                self.check_expr(arg, None);
            }
            return Type::Void;
        }

        let callee_ty = self.check_expr(callee, None);
        let has_nullish = callee_ty.members().iter().any(Type::is_nullish);
        let callee_ty = if optional {
            callee_ty.non_nullable()
        } else {
            self.check_non_null(callee, &callee_ty, NullUse::Call)
        };

        if callee_ty.is_opaque() || matches!(callee_ty, Type::Union(_) | Type::Never) {
            self.check_args_loosely(args);
            return Type::Any;
        }

        let sigs = self.call_signatures(&callee_ty);
        if sigs.is_empty() {
            if !self.construct_signatures(&callee_ty).is_empty() {
                let message = format!("Value of type '{callee_ty}' is not callable. Did you mean to include 'new'?");
                self.error(callee.pos, "TS2348", message);
            } else if !self.is_open_object(&callee_ty) {
                let shown = match callee_ty.apparent_name() {
                    Some(name) if callee_ty.is_primitive() => name.to_string(),
                    _ => callee_ty.to_string(),
                };
                let message = format!("This expression is not callable.\n  Type '{shown}' has no call signatures.");
                self.error(callee.pos, "TS2349", message);
            }
            self.check_args_loosely(args);
            return Type::Any;
        }

        let ret = self.resolve_call(&sigs, type_args, args, callee.pos);
        if optional && has_nullish {
            Type::union([ret, Type::Undefined])
        } else {
            ret
        }
    }

    fn is_open_object(&mut self, ty: &Type) -> bool {
        self.apparent_shape(ty).is_some_and(|s| s.open)
    }

    fn check_new(&mut self, expr: &'a Expr, callee: &'a Expr, type_args: &'a [TypeExpr], args: &'a [Expr]) -> Type {
        let callee_ty = self.check_expr(callee, None);
        if callee_ty.is_opaque() || matches!(callee_ty, Type::Union(_)) {
            self.check_args_loosely(args);
            return Type::Any;
        }

        if let Type::Named(named) = &callee_ty
            && let DeclRef::ClassStatic(id) = named.decl
            && self.classes[id].ast.is_abstract
        {
            self.error(expr.pos, "TS2511", "Cannot create an instance of an abstract class.");
            self.check_args_loosely(args);
            return self.instance_type_of(&callee_ty);
        }

        let sigs = self.construct_signatures(&callee_ty);
        if sigs.is_empty() {
            if !self.is_open_object(&callee_ty) {
                let message = format!("This expression is not constructable.\n  Type '{callee_ty}' has no construct signatures.");
                self.error(callee.pos, "TS2351", message);
            }
            self.check_args_loosely(args);
            return Type::Any;
        }
        self.resolve_call(&sigs, type_args, args, callee.pos)
    }

    fn check_args_loosely(&mut self, args: &'a [Expr]) {
        for arg in args {
            self.check_expr(arg, None);
        }
    }

    /// Pick the signature a call resolves to and check its arguments.
    fn resolve_call(&mut self, sigs: &[Rc<Signature>], type_args: &'a [TypeExpr], args: &'a [Expr], pos: Pos) -> Type {
        if let [sig] = sigs {
            return self.check_signature_call(sig, type_args, args, pos).0;
        }

        let has_spread = args.iter().any(|a| matches!(a.kind, ExprKind::Spread(_)));
        for sig in sigs {
            let fits_arity = has_spread
                || (args.len() >= sig.min_args() && sig.max_args().is_none_or(|max| args.len() <= max));
            if !fits_arity {
                continue;
            }
            self.quiet += 1;
            let (_, ok) = self.check_signature_call(sig, type_args, args, pos);
            self.quiet -= 1;
            if ok {
                return self.check_signature_call(sig, type_args, args, pos).0;
            }
        }

        // No overload fits; keep checking the arguments themselves.
        self.check_args_loosely(args);
        Type::Any
    }

    /// Check a call against one signature. Returns the result type and
    /// whether the arguments matched.
    fn check_signature_call(
        &mut self,
        sig: &Signature,
        type_args: &'a [TypeExpr],
        args: &'a [Expr],
        pos: Pos,
    ) -> (Type, bool) {
        let mut bindings: FxHashMap<Rc<str>, Type> = FxHashMap::default();
        for (param, arg) in sig.type_params.iter().zip(type_args) {
            let ty = self.resolve_type(arg);
            bindings.insert(param.clone(), ty);
        }
        let explicit = !type_args.is_empty();

        let mut ok = true;
        let has_spread = args.iter().any(|a| matches!(a.kind, ExprKind::Spread(_)));
        if !has_spread {
            ok &= self.check_arity(sig, args, pos);
        }

        let is_function_literal =
            |arg: &Expr| matches!(unparen(arg).kind, ExprKind::Function(_));
        let mut arg_types: Vec<Option<Type>> = vec![None; args.len()];

        // Non-function arguments first so that callbacks see inferred types.
        for pass in [false, true] {
            for (i, arg) in args.iter().enumerate() {
                if is_function_literal(arg) != pass {
                    continue;
                }
                if let ExprKind::Spread(inner) = &arg.kind {
                    arg_types[i] = Some(self.check_expr(inner, None));
                    continue;
                }
                let Some(param_ty) = sig.param_type(i) else {
                    arg_types[i] = Some(self.check_expr(arg, None));
                    continue;
                };
                let context = self.instantiate(&param_ty, sig, &bindings, true);
                let ty = self.check_expr(arg, (!context.is_opaque() || pass).then_some(&context));
                if !explicit {
                    self.infer(&param_ty, &ty, sig, &mut bindings);
                }
                arg_types[i] = Some(ty);
            }
        }

        for (i, arg) in args.iter().enumerate() {
            if matches!(arg.kind, ExprKind::Spread(_)) {
                continue;
            }
            let (Some(param_ty), Some(arg_ty)) = (sig.param_type(i), arg_types[i].take()) else {
                continue;
            };
            let target = self.instantiate(&param_ty, sig, &bindings, true);
            ok &= self.check_argument(arg, &arg_ty, &target);
        }

        (self.instantiate(&sig.ret, sig, &bindings, true), ok)
    }

    fn check_arity(&mut self, sig: &Signature, args: &[Expr], pos: Pos) -> bool {
        let count = args.len();
        let min = sig.min_args();
        match sig.max_args() {
            Some(max) if count > max => {
                let expected = if min == max { min.to_string() } else { format!("{min}-{max}") };
                let at = args.get(max).map(|a| a.pos).unwrap_or(pos);
                self.error(at, "TS2554", format!("Expected {expected} arguments, but got {count}."));
                false
            }
            Some(max) if count < min => {
                let expected = if min == max { min.to_string() } else { format!("{min}-{max}") };
                self.error(pos, "TS2554", format!("Expected {expected} arguments, but got {count}."));
                false
            }
            None if count < min => {
                self.error(pos, "TS2555", format!("Expected at least {min} arguments, but got {count}."));
                false
            }
            _ => true,
        }
    }

    /// Report an argument not assignable to its parameter.
    fn check_argument(&mut self, arg: &'a Expr, source: &Type, target: &Type) -> bool {
        let before = self.diagnostics.len();
        if self.is_assignable(source, target) {
            // Excess properties on object literal arguments.
            self.check_assignable_expr(arg, source, target, arg.pos);
            return self.diagnostics.len() == before || self.quiet > 0;
        }
        if self.quiet == 0 {
            self.check_assignable_expr(arg, source, target, arg.pos);
            // Rewrite the generic assignment error into the argument form.
            let grew = self.diagnostics.len() > before;
            if grew
                && let Some(last) = self.diagnostics.last_mut()
                && last.code.as_deref() == Some("TS2322")
                && last.line == arg.pos.line
                && last.column == arg.pos.column
            {
                last.code = Some("TS2345".into());
                last.message = format!(
                    "Argument of type '{}' is not assignable to parameter of type '{target}'.",
                    source.for_message(target)
                );
            }
        }
        false
    }

    /// Substitute inferred type arguments; unbound ones become `any` when
    /// `erase` is set.
    fn instantiate(&self, ty: &Type, sig: &Signature, bindings: &FxHashMap<Rc<str>, Type>, erase: bool) -> Type {
        if sig.type_params.is_empty() {
            return ty.clone();
        }
        ty.substitute(&|name: &str| {
            if let Some(bound) = bindings.get(name) {
                return Some(bound.clone());
            }
            (erase && sig.type_params.iter().any(|p| &**p == name)).then_some(Type::Any)
        })
    }

    /// Infer type arguments of `sig` from an argument type.
    fn infer(&mut self, param: &Type, arg: &Type, sig: &Signature, bindings: &mut FxHashMap<Rc<str>, Type>) {
        if sig.type_params.is_empty() || self.depth > 20 {
            return;
        }
        self.depth += 1;
        match (param, arg) {
            (Type::Param(name), _) if sig.type_params.contains(name) => {
                if !matches!(arg, Type::Any | Type::Never) && !bindings.contains_key(name) {
                    bindings.insert(name.clone(), arg.widen());
                }
            }
            (Type::Array(p), Type::Array(a)) => self.infer(p, a, sig, bindings),
            (Type::Array(p), Type::Tuple(items)) => {
                let union = Type::union(items.iter().cloned());
                self.infer(p, &union, sig, bindings);
            }
            (Type::Union(members), _) => {
                let params: Vec<Type> = members.iter().filter(|m| !m.is_nullish()).cloned().collect();
                if let [only] = params.as_slice() {
                    self.infer(only, &arg.non_nullable(), sig, bindings);
                }
            }
            (Type::Fn(p), Type::Fn(a)) => {
                for (pp, ap) in p.params.iter().zip(&a.params) {
                    self.infer(&pp.ty, &ap.ty, sig, bindings);
                }
                self.infer(&p.ret, &a.ret, sig, bindings);
            }
            (Type::Named(p), Type::Named(a)) if p.decl == a.decl => {
                for (pa, aa) in p.args.iter().zip(&a.args) {
                    self.infer(pa, aa, sig, bindings);
                }
            }
            (Type::Named(p), Type::Array(a)) if matches!(&*p.name, "Iterable" | "ArrayLike") && p.args.len() == 1 => {
                self.infer(&p.args[0], a, sig, bindings);
            }
            (Type::Object(p), _) => {
                if let Some(shape) = self.apparent_shape(arg) {
                    for prop in &p.props {
                        if let Some(a) = shape.prop(&prop.name) {
                            self.infer(&prop.ty, &a.ty, sig, bindings);
                        }
                    }
                }
            }
            _ => {}
        }
        self.depth -= 1;
    }
}

/// Numeric value of a literal (`0x1F`, `1_000`, `1e3`).
fn parse_number(text: &str) -> Option<f64> {
    let text: String = text.chars().filter(|c| *c != '_').collect();
    let lower = text.to_ascii_lowercase();
    let radix = |prefix: &str, radix: u32| {
        lower
            .strip_prefix(prefix)
            .and_then(|digits| i64::from_str_radix(digits, radix).ok())
            .map(|v| v as f64)
    };
    radix("0x", 16)
        .or_else(|| radix("0o", 8))
        .or_else(|| radix("0b", 2))
        .or_else(|| lower.parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number("0x1F"), Some(31.0));
        assert_eq!(parse_number("0b101"), Some(5.0));
        assert_eq!(parse_number("1_000"), Some(1000.0));
        assert_eq!(parse_number("1.5e2"), Some(150.0));
    }
}
