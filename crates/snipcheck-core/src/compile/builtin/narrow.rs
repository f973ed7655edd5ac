//! Control-flow narrowing of references.
//!
//! Narrowed types live in a stack of frames parallel to the scope stack.
//! Conditions produce facts (`RefKey` to narrowed type) which are pushed as
//! a frame for the guarded code; assignments write into the top frame.

use rustc_hash::FxHashMap;

use super::ast::*;
use super::checker::{Checker, RefKey, THIS_REF};
use super::relate::unparen;
use super::types::Type;

/// Narrowing facts produced by a condition.
pub(super) type Facts = Vec<(RefKey, Type)>;

/// State of the narrowed references at the end of a branch.
pub(super) type FlowState = FxHashMap<RefKey, Type>;

impl<'a> Checker<'a> {
    // =========================================================================
    // References
    // =========================================================================

    /// Key of a narrowable reference: `x`, `this`, `x.a.b`.
    pub(super) fn reference_key(&self, expr: &Expr) -> Option<RefKey> {
        match &expr.kind {
            ExprKind::Ident(name) => self.lookup_value(name).map(|id| (id, String::new())),
            ExprKind::This => Some((THIS_REF, String::new())),
            ExprKind::Member {
                object,
                property,
                optional: false,
            } => {
                let (id, path) = self.reference_key(object)?;
                Some((id, format!("{path}.{}", property.text)))
            }
            ExprKind::Paren(inner) | ExprKind::NonNull(inner) => self.reference_key(inner),
            _ => None,
        }
    }

    /// Narrowed type of a `this` or member reference.
    pub(super) fn narrowed_reference(&self, expr: &Expr) -> Option<Type> {
        let key = self.reference_key(expr)?;
        self.narrowed(&key)
    }

    /// Type of a reference as currently seen, without reporting anything.
    fn reference_type(&mut self, expr: &'a Expr) -> Type {
        self.quiet += 1;
        let ty = self.check_expr(expr, None);
        self.quiet -= 1;
        ty
    }

    /// Declared type behind a key, for references that have one.
    fn declared_type(&self, key: &RefKey) -> Option<Type> {
        (key.0 != THIS_REF && key.1.is_empty()).then(|| self.bindings[key.0].ty.clone())
    }

    pub(super) fn set_narrowing(&mut self, key: RefKey, ty: Type) {
        if let Some(top) = self.narrowing.last_mut() {
            top.insert(key, ty);
        }
    }

    /// Record an assignment to `target`. Member paths below the target
    /// lose their narrowing.
    pub(super) fn assign_reference(&mut self, target: &Expr, declared: &Type, assigned: &Type) {
        let Some(key) = self.reference_key(target) else {
            return;
        };

        let prefix = format!("{}.", key.1);
        let stale: Vec<RefKey> = self
            .narrowing
            .iter()
            .flat_map(|frame| frame.keys())
            .filter(|(id, path)| *id == key.0 && path.starts_with(&prefix))
            .cloned()
            .collect();
        for stale_key in stale {
            self.set_narrowing(stale_key, Type::Any);
        }

        if declared.is_opaque() {
            return;
        }
        let ty = if matches!(declared, Type::Union(_)) {
            self.narrow_to_assigned(declared, assigned)
        } else {
            declared.clone()
        };
        self.set_narrowing(key, ty);
    }

    /// Members of `declared` that a value of type `assigned` can inhabit.
    pub(super) fn narrow_to_assigned(&mut self, declared: &Type, assigned: &Type) -> Type {
        if assigned.is_opaque() {
            return declared.clone();
        }
        let assigned_members = assigned.members();
        let mut kept = Vec::new();
        for member in declared.members() {
            if assigned_members.iter().any(|a| self.is_assignable(a, &member)) {
                kept.push(member);
            }
        }
        if kept.is_empty() {
            declared.clone()
        } else {
            Type::union(kept)
        }
    }

    // =========================================================================
    // Flow
    // =========================================================================

    pub(super) fn check_condition(&mut self, test: &'a Expr) {
        self.check_expr(test, None);
    }

    /// Run `f` under `facts`. References reassigned inside are widened
    /// to cover both the old and the new type afterwards.
    pub(super) fn with_narrowing<R>(&mut self, facts: Facts, f: impl FnOnce(&mut Self) -> R) -> R {
        let before: FlowState = facts.into_iter().collect();
        self.narrowing.push(before.clone());
        let result = f(self);
        let frame = self.narrowing.pop().unwrap_or_default();
        for (key, ty) in frame {
            if before.get(&key) == Some(&ty) {
                continue;
            }
            if let Some(outer) = self.narrowed(&key).or_else(|| self.declared_type(&key)) {
                self.set_narrowing(key, Type::union([outer, ty]));
            }
        }
        result
    }

    /// Run `f` under `facts` and return the flow state at its end.
    pub(super) fn branch(&mut self, facts: Facts, f: impl FnOnce(&mut Self)) -> FlowState {
        self.narrowing.push(facts.into_iter().collect());
        f(self);
        self.narrowing.pop().unwrap_or_default()
    }

    /// Join the states of the branches that continue past a conditional.
    pub(super) fn merge_branches(&mut self, states: Vec<FlowState>) {
        if let [state] = states.as_slice() {
            for (key, ty) in state.clone() {
                self.set_narrowing(key, ty);
            }
            return;
        }

        let mut keys: Vec<RefKey> = Vec::new();
        for state in &states {
            for key in state.keys() {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        for key in keys {
            let current = self.narrowed(&key).or_else(|| self.declared_type(&key));
            let types: Option<Vec<Type>> = states
                .iter()
                .map(|state| state.get(&key).cloned().or_else(|| current.clone()))
                .collect();
            if let Some(types) = types {
                self.set_narrowing(key, Type::union(types));
            }
        }
    }

    /// Check a loop body. A quiet first pass finds references the body
    /// reassigns so the real pass starts from their widened types.
    pub(super) fn check_loop(&mut self, test: Option<&'a Expr>, body: impl Fn(&mut Self)) {
        self.quiet += 1;
        let facts = test.map(|t| self.narrow(t, true)).unwrap_or_default();
        let after = self.branch(facts, |c| body(c));
        self.quiet -= 1;

        for (key, ty) in after {
            if let Some(current) = self.narrowed(&key)
                && current != ty
            {
                self.set_narrowing(key, Type::union([current, ty]));
            }
        }

        let facts = test.map(|t| self.narrow(t, true)).unwrap_or_default();
        self.with_narrowing(facts, |c| body(c));
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    /// Facts that hold when `test` evaluates to `assume`.
    pub(super) fn narrow(&mut self, test: &'a Expr, assume: bool) -> Facts {
        match &test.kind {
            ExprKind::Paren(inner) => self.narrow(inner, assume),
            ExprKind::Unary { op: "!", expr } => self.narrow(expr, !assume),
            ExprKind::Binary { op: "&&", left, right } => {
                let left_true = self.narrow(left, true);
                if assume {
                    let right_true = self.with_narrowing(left_true.clone(), |c| c.narrow(right, true));
                    concat(left_true, right_true)
                } else {
                    let left_false = self.narrow(left, false);
                    let right_false = self.with_narrowing(left_true, |c| c.narrow(right, false));
                    self.either(left_false, right_false)
                }
            }
            ExprKind::Binary { op: "||", left, right } => {
                let left_false = self.narrow(left, false);
                if assume {
                    let left_true = self.narrow(left, true);
                    let right_true = self.with_narrowing(left_false, |c| c.narrow(right, true));
                    self.either(left_true, right_true)
                } else {
                    let right_false = self.with_narrowing(left_false.clone(), |c| c.narrow(right, false));
                    concat(left_false, right_false)
                }
            }
            ExprKind::Binary { op, left, right } if matches!(*op, "===" | "!==" | "==" | "!=") => {
                let positive = matches!(*op, "===" | "==") == assume;
                let loose = matches!(*op, "==" | "!=");
                self.narrow_comparison(left, right, positive, loose)
            }
            ExprKind::Binary {
                op: "instanceof",
                left,
                right,
            } => self.narrow_instanceof(left, right, assume),
            ExprKind::Binary { op: "in", left, right } => match &unparen(left).kind {
                ExprKind::Str(name) => self.narrow_in(name, right, assume),
                _ => Vec::new(),
            },
            ExprKind::Call { callee, args, .. } if is_array_is_array(callee) && args.len() == 1 => {
                self.narrow_is_array(&args[0], assume)
            }
            ExprKind::Assign { op: "=", target, .. } => self.narrow_truthiness(target, assume),
            _ => self.narrow_truthiness(test, assume),
        }
    }

    /// Facts that hold if either of two alternatives held.
    fn either(&mut self, left: Facts, right: Facts) -> Facts {
        let right: FlowState = right.into_iter().collect();
        let mut out = Vec::new();
        for (key, ty) in collapse(left) {
            if let Some(other) = right.get(&key) {
                out.push((key, Type::union([ty, other.clone()])));
            }
        }
        out
    }

    fn narrow_truthiness(&mut self, reference: &'a Expr, assume: bool) -> Facts {
        let Some(key) = self.reference_key(reference) else {
            return Vec::new();
        };
        let current = self.reference_type(reference);
        if current.is_opaque() {
            return Vec::new();
        }
        let ty = if assume {
            self.truthy_part(&current)
        } else {
            self.falsy_part(&current)
        };
        vec![(key, ty)]
    }

    pub(super) fn truthy_part(&self, ty: &Type) -> Type {
        if matches!(ty, Type::Any | Type::Unknown) {
            return ty.clone();
        }
        Type::union(ty.members().into_iter().filter_map(|m| match m {
            Type::Null | Type::Undefined | Type::Void | Type::BoolLit(false) => None,
            Type::StrLit(s) if s.is_empty() => None,
            Type::NumLit(n) if n == 0.0 => None,
            Type::Boolean => Some(Type::BoolLit(true)),
            other => Some(other),
        }))
    }

    pub(super) fn falsy_part(&self, ty: &Type) -> Type {
        if matches!(ty, Type::Any | Type::Unknown) {
            return ty.clone();
        }
        Type::union(ty.members().into_iter().filter_map(|m| match m {
            Type::Boolean | Type::BoolLit(false) => Some(Type::BoolLit(false)),
            Type::StrLit(s) if s.is_empty() => Some(Type::StrLit(s)),
            Type::NumLit(n) if n == 0.0 => Some(Type::NumLit(n)),
            Type::Null
            | Type::Undefined
            | Type::Void
            | Type::String
            | Type::Number
            | Type::BigInt
            | Type::Enum(_)
            | Type::Param(_) => Some(m),
            _ => None,
        }))
    }

    fn narrow_comparison(&mut self, left: &'a Expr, right: &'a Expr, positive: bool, loose: bool) -> Facts {
        // typeof x === "string"
        for (a, b) in [(left, right), (right, left)] {
            if let ExprKind::Unary { op: "typeof", expr } = &unparen(a).kind
                && let ExprKind::Str(tag) = &unparen(b).kind
            {
                return self.narrow_typeof(expr, tag, positive);
            }
        }

        let right_ty = self.reference_type(right);
        let facts = self.narrow_equality(left, &right_ty, positive, loose);
        if !facts.is_empty() {
            return facts;
        }
        let left_ty = self.reference_type(left);
        self.narrow_equality(right, &left_ty, positive, loose)
    }

    /// Narrow `reference` compared against a value of type `value`, and
    /// its parent object when `reference` is a discriminant property.
    fn narrow_equality(&mut self, reference: &'a Expr, value: &Type, positive: bool, loose: bool) -> Facts {
        if !is_unit(value) {
            return Vec::new();
        }
        let mut facts = Vec::new();

        if let Some(key) = self.reference_key(reference) {
            let current = self.reference_type(reference);
            if let Some(ty) = self.narrow_by_value(&current, value, positive, loose) {
                facts.push((key, ty));
            }
        }

        if let ExprKind::Member {
            object,
            property,
            optional: false,
        } = &unparen(reference).kind
            && let Some(key) = self.reference_key(object)
        {
            let current = self.reference_type(object);
            if let Type::Union(members) = &current {
                let mut kept = Vec::new();
                for member in members.iter() {
                    if self.discriminant_matches(member, &property.text, value, positive, loose) {
                        kept.push(member.clone());
                    }
                }
                facts.push((key, Type::union(kept)));
            }
        }
        facts
    }

    fn narrow_by_value(&mut self, current: &Type, value: &Type, positive: bool, loose: bool) -> Option<Type> {
        if matches!(current, Type::Any) {
            return None;
        }
        let nullish = |t: &Type| match value {
            Type::Null if loose => t.is_nullish(),
            Type::Undefined if loose => t.is_nullish(),
            Type::Null => matches!(t, Type::Null),
            Type::Undefined => matches!(t, Type::Undefined | Type::Void),
            _ => false,
        };

        if matches!(value, Type::Null | Type::Undefined) {
            if matches!(current, Type::Unknown) {
                return positive.then(|| value.clone());
            }
            return Some(current.filter(|m| nullish(m) == positive || m.is_opaque()));
        }

        if positive {
            if matches!(current, Type::Unknown) {
                return Some(value.clone());
            }
            let accepts = current.members().iter().any(|m| m.widen() == value.widen() || m == value);
            return accepts.then(|| value.clone());
        }
        match (current, value) {
            (Type::Boolean, Type::BoolLit(b)) => Some(Type::BoolLit(!b)),
            _ if current.has_literal() => Some(Type::union(current.members().into_iter().flat_map(|m| {
                if let (Type::Boolean, Type::BoolLit(b)) = (&m, value) {
                    return vec![Type::BoolLit(!b)];
                }
                if &m == value { Vec::new() } else { vec![m] }
            }))),
            _ => None,
        }
    }

    fn discriminant_matches(&mut self, member: &Type, name: &str, value: &Type, positive: bool, loose: bool) -> bool {
        if member.is_opaque() {
            return true;
        }
        let Some(prop) = self.property_type(member, name) else {
            return !positive;
        };
        if prop.is_opaque() {
            return true;
        }
        let equal = |t: &Type| t == value || (loose && t.is_nullish() && value.is_nullish());
        if positive {
            prop.members().iter().any(|t| equal(t) || (!t.has_literal() && t.widen() == value.widen()))
        } else {
            !prop.members().iter().all(|t| equal(t))
        }
    }

    fn narrow_typeof(&mut self, reference: &'a Expr, tag: &str, positive: bool) -> Facts {
        let Some(key) = self.reference_key(reference) else {
            return Vec::new();
        };
        let current = self.reference_type(reference);
        if matches!(current, Type::Any) {
            return Vec::new();
        }
        if matches!(current, Type::Unknown) {
            if !positive {
                return Vec::new();
            }
            let ty = match tag {
                "string" => Type::String,
                "number" => Type::Number,
                "bigint" => Type::BigInt,
                "boolean" => Type::Boolean,
                "symbol" => Type::Symbol,
                "undefined" => Type::Undefined,
                "object" => Type::union([Type::NonPrimitive, Type::Null]),
                _ => return Vec::new(),
            };
            return vec![(key, ty)];
        }

        let mut kept = Vec::new();
        for member in current.members() {
            let matches = match self.typeof_tag(&member) {
                Some(t) => t == tag,
                None => positive,
            };
            if matches == positive {
                kept.push(member);
            }
        }
        vec![(key, Type::union(kept))]
    }

    /// Result of `typeof` for values of `ty`, when it is fixed.
    fn typeof_tag(&mut self, ty: &Type) -> Option<&'static str> {
        Some(match ty {
            Type::String | Type::StrLit(_) => "string",
            Type::Number | Type::NumLit(_) => "number",
            Type::BigInt => "bigint",
            Type::Boolean | Type::BoolLit(_) => "boolean",
            Type::Symbol => "symbol",
            Type::Undefined | Type::Void => "undefined",
            Type::Enum(e) if e.numeric => "number",
            Type::Enum(_) => "string",
            Type::Fn(_) => "function",
            Type::Null | Type::Array(_) | Type::Tuple(_) => "object",
            Type::Object(_) | Type::Named(_) => {
                if self.call_signatures(ty).is_empty() && self.construct_signatures(ty).is_empty() {
                    "object"
                } else {
                    "function"
                }
            }
            _ => return None,
        })
    }

    fn narrow_instanceof(&mut self, reference: &'a Expr, ctor: &'a Expr, assume: bool) -> Facts {
        let Some(key) = self.reference_key(reference) else {
            return Vec::new();
        };
        let ctor_ty = self.reference_type(ctor);
        let instance = self.instance_type_of(&ctor_ty);
        if instance.is_opaque() {
            return Vec::new();
        }
        let current = self.reference_type(reference);
        match current {
            Type::Any => Vec::new(),
            Type::Unknown => {
                if assume {
                    vec![(key, instance)]
                } else {
                    Vec::new()
                }
            }
            _ => {
                let mut kept = Vec::new();
                for member in current.members() {
                    let is_instance = self.is_assignable(&member, &instance);
                    if assume && is_instance {
                        kept.push(member);
                    } else if assume && self.is_assignable(&instance, &member) {
                        kept.push(instance.clone());
                    } else if !assume && !is_instance {
                        kept.push(member);
                    }
                }
                if assume && kept.is_empty() {
                    kept.push(instance);
                }
                vec![(key, Type::union(kept))]
            }
        }
    }

    fn narrow_in(&mut self, name: &str, reference: &'a Expr, assume: bool) -> Facts {
        let Some(key) = self.reference_key(reference) else {
            return Vec::new();
        };
        let current = self.reference_type(reference);
        let Type::Union(members) = &current else {
            return Vec::new();
        };
        let mut kept = Vec::new();
        for member in members.iter() {
            let keep = match self.apparent_shape(member) {
                _ if member.is_opaque() => true,
                Some(shape) if shape.open || shape.string_index.is_some() => true,
                Some(shape) => match shape.prop(name) {
                    Some(prop) => assume || prop.optional,
                    None => !assume,
                },
                None => !assume,
            };
            if keep {
                kept.push(member.clone());
            }
        }
        vec![(key, Type::union(kept))]
    }

    fn narrow_is_array(&mut self, reference: &'a Expr, assume: bool) -> Facts {
        let Some(key) = self.reference_key(reference) else {
            return Vec::new();
        };
        let current = self.reference_type(reference);
        match current {
            Type::Any => Vec::new(),
            Type::Unknown if assume => vec![(key, Type::array(Type::Any))],
            Type::Unknown => Vec::new(),
            _ => {
                let is_array = |t: &Type| matches!(t, Type::Array(_) | Type::Tuple(_));
                vec![(key, current.filter(|m| is_array(m) == assume || m.is_opaque()))]
            }
        }
    }

    // =========================================================================
    // Switch
    // =========================================================================

    /// Facts for a case body reached by any of `tests`.
    pub(super) fn narrow_switch(&mut self, discriminant: &'a Expr, tests: &[&'a Expr]) -> Facts {
        let mut combined: Option<Facts> = None;
        for test in tests {
            let facts = self.narrow_case(discriminant, test, true);
            combined = Some(match combined {
                None => collapse(facts),
                Some(previous) => self.either(previous, facts),
            });
        }
        combined.unwrap_or_default()
    }

    /// Facts for the `default` clause: every case test failed.
    pub(super) fn narrow_switch_default(&mut self, discriminant: &'a Expr, tests: &[&'a Expr]) -> Facts {
        let mut facts: Facts = Vec::new();
        for test in tests {
            let next = self.with_narrowing(facts.clone(), |c| c.narrow_case(discriminant, test, false));
            facts.extend(next);
        }
        collapse(facts)
    }

    fn narrow_case(&mut self, discriminant: &'a Expr, test: &'a Expr, positive: bool) -> Facts {
        if let ExprKind::Unary { op: "typeof", expr } = &unparen(discriminant).kind {
            return match &unparen(test).kind {
                ExprKind::Str(tag) => self.narrow_typeof(expr, tag, positive),
                _ => Vec::new(),
            };
        }
        let value = self.reference_type(test);
        self.narrow_equality(discriminant, &value, positive, false)
    }
}

/// Types that a single runtime value inhabits.
fn is_unit(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Null | Type::Undefined | Type::StrLit(_) | Type::NumLit(_) | Type::BoolLit(_)
    )
}

fn is_array_is_array(callee: &Expr) -> bool {
    matches!(
        &unparen(callee).kind,
        ExprKind::Member { object, property, .. }
            if property.text == "isArray" && matches!(&object.kind, ExprKind::Ident(name) if name == "Array")
    )
}

fn concat(mut first: Facts, second: Facts) -> Facts {
    first.extend(second);
    collapse(first)
}

/// Keep the last fact per key.
fn collapse(facts: Facts) -> Facts {
    let mut out: Facts = Vec::new();
    for (key, ty) in facts {
        match out.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = ty,
            None => out.push((key, ty)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_keeps_last() {
        let key = (1, String::new());
        let facts = vec![(key.clone(), Type::String), (key.clone(), Type::Number)];
        assert_eq!(collapse(facts), vec![(key, Type::Number)]);
    }

    #[test]
    fn test_is_unit() {
        assert!(is_unit(&Type::Null));
        assert!(is_unit(&Type::str_lit("a")));
        assert!(!is_unit(&Type::String));
    }
}
