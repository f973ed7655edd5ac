//! Semantic types of the builtin checker.
//!
//! Types are cheap to clone (`Rc` inside) and are only ever used on the
//! thread that checks one unit.

use std::fmt;
use std::rc::Rc;

/// Index of a named declaration (interface or class) in the checker's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclRef {
    Interface(usize),
    /// Instance side of a class.
    Class(usize),
    /// Constructor side of a class (`typeof C`).
    ClassStatic(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Any,
    Unknown,
    Never,
    Void,
    Undefined,
    Null,
    Number,
    String,
    Boolean,
    BigInt,
    Symbol,
    /// The `object` keyword.
    NonPrimitive,
    StrLit(Rc<str>),
    NumLit(f64),
    BoolLit(bool),
    Array(Rc<Type>),
    Tuple(Rc<[Type]>),
    Union(Rc<[Type]>),
    Fn(Rc<Signature>),
    Object(Rc<Shape>),
    /// Interface or class instance type, expanded on demand.
    Named(Rc<NamedType>),
    /// Unresolved type parameter.
    Param(Rc<str>),
    /// Member of an enum.
    Enum(Rc<EnumType>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedType {
    pub name: Rc<str>,
    pub decl: DeclRef,
    pub args: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: Rc<str>,
    /// All members have numeric values.
    pub numeric: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamType {
    pub name: Rc<str>,
    pub ty: Type,
    pub optional: bool,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub type_params: Vec<Rc<str>>,
    pub params: Vec<ParamType>,
    pub ret: Type,
}

impl Signature {
    /// Number of arguments a call must pass.
    pub fn min_args(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| !p.optional && !p.rest)
            .count()
    }

    /// Maximum number of arguments, `None` with a rest parameter.
    pub fn max_args(&self) -> Option<usize> {
        if self.params.iter().any(|p| p.rest) {
            None
        } else {
            Some(self.params.len())
        }
    }

    /// Expected type of the argument at `index`.
    pub fn param_type(&self, index: usize) -> Option<Type> {
        if let Some(param) = self.params.get(index)
            && !param.rest
        {
            return Some(param.ty.clone());
        }
        let rest = self.params.last().filter(|p| p.rest)?;
        Some(match &rest.ty {
            Type::Array(elem) => (**elem).clone(),
            Type::Tuple(elems) => {
                let offset = index + 1 - self.params.len();
                elems.get(offset).cloned().unwrap_or(Type::Any)
            }
            _ => Type::Any,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: Rc<str>,
    pub ty: Type,
    pub optional: bool,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Shape {
    pub props: Vec<Property>,
    pub calls: Vec<Rc<Signature>>,
    pub constructs: Vec<Rc<Signature>>,
    pub string_index: Option<Type>,
    pub number_index: Option<Type>,
    /// Display name (`typeof Point`) instead of the structural form.
    pub name: Option<Rc<str>>,
    /// Members beyond those listed may exist (namespaces, partial models).
    pub open: bool,
}

impl Shape {
    pub fn prop(&self, name: &str) -> Option<&Property> {
        self.props.iter().find(|p| &*p.name == name)
    }
}

impl Type {
    pub fn str_lit(s: &str) -> Type {
        Type::StrLit(Rc::from(s))
    }

    pub fn array(elem: Type) -> Type {
        Type::Array(Rc::new(elem))
    }

    /// Build a normalized union: flattened, deduplicated and ordered the
    /// way diagnostics display it.
    pub fn union(members: impl IntoIterator<Item = Type>) -> Type {
        let mut flat: Vec<Type> = Vec::new();
        for member in members {
            match member {
                Type::Union(inner) => {
                    for t in inner.iter() {
                        push_unique(&mut flat, t.clone());
                    }
                }
                Type::Never => {}
                other => push_unique(&mut flat, other),
            }
        }

        if flat.iter().any(|t| matches!(t, Type::Any)) {
            return Type::Any;
        }
        if flat.iter().any(|t| matches!(t, Type::Unknown)) {
            return Type::Unknown;
        }

        // Literals absorbed by their primitive; `true | false` is `boolean`.
        let has = |flat: &[Type], t: &Type| flat.iter().any(|x| x == t);
        if has(&flat, &Type::BoolLit(true)) && has(&flat, &Type::BoolLit(false)) {
            flat.retain(|t| !matches!(t, Type::BoolLit(_)));
            push_unique(&mut flat, Type::Boolean);
        }
        let snapshot = flat.clone();
        flat.retain(|t| match t {
            Type::StrLit(_) => !has(&snapshot, &Type::String),
            Type::NumLit(_) => !has(&snapshot, &Type::Number),
            Type::BoolLit(_) => !has(&snapshot, &Type::Boolean),
            _ => true,
        });

        flat.sort_by_key(union_rank);
        match flat.len() {
            0 => Type::Never,
            1 => flat.remove(0),
            _ => Type::Union(flat.into()),
        }
    }

    /// Members of a union, or the type itself.
    pub fn members(&self) -> Vec<Type> {
        match self {
            Type::Union(members) => members.to_vec(),
            other => vec![other.clone()],
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Type::Null | Type::Undefined | Type::Void)
    }

    pub fn has_null(&self) -> bool {
        self.members().iter().any(|t| matches!(t, Type::Null))
    }

    pub fn has_undefined(&self) -> bool {
        self.members()
            .iter()
            .any(|t| matches!(t, Type::Undefined | Type::Void))
    }

    /// Remove `null` and `undefined` from a union.
    pub fn non_nullable(&self) -> Type {
        match self {
            Type::Union(members) => Type::union(members.iter().filter(|t| !t.is_nullish()).cloned()),
            other => other.clone(),
        }
    }

    /// Keep union members matching `keep`.
    pub fn filter(&self, keep: impl Fn(&Type) -> bool) -> Type {
        Type::union(self.members().into_iter().filter(|t| keep(t)))
    }

    /// Contains `any`, `unknown` or an unresolved parameter somewhere at the top level.
    pub fn is_opaque(&self) -> bool {
        self.members()
            .iter()
            .any(|t| matches!(t, Type::Any | Type::Unknown | Type::Param(_)))
    }

    pub fn is_number_like(&self) -> bool {
        match self {
            Type::Number | Type::NumLit(_) | Type::Any => true,
            Type::Enum(e) => e.numeric,
            Type::Union(members) => members.iter().all(|t| t.is_number_like()),
            _ => false,
        }
    }

    pub fn is_string_like(&self) -> bool {
        match self {
            Type::String | Type::StrLit(_) => true,
            Type::Enum(e) => !e.numeric,
            Type::Union(members) => members.iter().all(|t| t.is_string_like()),
            _ => false,
        }
    }

    pub fn is_bigint_like(&self) -> bool {
        match self {
            Type::BigInt => true,
            Type::Union(members) => members.iter().all(|t| t.is_bigint_like()),
            _ => false,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Number
                | Type::String
                | Type::Boolean
                | Type::BigInt
                | Type::Symbol
                | Type::StrLit(_)
                | Type::NumLit(_)
                | Type::BoolLit(_)
                | Type::Enum(_)
        )
    }

    /// Literal types replaced by their primitive.
    pub fn widen(&self) -> Type {
        match self {
            Type::StrLit(_) => Type::String,
            Type::NumLit(_) => Type::Number,
            Type::BoolLit(_) => Type::Boolean,
            Type::Union(members) => Type::union(members.iter().map(Type::widen)),
            other => other.clone(),
        }
    }

    /// Whether a literal type of the same primitive occurs in `self`.
    pub fn has_literal(&self) -> bool {
        self.members()
            .iter()
            .any(|t| matches!(t, Type::StrLit(_) | Type::NumLit(_) | Type::BoolLit(_)))
    }

    /// Type as it appears in a diagnostic about assigning to `target`:
    /// literals are widened unless the target itself mentions literals.
    pub fn for_message(&self, target: &Type) -> Type {
        if target.has_literal() || matches!(target, Type::Enum(_)) {
            self.clone()
        } else {
            self.widen()
        }
    }

    /// Apparent interface name of a primitive (`Number` for `number`).
    pub fn apparent_name(&self) -> Option<&'static str> {
        match self {
            Type::Number | Type::NumLit(_) => Some("Number"),
            Type::String | Type::StrLit(_) => Some("String"),
            Type::Boolean | Type::BoolLit(_) => Some("Boolean"),
            Type::BigInt => Some("BigInt"),
            Type::Symbol => Some("Symbol"),
            Type::Fn(_) => Some("Function"),
            Type::Enum(e) if e.numeric => Some("Number"),
            Type::Enum(_) => Some("String"),
            _ => None,
        }
    }

    /// Replace type parameters by their bindings.
    pub fn substitute(&self, lookup: &dyn Fn(&str) -> Option<Type>) -> Type {
        match self {
            Type::Param(name) => lookup(name).unwrap_or_else(|| self.clone()),
            Type::Array(elem) => Type::array(elem.substitute(lookup)),
            Type::Tuple(elems) => Type::Tuple(elems.iter().map(|t| t.substitute(lookup)).collect()),
            Type::Union(members) => Type::union(members.iter().map(|t| t.substitute(lookup))),
            Type::Fn(sig) => Type::Fn(Rc::new(sig.substitute(lookup))),
            Type::Named(named) if !named.args.is_empty() => Type::Named(Rc::new(NamedType {
                name: named.name.clone(),
                decl: named.decl,
                args: named.args.iter().map(|t| t.substitute(lookup)).collect(),
            })),
            Type::Object(shape) => Type::Object(Rc::new(Shape {
                props: shape
                    .props
                    .iter()
                    .map(|p| Property {
                        ty: p.ty.substitute(lookup),
                        ..p.clone()
                    })
                    .collect(),
                calls: shape.calls.iter().map(|s| Rc::new(s.substitute(lookup))).collect(),
                constructs: shape
                    .constructs
                    .iter()
                    .map(|s| Rc::new(s.substitute(lookup)))
                    .collect(),
                string_index: shape.string_index.as_ref().map(|t| t.substitute(lookup)),
                number_index: shape.number_index.as_ref().map(|t| t.substitute(lookup)),
                name: shape.name.clone(),
                open: shape.open,
            })),
            other => other.clone(),
        }
    }
}

impl Signature {
    /// Substitute free parameters, leaving the signature's own parameters alone.
    pub fn substitute(&self, lookup: &dyn Fn(&str) -> Option<Type>) -> Signature {
        let own = &self.type_params;
        let inner = |name: &str| {
            if own.iter().any(|p| &**p == name) {
                None
            } else {
                lookup(name)
            }
        };
        Signature {
            type_params: self.type_params.clone(),
            params: self
                .params
                .iter()
                .map(|p| ParamType {
                    ty: p.ty.substitute(&inner),
                    ..p.clone()
                })
                .collect(),
            ret: self.ret.substitute(&inner),
        }
    }
}

fn push_unique(list: &mut Vec<Type>, t: Type) {
    if !list.contains(&t) {
        list.push(t);
    }
}

/// Display order of union members: primitives first, nullish last.
fn union_rank(t: &Type) -> u8 {
    match t {
        Type::String => 0,
        Type::Number => 1,
        Type::BigInt => 2,
        Type::Boolean => 3,
        Type::Symbol => 4,
        Type::Void => 6,
        Type::Undefined => 7,
        Type::Null => 8,
        _ => 5,
    }
}

// =============================================================================
// Display
// =============================================================================

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn write_params(f: &mut fmt::Formatter<'_>, params: &[ParamType]) -> fmt::Result {
    f.write_str("(")?;
    for (i, p) in params.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        if p.rest {
            f.write_str("...")?;
        }
        write!(f, "{}{}: {}", p.name, if p.optional { "?" } else { "" }, p.ty)?;
    }
    f.write_str(")")
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.type_params.is_empty() {
            write!(f, "<{}>", self.type_params.join(", "))?;
        }
        write_params(f, &self.params)?;
        write!(f, " => {}", self.ret)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => f.write_str("any"),
            Type::Unknown => f.write_str("unknown"),
            Type::Never => f.write_str("never"),
            Type::Void => f.write_str("void"),
            Type::Undefined => f.write_str("undefined"),
            Type::Null => f.write_str("null"),
            Type::Number => f.write_str("number"),
            Type::String => f.write_str("string"),
            Type::Boolean => f.write_str("boolean"),
            Type::BigInt => f.write_str("bigint"),
            Type::Symbol => f.write_str("symbol"),
            Type::NonPrimitive => f.write_str("object"),
            Type::StrLit(s) => write!(f, "\"{s}\""),
            Type::NumLit(n) => f.write_str(&format_number(*n)),
            Type::BoolLit(b) => write!(f, "{b}"),
            Type::Array(elem) => match &**elem {
                Type::Union(_) | Type::Fn(_) => write!(f, "({elem})[]"),
                _ => write!(f, "{elem}[]"),
            },
            Type::Tuple(elems) => {
                f.write_str("[")?;
                for (i, t) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{t}")?;
                }
                f.write_str("]")
            }
            Type::Union(members) => {
                for (i, t) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    match t {
                        Type::Fn(_) => write!(f, "({t})")?,
                        _ => write!(f, "{t}")?,
                    }
                }
                Ok(())
            }
            Type::Fn(sig) => write!(f, "{sig}"),
            Type::Object(shape) => {
                if let Some(name) = &shape.name {
                    return f.write_str(name);
                }
                if shape.props.is_empty()
                    && shape.calls.len() == 1
                    && shape.constructs.is_empty()
                    && shape.string_index.is_none()
                {
                    return write!(f, "{}", shape.calls[0]);
                }
                if shape.props.is_empty()
                    && shape.calls.is_empty()
                    && shape.constructs.is_empty()
                    && shape.string_index.is_none()
                    && shape.number_index.is_none()
                {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for sig in &shape.calls {
                    write_params(f, &sig.params)?;
                    write!(f, ": {}; ", sig.ret)?;
                }
                if let Some(t) = &shape.string_index {
                    write!(f, "[x: string]: {t}; ")?;
                }
                if let Some(t) = &shape.number_index {
                    write!(f, "[x: number]: {t}; ")?;
                }
                for p in &shape.props {
                    if p.readonly {
                        f.write_str("readonly ")?;
                    }
                    write!(f, "{}{}: {}; ", p.name, if p.optional { "?" } else { "" }, p.ty)?;
                }
                f.write_str("}")
            }
            Type::Named(named) => {
                f.write_str(&named.name)?;
                if !named.args.is_empty() {
                    f.write_str("<")?;
                    for (i, t) in named.args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{t}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            Type::Param(name) => f.write_str(name),
            Type::Enum(e) => f.write_str(&e.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_normalization() {
        let t = Type::union([Type::Undefined, Type::Number, Type::String]);
        assert_eq!(t.to_string(), "string | number | undefined");

        let t = Type::union([Type::BoolLit(true), Type::BoolLit(false)]);
        assert_eq!(t, Type::Boolean);

        let t = Type::union([Type::str_lit("a"), Type::String]);
        assert_eq!(t, Type::String);

        let t = Type::union([Type::Number, Type::Any]);
        assert_eq!(t, Type::Any);

        let t = Type::union([Type::Number]);
        assert_eq!(t, Type::Number);
    }

    #[test]
    fn test_display() {
        let shape = Shape {
            props: vec![Property {
                name: "a".into(),
                ty: Type::Number,
                optional: false,
                readonly: false,
            }],
            ..Shape::default()
        };
        assert_eq!(Type::Object(Rc::new(shape)).to_string(), "{ a: number; }");
        assert_eq!(
            Type::array(Type::union([Type::String, Type::Number])).to_string(),
            "(string | number)[]"
        );
        let f = Type::Fn(Rc::new(Signature {
            type_params: Vec::new(),
            params: vec![ParamType {
                name: "x".into(),
                ty: Type::Number,
                optional: false,
                rest: false,
            }],
            ret: Type::Void,
        }));
        assert_eq!(f.to_string(), "(x: number) => void");
        assert_eq!(Type::NumLit(3.0).to_string(), "3");
        assert_eq!(Type::str_lit("hi").to_string(), "\"hi\"");
    }

    #[test]
    fn test_widen_for_message() {
        let lit = Type::str_lit("s");
        assert_eq!(lit.for_message(&Type::Number), Type::String);
        let target = Type::union([Type::str_lit("a"), Type::str_lit("b")]);
        assert_eq!(lit.for_message(&target), lit);
    }

    #[test]
    fn test_signature_arity() {
        let sig = Signature {
            type_params: Vec::new(),
            params: vec![
                ParamType {
                    name: "a".into(),
                    ty: Type::Number,
                    optional: false,
                    rest: false,
                },
                ParamType {
                    name: "b".into(),
                    ty: Type::Number,
                    optional: true,
                    rest: false,
                },
            ],
            ret: Type::Void,
        };
        assert_eq!(sig.min_args(), 1);
        assert_eq!(sig.max_args(), Some(2));
        assert_eq!(sig.param_type(1), Some(Type::Number));
        assert_eq!(sig.param_type(2), None);
    }
}
