//! Syntax tree for the checked TypeScript subset.

/// 1-indexed unit-local position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

/// A name with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct Name {
    pub text: String,
    pub pos: Pos,
}

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// Type reference or keyword (`number`, `Foo<T>`, `NS.Foo`).
    Named {
        name: String,
        args: Vec<TypeExpr>,
        pos: Pos,
    },
    StrLit(String),
    NumLit(String),
    BoolLit(bool),
    Array(Box<TypeExpr>),
    Tuple(Vec<TypeExpr>),
    Union(Vec<TypeExpr>),
    Intersection(Vec<TypeExpr>),
    Function {
        type_params: Vec<String>,
        params: Vec<ParamSig>,
        ret: Box<TypeExpr>,
    },
    Object(Vec<TypeMember>),
    /// `typeof x.y`
    Typeof(Vec<String>, Pos),
    /// `keyof T`
    Keyof(Box<TypeExpr>),
    /// Type predicate `x is T` (boolean at the value level).
    Predicate,
    /// Constructs outside the subset (mapped, conditional, indexed access).
    Opaque,
}

/// A parameter in a type-level signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSig {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub optional: bool,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeMember {
    Property {
        name: String,
        ty: Option<TypeExpr>,
        optional: bool,
        readonly: bool,
    },
    Method {
        name: String,
        optional: bool,
        type_params: Vec<String>,
        params: Vec<ParamSig>,
        ret: Option<TypeExpr>,
    },
    Call {
        type_params: Vec<String>,
        params: Vec<ParamSig>,
        ret: Option<TypeExpr>,
    },
    Construct {
        type_params: Vec<String>,
        params: Vec<ParamSig>,
        ret: Option<TypeExpr>,
    },
    Index {
        key: TypeExpr,
        ty: TypeExpr,
    },
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(String),
    BigInt,
    Str(String),
    Template(Vec<Expr>),
    TaggedTemplate {
        tag: Box<Expr>,
        exprs: Vec<Expr>,
    },
    Regex,
    Bool(bool),
    Null,
    This,
    Super,
    Ident(String),
    Array(Vec<Option<Expr>>),
    Object(Vec<Prop>),
    Function(Box<Function>),
    Class(Box<Class>),
    Unary {
        op: &'static str,
        expr: Box<Expr>,
    },
    Update {
        op: &'static str,
        expr: Box<Expr>,
    },
    Binary {
        op: &'static str,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: &'static str,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: Name,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    As {
        expr: Box<Expr>,
        ty: TypeExpr,
    },
    Satisfies {
        expr: Box<Expr>,
        ty: TypeExpr,
    },
    NonNull(Box<Expr>),
    Spread(Box<Expr>),
    Await(Box<Expr>),
    Yield(Option<Box<Expr>>),
    Sequence(Vec<Expr>),
    Paren(Box<Expr>),
    /// Placeholder after a syntax error.
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    Name(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    KeyValue {
        key: PropKey,
        value: Expr,
        pos: Pos,
    },
    Shorthand(Name),
    Method {
        key: PropKey,
        func: Function,
        kind: MethodKind,
        pos: Pos,
    },
    Spread(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Getter,
    Setter,
}

// =============================================================================
// Functions, classes, patterns
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(Name),
    Object {
        props: Vec<(String, Pattern, Option<Expr>)>,
        rest: Option<Box<Pattern>>,
        pos: Pos,
    },
    Array {
        elems: Vec<Option<(Pattern, Option<Expr>)>>,
        rest: Option<Box<Pattern>>,
        pos: Pos,
    },
}

impl Pattern {
    pub fn pos(&self) -> Pos {
        match self {
            Pattern::Ident(name) => name.pos,
            Pattern::Object { pos, .. } | Pattern::Array { pos, .. } => *pos,
        }
    }

    /// Every identifier bound by the pattern.
    pub fn names(&self) -> Vec<&Name> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a Name>) {
        match self {
            Pattern::Ident(name) => out.push(name),
            Pattern::Object { props, rest, .. } => {
                for (_, pattern, _) in props {
                    pattern.collect_names(out);
                }
                if let Some(rest) = rest {
                    rest.collect_names(out);
                }
            }
            Pattern::Array { elems, rest, .. } => {
                for (pattern, _) in elems.iter().flatten() {
                    pattern.collect_names(out);
                }
                if let Some(rest) = rest {
                    rest.collect_names(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub pattern: Pattern,
    pub ty: Option<TypeExpr>,
    pub default: Option<Expr>,
    pub optional: bool,
    pub rest: bool,
    /// Constructor parameter property (`public x: number`).
    pub property: bool,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
    /// Overload signature or ambient declaration.
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Option<Name>,
    pub type_params: Vec<String>,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub body: FunctionBody,
    pub is_arrow: bool,
    pub is_async: bool,
    pub is_generator: bool,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Property {
        name: Name,
        ty: Option<TypeExpr>,
        init: Option<Expr>,
        is_static: bool,
        optional: bool,
        definite: bool,
        readonly: bool,
    },
    Method {
        name: Name,
        func: Function,
        is_static: bool,
        kind: MethodKind,
        optional: bool,
    },
    Constructor(Function),
    Index,
    StaticBlock(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: Option<Name>,
    pub type_params: Vec<String>,
    pub extends: Option<Expr>,
    pub implements: Vec<TypeExpr>,
    pub members: Vec<ClassMember>,
    pub is_abstract: bool,
    pub pos: Pos,
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub pattern: Pattern,
    pub ty: Option<TypeExpr>,
    pub init: Option<Expr>,
    pub definite: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: Name,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForHead {
    Var(VarKind, Pattern),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Var(VarKind, Vec<VarDecl>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Var {
        kind: VarKind,
        decls: Vec<VarDecl>,
        declare: bool,
    },
    Function(Function),
    Class(Class),
    Interface {
        name: Name,
        type_params: Vec<String>,
        extends: Vec<TypeExpr>,
        members: Vec<TypeMember>,
    },
    TypeAlias {
        name: Name,
        type_params: Vec<String>,
        ty: TypeExpr,
    },
    Enum {
        name: Name,
        members: Vec<EnumMember>,
    },
    Import {
        bindings: Vec<Name>,
    },
    /// `export { a, b as c }` / `export * from "x"`.
    ExportNames(Vec<Name>),
    ExportDefault(Expr),
    /// `namespace N { }` / `declare module "x" { }` / `declare global { }`.
    Namespace {
        name: Option<Name>,
        body: Vec<Stmt>,
    },
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        test: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForInOf {
        head: ForHead,
        iter: Expr,
        body: Box<Stmt>,
        of: bool,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Return(Option<Expr>),
    Throw(Expr),
    Break,
    Continue,
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Try {
        block: Vec<Stmt>,
        param: Option<(Pattern, Option<TypeExpr>)>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Labeled(Box<Stmt>),
    Empty,
}

/// A parsed unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
    /// Contains a top-level `import` or `export`.
    pub is_module: bool,
    /// Parsing stopped at the nesting limit; `body` is incomplete.
    pub too_deep: bool,
}
