pub mod ast_fold;
mod types;

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};
use strum::AsRefStr;

use crate::error::Span;

pub use self::types::*;

/// Expanded name: namespace URI plus local part. Written as `Q{uri}local` or just `local`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Name {
    pub namespace: Option<String>,
    pub local: String,
}

impl Name {
    pub fn local<S: Into<String>>(local: S) -> Self {
        Name {
            namespace: None,
            local: local.into(),
        }
    }

    pub fn qualified<N: Into<String>, S: Into<String>>(namespace: N, local: S) -> Self {
        Name {
            namespace: Some(namespace.into()),
            local: local.into(),
        }
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        match s.strip_prefix("Q{").and_then(|rest| rest.split_once('}')) {
            Some((namespace, local)) => Name::qualified(namespace, local),
            None => Name::local(s),
        }
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Name::from(s.as_str())
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.to_string()
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "Q{{{namespace}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A function name together with the number of its parameters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionIdentifier {
    pub name: Name,
    pub arity: usize,
}

impl FunctionIdentifier {
    pub fn new<N: Into<Name>>(name: N, arity: usize) -> Self {
        FunctionIdentifier {
            name: name.into(),
            arity,
        }
    }
}

impl Display for FunctionIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.arity)
    }
}

impl fmt::Debug for FunctionIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Main module together with every library module it may import, keyed by namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub main: Module,
    #[serde(default)]
    pub libraries: BTreeMap<String, Module>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Module {
    /// Target namespace of a library module, `None` for the main module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub prolog: Prolog,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Statement>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Prolog {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ModuleImport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleImport {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum Declaration {
    Variable(VarDecl),
    Function(FuncDecl),
    Type(TypeDecl),
}

/// `declare variable $name as ty := expr;`, external when there is no initializer.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: Name,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<SequenceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FuncDecl {
    pub name: Name,
    #[serde(default)]
    pub params: Vec<FuncParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_ty: Option<SequenceType>,
    #[serde(default)]
    pub updating: bool,
    /// External functions have no body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl FuncDecl {
    pub fn identifier(&self) -> FunctionIdentifier {
        FunctionIdentifier::new(self.name.clone(), self.params.len())
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FuncParam {
    pub name: Name,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<SequenceType>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: Name,
    pub definition: TypeDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Statement {
    #[serde(flatten)]
    pub kind: StatementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize, AsRefStr)]
pub enum StatementKind {
    #[strum(serialize = "expression statement")]
    Expr(Expr),
    #[strum(serialize = "block statement")]
    Block(Vec<Statement>),
    #[strum(serialize = "variable declaration statement")]
    VarDecl {
        var: Name,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ty: Option<SequenceType>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expr: Option<Expr>,
    },
    #[strum(serialize = "assignment statement")]
    Assign { var: Name, expr: Expr },
    #[strum(serialize = "if statement")]
    If {
        condition: Expr,
        then_branch: Box<Statement>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_branch: Option<Box<Statement>>,
    },
    #[strum(serialize = "while statement")]
    While { condition: Expr, body: Box<Statement> },
    #[strum(serialize = "break statement")]
    Break,
    #[strum(serialize = "continue statement")]
    Continue,
    #[strum(serialize = "exit statement")]
    Exit { expr: Expr },
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Expr {
    #[serde(flatten)]
    pub kind: ExprKind,
    /// Stable identity used to key the annotation side tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize, AsRefStr)]
pub enum ExprKind {
    #[strum(serialize = "literal")]
    Literal(Literal),
    #[strum(serialize = "variable reference")]
    VarRef(Name),
    #[strum(serialize = "context item expression")]
    ContextItem,
    /// Sequence construction. No members is the empty sequence.
    #[strum(serialize = "comma expression")]
    Comma(Vec<Expr>),
    #[strum(serialize = "unary expression")]
    Unary { op: UnOp, expr: Box<Expr> },
    #[strum(serialize = "binary expression")]
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    #[strum(serialize = "if expression")]
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    #[strum(serialize = "switch expression")]
    Switch {
        condition: Box<Expr>,
        cases: Vec<SwitchCase>,
        default: Box<Expr>,
    },
    #[strum(serialize = "typeswitch expression")]
    TypeSwitch {
        condition: Box<Expr>,
        cases: Vec<TypeSwitchCase>,
        default: TypeSwitchDefault,
    },
    #[strum(serialize = "FLWOR expression")]
    Flwor(Flwor),
    #[strum(serialize = "quantified expression")]
    Quantified {
        quantifier: Quantifier,
        bindings: Vec<QuantifiedBinding>,
        satisfies: Box<Expr>,
    },
    #[strum(serialize = "function call")]
    FunctionCall(FunctionCall),
    #[strum(serialize = "named function reference")]
    NamedFunctionRef(FunctionIdentifier),
    #[strum(serialize = "inline function expression")]
    InlineFunction(InlineFunction),
    #[strum(serialize = "dynamic function call")]
    DynamicCall { function: Box<Expr>, args: Vec<Expr> },
    #[strum(serialize = "object lookup")]
    ObjectLookup { object: Box<Expr>, key: Box<Expr> },
    #[strum(serialize = "array lookup")]
    ArrayLookup { array: Box<Expr>, index: Box<Expr> },
    #[strum(serialize = "array unboxing")]
    ArrayUnbox(Box<Expr>),
    #[strum(serialize = "filter expression")]
    Filter { expr: Box<Expr>, predicate: Box<Expr> },
    #[strum(serialize = "object constructor")]
    Object(ObjectConstructor),
    #[strum(serialize = "array constructor")]
    Array {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Box<Expr>>,
    },
    #[strum(serialize = "instance of expression")]
    InstanceOf { expr: Box<Expr>, ty: SequenceType },
    #[strum(serialize = "treat expression")]
    Treat { expr: Box<Expr>, ty: SequenceType },
    #[strum(serialize = "castable expression")]
    Castable { expr: Box<Expr>, ty: SequenceType },
    #[strum(serialize = "cast expression")]
    Cast { expr: Box<Expr>, ty: SequenceType },
    #[strum(serialize = "delete expression")]
    Delete { target: Box<Expr>, locator: Box<Expr> },
    #[strum(serialize = "insert expression")]
    Insert {
        target: Box<Expr>,
        content: Box<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Box<Expr>>,
    },
    #[strum(serialize = "replace expression")]
    Replace {
        target: Box<Expr>,
        locator: Box<Expr>,
        replacement: Box<Expr>,
    },
    #[strum(serialize = "rename expression")]
    Rename {
        target: Box<Expr>,
        locator: Box<Expr>,
        new_name: Box<Expr>,
    },
    #[strum(serialize = "append expression")]
    Append { target: Box<Expr>, content: Box<Expr> },
    #[strum(serialize = "copy-modify-return expression")]
    Transform(Transform),
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Integer(i64),
    /// Kept in its lexical form so no precision is lost.
    Decimal(String),
    Double(f64),
    String(String),
    Boolean(bool),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Plus,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IntegerDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Concat,
    Range,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    pub tests: Vec<Expr>,
    pub result: Expr,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TypeSwitchCase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<Name>,
    pub types: Vec<SequenceType>,
    pub result: Expr,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TypeSwitchDefault {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<Name>,
    pub result: Box<Expr>,
}

/// FLWOR pipeline. Clauses are evaluated in order, the return expression last.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Flwor {
    pub clauses: Vec<Clause>,
    pub return_expr: Box<Expr>,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize, AsRefStr)]
pub enum Clause {
    #[strum(serialize = "for clause")]
    For(ForClause),
    #[strum(serialize = "let clause")]
    Let(LetClause),
    #[strum(serialize = "where clause")]
    Where(Expr),
    #[strum(serialize = "group by clause")]
    GroupBy(Vec<GroupingSpec>),
    #[strum(serialize = "order by clause")]
    OrderBy(OrderByClause),
    #[strum(serialize = "count clause")]
    Count(Name),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ForClause {
    pub var: Name,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positional: Option<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<SequenceType>,
    #[serde(default)]
    pub allowing_empty: bool,
    pub expr: Expr,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct LetClause {
    pub var: Name,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<SequenceType>,
    pub expr: Expr,
}

/// `$var as ty := expr` inside a group by clause. Without `expr` the variable is only referenced.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct GroupingSpec {
    pub var: Name,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<SequenceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OrderByClause {
    pub specs: Vec<OrderSpec>,
    #[serde(default)]
    pub stable: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    pub expr: Expr,
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub empty_greatest: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Quantifier {
    Some,
    Every,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct QuantifiedBinding {
    pub var: Name,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<SequenceType>,
    pub expr: Expr,
}

/// Static function call. A `None` argument is a `?` placeholder of a partial application.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: Name,
    #[serde(default)]
    pub args: Vec<Option<Expr>>,
}

impl FunctionCall {
    pub fn new<N: Into<Name>>(name: N, args: Vec<Expr>) -> Self {
        FunctionCall {
            name: name.into(),
            args: args.into_iter().map(Some).collect(),
        }
    }

    pub fn identifier(&self) -> FunctionIdentifier {
        FunctionIdentifier::new(self.name.clone(), self.args.len())
    }

    pub fn is_partial(&self) -> bool {
        self.args.iter().any(Option::is_none)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InlineFunction {
    #[serde(default)]
    pub params: Vec<FuncParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_ty: Option<SequenceType>,
    pub body: Box<Expr>,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum ObjectConstructor {
    Pairs(Vec<ObjectPair>),
    /// `{| expr, ... |}`
    Merge(Vec<Expr>),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ObjectPair {
    pub key: Expr,
    pub value: Expr,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CopyBinding {
    pub var: Name,
    pub expr: Expr,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Transform {
    pub copies: Vec<CopyBinding>,
    pub modify: Box<Expr>,
    pub return_expr: Box<Expr>,
}

impl Expr {
    pub fn var<N: Into<Name>>(name: N) -> Self {
        ExprKind::VarRef(name.into()).into()
    }

    pub fn call<N: Into<Name>>(name: N, args: Vec<Expr>) -> Self {
        ExprKind::FunctionCall(FunctionCall::new(name, args)).into()
    }

    pub fn empty_sequence() -> Self {
        ExprKind::Comma(vec![]).into()
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    /// Literal string key of an object lookup or object constructor pair.
    pub fn as_string_literal(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Literal(Literal::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl ExprKind {
    /// Direct sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        use ExprKind::*;
        match self {
            Literal(_) | VarRef(_) | ContextItem | NamedFunctionRef(_) => vec![],
            Comma(exprs) => exprs.iter().collect(),
            Unary { expr, .. }
            | ArrayUnbox(expr)
            | InstanceOf { expr, .. }
            | Treat { expr, .. }
            | Castable { expr, .. }
            | Cast { expr, .. } => vec![&**expr],
            Binary { left, right, .. } => vec![&**left, &**right],
            If {
                condition,
                then_branch,
                else_branch,
            } => vec![&**condition, &**then_branch, &**else_branch],
            Switch {
                condition,
                cases,
                default,
            } => std::iter::once(&**condition)
                .chain(cases.iter().flat_map(|c| c.tests.iter().chain([&c.result])))
                .chain([&**default])
                .collect(),
            TypeSwitch {
                condition,
                cases,
                default,
            } => std::iter::once(&**condition)
                .chain(cases.iter().map(|c| &c.result))
                .chain([&*default.result])
                .collect(),
            Flwor(flwor) => flwor
                .clauses
                .iter()
                .flat_map(Clause::exprs)
                .chain([&*flwor.return_expr])
                .collect(),
            Quantified {
                bindings,
                satisfies,
                ..
            } => bindings
                .iter()
                .map(|b| &b.expr)
                .chain([&**satisfies])
                .collect(),
            FunctionCall(call) => call.args.iter().flatten().collect(),
            InlineFunction(function) => vec![&*function.body],
            DynamicCall { function, args } => std::iter::once(&**function).chain(args).collect(),
            ObjectLookup { object, key } => vec![&**object, &**key],
            ArrayLookup { array, index } => vec![&**array, &**index],
            Filter { expr, predicate } => vec![&**expr, &**predicate],
            Object(ObjectConstructor::Pairs(pairs)) => {
                pairs.iter().flat_map(|p| [&p.key, &p.value]).collect()
            }
            Object(ObjectConstructor::Merge(exprs)) => exprs.iter().collect(),
            Array { content } => content.iter().map(|c| &**c).collect(),
            Delete { target, locator } => vec![&**target, &**locator],
            Insert {
                target,
                content,
                position,
            } => {
                let mut children = vec![&**target, &**content];
                children.extend(position.as_deref());
                children
            }
            Replace {
                target,
                locator,
                replacement,
            } => vec![&**target, &**locator, &**replacement],
            Rename {
                target,
                locator,
                new_name,
            } => vec![&**target, &**locator, &**new_name],
            Append { target, content } => vec![&**target, &**content],
            Transform(transform) => transform
                .copies
                .iter()
                .map(|c| &c.expr)
                .chain([&*transform.modify, &*transform.return_expr])
                .collect(),
        }
    }
}

impl ExprKind {
    /// Sequence types written in this expression, not counting sub-expressions.
    pub fn sequence_types(&self) -> Vec<&SequenceType> {
        use ExprKind::*;
        match self {
            InstanceOf { ty, .. } | Treat { ty, .. } | Castable { ty, .. } | Cast { ty, .. } => {
                vec![ty]
            }
            TypeSwitch { cases, .. } => cases.iter().flat_map(|c| &c.types).collect(),
            Flwor(flwor) => flwor
                .clauses
                .iter()
                .flat_map(|clause| -> Vec<&SequenceType> {
                    match clause {
                        Clause::For(f) => f.ty.iter().collect(),
                        Clause::Let(l) => l.ty.iter().collect(),
                        Clause::GroupBy(specs) => specs.iter().filter_map(|s| s.ty.as_ref()).collect(),
                        _ => vec![],
                    }
                })
                .collect(),
            Quantified { bindings, .. } => bindings.iter().filter_map(|b| b.ty.as_ref()).collect(),
            InlineFunction(function) => function
                .params
                .iter()
                .filter_map(|p| p.ty.as_ref())
                .chain(&function.return_ty)
                .collect(),
            _ => vec![],
        }
    }
}

impl Clause {
    /// Expressions evaluated by the clause itself.
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Clause::For(f) => vec![&f.expr],
            Clause::Let(l) => vec![&l.expr],
            Clause::Where(e) => vec![e],
            Clause::GroupBy(specs) => specs.iter().filter_map(|s| s.expr.as_ref()).collect(),
            Clause::OrderBy(o) => o.specs.iter().map(|s| &s.expr).collect(),
            Clause::Count(_) => vec![],
        }
    }
}

impl From<ExprKind> for Expr {
    fn from(kind: ExprKind) -> Self {
        Expr {
            kind,
            id: None,
            span: None,
        }
    }
}

impl From<Literal> for Expr {
    fn from(literal: Literal) -> Self {
        ExprKind::Literal(literal).into()
    }
}

impl From<StatementKind> for Statement {
    fn from(kind: StatementKind) -> Self {
        Statement {
            kind,
            id: None,
            span: None,
        }
    }
}

impl From<Expr> for Statement {
    fn from(expr: Expr) -> Self {
        let span = expr.span;
        Statement {
            span,
            ..Statement::from(StatementKind::Expr(expr))
        }
    }
}

impl Module {
    /// Main module made of a prolog and a single query expression.
    pub fn main(prolog: Prolog, body: Expr) -> Self {
        Module {
            namespace: None,
            prolog,
            body: Some(body.into()),
        }
    }

    pub fn library<S: Into<String>>(namespace: S, prolog: Prolog) -> Self {
        Module {
            namespace: Some(namespace.into()),
            prolog,
            body: None,
        }
    }

    pub fn functions(&self) -> impl Iterator<Item = &FuncDecl> {
        self.prolog
            .declarations
            .iter()
            .filter_map(Declaration::as_function)
    }
}

impl Program {
    pub fn new(main: Module) -> Self {
        Program {
            main,
            libraries: BTreeMap::new(),
        }
    }

    pub fn with_library(mut self, library: Module) -> Self {
        let namespace = library.namespace.clone().unwrap_or_default();
        self.libraries.insert(namespace, library);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_yaml::from_str;

    use super::*;

    #[test]
    fn test_names() {
        let name = Name::from("Q{http://example.com}f");
        assert_eq!(name.namespace.as_deref(), Some("http://example.com"));
        assert_eq!(name.local, "f");
        assert_eq!(name.to_string(), "Q{http://example.com}f");

        let f = FunctionIdentifier::new("count", 1);
        assert_eq!(f.to_string(), "count#1");
    }

    #[test]
    fn test_flwor_from_yaml() {
        let expr: Expr = from_str(
            r##"
            Flwor:
              clauses:
                - Let:
                    var: x
                    ty: integer
                    expr:
                      Literal:
                        Integer: 1
              return_expr:
                VarRef: x
            "##,
        )
        .unwrap();

        let flwor = expr.kind.into_flwor().unwrap();
        let clause = flwor.clauses[0].as_let().unwrap();
        assert_eq!(clause.var, Name::local("x"));
        assert_eq!(clause.ty, Some(SequenceType::integer()));
        assert_eq!(flwor.return_expr.kind, ExprKind::VarRef(Name::local("x")));
    }

    #[test]
    fn test_partial_application() {
        let call = FunctionCall {
            name: "f".into(),
            args: vec![Some(Literal::Integer(1).into()), None],
        };
        assert!(call.is_partial());
        assert_eq!(call.identifier(), FunctionIdentifier::new("f", 2));
    }

    #[test]
    fn test_unit_variants() {
        let block: Statement = from_str(
            r#"
            Block:
              - Break: null
              - Continue: null
              - Expr:
                  ContextItem: null
            "#,
        )
        .unwrap();

        let statements = block.kind.as_block().unwrap();
        assert!(statements[0].kind.is_break());
        assert!(statements[1].kind.is_continue());
        let expr = statements[2].kind.as_expr().unwrap();
        assert!(expr.kind.is_context_item());

        let yaml = serde_yaml::to_string(&block).unwrap();
        assert_eq!(from_str::<Statement>(&yaml).unwrap(), block);
    }
}
