//! Detection of unused let bindings and object keys.
//!
//! Expressions are visited with the usage their result is subject to, and
//! report back the usage they make of free variables. Both are expressed as a
//! [ReferenceMap].

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::warn;

use super::Context;
use crate::ast::*;
use crate::error::Span;

const LOCK_NAMESPACE: &str = "urn:jsoniq-compiler:lock";
const KEY_NAMESPACE: &str = "urn:jsoniq-compiler:key";

/// Nested usage of names: for each variable (or object key), the usage made of
/// its value. An empty nested map means the value is used as a whole.
///
/// The lock entry marks usage that cannot be tracked, because the value flows
/// into an opaque built-in function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMap(BTreeMap<Name, ReferenceMap>);

impl ReferenceMap {
    pub fn new() -> Self {
        ReferenceMap::default()
    }

    pub fn singleton(name: Name, usage: ReferenceMap) -> Self {
        ReferenceMap(BTreeMap::from([(name, usage)]))
    }

    pub fn lock() -> Self {
        ReferenceMap::singleton(lock_name(), ReferenceMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_locked(&self) -> bool {
        self.0.contains_key(&lock_name())
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &Name) -> Option<ReferenceMap> {
        self.0.remove(name)
    }

    pub fn insert_lock(&mut self) {
        self.0.insert(lock_name(), ReferenceMap::new());
    }

    fn remove_lock(&mut self) {
        self.0.remove(&lock_name());
    }

    /// Marks `name` as used as a whole.
    pub fn insert_opaque(&mut self, name: Name) {
        self.0.insert(name, ReferenceMap::new());
    }

    /// Usage of the member `name`. The lock carries over.
    pub fn narrow(&self, name: &Name) -> ReferenceMap {
        let mut narrowed = self.0.get(name).cloned().unwrap_or_default();
        if self.is_locked() {
            narrowed.insert_lock();
        }
        narrowed
    }

    /// Unions the usage of two references to the same names. Whole usage wins
    /// over partial usage.
    pub fn merge(&mut self, other: ReferenceMap) {
        for (name, usage) in other.0 {
            match self.0.get_mut(&name) {
                None => {
                    self.0.insert(name, usage);
                }
                Some(existing) if existing.is_empty() => {}
                Some(existing) if usage.is_empty() => existing.0.clear(),
                Some(existing) => existing.merge(usage),
            }
        }
    }
}

fn lock_name() -> Name {
    Name::qualified(LOCK_NAMESPACE, "lock")
}

fn key_name(key: &str) -> Name {
    Name::qualified(KEY_NAMESPACE, key)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// The binding clause or the object key
    pub node: Option<usize>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DiagnosticKind {
    UnusedVariable { name: Name },
    UnusedObjectKey { key: String },
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::UnusedVariable { name } => {
                write!(f, "variable `${name}` is bound but never used")
            }
            DiagnosticKind::UnusedObjectKey { key } => {
                write!(f, "object key \"{key}\" is never read")
            }
        }
    }
}

/// Finds let bindings whose variable is never referenced and object keys that
/// are never looked up.
///
/// Findings are logged, recorded in the context and returned.
pub fn detect_dead_code(program: &Program, context: &mut Context) -> Vec<Diagnostic> {
    let mut detector = DeadCodeDetector {
        context: &mut *context,
        diagnostics: Vec::new(),
    };

    detector.visit_module(&program.main);
    for library in program.libraries.values() {
        detector.visit_module(library);
    }

    detector.diagnostics
}

struct DeadCodeDetector<'a> {
    context: &'a mut Context,
    diagnostics: Vec<Diagnostic>,
}

impl DeadCodeDetector<'_> {
    fn report(&mut self, kind: DiagnosticKind, node: Option<usize>, span: Option<Span>) {
        let diagnostic = Diagnostic { kind, node, span };
        warn!(node = ?node, span = ?span, "{diagnostic}");

        if let Some(id) = node {
            self.context.unreferenced.insert(id);
        }
        self.diagnostics.push(diagnostic);
    }

    fn visit_module(&mut self, module: &Module) {
        for decl in &module.prolog.declarations {
            match decl {
                Declaration::Variable(VarDecl {
                    expr: Some(expr), ..
                }) => {
                    self.visit_expr(expr, &ReferenceMap::new());
                }
                Declaration::Function(FuncDecl {
                    body: Some(body), ..
                }) => {
                    self.visit_expr(body, &ReferenceMap::new());
                }
                _ => {}
            }
        }
        if let Some(body) = &module.body {
            self.visit_statement(body, ReferenceMap::new());
        }
    }

    /// Takes the references made after the statement, returns those made from it on.
    fn visit_statement(&mut self, statement: &Statement, after: ReferenceMap) -> ReferenceMap {
        let mut refs = after;
        match &statement.kind {
            StatementKind::Expr(expr) => refs.merge(self.visit_expr(expr, &ReferenceMap::new())),
            StatementKind::Block(statements) => {
                for statement in statements.iter().rev() {
                    refs = self.visit_statement(statement, refs);
                }
            }
            StatementKind::VarDecl { var, expr, .. } => {
                refs.remove(var);
                if let Some(expr) = expr {
                    refs.merge(self.visit_expr(expr, &ReferenceMap::new()));
                }
            }
            StatementKind::Assign { expr, .. } | StatementKind::Exit { expr } => {
                refs.merge(self.visit_expr(expr, &ReferenceMap::new()));
            }
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                refs.merge(self.visit_expr(condition, &ReferenceMap::new()));
                refs.merge(self.visit_statement(then_branch, ReferenceMap::new()));
                if let Some(else_branch) = else_branch {
                    refs.merge(self.visit_statement(else_branch, ReferenceMap::new()));
                }
            }
            StatementKind::While { condition, body } => {
                refs.merge(self.visit_expr(condition, &ReferenceMap::new()));
                refs.merge(self.visit_statement(body, ReferenceMap::new()));
            }
            StatementKind::Break | StatementKind::Continue => {}
        }
        refs
    }

    /// Visits each expression with its result used as a whole.
    fn visit_opaque<'e, I: IntoIterator<Item = &'e Expr>>(&mut self, exprs: I) -> ReferenceMap {
        let mut refs = ReferenceMap::new();
        for expr in exprs {
            refs.merge(self.visit_expr(expr, &ReferenceMap::new()));
        }
        refs
    }

    fn visit_expr(&mut self, expr: &Expr, usage: &ReferenceMap) -> ReferenceMap {
        match &expr.kind {
            ExprKind::VarRef(name) => ReferenceMap::singleton(name.clone(), usage.clone()),

            ExprKind::ObjectLookup { object, key } => match key.as_string_literal() {
                Some(key) => {
                    let usage = ReferenceMap::singleton(key_name(key), usage.clone());
                    self.visit_expr(object, &usage)
                }
                None => self.visit_opaque(expr.kind.children()),
            },

            // the result is the value of some operand, which inherits the usage
            ExprKind::Comma(members) => {
                let mut refs = ReferenceMap::new();
                for member in members {
                    refs.merge(self.visit_expr(member, usage));
                }
                refs
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut refs = self.visit_opaque([&**condition]);
                refs.merge(self.visit_expr(then_branch, usage));
                refs.merge(self.visit_expr(else_branch, usage));
                refs
            }
            ExprKind::Switch {
                condition,
                cases,
                default,
            } => {
                let mut refs = self.visit_opaque([&**condition]);
                for case in cases {
                    refs.merge(self.visit_opaque(&case.tests));
                    refs.merge(self.visit_expr(&case.result, usage));
                }
                refs.merge(self.visit_expr(default, usage));
                refs
            }
            ExprKind::TypeSwitch {
                condition,
                cases,
                default,
            } => {
                let mut refs = self.visit_opaque([&**condition]);
                let branches = cases
                    .iter()
                    .map(|c| (c.var.as_ref(), &c.result))
                    .chain([(default.var.as_ref(), &*default.result)]);
                for (var, result) in branches {
                    let mut branch = self.visit_expr(result, usage);
                    if let Some(var) = var {
                        branch.remove(var);
                    }
                    refs.merge(branch);
                }
                refs
            }
            ExprKind::Treat { expr: inner, .. } => self.visit_expr(inner, usage),
            ExprKind::Filter { expr: inner, predicate }
                if matches!(predicate.kind, ExprKind::Literal(Literal::Integer(_))) =>
            {
                self.visit_expr(inner, usage)
            }

            ExprKind::Flwor(flwor) => self.visit_flwor(flwor, usage),

            ExprKind::FunctionCall(call) if self.context.is_builtin(expr.id, &call.identifier()) => {
                let mut locked = usage.clone();
                locked.insert_lock();

                let mut refs = ReferenceMap::new();
                for arg in call.args.iter().flatten() {
                    refs.merge(self.visit_expr(arg, &locked));
                }
                refs.remove_lock();
                refs
            }

            ExprKind::Object(ObjectConstructor::Pairs(pairs))
                if pairs.iter().all(|p| p.key.as_string_literal().is_some()) =>
            {
                let mut refs = ReferenceMap::new();
                for pair in pairs {
                    let key = key_name(pair.key.as_string_literal().unwrap_or_default());
                    if !usage.is_empty() && !usage.is_locked() && !usage.contains(&key) {
                        let unused = DiagnosticKind::UnusedObjectKey {
                            key: key.local.clone(),
                        };
                        self.report(unused, pair.key.id, pair.key.span.or(expr.span));
                        continue;
                    }
                    refs.merge(self.visit_expr(&pair.value, &usage.narrow(&key)));
                }
                refs
            }

            ExprKind::Quantified {
                bindings,
                satisfies,
                ..
            } => {
                let mut refs = self.visit_opaque([&**satisfies]);
                for binding in bindings.iter().rev() {
                    refs.remove(&binding.var);
                    refs.merge(self.visit_opaque([&binding.expr]));
                }
                refs
            }
            ExprKind::InlineFunction(function) => {
                let mut refs = self.visit_opaque([&*function.body]);
                for param in &function.params {
                    refs.remove(&param.name);
                }
                refs
            }
            ExprKind::Transform(transform) => {
                let mut refs = self.visit_opaque([&*transform.modify, &*transform.return_expr]);
                for copy in transform.copies.iter().rev() {
                    refs.remove(&copy.var);
                    refs.merge(self.visit_opaque([&copy.expr]));
                }
                refs
            }

            _ => self.visit_opaque(expr.kind.children()),
        }
    }

    /// Clauses are visited last to first, each seeing the references made by
    /// the clauses after it.
    fn visit_flwor(&mut self, flwor: &Flwor, usage: &ReferenceMap) -> ReferenceMap {
        let mut refs = self.visit_expr(&flwor.return_expr, usage);
        if usage.is_locked() {
            refs.insert_lock();
        }

        for clause in flwor.clauses.iter().rev() {
            match clause {
                Clause::Let(LetClause { var, expr, .. }) => {
                    if !refs.contains(var) && !refs.is_locked() {
                        let unused = DiagnosticKind::UnusedVariable { name: var.clone() };
                        self.report(unused, expr.id, expr.span);
                        continue;
                    }
                    let narrowed = refs.remove(var).unwrap_or_default();
                    refs.merge(self.visit_expr(expr, &narrowed));
                }
                Clause::For(ForClause {
                    var,
                    positional,
                    expr,
                    ..
                }) => {
                    let narrowed = refs.remove(var).unwrap_or_default();
                    if let Some(positional) = positional {
                        refs.remove(positional);
                    }
                    refs.merge(self.visit_expr(expr, &narrowed));
                }
                Clause::Where(condition) => refs.merge(self.visit_opaque([condition])),
                Clause::OrderBy(order_by) => {
                    refs.merge(self.visit_opaque(order_by.specs.iter().map(|s| &s.expr)))
                }
                Clause::Count(var) => {
                    refs.remove(var);
                }
                Clause::GroupBy(specs) => {
                    let mut keys = ReferenceMap::new();
                    for spec in specs {
                        match &spec.expr {
                            Some(expr) => {
                                refs.remove(&spec.var);
                                keys.merge(self.visit_opaque([expr]));
                            }
                            None => refs.insert_opaque(spec.var.clone()),
                        }
                    }
                    refs.merge(keys);
                }
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use serde_yaml::from_str;

    use super::*;
    use crate::semantic::resolve_static_context;

    fn detect(yaml: &str) -> (Vec<Diagnostic>, Context) {
        let program: Program = from_str(yaml).unwrap();
        let (program, mut context) = resolve_static_context(program, None).unwrap();
        let diagnostics = detect_dead_code(&program, &mut context);
        (diagnostics, context)
    }

    fn messages(diagnostics: &[Diagnostic]) -> Vec<String> {
        diagnostics.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_merge() {
        let a = || Name::local("a");
        let b = || Name::local("b");

        let partial = |key: &str| {
            ReferenceMap::singleton(a(), ReferenceMap::singleton(key_name(key), ReferenceMap::new()))
        };

        let mut refs = partial("x");
        refs.merge(partial("y"));
        assert_eq!(refs.narrow(&a()).0.len(), 2);

        // whole usage absorbs partial usage, in either order
        let mut refs = partial("x");
        refs.merge(ReferenceMap::singleton(a(), ReferenceMap::new()));
        assert!(refs.narrow(&a()).is_empty());

        let mut refs = ReferenceMap::singleton(a(), ReferenceMap::new());
        refs.merge(partial("x"));
        assert!(refs.narrow(&a()).is_empty());

        let mut refs = partial("x");
        refs.merge(ReferenceMap::singleton(b(), ReferenceMap::new()));
        assert!(refs.contains(&a()) && refs.contains(&b()));

        let mut locked = ReferenceMap::lock();
        locked.merge(partial("x"));
        assert!(locked.narrow(&a()).is_locked());
    }

    #[test]
    fn test_unused_let() {
        // let $x := 1 return 2
        let (diagnostics, context) = detect(
            r#"
            main:
              body:
                Expr:
                  Flwor:
                    clauses:
                      - Let:
                          var: x
                          expr:
                            Literal:
                              Integer: 1
                    return_expr:
                      Literal:
                        Integer: 2
            "#,
        );
        assert_eq!(messages(&diagnostics), vec!["variable `$x` is bound but never used"]);
        assert!(context.is_unreferenced(diagnostics[0].node));

        // let $x := 1 return $x + 1
        let (diagnostics, _) = detect(
            r#"
            main:
              body:
                Expr:
                  Flwor:
                    clauses:
                      - Let:
                          var: x
                          expr:
                            Literal:
                              Integer: 1
                    return_expr:
                      Binary:
                        left:
                          VarRef: x
                        op: Add
                        right:
                          Literal:
                            Integer: 1
            "#,
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_unused_object_key() {
        // {"a": 1, "b": 2}.a
        let (diagnostics, _) = detect(
            r#"
            main:
              body:
                Expr:
                  ObjectLookup:
                    object:
                      Object:
                        Pairs:
                          - key:
                              Literal:
                                String: a
                            value:
                              Literal:
                                Integer: 1
                          - key:
                              Literal:
                                String: b
                            value:
                              Literal:
                                Integer: 2
                    key:
                      Literal:
                        String: a
            "#,
        );
        let kinds = diagnostics.into_iter().map(|d| d.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![DiagnosticKind::UnusedObjectKey {
                key: "b".to_string()
            }]
        );
    }

    #[test]
    fn test_key_usage_flows_through_let() {
        // let $o := {"a": 1, "b": 2} let $unused := 0 return $o.b
        let (diagnostics, _) = detect(
            r#"
            main:
              body:
                Expr:
                  Flwor:
                    clauses:
                      - Let:
                          var: o
                          expr:
                            Object:
                              Pairs:
                                - key:
                                    Literal:
                                      String: a
                                  value:
                                    Literal:
                                      Integer: 1
                                - key:
                                    Literal:
                                      String: b
                                  value:
                                    Literal:
                                      Integer: 2
                      - Let:
                          var: unused
                          expr:
                            Literal:
                              Integer: 0
                    return_expr:
                      ObjectLookup:
                        object:
                          VarRef: o
                        key:
                          Literal:
                            String: b
            "#,
        );
        assert_eq!(
            messages(&diagnostics),
            vec![
                "variable `$unused` is bound but never used",
                "object key \"a\" is never read"
            ]
        );
    }

    #[test]
    fn test_builtin_arguments_are_opaque() {
        // let $x := {"a": 1, "b": 2} return count(($x))
        let (diagnostics, _) = detect(
            r#"
            main:
              body:
                Expr:
                  Flwor:
                    clauses:
                      - Let:
                          var: x
                          expr:
                            Object:
                              Pairs:
                                - key:
                                    Literal:
                                      String: a
                                  value:
                                    Literal:
                                      Integer: 1
                                - key:
                                    Literal:
                                      String: b
                                  value:
                                    Literal:
                                      Integer: 2
                    return_expr:
                      FunctionCall:
                        name: count
                        args:
                          - Comma:
                              - VarRef: x
            "#,
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_group_by_keeps_referenced_variables() {
        // for $o in (1, 2) let $k := $o group by $k return 1
        let (diagnostics, _) = detect(
            r#"
            main:
              body:
                Expr:
                  Flwor:
                    clauses:
                      - For:
                          var: o
                          expr:
                            Comma:
                              - Literal:
                                  Integer: 1
                              - Literal:
                                  Integer: 2
                      - Let:
                          var: k
                          expr:
                            VarRef: o
                      - GroupBy:
                          - var: k
                    return_expr:
                      Literal:
                        Integer: 1
            "#,
        );
        assert!(diagnostics.is_empty());
    }
}
