//! Inlining of calls to user-declared functions.
//!
//! A call `f(a, b)` to `declare function f($x as T, $y) { body }` becomes
//!
//! ```text
//! let $x#1 := a
//! let $y#2 := b
//! let $x as T := promote($x#1)
//! let $y := $y#2
//! return body
//! ```
//!
//! wrapped in `treat as R` when `f` declares a return type `R`. Arguments are
//! bound to temporaries first, so they are never captured by the parameters.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use tracing::debug;

use super::numbering::renumber_expr;
use super::{Context, ExpressionClassification, ScopeId};
use crate::ast::ast_fold::*;
use crate::ast::*;
use crate::error::Span;

/// Inlines calls in all modules of a program.
///
/// The rewritten tree has fresh ids on every node copied or synthesized, with
/// no scope attached. Run static-context resolution again before relying on
/// the side tables.
pub fn inline_functions(program: Program, context: &mut Context) -> Result<Program> {
    let main_functions = visible_functions(&program.main, &program.libraries);
    let mut library_functions: BTreeMap<_, _> = program
        .libraries
        .iter()
        .map(|(namespace, library)| {
            (namespace.clone(), visible_functions(library, &program.libraries))
        })
        .collect();

    let mut inliner = Inliner {
        context,
        functions: main_functions,
        expanding: Vec::new(),
        site: None,
    };

    let main = inliner.fold_module(program.main)?;

    let mut libraries = BTreeMap::new();
    for (namespace, library) in program.libraries {
        inliner.functions = library_functions.remove(&namespace).unwrap_or_default();
        libraries.insert(namespace, inliner.fold_module(library)?);
    }

    Ok(Program { main, libraries })
}

/// Functions a module may call: its own, then those of the modules it imports.
fn visible_functions(
    module: &Module,
    libraries: &BTreeMap<String, Module>,
) -> HashMap<FunctionIdentifier, FuncDecl> {
    let imported = module
        .prolog
        .imports
        .iter()
        .filter_map(|import| libraries.get(&import.namespace));

    let mut functions = HashMap::new();
    for func in std::iter::once(module)
        .chain(imported)
        .flat_map(|m| m.functions())
    {
        functions
            .entry(func.identifier())
            .or_insert_with(|| func.clone());
    }
    functions
}

struct Inliner<'a> {
    context: &'a mut Context,

    functions: HashMap<FunctionIdentifier, FuncDecl>,

    /// Functions whose body is being inlined, innermost last
    expanding: Vec<FunctionIdentifier>,

    /// Scope of the outermost call being inlined. Everything spliced in must resolve there.
    site: Option<ScopeId>,
}

impl AstFold for Inliner<'_> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        match expr.kind {
            ExprKind::FunctionCall(call) => self.inline_call(call, expr.id, expr.span),
            kind => Ok(Expr {
                kind: self.fold_expr_kind(kind)?,
                ..expr
            }),
        }
    }
}

impl Inliner<'_> {
    fn inline_call(&mut self, call: FunctionCall, id: Option<usize>, span: Option<Span>) -> Result<Expr> {
        // arguments are bound by let clauses, which only take simple expressions
        let simple_args = call.args.iter().flatten().all(|arg| {
            self.context.classification_of(arg.id) == Some(ExpressionClassification::Simple)
        });

        let call = fold_function_call(self, call)?;
        let function = call.identifier();

        if self.expanding.is_empty() {
            self.site = id.and_then(|id| self.context.node_scopes.get(&id).copied());
        }

        let decl = match self.functions.get(&function) {
            Some(decl) if simple_args && self.can_inline(&call, decl) => Some(decl.clone()),
            _ => None,
        };
        let (decl, body) = match decl.and_then(|d| d.body.clone().map(|body| (d, body))) {
            Some(found) => found,
            None => {
                return Ok(Expr {
                    kind: ExprKind::FunctionCall(call),
                    id,
                    span,
                })
            }
        };

        debug!(function = %function, "inlining call");
        let body = renumber_expr(body, self.context)?;

        self.expanding.push(function);
        let body = self.fold_expr(body);
        self.expanding.pop();
        let body = body?;

        let inlined = if decl.params.is_empty() {
            body
        } else {
            let mut temporaries = Vec::with_capacity(decl.params.len());
            let mut params = Vec::with_capacity(decl.params.len());

            for (param, arg) in decl.params.iter().zip(call.args.into_iter().flatten()) {
                let temporary = self.temporary(&param.name);
                let value = match &param.ty {
                    Some(ty) => self.promote(&temporary, ty, span),
                    None => self.reference(&temporary, span),
                };

                temporaries.push(Clause::Let(LetClause {
                    var: temporary,
                    ty: None,
                    expr: arg,
                }));
                params.push(Clause::Let(LetClause {
                    var: param.name.clone(),
                    ty: param.ty.clone(),
                    expr: value,
                }));
            }

            let flwor = Flwor {
                clauses: temporaries.into_iter().chain(params).collect(),
                return_expr: Box::new(body),
            };
            self.synthesize(ExprKind::Flwor(flwor), span)
        };

        Ok(match decl.return_ty {
            Some(ty) => self.synthesize(
                ExprKind::Treat {
                    expr: Box::new(inlined),
                    ty,
                },
                span,
            ),
            None => inlined,
        })
    }

    fn can_inline(&self, call: &FunctionCall, decl: &FuncDecl) -> bool {
        let function = decl.identifier();
        let body = match &decl.body {
            Some(body) => body,
            None => return false,
        };

        !call.is_partial()
            && !decl.updating
            && !self.expanding.contains(&function)
            && !calls_function(body, &function)
            && !self.reads_global(body)
            && self.resolves_at_site(decl, body)
    }

    /// Whether every function and declared type named by the function can be
    /// resolved at the call site. Imports are not transitive, so a library
    /// function may use names its importers cannot see.
    fn resolves_at_site(&self, decl: &FuncDecl, body: &Expr) -> bool {
        let site = match self.site {
            Some(site) => site,
            None => return false,
        };
        let mut signature = decl
            .params
            .iter()
            .filter_map(|p| p.ty.as_ref())
            .chain(&decl.return_ty);

        signature.all(|ty| self.type_resolves(site, ty)) && self.names_resolve(site, body)
    }

    fn names_resolve(&self, site: ScopeId, expr: &Expr) -> bool {
        let function = match &expr.kind {
            ExprKind::FunctionCall(call) => Some(call.identifier()),
            ExprKind::NamedFunctionRef(reference) => Some(reference.clone()),
            _ => None,
        };
        if let Some(function) = function {
            if self.context.lookup_function(site, &function).is_none() {
                return false;
            }
        }

        expr.kind
            .sequence_types()
            .into_iter()
            .all(|ty| self.type_resolves(site, ty))
            && expr
                .kind
                .children()
                .into_iter()
                .all(|e| self.names_resolve(site, e))
    }

    fn type_resolves(&self, site: ScopeId, ty: &SequenceType) -> bool {
        ty.item
            .referenced_name()
            .map_or(true, |name| self.context.lookup_type(site, name).is_some())
    }

    fn reads_global(&self, expr: &Expr) -> bool {
        self.context.references_global(expr.id)
            || expr.kind.children().into_iter().any(|e| self.reads_global(e))
    }

    /// Function conversion of an argument to the declared parameter type:
    /// numeric values are promoted to `double` or `decimal`, URIs to `string`.
    fn promote(&mut self, temporary: &Name, ty: &SequenceType, span: Option<Span>) -> Expr {
        let promotable: &[AtomicType] = match (&ty.item, ty.arity.is_subtype_of(Arity::ZeroOrOne)) {
            (ItemType::Atomic(AtomicType::Double), true) => &[AtomicType::Integer, AtomicType::Decimal],
            (ItemType::Atomic(AtomicType::Decimal), true) => &[AtomicType::Decimal],
            (ItemType::Atomic(AtomicType::String), true) => &[AtomicType::AnyUri],
            _ => return self.reference(temporary, span),
        };

        let mut cases = Vec::with_capacity(promotable.len());
        for atomic in promotable {
            let operand = self.reference(temporary, span);
            let cast = ExprKind::Cast {
                expr: Box::new(operand),
                ty: ty.clone(),
            };
            cases.push(TypeSwitchCase {
                var: None,
                types: vec![SequenceType::new(*atomic, Arity::ZeroOrOne)],
                result: self.synthesize(cast, span),
            });
        }

        let condition = self.reference(temporary, span);
        let unchanged = self.reference(temporary, span);
        let typeswitch = ExprKind::TypeSwitch {
            condition: Box::new(condition),
            cases,
            default: TypeSwitchDefault {
                var: None,
                result: Box::new(unchanged),
            },
        };

        let typeswitch = self.synthesize(typeswitch, span);
        if let Some(id) = typeswitch.id {
            self.context.static_types.insert(id, ty.clone());
        }
        typeswitch
    }

    fn temporary(&mut self, param: &Name) -> Name {
        Name {
            namespace: param.namespace.clone(),
            local: format!("{}#{}", param.local, self.context.fresh_id()),
        }
    }

    fn reference(&mut self, name: &Name, span: Option<Span>) -> Expr {
        self.synthesize(ExprKind::VarRef(name.clone()), span)
    }

    fn synthesize(&mut self, kind: ExprKind, span: Option<Span>) -> Expr {
        Expr {
            kind,
            id: Some(self.context.fresh_id()),
            span,
        }
    }
}

/// Whether `expr` calls or references `function` directly.
fn calls_function(expr: &Expr, function: &FunctionIdentifier) -> bool {
    let direct = match &expr.kind {
        ExprKind::FunctionCall(call) => call.identifier() == *function,
        ExprKind::NamedFunctionRef(reference) => reference == function,
        _ => false,
    };
    direct
        || expr
            .kind
            .children()
            .into_iter()
            .any(|e| calls_function(e, function))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_yaml::from_str;

    use super::*;
    use crate::semantic::{classify_expressions, resolve_static_context};

    fn inline(yaml: &str) -> (Expr, Context) {
        let program: Program = from_str(yaml).unwrap();
        let (program, mut context) = resolve_static_context(program, None).unwrap();
        classify_expressions(&program, &mut context).unwrap();
        let program = inline_functions(program, &mut context).unwrap();
        let body = program.main.body.unwrap().kind.into_expr().unwrap();
        (body, context)
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Value {
        Integer(i64),
        Decimal(f64),
        Double(f64),
    }

    impl Value {
        fn atomic_type(&self) -> AtomicType {
            match self {
                Value::Integer(_) => AtomicType::Integer,
                Value::Decimal(_) => AtomicType::Decimal,
                Value::Double(_) => AtomicType::Double,
            }
        }

        fn number(&self) -> f64 {
            match self {
                Value::Integer(i) => *i as f64,
                Value::Decimal(d) | Value::Double(d) => *d,
            }
        }
    }

    /// Evaluates the numeric fragment of the language produced by inlining.
    fn eval(expr: &Expr, env: &HashMap<Name, Value>) -> Value {
        match &expr.kind {
            ExprKind::Literal(Literal::Integer(i)) => Value::Integer(*i),
            ExprKind::Literal(Literal::Double(d)) => Value::Double(*d),
            ExprKind::VarRef(name) => env[name].clone(),
            ExprKind::Flwor(flwor) => {
                let mut env = env.clone();
                for clause in &flwor.clauses {
                    let LetClause { var, expr, .. } = clause.as_let().unwrap();
                    let value = eval(expr, &env);
                    env.insert(var.clone(), value);
                }
                eval(&flwor.return_expr, &env)
            }
            ExprKind::TypeSwitch {
                condition,
                cases,
                default,
            } => {
                let value = eval(condition, env);
                let ty = SequenceType::new(value.atomic_type(), Arity::ExactlyOne);
                cases
                    .iter()
                    .find(|case| case.types.iter().any(|t| ty.is_subtype_of(t)))
                    .map_or_else(|| eval(&default.result, env), |case| eval(&case.result, env))
            }
            ExprKind::Cast { expr, ty } => {
                let value = eval(expr, env);
                match ty.item {
                    ItemType::Atomic(AtomicType::Double) => Value::Double(value.number()),
                    ItemType::Atomic(AtomicType::Decimal) => Value::Decimal(value.number()),
                    _ => value,
                }
            }
            ExprKind::Treat { expr, .. } => eval(expr, env),
            ExprKind::Binary {
                left,
                op: BinOp::Add,
                right,
            } => match (eval(left, env), eval(right, env)) {
                (Value::Integer(a), Value::Integer(b)) => Value::Integer(a + b),
                (a @ Value::Double(_), b) | (a, b @ Value::Double(_)) => {
                    Value::Double(a.number() + b.number())
                }
                (a, b) => Value::Decimal(a.number() + b.number()),
            },
            other => panic!("cannot evaluate {}", other.as_ref()),
        }
    }

    const PROMOTE: &str = r#"
        main:
          prolog:
            declarations:
              - Function:
                  name: f
                  params:
                    - name: p
                      ty: double
                  body:
                    Binary:
                      left:
                        VarRef: p
                      op: Add
                      right:
                        Literal:
                          Integer: 1
          body:
            Expr:
              FunctionCall:
                name: f
                args:
                  - Literal:
                      Integer: 3
        "#;

    #[test]
    fn test_integer_argument_promoted_to_double() {
        // declare function f($p as double) { $p + 1 }; f(3)
        let (body, context) = inline(PROMOTE);

        let flwor = body.kind.as_flwor().unwrap();
        assert_eq!(flwor.clauses.len(), 2);

        let temporary = flwor.clauses[0].as_let().unwrap();
        assert!(temporary.var.local.starts_with("p#"));
        assert_eq!(temporary.expr.kind, ExprKind::Literal(Literal::Integer(3)));

        let param = flwor.clauses[1].as_let().unwrap();
        assert_eq!(param.var, Name::local("p"));
        assert_eq!(param.ty.as_ref().unwrap().to_string(), "double");

        let cases = match &param.expr.kind {
            ExprKind::TypeSwitch { cases, .. } => cases,
            other => panic!("expected typeswitch, found {}", other.as_ref()),
        };
        let case_types = cases
            .iter()
            .map(|c| c.types[0].to_string())
            .collect::<Vec<_>>();
        assert_eq!(case_types, vec!["integer?", "decimal?"]);
        assert_eq!(
            context.static_type_of(param.expr.id).unwrap().to_string(),
            "double"
        );

        let argument = HashMap::from([(temporary.var.clone(), Value::Integer(3))]);
        assert_eq!(eval(&param.expr, &argument), Value::Double(3.0));

        // same result as calling f with $p bound to the converted argument
        let program: Program = from_str(PROMOTE).unwrap();
        let decl = program.main.functions().next().unwrap();
        let called = eval(
            decl.body.as_ref().unwrap(),
            &HashMap::from([(Name::local("p"), Value::Double(3.0))]),
        );
        assert_eq!(called, Value::Double(4.0));
        assert_eq!(eval(&body, &HashMap::new()), called);
    }

    #[test]
    fn test_arguments_are_not_captured() {
        // declare function add($a as integer, $b as integer) as integer { $a + $b };
        // let $b := 1, $a := 2 return add($b, $a)
        let (body, context) = inline(
            r#"
            main:
              prolog:
                declarations:
                  - Function:
                      name: add
                      params:
                        - name: a
                          ty: integer
                        - name: b
                          ty: integer
                      return_ty: integer
                      body:
                        Binary:
                          left:
                            VarRef: a
                          op: Add
                          right:
                            VarRef: b
              body:
                Expr:
                  Flwor:
                    clauses:
                      - Let:
                          var: b
                          expr:
                            Literal:
                              Integer: 10
                      - Let:
                          var: a
                          expr:
                            Literal:
                              Integer: 2
                    return_expr:
                      Binary:
                        left:
                          FunctionCall:
                            name: add
                            args:
                              - VarRef: b
                              - VarRef: a
                        op: Add
                        right:
                          FunctionCall:
                            name: add
                            args:
                              - VarRef: a
                              - Literal:
                                  Integer: 100
            "#,
        );

        let flwor = body.kind.as_flwor().unwrap();
        let (left, right) = match &flwor.return_expr.kind {
            ExprKind::Binary { left, right, .. } => (left, right),
            other => panic!("expected binary, found {}", other.as_ref()),
        };
        assert_eq!(left.kind.as_ref(), "treat expression");
        assert_eq!(context.static_type_of(left.id), None);

        assert_eq!(eval(&body, &HashMap::new()), Value::Integer(12 + 102));
        assert!(matches!(right.kind, ExprKind::Treat { .. }));
    }

    #[test]
    fn test_recursive_functions_are_kept() {
        let (body, _) = inline(
            r#"
            main:
              prolog:
                declarations:
                  - Function:
                      name: countdown
                      params:
                        - name: n
                      body:
                        If:
                          condition:
                            Binary:
                              left:
                                VarRef: n
                              op: Le
                              right:
                                Literal:
                                  Integer: 0
                          then_branch:
                            Literal:
                              Integer: 0
                          else_branch:
                            FunctionCall:
                              name: countdown
                              args:
                                - Binary:
                                    left:
                                      VarRef: n
                                    op: Sub
                                    right:
                                      Literal:
                                        Integer: 1
              body:
                Expr:
                  FunctionCall:
                    name: countdown
                    args:
                      - Literal:
                          Integer: 5
            "#,
        );
        let call = body.kind.as_function_call().unwrap();
        assert_eq!(call.identifier(), FunctionIdentifier::new("countdown", 1));
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let (body, _) = inline(
            r#"
            main:
              prolog:
                declarations:
                  - Function:
                      name: ping
                      params:
                        - name: n
                      body:
                        FunctionCall:
                          name: pong
                          args:
                            - VarRef: n
                  - Function:
                      name: pong
                      params:
                        - name: n
                      body:
                        FunctionCall:
                          name: ping
                          args:
                            - VarRef: n
              body:
                Expr:
                  FunctionCall:
                    name: ping
                    args:
                      - Literal:
                          Integer: 1
            "#,
        );

        // ping(1) expands pong, whose call back to ping stays a call
        let outer = body.kind.as_flwor().unwrap();
        let inner = outer.return_expr.kind.as_flwor().unwrap();
        let call = inner.return_expr.kind.as_function_call().unwrap();
        assert_eq!(call.identifier(), FunctionIdentifier::new("ping", 1));
    }

    #[test]
    fn test_not_inlined() {
        // reads a prolog variable; partially applied; external; zero-argument with return type
        let (body, _) = inline(
            r#"
            main:
              prolog:
                declarations:
                  - Variable:
                      name: rate
                      expr:
                        Literal:
                          Integer: 2
                  - Function:
                      name: scale
                      params:
                        - name: n
                      body:
                        Binary:
                          left:
                            VarRef: n
                          op: Mul
                          right:
                            VarRef: rate
                  - Function:
                      name: pair
                      params:
                        - name: a
                        - name: b
                      body:
                        Comma:
                          - VarRef: a
                          - VarRef: b
                  - Function:
                      name: now
                      params: []
                  - Function:
                      name: answer
                      return_ty: integer
                      body:
                        Literal:
                          Integer: 42
              body:
                Expr:
                  Comma:
                    - FunctionCall:
                        name: scale
                        args:
                          - Literal:
                              Integer: 1
                    - FunctionCall:
                        name: pair
                        args:
                          - Literal:
                              Integer: 1
                          - null
                    - FunctionCall:
                        name: now
                        args: []
                    - FunctionCall:
                        name: answer
                        args: []
            "#,
        );

        let members = body.kind.as_comma().unwrap();
        let kinds = members.iter().map(|m| m.kind.as_ref()).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec!["function call", "function call", "function call", "treat expression"]
        );
    }

    #[test]
    fn test_vacuous_argument_keeps_call() {
        // declare function f($p) { $p }; f(())
        let (body, _) = inline(
            r#"
            main:
              prolog:
                declarations:
                  - Function:
                      name: f
                      params:
                        - name: p
                      body:
                        VarRef: p
              body:
                Expr:
                  FunctionCall:
                    name: f
                    args:
                      - Comma: []
            "#,
        );
        let call = body.kind.as_function_call().unwrap();
        assert_eq!(call.identifier(), FunctionIdentifier::new("f", 1));
    }

    #[test]
    fn test_updating_function_keeps_call() {
        let (body, _) = inline(
            r#"
            main:
              prolog:
                declarations:
                  - Function:
                      name: clear
                      updating: true
                      params:
                        - name: o
                      return_ty: "item*"
                      body:
                        Delete:
                          target:
                            VarRef: o
                          locator:
                            Literal:
                              String: a
              body:
                Expr:
                  FunctionCall:
                    name: clear
                    args:
                      - Object:
                          Pairs: []
            "#,
        );
        assert_eq!(body.kind.as_ref(), "function call");
    }

    #[test]
    fn test_functions_of_indirect_imports_stay_hidden() {
        // main imports a; a:f calls b:g, which main cannot see
        let (body, _) = inline(INDIRECT_IMPORT);

        let members = body.kind.as_comma().unwrap();
        let kept = members[0].kind.as_function_call().unwrap();
        assert_eq!(kept.identifier(), FunctionIdentifier::new("Q{a}f", 1));

        // a:twice only uses names main can see
        assert_eq!(members[1].kind.as_ref(), "FLWOR expression");
    }

    const INDIRECT_IMPORT: &str = r#"
        main:
          prolog:
            imports:
              - namespace: a
          body:
            Expr:
              Comma:
                - FunctionCall:
                    name: Q{a}f
                    args:
                      - Literal:
                          Integer: 1
                - FunctionCall:
                    name: Q{a}twice
                    args:
                      - Literal:
                          Integer: 1
        libraries:
          a:
            namespace: a
            prolog:
              imports:
                - namespace: b
              declarations:
                - Function:
                    name: Q{a}f
                    params:
                      - name: n
                    body:
                      FunctionCall:
                        name: Q{b}g
                        args:
                          - VarRef: n
                - Function:
                    name: Q{a}twice
                    params:
                      - name: n
                    body:
                      Binary:
                        left:
                          VarRef: n
                        op: Mul
                        right:
                          Literal:
                            Integer: 2
          b:
            namespace: b
            prolog:
              declarations:
                - Function:
                    name: Q{b}g
                    params:
                      - name: n
                    body:
                      VarRef: n
        "#;
}
