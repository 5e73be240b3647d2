//! Static-context resolution.
//!
//! Walks a program, building the tree of scopes and attaching to each
//! expression and statement the scope it was resolved in.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use tracing::debug;

use super::numbering::number_nodes;
use super::scope::FunctionSignature;
use super::type_resolver::{declare_types, resolve_sequence_type, type_of_literal};
use super::{Context, ScopeId};
use crate::ast::*;
use crate::error::{Error, Reason, Span, WithErrorInfo};

/// Runs static-context resolution on a program.
///
/// Nodes without an id get one. Passing in the context of an earlier run keeps
/// its annotations, but all scopes are rebuilt from scratch.
pub fn resolve_static_context(
    program: Program,
    context: Option<Context>,
) -> Result<(Program, Context)> {
    let mut context = context.unwrap_or_default();
    context.reset_scopes();

    let program = number_nodes(program, &mut context)?;

    let mut resolver = StaticContextResolver {
        context,
        libraries: &program.libraries,
        resolving: HashSet::new(),
    };
    let scope = resolver.resolve_module(&program.main)?;

    let mut context = resolver.context;
    context.main_scope = Some(scope);
    Ok((program, context))
}

struct StaticContextResolver<'a> {
    context: Context,

    libraries: &'a BTreeMap<String, Module>,

    /// Namespaces of library modules whose prolog is currently being resolved
    resolving: HashSet<String>,
}

impl<'a> StaticContextResolver<'a> {
    /// Returns the scope holding the declarations of the module's own prolog.
    fn resolve_module(&mut self, module: &Module) -> Result<ScopeId> {
        let scope = self.resolve_prolog(&module.prolog)?;

        if let Some(body) = &module.body {
            self.resolve_statement(body, scope)?;
        }
        Ok(scope)
    }

    /// Imports land in a frame of their own, so that only the module's own
    /// declarations are exported to importers.
    fn resolve_prolog(&mut self, prolog: &Prolog) -> Result<ScopeId> {
        let imports = self.context.new_scope(None);
        for import in &prolog.imports {
            if let Some(library) = self.import_module(&import.namespace, import.span)? {
                let exported = self.context.scope(library).clone();
                let scope = self.context.scope_mut(imports);
                scope.absorb(&exported);
                scope.imports.push(import.namespace.clone());
            }
        }

        let scope = self.context.new_scope(Some(imports));

        let types = prolog
            .declarations
            .iter()
            .filter_map(Declaration::as_type)
            .collect::<Vec<_>>();
        declare_types(&mut self.context, scope, &types)?;

        // signatures first, so bodies may call functions declared after them
        for func in prolog.declarations.iter().filter_map(Declaration::as_function) {
            let signature = self.signature_of(func, scope)?;
            let functions = &mut self.context.scope_mut(scope).functions;
            let id = func.identifier();
            if functions.contains_key(&id) {
                return Err(Error::new(Reason::DuplicateDeclaration {
                    what: "function",
                    name: id.to_string(),
                })
                .with_span(func.span)
                .into());
            }
            functions.insert(id, signature);
        }

        for decl in &prolog.declarations {
            match decl {
                Declaration::Variable(var) => self.declare_variable(var, scope)?,
                Declaration::Function(func) => self.resolve_function(func, scope)?,
                Declaration::Type(_) => {}
            }
        }
        Ok(scope)
    }

    /// Resolves a library module once per compilation.
    ///
    /// Returns `None` for a module that is still being resolved further up,
    /// which happens when modules import each other.
    fn import_module(&mut self, namespace: &str, span: Option<Span>) -> Result<Option<ScopeId>> {
        if let Some(scope) = self.context.modules.get(namespace) {
            return Ok(Some(*scope));
        }
        if self.resolving.contains(namespace) {
            return Ok(None);
        }

        let libraries = self.libraries;
        let library = libraries.get(namespace).ok_or_else(|| {
            Error::new(Reason::ModuleNotFound {
                namespace: namespace.to_string(),
            })
            .with_span(span)
        })?;

        debug!(namespace, "resolving library module");
        self.resolving.insert(namespace.to_string());
        let scope = self.resolve_prolog(&library.prolog)?;
        self.resolving.remove(namespace);

        self.context.modules.insert(namespace.to_string(), scope);
        Ok(Some(scope))
    }

    fn signature_of(&self, func: &FuncDecl, scope: ScopeId) -> Result<FunctionSignature, Error> {
        let params = func
            .params
            .iter()
            .map(|param| {
                let ty = resolve_sequence_type(&self.context, scope, param.ty.as_ref(), func.span)?;
                Ok(ty.unwrap_or_else(SequenceType::item_star))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let return_ty = resolve_sequence_type(&self.context, scope, func.return_ty.as_ref(), func.span)?
            .unwrap_or_else(SequenceType::item_star);

        Ok(FunctionSignature {
            params,
            return_ty,
            updating: func.updating,
        })
    }

    fn declare_variable(&mut self, var: &VarDecl, scope: ScopeId) -> Result<()> {
        if let Some(expr) = &var.expr {
            self.resolve_expr(expr, scope)?;
        }
        let ty = resolve_sequence_type(&self.context, scope, var.ty.as_ref(), var.span)?;

        let variables = &mut self.context.scope_mut(scope).variables;
        if variables.contains_key(&var.name) {
            return Err(Error::new(Reason::DuplicateDeclaration {
                what: "variable",
                name: format!("${}", var.name),
            })
            .with_span(var.span)
            .into());
        }
        self.context.scope_mut(scope).add_variable(var.name.clone(), ty, true);
        Ok(())
    }

    fn resolve_function(&mut self, func: &FuncDecl, scope: ScopeId) -> Result<()> {
        let body = match &func.body {
            Some(body) => body,
            None => return Ok(()),
        };

        let frame = self.context.new_scope(Some(scope));
        self.declare_params(&func.params, frame, func.span)?;
        self.resolve_expr(body, frame)?;

        // signature again, the scope may have grown since pre-registration
        let signature = self.signature_of(func, scope)?;
        self.context
            .scope_mut(scope)
            .functions
            .insert(func.identifier(), signature);
        Ok(())
    }

    fn declare_params(&mut self, params: &[FuncParam], frame: ScopeId, span: Option<Span>) -> Result<()> {
        for param in params {
            let ty = resolve_sequence_type(&self.context, frame, param.ty.as_ref(), span)?;
            self.context
                .scope_mut(frame)
                .add_variable(param.name.clone(), ty, false);
        }
        Ok(())
    }

    /// New frame below `parent` binding a single variable.
    fn bind(
        &mut self,
        parent: ScopeId,
        name: &Name,
        ty: Option<&SequenceType>,
        span: Option<Span>,
    ) -> Result<ScopeId> {
        let ty = resolve_sequence_type(&self.context, parent, ty, span)?;
        let frame = self.context.new_scope(Some(parent));
        self.context
            .scope_mut(frame)
            .add_variable(name.clone(), ty, false);
        Ok(frame)
    }

    fn annotate(&mut self, id: Option<usize>, scope: ScopeId) {
        if let Some(id) = id {
            self.context.node_scopes.insert(id, scope);
        }
    }

    /// Returns the scope in effect after the statement, which differs from
    /// `scope` only after a variable declaration.
    fn resolve_statement(&mut self, statement: &Statement, scope: ScopeId) -> Result<ScopeId> {
        self.annotate(statement.id, scope);

        Ok(match &statement.kind {
            StatementKind::Expr(expr) => {
                self.resolve_expr(expr, scope)?;
                scope
            }
            StatementKind::Block(statements) => {
                let mut current = scope;
                for statement in statements {
                    current = self.resolve_statement(statement, current)?;
                }
                scope
            }
            StatementKind::VarDecl { var, ty, expr } => {
                if let Some(expr) = expr {
                    self.resolve_expr(expr, scope)?;
                }
                self.bind(scope, var, ty.as_ref(), statement.span)?
            }
            StatementKind::Assign { var, expr } => {
                if self.context.lookup_variable(scope, var).is_none() {
                    return Err(undeclared_variable(var, statement.span).into());
                }
                self.resolve_expr(expr, scope)?;
                scope
            }
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition, scope)?;
                self.resolve_statement(then_branch, scope)?;
                if let Some(else_branch) = else_branch {
                    self.resolve_statement(else_branch, scope)?;
                }
                scope
            }
            StatementKind::While { condition, body } => {
                self.resolve_expr(condition, scope)?;
                self.resolve_statement(body, scope)?;
                scope
            }
            StatementKind::Exit { expr } => {
                self.resolve_expr(expr, scope)?;
                scope
            }
            StatementKind::Break | StatementKind::Continue => scope,
        })
    }

    fn resolve_exprs<'e, I: IntoIterator<Item = &'e Expr>>(&mut self, exprs: I, scope: ScopeId) -> Result<()> {
        for expr in exprs {
            self.resolve_expr(expr, scope)?;
        }
        Ok(())
    }

    fn resolve_expr(&mut self, expr: &Expr, scope: ScopeId) -> Result<()> {
        self.annotate(expr.id, scope);

        match &expr.kind {
            ExprKind::Literal(literal) => {
                if let Some(id) = expr.id {
                    self.context.static_types.insert(id, type_of_literal(literal));
                }
            }
            ExprKind::VarRef(name) => {
                let var = self
                    .context
                    .lookup_variable(scope, name)
                    .cloned()
                    .ok_or_else(|| undeclared_variable(name, expr.span))?;

                if let Some(id) = expr.id {
                    if let Some(ty) = var.ty {
                        self.context.static_types.insert(id, ty);
                    }
                    if var.global {
                        self.context.global_refs.insert(id);
                    }
                }
            }
            ExprKind::FunctionCall(call) => {
                let signature = self.lookup_function(&call.identifier(), scope, expr.span)?;
                if let (Some(id), false) = (expr.id, call.is_partial()) {
                    self.context.static_types.insert(id, signature.return_ty);
                }
                self.resolve_exprs(call.args.iter().flatten(), scope)?;
            }
            ExprKind::NamedFunctionRef(function) => {
                self.lookup_function(function, scope, expr.span)?;
            }
            ExprKind::TypeSwitch {
                condition,
                cases,
                default,
            } => {
                self.resolve_expr(condition, scope)?;
                for case in cases {
                    for ty in &case.types {
                        resolve_sequence_type(&self.context, scope, Some(ty), expr.span)?;
                    }
                    self.resolve_case(case.var.as_ref(), &case.result, scope)?;
                }
                self.resolve_case(default.var.as_ref(), &default.result, scope)?;
            }
            ExprKind::Flwor(flwor) => self.resolve_flwor(flwor, scope)?,
            ExprKind::Quantified {
                bindings,
                satisfies,
                ..
            } => {
                let mut current = scope;
                for binding in bindings {
                    self.resolve_expr(&binding.expr, current)?;
                    current = self.bind(current, &binding.var, binding.ty.as_ref(), expr.span)?;
                }
                self.resolve_expr(satisfies, current)?;
            }
            ExprKind::InlineFunction(function) => {
                let frame = self.context.new_scope(Some(scope));
                self.declare_params(&function.params, frame, expr.span)?;
                resolve_sequence_type(&self.context, scope, function.return_ty.as_ref(), expr.span)?;
                self.resolve_expr(&function.body, frame)?;
            }
            ExprKind::InstanceOf { expr: inner, ty }
            | ExprKind::Treat { expr: inner, ty }
            | ExprKind::Castable { expr: inner, ty }
            | ExprKind::Cast { expr: inner, ty } => {
                resolve_sequence_type(&self.context, scope, Some(ty), expr.span)?;
                self.resolve_expr(inner, scope)?;
                if let (Some(id), ExprKind::Treat { .. } | ExprKind::Cast { .. }) = (expr.id, &expr.kind) {
                    self.context.static_types.insert(id, ty.clone());
                }
            }
            ExprKind::Transform(transform) => {
                let mut current = scope;
                for copy in &transform.copies {
                    self.resolve_expr(&copy.expr, current)?;
                    current = self.bind(current, &copy.var, None, expr.span)?;
                }
                self.resolve_expr(&transform.modify, current)?;
                self.resolve_expr(&transform.return_expr, current)?;
            }

            // no bindings, resolve operands in the same scope
            ExprKind::ContextItem
            | ExprKind::Comma(_)
            | ExprKind::Unary { .. }
            | ExprKind::Binary { .. }
            | ExprKind::If { .. }
            | ExprKind::Switch { .. }
            | ExprKind::DynamicCall { .. }
            | ExprKind::ObjectLookup { .. }
            | ExprKind::ArrayLookup { .. }
            | ExprKind::ArrayUnbox(_)
            | ExprKind::Filter { .. }
            | ExprKind::Object(_)
            | ExprKind::Array { .. }
            | ExprKind::Delete { .. }
            | ExprKind::Insert { .. }
            | ExprKind::Replace { .. }
            | ExprKind::Rename { .. }
            | ExprKind::Append { .. } => {
                self.resolve_exprs(expr.kind.children(), scope)?;
            }
        }
        Ok(())
    }

    /// Typeswitch branch, with its variable bound to the operand when named.
    fn resolve_case(&mut self, var: Option<&Name>, result: &Expr, scope: ScopeId) -> Result<()> {
        let scope = match var {
            Some(var) => self.bind(scope, var, None, result.span)?,
            None => scope,
        };
        self.resolve_expr(result, scope)
    }

    fn lookup_function(
        &self,
        function: &FunctionIdentifier,
        scope: ScopeId,
        span: Option<Span>,
    ) -> Result<FunctionSignature, Error> {
        self.context.lookup_function(scope, function).ok_or_else(|| {
            Error::new(Reason::UndeclaredFunction {
                function: function.clone(),
            })
            .with_span(span)
        })
    }

    fn resolve_flwor(&mut self, flwor: &Flwor, scope: ScopeId) -> Result<()> {
        // variables bound by this FLWOR so far, in clause order
        let mut bound: Vec<(Name, Option<SequenceType>)> = Vec::new();

        let mut current = scope;
        for clause in &flwor.clauses {
            current = self.resolve_clause(clause, current, &mut bound, flwor.return_expr.span)?;
        }
        self.resolve_expr(&flwor.return_expr, current)
    }

    /// Returns the scope the following clause is resolved in.
    fn resolve_clause(
        &mut self,
        clause: &Clause,
        scope: ScopeId,
        bound: &mut Vec<(Name, Option<SequenceType>)>,
        span: Option<Span>,
    ) -> Result<ScopeId> {
        Ok(match clause {
            Clause::For(ForClause {
                var,
                positional,
                ty,
                expr,
                ..
            }) => {
                self.resolve_expr(expr, scope)?;
                let mut frame = self.bind(scope, var, ty.as_ref(), expr.span)?;
                bound.push((var.clone(), ty.clone()));

                if let Some(positional) = positional {
                    let integer = SequenceType::integer();
                    frame = self.bind(frame, positional, Some(&integer), expr.span)?;
                    bound.push((positional.clone(), Some(integer)));
                }
                frame
            }
            Clause::Let(LetClause { var, ty, expr }) => {
                self.resolve_expr(expr, scope)?;
                bound.push((var.clone(), ty.clone()));
                self.bind(scope, var, ty.as_ref(), expr.span)?
            }
            Clause::Where(condition) => {
                self.resolve_expr(condition, scope)?;
                self.context.new_scope(Some(scope))
            }
            Clause::OrderBy(order_by) => {
                self.resolve_exprs(order_by.specs.iter().map(|s| &s.expr), scope)?;
                scope
            }
            Clause::Count(var) => {
                let integer = SequenceType::integer();
                bound.push((var.clone(), Some(integer.clone())));
                self.bind(scope, var, Some(&integer), span)?
            }
            Clause::GroupBy(specs) => self.resolve_group_by(specs, scope, bound, span)?,
        })
    }

    /// After grouping, every other variable bound by the FLWOR holds the
    /// sequence of its values within the group.
    fn resolve_group_by(
        &mut self,
        specs: &[GroupingSpec],
        scope: ScopeId,
        bound: &mut Vec<(Name, Option<SequenceType>)>,
        span: Option<Span>,
    ) -> Result<ScopeId> {
        let frame = self.context.new_scope(Some(scope));

        let mut keys = Vec::new();
        for spec in specs {
            match &spec.expr {
                Some(expr) => {
                    self.resolve_expr(expr, scope)?;
                    let ty = resolve_sequence_type(&self.context, scope, spec.ty.as_ref(), expr.span)?;
                    self.context
                        .scope_mut(frame)
                        .add_variable(spec.var.clone(), ty.clone(), false);
                    bound.push((spec.var.clone(), ty));
                }
                None => {
                    if self.context.lookup_variable(scope, &spec.var).is_none() {
                        return Err(undeclared_variable(&spec.var, span).into());
                    }
                }
            }
            keys.push(&spec.var);
        }

        for (name, ty) in bound.iter_mut() {
            if keys.contains(&&*name) {
                continue;
            }
            let grouped = ty
                .as_ref()
                .map_or_else(SequenceType::item_star, |t| t.with_arity(Arity::ZeroOrMore));
            *ty = Some(grouped.clone());
            self.context
                .scope_mut(frame)
                .add_variable(name.clone(), Some(grouped), false);
        }
        Ok(frame)
    }
}

fn undeclared_variable(name: &Name, span: Option<Span>) -> Error {
    Error::new(Reason::UndeclaredVariable { name: name.clone() }).with_span(span)
}
