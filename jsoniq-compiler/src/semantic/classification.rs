//! Classification of expressions as simple or updating.
//!
//! Updating expressions may only appear where their pending updates can reach
//! the enclosing snapshot: branches of conditionals, members of sequences,
//! FLWOR return clauses, bodies of updating functions and the modify clause
//! of copy-modify-return.

use serde::Serialize;
use tracing::debug;

use super::builtins::is_error_function;
use super::Context;
use crate::ast::*;
use crate::error::{Error, Reason, WithErrorInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum ExpressionClassification {
    /// Produces a value and no pending updates.
    #[strum(serialize = "simple")]
    Simple,
    /// Produces pending updates by composing other updating expressions.
    #[strum(serialize = "updating")]
    Updating,
    /// Produces neither a value nor pending updates, such as `()` or `error()`.
    #[strum(serialize = "vacuous")]
    Vacuous,
    /// One of the primitive update expressions.
    #[strum(serialize = "basic updating")]
    BasicUpdating,
}

use ExpressionClassification::*;

impl ExpressionClassification {
    pub fn is_updating(self) -> bool {
        matches!(self, Updating | BasicUpdating)
    }

    pub fn is_updating_or_vacuous(self) -> bool {
        self.is_updating() || self == Vacuous
    }
}

/// Classifies every expression of a program, including library modules.
///
/// Previous classifications are discarded, so running this twice over the
/// same tree gives the same result.
pub fn classify_expressions(program: &Program, context: &mut Context) -> Result<(), Error> {
    context.classifications.clear();

    let mut classifier = Classifier {
        context: &mut *context,
    };
    classifier.classify_module(&program.main)?;
    for library in program.libraries.values() {
        classifier.classify_module(library)?;
    }

    debug!(
        classified = context.classifications.len(),
        "classified expressions"
    );
    Ok(())
}

struct Classifier<'a> {
    context: &'a mut Context,
}

impl Classifier<'_> {
    fn classify_module(&mut self, module: &Module) -> Result<(), Error> {
        for decl in &module.prolog.declarations {
            match decl {
                Declaration::Variable(VarDecl {
                    expr: Some(expr), ..
                }) => {
                    let class = self.classify_expr(expr)?;
                    require_simple(class, "variable declaration", expr)?;
                }
                Declaration::Function(FuncDecl {
                    body: Some(body),
                    updating,
                    ..
                }) => {
                    let class = self.classify_expr(body)?;
                    if *updating {
                        if !class.is_updating_or_vacuous() {
                            return Err(invalid_position(
                                "updating function declaration",
                                "an updating or vacuous",
                                class,
                                body,
                            ));
                        }
                    } else {
                        require_simple(class, "function declaration", body)?;
                    }
                }
                _ => {}
            }
        }

        if let Some(body) = &module.body {
            self.classify_statement(body)?;
        }
        Ok(())
    }

    fn record(&mut self, id: Option<usize>, class: ExpressionClassification) -> ExpressionClassification {
        if let Some(id) = id {
            self.context.classifications.insert(id, class);
        }
        class
    }

    fn classify_statement(&mut self, statement: &Statement) -> Result<ExpressionClassification, Error> {
        let class = match &statement.kind {
            StatementKind::Expr(expr) => passed_on(self.classify_expr(expr)?),
            StatementKind::Block(statements) => {
                let mut classes = Vec::with_capacity(statements.len());
                for statement in statements {
                    classes.push(self.classify_statement(statement)?);
                }
                combine_block(&classes)
            }
            StatementKind::VarDecl { expr, .. } => {
                if let Some(expr) = expr {
                    let class = self.classify_expr(expr)?;
                    require_simple(class, statement.kind.as_ref(), expr)?;
                }
                Simple
            }
            StatementKind::Assign { expr, .. } | StatementKind::Exit { expr } => {
                let class = self.classify_expr(expr)?;
                require_simple(class, statement.kind.as_ref(), expr)?;
                Simple
            }
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let class = self.classify_expr(condition)?;
                require_simple(class, statement.kind.as_ref(), condition)?;

                let mut classes = vec![self.classify_statement(then_branch)?];
                if let Some(else_branch) = else_branch {
                    classes.push(self.classify_statement(else_branch)?);
                }
                combine_block(&classes)
            }
            StatementKind::While { condition, body } => {
                let class = self.classify_expr(condition)?;
                require_simple(class, statement.kind.as_ref(), condition)?;
                passed_on(self.classify_statement(body)?)
            }
            StatementKind::Break | StatementKind::Continue => Vacuous,
        };
        Ok(self.record(statement.id, class))
    }

    fn classify_expr(&mut self, expr: &Expr) -> Result<ExpressionClassification, Error> {
        let construct = expr.kind.as_ref();

        let class = match &expr.kind {
            ExprKind::Literal(_)
            | ExprKind::VarRef(_)
            | ExprKind::ContextItem
            | ExprKind::NamedFunctionRef(_) => Simple,

            ExprKind::Comma(members) if members.is_empty() => Vacuous,
            ExprKind::Comma(members) => {
                let mut classes = Vec::with_capacity(members.len());
                for member in members {
                    classes.push(self.classify_expr(member)?);
                }
                combine_branches(&classes, construct, expr)?
            }

            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let class = self.classify_expr(condition)?;
                require_simple(class, construct, condition)?;

                let branches = [
                    self.classify_expr(then_branch)?,
                    self.classify_expr(else_branch)?,
                ];
                combine_branches(&branches, construct, expr)?
            }
            ExprKind::Switch {
                condition,
                cases,
                default,
            } => {
                let class = self.classify_expr(condition)?;
                require_simple(class, construct, condition)?;

                let mut branches = Vec::with_capacity(cases.len() + 1);
                for case in cases {
                    for test in &case.tests {
                        let class = self.classify_expr(test)?;
                        require_simple(class, construct, test)?;
                    }
                    branches.push(self.classify_expr(&case.result)?);
                }
                branches.push(self.classify_expr(default)?);
                combine_branches(&branches, construct, expr)?
            }
            ExprKind::TypeSwitch {
                condition,
                cases,
                default,
            } => {
                let class = self.classify_expr(condition)?;
                require_simple(class, construct, condition)?;

                let mut branches = Vec::with_capacity(cases.len() + 1);
                for case in cases {
                    branches.push(self.classify_expr(&case.result)?);
                }
                branches.push(self.classify_expr(&default.result)?);
                combine_branches(&branches, construct, expr)?
            }

            ExprKind::Flwor(flwor) => self.classify_flwor(flwor)?,

            ExprKind::FunctionCall(call) => {
                self.require_simple_operands(call.args.iter().flatten(), construct)?;

                let function = call.identifier();
                if call.is_partial() {
                    Simple
                } else if self.context.is_builtin(expr.id, &function) {
                    if is_error_function(&function) {
                        Vacuous
                    } else {
                        Simple
                    }
                } else if self.is_updating_function(expr, &function)? {
                    Updating
                } else {
                    Simple
                }
            }

            ExprKind::InlineFunction(function) => {
                let class = self.classify_expr(&function.body)?;
                require_simple(class, construct, &function.body)?;
                Simple
            }

            ExprKind::Delete { .. }
            | ExprKind::Insert { .. }
            | ExprKind::Replace { .. }
            | ExprKind::Rename { .. }
            | ExprKind::Append { .. } => {
                self.require_simple_operands(expr.kind.children(), construct)?;
                BasicUpdating
            }

            ExprKind::Transform(transform) => {
                for copy in &transform.copies {
                    let class = self.classify_expr(&copy.expr)?;
                    require_simple(class, construct, &copy.expr)?;
                }

                let modify = self.classify_expr(&transform.modify)?;
                if !modify.is_updating_or_vacuous() {
                    return Err(Error::new(Reason::UpdatingEncapsulationViolation {
                        construct: construct.to_string(),
                    })
                    .with_span(transform.modify.span.or(expr.span)));
                }

                let class = self.classify_expr(&transform.return_expr)?;
                require_simple(class, construct, &transform.return_expr)?;
                Simple
            }

            ExprKind::Unary { .. }
            | ExprKind::Binary { .. }
            | ExprKind::Quantified { .. }
            | ExprKind::DynamicCall { .. }
            | ExprKind::ObjectLookup { .. }
            | ExprKind::ArrayLookup { .. }
            | ExprKind::ArrayUnbox(_)
            | ExprKind::Filter { .. }
            | ExprKind::Object(_)
            | ExprKind::Array { .. }
            | ExprKind::InstanceOf { .. }
            | ExprKind::Treat { .. }
            | ExprKind::Castable { .. }
            | ExprKind::Cast { .. } => {
                self.require_simple_operands(expr.kind.children(), construct)?;
                Simple
            }
        };
        Ok(self.record(expr.id, class))
    }

    /// Every operand must be classified and none of them may be updating.
    fn require_simple_operands<'e, I>(&mut self, operands: I, construct: &str) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'e Expr>,
    {
        for operand in operands {
            let class = self.classify_expr(operand)?;
            require_simple(class, construct, operand)?;
        }
        Ok(())
    }

    fn classify_flwor(&mut self, flwor: &Flwor) -> Result<ExpressionClassification, Error> {
        for clause in &flwor.clauses {
            let construct = clause.as_ref();
            for expr in clause.exprs() {
                let class = self.classify_expr(expr)?;
                match clause {
                    Clause::GroupBy(_) => require_simple(class, construct, expr)?,
                    _ => require_strictly_simple(class, construct, expr)?,
                }
            }
        }
        let class = self.classify_expr(&flwor.return_expr)?;
        Ok(passed_on(class))
    }

    fn is_updating_function(&self, call: &Expr, function: &FunctionIdentifier) -> Result<bool, Error> {
        let scope = self.context.scope_of(call.id, call.span)?;
        Ok(self
            .context
            .lookup_function(scope, function)
            .map_or(false, |signature| signature.updating))
    }
}

/// Members of a sequence or branches of a conditional must either all be
/// simple, or all be updating or vacuous.
fn combine_branches(
    classes: &[ExpressionClassification],
    construct: &str,
    expr: &Expr,
) -> Result<ExpressionClassification, Error> {
    if classes.iter().all(|c| *c == Simple) {
        return Ok(Simple);
    }
    if let Some(found) = classes.iter().find(|c| !c.is_updating_or_vacuous()) {
        return Err(invalid_position(
            construct,
            "all simple or all updating",
            *found,
            expr,
        )
        .with_help("an updating branch cannot be combined with a branch that returns a value"));
    }
    Ok(if classes.iter().all(|c| *c == Vacuous) {
        Vacuous
    } else {
        Updating
    })
}

/// Only the primitive update expressions are basic updating. Anything
/// passing their updates on is updating.
fn passed_on(class: ExpressionClassification) -> ExpressionClassification {
    match class {
        BasicUpdating => Updating,
        class => class,
    }
}

/// Statements in a block may mix simple and updating statements; updates are
/// applied statement by statement.
fn combine_block(classes: &[ExpressionClassification]) -> ExpressionClassification {
    if classes.iter().any(|c| c.is_updating()) {
        Updating
    } else if !classes.is_empty() && classes.iter().all(|c| *c == Vacuous) {
        Vacuous
    } else {
        Simple
    }
}

/// Rejects updating operands. Vacuous operands are accepted.
fn require_simple(class: ExpressionClassification, construct: &str, operand: &Expr) -> Result<(), Error> {
    if class.is_updating() {
        return Err(invalid_position(construct, "a simple", class, operand));
    }
    Ok(())
}

/// Rejects updating and vacuous operands.
fn require_strictly_simple(
    class: ExpressionClassification,
    construct: &str,
    operand: &Expr,
) -> Result<(), Error> {
    if class != Simple {
        return Err(invalid_position(construct, "a simple", class, operand));
    }
    Ok(())
}

fn invalid_position(
    construct: &str,
    expected: &'static str,
    found: ExpressionClassification,
    operand: &Expr,
) -> Error {
    Error::new(Reason::InvalidUpdatingPosition {
        construct: construct.to_string(),
        expected,
        found: format!("{found} expression"),
    })
    .with_span(operand.span)
}
