use anyhow::Result;

use super::Context;
use crate::ast::ast_fold::*;
use crate::ast::*;

/// Gives every expression and statement an id, keeping the ids already present.
///
/// Fresh ids start above the largest id found in the tree.
pub fn number_nodes(program: Program, context: &mut Context) -> Result<Program> {
    let mut highest = HighestId { highest: None };
    let program = highest.fold_program(program)?;
    if let Some(highest) = highest.highest {
        context.next_id = context.next_id.max(highest + 1);
    }

    NodeNumbering { context }.fold_program(program)
}

/// Assigns new ids to all nodes, replacing existing ones. Used on copied subtrees.
///
/// A copy is classified like its original.
pub fn renumber_expr(expr: Expr, context: &mut Context) -> Result<Expr> {
    Renumbering { context }.fold_expr(expr)
}

struct HighestId {
    highest: Option<usize>,
}

impl HighestId {
    fn see(&mut self, id: Option<usize>) {
        self.highest = self.highest.max(id);
    }
}

impl AstFold for HighestId {
    fn fold_expr(&mut self, mut expr: Expr) -> Result<Expr> {
        self.see(expr.id);
        expr.kind = self.fold_expr_kind(expr.kind)?;
        Ok(expr)
    }

    fn fold_statement(&mut self, mut statement: Statement) -> Result<Statement> {
        self.see(statement.id);
        statement.kind = fold_statement_kind(self, statement.kind)?;
        Ok(statement)
    }
}

struct NodeNumbering<'a> {
    context: &'a mut Context,
}

impl AstFold for NodeNumbering<'_> {
    fn fold_expr(&mut self, mut expr: Expr) -> Result<Expr> {
        if expr.id.is_none() {
            expr.id = Some(self.context.fresh_id());
        }
        expr.kind = self.fold_expr_kind(expr.kind)?;
        Ok(expr)
    }

    fn fold_statement(&mut self, mut statement: Statement) -> Result<Statement> {
        if statement.id.is_none() {
            statement.id = Some(self.context.fresh_id());
        }
        statement.kind = fold_statement_kind(self, statement.kind)?;
        Ok(statement)
    }
}

struct Renumbering<'a> {
    context: &'a mut Context,
}

impl AstFold for Renumbering<'_> {
    fn fold_expr(&mut self, mut expr: Expr) -> Result<Expr> {
        let class = self.context.classification_of(expr.id);
        let id = self.context.fresh_id();
        if let Some(class) = class {
            self.context.classifications.insert(id, class);
        }

        expr.id = Some(id);
        expr.kind = self.fold_expr_kind(expr.kind)?;
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::ExpressionClassification;

    #[test]
    fn test_number_nodes() {
        let mut given: Expr = Literal::Integer(1).into();
        given.id = Some(41);
        let body = Expr::from(ExprKind::Comma(vec![given, Expr::var("x")]));
        let program = Program::new(Module::main(Prolog::default(), body));

        let mut context = Context::default();
        let program = number_nodes(program, &mut context).unwrap();

        let statement = program.main.body.unwrap();
        let body = statement.kind.into_expr().unwrap();
        let members = body.kind.as_comma().unwrap();

        assert_eq!(members[0].id, Some(41));
        assert!(members[1].id.unwrap() > 41);
        assert!(body.id.unwrap() > 41);
        assert!(statement.id.is_some());
        assert_ne!(members[1].id, body.id);
    }

    #[test]
    fn test_renumbered_copy_keeps_classification() {
        let mut context = Context::default();
        let mut original: Expr = Literal::Integer(1).into();
        original.id = Some(context.fresh_id());
        context
            .classifications
            .insert(0, ExpressionClassification::Simple);

        let copy = renumber_expr(original.clone(), &mut context).unwrap();
        assert_ne!(copy.id, original.id);
        assert_eq!(
            context.classification_of(copy.id),
            Some(ExpressionClassification::Simple)
        );
    }
}
