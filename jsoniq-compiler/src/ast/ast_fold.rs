//! A trait to "fold" a JSONiq AST (similar to a visitor), so we can transitively
//! apply some logic to a whole tree by just defining how we want to handle each
//! type.
use anyhow::Result;
use itertools::Itertools;

use super::*;

// Fold pattern:
// - https://rust-unofficial.github.io/patterns/patterns/creational/fold.html
// Good discussions on the visitor / fold pattern:
// - https://github.com/rust-unofficial/patterns/discussions/236 (within this,
//   this comment looked interesting: https://github.com/rust-unofficial/patterns/discussions/236#discussioncomment-393517)
// - https://news.ycombinator.com/item?id=25620110

// For some functions, we want to call a default impl, because copying &
// pasting everything apart from a specific match is lots of repetition. So
// we define a function outside the trait, by default call it, and let
// implementors override the default while calling the function directly for
// some cases. Ref https://stackoverflow.com/a/66077767/3064736
pub trait AstFold {
    fn fold_program(&mut self, program: Program) -> Result<Program> {
        fold_program(self, program)
    }
    fn fold_module(&mut self, module: Module) -> Result<Module> {
        fold_module(self, module)
    }
    fn fold_declaration(&mut self, declaration: Declaration) -> Result<Declaration> {
        fold_declaration(self, declaration)
    }
    fn fold_func_decl(&mut self, func: FuncDecl) -> Result<FuncDecl> {
        fold_func_decl(self, func)
    }
    fn fold_statement(&mut self, mut statement: Statement) -> Result<Statement> {
        statement.kind = fold_statement_kind(self, statement.kind)?;
        Ok(statement)
    }
    fn fold_expr(&mut self, mut expr: Expr) -> Result<Expr> {
        expr.kind = self.fold_expr_kind(expr.kind)?;
        Ok(expr)
    }
    fn fold_expr_kind(&mut self, kind: ExprKind) -> Result<ExprKind> {
        fold_expr_kind(self, kind)
    }
    fn fold_exprs(&mut self, exprs: Vec<Expr>) -> Result<Vec<Expr>> {
        exprs.into_iter().map(|e| self.fold_expr(e)).try_collect()
    }
    fn fold_flwor(&mut self, flwor: Flwor) -> Result<Flwor> {
        fold_flwor(self, flwor)
    }
    fn fold_clause(&mut self, clause: Clause) -> Result<Clause> {
        fold_clause(self, clause)
    }
    fn fold_function_call(&mut self, call: FunctionCall) -> Result<FunctionCall> {
        fold_function_call(self, call)
    }
}

fn fold_box<T: ?Sized + AstFold>(fold: &mut T, expr: Box<Expr>) -> Result<Box<Expr>> {
    Ok(Box::new(fold.fold_expr(*expr)?))
}

fn fold_optional_box<T: ?Sized + AstFold>(
    fold: &mut T,
    expr: Option<Box<Expr>>,
) -> Result<Option<Box<Expr>>> {
    expr.map(|e| fold_box(fold, e)).transpose()
}

pub fn fold_program<T: ?Sized + AstFold>(fold: &mut T, program: Program) -> Result<Program> {
    Ok(Program {
        main: fold.fold_module(program.main)?,
        libraries: program
            .libraries
            .into_iter()
            .map(|(namespace, module)| Ok((namespace, fold.fold_module(module)?)))
            .collect::<Result<_>>()?,
    })
}

pub fn fold_module<T: ?Sized + AstFold>(fold: &mut T, module: Module) -> Result<Module> {
    Ok(Module {
        namespace: module.namespace,
        prolog: Prolog {
            imports: module.prolog.imports,
            declarations: module
                .prolog
                .declarations
                .into_iter()
                .map(|d| fold.fold_declaration(d))
                .try_collect()?,
        },
        body: module.body.map(|b| fold.fold_statement(b)).transpose()?,
    })
}

pub fn fold_declaration<T: ?Sized + AstFold>(
    fold: &mut T,
    declaration: Declaration,
) -> Result<Declaration> {
    Ok(match declaration {
        Declaration::Variable(var) => Declaration::Variable(VarDecl {
            expr: var.expr.map(|e| fold.fold_expr(e)).transpose()?,
            ..var
        }),
        Declaration::Function(func) => Declaration::Function(fold.fold_func_decl(func)?),
        Declaration::Type(ty) => Declaration::Type(ty),
    })
}

pub fn fold_func_decl<T: ?Sized + AstFold>(fold: &mut T, func: FuncDecl) -> Result<FuncDecl> {
    Ok(FuncDecl {
        body: func.body.map(|b| fold.fold_expr(b)).transpose()?,
        ..func
    })
}

pub fn fold_statement_kind<T: ?Sized + AstFold>(
    fold: &mut T,
    kind: StatementKind,
) -> Result<StatementKind> {
    use StatementKind::*;
    Ok(match kind {
        Expr(expr) => Expr(fold.fold_expr(expr)?),
        Block(statements) => Block(
            statements
                .into_iter()
                .map(|s| fold.fold_statement(s))
                .try_collect()?,
        ),
        VarDecl { var, ty, expr } => VarDecl {
            var,
            ty,
            expr: expr.map(|e| fold.fold_expr(e)).transpose()?,
        },
        Assign { var, expr } => Assign {
            var,
            expr: fold.fold_expr(expr)?,
        },
        If {
            condition,
            then_branch,
            else_branch,
        } => If {
            condition: fold.fold_expr(condition)?,
            then_branch: Box::new(fold.fold_statement(*then_branch)?),
            else_branch: else_branch
                .map(|s| fold.fold_statement(*s).map(Box::new))
                .transpose()?,
        },
        While { condition, body } => While {
            condition: fold.fold_expr(condition)?,
            body: Box::new(fold.fold_statement(*body)?),
        },
        Exit { expr } => Exit {
            expr: fold.fold_expr(expr)?,
        },
        Break => Break,
        Continue => Continue,
    })
}

pub fn fold_expr_kind<T: ?Sized + AstFold>(fold: &mut T, kind: ExprKind) -> Result<ExprKind> {
    use ExprKind::*;
    Ok(match kind {
        Comma(exprs) => Comma(fold.fold_exprs(exprs)?),
        Unary { op, expr } => Unary {
            op,
            expr: fold_box(fold, expr)?,
        },
        Binary { left, op, right } => Binary {
            left: fold_box(fold, left)?,
            op,
            right: fold_box(fold, right)?,
        },
        If {
            condition,
            then_branch,
            else_branch,
        } => If {
            condition: fold_box(fold, condition)?,
            then_branch: fold_box(fold, then_branch)?,
            else_branch: fold_box(fold, else_branch)?,
        },
        Switch {
            condition,
            cases,
            default,
        } => Switch {
            condition: fold_box(fold, condition)?,
            cases: cases
                .into_iter()
                .map(|case| -> Result<_> {
                    Ok(SwitchCase {
                        tests: fold.fold_exprs(case.tests)?,
                        result: fold.fold_expr(case.result)?,
                    })
                })
                .try_collect()?,
            default: fold_box(fold, default)?,
        },
        TypeSwitch {
            condition,
            cases,
            default,
        } => TypeSwitch {
            condition: fold_box(fold, condition)?,
            cases: cases
                .into_iter()
                .map(|case| -> Result<_> {
                    Ok(TypeSwitchCase {
                        result: fold.fold_expr(case.result)?,
                        ..case
                    })
                })
                .try_collect()?,
            default: TypeSwitchDefault {
                var: default.var,
                result: fold_box(fold, default.result)?,
            },
        },
        Flwor(flwor) => Flwor(fold.fold_flwor(flwor)?),
        Quantified {
            quantifier,
            bindings,
            satisfies,
        } => Quantified {
            quantifier,
            bindings: bindings
                .into_iter()
                .map(|b| -> Result<_> {
                    Ok(QuantifiedBinding {
                        expr: fold.fold_expr(b.expr)?,
                        ..b
                    })
                })
                .try_collect()?,
            satisfies: fold_box(fold, satisfies)?,
        },
        FunctionCall(call) => FunctionCall(fold.fold_function_call(call)?),
        InlineFunction(func) => InlineFunction(self::InlineFunction {
            body: fold_box(fold, func.body)?,
            ..func
        }),
        DynamicCall { function, args } => DynamicCall {
            function: fold_box(fold, function)?,
            args: fold.fold_exprs(args)?,
        },
        ObjectLookup { object, key } => ObjectLookup {
            object: fold_box(fold, object)?,
            key: fold_box(fold, key)?,
        },
        ArrayLookup { array, index } => ArrayLookup {
            array: fold_box(fold, array)?,
            index: fold_box(fold, index)?,
        },
        ArrayUnbox(expr) => ArrayUnbox(fold_box(fold, expr)?),
        Filter { expr, predicate } => Filter {
            expr: fold_box(fold, expr)?,
            predicate: fold_box(fold, predicate)?,
        },
        Object(ObjectConstructor::Pairs(pairs)) => Object(ObjectConstructor::Pairs(
            pairs
                .into_iter()
                .map(|p| -> Result<_> {
                    Ok(ObjectPair {
                        key: fold.fold_expr(p.key)?,
                        value: fold.fold_expr(p.value)?,
                    })
                })
                .try_collect()?,
        )),
        Object(ObjectConstructor::Merge(exprs)) => {
            Object(ObjectConstructor::Merge(fold.fold_exprs(exprs)?))
        }
        Array { content } => Array {
            content: fold_optional_box(fold, content)?,
        },
        InstanceOf { expr, ty } => InstanceOf {
            expr: fold_box(fold, expr)?,
            ty,
        },
        Treat { expr, ty } => Treat {
            expr: fold_box(fold, expr)?,
            ty,
        },
        Castable { expr, ty } => Castable {
            expr: fold_box(fold, expr)?,
            ty,
        },
        Cast { expr, ty } => Cast {
            expr: fold_box(fold, expr)?,
            ty,
        },
        Delete { target, locator } => Delete {
            target: fold_box(fold, target)?,
            locator: fold_box(fold, locator)?,
        },
        Insert {
            target,
            content,
            position,
        } => Insert {
            target: fold_box(fold, target)?,
            content: fold_box(fold, content)?,
            position: fold_optional_box(fold, position)?,
        },
        Replace {
            target,
            locator,
            replacement,
        } => Replace {
            target: fold_box(fold, target)?,
            locator: fold_box(fold, locator)?,
            replacement: fold_box(fold, replacement)?,
        },
        Rename {
            target,
            locator,
            new_name,
        } => Rename {
            target: fold_box(fold, target)?,
            locator: fold_box(fold, locator)?,
            new_name: fold_box(fold, new_name)?,
        },
        Append { target, content } => Append {
            target: fold_box(fold, target)?,
            content: fold_box(fold, content)?,
        },
        Transform(transform) => Transform(self::Transform {
            copies: transform
                .copies
                .into_iter()
                .map(|c| -> Result<_> {
                    Ok(CopyBinding {
                        expr: fold.fold_expr(c.expr)?,
                        ..c
                    })
                })
                .try_collect()?,
            modify: fold_box(fold, transform.modify)?,
            return_expr: fold_box(fold, transform.return_expr)?,
        }),
        // None of these contain any sub-expressions
        Literal(_) | VarRef(_) | ContextItem | NamedFunctionRef(_) => kind,
    })
}

pub fn fold_flwor<T: ?Sized + AstFold>(fold: &mut T, flwor: Flwor) -> Result<Flwor> {
    Ok(Flwor {
        clauses: flwor
            .clauses
            .into_iter()
            .map(|c| fold.fold_clause(c))
            .try_collect()?,
        return_expr: fold_box(fold, flwor.return_expr)?,
    })
}

pub fn fold_clause<T: ?Sized + AstFold>(fold: &mut T, clause: Clause) -> Result<Clause> {
    Ok(match clause {
        Clause::For(f) => Clause::For(ForClause {
            expr: fold.fold_expr(f.expr)?,
            ..f
        }),
        Clause::Let(l) => Clause::Let(LetClause {
            expr: fold.fold_expr(l.expr)?,
            ..l
        }),
        Clause::Where(e) => Clause::Where(fold.fold_expr(e)?),
        Clause::GroupBy(specs) => Clause::GroupBy(
            specs
                .into_iter()
                .map(|s| -> Result<_> {
                    Ok(GroupingSpec {
                        expr: s.expr.map(|e| fold.fold_expr(e)).transpose()?,
                        ..s
                    })
                })
                .try_collect()?,
        ),
        Clause::OrderBy(order_by) => Clause::OrderBy(OrderByClause {
            specs: order_by
                .specs
                .into_iter()
                .map(|s| -> Result<_> {
                    Ok(OrderSpec {
                        expr: fold.fold_expr(s.expr)?,
                        ..s
                    })
                })
                .try_collect()?,
            stable: order_by.stable,
        }),
        Clause::Count(name) => Clause::Count(name),
    })
}

pub fn fold_function_call<T: ?Sized + AstFold>(
    fold: &mut T,
    call: FunctionCall,
) -> Result<FunctionCall> {
    Ok(FunctionCall {
        name: call.name,
        args: call
            .args
            .into_iter()
            .map(|a| a.map(|e| fold.fold_expr(e)).transpose())
            .try_collect()?,
    })
}
