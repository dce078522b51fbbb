// Scope analysis: tags the expression that terminates each lexical
// scope (function body, branch arm, match-case body, loop body). The
// flag is an advisory hint for the back-end's lifetime tracker and does
// not affect typing.

use bon_ast::{BinOp, Expr, ExprKind, Function};
use bon_types::ModuleState;

pub fn run(state: &mut ModuleState) {
    for typeclass in state.typeclasses.values_mut() {
        for imp in &mut typeclass.impls {
            for method in imp.methods.values_mut() {
                mark_function(method);
            }
        }
    }
    for func in state.all_functions.values_mut() {
        mark_function(func);
    }
    for func in &mut state.toplevel_expressions {
        mark_function(func);
    }
}

fn mark_function(func: &mut Function) {
    mark(&mut func.body);
}

// Sequencing propagates into its RHS; conditionals and match propagate
// into every arm; everything else at the leaf position ends the scope.
fn mark(expr: &mut Expr) {
    match &mut expr.kind {
        ExprKind::Binary {
            op: BinOp::Seq,
            rhs,
            ..
        } => mark(rhs),
        ExprKind::If {
            then_body,
            else_body,
            ..
        } => {
            mark(then_body);
            if let Some(else_body) = else_body {
                mark(else_body);
            }
        }
        ExprKind::Match { cases, .. } => {
            for case in cases {
                mark(&mut case.body);
            }
        }
        _ => expr.ends_scope = true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bon_ast::{TypeEnv, TypeVarId};

    fn leaf(kind: ExprKind) -> Expr {
        Expr::new(kind, 0, 0, TypeVarId(0))
    }

    fn seq(lhs: Expr, rhs: Expr) -> Expr {
        Expr::new(
            ExprKind::Binary {
                op: BinOp::Seq,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                inherit_child_type: false,
                is_lvalue: false,
                type_env: TypeEnv::new(),
            },
            0,
            0,
            TypeVarId(0),
        )
    }

    #[test]
    fn test_sequence_marks_only_final_expression() {
        let mut expr = seq(leaf(ExprKind::Int(1)), leaf(ExprKind::Int(2)));
        mark(&mut expr);
        let ExprKind::Binary { lhs, rhs, .. } = &expr.kind else {
            unreachable!()
        };
        assert!(!lhs.ends_scope);
        assert!(rhs.ends_scope);
        assert!(!expr.ends_scope);
    }

    #[test]
    fn test_if_marks_both_arms() {
        let mut expr = leaf(ExprKind::If {
            cond: Box::new(leaf(ExprKind::Bool(true))),
            then_body: Box::new(leaf(ExprKind::Int(1))),
            else_body: Some(Box::new(leaf(ExprKind::Int(2)))),
        });
        mark(&mut expr);
        let ExprKind::If {
            cond,
            then_body,
            else_body,
        } = &expr.kind
        else {
            unreachable!()
        };
        assert!(!cond.ends_scope);
        assert!(then_body.ends_scope);
        assert!(else_body.as_ref().unwrap().ends_scope);
    }

    #[test]
    fn test_while_and_sizeof_are_leaves() {
        let mut loop_expr = leaf(ExprKind::While {
            cond: Box::new(leaf(ExprKind::Bool(true))),
            body: Box::new(leaf(ExprKind::Unit)),
        });
        mark(&mut loop_expr);
        assert!(loop_expr.ends_scope);

        let mut size = leaf(ExprKind::Sizeof {
            arg: Box::new(leaf(ExprKind::Int(4))),
        });
        mark(&mut size);
        assert!(size.ends_scope);
    }
}
