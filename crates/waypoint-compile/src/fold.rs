//! Release-optimization pass: constant folding.
//!
//! Folds operators whose operands are literals. Operations that would fault
//! at runtime (division by zero, operand type mismatches) are left in place
//! so the fault still surfaces during execution. Debug compiles skip this
//! pass entirely to keep statement structure and line mappings untouched.

use crate::interp::apply_binary;
use crate::program::{Constant, Function, LExpr, LStmt, Program, UnOp};

pub(crate) fn fold_program(program: &mut Program) {
    for function in &mut program.functions {
        fold_function(function);
    }
}

fn fold_function(function: &mut Function) {
    for stmt in &mut function.body {
        fold_stmt(stmt);
    }
}

fn fold_stmt(stmt: &mut LStmt) {
    match stmt {
        LStmt::Assign { value, .. } => fold_expr(value),
        LStmt::Block(body) => body.iter_mut().for_each(fold_stmt),
        LStmt::If {
            cond,
            then_body,
            else_body,
        } => {
            fold_expr(cond);
            then_body.iter_mut().for_each(fold_stmt);
            else_body.iter_mut().for_each(fold_stmt);
        }
        LStmt::While { cond, body } => {
            fold_expr(cond);
            body.iter_mut().for_each(fold_stmt);
        }
        LStmt::Return(Some(value)) | LStmt::Throw(value) | LStmt::Expr(value) => fold_expr(value),
        LStmt::TryFinally { body, finally } => {
            body.iter_mut().for_each(fold_stmt);
            finally.iter_mut().for_each(fold_stmt);
        }
        LStmt::Return(None) | LStmt::PushFrame { .. } | LStmt::PopFrame => {}
        LStmt::Checkpoint { .. } => {}
    }
}

fn fold_expr(expr: &mut LExpr) {
    match expr {
        LExpr::Unary { op, expr: inner } => {
            fold_expr(inner);
            if let LExpr::Const(constant) = inner.as_ref() {
                let value = constant.to_value();
                let folded = match op {
                    UnOp::Neg => value.neg(),
                    UnOp::Not => value.not(),
                };
                if let Ok(value) = folded {
                    *expr = LExpr::Const(Constant::from_value(&value));
                }
            }
        }
        LExpr::Binary { op, lhs, rhs } => {
            fold_expr(lhs);
            fold_expr(rhs);
            if let (LExpr::Const(l), LExpr::Const(r)) = (lhs.as_ref(), rhs.as_ref()) {
                if let Ok(value) = apply_binary(*op, &l.to_value(), &r.to_value()) {
                    *expr = LExpr::Const(Constant::from_value(&value));
                }
            }
        }
        LExpr::Call { args, .. } => args.iter_mut().for_each(fold_expr),
        LExpr::Const(_) | LExpr::Local(_) => {}
    }
}
