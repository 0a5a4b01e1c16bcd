//! Renders an AST back to source text.
//!
//! The rewriter materializes instrumented units through this printer before
//! handing them to the compiler facade. Output is deterministic: four-space
//! indentation, one statement per line.

use std::fmt::Write as _;

use crate::ast::{
    Block, Expr, ExprKind, Method, Namespace, SourceUnit, Stmt, StmtKind, TypeDecl, TypeRef,
};

#[must_use]
pub fn print_unit(unit: &SourceUnit) -> String {
    let mut out = String::new();
    for namespace in &unit.namespaces {
        print_namespace(&mut out, namespace);
    }
    out
}

fn print_namespace(out: &mut String, namespace: &Namespace) {
    let _ = writeln!(out, "namespace {} {{", namespace.name.text);
    for ty in &namespace.types {
        print_type(out, ty, 1);
    }
    out.push_str("}\n");
}

fn print_type(out: &mut String, ty: &TypeDecl, depth: usize) {
    indent(out, depth);
    let _ = writeln!(out, "type {} {{", ty.name.text);
    for method in &ty.methods {
        print_method(out, method, depth + 1);
    }
    for nested in &ty.nested {
        print_type(out, nested, depth + 1);
    }
    indent(out, depth);
    out.push_str("}\n");
}

fn print_method(out: &mut String, method: &Method, depth: usize) {
    indent(out, depth);
    let _ = write!(out, "fn {}(", method.name.text);
    for (idx, param) in method.params.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}: {}", param.name.text, param.ty.name());
    }
    out.push(')');
    if method.ret != TypeRef::Unit {
        let _ = write!(out, " -> {}", method.ret.name());
    }
    match &method.body {
        Some(body) => {
            out.push(' ');
            print_block(out, body, depth);
        }
        None => out.push_str(";\n"),
    }
}

fn print_block(out: &mut String, block: &Block, depth: usize) {
    out.push_str("{\n");
    for stmt in &block.stmts {
        print_stmt(out, stmt, depth + 1);
    }
    indent(out, depth);
    out.push_str("}\n");
}

fn print_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    indent(out, depth);
    match &stmt.kind {
        StmtKind::Let { name, ty, init } => {
            let _ = write!(out, "let {}", name.text);
            if let Some(ty) = ty {
                let _ = write!(out, ": {}", ty.name());
            }
            let _ = write!(out, " = ");
            print_expr(out, init, 0);
            out.push_str(";\n");
        }
        StmtKind::Assign { target, value } => {
            let _ = write!(out, "{} = ", target.text);
            print_expr(out, value, 0);
            out.push_str(";\n");
        }
        StmtKind::If {
            cond,
            then_block,
            else_block,
        } => {
            out.push_str("if (");
            print_expr(out, cond, 0);
            out.push_str(") ");
            print_block_inline(out, then_block, depth);
            if let Some(else_block) = else_block {
                trim_newline(out);
                out.push_str(" else ");
                print_block_inline(out, else_block, depth);
            }
        }
        StmtKind::While { cond, body } => {
            out.push_str("while (");
            print_expr(out, cond, 0);
            out.push_str(") ");
            print_block_inline(out, body, depth);
        }
        StmtKind::Return(value) => {
            out.push_str("return");
            if let Some(value) = value {
                out.push(' ');
                print_expr(out, value, 0);
            }
            out.push_str(";\n");
        }
        StmtKind::Throw(value) => {
            out.push_str("throw ");
            print_expr(out, value, 0);
            out.push_str(";\n");
        }
        StmtKind::TryFinally { body, finally } => {
            out.push_str("try ");
            print_block_inline(out, body, depth);
            trim_newline(out);
            out.push_str(" finally ");
            print_block_inline(out, finally, depth);
        }
        StmtKind::Block(block) => print_block_inline(out, block, depth),
        StmtKind::Expr(expr) => {
            print_expr(out, expr, 0);
            out.push_str(";\n");
        }
    }
}

fn print_block_inline(out: &mut String, block: &Block, depth: usize) {
    print_block(out, block, depth);
}

fn print_expr(out: &mut String, expr: &Expr, parent_prec: u8) {
    match &expr.kind {
        ExprKind::Unit => out.push_str("()"),
        ExprKind::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        ExprKind::Int(i) => {
            let _ = write!(out, "{i}");
        }
        ExprKind::Float(x) => {
            if x.fract() == 0.0 && x.is_finite() {
                let _ = write!(out, "{x:.1}");
            } else {
                let _ = write!(out, "{x}");
            }
        }
        ExprKind::Str(s) => {
            out.push('"');
            for ch in s.chars() {
                match ch {
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\r' => out.push_str("\\r"),
                    '\\' => out.push_str("\\\\"),
                    '"' => out.push_str("\\\""),
                    other => out.push(other),
                }
            }
            out.push('"');
        }
        ExprKind::Name(ident) => out.push_str(&ident.text),
        ExprKind::Unary { op, expr: inner } => {
            out.push(match op {
                crate::ast::UnaryOp::Neg => '-',
                crate::ast::UnaryOp::Not => '!',
            });
            print_expr(out, inner, u8::MAX);
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let prec = op.precedence();
            let parens = prec < parent_prec;
            if parens {
                out.push('(');
            }
            print_expr(out, lhs, prec);
            let _ = write!(out, " {} ", op.symbol());
            print_expr(out, rhs, prec + 1);
            if parens {
                out.push(')');
            }
        }
        ExprKind::Call { path, args } => {
            let joined: Vec<&str> = path.iter().map(|p| p.text.as_str()).collect();
            out.push_str(&joined.join("."));
            out.push('(');
            for (idx, arg) in args.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                print_expr(out, arg, 0);
            }
            out.push(')');
        }
    }
}

fn trim_newline(out: &mut String) {
    if out.ends_with('\n') {
        out.pop();
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("    ");
    }
}
