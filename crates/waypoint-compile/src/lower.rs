//! Lowers a parsed unit to the executable [`Program`] form.
//!
//! Two passes: collect every method signature, then lower bodies with names
//! resolved to frame slots and calls resolved to function ids. All
//! error-severity diagnostics are collected before the compile fails, so the
//! caller sees the complete list.

use std::collections::HashMap;

use waypoint_core::{CheckpointId, LineIndex, Span};
use waypoint_syntax::ast::{self, Expr, ExprKind, Method, SourceUnit, Stmt, StmtKind, TypeDecl};

use crate::diagnostics::{Diagnostic, Severity};
use crate::program::{BinOp, Constant, Function, FunctionId, LExpr, LStmt, Program, UnOp};

pub(crate) struct LowerOutput {
    pub program: Program,
    pub warnings: Vec<Diagnostic>,
}

pub(crate) fn lower_unit(unit: &SourceUnit, text: &str) -> Result<LowerOutput, Vec<Diagnostic>> {
    let mut ctx = Context {
        file: unit.file.clone(),
        line_index: LineIndex::new(text),
        signatures: HashMap::new(),
        diagnostics: Vec::new(),
    };

    let mut methods: Vec<(String, &Method)> = Vec::new();
    for namespace in &unit.namespaces {
        for ty in &namespace.types {
            collect_methods(&namespace.name.text, ty, &mut methods);
        }
    }
    for (index, (qualified, method)) in methods.iter().enumerate() {
        ctx.signatures.insert(
            qualified.clone(),
            Signature {
                id: FunctionId::new(index as u32),
                arity: method.params.len(),
            },
        );
    }

    let mut functions = Vec::with_capacity(methods.len());
    for (qualified, method) in &methods {
        functions.push(ctx.lower_method(qualified, method));
    }

    let (errors, warnings): (Vec<_>, Vec<_>) =
        ctx.diagnostics.into_iter().partition(Diagnostic::is_error);
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(LowerOutput {
        program: Program {
            file: unit.file.clone(),
            functions,
        },
        warnings,
    })
}

fn collect_methods<'a>(prefix: &str, ty: &'a TypeDecl, out: &mut Vec<(String, &'a Method)>) {
    let type_prefix = format!("{prefix}.{}", ty.name.text);
    for method in &ty.methods {
        out.push((format!("{type_prefix}.{}", method.name.text), method));
    }
    for nested in &ty.nested {
        collect_methods(&type_prefix, nested, out);
    }
}

#[derive(Clone, Copy)]
struct Signature {
    id: FunctionId,
    arity: usize,
}

struct Context {
    file: String,
    line_index: LineIndex,
    signatures: HashMap<String, Signature>,
    diagnostics: Vec<Diagnostic>,
}

impl Context {
    fn lower_method(&mut self, qualified: &str, method: &Method) -> Function {
        let mut lowerer = BodyLowerer {
            ctx: self,
            qualified,
            slots: Vec::new(),
            bindings: Vec::new(),
        };
        for param in &method.params {
            lowerer.declare(&param.name.text);
        }
        let body = match &method.body {
            Some(block) => lowerer.lower_stmts(&block.stmts),
            // Bodyless declarations exist for signatures only; invoking one
            // returns unit.
            None => Vec::new(),
        };
        let slots = lowerer.slots.len() as u16;
        Function {
            name: qualified.to_string(),
            params: method.params.iter().map(|p| p.name.text.clone()).collect(),
            slots,
            body,
        }
    }

    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.diagnose(span, Severity::Error, message);
    }

    fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.diagnose(span, Severity::Warning, message);
    }

    fn diagnose(&mut self, span: Span, severity: Severity, message: impl Into<String>) {
        let pos = self.line_index.line_col(span.start);
        self.diagnostics.push(Diagnostic {
            file: self.file.clone(),
            line: pos.line,
            column: pos.column,
            severity,
            message: message.into(),
        });
    }
}

struct BodyLowerer<'a> {
    ctx: &'a mut Context,
    qualified: &'a str,
    /// Slot table; index is the runtime slot, value is the surface name.
    slots: Vec<String>,
    /// Active bindings, innermost last.
    bindings: Vec<(String, u16)>,
}

impl BodyLowerer<'_> {
    fn lower_stmts(&mut self, stmts: &[Stmt]) -> Vec<LStmt> {
        let mark = self.bindings.len();
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            if let Some(lowered) = self.lower_stmt(stmt, mark) {
                out.push(lowered);
            }
        }
        self.bindings.truncate(mark);
        out
    }

    fn lower_stmt(&mut self, stmt: &Stmt, block_mark: usize) -> Option<LStmt> {
        match &stmt.kind {
            StmtKind::Let { name, init, .. } => {
                let value = self.lower_expr(init);
                if self.bindings[block_mark..].iter().any(|(n, _)| n == &name.text) {
                    self.ctx.error(
                        name.span,
                        format!("duplicate declaration of `{}` in this block", name.text),
                    );
                } else if self.resolve(&name.text).is_some() {
                    self.ctx.warning(
                        name.span,
                        format!("declaration of `{}` shadows an earlier declaration", name.text),
                    );
                }
                let slot = self.declare(&name.text);
                Some(LStmt::Assign { slot, value })
            }
            StmtKind::Assign { target, value } => {
                let value = self.lower_expr(value);
                let slot = self.resolve(&target.text).unwrap_or_else(|| {
                    self.ctx.error(
                        target.span,
                        format!("assignment to unresolved name `{}`", target.text),
                    );
                    0
                });
                Some(LStmt::Assign { slot, value })
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => Some(LStmt::If {
                cond: self.lower_expr(cond),
                then_body: self.lower_stmts(&then_block.stmts),
                else_body: else_block
                    .as_ref()
                    .map(|b| self.lower_stmts(&b.stmts))
                    .unwrap_or_default(),
            }),
            StmtKind::While { cond, body } => Some(LStmt::While {
                cond: self.lower_expr(cond),
                body: self.lower_stmts(&body.stmts),
            }),
            StmtKind::Return(value) => {
                Some(LStmt::Return(value.as_ref().map(|v| self.lower_expr(v))))
            }
            StmtKind::Throw(value) => Some(LStmt::Throw(self.lower_expr(value))),
            StmtKind::TryFinally { body, finally } => Some(LStmt::TryFinally {
                body: self.lower_stmts(&body.stmts),
                finally: self.lower_stmts(&finally.stmts),
            }),
            StmtKind::Block(block) => Some(LStmt::Block(self.lower_stmts(&block.stmts))),
            StmtKind::Expr(expr) => self.lower_expr_stmt(expr),
        }
    }

    /// Expression statements are where the injected runtime intrinsics
    /// surface; everything else lowers to a plain evaluated-and-discarded
    /// expression.
    fn lower_expr_stmt(&mut self, expr: &Expr) -> Option<LStmt> {
        let Some(intrinsic) = expr.debug_intrinsic() else {
            return Some(LStmt::Expr(self.lower_expr(expr)));
        };
        let ExprKind::Call { args, .. } = &expr.kind else {
            return Some(LStmt::Expr(self.lower_expr(expr)));
        };
        match intrinsic {
            "push_frame" => match args.as_slice() {
                [Expr {
                    kind: ExprKind::Str(method),
                    ..
                }] => Some(LStmt::PushFrame {
                    method: method.clone(),
                }),
                _ => {
                    self.ctx
                        .error(expr.span, "push_frame expects a single string literal");
                    None
                }
            },
            "pop_frame" => {
                if args.is_empty() {
                    Some(LStmt::PopFrame)
                } else {
                    self.ctx.error(expr.span, "pop_frame takes no arguments");
                    None
                }
            }
            "checkpoint" => self.lower_checkpoint(expr, args),
            _ => {
                self.ctx
                    .error(expr.span, "make_locals is only valid inside checkpoint");
                None
            }
        }
    }

    fn lower_checkpoint(&mut self, expr: &Expr, args: &[Expr]) -> Option<LStmt> {
        let [id_arg, method_arg, locals_arg] = args else {
            self.ctx
                .error(expr.span, "checkpoint expects (id, method, make_locals(...))");
            return None;
        };
        let ExprKind::Int(raw_id) = id_arg.kind else {
            self.ctx.error(id_arg.span, "checkpoint id must be an integer literal");
            return None;
        };
        let ExprKind::Str(method) = &method_arg.kind else {
            self.ctx
                .error(method_arg.span, "checkpoint method must be a string literal");
            return None;
        };
        let ExprKind::Call { path, args: names } = &locals_arg.kind else {
            self.ctx
                .error(locals_arg.span, "checkpoint locals must be a make_locals call");
            return None;
        };
        if path.len() != 1 || path[0].text != "make_locals" {
            self.ctx
                .error(locals_arg.span, "checkpoint locals must be a make_locals call");
            return None;
        }
        let id = u32::try_from(raw_id).ok().filter(|raw| *raw > 0);
        let Some(id) = id else {
            self.ctx
                .error(id_arg.span, "checkpoint id must be a positive integer");
            return None;
        };

        let mut locals = Vec::with_capacity(names.len());
        for name in names {
            let ExprKind::Name(ident) = &name.kind else {
                self.ctx
                    .error(name.span, "make_locals arguments must be identifiers");
                continue;
            };
            match self.resolve(&ident.text) {
                Some(slot) => locals.push((ident.text.clone(), slot)),
                None => {
                    // The rewriter only captures names it saw declared, so a
                    // miss means hand-edited instrumentation; degrade rather
                    // than reject the unit.
                    tracing::warn!(
                        target = "waypoint.compile",
                        name = %ident.text,
                        method = %self.qualified,
                        "dropping unresolved captured local"
                    );
                }
            }
        }
        Some(LStmt::Checkpoint {
            id: CheckpointId::from_raw(id),
            method: method.clone(),
            locals,
        })
    }

    fn lower_expr(&mut self, expr: &Expr) -> LExpr {
        match &expr.kind {
            ExprKind::Unit => LExpr::Const(Constant::Unit),
            ExprKind::Bool(b) => LExpr::Const(Constant::Bool(*b)),
            ExprKind::Int(i) => LExpr::Const(Constant::Int(*i)),
            ExprKind::Float(x) => LExpr::Const(Constant::Float(*x)),
            ExprKind::Str(s) => LExpr::Const(Constant::Str(s.clone())),
            ExprKind::Name(ident) => match self.resolve(&ident.text) {
                Some(slot) => LExpr::Local(slot),
                None => {
                    self.ctx
                        .error(ident.span, format!("unresolved name `{}`", ident.text));
                    LExpr::Const(Constant::Unit)
                }
            },
            ExprKind::Unary { op, expr: inner } => LExpr::Unary {
                op: match op {
                    ast::UnaryOp::Neg => UnOp::Neg,
                    ast::UnaryOp::Not => UnOp::Not,
                },
                expr: Box::new(self.lower_expr(inner)),
            },
            ExprKind::Binary { op, lhs, rhs } => LExpr::Binary {
                op: lower_bin_op(*op),
                lhs: Box::new(self.lower_expr(lhs)),
                rhs: Box::new(self.lower_expr(rhs)),
            },
            ExprKind::Call { path, args } => self.lower_call(expr, path, args),
        }
    }

    fn lower_call(&mut self, expr: &Expr, path: &[ast::Ident], args: &[Expr]) -> LExpr {
        if expr.debug_intrinsic().is_some() {
            self.ctx.error(
                expr.span,
                "debug intrinsics cannot be used in expression position",
            );
            return LExpr::Const(Constant::Unit);
        }

        let joined: Vec<&str> = path.iter().map(|p| p.text.as_str()).collect();
        let joined = joined.join(".");
        let qualified = self.resolve_callee(&joined);
        let lowered_args: Vec<LExpr> = args.iter().map(|a| self.lower_expr(a)).collect();

        let Some(qualified) = qualified else {
            self.ctx
                .error(expr.span, format!("unresolved method `{joined}`"));
            return LExpr::Const(Constant::Unit);
        };
        let signature = self.ctx.signatures[&qualified];
        if signature.arity != args.len() {
            self.ctx.error(
                expr.span,
                format!(
                    "method `{qualified}` expects {} argument(s), got {}",
                    signature.arity,
                    args.len()
                ),
            );
        }
        LExpr::Call {
            target: signature.id,
            name: qualified,
            args: lowered_args,
        }
    }

    /// Unqualified calls resolve against the enclosing type; qualified calls
    /// resolve absolutely, then with the enclosing namespace prefixed.
    fn resolve_callee(&self, joined: &str) -> Option<String> {
        if !joined.contains('.') {
            let (prefix, _) = self.qualified.rsplit_once('.')?;
            let candidate = format!("{prefix}.{joined}");
            return self
                .ctx
                .signatures
                .contains_key(&candidate)
                .then_some(candidate);
        }
        if self.ctx.signatures.contains_key(joined) {
            return Some(joined.to_string());
        }
        let (namespace, _) = self.qualified.split_once('.')?;
        let candidate = format!("{namespace}.{joined}");
        self.ctx
            .signatures
            .contains_key(&candidate)
            .then_some(candidate)
    }

    fn declare(&mut self, name: &str) -> u16 {
        let slot = self.slots.len() as u16;
        self.slots.push(name.to_string());
        self.bindings.push((name.to_string(), slot));
        slot
    }

    fn resolve(&self, name: &str) -> Option<u16> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, slot)| *slot)
    }
}

fn lower_bin_op(op: ast::BinaryOp) -> BinOp {
    match op {
        ast::BinaryOp::Add => BinOp::Add,
        ast::BinaryOp::Sub => BinOp::Sub,
        ast::BinaryOp::Mul => BinOp::Mul,
        ast::BinaryOp::Div => BinOp::Div,
        ast::BinaryOp::Rem => BinOp::Rem,
        ast::BinaryOp::Eq => BinOp::Eq,
        ast::BinaryOp::NotEq => BinOp::NotEq,
        ast::BinaryOp::Lt => BinOp::Lt,
        ast::BinaryOp::LtEq => BinOp::LtEq,
        ast::BinaryOp::Gt => BinOp::Gt,
        ast::BinaryOp::GtEq => BinOp::GtEq,
        ast::BinaryOp::And => BinOp::And,
        ast::BinaryOp::Or => BinOp::Or,
    }
}
