use std::collections::HashSet;

use waypoint_core::{CheckpointId, CheckpointIndex, LineIndex, SourceLocation, Span};
use waypoint_flow::LocalsAnalysis;
use waypoint_syntax::ast::{
    Block, Expr, ExprKind, Ident, Method, SourceUnit, Stmt, StmtKind, TypeDecl,
};
use waypoint_syntax::print_unit;

use crate::RewriteError;

/// Result of instrumenting one source unit.
#[derive(Debug)]
pub struct InstrumentedUnit {
    /// The rewritten AST.
    pub unit: SourceUnit,
    /// The rewritten AST rendered back to source text.
    pub source: String,
    /// Checkpoint positions and per-method id lists.
    pub index: CheckpointIndex,
}

/// Parses and instruments `text` in one step.
pub fn instrument_source(file: &str, text: &str) -> Result<InstrumentedUnit, RewriteError> {
    let unit = waypoint_syntax::parse(file, text)?;
    instrument(&unit, text)
}

/// Instruments a parsed unit. `text` is the source the unit was parsed from;
/// checkpoint locations refer to the original statement positions in it.
pub fn instrument(unit: &SourceUnit, text: &str) -> Result<InstrumentedUnit, RewriteError> {
    let mut rewriter = Rewriter {
        file: unit.file.clone(),
        line_index: LineIndex::new(text),
        next_id: 1,
        index: CheckpointIndex::new(),
        seen_methods: HashSet::new(),
    };

    let mut rewritten = unit.clone();
    for namespace in &mut rewritten.namespaces {
        let ns_name = namespace.name.text.clone();
        for ty in &mut namespace.types {
            rewriter.rewrite_type(&ns_name, ty)?;
        }
    }

    let source = print_unit(&rewritten);
    tracing::debug!(
        target = "waypoint.rewrite",
        file = %rewriter.file,
        checkpoints = rewriter.index.len(),
        "instrumented unit"
    );
    Ok(InstrumentedUnit {
        unit: rewritten,
        source,
        index: rewriter.index,
    })
}

struct Rewriter {
    file: String,
    line_index: LineIndex,
    next_id: u32,
    index: CheckpointIndex,
    seen_methods: HashSet<String>,
}

impl Rewriter {
    fn rewrite_type(&mut self, prefix: &str, ty: &mut TypeDecl) -> Result<(), RewriteError> {
        let type_prefix = format!("{prefix}.{}", ty.name.text);
        for method in &mut ty.methods {
            self.rewrite_method(&type_prefix, method)?;
        }
        for nested in &mut ty.nested {
            self.rewrite_type(&type_prefix, nested)?;
        }
        Ok(())
    }

    fn rewrite_method(&mut self, prefix: &str, method: &mut Method) -> Result<(), RewriteError> {
        let qualified = format!("{prefix}.{}", method.name.text);
        if !self.seen_methods.insert(qualified.clone()) {
            return Err(RewriteError::DuplicateMethod { name: qualified });
        }
        let Some(body) = method.body.take() else {
            return Ok(());
        };
        if is_already_wrapped(&body) {
            // Re-running the rewriter over instrumented source must not add
            // a second wrapper or re-checkpoint the injected calls.
            method.body = Some(body);
            return Ok(());
        }

        let analysis = LocalsAnalysis::of_method(&Method {
            body: Some(body.clone()),
            ..method.clone()
        });
        let params: Vec<String> = method.params.iter().map(|p| p.name.text.clone()).collect();
        let instrumented = self.instrument_block(&body, &qualified, &analysis, &params);

        let body_span = body.span;
        method.body = Some(Block {
            stmts: vec![
                call_stmt("push_frame", vec![str_expr(&qualified)]),
                Stmt {
                    kind: StmtKind::TryFinally {
                        body: instrumented,
                        finally: Block {
                            stmts: vec![call_stmt("pop_frame", Vec::new())],
                            span: Span::new(0, 0),
                        },
                    },
                    span: Span::new(0, 0),
                },
            ],
            span: body_span,
        });
        Ok(())
    }

    fn instrument_block(
        &mut self,
        block: &Block,
        method: &str,
        analysis: &LocalsAnalysis,
        params: &[String],
    ) -> Block {
        let mut stmts = Vec::with_capacity(block.stmts.len() * 2);
        for stmt in &block.stmts {
            if let StmtKind::Expr(expr) = &stmt.kind {
                if expr.debug_intrinsic().is_some() {
                    stmts.push(stmt.clone());
                    continue;
                }
            }

            let id = CheckpointId::from_raw(self.next_id);
            self.next_id += 1;
            let pos = self.line_index.line_col(stmt.span.start);
            self.index.record(
                id,
                method,
                SourceLocation {
                    file: self.file.clone(),
                    line: pos.line,
                    column: pos.column,
                },
            );

            // Data-flow failure degrades to the parameter list alone.
            let captured: Vec<String> = match analysis.visible_at(stmt) {
                Some(locals) => locals.iter().map(|v| v.name.clone()).collect(),
                None => params.to_vec(),
            };
            stmts.push(checkpoint_stmt(id, method, &captured));
            stmts.push(self.instrument_stmt(stmt, method, analysis, params));
        }
        Block {
            stmts,
            span: block.span,
        }
    }

    fn instrument_stmt(
        &mut self,
        stmt: &Stmt,
        method: &str,
        analysis: &LocalsAnalysis,
        params: &[String],
    ) -> Stmt {
        let kind = match &stmt.kind {
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => StmtKind::If {
                cond: cond.clone(),
                then_block: self.instrument_block(then_block, method, analysis, params),
                else_block: else_block
                    .as_ref()
                    .map(|b| self.instrument_block(b, method, analysis, params)),
            },
            StmtKind::While { cond, body } => StmtKind::While {
                cond: cond.clone(),
                body: self.instrument_block(body, method, analysis, params),
            },
            StmtKind::TryFinally { body, finally } => StmtKind::TryFinally {
                body: self.instrument_block(body, method, analysis, params),
                finally: self.instrument_block(finally, method, analysis, params),
            },
            StmtKind::Block(block) => {
                StmtKind::Block(self.instrument_block(block, method, analysis, params))
            }
            other => other.clone(),
        };
        Stmt {
            kind,
            span: stmt.span,
        }
    }
}

/// A method body counts as wrapped when it opens with the injected
/// `push_frame` call; those calls are not method declarations, so traversal
/// cannot recurse into them.
fn is_already_wrapped(body: &Block) -> bool {
    body.stmts.first().is_some_and(|stmt| {
        matches!(&stmt.kind, StmtKind::Expr(expr) if expr.debug_intrinsic() == Some("push_frame"))
    })
}

fn checkpoint_stmt(id: CheckpointId, method: &str, locals: &[String]) -> Stmt {
    let make_locals = Expr {
        kind: ExprKind::Call {
            path: vec![Ident::synthetic("make_locals")],
            args: locals
                .iter()
                .map(|name| Expr {
                    kind: ExprKind::Name(Ident::synthetic(name.clone())),
                    span: Span::new(0, 0),
                })
                .collect(),
        },
        span: Span::new(0, 0),
    };
    call_stmt(
        "checkpoint",
        vec![
            Expr {
                kind: ExprKind::Int(i64::from(id.raw())),
                span: Span::new(0, 0),
            },
            str_expr(method),
            make_locals,
        ],
    )
}

fn call_stmt(name: &str, args: Vec<Expr>) -> Stmt {
    Stmt {
        kind: StmtKind::Expr(Expr {
            kind: ExprKind::Call {
                path: vec![Ident::synthetic(name)],
                args,
            },
            span: Span::new(0, 0),
        }),
        span: Span::new(0, 0),
    }
}

fn str_expr(value: &str) -> Expr {
    Expr {
        kind: ExprKind::Str(value.to_string()),
        span: Span::new(0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCRIPT: &str = "\
namespace demo {
    type Main {
        fn run(n: int) -> int {
            let acc = 0;
            let i = 0;
            while (i < n) {
                acc = acc + i;
                i = i + 1;
            }
            return acc;
        }
    }
}
";

    fn ids(raw: &[u32]) -> Vec<CheckpointId> {
        raw.iter().copied().map(CheckpointId::from_raw).collect()
    }

    #[test]
    fn allocates_dense_ids_in_lexical_order() {
        let result = instrument_source("demo.wp", SCRIPT).unwrap();
        let method_ids = result.index.method_checkpoints("demo.Main.run").unwrap();
        assert_eq!(method_ids, ids(&[1, 2, 3, 4, 5, 6]).as_slice());

        let lines: Vec<u32> = method_ids
            .iter()
            .map(|id| result.index.location(*id).unwrap().line)
            .collect();
        // let acc; let i; while; acc = ...; i = ...; return.
        assert_eq!(lines, vec![4, 5, 6, 7, 8, 10]);
    }

    #[test]
    fn locations_point_at_the_original_statement() {
        let result = instrument_source("demo.wp", SCRIPT).unwrap();
        let loc = result.index.location(CheckpointId::from_raw(1)).unwrap();
        assert_eq!(loc.file, "demo.wp");
        assert_eq!(loc.line, 4);
        assert_eq!(loc.column, 13);
    }

    #[test]
    fn wraps_body_with_frame_push_and_guarded_pop() {
        let result = instrument_source("demo.wp", SCRIPT).unwrap();
        let body = result.unit.namespaces[0].types[0].methods[0]
            .body
            .as_ref()
            .unwrap();
        assert_eq!(body.stmts.len(), 2);
        assert!(matches!(&body.stmts[0].kind,
            StmtKind::Expr(expr) if expr.debug_intrinsic() == Some("push_frame")));
        let StmtKind::TryFinally { finally, .. } = &body.stmts[1].kind else {
            panic!("expected try/finally wrapper");
        };
        assert!(matches!(&finally.stmts[0].kind,
            StmtKind::Expr(expr) if expr.debug_intrinsic() == Some("pop_frame")));
    }

    #[test]
    fn checkpoint_captures_parameters_then_visible_locals() {
        let result = instrument_source("demo.wp", SCRIPT).unwrap();
        assert!(result.source.contains("checkpoint(1, \"demo.Main.run\", make_locals(n))"));
        assert!(result.source.contains("checkpoint(3, \"demo.Main.run\", make_locals(n, acc, i))"));
        assert!(result.source.contains("checkpoint(4, \"demo.Main.run\", make_locals(n, acc, i))"));
    }

    #[test]
    fn nested_types_use_minimally_qualified_names() {
        let source = "namespace app { type Outer { type Inner {
            fn go() { let x = 1; }
        } } }";
        let result = instrument_source("app.wp", source).unwrap();
        assert!(result
            .index
            .method_checkpoints("app.Outer.Inner.go")
            .is_some());
    }

    #[test]
    fn rewriting_twice_is_idempotent() {
        let first = instrument_source("demo.wp", SCRIPT).unwrap();
        let second = instrument_source("demo.wp", &first.source).unwrap();
        assert_eq!(second.source, first.source);
        assert!(second.index.is_empty());
        assert_eq!(
            first.source.matches("push_frame(").count(),
            second.source.matches("push_frame(").count()
        );
    }

    #[test]
    fn duplicate_methods_are_rejected() {
        let source = "namespace n { type T {
            fn f() { let x = 1; }
            fn f() { let y = 2; }
        } }";
        let err = instrument_source("t.wp", source).unwrap_err();
        assert!(matches!(err, RewriteError::DuplicateMethod { name } if name == "n.T.f"));
    }

    #[test]
    fn bodyless_declarations_are_not_wrapped() {
        let source = "namespace n { type T { fn stub(x: any) -> any; } }";
        let result = instrument_source("t.wp", source).unwrap();
        assert!(result.index.is_empty());
        assert!(!result.source.contains("push_frame"));
    }
}
