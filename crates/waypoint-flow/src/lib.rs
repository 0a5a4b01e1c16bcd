//! Scope analysis over method bodies.
//!
//! For every statement in a method, computes the ordered list of locals the
//! rewriter may capture for that statement's checkpoint: parameters first (in
//! declaration order), then locals visible at the statement, deduplicated by
//! name and ordered by declaration position. A declaration is visible from
//! the statement *after* it to the end of its enclosing block; the statement
//! itself never sees its own binding, because the checkpoint fires before the
//! statement executes.

use std::collections::HashMap;

use waypoint_core::Span;
use waypoint_syntax::ast::{Block, Method, Stmt, StmtKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    Param,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleLocal {
    pub name: String,
    pub kind: LocalKind,
}

/// Per-statement visible-locals table for one method body.
#[derive(Debug, Default)]
pub struct LocalsAnalysis {
    by_stmt: HashMap<Span, Vec<VisibleLocal>>,
}

impl LocalsAnalysis {
    #[must_use]
    pub fn of_method(method: &Method) -> Self {
        let mut analysis = Collector {
            scope: method
                .params
                .iter()
                .map(|p| VisibleLocal {
                    name: p.name.text.clone(),
                    kind: LocalKind::Param,
                })
                .collect(),
            by_stmt: HashMap::new(),
        };
        if let Some(body) = &method.body {
            analysis.walk_block(body);
        }
        Self {
            by_stmt: analysis.by_stmt,
        }
    }

    /// The ordered locals visible at `stmt`, or `None` when the statement was
    /// not part of the analyzed body (the rewriter then falls back to the
    /// parameter list alone).
    #[must_use]
    pub fn visible_at(&self, stmt: &Stmt) -> Option<&[VisibleLocal]> {
        self.by_stmt.get(&stmt.span).map(Vec::as_slice)
    }
}

struct Collector {
    scope: Vec<VisibleLocal>,
    by_stmt: HashMap<Span, Vec<VisibleLocal>>,
}

impl Collector {
    fn walk_block(&mut self, block: &Block) {
        let mark = self.scope.len();
        for stmt in &block.stmts {
            self.walk_stmt(stmt);
        }
        self.scope.truncate(mark);
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        self.record(stmt);
        match &stmt.kind {
            StmtKind::Let { name, .. } => {
                self.scope.push(VisibleLocal {
                    name: name.text.clone(),
                    kind: LocalKind::Local,
                });
            }
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => {
                self.walk_block(then_block);
                if let Some(else_block) = else_block {
                    self.walk_block(else_block);
                }
            }
            StmtKind::While { body, .. } => self.walk_block(body),
            StmtKind::TryFinally { body, finally } => {
                self.walk_block(body);
                self.walk_block(finally);
            }
            StmtKind::Block(block) => self.walk_block(block),
            StmtKind::Assign { .. }
            | StmtKind::Return(_)
            | StmtKind::Throw(_)
            | StmtKind::Expr(_) => {}
        }
    }

    fn record(&mut self, stmt: &Stmt) {
        // Shadowing keeps the earliest declaration; names are unique per
        // frame in the captured list.
        let mut snapshot: Vec<VisibleLocal> = Vec::with_capacity(self.scope.len());
        for local in &self.scope {
            if !snapshot.iter().any(|v| v.name == local.name) {
                snapshot.push(local.clone());
            }
        }
        self.by_stmt.insert(stmt.span, snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use waypoint_syntax::parse;

    fn names(analysis: &LocalsAnalysis, stmt: &Stmt) -> Vec<String> {
        analysis
            .visible_at(stmt)
            .unwrap()
            .iter()
            .map(|v| v.name.clone())
            .collect()
    }

    #[test]
    fn params_come_first_then_locals_in_declaration_order() {
        let source = "namespace n { type T { fn f(a: int, b: int) {
            let x = 1;
            let y = 2;
            y = x;
        } } }";
        let unit = parse("t.wp", source).unwrap();
        let method = &unit.namespaces[0].types[0].methods[0];
        let analysis = LocalsAnalysis::of_method(method);
        let body = method.body.as_ref().unwrap();

        assert_eq!(names(&analysis, &body.stmts[0]), vec!["a", "b"]);
        assert_eq!(names(&analysis, &body.stmts[1]), vec!["a", "b", "x"]);
        assert_eq!(names(&analysis, &body.stmts[2]), vec!["a", "b", "x", "y"]);
    }

    #[test]
    fn block_scoped_locals_drop_out_after_their_block() {
        let source = "namespace n { type T { fn f() {
            let outer = 1;
            {
                let inner = 2;
                outer = inner;
            }
            outer = 3;
        } } }";
        let unit = parse("t.wp", source).unwrap();
        let method = &unit.namespaces[0].types[0].methods[0];
        let analysis = LocalsAnalysis::of_method(method);
        let body = method.body.as_ref().unwrap();

        let StmtKind::Block(inner_block) = &body.stmts[1].kind else {
            panic!("expected block");
        };
        assert_eq!(names(&analysis, &inner_block.stmts[1]), vec!["outer", "inner"]);
        assert_eq!(names(&analysis, &body.stmts[2]), vec!["outer"]);
    }

    #[test]
    fn shadowing_keeps_the_earliest_declaration_once() {
        let source = "namespace n { type T { fn f(x: int) {
            {
                let x = 2;
                x = 3;
            }
        } } }";
        let unit = parse("t.wp", source).unwrap();
        let method = &unit.namespaces[0].types[0].methods[0];
        let analysis = LocalsAnalysis::of_method(method);
        let body = method.body.as_ref().unwrap();
        let StmtKind::Block(inner) = &body.stmts[0].kind else {
            panic!("expected block");
        };
        assert_eq!(names(&analysis, &inner.stmts[1]), vec!["x"]);
    }

    #[test]
    fn loop_bodies_see_the_loop_invariant_scope() {
        let source = "namespace n { type T { fn f(n: int) {
            let i = 0;
            while (i < n) {
                let doubled = i * 2;
                i = i + 1;
            }
        } } }";
        let unit = parse("t.wp", source).unwrap();
        let method = &unit.namespaces[0].types[0].methods[0];
        let analysis = LocalsAnalysis::of_method(method);
        let body = method.body.as_ref().unwrap();
        let StmtKind::While { body: loop_body, .. } = &body.stmts[1].kind else {
            panic!("expected while");
        };
        assert_eq!(names(&analysis, &loop_body.stmts[0]), vec!["n", "i"]);
        assert_eq!(
            names(&analysis, &loop_body.stmts[1]),
            vec!["n", "i", "doubled"]
        );
    }
}
