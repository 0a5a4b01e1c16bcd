use thiserror::Error;
use waypoint_core::{LineIndex, Span};

use crate::ast::{
    BinaryOp, Block, Expr, ExprKind, Ident, Method, Namespace, Param, SourceUnit, Stmt, StmtKind,
    TypeDecl, TypeRef, UnaryOp,
};
use crate::lexer::{lex, Token, TokenKind};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{file}:{line}:{column}: {message}")]
pub struct ParseError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// Parses one source unit. Malformed source is fatal; there is no partial
/// output for the rewriter to mis-instrument.
pub fn parse(file: &str, text: &str) -> Result<SourceUnit, ParseError> {
    let tokens: Vec<Token> = lex(text)
        .into_iter()
        .filter(|t| !t.kind.is_trivia())
        .collect();
    let mut parser = Parser {
        file,
        text,
        line_index: LineIndex::new(text),
        tokens,
        pos: 0,
    };
    parser.parse_unit()
}

struct Parser<'a> {
    file: &'a str,
    text: &'a str,
    line_index: LineIndex,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_unit(&mut self) -> Result<SourceUnit, ParseError> {
        let mut namespaces = Vec::new();
        while !self.at(TokenKind::Eof) {
            namespaces.push(self.parse_namespace()?);
        }
        Ok(SourceUnit {
            file: self.file.to_string(),
            namespaces,
        })
    }

    fn parse_namespace(&mut self) -> Result<Namespace, ParseError> {
        self.expect(TokenKind::NamespaceKw, "`namespace`")?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut types = Vec::new();
        while !self.at(TokenKind::RBrace) {
            types.push(self.parse_type_decl()?);
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Namespace { name, types })
    }

    fn parse_type_decl(&mut self) -> Result<TypeDecl, ParseError> {
        self.expect(TokenKind::TypeKw, "`type`")?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut methods = Vec::new();
        let mut nested = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::FnKw => methods.push(self.parse_method()?),
                TokenKind::TypeKw => nested.push(self.parse_type_decl()?),
                TokenKind::RBrace => break,
                _ => return Err(self.error_here("expected `fn`, `type`, or `}`")),
            }
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(TypeDecl {
            name,
            methods,
            nested,
        })
    }

    fn parse_method(&mut self) -> Result<Method, ParseError> {
        let start = self.peek().span.start;
        self.expect(TokenKind::FnKw, "`fn`")?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RParen) {
            if !params.is_empty() {
                self.expect(TokenKind::Comma, "`,`")?;
            }
            let pname = self.expect_ident()?;
            self.expect(TokenKind::Colon, "`:`")?;
            let ty = self.parse_type_ref()?;
            params.push(Param { name: pname, ty });
        }
        self.expect(TokenKind::RParen, "`)`")?;
        let ret = if self.eat(TokenKind::Arrow) {
            self.parse_type_ref()?
        } else {
            TypeRef::Unit
        };
        let body = if self.at(TokenKind::LBrace) {
            Some(self.parse_block()?)
        } else {
            self.expect(TokenKind::Semicolon, "`;` or a body")?;
            None
        };
        let end = self.prev_end();
        Ok(Method {
            name,
            params,
            ret,
            body,
            span: Span::new(start, end),
        })
    }

    fn parse_type_ref(&mut self) -> Result<TypeRef, ParseError> {
        let ident = self.expect_ident()?;
        TypeRef::from_name(&ident.text)
            .ok_or_else(|| self.error_at(ident.span, &format!("unknown type `{}`", ident.text)))
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let start = self.peek().span.start;
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Block {
            stmts,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.peek().span.start;
        let kind = match self.peek().kind {
            TokenKind::LetKw => {
                self.bump();
                let name = self.expect_ident()?;
                let ty = if self.eat(TokenKind::Colon) {
                    Some(self.parse_type_ref()?)
                } else {
                    None
                };
                self.expect(TokenKind::Eq, "`=`")?;
                let init = self.parse_expr()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                StmtKind::Let { name, ty, init }
            }
            TokenKind::IfKw => self.parse_if()?,
            TokenKind::WhileKw => {
                self.bump();
                self.expect(TokenKind::LParen, "`(`")?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                let body = self.parse_block()?;
                StmtKind::While { cond, body }
            }
            TokenKind::ReturnKw => {
                self.bump();
                let value = if self.at(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semicolon, "`;`")?;
                StmtKind::Return(value)
            }
            TokenKind::ThrowKw => {
                self.bump();
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                StmtKind::Throw(value)
            }
            TokenKind::TryKw => {
                self.bump();
                let body = self.parse_block()?;
                self.expect(TokenKind::FinallyKw, "`finally`")?;
                let finally = self.parse_block()?;
                StmtKind::TryFinally { body, finally }
            }
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            TokenKind::Ident if self.peek_at(1).kind == TokenKind::Eq => {
                let target = self.expect_ident()?;
                self.bump();
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                StmtKind::Assign { target, value }
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt {
            kind,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(TokenKind::IfKw, "`if`")?;
        self.expect(TokenKind::LParen, "`(`")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "`)`")?;
        let then_block = self.parse_block()?;
        let else_block = if self.eat(TokenKind::ElseKw) {
            if self.at(TokenKind::IfKw) {
                // `else if` desugars into an else block with a single nested if.
                let start = self.peek().span.start;
                let kind = self.parse_if()?;
                let span = Span::new(start, self.prev_end());
                Some(Block {
                    stmts: vec![Stmt { kind, span }],
                    span,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_block,
            else_block,
        })
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some(op) = binary_op(self.peek().kind) else {
                break;
            };
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.bump();
            let rhs = self.parse_binary(prec + 1)?;
            let span = Span::new(lhs.span.start, rhs.span.end);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.peek().span.start;
            self.bump();
            let expr = self.parse_unary()?;
            let span = Span::new(start, expr.span.end);
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
                span,
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek();
        let start = token.span.start;
        match token.kind {
            TokenKind::IntLit => {
                let text = self.bump_text();
                let value = text.parse::<i64>().map_err(|_| {
                    self.error_at(token.span, &format!("integer literal `{text}` out of range"))
                })?;
                Ok(self.finish_expr(ExprKind::Int(value), start))
            }
            TokenKind::FloatLit => {
                let text = self.bump_text();
                let value = text.parse::<f64>().map_err(|_| {
                    self.error_at(token.span, &format!("malformed float literal `{text}`"))
                })?;
                Ok(self.finish_expr(ExprKind::Float(value), start))
            }
            TokenKind::StrLit => {
                let text = self.bump_text();
                let value = unescape(&text[1..text.len() - 1])
                    .map_err(|msg| self.error_at(token.span, &msg))?;
                Ok(self.finish_expr(ExprKind::Str(value), start))
            }
            TokenKind::TrueKw => {
                self.bump();
                Ok(self.finish_expr(ExprKind::Bool(true), start))
            }
            TokenKind::FalseKw => {
                self.bump();
                Ok(self.finish_expr(ExprKind::Bool(false), start))
            }
            TokenKind::LParen => {
                self.bump();
                if self.eat(TokenKind::RParen) {
                    return Ok(self.finish_expr(ExprKind::Unit, start));
                }
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(Expr {
                    kind: inner.kind,
                    span: Span::new(start, self.prev_end()),
                })
            }
            TokenKind::Ident => {
                let mut path = vec![self.expect_ident()?];
                while self.eat(TokenKind::Dot) {
                    path.push(self.expect_ident()?);
                }
                if self.at(TokenKind::LParen) {
                    self.bump();
                    let mut args = Vec::new();
                    while !self.at(TokenKind::RParen) {
                        if !args.is_empty() {
                            self.expect(TokenKind::Comma, "`,`")?;
                        }
                        args.push(self.parse_expr()?);
                    }
                    self.expect(TokenKind::RParen, "`)`")?;
                    Ok(self.finish_expr(ExprKind::Call { path, args }, start))
                } else if path.len() == 1 {
                    let ident = path.swap_remove(0);
                    Ok(self.finish_expr(ExprKind::Name(ident), start))
                } else {
                    Err(self.error_at(
                        Span::new(start, self.prev_end()),
                        "qualified names must be called",
                    ))
                }
            }
            _ => Err(self.error_here("expected an expression")),
        }
    }

    fn finish_expr(&self, kind: ExprKind, start: u32) -> Expr {
        Expr {
            kind,
            span: Span::new(start, self.prev_end()),
        }
    }

    fn peek(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> Token {
        self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn bump_text(&mut self) -> String {
        let token = self.bump();
        token.text(self.text).to_string()
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.error_here(&format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let token = self.peek();
        let is_name = token.kind == TokenKind::Ident;
        if is_name {
            self.bump();
            Ok(Ident {
                text: token.text(self.text).to_string(),
                span: token.span,
            })
        } else {
            Err(self.error_here("expected an identifier"))
        }
    }

    fn prev_end(&self) -> u32 {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    fn error_here(&self, message: &str) -> ParseError {
        let token = self.peek();
        let found = match token.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("`{}`", token.text(self.text)),
        };
        self.error_at(token.span, &format!("{message}, found {found}"))
    }

    fn error_at(&self, span: Span, message: &str) -> ParseError {
        let pos = self.line_index.line_col(span.start);
        ParseError {
            file: self.file.to_string(),
            line: pos.line,
            column: pos.column,
            message: message.to_string(),
        }
    }
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Rem,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::BangEq => BinaryOp::NotEq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::LtEq => BinaryOp::LtEq,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::GtEq => BinaryOp::GtEq,
        TokenKind::AmpAmp => BinaryOp::And,
        TokenKind::PipePipe => BinaryOp::Or,
        _ => return None,
    })
}

fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => return Err(format!("unknown escape `\\{other}`")),
            None => return Err("dangling escape at end of string".to_string()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_method_with_control_flow() {
        let source = "\
namespace demo {
    type Main {
        fn run(n: int) -> int {
            let acc = 0;
            while (acc < n) {
                acc = acc + 1;
            }
            return acc;
        }
    }
}
";
        let unit = parse("main.wp", source).unwrap();
        assert_eq!(unit.namespaces.len(), 1);
        let method = &unit.namespaces[0].types[0].methods[0];
        assert_eq!(method.name.text, "run");
        assert_eq!(method.params.len(), 1);
        assert_eq!(method.ret, TypeRef::Int);
        let body = method.body.as_ref().unwrap();
        assert_eq!(body.stmts.len(), 3);
        assert!(matches!(body.stmts[1].kind, StmtKind::While { .. }));
    }

    #[test]
    fn precedence_groups_multiplication_tighter() {
        let unit = parse("t.wp", "namespace n { type T { fn f() { let x = 1 + 2 * 3; } } }")
            .unwrap();
        let body = unit.namespaces[0].types[0].methods[0].body.as_ref().unwrap();
        let StmtKind::Let { init, .. } = &body.stmts[0].kind else {
            panic!("expected let");
        };
        let ExprKind::Binary { op, rhs, .. } = &init.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn qualified_call_paths_parse() {
        let unit = parse(
            "t.wp",
            "namespace n { type T { fn f() { demo.Main.run(1, 2); } } }",
        )
        .unwrap();
        let body = unit.namespaces[0].types[0].methods[0].body.as_ref().unwrap();
        let StmtKind::Expr(expr) = &body.stmts[0].kind else {
            panic!("expected expr stmt");
        };
        let ExprKind::Call { path, args } = &expr.kind else {
            panic!("expected call");
        };
        let segments: Vec<_> = path.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(segments, vec!["demo", "Main", "run"]);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn error_carries_one_based_position() {
        let err = parse("bad.wp", "namespace n {\n  oops\n}").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 3);
        assert!(err.to_string().starts_with("bad.wp:2:3"));
    }

    #[test]
    fn else_if_desugars_to_nested_block() {
        let source = "namespace n { type T { fn f(x: int) {
            if (x == 1) { return; } else if (x == 2) { return; }
        } } }";
        let unit = parse("t.wp", source).unwrap();
        let body = unit.namespaces[0].types[0].methods[0].body.as_ref().unwrap();
        let StmtKind::If { else_block, .. } = &body.stmts[0].kind else {
            panic!("expected if");
        };
        let else_block = else_block.as_ref().unwrap();
        assert_eq!(else_block.stmts.len(), 1);
        assert!(matches!(else_block.stmts[0].kind, StmtKind::If { .. }));
    }
}
