use waypoint_core::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    Comment,

    Ident,
    IntLit,
    FloatLit,
    StrLit,

    NamespaceKw,
    TypeKw,
    FnKw,
    LetKw,
    IfKw,
    ElseKw,
    WhileKw,
    ReturnKw,
    ThrowKw,
    TryKw,
    FinallyKw,
    TrueKw,
    FalseKw,

    LParen,
    RParen,
    LBrace,
    RBrace,
    Semicolon,
    Comma,
    Colon,
    Dot,
    Arrow,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AmpAmp,
    PipePipe,
    Bang,

    Error,
    Eof,
}

impl TokenKind {
    #[must_use]
    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::Whitespace | TokenKind::Comment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    #[must_use]
    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        &input[self.span.start as usize..self.span.end as usize]
    }
}

#[must_use]
pub fn lex(input: &str) -> Vec<Token> {
    Lexer { input, pos: 0 }.lex()
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn lex(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while !self.is_eof() {
            let start = self.pos;
            let kind = self.next_kind();
            tokens.push(Token {
                kind,
                span: Span::new(start as u32, self.pos as u32),
            });
        }
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::new(self.pos as u32, self.pos as u32),
        });
        tokens
    }

    fn next_kind(&mut self) -> TokenKind {
        let b = self.peek(0).unwrap_or(b'\0');
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => self.scan_whitespace(),
            b'/' => match self.peek(1) {
                Some(b'/') => self.scan_line_comment(),
                Some(b'*') => self.scan_block_comment(),
                _ => self.single(TokenKind::Slash),
            },
            b'"' => self.scan_string(),
            b'0'..=b'9' => self.scan_number(),
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'{' => self.single(TokenKind::LBrace),
            b'}' => self.single(TokenKind::RBrace),
            b';' => self.single(TokenKind::Semicolon),
            b',' => self.single(TokenKind::Comma),
            b':' => self.single(TokenKind::Colon),
            b'.' => self.single(TokenKind::Dot),
            b'+' => self.single(TokenKind::Plus),
            b'-' => {
                if self.peek(1) == Some(b'>') {
                    self.pos += 2;
                    TokenKind::Arrow
                } else {
                    self.single(TokenKind::Minus)
                }
            }
            b'*' => self.single(TokenKind::Star),
            b'%' => self.single(TokenKind::Percent),
            b'=' => self.one_or_two(b'=', TokenKind::Eq, TokenKind::EqEq),
            b'!' => self.one_or_two(b'=', TokenKind::Bang, TokenKind::BangEq),
            b'<' => self.one_or_two(b'=', TokenKind::Lt, TokenKind::LtEq),
            b'>' => self.one_or_two(b'=', TokenKind::Gt, TokenKind::GtEq),
            b'&' => {
                if self.peek(1) == Some(b'&') {
                    self.pos += 2;
                    TokenKind::AmpAmp
                } else {
                    self.pos += 1;
                    TokenKind::Error
                }
            }
            b'|' => {
                if self.peek(1) == Some(b'|') {
                    self.pos += 2;
                    TokenKind::PipePipe
                } else {
                    self.pos += 1;
                    TokenKind::Error
                }
            }
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => self.scan_ident(),
            _ => {
                // Skip one full UTF-8 scalar so spans stay on char boundaries.
                let ch_len = self.input[self.pos..]
                    .chars()
                    .next()
                    .map_or(1, char::len_utf8);
                self.pos += ch_len;
                TokenKind::Error
            }
        }
    }

    fn scan_whitespace(&mut self) -> TokenKind {
        while matches!(self.peek(0), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
        TokenKind::Whitespace
    }

    fn scan_line_comment(&mut self) -> TokenKind {
        while !matches!(self.peek(0), None | Some(b'\n')) {
            self.pos += 1;
        }
        TokenKind::Comment
    }

    fn scan_block_comment(&mut self) -> TokenKind {
        self.pos += 2;
        while let Some(b) = self.peek(0) {
            if b == b'*' && self.peek(1) == Some(b'/') {
                self.pos += 2;
                return TokenKind::Comment;
            }
            self.pos += 1;
        }
        TokenKind::Error
    }

    fn scan_string(&mut self) -> TokenKind {
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            match b {
                b'"' => {
                    self.pos += 1;
                    return TokenKind::StrLit;
                }
                b'\\' => self.pos += 2,
                _ => self.pos += 1,
            }
        }
        TokenKind::Error
    }

    fn scan_number(&mut self) -> TokenKind {
        while matches!(self.peek(0), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.peek(0) == Some(b'.') && matches!(self.peek(1), Some(b'0'..=b'9')) {
            self.pos += 1;
            while matches!(self.peek(0), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
            TokenKind::FloatLit
        } else {
            TokenKind::IntLit
        }
    }

    fn scan_ident(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(
            self.peek(0),
            Some(b'_' | b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9')
        ) {
            self.pos += 1;
        }
        keyword_kind(&self.input[start..self.pos])
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn one_or_two(&mut self, second: u8, one: TokenKind, two: TokenKind) -> TokenKind {
        if self.peek(1) == Some(second) {
            self.pos += 2;
            two
        } else {
            self.pos += 1;
            one
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }
}

fn keyword_kind(text: &str) -> TokenKind {
    match text {
        "namespace" => TokenKind::NamespaceKw,
        "type" => TokenKind::TypeKw,
        "fn" => TokenKind::FnKw,
        "let" => TokenKind::LetKw,
        "if" => TokenKind::IfKw,
        "else" => TokenKind::ElseKw,
        "while" => TokenKind::WhileKw,
        "return" => TokenKind::ReturnKw,
        "throw" => TokenKind::ThrowKw,
        "try" => TokenKind::TryKw,
        "finally" => TokenKind::FinallyKw,
        "true" => TokenKind::TrueKw,
        "false" => TokenKind::FalseKw,
        _ => TokenKind::Ident,
    }
}

/// Reserved words of the script language; used by the expression evaluator
/// when deriving safe identifiers for frame locals.
#[must_use]
pub fn is_keyword(text: &str) -> bool {
    !matches!(keyword_kind(text), TokenKind::Ident)
        || matches!(text, "int" | "float" | "bool" | "string" | "unit" | "any")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input)
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| !k.is_trivia())
            .collect()
    }

    #[test]
    fn lexes_operators_and_composites() {
        assert_eq!(
            kinds("a <= b && c -> != ="),
            vec![
                TokenKind::Ident,
                TokenKind::LtEq,
                TokenKind::Ident,
                TokenKind::AmpAmp,
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::BangEq,
                TokenKind::Eq,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_numbers_and_strings() {
        assert_eq!(
            kinds(r#"12 3.5 "a\"b" // trailing"#),
            vec![
                TokenKind::IntLit,
                TokenKind::FloatLit,
                TokenKind::StrLit,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn member_access_on_int_is_not_a_float() {
        assert_eq!(
            kinds("ns.Main.run"),
            vec![
                TokenKind::Ident,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        assert!(kinds("\"abc").contains(&TokenKind::Error));
    }
}
