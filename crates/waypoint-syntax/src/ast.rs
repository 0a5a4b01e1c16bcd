//! Tree-shaped AST for the script language.
//!
//! Nodes carry byte spans into the source they were parsed from; the rewriter
//! relies on statement spans to map checkpoints back to original positions.

use waypoint_core::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceUnit {
    /// Path the unit was parsed from, threaded into checkpoint locations.
    pub file: String,
    pub namespaces: Vec<Namespace>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    pub name: Ident,
    pub types: Vec<TypeDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: Ident,
    pub methods: Vec<Method>,
    pub nested: Vec<TypeDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: Ident,
    pub params: Vec<Param>,
    pub ret: TypeRef,
    /// `None` for declarations without bodies; those are never wrapped.
    pub body: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Int,
    Float,
    Bool,
    Str,
    Unit,
    Any,
}

impl TypeRef {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            TypeRef::Int => "int",
            TypeRef::Float => "float",
            TypeRef::Bool => "bool",
            TypeRef::Str => "string",
            TypeRef::Unit => "unit",
            TypeRef::Any => "any",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "int" => TypeRef::Int,
            "float" => TypeRef::Float,
            "bool" => TypeRef::Bool,
            "string" => TypeRef::Str,
            "unit" => TypeRef::Unit,
            "any" => TypeRef::Any,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let {
        name: Ident,
        ty: Option<TypeRef>,
        init: Expr,
    },
    Assign {
        target: Ident,
        value: Expr,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Return(Option<Expr>),
    Throw(Expr),
    TryFinally {
        body: Block,
        finally: Block,
    },
    Block(Block),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Name(Ident),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        path: Vec<Ident>,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Binding power for the printer; higher binds tighter.
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::NotEq => 3,
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub text: String,
    pub span: Span,
}

impl Ident {
    #[must_use]
    pub fn synthetic(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            span: Span::new(0, 0),
        }
    }
}

impl Expr {
    /// A call statement to one of the injected runtime intrinsics
    /// (`push_frame`, `pop_frame`, `checkpoint`, `make_locals`).
    #[must_use]
    pub fn debug_intrinsic(&self) -> Option<&str> {
        if let ExprKind::Call { path, .. } = &self.kind {
            if let [single] = path.as_slice() {
                if matches!(
                    single.text.as_str(),
                    "push_frame" | "pop_frame" | "checkpoint" | "make_locals"
                ) {
                    return Some(single.text.as_str());
                }
            }
        }
        None
    }
}
