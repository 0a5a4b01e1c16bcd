//! Compact executable form of a compiled unit.
//!
//! The facade serializes a [`Program`] with `bincode` into the emitted code
//! stream; a module isolate deserializes it back at load time. Locals are
//! resolved to frame slot indices during lowering, so execution never looks
//! names up.

use serde::{Deserialize, Serialize};
use waypoint_core::{CheckpointId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(u32);

impl FunctionId {
    #[must_use]
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Source file the unit was compiled from.
    pub file: String,
    pub functions: Vec<Function>,
}

impl Program {
    #[must_use]
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    #[must_use]
    pub fn function_named(&self, qualified: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name == qualified)
            .map(|idx| FunctionId::new(idx as u32))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    /// Qualified `namespace.Type.method` name.
    pub name: String,
    pub params: Vec<String>,
    /// Total slot count, parameters included.
    pub slots: u16,
    pub body: Vec<LStmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LStmt {
    Assign {
        slot: u16,
        value: LExpr,
    },
    Block(Vec<LStmt>),
    If {
        cond: LExpr,
        then_body: Vec<LStmt>,
        else_body: Vec<LStmt>,
    },
    While {
        cond: LExpr,
        body: Vec<LStmt>,
    },
    Return(Option<LExpr>),
    Throw(LExpr),
    TryFinally {
        body: Vec<LStmt>,
        finally: Vec<LStmt>,
    },
    Expr(LExpr),
    PushFrame {
        method: String,
    },
    PopFrame,
    Checkpoint {
        id: CheckpointId,
        method: String,
        /// Captured locals as `(surface name, frame slot)` pairs in capture
        /// order; the provider reads the slots live at invocation time.
        locals: Vec<(String, u16)>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LExpr {
    Const(Constant),
    Local(u16),
    Unary {
        op: UnOp,
        expr: Box<LExpr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<LExpr>,
        rhs: Box<LExpr>,
    },
    Call {
        target: FunctionId,
        /// Qualified callee name, kept for invocation error wrapping.
        name: String,
        args: Vec<LExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
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

/// Literal operand; the serializable subset of [`Value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Constant {
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Unit => Value::Unit,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(i) => Value::Int(*i),
            Constant::Float(x) => Value::Float(*x),
            Constant::Str(s) => Value::Str(s.as_str().into()),
        }
    }

    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Unit => Constant::Unit,
            Value::Bool(b) => Constant::Bool(*b),
            Value::Int(i) => Constant::Int(*i),
            Value::Float(x) => Constant::Float(*x),
            Value::Str(s) => Constant::Str(s.to_string()),
        }
    }
}
