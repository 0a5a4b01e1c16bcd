use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Boxed runtime value.
///
/// Script locals are late-bound: every operator and comparison dispatches on
/// the runtime variants of its operands, so debugger-console expressions work
/// against whatever the paused frame actually holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
}

impl Value {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    #[must_use]
    pub fn is_truthy(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(RuntimeError::TypeMismatch {
                operation: "condition".to_string(),
                operands: other.type_name().to_string(),
            }),
        }
    }

    pub fn add(&self, rhs: &Value) -> Result<Value, RuntimeError> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
            (Value::Str(a), b) => Ok(Value::Str(Arc::from(format!("{a}{b}").as_str()))),
            (a, Value::Str(b)) => Ok(Value::Str(Arc::from(format!("{a}{b}").as_str()))),
            (a, b) => Err(type_mismatch("+", a, b)),
        }
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value, RuntimeError> {
        numeric_op(self, rhs, "-", |a, b| a.wrapping_sub(b), |a, b| a - b)
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value, RuntimeError> {
        numeric_op(self, rhs, "*", |a, b| a.wrapping_mul(b), |a, b| a * b)
    }

    pub fn div(&self, rhs: &Value) -> Result<Value, RuntimeError> {
        match (self, rhs) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivideByZero),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_div(*b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 / b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a / *b as f64)),
            (a, b) => Err(type_mismatch("/", a, b)),
        }
    }

    pub fn rem(&self, rhs: &Value) -> Result<Value, RuntimeError> {
        match (self, rhs) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivideByZero),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_rem(*b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a % b)),
            (a, b) => Err(type_mismatch("%", a, b)),
        }
    }

    pub fn neg(&self) -> Result<Value, RuntimeError> {
        match self {
            Value::Int(a) => Ok(Value::Int(a.wrapping_neg())),
            Value::Float(a) => Ok(Value::Float(-a)),
            a => Err(RuntimeError::TypeMismatch {
                operation: "-".to_string(),
                operands: a.type_name().to_string(),
            }),
        }
    }

    pub fn not(&self) -> Result<Value, RuntimeError> {
        match self {
            Value::Bool(a) => Ok(Value::Bool(!a)),
            a => Err(RuntimeError::TypeMismatch {
                operation: "!".to_string(),
                operands: a.type_name().to_string(),
            }),
        }
    }

    pub fn compare(&self, rhs: &Value, op: &str) -> Result<Value, RuntimeError> {
        let ordering = match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            (a, b) => return Err(type_mismatch(op, a, b)),
        };
        let Some(ordering) = ordering else {
            return Ok(Value::Bool(false));
        };
        let result = match op {
            "<" => ordering.is_lt(),
            "<=" => ordering.is_le(),
            ">" => ordering.is_gt(),
            ">=" => ordering.is_ge(),
            _ => return Err(type_mismatch(op, self, rhs)),
        };
        Ok(Value::Bool(result))
    }

    pub fn equals(&self, rhs: &Value) -> Result<Value, RuntimeError> {
        let eq = match (self, rhs) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (a, b) => a == b,
        };
        Ok(Value::Bool(eq))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

fn numeric_op(
    lhs: &Value,
    rhs: &Value,
    op: &str,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
        (a, b) => Err(type_mismatch(op, a, b)),
    }
}

fn type_mismatch(op: &str, lhs: &Value, rhs: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        operation: op.to_string(),
        operands: format!("{} and {}", lhs.type_name(), rhs.type_name()),
    }
}

/// Error raised while executing loaded script code.
///
/// Errors that cross a call boundary are wrapped in [`RuntimeError::Invocation`]
/// so consumers can either report the full call chain or unwrap to the
/// innermost cause.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("DivideByZeroError: attempt to divide by zero")]
    DivideByZero,
    #[error("type mismatch: operator `{operation}` not defined for {operands}")]
    TypeMismatch { operation: String, operands: String },
    #[error("thrown: {0}")]
    Thrown(Value),
    #[error("call depth limit exceeded")]
    StackOverflow,
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("function `{name}` expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("error invoking `{callee}`")]
    Invocation {
        callee: String,
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// Walks the source chain to the innermost cause.
    ///
    /// Invocation wrappers accumulate one layer per call frame the error
    /// crossed; the debugger console wants the root cause message.
    #[must_use]
    pub fn innermost(&self) -> &RuntimeError {
        let mut current = self;
        while let RuntimeError::Invocation { source, .. } = current {
            current = source;
        }
        current
    }
}
