//! Tree-walking interpreter over the lowered program form.
//!
//! Frames are flat slot vectors. `try { .. } finally { .. }` runs its
//! finalizer on every exit path, including thrown values and runtime faults
//! unwinding through the block, which is what guarantees the injected
//! `pop_frame` call always runs. Errors crossing a call boundary are wrapped
//! in [`RuntimeError::Invocation`] so callers can recover the innermost
//! cause.

use waypoint_core::{host, Locals, RuntimeError, Value};

use crate::program::{BinOp, Function, FunctionId, LExpr, LStmt, Program, UnOp};

const MAX_CALL_DEPTH: usize = 256;

pub(crate) fn invoke(
    program: &Program,
    id: FunctionId,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    Interp { program, depth: 0 }.call(id, args)
}

struct Interp<'a> {
    program: &'a Program,
    depth: usize,
}

enum Flow {
    Normal,
    Return(Value),
}

impl Interp<'_> {
    fn call(&mut self, id: FunctionId, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let function = self
            .program
            .function(id)
            .ok_or_else(|| RuntimeError::UnknownFunction(format!("#{}", id.index())))?;
        if args.len() != function.params.len() {
            return Err(RuntimeError::ArityMismatch {
                name: function.name.clone(),
                expected: function.params.len(),
                actual: args.len(),
            });
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::StackOverflow);
        }

        self.depth += 1;
        let result = self.run(function, args);
        self.depth -= 1;
        result
    }

    fn run(&mut self, function: &Function, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let mut env = vec![Value::Unit; function.slots as usize];
        for (slot, arg) in args.into_iter().enumerate() {
            env[slot] = arg;
        }
        match self.exec_block(&function.body, &mut env)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Unit),
        }
    }

    fn exec_block(&mut self, stmts: &[LStmt], env: &mut Vec<Value>) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &LStmt, env: &mut Vec<Value>) -> Result<Flow, RuntimeError> {
        match stmt {
            LStmt::Assign { slot, value } => {
                env[*slot as usize] = self.eval(value, env)?;
                Ok(Flow::Normal)
            }
            LStmt::Block(body) => self.exec_block(body, env),
            LStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                if self.eval(cond, env)?.is_truthy()? {
                    self.exec_block(then_body, env)
                } else {
                    self.exec_block(else_body, env)
                }
            }
            LStmt::While { cond, body } => {
                while self.eval(cond, env)?.is_truthy()? {
                    match self.exec_block(body, env)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            LStmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Unit,
                };
                Ok(Flow::Return(value))
            }
            LStmt::Throw(value) => Err(RuntimeError::Thrown(self.eval(value, env)?)),
            LStmt::TryFinally { body, finally } => {
                let outcome = self.exec_block(body, env);
                match self.exec_block(finally, env)? {
                    // A finalizer that returns supersedes the body's outcome.
                    Flow::Return(value) => Ok(Flow::Return(value)),
                    Flow::Normal => outcome,
                }
            }
            LStmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
            LStmt::PushFrame { method } => {
                host::push_frame(method, None);
                Ok(Flow::Normal)
            }
            LStmt::PopFrame => {
                host::pop_frame();
                Ok(Flow::Normal)
            }
            LStmt::Checkpoint { id, method, locals } => {
                let frame: &[Value] = env;
                let provider = || -> Locals {
                    locals
                        .iter()
                        .map(|(name, slot)| (name.clone(), frame[*slot as usize].clone()))
                        .collect()
                };
                host::checkpoint(*id, method, Some(&provider));
                Ok(Flow::Normal)
            }
        }
    }

    fn eval(&mut self, expr: &LExpr, env: &[Value]) -> Result<Value, RuntimeError> {
        match expr {
            LExpr::Const(constant) => Ok(constant.to_value()),
            LExpr::Local(slot) => Ok(env[*slot as usize].clone()),
            LExpr::Unary { op, expr } => {
                let value = self.eval(expr, env)?;
                match op {
                    UnOp::Neg => value.neg(),
                    UnOp::Not => value.not(),
                }
            }
            LExpr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, env),
            LExpr::Call { target, name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env)?);
                }
                self.call(*target, values)
                    .map_err(|source| RuntimeError::Invocation {
                        callee: name.clone(),
                        source: Box::new(source),
                    })
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinOp,
        lhs: &LExpr,
        rhs: &LExpr,
        env: &[Value],
    ) -> Result<Value, RuntimeError> {
        // Short-circuit forms evaluate the right side conditionally.
        match op {
            BinOp::And => {
                return if self.eval(lhs, env)?.is_truthy()? {
                    self.eval(rhs, env)
                } else {
                    Ok(Value::Bool(false))
                };
            }
            BinOp::Or => {
                return if self.eval(lhs, env)?.is_truthy()? {
                    Ok(Value::Bool(true))
                } else {
                    self.eval(rhs, env)
                };
            }
            _ => {}
        }

        let lhs = self.eval(lhs, env)?;
        let rhs = self.eval(rhs, env)?;
        apply_binary(op, &lhs, &rhs)
    }
}

pub(crate) fn apply_binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    match op {
        BinOp::Add => lhs.add(rhs),
        BinOp::Sub => lhs.sub(rhs),
        BinOp::Mul => lhs.mul(rhs),
        BinOp::Div => lhs.div(rhs),
        BinOp::Rem => lhs.rem(rhs),
        BinOp::Eq => lhs.equals(rhs),
        BinOp::NotEq => lhs.equals(rhs)?.not(),
        BinOp::Lt => lhs.compare(rhs, "<"),
        BinOp::LtEq => lhs.compare(rhs, "<="),
        BinOp::Gt => lhs.compare(rhs, ">"),
        BinOp::GtEq => lhs.compare(rhs, ">="),
        BinOp::And | BinOp::Or => {
            // Unreachable through eval_binary; defined for the folder, where
            // short-circuiting does not apply to two constants.
            let l = lhs.is_truthy()?;
            let r = rhs.is_truthy()?;
            Ok(Value::Bool(match op {
                BinOp::And => l && r,
                _ => l || r,
            }))
        }
    }
}
