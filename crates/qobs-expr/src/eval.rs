//! Expression compilation and evaluation
//!
//! [`Program::compile`] lexes and parses the expression, then checks
//! every identifier and function against the environment. The check is
//! what lets the manifest loader classify table keys by trial compile:
//! a key like `sources` is an undeclared identifier and therefore plain
//! data, while `target_os == "linux"` compiles and marks a conditional
//! sub-section.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::env::Env;
use crate::error::{ExprError, ExprResult};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::value::Value;

/// A compiled expression, ready to run
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    ast: Expr,
}

impl Program {
    /// Compile an expression against an environment
    pub fn compile(source: &str, env: &Env) -> ExprResult<Program> {
        let tokens = Lexer::new(source).tokenize()?;
        let ast = Parser::new(tokens).parse()?;
        check(&ast, env)?;
        Ok(Program {
            source: source.to_string(),
            ast,
        })
    }

    /// The original expression text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the compiled expression
    pub fn run(&self, env: &Env) -> ExprResult<Value> {
        evaluate(&self.ast, env)
    }
}

/// Verify that all identifiers and called functions are declared
fn check(expr: &Expr, env: &Env) -> ExprResult<()> {
    match expr {
        Expr::Bool(_) | Expr::Int(_) | Expr::Str(_) => Ok(()),
        Expr::Ident { name, offset } => {
            if env.declares(name) {
                Ok(())
            } else {
                Err(ExprError::UnknownIdentifier {
                    name: name.clone(),
                    offset: *offset,
                })
            }
        }
        Expr::Unary { operand, .. } => check(operand, env),
        Expr::Binary { lhs, rhs, .. } => {
            check(lhs, env)?;
            check(rhs, env)
        }
        Expr::Call { name, args, offset } => {
            if !env.declares_function(name) {
                return Err(ExprError::UnknownFunction {
                    name: name.clone(),
                    offset: *offset,
                });
            }
            for arg in args {
                check(arg, env)?;
            }
            Ok(())
        }
        Expr::Index { base, index } => {
            check(base, env)?;
            check(index, env)
        }
        Expr::Member { base, .. } => check(base, env),
    }
}

fn evaluate(expr: &Expr, env: &Env) -> ExprResult<Value> {
    match expr {
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Ident { name, offset } => {
            env.lookup(name).ok_or_else(|| ExprError::UnknownIdentifier {
                name: name.clone(),
                offset: *offset,
            })
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, env)?;
            match (op, value) {
                (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(-n)),
                (UnaryOp::Not, other) => Err(ExprError::type_error(format!(
                    "operator `!` expects bool, got {}",
                    other.type_name()
                ))),
                (UnaryOp::Neg, other) => Err(ExprError::type_error(format!(
                    "operator `-` expects int, got {}",
                    other.type_name()
                ))),
            }
        }
        Expr::Binary { op, lhs, rhs } => binary(*op, lhs, rhs, env),
        Expr::Call { name, args, .. } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, env)?);
            }
            env.call(name, &values)
        }
        Expr::Index { base, index } => {
            let base = evaluate(base, env)?;
            let index = evaluate(index, env)?;
            map_lookup(base, index)
        }
        Expr::Member { base, name } => {
            let base = evaluate(base, env)?;
            map_lookup(base, Value::Str(name.clone()))
        }
    }
}

/// Index a map; a missing key yields the empty string, like an
/// environment variable that is not set
fn map_lookup(base: Value, index: Value) -> ExprResult<Value> {
    let map = match base {
        Value::Map(m) => m,
        other => {
            return Err(ExprError::type_error(format!(
                "cannot index {}",
                other.type_name()
            )))
        }
    };
    let key = match index {
        Value::Str(s) => s,
        other => {
            return Err(ExprError::type_error(format!(
                "map index must be a string, got {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Str(map.get(&key).cloned().unwrap_or_default()))
}

fn binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, env: &Env) -> ExprResult<Value> {
    // Short-circuit forms evaluate the right side lazily
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let left = expect_bool(op, evaluate(lhs, env)?)?;
        return match (op, left) {
            (BinaryOp::And, false) => Ok(Value::Bool(false)),
            (BinaryOp::Or, true) => Ok(Value::Bool(true)),
            _ => Ok(Value::Bool(expect_bool(op, evaluate(rhs, env)?)?)),
        };
    }

    let left = evaluate(lhs, env)?;
    let right = evaluate(rhs, env)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(equals(op, &left, &right)?)),
        BinaryOp::Ne => Ok(Value::Bool(!equals(op, &left, &right)?)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Value::Int(a), Value::Int(b)) => a.cmp(b),
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => return Err(mismatch(op, &left, &right)),
            };
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            _ => Err(mismatch(op, &left, &right)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            let (a, b) = match (&left, &right) {
                (Value::Int(a), Value::Int(b)) => (*a, *b),
                _ => return Err(mismatch(op, &left, &right)),
            };
            match op {
                BinaryOp::Sub => Ok(Value::Int(a - b)),
                BinaryOp::Mul => Ok(Value::Int(a * b)),
                _ => {
                    if b == 0 {
                        Err(ExprError::type_error("division by zero"))
                    } else {
                        Ok(Value::Int(a / b))
                    }
                }
            }
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn equals(op: BinaryOp, left: &Value, right: &Value) -> ExprResult<bool> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Int(a), Value::Int(b)) => Ok(a == b),
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        _ => Err(mismatch(op, left, right)),
    }
}

fn expect_bool(op: BinaryOp, value: Value) -> ExprResult<bool> {
    value.as_bool().ok_or_else(|| {
        ExprError::type_error(format!(
            "operator `{}` expects bool, got {}",
            op.as_str(),
            value.type_name()
        ))
    })
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> ExprError {
    ExprError::type_error(format!(
        "operator `{}` cannot be applied to {} and {}",
        op.as_str(),
        left.type_name(),
        right.type_name()
    ))
}
