//! Tree-walking evaluator for parsed formulas.
use super::functions::{Arg, FunctionRegistry};
use super::ledger::EvalError;
use crate::context::CalculationContext;
use crate::formula::{parse, BinaryOp, Expr, UnaryOp};
use crate::provider::ProviderChain;
use smallvec::SmallVec;

/// Evaluates `formula` with the built-in functions.
pub fn evaluate(
    formula: &str,
    chain: &ProviderChain<'_>,
    context: &CalculationContext,
) -> Result<f64, EvalError> {
    evaluate_with(formula, chain, FunctionRegistry::builtin(), context)
}

pub fn evaluate_with(
    formula: &str,
    chain: &ProviderChain<'_>,
    functions: &FunctionRegistry,
    context: &CalculationContext,
) -> Result<f64, EvalError> {
    let expr = parse(formula)?;
    Evaluator::new(chain, functions, context).eval(&expr)
}

/// Holds no state between calls: the same expression, chain and context
/// always give the same result.
pub struct Evaluator<'e> {
    chain: &'e ProviderChain<'e>,
    functions: &'e FunctionRegistry,
    context: &'e CalculationContext,
}

impl<'e> Evaluator<'e> {
    pub fn new(
        chain: &'e ProviderChain<'e>,
        functions: &'e FunctionRegistry,
        context: &'e CalculationContext,
    ) -> Self {
        Self { chain, functions, context }
    }

    pub fn eval(&self, expr: &Expr) -> Result<f64, EvalError> {
        match expr {
            Expr::Number(n) => Ok(*n),
            Expr::Text(text) => Err(EvalError::TextInNumericPosition { text: text.clone() }),
            Expr::Reference(reference) => self.chain.resolve(reference, self.context),
            Expr::Unary { op, operand } => {
                let v = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Neg => -v,
                    UnaryOp::Plus => v,
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                apply(*op, l, r)
            }
            Expr::Call { name, args } => {
                let mut values: SmallVec<[Arg; 4]> = SmallVec::with_capacity(args.len());
                for arg in args {
                    values.push(match arg {
                        Expr::Text(text) => Arg::Text(text.clone()),
                        other => Arg::Number(self.eval(other)?),
                    });
                }
                let result = self.functions.call(name, &values, self.context)?;
                finite(result, name)
            }
        }
    }
}

fn apply(op: BinaryOp, l: f64, r: f64) -> Result<f64, EvalError> {
    let truth = |b: bool| if b { 1.0 } else { 0.0 };
    let value = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            l / r
        }
        BinaryOp::Pow => l.powf(r),
        BinaryOp::Lt => truth(l < r),
        BinaryOp::Le => truth(l <= r),
        BinaryOp::Gt => truth(l > r),
        BinaryOp::Ge => truth(l >= r),
        BinaryOp::Eq => truth(l == r),
        BinaryOp::Ne => truth(l != r),
    };
    finite(value, op.symbol())
}

fn finite(value: f64, operation: &str) -> Result<f64, EvalError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NonFinite { operation: operation.to_string() })
    }
}
