//! Compile-once / evaluate-per-event numeric expressions.
//!
//! Used for user-supplied value transformations and activation predicates.
//! Compilation happens when a mapping is configured, evaluation on every
//! event, so evaluation must not allocate more than fasteval itself does.

use fasteval::{Compiler, Evaler, Instruction, Slab};
use thiserror::Error;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,
    #[error("couldn't parse expression: {0}")]
    Parse(String),
    #[error("undefined variable or function: {0}")]
    UndefinedVariable(String),
    #[error("couldn't evaluate expression")]
    Eval,
}

/// A compiled numeric expression.
///
/// Variables are resolved through a caller-supplied namespace on each
/// evaluation, so the same compiled expression can be shared.
pub struct Expression {
    slab: Slab,
    instruction: Instruction,
}

impl Expression {
    pub fn compile(expression: &str) -> Result<Self, ExpressionError> {
        if expression.trim().is_empty() {
            return Err(ExpressionError::Empty);
        }
        let parser = fasteval::Parser::new();
        let mut slab = fasteval::Slab::new();
        let expression_ref = parser
            .parse(expression, &mut slab.ps)
            .map_err(|e| ExpressionError::Parse(e.to_string()))?;
        let instruction = expression_ref
            .from(&slab.ps)
            .compile(&slab.ps, &mut slab.cs);
        Ok(Self { slab, instruction })
    }

    /// Evaluates against the given variable namespace. Returning `None` from
    /// the namespace makes the variable undefined.
    pub fn evaluate(
        &self,
        vars: impl Fn(&str, &[f64]) -> Option<f64>,
    ) -> Result<f64, ExpressionError> {
        self.evaluate_internal(vars).map_err(|e| match e {
            fasteval::Error::Undefined(name) => ExpressionError::UndefinedVariable(name),
            _ => ExpressionError::Eval,
        })
    }

    fn evaluate_internal(
        &self,
        vars: impl Fn(&str, &[f64]) -> Option<f64>,
    ) -> Result<f64, fasteval::Error> {
        use fasteval::eval_compiled_ref;
        let mut cb = |name: &str, args: Vec<f64>| -> Option<f64> { vars(name, &args) };
        let result = eval_compiled_ref!(&self.instruction, &self.slab, &mut cb);
        Ok(result)
    }
}

impl std::fmt::Debug for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expression").finish_non_exhaustive()
    }
}
