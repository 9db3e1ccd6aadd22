use conductor_engine::Transformation;
use conductor_expression::{Expression, ExpressionError};
use std::sync::Arc;

/// Which variable the expression result is assigned to, i.e. which direction
/// it transforms. `y` is the target-side value, `x` the source-side value.
#[derive(Copy, Clone, Debug)]
pub enum OutputVariable {
    X,
    Y,
}

/// Represents a value transformation done via a user-supplied expression,
/// e.g. `x * 0.5` as control transformation or `1 - y` as feedback
/// transformation.
#[derive(Clone, Debug)]
pub struct ExpressionTransformation {
    // Arc because Expression is not cloneable
    expression: Arc<Expression>,
    output_var: OutputVariable,
}

impl ExpressionTransformation {
    /// Compiles the given expression and creates an appropriate
    /// transformation.
    pub fn compile(
        expression: &str,
        output_var: OutputVariable,
    ) -> Result<ExpressionTransformation, ExpressionError> {
        let compiled = Expression::compile(expression)?;
        Ok(ExpressionTransformation {
            expression: Arc::new(compiled),
            output_var,
        })
    }
}

impl Transformation for ExpressionTransformation {
    fn transform(&self, input_value: f64, output_value: f64) -> Result<f64, &'static str> {
        use OutputVariable::*;
        let (input_name, output_name) = match self.output_var {
            Y => ("x", "y"),
            X => ("y", "x"),
        };
        self.expression
            .evaluate(|name, _| {
                if name == input_name {
                    Some(input_value)
                } else if name == output_name {
                    Some(output_value)
                } else {
                    None
                }
            })
            .map_err(|_| "couldn't evaluate transformation expression")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_direction_reads_x() {
        // Given
        let t = ExpressionTransformation::compile("x * 0.5", OutputVariable::Y).unwrap();
        // When
        let result = t.transform(0.8, 0.0);
        // Then
        assert_eq!(result, Ok(0.4));
    }

    #[test]
    fn control_direction_can_read_current_target_value() {
        // Given
        let t = ExpressionTransformation::compile("y + x", OutputVariable::Y).unwrap();
        // When
        let result = t.transform(0.25, 0.5);
        // Then
        assert_eq!(result, Ok(0.75));
    }

    #[test]
    fn feedback_direction_reads_y() {
        // Given
        let t = ExpressionTransformation::compile("1 - y", OutputVariable::X).unwrap();
        // When
        let result = t.transform(0.3, 0.0);
        // Then
        assert_eq!(result, Ok(0.7));
    }

    #[test]
    fn unknown_variable_fails_evaluation() {
        // Given
        let t = ExpressionTransformation::compile("x * oops", OutputVariable::Y).unwrap();
        // When
        let result = t.transform(0.8, 0.0);
        // Then
        assert!(result.is_err());
    }
}
