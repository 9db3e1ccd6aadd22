use conductor_expression::{Expression, ExpressionError};
use derive_more::Display;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use strum::EnumIter;

/// Number of host-controlled parameters available to activation conditions.
pub const PARAMETER_COUNT: u32 = 100;

pub type ParameterArray = [f32; PARAMETER_COUNT as usize];

pub const ZERO_PARAMETERS: ParameterArray = [0.0; PARAMETER_COUNT as usize];

#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Debug,
    Serialize,
    Deserialize,
    EnumIter,
    TryFromPrimitive,
    IntoPrimitive,
    Display,
)]
#[repr(usize)]
pub enum ActivationType {
    #[serde(rename = "always")]
    #[display(fmt = "Always")]
    Always,
    #[serde(rename = "modifiers")]
    #[display(fmt = "When modifiers on")]
    Modifiers,
    #[serde(rename = "targetPresent")]
    #[display(fmt = "When target present")]
    TargetPresent,
    #[serde(rename = "expression")]
    #[display(fmt = "When expression")]
    Expression,
}

pub fn parameter_value_is_on(value: f32) -> bool {
    value > 0.0
}

#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize, Default)]
pub struct ModifierCondition {
    #[serde(rename = "paramIndex")]
    param_index: Option<u32>,
    #[serde(rename = "isOn")]
    is_on: bool,
}

impl ModifierCondition {
    pub fn new(param_index: Option<u32>, is_on: bool) -> ModifierCondition {
        ModifierCondition { param_index, is_on }
    }

    pub fn param_index(&self) -> Option<u32> {
        self.param_index
    }

    pub fn uses_parameter(&self, param_index: u32) -> bool {
        self.param_index == Some(param_index)
    }

    /// Returns if this modifier condition is fulfilled in presence of the
    /// given set of parameters.
    pub fn is_fulfilled(&self, params: &ParameterArray) -> bool {
        let param_index = match self.param_index {
            None => return true,
            Some(i) => i,
        };
        let param_value = match params.get(param_index as usize) {
            // Parameter doesn't exist. Shouldn't happen but handle gracefully.
            None => return false,
            Some(v) => v,
        };
        parameter_value_is_on(*param_value) == self.is_on
    }
}

/// A predicate over the parameter array, e.g. `p1 > 0.5`.
///
/// `p1` refers to the first parameter. A result greater than zero counts as
/// active. Failure to evaluate counts as inactive, never as an error.
#[derive(Clone, Debug)]
pub struct ExpressionCondition {
    // Arc because Expression is not cloneable
    expression: Arc<Expression>,
    used_params: HashSet<u32>,
}

impl ExpressionCondition {
    /// Compiles the given expression and creates an appropriate condition.
    pub fn compile(expression: &str) -> Result<ExpressionCondition, ExpressionError> {
        let compiled = Expression::compile(expression)?;
        let condition = ExpressionCondition {
            expression: Arc::new(compiled),
            used_params: extract_used_param_indexes(expression),
        };
        Ok(condition)
    }

    pub fn uses_parameter(&self, param_index: u32) -> bool {
        self.used_params.contains(&(param_index + 1))
    }

    pub fn is_fulfilled(&self, params: &ParameterArray) -> bool {
        let result = self.expression.evaluate(|name, _| {
            let one_based: u32 = name.strip_prefix('p')?.parse().ok()?;
            if !(1..=PARAMETER_COUNT).contains(&one_based) {
                return None;
            }
            params
                .get((one_based - 1) as usize)
                .map(|v| *v as f64)
        });
        matches!(result, Ok(v) if v > 0.0)
    }
}

fn extract_used_param_indexes(expression: &str) -> HashSet<u32> {
    let param_regex = regex!(r#"\bp([0-9]+)\b"#);
    param_regex
        .captures_iter(expression)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .filter(|i| (1..=PARAMETER_COUNT).contains(i))
        .collect()
}

/// Condition that decides whether a mapping currently takes part in
/// dispatch. Stateless beyond its own configuration; evaluated fresh on each
/// relevant runtime state change.
#[derive(Clone, Debug)]
pub enum ActivationCondition {
    Always,
    /// All modifier conditions must be fulfilled.
    Modifiers(Vec<ModifierCondition>),
    /// Active only while the mapping's target can be resolved.
    TargetPresent,
    Expression(ExpressionCondition),
}

impl ActivationCondition {
    /// Returns if the mapping is active given current runtime state.
    ///
    /// Unresolvable references evaluate to `false`, never to an error.
    pub fn is_fulfilled(&self, params: &ParameterArray, target_is_present: bool) -> bool {
        use ActivationCondition::*;
        match self {
            Always => true,
            Modifiers(conditions) => conditions.iter().all(|c| c.is_fulfilled(params)),
            TargetPresent => target_is_present,
            Expression(condition) => condition.is_fulfilled(params),
        }
    }

    /// Returns if this condition reads the parameter array at all. Used for
    /// skipping refreshes on parameter changes.
    pub fn can_be_affected_by_parameters(&self) -> bool {
        use ActivationCondition::*;
        matches!(self, Modifiers(_) | Expression(_))
    }

    pub fn uses_parameter(&self, param_index: u32) -> bool {
        use ActivationCondition::*;
        match self {
            Always | TargetPresent => false,
            Modifiers(conditions) => conditions.iter().any(|c| c.uses_parameter(param_index)),
            Expression(condition) => condition.uses_parameter(param_index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_condition() {
        // Given
        let condition = ModifierCondition::new(Some(3), true);
        let mut params = ZERO_PARAMETERS;
        // When
        let off = condition.is_fulfilled(&params);
        params[3] = 0.7;
        let on = condition.is_fulfilled(&params);
        // Then
        assert!(!off);
        assert!(on);
    }

    #[test]
    fn modifier_condition_without_parameter_is_always_fulfilled() {
        let condition = ModifierCondition::new(None, false);
        assert!(condition.is_fulfilled(&ZERO_PARAMETERS));
    }

    #[test]
    fn modifiers_require_all_conditions() {
        // Given
        let condition = ActivationCondition::Modifiers(vec![
            ModifierCondition::new(Some(0), true),
            ModifierCondition::new(Some(1), false),
        ]);
        let mut params = ZERO_PARAMETERS;
        params[0] = 1.0;
        // When
        let both_fulfilled = condition.is_fulfilled(&params, true);
        params[1] = 1.0;
        let second_violated = condition.is_fulfilled(&params, true);
        // Then
        assert!(both_fulfilled);
        assert!(!second_violated);
    }

    #[test]
    fn expression_condition() {
        // Given
        let condition = ActivationCondition::Expression(
            ExpressionCondition::compile("p1 > 0.5").unwrap(),
        );
        let mut params = ZERO_PARAMETERS;
        // When
        let inactive = condition.is_fulfilled(&params, true);
        params[0] = 0.8;
        let active = condition.is_fulfilled(&params, true);
        // Then
        assert!(!inactive);
        assert!(active);
    }

    #[test]
    fn expression_condition_tracks_used_parameters() {
        // Given
        let condition = ExpressionCondition::compile("p2 + p17").unwrap();
        // Then
        assert!(condition.uses_parameter(1));
        assert!(condition.uses_parameter(16));
        assert!(!condition.uses_parameter(0));
    }

    #[test]
    fn target_present_condition_reflects_target_state() {
        let condition = ActivationCondition::TargetPresent;
        assert!(condition.is_fulfilled(&ZERO_PARAMETERS, true));
        assert!(!condition.is_fulfilled(&ZERO_PARAMETERS, false));
    }
}
