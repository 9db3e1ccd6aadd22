use crate::UnitValue;

/// How a target wants to be controlled.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum ControlType {
    AbsoluteContinuous,
    /// Continuous, but has a natural grid the value can be rounded to.
    AbsoluteContinuousRoundable { rounding_step_size: UnitValue },
    /// Discrete with the given atomic step size.
    AbsoluteDiscrete { atomic_step_size: UnitValue },
    /// Only cares about being invoked, not about the value.
    Trigger,
}

impl ControlType {
    pub fn is_discrete(self) -> bool {
        matches!(self, ControlType::AbsoluteDiscrete { .. })
    }

    pub fn is_trigger(self) -> bool {
        matches!(self, ControlType::Trigger)
    }

    /// The grid the target value moves on, if any.
    pub fn step_size(self) -> Option<UnitValue> {
        use ControlType::*;
        match self {
            AbsoluteContinuousRoundable { rounding_step_size } => Some(rounding_step_size),
            AbsoluteDiscrete { atomic_step_size } => Some(atomic_step_size),
            AbsoluteContinuous | Trigger => None,
        }
    }
}

/// Engine-side view of a mapping target. The domain layer adapts concrete
/// host targets to this.
pub trait Target {
    /// Current value of this target.
    fn current_value(&self) -> UnitValue;

    fn control_type(&self) -> ControlType;
}
