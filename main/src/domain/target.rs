use conductor_engine::{ControlType, Target, UnitValue};
use thiserror::Error;

/// Addressable destination of a mapping.
///
/// Opaque to the engine beyond the capabilities exposed by [`TargetContext`].
/// Immutable per mapping.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TargetRef {
    TrackVolume {
        track_index: u32,
    },
    TrackPan {
        track_index: u32,
    },
    FxParameter {
        track_index: u32,
        fx_index: u32,
        param_index: u32,
    },
    Action {
        command_id: u32,
    },
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum TargetError {
    #[error("target doesn't exist anymore")]
    TargetGone,
    #[error("target value out of range")]
    OutOfRange,
    #[error("target is not writable")]
    NotWritable,
}

/// Capabilities the host must supply so the engine can observe and hit
/// targets. Called on the event path, so implementations must be cheap and
/// non-blocking.
pub trait TargetContext {
    fn read(&self, target: &TargetRef) -> Result<UnitValue, TargetError>;

    fn write(&self, target: &TargetRef, value: UnitValue) -> Result<(), TargetError>;

    fn control_type(&self, target: &TargetRef) -> ControlType;

    fn exists(&self, target: &TargetRef) -> bool {
        self.read(target).is_ok()
    }
}

/// One target resolved against a context, viewed through the engine's
/// `Target` seam.
pub struct ResolvedTarget<'a, C> {
    pub target_ref: &'a TargetRef,
    pub context: &'a C,
}

impl<'a, C: TargetContext> Target for ResolvedTarget<'a, C> {
    fn current_value(&self) -> UnitValue {
        self.context
            .read(self.target_ref)
            .unwrap_or(UnitValue::MIN)
    }

    fn control_type(&self) -> ControlType {
        self.context.control_type(self.target_ref)
    }
}
