use crate::domain::{MappingId, TargetError};
use conductor_engine::{DropReason, UnitValue};

/// What happened for one mapping as a result of one dispatched event.
///
/// Policy drops are deliberately distinct from failures so they stay
/// observable for diagnostics and tests.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum DispatchOutcome {
    /// The target was written with the given value.
    TargetHit {
        mapping: MappingId,
        value: UnitValue,
    },
    /// The desired value was determined but the target has it already or the
    /// change was sub-threshold. Nothing was written.
    TargetUntouched {
        mapping: MappingId,
        value: UnitValue,
    },
    /// Deliberate no-output outcome.
    Dropped {
        mapping: MappingId,
        reason: DropReason,
    },
    /// The target refused the write.
    TargetFailed {
        mapping: MappingId,
        error: TargetError,
    },
    /// An outbound feedback event reflecting the given target value was
    /// emitted.
    FeedbackSent {
        mapping: MappingId,
        value: UnitValue,
    },
    /// Feedback was suppressed because this mapping caused the target change
    /// itself a moment ago.
    EchoSuppressed { mapping: MappingId },
    /// Feedback couldn't be computed (e.g. feedback expression failed).
    FeedbackFailed { mapping: MappingId },
}

impl DispatchOutcome {
    pub fn mapping_id(&self) -> MappingId {
        use DispatchOutcome::*;
        match self {
            TargetHit { mapping, .. }
            | TargetUntouched { mapping, .. }
            | Dropped { mapping, .. }
            | TargetFailed { mapping, .. }
            | FeedbackSent { mapping, .. }
            | EchoSuppressed { mapping }
            | FeedbackFailed { mapping } => *mapping,
        }
    }

    pub fn is_success(&self) -> bool {
        use DispatchOutcome::*;
        matches!(
            self,
            TargetHit { .. } | TargetUntouched { .. } | FeedbackSent { .. }
        )
    }
}

/// Non-fatal events pushed into the diagnostics channel.
///
/// Consumed by logging/UI only, never read back by the engine.
#[derive(Clone, Debug)]
pub enum DiagnosticEvent {
    ExpressionFailed {
        mapping: MappingId,
        context: &'static str,
    },
    EventDropped {
        mapping: MappingId,
        reason: DropReason,
    },
    TargetFailed {
        mapping: MappingId,
        error: TargetError,
    },
    MappingRejected {
        name: String,
        reason: String,
    },
}
