use crate::domain::{
    ActivationCondition, DispatchOutcome, ExpressionTransformation, ParameterArray,
    ResolvedTarget, TargetContext, TargetError, TargetRef,
};
use conductor_engine::{AbsoluteValue, Mode, ModeControlResult, Source, SourceValue, UnitValue};
use derive_more::Display;
use helgoboss_midi::RawShortMessage;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::time::{Duration, Instant};
use strum::EnumIter;
use uuid::Uuid;

/// Internal technical mapping identifier, not persistent.
///
/// Goals: Quick lookup, guaranteed uniqueness, cheap copy
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
#[display(fmt = "{}", uuid)]
pub struct MappingId {
    uuid: Uuid,
}

impl MappingId {
    pub fn random() -> MappingId {
        MappingId {
            uuid: Uuid::new_v4(),
        }
    }
}

pub const DEFAULT_ECHO_FEEDBACK_DELAY: Duration = Duration::from_millis(100);

#[derive(
    Copy, Clone, Eq, PartialEq, Hash, Debug, Display, EnumIter, TryFromPrimitive, IntoPrimitive,
)]
#[repr(usize)]
pub enum FeedbackSendBehavior {
    #[display(fmt = "Normal")]
    Normal,
    #[display(fmt = "Send feedback after control")]
    SendFeedbackAfterControl,
    #[display(fmt = "Prevent echo feedback")]
    PreventEchoFeedback,
}

impl Default for FeedbackSendBehavior {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Copy, Clone, Debug)]
pub struct ProcessorMappingOptions {
    pub control_is_enabled: bool,
    pub feedback_is_enabled: bool,
    pub feedback_send_behavior: FeedbackSendBehavior,
    /// How long after a control-caused write this mapping's own feedback is
    /// suppressed when echo prevention is on.
    pub echo_feedback_delay: Duration,
}

impl Default for ProcessorMappingOptions {
    fn default() -> Self {
        Self {
            control_is_enabled: true,
            feedback_is_enabled: true,
            feedback_send_behavior: Default::default(),
            echo_feedback_delay: DEFAULT_ECHO_FEEDBACK_DELAY,
        }
    }
}

/// The configured mapping aggregate, owned by the session.
///
/// Never touched by the dispatcher directly; it gets splintered into the
/// processor-specific projections on sync.
#[derive(Clone, Debug)]
pub struct ProcessorMapping {
    id: MappingId,
    source: Source,
    mode: Mode<ExpressionTransformation>,
    target: TargetRef,
    activation_condition: ActivationCondition,
    options: ProcessorMappingOptions,
}

impl ProcessorMapping {
    pub fn new(
        id: MappingId,
        source: Source,
        mode: Mode<ExpressionTransformation>,
        target: TargetRef,
        activation_condition: ActivationCondition,
        options: ProcessorMappingOptions,
    ) -> ProcessorMapping {
        ProcessorMapping {
            id,
            source,
            mode,
            target,
            activation_condition,
            options,
        }
    }

    pub fn id(&self) -> MappingId {
        self.id
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    /// Splits this mapping into the real-time projection (matching only) and
    /// the main projection (the full pipeline).
    ///
    /// The real-time processor gets the mapping only if control is enabled.
    pub fn splinter(&self) -> (Option<RealTimeMapping>, MainMapping) {
        let real_time_mapping = if self.options.control_is_enabled {
            Some(RealTimeMapping::new(self.id, self.source))
        } else {
            None
        };
        let main_mapping = MainMapping::new(
            self.id,
            self.source,
            self.mode.clone(),
            self.target,
            self.activation_condition.clone(),
            self.options,
        );
        (real_time_mapping, main_mapping)
    }
}

/// Real-time projection of a mapping: just enough to match and decode
/// incoming events in the audio thread.
#[derive(Copy, Clone, Debug)]
pub struct RealTimeMapping {
    id: MappingId,
    source: Source,
}

impl RealTimeMapping {
    pub fn new(id: MappingId, source: Source) -> RealTimeMapping {
        RealTimeMapping { id, source }
    }

    pub fn id(&self) -> MappingId {
        self.id
    }

    pub fn control(&self, value: &SourceValue) -> Option<AbsoluteValue> {
        self.source.control(value)
    }

    pub fn consumes(&self, msg: RawShortMessage) -> bool {
        self.source.consumes(msg)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct ActivationChange {
    pub id: MappingId,
    pub is_active: bool,
}

/// Main-thread projection of a mapping: runs the mode pipeline and holds the
/// runtime state (activation, target presence, echo window).
#[derive(Debug)]
pub struct MainMapping {
    id: MappingId,
    source: Source,
    mode: Mode<ExpressionTransformation>,
    target: TargetRef,
    activation_condition: ActivationCondition,
    options: ProcessorMappingOptions,
    is_active: bool,
    target_is_present: bool,
    time_of_last_control: Option<Instant>,
}

impl MainMapping {
    pub fn new(
        id: MappingId,
        source: Source,
        mode: Mode<ExpressionTransformation>,
        target: TargetRef,
        activation_condition: ActivationCondition,
        options: ProcessorMappingOptions,
    ) -> MainMapping {
        MainMapping {
            id,
            source,
            mode,
            target,
            activation_condition,
            options,
            is_active: false,
            target_is_present: false,
            time_of_last_control: None,
        }
    }

    pub fn id(&self) -> MappingId {
        self.id
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    pub fn options(&self) -> &ProcessorMappingOptions {
        &self.options
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Re-evaluates activation against current runtime state. Returns `Some`
    /// if the active state flipped.
    pub fn update_activation(
        &mut self,
        params: &ParameterArray,
        context: &impl TargetContext,
    ) -> Option<ActivationChange> {
        self.target_is_present = context.exists(&self.target);
        let was_active = self.is_active;
        self.is_active = self
            .activation_condition
            .is_fulfilled(params, self.target_is_present);
        if self.is_active == was_active {
            return None;
        }
        if self.is_active {
            // The world may have moved on while this mapping was inactive.
            self.mode.reset();
        }
        Some(ActivationChange {
            id: self.id,
            is_active: self.is_active,
        })
    }

    pub fn control_is_effectively_on(&self) -> bool {
        self.is_active && self.target_is_present && self.options.control_is_enabled
    }

    pub fn feedback_is_effectively_on(&self) -> bool {
        self.is_active && self.target_is_present && self.options.feedback_is_enabled
    }

    /// Controls mode => target. `None` if this mapping doesn't currently
    /// take part in control dispatch.
    pub fn control_if_enabled(
        &mut self,
        value: AbsoluteValue,
        context: &impl TargetContext,
    ) -> Option<DispatchOutcome> {
        if !self.control_is_effectively_on() {
            return None;
        }
        let target = ResolvedTarget {
            target_ref: &self.target,
            context,
        };
        use ModeControlResult::*;
        let outcome = match self.mode.control(value, &target) {
            HitTarget(v) => {
                if self.options.feedback_send_behavior == FeedbackSendBehavior::PreventEchoFeedback
                {
                    self.time_of_last_control = Some(Instant::now());
                }
                match context.write(&self.target, v) {
                    Ok(()) => DispatchOutcome::TargetHit {
                        mapping: self.id,
                        value: v,
                    },
                    Err(error) => {
                        if error == TargetError::TargetGone {
                            // Deactivation signal, no retry.
                            self.target_is_present = false;
                        }
                        DispatchOutcome::TargetFailed {
                            mapping: self.id,
                            error,
                        }
                    }
                }
            }
            LeaveTargetUntouched(v) => DispatchOutcome::TargetUntouched {
                mapping: self.id,
                value: v,
            },
            Dropped(reason) => DispatchOutcome::Dropped {
                mapping: self.id,
                reason,
            },
        };
        Some(outcome)
    }

    /// Returns if this mapping's own feedback is currently suppressed
    /// because it just caused a control write itself.
    pub fn is_echo(&self) -> bool {
        match self.time_of_last_control {
            None => false,
            Some(t) => t.elapsed() <= self.options.echo_feedback_delay,
        }
    }

    /// Transforms the given target value through the feedback direction and
    /// encodes it for the source. `Ok(None)` if the source is too unspecific
    /// to encode feedback.
    pub fn feedback(&self, target_value: UnitValue) -> Result<Option<SourceValue>, &'static str> {
        let mode_value = self.mode.feedback(target_value)?;
        Ok(self.source.feedback(mode_value))
    }

    /// Feedback that turns the corresponding control off, e.g. for mappings
    /// that just got deactivated.
    pub fn off_feedback(&self) -> Option<SourceValue> {
        self.source.feedback(UnitValue::MIN)
    }
}
