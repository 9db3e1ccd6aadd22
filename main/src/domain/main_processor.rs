use crate::base::{NamedChannelSender, SenderToNormalThread};
use crate::domain::{
    ActivationChange, DiagnosticEvent, DispatchOutcome, FeedbackSendBehavior, MainMapping,
    MappingId, ParameterArray, TargetContext, TargetRef, ZERO_PARAMETERS, PARAMETER_COUNT,
};
use conductor_engine::{AbsoluteValue, DropReason, SourceClass, SourceValue, UnitValue};
use std::collections::HashMap;
use tracing::debug;

const NORMAL_BULK_SIZE: usize = 32;

/// The mapping table and dispatcher.
///
/// Owns the ordered mapping collection plus two derived indexes (by source
/// class for control dispatch, by target reference for feedback dispatch).
/// Mapping sets arrive as complete replacements over the task channel, and
/// both indexes are rebuilt in the same step, so dispatch never observes a
/// partially updated table.
#[derive(Debug)]
pub struct MainProcessor<C> {
    /// Order defines control dispatch order.
    mappings: Vec<MainMapping>,
    source_index: HashMap<SourceClass, Vec<usize>>,
    target_index: HashMap<TargetRef, Vec<usize>>,
    receiver: crossbeam_channel::Receiver<MainProcessorTask>,
    feedback_output: SenderToNormalThread<SourceValue>,
    diagnostics: SenderToNormalThread<DiagnosticEvent>,
    context: C,
    parameters: ParameterArray,
}

impl<C: TargetContext> MainProcessor<C> {
    pub fn new(
        receiver: crossbeam_channel::Receiver<MainProcessorTask>,
        feedback_output: SenderToNormalThread<SourceValue>,
        diagnostics: SenderToNormalThread<DiagnosticEvent>,
        context: C,
    ) -> MainProcessor<C> {
        MainProcessor {
            mappings: vec![],
            source_index: Default::default(),
            target_index: Default::default(),
            receiver,
            feedback_output,
            diagnostics,
            context,
            parameters: ZERO_PARAMETERS,
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn mappings(&self) -> &[MainMapping] {
        &self.mappings
    }

    /// Drains pending tasks. Should be called regularly from the main
    /// thread.
    pub fn run(&mut self) {
        let tasks: Vec<_> = self.receiver.try_iter().take(NORMAL_BULK_SIZE).collect();
        for task in tasks {
            use MainProcessorTask::*;
            match task {
                UpdateAllMappings(mappings) => self.update_all_mappings(mappings),
                Control { mapping_id, value } => {
                    self.control_by_mapping_id(mapping_id, value);
                }
                UpdateParameter { index, value } => self.update_parameter(index, value),
                UpdateAllParameters(parameters) => {
                    self.parameters = *parameters;
                    self.refresh_activations();
                }
                TargetValueChanged { target, new_value } => {
                    self.handle_target_change(&target, new_value);
                }
            }
        }
    }

    /// Control dispatch: matches the event against the by-source index and
    /// drives each matching, active, control-enabled mapping in insertion
    /// order. A failure in one mapping doesn't block the others.
    pub fn handle_input_event(&mut self, event: &SourceValue) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        let class = match event.class() {
            None => return outcomes,
            Some(c) => c,
        };
        let count = match self.source_index.get(&class) {
            None => return outcomes,
            Some(indexes) => indexes.len(),
        };
        for k in 0..count {
            let i = self.source_index[&class][k];
            let value = match self.mappings[i].source().control(event) {
                None => continue,
                Some(v) => v,
            };
            self.control_mapping(i, value, &mut outcomes);
        }
        outcomes
    }

    /// Control dispatch for a value already matched and decoded by the
    /// real-time processor.
    pub fn control_by_mapping_id(
        &mut self,
        mapping_id: MappingId,
        value: AbsoluteValue,
    ) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        if let Some(index) = self.mappings.iter().position(|m| m.id() == mapping_id) {
            self.control_mapping(index, value, &mut outcomes);
        }
        outcomes
    }

    /// Feedback dispatch: reflects an authoritative target value change back
    /// to the sources of all feedback-enabled mappings of that target.
    pub fn handle_target_change(
        &mut self,
        target: &TargetRef,
        new_value: UnitValue,
    ) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        let count = match self.target_index.get(target) {
            None => return outcomes,
            Some(indexes) => indexes.len(),
        };
        for k in 0..count {
            let i = self.target_index[target][k];
            self.feedback_mapping(i, new_value, &mut outcomes);
        }
        outcomes
    }

    fn control_mapping(
        &mut self,
        index: usize,
        value: AbsoluteValue,
        outcomes: &mut Vec<DispatchOutcome>,
    ) {
        let outcome = {
            let m = &mut self.mappings[index];
            match m.control_if_enabled(value, &self.context) {
                None => return,
                Some(o) => o,
            }
        };
        match outcome {
            DispatchOutcome::Dropped { mapping, reason } => {
                let event = if reason == DropReason::TransformationFailed {
                    DiagnosticEvent::ExpressionFailed {
                        mapping,
                        context: "control transformation",
                    }
                } else {
                    DiagnosticEvent::EventDropped { mapping, reason }
                };
                self.diagnostics.send_if_space(event);
            }
            DispatchOutcome::TargetFailed { mapping, error } => {
                self.diagnostics
                    .send_if_space(DiagnosticEvent::TargetFailed { mapping, error });
            }
            _ => {}
        }
        let send_feedback_after_control = matches!(
            outcome,
            DispatchOutcome::TargetHit { .. } | DispatchOutcome::TargetUntouched { .. }
        ) && self.mappings[index].options().feedback_send_behavior
            == FeedbackSendBehavior::SendFeedbackAfterControl;
        outcomes.push(outcome);
        if send_feedback_after_control {
            if let Ok(current) = self.context.read(self.mappings[index].target()) {
                self.feedback_mapping(index, current, outcomes);
            }
        }
    }

    fn feedback_mapping(
        &mut self,
        index: usize,
        target_value: UnitValue,
        outcomes: &mut Vec<DispatchOutcome>,
    ) {
        let m = &self.mappings[index];
        if !m.feedback_is_effectively_on() {
            return;
        }
        if m.is_echo() {
            outcomes.push(DispatchOutcome::EchoSuppressed { mapping: m.id() });
            return;
        }
        match m.feedback(target_value) {
            Ok(Some(event)) => {
                self.feedback_output.send_if_space(event);
                outcomes.push(DispatchOutcome::FeedbackSent {
                    mapping: m.id(),
                    value: target_value,
                });
            }
            Ok(None) => {}
            Err(_) => {
                self.diagnostics.send_if_space(DiagnosticEvent::ExpressionFailed {
                    mapping: m.id(),
                    context: "feedback transformation",
                });
                outcomes.push(DispatchOutcome::FeedbackFailed { mapping: m.id() });
            }
        }
    }

    fn update_all_mappings(&mut self, mut mappings: Vec<MainMapping>) {
        debug!(count = mappings.len(), "main mappings synced");
        for m in &mut mappings {
            m.update_activation(&self.parameters, &self.context);
        }
        self.mappings = mappings;
        self.rebuild_indexes();
        self.send_initial_feedback();
    }

    /// Both indexes are rebuilt together so dispatch never sees them out of
    /// sync.
    fn rebuild_indexes(&mut self) {
        self.source_index.clear();
        self.target_index.clear();
        for (i, m) in self.mappings.iter().enumerate() {
            self.source_index
                .entry(m.source().class())
                .or_default()
                .push(i);
            self.target_index.entry(*m.target()).or_default().push(i);
        }
    }

    /// Attached controllers should reflect current target state right after
    /// a sync.
    fn send_initial_feedback(&mut self) {
        let targets: Vec<TargetRef> = self.target_index.keys().copied().collect();
        let mut outcomes = Vec::new();
        for target in targets {
            if let Ok(value) = self.context.read(&target) {
                self.handle_target_change_into(&target, value, &mut outcomes);
            }
        }
    }

    fn handle_target_change_into(
        &mut self,
        target: &TargetRef,
        new_value: UnitValue,
        outcomes: &mut Vec<DispatchOutcome>,
    ) {
        let count = match self.target_index.get(target) {
            None => return,
            Some(indexes) => indexes.len(),
        };
        for k in 0..count {
            let i = self.target_index[target][k];
            self.feedback_mapping(i, new_value, outcomes);
        }
    }

    fn update_parameter(&mut self, index: u32, value: f32) {
        if index >= PARAMETER_COUNT {
            return;
        }
        self.parameters[index as usize] = value;
        self.refresh_activations();
    }

    fn refresh_activations(&mut self) {
        let mut changes: Vec<(usize, ActivationChange)> = Vec::new();
        for (i, m) in self.mappings.iter_mut().enumerate() {
            if let Some(change) = m.update_activation(&self.parameters, &self.context) {
                changes.push((i, change));
            }
        }
        for (i, change) in changes {
            debug!(mapping = %change.id, is_active = change.is_active, "mapping activation changed");
            if change.is_active {
                // Freshly active mappings should reflect target state.
                if let Ok(value) = self.context.read(self.mappings[i].target()) {
                    let mut outcomes = Vec::new();
                    self.feedback_mapping(i, value, &mut outcomes);
                }
            } else {
                // Lights out for deactivated mappings.
                let m = &self.mappings[i];
                if m.options().feedback_is_enabled {
                    if let Some(event) = m.off_feedback() {
                        self.feedback_output.send_if_space(event);
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
pub enum MainProcessorTask {
    UpdateAllMappings(Vec<MainMapping>),
    Control {
        mapping_id: MappingId,
        value: AbsoluteValue,
    },
    UpdateParameter {
        index: u32,
        value: f32,
    },
    UpdateAllParameters(Box<ParameterArray>),
    TargetValueChanged {
        target: TargetRef,
        new_value: UnitValue,
    },
}
