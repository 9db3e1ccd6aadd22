use crate::base::{NamedChannelSender, SenderToNormalThread};
use crate::domain::{MainProcessorTask, RealTimeMapping};
use conductor_engine::SourceValue;
use helgoboss_midi::{
    Channel, ControlChange14BitMessageScanner, PollingParameterNumberMessageScanner,
    RawShortMessage,
};
use std::time::Duration;
use tracing::debug;

const NORMAL_BULK_SIZE: usize = 100;

/// Whether an incoming event reached at least one mapping.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MatchOutcome {
    Unmatched,
    /// Matched at least one mapping source.
    Matched,
    /// Didn't match on its own but is part of a composite message some
    /// mapping listens to, so it must not be treated as unmatched.
    Consumed,
}

impl MatchOutcome {
    pub fn matched_or_consumed(self) -> bool {
        !matches!(self, MatchOutcome::Unmatched)
    }

    pub fn merge_with(self, other: MatchOutcome) -> MatchOutcome {
        use MatchOutcome::*;
        match (self, other) {
            (Matched, _) | (_, Matched) => Matched,
            (Consumed, _) | (_, Consumed) => Consumed,
            _ => Unmatched,
        }
    }
}

/// The real-time entry point.
///
/// Runs in the audio/control thread: assembles composite messages ((N)RPN,
/// 14-bit CC), matches incoming events against the splintered mappings and
/// forwards decoded control values to the main processor. Processing one
/// event is a bounded, non-blocking computation.
#[derive(Debug)]
pub struct RealTimeProcessor {
    receiver: crossbeam_channel::Receiver<RealTimeProcessorTask>,
    main_processor_sender: SenderToNormalThread<MainProcessorTask>,
    mappings: Vec<RealTimeMapping>,
    let_matched_events_through: bool,
    let_unmatched_events_through: bool,
    // Scanners for more complex MIDI message types
    nrpn_scanner: PollingParameterNumberMessageScanner,
    cc_14_bit_scanner: ControlChange14BitMessageScanner,
}

impl RealTimeProcessor {
    pub fn new(
        receiver: crossbeam_channel::Receiver<RealTimeProcessorTask>,
        main_processor_sender: SenderToNormalThread<MainProcessorTask>,
    ) -> RealTimeProcessor {
        RealTimeProcessor {
            receiver,
            main_processor_sender,
            mappings: vec![],
            let_matched_events_through: false,
            let_unmatched_events_through: true,
            nrpn_scanner: PollingParameterNumberMessageScanner::new(Duration::from_millis(1)),
            cc_14_bit_scanner: Default::default(),
        }
    }

    /// Should be called regularly in the real-time thread: drains pending
    /// tasks and polls the (N)RPN scanner for messages that completed by
    /// timeout.
    pub fn idle(&mut self) {
        for task in self.receiver.try_iter().take(NORMAL_BULK_SIZE) {
            use RealTimeProcessorTask::*;
            match task {
                UpdateAllMappings(mappings) => {
                    debug!(count = mappings.len(), "real-time mappings synced");
                    self.mappings = mappings;
                    self.nrpn_scanner.reset();
                    self.cc_14_bit_scanner.reset();
                }
                UpdateFlags {
                    let_matched_events_through,
                    let_unmatched_events_through,
                } => {
                    self.let_matched_events_through = let_matched_events_through;
                    self.let_unmatched_events_through = let_unmatched_events_through;
                }
            }
        }
        for ch in 0..16 {
            if let Some(nrpn_msg) = self.nrpn_scanner.poll(Channel::new(ch)) {
                self.process_value(&SourceValue::ParameterNumber(nrpn_msg));
            }
        }
    }

    /// Processes a short message coming from the device input and returns
    /// whether it reached a mapping.
    ///
    /// Even if the message completes a composite message, the plain message
    /// is still processed: if no mapping listens to the composite kind, the
    /// involved CCs remain usable separately. If one does, the plain message
    /// counts as consumed so it isn't routed on as unmatched.
    pub fn process_incoming_short(&mut self, msg: RawShortMessage) -> MatchOutcome {
        let mut outcome = self.process_value(&SourceValue::Plain(msg));
        for nrpn_msg in self.nrpn_scanner.feed(&msg).iter().flatten() {
            outcome =
                outcome.merge_with(self.process_value(&SourceValue::ParameterNumber(*nrpn_msg)));
        }
        if let Some(cc14_msg) = self.cc_14_bit_scanner.feed(&msg) {
            outcome =
                outcome.merge_with(self.process_value(&SourceValue::ControlChange14Bit(cc14_msg)));
        }
        if outcome == MatchOutcome::Unmatched && self.mappings.iter().any(|m| m.consumes(msg)) {
            outcome = MatchOutcome::Consumed;
        }
        outcome
    }

    /// Returns whether the host should route the event on to its normal
    /// destination, given the configured through-flags.
    pub fn should_let_through(&self, outcome: MatchOutcome) -> bool {
        if outcome.matched_or_consumed() {
            self.let_matched_events_through
        } else {
            self.let_unmatched_events_through
        }
    }

    fn process_value(&self, value: &SourceValue) -> MatchOutcome {
        let mut matched = false;
        for m in &self.mappings {
            if let Some(control_value) = m.control(value) {
                self.main_processor_sender.send_if_space(MainProcessorTask::Control {
                    mapping_id: m.id(),
                    value: control_value,
                });
                matched = true;
            }
        }
        if matched {
            MatchOutcome::Matched
        } else {
            MatchOutcome::Unmatched
        }
    }
}

#[derive(Debug)]
pub enum RealTimeProcessorTask {
    UpdateAllMappings(Vec<RealTimeMapping>),
    UpdateFlags {
        let_matched_events_through: bool,
        let_unmatched_events_through: bool,
    },
}
