use crate::domain::{
    MainProcessorTask, MappingId, ProcessorMapping, RealTimeProcessorTask,
};
use tracing::debug;

/// Configuration-side owner of the mapping set.
///
/// Mutated by the non-real-time configuration surface only. Every change is
/// synced to the processors as a complete replacement set, so the dispatch
/// side swaps table and indexes between events and never observes a
/// half-updated configuration.
#[derive(Debug)]
pub struct Session {
    mappings: Vec<ProcessorMapping>,
    let_matched_events_through: bool,
    let_unmatched_events_through: bool,
    real_time_sender: crossbeam_channel::Sender<RealTimeProcessorTask>,
    main_sender: crossbeam_channel::Sender<MainProcessorTask>,
}

impl Session {
    pub fn new(
        real_time_sender: crossbeam_channel::Sender<RealTimeProcessorTask>,
        main_sender: crossbeam_channel::Sender<MainProcessorTask>,
    ) -> Session {
        Session {
            mappings: vec![],
            let_matched_events_through: false,
            let_unmatched_events_through: true,
            real_time_sender,
            main_sender,
        }
    }

    pub fn mappings(&self) -> &[ProcessorMapping] {
        &self.mappings
    }

    /// Replaces the complete mapping set and syncs it to the processors.
    pub fn set_mappings(&mut self, mappings: Vec<ProcessorMapping>) {
        self.mappings = mappings;
        self.sync_mappings();
    }

    pub fn add_mapping(&mut self, mapping: ProcessorMapping) {
        self.mappings.push(mapping);
        self.sync_mappings();
    }

    pub fn remove_mapping(&mut self, id: MappingId) {
        self.mappings.retain(|m| m.id() != id);
        self.sync_mappings();
    }

    pub fn set_event_through_flags(&mut self, matched: bool, unmatched: bool) {
        self.let_matched_events_through = matched;
        self.let_unmatched_events_through = unmatched;
        let _ = self
            .real_time_sender
            .send(RealTimeProcessorTask::UpdateFlags {
                let_matched_events_through: matched,
                let_unmatched_events_through: unmatched,
            });
    }

    /// Forwards a host parameter change to the dispatcher so activation
    /// conditions can react.
    pub fn update_parameter(&self, index: u32, value: f32) {
        let _ = self
            .main_sender
            .send(MainProcessorTask::UpdateParameter { index, value });
    }

    fn sync_mappings(&self) {
        let mut real_time_mappings = Vec::new();
        let mut main_mappings = Vec::with_capacity(self.mappings.len());
        for m in &self.mappings {
            let (real_time_mapping, main_mapping) = m.splinter();
            if let Some(real_time_mapping) = real_time_mapping {
                real_time_mappings.push(real_time_mapping);
            }
            main_mappings.push(main_mapping);
        }
        debug!(count = self.mappings.len(), "syncing mappings");
        let _ = self
            .real_time_sender
            .send(RealTimeProcessorTask::UpdateAllMappings(real_time_mappings));
        let _ = self
            .main_sender
            .send(MainProcessorTask::UpdateAllMappings(main_mappings));
    }
}
