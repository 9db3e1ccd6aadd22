//! Control mapping engine.
//!
//! Routes control events (MIDI-like notes, CCs, (N)RPNs, pitch bend) through
//! per-mapping numeric pipelines to host targets, with a symmetric feedback
//! path from target state back to the originating device.

#[macro_use]
pub mod base;

pub mod application;
pub mod domain;
