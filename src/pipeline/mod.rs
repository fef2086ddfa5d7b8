//! Frame processing pipeline.
//!
//! [`process_frames`] walks located NAL units in playback order and hands
//! each one to a [`FramePolicy`], threading a [`ProcessingState`] through
//! every call. Policies read and write the output file directly; the
//! pipeline itself never touches it.

pub mod policy;
pub mod prompt;

pub use policy::{
    count_i_frame, CollectStats, Composite, Decision, DecisionSource, FramePolicy,
    NullifyIFrames,
};
pub use prompt::Prompt;

use datamosh_h264::{FrameType, NalUnit};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};
use thiserror::Error;

/// A random-access output file: policies classify from it and mutate it.
pub trait Target: Read + Write + Seek {}

impl<T: Read + Write + Seek + ?Sized> Target for T {}

/// Counters and mode flags threaded through one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingState {
    /// IDR slice units seen so far.
    pub i_frame_count: u32,
    /// IDR slice units nullified so far.
    pub i_frame_removed_count: u32,
    /// Ask before each nullification. Cleared by an "all" answer.
    pub interactive: bool,
    /// Report every I-frame as it is visited.
    pub debug: bool,
    /// Units fully handled by the policy.
    pub units_visited: u64,
    /// Slice units per classified frame type.
    pub frame_counts: BTreeMap<FrameType, u64>,
    /// Non-slice units per `nal_unit_type`.
    pub nal_counts: BTreeMap<u8, u64>,
}

impl ProcessingState {
    pub fn new(interactive: bool, debug: bool) -> Self {
        Self {
            interactive,
            debug,
            ..Self::default()
        }
    }
}

/// A pipeline run stopped on a policy error.
///
/// `state` holds the counters as they stood when unit `index` failed, so
/// callers can still report partial progress.
#[derive(Debug, Error)]
#[error("Processing aborted at NAL unit {index}: {source}")]
pub struct Aborted {
    pub state: ProcessingState,
    pub index: usize,
    #[source]
    pub source: datamosh_h264::Error,
}

/// Visit every unit in order with `policy`.
///
/// Stops at the first policy error. Units after the failing one are never
/// visited, and mutations already applied to `target` stay applied.
pub fn process_frames<P: FramePolicy + ?Sized>(
    units: &[NalUnit],
    target: &mut dyn Target,
    policy: &mut P,
    mut state: ProcessingState,
) -> Result<ProcessingState, Aborted> {
    for (index, unit) in units.iter().enumerate() {
        if let Err(source) = policy.visit(&mut state, unit, target) {
            return Err(Aborted {
                state,
                index,
                source,
            });
        }
        state.units_visited += 1;
    }

    tracing::debug!(
        units = state.units_visited,
        i_frames = state.i_frame_count,
        removed = state.i_frame_removed_count,
        "Pipeline finished"
    );
    Ok(state)
}
