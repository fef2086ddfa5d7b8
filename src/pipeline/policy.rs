//! Per-unit policies for the frame pipeline.

use super::{ProcessingState, Target};
use datamosh_h264::{NalUnit, NalUnitType, Result};
use tracing::{debug, info, trace};

/// Behaviour applied to each located NAL unit.
pub trait FramePolicy {
    /// Handle one unit, updating `state` and possibly mutating `target`.
    fn visit(
        &mut self,
        state: &mut ProcessingState,
        unit: &NalUnit,
        target: &mut dyn Target,
    ) -> Result<()>;
}

impl<F> FramePolicy for F
where
    F: FnMut(&mut ProcessingState, &NalUnit, &mut dyn Target) -> Result<()>,
{
    fn visit(
        &mut self,
        state: &mut ProcessingState,
        unit: &NalUnit,
        target: &mut dyn Target,
    ) -> Result<()> {
        self(state, unit, target)
    }
}

/// Answer to "nullify this I-frame?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Yes,
    No,
    /// Nullify this one and every later one without asking.
    All,
}

impl Decision {
    /// Interpret a typed answer: an empty line or anything containing `n`
    /// declines, anything else containing `a` accepts the rest of the run,
    /// and any other text accepts.
    pub fn from_answer(answer: &str) -> Self {
        let answer = answer.trim().to_lowercase();
        if answer.is_empty() || answer.contains('n') {
            Decision::No
        } else if answer.contains('a') {
            Decision::All
        } else {
            Decision::Yes
        }
    }
}

/// Where interactive decisions come from.
pub trait DecisionSource {
    fn decide(&mut self, unit: &NalUnit) -> Decision;
}

/// A fixed answer.
impl DecisionSource for Decision {
    fn decide(&mut self, _unit: &NalUnit) -> Decision {
        *self
    }
}

impl<F> DecisionSource for F
where
    F: FnMut(&NalUnit) -> Decision,
{
    fn decide(&mut self, unit: &NalUnit) -> Decision {
        self(unit)
    }
}

/// Zero the payload of every IDR slice except the first one.
///
/// When `state.interactive` is set, each candidate is put to the decision
/// source first. The first IDR slice is never offered.
pub struct NullifyIFrames<D> {
    decisions: D,
}

impl<D: DecisionSource> NullifyIFrames<D> {
    pub fn new(decisions: D) -> Self {
        Self { decisions }
    }

    /// Give back the decision source.
    pub fn into_decisions(self) -> D {
        self.decisions
    }
}

impl<D: DecisionSource> FramePolicy for NullifyIFrames<D> {
    fn visit(
        &mut self,
        state: &mut ProcessingState,
        unit: &NalUnit,
        target: &mut dyn Target,
    ) -> Result<()> {
        if unit.kind() != NalUnitType::IdrSlice {
            return Ok(());
        }

        count_i_frame(state, unit);

        if state.i_frame_count == 1 {
            debug!(offset = unit.offset, "Keeping first I-frame");
            return Ok(());
        }

        if state.interactive {
            match self.decisions.decide(unit) {
                Decision::No => {
                    debug!(offset = unit.offset, "I-frame kept on request");
                    return Ok(());
                }
                Decision::All => {
                    info!("Nullifying all remaining I-frames");
                    state.interactive = false;
                }
                Decision::Yes => {}
            }
        }

        unit.nullify(target)?;
        state.i_frame_removed_count += 1;
        Ok(())
    }
}

/// Count an IDR slice unit, reporting it when `state.debug` is set.
pub fn count_i_frame(state: &mut ProcessingState, unit: &NalUnit) {
    state.i_frame_count += 1;
    if state.debug {
        match unit.timestamp.and_then(|t| t.as_secs_f64()) {
            Some(secs) => info!("I-frame #{}: pts {:.2}s", state.i_frame_count, secs),
            None => info!(
                "I-frame #{}: offset {}, length {}",
                state.i_frame_count, unit.offset, unit.length
            ),
        }
    }
}

/// Classify slice units and count units by type.
///
/// Slices are checked with `parse_header` before their `slice_type` is read,
/// so a unit that no longer matches the bitstream aborts the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectStats;

impl FramePolicy for CollectStats {
    fn visit(
        &mut self,
        state: &mut ProcessingState,
        unit: &NalUnit,
        target: &mut dyn Target,
    ) -> Result<()> {
        if !unit.kind().is_slice() {
            *state.nal_counts.entry(unit.nal_type).or_default() += 1;
            return Ok(());
        }

        unit.parse_header(target)?;
        let frame = unit.parse_slice_type(target)?;
        trace!(offset = unit.offset, frame = %frame, "Classified slice");
        *state.frame_counts.entry(frame).or_default() += 1;
        Ok(())
    }
}

/// Several policies applied in order to each unit.
///
/// The first failing policy aborts the unit; later policies do not see it.
#[derive(Default)]
pub struct Composite<'a> {
    policies: Vec<Box<dyn FramePolicy + 'a>>,
}

impl<'a> Composite<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a policy.
    pub fn with(mut self, policy: impl FramePolicy + 'a) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl FramePolicy for Composite<'_> {
    fn visit(
        &mut self,
        state: &mut ProcessingState,
        unit: &NalUnit,
        target: &mut dyn Target,
    ) -> Result<()> {
        for policy in &mut self.policies {
            policy.visit(state, unit, target)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::process_frames;
    use assert_matches::assert_matches;
    use datamosh_h264::{Error, FrameType, Timestamp};
    use std::io::Cursor;

    /// Header byte and three payload bytes per unit, back to back.
    fn stream(types: &[(u8, [u8; 4])]) -> (Vec<u8>, Vec<NalUnit>) {
        let mut data = Vec::new();
        let mut units = Vec::new();
        for (i, (nal_type, bytes)) in types.iter().enumerate() {
            units.push(NalUnit {
                nal_type: *nal_type,
                offset: data.len() as u64,
                length: 4,
                track_id: 1,
                chunk: 0,
                sample: i as u32,
                timestamp: Some(Timestamp {
                    value: i as u64 * 500,
                    timescale: 1000,
                }),
            });
            data.extend_from_slice(bytes);
        }
        (data, units)
    }

    const IDR: (u8, [u8; 4]) = (5, [0x65, 0x88, 0x80, 0x11]);
    const P: (u8, [u8; 4]) = (1, [0x41, 0x9A, 0x11, 0x22]);
    const SPS: (u8, [u8; 4]) = (7, [0x67, 0x42, 0xC0, 0x1E]);

    fn zeroed(data: &[u8], unit: &NalUnit) -> bool {
        let start = unit.payload_offset() as usize;
        let end = (unit.offset + unit.length as u64) as usize;
        data[start..end].iter().all(|&b| b == 0)
    }

    #[test]
    fn test_decision_from_answer() {
        assert_eq!(Decision::from_answer("y\n"), Decision::Yes);
        assert_eq!(Decision::from_answer("yes"), Decision::Yes);
        assert_eq!(Decision::from_answer(""), Decision::No);
        assert_eq!(Decision::from_answer("\n"), Decision::No);
        assert_eq!(Decision::from_answer("  \t\n"), Decision::No);
        assert_eq!(Decision::from_answer("n"), Decision::No);
        assert_eq!(Decision::from_answer("No"), Decision::No);
        assert_eq!(Decision::from_answer("A"), Decision::All);
        assert_eq!(Decision::from_answer("all"), Decision::All);
        // "no to all" still reads as a refusal
        assert_eq!(Decision::from_answer("nope, all"), Decision::No);
    }

    #[test]
    fn test_nullify_keeps_first_i_frame() {
        let (data, units) = stream(&[SPS, IDR, P, IDR, P, IDR]);
        let mut target = Cursor::new(data.clone());

        let state = process_frames(
            &units,
            &mut target,
            &mut NullifyIFrames::new(Decision::Yes),
            ProcessingState::default(),
        )
        .unwrap();

        assert_eq!(state.i_frame_count, 3);
        assert_eq!(state.i_frame_removed_count, 2);

        let out = target.into_inner();
        assert_eq!(out.len(), data.len());
        assert_eq!(&out[..12], &data[..12]);
        assert!(zeroed(&out, &units[3]));
        assert!(zeroed(&out, &units[5]));
        assert_eq!(out[units[3].offset as usize], 0x65);
        assert_eq!(&out[16..20], &data[16..20]);
    }

    #[test]
    fn test_non_idr_units_are_ignored() {
        let (data, units) = stream(&[P, SPS, P]);
        let mut target = Cursor::new(data.clone());

        let state = process_frames(
            &units,
            &mut target,
            &mut NullifyIFrames::new(Decision::Yes),
            ProcessingState::default(),
        )
        .unwrap();

        assert_eq!(state.i_frame_count, 0);
        assert_eq!(target.into_inner(), data);
    }

    #[test]
    fn test_interactive_decisions() {
        let (data, units) = stream(&[IDR, IDR, IDR, IDR, IDR]);
        let mut answers = vec![Decision::No, Decision::All, Decision::No].into_iter();
        let mut asked = Vec::new();
        let decisions = |unit: &NalUnit| {
            asked.push(unit.sample);
            answers.next().unwrap_or(Decision::No)
        };
        let mut target = Cursor::new(data);

        let state = process_frames(
            &units,
            &mut target,
            &mut NullifyIFrames::new(decisions),
            ProcessingState::new(true, false),
        )
        .unwrap();

        // Unit 0 is never offered, unit 1 is declined, "all" covers the rest.
        assert_eq!(asked, vec![1, 2]);
        assert!(!state.interactive);
        assert_eq!(state.i_frame_count, 5);
        assert_eq!(state.i_frame_removed_count, 3);

        let out = target.into_inner();
        assert!(!zeroed(&out, &units[0]));
        assert!(!zeroed(&out, &units[1]));
        assert!(units[2..].iter().all(|u| zeroed(&out, u)));
    }

    #[test]
    fn test_interactive_off_ignores_source() {
        let (data, units) = stream(&[IDR, IDR]);
        let decisions = |_: &NalUnit| -> Decision { panic!("should not be asked") };

        let state = process_frames(
            &units,
            &mut Cursor::new(data),
            &mut NullifyIFrames::new(decisions),
            ProcessingState::new(false, true),
        )
        .unwrap();
        assert_eq!(state.i_frame_removed_count, 1);
    }

    #[test]
    fn test_nullify_out_of_bounds_aborts() {
        let (data, mut units) = stream(&[IDR, IDR]);
        units[1].length = 40;

        let aborted = process_frames(
            &units,
            &mut Cursor::new(data),
            &mut NullifyIFrames::new(Decision::Yes),
            ProcessingState::default(),
        )
        .unwrap_err();

        assert_eq!(aborted.index, 1);
        assert_eq!(aborted.state.i_frame_count, 2);
        assert_eq!(aborted.state.i_frame_removed_count, 0);
        assert_matches!(aborted.source, Error::OutOfBounds { .. });
    }

    #[test]
    fn test_collect_stats() {
        let (data, units) = stream(&[SPS, IDR, P, P, (9, [0x09, 0x10, 0, 0])]);

        let state = process_frames(
            &units,
            &mut Cursor::new(data),
            &mut CollectStats,
            ProcessingState::default(),
        )
        .unwrap();

        assert_eq!(state.frame_counts.get(&FrameType::I), Some(&1));
        assert_eq!(state.frame_counts.get(&FrameType::P), Some(&2));
        assert_eq!(state.nal_counts.get(&7), Some(&1));
        assert_eq!(state.nal_counts.get(&9), Some(&1));
        assert_eq!(state.i_frame_count, 0);
    }

    #[test]
    fn test_collect_stats_rejects_mismatched_unit() {
        let (data, mut units) = stream(&[IDR, P]);
        units[1].nal_type = 5;

        let aborted = process_frames(
            &units,
            &mut Cursor::new(data),
            &mut CollectStats,
            ProcessingState::default(),
        )
        .unwrap_err();
        assert_eq!(aborted.index, 1);
        assert_matches!(
            aborted.source,
            Error::Consistency {
                located: 5,
                decoded: 1,
                ..
            }
        );
    }

    #[test]
    fn test_composite_classifies_before_nullifying() {
        let (data, units) = stream(&[SPS, IDR, P, IDR]);
        let mut target = Cursor::new(data);
        let mut policy = Composite::new()
            .with(CollectStats)
            .with(NullifyIFrames::new(Decision::Yes));
        assert_eq!(policy.len(), 2);

        let state = process_frames(&units, &mut target, &mut policy, ProcessingState::default())
            .unwrap();

        assert_eq!(state.frame_counts.get(&FrameType::I), Some(&2));
        assert_eq!(state.i_frame_removed_count, 1);
        assert!(zeroed(target.get_ref(), &units[3]));
    }

    #[test]
    fn test_composite_stops_at_first_error() {
        let (data, units) = stream(&[IDR]);
        let mut reached = false;
        let mut policy = Composite::new()
            .with(|_: &mut ProcessingState, unit: &NalUnit, _: &mut dyn Target| -> Result<()> {
                Err(Error::EmptyPayload(unit.offset))
            })
            .with(|_: &mut ProcessingState, _: &NalUnit, _: &mut dyn Target| -> Result<()> {
                reached = true;
                Ok(())
            });

        let aborted = process_frames(
            &units,
            &mut Cursor::new(data),
            &mut policy,
            ProcessingState::default(),
        )
        .unwrap_err();
        drop(policy);

        assert_matches!(aborted.source, Error::EmptyPayload(0));
        assert!(!reached);
    }
}
