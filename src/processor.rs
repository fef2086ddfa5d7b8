//! File-level moshing: parse, locate, mutate a copy, publish.

use crate::pipeline::{
    count_i_frame, process_frames, CollectStats, Composite, DecisionSource, NullifyIFrames,
    ProcessingState, Target,
};
use crate::workspace::Workspace;
use crate::{Error, Result};
use datamosh_h264::{Locator, NalUnit, NalUnitType, TruncationPolicy};
use datamosh_media::Mp4File;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Settings for one mosh run.
#[derive(Debug, Clone)]
pub struct MoshOptions {
    /// Ask before nullifying each I-frame after the first.
    pub interactive: bool,
    /// Report every I-frame as it is visited.
    pub debug: bool,
    /// Classify slices while moshing.
    pub classify: bool,
    /// Locate and classify only; never write.
    pub dry_run: bool,
    pub truncation: TruncationPolicy,
}

impl Default for MoshOptions {
    fn default() -> Self {
        Self {
            interactive: false,
            debug: false,
            classify: true,
            dry_run: false,
            truncation: TruncationPolicy::default(),
        }
    }
}

/// Outcome of a mosh run.
#[derive(Debug, Clone)]
pub struct MoshReport {
    /// Where the result was published, or `None` for a dry run.
    pub output: Option<PathBuf>,
    /// IDs of the tracks whose units were processed.
    pub tracks: Vec<u32>,
    /// Number of NAL units located across those tracks.
    pub units: usize,
    pub state: ProcessingState,
}

/// `<dir>/<stem><suffix>.<ext>` next to `input`.
pub fn default_output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    input.with_file_name(name)
}

/// Locate the NAL units of every unencrypted H.264 track, tracks in `trak`
/// order and units in playback order within each track.
pub fn locate_units(
    mp4: &Mp4File,
    input: &Path,
    truncation: TruncationPolicy,
) -> Result<(Vec<u32>, Vec<NalUnit>)> {
    let locator = Locator::new().with_truncation(truncation);
    let mut reader = BufReader::new(File::open(input)?);
    let mut tracks = Vec::new();
    let mut units = Vec::new();

    for track in &mp4.tracks {
        if track.is_encrypted() {
            warn!(track_id = track.track_id, "Skipping encrypted track");
            continue;
        }
        if !track.is_avc() {
            debug!(track_id = track.track_id, handler = %track.handler, "Skipping non-H.264 track");
            continue;
        }

        let located = locator.locate(track, &mut reader)?;
        debug!(track_id = track.track_id, units = located.len(), "Located track units");
        tracks.push(track.track_id);
        units.extend(located);
    }

    Ok((tracks, units))
}

/// Nullify every I-frame but the first in `input`, writing the result to
/// `output`.
///
/// The input is never modified. All writes go to a workspace copy that is
/// published only when every unit was processed; on failure the copy is
/// discarded and the error carries the partial counters.
pub fn mosh_file<D: DecisionSource>(
    input: &Path,
    output: &Path,
    options: &MoshOptions,
    decisions: D,
) -> Result<MoshReport> {
    if !input.exists() {
        return Err(Error::file_not_found(input));
    }

    info!("Parsing {:?}", input);
    let mp4 = Mp4File::open(input)?;
    let (tracks, units) = locate_units(&mp4, input, options.truncation)?;
    if tracks.is_empty() {
        return Err(Error::NoAvcTrack {
            path: input.to_path_buf(),
        });
    }
    info!(
        "Located {} NAL units in {} track(s)",
        units.len(),
        tracks.len()
    );

    let state = ProcessingState::new(options.interactive, options.debug);

    if options.dry_run {
        let mut file = File::open(input)?;
        let state = dry_run(&units, &mut file, options, state)?;
        info!(
            "[DRY RUN] Would nullify {} of {} I-frames into {:?}",
            state.i_frame_count.saturating_sub(1),
            state.i_frame_count,
            output
        );
        return Ok(MoshReport {
            output: None,
            tracks,
            units: units.len(),
            state,
        });
    }

    let workspace = Workspace::new(input)?;
    let mut target = workspace.prepare()?;

    let mut policy = Composite::new();
    if options.classify {
        policy = policy.with(CollectStats);
    }
    let mut policy = policy.with(NullifyIFrames::new(decisions));

    let state = process_frames(&units, &mut target, &mut policy, state)?;
    target.sync_all()?;
    drop(target);

    let published = workspace.finalize(output)?;
    info!(
        "Nullified {} of {} I-frames, output at {:?}",
        state.i_frame_removed_count, state.i_frame_count, published
    );

    Ok(MoshReport {
        output: Some(published),
        tracks,
        units: units.len(),
        state,
    })
}

/// Count I-frames, and classify if asked, without writing anything.
fn dry_run(
    units: &[NalUnit],
    target: &mut dyn Target,
    options: &MoshOptions,
    state: ProcessingState,
) -> Result<ProcessingState> {
    let mut policy = Composite::new();
    if options.classify {
        policy = policy.with(CollectStats);
    }
    let mut policy = policy.with(
        |state: &mut ProcessingState, unit: &NalUnit, _: &mut dyn Target| -> datamosh_h264::Result<()> {
            if unit.kind() == NalUnitType::IdrSlice {
                count_i_frame(state, unit);
            }
            Ok(())
        },
    );

    Ok(process_frames(units, target, &mut policy, state)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/videos/clip.mp4"), "-iframoshed"),
            PathBuf::from("/videos/clip-iframoshed.mp4")
        );
        assert_eq!(
            default_output_path(Path::new("clip.final.mov"), "-x"),
            PathBuf::from("clip.final-x.mov")
        );
        assert_eq!(
            default_output_path(Path::new("/videos/clip"), "-iframoshed"),
            PathBuf::from("/videos/clip-iframoshed")
        );
    }

    #[test]
    fn test_missing_input() {
        let err = mosh_file(
            Path::new("/nonexistent/clip.mp4"),
            Path::new("/nonexistent/out.mp4"),
            &MoshOptions::default(),
            crate::pipeline::Decision::Yes,
        )
        .unwrap_err();
        assert_matches!(err, Error::FileNotFound { .. });
    }
}
