//! Container and NAL-level report for a file.

use crate::{Error, Result};
use datamosh_h264::{
    extract_rbsp, FrameType, Locator, NalUnit, NalUnitType, SpsSummary, TruncationPolicy,
};
use datamosh_media::{AvcConfig, Mp4File, Track};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Information about a probed file.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    /// Path to the media file.
    pub file_path: PathBuf,
    /// File size in bytes.
    pub file_size: u64,
    /// Movie duration in seconds.
    pub duration_secs: f64,
    /// Whether `moov` precedes `mdat`.
    pub faststart: bool,
    pub tracks: Vec<TrackReport>,
    /// Every located unit, when requested.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<UnitReport>,
}

/// Summary of one track.
#[derive(Debug, Clone, Serialize)]
pub struct TrackReport {
    pub track_id: u32,
    /// Handler type (e.g., "video", "audio").
    pub handler: String,
    /// Sample entry four-cc.
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub timescale: u32,
    pub duration_secs: f64,
    pub chunks: usize,
    pub samples: usize,
    pub sync_samples: usize,
    pub edits: usize,
    pub encrypted: bool,
    pub avc: Option<AvcConfig>,
    pub sps: Option<SpsSummary>,
    /// NAL-level statistics for H.264 tracks.
    pub nal: Option<NalStats>,
}

/// Unit counts of one H.264 track.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NalStats {
    pub units: usize,
    pub i_frames: usize,
    /// Slice units per classified frame type.
    pub frame_types: BTreeMap<FrameType, u64>,
    /// Units per `nal_unit_type`.
    pub nal_types: BTreeMap<u8, u64>,
    /// Slices whose header could not be parsed.
    pub unparsed_slices: u64,
}

/// One located unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    #[serde(flatten)]
    pub unit: NalUnit,
    /// Type description (e.g., "coded slice (IDR)").
    pub kind: String,
    pub nal_ref_idc: Option<u8>,
    pub frame_type: Option<FrameType>,
}

/// Probe an MP4 file down to its NAL units.
pub fn probe_file(path: &Path, show_units: bool, truncation: TruncationPolicy) -> Result<ProbeReport> {
    if !path.exists() {
        return Err(Error::file_not_found(path));
    }

    let file_size = std::fs::metadata(path)?.len();
    let mp4 = Mp4File::open(path)?;
    let mut reader = BufReader::new(File::open(path)?);
    let locator = Locator::new().with_truncation(truncation);

    let mut tracks = Vec::with_capacity(mp4.tracks.len());
    let mut units = Vec::new();

    for track in &mp4.tracks {
        let mut report = track_report(track);

        if track.is_avc() {
            let located = locator.locate(track, &mut reader)?;
            let mut stats = NalStats {
                units: located.len(),
                ..NalStats::default()
            };

            for unit in &located {
                let entry = unit_report(unit, &mut reader);
                *stats.nal_types.entry(unit.nal_type).or_default() += 1;
                if unit.kind() == NalUnitType::IdrSlice {
                    stats.i_frames += 1;
                }
                if unit.kind().is_slice() {
                    match entry.frame_type {
                        Some(frame) => *stats.frame_types.entry(frame).or_default() += 1,
                        None => stats.unparsed_slices += 1,
                    }
                }
                if show_units {
                    units.push(entry);
                }
            }

            report.sps = sps_summary(track.avc.as_ref(), &located, &mut reader);
            report.nal = Some(stats);
        }

        tracks.push(report);
    }

    Ok(ProbeReport {
        file_path: path.to_path_buf(),
        file_size,
        duration_secs: mp4.duration_secs(),
        faststart: mp4.has_faststart,
        tracks,
        units,
    })
}

fn track_report(track: &Track) -> TrackReport {
    TrackReport {
        track_id: track.track_id,
        handler: track.handler.to_string(),
        codec: track.codec.map(|c| c.to_string()),
        width: track.width,
        height: track.height,
        timescale: track.timescale,
        duration_secs: track.duration_secs(),
        chunks: track.chunks.len(),
        samples: track.samples.len(),
        sync_samples: track.sync_sample_count(),
        edits: track.edit_list.len(),
        encrypted: track.is_encrypted(),
        avc: track.avc.clone(),
        sps: None,
        nal: None,
    }
}

fn unit_report<R: Read + Seek>(unit: &NalUnit, reader: &mut R) -> UnitReport {
    let mut report = UnitReport {
        unit: unit.clone(),
        kind: unit.kind().description().to_string(),
        nal_ref_idc: None,
        frame_type: None,
    };

    if unit.kind().is_slice() {
        let parsed = unit
            .parse_header(reader)
            .and_then(|header| Ok((header, unit.parse_slice_type(reader)?)));
        match parsed {
            Ok((header, frame)) => {
                report.nal_ref_idc = Some(header.nal_ref_idc);
                report.frame_type = Some(frame);
            }
            Err(e) => warn!(offset = unit.offset, error = %e, "Unparseable slice"),
        }
    }

    report
}

/// SPS summary from the `avcC` record, else from the first in-band SPS.
fn sps_summary<R: Read + Seek>(
    avc: Option<&AvcConfig>,
    units: &[NalUnit],
    reader: &mut R,
) -> Option<SpsSummary> {
    let from_config = avc
        .and_then(|avc| avc.sps.first())
        .filter(|sps| sps.len() > 1)
        .map(|sps| SpsSummary::parse(&extract_rbsp(&sps[1..])));

    let parsed = match from_config {
        Some(parsed) => parsed,
        None => units
            .iter()
            .find(|u| u.kind() == NalUnitType::Sps)?
            .parse_sps(reader),
    };

    match parsed {
        Ok(sps) => Some(sps),
        Err(e) => {
            warn!(error = %e, "Unparseable SPS");
            None
        }
    }
}
