//! MP4 container parsing.
//!
//! This module walks the atom tree of an MP4 file and extracts, per track,
//! everything needed to find the NAL units inside the media data.

mod atoms;
mod reader;
mod sample_table;
mod track;

pub use atoms::{Atom, AtomType, HandlerType};
pub use reader::Mp4Reader;
pub use sample_table::{Chunk, Sample, SampleTableBuilder};
pub use track::{AvcConfig, Codec, EditListEntry, Track};

use crate::Result;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::ops::Range;
use std::path::Path;

/// Parsed MP4 file.
#[derive(Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Mp4File {
    /// Duration in movie timescale units.
    pub duration: u64,
    /// Movie timescale (time units per second).
    pub timescale: u32,
    /// Every track in `trak` order.
    pub tracks: Vec<Track>,
    /// Payload byte ranges of the top-level `mdat` atoms.
    pub mdat: Vec<Range<u64>>,
    /// Whether the file has faststart (moov before mdat).
    pub has_faststart: bool,
}

impl Mp4File {
    /// Parse an MP4 file from the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::parse(&mut reader)
    }

    /// Parse an MP4 file from a reader.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let mut mp4_reader = Mp4Reader::new(reader)?;
        mp4_reader.parse()
    }

    /// Get the duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        }
    }

    /// Unprotected H.264 video tracks, in `trak` order.
    pub fn avc_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.is_avc())
    }

    /// Whether `[offset, offset + len)` lies inside one `mdat` payload.
    pub fn in_mdat(&self, offset: u64, len: u64) -> bool {
        self.mdat
            .iter()
            .any(|range| offset >= range.start && offset.saturating_add(len) <= range.end)
    }
}
