//! Datamosh-Media: MP4 container parsing for NAL-level processing
//!
//! This crate walks an MP4 file's atom tree and turns each track's sample
//! tables into an ordered chunk/sample model that the H.264 locator can scan.
//!
//! # Modules
//!
//! - `mp4` - MP4 container parsing (moov, trak, sample tables, avcC)
//!
//! # Architecture
//!
//! 1. Top-level atoms are walked to find `moov` and every `mdat` range
//! 2. Each `trak` yields a [`Track`] with its header, edit list and codec entry
//! 3. `stco`/`co64`, `stsc`, `stts`, `stsz`, `ctts` and `stss` are expanded into
//!    chunk and sample lists in playback order
//!
//! The file is never modified; byte offsets in the model are absolute file
//! offsets.

pub mod error;
pub mod mp4;

pub use error::{Error, Result};
pub use mp4::{
    AvcConfig, Chunk, Codec, EditListEntry, HandlerType, Mp4File, Sample, Track,
};
