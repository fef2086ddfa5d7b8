//! Datamosh-H264: NAL-level access to H.264 streams stored in MP4
//!
//! This crate finds, classifies and zero-fills H.264 NAL units in place,
//! leaving every other byte of the file untouched.
//!
//! # Modules
//!
//! - `bits` - MSB-first bit reader with Exp-Golomb decoding
//! - `rbsp` - emulation prevention removal
//! - `nal` - NAL unit descriptors and header parsing
//! - `slice` - slice header parsing and frame-type classification
//! - `sps` - sequence parameter set summary
//! - `locate` - NAL unit location from a track's chunk/sample tables
//! - `mutate` - in-place payload nullification
//!
//! # Example
//!
//! ```no_run
//! use datamosh_h264::locate_nal_units;
//! use datamosh_media::Mp4File;
//! use std::fs::File;
//!
//! let mp4 = Mp4File::open("clip.mp4").unwrap();
//! let mut file = File::open("clip.mp4").unwrap();
//!
//! for track in mp4.avc_tracks() {
//!     for unit in locate_nal_units(track, &mut file).unwrap() {
//!         if unit.kind().is_slice() {
//!             let frame = unit.parse_slice_type(&mut file).unwrap();
//!             println!("{} @ {}: {}", unit.kind(), unit.offset, frame);
//!         }
//!     }
//! }
//! ```

pub mod bits;
pub mod error;
pub mod locate;
pub mod mutate;
pub mod nal;
pub mod rbsp;
pub mod slice;
pub mod sps;

pub use bits::BitReader;
pub use error::{Error, Result};
pub use locate::{locate_nal_units, Locator, TruncationPolicy};
pub use nal::{NalHeader, NalUnit, NalUnitType, Timestamp};
pub use rbsp::extract_rbsp;
pub use slice::{FrameType, SliceHeader};
pub use sps::SpsSummary;
