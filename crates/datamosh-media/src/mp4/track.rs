//! Per-track model produced by the MP4 reader.

use super::{Chunk, HandlerType, Sample};
use crate::{Error, Result};
use bytes::{Buf, Bytes};

/// Sample entry codec of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Codec {
    /// H.264 with parameter sets in `avcC`.
    Avc1,
    /// H.264 with in-band parameter sets allowed.
    Avc3,
    /// Protected video sample entry.
    Encrypted,
    /// Any other sample entry four-cc.
    Other([u8; 4]),
}

impl Codec {
    pub fn from_fourcc(fourcc: [u8; 4]) -> Self {
        match &fourcc {
            b"avc1" => Self::Avc1,
            b"avc3" => Self::Avc3,
            b"encv" => Self::Encrypted,
            _ => Self::Other(fourcc),
        }
    }

    pub fn is_avc(&self) -> bool {
        matches!(self, Self::Avc1 | Self::Avc3)
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Avc1 => write!(f, "avc1"),
            Self::Avc3 => write!(f, "avc3"),
            Self::Encrypted => write!(f, "encv"),
            Self::Other(code) => write!(f, "{}", String::from_utf8_lossy(code)),
        }
    }
}

/// Decoded `avcC` (AVC decoder configuration record).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AvcConfig {
    pub version: u8,
    pub profile: u8,
    pub compatibility: u8,
    pub level: u8,
    /// Width in bytes of the length prefix before every NAL unit (1..=4).
    pub nal_length_size: u8,
    /// Sequence parameter set NAL units, header byte included.
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub sps: Vec<Bytes>,
    /// Picture parameter set NAL units, header byte included.
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub pps: Vec<Bytes>,
}

impl AvcConfig {
    /// Parse the body of an `avcC` box (without its box header).
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        if buf.remaining() < 6 {
            return Err(Error::invalid_mp4(format!(
                "avcC too short: {} bytes",
                data.len()
            )));
        }

        let version = buf.get_u8();
        if version != 1 {
            return Err(Error::unsupported(format!(
                "avcC configuration version {version}"
            )));
        }
        let profile = buf.get_u8();
        let compatibility = buf.get_u8();
        let level = buf.get_u8();
        let nal_length_size = (buf.get_u8() & 0x03) + 1;

        let sps_count = buf.get_u8() & 0x1F;
        let sps = read_parameter_sets(&mut buf, sps_count as usize)?;

        if !buf.has_remaining() {
            return Err(Error::invalid_mp4("avcC missing PPS count"));
        }
        let pps_count = buf.get_u8();
        let pps = read_parameter_sets(&mut buf, pps_count as usize)?;

        Ok(Self {
            version,
            profile,
            compatibility,
            level,
            nal_length_size,
            sps,
            pps,
        })
    }
}

fn read_parameter_sets(buf: &mut Bytes, count: usize) -> Result<Vec<Bytes>> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.remaining() < 2 {
            return Err(Error::invalid_mp4("avcC parameter set length truncated"));
        }
        let len = buf.get_u16() as usize;
        if buf.remaining() < len {
            return Err(Error::invalid_mp4(format!(
                "avcC parameter set declares {len} bytes, {} available",
                buf.remaining()
            )));
        }
        sets.push(buf.split_to(len));
    }
    Ok(sets)
}

/// One `elst` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct EditListEntry {
    /// Duration of this edit in movie timescale units.
    pub segment_duration: u64,
    /// Start time within the media, or -1 for an empty edit.
    pub media_time: i64,
    pub media_rate: i16,
}

/// Track extracted from a `trak` atom.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Track {
    pub track_id: u32,
    pub handler: HandlerType,
    /// Media timescale (units per second).
    pub timescale: u32,
    /// Media duration in timescale units.
    pub duration: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<Codec>,
    pub avc: Option<AvcConfig>,
    pub edit_list: Vec<EditListEntry>,
    pub chunks: Vec<Chunk>,
    pub samples: Vec<Sample>,
}

impl Track {
    /// Create an empty track with the given ID.
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            handler: HandlerType::Unknown(*b"    "),
            timescale: 0,
            duration: 0,
            width: None,
            height: None,
            codec: None,
            avc: None,
            edit_list: Vec::new(),
            chunks: Vec::new(),
            samples: Vec::new(),
        }
    }

    /// NAL length prefix width from the `avcC` record.
    pub fn nal_length_size(&self) -> Option<u8> {
        self.avc.as_ref().map(|avc| avc.nal_length_size)
    }

    /// Whether the sample entry is protected.
    pub fn is_encrypted(&self) -> bool {
        self.codec == Some(Codec::Encrypted)
    }

    /// Whether this is an unprotected H.264 video track.
    pub fn is_avc(&self) -> bool {
        self.handler.is_video() && self.codec.is_some_and(|c| c.is_avc())
    }

    /// Total samples claimed by the chunk table.
    pub fn chunk_sample_count(&self) -> u64 {
        self.chunks
            .iter()
            .map(|c| c.samples_per_chunk as u64)
            .sum()
    }

    /// Check that the chunk table covers exactly the sample table.
    pub fn validate(&self) -> Result<()> {
        let chunk_samples = self.chunk_sample_count();
        if chunk_samples != self.samples.len() as u64 {
            return Err(Error::InconsistentTables {
                track_id: self.track_id,
                chunk_samples,
                samples: self.samples.len(),
            });
        }
        Ok(())
    }

    /// Presentation time of every sample in timescale units.
    ///
    /// Decoding times accumulate `time_delta`; the composition offset is then
    /// applied and negative results clamp to zero.
    pub fn presentation_times(&self) -> Vec<u64> {
        let mut dts = 0u64;
        self.samples
            .iter()
            .map(|sample| {
                let pts = (dts as i64 + sample.cts_offset as i64).max(0) as u64;
                dts += sample.time_delta as u64;
                pts
            })
            .collect()
    }

    /// Get the duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        }
    }

    /// Number of sync samples.
    pub fn sync_sample_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_sync).count()
    }
}
