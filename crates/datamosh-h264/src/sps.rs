//! Sequence Parameter Set (SPS) summary parsing.
//!
//! Only the leading fields are decoded: enough to label a stream's profile and
//! level and to sanity-check the `avcC` record against in-band parameter sets.

use crate::bits::BitReader;
use crate::nal::{NalUnit, NalUnitType};
use crate::{Error, Result};
use std::io::{Read, Seek};

/// Leading SPS fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct SpsSummary {
    pub profile_idc: u8,
    /// constraint_set0..5 flags plus the two reserved bits.
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,
    /// Range 0..=12 in conformant streams; not enforced.
    pub log2_max_frame_num_minus4: u32,
}

impl SpsSummary {
    /// Parse from an RBSP that starts right after the NAL header byte.
    pub fn parse(rbsp: &[u8]) -> Result<Self> {
        let mut bits = BitReader::new(rbsp);

        let profile_idc = bits.read_uint(8)? as u8;
        let constraint_flags = bits.read_uint(8)? as u8;
        let level_idc = bits.read_uint(8)? as u8;
        let seq_parameter_set_id = bits.read_ue()?;

        // High profiles insert chroma/bit-depth/scaling fields here.
        let log2_max_frame_num_minus4 = if has_chroma_info(profile_idc) {
            parse_high_profile_tail(&mut bits)?
        } else {
            bits.read_ue()?
        };

        Ok(Self {
            profile_idc,
            constraint_flags,
            level_idc,
            seq_parameter_set_id,
            log2_max_frame_num_minus4,
        })
    }

    /// Level as a display string, e.g. `3.1`.
    pub fn level(&self) -> String {
        format!("{}.{}", self.level_idc / 10, self.level_idc % 10)
    }

    pub fn profile_name(&self) -> &'static str {
        match self.profile_idc {
            66 => "Baseline",
            77 => "Main",
            88 => "Extended",
            100 => "High",
            110 => "High 10",
            122 => "High 4:2:2",
            244 => "High 4:4:4 Predictive",
            _ => "Other",
        }
    }
}

fn has_chroma_info(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    )
}

/// Skip the high-profile fields and return `log2_max_frame_num_minus4`.
fn parse_high_profile_tail<R: Read>(bits: &mut BitReader<R>) -> Result<u32> {
    let chroma_format_idc = bits.read_ue()?;
    if chroma_format_idc == 3 {
        bits.read_flag()?; // separate_colour_plane_flag
    }
    bits.read_ue()?; // bit_depth_luma_minus8
    bits.read_ue()?; // bit_depth_chroma_minus8
    bits.read_flag()?; // qpprime_y_zero_transform_bypass_flag

    if bits.read_flag()? {
        // seq_scaling_matrix_present_flag
        let lists = if chroma_format_idc == 3 { 12 } else { 8 };
        for i in 0..lists {
            if bits.read_flag()? {
                skip_scaling_list(bits, if i < 6 { 16 } else { 64 })?;
            }
        }
    }

    bits.read_ue()
}

fn skip_scaling_list<R: Read>(bits: &mut BitReader<R>, size: usize) -> Result<()> {
    let mut last_scale = 8i64;
    let mut next_scale = 8i64;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = read_se(bits)?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

/// Signed Exp-Golomb, se(v).
fn read_se<R: Read>(bits: &mut BitReader<R>) -> Result<i64> {
    let code = bits.read_ue()? as i64;
    Ok(if code % 2 == 1 {
        (code + 1) / 2
    } else {
        -(code / 2)
    })
}

impl NalUnit {
    /// Decode the leading fields of an SPS unit.
    pub fn parse_sps<R: Read + Seek + ?Sized>(&self, reader: &mut R) -> Result<SpsSummary> {
        if self.kind() != NalUnitType::Sps {
            return Err(Error::format(format!(
                "NAL unit at offset {} is type {}, not an SPS",
                self.offset, self.nal_type
            )));
        }
        SpsSummary::parse(&self.read_rbsp(reader)?)
    }
}
