//! H.264 NAL unit descriptors and header parsing.

use crate::bits::BitReader;
use crate::rbsp::extract_rbsp;
use crate::{Error, Result};
use std::io::{Read, Seek, SeekFrom};

/// H.264 NAL unit types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture
    Slice,
    /// Coded slice data partition A
    PartitionA,
    /// Coded slice data partition B
    PartitionB,
    /// Coded slice data partition C
    PartitionC,
    /// Coded slice of an IDR picture
    IdrSlice,
    /// Supplemental enhancement information
    Sei,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Access unit delimiter
    Aud,
    EndOfSequence,
    EndOfStream,
    Filler,
    SpsExtension,
    /// Prefix NAL unit (SVC)
    Prefix,
    SubsetSps,
    DepthSps,
    /// Coded slice of an auxiliary coded picture without partitioning
    AuxiliarySlice,
    /// Coded slice extension (SVC/MVC)
    SliceExtension,
    /// Coded slice extension for a depth view component
    DepthSliceExtension,
    /// Reserved or unspecified
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            1 => NalUnitType::Slice,
            2 => NalUnitType::PartitionA,
            3 => NalUnitType::PartitionB,
            4 => NalUnitType::PartitionC,
            5 => NalUnitType::IdrSlice,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::Aud,
            10 => NalUnitType::EndOfSequence,
            11 => NalUnitType::EndOfStream,
            12 => NalUnitType::Filler,
            13 => NalUnitType::SpsExtension,
            14 => NalUnitType::Prefix,
            15 => NalUnitType::SubsetSps,
            16 => NalUnitType::DepthSps,
            19 => NalUnitType::AuxiliarySlice,
            20 => NalUnitType::SliceExtension,
            21 => NalUnitType::DepthSliceExtension,
            v => NalUnitType::Other(v),
        }
    }
}

impl NalUnitType {
    /// Numeric `nal_unit_type` value.
    pub fn code(&self) -> u8 {
        match self {
            NalUnitType::Slice => 1,
            NalUnitType::PartitionA => 2,
            NalUnitType::PartitionB => 3,
            NalUnitType::PartitionC => 4,
            NalUnitType::IdrSlice => 5,
            NalUnitType::Sei => 6,
            NalUnitType::Sps => 7,
            NalUnitType::Pps => 8,
            NalUnitType::Aud => 9,
            NalUnitType::EndOfSequence => 10,
            NalUnitType::EndOfStream => 11,
            NalUnitType::Filler => 12,
            NalUnitType::SpsExtension => 13,
            NalUnitType::Prefix => 14,
            NalUnitType::SubsetSps => 15,
            NalUnitType::DepthSps => 16,
            NalUnitType::AuxiliarySlice => 19,
            NalUnitType::SliceExtension => 20,
            NalUnitType::DepthSliceExtension => 21,
            NalUnitType::Other(v) => *v,
        }
    }

    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            NalUnitType::Slice => "coded slice (non-IDR)",
            NalUnitType::PartitionA => "slice data partition A",
            NalUnitType::PartitionB => "slice data partition B",
            NalUnitType::PartitionC => "slice data partition C",
            NalUnitType::IdrSlice => "coded slice (IDR)",
            NalUnitType::Sei => "supplemental enhancement information",
            NalUnitType::Sps => "sequence parameter set",
            NalUnitType::Pps => "picture parameter set",
            NalUnitType::Aud => "access unit delimiter",
            NalUnitType::EndOfSequence => "end of sequence",
            NalUnitType::EndOfStream => "end of stream",
            NalUnitType::Filler => "filler data",
            NalUnitType::SpsExtension => "sequence parameter set extension",
            NalUnitType::Prefix => "prefix NAL unit",
            NalUnitType::SubsetSps => "subset sequence parameter set",
            NalUnitType::DepthSps => "depth parameter set",
            NalUnitType::AuxiliarySlice => "coded slice (auxiliary picture)",
            NalUnitType::SliceExtension => "coded slice extension",
            NalUnitType::DepthSliceExtension => "coded slice extension (depth view)",
            NalUnitType::Other(_) => "reserved/unspecified",
        }
    }

    /// Whether the unit carries a slice header that `parse_slice` accepts.
    pub fn is_slice(&self) -> bool {
        matches!(
            self,
            NalUnitType::Slice | NalUnitType::IdrSlice | NalUnitType::AuxiliarySlice
        )
    }

    /// Types that must not appear with `nal_ref_idc == 0`.
    fn requires_reference(&self) -> bool {
        matches!(
            self,
            NalUnitType::IdrSlice
                | NalUnitType::Sei
                | NalUnitType::Aud
                | NalUnitType::EndOfSequence
                | NalUnitType::EndOfStream
                | NalUnitType::Filler
        )
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

/// Presentation time of the sample that owns a NAL unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Timestamp {
    /// Time in `timescale` units.
    pub value: u64,
    /// Units per second.
    pub timescale: u32,
}

impl Timestamp {
    /// Time in seconds, or `None` for a zero timescale.
    pub fn as_secs_f64(&self) -> Option<f64> {
        (self.timescale != 0).then(|| self.value as f64 / self.timescale as f64)
    }
}

/// A located NAL unit.
///
/// `offset` is the absolute file offset of the header byte and `length`
/// covers the header byte plus payload, never the length prefix. The
/// nullifiable payload is `[offset + 1, offset + length)`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct NalUnit {
    /// `nal_unit_type` as recorded when the unit was located (0..=31).
    pub nal_type: u8,
    pub offset: u64,
    pub length: u32,
    pub track_id: u32,
    /// 0-based chunk index within the track.
    pub chunk: u32,
    /// 0-based sample index within the track.
    pub sample: u32,
    pub timestamp: Option<Timestamp>,
}

/// Decoded NAL header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub nal_ref_idc: u8,
    pub nal_unit_type: u8,
}

impl NalUnit {
    /// Typed view of `nal_type`.
    pub fn kind(&self) -> NalUnitType {
        NalUnitType::from(self.nal_type)
    }

    /// File offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.offset + 1
    }

    /// Payload length, excluding the header byte.
    pub fn payload_len(&self) -> u32 {
        self.length.saturating_sub(1)
    }

    /// Decode the header byte at `offset`.
    ///
    /// Fails with [`Error::Format`] when the forbidden bit is set or when a
    /// type that requires a non-zero reference flag carries `nal_ref_idc == 0`,
    /// and with [`Error::Consistency`] when the decoded type differs from
    /// `nal_type`.
    pub fn parse_header<R: Read + Seek + ?Sized>(&self, reader: &mut R) -> Result<NalHeader> {
        let mut bits = BitReader::new(reader);
        bits.seek(SeekFrom::Start(self.offset))?;

        if bits.read_flag()? {
            return Err(Error::format(format!(
                "forbidden_zero_bit set in NAL unit at offset {}",
                self.offset
            )));
        }

        let nal_ref_idc = bits.read_uint(2)? as u8;
        let nal_unit_type = bits.read_uint(5)? as u8;

        if nal_unit_type != self.nal_type {
            return Err(Error::Consistency {
                offset: self.offset,
                located: self.nal_type,
                decoded: nal_unit_type,
            });
        }

        let kind = self.kind();
        if nal_ref_idc == 0 && kind.requires_reference() {
            return Err(Error::format(format!(
                "nal_ref_idc is 0 for {} at offset {}",
                kind.description(),
                self.offset
            )));
        }

        Ok(NalHeader {
            nal_ref_idc,
            nal_unit_type,
        })
    }

    /// Read the raw payload bytes (header byte excluded).
    pub fn read_payload<R: Read + Seek + ?Sized>(&self, reader: &mut R) -> Result<Vec<u8>> {
        if self.length <= 1 {
            return Err(Error::EmptyPayload(self.offset));
        }

        reader.seek(SeekFrom::Start(self.payload_offset()))?;
        let mut payload = vec![0u8; self.payload_len() as usize];
        reader.read_exact(&mut payload).map_err(Error::from_read)?;
        Ok(payload)
    }

    /// Read the payload and strip emulation prevention bytes.
    pub fn read_rbsp<R: Read + Seek + ?Sized>(&self, reader: &mut R) -> Result<Vec<u8>> {
        Ok(extract_rbsp(&self.read_payload(reader)?))
    }
}
