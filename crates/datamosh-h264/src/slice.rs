//! Slice header parsing and frame-type classification.

use crate::bits::BitReader;
use crate::nal::NalUnit;
use crate::{Error, Result};
use std::io::{Read, Seek};

/// Leading fields of a slice header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHeader {
    pub first_mb_in_slice: u32,
    /// Raw `slice_type` (0..=9 in conformant streams).
    pub slice_type: u32,
    pub pic_parameter_set_id: u32,
}

impl SliceHeader {
    /// Parse from an RBSP that starts right after the NAL header byte.
    pub fn parse(rbsp: &[u8]) -> Result<Self> {
        let mut bits = BitReader::new(rbsp);
        Ok(Self {
            first_mb_in_slice: bits.read_ue()?,
            slice_type: bits.read_ue()?,
            pic_parameter_set_id: bits.read_ue()?,
        })
    }

    pub fn frame_type(&self) -> FrameType {
        FrameType::from_slice_type(self.slice_type)
    }
}

/// Picture coding type derived from `slice_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum FrameType {
    P,
    B,
    I,
    SP,
    SI,
    Unknown,
}

impl FrameType {
    /// Classify a raw `slice_type`. Values 5..=9 mirror 0..=4; anything
    /// above 9 is outside the syntax and reported as `Unknown`.
    pub fn from_slice_type(slice_type: u32) -> Self {
        if slice_type > 9 {
            return FrameType::Unknown;
        }
        match slice_type % 5 {
            0 => FrameType::P,
            1 => FrameType::B,
            2 => FrameType::I,
            3 => FrameType::SP,
            _ => FrameType::SI,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::P => "P",
            FrameType::B => "B",
            FrameType::I => "I",
            FrameType::SP => "SP",
            FrameType::SI => "SI",
            FrameType::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl NalUnit {
    /// Decode the leading slice header fields.
    ///
    /// Only coded slices (types 1, 5 and 19) are accepted; other types fail
    /// with [`Error::NotASlice`].
    pub fn parse_slice<R: Read + Seek + ?Sized>(&self, reader: &mut R) -> Result<SliceHeader> {
        if !self.kind().is_slice() {
            return Err(Error::NotASlice(self.nal_type));
        }
        SliceHeader::parse(&self.read_rbsp(reader)?)
    }

    /// Classify the unit's frame type.
    pub fn parse_slice_type<R: Read + Seek + ?Sized>(&self, reader: &mut R) -> Result<FrameType> {
        Ok(self.parse_slice(reader)?.frame_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Cursor;

    fn unit(nal_type: u8, length: u32) -> NalUnit {
        NalUnit {
            nal_type,
            offset: 0,
            length,
            track_id: 1,
            chunk: 0,
            sample: 0,
            timestamp: None,
        }
    }

    #[test]
    fn test_frame_type_mapping() {
        let expected = [
            FrameType::P,
            FrameType::B,
            FrameType::I,
            FrameType::SP,
            FrameType::SI,
        ];
        for slice_type in 0..10 {
            assert_eq!(
                FrameType::from_slice_type(slice_type),
                expected[slice_type as usize % 5]
            );
        }
        assert_eq!(FrameType::from_slice_type(10), FrameType::Unknown);
        assert_eq!(FrameType::from_slice_type(u32::MAX), FrameType::Unknown);
        assert_eq!(FrameType::I.to_string(), "I");
    }

    #[test]
    fn test_parse_idr_slice() {
        // first_mb 0 (1), slice_type 7 (0001000), pps 0 (1)
        let mut data = Cursor::new(vec![0x65, 0x88, 0x80, 0x00]);
        let header = unit(5, 4).parse_slice(&mut data).unwrap();

        assert_eq!(header.first_mb_in_slice, 0);
        assert_eq!(header.slice_type, 7);
        assert_eq!(header.pic_parameter_set_id, 0);
        assert_eq!(header.frame_type(), FrameType::I);
    }

    #[test]
    fn test_parse_p_slice() {
        // first_mb 0 (1), slice_type 5 (00110), pps 0 (1)
        let mut data = Cursor::new(vec![0x41, 0x9A, 0x11, 0x22]);
        assert_eq!(unit(1, 4).parse_slice_type(&mut data).unwrap(), FrameType::P);
    }

    #[test]
    fn test_parse_slice_through_escape() {
        // first_mb 0, slice_type 2, pps 0 followed by an escaped 00 00 03.
        let mut data = Cursor::new(vec![0x41, 0xB0, 0x00, 0x00, 0x03, 0x01]);
        assert_eq!(unit(1, 6).parse_slice_type(&mut data).unwrap(), FrameType::I);
    }

    #[test]
    fn test_parse_auxiliary_slice() {
        let mut data = Cursor::new(vec![0x53, 0xB0]);
        assert_eq!(unit(19, 2).parse_slice_type(&mut data).unwrap(), FrameType::I);
    }

    #[test]
    fn test_not_a_slice() {
        let mut data = Cursor::new(vec![0x67, 0x42, 0x00]);
        assert_matches!(unit(7, 3).parse_slice(&mut data), Err(Error::NotASlice(7)));
        assert_matches!(unit(2, 3).parse_slice(&mut data), Err(Error::NotASlice(2)));
    }

    #[test]
    fn test_parse_slice_corrupt() {
        let mut data = Cursor::new(vec![0x41, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_matches!(
            unit(1, 6).parse_slice(&mut data),
            Err(Error::EndOfInput | Error::InvalidCode { .. })
        );
    }
}
