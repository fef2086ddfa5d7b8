//! NAL unit location inside a track's media data.
//!
//! Every sample of an AVC track is a sequence of length-prefixed NAL units.
//! The locator walks chunks and samples in playback order and records where
//! each unit's header byte sits and how long the unit is, without decoding
//! anything beyond the header byte.

use crate::nal::{NalUnit, Timestamp};
use crate::{Error, Result};
use datamosh_media::Track;
use std::io::{self, Read, Seek, SeekFrom};
use tracing::{debug, warn};

/// What to do when a record declares more bytes than its sample holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum TruncationPolicy {
    /// Abort location with [`Error::TruncatedRecord`].
    #[default]
    Fail,
    /// Log a warning and stop scanning the offending sample.
    StopSample,
}

/// Walks a track's chunk/sample tables and records every NAL unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct Locator {
    truncation: TruncationPolicy,
}

impl Locator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the policy for records that overrun their sample.
    pub fn with_truncation(mut self, truncation: TruncationPolicy) -> Self {
        self.truncation = truncation;
        self
    }

    /// Locate every NAL unit of `track`, in playback order.
    ///
    /// `reader` must address the whole file: chunk offsets are absolute.
    /// A track whose chunk table claims more samples than the sample table
    /// holds is scanned as far as the samples go.
    pub fn locate<R: Read + Seek + ?Sized>(
        &self,
        track: &Track,
        reader: &mut R,
    ) -> Result<Vec<NalUnit>> {
        let length_size = track.nal_length_size().ok_or_else(|| {
            Error::format(format!("track {} has no AVC configuration", track.track_id))
        })?;
        if !(1..=4).contains(&length_size) {
            return Err(Error::InvalidLengthSize(length_size));
        }
        let prefix = length_size as u64;

        if let Err(e) = track.validate() {
            warn!(track_id = track.track_id, error = %e, "Inconsistent sample tables");
        }

        let presentation = track.presentation_times();
        let mut units = Vec::new();
        let mut record_buf = [0u8; 4];
        let mut si = 0usize;

        for (chunk_index, chunk) in track.chunks.iter().enumerate() {
            let end = si + chunk.samples_per_chunk as usize;
            let mut sample_offset = chunk.data_offset;
            debug!(
                track_id = track.track_id,
                chunk = chunk_index,
                offset = chunk.data_offset,
                samples = ?(si..end),
                "Scanning chunk"
            );

            while si < end && si < track.samples.len() {
                let size = track.samples[si].size as u64;
                let timestamp = presentation.get(si).map(|&value| Timestamp {
                    value,
                    timescale: track.timescale,
                });

                // One seek per sample; records inside it are read in order.
                if size > prefix {
                    reader.seek(SeekFrom::Start(sample_offset))?;
                }

                let mut pos = 0u64;
                while pos + prefix < size {
                    let length_field = &mut record_buf[..length_size as usize];
                    reader.read_exact(length_field).map_err(Error::from_read)?;

                    let len = length_field.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
                    let offset = sample_offset + pos + prefix;
                    let available = size - pos - prefix;

                    if len > available {
                        let sample = si as u32;
                        match self.truncation {
                            TruncationPolicy::Fail => {
                                return Err(Error::TruncatedRecord {
                                    sample,
                                    offset,
                                    declared: len as u32,
                                    available: available as u32,
                                });
                            }
                            TruncationPolicy::StopSample => {
                                warn!(
                                    track_id = track.track_id,
                                    sample,
                                    offset,
                                    declared = len,
                                    available,
                                    "Truncated NAL record, skipping rest of sample"
                                );
                                break;
                            }
                        }
                    }

                    if len == 0 {
                        debug!(offset, "Skipping zero-length NAL record");
                        pos += prefix;
                        continue;
                    }

                    let mut header = [0u8; 1];
                    reader.read_exact(&mut header).map_err(Error::from_read)?;

                    let unit = NalUnit {
                        nal_type: header[0] & 0x1F,
                        offset,
                        length: len as u32,
                        track_id: track.track_id,
                        chunk: chunk_index as u32,
                        sample: si as u32,
                        timestamp,
                    };
                    debug!(
                        nal_type = unit.nal_type,
                        offset = unit.offset,
                        length = unit.length,
                        sample = unit.sample,
                        "Located NAL unit"
                    );
                    units.push(unit);

                    pos += prefix + len;
                    if pos + prefix < size {
                        skip(reader, len - 1)?;
                    }
                }

                sample_offset += size;
                si += 1;
            }
        }

        Ok(units)
    }
}

/// Read past `len` payload bytes without seeking, so buffered readers keep
/// their buffer.
fn skip<R: Read + ?Sized>(reader: &mut R, len: u64) -> Result<()> {
    let skipped = io::copy(&mut (&mut *reader).take(len), &mut io::sink())?;
    if skipped < len {
        return Err(Error::EndOfInput);
    }
    Ok(())
}

/// Locate every NAL unit of `track` with the default (failing) truncation policy.
pub fn locate_nal_units<R: Read + Seek + ?Sized>(
    track: &Track,
    reader: &mut R,
) -> Result<Vec<NalUnit>> {
    Locator::new().locate(track, reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use datamosh_media::{AvcConfig, Chunk, HandlerType, Sample};
    use std::io::Cursor;

    fn track(length_size: u8, chunks: &[(u64, u32)], sizes: &[u32]) -> Track {
        let mut track = Track::new(1);
        track.handler = HandlerType::Video;
        track.timescale = 1000;
        track.avc = Some(AvcConfig {
            version: 1,
            profile: 66,
            compatibility: 0,
            level: 30,
            nal_length_size: length_size,
            sps: Vec::new(),
            pps: Vec::new(),
        });
        track.chunks = chunks
            .iter()
            .map(|&(data_offset, samples_per_chunk)| Chunk {
                data_offset,
                samples_per_chunk,
            })
            .collect();
        track.samples = sizes
            .iter()
            .map(|&size| Sample {
                size,
                time_delta: 40,
                cts_offset: 0,
                is_sync: false,
            })
            .collect();
        track
    }

    fn summary(units: &[NalUnit]) -> Vec<(u8, u64, u32, u32, u32)> {
        units
            .iter()
            .map(|u| (u.nal_type, u.offset, u.length, u.chunk, u.sample))
            .collect()
    }

    #[test]
    fn test_locate_across_chunks() {
        let mut data = vec![0xEE; 4];
        // chunk 0 @4: sample 0 = SPS(3) + IDR(3), sample 1 = P(2)
        data.extend([0, 0, 0, 3, 0x67, 0x42, 0x00, 0, 0, 0, 3, 0x65, 0x88, 0x80]);
        data.extend([0, 0, 0, 2, 0x41, 0x9A]);
        // chunk 1 @24: sample 2 = IDR(2)
        data.extend([0, 0, 0, 2, 0x65, 0xB0]);
        let track = track(4, &[(4, 2), (24, 1)], &[14, 6, 6]);

        let units = locate_nal_units(&track, &mut Cursor::new(data)).unwrap();

        assert_eq!(
            summary(&units),
            vec![
                (7, 8, 3, 0, 0),
                (5, 15, 3, 0, 0),
                (1, 22, 2, 0, 1),
                (5, 28, 2, 1, 2),
            ]
        );
        assert_eq!(
            units[3].timestamp,
            Some(Timestamp { value: 80, timescale: 1000 })
        );
    }

    #[test]
    fn test_short_length_prefix() {
        let data = vec![0x00, 0x02, 0x65, 0x88, 0x00, 0x01, 0x41];
        let track = track(2, &[(0, 1)], &[7]);

        let units = locate_nal_units(&track, &mut Cursor::new(data)).unwrap();
        assert_eq!(summary(&units), vec![(5, 2, 2, 0, 0), (1, 6, 1, 0, 0)]);
    }

    #[test]
    fn test_empty_samples_are_skipped() {
        let data = vec![0, 0, 0, 1, 0x09, 0, 0, 0, 1, 0x09];
        let track = track(4, &[(0, 3)], &[5, 0, 5]);

        let units = locate_nal_units(&track, &mut Cursor::new(data)).unwrap();
        assert_eq!(summary(&units), vec![(9, 4, 1, 0, 0), (9, 9, 1, 0, 2)]);
    }

    #[test]
    fn test_trailing_bytes_shorter_than_record() {
        // Two leftover bytes cannot hold a 4-byte prefix plus a header.
        let data = vec![0, 0, 0, 1, 0x09, 0xAA, 0xBB];
        let track = track(4, &[(0, 1)], &[7]);

        let units = locate_nal_units(&track, &mut Cursor::new(data)).unwrap();
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn test_zero_length_record_is_skipped() {
        let data = vec![0, 0, 0, 0, 0, 0, 0, 1, 0x09];
        let track = track(4, &[(0, 1)], &[9]);

        let units = locate_nal_units(&track, &mut Cursor::new(data)).unwrap();
        assert_eq!(summary(&units), vec![(9, 8, 1, 0, 0)]);
    }

    #[test]
    fn test_truncated_record_fails() {
        let data = vec![0, 0, 0, 9, 0x65, 0x88, 0x80];
        let track = track(4, &[(0, 1)], &[7]);

        assert_matches!(
            locate_nal_units(&track, &mut Cursor::new(data)),
            Err(Error::TruncatedRecord { sample: 0, offset: 4, declared: 9, available: 3 })
        );
    }

    #[test]
    fn test_truncated_record_stops_sample() {
        let data = vec![0, 0, 0, 9, 0x65, 0x88, 0x80, 0, 0, 0, 1, 0x09];
        let track = track(4, &[(0, 2)], &[7, 5]);

        let units = Locator::new()
            .with_truncation(TruncationPolicy::StopSample)
            .locate(&track, &mut Cursor::new(data))
            .unwrap();
        assert_eq!(summary(&units), vec![(9, 11, 1, 0, 1)]);
    }

    #[test]
    fn test_chunk_table_longer_than_samples() {
        let data = vec![0, 0, 0, 1, 0x09];
        let track = track(4, &[(0, 4)], &[5]);

        let units = locate_nal_units(&track, &mut Cursor::new(data)).unwrap();
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn test_missing_avc_config() {
        let mut t = track(4, &[], &[]);
        t.avc = None;
        assert_matches!(
            locate_nal_units(&t, &mut Cursor::new(Vec::new())),
            Err(Error::Format(_))
        );

        let t = track(5, &[], &[]);
        assert_matches!(
            locate_nal_units(&t, &mut Cursor::new(Vec::new())),
            Err(Error::InvalidLengthSize(5))
        );
    }

    /// Counts seeks so tests can check how often the buffer is dropped.
    struct SeekCounter<R> {
        inner: R,
        seeks: usize,
    }

    impl<R: Read> Read for SeekCounter<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl<R: Seek> Seek for SeekCounter<R> {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.seeks += 1;
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_records_in_a_sample_are_read_without_seeking() {
        let mut data = vec![0, 0, 0, 1, 0x09];
        data.extend([0, 0, 0, 4, 0x67, 0x42, 0xC0, 0x1E]);
        data.extend([0, 0, 0, 3, 0x65, 0x88, 0x80]);
        data.extend([0, 0, 0, 2, 0x41, 0x9A]);
        let track = track(4, &[(0, 2)], &[20, 6]);
        let mut reader = SeekCounter {
            inner: Cursor::new(data),
            seeks: 0,
        };

        let units = locate_nal_units(&track, &mut reader).unwrap();

        assert_eq!(
            summary(&units),
            vec![(9, 4, 1, 0, 0), (7, 9, 4, 0, 0), (5, 17, 3, 0, 0), (1, 24, 2, 0, 1)]
        );
        assert_eq!(reader.seeks, 2);
    }

    #[test]
    fn test_payload_past_end_of_file() {
        // The first record claims four bytes but the file ends after two.
        let data = vec![0, 0, 0, 4, 0x65, 0x88];
        let track = track(4, &[(0, 1)], &[14]);

        assert_matches!(
            locate_nal_units(&track, &mut Cursor::new(data)),
            Err(Error::EndOfInput)
        );
    }

    #[test]
    fn test_sample_past_end_of_file() {
        let data = vec![0, 0, 0, 1];
        let track = track(4, &[(0, 1)], &[5]);

        assert_matches!(
            locate_nal_units(&track, &mut Cursor::new(data)),
            Err(Error::EndOfInput)
        );
    }
}
