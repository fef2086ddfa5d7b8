//! MP4 file reader with atom parsing.

use super::{
    Atom, AtomType, AvcConfig, Codec, EditListEntry, HandlerType, Mp4File, SampleTableBuilder,
    Track,
};
use crate::{Error, Result};
use bytes::Buf;
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, trace, warn};

/// Maximum allowed atom data size (64 MB) to prevent OOM on malformed files.
const MAX_ATOM_DATA_SIZE: u64 = 64 * 1024 * 1024;

/// Size of the fixed VisualSampleEntry fields preceding its child boxes.
const VISUAL_SAMPLE_ENTRY_SIZE: usize = 78;

/// MP4 file reader.
pub struct Mp4Reader<R> {
    reader: R,
    file_size: u64,
}

impl<R: Read + Seek> Mp4Reader<R> {
    /// Create a new MP4 reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self { reader, file_size })
    }

    /// Parse the MP4 file.
    pub fn parse(&mut self) -> Result<Mp4File> {
        let mut mp4 = Mp4File {
            duration: 0,
            timescale: 1000,
            tracks: Vec::new(),
            mdat: Vec::new(),
            has_faststart: false,
        };

        let mut moov_offset = None;

        // First pass: find top-level atoms
        let atoms = self.read_atoms(0, self.file_size)?;

        for atom in &atoms {
            trace!(atom = %atom.atom_type, offset = atom.offset(), size = atom.size, "top-level atom");
            match atom.atom_type {
                AtomType::MOOV => {
                    moov_offset = Some(atom.offset());
                    self.parse_moov(atom, &mut mp4)?;
                }
                AtomType::MDAT => {
                    mp4.mdat.push(atom.data_offset..atom.end());
                }
                _ => {}
            }
        }

        let moov_offset = moov_offset.ok_or(Error::MissingAtom("moov"))?;

        // Faststart means moov comes before mdat
        mp4.has_faststart = mp4
            .mdat
            .first()
            .map_or(true, |range| moov_offset < range.start);

        debug!(
            tracks = mp4.tracks.len(),
            mdat = mp4.mdat.len(),
            faststart = mp4.has_faststart,
            "Parsed MP4"
        );

        Ok(mp4)
    }

    /// Read atoms at the given level.
    fn read_atoms(&mut self, start: u64, end: u64) -> Result<Vec<Atom>> {
        let mut atoms = Vec::new();
        let mut pos = start;

        while pos + 8 <= end {
            self.reader.seek(SeekFrom::Start(pos))?;

            // Read atom header
            let mut header = [0u8; 8];
            self.reader.read_exact(&mut header)?;
            let mut header = &header[..];

            let size = header.get_u32() as u64;
            let atom_type = AtomType::from_bytes([
                header.get_u8(),
                header.get_u8(),
                header.get_u8(),
                header.get_u8(),
            ]);

            let (actual_size, header_size) = if size == 1 {
                // 64-bit extended size
                let mut ext = [0u8; 8];
                self.reader.read_exact(&mut ext)?;
                (u64::from_be_bytes(ext), 16u8)
            } else if size == 0 {
                // Atom extends to end of the enclosing range
                (end - pos, 8u8)
            } else {
                (size, 8u8)
            };

            // `pos + 8 <= end` holds here, so the subtraction cannot wrap.
            if actual_size < header_size as u64 || actual_size > end - pos {
                warn!(
                    atom = %atom_type,
                    offset = pos,
                    size = actual_size,
                    "Atom overruns its parent, stopping scan"
                );
                break;
            }

            atoms.push(Atom {
                atom_type,
                size: actual_size,
                data_offset: pos + header_size as u64,
                header_size,
            });

            pos += actual_size;
        }

        Ok(atoms)
    }

    fn read_children(&mut self, parent: &Atom) -> Result<Vec<Atom>> {
        self.read_atoms(parent.data_offset, parent.end())
    }

    /// Read and validate atom data, rejecting oversized atoms.
    fn read_atom_data(&mut self, atom: &Atom) -> Result<Vec<u8>> {
        let size = atom.data_size();
        if size > MAX_ATOM_DATA_SIZE {
            return Err(Error::invalid_mp4(format!(
                "Atom {} data size {} exceeds maximum {}",
                atom.atom_type, size, MAX_ATOM_DATA_SIZE
            )));
        }
        self.reader.seek(SeekFrom::Start(atom.data_offset))?;
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }

    /// Parse moov atom.
    fn parse_moov(&mut self, moov: &Atom, mp4: &mut Mp4File) -> Result<()> {
        for child in &self.read_children(moov)? {
            match child.atom_type {
                AtomType::MVHD => {
                    self.parse_mvhd(child, mp4)?;
                }
                AtomType::TRAK => {
                    let track = self.parse_trak(child)?;
                    debug!(
                        track_id = track.track_id,
                        handler = %track.handler,
                        chunks = track.chunks.len(),
                        samples = track.samples.len(),
                        "Parsed track"
                    );
                    mp4.tracks.push(track);
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Parse mvhd (movie header).
    fn parse_mvhd(&mut self, atom: &Atom, mp4: &mut Mp4File) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        let version = full_box_version(&mut buf, atom)?;
        if version == 0 {
            need(&buf, 16, atom)?;
            buf.advance(8); // creation + modification time
            mp4.timescale = buf.get_u32();
            mp4.duration = buf.get_u32() as u64;
        } else {
            need(&buf, 28, atom)?;
            buf.advance(16);
            mp4.timescale = buf.get_u32();
            mp4.duration = buf.get_u64();
        }

        Ok(())
    }

    /// Parse trak (track) atom.
    fn parse_trak(&mut self, trak: &Atom) -> Result<Track> {
        let mut track = Track::new(0);

        for child in &self.read_children(trak)? {
            match child.atom_type {
                AtomType::TKHD => {
                    self.parse_tkhd(child, &mut track)?;
                }
                AtomType::EDTS => {
                    self.parse_edts(child, &mut track)?;
                }
                AtomType::MDIA => {
                    self.parse_mdia(child, &mut track)?;
                }
                _ => {}
            }
        }

        Ok(track)
    }

    /// Parse tkhd (track header).
    fn parse_tkhd(&mut self, atom: &Atom, track: &mut Track) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        let version = full_box_version(&mut buf, atom)?;
        // Fields before the track ID are creation and modification time.
        let times = if version == 0 { 8 } else { 16 };
        need(&buf, times + 4, atom)?;
        buf.advance(times);
        track.track_id = buf.get_u32();

        // reserved(4), duration, reserved(8), layer/group/volume/reserved(8), matrix(36)
        let skip = 4 + if version == 0 { 4 } else { 8 } + 8 + 8 + 36;
        if buf.remaining() >= skip + 8 {
            buf.advance(skip);
            // Width and height at fixed point 16.16
            track.width = Some(buf.get_u32() >> 16);
            track.height = Some(buf.get_u32() >> 16);
        }

        Ok(())
    }

    /// Parse edts (edit) atom.
    fn parse_edts(&mut self, edts: &Atom, track: &mut Track) -> Result<()> {
        for child in &self.read_children(edts)? {
            if child.atom_type == AtomType::ELST {
                self.parse_elst(child, track)?;
            }
        }
        Ok(())
    }

    /// Parse elst (edit list).
    fn parse_elst(&mut self, atom: &Atom, track: &mut Track) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        let version = full_box_version(&mut buf, atom)?;
        let entry_count = entry_count(&mut buf, atom, if version == 1 { 20 } else { 12 })?;

        for _ in 0..entry_count {
            let (segment_duration, media_time) = if version == 1 {
                (buf.get_u64(), buf.get_i64())
            } else {
                (buf.get_u32() as u64, buf.get_i32() as i64)
            };
            let media_rate = buf.get_i16();
            buf.advance(2); // media_rate_fraction

            track.edit_list.push(EditListEntry {
                segment_duration,
                media_time,
                media_rate,
            });
        }

        Ok(())
    }

    /// Parse mdia (media) atom.
    fn parse_mdia(&mut self, mdia: &Atom, track: &mut Track) -> Result<()> {
        let children = self.read_children(mdia)?;

        // hdlr decides how stsd is read, so it goes first.
        for child in children.iter().filter(|a| a.atom_type == AtomType::HDLR) {
            self.parse_hdlr(child, track)?;
        }

        for child in &children {
            match child.atom_type {
                AtomType::MDHD => {
                    self.parse_mdhd(child, track)?;
                }
                AtomType::MINF => {
                    self.parse_minf(child, track)?;
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Parse mdhd (media header).
    fn parse_mdhd(&mut self, atom: &Atom, track: &mut Track) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        let version = full_box_version(&mut buf, atom)?;
        if version == 0 {
            need(&buf, 16, atom)?;
            buf.advance(8);
            track.timescale = buf.get_u32();
            track.duration = buf.get_u32() as u64;
        } else {
            need(&buf, 28, atom)?;
            buf.advance(16);
            track.timescale = buf.get_u32();
            track.duration = buf.get_u64();
        }

        Ok(())
    }

    /// Parse hdlr (handler) atom.
    fn parse_hdlr(&mut self, atom: &Atom, track: &mut Track) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        full_box_version(&mut buf, atom)?;
        need(&buf, 8, atom)?;
        buf.advance(4); // pre_defined
        let mut handler = [0u8; 4];
        buf.copy_to_slice(&mut handler);
        track.handler = HandlerType::from_bytes(handler);

        Ok(())
    }

    /// Parse minf (media info) atom.
    fn parse_minf(&mut self, minf: &Atom, track: &mut Track) -> Result<()> {
        for child in &self.read_children(minf)? {
            if child.atom_type == AtomType::STBL {
                self.parse_stbl(child, track)?;
            }
        }

        Ok(())
    }

    /// Parse stbl (sample table) atom.
    fn parse_stbl(&mut self, stbl: &Atom, track: &mut Track) -> Result<()> {
        let mut builder = SampleTableBuilder::new();

        for child in &self.read_children(stbl)? {
            match child.atom_type {
                AtomType::STTS => {
                    self.parse_stts(child, &mut builder)?;
                }
                AtomType::STSS => {
                    self.parse_stss(child, &mut builder)?;
                }
                AtomType::STSC => {
                    self.parse_stsc(child, &mut builder)?;
                }
                AtomType::STSZ => {
                    self.parse_stsz(child, &mut builder)?;
                }
                AtomType::STCO => {
                    self.parse_stco(child, &mut builder)?;
                }
                AtomType::CO64 => {
                    self.parse_co64(child, &mut builder)?;
                }
                AtomType::CTTS => {
                    self.parse_ctts(child, &mut builder)?;
                }
                AtomType::STSD => {
                    self.parse_stsd(child, track)?;
                }
                _ => {}
            }
        }

        let (chunks, samples) = builder.build();
        track.chunks = chunks;
        track.samples = samples;
        Ok(())
    }

    /// Parse stts (decoding time to sample).
    fn parse_stts(&mut self, atom: &Atom, builder: &mut SampleTableBuilder) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        full_box_version(&mut buf, atom)?;
        let count = entry_count(&mut buf, atom, 8)?;
        let entries = (0..count).map(|_| (buf.get_u32(), buf.get_u32())).collect();

        builder.set_stts(entries);
        Ok(())
    }

    /// Parse stss (sync sample).
    fn parse_stss(&mut self, atom: &Atom, builder: &mut SampleTableBuilder) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        full_box_version(&mut buf, atom)?;
        let count = entry_count(&mut buf, atom, 4)?;
        let sync_samples = (0..count).map(|_| buf.get_u32()).collect();

        builder.set_sync_samples(sync_samples);
        Ok(())
    }

    /// Parse stsc (sample to chunk).
    fn parse_stsc(&mut self, atom: &Atom, builder: &mut SampleTableBuilder) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        full_box_version(&mut buf, atom)?;
        let count = entry_count(&mut buf, atom, 12)?;
        let entries = (0..count)
            .map(|_| (buf.get_u32(), buf.get_u32(), buf.get_u32()))
            .collect();

        builder.set_stsc(entries);
        Ok(())
    }

    /// Parse stsz (sample size).
    fn parse_stsz(&mut self, atom: &Atom, builder: &mut SampleTableBuilder) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        full_box_version(&mut buf, atom)?;
        need(&buf, 8, atom)?;
        let uniform_size = buf.get_u32();
        let sample_count = buf.get_u32();

        let sizes = if uniform_size == 0 {
            need(&buf, sample_count as usize * 4, atom)?;
            (0..sample_count).map(|_| buf.get_u32()).collect()
        } else {
            let total = uniform_size as u64 * sample_count as u64;
            if total > self.file_size {
                return Err(Error::invalid_mp4(format!(
                    "stsz atom at offset {} claims {} samples of {} bytes in a {} byte file",
                    atom.offset(),
                    sample_count,
                    uniform_size,
                    self.file_size
                )));
            }
            vec![]
        };

        builder.set_stsz(uniform_size, sample_count, sizes);
        Ok(())
    }

    /// Parse stco (chunk offset, 32-bit).
    fn parse_stco(&mut self, atom: &Atom, builder: &mut SampleTableBuilder) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        full_box_version(&mut buf, atom)?;
        let count = entry_count(&mut buf, atom, 4)?;
        let offsets = (0..count).map(|_| buf.get_u32() as u64).collect();

        builder.set_chunk_offsets(offsets);
        Ok(())
    }

    /// Parse co64 (chunk offset, 64-bit).
    fn parse_co64(&mut self, atom: &Atom, builder: &mut SampleTableBuilder) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        full_box_version(&mut buf, atom)?;
        let count = entry_count(&mut buf, atom, 8)?;
        let offsets = (0..count).map(|_| buf.get_u64()).collect();

        builder.set_chunk_offsets(offsets);
        Ok(())
    }

    /// Parse ctts (composition time to sample).
    fn parse_ctts(&mut self, atom: &Atom, builder: &mut SampleTableBuilder) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        // Version 0 offsets are unsigned on paper, but writers store signed
        // values either way.
        full_box_version(&mut buf, atom)?;
        let count = entry_count(&mut buf, atom, 8)?;
        let entries = (0..count).map(|_| (buf.get_u32(), buf.get_i32())).collect();

        builder.set_ctts(entries);
        Ok(())
    }

    /// Parse stsd (sample description) - extract the codec and avcC.
    fn parse_stsd(&mut self, atom: &Atom, track: &mut Track) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        full_box_version(&mut buf, atom)?;
        let count = entry_count(&mut buf, atom, 8)?;
        if count == 0 || !track.handler.is_video() {
            return Ok(());
        }

        // First sample entry box header
        let entry = buf;
        let entry_size = box_size(entry);
        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(&entry[4..8]);
        let codec = Codec::from_fourcc(fourcc);
        track.codec = Some(codec);

        if entry_size < 8 + VISUAL_SAMPLE_ENTRY_SIZE || entry_size > entry.len() {
            warn!(track_id = track.track_id, codec = %codec, "Short video sample entry");
            return Ok(());
        }

        // Scan child boxes after the fixed VisualSampleEntry fields
        let mut children = &entry[8 + VISUAL_SAMPLE_ENTRY_SIZE..entry_size];
        while children.remaining() >= 8 {
            let size = box_size(children);
            if size < 8 || size > children.len() {
                break;
            }

            if &children[4..8] == AtomType::AVCC.0.as_slice() {
                track.avc = Some(AvcConfig::parse(&children[8..size])?);
                break;
            }

            children.advance(size);
        }

        Ok(())
    }
}

/// Box size field at the start of `data`, or 0 if there are fewer than 4 bytes.
fn box_size(data: &[u8]) -> usize {
    match data.get(..4) {
        Some(b) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize,
        None => 0,
    }
}

/// Consume the version/flags word of a full box and return the version.
fn full_box_version(buf: &mut &[u8], atom: &Atom) -> Result<u8> {
    need(buf, 4, atom)?;
    let version = buf.get_u8();
    buf.advance(3);
    Ok(version)
}

/// Read a table's entry count and check the payload holds every entry.
fn entry_count(buf: &mut &[u8], atom: &Atom, entry_size: usize) -> Result<u32> {
    need(buf, 4, atom)?;
    let count = buf.get_u32();
    need(buf, count as usize * entry_size, atom)?;
    Ok(count)
}

fn need(buf: &[u8], len: usize, atom: &Atom) -> Result<()> {
    if buf.len() < len {
        return Err(Error::invalid_mp4(format!(
            "{} atom at offset {} truncated: need {} bytes, have {}",
            atom.atom_type,
            atom.offset(),
            len,
            buf.len()
        )));
    }
    Ok(())
}
