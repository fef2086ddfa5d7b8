//! Shared helpers for integration tests.
//!
//! Provides [`MovieBuilder`], which writes minimal but well-formed MP4 files
//! with one H.264 video track (and optionally an empty audio track) whose
//! samples are exactly the NAL units handed to it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// NAL units of one sample, header byte included.
pub type TestSample = Vec<Vec<u8>>;

/// IDR slice: first_mb 0, slice_type 7 (I), pps 0, then `fill` payload bytes.
pub fn idr(fill: usize) -> Vec<u8> {
    let mut nal = vec![0x65, 0x88, 0x80];
    nal.extend(std::iter::repeat(0xAB).take(fill));
    nal
}

/// Non-IDR slice: first_mb 0, slice_type 5 (P), pps 0, then `fill` payload bytes.
pub fn p_slice(fill: usize) -> Vec<u8> {
    let mut nal = vec![0x41, 0x9A];
    nal.extend(std::iter::repeat(0xCD).take(fill));
    nal
}

/// Baseline profile SPS, level 3.0.
pub fn sps() -> Vec<u8> {
    vec![0x67, 0x42, 0xC0, 0x1E, 0xB0]
}

pub fn pps() -> Vec<u8> {
    vec![0x68, 0xCE, 0x3C, 0x80]
}

/// Access unit delimiter.
pub fn aud() -> Vec<u8> {
    vec![0x09, 0xF0]
}

pub struct MovieBuilder {
    length_size: u8,
    timescale: u32,
    sample_delta: u32,
    chunks: Vec<Vec<TestSample>>,
    audio: bool,
    encrypted: bool,
}

impl MovieBuilder {
    /// A builder whose NAL records use `length_size`-byte prefixes.
    pub fn new(length_size: u8) -> Self {
        Self {
            length_size,
            timescale: 1000,
            sample_delta: 500,
            chunks: Vec::new(),
            audio: false,
            encrypted: false,
        }
    }

    /// Append a chunk holding `samples`.
    pub fn chunk(mut self, samples: Vec<TestSample>) -> Self {
        self.chunks.push(samples);
        self
    }

    /// Add an audio track with empty sample tables after the video track.
    pub fn with_audio_track(mut self) -> Self {
        self.audio = true;
        self
    }

    /// Mark the video sample entry as protected (`encv`).
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let ftyp = atom(b"ftyp", b"isomiso2avc1mp41");
        let mdat: Vec<u8> = self
            .chunks
            .iter()
            .flatten()
            .flat_map(|sample| self.sample_bytes(sample))
            .collect();

        // stco entries are fixed width, so the moov size does not depend on them.
        let moov_len = self.moov(0).len();
        let mdat_start = (ftyp.len() + moov_len + 8) as u32;

        let mut file = ftyp;
        file.extend(self.moov(mdat_start));
        file.extend(atom(b"mdat", &mdat));
        file
    }

    /// Build and write the movie to `dir/name`.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }

    fn sample_bytes(&self, sample: &TestSample) -> Vec<u8> {
        let mut out = Vec::new();
        for nal in sample {
            let len = (nal.len() as u32).to_be_bytes();
            out.extend_from_slice(&len[4 - self.length_size as usize..]);
            out.extend_from_slice(nal);
        }
        out
    }

    fn moov(&self, mdat_start: u32) -> Vec<u8> {
        let samples: Vec<&TestSample> = self.chunks.iter().flatten().collect();
        let duration = samples.len() as u32 * self.sample_delta;

        let mvhd = full_atom(b"mvhd", 0, &u32s(&[0, 0, self.timescale, duration]));
        let mut moov = [mvhd, self.video_trak(mdat_start)].concat();
        if self.audio {
            moov.extend(audio_trak(2));
        }
        atom(b"moov", &moov)
    }

    fn video_trak(&self, mdat_start: u32) -> Vec<u8> {
        let samples: Vec<&TestSample> = self.chunks.iter().flatten().collect();
        let sizes: Vec<u32> = samples
            .iter()
            .map(|s| self.sample_bytes(s).len() as u32)
            .collect();

        let mut offsets = Vec::new();
        let mut offset = mdat_start;
        let mut index = 0;
        for chunk in &self.chunks {
            offsets.push(offset);
            for _ in chunk {
                offset += sizes[index];
                index += 1;
            }
        }

        let mut stsc = vec![self.chunks.len() as u32];
        for (i, chunk) in self.chunks.iter().enumerate() {
            stsc.extend([i as u32 + 1, chunk.len() as u32, 1]);
        }

        let mut stsz = vec![0, sizes.len() as u32];
        stsz.extend(&sizes);

        let mut stco = vec![offsets.len() as u32];
        stco.extend(&offsets);

        let length_bits = 0xFC | (self.length_size - 1);
        let sps = sps();
        let pps = pps();
        let mut avcc = vec![1, 0x42, 0xC0, 0x1E, length_bits, 0xE1];
        avcc.extend((sps.len() as u16).to_be_bytes());
        avcc.extend(&sps);
        avcc.push(1);
        avcc.extend((pps.len() as u16).to_be_bytes());
        avcc.extend(&pps);

        let mut entry = vec![0u8; 78];
        entry.extend(atom(b"avcC", &avcc));
        let fourcc = if self.encrypted { b"encv" } else { b"avc1" };
        let stsd = full_atom(b"stsd", 0, &[u32s(&[1]), atom(fourcc, &entry)].concat());

        let stbl = atom(
            b"stbl",
            &[
                stsd,
                full_atom(b"stts", 0, &u32s(&[1, sizes.len() as u32, self.sample_delta])),
                full_atom(b"stss", 0, &u32s(&[1, 1])),
                full_atom(b"stsc", 0, &u32s(&stsc)),
                full_atom(b"stsz", 0, &u32s(&stsz)),
                full_atom(b"stco", 0, &u32s(&stco)),
            ]
            .concat(),
        );

        let duration = sizes.len() as u32 * self.sample_delta;
        trak(1, b"vide", self.timescale, duration, &stbl, Some((320, 240)))
    }
}

fn audio_trak(track_id: u32) -> Vec<u8> {
    let stbl = atom(
        b"stbl",
        &[
            full_atom(b"stsd", 0, &u32s(&[0])),
            full_atom(b"stts", 0, &u32s(&[0])),
            full_atom(b"stsc", 0, &u32s(&[0])),
            full_atom(b"stsz", 0, &u32s(&[0, 0])),
            full_atom(b"stco", 0, &u32s(&[0])),
        ]
        .concat(),
    );
    trak(track_id, b"soun", 48000, 0, &stbl, None)
}

fn trak(
    track_id: u32,
    handler: &[u8; 4],
    timescale: u32,
    duration: u32,
    stbl: &[u8],
    size: Option<(u32, u32)>,
) -> Vec<u8> {
    let mut tkhd = u32s(&[0, 0, track_id, 0, duration]);
    tkhd.extend_from_slice(&[0; 52]);
    let (width, height) = size.unwrap_or((0, 0));
    tkhd.extend(u32s(&[width << 16, height << 16]));

    let mut hdlr = u32s(&[0]);
    hdlr.extend_from_slice(handler);
    hdlr.extend_from_slice(&[0; 13]);

    let mdia = atom(
        b"mdia",
        &[
            full_atom(b"mdhd", 0, &u32s(&[0, 0, timescale, duration, 0])),
            full_atom(b"hdlr", 0, &hdlr),
            atom(b"minf", stbl),
        ]
        .concat(),
    );

    atom(b"trak", &[full_atom(b"tkhd", 0, &tkhd), mdia].concat())
}

pub fn atom(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

pub fn full_atom(kind: &[u8; 4], version: u8, body: &[u8]) -> Vec<u8> {
    let mut payload = vec![version, 0, 0, 0];
    payload.extend_from_slice(body);
    atom(kind, &payload)
}

pub fn u32s(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}
