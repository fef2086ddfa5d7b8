//! MP4 sample table expansion.
//!
//! Sample tables describe how samples (access units) are organized in the file:
//! - stts: sample durations (decoding time)
//! - stss: sync sample table (keyframes)
//! - stsc: sample-to-chunk mapping
//! - stsz: sample sizes
//! - stco/co64: chunk offsets
//! - ctts: composition time offsets (for B-frames)
//!
//! Unlike a flat per-sample offset table, the expansion keeps the chunk
//! grouping: each chunk's samples occupy contiguous bytes starting at the
//! chunk's data offset, and the NAL locator walks them in that order.

use tracing::warn;

/// A run of contiguous samples stored together in the media data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Chunk {
    /// Absolute file offset of the first sample in the chunk.
    pub data_offset: u64,
    /// Number of samples stored in this chunk.
    pub samples_per_chunk: u32,
}

/// One sample in decoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Sample {
    /// Sample size in bytes.
    pub size: u32,
    /// Decoding duration in media timescale units.
    pub time_delta: u32,
    /// Composition time offset (presentation minus decoding time).
    pub cts_offset: i32,
    /// Whether this sample is a sync sample (keyframe).
    pub is_sync: bool,
}

/// Builder for constructing chunk and sample lists from raw atom data.
#[derive(Debug, Default)]
pub struct SampleTableBuilder {
    // stts: (count, delta)
    stts_entries: Vec<(u32, u32)>,
    // stss: 1-based sync sample numbers
    sync_samples: Option<Vec<u32>>,
    // stsc: (first_chunk, samples_per_chunk, sample_description_index)
    stsc_entries: Vec<(u32, u32, u32)>,
    // stsz: a non-zero uniform size applies to every sample
    uniform_size: u32,
    sample_count: u32,
    sample_sizes: Vec<u32>,
    chunk_offsets: Vec<u64>,
    // ctts: (count, offset)
    ctts_entries: Vec<(u32, i32)>,
}

impl SampleTableBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set stts (decoding time to sample) entries.
    pub fn set_stts(&mut self, entries: Vec<(u32, u32)>) {
        self.stts_entries = entries;
    }

    /// Set stss (sync sample) entries.
    pub fn set_sync_samples(&mut self, mut samples: Vec<u32>) {
        samples.sort_unstable();
        self.sync_samples = Some(samples);
    }

    /// Set stsc (sample to chunk) entries.
    pub fn set_stsc(&mut self, entries: Vec<(u32, u32, u32)>) {
        self.stsc_entries = entries;
    }

    /// Set stsz (sample size) data.
    pub fn set_stsz(&mut self, uniform_size: u32, sample_count: u32, sizes: Vec<u32>) {
        self.uniform_size = uniform_size;
        self.sample_count = sample_count;
        self.sample_sizes = sizes;
    }

    /// Set chunk offsets (from stco or co64).
    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) {
        self.chunk_offsets = offsets;
    }

    /// Set ctts (composition time to sample) entries.
    pub fn set_ctts(&mut self, entries: Vec<(u32, i32)>) {
        self.ctts_entries = entries;
    }

    /// Resolve the tables into chunk and sample lists.
    ///
    /// The chunk list is derived from `stco`/`co64` and `stsc` alone and the
    /// sample list from `stsz`, so a file whose tables disagree yields lists
    /// that fail [`Track::validate`](super::Track::validate). A uniform-size
    /// `stsz` never yields more samples than the chunk table stores.
    pub fn build(self) -> (Vec<Chunk>, Vec<Sample>) {
        let chunks = self.resolve_chunks();
        let stored: u64 = chunks.iter().map(|c| c.samples_per_chunk as u64).sum();
        let samples = self.resolve_samples(stored);
        (chunks, samples)
    }

    fn resolve_chunks(&self) -> Vec<Chunk> {
        let mut chunks = Vec::with_capacity(self.chunk_offsets.len());

        for (index, &data_offset) in self.chunk_offsets.iter().enumerate() {
            let chunk_number = index as u32 + 1;
            // The last entry whose first chunk is at or before this one applies.
            let samples_per_chunk = self
                .stsc_entries
                .iter()
                .take_while(|(first_chunk, _, _)| *first_chunk <= chunk_number)
                .last()
                .map(|(_, samples, _)| *samples)
                .unwrap_or(0);

            chunks.push(Chunk {
                data_offset,
                samples_per_chunk,
            });
        }

        chunks
    }

    fn resolve_samples(&self, stored: u64) -> Vec<Sample> {
        let mut count = self.sample_count as usize;
        if self.uniform_size > 0 && self.sample_count as u64 > stored {
            warn!(
                claimed = self.sample_count,
                stored,
                "Uniform stsz count exceeds the chunk table, truncating"
            );
            count = stored as usize;
        }
        let deltas = expand_runs(&self.stts_entries, count);
        let cts_offsets = expand_runs(&self.ctts_entries, count);
        // A missing last delta repeats the previous one, as players do.
        let last_delta = deltas.last().copied().unwrap_or(0);

        let mut samples = Vec::with_capacity(count);
        for i in 0..count {
            let size = if self.uniform_size > 0 {
                self.uniform_size
            } else {
                self.sample_sizes.get(i).copied().unwrap_or(0)
            };

            let is_sync = match &self.sync_samples {
                // No stss means all samples are sync samples
                None => true,
                Some(sync) => sync.binary_search(&(i as u32 + 1)).is_ok(),
            };

            samples.push(Sample {
                size,
                time_delta: deltas.get(i).copied().unwrap_or(last_delta),
                cts_offset: cts_offsets.get(i).copied().unwrap_or(0),
                is_sync,
            });
        }

        samples
    }
}

/// Expand `(count, value)` runs into at most `limit` values.
fn expand_runs<T: Copy>(runs: &[(u32, T)], limit: usize) -> Vec<T> {
    runs.iter()
        .flat_map(|&(count, value)| std::iter::repeat(value).take(count as usize))
        .take(limit)
        .collect()
}
