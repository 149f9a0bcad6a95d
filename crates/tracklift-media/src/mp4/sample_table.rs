//! MP4 sample table resolution.
//!
//! Sample tables describe how samples are laid out in the file:
//! - stts: sample durations (decoding time)
//! - stss: sync sample table (key frames)
//! - stsc: sample-to-chunk mapping
//! - stsz: sample sizes
//! - stco/co64: chunk offsets
//! - ctts: composition time offsets (for B-frames)
//!
//! [`SampleTableBuilder`] collects the raw tables and resolves them into one
//! [`SampleEntry`] per sample, in decode order.

use std::collections::HashSet;

/// A fully resolved sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    /// Sample index (0-based).
    pub index: u32,
    /// File offset where sample data starts.
    pub offset: u64,
    /// Sample size in bytes.
    pub size: u32,
    /// Decode timestamp in media timescale.
    pub dts: u64,
    /// Sample duration in media timescale.
    pub duration: u32,
    /// Composition time offset (PTS - DTS).
    pub cts_offset: i32,
    /// Whether this sample is a sync sample.
    pub is_keyframe: bool,
}

impl SampleEntry {
    /// Get the presentation timestamp.
    pub fn pts(&self) -> u64 {
        (self.dts as i64).saturating_add(self.cts_offset as i64).max(0) as u64
    }

    /// File offset one past the last byte of this sample.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size as u64)
    }
}

/// Sample table containing resolved sample information.
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    pub sample_count: u32,
    pub samples: Vec<SampleEntry>,
}

impl SampleTable {
    /// Get sample by index.
    pub fn get(&self, index: u32) -> Option<&SampleEntry> {
        self.samples.get(index as usize)
    }

    /// Iterate over all samples.
    pub fn iter(&self) -> impl Iterator<Item = &SampleEntry> {
        self.samples.iter()
    }
}

/// Builder for constructing a sample table from raw atom data.
#[derive(Debug, Default)]
pub struct SampleTableBuilder {
    /// stts: (count, delta)
    stts_entries: Vec<(u32, u32)>,
    /// stss: sync sample numbers (1-based)
    sync_samples: Vec<u32>,
    /// stsc: (first_chunk, samples_per_chunk, sample_description_index)
    stsc_entries: Vec<(u32, u32, u32)>,
    /// stsz: when non-zero every sample has this size
    uniform_size: u32,
    sample_sizes: Vec<u32>,
    /// stsz sample_count field, authoritative when `uniform_size` is set
    declared_count: u32,
    chunk_offsets: Vec<u64>,
    /// ctts: (count, offset)
    ctts_entries: Vec<(u32, i32)>,
}

impl SampleTableBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stts(&mut self, entries: Vec<(u32, u32)>) {
        self.stts_entries = entries;
    }

    pub fn set_sync_samples(&mut self, samples: Vec<u32>) {
        self.sync_samples = samples;
    }

    pub fn set_stsc(&mut self, entries: Vec<(u32, u32, u32)>) {
        self.stsc_entries = entries;
    }

    /// Set stsz data. `sizes` is empty when `uniform_size` is non-zero.
    pub fn set_stsz(&mut self, uniform_size: u32, declared_count: u32, sizes: Vec<u32>) {
        self.uniform_size = uniform_size;
        self.declared_count = declared_count;
        self.sample_sizes = sizes;
    }

    /// Set chunk offsets (from stco or co64).
    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) {
        self.chunk_offsets = offsets;
    }

    pub fn set_ctts(&mut self, entries: Vec<(u32, i32)>) {
        self.ctts_entries = entries;
    }

    /// Build the sample table by resolving all sample information.
    pub fn build(self) -> SampleTable {
        let sample_count = if self.uniform_size > 0 {
            self.declared_count
        } else {
            self.sample_sizes.len() as u32
        };

        if sample_count == 0 {
            return SampleTable::default();
        }

        let n = sample_count as usize;
        let sizes: Vec<u32> = (0..n).map(|i| self.size_of(i)).collect();
        let offsets = self.resolve_offsets(&sizes);
        let (dts_values, durations) = self.resolve_timestamps(n);
        let cts_offsets = expand_runs(&self.ctts_entries, n, 0);

        // No stss means every sample is a sync sample.
        let sync_set: Option<HashSet<u32>> = (!self.sync_samples.is_empty())
            .then(|| self.sync_samples.iter().copied().collect());

        let samples = (0..n)
            .map(|i| SampleEntry {
                index: i as u32,
                offset: offsets[i],
                size: sizes[i],
                dts: dts_values[i],
                duration: durations[i],
                cts_offset: cts_offsets[i],
                is_keyframe: sync_set
                    .as_ref()
                    .map_or(true, |set| set.contains(&(i as u32 + 1))),
            })
            .collect();

        SampleTable {
            sample_count,
            samples,
        }
    }

    fn size_of(&self, index: usize) -> u32 {
        if self.uniform_size > 0 {
            self.uniform_size
        } else {
            self.sample_sizes.get(index).copied().unwrap_or(0)
        }
    }

    /// Map every sample to its 0-based chunk index using stsc runs.
    fn resolve_sample_chunks(&self, sample_count: usize) -> Vec<usize> {
        if self.stsc_entries.is_empty() {
            return vec![0; sample_count];
        }

        let num_chunks = self.chunk_offsets.len() as u32;
        let mut chunks = Vec::with_capacity(sample_count);

        'runs: for (i, &(first_chunk, samples_per_chunk, _)) in self.stsc_entries.iter().enumerate() {
            let next_first = self
                .stsc_entries
                .get(i + 1)
                .map_or(num_chunks + 1, |next| next.0);

            for chunk in first_chunk.max(1)..next_first.min(num_chunks + 1) {
                for _ in 0..samples_per_chunk {
                    if chunks.len() >= sample_count {
                        break 'runs;
                    }
                    chunks.push((chunk - 1) as usize);
                }
            }
        }

        let last = chunks.last().copied().unwrap_or(0);
        chunks.resize(sample_count, last);
        chunks
    }

    fn resolve_offsets(&self, sizes: &[u32]) -> Vec<u64> {
        let chunks = self.resolve_sample_chunks(sizes.len());
        let mut within_chunk = vec![0u64; self.chunk_offsets.len()];

        chunks
            .iter()
            .zip(sizes)
            .map(|(&chunk, &size)| {
                let base = self.chunk_offsets.get(chunk).copied().unwrap_or(0);
                match within_chunk.get_mut(chunk) {
                    Some(used) => {
                        let offset = base.saturating_add(*used);
                        *used = used.saturating_add(size as u64);
                        offset
                    }
                    None => base,
                }
            })
            .collect()
    }

    fn resolve_timestamps(&self, sample_count: usize) -> (Vec<u64>, Vec<u32>) {
        let last_delta = self.stts_entries.last().map_or(1, |&(_, delta)| delta);
        let durations = expand_runs(&self.stts_entries, sample_count, last_delta);

        let mut dts = Vec::with_capacity(sample_count);
        let mut current = 0u64;
        for &d in &durations {
            dts.push(current);
            current = current.saturating_add(d as u64);
        }

        (dts, durations)
    }
}

/// Expand `(count, value)` runs to exactly `len` values, padding with `pad`.
fn expand_runs<T: Copy>(runs: &[(u32, T)], len: usize, pad: T) -> Vec<T> {
    let mut out: Vec<T> = runs
        .iter()
        .flat_map(|&(count, value)| std::iter::repeat(value).take(count as usize))
        .take(len)
        .collect();
    out.resize(len, pad);
    out
}
