//! Decoded audio held in memory.

use std::sync::Arc;

/// A decoded, planar, f32 audio buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

/// Buffers are shared between the cache and every source playing them.
pub type SharedBuffer = Arc<AudioBuffer>;

impl AudioBuffer {
    /// Build from planar channel data. Channels are truncated to the shortest.
    pub fn new(sample_rate: u32, mut channels: Vec<Vec<f32>>) -> Self {
        let len = channels.iter().map(Vec::len).min().unwrap_or(0);
        for ch in channels.iter_mut() {
            ch.truncate(len);
        }
        Self { sample_rate, channels }
    }

    /// Build from interleaved samples (`L R L R ...`).
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (ch, &s) in frame.iter().enumerate() {
                planar[ch].push(s);
            }
        }
        Self { sample_rate, channels: planar }
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length in frames.
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }
}
