//! Core primitive trait and processing context.

use crate::buffer::SharedBuffer;
use crate::context::PrimitiveKind;
use crate::patch::Value;

use super::nodes::{BiquadFilter, BufferSource, Destination, Gain, Oscillator, StereoPanner, StreamSource};
use super::param::ParamSet;

/// Frames per processing block.
pub const BLOCK: usize = 64;

pub type Block = [f32; BLOCK];

/// A stereo block: `[left, right]`.
pub type Bus = [Block; 2];

pub const SILENCE: Bus = [[0.0; BLOCK]; 2];

/// Information available during one block of processing.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    pub sample_rate: u32,
    /// Index of the block's first frame on the context clock.
    pub frame: u64,
    /// Frames `[active.0, active.1)` of the block in which a source is
    /// scheduled to sound. Always the whole block for non-sources.
    pub active: (usize, usize),
}

impl ProcessContext {
    pub fn new(sample_rate: u32, frame: u64) -> Self {
        Self {
            sample_rate,
            frame,
            active: (0, BLOCK),
        }
    }

    /// Context time, in seconds, of frame `i` of this block.
    #[inline]
    pub fn time_at(&self, i: usize) -> f64 {
        (self.frame + i as u64) as f64 / self.sample_rate as f64
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyError {
    Unknown,
    Invalid(String),
}

/// A block-processing primitive hosted by [`RenderContext`](super::RenderContext).
///
/// `params` holds this block's effective value of every entry of
/// [`params`](Self::params), in the same order.
#[enum_delegate::register]
pub trait Process {
    fn kind(&self) -> PrimitiveKind;

    fn params(&self) -> &ParamSet;

    fn params_mut(&mut self) -> &mut ParamSet;

    fn property(&self, _name: &str) -> Option<Value> {
        None
    }

    fn set_property(&mut self, _name: &str, _value: &Value) -> Result<(), PropertyError> {
        Err(PropertyError::Unknown)
    }

    /// Returns `false` if the primitive does not play buffers.
    fn set_buffer(&mut self, _buffer: SharedBuffer) -> bool {
        false
    }

    fn buffer(&self) -> Option<SharedBuffer> {
        None
    }

    /// A source that ran out of material on its own.
    fn finished(&self) -> bool {
        false
    }

    fn process(&mut self, ctx: &ProcessContext, input: &Bus, params: &[Block], out: &mut Bus);
}

#[enum_delegate::implement(Process)]
pub enum Primitive {
    Oscillator(Oscillator),
    Gain(Gain),
    BiquadFilter(BiquadFilter),
    StereoPanner(StereoPanner),
    BufferSource(BufferSource),
    StreamSource(StreamSource),
    Destination(Destination),
}

impl Primitive {
    pub fn new(kind: PrimitiveKind, sample_rate: u32) -> Self {
        match kind {
            PrimitiveKind::Oscillator => Oscillator::new().into(),
            PrimitiveKind::Gain => Gain::new().into(),
            PrimitiveKind::BiquadFilter => BiquadFilter::new(sample_rate).into(),
            PrimitiveKind::StereoPanner => StereoPanner::new().into(),
            PrimitiveKind::BufferSource => BufferSource::new().into(),
            PrimitiveKind::Streamer => StreamSource::new().into(),
            PrimitiveKind::Destination => Destination::new().into(),
        }
    }

    pub fn as_stream_source_mut(&mut self) -> Option<&mut StreamSource> {
        match self {
            Primitive::StreamSource(s) => Some(s),
            _ => None,
        }
    }
}

/// Writes `value` as both channels of frame `i`.
#[inline]
pub(crate) fn write_mono(out: &mut Bus, i: usize, value: f32) {
    out[0][i] = value;
    out[1][i] = value;
}
