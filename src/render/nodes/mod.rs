//! Built-in primitives.
//!
//! - [`Oscillator`] - sine/square/sawtooth/triangle with `frequency` and `detune`
//! - [`BufferSource`] - plays a decoded sample, optionally looping
//! - [`StreamSource`] - plays PCM pushed through a ring buffer
//! - [`Gain`], [`BiquadFilter`], [`StereoPanner`] - effects
//! - [`Destination`] - the context's sink

mod buffer_source;
mod destination;
mod filter;
mod gain;
mod oscillator;
mod panner;
mod stream_source;

pub use buffer_source::BufferSource;
pub use destination::Destination;
pub use filter::{BiquadFilter, FilterType};
pub use gain::Gain;
pub use oscillator::{Oscillator, Waveform};
pub use panner::StereoPanner;
pub use stream_source::StreamSource;
