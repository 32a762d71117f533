//! The audio context boundary.
//!
//! The compiler never touches samples. It asks an [`AudioContext`] to create
//! primitives, set their parameters, wire them together and schedule them.
//! [`RenderContext`](crate::render::RenderContext) is the built-in
//! implementation; hosts with their own audio engine implement the trait.

use crate::buffer::{AudioBuffer, SharedBuffer};
use crate::error::{ContextError, DecodeError};
use crate::patch::Value;

/// Handle to a primitive owned by an [`AudioContext`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct PrimitiveId(pub u32);

/// The primitive kinds a context can create.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PrimitiveKind {
    Oscillator,
    Gain,
    BiquadFilter,
    StereoPanner,
    BufferSource,
    Streamer,
    Destination,
}

impl PrimitiveKind {
    /// Sources need an explicit `start`/`stop`; everything else runs whenever
    /// it is connected.
    pub fn is_source(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Oscillator | PrimitiveKind::BufferSource | PrimitiveKind::Streamer
        )
    }
}

/// A handle to an audio engine that can host primitives.
///
/// Methods take `&self`: a context is a shared, process-wide object and
/// implementations use interior mutability. Times are in seconds on the
/// context's own clock ([`current_time`](Self::current_time)).
pub trait AudioContext {
    fn current_time(&self) -> f64;

    fn sample_rate(&self) -> u32;

    /// The terminal sink. Always exists, is never created or disconnected by
    /// the compiler.
    fn destination(&self) -> PrimitiveId;

    fn create(&self, kind: PrimitiveKind) -> Result<PrimitiveId, ContextError>;

    /// Whether `name` is a continuously-controllable parameter of `id` (one
    /// that accepts smoothed automation and routed control signals).
    fn has_param(&self, id: PrimitiveId, name: &str) -> bool;

    fn param_value(&self, id: PrimitiveId, name: &str) -> Option<f32>;

    /// Sets a parameter immediately, cancelling any pending automation.
    fn set_param_value(&self, id: PrimitiveId, name: &str, value: f32) -> Result<(), ContextError>;

    /// Exponentially approaches `target` from `start_time` on, with the given
    /// time constant in seconds.
    fn set_target_at_time(
        &self,
        id: PrimitiveId,
        name: &str,
        target: f32,
        start_time: f64,
        time_constant: f64,
    ) -> Result<(), ContextError>;

    /// Discrete (non-parameter) properties, such as an oscillator's waveform.
    fn property(&self, id: PrimitiveId, name: &str) -> Option<Value>;

    fn set_property(&self, id: PrimitiveId, name: &str, value: Value) -> Result<(), ContextError>;

    fn set_buffer(&self, id: PrimitiveId, buffer: SharedBuffer) -> Result<(), ContextError>;

    fn buffer(&self, id: PrimitiveId) -> Option<SharedBuffer>;

    /// Audio-rate routing: `from`'s output is summed into `to`'s input.
    fn connect(&self, from: PrimitiveId, to: PrimitiveId) -> Result<(), ContextError>;

    /// Control-rate routing: `from`'s output modulates parameter `param` of `to`.
    fn connect_param(&self, from: PrimitiveId, to: PrimitiveId, param: &str) -> Result<(), ContextError>;

    /// Removes every outgoing connection of `id`.
    fn disconnect(&self, id: PrimitiveId) -> Result<(), ContextError>;

    fn start(&self, id: PrimitiveId, when: f64) -> Result<(), ContextError>;

    fn stop(&self, id: PrimitiveId, when: f64) -> Result<(), ContextError>;

    fn decode_audio_data(&self, bytes: &[u8]) -> Result<AudioBuffer, DecodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_generators_are_sources() {
        assert!(PrimitiveKind::Oscillator.is_source());
        assert!(PrimitiveKind::BufferSource.is_source());
        assert!(PrimitiveKind::Streamer.is_source());
        assert!(!PrimitiveKind::Gain.is_source());
        assert!(!PrimitiveKind::Destination.is_source());
    }
}
