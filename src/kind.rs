//! Per-kind instantiation.
//!
//! Each instantiable node type carries one [`NodeKind`] variant in its
//! registry descriptor. Adding a node kind means adding a variant and its
//! [`Instantiate`] impl; the compiler only ever talks to the trait.

use tracing::trace;

use crate::context::{AudioContext, PrimitiveId, PrimitiveKind};
use crate::error::ContextError;
use crate::patch::NodeData;

/// Data key a buffer source reads its sample identifier from.
pub const SAMPLE_KEY: &str = "sample";

/// Turns a graph node into a runtime primitive.
#[enum_delegate::register]
pub trait Instantiate {
    /// The primitive this kind instantiates.
    fn primitive(&self) -> PrimitiveKind;

    /// Creates the primitive and applies `data` to it.
    fn instantiate(&self, ctx: &dyn AudioContext, data: &NodeData) -> Result<PrimitiveId, ContextError> {
        let id = ctx.create(self.primitive())?;
        apply_data(ctx, id, data);
        Ok(id)
    }

    /// Whether the node's `sample` must be resolved through the buffer loader.
    fn loads_sample(&self) -> bool {
        false
    }
}

/// Applies node data to a fresh primitive: numbers on continuous parameters
/// are set directly, everything else goes through the property setter.
/// Keys the primitive does not know are ignored.
pub fn apply_data(ctx: &dyn AudioContext, id: PrimitiveId, data: &NodeData) {
    for (key, value) in data {
        if key == SAMPLE_KEY {
            continue;
        }

        let result = if ctx.has_param(id, key) {
            match value.as_number() {
                Some(n) => ctx.set_param_value(id, key, n as f32),
                None => {
                    trace!(?id, %key, %value, "non-numeric value for parameter, skipped");
                    continue;
                }
            }
        } else {
            ctx.set_property(id, key, value.clone())
        };

        match result {
            Ok(()) => trace!(?id, %key, %value, "applied"),
            Err(e) => trace!(?id, %key, %value, error = %e, "not applied"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Oscillator;

impl Instantiate for Oscillator {
    fn primitive(&self) -> PrimitiveKind {
        PrimitiveKind::Oscillator
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Gain;

impl Instantiate for Gain {
    fn primitive(&self) -> PrimitiveKind {
        PrimitiveKind::Gain
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BiquadFilter;

impl Instantiate for BiquadFilter {
    fn primitive(&self) -> PrimitiveKind {
        PrimitiveKind::BiquadFilter
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StereoPanner;

impl Instantiate for StereoPanner {
    fn primitive(&self) -> PrimitiveKind {
        PrimitiveKind::StereoPanner
    }
}

/// Plays a decoded sample; the buffer is attached by the compiler once loaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferSource;

impl Instantiate for BufferSource {
    fn primitive(&self) -> PrimitiveKind {
        PrimitiveKind::BufferSource
    }

    fn loads_sample(&self) -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Streamer;

impl Instantiate for Streamer {
    fn primitive(&self) -> PrimitiveKind {
        PrimitiveKind::Streamer
    }
}

/// The context's own sink. Never created, only looked up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Destination;

impl Instantiate for Destination {
    fn primitive(&self) -> PrimitiveKind {
        PrimitiveKind::Destination
    }

    fn instantiate(&self, ctx: &dyn AudioContext, _data: &NodeData) -> Result<PrimitiveId, ContextError> {
        Ok(ctx.destination())
    }
}

/// Every instantiable node kind.
#[enum_delegate::implement(Instantiate)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Oscillator(Oscillator),
    Gain(Gain),
    BiquadFilter(BiquadFilter),
    StereoPanner(StereoPanner),
    BufferSource(BufferSource),
    Streamer(Streamer),
    Destination(Destination),
}
