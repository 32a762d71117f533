//! Decoded sample player

use crate::buffer::SharedBuffer;
use crate::context::PrimitiveKind;
use crate::patch::Value;
use crate::render::node::{Block, Bus, Process, ProcessContext, PropertyError};
use crate::render::param::{Param, ParamSet};

/// Plays an attached [`AudioBuffer`](crate::AudioBuffer) once, or looping.
///
/// The buffer is resampled to the context rate with linear interpolation;
/// `playbackRate` scales the read speed on top of that.
pub struct BufferSource {
    params: ParamSet,
    buffer: Option<SharedBuffer>,
    looping: bool,
    /// Read position in buffer frames.
    position: f64,
}

impl BufferSource {
    pub fn new() -> Self {
        Self {
            params: ParamSet::new().with("playbackRate", Param::new(1.0).with_range(0.0, 64.0)),
            buffer: None,
            looping: false,
            position: 0.0,
        }
    }

    #[inline]
    pub fn position(&self) -> f64 {
        self.position
    }
}

impl Default for BufferSource {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn lerp(samples: &[f32], index: usize, frac: f32, looping: bool) -> f32 {
    let a = samples[index];
    let b = match samples.get(index + 1) {
        Some(&b) => b,
        None if looping => samples[0],
        None => 0.0,
    };
    a + (b - a) * frac
}

impl Process for BufferSource {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::BufferSource
    }

    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    fn property(&self, name: &str) -> Option<Value> {
        (name == "loop").then(|| Value::Number(if self.looping { 1.0 } else { 0.0 }))
    }

    fn set_property(&mut self, name: &str, value: &Value) -> Result<(), PropertyError> {
        if name != "loop" {
            return Err(PropertyError::Unknown);
        }
        self.looping = match value {
            Value::Text(t) if t == "true" => true,
            Value::Text(t) if t == "false" => false,
            other => other
                .as_number()
                .map(|n| n != 0.0)
                .ok_or_else(|| PropertyError::Invalid(format!("not a boolean: {other}")))?,
        };
        Ok(())
    }

    fn set_buffer(&mut self, buffer: SharedBuffer) -> bool {
        self.buffer = Some(buffer);
        self.position = 0.0;
        true
    }

    fn buffer(&self) -> Option<SharedBuffer> {
        self.buffer.clone()
    }

    fn finished(&self) -> bool {
        match &self.buffer {
            Some(buffer) => !self.looping && self.position >= buffer.len() as f64,
            None => false,
        }
    }

    fn process(&mut self, ctx: &ProcessContext, _input: &Bus, params: &[Block], out: &mut Bus) {
        let Some(buffer) = &self.buffer else {
            return;
        };
        let len = buffer.len();
        if len == 0 {
            return;
        }

        let left = buffer.channel(0).unwrap_or_default();
        let right = buffer.channel(1).unwrap_or(left);
        let step = buffer.sample_rate() as f64 / ctx.sample_rate as f64;
        let (from, to) = ctx.active;

        for i in from..to {
            if self.position >= len as f64 {
                if !self.looping {
                    break;
                }
                self.position %= len as f64;
            }

            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            out[0][i] = lerp(left, index, frac, self.looping);
            out[1][i] = lerp(right, index, frac, self.looping);

            self.position += step * params[0][i] as f64;
        }
    }
}
