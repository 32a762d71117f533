//! Periodic waveform oscillator

use crate::context::PrimitiveKind;
use crate::patch::Value;
use crate::render::node::{write_mono, Block, Bus, Process, ProcessContext, PropertyError};
use crate::render::param::{Param, ParamSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sine" => Some(Waveform::Sine),
            "square" => Some(Waveform::Square),
            "sawtooth" => Some(Waveform::Sawtooth),
            "triangle" => Some(Waveform::Triangle),
            _ => None,
        }
    }

    /// One sample at `phase` in `[0, 1)`.
    #[inline]
    fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * core::f32::consts::TAU).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

const FREQUENCY: usize = 0;
const DETUNE: usize = 1;

/// A mono oscillator with `frequency` (Hz) and `detune` (cents).
pub struct Oscillator {
    params: ParamSet,
    waveform: Waveform,
    phase: f32,
}

impl Oscillator {
    pub fn new() -> Self {
        Self {
            params: ParamSet::new()
                .with("frequency", Param::new(440.0))
                .with("detune", Param::new(0.0)),
            waveform: Waveform::Sine,
            phase: 0.0,
        }
    }

    #[inline]
    pub fn waveform(&self) -> Waveform {
        self.waveform
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for Oscillator {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Oscillator
    }

    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    fn property(&self, name: &str) -> Option<Value> {
        (name == "type").then(|| Value::from(self.waveform.name()))
    }

    fn set_property(&mut self, name: &str, value: &Value) -> Result<(), PropertyError> {
        if name != "type" {
            return Err(PropertyError::Unknown);
        }
        let text = value.as_text().unwrap_or_default();
        self.waveform = Waveform::from_name(text)
            .ok_or_else(|| PropertyError::Invalid(format!("unknown waveform {text:?}")))?;
        Ok(())
    }

    fn process(&mut self, ctx: &ProcessContext, _input: &Bus, params: &[Block], out: &mut Bus) {
        let rate = ctx.sample_rate as f32;
        let (from, to) = ctx.active;

        for i in from..to {
            write_mono(out, i, self.waveform.sample(self.phase));

            let frequency = params[FREQUENCY][i] * (params[DETUNE][i] / 1200.0).exp2();
            self.phase = (self.phase + frequency / rate).rem_euclid(1.0);
        }
    }
}
