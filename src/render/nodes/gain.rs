//! Gain/volume control effect

use crate::context::PrimitiveKind;
use crate::render::node::{Block, Bus, Process, ProcessContext};
use crate::render::param::{Param, ParamSet};

/// Scales both channels by the `gain` parameter, sample by sample.
pub struct Gain {
    params: ParamSet,
}

impl Gain {
    pub fn new() -> Self {
        Self {
            params: ParamSet::new().with("gain", Param::new(1.0)),
        }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for Gain {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Gain
    }

    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    fn process(&mut self, _ctx: &ProcessContext, input: &Bus, params: &[Block], out: &mut Bus) {
        let gain = &params[0];
        for (out_ch, in_ch) in out.iter_mut().zip(input) {
            for ((o, &s), &g) in out_ch.iter_mut().zip(in_ch).zip(gain) {
                *o = s * g;
            }
        }
    }
}
