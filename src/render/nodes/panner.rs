//! Equal-power stereo panner

use core::f32::consts::FRAC_PI_2;

use crate::context::PrimitiveKind;
use crate::render::node::{Block, Bus, Process, ProcessContext};
use crate::render::param::{Param, ParamSet};

/// Positions a stereo signal with `pan` in `[-1, 1]`.
pub struct StereoPanner {
    params: ParamSet,
}

impl StereoPanner {
    pub fn new() -> Self {
        Self {
            params: ParamSet::new().with("pan", Param::new(0.0).with_range(-1.0, 1.0)),
        }
    }
}

impl Default for StereoPanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for StereoPanner {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::StereoPanner
    }

    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    fn process(&mut self, _ctx: &ProcessContext, input: &Bus, params: &[Block], out: &mut Bus) {
        let [in_l, in_r] = input;
        for (i, &pan) in params[0].iter().enumerate() {
            let (l, r) = (in_l[i], in_r[i]);
            if pan <= 0.0 {
                let x = (pan + 1.0) * FRAC_PI_2;
                out[0][i] = l + r * x.cos();
                out[1][i] = r * x.sin();
            } else {
                let x = pan * FRAC_PI_2;
                out[0][i] = l * x.cos();
                out[1][i] = r + l * x.sin();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::node::{BLOCK, SILENCE};

    fn pan(value: f32) -> Bus {
        let mut panner = StereoPanner::new();
        let input = [[1.0; BLOCK], [1.0; BLOCK]];
        let mut out = SILENCE;
        panner.process(&ProcessContext::new(48_000, 0), &input, &[[value; BLOCK]], &mut out);
        out
    }

    #[test]
    fn hard_left_and_right() {
        let left = pan(-1.0);
        assert!((left[0][0] - 2.0).abs() < 1e-6);
        assert!(left[1][0].abs() < 1e-6);

        let right = pan(1.0);
        assert!(right[0][0].abs() < 1e-6);
        assert!((right[1][0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn centre_passes_through() {
        let centre = pan(0.0);
        assert!((centre[0][0] - 1.0).abs() < 1e-6);
        assert!((centre[1][0] - 1.0).abs() < 1e-6);
    }
}
