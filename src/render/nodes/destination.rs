//! Terminal sink

use crate::context::PrimitiveKind;
use crate::render::node::{Block, Bus, Process, ProcessContext};
use crate::render::param::ParamSet;

/// Sums everything routed into it; its output is the context's output.
#[derive(Default)]
pub struct Destination {
    params: ParamSet,
}

impl Destination {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Process for Destination {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Destination
    }

    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    fn process(&mut self, _ctx: &ProcessContext, input: &Bus, _params: &[Block], out: &mut Bus) {
        *out = *input;
    }
}
