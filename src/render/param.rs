//! Automatable parameters.

use super::node::{Block, ProcessContext, BLOCK};

/// Pending exponential approach towards `value`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Target {
    value: f32,
    start_time: f64,
    time_constant: f64,
}

/// A continuously-controllable parameter.
///
/// Holds an intrinsic value that is either set directly or approached
/// exponentially after a scheduled start time. Routed control signals are
/// summed on top by the graph; they never change the intrinsic value.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    value: f32,
    target: Option<Target>,
    min: f32,
    max: f32,
}

impl Param {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            target: None,
            min: f32::MIN,
            max: f32::MAX,
        }
    }

    /// Limits the effective (automation + control) value.
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Sets the value now, dropping any pending approach.
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
        self.target = None;
    }

    pub fn set_target_at_time(&mut self, value: f32, start_time: f64, time_constant: f64) {
        self.target = Some(Target {
            value,
            start_time,
            time_constant,
        });
    }

    /// Writes one block of intrinsic values into `out`, advancing automation.
    pub fn fill(&mut self, ctx: &ProcessContext, out: &mut Block) {
        let Some(target) = self.target else {
            out.fill(self.value);
            return;
        };

        // per-sample smoothing coefficient for the time constant
        let coeff = if target.time_constant > 0.0 {
            1.0 - (-1.0 / (target.time_constant * ctx.sample_rate as f64)).exp() as f32
        } else {
            1.0
        };

        for (i, sample) in out.iter_mut().enumerate() {
            if ctx.time_at(i) >= target.start_time {
                self.value += (target.value - self.value) * coeff;
            }
            *sample = self.value;
        }

        let settled = (target.value - self.value).abs() <= 1e-5 * target.value.abs().max(1.0);
        if settled && ctx.time_at(BLOCK - 1) >= target.start_time {
            self.value = target.value;
            self.target = None;
        }
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

/// The named parameters of one primitive, in a fixed order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamSet {
    entries: Vec<(&'static str, Param)>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, param: Param) -> Self {
        self.entries.push((name, param));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a runtime name to the parameter's static name.
    pub fn name_of(&self, name: &str) -> Option<&'static str> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(n, _)| *n)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| *n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, p)| p)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.entries
            .iter_mut()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| p)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&'static str, &mut Param)> {
        self.entries.iter_mut().map(|(n, p)| (*n, p))
    }
}
