//! Second-order IIR filter

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz};
use tracing::trace;

use crate::context::PrimitiveKind;
use crate::patch::Value;
use crate::render::node::{Block, Bus, Process, ProcessContext, PropertyError};
use crate::render::param::{Param, ParamSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Allpass,
    Peaking,
    Lowshelf,
    Highshelf,
}

impl FilterType {
    pub fn name(self) -> &'static str {
        match self {
            FilterType::Lowpass => "lowpass",
            FilterType::Highpass => "highpass",
            FilterType::Bandpass => "bandpass",
            FilterType::Notch => "notch",
            FilterType::Allpass => "allpass",
            FilterType::Peaking => "peaking",
            FilterType::Lowshelf => "lowshelf",
            FilterType::Highshelf => "highshelf",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "lowpass" => FilterType::Lowpass,
            "highpass" => FilterType::Highpass,
            "bandpass" => FilterType::Bandpass,
            "notch" => FilterType::Notch,
            "allpass" => FilterType::Allpass,
            "peaking" => FilterType::Peaking,
            "lowshelf" => FilterType::Lowshelf,
            "highshelf" => FilterType::Highshelf,
            _ => return None,
        })
    }

    fn design(self, gain_db: f32) -> biquad::Type<f32> {
        match self {
            FilterType::Lowpass => biquad::Type::LowPass,
            FilterType::Highpass => biquad::Type::HighPass,
            FilterType::Bandpass => biquad::Type::BandPass,
            FilterType::Notch => biquad::Type::Notch,
            FilterType::Allpass => biquad::Type::AllPass,
            FilterType::Peaking => biquad::Type::PeakingEQ(gain_db),
            FilterType::Lowshelf => biquad::Type::LowShelf(gain_db),
            FilterType::Highshelf => biquad::Type::HighShelf(gain_db),
        }
    }
}

const FREQUENCY: usize = 0;
const Q: usize = 1;
const GAIN: usize = 2;

/// Stereo biquad with `frequency`, `Q` and `gain` (dB, shelving and peaking
/// only). Coefficients are recomputed at block rate when a parameter moves.
pub struct BiquadFilter {
    params: ParamSet,
    filter_type: FilterType,
    sample_rate: f32,
    filters: [DirectForm2Transposed<f32>; 2],
    /// (frequency, Q, gain) the current coefficients were designed for.
    designed: Option<(f32, f32, f32)>,
}

impl BiquadFilter {
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        let coeffs = Coefficients::<f32>::from_params(
            biquad::Type::LowPass,
            sample_rate.hz(),
            350.0_f32.hz(),
            1.0,
        )
        .unwrap_or(PASSTHROUGH);

        Self {
            params: ParamSet::new()
                .with("frequency", Param::new(350.0).with_range(0.0, sample_rate / 2.0))
                .with("Q", Param::new(1.0).with_range(0.0001, 1000.0))
                .with("gain", Param::new(0.0).with_range(-40.0, 40.0)),
            filter_type: FilterType::Lowpass,
            sample_rate,
            filters: [
                DirectForm2Transposed::<f32>::new(coeffs),
                DirectForm2Transposed::<f32>::new(coeffs),
            ],
            designed: None,
        }
    }

    fn redesign(&mut self, frequency: f32, q: f32, gain: f32) {
        if self.designed == Some((frequency, q, gain)) {
            return;
        }
        // biquad rejects f0 at or above Nyquist
        let f0 = frequency.clamp(1.0, self.sample_rate * 0.499);
        match Coefficients::<f32>::from_params(
            self.filter_type.design(gain),
            self.sample_rate.hz(),
            f0.hz(),
            q,
        ) {
            Ok(coeffs) => {
                for filter in &mut self.filters {
                    filter.update_coefficients(coeffs);
                }
            }
            Err(e) => trace!(?e, frequency, q, "filter coefficients rejected"),
        }
        self.designed = Some((frequency, q, gain));
    }
}

const PASSTHROUGH: Coefficients<f32> = Coefficients {
    a1: 0.0,
    a2: 0.0,
    b0: 1.0,
    b1: 0.0,
    b2: 0.0,
};

impl Process for BiquadFilter {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::BiquadFilter
    }

    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    fn property(&self, name: &str) -> Option<Value> {
        (name == "type").then(|| Value::from(self.filter_type.name()))
    }

    fn set_property(&mut self, name: &str, value: &Value) -> Result<(), PropertyError> {
        if name != "type" {
            return Err(PropertyError::Unknown);
        }
        let text = value.as_text().unwrap_or_default();
        self.filter_type = FilterType::from_name(text)
            .ok_or_else(|| PropertyError::Invalid(format!("unknown filter type {text:?}")))?;
        self.designed = None;
        Ok(())
    }

    fn process(&mut self, _ctx: &ProcessContext, input: &Bus, params: &[Block], out: &mut Bus) {
        self.redesign(params[FREQUENCY][0], params[Q][0], params[GAIN][0]);

        for ((filter, in_ch), out_ch) in self.filters.iter_mut().zip(input).zip(out.iter_mut()) {
            for (o, &s) in out_ch.iter_mut().zip(in_ch) {
                *o = filter.run(s);
            }
        }
    }
}
