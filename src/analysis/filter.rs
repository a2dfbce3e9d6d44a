use std::f64::consts::PI;
use ndarray::{Array2, ArrayView2};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use crate::analysis::AnalysisError;
/// Band-pass design parameters for the ingestion filter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandpassSettings {
    /// Order of the Butterworth low-pass prototype.
    pub order: usize,
    pub low_hz: f64,
    pub high_hz: f64,
}
impl Default for BandpassSettings {
    fn default() -> Self {
        Self {
            order: 4,
            low_hz: 1.0,
            high_hz: 30.0,
        }
    }
}
#[derive(Clone, Copy, Debug, PartialEq)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}
#[derive(Clone, Copy, Debug, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}
impl BiquadState {
    fn process(&mut self, coeffs: &BiquadCoeffs, input: f64) -> f64 {
        // Transposed direct form II
        let y = coeffs.b0 * input + self.z1;
        self.z1 = coeffs.b1 * input - coeffs.a1 * y + self.z2;
        self.z2 = coeffs.b2 * input - coeffs.a2 * y;
        y
    }
}
/// Causal Butterworth band-pass applied independently to every channel.
///
/// The delay line of every section survives between calls, so feeding a
/// signal chunk by chunk yields exactly what a single call over the whole
/// signal would.
#[derive(Clone, Debug)]
pub struct StreamingBandpass {
    sections: Vec<BiquadCoeffs>,
    // channel -> section -> state
    delay: Vec<Vec<BiquadState>>,
}
impl StreamingBandpass {
    pub fn new(
        sample_rate_hz: f64,
        channel_count: usize,
        settings: BandpassSettings,
    ) -> Result<Self, AnalysisError> {
        let sections = design_bandpass(sample_rate_hz, settings)?;
        let delay = (0..channel_count)
            .map(|_| vec![BiquadState::default(); sections.len()])
            .collect();
        Ok(Self { sections, delay })
    }
    pub fn channel_count(&self) -> usize {
        self.delay.len()
    }
    /// Number of second-order sections in the cascade.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }
    pub fn filter_sample(&mut self, sample: &[f64]) -> Result<Vec<f64>, AnalysisError> {
        if sample.len() != self.delay.len() {
            return Err(AnalysisError::ChannelMismatch {
                expected: self.delay.len(),
                actual: sample.len(),
            });
        }
        Ok(sample
            .iter()
            .zip(self.delay.iter_mut())
            .map(|(&value, states)| run_cascade(&self.sections, states, value))
            .collect())
    }
    /// Filters a chunk shaped samples x channels.
    pub fn filter_chunk(&mut self, chunk: ArrayView2<f64>) -> Result<Array2<f64>, AnalysisError> {
        if chunk.ncols() != self.delay.len() {
            return Err(AnalysisError::ChannelMismatch {
                expected: self.delay.len(),
                actual: chunk.ncols(),
            });
        }
        let mut out = chunk.to_owned();
        for (mut column, states) in out.columns_mut().into_iter().zip(self.delay.iter_mut()) {
            for value in column.iter_mut() {
                *value = run_cascade(&self.sections, states, *value);
            }
        }
        Ok(out)
    }
}
fn run_cascade(sections: &[BiquadCoeffs], states: &mut [BiquadState], mut value: f64) -> f64 {
    for (coeffs, state) in sections.iter().zip(states.iter_mut()) {
        value = state.process(coeffs, value);
    }
    value
}
/// Digital Butterworth band-pass as second-order sections.
///
/// Analog prototype poles are moved to the band around the prewarped edges,
/// then mapped through the bilinear transform. The prototype zeros end up as
/// `order` zeros at z = 1 and `order` zeros at z = -1, so every section gets
/// the numerator `1 - z^-2` and the overall gain lands on the first one.
fn design_bandpass(
    sample_rate_hz: f64,
    settings: BandpassSettings,
) -> Result<Vec<BiquadCoeffs>, AnalysisError> {
    let BandpassSettings {
        order,
        low_hz,
        high_hz,
    } = settings;
    if !(sample_rate_hz > 0.0) {
        return Err(AnalysisError::InvalidSampleRate(sample_rate_hz));
    }
    let nyquist = sample_rate_hz / 2.0;
    if order == 0 || !(low_hz > 0.0) || !(high_hz > low_hz) || !(high_hz < nyquist) {
        return Err(AnalysisError::InvalidCutoff {
            low: low_hz,
            high: high_hz,
            sample_rate: sample_rate_hz,
        });
    }
    let fs2 = 2.0 * sample_rate_hz;
    let w_low = fs2 * (PI * low_hz / sample_rate_hz).tan();
    let w_high = fs2 * (PI * high_hz / sample_rate_hz).tan();
    let bandwidth = w_high - w_low;
    let w0_sq = w_low * w_high;
    let mut analog = Vec::with_capacity(2 * order);
    for k in 0..order {
        let angle = PI * (2 * k + 1 + order) as f64 / (2 * order) as f64;
        let prototype = Complex64::from_polar(1.0, angle);
        let half = prototype * (bandwidth / 2.0);
        let spread = (half * half - w0_sq).sqrt();
        analog.push(half + spread);
        analog.push(half - spread);
    }
    let fs2_c = Complex64::new(fs2, 0.0);
    let denominator = analog
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, p| acc * (fs2_c - p));
    let gain = (bandwidth * fs2).powi(order as i32) / denominator.re;
    let mut conjugate_pairs = Vec::new();
    let mut real_poles = Vec::new();
    for p in &analog {
        let z = (fs2_c + p) / (fs2_c - p);
        if z.im.abs() <= 1e-12 {
            real_poles.push(z.re);
        } else if z.im > 0.0 {
            conjugate_pairs.push(z);
        }
    }
    let mut sections: Vec<BiquadCoeffs> = conjugate_pairs
        .iter()
        .map(|z| section(-2.0 * z.re, z.norm_sqr()))
        .collect();
    for pair in real_poles.chunks(2) {
        match pair {
            [r1, r2] => sections.push(section(-(r1 + r2), r1 * r2)),
            [r] => sections.push(section(-r, 0.0)),
            _ => {}
        }
    }
    if let Some(first) = sections.first_mut() {
        first.b0 *= gain;
        first.b1 *= gain;
        first.b2 *= gain;
    }
    Ok(sections)
}
fn section(a1: f64, a2: f64) -> BiquadCoeffs {
    BiquadCoeffs {
        b0: 1.0,
        b1: 0.0,
        b2: -1.0,
        a1,
        a2,
    }
}
