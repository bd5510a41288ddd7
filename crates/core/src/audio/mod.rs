use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{Result, VizError};

const ONSET_GAIN: f32 = 12.0;
const LOW_BAND_HZ: f32 = 250.0;
const HIGH_BAND_HZ: f32 = 4_000.0;

/// Feature set extracted from one block of samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    /// Centre of the block in seconds since the extractor was created.
    pub time: f32,
    pub rms: f32,
    /// Normalised [0, 1] spectral centroid where 1.0 is the Nyquist frequency.
    pub spectral_centroid: f32,
    /// Share of spectral magnitude below 250 Hz.
    pub low_band_energy: f32,
    /// Share of spectral magnitude above 4 kHz.
    pub high_band_energy: f32,
    /// Rise in loudness relative to the previous block, clamped to [0, 1].
    pub onset: f32,
}

impl FeatureFrame {
    /// Looks a feature up by the name used in mapping descriptors.
    pub fn feature(&self, name: &str) -> Option<f32> {
        match name {
            "rms" => Some(self.rms),
            "spectral_centroid" => Some(self.spectral_centroid),
            "low_band_energy" => Some(self.low_band_energy),
            "high_band_energy" => Some(self.high_band_energy),
            "onset" => Some(self.onset),
            _ => None,
        }
    }
}

/// Turns raw sample blocks into [`FeatureFrame`]s. Runs on the audio
/// producer thread and never touches graphics state.
pub struct FeatureExtractor {
    sample_rate: u32,
    processed_samples: usize,
    last_rms: f32,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl FeatureExtractor {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            processed_samples: 0,
            last_rms: 0.0,
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn reset(&mut self) {
        self.processed_samples = 0;
        self.last_rms = 0.0;
    }

    pub fn process_block(&mut self, samples: &[f32]) -> Result<FeatureFrame> {
        if samples.len() < 2 {
            return Err(VizError::InvalidInput(
                "feature extraction requires blocks with at least two samples",
            ));
        }

        let sample_rate = self.sample_rate.max(1) as f32;
        let start = self.processed_samples as f32 / sample_rate;
        let end = (self.processed_samples + samples.len()) as f32 / sample_rate;

        let rms = compute_rms(samples);
        let onset = ((rms - self.last_rms).max(0.0) * ONSET_GAIN).clamp(0.0, 1.0);
        self.last_rms = rms;

        let spectrum = self.analyse_spectrum(samples)?;
        self.processed_samples += samples.len();

        Ok(FeatureFrame {
            time: start + (end - start) * 0.5,
            rms,
            spectral_centroid: spectrum.centroid,
            low_band_energy: spectrum.low,
            high_band_energy: spectrum.high,
            onset,
        })
    }

    fn analyse_spectrum(&mut self, samples: &[f32]) -> Result<SpectrumSummary> {
        let len = samples.len();
        let sample_rate = self.sample_rate.max(1) as f32;
        let fft = self.prepare_fft(len);

        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|err| VizError::msg(format!("spectrum analysis failed: {err}")))?;

        let bin_hz = sample_rate / len as f32;
        let mut total = 0.0;
        let mut weighted = 0.0;
        let mut low = 0.0;
        let mut high = 0.0;

        for (i, bin) in fft.spectrum.iter().enumerate() {
            let magnitude = bin.norm();
            let frequency = i as f32 * bin_hz;
            total += magnitude;
            weighted += magnitude * frequency;
            if frequency < LOW_BAND_HZ {
                low += magnitude;
            } else if frequency > HIGH_BAND_HZ {
                high += magnitude;
            }
        }

        if total <= f32::EPSILON {
            return Ok(SpectrumSummary::default());
        }

        let nyquist = sample_rate * 0.5;
        Ok(SpectrumSummary {
            centroid: (weighted / total / nyquist).clamp(0.0, 1.0),
            low: low / total,
            high: high / total,
        })
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        let planner = &mut self.fft_planner;
        let fft = self.fft.get_or_insert_with(|| FftResources::plan(planner, size));
        if fft.size != size {
            *fft = FftResources::plan(planner, size);
        }
        fft
    }
}

impl fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("sample_rate", &self.sample_rate)
            .field("processed_samples", &self.processed_samples)
            .field("fft_size", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

#[derive(Debug, Default)]
struct SpectrumSummary {
    centroid: f32,
    low: f32,
    high: f32,
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn plan(planner: &mut RealFftPlanner<f32>, size: usize) -> Self {
        let plan = planner.plan_fft_forward(size);
        Self {
            size,
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    }
}

fn compute_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

/// Sine test tone used when no capture backend is attached.
pub fn test_tone(sample_rate: u32, frequency: f32, amplitude: f32, offset: usize, len: usize) -> Vec<f32> {
    let sample_rate = sample_rate.max(1) as f32;
    (offset..offset + len)
        .map(|n| amplitude * (2.0 * PI * frequency * n as f32 / sample_rate).sin())
        .collect()
}
