// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use crate::analysis::BandpassSettings;
use crate::types::AxisLimits;

// 数据流参数 (来自流的元数据)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub sample_rate_hz: f64,
    pub channel_count: usize,
    pub rows: usize,
    pub cols: usize,
    /// 0 = single cells, 1 = rows and columns.
    pub flash_mode: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 250.0,
            channel_count: 8,
            rows: 2,
            cols: 3,
            flash_mode: 0,
        }
    }
}

impl StreamConfig {
    /// Distinct classes that must be seen before analysis starts.
    pub fn class_count(&self) -> usize {
        self.rows * self.cols
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub bandpass: BandpassSettings,
}

impl FilterConfig {
    pub fn settings(&self) -> Option<BandpassSettings> {
        self.enabled.then_some(self.bandpass)
    }
}

// 运行时可修改的参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub update_interval_s: f64,
    pub selected_channel: usize,
    pub y_limits: AxisLimits,
    pub squared: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            update_interval_s: 3.0,
            selected_channel: 0,
            y_limits: AxisLimits::default(),
            squared: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub recording_dir: PathBuf,
    pub plot_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            recording_dir: PathBuf::from("recordings"),
            plot_path: PathBuf::from("class_averages.png"),
        }
    }
}

// 模拟数据源参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub target_class: u32,
    /// Peak of the evoked deflection in volts.
    pub p300_amplitude: f64,
    /// Standard deviation of the background noise in volts.
    pub noise: f64,
    pub marker_spacing_s: f64,
    pub seed: u64,
    /// Seconds of signal to play back; 0 runs until shutdown.
    pub run_time_s: f64,
    pub realtime: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            target_class: 1,
            p300_amplitude: 8e-6,
            noise: 4e-6,
            marker_spacing_s: 0.25,
            seed: 42,
            run_time_s: 0.0,
            realtime: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub stream: StreamConfig,
    pub filter: FilterConfig,
    pub runtime: RuntimeSettings,
    pub output: OutputConfig,
    pub simulator: SimulatorConfig,
}

impl AnalyzerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to encode config")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, json).with_context(|| format!("failed to write config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.stream.sample_rate_hz > 0.0) {
            return Err(anyhow!("samplerate must be positive, got {}", self.stream.sample_rate_hz));
        }
        if self.stream.channel_count == 0 || self.stream.class_count() == 0 {
            return Err(anyhow!("channel count, rows and cols must all be non-zero"));
        }
        if self.runtime.selected_channel >= self.stream.channel_count {
            return Err(anyhow!(
                "selected channel {} out of range for {} channels",
                self.runtime.selected_channel,
                self.stream.channel_count
            ));
        }
        if !(self.runtime.update_interval_s > 0.0 && self.runtime.update_interval_s.is_finite()) {
            return Err(anyhow!(
                "update interval must be positive, got {}",
                self.runtime.update_interval_s
            ));
        }
        let sim = &self.simulator;
        if !(sim.marker_spacing_s > 0.0 && sim.marker_spacing_s.is_finite()) {
            return Err(anyhow!("marker spacing must be positive, got {}", sim.marker_spacing_s));
        }
        if sim.target_class == 0 || sim.target_class as usize > self.stream.class_count() {
            return Err(anyhow!(
                "target class {} outside 1..={}",
                sim.target_class,
                self.stream.class_count()
            ));
        }
        Ok(())
    }
}

/// Shared runtime settings. Writers replace the whole value, readers get a
/// consistent copy.
#[derive(Clone, Debug, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<RuntimeSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn snapshot(&self) -> RuntimeSettings {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn update(&self, change: impl FnOnce(&mut RuntimeSettings)) -> RuntimeSettings {
        let mut next = self.snapshot();
        change(&mut next);
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        next
    }
}
