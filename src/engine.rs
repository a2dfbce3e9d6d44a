// src/engine.rs
// 分析线程: 等待标记覆盖 -> 周期性地对齐、分段、平均、分类
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use crate::analysis::{
    align_markers, average_by_class, classify_trials, segment_trials, trial_len, AnalysisError,
    Classification, RecordedData,
};
use crate::config::{RuntimeSettings, SettingsHandle};
use crate::recorder;
use crate::types::*;

/// Wait between coverage checks.
pub const COVERAGE_RETRY: Duration = Duration::from_secs(2);
/// Newest markers left out of the coverage check; their samples may still be in flight.
pub const UNSETTLED_MARKERS: usize = 20;

/// Shared stop signal. Waiting on it returns early once it fires.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps up to `timeout`; returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut cancelled = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = cvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *cancelled
    }
}

// 分析结果的输出队列
#[derive(Clone)]
pub struct EngineOutputs {
    pub waveform: Sender<WaveformFrame>,
    pub axis: Sender<AxisLimits>,
    pub console: Sender<ConsoleMessage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    WaitingForCoverage,
    Running,
}

/// Result of one pipeline pass.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub frame: WaveformFrame,
    pub classification: Classification,
    pub trial_count: usize,
    pub sample_count: usize,
}

pub struct AnalysisEngine {
    store: Arc<RecordedData>,
    settings: SettingsHandle,
    class_count: usize,
    outputs: EngineOutputs,
    cancel: CancellationToken,
    state: EngineState,
    last_limits: Option<AxisLimits>,
    cycle: u64,
}

impl AnalysisEngine {
    /// `class_count` is rows x cols of the speller grid.
    pub fn new(
        store: Arc<RecordedData>,
        settings: SettingsHandle,
        class_count: usize,
        outputs: EngineOutputs,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            settings,
            class_count,
            outputs,
            cancel,
            state: EngineState::WaitingForCoverage,
            last_limits: None,
            cycle: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Distinct stimulus classes among the settled markers.
    pub fn coverage(&self) -> usize {
        self.store
            .settled_markers(UNSETTLED_MARKERS)
            .into_iter()
            .filter(|&id| id != 0)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// One pass of align, segment, average and classify over a fresh snapshot.
    pub fn run_cycle(&self, settings: &RuntimeSettings) -> Result<CycleReport, AnalysisError> {
        let snapshot = self.store.snapshot();
        let sample_rate_hz = snapshot.sample_rate_hz.ok_or(AnalysisError::NotConfigured)?;
        let alignment = align_markers(
            &snapshot.markers,
            &snapshot.marker_timestamps,
            &snapshot.sample_timestamps,
        )?;
        let trials = segment_trials(snapshot.samples.view(), &alignment, trial_len(sample_rate_hz));
        let averages = average_by_class(&trials, settings.squared);
        let waveforms = averages.channel(settings.selected_channel)?;
        let classification = classify_trials(&trials, settings.selected_channel, sample_rate_hz)?;
        Ok(CycleReport {
            frame: WaveformFrame {
                class_ids: averages.class_ids,
                trial_counts: averages.trial_counts,
                channel: settings.selected_channel,
                sample_rate_hz,
                squared: settings.squared,
                waveforms,
            },
            classification,
            trial_count: trials.len(),
            sample_count: snapshot.sample_count,
        })
    }

    /// Advances the state machine once and returns how long to wait before the next step.
    pub fn step(&mut self) -> Duration {
        match self.state {
            EngineState::WaitingForCoverage => {
                let seen = self.coverage();
                if seen >= self.class_count {
                    info!("all {} classes seen, starting analysis", self.class_count);
                    self.state = EngineState::Running;
                    return Duration::ZERO;
                }
                debug!("coverage {seen}/{}", self.class_count);
                self.log("Not all markers were sent yet, waiting two seconds and then retrying".into());
                COVERAGE_RETRY
            }
            EngineState::Running => {
                // 每个周期读取一次设置快照
                let settings = self.settings.snapshot();
                self.cycle += 1;
                match self.run_cycle(&settings) {
                    Ok(report) => self.publish(report, &settings),
                    Err(e) => {
                        warn!("analysis cycle {} failed: {e}", self.cycle);
                        self.log(format!("Analysis cycle {} failed: {e}", self.cycle));
                    }
                }
                Duration::try_from_secs_f64(settings.update_interval_s).unwrap_or(COVERAGE_RETRY)
            }
        }
    }

    fn publish(&mut self, report: CycleReport, settings: &RuntimeSettings) {
        if self.last_limits != Some(settings.y_limits) {
            debug!("axis limits now {:?}", settings.y_limits);
            self.outputs.axis.send(settings.y_limits).ok();
            self.last_limits = Some(settings.y_limits);
        }
        let winner = report
            .classification
            .winner()
            .map_or_else(|| "None".to_owned(), |id| id.to_string());
        let line = format!(
            "cycle {}: {} samples ({} recorded), {} trials. Current classification: {winner}",
            self.cycle,
            report.sample_count,
            recorded_time(report.sample_count, report.frame.sample_rate_hz),
            report.trial_count,
        );
        info!("{line}");
        self.outputs.waveform.send(report.frame).ok();
        self.outputs
            .console
            .send(ConsoleMessage::Classification(report.classification))
            .ok();
        self.log(line);
    }

    fn log(&self, line: String) {
        self.outputs.console.send(ConsoleMessage::Log(line)).ok();
    }

    pub fn run(mut self) {
        info!("analysis loop started, waiting for {} classes", self.class_count);
        while !self.cancel.is_cancelled() {
            let wait = self.step();
            if self.cancel.wait_timeout(wait) {
                break;
            }
        }
        info!("analysis loop stopped after {} cycles", self.cycle);
    }
}

/// "mm:ss minutes" of signal for `samples` at `sample_rate_hz`.
pub fn recorded_time(samples: usize, sample_rate_hz: f64) -> String {
    let seconds = if sample_rate_hz > 0.0 {
        (samples as f64 / sample_rate_hz) as u64
    } else {
        0
    };
    format!("{:02}:{:02} minutes", seconds / 60, seconds % 60)
}

pub fn spawn_thread(engine: AnalysisEngine) -> JoinHandle<()> {
    thread::spawn(move || engine.run())
}

/// Applies control commands until `Shutdown` arrives or the sender hangs up.
pub fn spawn_control(
    rx_cmd: Receiver<ControlCommand>,
    settings: SettingsHandle,
    store: Arc<RecordedData>,
    recording_dir: PathBuf,
    console: Sender<ConsoleMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for cmd in rx_cmd.iter() {
            debug!("control: {cmd:?}");
            match cmd {
                ControlCommand::SetUpdateInterval(seconds) if seconds.is_finite() && seconds > 0.0 => {
                    settings.update(|s| s.update_interval_s = seconds);
                }
                ControlCommand::SetUpdateInterval(seconds) => {
                    warn!("ignoring update interval {seconds}");
                }
                ControlCommand::SelectChannel(channel) => {
                    settings.update(|s| s.selected_channel = channel);
                }
                ControlCommand::SetYLimits(limits) => {
                    settings.update(|s| s.y_limits = limits);
                }
                ControlCommand::SetSquared(squared) => {
                    settings.update(|s| s.squared = squared);
                }
                ControlCommand::Save(name) => {
                    let line = match recorder::save_recording(&store, &recording_dir, &name) {
                        Ok(summary) => summary.to_string(),
                        Err(e) => {
                            warn!("saving '{name}' failed: {e}");
                            format!("Saving '{name}' failed: {e}")
                        }
                    };
                    console.send(ConsoleMessage::Log(line)).ok();
                }
                ControlCommand::Shutdown => {
                    info!("shutdown requested");
                    cancel.cancel();
                    break;
                }
            }
        }
    })
}
