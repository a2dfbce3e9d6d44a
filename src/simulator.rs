// src/simulator.rs
// 模拟 P300 范式: 连续 EEG + 刺激标记, 可以替代真实的数据流
use std::thread;
use std::time::{Duration, Instant};
use rand::{rngs::StdRng, Rng, SeedableRng};
use crate::analysis::{AnalysisError, RecordedData, StreamInlet};
use crate::config::{SimulatorConfig, StreamConfig};
use crate::types::StreamInfo;

const CLOCK_ORIGIN_S: f64 = 1000.0;
const P300_LATENCY_S: f64 = 0.3;
const P300_WIDTH_S: f64 = 0.05;
const ALPHA_HZ: f64 = 10.0;

// 标记时间表: 第 k 个标记的类别和时间
#[derive(Clone, Copy, Debug)]
struct MarkerSchedule {
    spacing_s: f64,
    class_count: u32,
    target_class: u32,
    amplitude: f64,
}

impl MarkerSchedule {
    fn class_at(&self, k: usize) -> u32 {
        (k as u32 % self.class_count) + 1
    }

    fn time_of(&self, k: usize) -> f64 {
        CLOCK_ORIGIN_S + (k as f64 + 1.0) * self.spacing_s
    }

    /// Sum of the evoked responses of all target markers in the second before `t`.
    fn evoked(&self, t: f64) -> f64 {
        let rel = t - CLOCK_ORIGIN_S - self.spacing_s;
        if rel < 0.0 {
            return 0.0;
        }
        let last = (rel / self.spacing_s).floor() as usize;
        let first = ((rel - 1.0) / self.spacing_s).ceil().max(0.0) as usize;
        (first..=last)
            .filter(|&k| self.class_at(k) == self.target_class)
            .map(|k| {
                let x = (t - self.time_of(k) - P300_LATENCY_S) / P300_WIDTH_S;
                self.amplitude * (-x * x).exp()
            })
            .sum()
    }
}

/// Deterministic synthetic recording of a speller session.
pub struct SyntheticParadigm {
    sample_rate_hz: f64,
    channel_count: usize,
    noise: f64,
    run_time_s: f64,
    realtime: bool,
    schedule: MarkerSchedule,
    rng: StdRng,
}

impl SyntheticParadigm {
    pub fn new(stream: &StreamConfig, sim: &SimulatorConfig) -> Self {
        Self {
            sample_rate_hz: stream.sample_rate_hz,
            channel_count: stream.channel_count,
            noise: sim.noise,
            run_time_s: sim.run_time_s,
            realtime: sim.realtime,
            schedule: MarkerSchedule {
                spacing_s: sim.marker_spacing_s,
                class_count: stream.class_count().max(1) as u32,
                target_class: sim.target_class,
                amplitude: sim.p300_amplitude,
            },
            rng: StdRng::seed_from_u64(sim.seed),
        }
    }

    fn timestamp(&self, index: usize) -> f64 {
        CLOCK_ORIGIN_S + index as f64 / self.sample_rate_hz
    }

    /// One raw sample in volts.
    pub fn sample_at(&mut self, index: usize) -> Vec<f64> {
        let t = self.timestamp(index);
        let evoked = self.schedule.evoked(t);
        (0..self.channel_count)
            .map(|ch| {
                let alpha = (2.0 * std::f64::consts::PI * ALPHA_HZ * t + ch as f64 * 0.6).sin()
                    * self.noise
                    * 0.5;
                let noise = if self.noise > 0.0 {
                    self.rng.gen_range(-self.noise..self.noise)
                } else {
                    0.0
                };
                // evoked response falls off away from the first channels
                let weight = 1.0 / (1.0 + ch as f64 * 0.5);
                alpha + noise + evoked * weight
            })
            .collect()
    }

    pub fn marker_at(&self, k: usize) -> (u32, f64) {
        (self.schedule.class_at(k), self.schedule.time_of(k))
    }

    /// Writes `samples` samples and every marker that falls inside them.
    pub fn fill_store(&mut self, store: &RecordedData, samples: usize) -> Result<(), AnalysisError> {
        store.set_sample_rate(self.sample_rate_hz)?;
        store.set_channel_count(self.channel_count);
        for i in 0..samples {
            let row = self.sample_at(i);
            store.append_sample(&row)?;
            store.append_sample_timestamp(self.timestamp(i));
        }
        let end = self.timestamp(samples);
        for k in 0.. {
            let (class_id, t) = self.marker_at(k);
            if t >= end {
                break;
            }
            store.append_marker(class_id);
            store.append_marker_timestamp(t);
        }
        Ok(())
    }

    fn finished(&self, t: f64) -> bool {
        self.run_time_s > 0.0 && t - CLOCK_ORIGIN_S >= self.run_time_s
    }

    /// Splits the paradigm into its continuous and marker inlets.
    pub fn into_inlets(self) -> (ContinuousInlet, MarkerInlet) {
        let started = Instant::now();
        let markers = MarkerInlet {
            schedule: self.schedule,
            run_time_s: self.run_time_s,
            realtime: self.realtime,
            started,
            next: 0,
        };
        let continuous = ContinuousInlet {
            paradigm: self,
            started,
            next: 0,
        };
        (continuous, markers)
    }
}

pub struct ContinuousInlet {
    paradigm: SyntheticParadigm,
    started: Instant,
    next: usize,
}

impl StreamInlet for ContinuousInlet {
    type Item = Vec<f64>;

    fn info(&self) -> StreamInfo {
        StreamInfo {
            name: "SimulatedEEG".into(),
            channel_count: self.paradigm.channel_count,
            sample_rate_hz: self.paradigm.sample_rate_hz,
        }
    }

    fn pull(&mut self) -> Result<Option<(Vec<f64>, f64)>, AnalysisError> {
        let t = self.paradigm.timestamp(self.next);
        if self.paradigm.finished(t) {
            return Ok(None);
        }
        if self.paradigm.realtime {
            pace(self.started, t);
        }
        let row = self.paradigm.sample_at(self.next);
        self.next += 1;
        Ok(Some((row, t)))
    }
}

pub struct MarkerInlet {
    schedule: MarkerSchedule,
    run_time_s: f64,
    realtime: bool,
    started: Instant,
    next: usize,
}

impl StreamInlet for MarkerInlet {
    type Item = u32;

    fn info(&self) -> StreamInfo {
        StreamInfo {
            name: "SimulatedMarkers".into(),
            channel_count: 1,
            sample_rate_hz: 0.0,
        }
    }

    fn pull(&mut self) -> Result<Option<(u32, f64)>, AnalysisError> {
        let t = self.schedule.time_of(self.next);
        if self.run_time_s > 0.0 && t - CLOCK_ORIGIN_S >= self.run_time_s {
            return Ok(None);
        }
        if self.realtime {
            pace(self.started, t);
        }
        let class_id = self.schedule.class_at(self.next);
        self.next += 1;
        Ok(Some((class_id, t)))
    }
}

// 按真实时间节奏输出
fn pace(started: Instant, t: f64) {
    let due = Duration::from_secs_f64((t - CLOCK_ORIGIN_S).max(0.0));
    if let Some(wait) = due.checked_sub(started.elapsed()) {
        thread::sleep(wait);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> (StreamConfig, SimulatorConfig) {
        let stream = StreamConfig {
            sample_rate_hz: 250.0,
            channel_count: 2,
            rows: 2,
            cols: 3,
            flash_mode: 0,
        };
        let sim = SimulatorConfig {
            realtime: false,
            run_time_s: 2.0,
            ..SimulatorConfig::default()
        };
        (stream, sim)
    }

    #[test]
    fn markers_cycle_through_all_classes() {
        let (stream, sim) = configs();
        let paradigm = SyntheticParadigm::new(&stream, &sim);
        let ids: Vec<u32> = (0..8).map(|k| paradigm.marker_at(k).0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 1, 2]);
        assert!((paradigm.marker_at(1).1 - paradigm.marker_at(0).1 - 0.25).abs() < 1e-12);
    }

    #[test]
    fn same_seed_same_signal() {
        let (stream, sim) = configs();
        let mut a = SyntheticParadigm::new(&stream, &sim);
        let mut b = SyntheticParadigm::new(&stream, &sim);
        for i in 0..100 {
            assert_eq!(a.sample_at(i), b.sample_at(i));
        }
    }

    #[test]
    fn evoked_response_follows_target_markers() {
        let (stream, mut sim) = configs();
        sim.noise = 0.0;
        let mut paradigm = SyntheticParadigm::new(&stream, &sim);
        let (class_id, onset) = paradigm.marker_at(0);
        assert_eq!(class_id, sim.target_class);
        let peak = ((onset - CLOCK_ORIGIN_S + P300_LATENCY_S) * 250.0).round() as usize;
        let before = ((onset - CLOCK_ORIGIN_S) * 250.0) as usize - 5;
        assert!((paradigm.sample_at(peak)[0] - sim.p300_amplitude).abs() < 1e-7);
        assert!(paradigm.sample_at(before)[0].abs() < 1e-9);
    }

    #[test]
    fn inlets_end_after_run_time() {
        let (stream, sim) = configs();
        let (mut continuous, mut markers) = SyntheticParadigm::new(&stream, &sim).into_inlets();
        let mut samples = 0;
        while continuous.pull().unwrap().is_some() {
            samples += 1;
        }
        let mut marker_count = 0;
        while markers.pull().unwrap().is_some() {
            marker_count += 1;
        }
        assert_eq!(samples, 500);
        // markers at 0.25 s .. 1.75 s
        assert_eq!(marker_count, 7);
    }

    #[test]
    fn fill_store_writes_both_feeds() {
        let (stream, sim) = configs();
        let store = RecordedData::new(None);
        SyntheticParadigm::new(&stream, &sim).fill_store(&store, 1000).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.samples.dim(), (1000, 2));
        assert_eq!(snapshot.markers.len(), 15);
        assert_eq!(snapshot.sample_rate_hz, Some(250.0));
    }
}
