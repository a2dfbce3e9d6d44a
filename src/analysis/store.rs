use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use log::{debug, warn};
use ndarray::Array2;
use once_cell::sync::OnceCell;
use crate::analysis::filter::{BandpassSettings, StreamingBandpass};
use crate::analysis::AnalysisError;
/// Raw feeds deliver volts; everything downstream works in microvolts.
pub const VOLTS_TO_MICROVOLTS: f64 = 1e6;
/// Append-only recording shared by the producer workers and the analysis loop.
///
/// Each of the four sequences sits behind its own lock and has exactly one
/// writer: the continuous producer owns samples and sample timestamps, the
/// marker producer owns markers and marker timestamps. A producer appends the
/// value first and the timestamp second, one lock at a time, so a reader can
/// observe a value without its timestamp yet. [`RecordedData::snapshot`]
/// truncates every feed to the shorter of its two sequences before handing
/// the copy out.
pub struct RecordedData {
    samples: RwLock<Vec<f64>>, // row-major, channel_count values per sample
    sample_timestamps: RwLock<Vec<f64>>,
    markers: RwLock<Vec<u32>>,
    marker_timestamps: RwLock<Vec<f64>>,
    sample_count: AtomicUsize,
    sample_rate_hz: OnceCell<f64>,
    channel_count: OnceCell<usize>,
    bandpass: Option<BandpassSettings>,
    filter: Mutex<Option<StreamingBandpass>>,
}
/// Owned, reconciled copy of the store at one point in time.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub sample_rate_hz: Option<f64>,
    /// samples x channels, microvolts
    pub samples: Array2<f64>,
    pub sample_timestamps: Vec<f64>,
    pub markers: Vec<u32>,
    pub marker_timestamps: Vec<f64>,
    pub sample_count: usize,
}
impl Snapshot {
    pub fn len(&self) -> usize {
        self.samples.nrows()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.nrows() == 0
    }
    pub fn channel_count(&self) -> usize {
        self.samples.ncols()
    }
}
impl RecordedData {
    /// `bandpass` enables the ingestion filter with the given design.
    pub fn new(bandpass: Option<BandpassSettings>) -> Self {
        Self {
            samples: RwLock::new(Vec::new()),
            sample_timestamps: RwLock::new(Vec::new()),
            markers: RwLock::new(Vec::new()),
            marker_timestamps: RwLock::new(Vec::new()),
            sample_count: AtomicUsize::new(0),
            sample_rate_hz: OnceCell::new(),
            channel_count: OnceCell::new(),
            bandpass,
            filter: Mutex::new(None),
        }
    }
    pub fn set_sample_rate(&self, sample_rate_hz: f64) -> Result<(), AnalysisError> {
        if !(sample_rate_hz > 0.0) {
            return Err(AnalysisError::InvalidSampleRate(sample_rate_hz));
        }
        if self.sample_rate_hz.set(sample_rate_hz).is_err() {
            warn!("sample rate already fixed for this session, ignoring {sample_rate_hz} Hz");
        }
        Ok(())
    }
    pub fn set_channel_count(&self, channel_count: usize) {
        if self.channel_count.set(channel_count).is_err() {
            warn!("channel count already fixed for this session, ignoring {channel_count}");
        }
    }
    pub fn sample_rate_hz(&self) -> Option<f64> {
        self.sample_rate_hz.get().copied()
    }
    pub fn channel_count(&self) -> Option<usize> {
        self.channel_count.get().copied()
    }
    pub fn sample_count(&self) -> usize {
        self.sample_count.load(Ordering::Relaxed)
    }
    pub fn marker_count(&self) -> usize {
        read(&self.marker_timestamps).len()
    }
    /// Scales one raw sample to microvolts, band-passing it first when the
    /// filter is enabled, and appends it.
    pub fn append_sample(&self, sample: &[f64]) -> Result<(), AnalysisError> {
        let row = match self.bandpass {
            Some(settings) => self.filter_sample(settings, sample)?,
            None => {
                let expected = *self.channel_count.get_or_init(|| sample.len());
                if sample.len() != expected {
                    return Err(AnalysisError::ChannelMismatch {
                        expected,
                        actual: sample.len(),
                    });
                }
                sample.to_vec()
            }
        };
        write(&self.samples).extend(row.into_iter().map(|v| v * VOLTS_TO_MICROVOLTS));
        Ok(())
    }
    pub fn append_sample_timestamp(&self, timestamp: f64) {
        write(&self.sample_timestamps).push(timestamp);
        self.sample_count.fetch_add(1, Ordering::Relaxed);
    }
    pub fn append_marker(&self, class_id: u32) {
        write(&self.markers).push(class_id);
    }
    pub fn append_marker_timestamp(&self, timestamp: f64) {
        write(&self.marker_timestamps).push(timestamp);
    }
    fn filter_sample(
        &self,
        settings: BandpassSettings,
        sample: &[f64],
    ) -> Result<Vec<f64>, AnalysisError> {
        let mut guard = lock(&self.filter);
        if guard.is_none() {
            let (Some(&rate), Some(&channels)) = (self.sample_rate_hz.get(), self.channel_count.get())
            else {
                return Err(AnalysisError::NotConfigured);
            };
            debug!("building {}-order band-pass for {channels} channels at {rate} Hz", settings.order);
            *guard = Some(StreamingBandpass::new(rate, channels, settings)?);
        }
        match guard.as_mut() {
            Some(filter) => filter.filter_sample(sample),
            None => Err(AnalysisError::NotConfigured),
        }
    }
    /// Copies all four sequences and reconciles each feed to its shorter side.
    pub fn snapshot(&self) -> Snapshot {
        // Timestamps are appended after values, so reading them first keeps
        // the value side at least as long.
        let mut sample_timestamps = read(&self.sample_timestamps).clone();
        let mut flat = read(&self.samples).clone();
        let mut marker_timestamps = read(&self.marker_timestamps).clone();
        let mut markers = read(&self.markers).clone();
        let channels = self.channel_count().unwrap_or(0);
        let rows = if channels == 0 { 0 } else { flat.len() / channels };
        let n = rows.min(sample_timestamps.len());
        sample_timestamps.truncate(n);
        flat.truncate(n * channels);
        let samples = Array2::from_shape_vec((n, channels), flat)
            .unwrap_or_else(|_| Array2::zeros((0, channels)));
        let m = markers.len().min(marker_timestamps.len());
        markers.truncate(m);
        marker_timestamps.truncate(m);
        Snapshot {
            sample_rate_hz: self.sample_rate_hz(),
            samples,
            sample_timestamps,
            markers,
            marker_timestamps,
            sample_count: self.sample_count(),
        }
    }
    /// Marker ids without the `exclude_recent` newest entries, which may
    /// still be in flight.
    pub fn settled_markers(&self, exclude_recent: usize) -> Vec<u32> {
        let markers = read(&self.markers);
        let keep = markers.len().saturating_sub(exclude_recent);
        markers[..keep].to_vec()
    }
}
// The sequences are append-only, so a writer that panicked cannot have left
// them half-updated; keep going with whatever is there.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}
fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
