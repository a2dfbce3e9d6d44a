use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use log::{debug, info, warn};
use crate::analysis::store::RecordedData;
use crate::analysis::AnalysisError;
use crate::engine::CancellationToken;
use crate::types::StreamInfo;
/// Append side of one feed of the store: a value, then its timestamp.
pub trait FeedSink: Send + Sync {
    type Value;
    fn append_value(&self, value: Self::Value) -> Result<(), AnalysisError>;
    fn append_timestamp(&self, timestamp: f64);
}
/// Continuous channel-vector feed.
#[derive(Clone)]
pub struct SampleFeed {
    store: Arc<RecordedData>,
}
impl SampleFeed {
    pub fn new(store: Arc<RecordedData>) -> Self {
        Self { store }
    }
}
impl FeedSink for SampleFeed {
    type Value = Vec<f64>;
    fn append_value(&self, value: Vec<f64>) -> Result<(), AnalysisError> {
        self.store.append_sample(&value)
    }
    fn append_timestamp(&self, timestamp: f64) {
        self.store.append_sample_timestamp(timestamp);
    }
}
/// Sparse class-id feed.
#[derive(Clone)]
pub struct MarkerFeed {
    store: Arc<RecordedData>,
}
impl MarkerFeed {
    pub fn new(store: Arc<RecordedData>) -> Self {
        Self { store }
    }
}
impl FeedSink for MarkerFeed {
    type Value = u32;
    fn append_value(&self, value: u32) -> Result<(), AnalysisError> {
        self.store.append_marker(value);
        Ok(())
    }
    fn append_timestamp(&self, timestamp: f64) {
        self.store.append_marker_timestamp(timestamp);
    }
}
/// Pull-based source of timestamped values.
pub trait StreamInlet: Send {
    type Item;
    fn info(&self) -> StreamInfo;
    /// Blocks until the next value arrives; `None` once the stream has ended.
    fn pull(&mut self) -> Result<Option<(Self::Item, f64)>, AnalysisError>;
}
/// In-memory inlet for tests and replaying recordings.
pub struct ManualInlet<T> {
    info: StreamInfo,
    queue: VecDeque<(T, f64)>,
}
impl<T> ManualInlet<T> {
    pub fn new(info: StreamInfo, items: impl IntoIterator<Item = (T, f64)>) -> Self {
        Self {
            info,
            queue: items.into_iter().collect(),
        }
    }
}
impl<T: Send> StreamInlet for ManualInlet<T> {
    type Item = T;
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }
    fn pull(&mut self) -> Result<Option<(T, f64)>, AnalysisError> {
        Ok(self.queue.pop_front())
    }
}
/// Runs one producer worker that moves everything `inlet` yields into `sink`.
///
/// The worker stops when the inlet ends, fails, or `cancel` fires, and
/// returns the number of values it appended. A value the sink rejects is
/// logged and skipped.
pub fn spawn_feed<I, S>(mut inlet: I, sink: S, cancel: CancellationToken) -> JoinHandle<usize>
where
    I: StreamInlet + 'static,
    S: FeedSink<Value = I::Item> + 'static,
{
    thread::spawn(move || {
        let info = inlet.info();
        info!(
            "feed '{}' connected: {} channels at {} Hz",
            info.name, info.channel_count, info.sample_rate_hz
        );
        let mut appended = 0usize;
        while !cancel.is_cancelled() {
            match inlet.pull() {
                Ok(Some((value, timestamp))) => match sink.append_value(value) {
                    Ok(()) => {
                        sink.append_timestamp(timestamp);
                        appended += 1;
                    }
                    Err(e) => warn!("feed '{}': dropped value at {timestamp}: {e}", info.name),
                },
                Ok(None) => {
                    debug!("feed '{}' ended after {appended} values", info.name);
                    break;
                }
                Err(e) => {
                    warn!("feed '{}' failed: {e}", info.name);
                    break;
                }
            }
        }
        appended
    })
}
#[cfg(test)]
mod tests {
    use super::*;
    fn info(name: &str, channels: usize) -> StreamInfo {
        StreamInfo {
            name: name.into(),
            channel_count: channels,
            sample_rate_hz: 100.0,
        }
    }
    #[test]
    fn feeds_write_their_own_fields() {
        let store = Arc::new(RecordedData::new(None));
        let samples = SampleFeed::new(store.clone());
        let markers = MarkerFeed::new(store.clone());
        samples.append_value(vec![1e-6, 2e-6]).unwrap();
        samples.append_timestamp(0.25);
        markers.append_value(7).unwrap();
        markers.append_timestamp(0.3);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.sample_timestamps, vec![0.25]);
        assert_eq!(snapshot.markers, vec![7]);
        assert_eq!(snapshot.marker_timestamps, vec![0.3]);
    }
    #[test]
    fn producer_drains_inlet_and_skips_rejected_values() {
        let store = Arc::new(RecordedData::new(None));
        store.set_channel_count(2);
        let rows = vec![
            (vec![0.0, 0.0], 0.00),
            (vec![0.0], 0.01), // wrong width
            (vec![1e-6, 1e-6], 0.02),
        ];
        let inlet = ManualInlet::new(info("eeg", 2), rows);
        let handle = spawn_feed(inlet, SampleFeed::new(store.clone()), CancellationToken::new());
        assert_eq!(handle.join().unwrap(), 2);
        assert_eq!(store.sample_count(), 2);
        assert_eq!(store.snapshot().sample_timestamps, vec![0.00, 0.02]);
    }
    #[test]
    fn cancelled_producer_appends_nothing() {
        let store = Arc::new(RecordedData::new(None));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let inlet = ManualInlet::new(info("markers", 1), vec![(1u32, 0.0), (2, 0.5)]);
        let handle = spawn_feed(inlet, MarkerFeed::new(store.clone()), cancel);
        assert_eq!(handle.join().unwrap(), 0);
        assert_eq!(store.marker_count(), 0);
    }
}
