// src/recorder.rs
// 保存录制数据: 一个自描述的 JSON 文件, 包含 EEG、标记和各自的时间戳
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use log::info;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::analysis::{RecordedData, Snapshot};

pub const RECORDING_FORMAT: &str = "p300-analyzer/recording";
pub const RECORDING_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed recording: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid recording: {0}")]
    Format(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub format: String,
    pub version: u32,
    /// Seconds since the Unix epoch.
    pub saved_at: f64,
    pub sample_rate_hz: Option<f64>,
    pub channel_count: usize,
    /// samples x channels, microvolts
    pub samples: Vec<Vec<f64>>,
    pub sample_timestamps: Vec<f64>,
    pub markers: Vec<u32>,
    pub marker_timestamps: Vec<f64>,
}

impl Recording {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let saved_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Self {
            format: RECORDING_FORMAT.to_owned(),
            version: RECORDING_VERSION,
            saved_at,
            sample_rate_hz: snapshot.sample_rate_hz,
            channel_count: snapshot.channel_count(),
            samples: snapshot.samples.rows().into_iter().map(|r| r.to_vec()).collect(),
            sample_timestamps: snapshot.sample_timestamps.clone(),
            markers: snapshot.markers.clone(),
            marker_timestamps: snapshot.marker_timestamps.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), RecordingError> {
        if self.format != RECORDING_FORMAT {
            return Err(RecordingError::Format(format!("unknown format tag '{}'", self.format)));
        }
        if self.version != RECORDING_VERSION {
            return Err(RecordingError::Format(format!("unsupported version {}", self.version)));
        }
        if self.samples.len() != self.sample_timestamps.len() {
            return Err(RecordingError::Format(format!(
                "{} samples but {} sample timestamps",
                self.samples.len(),
                self.sample_timestamps.len()
            )));
        }
        if self.markers.len() != self.marker_timestamps.len() {
            return Err(RecordingError::Format(format!(
                "{} markers but {} marker timestamps",
                self.markers.len(),
                self.marker_timestamps.len()
            )));
        }
        if let Some(row) = self.samples.iter().position(|r| r.len() != self.channel_count) {
            return Err(RecordingError::Format(format!(
                "sample {row} does not have {} channels",
                self.channel_count
            )));
        }
        Ok(())
    }

    /// samples x channels
    pub fn samples_array(&self) -> Array2<f64> {
        let flat: Vec<f64> = self.samples.iter().flatten().copied().collect();
        Array2::from_shape_vec((self.samples.len(), self.channel_count), flat)
            .unwrap_or_else(|_| Array2::zeros((0, self.channel_count)))
    }
}

/// What one save wrote.
#[derive(Clone, Debug)]
pub struct SaveSummary {
    pub path: PathBuf,
    pub samples: usize,
    pub markers: usize,
}

impl fmt::Display for SaveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Saved {} samples / {} markers to {}",
            self.samples,
            self.markers,
            self.path.display()
        )
    }
}

/// Writes one reconciled snapshot of `store` to `<dir>/<name>.json`.
pub fn save_recording(
    store: &RecordedData,
    dir: &Path,
    name: &str,
) -> Result<SaveSummary, RecordingError> {
    if name.is_empty() || name.contains(&['/', '\\'][..]) || name == "." || name == ".." {
        return Err(RecordingError::Format(format!("invalid recording name '{name}'")));
    }
    let recording = Recording::from_snapshot(&store.snapshot());
    let json = serde_json::to_vec(&recording)?;
    fs::create_dir_all(dir).map_err(|source| RecordingError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(format!("{name}.json"));
    // 先写临时文件再改名, 避免留下半个文件
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|source| RecordingError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, &path).map_err(|source| RecordingError::Io {
        path: path.clone(),
        source,
    })?;
    let summary = SaveSummary {
        path,
        samples: recording.samples.len(),
        markers: recording.markers.len(),
    };
    info!("{summary}");
    Ok(summary)
}

pub fn load_recording(path: &Path) -> Result<Recording, RecordingError> {
    let data = fs::read(path).map_err(|source| RecordingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let recording: Recording = serde_json::from_slice(&data)?;
    recording.validate()?;
    Ok(recording)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_store() -> RecordedData {
        let store = RecordedData::new(None);
        store.set_sample_rate(250.0).unwrap();
        store.set_channel_count(3);
        for i in 0..40 {
            let v = i as f64 * 1e-6;
            store.append_sample(&[v, -v, 0.5e-6]).unwrap();
            store.append_sample_timestamp(10.0 + i as f64 / 250.0);
        }
        for k in 0..4 {
            store.append_marker(k + 1);
            store.append_marker_timestamp(10.0 + k as f64 * 0.03);
        }
        store
    }

    #[test]
    fn saved_recording_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let store = filled_store();
        let summary = save_recording(&store, &dir.path().join("sessions"), "1").unwrap();
        assert_eq!((summary.samples, summary.markers), (40, 4));
        let loaded = load_recording(&summary.path).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(loaded.sample_rate_hz, Some(250.0));
        assert_eq!(loaded.samples_array(), snapshot.samples);
        assert_eq!(loaded.sample_timestamps, snapshot.sample_timestamps);
        assert_eq!(loaded.markers, vec![1, 2, 3, 4]);
        assert_eq!(loaded.marker_timestamps, snapshot.marker_timestamps);
    }

    #[test]
    fn ragged_store_is_saved_reconciled() {
        let dir = tempfile::tempdir().unwrap();
        let store = filled_store();
        store.append_sample(&[0.0, 0.0, 0.0]).unwrap();
        store.append_marker(9);
        let summary = save_recording(&store, dir.path(), "ragged").unwrap();
        let loaded = load_recording(&summary.path).unwrap();
        assert_eq!(loaded.samples.len(), 40);
        assert_eq!(loaded.markers.len(), 4);
    }

    #[test]
    fn tampered_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let summary = save_recording(&filled_store(), dir.path(), "x").unwrap();
        let mut recording = load_recording(&summary.path).unwrap();
        recording.version = 99;
        fs::write(&summary.path, serde_json::to_vec(&recording).unwrap()).unwrap();
        assert!(matches!(load_recording(&summary.path), Err(RecordingError::Format(_))));
        fs::write(&summary.path, b"{ not json").unwrap();
        assert!(matches!(load_recording(&summary.path), Err(RecordingError::Json(_))));
        assert!(matches!(
            load_recording(&dir.path().join("missing.json")),
            Err(RecordingError::Io { .. })
        ));
    }

    #[test]
    fn names_with_separators_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_recording(&filled_store(), dir.path(), "../escape").is_err());
        assert!(save_recording(&filled_store(), dir.path(), "").is_err());
    }
}
