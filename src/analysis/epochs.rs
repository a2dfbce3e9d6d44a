use ndarray::{s, Array3, ArrayView2, Axis};
use crate::analysis::align::MarkerAlignment;
/// Stimulus-locked windows cut from the continuous stream.
#[derive(Clone, Debug)]
pub struct TrialSet {
    /// trials x time x channels
    pub trials: Array3<f64>,
    /// Triggering class id per trial, parallel to the first axis of `trials`.
    pub classes: Vec<u32>,
}
impl TrialSet {
    pub fn empty(trial_len: usize, channel_count: usize) -> Self {
        Self {
            trials: Array3::zeros((0, trial_len, channel_count)),
            classes: Vec::new(),
        }
    }
    pub fn len(&self) -> usize {
        self.classes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
    pub fn trial_len(&self) -> usize {
        self.trials.len_of(Axis(1))
    }
    pub fn channel_count(&self) -> usize {
        self.trials.len_of(Axis(2))
    }
    /// Distinct class ids in ascending order.
    pub fn class_ids(&self) -> Vec<u32> {
        let mut ids = self.classes.clone();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
    /// Positions of the trials of `class_id`, oldest first.
    pub fn positions_of(&self, class_id: u32) -> Vec<usize> {
        self.classes
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| (c == class_id).then_some(i))
            .collect()
    }
}
/// Trial length in samples for a given sample rate.
pub fn trial_len(sample_rate_hz: f64) -> usize {
    sample_rate_hz.max(0.0) as usize
}
/// Cuts `[index, index + trial_len)` after every aligned marker.
///
/// Windows that run past the end of `samples` are dropped. The class of a
/// trial is looked up in the dense mapped-marker array at its start index;
/// windows whose class is 0 carry no stimulus and are skipped as well.
pub fn segment_trials(
    samples: ArrayView2<f64>,
    alignment: &MarkerAlignment,
    trial_len: usize,
) -> TrialSet {
    let channel_count = samples.ncols();
    let history = samples.nrows().min(alignment.mapped.len());
    let mut starts = Vec::new();
    let mut classes = Vec::new();
    for &index in &alignment.indices {
        if trial_len == 0 || index + trial_len > history {
            continue;
        }
        let class_id = alignment.mapped[index];
        if class_id == 0 {
            continue;
        }
        starts.push(index);
        classes.push(class_id);
    }
    let mut trials = Array3::zeros((starts.len(), trial_len, channel_count));
    for (mut slot, &start) in trials.outer_iter_mut().zip(&starts) {
        slot.assign(&samples.slice(s![start..start + trial_len, ..]));
    }
    TrialSet { trials, classes }
}
