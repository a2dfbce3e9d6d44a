use ndarray::{s, Array2, Array3, Axis};
use crate::analysis::epochs::TrialSet;
use crate::analysis::AnalysisError;
/// Most recent trials per class that go into a rolling average.
pub const AVERAGE_WINDOW: usize = 30;
/// Per-class mean waveforms, classes in ascending id order.
#[derive(Clone, Debug)]
pub struct ClassAverages {
    pub class_ids: Vec<u32>,
    /// Trials that went into each mean (never more than [`AVERAGE_WINDOW`]).
    pub trial_counts: Vec<usize>,
    /// classes x time x channels
    pub waveforms: Array3<f64>,
    pub squared: bool,
}
impl ClassAverages {
    pub fn class_count(&self) -> usize {
        self.class_ids.len()
    }
    /// classes x time for one channel.
    pub fn channel(&self, channel: usize) -> Result<Array2<f64>, AnalysisError> {
        let channel_count = self.waveforms.len_of(Axis(2));
        if channel >= channel_count {
            return Err(AnalysisError::InvalidChannel {
                channel,
                channel_count,
            });
        }
        Ok(self.waveforms.slice(s![.., .., channel]).to_owned())
    }
}
/// Averages the latest [`AVERAGE_WINDOW`] trials of every class.
///
/// With `squared` the mean waveform is squared afterwards. This is the
/// square of the mean, not a mean of squares.
pub fn average_by_class(set: &TrialSet, squared: bool) -> ClassAverages {
    let class_ids = set.class_ids();
    let mut waveforms = Array3::zeros((class_ids.len(), set.trial_len(), set.channel_count()));
    let mut trial_counts = Vec::with_capacity(class_ids.len());
    for (mut slot, &class_id) in waveforms.outer_iter_mut().zip(&class_ids) {
        let positions = set.positions_of(class_id);
        let recent = &positions[positions.len().saturating_sub(AVERAGE_WINDOW)..];
        trial_counts.push(recent.len());
        let selected = set.trials.select(Axis(0), recent);
        if let Some(mean) = selected.mean_axis(Axis(0)) {
            slot.assign(&mean);
        }
        if squared {
            slot.mapv_inplace(|v| v * v);
        }
    }
    ClassAverages {
        class_ids,
        trial_counts,
        waveforms,
        squared,
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn constant_trials(values: &[(u32, f64)], len: usize, channels: usize) -> TrialSet {
        let mut trials = Array3::zeros((values.len(), len, channels));
        for (mut slot, &(_, v)) in trials.outer_iter_mut().zip(values) {
            slot.fill(v);
        }
        TrialSet {
            trials,
            classes: values.iter().map(|&(c, _)| c).collect(),
        }
    }
    #[test]
    fn classes_come_out_sorted_with_expected_shape() {
        let set = constant_trials(&[(5, 1.0), (2, 3.0), (5, 3.0), (9, -4.0)], 250, 4);
        let avg = average_by_class(&set, false);
        assert_eq!(avg.class_ids, vec![2, 5, 9]);
        assert_eq!(avg.waveforms.dim(), (3, 250, 4));
        assert_eq!(avg.waveforms[[0, 0, 0]], 3.0);
        assert_eq!(avg.waveforms[[1, 100, 3]], 2.0);
        assert_eq!(avg.waveforms[[2, 249, 1]], -4.0);
    }
    #[test]
    fn only_the_latest_thirty_trials_count() {
        let mut values: Vec<(u32, f64)> = (0..10).map(|_| (1, 1000.0)).collect();
        values.extend((0..AVERAGE_WINDOW).map(|_| (1, 2.0)));
        values.push((2, 7.0));
        let set = constant_trials(&values, 10, 1);
        let avg = average_by_class(&set, false);
        assert_eq!(avg.trial_counts, vec![AVERAGE_WINDOW, 1]);
        assert_eq!(avg.waveforms[[0, 5, 0]], 2.0);
    }
    #[test]
    fn squared_mode_squares_the_mean() {
        let set = constant_trials(&[(1, 2.0), (1, -2.0), (1, 3.0), (1, -1.0)], 5, 1);
        let plain = average_by_class(&set, false);
        let squared = average_by_class(&set, true);
        assert_eq!(plain.waveforms[[0, 0, 0]], 0.5);
        // mean of squares would be 4.5
        assert_eq!(squared.waveforms[[0, 0, 0]], 0.25);
    }
    #[test]
    fn channel_selection() {
        let set = constant_trials(&[(1, 2.0), (2, 4.0)], 8, 3);
        let avg = average_by_class(&set, false);
        let picked = avg.channel(2).unwrap();
        assert_eq!(picked.dim(), (2, 8));
        assert!(matches!(
            avg.channel(3),
            Err(AnalysisError::InvalidChannel { channel: 3, channel_count: 3 })
        ));
    }
    #[test]
    fn empty_set_gives_no_classes() {
        let avg = average_by_class(&TrialSet::empty(250, 2), true);
        assert_eq!(avg.class_count(), 0);
        assert_eq!(avg.waveforms.dim(), (0, 250, 2));
    }
}
