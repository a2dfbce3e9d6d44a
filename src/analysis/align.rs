use crate::analysis::AnalysisError;
/// Marker positions expressed in the continuous stream's sample-index domain.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerAlignment {
    /// One aligned sample index per marker, in marker order.
    pub indices: Vec<usize>,
    /// One entry per sample: the class id of the marker aligned there, 0 elsewhere.
    pub mapped: Vec<u32>,
}
/// Least-squares line `index = slope * timestamp + intercept`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexFit {
    pub slope: f64,
    pub intercept: f64,
}
impl IndexFit {
    /// Fits the sample index against the sample timestamps of the whole history.
    pub fn from_timestamps(sample_timestamps: &[f64]) -> Result<Self, AnalysisError> {
        let n = sample_timestamps.len();
        if n == 0 {
            return Err(AnalysisError::EmptyHistory);
        }
        let count = n as f64;
        let mean_t = sample_timestamps.iter().sum::<f64>() / count;
        let mean_i = (count - 1.0) / 2.0;
        let mut covariance = 0.0;
        let mut variance = 0.0;
        for (i, t) in sample_timestamps.iter().enumerate() {
            let dt = t - mean_t;
            covariance += dt * (i as f64 - mean_i);
            variance += dt * dt;
        }
        // One sample, or a frozen clock: everything lands on index 0.
        if !(variance > 0.0) {
            return Ok(Self {
                slope: 0.0,
                intercept: 0.0,
            });
        }
        let slope = covariance / variance;
        Ok(Self {
            slope,
            intercept: mean_i - slope * mean_t,
        })
    }
    pub fn evaluate(&self, timestamp: f64) -> f64 {
        self.slope * timestamp + self.intercept
    }
    /// Rounds half to even and clamps into `0..len`.
    pub fn index_for(&self, timestamp: f64, len: usize) -> usize {
        let last = len.saturating_sub(1);
        let rounded = self.evaluate(timestamp).round_ties_even();
        if !(rounded > 0.0) {
            0
        } else if rounded >= last as f64 {
            last
        } else {
            rounded as usize
        }
    }
}
/// Maps every marker timestamp onto the sample index of the continuous stream.
///
/// Only the common prefix of `markers` and `marker_timestamps` is used.
pub fn align_markers(
    markers: &[u32],
    marker_timestamps: &[f64],
    sample_timestamps: &[f64],
) -> Result<MarkerAlignment, AnalysisError> {
    let fit = IndexFit::from_timestamps(sample_timestamps)?;
    let len = sample_timestamps.len();
    let mut mapped = vec![0u32; len];
    let indices: Vec<usize> = markers
        .iter()
        .zip(marker_timestamps)
        .map(|(&class_id, &timestamp)| {
            let index = fit.index_for(timestamp, len);
            mapped[index] = class_id;
            index
        })
        .collect();
    Ok(MarkerAlignment { indices, mapped })
}
#[cfg(test)]
mod tests {
    use super::*;
    fn regular_timestamps(t0: f64, dt: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| t0 + i as f64 * dt).collect()
    }
    #[test]
    fn constant_spacing_maps_to_rounded_offset() {
        let t0 = 1234.5;
        let dt = 0.004;
        let n = 1000;
        let ts = regular_timestamps(t0, dt, n);
        let marker_ts = [t0, t0 + 0.5, t0 + 1.0021, t0 + 3.9959, t0 - 1.0, t0 + 10.0];
        let markers = [1, 2, 3, 4, 5, 6];
        let aligned = align_markers(&markers, &marker_ts, &ts).unwrap();
        for (index, t) in aligned.indices.iter().zip(marker_ts) {
            let expected = ((t - t0) / dt).round().clamp(0.0, (n - 1) as f64) as usize;
            assert_eq!(*index, expected);
        }
        assert_eq!(aligned.indices, vec![0, 125, 251, 999, 0, 999]);
    }
    #[test]
    fn mapped_array_carries_class_ids() {
        let ts = regular_timestamps(0.0, 0.01, 100);
        let aligned = align_markers(&[3, 7], &[0.2, 0.5], &ts).unwrap();
        assert_eq!(aligned.mapped.len(), 100);
        assert_eq!(aligned.mapped[20], 3);
        assert_eq!(aligned.mapped[50], 7);
        assert_eq!(aligned.mapped.iter().filter(|&&m| m != 0).count(), 2);
    }
    #[test]
    fn fit_absorbs_timestamp_jitter() {
        let mut ts = regular_timestamps(10.0, 0.004, 500);
        for (i, t) in ts.iter_mut().enumerate() {
            *t += if i % 2 == 0 { 0.0008 } else { -0.0008 };
        }
        let aligned = align_markers(&[1], &[11.0], &ts).unwrap();
        assert_eq!(aligned.indices, vec![250]);
    }
    #[test]
    fn ragged_marker_feed_uses_common_prefix() {
        let ts = regular_timestamps(0.0, 0.01, 10);
        let aligned = align_markers(&[1, 2, 3], &[0.0, 0.05], &ts).unwrap();
        assert_eq!(aligned.indices, vec![0, 5]);
    }
    #[test]
    fn degenerate_histories() {
        assert!(matches!(
            align_markers(&[1], &[0.0], &[]),
            Err(AnalysisError::EmptyHistory)
        ));
        let aligned = align_markers(&[1, 2], &[5.0, 9.0], &[3.0]).unwrap();
        assert_eq!(aligned.indices, vec![0, 0]);
        assert_eq!(aligned.mapped, vec![2]);
    }
}
