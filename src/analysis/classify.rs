use ndarray::{s, Array2, ArrayView2, Axis};
use serde::Serialize;
use crate::analysis::epochs::TrialSet;
use crate::analysis::AnalysisError;
/// Trials per class that enter the contrast, and the minimum a class needs.
pub const EPOCHS_FOR_CLASSIFICATION: usize = 6;
/// Post-stimulus feature window in seconds, end exclusive.
pub const FEATURE_WINDOW_SECONDS: (f64, f64) = (0.2, 0.5);
/// A class must beat every competitor by this factor to win.
pub const DOMINANCE_FACTOR: f64 = 2.0;
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum NoDecisionReason {
    NoTrials,
    TooFewClasses,
    InsufficientTrials { class_id: u32, trials: usize },
    NoDominantClass,
}
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Decision {
    Selected { class_index: usize, class_id: u32 },
    NoDecision(NoDecisionReason),
}
/// Outcome of one classification pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Classification {
    pub class_ids: Vec<u32>,
    /// Fisher score per class, parallel to `class_ids`; empty when scoring was skipped.
    pub scores: Vec<f64>,
    pub decision: Decision,
}
impl Classification {
    fn undecided(class_ids: Vec<u32>, reason: NoDecisionReason) -> Self {
        Self {
            class_ids,
            scores: Vec::new(),
            decision: Decision::NoDecision(reason),
        }
    }
    pub fn winner(&self) -> Option<u32> {
        match self.decision {
            Decision::Selected { class_id, .. } => Some(class_id),
            Decision::NoDecision(_) => None,
        }
    }
}
/// Leave-one-out Fisher contrast over the P300 window of one channel.
pub fn classify_trials(
    set: &TrialSet,
    channel: usize,
    sample_rate_hz: f64,
) -> Result<Classification, AnalysisError> {
    let channel_count = set.channel_count();
    if channel >= channel_count {
        return Err(AnalysisError::InvalidChannel {
            channel,
            channel_count,
        });
    }
    let class_ids = set.class_ids();
    if class_ids.is_empty() {
        return Ok(Classification::undecided(class_ids, NoDecisionReason::NoTrials));
    }
    let mut per_class = Vec::with_capacity(class_ids.len());
    for &class_id in &class_ids {
        let positions = set.positions_of(class_id);
        if positions.len() < EPOCHS_FOR_CLASSIFICATION {
            let reason = NoDecisionReason::InsufficientTrials {
                class_id,
                trials: positions.len(),
            };
            return Ok(Classification::undecided(class_ids, reason));
        }
        per_class.push(positions);
    }
    if class_ids.len() < 2 {
        return Ok(Classification::undecided(class_ids, NoDecisionReason::TooFewClasses));
    }
    let (start, end) = feature_window(sample_rate_hz, set.trial_len());
    // class -> feature samples x epochs
    let fields: Vec<Array2<f64>> = per_class
        .iter()
        .map(|positions| {
            let recent = &positions[positions.len() - EPOCHS_FOR_CLASSIFICATION..];
            set.trials
                .slice(s![.., start..end, channel])
                .select(Axis(0), recent)
                .reversed_axes()
        })
        .collect();
    let scores: Vec<f64> = (0..fields.len())
        .map(|target| {
            let others: Vec<ArrayView2<f64>> = fields
                .iter()
                .enumerate()
                .filter_map(|(i, f)| (i != target).then(|| f.view()))
                .collect();
            let pooled = ndarray::concatenate(Axis(1), &others)
                .unwrap_or_else(|_| Array2::zeros((end - start, 0)));
            fisher_criterion(fields[target].view(), pooled.view())
        })
        .collect();
    let decision = match winner_take_all(&scores) {
        Some(class_index) => Decision::Selected {
            class_index,
            class_id: class_ids[class_index],
        },
        None => Decision::NoDecision(NoDecisionReason::NoDominantClass),
    };
    Ok(Classification {
        class_ids,
        scores,
        decision,
    })
}
/// Sample range `[int(0.2 sr), int(0.5 sr))`, clipped to the trial length.
pub fn feature_window(sample_rate_hz: f64, trial_len: usize) -> (usize, usize) {
    let (from, to) = FEATURE_WINDOW_SECONDS;
    let end = ((to * sample_rate_hz) as usize).min(trial_len);
    let start = ((from * sample_rate_hz) as usize).min(end);
    (start, end)
}
/// `(Σ|mean(t)| - Σ|mean(n)|)^2 / (Σ|var(t)| + Σ|var(n)|)`.
///
/// Both fields are feature samples x epochs. Mean and population variance
/// are taken along each row (across epochs) and their absolute values summed
/// over the feature samples.
pub fn fisher_criterion(targets: ArrayView2<f64>, non_targets: ArrayView2<f64>) -> f64 {
    let (mean_target, var_target) = summed_row_moments(targets);
    let (mean_non_target, var_non_target) = summed_row_moments(non_targets);
    (mean_target - mean_non_target).powi(2) / (var_target + var_non_target)
}
// Layout is `field[time, epoch]`; moments run across epochs for each feature
// sample. Summing per-epoch moments over time instead scales with the epoch
// count (6 targets vs 6 x (K - 1) pooled) and flattens every score.
fn summed_row_moments(epochs: ArrayView2<f64>) -> (f64, f64) {
    if epochs.ncols() == 0 {
        return (f64::NAN, f64::NAN);
    }
    epochs.rows().into_iter().fold((0.0, 0.0), |(m, v), row| {
        let mean = row.mean().unwrap_or(f64::NAN);
        let var = row.var(0.0);
        (m + mean.abs(), v + var.abs())
    })
}
/// Index of the single score that exceeds twice every other score.
///
/// A NaN anywhere fails every comparison, so no class is selected.
pub fn winner_take_all(scores: &[f64]) -> Option<usize> {
    if scores.len() < 2 || scores.iter().any(|s| s.is_nan()) {
        return None;
    }
    let winners: Vec<usize> = (0..scores.len())
        .filter(|&i| {
            let best_other = scores
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, &s)| s)
                .fold(f64::NEG_INFINITY, f64::max);
            scores[i] > DOMINANCE_FACTOR * best_other
        })
        .collect();
    match winners.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    const FS: f64 = 250.0;
    /// `counts` trials per class; class `boosted` carries a 300 ms bump on channel 0.
    fn paradigm(counts: &[(u32, usize)], boosted: Option<u32>) -> TrialSet {
        let len = FS as usize;
        let total: usize = counts.iter().map(|&(_, n)| n).sum();
        let mut classes = Vec::with_capacity(total);
        let mut round = 0;
        while classes.len() < total {
            for &(class_id, n) in counts {
                if round < n {
                    classes.push(class_id);
                }
            }
            round += 1;
        }
        let trials = Array3::from_shape_fn((total, len, 2), |(trial, t, ch)| {
            let wobble = ((t * 7 + trial * 13 + ch * 5) % 11) as f64 - 5.0;
            let bump = if Some(classes[trial]) == boosted && ch == 0 {
                let x = (t as f64 / FS - 0.3) / 0.05;
                40.0 * (-x * x).exp()
            } else {
                0.0
            };
            wobble + bump
        });
        TrialSet { trials, classes }
    }
    #[test]
    fn threshold_examples() {
        assert_eq!(winner_take_all(&[10.0, 3.0, 2.0]), Some(0));
        assert_eq!(winner_take_all(&[10.0, 6.0, 2.0]), None);
        assert_eq!(winner_take_all(&[1.0, 9.0, 4.4]), Some(1));
        assert_eq!(winner_take_all(&[1.0, 9.0, 4.5]), None);
        assert_eq!(winner_take_all(&[5.0]), None);
        assert_eq!(winner_take_all(&[f64::NAN, 1.0, 0.1]), None);
        assert_eq!(winner_take_all(&[10.0, f64::NAN, 0.1]), None);
    }
    #[test]
    fn too_few_trials_means_no_decision() {
        let set = paradigm(&[(1, 5), (2, 10)], Some(1));
        let result = classify_trials(&set, 0, FS).unwrap();
        assert_eq!(
            result.decision,
            Decision::NoDecision(NoDecisionReason::InsufficientTrials { class_id: 1, trials: 5 })
        );
        assert_eq!(result.winner(), None);
    }
    #[test]
    fn p300_class_wins() {
        let counts: Vec<(u32, usize)> = (1..=6).map(|c| (c, 8)).collect();
        let set = paradigm(&counts, Some(4));
        let result = classify_trials(&set, 0, FS).unwrap();
        assert_eq!(result.class_ids, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(result.scores.len(), 6);
        assert_eq!(
            result.decision,
            Decision::Selected { class_index: 3, class_id: 4 }
        );
    }
    #[test]
    fn flat_channel_gives_no_winner() {
        let counts: Vec<(u32, usize)> = (1..=4).map(|c| (c, 6)).collect();
        let set = paradigm(&counts, Some(2));
        // the bump lives on channel 0 only
        let result = classify_trials(&set, 1, FS).unwrap();
        assert_eq!(result.winner(), None);
    }
    #[test]
    fn fisher_score_matches_hand_computation() {
        let targets = ndarray::arr2(&[[1.0, 3.0], [2.0, 2.0]]);
        let non_targets = ndarray::arr2(&[[0.0, 0.0], [-1.0, 1.0]]);
        // row means: 2 + 2 = 4 vs 0 + 0 = 0; row variances: 1 + 0 vs 0 + 1
        let score = fisher_criterion(targets.view(), non_targets.view());
        assert!((score - 8.0).abs() < 1e-12);
    }
    #[test]
    fn feature_window_in_samples() {
        assert_eq!(feature_window(250.0, 250), (50, 125));
        assert_eq!(feature_window(512.0, 512), (102, 256));
    }
    #[test]
    fn bad_channel_is_an_error() {
        let set = paradigm(&[(1, 6), (2, 6)], None);
        assert!(matches!(
            classify_trials(&set, 2, FS),
            Err(AnalysisError::InvalidChannel { .. })
        ));
    }
}
