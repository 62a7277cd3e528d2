// State-action cross-correlation to estimate the control delay in frames

use crate::analysis::stats::{mean, pearson};
use crate::analysis::view::SampleView;
use crate::core::constants::SERIES_DELIMITER;
use crate::core::error::NotComputed;
use serde::Serialize;

pub const MIN_FRAMES: usize = 10;
pub const MAX_LAG: usize = 30;
const MIN_LAG: usize = 2;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlignedPair {
    pub action: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlignmentEnvelope {
    pub pairs: Vec<AlignedPair>,
    pub lags: Vec<i64>,
    pub max: Vec<f64>,
    pub mean: Vec<f64>,
    pub min: Vec<f64>,
    /// Lag where the mean curve peaks; positive means the state follows the action.
    pub peak_lag: i64,
    pub peak_correlation: f64,
}

fn suffix(name: &str) -> &str {
    name.split(SERIES_DELIMITER).nth(1).unwrap_or(name)
}

/// Pairs action and state dimensions by suffix, falling back to position
/// when no suffix matches.
fn match_pairs(view: &SampleView) -> Vec<(usize, usize)> {
    let by_suffix: Vec<(usize, usize)> = view
        .action_names
        .iter()
        .enumerate()
        .filter_map(|(a, action)| {
            view.state_names
                .iter()
                .position(|state| suffix(state) == suffix(action))
                .map(|s| (a, s))
        })
        .collect();
    if !by_suffix.is_empty() {
        return by_suffix;
    }
    (0..view.action_dims().min(view.state_names.len()))
        .map(|i| (i, i))
        .collect()
}

/// Correlation of `action[t]` with `state[t + lag + 1] - state[t + lag]`.
fn lagged_correlation(action: &[f64], state: &[f64], lag: i64) -> f64 {
    let deltas: Vec<f64> = state.windows(2).map(|w| w[1] - w[0]).collect();
    let n = action.len().min(deltas.len()) as i64;
    let start = (-lag).max(0);
    let end = n.min(n - lag);
    if end - start < 2 {
        return 0.0;
    }
    let a = &action[start as usize..end as usize];
    let d = &deltas[(start + lag) as usize..(end + lag) as usize];
    pearson(a, d)
}

pub fn compute(view: &SampleView) -> Result<AlignmentEnvelope, NotComputed> {
    let pairs = match_pairs(view);
    if pairs.is_empty() {
        return Err(NotComputed::new("no matching action and state dimensions"));
    }

    let eligible: Vec<usize> = (0..view.len())
        .filter(|&ep| {
            view.frames(ep) >= MIN_FRAMES
                && view.states[ep]
                    .iter()
                    .all(|s| s.len() >= view.frames(ep))
        })
        .collect();
    let Some(shortest) = eligible.iter().map(|&ep| view.frames(ep)).min() else {
        return Err(NotComputed::new(format!(
            "no episode with at least {} frames and state data",
            MIN_FRAMES
        )));
    };
    let max_lag = (shortest / 4).min(MAX_LAG);
    if max_lag < MIN_LAG {
        return Err(NotComputed::new("episodes too short for a lag window"));
    }

    let lags: Vec<i64> = (-(max_lag as i64)..=max_lag as i64).collect();

    // One curve per pair, averaged over episodes
    let curves: Vec<Vec<f64>> = pairs
        .iter()
        .map(|&(a, s)| {
            lags.iter()
                .map(|&lag| {
                    let per_episode: Vec<f64> = eligible
                        .iter()
                        .map(|&ep| lagged_correlation(&view.actions[ep][a], &view.states[ep][s], lag))
                        .collect();
                    mean(&per_episode)
                })
                .collect()
        })
        .collect();

    let across = |i: usize| curves.iter().map(move |c| c[i]);
    let max: Vec<f64> = (0..lags.len())
        .map(|i| across(i).fold(f64::NEG_INFINITY, f64::max))
        .collect();
    let min: Vec<f64> = (0..lags.len())
        .map(|i| across(i).fold(f64::INFINITY, f64::min))
        .collect();
    let mean_curve: Vec<f64> = (0..lags.len())
        .map(|i| mean(&across(i).collect::<Vec<_>>()))
        .collect();

    let (peak, peak_correlation) = mean_curve
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, r)| if r > best.1 { (i, r) } else { best });

    Ok(AlignmentEnvelope {
        pairs: pairs
            .iter()
            .map(|&(a, s)| AlignedPair {
                action: view.action_names[a].clone(),
                state: view.state_names[s].clone(),
            })
            .collect(),
        peak_lag: lags[peak],
        peak_correlation,
        lags,
        max,
        mean: mean_curve,
        min,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::view::fixtures::sample;
    use crate::analysis::view::AnalyticsOptions;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// State integrates the action `delay` frames later.
    fn delayed_episode(rng: &mut StdRng, frames: usize, delay: usize) -> (Vec<f64>, Vec<f64>) {
        let action: Vec<f64> = (0..frames).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mut state = vec![0.0; frames];
        for t in 1..frames {
            let push = if t - 1 >= delay { action[t - 1 - delay] } else { 0.0 };
            state[t] = state[t - 1] + push;
        }
        (action, state)
    }

    #[test]
    fn test_recovers_control_delay() {
        let mut rng = StdRng::seed_from_u64(3);
        let episodes = (0..4)
            .map(|_| {
                let (action, state) = delayed_episode(&mut rng, 80, 3);
                vec![("action | x", action), ("observation.state | x", state)]
            })
            .collect();
        let s = sample(episodes);
        let report = compute(&SampleView::new(&s, &AnalyticsOptions::default())).unwrap();

        assert_eq!(report.lags.len(), 2 * 20 + 1);
        assert_eq!(report.peak_lag, 3);
        assert!(report.peak_correlation > 0.9);
        assert_eq!(report.pairs[0].state, "observation.state | x");
        for i in 0..report.lags.len() {
            assert!(report.min[i] <= report.mean[i] + 1e-12);
            assert!(report.mean[i] <= report.max[i] + 1e-12);
        }
    }

    #[test]
    fn test_lag_window_capped() {
        let mut rng = StdRng::seed_from_u64(5);
        let (action, state) = delayed_episode(&mut rng, 400, 1);
        let s = sample(vec![vec![("action | x", action), ("observation.state | x", state)]]);
        let report = compute(&SampleView::new(&s, &AnalyticsOptions::default())).unwrap();
        assert_eq!(*report.lags.last().unwrap(), MAX_LAG as i64);
    }

    #[test]
    fn test_positional_pairing_fallback() {
        let mut rng = StdRng::seed_from_u64(9);
        let (action, state) = delayed_episode(&mut rng, 40, 0);
        let s = sample(vec![vec![("action | a", action), ("observation.state | b", state)]]);
        let report = compute(&SampleView::new(&s, &AnalyticsOptions::default())).unwrap();
        assert_eq!(report.pairs.len(), 1);
        assert_eq!(report.peak_lag, 0);
    }

    #[test]
    fn test_short_or_stateless_samples_not_computed() {
        let s = sample(vec![vec![("action | x", vec![0.0, 1.0, 0.5])]]);
        assert!(compute(&SampleView::new(&s, &AnalyticsOptions::default())).is_err());

        let s = sample(vec![vec![
            ("action | x", (0..9).map(|t| t as f64).collect()),
            ("observation.state | x", (0..9).map(|t| t as f64).collect()),
        ]]);
        assert!(compute(&SampleView::new(&s, &AnalyticsOptions::default())).is_err());
    }
}
