// Action velocity and smoothness per dimension

use crate::analysis::stats::{
    equal_width_histogram, mean, min_max, percentile_sorted, sorted, std_dev, HistogramBin,
};
use crate::analysis::view::{AnalyticsOptions, SampleView};
use crate::core::error::NotComputed;
use serde::Serialize;

pub const HISTOGRAM_BINS: usize = 30;
const MAX_DISCRETE_VALUES: usize = 4;
const INACTIVE_FRACTION: f64 = 0.001;
const MODERATE_RATIO: f64 = 0.4;
const JERKY_RATIO: f64 = 0.7;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Smoothness {
    Smooth,
    Moderate,
    Jerky,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DimensionClass {
    Active,
    Discrete,
    Inactive,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DimensionVelocity {
    pub name: String,
    pub class: DimensionClass,
    pub is_gripper: bool,
    pub mean_abs_delta: f64,
    /// Std of deltas divided by the dimension's value range.
    pub normalized_std: Option<f64>,
    pub normalized_max_delta: Option<f64>,
    pub verdict: Option<Smoothness>,
    pub histogram: Vec<HistogramBin>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JerkyEpisode {
    pub episode: u64,
    pub mean_abs_delta: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VelocityReport {
    pub dimensions: Vec<DimensionVelocity>,
    pub overall: Option<Smoothness>,
    pub jerkiest: Vec<JerkyEpisode>,
}

fn distinct_at_most(values: &[f64], limit: usize) -> bool {
    let mut seen: Vec<u64> = Vec::with_capacity(limit + 1);
    for v in values {
        let bits = v.to_bits();
        if !seen.contains(&bits) {
            seen.push(bits);
            if seen.len() > limit {
                return false;
            }
        }
    }
    true
}

fn deltas(series: &[f64]) -> impl Iterator<Item = f64> + '_ {
    series.windows(2).map(|w| w[1] - w[0])
}

fn analyze_dimension(view: &SampleView, dim: usize, name: &str, options: &AnalyticsOptions) -> DimensionVelocity {
    let values: Vec<f64> = view.actions.iter().flat_map(|ep| ep[dim].iter().copied()).collect();
    let all_deltas: Vec<f64> = view.actions.iter().flat_map(|ep| deltas(&ep[dim])).collect();
    let abs_deltas: Vec<f64> = all_deltas.iter().map(|d| d.abs()).collect();
    let range = min_max(&values).map(|(lo, hi)| hi - lo).unwrap_or(0.0);

    let class = if distinct_at_most(&values, MAX_DISCRETE_VALUES) {
        DimensionClass::Discrete
    } else if range <= 0.0
        || percentile_sorted(&sorted(&abs_deltas), 95.0) < INACTIVE_FRACTION * range
    {
        DimensionClass::Inactive
    } else {
        DimensionClass::Active
    };

    let normalized: Vec<f64> = if range > 0.0 {
        all_deltas.iter().map(|d| d / range).collect()
    } else {
        Vec::new()
    };
    let active = class == DimensionClass::Active;

    DimensionVelocity {
        name: name.to_string(),
        class,
        is_gripper: name
            .to_lowercase()
            .contains(&options.gripper_pattern.to_lowercase()),
        mean_abs_delta: mean(&abs_deltas),
        normalized_std: active.then(|| std_dev(&normalized)),
        normalized_max_delta: active.then(|| normalized.iter().fold(0.0f64, |m, d| m.max(d.abs()))),
        verdict: None,
        histogram: equal_width_histogram(&normalized, HISTOGRAM_BINS),
    }
}

fn classify(ratio: f64) -> Smoothness {
    if ratio < MODERATE_RATIO {
        Smoothness::Smooth
    } else if ratio < JERKY_RATIO {
        Smoothness::Moderate
    } else {
        Smoothness::Jerky
    }
}

/// Overall verdict over active dimensions. Grippers are left out of the
/// vote unless nothing else is active.
fn overall_verdict(dimensions: &[DimensionVelocity]) -> Option<Smoothness> {
    let active: Vec<&DimensionVelocity> = dimensions.iter().filter(|d| d.verdict.is_some()).collect();
    let arm: Vec<&DimensionVelocity> = active.iter().copied().filter(|d| !d.is_gripper).collect();
    let voters = if arm.is_empty() { &active } else { &arm };
    if voters.is_empty() {
        return None;
    }

    let smooth = voters
        .iter()
        .filter(|d| d.verdict == Some(Smoothness::Smooth))
        .count();
    let smooth_ratio = smooth as f64 / voters.len() as f64;
    let jerky_arm = arm
        .iter()
        .filter(|d| d.verdict == Some(Smoothness::Jerky))
        .count();

    Some(if smooth_ratio >= 0.6 && jerky_arm == 0 {
        Smoothness::Smooth
    } else if jerky_arm > 2 || smooth_ratio < 0.3 {
        Smoothness::Jerky
    } else {
        Smoothness::Moderate
    })
}

pub fn compute(view: &SampleView, options: &AnalyticsOptions) -> Result<VelocityReport, NotComputed> {
    if view.is_empty() || view.action_dims() == 0 {
        return Err(NotComputed::new("no action series in sample"));
    }
    if (0..view.len()).all(|ep| view.frames(ep) < 2) {
        return Err(NotComputed::new("episodes have fewer than two frames"));
    }

    let mut dimensions: Vec<DimensionVelocity> = view
        .action_names
        .iter()
        .enumerate()
        .map(|(dim, name)| analyze_dimension(view, dim, name, options))
        .collect();

    // Per-dimension verdicts are relative to the roughest active dimension
    let max_std = dimensions
        .iter()
        .filter_map(|d| d.normalized_std)
        .fold(0.0f64, f64::max);
    for dim in dimensions.iter_mut() {
        if let Some(std) = dim.normalized_std {
            let ratio = if max_std > 0.0 { std / max_std } else { 0.0 };
            dim.verdict = Some(classify(ratio));
        }
    }

    let mut jerkiest: Vec<JerkyEpisode> = view
        .episodes
        .iter()
        .zip(&view.actions)
        .filter(|(_, dims)| dims.first().is_some_and(|d| d.len() >= 2))
        .map(|(&episode, dims)| {
            let per_dim: Vec<f64> = dims
                .iter()
                .map(|series| mean(&deltas(series).map(f64::abs).collect::<Vec<_>>()))
                .collect();
            JerkyEpisode {
                episode,
                mean_abs_delta: mean(&per_dim),
            }
        })
        .collect();
    jerkiest.sort_by(|a, b| {
        b.mean_abs_delta
            .total_cmp(&a.mean_abs_delta)
            .then(a.episode.cmp(&b.episode))
    });
    jerkiest.truncate(options.top_jerky);

    Ok(VelocityReport {
        overall: overall_verdict(&dimensions),
        dimensions,
        jerkiest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::view::fixtures::sample;

    fn noise(t: usize, seed: usize) -> f64 {
        ((t * 7919 + seed * 104_729) % 17) as f64 / 16.0
    }

    fn smooth(t: usize, phase: f64) -> f64 {
        (t as f64 / 20.0 + phase).sin()
    }

    fn gripper(t: usize) -> f64 {
        let open = if (t / 5) % 2 == 0 { 0.0 } else { 1.0 };
        open + t as f64 * 1e-3
    }

    fn run(episodes: Vec<Vec<(&str, Vec<f64>)>>) -> VelocityReport {
        let s = sample(episodes);
        let options = AnalyticsOptions::default();
        compute(&SampleView::new(&s, &options), &options).unwrap()
    }

    #[test]
    fn test_smooth_arm_with_gripper_reference() {
        let frames = 100;
        let episode = || {
            vec![
                ("action | shoulder", (0..frames).map(|t| smooth(t, 0.0)).collect()),
                ("action | elbow", (0..frames).map(|t| smooth(t, 1.0)).collect()),
                ("action | gripper", (0..frames).map(gripper).collect()),
            ]
        };
        let report = run(vec![episode(), episode()]);

        assert_eq!(report.dimensions[0].verdict, Some(Smoothness::Smooth));
        assert_eq!(report.dimensions[1].verdict, Some(Smoothness::Smooth));
        assert!(report.dimensions[2].is_gripper);
        assert_eq!(report.dimensions[2].verdict, Some(Smoothness::Jerky));
        assert_eq!(report.overall, Some(Smoothness::Smooth));
    }

    #[test]
    fn test_noisy_arm_is_jerky() {
        let frames = 120;
        let episode = || {
            vec![
                ("action | a", (0..frames).map(|t| noise(t, 1)).collect()),
                ("action | b", (0..frames).map(|t| noise(t, 2)).collect()),
                ("action | c", (0..frames).map(|t| noise(t, 3)).collect()),
                ("action | d", (0..frames).map(|t| smooth(t, 0.0)).collect()),
            ]
        };
        let report = run(vec![episode()]);
        for dim in &report.dimensions[..3] {
            assert_eq!(dim.verdict, Some(Smoothness::Jerky), "{}", dim.name);
        }
        assert_eq!(report.overall, Some(Smoothness::Jerky));
    }

    #[test]
    fn test_discrete_and_inactive_dimensions() {
        let frames = 50;
        let report = run(vec![vec![
            ("action | toggle", (0..frames).map(|t| (t % 2) as f64).collect()),
            // Creeps by 1e-6 per frame with a single jump at the end
            (
                "action | still",
                (0..frames)
                    .map(|t| if t + 1 == frames { 1.25 } else { 0.25 + t as f64 * 1e-6 })
                    .collect(),
            ),
            ("action | move", (0..frames).map(|t| smooth(t, 0.0)).collect()),
        ]]);
        assert_eq!(report.dimensions[0].class, DimensionClass::Discrete);
        assert_eq!(report.dimensions[0].verdict, None);
        assert_eq!(report.dimensions[1].class, DimensionClass::Inactive);
        assert_eq!(report.dimensions[2].class, DimensionClass::Active);
        assert_eq!(report.dimensions[2].histogram.len(), HISTOGRAM_BINS);
    }

    #[test]
    fn test_jerkiest_ranking() {
        let calm: Vec<f64> = (0..40).map(|t| t as f64 * 0.01).collect();
        let wild: Vec<f64> = (0..40).map(|t| noise(t, 5) * 10.0).collect();
        let report = run(vec![
            vec![("action | x", calm.clone())],
            vec![("action | x", wild)],
            vec![("action | x", calm)],
        ]);
        assert_eq!(report.jerkiest[0].episode, 1);
        assert_eq!(report.jerkiest.len(), 3);
    }
}
