// Demonstrator speed consistency across episodes

use crate::analysis::stats::{equal_width_histogram, mean, median, std_dev, HistogramBin};
use crate::analysis::view::SampleView;
use crate::core::error::NotComputed;
use serde::Serialize;

pub const MIN_EPISODES: usize = 3;
const MAX_BINS: usize = 30;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum SpeedConsistency {
    Consistent,
    #[serde(rename = "Moderate variance")]
    ModerateVariance,
    #[serde(rename = "High variance")]
    HighVariance,
}

impl SpeedConsistency {
    pub fn from_cv(cv: f64) -> Self {
        if cv < 0.2 {
            SpeedConsistency::Consistent
        } else if cv < 0.4 {
            SpeedConsistency::ModerateVariance
        } else {
            SpeedConsistency::HighVariance
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EpisodeSpeed {
    pub episode: u64,
    pub speed: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpeedDistribution {
    pub episodes: Vec<EpisodeSpeed>,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub cv: f64,
    pub histogram: Vec<HistogramBin>,
    pub verdict: SpeedConsistency,
}

/// Mean Euclidean norm of the frame-to-frame action delta vector.
pub fn episode_speed(dims: &[Vec<f64>]) -> Option<f64> {
    let frames = dims.first()?.len();
    if frames < 2 {
        return None;
    }
    let norms: Vec<f64> = (1..frames)
        .map(|t| {
            dims.iter()
                .map(|series| (series[t] - series[t - 1]).powi(2))
                .sum::<f64>()
                .sqrt()
        })
        .collect();
    Some(mean(&norms))
}

pub fn compute(view: &SampleView) -> Result<SpeedDistribution, NotComputed> {
    let episodes: Vec<EpisodeSpeed> = view
        .episodes
        .iter()
        .zip(&view.actions)
        .filter_map(|(&episode, dims)| episode_speed(dims).map(|speed| EpisodeSpeed { episode, speed }))
        .collect();
    if episodes.len() < MIN_EPISODES {
        return Err(NotComputed::new(format!(
            "speed variance needs at least {} episodes with motion data",
            MIN_EPISODES
        )));
    }

    let speeds: Vec<f64> = episodes.iter().map(|e| e.speed).collect();
    let mean = mean(&speeds);
    let std_dev = std_dev(&speeds);
    let cv = if mean > 0.0 { std_dev / mean } else { 0.0 };
    let bins = ((speeds.len() as f64).sqrt().ceil() as usize).min(MAX_BINS);

    Ok(SpeedDistribution {
        median: median(&speeds),
        histogram: equal_width_histogram(&speeds, bins),
        verdict: SpeedConsistency::from_cv(cv),
        episodes,
        mean,
        std_dev,
        cv,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::view::fixtures::sample;
    use crate::analysis::view::AnalyticsOptions;

    fn ramp(step: f64, frames: usize) -> Vec<f64> {
        (0..frames).map(|t| t as f64 * step).collect()
    }

    #[test]
    fn test_speed_is_euclidean_delta_norm() {
        let speed = episode_speed(&[ramp(3.0, 5), ramp(4.0, 5)]).unwrap();
        assert!((speed - 5.0).abs() < 1e-12);
        assert_eq!(episode_speed(&[vec![1.0]]), None);
    }

    #[test]
    fn test_consistent_demonstrators() {
        let s = sample(
            (0..9)
                .map(|i| vec![("action | x", ramp(1.0 + i as f64 * 0.01, 20))])
                .collect(),
        );
        let report = compute(&SampleView::new(&s, &AnalyticsOptions::default())).unwrap();
        assert_eq!(report.verdict, SpeedConsistency::Consistent);
        assert_eq!(report.histogram.len(), 3);
        let total: usize = report.histogram.iter().map(|b| b.count).sum();
        assert_eq!(total, 9);
    }

    #[test]
    fn test_mixed_speeds_have_high_variance() {
        let s = sample(vec![
            vec![("action | x", ramp(0.1, 20))],
            vec![("action | x", ramp(1.0, 20))],
            vec![("action | x", ramp(2.0, 20))],
        ]);
        let report = compute(&SampleView::new(&s, &AnalyticsOptions::default())).unwrap();
        assert_eq!(report.verdict, SpeedConsistency::HighVariance);
        assert!((report.median - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_motionless_sample_has_zero_cv() {
        let s = sample((0..3).map(|_| vec![("action | x", vec![0.5; 10])]).collect());
        let report = compute(&SampleView::new(&s, &AnalyticsOptions::default())).unwrap();
        assert_eq!(report.cv, 0.0);
        assert_eq!(report.verdict, SpeedConsistency::Consistent);
    }

    #[test]
    fn test_too_few_episodes() {
        let s = sample(vec![
            vec![("action | x", ramp(1.0, 5))],
            vec![("action | x", ramp(2.0, 5))],
        ]);
        assert!(compute(&SampleView::new(&s, &AnalyticsOptions::default())).is_err());
    }
}
