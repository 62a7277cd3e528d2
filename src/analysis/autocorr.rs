// Action autocorrelation and the action-chunk length it suggests

use crate::analysis::stats::{mean, median, variance};
use crate::analysis::view::SampleView;
use crate::core::error::NotComputed;
use serde::Serialize;

pub const MAX_LAG: usize = 100;
pub const DECORRELATION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DimensionAutocorrelation {
    pub name: String,
    /// `curve[i]` is the mean autocorrelation at lag `i + 1`.
    pub curve: Vec<f64>,
    pub decorrelation_lag: Option<usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AutocorrelationReport {
    pub dimensions: Vec<DimensionAutocorrelation>,
    pub suggested_chunk_length: Option<usize>,
}

/// Normalized autocorrelation at lags `1..=min(n / 2, 100)`. A series with
/// no variance yields all zeros.
pub fn autocorrelation(values: &[f64]) -> Vec<f64> {
    let max_lag = (values.len() / 2).min(MAX_LAG);
    let m = mean(values);
    let centered: Vec<f64> = values.iter().map(|v| v - m).collect();
    let energy: f64 = centered.iter().map(|c| c * c).sum();

    if energy <= f64::EPSILON {
        return vec![0.0; max_lag];
    }

    (1..=max_lag)
        .map(|lag| {
            centered
                .iter()
                .zip(&centered[lag..])
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / energy
        })
        .collect()
}

/// First lag whose autocorrelation falls below 0.5.
pub fn decorrelation_lag(curve: &[f64]) -> Option<usize> {
    curve
        .iter()
        .position(|&r| r < DECORRELATION_THRESHOLD)
        .map(|i| i + 1)
}

pub fn compute(view: &SampleView) -> Result<AutocorrelationReport, NotComputed> {
    if view.is_empty() || view.action_dims() == 0 {
        return Err(NotComputed::new("no action series in sample"));
    }

    let dimensions: Vec<DimensionAutocorrelation> = view
        .action_names
        .iter()
        .enumerate()
        .map(|(dim, name)| {
            // Average per-episode curves lag by lag
            let curves: Vec<Vec<f64>> = view
                .actions
                .iter()
                .map(|episode| autocorrelation(&episode[dim]))
                .collect();
            let longest = curves.iter().map(Vec::len).max().unwrap_or(0);
            let curve: Vec<f64> = (0..longest)
                .map(|lag| {
                    let at_lag: Vec<f64> = curves.iter().filter_map(|c| c.get(lag).copied()).collect();
                    mean(&at_lag)
                })
                .collect();

            // A joint that never moves has no decorrelation lag to suggest
            let moves = view
                .actions
                .iter()
                .any(|episode| variance(&episode[dim]) > f64::EPSILON);

            DimensionAutocorrelation {
                name: name.clone(),
                decorrelation_lag: if moves { decorrelation_lag(&curve) } else { None },
                curve,
            }
        })
        .collect();

    if dimensions.iter().all(|d| d.curve.is_empty()) {
        return Err(NotComputed::new("episodes too short for any lag"));
    }

    let lags: Vec<f64> = dimensions
        .iter()
        .filter_map(|d| d.decorrelation_lag)
        .map(|lag| lag as f64)
        .collect();
    let suggested_chunk_length = (!lags.is_empty()).then(|| median(&lags).round() as usize);

    Ok(AutocorrelationReport {
        dimensions,
        suggested_chunk_length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::view::fixtures::sample;
    use crate::analysis::view::AnalyticsOptions;

    #[test]
    fn test_constant_series_has_zero_curve() {
        let curve = autocorrelation(&[3.0; 40]);
        assert_eq!(curve.len(), 20);
        assert!(curve.iter().all(|&r| r == 0.0));
        // A flat curve is "decorrelated" from the first lag
        assert_eq!(decorrelation_lag(&curve), Some(1));
    }

    #[test]
    fn test_lag_cap() {
        let values: Vec<f64> = (0..500).map(|i| (i as f64 * 0.1).sin()).collect();
        assert_eq!(autocorrelation(&values).len(), MAX_LAG);
    }

    #[test]
    fn test_slow_signal_decorrelates_later_than_noise() {
        let slow: Vec<f64> = (0..200).map(|i| (i as f64 / 30.0).sin()).collect();
        let alternating: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();

        let slow_lag = decorrelation_lag(&autocorrelation(&slow)).unwrap();
        let fast_lag = decorrelation_lag(&autocorrelation(&alternating)).unwrap();
        assert_eq!(fast_lag, 1);
        assert!(slow_lag > 10, "slow lag was {}", slow_lag);
    }

    #[test]
    fn test_suggested_chunk_is_median() {
        let slow: Vec<f64> = (0..200).map(|i| (i as f64 / 30.0).sin()).collect();
        let fast: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let s = sample(vec![
            vec![("action | a", slow.clone()), ("action | b", fast.clone())],
            vec![("action | a", slow), ("action | b", fast)],
        ]);
        let view = SampleView::new(&s, &AnalyticsOptions::default());
        let report = compute(&view).unwrap();

        let a = report.dimensions[0].decorrelation_lag.unwrap();
        let b = report.dimensions[1].decorrelation_lag.unwrap();
        assert_eq!(b, 1);
        let expected = ((a + b) as f64 / 2.0).round() as usize;
        assert_eq!(report.suggested_chunk_length, Some(expected));
    }

    #[test]
    fn test_still_dimension_does_not_shorten_chunk() {
        let slow: Vec<f64> = (0..200).map(|i| (i as f64 / 30.0).sin()).collect();
        let s = sample(vec![
            vec![("action | a", slow.clone()), ("action | pad", vec![0.0; 200])],
            vec![("action | a", slow), ("action | pad", vec![0.0; 200])],
        ]);
        let view = SampleView::new(&s, &AnalyticsOptions::default());
        let report = compute(&view).unwrap();

        let a = report.dimensions[0].decorrelation_lag.unwrap();
        assert_eq!(report.dimensions[1].decorrelation_lag, None);
        assert_eq!(report.suggested_chunk_length, Some(a));
    }

    #[test]
    fn test_empty_view_not_computed() {
        assert!(compute(&SampleView::default()).is_err());
    }
}
