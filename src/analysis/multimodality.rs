// Bimodality coefficient per (time bin, action dimension) cell

use crate::analysis::stats::mean;
use crate::analysis::variance::{bin_edges, column, resampled_dimension};
use crate::analysis::view::{AnalyticsOptions, SampleView};
use crate::core::error::NotComputed;
use serde::Serialize;

/// BC of a uniform distribution. Larger values suggest more than one mode.
pub const BIMODAL_THRESHOLD: f64 = 5.0 / 9.0;
pub const MIN_CELL_SAMPLES: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Modality {
    #[serde(rename = "Mostly Unimodal")]
    MostlyUnimodal,
    #[serde(rename = "Some Multimodality")]
    SomeMultimodality,
    #[serde(rename = "Significantly Multimodal")]
    SignificantlyMultimodal,
}

impl Modality {
    pub fn from_fraction(fraction: f64) -> Self {
        if fraction < 0.1 {
            Modality::MostlyUnimodal
        } else if fraction < 0.3 {
            Modality::SomeMultimodality
        } else {
            Modality::SignificantlyMultimodal
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MultimodalityHeatmap {
    pub dimensions: Vec<String>,
    pub bin_edges: Vec<f64>,
    /// Bimodality coefficient indexed `[time_bin][dimension]`.
    pub cells: Vec<Vec<f64>>,
    pub bimodal_fraction: f64,
    pub verdict: Modality,
}

/// Sample bimodality coefficient using the bias-corrected skewness and
/// excess kurtosis estimators. `None` below four values; zero when the
/// values do not vary.
pub fn bimodality_coefficient(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < MIN_CELL_SAMPLES {
        return None;
    }
    let nf = n as f64;
    let m = mean(values);
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in values {
        let d = v - m;
        m2 += d * d;
        m3 += d * d * d;
        m4 += d * d * d * d;
    }
    m2 /= nf;
    m3 /= nf;
    m4 /= nf;
    if m2 <= f64::EPSILON {
        return Some(0.0);
    }

    let g1 = m3 / m2.powf(1.5);
    let g2 = m4 / (m2 * m2) - 3.0;
    let skew = g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0);
    let kurtosis = (nf - 1.0) / ((nf - 2.0) * (nf - 3.0)) * ((nf + 1.0) * g2 + 6.0);

    let correction = 3.0 * (nf - 1.0).powi(2) / ((nf - 2.0) * (nf - 3.0));
    Some((skew * skew + 1.0) / (kurtosis + correction))
}

pub fn compute(
    view: &SampleView,
    options: &AnalyticsOptions,
) -> Result<MultimodalityHeatmap, NotComputed> {
    if view.action_dims() == 0 {
        return Err(NotComputed::new("no action series in sample"));
    }
    if view.len() < MIN_CELL_SAMPLES {
        return Err(NotComputed::new(format!(
            "multimodality needs at least {} episodes",
            MIN_CELL_SAMPLES
        )));
    }
    let bins = options.time_bins.max(1);

    let per_dim: Vec<Vec<Vec<f64>>> = (0..view.action_dims())
        .map(|dim| resampled_dimension(view, dim, bins))
        .collect();

    let cells: Vec<Vec<f64>> = (0..bins)
        .map(|bin| {
            per_dim
                .iter()
                .map(|resampled| bimodality_coefficient(&column(resampled, bin)).unwrap_or(0.0))
                .collect()
        })
        .collect();

    let total = cells.iter().map(Vec::len).sum::<usize>();
    let bimodal = cells
        .iter()
        .flatten()
        .filter(|&&bc| bc > BIMODAL_THRESHOLD)
        .count();
    let bimodal_fraction = bimodal as f64 / total as f64;

    Ok(MultimodalityHeatmap {
        dimensions: view.action_names.clone(),
        bin_edges: bin_edges(bins),
        cells,
        bimodal_fraction,
        verdict: Modality::from_fraction(bimodal_fraction),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::view::fixtures::sample;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn gaussian(rng: &mut StdRng) -> f64 {
        // Box-Muller
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    #[test]
    fn test_two_separated_clusters_are_bimodal() {
        let mut rng = StdRng::seed_from_u64(7);
        let values: Vec<f64> = (0..200)
            .map(|i| {
                let centre = if i % 2 == 0 { -5.0 } else { 5.0 };
                centre + 0.3 * gaussian(&mut rng)
            })
            .collect();
        let bc = bimodality_coefficient(&values).unwrap();
        assert!(bc > BIMODAL_THRESHOLD, "bc = {}", bc);
    }

    #[test]
    fn test_gaussian_is_unimodal() {
        let mut rng = StdRng::seed_from_u64(11);
        let values: Vec<f64> = (0..2000).map(|_| gaussian(&mut rng)).collect();
        let bc = bimodality_coefficient(&values).unwrap();
        assert!(bc < BIMODAL_THRESHOLD, "bc = {}", bc);
    }

    #[test]
    fn test_degenerate_cells() {
        assert_eq!(bimodality_coefficient(&[1.0, 2.0, 3.0]), None);
        assert_eq!(bimodality_coefficient(&[2.0; 10]), Some(0.0));
    }

    #[test]
    fn test_verdict_buckets() {
        assert_eq!(Modality::from_fraction(0.05), Modality::MostlyUnimodal);
        assert_eq!(Modality::from_fraction(0.1), Modality::SomeMultimodality);
        assert_eq!(Modality::from_fraction(0.3), Modality::SignificantlyMultimodal);
        assert_eq!(
            serde_json::to_value(Modality::SomeMultimodality).unwrap(),
            "Some Multimodality"
        );
    }

    #[test]
    fn test_split_strategies_flag_every_cell() {
        // Half the demonstrations go left, half go right
        let episodes: Vec<Vec<(&str, Vec<f64>)>> = (0..20)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                let jitter = i as f64 * 0.01;
                vec![(
                    "action | x",
                    (0..30).map(|t| sign * (1.0 + t as f64 * 0.1) + jitter).collect(),
                )]
            })
            .collect();
        let s = sample(episodes);
        let opts = AnalyticsOptions {
            time_bins: 10,
            ..AnalyticsOptions::default()
        };
        let heatmap = compute(&SampleView::new(&s, &opts), &opts).unwrap();
        assert_eq!(heatmap.cells.len(), 10);
        assert_eq!(heatmap.verdict, Modality::SignificantlyMultimodal);
    }
}
