// Cross-episode variance of actions over normalized episode progress

use crate::analysis::stats::{resample, variance};
use crate::analysis::view::{AnalyticsOptions, SampleView};
use crate::core::error::NotComputed;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VarianceHeatmap {
    pub dimensions: Vec<String>,
    /// `bin_edges[b]` is the progress (0..=1) where bin `b` starts; the last
    /// entry closes the final bin.
    pub bin_edges: Vec<f64>,
    /// Indexed `[time_bin][dimension]`.
    pub cells: Vec<Vec<f64>>,
}

pub fn bin_edges(bins: usize) -> Vec<f64> {
    (0..=bins).map(|b| b as f64 / bins as f64).collect()
}

/// Resamples every episode of one dimension, `[episode][bin]`.
pub(crate) fn resampled_dimension(view: &SampleView, dim: usize, bins: usize) -> Vec<Vec<f64>> {
    view.actions
        .iter()
        .map(|episode| resample(&episode[dim], bins))
        .collect()
}

/// Values of every episode at one bin.
pub(crate) fn column(resampled: &[Vec<f64>], bin: usize) -> Vec<f64> {
    resampled.iter().map(|episode| episode[bin]).collect()
}

pub fn compute(view: &SampleView, options: &AnalyticsOptions) -> Result<VarianceHeatmap, NotComputed> {
    if view.action_dims() == 0 {
        return Err(NotComputed::new("no action series in sample"));
    }
    if view.len() < 2 {
        return Err(NotComputed::new("variance needs at least two episodes"));
    }
    let bins = options.time_bins.max(1);

    let per_dim: Vec<Vec<Vec<f64>>> = (0..view.action_dims())
        .map(|dim| resampled_dimension(view, dim, bins))
        .collect();

    let cells = (0..bins)
        .map(|bin| {
            per_dim
                .iter()
                .map(|resampled| variance(&column(resampled, bin)))
                .collect()
        })
        .collect();

    Ok(VarianceHeatmap {
        dimensions: view.action_names.clone(),
        bin_edges: bin_edges(bins),
        cells,
    })
}
