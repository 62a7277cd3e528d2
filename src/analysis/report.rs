// Runs the seven cross-episode analytics and collects their outcomes

use crate::analysis::alignment::{self, AlignmentEnvelope};
use crate::analysis::autocorr::{self, AutocorrelationReport};
use crate::analysis::clustering::{self, TrajectoryClusters};
use crate::analysis::multimodality::{self, MultimodalityHeatmap};
use crate::analysis::speed::{self, SpeedDistribution};
use crate::analysis::variance::{self, VarianceHeatmap};
use crate::analysis::velocity::{self, VelocityReport};
use crate::analysis::view::{AnalyticsOptions, SampleView};
use crate::core::error::NotComputed;
use crate::core::sample::CrossEpisodeSample;
use serde::Serialize;
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticKind {
    Autocorrelation,
    Velocity,
    Variance,
    Multimodality,
    Alignment,
    Speed,
    Clustering,
}

impl AnalyticKind {
    pub const ALL: [AnalyticKind; 7] = [
        AnalyticKind::Autocorrelation,
        AnalyticKind::Velocity,
        AnalyticKind::Variance,
        AnalyticKind::Multimodality,
        AnalyticKind::Alignment,
        AnalyticKind::Speed,
        AnalyticKind::Clustering,
    ];
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum AnalyticsResult {
    Autocorrelation(AutocorrelationReport),
    Velocity(VelocityReport),
    Variance(VarianceHeatmap),
    Multimodality(MultimodalityHeatmap),
    Alignment(AlignmentEnvelope),
    Speed(SpeedDistribution),
    Clustering(TrajectoryClusters),
}

impl AnalyticsResult {
    pub fn kind(&self) -> AnalyticKind {
        match self {
            AnalyticsResult::Autocorrelation(_) => AnalyticKind::Autocorrelation,
            AnalyticsResult::Velocity(_) => AnalyticKind::Velocity,
            AnalyticsResult::Variance(_) => AnalyticKind::Variance,
            AnalyticsResult::Multimodality(_) => AnalyticKind::Multimodality,
            AnalyticsResult::Alignment(_) => AnalyticKind::Alignment,
            AnalyticsResult::Speed(_) => AnalyticKind::Speed,
            AnalyticsResult::Clustering(_) => AnalyticKind::Clustering,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalyticOutcome {
    Computed { result: AnalyticsResult },
    NotComputed { kind: AnalyticKind, reason: String },
}

impl AnalyticOutcome {
    pub fn kind(&self) -> AnalyticKind {
        match self {
            AnalyticOutcome::Computed { result } => result.kind(),
            AnalyticOutcome::NotComputed { kind, .. } => *kind,
        }
    }

    pub fn result(&self) -> Option<&AnalyticsResult> {
        match self {
            AnalyticOutcome::Computed { result } => Some(result),
            AnalyticOutcome::NotComputed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CrossEpisodeReport {
    pub dataset: String,
    /// Episodes the analytics actually ran on.
    pub sampled: Vec<u64>,
    pub skipped: Vec<u64>,
    /// One outcome per analytic, in `AnalyticKind::ALL` order.
    pub outcomes: Vec<AnalyticOutcome>,
}

impl CrossEpisodeReport {
    pub fn outcome(&self, kind: AnalyticKind) -> Option<&AnalyticOutcome> {
        self.outcomes.iter().find(|o| o.kind() == kind)
    }

    pub fn clusters(&self) -> Option<&TrajectoryClusters> {
        match self.outcome(AnalyticKind::Clustering)?.result()? {
            AnalyticsResult::Clustering(clusters) => Some(clusters),
            _ => None,
        }
    }
}

fn outcome<T>(
    kind: AnalyticKind,
    computed: Result<T, NotComputed>,
    wrap: fn(T) -> AnalyticsResult,
) -> AnalyticOutcome {
    match computed {
        Ok(value) => AnalyticOutcome::Computed {
            result: wrap(value),
        },
        Err(err) => {
            debug!("{:?} not computed: {}", kind, err.reason);
            AnalyticOutcome::NotComputed {
                kind,
                reason: err.reason,
            }
        }
    }
}

fn run(kind: AnalyticKind, view: &SampleView, options: &AnalyticsOptions) -> AnalyticOutcome {
    match kind {
        AnalyticKind::Autocorrelation => {
            outcome(kind, autocorr::compute(view), AnalyticsResult::Autocorrelation)
        }
        AnalyticKind::Velocity => outcome(kind, velocity::compute(view, options), AnalyticsResult::Velocity),
        AnalyticKind::Variance => outcome(kind, variance::compute(view, options), AnalyticsResult::Variance),
        AnalyticKind::Multimodality => outcome(
            kind,
            multimodality::compute(view, options),
            AnalyticsResult::Multimodality,
        ),
        AnalyticKind::Alignment => outcome(kind, alignment::compute(view), AnalyticsResult::Alignment),
        AnalyticKind::Speed => outcome(kind, speed::compute(view), AnalyticsResult::Speed),
        AnalyticKind::Clustering => {
            outcome(kind, clustering::compute(view, options), AnalyticsResult::Clustering)
        }
    }
}

/// Runs every analytic on its own scoped thread. Analytics share the
/// read-only view and never see each other's output.
pub fn analyze(sample: &CrossEpisodeSample, options: &AnalyticsOptions) -> CrossEpisodeReport {
    let view = SampleView::new(sample, options);
    info!(
        "analyzing {} episodes of {} ({} action dims, {} state dims)",
        view.len(),
        sample.dataset,
        view.action_dims(),
        view.state_names.len()
    );

    let view = &view;
    let outcomes = thread::scope(|scope| {
        let handles: Vec<_> = AnalyticKind::ALL
            .iter()
            .map(|&kind| (kind, scope.spawn(move || run(kind, view, options))))
            .collect();
        handles
            .into_iter()
            .map(|(kind, handle)| {
                handle.join().unwrap_or_else(|_| {
                    warn!("{:?} analytic panicked", kind);
                    AnalyticOutcome::NotComputed {
                        kind,
                        reason: "analytic failed unexpectedly".to_string(),
                    }
                })
            })
            .collect()
    });

    CrossEpisodeReport {
        dataset: sample.dataset.clone(),
        sampled: view.episodes.clone(),
        skipped: sample.skipped.clone(),
        outcomes,
    }
}

/// Sorted, de-duplicated union of trajectory outliers and user flags.
pub fn flagged_episodes(report: &CrossEpisodeReport, user_flags: &[u64]) -> Vec<u64> {
    let mut flagged: Vec<u64> = report
        .clusters()
        .map(|clusters| clusters.outliers.clone())
        .unwrap_or_default();
    flagged.extend_from_slice(user_flags);
    flagged.sort_unstable();
    flagged.dedup();
    flagged
}

pub fn render_flagged(episodes: &[u64]) -> String {
    episodes
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
