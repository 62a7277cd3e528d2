// Action/state matrices extracted once from a cross-episode sample

use crate::core::format::EpisodeRecord;
use crate::core::sample::CrossEpisodeSample;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsOptions {
    /// Series whose name starts with this are actions.
    pub action_prefix: String,
    /// Non-action series containing this are states.
    pub state_marker: String,
    /// Case-insensitive substring marking gripper dimensions.
    pub gripper_pattern: String,
    /// Normalized time bins for the heatmaps.
    pub time_bins: usize,
    /// Resampled length of each trajectory before clustering.
    pub trajectory_samples: usize,
    pub top_jerky: usize,
    pub k_min: usize,
    pub k_max: usize,
    pub kmeans_seed: u64,
    pub kmeans_iterations: usize,
}

impl Default for AnalyticsOptions {
    fn default() -> Self {
        Self {
            action_prefix: "action".to_string(),
            state_marker: "state".to_string(),
            gripper_pattern: "gripper".to_string(),
            time_bins: 50,
            trajectory_samples: 30,
            top_jerky: 10,
            k_min: 2,
            k_max: 5,
            kmeans_seed: 42,
            kmeans_iterations: 100,
        }
    }
}

/// Per-episode matrices indexed `[episode][dimension][frame]`. Missing
/// values are forward-filled; leading gaps take 0.
#[derive(Debug, Clone, Default)]
pub struct SampleView {
    pub episodes: Vec<u64>,
    pub action_names: Vec<String>,
    pub actions: Vec<Vec<Vec<f64>>>,
    pub state_names: Vec<String>,
    pub states: Vec<Vec<Vec<f64>>>,
}

fn forward_fill(values: &[f64]) -> Vec<f64> {
    let mut last = 0.0;
    values
        .iter()
        .map(|&v| {
            if v.is_finite() {
                last = v;
            }
            last
        })
        .collect()
}

fn extract(record: &EpisodeRecord, names: &[String]) -> Option<Vec<Vec<f64>>> {
    names
        .iter()
        .map(|name| record.series(name).map(|s| forward_fill(&s.values)))
        .collect()
}

impl SampleView {
    pub fn new(sample: &CrossEpisodeSample, options: &AnalyticsOptions) -> Self {
        let Some(first) = sample
            .episodes
            .iter()
            .find(|record| record.series_names().any(|n| n.starts_with(&options.action_prefix)))
        else {
            return Self::default();
        };

        let action_names: Vec<String> = first
            .series_names()
            .filter(|name| name.starts_with(&options.action_prefix))
            .map(str::to_string)
            .collect();
        let state_names: Vec<String> = first
            .series_names()
            .filter(|name| {
                !name.starts_with(&options.action_prefix) && name.contains(&options.state_marker)
            })
            .map(str::to_string)
            .collect();

        let mut view = Self {
            action_names,
            state_names,
            ..Self::default()
        };

        for record in &sample.episodes {
            let Some(actions) = extract(record, &view.action_names) else {
                debug!("episode {} lacks some action series, left out", record.episode);
                continue;
            };
            let states = extract(record, &view.state_names)
                .unwrap_or_else(|| vec![Vec::new(); view.state_names.len()]);
            view.episodes.push(record.episode);
            view.actions.push(actions);
            view.states.push(states);
        }
        view
    }

    pub fn action_dims(&self) -> usize {
        self.action_names.len()
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn frames(&self, episode: usize) -> usize {
        self.actions[episode].first().map(Vec::len).unwrap_or(0)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::sample;
    use super::*;

    #[test]
    fn test_view_splits_actions_and_states() {
        let s = sample(vec![vec![
            ("action | x", vec![1.0, f64::NAN, 3.0]),
            ("observation.state | x", vec![f64::NAN, 2.0, 2.0]),
            ("reward", vec![0.0, 0.0, 1.0]),
        ]]);
        let view = SampleView::new(&s, &AnalyticsOptions::default());
        assert_eq!(view.action_names, vec!["action | x"]);
        assert_eq!(view.state_names, vec!["observation.state | x"]);
        assert_eq!(view.actions[0][0], vec![1.0, 1.0, 3.0]);
        assert_eq!(view.states[0][0], vec![0.0, 2.0, 2.0]);
        assert_eq!(view.frames(0), 3);
    }

    #[test]
    fn test_view_without_actions_is_empty() {
        let s = sample(vec![vec![("reward", vec![0.0, 1.0])]]);
        assert!(SampleView::new(&s, &AnalyticsOptions::default()).is_empty());
    }
}
