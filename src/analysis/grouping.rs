// Series grouping: suffix groups merged by numeric scale into chart groups

use crate::analysis::stats::min_max;
use crate::core::constants::SERIES_DELIMITER;
use crate::core::format::EpisodeRecord;
use serde::Serialize;
use std::collections::BTreeMap;

pub const MAX_SERIES_PER_GROUP: usize = 6;
pub const LOG_SCALE_TOLERANCE: f64 = 2.0;
const LOG_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ChartValue {
    Scalar(f64),
    /// Series sharing a suffix, keyed by their prefix.
    Nested(BTreeMap<String, f64>),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChartRow {
    pub timestamp: f64,
    #[serde(flatten)]
    pub values: BTreeMap<String, ChartValue>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChartGroup {
    pub series: Vec<String>,
    pub rows: Vec<ChartRow>,
}

fn split_name(name: &str) -> (&str, &str) {
    let mut tokens = name.split(SERIES_DELIMITER);
    let prefix = tokens.next().unwrap_or(name);
    match tokens.next() {
        Some(suffix) => (prefix, suffix),
        None => (name, name),
    }
}

struct SuffixGroup {
    members: Vec<usize>,
    log_min: f64,
    log_max: f64,
    flat: bool,
}

fn log_scale(value: f64) -> f64 {
    (value.abs() + LOG_EPSILON).log10()
}

/// Partitions an episode's series into chart groups of at most six series
/// with comparable numeric scale.
pub fn group_series(record: &EpisodeRecord) -> Vec<ChartGroup> {
    // Suffix groups in first-seen order
    let mut keys: Vec<&str> = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    for (index, series) in record.series.iter().enumerate() {
        let (_, suffix) = split_name(&series.name);
        match keys.iter().position(|key| *key == suffix) {
            Some(position) => members[position].push(index),
            None => {
                keys.push(suffix);
                members.push(vec![index]);
            }
        }
    }

    // One combined range per group; groups without finite data are dropped
    let groups: Vec<SuffixGroup> = members
        .into_iter()
        .filter_map(|members| {
            let values: Vec<f64> = members
                .iter()
                .flat_map(|&i| record.series[i].values.iter().copied())
                .collect();
            let (min, max) = min_max(&values)?;
            Some(SuffixGroup {
                members,
                log_min: log_scale(min),
                log_max: log_scale(max),
                flat: min == max,
            })
        })
        .collect();

    // Greedy scale clustering; flat groups neither anchor nor join
    let mut used = vec![false; groups.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for anchor in 0..groups.len() {
        if used[anchor] {
            continue;
        }
        used[anchor] = true;
        let mut cluster = vec![anchor];

        if !groups[anchor].flat {
            for other in 0..groups.len() {
                if used[other] || groups[other].flat {
                    continue;
                }
                let close = (groups[anchor].log_min - groups[other].log_min).abs()
                    <= LOG_SCALE_TOLERANCE
                    && (groups[anchor].log_max - groups[other].log_max).abs()
                        <= LOG_SCALE_TOLERANCE;
                if close {
                    used[other] = true;
                    cluster.push(other);
                }
            }
        }
        clusters.push(cluster);
    }

    // Largest clusters first; sort is stable so ties keep discovery order
    clusters.sort_by(|a, b| b.len().cmp(&a.len()));

    clusters
        .iter()
        .flat_map(|cluster| {
            let series: Vec<usize> = cluster
                .iter()
                .flat_map(|&g| groups[g].members.iter().copied())
                .collect();
            series
                .chunks(MAX_SERIES_PER_GROUP)
                .map(|chunk| build_group(record, chunk))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn build_group(record: &EpisodeRecord, series: &[usize]) -> ChartGroup {
    let mut suffix_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for &i in series {
        *suffix_counts
            .entry(split_name(&record.series[i].name).1)
            .or_default() += 1;
    }

    let rows = record
        .timestamps
        .iter()
        .enumerate()
        .map(|(frame, &timestamp)| {
            let mut values: BTreeMap<String, ChartValue> = BTreeMap::new();
            for &i in series {
                let name = &record.series[i].name;
                let value = record.series[i].values.get(frame).copied().unwrap_or(f64::NAN);
                let (prefix, suffix) = split_name(name);

                if suffix_counts.get(suffix).copied().unwrap_or(0) > 1 {
                    let entry = values
                        .entry(suffix.to_string())
                        .or_insert_with(|| ChartValue::Nested(BTreeMap::new()));
                    if let ChartValue::Nested(nested) = entry {
                        nested.insert(prefix.to_string(), value);
                    }
                } else {
                    values.insert(name.clone(), ChartValue::Scalar(value));
                }
            }
            ChartRow { timestamp, values }
        })
        .collect();

    ChartGroup {
        series: series.iter().map(|&i| record.series[i].name.clone()).collect(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::Series;
    use std::collections::HashSet;

    fn record(series: Vec<(&str, Vec<f64>)>) -> EpisodeRecord {
        let frames = series.first().map(|(_, v)| v.len()).unwrap_or(0);
        EpisodeRecord {
            episode: 0,
            task: None,
            timestamps: (0..frames).map(|i| i as f64 * 0.1).collect(),
            series: series
                .into_iter()
                .map(|(name, values)| Series {
                    name: name.to_string(),
                    values,
                })
                .collect(),
        }
    }

    #[test]
    fn test_shared_suffix_is_nested() {
        let rec = record(vec![("action | x", vec![1.0]), ("state | x", vec![2.0])]);
        let groups = group_series(&rec);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].series, vec!["action | x", "state | x"]);
        let row = &groups[0].rows[0];
        assert_eq!(row.values.len(), 1);
        match &row.values["x"] {
            ChartValue::Nested(nested) => {
                assert_eq!(nested["action"], 1.0);
                assert_eq!(nested["state"], 2.0);
            }
            other => panic!("expected nested value, got {:?}", other),
        }
    }

    #[test]
    fn test_distant_scales_do_not_merge() {
        let rec = record(vec![("a", vec![1.0, 10.0]), ("b", vec![1000.0, 10000.0])]);
        let groups = group_series(&rec);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_close_scales_merge() {
        let rec = record(vec![("a", vec![1.0, 10.0]), ("b", vec![5.0, 50.0])]);
        let groups = group_series(&rec);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].series, vec!["a", "b"]);
    }

    #[test]
    fn test_flat_group_stays_alone() {
        let rec = record(vec![
            ("a", vec![1.0, 10.0]),
            ("flat", vec![2.0, 2.0]),
            ("b", vec![2.0, 20.0]),
        ]);
        let groups = group_series(&rec);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].series, vec!["a", "b"]);
        assert_eq!(groups[1].series, vec!["flat"]);
    }

    #[test]
    fn test_empty_series_are_dropped() {
        let rec = record(vec![("a", vec![1.0, 2.0]), ("gone", vec![f64::NAN, f64::NAN])]);
        let groups = group_series(&rec);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].series, vec!["a"]);
    }

    #[test]
    fn test_groups_are_capped_and_cover_every_series() {
        let names: Vec<String> = (0..14)
            .map(|i| format!("action | joint{}", i))
            .chain((0..14).map(|i| format!("observation.state | joint{}", i)))
            .collect();
        let rec = record(
            names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.as_str(), vec![1.0 + i as f64, 2.0 + i as f64]))
                .collect(),
        );

        let groups = group_series(&rec);
        let mut seen = HashSet::new();
        for group in &groups {
            assert!(group.series.len() <= MAX_SERIES_PER_GROUP);
            for name in &group.series {
                assert!(seen.insert(name.clone()), "{} appears twice", name);
            }
        }
        assert_eq!(seen.len(), names.len());
    }

    #[test]
    fn test_largest_cluster_first() {
        let rec = record(vec![
            ("big", vec![1000.0, 9000.0]),
            ("a", vec![1.0, 10.0]),
            ("b", vec![2.0, 20.0]),
            ("c", vec![3.0, 30.0]),
        ]);
        let groups = group_series(&rec);
        assert_eq!(groups[0].series, vec!["a", "b", "c"]);
        assert_eq!(groups[1].series, vec!["big"]);
    }

    #[test]
    fn test_row_json_shape() {
        let rec = record(vec![("action | x", vec![1.0, 2.0]), ("reward", vec![0.5, 1.5])]);
        let groups = group_series(&rec);
        assert_eq!(groups.len(), 1);
        let json = serde_json::to_value(&groups[0].rows[0]).unwrap();
        assert_eq!(json["timestamp"], 0.0);
        assert_eq!(json["action | x"], 1.0);
        assert_eq!(json["reward"], 0.5);
    }
}
