// Episode-length statistics with an adaptively binned histogram

use crate::analysis::stats::{mean, median, percentile_sorted, round2, sorted, std_dev};
use serde::Serialize;

const TOP_N: usize = 5;
const MIN_BINS: f64 = 10.0;
const MAX_BINS: f64 = 50.0;
const NICE_STEPS: [f64; 5] = [1.0, 2.0, 2.5, 5.0, 10.0];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EpisodeDuration {
    pub episode: u64,
    pub frames: u64,
    pub seconds: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LengthBin {
    pub label: String,
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LengthStats {
    pub episodes: usize,
    pub shortest: Vec<EpisodeDuration>,
    pub longest: Vec<EpisodeDuration>,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub histogram: Vec<LengthBin>,
}

/// Summarizes `(episode, frame_count)` pairs. `None` for an empty list or a
/// non-positive frame rate.
pub fn episode_length_stats(lengths: &[(u64, u64)], fps: f64) -> Option<LengthStats> {
    if lengths.is_empty() || fps <= 0.0 {
        return None;
    }

    let mut ordered: Vec<(u64, u64)> = lengths.to_vec();
    ordered.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

    // Statistics use raw seconds; only reported values are rounded
    let seconds: Vec<f64> = ordered.iter().map(|&(_, frames)| frames as f64 / fps).collect();
    let reported = |&(episode, frames): &(u64, u64)| EpisodeDuration {
        episode,
        frames,
        seconds: round2(frames as f64 / fps),
    };
    let shortest = ordered.iter().take(TOP_N).map(reported).collect();
    let longest = ordered.iter().rev().take(TOP_N).map(reported).collect();

    Some(LengthStats {
        episodes: ordered.len(),
        shortest,
        longest,
        mean: round2(mean(&seconds)),
        median: round2(median(&seconds)),
        std_dev: round2(std_dev(&seconds)),
        histogram: duration_histogram(&seconds),
    })
}

/// Smallest of 1, 2, 2.5, 5, 10 times a power of ten that is >= `raw`.
pub fn nice_width(raw: f64) -> f64 {
    let magnitude = 10f64.powf(raw.log10().floor());
    NICE_STEPS
        .iter()
        .map(|step| step * magnitude)
        .find(|width| *width >= raw * (1.0 - 1e-12))
        .unwrap_or(10.0 * magnitude)
}

/// Histogram whose width is chosen from the 1st..99th percentile span so
/// extreme tails cannot flatten it; tail values clamp into the edge bins.
pub fn duration_histogram(values: &[f64]) -> Vec<LengthBin> {
    if values.is_empty() {
        return Vec::new();
    }
    let sorted = sorted(values);
    let p1 = percentile_sorted(&sorted, 1.0);
    let p99 = percentile_sorted(&sorted, 99.0);

    let target_bins = ((values.len() as f64).log2() + 1.0)
        .ceil()
        .clamp(MIN_BINS, MAX_BINS);
    let raw_width = (p99 - p1) / target_bins;

    if raw_width <= 0.0 || !raw_width.is_finite() {
        return vec![LengthBin {
            label: format!("{:.1}s", p1),
            start: p1,
            end: p1,
            count: values.len(),
        }];
    }

    let width = nice_width(raw_width);
    let lo = (p1 / width).floor() * width;
    let mut hi = (p99 / width).ceil() * width;
    if hi <= lo {
        hi = lo + width;
    }
    let bin_count = (((hi - lo) / width).round() as usize).max(1);

    let mut bins: Vec<LengthBin> = (0..bin_count)
        .map(|i| {
            let start = lo + width * i as f64;
            let end = start + width;
            LengthBin {
                label: format!("{:.1}-{:.1}s", start, end),
                start,
                end,
                count: 0,
            }
        })
        .collect();

    for v in values {
        let index = ((v - lo) / width).floor().clamp(0.0, (bin_count - 1) as f64) as usize;
        bins[index].count += 1;
    }
    bins
}
