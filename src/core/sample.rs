// Deterministic cross-episode sampling and concurrent loading

use crate::core::error::Result;
use crate::core::format::{EpisodeLocation, EpisodeRecord};
use crate::core::record::{build_record, resolve_task};
use crate::core::resolver::{episode_rows, EpisodeResolver};
use crate::core::store::DatasetStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub const DEFAULT_SAMPLE_CAP: usize = 500;

/// Picks at most `cap` ids by even stride over the sorted input, so an
/// unchanged dataset always yields the same sample.
pub fn select_episodes(episodes: &[u64], cap: usize) -> Vec<u64> {
    let mut sorted = episodes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    if cap == 0 {
        return Vec::new();
    }
    if sorted.len() <= cap {
        return sorted;
    }
    (0..cap).map(|i| sorted[i * sorted.len() / cap]).collect()
}

#[derive(Debug, Clone)]
pub struct CrossEpisodeSample {
    pub dataset: String,
    pub fps: f64,
    /// Sorted by episode id.
    pub episodes: Vec<EpisodeRecord>,
    /// Episodes that were selected but failed to load.
    pub skipped: Vec<u64>,
}

impl CrossEpisodeSample {
    pub fn new(dataset: &str, fps: f64, mut episodes: Vec<EpisodeRecord>) -> Self {
        episodes.sort_by_key(|record| record.episode);
        Self {
            dataset: dataset.to_string(),
            fps,
            episodes,
            skipped: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

/// Loads a bounded sample. Episode metadata is read once for the whole
/// sample, then every data file is fetched and decoded once for all sampled
/// episodes it holds. Episodes whose location or file fails are skipped,
/// not fatal.
pub async fn load_sample<S: DatasetStore>(
    resolver: Arc<EpisodeResolver<S>>,
    dataset: &str,
    cap: usize,
    concurrency: usize,
) -> Result<CrossEpisodeSample> {
    let index = resolver.episode_index(dataset).await?;
    let descriptor = index.descriptor().clone();
    let ids = index.episodes();
    let selected = select_episodes(&ids, cap);
    info!(
        "{}: sampling {} of {} episodes",
        dataset,
        selected.len(),
        ids.len()
    );

    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut skipped: Vec<u64> = Vec::new();

    let mut by_file: BTreeMap<String, Vec<Arc<EpisodeLocation>>> = BTreeMap::new();
    for episode in selected {
        match resolver.locate_indexed(&index, episode) {
            Ok(location) => by_file
                .entry(location.data_path().to_string())
                .or_default()
                .push(location),
            Err(e) => {
                warn!("{}: skipping episode {}: {}", dataset, episode, e);
                skipped.push(episode);
            }
        }
    }
    drop(index);

    let task_table: Arc<Option<HashMap<u64, String>>> =
        Arc::new(resolver.task_table(dataset).await);

    let mut reads = JoinSet::new();
    for (path, locations) in by_file {
        let resolver = resolver.clone();
        let permits = permits.clone();
        let descriptor = descriptor.clone();
        let task_table = task_table.clone();
        let dataset = dataset.to_string();
        reads.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let rows = match resolver.fetch_table(&dataset, &path).await {
                Ok(Some(rows)) => rows,
                Ok(None) => {
                    warn!("{}: data file {} is missing", dataset, path);
                    return (Vec::new(), locations.iter().map(|l| l.episode()).collect());
                }
                Err(e) => {
                    warn!("{}: data file {} failed: {}", dataset, path, e);
                    return (Vec::new(), locations.iter().map(|l| l.episode()).collect());
                }
            };

            let mut records = Vec::with_capacity(locations.len());
            let mut failed = Vec::new();
            for location in &locations {
                match episode_rows(&descriptor, location, &rows) {
                    Ok(frames) => {
                        let tasks: &[String] = match location.as_ref() {
                            EpisodeLocation::Chunked { tasks, .. } => tasks,
                            EpisodeLocation::Legacy { .. } => &[],
                        };
                        let task = resolve_task(frames, (*task_table).as_ref(), tasks);
                        records.push(build_record(&descriptor, location.episode(), frames, task));
                    }
                    Err(e) => {
                        warn!("{}: skipping episode {}: {}", dataset, location.episode(), e);
                        failed.push(location.episode());
                    }
                }
            }
            (records, failed)
        });
    }

    let mut episodes = Vec::new();
    while let Some(joined) = reads.join_next().await {
        match joined {
            Ok((records, failed)) => {
                episodes.extend(records);
                skipped.extend(failed);
            }
            Err(e) => warn!("{}: read task failed: {}", dataset, e),
        }
    }

    let mut sample = CrossEpisodeSample::new(dataset, descriptor.fps, episodes);
    skipped.sort_unstable();
    sample.skipped = skipped;
    info!(
        "{}: loaded {} episodes ({} skipped)",
        dataset,
        sample.len(),
        sample.skipped.len()
    );
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_keeps_all_under_cap() {
        assert_eq!(select_episodes(&[3, 1, 2, 2], 10), vec![1, 2, 3]);
        assert!(select_episodes(&[1, 2], 0).is_empty());
    }

    #[test]
    fn test_select_strides_evenly() {
        let ids: Vec<u64> = (0..1000).collect();
        let picked = select_episodes(&ids, 500);
        assert_eq!(picked.len(), 500);
        assert_eq!(picked[0], 0);
        assert_eq!(picked[1], 2);
        assert_eq!(picked[499], 998);

        // Input order does not matter
        let mut reversed = ids.clone();
        reversed.reverse();
        assert_eq!(select_episodes(&reversed, 500), picked);
    }
}
