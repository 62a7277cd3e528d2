// Schema adapter and episode locator for legacy and chunked datasets

use crate::core::cache::TtlCache;
use crate::core::coerce::{field_f64, field_strings, field_u64, to_u64};
use crate::core::constants::*;
use crate::core::error::{DatasetError, Result};
use crate::core::format::*;
use crate::core::paths::{render_template, TemplateValue};
use crate::core::record::{build_record, parse_task_table, resolve_task};
use crate::core::store::{fetch_with_retry, DatasetStore, FetchPolicy};
use crate::core::table::decode_table;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type DescriptorCache = TtlCache<String, DatasetDescriptor>;
pub type LocationCache = TtlCache<(String, u64), EpisodeLocation>;

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub supported_versions: Vec<String>,
    pub fetch: FetchPolicy,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            supported_versions: vec!["v2.0".to_string(), "v2.1".to_string(), "v3.0".to_string()],
            fetch: FetchPolicy::default(),
        }
    }
}

pub struct EpisodeResolver<S> {
    store: Arc<S>,
    options: ResolverOptions,
    descriptors: Arc<DescriptorCache>,
    locations: Arc<LocationCache>,
}

impl<S: DatasetStore> EpisodeResolver<S> {
    pub fn new(
        store: Arc<S>,
        options: ResolverOptions,
        descriptors: Arc<DescriptorCache>,
        locations: Arc<LocationCache>,
    ) -> Self {
        Self {
            store,
            options,
            descriptors,
            locations,
        }
    }

    async fn fetch(&self, dataset: &str, path: &str) -> Result<Option<bytes::Bytes>> {
        fetch_with_retry(self.store.as_ref(), dataset, path, &self.options.fetch).await
    }

    /// Fetches and decodes a table; `None` when the file does not exist.
    pub async fn fetch_table(&self, dataset: &str, path: &str) -> Result<Option<Vec<RawRow>>> {
        match self.fetch(dataset, path).await? {
            Some(data) => Ok(Some(decode_table(data)?)),
            None => Ok(None),
        }
    }

    pub async fn descriptor(&self, dataset: &str) -> Result<Arc<DatasetDescriptor>> {
        let key = dataset.to_string();
        if let Some(hit) = self.descriptors.get(&key) {
            return Ok(hit);
        }

        let data = self
            .fetch(dataset, INFO_PATH)
            .await?
            .ok_or_else(|| DatasetError::MissingFile(format!("{}/{}", dataset, INFO_PATH)))?;
        let info: Value = serde_json::from_slice(&data)?;

        let version = info
            .get("codebase_version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let unsupported = || DatasetError::UnsupportedVersion {
            dataset: dataset.to_string(),
            version: version.clone(),
        };
        if !self.options.supported_versions.iter().any(|v| *v == version) {
            return Err(unsupported());
        }
        let layout = Layout::from_version(&version).ok_or_else(unsupported)?;

        let descriptor = DatasetDescriptor::from_info_json(dataset, layout, &info)?;
        info!(
            "loaded {} ({}, {:?}, {} episodes @ {} fps)",
            dataset, descriptor.version, layout, descriptor.total_episodes, descriptor.fps
        );
        Ok(self.descriptors.insert(key, descriptor))
    }

    /// Walks the chunked episode-metadata files in order, handing each
    /// file's rows to `visit` until it breaks. A missing or empty file ends
    /// its chunk; a missing first file ends the scan. The number of files
    /// read is capped, since every metadata file holds at least one episode.
    async fn scan_episode_metadata<F>(&self, descriptor: &DatasetDescriptor, mut visit: F) -> Result<bool>
    where
        F: FnMut(&[RawRow]) -> ControlFlow<()>,
    {
        let cap = if descriptor.total_episodes > 0 {
            descriptor.total_episodes
        } else {
            descriptor.chunk_size
        };
        let mut scanned: u64 = 0;

        for chunk_index in 0u64.. {
            for file_index in 0u64.. {
                if scanned >= cap {
                    warn!(
                        "{}: stopped metadata scan after {} files",
                        descriptor.dataset, scanned
                    );
                    return Ok(false);
                }
                let path = render_template(
                    EPISODES_META_TEMPLATE,
                    &[
                        ("chunk_index", TemplateValue::Int(chunk_index)),
                        ("file_index", TemplateValue::Int(file_index)),
                    ],
                );
                scanned += 1;

                let rows = match self.fetch_table(&descriptor.dataset, &path).await? {
                    Some(rows) if !rows.is_empty() => rows,
                    _ if file_index == 0 => return Ok(false),
                    _ => break,
                };
                debug!("{}: scanned {} ({} rows)", descriptor.dataset, path, rows.len());

                if visit(&rows).is_break() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Finds where an episode's rows and video segments live.
    pub async fn locate(&self, dataset: &str, episode: u64) -> Result<Arc<EpisodeLocation>> {
        let descriptor = self.descriptor(dataset).await?;
        match descriptor.layout {
            Layout::Legacy => Ok(Arc::new(legacy_location(&descriptor, episode, None))),
            Layout::Chunked => self.locate_chunked(&descriptor, episode).await,
        }
    }

    async fn locate_chunked(
        &self,
        descriptor: &DatasetDescriptor,
        episode: u64,
    ) -> Result<Arc<EpisodeLocation>> {
        let key = (descriptor.dataset.clone(), episode);
        if let Some(hit) = self.locations.get(&key) {
            return Ok(hit);
        }

        let mut found: Option<RawRow> = None;
        self.scan_episode_metadata(descriptor, |rows| {
            match rows
                .iter()
                .find(|row| row.get("episode_index").and_then(to_u64) == Some(episode))
            {
                Some(row) => {
                    found = Some(row.clone());
                    ControlFlow::Break(())
                }
                None => ControlFlow::Continue(()),
            }
        })
        .await?;

        let row = found.ok_or_else(|| DatasetError::EpisodeNotFound {
            dataset: descriptor.dataset.clone(),
            episode,
        })?;
        let location = chunked_location(descriptor, episode, &row)?;
        Ok(self.locations.insert(key, location))
    }

    /// Loads the task lookup table, trying JSON lines before Parquet. Any
    /// failure yields `None`: a missing task is never an error.
    pub async fn task_table(&self, dataset: &str) -> Option<HashMap<u64, String>> {
        for path in [TASKS_JSONL_PATH, TASKS_PARQUET_PATH] {
            match self.fetch_table(dataset, path).await {
                Ok(Some(rows)) => return Some(parse_task_table(&rows)),
                Ok(None) => continue,
                Err(e) => {
                    warn!("{}: task table {} unreadable: {}", dataset, path, e);
                    return None;
                }
            }
        }
        None
    }

    pub async fn resolve_episode(
        &self,
        dataset: &str,
        episode: u64,
    ) -> Result<(Arc<EpisodeLocation>, EpisodeRecord)> {
        let descriptor = self.descriptor(dataset).await?;
        let location = self.locate(dataset, episode).await?;

        let rows = self
            .fetch_table(dataset, location.data_path())
            .await?
            .ok_or_else(|| match descriptor.layout {
                Layout::Legacy => DatasetError::EpisodeNotFound {
                    dataset: dataset.to_string(),
                    episode,
                },
                Layout::Chunked => {
                    DatasetError::MissingFile(format!("{}/{}", dataset, location.data_path()))
                }
            })?;

        let frames = episode_rows(&descriptor, &location, &rows)?;
        let tasks: &[String] = match location.as_ref() {
            EpisodeLocation::Chunked { tasks, .. } => tasks.as_slice(),
            EpisodeLocation::Legacy { .. } => &[],
        };
        let task_table = self.task_table(dataset).await;
        let task = resolve_task(frames, task_table.as_ref(), tasks);

        let record = build_record(&descriptor, episode, frames, task);
        let location = match descriptor.layout {
            Layout::Legacy => Arc::new(legacy_location(&descriptor, episode, Some(record.duration()))),
            Layout::Chunked => location,
        };

        debug!("{}: episode {} resolved with {} frames", dataset, episode, record.len());
        Ok((location, record))
    }

    /// Reads every episode's frame count in one pass. On the chunked
    /// layout the metadata rows are kept, so locations can be built later
    /// without scanning again.
    pub async fn episode_index(&self, dataset: &str) -> Result<EpisodeIndex> {
        let descriptor = self.descriptor(dataset).await?;

        let mut entries: BTreeMap<u64, IndexEntry> = BTreeMap::new();
        match descriptor.layout {
            Layout::Legacy => {
                let rows = self
                    .fetch_table(dataset, LEGACY_EPISODES_PATH)
                    .await?
                    .ok_or_else(|| {
                        DatasetError::malformed(dataset, format!("{} is missing", LEGACY_EPISODES_PATH))
                    })?;
                for row in &rows {
                    entries
                        .entry(field_u64(row, "episode_index"))
                        .or_insert(IndexEntry {
                            length: field_u64(row, "length"),
                            row: None,
                        });
                }
            }
            Layout::Chunked => {
                self.scan_episode_metadata(&descriptor, |rows| {
                    for row in rows {
                        let length = match row.get("length").and_then(to_u64) {
                            Some(length) => length,
                            None => field_u64(row, "dataset_to_index")
                                .saturating_sub(field_u64(row, "dataset_from_index")),
                        };
                        entries
                            .entry(field_u64(row, "episode_index"))
                            .or_insert_with(|| IndexEntry {
                                length,
                                row: Some(row.clone()),
                            });
                    }
                    ControlFlow::Continue(())
                })
                .await?;
            }
        }

        Ok(EpisodeIndex {
            descriptor,
            entries,
        })
    }

    /// Frame counts for every episode, sorted by episode id.
    pub async fn episode_lengths(&self, dataset: &str) -> Result<Vec<(u64, u64)>> {
        Ok(self.episode_index(dataset).await?.lengths())
    }

    /// Location of an indexed episode. Chunked locations are cached like
    /// the ones found by [`EpisodeResolver::locate`].
    pub fn locate_indexed(&self, index: &EpisodeIndex, episode: u64) -> Result<Arc<EpisodeLocation>> {
        let descriptor = &index.descriptor;
        if descriptor.layout == Layout::Legacy {
            return Ok(Arc::new(legacy_location(descriptor, episode, None)));
        }

        let key = (descriptor.dataset.clone(), episode);
        if let Some(hit) = self.locations.get(&key) {
            return Ok(hit);
        }
        let row = index
            .entries
            .get(&episode)
            .and_then(|entry| entry.row.as_ref())
            .ok_or_else(|| DatasetError::EpisodeNotFound {
                dataset: descriptor.dataset.clone(),
                episode,
            })?;
        let location = chunked_location(descriptor, episode, row)?;
        Ok(self.locations.insert(key, location))
    }
}

struct IndexEntry {
    length: u64,
    row: Option<RawRow>,
}

/// All episodes of one dataset, keyed by episode id.
pub struct EpisodeIndex {
    descriptor: Arc<DatasetDescriptor>,
    entries: BTreeMap<u64, IndexEntry>,
}

impl EpisodeIndex {
    pub fn descriptor(&self) -> &Arc<DatasetDescriptor> {
        &self.descriptor
    }

    pub fn episodes(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }

    pub fn lengths(&self) -> Vec<(u64, u64)> {
        self.entries
            .iter()
            .map(|(episode, entry)| (*episode, entry.length))
            .collect()
    }
}

/// Legacy layout: location is pure arithmetic on the episode id.
pub fn legacy_location(
    descriptor: &DatasetDescriptor,
    episode: u64,
    duration: Option<f64>,
) -> EpisodeLocation {
    let chunk_index = episode / descriptor.chunk_size.max(1);
    let data_path = render_template(
        &descriptor.data_path,
        &[
            ("episode_chunk", TemplateValue::Int(chunk_index)),
            ("episode_index", TemplateValue::Int(episode)),
        ],
    );

    let videos = match &descriptor.video_path {
        Some(template) => descriptor
            .video_features()
            .map(|feature| VideoSegment {
                feature: feature.name.clone(),
                chunk_index,
                file_index: episode,
                path: render_template(
                    template,
                    &[
                        ("episode_chunk", TemplateValue::Int(chunk_index)),
                        ("episode_index", TemplateValue::Int(episode)),
                        ("video_key", TemplateValue::Text(&feature.name)),
                    ],
                ),
                start_timestamp: 0.0,
                end_timestamp: duration,
            })
            .collect(),
        None => Vec::new(),
    };

    EpisodeLocation::Legacy {
        episode,
        chunk_index,
        data_path,
        videos,
    }
}

/// Chunked layout: location read from an episode-metadata row.
pub fn chunked_location(
    descriptor: &DatasetDescriptor,
    episode: u64,
    row: &RawRow,
) -> Result<EpisodeLocation> {
    let chunk_index = field_u64(row, "data/chunk_index");
    let file_index = field_u64(row, "data/file_index");
    let from_index = field_u64(row, "dataset_from_index");
    let to_index = field_u64(row, "dataset_to_index");
    if to_index < from_index {
        return Err(DatasetError::malformed(
            &descriptor.dataset,
            format!(
                "episode {} has row range {}..{}",
                episode, from_index, to_index
            ),
        ));
    }

    let data_path = render_template(
        &descriptor.data_path,
        &[
            ("chunk_index", TemplateValue::Int(chunk_index)),
            ("file_index", TemplateValue::Int(file_index)),
        ],
    );

    let videos = match &descriptor.video_path {
        Some(template) => descriptor
            .video_features()
            .map(|feature| {
                let field = |suffix: &str| format!("videos/{}/{}", feature.name, suffix);
                let video_chunk = field_u64(row, &field("chunk_index"));
                let video_file = field_u64(row, &field("file_index"));
                VideoSegment {
                    feature: feature.name.clone(),
                    chunk_index: video_chunk,
                    file_index: video_file,
                    path: render_template(
                        template,
                        &[
                            ("video_key", TemplateValue::Text(&feature.name)),
                            ("chunk_index", TemplateValue::Int(video_chunk)),
                            ("file_index", TemplateValue::Int(video_file)),
                        ],
                    ),
                    start_timestamp: field_f64(row, &field("from_timestamp")),
                    end_timestamp: Some(field_f64(row, &field("to_timestamp"))),
                }
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(EpisodeLocation::Chunked {
        episode,
        chunk_index,
        file_index,
        data_path,
        from_index,
        to_index,
        videos,
        tasks: field_strings(row, "tasks"),
    })
}

/// Restricts a data file's rows to one episode. Chunked files may not start
/// at global row 0, so the global range is shifted by the file's first
/// `index` value.
pub fn episode_rows<'a>(
    descriptor: &DatasetDescriptor,
    location: &EpisodeLocation,
    rows: &'a [RawRow],
) -> Result<&'a [RawRow]> {
    match location {
        EpisodeLocation::Legacy { .. } => Ok(rows),
        EpisodeLocation::Chunked {
            episode,
            from_index,
            to_index,
            data_path,
            ..
        } => {
            let file_origin = rows
                .first()
                .and_then(|row| row.get(GLOBAL_INDEX_COLUMN))
                .and_then(to_u64)
                .unwrap_or(0);
            let start = from_index.wrapping_sub(file_origin) as usize;
            let end = to_index.wrapping_sub(file_origin) as usize;

            if *from_index < file_origin || end > rows.len() || start > end {
                return Err(DatasetError::malformed(
                    &descriptor.dataset,
                    format!(
                        "episode {} rows {}..{} fall outside {} ({} rows from index {})",
                        episode,
                        from_index,
                        to_index,
                        data_path,
                        rows.len(),
                        file_origin
                    ),
                ));
            }
            Ok(&rows[start..end])
        }
    }
}
