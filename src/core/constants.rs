// Layout constants for the two dataset schemas

pub const PARQUET_MAGIC: &[u8; 4] = b"PAR1";

pub const INFO_PATH: &str = "meta/info.json";
pub const LEGACY_EPISODES_PATH: &str = "meta/episodes.jsonl";
pub const TASKS_JSONL_PATH: &str = "meta/tasks.jsonl";
pub const TASKS_PARQUET_PATH: &str = "meta/tasks.parquet";

// Chunked layout: episode metadata lives in its own chunked files
pub const EPISODES_META_TEMPLATE: &str =
    "meta/episodes/chunk-{chunk_index:03d}/file-{file_index:03d}.parquet";

pub const CHUNKED_DATA_TEMPLATE: &str =
    "data/chunk-{chunk_index:03d}/file-{file_index:03d}.parquet";
pub const CHUNKED_VIDEO_TEMPLATE: &str =
    "videos/{video_key}/chunk-{chunk_index:03d}/file-{file_index:03d}.mp4";

pub const LEGACY_DATA_TEMPLATE: &str =
    "data/chunk-{episode_chunk:03d}/episode_{episode_index:06d}.parquet";
pub const LEGACY_VIDEO_TEMPLATE: &str =
    "videos/chunk-{episode_chunk:03d}/{video_key}/episode_{episode_index:06d}.mp4";

pub const DEFAULT_CHUNK_SIZE: u64 = 1000;

/// Joins a vector feature name with one of its element names.
pub const SERIES_DELIMITER: &str = " | ";

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const GLOBAL_INDEX_COLUMN: &str = "index";

// Schema version families
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Legacy,
    Chunked,
}

impl Layout {
    pub fn from_version(version: &str) -> Option<Self> {
        let version = version.trim_start_matches('v');
        match version.split('.').next() {
            Some("2") => Some(Layout::Legacy),
            Some("3") => Some(Layout::Chunked),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_from_version() {
        assert_eq!(Layout::from_version("v2.0"), Some(Layout::Legacy));
        assert_eq!(Layout::from_version("v2.1"), Some(Layout::Legacy));
        assert_eq!(Layout::from_version("v3.0"), Some(Layout::Chunked));
        assert_eq!(Layout::from_version("v1.6"), None);
        assert_eq!(Layout::from_version(""), None);
    }
}
