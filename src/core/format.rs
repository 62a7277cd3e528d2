// Data structures shared by the resolver and the analytics

use crate::core::constants::{
    Layout, CHUNKED_DATA_TEMPLATE, CHUNKED_VIDEO_TEMPLATE, DEFAULT_CHUNK_SIZE,
    LEGACY_DATA_TEMPLATE, LEGACY_VIDEO_TEMPLATE, SERIES_DELIMITER,
};
use crate::core::error::{DatasetError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded cell of a columnar table.
///
/// Storage encoders disagree on how numeric metadata is written, so the same
/// field may show up as any of these. `core::coerce` turns them into
/// canonical numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<RawValue>),
}

/// One decoded table row, columns kept in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub columns: Vec<(String, RawValue)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: RawValue) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: RawValue) {
        self.columns.push((name.to_string(), value));
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Float,
    Int,
    Video,
    Bool,
    Other,
}

impl FeatureKind {
    pub fn from_dtype(dtype: &str) -> Self {
        match dtype {
            "float16" | "float32" | "float64" | "float" => FeatureKind::Float,
            "int8" | "int16" | "int32" | "int64" | "uint8" | "uint16" | "uint32" | "uint64"
            | "int" => FeatureKind::Int,
            "video" | "image" => FeatureKind::Video,
            "bool" => FeatureKind::Bool,
            _ => FeatureKind::Other,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FeatureKind::Float | FeatureKind::Int | FeatureKind::Bool)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeatureDescriptor {
    pub name: String,
    pub kind: FeatureKind,
    pub shape: Vec<u64>,
    pub names: Option<Vec<String>>,
}

impl FeatureDescriptor {
    /// Scalars and vectors are charted; images and video frames are not.
    pub fn is_chartable(&self) -> bool {
        self.kind.is_numeric() && self.shape.len() <= 1
    }

    /// Series name for element `index` of a vector feature.
    pub fn element_name(&self, index: usize) -> String {
        let element = self
            .names
            .as_ref()
            .and_then(|names| names.get(index).cloned())
            .unwrap_or_else(|| index.to_string());
        format!("{}{}{}", self.name, SERIES_DELIMITER, element)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatasetDescriptor {
    pub dataset: String,
    pub version: String,
    pub layout: Layout,
    pub fps: f64,
    pub features: Vec<FeatureDescriptor>,
    pub total_episodes: u64,
    pub total_frames: u64,
    pub chunk_size: u64,
    pub data_path: String,
    pub video_path: Option<String>,
}

impl DatasetDescriptor {
    pub fn video_features(&self) -> impl Iterator<Item = &FeatureDescriptor> {
        self.features
            .iter()
            .filter(|feature| feature.kind == FeatureKind::Video)
    }

    /// Parses `meta/info.json`. The version tag must already have been
    /// validated against the allow-list by the caller.
    pub fn from_info_json(dataset: &str, layout: Layout, info: &Value) -> Result<Self> {
        let object = info
            .as_object()
            .ok_or_else(|| DatasetError::malformed(dataset, "info.json is not an object"))?;

        let version = object
            .get("codebase_version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let fps = object
            .get("fps")
            .and_then(Value::as_f64)
            .filter(|fps| *fps > 0.0)
            .ok_or_else(|| DatasetError::malformed(dataset, "missing or non-positive fps"))?;

        let features = match object.get("features").and_then(Value::as_object) {
            Some(map) => map
                .iter()
                .map(|(name, spec)| parse_feature(name, spec))
                .collect(),
            None => Vec::new(),
        };

        let total_episodes = object
            .get("total_episodes")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let total_frames = object
            .get("total_frames")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let chunk_size = object
            .get("chunks_size")
            .and_then(Value::as_u64)
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_CHUNK_SIZE);

        let (default_data, default_video) = match layout {
            Layout::Legacy => (LEGACY_DATA_TEMPLATE, LEGACY_VIDEO_TEMPLATE),
            Layout::Chunked => (CHUNKED_DATA_TEMPLATE, CHUNKED_VIDEO_TEMPLATE),
        };
        let data_path = object
            .get("data_path")
            .and_then(Value::as_str)
            .unwrap_or(default_data)
            .to_string();
        let video_path = match object.get("video_path") {
            Some(Value::String(path)) => Some(path.clone()),
            Some(Value::Null) => None,
            _ => Some(default_video.to_string()),
        };

        Ok(Self {
            dataset: dataset.to_string(),
            version,
            layout,
            fps,
            features,
            total_episodes,
            total_frames,
            chunk_size,
            data_path,
            video_path,
        })
    }
}

fn parse_feature(name: &str, spec: &Value) -> FeatureDescriptor {
    let dtype = spec.get("dtype").and_then(Value::as_str).unwrap_or("");
    let shape = spec
        .get("shape")
        .and_then(Value::as_array)
        .map(|dims| dims.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default();

    FeatureDescriptor {
        name: name.to_string(),
        kind: FeatureKind::from_dtype(dtype),
        shape,
        names: spec.get("names").and_then(parse_element_names),
    }
}

// Names arrive as ["a", "b"], {"motors": ["a", "b"]} or null
fn parse_element_names(names: &Value) -> Option<Vec<String>> {
    match names {
        Value::Array(items) => {
            let names: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect();
            (names.len() == items.len() && !names.is_empty()).then_some(names)
        }
        Value::Object(map) => map.values().find_map(parse_element_names),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VideoSegment {
    pub feature: String,
    pub chunk_index: u64,
    pub file_index: u64,
    pub path: String,
    pub start_timestamp: f64,
    /// `None` until the episode's rows are read (legacy layout: the segment
    /// spans the whole file).
    pub end_timestamp: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "layout", rename_all = "lowercase")]
pub enum EpisodeLocation {
    Chunked {
        episode: u64,
        chunk_index: u64,
        file_index: u64,
        data_path: String,
        /// Dataset-global row range, end exclusive.
        from_index: u64,
        to_index: u64,
        videos: Vec<VideoSegment>,
        tasks: Vec<String>,
    },
    Legacy {
        episode: u64,
        chunk_index: u64,
        data_path: String,
        videos: Vec<VideoSegment>,
    },
}

impl EpisodeLocation {
    pub fn episode(&self) -> u64 {
        match self {
            EpisodeLocation::Chunked { episode, .. } | EpisodeLocation::Legacy { episode, .. } => {
                *episode
            }
        }
    }

    pub fn data_path(&self) -> &str {
        match self {
            EpisodeLocation::Chunked { data_path, .. }
            | EpisodeLocation::Legacy { data_path, .. } => data_path,
        }
    }

    pub fn videos(&self) -> &[VideoSegment] {
        match self {
            EpisodeLocation::Chunked { videos, .. } | EpisodeLocation::Legacy { videos, .. } => {
                videos
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

/// Column-major frames of one episode. Missing cells are NaN.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EpisodeRecord {
    pub episode: u64,
    pub task: Option<String>,
    pub timestamps: Vec<f64>,
    pub series: Vec<Series>,
}

impl EpisodeRecord {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.timestamps.last().copied().unwrap_or(0.0)
    }

    pub fn series(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|series| series.name == name)
    }

    pub fn series_names(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|series| series.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_from_info() {
        let info = json!({
            "codebase_version": "v3.0",
            "fps": 30,
            "total_episodes": 12,
            "total_frames": 3600,
            "chunks_size": 1000,
            "features": {
                "action": {"dtype": "float32", "shape": [2], "names": ["x", "y"]},
                "observation.state": {"dtype": "float32", "shape": [2], "names": {"motors": ["x", "y"]}},
                "observation.images.top": {"dtype": "video", "shape": [480, 640, 3], "names": null},
                "timestamp": {"dtype": "float32", "shape": [1], "names": null}
            }
        });

        let descriptor = DatasetDescriptor::from_info_json("org/ds", Layout::Chunked, &info).unwrap();
        assert_eq!(descriptor.fps, 30.0);
        assert_eq!(descriptor.features.len(), 4);
        assert_eq!(descriptor.features[0].name, "action");
        assert_eq!(
            descriptor.features[1].names,
            Some(vec!["x".to_string(), "y".to_string()])
        );
        assert_eq!(descriptor.video_features().count(), 1);
        assert_eq!(descriptor.data_path, CHUNKED_DATA_TEMPLATE);
        assert!(!descriptor.features[2].is_chartable());
    }

    #[test]
    fn test_descriptor_requires_fps() {
        let info = json!({"codebase_version": "v2.1"});
        let err = DatasetDescriptor::from_info_json("org/ds", Layout::Legacy, &info).unwrap_err();
        assert!(matches!(err, DatasetError::MalformedMetadata { .. }));
    }

    #[test]
    fn test_element_name_falls_back_to_index() {
        let feature = FeatureDescriptor {
            name: "action".to_string(),
            kind: FeatureKind::Float,
            shape: vec![3],
            names: Some(vec!["a".to_string()]),
        };
        assert_eq!(feature.element_name(0), "action | a");
        assert_eq!(feature.element_name(2), "action | 2");
    }
}
