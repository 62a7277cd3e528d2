// Raw table rows -> EpisodeRecord, plus task text resolution

use crate::core::coerce::{to_f64, to_text, to_u64};
use crate::core::constants::{SERIES_DELIMITER, TIMESTAMP_COLUMN};
use crate::core::format::{DatasetDescriptor, EpisodeRecord, RawRow, RawValue, Series};
use std::collections::{HashMap, HashSet};

/// Per-frame bookkeeping columns that are never charted.
pub const BOOKKEEPING_COLUMNS: &[&str] = &[
    TIMESTAMP_COLUMN,
    "frame_index",
    "episode_index",
    "index",
    "task_index",
];

const LANGUAGE_FIELD: &str = "language_instruction";

/// Where each output series reads its value from.
struct ColumnPlan {
    column: String,
    element: Option<usize>,
    name: String,
}

fn plan_columns(descriptor: &DatasetDescriptor, first: Option<&RawRow>) -> Vec<ColumnPlan> {
    let mut plan = Vec::new();

    if descriptor.features.is_empty() {
        // No declared features: chart whatever numeric columns the first row has
        if let Some(row) = first {
            for (column, value) in &row.columns {
                if BOOKKEEPING_COLUMNS.contains(&column.as_str()) {
                    continue;
                }
                match value {
                    RawValue::List(items) if items.len() > 1 => {
                        for i in 0..items.len() {
                            plan.push(ColumnPlan {
                                column: column.clone(),
                                element: Some(i),
                                name: format!("{}{}{}", column, SERIES_DELIMITER, i),
                            });
                        }
                    }
                    other if to_f64(other).is_some() => plan.push(ColumnPlan {
                        column: column.clone(),
                        element: None,
                        name: column.clone(),
                    }),
                    _ => {}
                }
            }
        }
        return plan;
    }

    for feature in &descriptor.features {
        if !feature.is_chartable() || BOOKKEEPING_COLUMNS.contains(&feature.name.as_str()) {
            continue;
        }
        let width = feature.shape.first().copied().unwrap_or(1) as usize;
        if width <= 1 {
            plan.push(ColumnPlan {
                column: feature.name.clone(),
                element: None,
                name: feature.name.clone(),
            });
        } else {
            for i in 0..width {
                plan.push(ColumnPlan {
                    column: feature.name.clone(),
                    element: Some(i),
                    name: feature.element_name(i),
                });
            }
        }
    }
    plan
}

fn cell(row: &RawRow, plan: &ColumnPlan) -> f64 {
    let value = match (row.get(&plan.column), plan.element) {
        (Some(RawValue::List(items)), Some(i)) => items.get(i).and_then(to_f64),
        (Some(value), None) => to_f64(value),
        _ => None,
    };
    value.unwrap_or(f64::NAN)
}

/// Builds the column-major record. Timestamps come from the `timestamp`
/// column rebased to start at zero, or are synthesized from `fps`.
pub fn build_record(
    descriptor: &DatasetDescriptor,
    episode: u64,
    rows: &[RawRow],
    task: Option<String>,
) -> EpisodeRecord {
    let plan = plan_columns(descriptor, rows.first());

    let stored: Option<Vec<f64>> = rows
        .iter()
        .map(|row| row.get(TIMESTAMP_COLUMN).and_then(to_f64))
        .collect();
    let timestamps = match stored {
        Some(ts) if !ts.is_empty() && ts.windows(2).all(|w| w[0] <= w[1]) => {
            let origin = ts[0];
            ts.into_iter().map(|t| t - origin).collect()
        }
        _ => (0..rows.len())
            .map(|i| i as f64 / descriptor.fps)
            .collect(),
    };

    let series = plan
        .iter()
        .map(|column| Series {
            name: column.name.clone(),
            values: rows.iter().map(|row| cell(row, column)).collect(),
        })
        .collect();

    EpisodeRecord {
        episode,
        task,
        timestamps,
        series,
    }
}

fn language_instructions(row: &RawRow) -> Vec<String> {
    row.columns
        .iter()
        .filter(|(name, _)| {
            name == LANGUAGE_FIELD
                || name
                    .strip_prefix(LANGUAGE_FIELD)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
        .filter_map(|(_, value)| to_text(value))
        .collect()
}

/// Resolves task text: language instruction fields (first row, then the
/// middle and last rows), then a `task` field, then the task-index lookup
/// table, then tasks listed in episode metadata.
pub fn resolve_task(
    rows: &[RawRow],
    task_table: Option<&HashMap<u64, String>>,
    metadata_tasks: &[String],
) -> Option<String> {
    let first = rows.first()?;

    let mut instructions = language_instructions(first);
    if instructions.is_empty() && rows.len() > 1 {
        let middle = rows.len() / 2;
        let last = rows.len() - 1;
        instructions = language_instructions(&rows[middle]);
        if last != middle {
            instructions.extend(language_instructions(&rows[last]));
        }
    }
    if !instructions.is_empty() {
        let mut seen = HashSet::new();
        instructions.retain(|text| seen.insert(text.clone()));
        return Some(instructions.join("\n"));
    }

    if let Some(task) = first.get("task").and_then(to_text) {
        return Some(task);
    }

    let looked_up = first
        .get("task_index")
        .and_then(to_u64)
        .and_then(|index| task_table.and_then(|table| table.get(&index).cloned()));
    if looked_up.is_some() {
        return looked_up;
    }

    (!metadata_tasks.is_empty()).then(|| metadata_tasks.join("\n"))
}

/// Parses a task lookup table. The text sits in `task`, or in the pandas
/// index column when the table was written from a DataFrame.
pub fn parse_task_table(rows: &[RawRow]) -> HashMap<u64, String> {
    rows.iter()
        .filter_map(|row| {
            let index = row.get("task_index").and_then(to_u64)?;
            let text = row
                .get("task")
                .or_else(|| row.get("__index_level_0__"))
                .and_then(to_text)?;
            Some((index, text))
        })
        .collect()
}
