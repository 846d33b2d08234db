//! Task types and their simulated duration profiles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::errors::LbError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Inclusive range of simulated processing time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[u64; 2]", into = "[u64; 2]")]
pub struct DurationRange {
    min_ms: u64,
    max_ms: u64,
}

impl DurationRange {
    /// Fallback for task types missing from the profile table.
    pub const DEFAULT: DurationRange = DurationRange {
        min_ms: 500,
        max_ms: 1500,
    };

    pub fn new(min_ms: u64, max_ms: u64) -> Result<Self, LbError> {
        if min_ms > max_ms {
            return Err(LbError::InvalidDurationRange { min_ms, max_ms });
        }
        Ok(Self { min_ms, max_ms })
    }

    pub fn min_ms(&self) -> u64 {
        self.min_ms
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms
    }

    pub fn contains(&self, ms: u64) -> bool {
        (self.min_ms..=self.max_ms).contains(&ms)
    }
}

impl TryFrom<[u64; 2]> for DurationRange {
    type Error = LbError;

    fn try_from([min_ms, max_ms]: [u64; 2]) -> Result<Self, Self::Error> {
        Self::new(min_ms, max_ms)
    }
}

impl From<DurationRange> for [u64; 2] {
    fn from(range: DurationRange) -> Self {
        [range.min_ms, range.max_ms]
    }
}

/// How heavy a built-in task type is, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Trivial,
    Medium,
    Heavy,
    Unpredictable,
}

/// A built-in task definition: wire type, human label, and default range.
#[derive(Debug, Clone, Copy)]
pub struct TaskDef {
    pub task_type: &'static str,
    pub label: &'static str,
    pub complexity: Complexity,
    pub hint: &'static str,
    pub range: DurationRange,
}

const fn def(
    task_type: &'static str,
    label: &'static str,
    complexity: Complexity,
    hint: &'static str,
    min_ms: u64,
    max_ms: u64,
) -> TaskDef {
    TaskDef {
        task_type,
        label,
        complexity,
        hint,
        range: DurationRange { min_ms, max_ms },
    }
}

/// The five task types the simulator ships with.
pub const TASK_CATALOG: [TaskDef; 5] = [
    def("ping", "ping", Complexity::Trivial, "~200ms", 150, 300),
    def("image_resize", "image resize", Complexity::Medium, "~1-2s", 1200, 1800),
    def("ml_inference", "ml inference", Complexity::Heavy, "~3-5s", 3000, 5000),
    def("batch_export", "batch export", Complexity::Heavy, "~4-7.5s", 4000, 7500),
    def(
        "db_migration",
        "db migration",
        Complexity::Unpredictable,
        "~0.5-6s, unpredictable",
        500,
        6000,
    ),
];

/// Looks up a built-in task definition by wire type.
pub fn catalog_entry(task_type: &str) -> Option<&'static TaskDef> {
    TASK_CATALOG.iter().find(|d| d.task_type == task_type)
}

/// Task type → duration range, with a fallback for unknown types.
///
/// Unknown types are not an error: they simply use the fallback range.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationTable {
    ranges: BTreeMap<TaskType, DurationRange>,
    fallback: DurationRange,
}

impl DurationTable {
    pub fn new(ranges: BTreeMap<TaskType, DurationRange>, fallback: DurationRange) -> Self {
        Self { ranges, fallback }
    }

    pub fn range_for(&self, task_type: &TaskType) -> DurationRange {
        self.ranges.get(task_type).copied().unwrap_or(self.fallback)
    }

    pub fn fallback(&self) -> DurationRange {
        self.fallback
    }

    pub fn with_range(mut self, task_type: TaskType, range: DurationRange) -> Self {
        self.ranges.insert(task_type, range);
        self
    }
}

impl Default for DurationTable {
    fn default() -> Self {
        let ranges = TASK_CATALOG
            .iter()
            .map(|d| (TaskType::new(d.task_type), d.range))
            .collect();
        Self::new(ranges, DurationRange::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::ping("ping", 150, 300)]
    #[case::image_resize("image_resize", 1200, 1800)]
    #[case::ml_inference("ml_inference", 3000, 5000)]
    #[case::batch_export("batch_export", 4000, 7500)]
    #[case::db_migration("db_migration", 500, 6000)]
    #[case::unknown("unknown_type", 500, 1500)]
    fn default_table_ranges(#[case] task_type: &str, #[case] min: u64, #[case] max: u64) {
        let range = DurationTable::default().range_for(&TaskType::from(task_type));
        assert_eq!((range.min_ms(), range.max_ms()), (min, max));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = DurationRange::new(10, 5).unwrap_err();
        assert!(matches!(err, LbError::InvalidDurationRange { min_ms: 10, max_ms: 5 }));
    }

    #[test]
    fn range_deserializes_from_pair() {
        let range: DurationRange = serde_json::from_str("[6000, 9000]").unwrap();
        assert_eq!(range.min_ms(), 6000);
        assert!(range.contains(9000));
        assert!(serde_json::from_str::<DurationRange>("[9, 1]").is_err());
    }

    #[test]
    fn table_override_replaces_builtin_range() {
        let table = DurationTable::default()
            .with_range(TaskType::from("batch_export"), DurationRange::new(6000, 9000).unwrap());
        assert_eq!(table.range_for(&TaskType::from("batch_export")).max_ms(), 9000);
    }

    #[test]
    fn catalog_labels() {
        assert_eq!(catalog_entry("ml_inference").map(|d| d.label), Some("ml inference"));
        assert_eq!(
            catalog_entry("db_migration").map(|d| d.complexity),
            Some(Complexity::Unpredictable)
        );
        assert!(catalog_entry("nope").is_none());
    }
}
