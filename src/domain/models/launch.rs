//! Launch domain model.
//!
//! A launch is a single execution of a test suite. Reruns of the same suite
//! produce sibling launches that the merge engine can fold into one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::test_item::{ItemAttribute, ItemStatus, Statistics};

/// Visibility mode of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaunchMode {
    /// Regular launch, visible in default listings.
    Default,
    /// Debug launch, kept apart from regular results.
    Debug,
}

impl Default for LaunchMode {
    fn default() -> Self {
        Self::Default
    }
}

impl LaunchMode {
    /// Stored and displayed name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Debug => "DEBUG",
        }
    }

    /// Parse a stored name, case-insensitively.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DEFAULT" => Some(Self::Default),
            "DEBUG" => Some(Self::Debug),
            _ => None,
        }
    }
}

/// A single test-suite execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Launch {
    /// Launch ID.
    pub id: Uuid,
    /// Project the launch belongs to. Only launches of one project can be merged.
    pub project: String,
    /// Launch name; reruns share it.
    pub name: String,
    /// Rerun sequence number within the launch name.
    pub number: i64,
    /// Free-form description.
    pub description: Option<String>,
    /// Visibility mode.
    pub mode: LaunchMode,
    /// Aggregate status of the root items once finished.
    pub status: ItemStatus,
    /// Start of the run.
    pub start_time: DateTime<Utc>,
    /// End of the run; `None` while it is still running.
    pub end_time: Option<DateTime<Utc>>,
    /// Launch-level attributes.
    pub attributes: Vec<ItemAttribute>,
    /// Counters summed over the root items.
    pub statistics: Statistics,
    /// Retired launches were superseded by a merge and are hidden from
    /// default listings. They are never deleted.
    pub retired: bool,
}

impl Launch {
    /// Create an in-progress launch numbered 1.
    pub fn new(project: impl Into<String>, name: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project: project.into(),
            name: name.into(),
            number: 1,
            description: None,
            mode: LaunchMode::Default,
            status: ItemStatus::InProgress,
            start_time,
            end_time: None,
            attributes: Vec::new(),
            statistics: Statistics::default(),
            retired: false,
        }
    }

    /// Set the rerun number.
    pub fn with_number(mut self, number: i64) -> Self {
        self.number = number;
        self
    }

    /// Mark the launch finished with the given status and end time.
    pub fn finished(mut self, status: ItemStatus, end_time: DateTime<Utc>) -> Self {
        self.status = status;
        self.end_time = Some(end_time);
        self
    }

    /// Append an attribute.
    pub fn with_attribute(mut self, attribute: ItemAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// True once the status is no longer in progress.
    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Chronological ordering key used to order source launches, oldest first.
    ///
    /// Start time decides; rerun number and ID break ties so the order is
    /// total and reproducible.
    pub fn chronology_key(&self) -> (DateTime<Utc>, i64, Uuid) {
        (self.start_time, self.number, self.id)
    }
}
