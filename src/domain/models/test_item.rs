//! Test item domain model.
//!
//! A test item is one node (suite, test, or step) of a launch's execution
//! tree. Items reference their parent by ID; the ordered child lists live in
//! [`ItemTree`](super::tree::ItemTree).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use uuid::Uuid;

/// Execution status of a test item or launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    /// Finished successfully.
    Passed,
    /// Finished with a failure.
    Failed,
    /// Not executed.
    Skipped,
    /// Still running.
    InProgress,
    /// Stopped before finishing. Counted as a failure.
    Interrupted,
}

impl Default for ItemStatus {
    fn default() -> Self {
        Self::InProgress
    }
}

impl ItemStatus {
    /// Stored name, e.g. `IN_PROGRESS`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
            Self::InProgress => "IN_PROGRESS",
            Self::Interrupted => "INTERRUPTED",
        }
    }

    /// Parse a stored name, case-insensitively.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PASSED" => Some(Self::Passed),
            "FAILED" => Some(Self::Failed),
            "SKIPPED" => Some(Self::Skipped),
            "IN_PROGRESS" => Some(Self::InProgress),
            "INTERRUPTED" => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Returns true once the item has stopped executing.
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Aggregate a set of statuses into the status of their container.
    ///
    /// Any in-progress member keeps the container in progress; otherwise any
    /// failure or interruption fails it. A container whose members were all
    /// skipped is skipped. An empty set counts as passed.
    pub fn aggregate<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut any = false;
        let mut all_skipped = true;
        let mut failed = false;

        for status in statuses {
            any = true;
            match status {
                Self::InProgress => return Self::InProgress,
                Self::Failed | Self::Interrupted => failed = true,
                Self::Skipped | Self::Passed => {}
            }
            if status != Self::Skipped {
                all_skipped = false;
            }
        }

        if failed {
            Self::Failed
        } else if any && all_skipped {
            Self::Skipped
        } else {
            Self::Passed
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of node in the execution tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    /// Top-level grouping, typically a test class or feature file.
    Suite,
    /// A test case.
    Test,
    /// A step inside a test case.
    Step,
}

impl ItemType {
    /// Stored name, e.g. `SUITE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suite => "SUITE",
            Self::Test => "TEST",
            Self::Step => "STEP",
        }
    }

    /// Parse a stored name, case-insensitively.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SUITE" => Some(Self::Suite),
            "TEST" => Some(Self::Test),
            "STEP" => Some(Self::Step),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key-value tag attached to a launch or test item.
///
/// Keyless attributes are plain tags. System attributes are set by agents
/// rather than users and live in their own namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemAttribute {
    /// Attribute key; `None` for plain tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Attribute value, or the tag itself.
    pub value: String,
    /// Set by an agent rather than a user.
    #[serde(default)]
    pub system: bool,
}

impl ItemAttribute {
    /// User attribute `key:value`.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.into(),
            system: false,
        }
    }

    /// Keyless tag.
    pub fn tag(value: impl Into<String>) -> Self {
        Self {
            key: None,
            value: value.into(),
            system: false,
        }
    }

    /// System attribute `key:value`.
    pub fn system(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.into(),
            system: true,
        }
    }

    /// Identity used when merging attribute sets.
    ///
    /// Keyed attributes collide on `(system, key)`; tags collide only with an
    /// identical tag.
    pub fn merge_identity(&self) -> (bool, Option<&str>, Option<&str>) {
        match &self.key {
            Some(key) => (self.system, Some(key.as_str()), None),
            None => (self.system, None, Some(self.value.as_str())),
        }
    }
}

/// A parameter of a parameterized test.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemParameter {
    /// Parameter name.
    pub key: String,
    /// Parameter value as reported.
    pub value: String,
}

/// Pass/fail/skip counters aggregated from descendants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statistics {
    /// Leaves counted.
    pub total: u32,
    /// Passed leaves.
    pub passed: u32,
    /// Failed or interrupted leaves.
    pub failed: u32,
    /// Skipped leaves.
    pub skipped: u32,
}

impl Statistics {
    /// Counters contributed by a leaf item with the given status.
    ///
    /// Interrupted leaves count as failed; in-progress leaves only count
    /// towards the total.
    pub fn for_leaf(status: ItemStatus) -> Self {
        let mut stats = Self {
            total: 1,
            ..Self::default()
        };
        match status {
            ItemStatus::Passed => stats.passed = 1,
            ItemStatus::Failed | ItemStatus::Interrupted => stats.failed = 1,
            ItemStatus::Skipped => stats.skipped = 1,
            ItemStatus::InProgress => {}
        }
        stats
    }

    /// Field-wise sum.
    pub fn sum<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut total = Self::default();
        for stats in items {
            total += *stats;
        }
        total
    }
}

impl AddAssign for Statistics {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.passed += rhs.passed;
        self.failed += rhs.failed;
        self.skipped += rhs.skipped;
    }
}

/// One node of a launch's execution tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestItem {
    /// Item ID.
    pub id: Uuid,
    /// Owning launch.
    pub launch_id: Uuid,
    /// Parent item; `None` for roots.
    pub parent_id: Option<Uuid>,
    /// Display name; part of the default match key.
    pub name: String,
    /// Node kind.
    pub item_type: ItemType,
    /// Own status for leaves; aggregate of the children for containers.
    pub status: ItemStatus,
    /// Start of the attempt.
    pub start_time: DateTime<Utc>,
    /// End of the attempt, if finished.
    pub end_time: Option<DateTime<Utc>>,
    /// Free-form description.
    pub description: Option<String>,
    /// Stable test-case identifier reported by the agent.
    pub unique_id: Option<String>,
    /// Code reference (e.g. `com.acme.LoginTest.valid`).
    pub code_ref: Option<String>,
    /// Parameters of a parameterized test.
    pub parameters: Vec<ItemParameter>,
    /// Item attributes.
    pub attributes: Vec<ItemAttribute>,
    /// Materialized ancestor chain: ancestor IDs and the item's own ID joined by `.`.
    pub path: String,
    /// Position among siblings as persisted.
    pub position: i64,
    /// Counters for this item and its descendants.
    pub statistics: Statistics,
    /// True when earlier attempts are stored as retries of this item.
    pub has_retries: bool,
    /// Set on retry items: the item this attempt was superseded by.
    pub retry_of: Option<Uuid>,
    /// Replaced by a merge and hidden from active trees.
    pub retired: bool,
}

impl TestItem {
    /// Create a root item with a fresh ID.
    pub fn new(
        launch_id: Uuid,
        name: impl Into<String>,
        item_type: ItemType,
        status: ItemStatus,
        start_time: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            launch_id,
            parent_id: None,
            name: name.into(),
            item_type,
            status,
            start_time,
            end_time: None,
            description: None,
            unique_id: None,
            code_ref: None,
            parameters: Vec::new(),
            attributes: Vec::new(),
            path: id.to_string(),
            position: 0,
            statistics: Statistics::default(),
            has_retries: false,
            retry_of: None,
            retired: false,
        }
    }

    /// Place this item under `parent` at the given sibling position.
    pub fn under(mut self, parent: &TestItem, position: i64) -> Self {
        self.parent_id = Some(parent.id);
        self.path = format!("{}.{}", parent.path, self.id);
        self.position = position;
        self
    }

    /// Set the end time.
    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// Append an attribute.
    pub fn with_attribute(mut self, attribute: ItemAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Append a parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push(ItemParameter {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Set the agent-reported unique ID.
    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    /// Set the code reference.
    pub fn with_code_ref(mut self, code_ref: impl Into<String>) -> Self {
        self.code_ref = Some(code_ref.into());
        self
    }

    /// True for a superseded attempt stored under `retry_of`.
    pub fn is_retry(&self) -> bool {
        self.retry_of.is_some()
    }

    /// Duration of the item, when it has finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}
