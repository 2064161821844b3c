//! Memory Entry Types
//!
//! The persisted unit of agent memory and its typed metadata.
//!
//! Entries are append-only: an "edit" produces new stored state under the
//! same id while the previous content is kept as a revision. Deprecation is
//! expressed by writing a `DEPRECATED`/`SUPERSEDED` entry, never by deleting.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::tag::Tag;

// ============================================================================
// EntryType
// ============================================================================

/// Kind of memory entry. The uppercase code doubles as the tag `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Context,
    Decision,
    Progress,
    Pattern,
    Brief,
    Deprecated,
    Superseded,
}

impl EntryType {
    /// Canonical uppercase code, as stored and as used in tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Context => "CONTEXT",
            EntryType::Decision => "DECISION",
            EntryType::Progress => "PROGRESS",
            EntryType::Pattern => "PATTERN",
            EntryType::Brief => "BRIEF",
            EntryType::Deprecated => "DEPRECATED",
            EntryType::Superseded => "SUPERSEDED",
        }
    }

    /// Look up an entry type by its exact uppercase code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.as_str() == code)
    }

    /// Every entry type, in declaration order.
    pub fn all() -> &'static [EntryType] {
        &[
            EntryType::Context,
            EntryType::Decision,
            EntryType::Progress,
            EntryType::Pattern,
            EntryType::Brief,
            EntryType::Deprecated,
            EntryType::Superseded,
        ]
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::from_code(s).ok_or_else(|| CoreError::parse(format!("unknown entry type: {}", s)))
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Coarse workflow stage attached to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Research,
    Planning,
    Execution,
    Checkpoint,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Research => "research",
            Phase::Planning => "planning",
            Phase::Execution => "execution",
            Phase::Checkpoint => "checkpoint",
        }
    }
}

impl FromStr for Phase {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "research" => Ok(Phase::Research),
            "planning" => Ok(Phase::Planning),
            "execution" => Ok(Phase::Execution),
            "checkpoint" => Ok(Phase::Checkpoint),
            _ => Err(CoreError::parse(format!("unknown phase: {}", s))),
        }
    }
}

/// Progress state of a tracked item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    Done,
    InProgress,
    Draft,
    Deprecated,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Done => "done",
            ProgressStatus::InProgress => "in-progress",
            ProgressStatus::Draft => "draft",
            ProgressStatus::Deprecated => "deprecated",
        }
    }
}

impl FromStr for ProgressStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "done" => Ok(ProgressStatus::Done),
            "in-progress" => Ok(ProgressStatus::InProgress),
            "draft" => Ok(ProgressStatus::Draft),
            "deprecated" => Ok(ProgressStatus::Deprecated),
            _ => Err(CoreError::parse(format!("unknown progress status: {}", s))),
        }
    }
}

/// Current metadata layout version.
pub const METADATA_VERSION: u32 = 1;

fn default_metadata_version() -> u32 {
    METADATA_VERSION
}

/// Typed, versioned optional metadata. Absent fields are `None`/empty rather
/// than missing keys in a free-form blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default = "default_metadata_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_status: Option<ProgressStatus>,
    /// Domain tags the entry applies to (e.g. "frontend", "storage").
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub targets: BTreeSet<String>,
}

impl Default for EntryMetadata {
    fn default() -> Self {
        Self {
            version: METADATA_VERSION,
            phase: None,
            progress_status: None,
            targets: BTreeSet::new(),
        }
    }
}

impl EntryMetadata {
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_progress_status(mut self, status: ProgressStatus) -> Self {
        self.progress_status = Some(status);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.targets.insert(target.into());
        self
    }

    /// True when no field carries information.
    pub fn is_empty(&self) -> bool {
        self.phase.is_none() && self.progress_status.is_none() && self.targets.is_empty()
    }

    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse stored metadata. Parse failures are reported, never swallowed.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// Entries
// ============================================================================

/// A persisted memory entry. `id` is assigned by the store and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: i64,
    pub file_type: EntryType,
    /// ISO-8601 UTC timestamp, exactly as supplied at creation.
    pub timestamp: String,
    pub tag: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

impl MemoryEntry {
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    pub fn phase(&self) -> Option<Phase> {
        self.metadata.as_ref().and_then(|m| m.phase)
    }

    pub fn progress_status(&self) -> Option<ProgressStatus> {
        self.metadata.as_ref().and_then(|m| m.progress_status)
    }
}

/// Input for creating a new entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    pub file_type: EntryType,
    pub timestamp: String,
    pub tag: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

impl NewEntry {
    /// Build an entry stamped with the current time and a matching tag.
    pub fn new(file_type: EntryType, content: impl Into<String>) -> Self {
        Self::at(file_type, content, Utc::now())
    }

    /// Build an entry stamped with `at` and a matching tag.
    pub fn at(file_type: EntryType, content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            file_type,
            timestamp: format_timestamp(at),
            tag: Tag::format(file_type, at.date_naive()),
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Format a UTC instant as second-precision ISO-8601 with a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an ISO-8601 timestamp. RFC 3339 strings with any offset are
/// normalized to UTC; offset-less strings are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
