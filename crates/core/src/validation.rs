//! Entry Validation
//!
//! Every rule an entry must satisfy before it may be persisted. Validation
//! collects all issues so callers get one actionable report per entry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::{parse_timestamp, NewEntry};
use crate::tag::Tag;

/// Default maximum content length, in characters.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 10_000;

/// A single broken rule.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationIssue {
    #[error("malformed tag '{0}': expected [TYPE:YYYY-MM-DD]")]
    MalformedTag(String),

    #[error("unknown entry type '{0}' in tag")]
    UnknownTagType(String),

    #[error("tag month {0} is out of range 1-12")]
    MonthOutOfRange(u32),

    #[error("tag day {0} is out of range 1-31")]
    DayOutOfRange(u32),

    #[error("timestamp is missing")]
    MissingTimestamp,

    #[error("timestamp '{0}' is not valid ISO-8601")]
    InvalidTimestamp(String),

    #[error("content is empty")]
    EmptyContent,

    #[error("content length {length} exceeds maximum {max}")]
    ContentTooLong { length: usize, max: usize },

    #[error("content is not valid UTF-8")]
    InvalidEncoding,

    #[error("content contains NUL characters")]
    NulCharacter,
}

/// All issues found while validating one entry.
#[derive(Error, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationErrors {
    issues: Vec<ValidationIssue>,
}

impl ValidationErrors {
    pub fn single(issue: ValidationIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn contains(&self, issue: &ValidationIssue) -> bool {
        self.issues.contains(issue)
    }

    fn extend(&mut self, other: ValidationErrors) {
        self.issues.extend(other.issues);
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<Vec<ValidationIssue>> for ValidationErrors {
    fn from(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.issues.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Validate a tag against the grammar and the allowed type set.
pub fn validate_tag(raw: &str) -> Result<Tag, ValidationErrors> {
    Tag::parse(raw)
}

/// Validate an ISO-8601 timestamp.
pub fn validate_timestamp(raw: &str) -> Result<DateTime<Utc>, ValidationIssue> {
    if raw.trim().is_empty() {
        return Err(ValidationIssue::MissingTimestamp);
    }
    parse_timestamp(raw).ok_or_else(|| ValidationIssue::InvalidTimestamp(raw.to_string()))
}

/// Validate entry content: non-empty, bounded length, no NUL characters.
pub fn validate_content(content: &str, max_length: usize) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if content.trim().is_empty() {
        issues.push(ValidationIssue::EmptyContent);
    }
    let length = content.chars().count();
    if length > max_length {
        issues.push(ValidationIssue::ContentTooLong {
            length,
            max: max_length,
        });
    }
    if content.contains('\0') {
        issues.push(ValidationIssue::NulCharacter);
    }
    issues
}

/// Decode raw bytes as entry content, rejecting invalid UTF-8.
pub fn content_from_utf8(bytes: Vec<u8>) -> Result<String, ValidationErrors> {
    String::from_utf8(bytes).map_err(|_| ValidationErrors::single(ValidationIssue::InvalidEncoding))
}

/// Validate a new entry in full. Returns every issue found.
pub fn validate_new_entry(entry: &NewEntry, max_content_length: usize) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if let Err(tag_errors) = validate_tag(&entry.tag) {
        errors.extend(tag_errors);
    }
    if let Err(issue) = validate_timestamp(&entry.timestamp) {
        errors.issues.push(issue);
    }
    errors
        .issues
        .extend(validate_content(&entry.content, max_content_length));

    errors.into_result()
}
