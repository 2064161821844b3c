//! Entry Tag Grammar
//!
//! Tags label an entry as `[TYPE:YYYY-MM-DD]`. Validation is syntactic: the
//! month must be 1-12 and the day 1-31, without calendar-exact checks.

use std::fmt;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::entry::EntryType;
use crate::validation::{ValidationErrors, ValidationIssue};

/// Grammar for a well-formed tag.
pub const TAG_PATTERN: &str = r"^\[([A-Z_]+):([0-9]{4})-([0-9]{2})-([0-9]{2})\]$";

fn tag_regex() -> Option<&'static Regex> {
    static TAG_RE: OnceLock<Option<Regex>> = OnceLock::new();
    TAG_RE.get_or_init(|| Regex::new(TAG_PATTERN).ok()).as_ref()
}

/// A parsed and validated tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub entry_type: EntryType,
    pub year: u32,
    pub month: u32,
    pub day: u32,
}

impl Tag {
    /// Parse a tag, collecting every problem rather than stopping at the
    /// first: an unknown type and an out-of-range month are both reported.
    pub fn parse(raw: &str) -> Result<Tag, ValidationErrors> {
        let caps = tag_regex()
            .and_then(|re| re.captures(raw))
            .ok_or_else(|| ValidationErrors::single(ValidationIssue::MalformedTag(raw.to_string())))?;

        let code = &caps[1];
        // The regex guarantees ASCII digits of bounded width.
        let year: u32 = caps[2].parse().unwrap_or(0);
        let month: u32 = caps[3].parse().unwrap_or(0);
        let day: u32 = caps[4].parse().unwrap_or(0);

        let mut issues = Vec::new();
        let entry_type = EntryType::from_code(code);
        if entry_type.is_none() {
            issues.push(ValidationIssue::UnknownTagType(code.to_string()));
        }
        if !(1..=12).contains(&month) {
            issues.push(ValidationIssue::MonthOutOfRange(month));
        }
        if !(1..=31).contains(&day) {
            issues.push(ValidationIssue::DayOutOfRange(day));
        }

        match entry_type {
            Some(entry_type) if issues.is_empty() => Ok(Tag {
                entry_type,
                year,
                month,
                day,
            }),
            _ => Err(ValidationErrors::from(issues)),
        }
    }

    /// Render the tag for an entry type on a given date.
    pub fn format(entry_type: EntryType, date: NaiveDate) -> String {
        format!(
            "[{}:{:04}-{:02}-{:02}]",
            entry_type.as_str(),
            date.year(),
            date.month(),
            date.day()
        )
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{:04}-{:02}-{:02}]",
            self.entry_type.as_str(),
            self.year,
            self.month,
            self.day
        )
    }
}
