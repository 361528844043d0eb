//! Issue/resolution column detection.

use super::IngestError;

/// Header aliases that identify the issue-description column.
pub const ISSUE_ALIASES: &[&str] = &["description", "issue", "problem", "ticket"];

/// Header aliases that identify the resolution column.
pub const RESOLUTION_ALIASES: &[&str] = &["resolution", "solution", "answer", "fix"];

/// Resolved column positions for one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    pub issue: usize,
    pub resolution: usize,
    pub priority: Option<usize>,
}

/// Caller-supplied header names that take precedence over detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnOverrides {
    pub issue: Option<String>,
    pub resolution: Option<String>,
}

impl ColumnMapping {
    /// Map headers to columns.
    ///
    /// Matching is a case-insensitive substring test against the alias sets,
    /// scanning headers in order; the first hit wins. The resolution column
    /// is never the same as the issue column. An override is honoured only
    /// when it names an existing header.
    pub fn detect(headers: &[String], overrides: &ColumnOverrides) -> Result<Self, IngestError> {
        let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();

        let issue = find_named(&lowered, overrides.issue.as_deref())
            .or_else(|| find_alias(&lowered, ISSUE_ALIASES, None))
            .ok_or(IngestError::ColumnNotFound("issue"))?;

        let resolution = find_named(&lowered, overrides.resolution.as_deref())
            .filter(|&i| i != issue)
            .or_else(|| find_alias(&lowered, RESOLUTION_ALIASES, Some(issue)))
            .ok_or(IngestError::ColumnNotFound("resolution"))?;

        let priority = lowered
            .iter()
            .position(|h| h == "priority")
            .filter(|&i| i != issue && i != resolution);

        Ok(Self {
            issue,
            resolution,
            priority,
        })
    }
}

fn find_named(lowered: &[String], name: Option<&str>) -> Option<usize> {
    let name = name?.trim().to_lowercase();
    if name.is_empty() {
        return None;
    }
    lowered.iter().position(|h| *h == name)
}

fn find_alias(lowered: &[String], aliases: &[&str], exclude: Option<usize>) -> Option<usize> {
    lowered
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != exclude)
        .find(|(_, h)| aliases.iter().any(|alias| h.contains(alias)))
        .map(|(i, _)| i)
}
