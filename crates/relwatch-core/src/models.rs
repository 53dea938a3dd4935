use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::markup::Node;

/// Stands in for `url` when the upstream has no page for a release
pub const PLACEHOLDER_URL: &str = "#";

/// One normalized changelog entry, whatever it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub url: String,
    pub repo: String,
    pub tag: String,
    pub title: String,
    pub date: DateTime<Utc>,
    pub body: Node,
    /// Label of the source group this came through, set by the aggregator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_label: Option<String>,
}

impl Release {
    pub fn new(
        url: impl Into<String>,
        repo: impl Into<String>,
        tag: impl Into<String>,
        title: impl Into<String>,
        date: DateTime<Utc>,
        body: Node,
    ) -> Self {
        let tag = tag.into();
        let title = title.into();
        // An empty title reads worse than the tag
        let title = if title.trim().is_empty() {
            tag.clone()
        } else {
            title
        };

        Self {
            url: url.into(),
            repo: repo.into(),
            tag,
            title,
            date,
            body,
            group_label: None,
        }
    }

    pub fn with_group_label(mut self, label: impl Into<String>) -> Self {
        self.group_label = Some(label.into());
        self
    }
}

/// Which view of the merged list is being built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseContext {
    /// The public release list
    #[default]
    Releases,
    /// Input for the weekly chat summary
    Summary,
}

impl std::fmt::Display for ReleaseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReleaseContext::Releases => write!(f, "releases"),
            ReleaseContext::Summary => write!(f, "summary"),
        }
    }
}

impl std::str::FromStr for ReleaseContext {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "releases" => Ok(ReleaseContext::Releases),
            "summary" => Ok(ReleaseContext::Summary),
            other => Err(crate::Error::ConfigError(format!(
                "Unknown release context '{}'",
                other
            ))),
        }
    }
}

/// Parse the date formats upstreams hand us
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC) and a bare
/// `YYYY-MM-DD` (midnight UTC). Anything else is `None` and the record
/// carrying it gets dropped.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
