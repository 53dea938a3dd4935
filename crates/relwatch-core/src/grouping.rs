// Conventional-commit classification and the markdown it renders to
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// `type: rest`, where `rest` keeps everything after the colon
static PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^([A-Za-z]+):\s*(.*)").expect("Invalid regex"));

/// Known prefixes, most important first
pub const WELL_KNOWN_PREFIXES: [&str; 11] = [
    "feat", "fix", "perf", "refactor", "style", "test", "docs", "build", "ci", "chore", "revert",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupedCommit {
    /// Display text, prefix stripped
    pub message: String,
    pub original_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitGroup {
    /// Lower-cased prefix
    pub kind: String,
    pub heading: String,
    pub commits: Vec<GroupedCommit>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupedCommits {
    pub ungrouped: Vec<GroupedCommit>,
    pub groups: Vec<CommitGroup>,
}

fn split_prefix(message: &str) -> Option<(String, &str)> {
    let caps = PREFIX.captures(message)?;
    let prefix = caps.get(1)?.as_str().to_lowercase();
    let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    Some((prefix, rest))
}

pub fn heading_for_prefix(prefix: &str) -> String {
    let known = match prefix {
        "feat" => "✨ Features",
        "fix" => "🐛 Bug Fixes",
        "perf" => "⚡ Performance",
        "refactor" => "♻️ Refactoring",
        "style" => "💄 Styling",
        "test" => "✅ Testing",
        "docs" => "📚 Documentation",
        "build" => "📦 Build",
        "ci" => "👷 CI/CD",
        "chore" => "🔧 Chores",
        "revert" => "⏪ Reverts",
        other => {
            let mut chars = other.chars();
            return match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            };
        }
    };
    known.to_string()
}

/// Well-known prefixes by list position, everything else after them by name
fn group_order(prefix: &str) -> (usize, &str) {
    let rank = WELL_KNOWN_PREFIXES
        .iter()
        .position(|p| *p == prefix)
        .unwrap_or(WELL_KNOWN_PREFIXES.len());
    (rank, prefix)
}

/// Partition messages by conventional-commit prefix
///
/// Every input lands exactly once, either in `ungrouped` or in one group.
/// When nothing has a prefix there are no groups at all.
pub fn group_commits<S: AsRef<str>>(messages: &[S]) -> GroupedCommits {
    let has_any_prefix = messages.iter().any(|m| PREFIX.is_match(m.as_ref()));
    if !has_any_prefix {
        return GroupedCommits {
            ungrouped: messages
                .iter()
                .map(|m| GroupedCommit {
                    message: m.as_ref().to_string(),
                    original_message: m.as_ref().to_string(),
                })
                .collect(),
            groups: Vec::new(),
        };
    }

    let mut grouped = GroupedCommits::default();
    for message in messages {
        let message = message.as_ref();
        let Some((prefix, rest)) = split_prefix(message) else {
            grouped.ungrouped.push(GroupedCommit {
                message: message.to_string(),
                original_message: message.to_string(),
            });
            continue;
        };

        let commit = GroupedCommit {
            message: rest.to_string(),
            original_message: message.to_string(),
        };
        match grouped.groups.iter_mut().find(|g| g.kind == prefix) {
            Some(group) => group.commits.push(commit),
            None => grouped.groups.push(CommitGroup {
                heading: heading_for_prefix(&prefix),
                kind: prefix,
                commits: vec![commit],
            }),
        }
    }

    grouped
        .groups
        .sort_by(|a, b| group_order(&a.kind).cmp(&group_order(&b.kind)));
    grouped
}

impl GroupedCommits {
    pub fn is_empty(&self) -> bool {
        self.ungrouped.is_empty() && self.groups.is_empty()
    }

    /// Ungrouped bullets first, then one `##` section per group
    pub fn to_markdown(&self) -> String {
        let mut sections = Vec::new();

        if !self.ungrouped.is_empty() {
            sections.push(bullets(&self.ungrouped));
        }
        for group in &self.groups {
            sections.push(format!("## {}\n\n{}", group.heading, bullets(&group.commits)));
        }

        sections.join("\n\n")
    }
}

fn bullets(commits: &[GroupedCommit]) -> String {
    commits
        .iter()
        .map(|c| format!("- {}", c.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(grouped: &GroupedCommits) -> Vec<&str> {
        grouped.groups.iter().map(|g| g.kind.as_str()).collect()
    }

    #[test]
    fn test_no_prefixes_means_no_groups() {
        let grouped = group_commits(&["update readme", "bump deps"]);

        assert!(grouped.groups.is_empty());
        assert_eq!(grouped.ungrouped.len(), 2);
        assert_eq!(grouped.ungrouped[0].message, "update readme");
    }

    #[test]
    fn test_group_order_follows_priority_list() {
        let grouped = group_commits(&[
            "docs: readme",
            "feat: new thing",
            "xyz: odd one",
            "fix: broken thing",
        ]);
        assert_eq!(kinds(&grouped), vec!["feat", "fix", "docs", "xyz"]);
    }

    #[test]
    fn test_unknown_prefixes_sort_after_known_ones_alphabetically() {
        let grouped = group_commits(&["zeta: z", "alpha: a", "revert: r"]);
        assert_eq!(kinds(&grouped), vec!["revert", "alpha", "zeta"]);
        assert_eq!(grouped.groups[1].heading, "Alpha");
    }

    #[test]
    fn test_prefix_is_case_insensitive_and_stripped() {
        let grouped = group_commits(&["FEAT: Shout", "feat:quiet", "plain message"]);

        assert_eq!(grouped.groups.len(), 1);
        let feat = &grouped.groups[0];
        assert_eq!(feat.heading, "✨ Features");
        assert_eq!(feat.commits[0].message, "Shout");
        assert_eq!(feat.commits[0].original_message, "FEAT: Shout");
        assert_eq!(feat.commits[1].message, "quiet");
        assert_eq!(grouped.ungrouped[0].message, "plain message");
    }

    #[test]
    fn test_every_message_lands_exactly_once() {
        let input = [
            "feat: a",
            "fix: b",
            "no prefix",
            "feat: c",
            "chore: d",
            "weird: e",
            "another plain",
        ];
        let grouped = group_commits(&input);

        let mut originals: Vec<&str> = grouped
            .ungrouped
            .iter()
            .chain(grouped.groups.iter().flat_map(|g| g.commits.iter()))
            .map(|c| c.original_message.as_str())
            .collect();
        originals.sort();

        let mut expected = input.to_vec();
        expected.sort();
        assert_eq!(originals, expected);
    }

    #[test]
    fn test_markdown_layout() {
        let grouped = group_commits(&["tidy up", "fix: crash", "feat: button"]);

        assert_eq!(
            grouped.to_markdown(),
            "- tidy up\n\n## ✨ Features\n\n- button\n\n## 🐛 Bug Fixes\n\n- crash"
        );
    }

    #[test]
    fn test_markdown_without_ungrouped_items() {
        let grouped = group_commits(&["perf: faster"]);
        assert_eq!(grouped.to_markdown(), "## ⚡ Performance\n\n- faster");
    }

    #[test]
    fn test_empty_input() {
        let grouped = group_commits::<&str>(&[]);
        assert!(grouped.is_empty());
        assert_eq!(grouped.to_markdown(), "");
    }
}
