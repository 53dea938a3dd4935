//! Release body pipeline.
//!
//! Raw markdown from an upstream goes through the same steps everywhere:
//! parse into a tree, decide whether the author already structured it, and if
//! not pull the list items out, link them up, group them by conventional-commit
//! prefix and render the grouped markdown back into a tree.

use tracing::debug;

use crate::enhance::CommitEnhancer;
use crate::extract::extract_list_items;
use crate::grouping::group_commits;
use crate::markup::{parse_markdown, Node};

/// Body used when a tag has no commits worth listing
pub const INITIAL_RELEASE: &str = "- Initial release";

/// Release tooling commits that only bump versions
const RELEASE_COMMIT_PREFIX: &str = "chore: release";

/// Whether a body with its own `h1`-`h4` headings is kept as written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingPolicy {
    Preserve,
    /// Always regroup list items, headings or not
    Regroup,
}

/// Parse `markdown` and regroup its list items unless the policy keeps it
pub fn process_release_body(
    markdown: &str,
    repo: &str,
    enhancer: &CommitEnhancer,
    policy: HeadingPolicy,
) -> Node {
    let tree = parse_markdown(markdown);

    if policy == HeadingPolicy::Preserve && tree.has_structure_headings() {
        return tree;
    }

    let messages: Vec<String> = extract_list_items(&tree)
        .iter()
        .map(|m| enhancer.enhance(m, repo))
        .collect();
    if messages.is_empty() {
        return tree;
    }

    let grouped = group_commits(&messages);
    if grouped.is_empty() {
        return tree;
    }
    parse_markdown(&grouped.to_markdown())
}

/// Body for a published GitHub release
///
/// The whole text is linked before parsing, then the usual processing runs and
/// doubled "What's Changed" headings are collapsed.
pub fn github_release_body(markdown: &str, repo: &str, enhancer: &CommitEnhancer) -> Node {
    let enhanced = enhancer.enhance(markdown, repo);
    let mut tree = process_release_body(&enhanced, repo, enhancer, HeadingPolicy::Preserve);
    remove_duplicate_whats_changed(&mut tree);
    tree
}

/// Grouped changelog markdown for a list of raw commit messages
///
/// Only the subject line of each commit is used and release-bump commits are
/// skipped. Nothing left means [`INITIAL_RELEASE`].
pub fn commits_to_markdown<S: AsRef<str>>(
    messages: &[S],
    repo: &str,
    enhancer: &CommitEnhancer,
) -> String {
    let subjects: Vec<String> = messages
        .iter()
        .map(AsRef::as_ref)
        .filter(|m| !m.starts_with(RELEASE_COMMIT_PREFIX))
        .map(|m| enhancer.enhance(m.lines().next().unwrap_or(""), repo))
        .collect();

    let grouped = group_commits(&subjects);
    if grouped.is_empty() {
        debug!("No commits to list for {}, using placeholder body", repo);
        return INITIAL_RELEASE.to_string();
    }
    grouped.to_markdown()
}

fn is_whats_changed(heading: &Node) -> bool {
    heading.is_heading()
        && heading
            .text_content()
            .replace('\u{2019}', "'")
            .eq_ignore_ascii_case("what's changed")
}

/// Drop a "What's Changed" heading that directly follows another one
pub fn remove_duplicate_whats_changed(tree: &mut Node) {
    let Some(children) = tree.children_mut() else {
        return;
    };

    let mut previous = false;
    children.retain(|child| {
        let current = is_whats_changed(child);
        let duplicate = current && previous;
        previous = current;
        !duplicate
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::to_markdown;

    fn headings(tree: &Node) -> Vec<String> {
        tree.children()
            .iter()
            .filter(|c| c.is_heading())
            .map(|c| c.text_content())
            .collect()
    }

    #[test]
    fn test_structured_body_is_preserved() {
        let markdown = "## Highlights\n\n- fix: keep me as written\n";
        let tree = process_release_body(
            markdown,
            "o/r",
            &CommitEnhancer::new(),
            HeadingPolicy::Preserve,
        );
        assert_eq!(tree, parse_markdown(markdown));
    }

    #[test]
    fn test_flat_list_is_grouped() {
        let markdown = "- feat: add export button\n- fix: crash on empty input\n- tidy the code\n";
        let tree = process_release_body(
            markdown,
            "o/r",
            &CommitEnhancer::new(),
            HeadingPolicy::Preserve,
        );

        assert_eq!(headings(&tree), vec!["✨ Features", "🐛 Bug Fixes"]);
        assert_eq!(
            to_markdown(&tree),
            to_markdown(&parse_markdown(
                "- tidy the code\n\n## ✨ Features\n\n- add export button\n\n## 🐛 Bug Fixes\n\n- crash on empty input\n"
            ))
        );
    }

    #[test]
    fn test_regroup_policy_ignores_headings() {
        let markdown = "## Notes\n\n- feat: new thing here\n";
        let tree = process_release_body(
            markdown,
            "o/r",
            &CommitEnhancer::new(),
            HeadingPolicy::Regroup,
        );
        assert_eq!(headings(&tree), vec!["✨ Features"]);
    }

    #[test]
    fn test_prose_without_list_is_kept() {
        let tree = process_release_body(
            "Just a paragraph.",
            "o/r",
            &CommitEnhancer::new(),
            HeadingPolicy::Preserve,
        );
        assert_eq!(tree, Node::paragraph_root("Just a paragraph."));
    }

    #[test]
    fn test_items_are_linked() {
        let tree = process_release_body(
            "- fix: closes #5 properly\n",
            "o/r",
            &CommitEnhancer::new(),
            HeadingPolicy::Preserve,
        );
        assert!(to_markdown(&tree).contains("https://github.com/o/r/issues/5"));
    }

    #[test]
    fn test_commits_to_markdown() {
        let messages = vec![
            "chore: release v1.2.0".to_string(),
            "feat: tags\n\nlong body that is ignored".to_string(),
            "fix: #3".to_string(),
        ];
        assert_eq!(
            commits_to_markdown(&messages, "o/r", &CommitEnhancer::new()),
            "## ✨ Features\n\n- tags\n\n## 🐛 Bug Fixes\n\n- [#3](https://github.com/o/r/issues/3)"
        );
    }

    #[test]
    fn test_only_release_commits_means_initial_release() {
        let messages = ["chore: release v0.1.0"];
        assert_eq!(
            commits_to_markdown(&messages, "o/r", &CommitEnhancer::new()),
            INITIAL_RELEASE
        );
    }

    #[test]
    fn test_duplicate_whats_changed_collapses() {
        let mut tree = parse_markdown("## What's Changed\n\n### what's changed\n\n- item\n");
        remove_duplicate_whats_changed(&mut tree);

        assert_eq!(headings(&tree), vec!["What's Changed"]);
        assert!(tree.children()[0].is_element("h2"));
    }

    #[test]
    fn test_different_second_heading_is_untouched() {
        let mut tree = parse_markdown("## What's Changed\n\n### New Contributors\n");
        let before = tree.clone();
        remove_duplicate_whats_changed(&mut tree);
        assert_eq!(tree, before);
    }

    #[test]
    fn test_github_release_body_dedupes_after_processing() {
        let tree = github_release_body(
            "## What’s Changed\n\n### What's changed\n\n* feat: thing by @someone in #4\n",
            "o/r",
            &CommitEnhancer::new(),
        );
        assert_eq!(headings(&tree).len(), 1);
    }
}
