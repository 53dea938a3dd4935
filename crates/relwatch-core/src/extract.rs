// Plain-text views of a markup tree
use std::sync::LazyLock;

use regex::Regex;

use crate::markup::{retain, walk, Node, Walk};

/// `(abc1234)` at the very end of a list item
static TRAILING_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([a-f0-9]{7,8}\)$").expect("Invalid regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex"));

/// Items at or below this many characters are noise ("wip", "ok")
const MIN_MESSAGE_CHARS: usize = 5;

/// Commit-like messages from every `li` in document order
///
/// Each item's text is flattened and whitespace-normalized, a trailing short
/// hash in parentheses is removed, and merge commits and near-empty items are
/// skipped. Lists nested inside an item belong to that item.
pub fn extract_list_items(tree: &Node) -> Vec<String> {
    let mut messages = Vec::new();

    walk(tree, &mut |node: &Node| {
        if !node.is_element("li") {
            return Walk::Continue;
        }
        if let Some(message) = clean_message(&node.text_content()) {
            messages.push(message);
        }
        Walk::SkipChildren
    });

    messages
}

fn clean_message(raw: &str) -> Option<String> {
    let normalized = WHITESPACE.replace_all(raw.trim(), " ");
    let cleaned = TRAILING_HASH.replace(&normalized, "");
    let cleaned = cleaned.trim();

    if cleaned.starts_with("Merge") || cleaned.chars().count() <= MIN_MESSAGE_CHARS {
        return None;
    }
    Some(cleaned.to_string())
}

/// Every text value, trimmed and space-joined
pub fn flatten_text(tree: &Node) -> String {
    tree.text_content()
}

/// Remove `img` elements wherever they sit
pub fn strip_image_nodes(tree: &mut Node) {
    retain(tree, &mut |node: &Node| !node.is_element("img"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_markdown;

    #[test]
    fn test_merges_short_items_and_hashes() {
        let tree = parse_markdown("- Merge pull request #1\n- ok\n- Fix a real thing (abc1234)\n");
        assert_eq!(extract_list_items(&tree), vec!["Fix a real thing"]);
    }

    #[test]
    fn test_text_is_flattened_across_inline_elements() {
        let tree = parse_markdown(
            "* feat: add **bold** support in [#12](https://github.com/o/r/issues/12)\n",
        );
        assert_eq!(
            extract_list_items(&tree),
            vec!["feat: add bold support in #12"]
        );
    }

    #[test]
    fn test_nested_list_belongs_to_parent_item() {
        let tree = parse_markdown("- parent item\n  - child item\n- second item\n");
        assert_eq!(
            extract_list_items(&tree),
            vec!["parent item child item", "second item"]
        );
    }

    #[test]
    fn test_items_inside_other_blocks_are_found() {
        let tree = parse_markdown("> - quoted change here\n\nParagraph text\n");
        assert_eq!(extract_list_items(&tree), vec!["quoted change here"]);
    }

    #[test]
    fn test_hash_only_stripped_at_end() {
        let tree = parse_markdown("- (abc1234) in the middle\n");
        assert_eq!(extract_list_items(&tree), vec!["(abc1234) in the middle"]);
    }

    #[test]
    fn test_flatten_text() {
        let tree = parse_markdown("# Title\n\nSome *nice* text\n");
        assert_eq!(flatten_text(&tree), "Title Some nice text");
    }

    #[test]
    fn test_strip_image_nodes() {
        let mut tree = parse_markdown("Look ![shot](https://x.io/a.png) here\n");
        strip_image_nodes(&mut tree);
        assert_eq!(flatten_text(&tree), "Look here");
    }
}
