//! Markup tree - the in-memory form of every rendered release body.
//!
//! A body is a tree of three node kinds: a single `root`, `element`s carrying
//! an HTML-ish tag plus string props, and `text` leaves. Everything that needs
//! plain text walks the tree through [`visit`], and markdown goes in and out
//! through [`render`].

pub mod render;
pub mod visit;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use render::{parse_markdown, to_markdown};
pub use visit::{retain, walk, Walk};

/// Tags that count as "this body is already structured"
const STRUCTURE_HEADINGS: [&str; 4] = ["h1", "h2", "h3", "h4"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Root {
        #[serde(default)]
        children: Vec<Node>,
    },
    Element {
        tag: String,
        #[serde(default)]
        props: BTreeMap<String, String>,
        #[serde(default)]
        children: Vec<Node>,
    },
    Text {
        value: String,
    },
}

impl Node {
    pub fn root(children: Vec<Node>) -> Self {
        Node::Root { children }
    }

    pub fn empty_root() -> Self {
        Node::Root {
            children: Vec::new(),
        }
    }

    pub fn element(tag: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element {
            tag: tag.into(),
            props: BTreeMap::new(),
            children,
        }
    }

    pub fn element_with_props(
        tag: impl Into<String>,
        props: BTreeMap<String, String>,
        children: Vec<Node>,
    ) -> Self {
        Node::Element {
            tag: tag.into(),
            props,
            children,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Node::Text {
            value: value.into(),
        }
    }

    /// `root > p > text`, the shape used whenever raw text stands in for a body
    pub fn paragraph_root(value: impl Into<String>) -> Self {
        Node::root(vec![Node::element("p", vec![Node::text(value)])])
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Root { children } | Node::Element { children, .. } => children,
            Node::Text { .. } => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Root { children } | Node::Element { children, .. } => Some(children),
            Node::Text { .. } => None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Node::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn prop(&self, name: &str) -> Option<&str> {
        match self {
            Node::Element { props, .. } => props.get(name).map(String::as_str),
            _ => None,
        }
    }

    pub fn is_element(&self, name: &str) -> bool {
        self.tag() == Some(name)
    }

    pub fn is_heading(&self) -> bool {
        matches!(self.tag(), Some("h1" | "h2" | "h3" | "h4" | "h5" | "h6"))
    }

    /// True when a top-level child is an `h1`-`h4`
    pub fn has_structure_headings(&self) -> bool {
        self.children()
            .iter()
            .any(|c| c.tag().is_some_and(|t| STRUCTURE_HEADINGS.contains(&t)))
    }

    /// Every text value in document order, trimmed, empties dropped, space-joined
    pub fn text_content(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        walk(self, &mut |node: &Node| {
            if let Node::Text { value } = node {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
            Walk::Continue
        });
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_content_flattens_nested_elements() {
        let tree = Node::root(vec![
            Node::element("h2", vec![Node::text("  Title ")]),
            Node::element(
                "ul",
                vec![Node::element(
                    "li",
                    vec![
                        Node::text("fix "),
                        Node::element("a", vec![Node::text("#1")]),
                        Node::text("   "),
                    ],
                )],
            ),
        ]);

        assert_eq!(tree.text_content(), "Title fix #1");
    }

    #[test]
    fn test_structure_headings_only_counts_top_level_h1_to_h4() {
        let with_h3 = Node::root(vec![Node::element("h3", vec![Node::text("x")])]);
        let with_h5 = Node::root(vec![Node::element("h5", vec![Node::text("x")])]);
        let nested = Node::root(vec![Node::element(
            "blockquote",
            vec![Node::element("h2", vec![Node::text("x")])],
        )]);

        assert!(with_h3.has_structure_headings());
        assert!(!with_h5.has_structure_headings());
        assert!(!nested.has_structure_headings());
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let json = serde_json::to_value(Node::paragraph_root("hello")).unwrap();
        assert_eq!(json["type"], "root");
        assert_eq!(json["children"][0]["type"], "element");
        assert_eq!(json["children"][0]["tag"], "p");
        assert_eq!(json["children"][0]["children"][0]["value"], "hello");

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, Node::paragraph_root("hello"));
    }
}
