// Depth-first traversal shared by every consumer of the markup tree
use super::Node;

/// What the walker should do after entering a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Continue,
    /// Don't descend into this node's children
    SkipChildren,
}

pub trait Visitor {
    fn enter(&mut self, node: &Node) -> Walk;
}

impl<F> Visitor for F
where
    F: FnMut(&Node) -> Walk,
{
    fn enter(&mut self, node: &Node) -> Walk {
        self(node)
    }
}

/// Pre-order walk in document order
pub fn walk<V: Visitor>(node: &Node, visitor: &mut V) {
    if visitor.enter(node) == Walk::SkipChildren {
        return;
    }
    for child in node.children() {
        walk(child, visitor);
    }
}

/// Drop every descendant for which `keep` returns false. A dropped node's
/// subtree is never visited.
pub fn retain<F>(node: &mut Node, keep: &mut F)
where
    F: FnMut(&Node) -> bool,
{
    if let Some(children) = node.children_mut() {
        children.retain(|child| keep(child));
        for child in children.iter_mut() {
            retain(child, keep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        Node::root(vec![
            Node::element(
                "ul",
                vec![
                    Node::element("li", vec![Node::text("one")]),
                    Node::element("li", vec![Node::text("two")]),
                ],
            ),
            Node::element("p", vec![Node::text("three")]),
        ])
    }

    #[test]
    fn test_walk_is_pre_order() {
        let mut seen = Vec::new();
        walk(&sample(), &mut |node: &Node| {
            match node {
                Node::Root { .. } => seen.push("root".to_string()),
                Node::Element { tag, .. } => seen.push(tag.clone()),
                Node::Text { value } => seen.push(value.clone()),
            }
            Walk::Continue
        });

        assert_eq!(
            seen,
            vec!["root", "ul", "li", "one", "li", "two", "p", "three"]
        );
    }

    #[test]
    fn test_skip_children() {
        let mut texts = Vec::new();
        walk(&sample(), &mut |node: &Node| {
            if node.is_element("ul") {
                return Walk::SkipChildren;
            }
            if let Node::Text { value } = node {
                texts.push(value.clone());
            }
            Walk::Continue
        });

        assert_eq!(texts, vec!["three"]);
    }

    #[test]
    fn test_retain_removes_matching_subtrees() {
        let mut tree = sample();
        retain(&mut tree, &mut |node: &Node| !node.is_element("ul"));
        assert_eq!(tree.text_content(), "three");
    }
}
