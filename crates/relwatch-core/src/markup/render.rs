// Markdown <-> markup tree, on top of pulldown-cmark
use std::collections::BTreeMap;

use pulldown_cmark::{
    CodeBlockKind, CowStr, Event, HeadingLevel, LinkType, Options, Parser, Tag, TagEnd,
};
use tracing::warn;

use super::Node;

/// Parse markdown into a tree rooted at `Node::Root`
///
/// Never fails: if the event stream can't be assembled into a tree the raw
/// markdown comes back as a single paragraph.
pub fn parse_markdown(markdown: &str) -> Node {
    match build_tree(markdown) {
        Some(tree) => tree,
        None => {
            warn!("Failed to build markup tree, keeping raw text");
            Node::paragraph_root(markdown)
        }
    }
}

/// Render a tree back to CommonMark
pub fn to_markdown(tree: &Node) -> String {
    let mut events = Vec::new();
    emit(tree, &mut events);

    let mut output = String::new();
    match pulldown_cmark_to_cmark::cmark(events.iter(), &mut output) {
        Ok(_) => output,
        Err(e) => {
            warn!("Failed to render markdown: {:?}", e);
            tree.text_content()
        }
    }
}

struct Frame {
    tag: &'static str,
    props: BTreeMap<String, String>,
    children: Vec<Node>,
}

impl Frame {
    fn new(tag: &'static str) -> Self {
        Self {
            tag,
            props: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    fn with_prop(mut self, name: &str, value: impl Into<String>) -> Self {
        self.props.insert(name.to_string(), value.into());
        self
    }

    fn push_text(&mut self, text: &str) {
        // The parser splits text at every special character; keep one node per run
        if let Some(Node::Text { value }) = self.children.last_mut() {
            value.push_str(text);
        } else {
            self.children.push(Node::text(text));
        }
    }

    fn close(self) -> Node {
        match self.tag {
            "pre" => {
                let code: String = self.children.iter().map(raw_text).collect();
                Node::element_with_props(
                    "pre",
                    self.props,
                    vec![Node::element("code", vec![Node::text(code)])],
                )
            }
            "img" => {
                let mut props = self.props;
                let alt: String = self.children.iter().map(raw_text).collect();
                props.insert("alt".to_string(), alt);
                Node::element_with_props("img", props, Vec::new())
            }
            tag => Node::element_with_props(tag, self.props, self.children),
        }
    }
}

fn build_tree(markdown: &str) -> Option<Node> {
    let mut stack = vec![Frame::new("root")];

    for event in Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH) {
        match event {
            Event::Start(tag) => stack.push(open_frame(&tag)),
            Event::End(_) => {
                if stack.len() < 2 {
                    return None;
                }
                let node = stack.pop()?.close();
                stack.last_mut()?.children.push(node);
            }
            Event::Text(text) | Event::Html(text) | Event::InlineHtml(text) => {
                stack.last_mut()?.push_text(&text)
            }
            Event::Code(code) => stack
                .last_mut()?
                .children
                .push(Node::element("code", vec![Node::text(code.to_string())])),
            Event::SoftBreak => stack.last_mut()?.push_text(" "),
            Event::HardBreak => stack.last_mut()?.children.push(Node::element("br", vec![])),
            Event::Rule => stack.last_mut()?.children.push(Node::element("hr", vec![])),
            // Footnotes, task lists and math are not enabled
            _ => {}
        }
    }

    if stack.len() != 1 {
        return None;
    }
    let root = stack.pop()?;
    Some(Node::root(root.children))
}

fn open_frame(tag: &Tag) -> Frame {
    match tag {
        Tag::Paragraph => Frame::new("p"),
        Tag::Heading { level, .. } => Frame::new(heading_tag(*level)),
        Tag::BlockQuote(_) => Frame::new("blockquote"),
        Tag::CodeBlock(CodeBlockKind::Fenced(lang)) if !lang.is_empty() => {
            Frame::new("pre").with_prop("language", lang.to_string())
        }
        Tag::CodeBlock(_) => Frame::new("pre"),
        Tag::List(Some(start)) if *start != 1 => {
            Frame::new("ol").with_prop("start", start.to_string())
        }
        Tag::List(Some(_)) => Frame::new("ol"),
        Tag::List(None) => Frame::new("ul"),
        Tag::Item => Frame::new("li"),
        Tag::Emphasis => Frame::new("em"),
        Tag::Strong => Frame::new("strong"),
        Tag::Strikethrough => Frame::new("del"),
        Tag::Link {
            dest_url, title, ..
        } => {
            let frame = Frame::new("a").with_prop("href", dest_url.to_string());
            if title.is_empty() {
                frame
            } else {
                frame.with_prop("title", title.to_string())
            }
        }
        Tag::Image {
            dest_url, title, ..
        } => {
            let frame = Frame::new("img").with_prop("src", dest_url.to_string());
            if title.is_empty() {
                frame
            } else {
                frame.with_prop("title", title.to_string())
            }
        }
        // HTML blocks, tables and the rest render as a transparent container
        _ => Frame::new("div"),
    }
}

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

fn heading_level(tag: &str) -> Option<HeadingLevel> {
    match tag {
        "h1" => Some(HeadingLevel::H1),
        "h2" => Some(HeadingLevel::H2),
        "h3" => Some(HeadingLevel::H3),
        "h4" => Some(HeadingLevel::H4),
        "h5" => Some(HeadingLevel::H5),
        "h6" => Some(HeadingLevel::H6),
        _ => None,
    }
}

/// Concatenated text values, untrimmed
fn raw_text(node: &Node) -> String {
    match node {
        Node::Text { value } => value.clone(),
        other => other.children().iter().map(raw_text).collect(),
    }
}

fn prop(props: &BTreeMap<String, String>, name: &str) -> String {
    props.get(name).cloned().unwrap_or_default()
}

fn emit(node: &Node, events: &mut Vec<Event<'static>>) {
    let (tag, props, children) = match node {
        Node::Root { children } => {
            for child in children {
                emit(child, events);
            }
            return;
        }
        Node::Text { value } => {
            events.push(Event::Text(CowStr::from(value.clone())));
            return;
        }
        Node::Element {
            tag,
            props,
            children,
        } => (tag.as_str(), props, children),
    };

    let (start, end) = match tag {
        "code" => {
            events.push(Event::Code(CowStr::from(raw_text(node))));
            return;
        }
        "pre" => {
            let mut code = raw_text(node);
            if !code.ends_with('\n') {
                code.push('\n');
            }
            let lang = CowStr::from(prop(props, "language"));
            events.push(Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang))));
            events.push(Event::Text(CowStr::from(code)));
            events.push(Event::End(TagEnd::CodeBlock));
            return;
        }
        "br" => {
            events.push(Event::HardBreak);
            return;
        }
        "hr" => {
            events.push(Event::Rule);
            return;
        }
        "img" => {
            events.push(Event::Start(Tag::Image {
                link_type: LinkType::Inline,
                dest_url: CowStr::from(prop(props, "src")),
                title: CowStr::from(prop(props, "title")),
                id: CowStr::Borrowed(""),
            }));
            events.push(Event::Text(CowStr::from(prop(props, "alt"))));
            events.push(Event::End(TagEnd::Image));
            return;
        }
        "p" => (Tag::Paragraph, TagEnd::Paragraph),
        "ul" => (Tag::List(None), TagEnd::List(false)),
        "ol" => {
            let start = props
                .get("start")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            (Tag::List(Some(start)), TagEnd::List(true))
        }
        "li" => (Tag::Item, TagEnd::Item),
        "blockquote" => (Tag::BlockQuote(None), TagEnd::BlockQuote(None)),
        "em" => (Tag::Emphasis, TagEnd::Emphasis),
        "strong" => (Tag::Strong, TagEnd::Strong),
        "del" => (Tag::Strikethrough, TagEnd::Strikethrough),
        "a" => (
            Tag::Link {
                link_type: LinkType::Inline,
                dest_url: CowStr::from(prop(props, "href")),
                title: CowStr::from(prop(props, "title")),
                id: CowStr::Borrowed(""),
            },
            TagEnd::Link,
        ),
        other => match heading_level(other) {
            Some(level) => (
                Tag::Heading {
                    level,
                    id: None,
                    classes: Vec::new(),
                    attrs: Vec::new(),
                },
                TagEnd::Heading(level),
            ),
            None => {
                // Unknown containers contribute only their content
                for child in children {
                    emit(child, events);
                }
                return;
            }
        },
    };

    events.push(Event::Start(start));
    for child in children {
        emit(child, events);
    }
    events.push(Event::End(end));
}
