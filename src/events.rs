//! Content normalizer – flattens marked-up or plain text into the ordered
//! stream of [`ContentEvent`]s the layout engine consumes.
//!
//! The event stream is read once, left to right; no consumer needs random
//! access into it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::dom::{body_children, parse_html, DomNode, ElementNode, Tag};
use crate::formula::{split_tokens, TextPiece};

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Path(PathBuf),
    /// `data:<mime>;base64,<payload>`.
    DataUri(String),
    /// Bytes already in memory, e.g. a rendered formula.
    Buffer { name: String, bytes: Arc<Vec<u8>> },
}

impl ImageSource {
    /// Stable identity used to share one decoded image between uses.
    pub fn key(&self) -> String {
        match self {
            ImageSource::Path(p) => format!("path:{}", p.display()),
            ImageSource::DataUri(uri) => format!("data:{:x}", Sha256::digest(uri.as_bytes())),
            ImageSource::Buffer { name, .. } => format!("buffer:{name}"),
        }
    }

    /// Interpret an `<img src>` value.
    pub fn from_src(src: &str, base_dir: Option<&Path>) -> Self {
        if src.starts_with("data:") {
            return ImageSource::DataUri(src.to_string());
        }
        let path = PathBuf::from(src);
        match base_dir {
            Some(base) if path.is_relative() => ImageSource::Path(base.join(path)),
            _ => ImageSource::Path(path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMarker {
    Ordinal(u32),
    Bullet,
}

/// One semantic unit of content, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentEvent {
    Heading {
        /// 1 = top level.
        level: u8,
        text: String,
        /// Listed in the table of contents.
        toc: bool,
    },
    Paragraph {
        text: String,
    },
    ListItem {
        text: String,
        marker: ListMarker,
        /// 1 for a top-level list.
        depth: u8,
    },
    TableRow {
        cells: Vec<String>,
        header: bool,
    },
    /// Closes the table whose rows precede it.
    TableEnd,
    Image {
        source: ImageSource,
    },
    FormulaPlaceholder {
        token: String,
        /// Block (`$$…$$`) formulas are centred on their own line.
        display: bool,
    },
    /// Explicit request to continue on a new page.
    SectionBreak,
}

impl ContentEvent {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        ContentEvent::Heading {
            level,
            text: text.into(),
            toc: true,
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        ContentEvent::Paragraph { text: text.into() }
    }
}

/// Options for turning markup into events.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Headings at or above this level are flagged for the TOC.
    pub toc_depth: u8,
    /// Relative image paths are resolved against this directory.
    pub base_dir: Option<PathBuf>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            toc_depth: 2,
            base_dir: None,
        }
    }
}

/// Normalize an HTML fragment or document.
pub fn events_from_html(html: &str, options: &NormalizeOptions) -> Vec<ContentEvent> {
    let dom = parse_html(html);
    let nodes = body_children(&dom);
    let mut n = Normalizer {
        options,
        events: Vec::new(),
    };
    n.blocks(&nodes, 1);
    n.events
}

/// Normalize plain text: blank lines separate paragraphs, a form feed
/// starts a new page.
pub fn events_from_plain_text(text: &str) -> Vec<ContentEvent> {
    let mut events = Vec::new();
    for (i, section) in text.split('\u{000C}').enumerate() {
        if i > 0 {
            events.push(ContentEvent::SectionBreak);
        }
        let mut para: Vec<&str> = Vec::new();
        for line in section.lines() {
            if line.trim().is_empty() {
                push_paragraph(&mut events, &para.join(" "));
                para.clear();
            } else {
                para.push(line.trim());
            }
        }
        push_paragraph(&mut events, &para.join(" "));
    }
    events
}

/// Emit a paragraph, splitting out any formula tokens it contains.
fn push_paragraph(events: &mut Vec<ContentEvent>, text: &str) {
    for piece in split_tokens(text) {
        match piece {
            TextPiece::Text(t) => {
                let t = t.trim();
                if !t.is_empty() {
                    events.push(ContentEvent::paragraph(t));
                }
            }
            TextPiece::Token { token, display } => events.push(ContentEvent::FormulaPlaceholder {
                token: token.to_string(),
                display,
            }),
        }
    }
}

struct Normalizer<'a> {
    options: &'a NormalizeOptions,
    events: Vec<ContentEvent>,
}

impl Normalizer<'_> {
    /// Walk block-level content. Runs of inline nodes become paragraphs.
    fn blocks(&mut self, nodes: &[DomNode], list_depth: u8) {
        let mut inline_run: Vec<&DomNode> = Vec::new();
        for node in nodes {
            let is_inline = match node {
                DomNode::Text(_) => true,
                DomNode::Element(e) => matches!(e.tag, Tag::Inline | Tag::Br),
            };
            if is_inline {
                inline_run.push(node);
                continue;
            }
            self.inline_paragraph(&inline_run);
            inline_run.clear();
            if let DomNode::Element(e) = node {
                self.block(e, list_depth);
            }
        }
        self.inline_paragraph(&inline_run);
    }

    fn block(&mut self, e: &ElementNode, list_depth: u8) {
        if e.is_page_break() {
            self.events.push(ContentEvent::SectionBreak);
        }
        match &e.tag {
            Tag::Heading(level) => {
                let text = strip_formula_tokens(&normalize_ws(&inline_text(&e.children)));
                if !text.is_empty() {
                    self.events.push(ContentEvent::Heading {
                        level: *level,
                        text,
                        toc: *level <= self.options.toc_depth,
                    });
                }
            }
            Tag::P => self.paragraph(&e.children),
            Tag::Pre => {
                let raw = inline_text(&e.children);
                let text = raw.trim_end_matches('\n');
                if !text.trim().is_empty() {
                    self.events.push(ContentEvent::paragraph(text));
                }
            }
            Tag::Ul | Tag::Ol => self.list(e, list_depth),
            Tag::Table => self.table(e),
            Tag::Img => self.image(e),
            Tag::Hr | Tag::Hidden | Tag::Br | Tag::Inline => {}
            Tag::Li => {
                // A list item outside of a list: treat as a bullet.
                self.list_item(e, ListMarker::Bullet, list_depth);
            }
            Tag::Div
            | Tag::Blockquote
            | Tag::Body
            | Tag::Html
            | Tag::THead
            | Tag::TBody
            | Tag::Tr
            | Tag::Td
            | Tag::Th
            | Tag::Unknown(_) => self.blocks(&e.children, list_depth),
        }
    }

    /// A paragraph may contain images and line breaks; images split it.
    fn paragraph(&mut self, children: &[DomNode]) {
        let mut run: Vec<&DomNode> = Vec::new();
        for child in children {
            match child {
                DomNode::Element(e) if e.tag == Tag::Img => {
                    self.inline_paragraph(&run);
                    run.clear();
                    self.image(e);
                }
                _ => run.push(child),
            }
        }
        self.inline_paragraph(&run);
    }

    fn inline_paragraph(&mut self, nodes: &[&DomNode]) {
        if nodes.is_empty() {
            return;
        }
        let raw: String = nodes.iter().map(|n| node_text(n)).collect();
        let text = raw
            .split('\n')
            .map(normalize_ws)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        push_paragraph(&mut self.events, &text);
    }

    fn list(&mut self, list: &ElementNode, depth: u8) {
        let ordered = list.tag == Tag::Ol;
        let mut counter: u32 = list
            .attr("start")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(1);
        for child in &list.children {
            let DomNode::Element(li) = child else { continue };
            if li.tag != Tag::Li {
                // Stray content inside a list (e.g. a nested list without <li>).
                self.block(li, depth.saturating_add(1));
                continue;
            }
            let marker = if ordered {
                ListMarker::Ordinal(counter)
            } else {
                ListMarker::Bullet
            };
            counter = counter.saturating_add(1);
            self.list_item(li, marker, depth);
        }
    }

    fn list_item(&mut self, li: &ElementNode, marker: ListMarker, depth: u8) {
        let text = strip_formula_tokens(&normalize_ws(&list_item_text(&li.children)));
        // An item holding only a nested list gets no marker line of its own.
        if !text.is_empty() {
            self.events.push(ContentEvent::ListItem {
                text,
                marker,
                depth: depth.max(1),
            });
        }
        for child in &li.children {
            if let DomNode::Element(e) = child {
                match e.tag {
                    Tag::Ul | Tag::Ol => self.list(e, depth.saturating_add(1)),
                    Tag::Img => self.image(e),
                    Tag::Table => self.table(e),
                    _ => {}
                }
            }
        }
    }

    fn table(&mut self, table: &ElementNode) {
        let mut rows: Vec<(&ElementNode, bool)> = Vec::new();
        for child in &table.children {
            let DomNode::Element(e) = child else { continue };
            match e.tag {
                Tag::Tr => rows.push((e, false)),
                Tag::THead | Tag::TBody => {
                    let in_head = e.tag == Tag::THead;
                    for row in &e.children {
                        if let DomNode::Element(r) = row {
                            if r.tag == Tag::Tr {
                                rows.push((r, in_head));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        if rows.is_empty() {
            return;
        }
        for (row, in_head) in rows {
            let mut all_th = true;
            let mut cells = Vec::new();
            for cell in &row.children {
                if let DomNode::Element(c) = cell {
                    if matches!(c.tag, Tag::Td | Tag::Th) {
                        all_th &= c.tag == Tag::Th;
                        cells.push(strip_formula_tokens(&normalize_ws(&inline_text(
                            &c.children,
                        ))));
                    }
                }
            }
            if cells.is_empty() {
                continue;
            }
            self.events.push(ContentEvent::TableRow {
                cells,
                header: in_head || all_th,
            });
        }
        self.events.push(ContentEvent::TableEnd);
    }

    fn image(&mut self, img: &ElementNode) {
        match img.src() {
            Some(src) if !src.trim().is_empty() => self.events.push(ContentEvent::Image {
                source: ImageSource::from_src(src.trim(), self.options.base_dir.as_deref()),
            }),
            _ => log::warn!("Skipping <img> without src"),
        }
    }
}

/// Text of a node; `<br>` becomes a newline.
fn node_text(node: &DomNode) -> String {
    match node {
        DomNode::Text(t) => t.clone(),
        DomNode::Element(e) => match e.tag {
            Tag::Br => "\n".to_string(),
            Tag::Hidden => String::new(),
            _ => inline_text(&e.children),
        },
    }
}

fn inline_text(children: &[DomNode]) -> String {
    children.iter().map(node_text).collect()
}

/// Text of a list item without its nested lists.
fn list_item_text(children: &[DomNode]) -> String {
    children
        .iter()
        .filter(|c| {
            !matches!(c, DomNode::Element(e) if matches!(e.tag, Tag::Ul | Tag::Ol | Tag::Table | Tag::Img))
        })
        .map(|c| format!("{} ", node_text(c)))
        .collect()
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Headings, list items and table cells are laid out as plain text; any
/// formula tokens in them are dropped.
fn strip_formula_tokens(s: &str) -> String {
    let kept: Vec<String> = split_tokens(s)
        .into_iter()
        .filter_map(|p| match p {
            TextPiece::Text(t) => Some(t.to_string()),
            TextPiece::Token { .. } => None,
        })
        .collect();
    normalize_ws(&kept.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::formula_token;

    fn html(s: &str) -> Vec<ContentEvent> {
        events_from_html(s, &NormalizeOptions::default())
    }

    #[test]
    fn headings_and_paragraphs_in_order() {
        let events = html("<h1>Intro</h1><p>Hello <strong>bold</strong> world</p><h3>Deep</h3>");
        assert_eq!(
            events,
            vec![
                ContentEvent::Heading { level: 1, text: "Intro".into(), toc: true },
                ContentEvent::paragraph("Hello bold world"),
                ContentEvent::Heading { level: 3, text: "Deep".into(), toc: false },
            ]
        );
    }

    #[test]
    fn nested_lists_carry_depth_and_ordinals() {
        let events = html("<ol start=\"3\"><li>One<ul><li>Sub</li></ul></li><li>Two</li></ol>");
        assert_eq!(
            events,
            vec![
                ContentEvent::ListItem { text: "One".into(), marker: ListMarker::Ordinal(3), depth: 1 },
                ContentEvent::ListItem { text: "Sub".into(), marker: ListMarker::Bullet, depth: 2 },
                ContentEvent::ListItem { text: "Two".into(), marker: ListMarker::Ordinal(4), depth: 1 },
            ]
        );
    }

    #[test]
    fn ordinal_counter_saturates() {
        let events = html("<ol start=\"4294967295\"><li>a</li><li>b</li></ol>");
        assert_eq!(
            events,
            vec![
                ContentEvent::ListItem { text: "a".into(), marker: ListMarker::Ordinal(u32::MAX), depth: 1 },
                ContentEvent::ListItem { text: "b".into(), marker: ListMarker::Ordinal(u32::MAX), depth: 1 },
            ]
        );
    }

    #[test]
    fn deep_nesting_saturates_depth() {
        let options = NormalizeOptions::default();
        let mut n = Normalizer { options: &options, events: Vec::new() };
        let nested = body_children(&parse_html("<ul><li>deep</li></ul>"));
        let DomNode::Element(ul) = &nested[0] else {
            panic!("expected a list element");
        };
        n.list(ul, u8::MAX);
        assert_eq!(
            n.events,
            vec![ContentEvent::ListItem { text: "deep".into(), marker: ListMarker::Bullet, depth: u8::MAX }]
        );
    }

    #[test]
    fn item_with_only_a_nested_list_has_no_empty_line() {
        let events = html("<ul><li><ul><li>inner</li></ul></li></ul>");
        assert_eq!(
            events,
            vec![ContentEvent::ListItem { text: "inner".into(), marker: ListMarker::Bullet, depth: 2 }]
        );
    }

    #[test]
    fn table_rows_then_end() {
        let events = html(
            "<table><thead><tr><th>A</th><th>B</th></tr></thead>\
             <tbody><tr><td>1</td><td>2</td></tr></tbody></table>",
        );
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            ContentEvent::TableRow { cells: vec!["A".into(), "B".into()], header: true }
        );
        assert_eq!(
            events[1],
            ContentEvent::TableRow { cells: vec!["1".into(), "2".into()], header: false }
        );
        assert_eq!(events[2], ContentEvent::TableEnd);
    }

    #[test]
    fn formula_tokens_split_paragraphs() {
        let token = formula_token(0, false);
        let events = html(&format!("<p>Before {token} after</p>"));
        assert_eq!(
            events,
            vec![
                ContentEvent::paragraph("Before"),
                ContentEvent::FormulaPlaceholder { token, display: false },
                ContentEvent::paragraph("after"),
            ]
        );
    }

    #[test]
    fn images_inside_paragraphs_and_base_dir() {
        let opts = NormalizeOptions {
            base_dir: Some(PathBuf::from("/docs")),
            ..NormalizeOptions::default()
        };
        let events = events_from_html("<p>Look: <img src=\"a.png\"> done</p>", &opts);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            ContentEvent::Image { source: ImageSource::Path(PathBuf::from("/docs/a.png")) }
        );
    }

    #[test]
    fn page_break_markers() {
        let events = html("<p>a</p><hr class=\"page-break\"><p>b</p>");
        assert_eq!(events[1], ContentEvent::SectionBreak);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn plain_text_paragraphs_and_form_feed() {
        let events = events_from_plain_text("line one\nline two\n\nsecond\u{000C}third");
        assert_eq!(
            events,
            vec![
                ContentEvent::paragraph("line one line two"),
                ContentEvent::paragraph("second"),
                ContentEvent::SectionBreak,
                ContentEvent::paragraph("third"),
            ]
        );
    }

    #[test]
    fn data_uri_keys_are_stable() {
        let a = ImageSource::DataUri("data:image/png;base64,AAAA".into());
        let b = ImageSource::DataUri("data:image/png;base64,AAAA".into());
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), ImageSource::DataUri("data:image/png;base64,AAAB".into()).key());
        // Same length, bytes swapped: must not share an embedding.
        assert_ne!(
            ImageSource::DataUri("data:image/png;base64,ABBA".into()).key(),
            ImageSource::DataUri("data:image/png;base64,BAAB".into()).key()
        );
        assert_eq!(a.key().len(), "data:".len() + 64);
    }
}
