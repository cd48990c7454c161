//! HTML reader – turns the markup a markdown translator emits into a small
//! element tree.
//!
//! Recognised blocks: div, section, p, h1-h6, ul, ol, li, table, thead,
//! tbody, tr, td, th, pre, blockquote, hr, img. Phrasing elements (span,
//! strong, em, a, code, ...) flow into their parent's text. Anything else is
//! kept as [`Tag::Unknown`] so its text still reaches the document.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Div,
    P,
    /// `h1` .. `h6`.
    Heading(u8),
    Ul,
    Ol,
    Li,
    Table,
    THead,
    TBody,
    Tr,
    Td,
    Th,
    Pre,
    Blockquote,
    Hr,
    Br,
    Img,
    /// Any phrasing element whose text simply flows into its parent.
    Inline,
    Body,
    Html,
    /// `head`, `script`, `style`: content is never rendered.
    Hidden,
    Unknown(String),
}

impl Tag {
    pub fn from_name(s: &str) -> Self {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "div" | "section" | "article" | "main" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::Heading(1),
            "h2" => Tag::Heading(2),
            "h3" => Tag::Heading(3),
            "h4" => Tag::Heading(4),
            "h5" => Tag::Heading(5),
            "h6" => Tag::Heading(6),
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "thead" => Tag::THead,
            "tbody" | "tfoot" => Tag::TBody,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "pre" => Tag::Pre,
            "blockquote" => Tag::Blockquote,
            "hr" => Tag::Hr,
            "br" => Tag::Br,
            "img" => Tag::Img,
            "span" | "strong" | "b" | "em" | "i" | "u" | "a" | "code" | "sup" | "sub"
            | "del" | "s" | "font" | "mark" | "small" => Tag::Inline,
            "body" => Tag::Body,
            "html" => Tag::Html,
            "head" | "script" | "style" | "title" => Tag::Hidden,
            _ => Tag::Unknown(lower),
        }
    }

    /// Flow content that cannot sit inside a `<p>`.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Tag::Div
                | Tag::P
                | Tag::Heading(_)
                | Tag::Ul
                | Tag::Ol
                | Tag::Table
                | Tag::Pre
                | Tag::Blockquote
                | Tag::Hr
        )
    }

    /// Elements that never have children or a closing tag.
    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Img | Tag::Br | Tag::Hr)
            || matches!(self, Tag::Unknown(name) if matches!(name.as_str(), "meta" | "link" | "input"))
    }
}

#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    /// Lower-cased attribute names.
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn src(&self) -> Option<&str> {
        self.attr("src")
    }

    /// `<hr class="page-break">` or any element styled with
    /// `page-break-before/after: always` requests an explicit section break.
    pub fn is_page_break(&self) -> bool {
        if self.classes().any(|c| c == "page-break") {
            return true;
        }
        let style: String = self
            .attr("style")
            .unwrap_or("")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        style.contains("page-break-before:always") || style.contains("page-break-after:always")
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

enum Token<'a> {
    Open {
        name: &'a str,
        attributes: Vec<(String, String)>,
        self_closing: bool,
    },
    Close(String),
    Text(&'a str),
    /// Unparsed content of `pre`, `script`, `style` or `title`.
    Raw(&'a str),
}

/// Elements whose content is taken verbatim up to the matching close tag.
fn is_raw_text(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "pre" | "script" | "style" | "title"
    )
}

fn name_len(s: &str) -> usize {
    s.find(|c: char| !(c.is_alphanumeric() || matches!(c, '-' | '_' | ':')))
        .unwrap_or(s.len())
}

fn starts_with_letter(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Everything after the first `>`, or nothing.
fn after_gt(s: &str) -> &str {
    s.find('>').map(|i| &s[i + 1..]).unwrap_or("")
}

struct Tokenizer<'a> {
    rest: &'a str,
    raw_until: Option<String>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            rest: input,
            raw_until: None,
        }
    }

    fn open_tag(&mut self) -> Token<'a> {
        let rest: &'a str = self.rest;
        let body = &rest[1..];
        let name = &body[..name_len(body)];
        let mut s = &body[name.len()..];
        let mut attributes = Vec::new();
        let self_closing = loop {
            s = s.trim_start();
            if s.is_empty() {
                break false;
            }
            if let Some(r) = s.strip_prefix("/>") {
                s = r;
                break true;
            }
            if let Some(r) = s.strip_prefix('>') {
                s = r;
                break false;
            }
            let key_len = name_len(s);
            if key_len == 0 {
                let skip = s.chars().next().map_or(1, char::len_utf8);
                s = &s[skip..];
                continue;
            }
            let key = s[..key_len].to_ascii_lowercase();
            s = s[key_len..].trim_start();
            let value = match s.strip_prefix('=') {
                Some(r) => {
                    let (value, r) = attr_value(r.trim_start());
                    s = r;
                    value
                }
                None => String::new(),
            };
            attributes.push((key, value));
        };
        self.rest = s;
        if !self_closing && is_raw_text(name) {
            self.raw_until = Some(format!("</{}", name.to_ascii_lowercase()));
        }
        Token::Open {
            name,
            attributes,
            self_closing,
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if let Some(close) = self.raw_until.take() {
            let end = self
                .rest
                .to_ascii_lowercase()
                .find(&close)
                .unwrap_or(self.rest.len());
            let (raw, rest) = self.rest.split_at(end);
            self.rest = rest;
            return Some(Token::Raw(raw));
        }
        loop {
            if self.rest.is_empty() {
                return None;
            }
            if let Some(after) = self.rest.strip_prefix("<!--") {
                self.rest = after.find("-->").map(|i| &after[i + 3..]).unwrap_or("");
                continue;
            }
            if self.rest.starts_with("<!") || self.rest.starts_with("<?") {
                // Doctype / processing instruction.
                self.rest = after_gt(self.rest);
                continue;
            }
            if let Some(after) = self.rest.strip_prefix("</") {
                if starts_with_letter(after) {
                    let name = after[..name_len(after)].to_ascii_lowercase();
                    self.rest = after_gt(after);
                    return Some(Token::Close(name));
                }
            } else if self.rest.starts_with('<') && starts_with_letter(&self.rest[1..]) {
                return Some(self.open_tag());
            }
            // Text runs to the next '<'. A '<' that opens nothing is literal.
            let first = self.rest.chars().next().map_or(1, char::len_utf8);
            let end = self.rest[first..]
                .find('<')
                .map(|i| i + first)
                .unwrap_or(self.rest.len());
            let (text, rest) = self.rest.split_at(end);
            self.rest = rest;
            return Some(Token::Text(text));
        }
    }
}

fn attr_value(s: &str) -> (String, &str) {
    for quote in ['"', '\''] {
        if let Some(r) = s.strip_prefix(quote) {
            return match r.find(quote) {
                Some(i) => (decode_entities(&r[..i]), &r[i + 1..]),
                None => (decode_entities(r), ""),
            };
        }
    }
    let end = s
        .find(|c: char| c.is_whitespace() || c == '>')
        .unwrap_or(s.len());
    (decode_entities(&s[..end]), &s[end..])
}

// ---------------------------------------------------------------------------
// Tree builder
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of DOM nodes.
///
/// Unclosed elements are closed at the end of input, stray close tags are
/// ignored, and the usual implicit closes apply (`<li>` ends an open `<li>`,
/// a block ends an open `<p>`, and so on).
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut tree = TreeBuilder::default();
    for token in Tokenizer::new(html) {
        match token {
            Token::Text(text) => tree.append(DomNode::Text(decode_entities(text))),
            Token::Raw(raw) => {
                let text = strip_tags(raw);
                if !text.is_empty() {
                    tree.append(DomNode::Text(decode_entities(&text)));
                }
            }
            Token::Open {
                name,
                attributes,
                self_closing,
            } => tree.open(name, attributes, self_closing),
            Token::Close(name) => tree.close(&name),
        }
    }
    tree.finish()
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<DomNode>,
    /// Open elements with their lower-cased source names.
    open: Vec<(String, ElementNode)>,
}

impl TreeBuilder {
    fn append(&mut self, node: DomNode) {
        match self.open.last_mut() {
            Some((_, parent)) => parent.children.push(node),
            None => self.root.push(node),
        }
    }

    fn pop(&mut self) {
        if let Some((_, el)) = self.open.pop() {
            self.append(DomNode::Element(el));
        }
    }

    fn open(&mut self, name: &str, attributes: Vec<(String, String)>, self_closing: bool) {
        let tag = Tag::from_name(name);
        while self
            .open
            .last()
            .is_some_and(|(_, top)| implicitly_closes(&tag, &top.tag))
        {
            self.pop();
        }
        let mut el = ElementNode::new(tag);
        el.attributes = attributes.into_iter().collect();
        if self_closing || el.tag.is_void() {
            self.append(DomNode::Element(el));
        } else {
            self.open.push((name.to_ascii_lowercase(), el));
        }
    }

    fn close(&mut self, name: &str) {
        if let Some(depth) = self.open.iter().rposition(|(n, _)| n == name) {
            while self.open.len() > depth {
                self.pop();
            }
        }
    }

    fn finish(mut self) -> Vec<DomNode> {
        while !self.open.is_empty() {
            self.pop();
        }
        self.root
    }
}

/// Whether opening `new` ends the element `open` at the top of the stack.
fn implicitly_closes(new: &Tag, open: &Tag) -> bool {
    match (new, open) {
        (Tag::Li, Tag::Li) => true,
        (Tag::Tr, Tag::Tr | Tag::Td | Tag::Th) => true,
        (Tag::Td | Tag::Th, Tag::Td | Tag::Th) => true,
        (Tag::THead | Tag::TBody, Tag::THead | Tag::TBody | Tag::Tr | Tag::Td | Tag::Th) => true,
        (new, Tag::P) => new.is_block(),
        _ => false,
    }
}

/// Remove markup from raw element content (`<pre>` usually wraps `<code>`).
fn strip_tags(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{00A0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Decode named and numeric character references. Unknown ones stay as-is.
fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        rest = &rest[i..];
        let decoded = rest
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| entity(&rest[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Children of `<body>` (looking inside `<html>`), or all nodes when there
/// is no body.
pub fn body_children(nodes: &[DomNode]) -> Vec<DomNode> {
    fn find_body(nodes: &[DomNode]) -> Option<&ElementNode> {
        nodes.iter().find_map(|n| match n {
            DomNode::Element(e) if e.tag == Tag::Body => Some(e),
            DomNode::Element(e) if e.tag == Tag::Html => find_body(&e.children),
            _ => None,
        })
    }
    find_body(nodes)
        .map(|body| body.children.clone())
        .unwrap_or_else(|| nodes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(node: &DomNode) -> &ElementNode {
        match node {
            DomNode::Element(e) => e,
            DomNode::Text(t) => panic!("expected element, got text {t:?}"),
        }
    }

    fn text_of(e: &ElementNode) -> String {
        e.children
            .iter()
            .map(|c| match c {
                DomNode::Text(t) => t.clone(),
                DomNode::Element(inner) => text_of(inner),
            })
            .collect()
    }

    #[test]
    fn page_break_class_and_style() {
        let nodes = parse_html(
            r#"<div class="page-break note"><p>Hello</p></div><hr style="page-break-after: always">"#,
        );
        assert_eq!(nodes.len(), 2);
        let div = element(&nodes[0]);
        assert_eq!(div.tag, Tag::Div);
        assert_eq!(div.classes().collect::<Vec<_>>(), vec!["page-break", "note"]);
        assert!(div.is_page_break());
        assert_eq!(div.children.len(), 1);
        assert!(element(&nodes[1]).is_page_break());
    }

    #[test]
    fn void_elements_need_no_slash() {
        let nodes = parse_html(r#"<p>a<br>b</p><hr><img src="logo.png"><p>c</p>"#);
        assert_eq!(nodes.len(), 4);
        let img = element(&nodes[2]);
        assert_eq!(img.tag, Tag::Img);
        assert_eq!(img.src(), Some("logo.png"));
    }

    #[test]
    fn headings_keep_their_level() {
        let tags: Vec<Tag> = parse_html("<h1>A</h1><H4>B</H4>")
            .iter()
            .map(|n| element(n).tag.clone())
            .collect();
        assert_eq!(tags, vec![Tag::Heading(1), Tag::Heading(4)]);
    }

    #[test]
    fn table_sections_nest() {
        let html = r#"<table><thead><tr><th>Name</th></tr></thead><tbody><tr><td>Alice</td></tr></tbody></table>"#;
        let nodes = parse_html(html);
        assert_eq!(nodes.len(), 1);
        let table = element(&nodes[0]);
        assert_eq!(table.tag, Tag::Table);
        assert_eq!(table.children.len(), 2);
    }

    #[test]
    fn unclosed_items_close_implicitly() {
        let nodes = parse_html("<ul><li>one<li>two</ul><p>a<p>b");
        assert_eq!(nodes.len(), 3);
        let items: Vec<String> = element(&nodes[0]).children.iter().map(|n| text_of(element(n))).collect();
        assert_eq!(items, vec!["one", "two"]);
        assert_eq!(text_of(element(&nodes[2])), "b");
    }

    #[test]
    fn stray_close_tags_are_ignored() {
        let nodes = parse_html("<div>x</span></div>");
        assert_eq!(nodes.len(), 1);
        assert_eq!(text_of(element(&nodes[0])), "x");
    }

    #[test]
    fn pre_keeps_raw_text() {
        let nodes = parse_html("<pre><code>let x = a &lt; b;\n  <b>y</b></code></pre>");
        let pre = element(&nodes[0]);
        assert_eq!(pre.children.len(), 1);
        assert_eq!(text_of(pre), "let x = a < b;\n  y");
    }

    #[test]
    fn entities_and_stray_lt() {
        let nodes = parse_html("<p>1 &lt; 2 &amp;&amp; 3 < 4 &#233;&#x41; &bogus;</p>");
        assert_eq!(text_of(element(&nodes[0])), "1 < 2 && 3 < 4 \u{e9}A &bogus;");
    }

    #[test]
    fn body_is_found_inside_html() {
        let nodes = parse_html(
            "<!DOCTYPE html><html><head><title>T</title></head><body><p>x</p></body></html>",
        );
        let body = body_children(&nodes);
        assert_eq!(body.len(), 1);
        assert_eq!(element(&body[0]).tag, Tag::P);
    }
}
