//! Document model – the intermediate representation between layout and PDF
//! rendering. This is the "frozen" structure that encodes exactly what goes
//! on each page; it can be dumped to JSON and rendered later.
//!
//! Element coordinates are page-absolute points with the origin at the
//! top-left corner of the physical page.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::fonts::FontFamily;

/// Identifies a heading's link target. Allocated from a per-build counter,
/// so the same content yields the same ids in every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(pub u32);

/// Which part of the document a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Cover,
    Toc,
    #[default]
    Body,
}

/// A complete document layout ready for rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentLayout {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    /// Width of each page in PDF points (1 pt = 1/72 inch).
    pub page_width_pt: f32,
    /// Height of each page in PDF points.
    pub page_height_pt: f32,
    /// Ordered physical pages.
    pub pages: Vec<PageLayout>,
    /// Resolved table of contents.
    pub toc: Vec<TocEntry>,
    /// Anchor → physical page (1-based).
    pub anchors: BTreeMap<AnchorId, u32>,
    /// Image bytes referenced by [`ImageBlock::image`].
    pub images: BTreeMap<String, EmbeddedImage>,
}

/// One page of content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageLayout {
    /// Physical page number, 1-based.
    pub page_number: u32,
    #[serde(default)]
    pub kind: PageKind,
    pub elements: Vec<PageElement>,
}

impl PageLayout {
    pub fn new(page_number: u32, kind: PageKind) -> Self {
        Self {
            page_number,
            kind,
            elements: Vec::new(),
        }
    }

    /// Pages holding only anchors still count as empty.
    pub fn has_content(&self) -> bool {
        self.elements
            .iter()
            .any(|e| !matches!(e, PageElement::Anchor(_)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PageElement {
    Text(TextBlock),
    Image(ImageBlock),
    Table(TableBlock),
    Anchor(AnchorMark),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub font: FontFamily,
    pub bold: bool,
    pub italic: bool,
    pub font_size: f32,
    pub color: [f32; 4],
    pub line_height: f32,
    /// Pre-wrapped lines.
    pub lines: Vec<TextLine>,
    /// Drawn in the gutter left of `x`, e.g. `"3."` or a bullet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// Clicking the block jumps to this anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<AnchorId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// X offset within the block (for alignment).
    pub x_offset: f32,
    /// Y offset from the top of the block.
    pub y_offset: f32,
    /// When set, words are spread to fill this width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justify_width: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Key into [`DocumentLayout::images`].
    pub image: String,
}

/// A table (or one page's slice of it) with resolved geometry and style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBlock {
    pub x: f32,
    pub y: f32,
    pub column_widths: Vec<f32>,
    pub rows: Vec<TableRowLayout>,
    pub font: FontFamily,
    pub font_size: f32,
    pub line_height: f32,
    pub cell_padding: f32,
    pub text_color: [f32; 4],
    /// Fill behind the whole table.
    #[serde(default)]
    pub background: Option<[f32; 4]>,
    /// Cell grid lines.
    #[serde(default)]
    pub grid: Option<Stroke>,
    /// Line under the header rows.
    #[serde(default)]
    pub header_rule: Option<Stroke>,
}

impl TableBlock {
    pub fn width(&self) -> f32 {
        self.column_widths.iter().sum()
    }

    pub fn height(&self) -> f32 {
        self.rows.iter().map(|r| r.height).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRowLayout {
    /// Offset of the row top from the table top.
    pub y_offset: f32,
    pub height: f32,
    pub header: bool,
    #[serde(default)]
    pub fill: Option<[f32; 4]>,
    /// Wrapped lines per cell.
    pub cells: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub width: f32,
    pub color: [f32; 4],
}

/// Marks a heading position; the renderer turns it into a bookmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorMark {
    pub id: AnchorId,
    pub y: f32,
    pub title: String,
    pub level: u8,
}

/// One line of the table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub text: String,
    /// 0 = top level.
    pub level: u8,
    /// `None` until resolved.
    pub page: Option<u32>,
    pub anchor: AnchorId,
}

/// Encoded image bytes plus pixel size, serialized as base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedImage {
    #[serde(serialize_with = "ser_base64", deserialize_with = "de_base64")]
    pub bytes: Arc<Vec<u8>>,
    pub width_px: u32,
    pub height_px: u32,
}

fn ser_base64<S: Serializer>(bytes: &Arc<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&BASE64_STD.encode(bytes.as_slice()))
}

fn de_base64<'de, D: Deserializer<'de>>(d: D) -> Result<Arc<Vec<u8>>, D::Error> {
    let s = String::deserialize(d)?;
    BASE64_STD
        .decode(s.as_bytes())
        .map(Arc::new)
        .map_err(serde::de::Error::custom)
}

impl DocumentLayout {
    pub fn new(title: impl Into<String>, page_width_pt: f32, page_height_pt: f32) -> Self {
        Self {
            title: title.into(),
            page_width_pt,
            page_height_pt,
            ..Self::default()
        }
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_keeps_anchors_and_image_bytes() {
        let mut layout = DocumentLayout::new("t", 100.0, 200.0);
        let mut page = PageLayout::new(1, PageKind::Body);
        page.elements.push(PageElement::Anchor(AnchorMark {
            id: AnchorId(1),
            y: 10.0,
            title: "Intro".into(),
            level: 0,
        }));
        layout.pages.push(page);
        layout.anchors.insert(AnchorId(1), 1);
        layout.images.insert(
            "img".into(),
            EmbeddedImage {
                bytes: Arc::new(vec![1, 2, 3, 250]),
                width_px: 2,
                height_px: 2,
            },
        );

        let json = layout.to_json();
        assert!(json.contains("AQID+g=="));
        let back = DocumentLayout::from_json(&json).unwrap();
        assert_eq!(back.anchors.get(&AnchorId(1)), Some(&1));
        assert_eq!(back.images["img"].bytes.as_slice(), &[1, 2, 3, 250]);
        assert_eq!(back.pages[0].elements, layout.pages[0].elements);
    }

    #[test]
    fn anchor_only_page_is_empty() {
        let mut page = PageLayout::new(3, PageKind::Body);
        assert!(!page.has_content());
        page.elements.push(PageElement::Anchor(AnchorMark {
            id: AnchorId(7),
            y: 0.0,
            title: String::new(),
            level: 0,
        }));
        assert!(!page.has_content());
    }
}
