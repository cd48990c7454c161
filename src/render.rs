//! PDF backend – draws a [`DocumentLayout`] with printpdf's op stream.
//!
//! Every page is decorated exactly once: the decorator's underlay is emitted
//! before the page content and its overlay after it.

use std::collections::{BTreeMap, HashMap};

use printpdf::{
    Actions, BuiltinFont, Color, Destination, Line, LinePoint, LinkAnnotation, Mm, Op, PaintMode,
    PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Polygon, PolygonRing, Pt, RawImage,
    Rect, Rgb, TextItem, WindingOrder, XObjectId, XObjectTransform,
};

use crate::decorate::{DecorationOp, PageDecorator, BACKGROUND_IMAGE_KEY};
use crate::error::{BuildError, Result};
use crate::fonts::{measure_text_width, FontFamily};
use crate::layout::MARKER_GAP;
use crate::model::{
    AnchorId, DocumentLayout, ImageBlock, PageElement, Stroke, TableBlock, TextBlock,
};

const PT_TO_MM: f32 = 0.352778;

/// Registered XObject plus the source pixel size used for scaling.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Per-document state shared by every page.
struct RenderCtx<'a> {
    page_height: f32,
    images: HashMap<&'a str, ImageResource>,
    anchors: &'a BTreeMap<AnchorId, u32>,
}

/// Render a DocumentLayout into PDF bytes.
///
/// Images whose bytes cannot be embedded are skipped with a warning.
pub fn render_pdf(layout: &DocumentLayout, decorator: &PageDecorator) -> Result<Vec<u8>> {
    if layout.pages.is_empty() {
        return Err(BuildError::Render("layout has no pages".to_string()));
    }
    let page_w = Mm(layout.page_width_pt * PT_TO_MM);
    let page_h = Mm(layout.page_height_pt * PT_TO_MM);

    let mut doc = PdfDocument::new(&layout.title);

    // Background first, then every image the layout references.
    let mut images: HashMap<&str, ImageResource> = HashMap::new();
    let mut img_warnings: Vec<PdfWarnMsg> = Vec::new();
    let background = decorator
        .background_image()
        .map(|img| (BACKGROUND_IMAGE_KEY, img.bytes.as_slice(), img.width_px, img.height_px));
    let embedded = layout
        .images
        .iter()
        .map(|(key, img)| (key.as_str(), img.bytes.as_slice(), img.width_px, img.height_px));
    for (key, bytes, px_width, px_height) in background.into_iter().chain(embedded) {
        match RawImage::decode_from_bytes(bytes, &mut img_warnings) {
            Ok(raw) => {
                let xobj_id = doc.add_image(&raw);
                images.insert(
                    key,
                    ImageResource {
                        xobj_id,
                        px_width,
                        px_height,
                    },
                );
            }
            Err(e) => log::warn!("Skipping image {key}: PDF encode error: {e}"),
        }
    }

    let ctx = RenderCtx {
        page_height: layout.page_height_pt,
        images,
        anchors: &layout.anchors,
    };

    let mut pages = Vec::with_capacity(layout.pages.len());
    let mut bookmarks = Vec::new();
    for page in &layout.pages {
        let decoration = decorator.decorate(page.page_number);
        let mut ops = Vec::new();
        for op in &decoration.underlay {
            render_decoration(&mut ops, op, &ctx);
        }
        for element in &page.elements {
            match element {
                PageElement::Text(block) => render_text_block(&mut ops, block, &ctx),
                PageElement::Image(block) => render_image(&mut ops, block, &ctx),
                PageElement::Table(block) => render_table(&mut ops, block, &ctx),
                PageElement::Anchor(mark) => bookmarks.push((mark.title.clone(), page.page_number)),
            }
        }
        for op in &decoration.overlay {
            render_decoration(&mut ops, op, &ctx);
        }
        pages.push(PdfPage::new(page_w, page_h, ops));
    }

    doc.with_pages(pages);
    for (title, page) in ordered_bookmarks(&bookmarks) {
        doc.add_bookmark(&title, page as usize);
    }

    let bytes = doc.save(&PdfSaveOptions::default(), &mut Vec::new());
    log::debug!(
        "Rendered {} page(s), {} bookmark(s), {} byte(s)",
        layout.pages.len(),
        bookmarks.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Number bookmark titles in document order.
///
/// The outline is sorted by page and then by title, so a zero-padded ordinal
/// keeps headings on one page in the order they were written.
fn ordered_bookmarks(marks: &[(String, u32)]) -> Vec<(String, u32)> {
    let width = marks.len().to_string().len();
    marks
        .iter()
        .enumerate()
        .map(|(i, (title, page))| (format!("{:0width$} {title}", i + 1), *page))
        .collect()
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

fn pdf_color(c: [f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

fn builtin_font(family: FontFamily, bold: bool, italic: bool) -> BuiltinFont {
    match (family, bold, italic) {
        (FontFamily::Helvetica, false, false) => BuiltinFont::Helvetica,
        (FontFamily::Helvetica, true, false) => BuiltinFont::HelveticaBold,
        (FontFamily::Helvetica, false, true) => BuiltinFont::HelveticaOblique,
        (FontFamily::Helvetica, true, true) => BuiltinFont::HelveticaBoldOblique,
        (FontFamily::Times, false, false) => BuiltinFont::TimesRoman,
        (FontFamily::Times, true, false) => BuiltinFont::TimesBold,
        (FontFamily::Times, false, true) => BuiltinFont::TimesItalic,
        (FontFamily::Times, true, true) => BuiltinFont::TimesBoldItalic,
        (FontFamily::Courier, false, false) => BuiltinFont::Courier,
        (FontFamily::Courier, true, false) => BuiltinFont::CourierBold,
        (FontFamily::Courier, false, true) => BuiltinFont::CourierOblique,
        (FontFamily::Courier, true, true) => BuiltinFont::CourierBoldOblique,
    }
}

/// Fill a rectangle given in top-left page coordinates.
fn fill_rect(ops: &mut Vec<Op>, x: f32, y: f32, width: f32, height: f32, color: [f32; 4], page_height: f32) {
    let (y1, y2) = (page_height - y - height, page_height - y);
    ops.push(Op::SetFillColor { col: pdf_color(color) });
    ops.push(Op::DrawPolygon {
        polygon: Polygon {
            rings: vec![PolygonRing {
                points: vec![
                    point(x, y1),
                    point(x + width, y1),
                    point(x + width, y2),
                    point(x, y2),
                ],
            }],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        },
    });
}

fn stroke_line(ops: &mut Vec<Op>, points: Vec<LinePoint>, closed: bool, stroke: &Stroke) {
    ops.push(Op::SetOutlineColor {
        col: pdf_color(stroke.color),
    });
    ops.push(Op::SetOutlineThickness {
        pt: Pt(stroke.width),
    });
    ops.push(Op::DrawLine {
        line: Line {
            points,
            is_closed: closed,
        },
    });
}

fn stroke_rect(ops: &mut Vec<Op>, x: f32, y: f32, width: f32, height: f32, stroke: &Stroke, page_height: f32) {
    let (y1, y2) = (page_height - y - height, page_height - y);
    let points = vec![
        point(x, y2),
        point(x + width, y2),
        point(x + width, y1),
        point(x, y1),
    ];
    stroke_line(ops, points, true, stroke);
}

/// Write one run of text with its baseline at `baseline_y` (PDF coordinates).
fn write_text(
    ops: &mut Vec<Op>,
    text: &str,
    x: f32,
    baseline_y: f32,
    font: BuiltinFont,
    size: f32,
    color: [f32; 4],
) {
    if text.is_empty() {
        return;
    }
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point {
            x: Pt(x),
            y: Pt(baseline_y),
        },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(size),
        font,
    });
    ops.push(Op::SetFillColor { col: pdf_color(color) });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(to_winlatin(text))],
        font,
    });
    ops.push(Op::EndTextSection);
}

/// Re-encode as Windows-1252. Builtin fonts use WinAnsiEncoding and printpdf
/// copies the string's bytes into the content stream as they are.
fn to_winlatin(s: &str) -> String {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95, // list bullet
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2122}' => 0x99,
            '\u{00A0}' => 0x20,
            c if (c as u32) < 256 => c as u8,
            _ => b'?',
        })
        .collect();
    // SAFETY: intentionally non-UTF-8 for 0x80-0xFF; printpdf passes these
    // bytes straight to the PDF stream, decoded by WinAnsiEncoding.
    #[allow(unsafe_code)]
    unsafe {
        String::from_utf8_unchecked(bytes)
    }
}

/// Clickable area jumping to the page that holds `anchor`.
fn link_to_anchor(
    ops: &mut Vec<Op>,
    anchor: AnchorId,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    ctx: &RenderCtx<'_>,
) {
    let Some(&page) = ctx.anchors.get(&anchor) else {
        log::warn!("Link to unknown anchor {}", anchor.0);
        return;
    };
    let rect = Rect {
        x: Pt(x),
        y: Pt(ctx.page_height - y - height),
        width: Pt(width),
        height: Pt(height),
    };
    let destination = Destination::Xyz {
        page: page as usize,
        left: None,
        top: None,
        zoom: None,
    };
    ops.push(Op::LinkAnnotation {
        link: LinkAnnotation::new(rect, Actions::Goto(destination), None, None, None),
    });
}

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

fn render_text_block(ops: &mut Vec<Op>, block: &TextBlock, ctx: &RenderCtx<'_>) {
    let font = builtin_font(block.font, block.bold, block.italic);
    let ascent = block.font.ascender() * block.font_size;

    for line in &block.lines {
        let baseline = ctx.page_height - (block.y + line.y_offset + ascent);
        let x = block.x + line.x_offset;
        match line.justify_width {
            Some(target) => {
                // Spread words so the line fills `target`.
                let words: Vec<&str> = line.text.split_whitespace().collect();
                let widths: Vec<f32> = words
                    .iter()
                    .map(|w| measure_text_width(w, block.font_size, block.font, block.bold))
                    .collect();
                let gaps = words.len().saturating_sub(1).max(1) as f32;
                let gap = ((target - widths.iter().sum::<f32>()) / gaps).max(0.0);
                let mut cursor = x;
                for (word, width) in words.iter().zip(&widths) {
                    write_text(ops, word, cursor, baseline, font, block.font_size, block.color);
                    cursor += width + gap;
                }
            }
            None => write_text(ops, &line.text, x, baseline, font, block.font_size, block.color),
        }
    }

    if let Some(marker) = &block.marker {
        let marker_width = measure_text_width(marker, block.font_size, block.font, block.bold);
        let baseline = ctx.page_height - (block.y + ascent);
        write_text(
            ops,
            marker,
            block.x - marker_width - MARKER_GAP,
            baseline,
            font,
            block.font_size,
            block.color,
        );
    }

    if let Some(anchor) = block.link {
        link_to_anchor(ops, anchor, block.x, block.y, block.width, block.height, ctx);
    }
}

fn render_image(ops: &mut Vec<Op>, block: &ImageBlock, ctx: &RenderCtx<'_>) {
    let Some(res) = ctx.images.get(block.image.as_str()) else {
        return;
    };
    draw_xobject(ops, res, block.x, block.y, block.width, block.height, ctx.page_height);
}

fn draw_xobject(
    ops: &mut Vec<Op>,
    res: &ImageResource,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    page_height: f32,
) {
    // At dpi=72 printpdf renders 1 px = 1 pt, so scale = desired_pt / px.
    let scale_x = if res.px_width > 0 {
        width / res.px_width as f32
    } else {
        1.0
    };
    let scale_y = if res.px_height > 0 {
        height / res.px_height as f32
    } else {
        1.0
    };
    ops.push(Op::UseXobject {
        id: res.xobj_id.clone(),
        transform: XObjectTransform {
            translate_x: Some(Pt(x)),
            translate_y: Some(Pt(page_height - y - height)),
            dpi: Some(72.0),
            scale_x: Some(scale_x),
            scale_y: Some(scale_y),
            rotate: None,
        },
    });
}

fn render_table(ops: &mut Vec<Op>, table: &TableBlock, ctx: &RenderCtx<'_>) {
    let ph = ctx.page_height;
    let width = table.width();
    if let Some(bg) = table.background {
        fill_rect(ops, table.x, table.y, width, table.height(), bg, ph);
    }

    let ascent = table.font.ascender() * table.font_size;
    for row in &table.rows {
        let row_y = table.y + row.y_offset;
        if let Some(fill) = row.fill {
            fill_rect(ops, table.x, row_y, width, row.height, fill, ph);
        }
        let font = builtin_font(table.font, row.header, false);
        let mut cell_x = table.x;
        for (lines, col_width) in row.cells.iter().zip(&table.column_widths) {
            for (i, text) in lines.iter().enumerate() {
                let baseline =
                    ph - (row_y + table.cell_padding + i as f32 * table.line_height + ascent);
                write_text(
                    ops,
                    text,
                    cell_x + table.cell_padding,
                    baseline,
                    font,
                    table.font_size,
                    table.text_color,
                );
            }
            if let Some(grid) = &table.grid {
                stroke_rect(ops, cell_x, row_y, *col_width, row.height, grid, ph);
            }
            cell_x += col_width;
        }
    }

    if let Some(rule) = &table.header_rule {
        let header_bottom: Option<f32> = table
            .rows
            .iter()
            .take_while(|r| r.header)
            .last()
            .map(|r| table.y + r.y_offset + r.height);
        if let Some(y) = header_bottom {
            let pdf_y = ph - y;
            stroke_line(
                ops,
                vec![point(table.x, pdf_y), point(table.x + width, pdf_y)],
                false,
                rule,
            );
        }
    }
}

fn render_decoration(ops: &mut Vec<Op>, op: &DecorationOp, ctx: &RenderCtx<'_>) {
    let ph = ctx.page_height;
    match op {
        DecorationOp::FillRect {
            x,
            y,
            width,
            height,
            color,
        } => fill_rect(ops, *x, *y, *width, *height, *color, ph),
        DecorationOp::StrokeRect {
            x,
            y,
            width,
            height,
            stroke,
        } => stroke_rect(ops, *x, *y, *width, *height, stroke, ph),
        DecorationOp::Image {
            key,
            x,
            y,
            width,
            height,
        } => {
            if let Some(res) = ctx.images.get(key) {
                draw_xobject(ops, res, *x, *y, *width, *height, ph);
            }
        }
        DecorationOp::Text {
            text,
            x,
            baseline,
            font,
            italic,
            size,
            color,
        } => write_text(
            ops,
            text,
            *x,
            ph - baseline,
            builtin_font(*font, false, *italic),
            *size,
            *color,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocumentConfig;
    use crate::model::{PageKind, PageLayout, TextLine};
    use crate::style::PageTemplate;

    #[test]
    fn render_empty_page() {
        let config = DocumentConfig::default();
        let g = config.geometry();
        let mut layout = DocumentLayout::new("empty", g.width, g.height);
        layout.pages.push(PageLayout::new(1, PageKind::Body));
        let decorator = PageDecorator::new(&config, PageTemplate::resolve("plain"));
        let bytes = render_pdf(&layout, &decorator).unwrap();
        assert!(bytes.len() > 100, "PDF should have content");
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn layout_without_pages_is_a_render_error() {
        let config = DocumentConfig::default();
        let g = config.geometry();
        let layout = DocumentLayout::new("empty", g.width, g.height);
        let decorator = PageDecorator::new(&config, PageTemplate::resolve("plain"));
        let err = render_pdf(&layout, &decorator).unwrap_err();
        assert!(matches!(err, BuildError::Render(_)));
    }

    #[test]
    fn bookmarks_keep_document_order_on_one_page() {
        let marks = vec![
            ("Zeta".to_string(), 1),
            ("Alpha".to_string(), 1),
            ("Mid".to_string(), 2),
        ];
        let mut ordered = ordered_bookmarks(&marks);
        assert_eq!(ordered[0], ("1 Zeta".to_string(), 1));
        // Sorting the way the outline does must not reorder them.
        ordered.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));
        let titles: Vec<_> = ordered.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(titles, ["1 Zeta", "2 Alpha", "3 Mid"]);

        let many: Vec<_> = (0..12).map(|i| (format!("H{i}"), 1)).collect();
        let ordered = ordered_bookmarks(&many);
        assert_eq!(ordered[1].0, "02 H1");
        assert_eq!(ordered[11].0, "12 H11");
    }

    #[test]
    fn toc_link_annotation_covers_the_entry() {
        let mut anchors = BTreeMap::new();
        anchors.insert(AnchorId(0), 3);
        let ctx = RenderCtx {
            page_height: 800.0,
            images: HashMap::new(),
            anchors: &anchors,
        };
        let mut ops = Vec::new();
        link_to_anchor(&mut ops, AnchorId(0), 50.0, 100.0, 200.0, 14.0, &ctx);
        link_to_anchor(&mut ops, AnchorId(9), 50.0, 100.0, 200.0, 14.0, &ctx);
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            Op::LinkAnnotation { link } => {
                assert_eq!(link.rect.x, Pt(50.0));
                assert_eq!(link.rect.y, Pt(686.0));
                assert_eq!(link.rect.width, Pt(200.0));
                assert_eq!(link.rect.height, Pt(14.0));
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn justified_line_writes_each_word() {
        let block = TextBlock {
            x: 10.0,
            y: 10.0,
            width: 200.0,
            height: 12.0,
            font: FontFamily::Helvetica,
            bold: false,
            italic: false,
            font_size: 10.0,
            color: [0.0, 0.0, 0.0, 1.0],
            line_height: 12.0,
            lines: vec![TextLine {
                text: "one two three".into(),
                x_offset: 0.0,
                y_offset: 0.0,
                justify_width: Some(200.0),
            }],
            marker: None,
            link: None,
        };
        let anchors = Default::default();
        let ctx = RenderCtx {
            page_height: 300.0,
            images: HashMap::new(),
            anchors: &anchors,
        };
        let mut ops = Vec::new();
        render_text_block(&mut ops, &block, &ctx);
        let writes = ops
            .iter()
            .filter(|op| matches!(op, Op::WriteTextBuiltinFont { .. }))
            .count();
        assert_eq!(writes, 3);
    }

    #[test]
    fn winlatin_maps_bullet() {
        assert_eq!(to_winlatin("\u{2022}").as_bytes(), &[0x95]);
        assert_eq!(to_winlatin("a\u{4e2d}").as_bytes(), b"a?");
    }
}
