//! Layout engine – walks the content event stream with a vertical cursor and
//! emits page-positioned elements, breaking pages as space runs out.
//!
//! All state of a run lives in [`LayoutContext`], which is passed into and
//! returned from [`LayoutEngine::step`]. The engine itself only holds
//! read-only inputs, so two runs over the same events are identical.

use crate::config::{CoverConfig, PageGeometry};
use crate::events::{ContentEvent, ImageSource, ListMarker};
use crate::fonts::{measure_text_width, wrap_text};
use crate::images::{ImageStore, LoadedImage};
use crate::model::{
    AnchorId, AnchorMark, ImageBlock, PageElement, PageKind, PageLayout, Stroke, TableBlock,
    TableRowLayout, TextBlock, TextLine, TocEntry,
};
use crate::style::{Color, StyleName, StyleSet, TextAlign, TextStyle};

/// Slack for float comparisons against the bottom margin.
const FIT_EPSILON: f32 = 0.01;
/// Headings need this many of their own line heights below them.
const ORPHAN_LINES: f32 = 3.0;
/// Gap between a list marker and the item text.
pub const MARKER_GAP: f32 = 6.0;
/// Space below a cover image.
const COVER_IMAGE_GAP: f32 = 12.0;
/// Indent per TOC level.
const TOC_INDENT: f32 = 10.0;
/// Width reserved on the right of each TOC line for the page number.
pub const TOC_NUMBER_COLUMN: f32 = 40.0;

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingRow {
    cells: Vec<String>,
    header: bool,
}

/// Mutable state of one layout run.
#[derive(Debug, Clone)]
pub struct LayoutContext {
    /// Top of the free space, in PDF coordinates (origin bottom-left).
    pub cursor_y: f32,
    /// Physical number of the page being filled.
    pub page_number: u32,
    pub current_style: StyleName,
    /// Finished pages.
    pub pages: Vec<PageLayout>,
    /// The page being filled.
    pub page: PageLayout,
    pub toc: Vec<TocEntry>,
    pub next_anchor: u32,
    pub(crate) table: Vec<PendingRow>,
    pub(crate) pending_breaks: u32,
    first_page: u32,
}

/// Result of a finished run.
#[derive(Debug, Clone, Default)]
pub struct LayoutOutcome {
    pub pages: Vec<PageLayout>,
    pub toc: Vec<TocEntry>,
    /// Physical number of the first page.
    pub first_page: u32,
}

impl LayoutOutcome {
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct LayoutEngine<'a> {
    geometry: PageGeometry,
    styles: &'a StyleSet,
    images: &'a ImageStore,
    formulas: &'a ImageStore,
    orphan_headings: bool,
    kind: PageKind,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(
        geometry: PageGeometry,
        styles: &'a StyleSet,
        images: &'a ImageStore,
        formulas: &'a ImageStore,
    ) -> Self {
        Self {
            geometry,
            styles,
            images,
            formulas,
            orphan_headings: true,
            kind: PageKind::Body,
        }
    }

    pub fn with_orphan_headings(mut self, enabled: bool) -> Self {
        self.orphan_headings = enabled;
        self
    }

    /// Kind stamped on every page this engine produces.
    pub fn with_kind(mut self, kind: PageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    pub fn styles(&self) -> &StyleSet {
        self.styles
    }

    /// Fresh context whose first page is `first_page`.
    pub fn begin(&self, first_page: u32) -> LayoutContext {
        LayoutContext {
            cursor_y: self.geometry.top(),
            page_number: first_page,
            current_style: StyleName::Body,
            pages: Vec::new(),
            page: PageLayout::new(first_page, self.kind),
            toc: Vec::new(),
            next_anchor: 1,
            table: Vec::new(),
            pending_breaks: 0,
            first_page,
        }
    }

    /// Lay out every event, starting at physical page `first_page`.
    pub fn run<'e>(
        &self,
        events: impl IntoIterator<Item = &'e ContentEvent>,
        first_page: u32,
    ) -> LayoutOutcome {
        let ctx = events
            .into_iter()
            .fold(self.begin(first_page), |ctx, event| self.step(ctx, event));
        self.finish(ctx)
    }

    /// Advance the run by one event.
    pub fn step(&self, mut ctx: LayoutContext, event: &ContentEvent) -> LayoutContext {
        // Any other event closes an open table.
        if !matches!(
            event,
            ContentEvent::TableRow { .. } | ContentEvent::TableEnd
        ) {
            self.flush_table(&mut ctx);
        }
        match event {
            ContentEvent::Heading { level, text, toc } => {
                self.heading(&mut ctx, *level, text, *toc);
            }
            ContentEvent::Paragraph { text } => {
                self.place_text(&mut ctx, text, StyleName::Body, None);
            }
            ContentEvent::ListItem {
                text,
                marker,
                depth,
            } => self.list_item(&mut ctx, text, *marker, *depth),
            ContentEvent::TableRow { cells, header } => ctx.table.push(PendingRow {
                cells: cells.clone(),
                header: *header,
            }),
            ContentEvent::TableEnd => self.flush_table(&mut ctx),
            ContentEvent::Image { source } => {
                let key = source.key();
                match self.images.get(&key) {
                    Some(img) => self.place_image(&mut ctx, &key, img, true),
                    None => log::warn!("Image {key} is not available, skipping"),
                }
            }
            ContentEvent::FormulaPlaceholder { token, display } => {
                match self.formulas.get(token) {
                    Some(img) => self.place_image(&mut ctx, token, img, *display),
                    None => log::debug!("No rendering for {token}, skipping"),
                }
            }
            ContentEvent::SectionBreak => ctx.pending_breaks += 1,
        }
        ctx
    }

    /// Close the run. Trailing section breaks are dropped.
    pub fn finish(&self, mut ctx: LayoutContext) -> LayoutOutcome {
        self.flush_table(&mut ctx);
        if ctx.pending_breaks > 0 {
            log::debug!("Dropping {} trailing section break(s)", ctx.pending_breaks);
        }
        if ctx.page.has_content() {
            ctx.pages.push(ctx.page);
        }
        log::debug!(
            "Laid out {} {:?} page(s) from page {}",
            ctx.pages.len(),
            self.kind,
            ctx.first_page
        );
        LayoutOutcome {
            pages: ctx.pages,
            toc: ctx.toc,
            first_page: ctx.first_page,
        }
    }

    // -----------------------------------------------------------------------
    // Page breaking
    // -----------------------------------------------------------------------

    fn remaining(&self, ctx: &LayoutContext) -> f32 {
        ctx.cursor_y - self.geometry.margin_bottom
    }

    /// A block fits when its bottom does not cross the bottom margin.
    fn fits(&self, ctx: &LayoutContext, height: f32) -> bool {
        ctx.cursor_y - height >= self.geometry.margin_bottom - FIT_EPSILON
    }

    fn fits_on_empty_page(&self, height: f32) -> bool {
        height <= self.geometry.content_height() + FIT_EPSILON
    }

    /// Top-left y of the next element.
    fn top_y(&self, ctx: &LayoutContext) -> f32 {
        self.geometry.height - ctx.cursor_y
    }

    fn new_page(&self, ctx: &mut LayoutContext) {
        let next = PageLayout::new(ctx.page_number + 1, self.kind);
        let done = std::mem::replace(&mut ctx.page, next);
        ctx.pages.push(done);
        ctx.page_number += 1;
        ctx.cursor_y = self.geometry.top();
    }

    /// Honour pending section breaks. On an empty page the first break is
    /// already satisfied, so two breaks in a row leave one blank page.
    fn apply_pending_breaks(&self, ctx: &mut LayoutContext) {
        let requested = std::mem::take(&mut ctx.pending_breaks);
        if requested == 0 {
            return;
        }
        let breaks = if ctx.page.has_content() {
            requested
        } else {
            requested - 1
        };
        for _ in 0..breaks {
            self.new_page(ctx);
        }
    }

    /// Break first if a block of `height` does not fit here but would fit on
    /// a fresh page.
    fn make_room(&self, ctx: &mut LayoutContext, height: f32) {
        self.apply_pending_breaks(ctx);
        if !self.fits(ctx, height) && ctx.page.has_content() && self.fits_on_empty_page(height) {
            self.new_page(ctx);
        }
    }

    // -----------------------------------------------------------------------
    // Text
    // -----------------------------------------------------------------------

    fn heading(&self, ctx: &mut LayoutContext, level: u8, text: &str, toc: bool) {
        if text.trim().is_empty() {
            return;
        }
        let name = StyleSet::heading_name(level);
        let style = self.styles.get(name);
        let width = self.geometry.content_width() - style.left_indent;
        let lines = wrap_text(text, style.size, style.font, style.bold, width);
        let height = lines.len() as f32 * style.line_height;

        self.apply_pending_breaks(ctx);
        if self.orphan_headings
            && ctx.page.has_content()
            && self.remaining(ctx) < ORPHAN_LINES * style.line_height
        {
            self.new_page(ctx);
        }
        self.make_room(ctx, height);

        let anchor = AnchorId(ctx.next_anchor);
        ctx.next_anchor += 1;
        let y = self.top_y(ctx);
        ctx.page.elements.push(PageElement::Anchor(AnchorMark {
            id: anchor,
            y,
            title: text.to_string(),
            level: level.saturating_sub(1),
        }));
        if toc {
            ctx.toc.push(TocEntry {
                text: text.to_string(),
                level: level.saturating_sub(1),
                page: Some(ctx.page_number),
                anchor,
            });
        }

        ctx.current_style = name;
        let x = self.geometry.margin_left + style.left_indent;
        self.place_lines(ctx, lines, style, x, width, None, None);
    }

    fn list_item(&self, ctx: &mut LayoutContext, text: &str, marker: ListMarker, depth: u8) {
        let style = self.styles.get(StyleName::ListItem);
        let indent = style.left_indent * depth.max(1) as f32;
        let width = (self.geometry.content_width() - indent).max(style.size);
        let lines = wrap_text(text, style.size, style.font, style.bold, width);
        let marker = match marker {
            ListMarker::Ordinal(n) => format!("{n}."),
            ListMarker::Bullet => "\u{2022}".to_string(),
        };
        ctx.current_style = StyleName::ListItem;
        let x = self.geometry.margin_left + indent;
        self.place_lines(ctx, lines, style, x, width, Some(marker), None);
    }

    /// Wrap `text` in the named style across the content width and place it.
    pub fn place_text(
        &self,
        ctx: &mut LayoutContext,
        text: &str,
        name: StyleName,
        link: Option<AnchorId>,
    ) {
        if text.trim().is_empty() {
            return;
        }
        let style = self.styles.get(name);
        let width = self.geometry.content_width() - style.left_indent;
        let lines = wrap_text(text, style.size, style.font, style.bold, width);
        ctx.current_style = name;
        let x = self.geometry.margin_left + style.left_indent;
        self.place_lines(ctx, lines, style, x, width, None, link);
    }

    /// Place wrapped lines, breaking before the block when it fits on a fresh
    /// page and splitting it line-wise when it is taller than a page.
    #[allow(clippy::too_many_arguments)]
    fn place_lines(
        &self,
        ctx: &mut LayoutContext,
        mut lines: Vec<String>,
        style: &TextStyle,
        x: f32,
        width: f32,
        mut marker: Option<String>,
        link: Option<AnchorId>,
    ) {
        let lh = style.line_height;
        self.make_room(ctx, lines.len() as f32 * lh);

        loop {
            let mut capacity = ((self.remaining(ctx) + FIT_EPSILON) / lh).floor().max(0.0) as usize;
            if capacity == 0 {
                if ctx.page.has_content() {
                    self.new_page(ctx);
                    continue;
                }
                // A single line taller than the page still has to go somewhere.
                capacity = 1;
            }
            let take = capacity.min(lines.len());
            let chunk: Vec<String> = lines.drain(..take).collect();
            let last = lines.is_empty();
            let block = self.text_block(ctx, chunk, style, x, width, marker.take(), link, last);
            ctx.cursor_y -= block.height;
            ctx.page.elements.push(PageElement::Text(block));
            if last {
                break;
            }
            self.new_page(ctx);
        }
        ctx.cursor_y -= style.space_after;
    }

    #[allow(clippy::too_many_arguments)]
    fn text_block(
        &self,
        ctx: &LayoutContext,
        lines: Vec<String>,
        style: &TextStyle,
        x: f32,
        width: f32,
        marker: Option<String>,
        link: Option<AnchorId>,
        ends_paragraph: bool,
    ) -> TextBlock {
        let count = lines.len();
        let lines: Vec<TextLine> = lines
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let line_width = measure_text_width(&text, style.size, style.font, style.bold);
                let is_last = ends_paragraph && i + 1 == count;
                let (x_offset, justify_width) = match style.alignment {
                    TextAlign::Left => (0.0, None),
                    TextAlign::Center => (((width - line_width) / 2.0).max(0.0), None),
                    TextAlign::Justified => {
                        let spreadable = !is_last && text.split_whitespace().nth(1).is_some();
                        (0.0, spreadable.then_some(width))
                    }
                };
                TextLine {
                    text,
                    x_offset,
                    y_offset: i as f32 * style.line_height,
                    justify_width,
                }
            })
            .collect();
        TextBlock {
            x,
            y: self.top_y(ctx),
            width,
            height: count as f32 * style.line_height,
            font: style.font,
            bold: style.bold,
            italic: style.italic,
            font_size: style.size,
            color: style.color.to_array(),
            line_height: style.line_height,
            lines,
            marker,
            link,
        }
    }

    // -----------------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------------

    /// Size in points: natural size scaled down to the content width and the
    /// usable height (a quarter page on covers). Never upscaled.
    pub fn scaled_image_size(&self, img: &LoadedImage) -> (f32, f32) {
        let (w, h) = img.natural_size_pt();
        let max_h = if self.kind == PageKind::Cover {
            (self.geometry.height / 4.0).min(self.geometry.content_height())
        } else {
            self.geometry.content_height()
        };
        let scale = 1.0f32
            .min(self.geometry.content_width() / w)
            .min(max_h / h);
        (w * scale, h * scale)
    }

    fn place_image(&self, ctx: &mut LayoutContext, key: &str, img: &LoadedImage, centered: bool) {
        let (width, height) = self.scaled_image_size(img);
        self.make_room(ctx, height);
        let x = if centered {
            self.geometry.margin_left + (self.geometry.content_width() - width) / 2.0
        } else {
            self.geometry.margin_left
        };
        let y = self.top_y(ctx);
        ctx.page.elements.push(PageElement::Image(ImageBlock {
            x,
            y,
            width,
            height,
            image: key.to_string(),
        }));
        ctx.cursor_y -= height + self.styles.get(StyleName::Body).space_after;
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    fn flush_table(&self, ctx: &mut LayoutContext) {
        if ctx.table.is_empty() {
            return;
        }
        let mut rows = std::mem::take(&mut ctx.table);
        let columns = rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
        if columns == 0 {
            return;
        }
        for (i, row) in rows.iter_mut().enumerate() {
            if row.cells.len() < columns {
                log::warn!(
                    "Table row {} has {} of {columns} cells, padding",
                    i + 1,
                    row.cells.len()
                );
                row.cells.resize(columns, String::new());
            }
        }

        let body = self.styles.get(StyleName::Body);
        let table = &self.styles.table;
        let (font, size, pad) = (body.font, body.size, table.cell_padding);
        let line_height = size * 1.2;
        let widths = self.column_widths(&rows, columns);

        let mut body_index = 0usize;
        let laid: Vec<TableRowLayout> = rows
            .iter()
            .map(|row| {
                let cells: Vec<Vec<String>> = row
                    .cells
                    .iter()
                    .zip(&widths)
                    .map(|(cell, w)| wrap_text(cell, size, font, row.header, (w - 2.0 * pad).max(1.0)))
                    .collect();
                let line_count = cells.iter().map(Vec::len).max().unwrap_or(1).max(1);
                let fill = if row.header {
                    table.header_fill
                } else {
                    let banded = body_index % 2 == 1;
                    body_index += 1;
                    if banded {
                        table.band_fill
                    } else {
                        None
                    }
                };
                TableRowLayout {
                    y_offset: 0.0,
                    height: line_count as f32 * line_height + 2.0 * pad,
                    header: row.header,
                    fill: fill.map(|c| c.to_array()),
                    cells,
                }
            })
            .collect();

        let header_count = laid.iter().take_while(|r| r.header).count();
        let total: f32 = laid.iter().map(|r| r.height).sum();
        self.make_room(ctx, total);

        let mut slice: Vec<TableRowLayout> = Vec::new();
        let mut slice_height = 0.0f32;
        // Rows in the slice that are not repeated headers.
        let mut fresh = 0usize;
        for (i, row) in laid.iter().enumerate() {
            let can_break = fresh > 0 || (slice.is_empty() && ctx.page.has_content());
            if can_break && !self.fits(ctx, slice_height + row.height) {
                if !slice.is_empty() {
                    self.emit_table(ctx, std::mem::take(&mut slice), &widths, line_height);
                }
                self.new_page(ctx);
                slice_height = 0.0;
                fresh = 0;
                if i >= header_count {
                    for header in &laid[..header_count] {
                        slice_height += header.height;
                        slice.push(header.clone());
                    }
                }
            }
            slice_height += row.height;
            slice.push(row.clone());
            fresh += 1;
        }
        if !slice.is_empty() {
            self.emit_table(ctx, slice, &widths, line_height);
        }
        ctx.cursor_y -= body.space_after;
    }

    /// Proportional to the longest cell text per column, scaled down to the
    /// content width.
    fn column_widths(&self, rows: &[PendingRow], columns: usize) -> Vec<f32> {
        let body = self.styles.get(StyleName::Body);
        let pad = self.styles.table.cell_padding;
        let mut widths = vec![body.size + 2.0 * pad; columns];
        for row in rows {
            for (i, cell) in row.cells.iter().enumerate() {
                let longest = cell
                    .split('\n')
                    .map(|l| measure_text_width(l, body.size, body.font, row.header))
                    .fold(0.0f32, f32::max);
                widths[i] = widths[i].max(longest + 2.0 * pad);
            }
        }
        let total: f32 = widths.iter().sum();
        let available = self.geometry.content_width();
        if total > available {
            let scale = available / total;
            widths.iter_mut().for_each(|w| *w *= scale);
        }
        widths
    }

    fn emit_table(
        &self,
        ctx: &mut LayoutContext,
        mut rows: Vec<TableRowLayout>,
        widths: &[f32],
        line_height: f32,
    ) {
        let mut offset = 0.0;
        for row in &mut rows {
            row.y_offset = offset;
            offset += row.height;
        }
        let body = self.styles.get(StyleName::Body);
        let table = &self.styles.table;
        let stroke = |c: Color| Stroke {
            width: table.line_width,
            color: c.to_array(),
        };
        let block = TableBlock {
            x: self.geometry.margin_left,
            y: self.top_y(ctx),
            column_widths: widths.to_vec(),
            rows,
            font: body.font,
            font_size: body.size,
            line_height,
            cell_padding: table.cell_padding,
            text_color: body.color.to_array(),
            background: table.background.map(|c| c.to_array()),
            grid: table.grid.map(stroke),
            header_rule: table.header_rule.map(stroke),
        };
        ctx.cursor_y -= block.height();
        ctx.page.elements.push(PageElement::Table(block));
    }

    // -----------------------------------------------------------------------
    // Cover and table of contents
    // -----------------------------------------------------------------------

    /// Lay out the cover: optional image, then title, author and date.
    pub fn layout_cover(&self, cover: &CoverConfig) -> LayoutOutcome {
        let mut ctx = self.begin(1);
        if let Some(path) = &cover.image {
            let key = ImageSource::Path(path.clone()).key();
            match self.images.get(&key) {
                Some(img) => {
                    self.place_image(&mut ctx, &key, img, true);
                    ctx.cursor_y -= COVER_IMAGE_GAP;
                }
                None => log::warn!("Cover image {} is not available", path.display()),
            }
        }
        self.place_text(&mut ctx, &cover.title, StyleName::CoverTitle, None);
        self.place_text(&mut ctx, &cover.author, StyleName::CoverAuthor, None);
        self.place_text(&mut ctx, &cover.date, StyleName::CoverDate, None);
        self.finish(ctx)
    }

    /// One TOC line: indented entry text on the left, `page_label`
    /// right-aligned in a fixed column. The height depends only on `text`.
    pub fn place_toc_line(
        &self,
        ctx: &mut LayoutContext,
        text: &str,
        level: u8,
        page_label: &str,
        link: Option<AnchorId>,
    ) {
        let style = self.styles.get(StyleName::TocEntry);
        let indent = level as f32 * TOC_INDENT;
        let width = (self.geometry.content_width() - indent - TOC_NUMBER_COLUMN).max(style.size);
        let lines = wrap_text(text, style.size, style.font, style.bold, width);
        let height = lines.len() as f32 * style.line_height;
        self.make_room(ctx, height);
        ctx.current_style = StyleName::TocEntry;

        let x = self.geometry.margin_left + indent;
        let entry = self.text_block(ctx, lines, style, x, width, None, link, true);
        let label_width = measure_text_width(page_label, style.size, style.font, style.bold);
        let label = self.text_block(
            ctx,
            vec![page_label.to_string()],
            style,
            self.geometry.margin_left + self.geometry.content_width() - label_width,
            label_width,
            None,
            link,
            true,
        );
        ctx.cursor_y -= entry.height + style.space_after;
        ctx.page.elements.push(PageElement::Text(entry));
        if !page_label.is_empty() {
            ctx.page.elements.push(PageElement::Text(label));
        }
    }
}
