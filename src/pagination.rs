//! Pagination – runs the layout engine twice so the table of contents can
//! list the physical page of every heading before the body is placed behind
//! it.
//!
//! Pass 1 lays out the body from page 1 to learn the headings and their
//! pages. The TOC height depends only on the entry texts, so its page count
//! is known before any number is filled in. Pass 2 lays the body out again
//! behind the cover and TOC; every page moves by the same offset because
//! breaks depend only on vertical space.

use crate::config::DocumentConfig;
use crate::events::ContentEvent;
use crate::fonts::truncate_chars;
use crate::images::ImageStore;
use crate::layout::{LayoutEngine, LayoutOutcome};
use crate::model::{PageKind, PageLayout, TocEntry};
use crate::style::{StyleName, StyleSet};

/// TOC entry texts are cut to this many characters.
pub const TOC_TEXT_LIMIT: usize = 50;
/// Bound on re-running pass 2 when the TOC's own length changes.
const MAX_TOC_ATTEMPTS: u32 = 3;
/// Shown on the TOC page when no heading qualifies.
pub const EMPTY_TOC_TEXT: &str = "No entries";

/// Cover, TOC and body pages in physical order, with the resolved TOC.
#[derive(Debug, Clone, Default)]
pub struct Paginated {
    pub cover: Vec<PageLayout>,
    pub toc: Vec<PageLayout>,
    pub body: Vec<PageLayout>,
    /// Entries with their final physical pages.
    pub entries: Vec<TocEntry>,
}

impl Paginated {
    pub fn page_count(&self) -> u32 {
        (self.cover.len() + self.toc.len() + self.body.len()) as u32
    }

    /// Physical number of the first body page.
    pub fn body_offset(&self) -> u32 {
        1 + self.cover.len() as u32 + self.toc.len() as u32
    }
}

/// Lay out cover, TOC and body for `events`.
pub fn paginate(
    events: &[ContentEvent],
    config: &DocumentConfig,
    styles: &StyleSet,
    images: &ImageStore,
    formulas: &ImageStore,
) -> Paginated {
    let geometry = config.geometry();
    let body_engine = LayoutEngine::new(geometry, styles, images, formulas)
        .with_orphan_headings(config.orphan_headings);

    let cover = if config.include_cover {
        LayoutEngine::new(geometry, styles, images, formulas)
            .with_kind(PageKind::Cover)
            .layout_cover(&config.cover)
            .pages
    } else {
        Vec::new()
    };
    let cover_pages = cover.len() as u32;

    if !config.include_toc {
        let body = body_engine.run(events, 1 + cover_pages);
        log::debug!("Single pass: {} body page(s)", body.page_count());
        return Paginated {
            cover,
            toc: Vec::new(),
            body: body.pages,
            entries: body.toc,
        };
    }

    let toc_engine =
        LayoutEngine::new(geometry, styles, images, formulas).with_kind(PageKind::Toc);

    // Pass 1: only the entries and the page count are kept.
    let LayoutOutcome {
        pages: pass1_pages,
        toc: pass1_entries,
        ..
    } = body_engine.run(events, 1);
    let pass1_count = pass1_pages.len();
    drop(pass1_pages);
    log::debug!(
        "Pass 1: {} page(s), {} TOC entr(ies)",
        pass1_count,
        pass1_entries.len()
    );

    let unresolved: Vec<TocEntry> = pass1_entries
        .iter()
        .map(|e| TocEntry {
            page: None,
            ..e.clone()
        })
        .collect();
    let toc_pages =
        layout_toc(&toc_engine, &config.toc_title, &unresolved, 1 + cover_pages).page_count();

    let (toc, body, entries) = settle_toc_length(toc_pages, |toc_pages| {
        let offset = 1 + cover_pages + toc_pages;
        let body = body_engine.run(events, offset);
        check_pass_agreement(&pass1_entries, pass1_count, &body, offset);

        let last_page = offset - 1 + body.page_count();
        let entries = drop_out_of_range(body.toc.clone(), last_page);
        let toc = layout_toc(&toc_engine, &config.toc_title, &entries, 1 + cover_pages);
        log::debug!(
            "Pass 2: body from page {offset}, {} page(s)",
            body.page_count()
        );
        let actual = toc.page_count();
        ((toc, body, entries), actual)
    });
    Paginated {
        cover,
        toc: toc.pages,
        body: body.pages,
        entries,
    }
}

/// Run `pass` with an expected TOC page count until the TOC it produces has
/// that many pages, at most [`MAX_TOC_ATTEMPTS`] times.
///
/// `pass` returns its result and the TOC page count it actually laid out.
fn settle_toc_length<T>(mut toc_pages: u32, mut pass: impl FnMut(u32) -> (T, u32)) -> T {
    let mut attempt = 1;
    loop {
        let (result, actual) = pass(toc_pages);
        if actual == toc_pages {
            return result;
        }
        if attempt >= MAX_TOC_ATTEMPTS {
            log::warn!(
                "TOC length still changing after {attempt} attempts ({toc_pages} -> {actual} pages)"
            );
            return result;
        }
        log::warn!("TOC took {actual} page(s), expected {toc_pages}; laying out the body again");
        toc_pages = actual;
        attempt += 1;
    }
}

/// Pass-2 pages must equal pass-1 pages shifted by `offset - 1`.
fn check_pass_agreement(
    pass1_entries: &[TocEntry],
    pass1_count: usize,
    pass2: &LayoutOutcome,
    offset: u32,
) {
    if pass2.pages.len() != pass1_count {
        log::warn!(
            "Pass 2 produced {} page(s), pass 1 produced {pass1_count}",
            pass2.pages.len()
        );
    }
    if pass2.toc.len() != pass1_entries.len() {
        log::warn!(
            "Pass 2 found {} TOC entries, pass 1 found {}",
            pass2.toc.len(),
            pass1_entries.len()
        );
    }
    for (first, second) in pass1_entries.iter().zip(&pass2.toc) {
        let expected = first.page.map(|p| p + offset - 1);
        if second.page != expected {
            log::warn!(
                "'{}' moved from page {:?} to {:?} between passes",
                second.text,
                expected,
                second.page
            );
        }
    }
}

fn drop_out_of_range(entries: Vec<TocEntry>, last_page: u32) -> Vec<TocEntry> {
    entries
        .into_iter()
        .filter(|e| match e.page {
            Some(p) if p >= 1 && p <= last_page => true,
            page => {
                log::warn!("Dropping TOC entry '{}' with page {page:?}", e.text);
                false
            }
        })
        .collect()
}

/// Lay out the TOC block starting at `first_page`.
pub fn layout_toc(
    engine: &LayoutEngine<'_>,
    title: &str,
    entries: &[TocEntry],
    first_page: u32,
) -> LayoutOutcome {
    let mut ctx = engine.begin(first_page);
    engine.place_text(&mut ctx, title, StyleName::TocTitle, None);
    if entries.is_empty() {
        engine.place_text(&mut ctx, EMPTY_TOC_TEXT, StyleName::TocEntry, None);
    }
    for entry in entries {
        let text = truncate_chars(&entry.text, TOC_TEXT_LIMIT);
        let label = entry.page.map(|p| p.to_string()).unwrap_or_default();
        let link = entry.page.map(|_| entry.anchor);
        engine.place_toc_line(&mut ctx, &text, entry.level, &label, link);
    }
    engine.finish(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageElement;

    fn long_document() -> Vec<ContentEvent> {
        let mut events = Vec::new();
        for chapter in 1..=4 {
            events.push(ContentEvent::heading(1, format!("Chapter {chapter}")));
            events.push(ContentEvent::heading(2, format!("Section {chapter}.1")));
            for i in 0..25 {
                events.push(ContentEvent::paragraph(format!(
                    "Paragraph {i} of chapter {chapter}. It has enough words to wrap onto a \
                     second line at the default width, which keeps the page count honest."
                )));
            }
        }
        events
    }

    fn texts(pages: &[PageLayout]) -> Vec<String> {
        pages
            .iter()
            .flat_map(|p| &p.elements)
            .filter_map(|e| match e {
                PageElement::Text(t) => Some(t.lines.iter().map(|l| l.text.clone()).collect::<Vec<_>>().join(" ")),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn second_pass_shifts_every_entry_by_the_offset() {
        let events = long_document();
        let config = DocumentConfig {
            include_cover: true,
            include_toc: true,
            ..DocumentConfig::default()
        };
        let styles = StyleSet::from_config(&config);
        let store = ImageStore::new();

        let pass1 = LayoutEngine::new(config.geometry(), &styles, &store, &store).run(&events, 1);
        let out = paginate(&events, &config, &styles, &store, &store);

        assert_eq!(out.cover.len(), 1);
        assert_eq!(out.toc.len(), 1);
        assert_eq!(out.body.len(), pass1.pages.len());
        assert_eq!(out.body_offset(), 3);
        assert_eq!(out.body[0].page_number, 3);
        assert_eq!(out.entries.len(), pass1.toc.len());
        assert_eq!(out.entries.len(), 8);
        for (a, b) in pass1.toc.iter().zip(&out.entries) {
            assert_eq!(b.page, a.page.map(|p| p + 2));
            assert_eq!(a.anchor, b.anchor);
        }
    }

    #[test]
    fn toc_lists_numbers_and_links() {
        let events = long_document();
        let config = DocumentConfig {
            include_toc: true,
            ..DocumentConfig::default()
        };
        let styles = StyleSet::from_config(&config);
        let store = ImageStore::new();
        let out = paginate(&events, &config, &styles, &store, &store);

        let toc_texts = texts(&out.toc);
        assert_eq!(toc_texts[0], "Contents");
        assert!(toc_texts.contains(&"Chapter 1".to_string()));
        assert!(toc_texts.contains(&out.entries[0].page.unwrap().to_string()));
        let linked = out.toc[0]
            .elements
            .iter()
            .filter(|e| matches!(e, PageElement::Text(t) if t.link.is_some()))
            .count();
        // Entry text and page number are both clickable.
        assert_eq!(linked, 2 * out.entries.len());
    }

    #[test]
    fn empty_toc_says_so() {
        let events = vec![ContentEvent::paragraph("No headings here.")];
        let config = DocumentConfig {
            include_toc: true,
            ..DocumentConfig::default()
        };
        let styles = StyleSet::from_config(&config);
        let store = ImageStore::new();
        let out = paginate(&events, &config, &styles, &store, &store);
        assert!(out.entries.is_empty());
        assert_eq!(out.toc.len(), 1);
        assert!(texts(&out.toc).contains(&EMPTY_TOC_TEXT.to_string()));
        assert_eq!(out.body[0].page_number, 2);
    }

    #[test]
    fn long_entries_are_truncated() {
        let long = "A heading that goes on and on well past the fifty character limit";
        let events = vec![ContentEvent::heading(1, long)];
        let config = DocumentConfig {
            include_toc: true,
            ..DocumentConfig::default()
        };
        let styles = StyleSet::from_config(&config);
        let store = ImageStore::new();
        let out = paginate(&events, &config, &styles, &store, &store);
        let toc_texts = texts(&out.toc);
        assert!(toc_texts.iter().any(|t| t.ends_with("...") && t.chars().count() == 53));
        // The entry itself keeps the full text.
        assert_eq!(out.entries[0].text, long);
    }

    #[test]
    fn out_of_range_entries_are_dropped() {
        let entry = |page| TocEntry {
            text: "x".into(),
            level: 0,
            page,
            anchor: crate::model::AnchorId(1),
        };
        let kept = drop_out_of_range(vec![entry(Some(0)), entry(Some(3)), entry(Some(9)), entry(None)], 5);
        assert_eq!(kept, vec![entry(Some(3))]);
    }

    #[test]
    fn growing_toc_reruns_the_body_pass() {
        let mut offsets = Vec::new();
        // The TOC turns out one page longer than measured, then settles.
        let result = settle_toc_length(1, |toc_pages| {
            offsets.push(1 + toc_pages);
            (toc_pages, 2)
        });
        assert_eq!(result, 2);
        assert_eq!(offsets, vec![2, 3]);
    }

    #[test]
    fn unsettled_toc_stops_after_bounded_attempts() {
        let mut calls = 0;
        let result = settle_toc_length(1, |toc_pages| {
            calls += 1;
            (toc_pages, toc_pages + 1)
        });
        assert_eq!(calls, MAX_TOC_ATTEMPTS);
        assert_eq!(result, MAX_TOC_ATTEMPTS);
    }

    #[test]
    fn stable_toc_needs_one_pass() {
        let mut calls = 0;
        let result = settle_toc_length(3, |toc_pages| {
            calls += 1;
            ("body", toc_pages)
        });
        assert_eq!((result, calls), ("body", 1));
    }

    #[test]
    fn without_toc_body_follows_cover() {
        let config = DocumentConfig {
            include_cover: true,
            ..DocumentConfig::default()
        };
        let styles = StyleSet::from_config(&config);
        let store = ImageStore::new();
        let out = paginate(&[ContentEvent::heading(1, "Only")], &config, &styles, &store, &store);
        assert!(out.toc.is_empty());
        assert_eq!(out.body[0].page_number, 2);
        assert_eq!(out.entries[0].page, Some(2));
    }
}
