//! Pipeline – ties together normalizing, formula rendering, image loading,
//! layout, pagination, assembly and rendering into a single function call.

use std::fs;
use std::path::{Path, PathBuf};

use crate::assemble::{assemble, write_output};
use crate::config::DocumentConfig;
use crate::decorate::PageDecorator;
use crate::error::Result;
use crate::events::{events_from_html, events_from_plain_text, ContentEvent, ImageSource, NormalizeOptions};
use crate::formula::{render_formulas, FormulaExtractor, FormulaRenderer};
use crate::images::{load_event_images, load_path, ImageStore};
use crate::model::DocumentLayout;
use crate::pagination::paginate;
use crate::render::render_pdf;
use crate::style::StyleSet;

/// How a source block's text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// The HTML subset produced by a markdown translator.
    Html,
    PlainText,
}

/// One input document. Several blocks are merged in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBlock {
    pub kind: SourceKind,
    pub text: String,
    /// Relative image paths resolve against this directory.
    pub base_dir: Option<PathBuf>,
}

impl SourceBlock {
    pub fn html(text: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Html,
            text: text.into(),
            base_dir: None,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::PlainText,
            text: text.into(),
            base_dir: None,
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Read a file; `.html`/`.htm` is markup, anything else plain text.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let is_html = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
            .unwrap_or(false);
        let block = if is_html {
            Self::html(text)
        } else {
            Self::plain(text)
        };
        Ok(match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => block.with_base_dir(dir),
            None => block,
        })
    }
}

/// Normalized content plus the pre-rendered formula bitmaps.
#[derive(Debug, Clone, Default)]
pub struct PreparedContent {
    pub events: Vec<ContentEvent>,
    pub formulas: ImageStore,
}

/// Normalize every block into one event stream, extracting and rendering
/// formulas first when the configuration asks for it.
pub fn prepare_content(
    blocks: &[SourceBlock],
    config: &DocumentConfig,
    renderer: Option<&dyn FormulaRenderer>,
) -> PreparedContent {
    let mut extractor = FormulaExtractor::new();
    let mut events = Vec::new();
    for block in blocks {
        let text = if config.process_formulas {
            extractor.extract(&block.text)
        } else {
            block.text.clone()
        };
        let options = NormalizeOptions {
            toc_depth: config.toc_depth,
            base_dir: block.base_dir.clone(),
        };
        match block.kind {
            SourceKind::Html => events.extend(events_from_html(&text, &options)),
            SourceKind::PlainText => events.extend(events_from_plain_text(&text)),
        }
    }

    let spans = extractor.into_spans();
    let formulas = match renderer {
        Some(renderer) if !spans.is_empty() => render_formulas(&spans, renderer),
        None if !spans.is_empty() => {
            log::warn!(
                "{} formula(s) found but no renderer is configured; they are skipped",
                spans.len()
            );
            ImageStore::new()
        }
        _ => ImageStore::new(),
    };
    log::debug!("Normalized {} block(s) into {} event(s)", blocks.len(), events.len());
    PreparedContent { events, formulas }
}

/// Load the images referenced by `events` and the cover image.
pub fn load_images(events: &[ContentEvent], config: &DocumentConfig) -> ImageStore {
    let mut images = ImageStore::new();
    load_event_images(events, &mut images);
    if config.include_cover {
        if let Some(path) = &config.cover.image {
            match load_path(path) {
                Ok(img) => {
                    images.insert(ImageSource::Path(path.clone()).key(), img);
                }
                Err(e) => log::warn!("Cover image skipped: {e}"),
            }
        }
    }
    images
}

/// Lay out an event stream into the final document model.
pub fn layout_events(
    events: &[ContentEvent],
    config: &DocumentConfig,
    images: &ImageStore,
    formulas: &ImageStore,
) -> Result<DocumentLayout> {
    let styles = StyleSet::from_config(config);
    let paginated = paginate(events, config, &styles, images, formulas);
    let geometry = config.geometry();
    assemble(
        paginated,
        &config.title,
        (geometry.width, geometry.height),
        images,
        formulas,
    )
}

/// Generate only the layout (no PDF rendering) – useful for testing.
pub fn compute_layout(
    blocks: &[SourceBlock],
    config: &DocumentConfig,
    renderer: Option<&dyn FormulaRenderer>,
) -> Result<DocumentLayout> {
    let prepared = prepare_content(blocks, config, renderer);
    let images = load_images(&prepared.events, config);
    layout_events(&prepared.events, config, &images, &prepared.formulas)
}

/// Render a finished layout with this configuration's page decoration.
pub fn render_layout(layout: &DocumentLayout, config: &DocumentConfig) -> Result<Vec<u8>> {
    let styles = StyleSet::from_config(config);
    let decorator = PageDecorator::new(config, styles.page);
    render_pdf(layout, &decorator)
}

/// Full pipeline: source blocks → PDF bytes.
///
/// Returns `(pdf_bytes, layout)`.
pub fn generate_pdf(
    blocks: &[SourceBlock],
    config: &DocumentConfig,
    renderer: Option<&dyn FormulaRenderer>,
) -> Result<(Vec<u8>, DocumentLayout)> {
    let layout = compute_layout(blocks, config, renderer)?;
    let bytes = render_layout(&layout, config)?;
    Ok((bytes, layout))
}

/// Convenience: generate a PDF from one HTML string with default settings.
pub fn generate_pdf_from_html(html: &str) -> Result<Vec<u8>> {
    let (bytes, _) = generate_pdf(&[SourceBlock::html(html)], &DocumentConfig::default(), None)?;
    Ok(bytes)
}

/// Build and write to `output`. The file only appears once the whole build
/// succeeded.
pub fn build_to_file(
    blocks: &[SourceBlock],
    config: &DocumentConfig,
    renderer: Option<&dyn FormulaRenderer>,
    output: &Path,
) -> Result<DocumentLayout> {
    let (bytes, layout) = generate_pdf(blocks, config, renderer)?;
    write_output(output, &bytes)?;
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;

    #[test]
    fn pipeline_basic() {
        let blocks = [SourceBlock::html("<h1>Hello</h1><p>World</p>")];
        let (bytes, layout) = generate_pdf(&blocks, &DocumentConfig::default(), None).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(layout.pages.len(), 1);
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn blocks_are_merged_in_order() {
        let blocks = [
            SourceBlock::html("<h1>First</h1>"),
            SourceBlock::plain("Second block\n\nThird paragraph"),
        ];
        let prepared = prepare_content(&blocks, &DocumentConfig::default(), None);
        assert_eq!(prepared.events.len(), 3);
        assert_eq!(prepared.events[2], ContentEvent::paragraph("Third paragraph"));
    }

    #[test]
    fn formulas_without_renderer_are_skipped() {
        let config = DocumentConfig {
            process_formulas: true,
            ..DocumentConfig::default()
        };
        let prepared =
            prepare_content(&[SourceBlock::plain("Energy $E=mc^2$ holds")], &config, None);
        assert!(prepared.formulas.is_empty());
        assert!(prepared
            .events
            .iter()
            .any(|e| matches!(e, ContentEvent::FormulaPlaceholder { .. })));
        let layout = compute_layout(&[SourceBlock::plain("Energy $E=mc^2$ holds")], &config, None)
            .unwrap();
        assert_eq!(layout.pages.len(), 1);
        assert!(layout.images.is_empty());
    }

    #[test]
    fn empty_input_has_no_pages() {
        let err = compute_layout(&[SourceBlock::plain("   \n\n")], &DocumentConfig::default(), None)
            .unwrap_err();
        assert!(matches!(err, BuildError::NoPages));
    }
}
