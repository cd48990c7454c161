//! Document assembly – orders cover, TOC and body pages into one
//! [`DocumentLayout`], resolves anchors to physical pages and writes the
//! rendered output.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};
use crate::images::ImageStore;
use crate::model::{DocumentLayout, EmbeddedImage, PageElement};
use crate::pagination::Paginated;

/// Build the final layout. Fails with [`BuildError::NoPages`] when there is
/// nothing to render.
pub fn assemble(
    paginated: Paginated,
    title: &str,
    page_size: (f32, f32),
    images: &ImageStore,
    formulas: &ImageStore,
) -> Result<DocumentLayout> {
    let Paginated {
        cover,
        toc,
        body,
        entries,
    } = paginated;

    let mut layout = DocumentLayout::new(title, page_size.0, page_size.1);
    layout.pages = cover.into_iter().chain(toc).chain(body).collect();
    if layout.pages.is_empty() {
        return Err(BuildError::NoPages);
    }

    for (i, page) in layout.pages.iter_mut().enumerate() {
        let physical = i as u32 + 1;
        if page.page_number != physical {
            log::warn!(
                "Page numbered {} sits at position {physical}, renumbering",
                page.page_number
            );
            page.page_number = physical;
        }
    }

    let mut images_used = BTreeMap::new();
    for page in &layout.pages {
        for element in &page.elements {
            match element {
                PageElement::Anchor(mark) => {
                    layout.anchors.insert(mark.id, page.page_number);
                }
                PageElement::Image(block) => {
                    if images_used.contains_key(&block.image) {
                        continue;
                    }
                    match images.get(&block.image).or_else(|| formulas.get(&block.image)) {
                        Some(img) => {
                            images_used.insert(
                                block.image.clone(),
                                EmbeddedImage {
                                    bytes: img.bytes.clone(),
                                    width_px: img.width_px,
                                    height_px: img.height_px,
                                },
                            );
                        }
                        None => log::warn!("Image {} vanished before assembly", block.image),
                    }
                }
                PageElement::Text(_) | PageElement::Table(_) => {}
            }
        }
    }
    layout.images = images_used;

    for entry in &entries {
        if entry.page != layout.anchors.get(&entry.anchor).copied() {
            log::warn!(
                "TOC entry '{}' points at page {:?} but its anchor is on {:?}",
                entry.text,
                entry.page,
                layout.anchors.get(&entry.anchor)
            );
        }
    }
    layout.toc = entries;

    log::info!(
        "Assembled {} page(s), {} TOC entr(ies), {} image(s)",
        layout.pages.len(),
        layout.toc.len(),
        layout.images.len()
    );
    Ok(layout)
}

/// Sibling path the output is written to before being moved into place.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output.pdf".into());
    name.push(".partial");
    path.with_file_name(name)
}

/// Write `bytes` to `path` atomically: nothing appears at `path` unless the
/// whole file was written.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    let not_writable = |reason: String| BuildError::OutputNotWritable {
        path: path.to_path_buf(),
        reason,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.is_dir() {
            return Err(not_writable(format!("{} is not a directory", dir.display())));
        }
    }

    let partial = partial_path(path);
    let result = fs::write(&partial, bytes).and_then(|()| fs::rename(&partial, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(not_writable(e.to_string()));
    }
    log::info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tests::png_bytes;
    use crate::images::LoadedImage;
    use crate::model::{AnchorId, AnchorMark, ImageBlock, PageKind, PageLayout, TocEntry};

    fn page(number: u32, kind: PageKind, elements: Vec<PageElement>) -> PageLayout {
        PageLayout {
            page_number: number,
            kind,
            elements,
        }
    }

    #[test]
    fn no_pages_is_an_error() {
        let store = ImageStore::new();
        let err = assemble(Paginated::default(), "t", (100.0, 100.0), &store, &store).unwrap_err();
        assert!(matches!(err, BuildError::NoPages));
    }

    #[test]
    fn orders_pages_and_maps_anchors() {
        let anchor = PageElement::Anchor(AnchorMark {
            id: AnchorId(1),
            y: 50.0,
            title: "Intro".into(),
            level: 0,
        });
        let formula = PageElement::Image(ImageBlock {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 4.0,
            image: "%%FORMULA_0%%".into(),
        });
        let paginated = Paginated {
            cover: vec![page(1, PageKind::Cover, vec![])],
            toc: vec![page(2, PageKind::Toc, vec![])],
            body: vec![page(3, PageKind::Body, vec![anchor, formula])],
            entries: vec![TocEntry {
                text: "Intro".into(),
                level: 0,
                page: Some(3),
                anchor: AnchorId(1),
            }],
        };
        let images = ImageStore::new();
        let mut formulas = ImageStore::new();
        formulas.insert(
            "%%FORMULA_0%%".into(),
            LoadedImage::decode(png_bytes(10, 4), 72.0).unwrap(),
        );

        let layout = assemble(paginated, "Doc", (595.0, 842.0), &images, &formulas).unwrap();
        let kinds: Vec<PageKind> = layout.pages.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PageKind::Cover, PageKind::Toc, PageKind::Body]);
        assert_eq!(layout.anchors.get(&AnchorId(1)), Some(&3));
        assert_eq!(layout.images["%%FORMULA_0%%"].width_px, 10);
        assert_eq!(layout.toc.len(), 1);
    }

    #[test]
    fn write_is_atomic() {
        let dir = std::env::temp_dir().join(format!("pagewright-assemble-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let out = dir.join("doc.pdf");
        write_output(&out, b"%PDF-1.7 test").unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"%PDF-1.7 test");
        assert!(!partial_path(&out).exists());

        let missing = dir.join("no-such-dir").join("doc.pdf");
        let err = write_output(&missing, b"x").unwrap_err();
        assert!(matches!(err, BuildError::OutputNotWritable { .. }));
        assert!(!missing.exists());
        fs::remove_dir_all(&dir).unwrap();
    }
}
