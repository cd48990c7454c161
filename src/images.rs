//! Image loading – decodes every image referenced by a document once, ahead
//! of layout, so the layout engine only ever sees natural sizes and bytes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

use crate::events::{ContentEvent, ImageSource};

/// Decoded image bytes plus their natural size.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Encoded (PNG/JPEG) bytes, embedded as-is by the renderer.
    pub bytes: Arc<Vec<u8>>,
    pub width_px: u32,
    pub height_px: u32,
    /// Resolution the pixels were produced at; 72 means 1 px = 1 pt.
    pub dpi: f32,
}

impl LoadedImage {
    /// Decode `bytes` to learn the pixel size.
    pub fn decode(bytes: Vec<u8>, dpi: f32) -> Result<Self, String> {
        let img = ::image::load_from_memory(&bytes).map_err(|e| format!("decode error: {e}"))?;
        let (width_px, height_px) = (img.width(), img.height());
        if width_px == 0 || height_px == 0 {
            return Err("image has zero size".to_string());
        }
        Ok(Self {
            bytes: Arc::new(bytes),
            width_px,
            height_px,
            dpi: if dpi > 0.0 { dpi } else { 72.0 },
        })
    }

    /// Natural size in points.
    pub fn natural_size_pt(&self) -> (f32, f32) {
        let scale = 72.0 / self.dpi;
        (self.width_px as f32 * scale, self.height_px as f32 * scale)
    }
}

/// Images keyed by [`ImageSource::key`] (or formula token).
pub type ImageStore = HashMap<String, LoadedImage>;

/// Load one image source. Errors are returned as text for logging; callers
/// treat them as recoverable.
pub fn load_source(source: &ImageSource) -> Result<LoadedImage, String> {
    match source {
        ImageSource::Path(path) => load_path(path),
        ImageSource::DataUri(uri) => LoadedImage::decode(parse_data_uri(uri)?, 72.0),
        ImageSource::Buffer { bytes, .. } => LoadedImage::decode(bytes.as_ref().clone(), 72.0),
    }
}

pub fn load_path(path: &Path) -> Result<LoadedImage, String> {
    let bytes = fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
    LoadedImage::decode(bytes, 72.0)
}

/// Load every image referenced by `events` into `store`. Sources that fail
/// are logged and left out; layout skips them.
pub fn load_event_images(events: &[ContentEvent], store: &mut ImageStore) {
    for event in events {
        if let ContentEvent::Image { source } = event {
            let key = source.key();
            if store.contains_key(&key) {
                continue;
            }
            match load_source(source) {
                Ok(img) => {
                    store.insert(key, img);
                }
                Err(e) => log::warn!("Skipping image: {e}"),
            }
        }
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
pub fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URI".to_string())?;
    let comma_pos = rest.find(',').ok_or_else(|| {
        "Invalid data URI: missing `,` separator between header and data".to_string()
    })?;
    let header = &rest[..comma_pos];
    if !header.contains(";base64") {
        return Err("Only base64-encoded data URIs are supported".to_string());
    }
    let b64_data = rest[comma_pos + 1..].trim();
    BASE64_STD
        .decode(b64_data)
        .map_err(|e| format!("Base64 decode error: {e}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Encode a solid PNG of the given size.
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ::image::RgbImage::from_pixel(width, height, ::image::Rgb([200, 30, 30]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, ::image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn decode_reports_natural_size() {
        let img = LoadedImage::decode(png_bytes(40, 20), 72.0).unwrap();
        assert_eq!((img.width_px, img.height_px), (40, 20));
        assert_eq!(img.natural_size_pt(), (40.0, 20.0));

        let hi = LoadedImage::decode(png_bytes(300, 150), 300.0).unwrap();
        let (w, h) = hi.natural_size_pt();
        assert!((w - 72.0).abs() < 0.01 && (h - 36.0).abs() < 0.01);
    }

    #[test]
    fn data_uri_round_trip() {
        let uri = format!("data:image/png;base64,{}", BASE64_STD.encode(png_bytes(3, 3)));
        let img = load_source(&ImageSource::DataUri(uri)).unwrap();
        assert_eq!(img.width_px, 3);
        assert!(parse_data_uri("data:image/png,abc").is_err());
        assert!(parse_data_uri("photo.png").is_err());
    }

    #[test]
    fn missing_file_is_left_out() {
        let events = vec![ContentEvent::Image {
            source: ImageSource::Path(PathBuf::from("/definitely/not/here.png")),
        }];
        let mut store = ImageStore::new();
        load_event_images(&events, &mut store);
        assert!(store.is_empty());
    }
}
