//! Page decoration – the per-page furniture drawn behind and over the
//! content: background, border, page number, watermark.
//!
//! The decorator is backend-neutral. It returns drawing operations in page
//! coordinates (origin top-left, points) and the renderer translates them.

use std::path::Path;

use crate::config::{DocumentConfig, NumberAlign, PageGeometry, PaginationPolicy, WatermarkConfig};
use crate::fonts::{measure_text_width, FontFamily};
use crate::images::{load_path, LoadedImage};
use crate::model::Stroke;
use crate::style::{Color, PageTemplate};

/// Image key the renderer registers the background image under.
pub const BACKGROUND_IMAGE_KEY: &str = "decoration:background";

const BORDER_WIDTH: f32 = 2.0;
const PAGE_NUMBER_SIZE: f32 = 10.0;
const WATERMARK_SIZE: f32 = 8.0;
/// Watermark baseline distance from the bottom edge.
const WATERMARK_BASELINE: f32 = 30.0;
const WATERMARK_ALPHA: f32 = 0.3;

/// One drawing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DecorationOp {
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: [f32; 4],
    },
    StrokeRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        stroke: Stroke,
    },
    Image {
        key: &'static str,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Text {
        text: String,
        x: f32,
        /// Baseline, measured from the top of the page.
        baseline: f32,
        font: FontFamily,
        italic: bool,
        size: f32,
        color: [f32; 4],
    },
}

/// Drawn before (`underlay`) and after (`overlay`) the page content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDecoration {
    pub underlay: Vec<DecorationOp>,
    pub overlay: Vec<DecorationOp>,
}

pub struct PageDecorator {
    geometry: PageGeometry,
    template: PageTemplate,
    policy: PaginationPolicy,
    watermark: WatermarkConfig,
    background: Option<LoadedImage>,
}

impl PageDecorator {
    pub fn new(config: &DocumentConfig, template: PageTemplate) -> Self {
        let background = config
            .decoration
            .background_image
            .as_deref()
            .and_then(load_background);
        Self {
            geometry: config.geometry(),
            template,
            policy: config.pagination.clone(),
            watermark: config.decoration.watermark.clone(),
            background,
        }
    }

    pub fn with_background(mut self, image: Option<LoadedImage>) -> Self {
        self.background = image;
        self
    }

    pub fn background_image(&self) -> Option<&LoadedImage> {
        self.background.as_ref()
    }

    /// Decorations for one physical page (1-based).
    pub fn decorate(&self, physical_page: u32) -> PageDecoration {
        let g = &self.geometry;
        let mut underlay = vec![DecorationOp::FillRect {
            x: 0.0,
            y: 0.0,
            width: g.width,
            height: g.height,
            color: self.template.background.to_array(),
        }];

        if let Some(img) = &self.background {
            // Cover the page, keeping the aspect ratio.
            let (w, h) = img.natural_size_pt();
            let scale = (g.width / w).max(g.height / h);
            let (width, height) = (w * scale, h * scale);
            underlay.push(DecorationOp::Image {
                key: BACKGROUND_IMAGE_KEY,
                x: (g.width - width) / 2.0,
                y: (g.height - height) / 2.0,
                width,
                height,
            });
        }

        if let Some(border) = self.template.border {
            underlay.push(DecorationOp::StrokeRect {
                x: g.margin_left,
                y: g.margin_top,
                width: g.content_width(),
                height: g.content_height(),
                stroke: Stroke {
                    width: BORDER_WIDTH,
                    color: border.to_array(),
                },
            });
        }

        let mut overlay = Vec::new();
        if self.policy.numbers_page(physical_page) {
            let text = format!("{}{}", self.policy.prefix, physical_page);
            let width = measure_text_width(&text, PAGE_NUMBER_SIZE, FontFamily::Helvetica, false);
            let x = match self.policy.align {
                NumberAlign::Center => (g.width - width) / 2.0,
                NumberAlign::Left => g.margin_left,
            };
            overlay.push(DecorationOp::Text {
                text,
                x,
                baseline: g.height - g.margin_bottom * 0.5,
                font: FontFamily::Helvetica,
                italic: false,
                size: PAGE_NUMBER_SIZE,
                color: Color::BLACK.to_array(),
            });
        }

        if self.watermark.enabled && !self.watermark.text.is_empty() {
            let text = self.watermark.text.clone();
            let width = measure_text_width(&text, WATERMARK_SIZE, FontFamily::Helvetica, false);
            let grey = Color {
                a: WATERMARK_ALPHA,
                ..Color::rgb(0.5, 0.5, 0.5)
            };
            overlay.push(DecorationOp::Text {
                text,
                x: (g.width - width) / 2.0,
                baseline: g.height - WATERMARK_BASELINE,
                font: FontFamily::Helvetica,
                italic: true,
                size: WATERMARK_SIZE,
                color: grey.blend_over(self.template.background).to_array(),
            });
        }

        PageDecoration { underlay, overlay }
    }
}

/// A background image that cannot be read leaves the plain fill.
fn load_background(path: &Path) -> Option<LoadedImage> {
    match load_path(path) {
        Ok(img) => Some(img),
        Err(e) => {
            log::debug!("Background image unavailable, using solid fill: {e}");
            None
        }
    }
}
