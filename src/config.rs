//! Document configuration – the options a caller supplies for one build.
//!
//! Enumerated options (theme, page template, table style, alignment, font)
//! are kept as plain strings so that an unknown value never fails
//! deserialization; the style resolver maps them to concrete values and
//! falls back to defaults with a warning.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One millimetre in PDF points.
pub const MM_TO_PT: f32 = 72.0 / 25.4;

/// Page orientation for the generated PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width > height.
    Landscape,
}

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            left: 40.0,
            right: 40.0,
            top: 50.0,
            bottom: 50.0,
        }
    }
}

/// Which physical pages receive a visible page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaginationMode {
    #[default]
    All,
    OddOnly,
    EvenOnly,
    /// Only pages `>= n` are numbered.
    FromPage(u32),
    None,
}

/// Horizontal placement of the running page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberAlign {
    #[default]
    Center,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationPolicy {
    pub mode: PaginationMode,
    /// First physical page that may carry a number.
    pub start: u32,
    pub align: NumberAlign,
    /// Text drawn before the number, e.g. `"Page "`.
    pub prefix: String,
}

impl Default for PaginationPolicy {
    fn default() -> Self {
        Self {
            mode: PaginationMode::All,
            start: 1,
            align: NumberAlign::Center,
            prefix: "Page ".to_string(),
        }
    }
}

impl PaginationPolicy {
    pub fn with_mode(mode: PaginationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Whether `physical_page` (1-based) gets a number under this policy.
    pub fn numbers_page(&self, physical_page: u32) -> bool {
        if physical_page < self.start.max(1) {
            return false;
        }
        match self.mode {
            PaginationMode::All => true,
            PaginationMode::OddOnly => physical_page % 2 == 1,
            PaginationMode::EvenOnly => physical_page % 2 == 0,
            PaginationMode::FromPage(n) => physical_page >= n,
            PaginationMode::None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    pub enabled: bool,
    pub text: String,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            text: "Made with pagewright".to_string(),
        }
    }
}

/// Page decoration options that do not come from the page template.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageDecorationConfig {
    pub background_image: Option<PathBuf>,
    pub watermark: WatermarkConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverConfig {
    pub title: String,
    pub author: String,
    pub date: String,
    pub image: Option<PathBuf>,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            title: "Document".to_string(),
            author: "Author".to_string(),
            date: today(),
            image: None,
        }
    }
}

/// Today's date as `YYYY-MM-DD`, the default cover date.
pub fn today() -> String {
    format_date(printpdf::DateTime::now().date)
}

fn format_date(date: printpdf::Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year, date.month, date.day)
}

/// Colours used by the `custom` table style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableColors {
    pub background: String,
    pub border: String,
}

impl Default for TableColors {
    fn default() -> Self {
        Self {
            background: "white".to_string(),
            border: "black".to_string(),
        }
    }
}

/// Everything a single build needs to know besides the content itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    pub orientation: PageOrientation,
    pub margins: Margins,
    pub font: String,
    pub font_size: f32,
    /// `left`, `center` or `justified`.
    pub alignment: String,
    pub line_spacing: f32,
    /// `modern`, `classic` or `minimalist`.
    pub theme: String,
    /// `plain`, `colored` or `professional`.
    pub page_template: String,
    /// `simple`, `grid`, `striped` or `custom`.
    pub table_style: String,
    pub table_colors: TableColors,
    pub include_cover: bool,
    pub cover: CoverConfig,
    pub include_toc: bool,
    pub toc_title: String,
    /// Deepest heading level that is listed in the TOC.
    pub toc_depth: u8,
    pub pagination: PaginationPolicy,
    pub decoration: PageDecorationConfig,
    /// Force a page break before headings that would end up alone at the
    /// bottom of a page.
    pub orphan_headings: bool,
    pub process_formulas: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            title: "Document".to_string(),
            orientation: PageOrientation::Portrait,
            margins: Margins::default(),
            font: "Helvetica".to_string(),
            font_size: 12.0,
            alignment: "justified".to_string(),
            line_spacing: 1.15,
            theme: "modern".to_string(),
            page_template: "plain".to_string(),
            table_style: "simple".to_string(),
            table_colors: TableColors::default(),
            include_cover: false,
            cover: CoverConfig::default(),
            include_toc: false,
            toc_title: "Contents".to_string(),
            toc_depth: 2,
            pagination: PaginationPolicy::default(),
            decoration: PageDecorationConfig::default(),
            orphan_headings: true,
            process_formulas: false,
        }
    }
}

impl DocumentConfig {
    /// Deserialise from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Read a configuration document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Physical page geometry in points for this configuration.
    pub fn geometry(&self) -> PageGeometry {
        let (width, height) = match self.orientation {
            PageOrientation::Portrait => (A4_WIDTH_PT, A4_HEIGHT_PT),
            PageOrientation::Landscape => (A4_HEIGHT_PT, A4_WIDTH_PT),
        };
        PageGeometry {
            width,
            height,
            margin_left: self.margins.left * MM_TO_PT,
            margin_right: self.margins.right * MM_TO_PT,
            margin_top: self.margins.top * MM_TO_PT,
            margin_bottom: self.margins.bottom * MM_TO_PT,
        }
    }
}

/// A4: 210mm × 297mm.
pub const A4_WIDTH_PT: f32 = 595.28;
pub const A4_HEIGHT_PT: f32 = 841.89;

/// Resolved page size and margins, all in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin_left: f32,
    pub margin_right: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
}

impl PageGeometry {
    /// Top of the usable area, in PDF (bottom-left origin) coordinates.
    pub fn top(&self) -> f32 {
        self.height - self.margin_top
    }

    pub fn content_width(&self) -> f32 {
        (self.width - self.margin_left - self.margin_right).max(1.0)
    }

    pub fn content_height(&self) -> f32 {
        (self.height - self.margin_top - self.margin_bottom).max(1.0)
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        DocumentConfig::default().geometry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_date_defaults_to_today() {
        let date = CoverConfig::default().date;
        assert_eq!(date, today());
        let parts: Vec<&str> = date.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 4);
        assert!(parts.iter().all(|p| p.parse::<u32>().is_ok()));

        let explicit = DocumentConfig::from_json(r#"{"cover": {"date": "1 May"}}"#).unwrap();
        assert_eq!(explicit.cover.date, "1 May");
    }

    #[test]
    fn dates_are_zero_padded() {
        let d = printpdf::Date { year: 2024, month: 3, day: 7 };
        assert_eq!(format_date(d), "2024-03-07");
    }

    #[test]
    fn defaults_match_a4_with_mm_margins() {
        let g = DocumentConfig::default().geometry();
        assert!((g.width - 595.28).abs() < 0.01);
        assert!((g.margin_left - 40.0 * MM_TO_PT).abs() < 0.01);
        assert!(g.content_height() > 500.0);
    }

    #[test]
    fn partial_json_takes_defaults() {
        let cfg = DocumentConfig::from_json(r#"{"include_toc": true, "font_size": 10}"#).unwrap();
        assert!(cfg.include_toc);
        assert_eq!(cfg.font_size, 10.0);
        assert_eq!(cfg.theme, "modern");
        assert_eq!(cfg.margins, Margins::default());
    }

    #[test]
    fn pagination_mode_json_forms() {
        let cfg = DocumentConfig::from_json(r#"{"pagination": {"mode": "odd-only"}}"#).unwrap();
        assert_eq!(cfg.pagination.mode, PaginationMode::OddOnly);
        let cfg =
            DocumentConfig::from_json(r#"{"pagination": {"mode": {"from-page": 3}}}"#).unwrap();
        assert_eq!(cfg.pagination.mode, PaginationMode::FromPage(3));
    }

    #[test]
    fn policy_parity_and_start() {
        let odd = PaginationPolicy::with_mode(PaginationMode::OddOnly);
        let numbered: Vec<u32> = (1..=5).filter(|p| odd.numbers_page(*p)).collect();
        assert_eq!(numbered, vec![1, 3, 5]);

        let even = PaginationPolicy::with_mode(PaginationMode::EvenOnly);
        assert!(even.numbers_page(2) && !even.numbers_page(3));

        let from = PaginationPolicy::with_mode(PaginationMode::FromPage(3));
        assert!(!from.numbers_page(2) && from.numbers_page(3));

        let mut started = PaginationPolicy::default();
        started.start = 2;
        assert!(!started.numbers_page(1) && started.numbers_page(2));

        assert!(!PaginationPolicy::with_mode(PaginationMode::None).numbers_page(1));
    }

    #[test]
    fn landscape_swaps_dimensions() {
        let cfg = DocumentConfig {
            orientation: PageOrientation::Landscape,
            ..DocumentConfig::default()
        };
        let g = cfg.geometry();
        assert!(g.width > g.height);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            DocumentConfig::from_json("{not json"),
            Err(crate::error::BuildError::Config(_))
        ));
    }
}
