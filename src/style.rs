//! Style resolver – maps a [`DocumentConfig`] to the fixed set of named
//! paragraph, table and page styles consumed by the layout engine.
//!
//! Everything here is resolved once per build and never mutated afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::DocumentConfig;
use crate::fonts::FontFamily;

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        if hex.len() == 6 {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()? as f32 / 255.0;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()? as f32 / 255.0;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()? as f32 / 255.0;
            Some(Self::rgb(r, g, b))
        } else if hex.len() == 3 {
            let r = u8::from_str_radix(&hex[0..1].repeat(2), 16).ok()? as f32 / 255.0;
            let g = u8::from_str_radix(&hex[1..2].repeat(2), 16).ok()? as f32 / 255.0;
            let b = u8::from_str_radix(&hex[2..3].repeat(2), 16).ok()? as f32 / 255.0;
            Some(Self::rgb(r, g, b))
        } else {
            None
        }
    }

    /// Parse a colour name or `#rrggbb` / `#rgb` literal.
    pub fn parse(value: &str) -> Option<Self> {
        let v = value.trim().to_ascii_lowercase();
        if v.starts_with('#') {
            return Self::from_hex(&v);
        }
        let named = match v.as_str() {
            "black" => "000000",
            "white" => "ffffff",
            "red" => "ff0000",
            "green" => "008000",
            "blue" => "0000ff",
            "navy" => "000080",
            "grey" | "gray" => "808080",
            "lightgrey" | "lightgray" => "d3d3d3",
            "darkgrey" | "darkgray" => "a9a9a9",
            "whitesmoke" => "f5f5f5",
            "yellow" => "ffff00",
            "orange" => "ffa500",
            "purple" => "800080",
            "lightblue" => "add8e6",
            _ => return None,
        };
        Self::from_hex(named)
    }

    /// Parse a configured colour, falling back to `default` with a warning.
    pub fn parse_or(value: &str, default: Color) -> Color {
        Self::parse(value).unwrap_or_else(|| {
            log::warn!("Colour '{value}' is not valid, using default");
            default
        })
    }

    /// Flatten a translucent colour onto an opaque background.
    pub fn blend_over(self, background: Color) -> Color {
        let a = self.a.clamp(0.0, 1.0);
        Color::rgb(
            self.r * a + background.r * (1.0 - a),
            self.g * a + background.g * (1.0 - a),
            self.b * a + background.b * (1.0 - a),
        )
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Justified,
}

impl TextAlign {
    pub fn resolve(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "left" => TextAlign::Left,
            "center" | "centre" => TextAlign::Center,
            "justified" | "justify" => TextAlign::Justified,
            other => {
                log::warn!("Alignment '{other}' is not supported, using justified");
                TextAlign::Justified
            }
        }
    }
}

/// The fixed set of style names the layout engine asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleName {
    Body,
    Heading1,
    Heading2,
    ListItem,
    Footnote,
    CoverTitle,
    CoverAuthor,
    CoverDate,
    TocTitle,
    TocEntry,
}

/// A resolved paragraph style. Sizes are in points.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font: FontFamily,
    pub bold: bool,
    pub italic: bool,
    pub size: f32,
    pub color: Color,
    pub alignment: TextAlign,
    /// Distance between baselines.
    pub line_height: f32,
    pub space_after: f32,
    /// Indent per nesting level for list items, plain indent otherwise.
    pub left_indent: f32,
}

/// Colour palette of a theme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub font: FontFamily,
    pub text: Color,
    pub title: Color,
}

impl Theme {
    pub fn resolve(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "modern" => Self::MODERN,
            "classic" => Theme {
                font: FontFamily::Times,
                text: Color::BLACK,
                title: Color::rgb(0x32 as f32 / 255.0, 0.0, 0.0),
            },
            "minimalist" => Theme {
                font: FontFamily::Courier,
                text: Color::rgb(0.2, 0.2, 0.2),
                title: Color::rgb(0.2, 0.2, 0.2),
            },
            other => {
                log::warn!("Theme '{other}' is unknown, using modern");
                Self::MODERN
            }
        }
    }

    const MODERN: Theme = Theme {
        font: FontFamily::Helvetica,
        text: Color::BLACK,
        // #000080
        title: Color::rgb(0.0, 0.0, 0.502),
    };
}

/// Background and border of every page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTemplate {
    pub background: Color,
    pub border: Option<Color>,
}

impl PageTemplate {
    pub fn resolve(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "plain" => Self::PLAIN,
            "colored" | "coloured" => PageTemplate {
                background: Color::rgb(0xE6 as f32 / 255.0, 0xF3 as f32 / 255.0, 0xFA as f32 / 255.0),
                border: Some(Color::rgb(0.0, 0.0, 0x80 as f32 / 255.0)),
            },
            "professional" => PageTemplate {
                background: Color::WHITE,
                border: Some(Color::rgb(0x4A as f32 / 255.0, 0x4A as f32 / 255.0, 0x4A as f32 / 255.0)),
            },
            other => {
                log::warn!("Page template '{other}' is unknown, using plain");
                Self::PLAIN
            }
        }
    }

    const PLAIN: PageTemplate = PageTemplate {
        background: Color::WHITE,
        border: None,
    };
}

/// Resolved table appearance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableStyle {
    /// Lines between every cell and around the table.
    pub grid: Option<Color>,
    /// Single rule under the header row.
    pub header_rule: Option<Color>,
    pub header_fill: Option<Color>,
    /// Fill for every other body row.
    pub band_fill: Option<Color>,
    pub background: Option<Color>,
    pub line_width: f32,
    pub cell_padding: f32,
}

impl TableStyle {
    pub fn resolve(config: &DocumentConfig) -> Self {
        let simple = TableStyle {
            grid: None,
            header_rule: Some(Color::BLACK),
            header_fill: None,
            band_fill: None,
            background: None,
            line_width: 0.5,
            cell_padding: 4.0,
        };
        match config.table_style.trim().to_ascii_lowercase().as_str() {
            "simple" => simple,
            "grid" => TableStyle {
                grid: Some(Color::BLACK),
                header_rule: None,
                header_fill: Some(Color::rgb(0.93, 0.93, 0.93)),
                ..simple
            },
            "striped" => TableStyle {
                header_fill: Some(Color::rgb(0.83, 0.83, 0.83)),
                band_fill: Some(Color::rgb(0.95, 0.95, 0.95)),
                ..simple
            },
            "custom" => TableStyle {
                grid: Some(Color::parse_or(&config.table_colors.border, Color::BLACK)),
                header_rule: None,
                background: Some(Color::parse_or(&config.table_colors.background, Color::WHITE)),
                ..simple
            },
            other => {
                log::warn!("Table style '{other}' is unknown, using simple");
                simple
            }
        }
    }
}

/// Every style a build needs, resolved once from the configuration.
#[derive(Debug, Clone)]
pub struct StyleSet {
    styles: HashMap<StyleName, TextStyle>,
    pub table: TableStyle,
    pub page: PageTemplate,
}

impl StyleSet {
    pub fn from_config(config: &DocumentConfig) -> Self {
        let theme = Theme::resolve(&config.theme);
        // An empty font name means "use the theme's face".
        let font = if config.font.trim().is_empty() {
            theme.font
        } else {
            FontFamily::resolve(&config.font)
        };
        let size = if config.font_size > 0.0 {
            config.font_size
        } else {
            log::warn!("Font size {} is not positive, using 12", config.font_size);
            12.0
        };
        let spacing = if config.line_spacing > 0.0 {
            config.line_spacing
        } else {
            1.15
        };
        let alignment = TextAlign::resolve(&config.alignment);

        let body = TextStyle {
            font,
            bold: false,
            italic: false,
            size,
            color: theme.text,
            alignment,
            line_height: size * spacing,
            space_after: 6.0,
            left_indent: 0.0,
        };
        let heading = |extra: f32, space_after: f32| TextStyle {
            bold: true,
            size: size + extra,
            color: theme.title,
            alignment: TextAlign::Left,
            line_height: (size + extra) * 1.2,
            space_after,
            ..body.clone()
        };
        let centered = |size: f32, bold: bool, space_after: f32| TextStyle {
            bold,
            size,
            color: theme.text,
            alignment: TextAlign::Center,
            line_height: size * 1.2,
            space_after,
            ..body.clone()
        };

        let mut styles = HashMap::new();
        styles.insert(StyleName::Heading1, heading(4.0, 10.0));
        styles.insert(StyleName::Heading2, heading(2.0, 8.0));
        styles.insert(
            StyleName::ListItem,
            TextStyle {
                left_indent: 20.0,
                space_after: 4.0,
                alignment: TextAlign::Left,
                ..body.clone()
            },
        );
        styles.insert(
            StyleName::Footnote,
            TextStyle {
                size: (size - 2.0).max(4.0),
                line_height: (size - 2.0).max(4.0) * spacing,
                space_after: 4.0,
                ..body.clone()
            },
        );
        styles.insert(StyleName::CoverTitle, centered(24.0, true, 20.0));
        styles.insert(StyleName::CoverAuthor, centered(16.0, false, 20.0));
        styles.insert(StyleName::CoverDate, centered(12.0, false, 0.0));
        styles.insert(StyleName::TocTitle, heading(4.0, 12.0));
        styles.insert(
            StyleName::TocEntry,
            TextStyle {
                size: 10.0,
                line_height: 14.0,
                space_after: 2.0,
                alignment: TextAlign::Left,
                color: theme.text,
                ..body.clone()
            },
        );
        styles.insert(StyleName::Body, body);

        Self {
            styles,
            table: TableStyle::resolve(config),
            page: PageTemplate::resolve(&config.page_template),
        }
    }

    pub fn get(&self, name: StyleName) -> &TextStyle {
        // Every name is inserted by `from_config`.
        &self.styles[&name]
    }

    /// Replace one resolved style.
    pub fn set(&mut self, name: StyleName, style: TextStyle) {
        self.styles.insert(name, style);
    }

    /// Style name for a heading of the given level (1 = top).
    pub fn heading_name(level: u8) -> StyleName {
        if level <= 1 {
            StyleName::Heading1
        } else {
            StyleName::Heading2
        }
    }

    pub fn heading(&self, level: u8) -> &TextStyle {
        self.get(Self::heading_name(level))
    }
}

impl Default for StyleSet {
    fn default() -> Self {
        Self::from_config(&DocumentConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_body_follows_config() {
        let styles = StyleSet::default();
        let body = styles.get(StyleName::Body);
        assert_eq!(body.size, 12.0);
        assert!((body.line_height - 13.8).abs() < 0.01);
        assert_eq!(body.alignment, TextAlign::Justified);
        assert_eq!(body.font, FontFamily::Helvetica);
    }

    #[test]
    fn headings_scale_from_body() {
        let styles = StyleSet::default();
        assert_eq!(styles.heading(1).size, 16.0);
        assert_eq!(styles.heading(2).size, 14.0);
        assert_eq!(styles.heading(5).size, 14.0);
        assert!(styles.heading(1).bold);
    }

    #[test]
    fn unknown_values_fall_back() {
        let cfg = DocumentConfig {
            font: "Wingdings".into(),
            theme: "neon".into(),
            page_template: "glitter".into(),
            table_style: "fancy".into(),
            ..DocumentConfig::default()
        };
        let styles = StyleSet::from_config(&cfg);
        assert_eq!(styles.get(StyleName::Body).font, FontFamily::Helvetica);
        assert_eq!(styles.page.background, Color::WHITE);
        assert!(styles.page.border.is_none());
        assert!(styles.table.grid.is_none());
        assert!(styles.table.header_rule.is_some());
    }

    #[test]
    fn classic_theme_colours_titles() {
        let cfg = DocumentConfig {
            theme: "classic".into(),
            ..DocumentConfig::default()
        };
        let styles = StyleSet::from_config(&cfg);
        assert!(styles.heading(1).color.r > 0.1);
        assert_eq!(styles.get(StyleName::Body).color, Color::BLACK);
    }

    #[test]
    fn custom_table_colours_with_bad_value() {
        let mut cfg = DocumentConfig::default();
        cfg.table_style = "custom".into();
        cfg.table_colors.background = "not-a-colour".into();
        cfg.table_colors.border = "#ff0000".into();
        let table = TableStyle::resolve(&cfg);
        assert_eq!(table.background, Some(Color::WHITE));
        assert_eq!(table.grid, Some(Color::rgb(1.0, 0.0, 0.0)));
    }

    #[test]
    fn multibyte_colour_is_rejected() {
        assert_eq!(Color::from_hex("#a\u{e9}aaa"), None);
        assert_eq!(Color::from_hex("\u{e9}a"), None);
        assert_eq!(Color::parse_or("#a\u{e9}aaa", Color::BLACK), Color::BLACK);

        let mut cfg = DocumentConfig::default();
        cfg.table_style = "custom".into();
        cfg.table_colors.background = "#a\u{e9}aaa".into();
        let table = TableStyle::resolve(&cfg);
        assert_eq!(table.background, Some(Color::WHITE));
    }

    #[test]
    fn colour_parsing() {
        assert_eq!(Color::parse("navy"), Color::from_hex("#000080"));
        assert_eq!(Color::parse("#fff"), Some(Color::WHITE));
        assert!(Color::parse("chartreuse-ish").is_none());
        let grey = Color { a: 0.3, ..Color::rgb(0.5, 0.5, 0.5) }.blend_over(Color::WHITE);
        assert!((grey.r - 0.85).abs() < 0.001);
    }
}
