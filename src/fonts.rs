//! Builtin font families and text measurement.
//!
//! Output uses the PDF base-14 fonts, so there are no font files to parse.
//! Widths are estimated from an average advance per family, which keeps line
//! breaking deterministic across machines.

use serde::{Deserialize, Serialize};

/// The base-14 families the renderer can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FontFamily {
    #[default]
    Helvetica,
    Times,
    Courier,
}

impl FontFamily {
    /// Resolve a configured font name. Unknown names fall back to Helvetica.
    pub fn resolve(name: &str) -> Self {
        match Self::parse(name) {
            Some(f) => f,
            None => {
                log::warn!("Font '{name}' not available, using Helvetica");
                FontFamily::Helvetica
            }
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let base = name
            .trim()
            .trim_end_matches("-Bold")
            .trim_end_matches("-Regular")
            .to_ascii_lowercase();
        match base.as_str() {
            "helvetica" | "arial" | "sans" | "sans-serif" => Some(FontFamily::Helvetica),
            "times" | "times-roman" | "times new roman" | "serif" => Some(FontFamily::Times),
            "courier" | "courier new" | "monospace" => Some(FontFamily::Courier),
            _ => None,
        }
    }

    /// Average glyph advance as a fraction of the font size.
    fn average_advance(self, bold: bool) -> f32 {
        match (self, bold) {
            (FontFamily::Helvetica, false) => 0.5,
            (FontFamily::Helvetica, true) => 0.55,
            (FontFamily::Times, false) => 0.45,
            (FontFamily::Times, true) => 0.5,
            // Monospaced: every glyph advances 600/1000 em.
            (FontFamily::Courier, _) => 0.6,
        }
    }

    /// Ascender as a fraction of the font size.
    pub fn ascender(self) -> f32 {
        match self {
            FontFamily::Helvetica => 0.75,
            FontFamily::Times => 0.68,
            FontFamily::Courier => 0.63,
        }
    }
}

/// Measure the width of a string at a given font size, in points.
pub fn measure_text_width(text: &str, font_size: f32, family: FontFamily, bold: bool) -> f32 {
    text.chars().count() as f32 * font_size * family.average_advance(bold)
}

/// Word-wrap text to fit within `max_width` points. Returns one entry per line.
///
/// Explicit newlines are honoured. A single word wider than `max_width` is
/// broken between characters.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    family: FontFamily,
    bold: bool,
    max_width: f32,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let fits = |s: &str| measure_text_width(s, font_size, family, bold) <= max_width;

    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        for word in &words {
            let candidate = if current_line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current_line, word)
            };
            if fits(&candidate) {
                current_line = candidate;
                continue;
            }
            if !current_line.is_empty() {
                lines.push(std::mem::take(&mut current_line));
            }
            if fits(word) {
                current_line = word.to_string();
            } else {
                // Hard-break an overlong word.
                for ch in word.chars() {
                    let mut next = current_line.clone();
                    next.push(ch);
                    if !fits(&next) && !current_line.is_empty() {
                        lines.push(std::mem::take(&mut current_line));
                        current_line.push(ch);
                    } else {
                        current_line = next;
                    }
                }
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Cut `text` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_text_width() {
        let w = measure_text_width("Hello", 16.0, FontFamily::Helvetica, false);
        // 5 chars × 16 × 0.5 = 40
        assert!((w - 40.0).abs() < 0.1);
        let mono = measure_text_width("Hello", 10.0, FontFamily::Courier, true);
        assert!((mono - 30.0).abs() < 0.1);
    }

    #[test]
    fn word_wrap_basic() {
        let lines = wrap_text("Hello world foo bar", 16.0, FontFamily::Helvetica, false, 60.0);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
    }

    #[test]
    fn overlong_word_is_broken() {
        let lines = wrap_text("abcdefghijklmnop", 10.0, FontFamily::Courier, false, 30.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(measure_text_width(line, 10.0, FontFamily::Courier, false) <= 30.0);
        }
        assert_eq!(lines.concat(), "abcdefghijklmnop");
    }

    #[test]
    fn unknown_font_falls_back() {
        assert_eq!(FontFamily::resolve("Comic Sans"), FontFamily::Helvetica);
        assert_eq!(FontFamily::resolve("Times-Roman"), FontFamily::Times);
        assert_eq!(FontFamily::resolve("Courier-Bold"), FontFamily::Courier);
    }

    #[test]
    fn truncation_marks_cut() {
        assert_eq!(truncate_chars("short", 50), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
    }
}
