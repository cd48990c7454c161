//! Formula embedding: `$…$` / `$$…$$` spans are swapped for placeholder
//! tokens before the text is parsed, rendered to bitmaps up front, and looked
//! up by token during layout.

use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use rayon::prelude::*;
use regex::Regex;

use crate::images::{ImageStore, LoadedImage};

const TOKEN_PREFIX: &str = "%%FORMULA_";
const TOKEN_SUFFIX: &str = "%%";

fn display_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\$\$(.+?)\$\$").expect("display formula pattern"))
}

fn inline_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([^$\n]+?)\$").expect("inline formula pattern"))
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%%FORMULA_(BLOCK_)?(\d+)%%").expect("formula token pattern"))
}

/// Placeholder token for formula number `n`.
pub fn formula_token(n: usize, display: bool) -> String {
    if display {
        format!("{TOKEN_PREFIX}BLOCK_{n}{TOKEN_SUFFIX}")
    } else {
        format!("{TOKEN_PREFIX}{n}{TOKEN_SUFFIX}")
    }
}

/// One extracted formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaSpan {
    pub token: String,
    /// Formula source without the `$` delimiters.
    pub source: String,
    pub display: bool,
}

/// Replaces formula spans with tokens. The counter runs across every block
/// passed through the same extractor, so tokens are unique per build.
#[derive(Debug, Default)]
pub struct FormulaExtractor {
    next: usize,
    spans: Vec<FormulaSpan>,
}

impl FormulaExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace display spans first, then inline spans.
    pub fn extract(&mut self, text: &str) -> String {
        let text = self.replace(display_re(), text, true);
        self.replace(inline_re(), &text, false)
    }

    fn replace(&mut self, re: &Regex, text: &str, display: bool) -> String {
        re.replace_all(text, |caps: &regex::Captures<'_>| {
            let source = caps[1].trim().to_string();
            let token = formula_token(self.next, display);
            self.next += 1;
            self.spans.push(FormulaSpan {
                token: token.clone(),
                source,
                display,
            });
            // Display formulas sit on their own line.
            if display {
                format!("\n{token}\n")
            } else {
                token
            }
        })
        .into_owned()
    }

    pub fn spans(&self) -> &[FormulaSpan] {
        &self.spans
    }

    pub fn into_spans(self) -> Vec<FormulaSpan> {
        self.spans
    }
}

/// A run of text or a formula token, as found by [`split_tokens`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPiece<'a> {
    Text(&'a str),
    Token { token: &'a str, display: bool },
}

/// Split `text` around formula tokens.
pub fn split_tokens(text: &str) -> Vec<TextPiece<'_>> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for caps in token_re().captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        if m.start() > last {
            pieces.push(TextPiece::Text(&text[last..m.start()]));
        }
        pieces.push(TextPiece::Token {
            token: m.as_str(),
            display: caps.get(1).is_some(),
        });
        last = m.end();
    }
    if last < text.len() {
        pieces.push(TextPiece::Text(&text[last..]));
    }
    pieces
}

/// Turns formula source into a bitmap. Implementations must be pure: the
/// same source always yields the same image.
pub trait FormulaRenderer: Sync {
    fn render(&self, source: &str, display: bool) -> Result<LoadedImage, String>;
}

/// Renders by piping the formula into an external program that writes PNG
/// bytes to stdout, e.g. a LaTeX-to-PNG wrapper script.
#[derive(Debug, Clone)]
pub struct CommandFormulaRenderer {
    pub program: String,
    pub args: Vec<String>,
    /// Resolution the program renders at.
    pub dpi: f32,
}

impl CommandFormulaRenderer {
    /// Parse `"prog arg1 arg2"`.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            dpi: 300.0,
        })
    }
}

impl FormulaRenderer for CommandFormulaRenderer {
    fn render(&self, source: &str, _display: bool) -> Result<LoadedImage, String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("cannot start '{}': {e}", self.program))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .map_err(|e| format!("write to '{}': {e}", self.program))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| format!("'{}' failed: {e}", self.program))?;
        if !output.status.success() {
            return Err(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        LoadedImage::decode(output.stdout, self.dpi)
    }
}

/// Render every span in parallel. Identical sources are rendered once.
/// Failures are logged and left out of the map; layout skips those tokens.
pub fn render_formulas(spans: &[FormulaSpan], renderer: &dyn FormulaRenderer) -> ImageStore {
    let mut unique: Vec<(&str, bool)> = spans
        .iter()
        .map(|s| (s.source.as_str(), s.display))
        .collect();
    unique.sort_unstable();
    unique.dedup();

    let rendered: HashMap<(&str, bool), LoadedImage> = unique
        .par_iter()
        .filter_map(|&(source, display)| match renderer.render(source, display) {
            Ok(img) => Some(((source, display), img)),
            Err(e) => {
                log::warn!("Formula '{source}' could not be rendered: {e}");
                None
            }
        })
        .collect();

    let mut store = ImageStore::new();
    for span in spans {
        if let Some(img) = rendered.get(&(span.source.as_str(), span.display)) {
            store.insert(span.token.clone(), img.clone());
        }
    }
    log::debug!("Rendered {}/{} formulas", store.len(), spans.len());
    store
}
