//! # pagewright – paginated document builder
//!
//! Turns structured content (HTML from a markdown translator, or plain text)
//! into a paginated PDF with optional cover page, table of contents,
//! rendered formulas, page numbering and page decorations. The stages are:
//!
//! 1. **Normalize** – source → flat [`ContentEvent`] stream ([`dom`], [`events`])
//! 2. **Formulas** – extract `$…$` spans and render them to images ([`formula`])
//! 3. **Layout** – place events on pages with a vertical cursor ([`layout`])
//! 4. **Paginate** – two passes so the TOC knows every heading's page ([`pagination`])
//! 5. **Assemble** – cover + TOC + body into one [`DocumentLayout`] ([`assemble`])
//! 6. **Render** – decorate and emit PDF bytes via printpdf ([`decorate`], [`render`])

pub mod assemble;
pub mod config;
pub mod decorate;
pub mod dom;
pub mod error;
pub mod events;
pub mod fonts;
pub mod formula;
pub mod images;
pub mod layout;
pub mod model;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod style;
pub mod templates;

// Re-exports for convenience
pub use config::DocumentConfig;
pub use error::{BuildError, Result};
pub use events::ContentEvent;
pub use model::DocumentLayout;
pub use pipeline::{build_to_file, compute_layout, generate_pdf, generate_pdf_from_html, SourceBlock};
