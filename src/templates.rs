//! Sample documents for testing and demonstration.
//!
//! Each one exercises a different part of the pipeline: plain flow,
//! headings for the TOC, tables and lists, formulas, forced breaks.

/// One heading followed by `paragraphs` numbered paragraphs.
pub fn long_document(paragraphs: usize) -> String {
    let mut html = String::from("<h1>Introduction</h1>\n");
    for i in 1..=paragraphs {
        html.push_str(&format!(
            "<p>Paragraph {i}. Lorem ipsum dolor sit amet, consectetur adipiscing elit, \
             sed do eiusmod tempor incididunt ut labore et dolore magna aliqua. Ut enim ad \
             minim veniam, quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea \
             commodo consequat.</p>\n"
        ));
    }
    html
}

/// Two chapters with sections, enough text to span several pages.
pub fn chaptered_document() -> String {
    let mut html = String::new();
    for chapter in 1..=2 {
        html.push_str(&format!("<h1>Chapter {chapter}</h1>\n"));
        for section in 1..=2 {
            html.push_str(&format!("<h2>Section {chapter}.{section}</h2>\n"));
            for i in 1..=12 {
                html.push_str(&format!(
                    "<p>Chapter {chapter}, section {section}, paragraph {i}. Duis aute \
                     irure dolor in reprehenderit in voluptate velit esse cillum dolore eu \
                     fugiat nulla pariatur. Excepteur sint occaecat cupidatat non proident.</p>\n"
                ));
            }
        }
    }
    html
}

/// Report with a table, nested lists and a quotation.
pub fn report_template() -> &'static str {
    r##"
<h1>Quarterly Report</h1>
<p>Revenue grew by <strong>23%</strong> year-over-year, reaching a total of
<em>$4.2M</em> for the quarter.</p>

<h2>Key Highlights</h2>
<ul>
    <li>Customer acquisition cost reduced by 15%</li>
    <li>Net promoter score improved to 72
        <ul>
            <li>Support response time halved</li>
        </ul>
    </li>
    <li>Three new enterprise partnerships signed</li>
</ul>

<h2>Regional Results</h2>
<table>
    <thead>
        <tr><th>Region</th><th>Revenue</th><th>Growth</th></tr>
    </thead>
    <tbody>
        <tr><td>North America</td><td>$2.1M</td><td>+18%</td></tr>
        <tr><td>Europe</td><td>$1.4M</td><td>+31%</td></tr>
        <tr><td>Asia Pacific</td><td>$0.7M</td><td>+27%</td></tr>
    </tbody>
</table>

<h2>Next Steps</h2>
<ol>
    <li>Expand the partner programme</li>
    <li>Hire two regional account managers</li>
</ol>
<blockquote>Numbers are unaudited.</blockquote>
"##
}

/// Inline and display formulas mixed with prose.
pub fn formula_template() -> &'static str {
    r##"
<h1>Formulas</h1>
<p>The relation $E = mc^2$ links mass and energy.</p>
<p>The Gaussian integral evaluates to $$\int_{-\infty}^{\infty} e^{-x^2}\,dx = \sqrt{\pi}$$ as shown.</p>
<p>Euler's identity $e^{i\pi} + 1 = 0$ closes the section.</p>
"##
}

/// Sections separated by explicit page breaks.
pub fn sectioned_template() -> &'static str {
    r##"
<h1>Part One</h1>
<p>The first part fits on a single page.</p>
<div class="page-break"></div>
<h1>Part Two</h1>
<p>The second part starts on a fresh page.</p>
"##
}

/// Minimal single-paragraph document.
pub fn minimal_template() -> &'static str {
    "<p>Hello, World!</p>"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{events_from_html, ContentEvent, NormalizeOptions};

    fn events(html: &str) -> Vec<ContentEvent> {
        events_from_html(html, &NormalizeOptions::default())
    }

    #[test]
    fn long_document_has_heading_and_paragraphs() {
        let evs = events(&long_document(40));
        assert_eq!(evs.len(), 41);
        assert_eq!(evs[0], ContentEvent::heading(1, "Introduction"));
    }

    #[test]
    fn report_has_table_and_lists() {
        let evs = events(report_template());
        let rows = evs
            .iter()
            .filter(|e| matches!(e, ContentEvent::TableRow { .. }))
            .count();
        assert_eq!(rows, 4);
        assert!(evs.contains(&ContentEvent::TableEnd));
        assert!(evs
            .iter()
            .any(|e| matches!(e, ContentEvent::ListItem { depth: 1, .. })));
    }

    #[test]
    fn sectioned_template_breaks_once() {
        let breaks = events(sectioned_template())
            .iter()
            .filter(|e| matches!(e, ContentEvent::SectionBreak))
            .count();
        assert_eq!(breaks, 1);
    }
}
