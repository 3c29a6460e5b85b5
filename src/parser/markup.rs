//! Thin wrapper over `scraper` so extraction logic only sees
//! "first match", "all matches" and "flattened text".

use scraper::{ElementRef, Html, Selector};

use crate::error::ConfigError;

/// Compile a CSS selector, reporting the offending input on failure.
pub fn selector(css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|e| ConfigError::Selector {
        css: css.to_string(),
        reason: format!("{:?}", e),
    })
}

pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(payload: &str) -> Self {
        Self {
            html: Html::parse_document(payload),
        }
    }

    /// Trimmed text of the first element matching `sel`.
    /// `Some("")` when the element exists but holds no text.
    pub fn first_text(&self, sel: &Selector) -> Option<String> {
        self.html
            .select(sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
    }

    /// Every element matching `sel`, in document order.
    pub fn select_all<'a>(&'a self, sel: &'a Selector) -> impl Iterator<Item = Node<'a>> + 'a {
        self.html.select(sel).map(Node)
    }
}

pub struct Node<'a>(ElementRef<'a>);

impl Node<'_> {
    /// Each descendant text node trimmed, blanks dropped, joined by one space.
    pub fn flatten_text(&self) -> String {
        self.0
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
