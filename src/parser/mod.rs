pub mod dialogue;
pub mod markup;

use scraper::Selector;

use crate::error::ConfigError;
use crate::record::ExtractedRecord;
use markup::Document;

pub const DEFAULT_TITLE_SELECTOR: &str = "h1";
pub const DEFAULT_CONTAINER_SELECTOR: &str = "div.element-text";
pub const DEFAULT_TITLE_PLACEHOLDER: &str = "N/A";

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub title_selector: String,
    pub container_selector: String,
    pub title_placeholder: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            title_selector: DEFAULT_TITLE_SELECTOR.to_string(),
            container_selector: DEFAULT_CONTAINER_SELECTOR.to_string(),
            title_placeholder: DEFAULT_TITLE_PLACEHOLDER.to_string(),
        }
    }
}

/// Page → record. Pure: the same payload always gives the same record.
#[derive(Debug, Clone)]
pub struct Extractor {
    title: Selector,
    container: Selector,
    placeholder: String,
}

impl Extractor {
    pub fn new(cfg: &ExtractorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            title: markup::selector(&cfg.title_selector)?,
            container: markup::selector(&cfg.container_selector)?,
            placeholder: cfg.title_placeholder.clone(),
        })
    }

    /// Title from the first heading, dialogue from the first container with
    /// at least one speaker turn. `None` when no container has dialogue.
    pub fn extract(&self, id: u64, payload: &str, url: &str) -> Option<ExtractedRecord> {
        let doc = Document::parse(payload);

        let title = doc
            .first_text(&self.title)
            .unwrap_or_else(|| self.placeholder.clone());

        let dialogue = doc.select_all(&self.container).find_map(|node| {
            let text = node.flatten_text();
            let turns = dialogue::speaker_turns(&text);
            (!turns.is_empty()).then(|| dialogue::join_turns(&turns))
        })?;

        if dialogue.trim().is_empty() {
            return None;
        }

        Some(ExtractedRecord {
            id,
            title,
            dialogue,
            url: url.to_string(),
        })
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(&ExtractorConfig::default()).expect("built-in selectors parse")
    }
}
