use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::output::OutputFormat;
use crate::parser::{self, Extractor, ExtractorConfig};

pub const DEFAULT_BASE_URL: &str = "https://braceroarchive.org/items/show/";
pub const DEFAULT_OUTPUT: &str = "data/bracero_archive_interviews.csv";
const DEFAULT_USER_AGENT: &str = concat!("bracero_scraper/", env!("CARGO_PKG_VERSION"));
const ENV_PREFIX: &str = "BRACERO";

/// Upper bound on the worker pool.
pub const MAX_WORKERS: usize = 256;

/// Raw settings as loaded from defaults, config file and environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub base_url: String,
    pub first_id: u64,
    pub last_id: u64,
    pub workers: usize,
    pub timeout_ms: u64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub user_agent: String,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub sort_output: bool,
    pub title_selector: String,
    pub container_selector: String,
    pub title_placeholder: String,
}

impl Settings {
    /// Defaults < optional file < `BRACERO_*` environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("first_id", 1_i64)?
            .set_default("last_id", 3308_i64)?
            .set_default("workers", 10_i64)?
            .set_default("timeout_ms", 10_000_i64)?
            .set_default("delay_min_ms", 500_i64)?
            .set_default("delay_max_ms", 1_500_i64)?
            .set_default("user_agent", DEFAULT_USER_AGENT)?
            .set_default("output", DEFAULT_OUTPUT)?
            .set_default("format", "csv")?
            .set_default("sort_output", false)?
            .set_default("title_selector", parser::DEFAULT_TITLE_SELECTOR)?
            .set_default("container_selector", parser::DEFAULT_CONTAINER_SELECTOR)?
            .set_default("title_placeholder", parser::DEFAULT_TITLE_PLACEHOLDER)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Check invariants and produce the typed configuration a run needs.
    pub fn validate(&self) -> Result<RunConfig, ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        let range = IdRange::new(self.first_id, self.last_id)?;
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.workers > MAX_WORKERS {
            return Err(ConfigError::TooManyWorkers {
                requested: self.workers,
                max: MAX_WORKERS,
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.delay_min_ms > self.delay_max_ms {
            return Err(ConfigError::InvertedDelay {
                min_ms: self.delay_min_ms,
                max_ms: self.delay_max_ms,
            });
        }

        let extractor = ExtractorConfig {
            title_selector: self.title_selector.clone(),
            container_selector: self.container_selector.clone(),
            title_placeholder: self.title_placeholder.clone(),
        };
        Extractor::new(&extractor)?;

        Ok(RunConfig {
            fetch: FetchConfig {
                base_url: self.base_url.clone(),
                timeout: Duration::from_millis(self.timeout_ms),
                delay_min: Duration::from_millis(self.delay_min_ms),
                delay_max: Duration::from_millis(self.delay_max_ms),
                user_agent: self.user_agent.clone(),
            },
            extractor,
            range,
            workers: self.workers,
        })
    }
}

/// Inclusive range of record identifiers, never empty, never containing 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    first: u64,
    last: u64,
}

impl IdRange {
    pub fn new(first: u64, last: u64) -> Result<Self, ConfigError> {
        if first == 0 {
            return Err(ConfigError::ZeroIdentifier(first));
        }
        if first > last {
            return Err(ConfigError::EmptyRange { first, last });
        }
        Ok(Self { first, last })
    }

    pub fn first(&self) -> u64 {
        self.first
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    pub fn count(&self) -> u64 {
        self.last - self.first + 1
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<u64> {
        self.first..=self.last
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub fetch: FetchConfig,
    pub extractor: ExtractorConfig,
    pub range: IdRange,
    pub workers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Settings {
        Settings {
            base_url: DEFAULT_BASE_URL.to_string(),
            first_id: 1,
            last_id: 3308,
            workers: 10,
            timeout_ms: 10_000,
            delay_min_ms: 500,
            delay_max_ms: 1_500,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            format: OutputFormat::Csv,
            sort_output: false,
            title_selector: parser::DEFAULT_TITLE_SELECTOR.to_string(),
            container_selector: parser::DEFAULT_CONTAINER_SELECTOR.to_string(),
            title_placeholder: parser::DEFAULT_TITLE_PLACEHOLDER.to_string(),
        }
    }

    #[test]
    fn defaults_validate() {
        let run = defaults().validate().unwrap();
        assert_eq!(run.range.count(), 3308);
        assert_eq!(run.workers, 10);
        assert_eq!(run.fetch.timeout, Duration::from_secs(10));
        assert_eq!(run.fetch.delay_min, Duration::from_millis(500));
        assert_eq!(run.fetch.delay_max, Duration::from_millis(1500));
    }

    #[test]
    fn rejects_empty_range() {
        let s = Settings { first_id: 10, last_id: 9, ..defaults() };
        assert!(matches!(s.validate(), Err(ConfigError::EmptyRange { first: 10, last: 9 })));
    }

    #[test]
    fn rejects_zero_identifier() {
        let s = Settings { first_id: 0, ..defaults() };
        assert!(matches!(s.validate(), Err(ConfigError::ZeroIdentifier(0))));
    }

    #[test]
    fn rejects_zero_workers() {
        let s = Settings { workers: 0, ..defaults() };
        assert!(matches!(s.validate(), Err(ConfigError::NoWorkers)));
    }

    #[test]
    fn rejects_oversized_pool() {
        let s = Settings { workers: usize::MAX, ..defaults() };
        assert!(matches!(
            s.validate(),
            Err(ConfigError::TooManyWorkers { requested: usize::MAX, max: MAX_WORKERS })
        ));

        let s = Settings { workers: MAX_WORKERS, ..defaults() };
        assert_eq!(s.validate().unwrap().workers, MAX_WORKERS);
    }

    #[test]
    fn rejects_zero_timeout() {
        let s = Settings { timeout_ms: 0, ..defaults() };
        assert!(matches!(s.validate(), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn rejects_inverted_delay() {
        let s = Settings { delay_min_ms: 2000, delay_max_ms: 100, ..defaults() };
        assert!(matches!(s.validate(), Err(ConfigError::InvertedDelay { .. })));
    }

    #[test]
    fn rejects_bad_selector() {
        let s = Settings { container_selector: "div[".to_string(), ..defaults() };
        assert!(matches!(s.validate(), Err(ConfigError::Selector { .. })));
    }

    #[test]
    fn single_id_range() {
        let r = IdRange::new(7, 7).unwrap();
        assert_eq!(r.count(), 1);
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn load_reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bracero.toml");
        std::fs::write(
            &path,
            "first_id = 5\nlast_id = 20\nworkers = 3\nformat = \"jsonl\"\n",
        )
        .unwrap();

        let s = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(s.first_id, 5);
        assert_eq!(s.last_id, 20);
        assert_eq!(s.workers, 3);
        assert_eq!(s.format, OutputFormat::Jsonl);
        assert_eq!(s.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn example_file_is_valid() {
        let s = Settings::load(Some(Path::new("bracero.example.toml"))).unwrap();
        let run = s.validate().unwrap();
        assert_eq!(run.range.count(), 3308);
        assert_eq!(run.extractor.container_selector, "div.element-text");
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(matches!(Settings::load(Some(path.as_path())), Err(ConfigError::Load(_))));
    }
}
