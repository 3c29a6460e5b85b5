use thiserror::Error;

/// Invalid run configuration. Always fatal, raised before any work is dispatched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("identifier range is empty ({first}..={last})")]
    EmptyRange { first: u64, last: u64 },

    #[error("record identifiers start at 1, got {0}")]
    ZeroIdentifier(u64),

    #[error("worker pool size must be at least 1")]
    NoWorkers,

    #[error("worker pool size {requested} exceeds the limit of {max}")]
    TooManyWorkers { requested: usize, max: usize },

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("politeness delay interval is inverted ({min_ms}ms > {max_ms}ms)")]
    InvertedDelay { min_ms: u64, max_ms: u64 },

    #[error("base url is empty")]
    EmptyBaseUrl,

    #[error("invalid selector {css:?}: {reason}")]
    Selector { css: String, reason: String },
}

/// Errors writing the output table.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
