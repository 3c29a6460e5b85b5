use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::OutputError;
use crate::output::OutputFormat;
use crate::pipeline::RunSummary;
use crate::settings::RunConfig;

/// JSON sidecar describing one run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub base_url: String,
    pub first_id: u64,
    pub last_id: u64,
    pub workers: usize,
    pub output: String,
    pub format: &'static str,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(
        run: &RunConfig,
        started_at: DateTime<Utc>,
        output: &Path,
        format: OutputFormat,
        summary: RunSummary,
    ) -> Self {
        let finished_at = Utc::now();
        let elapsed_secs = (finished_at - started_at).num_milliseconds() as f64 / 1000.0;
        Self {
            started_at,
            finished_at,
            elapsed_secs,
            base_url: run.fetch.base_url.clone(),
            first_id: run.range.first(),
            last_id: run.range.last(),
            workers: run.workers,
            output: output.display().to_string(),
            format: format.as_str(),
            summary,
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), OutputError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| OutputError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ExtractorConfig;
    use crate::settings::{FetchConfig, IdRange};
    use std::time::Duration;

    #[test]
    fn report_round_trips_as_json() {
        let run = RunConfig {
            fetch: FetchConfig {
                base_url: "https://braceroarchive.org/items/show/".to_string(),
                timeout: Duration::from_secs(10),
                delay_min: Duration::from_millis(500),
                delay_max: Duration::from_millis(1500),
                user_agent: "test".to_string(),
            },
            extractor: ExtractorConfig::default(),
            range: IdRange::new(1, 50).unwrap(),
            workers: 10,
        };
        let mut summary = RunSummary::default();
        summary.requested = 50;
        summary.dispatched = 50;
        summary.records = 12;
        summary.failures.insert("http_404".to_string(), 3);

        let started = Utc::now() - chrono::Duration::seconds(5);
        let report = RunReport::new(&run, started, Path::new("out.csv"), OutputFormat::Csv, summary);
        assert!(report.elapsed_secs >= 5.0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write(&path).unwrap();

        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["last_id"], 50);
        assert_eq!(v["format"], "csv");
        assert_eq!(v["summary"]["records"], 12);
        assert_eq!(v["summary"]["failures"]["http_404"], 3);
    }
}
