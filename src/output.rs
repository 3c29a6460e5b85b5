use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::db;
use crate::error::OutputError;
use crate::record::ExtractedRecord;

/// Serialized form of the output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Header row plus one row per record
    Csv,
    /// One JSON object per line
    Jsonl,
    /// `interviews` table in a SQLite database
    Sqlite,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Sqlite => "sqlite",
        }
    }

    /// What an empty run leaves behind in this format.
    pub fn empty_note(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "the file has a header row only",
            OutputFormat::Jsonl => "the file is empty",
            OutputFormat::Sqlite => "the interviews table has no rows",
        }
    }
}

/// Write `records` to `path`, creating parent directories as needed.
/// Returns the number of rows written.
pub fn write_table(
    format: OutputFormat,
    path: &Path,
    records: &[ExtractedRecord],
) -> Result<usize, OutputError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| OutputError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let written = match format {
        OutputFormat::Csv => write_csv(path, records)?,
        OutputFormat::Jsonl => write_jsonl(path, records)?,
        OutputFormat::Sqlite => {
            let conn = db::connect(path)?;
            db::init_schema(&conn)?;
            db::save_records(&conn, records)?
        }
    };

    info!(path = %path.display(), format = format.as_str(), rows = written, "table written");
    Ok(written)
}

fn write_csv(path: &Path, records: &[ExtractedRecord]) -> Result<usize, OutputError> {
    let mut writer = csv::Writer::from_path(path)?;
    if records.is_empty() {
        // serialize() emits the header lazily; keep the columns for empty runs.
        writer.write_record(["Record Number", "Title", "Interview Text", "URL"])?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|source| OutputError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(records.len())
}

fn write_jsonl(path: &Path, records: &[ExtractedRecord]) -> Result<usize, OutputError> {
    let io_err = |source| OutputError::Io {
        path: path.display().to_string(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n").map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;
    Ok(records.len())
}
