mod db;
mod error;
mod fetcher;
mod output;
mod parser;
mod pipeline;
mod record;
mod report;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use fetcher::{Fetcher, HttpFetcher};
use output::OutputFormat;
use parser::Extractor;
use pipeline::{Pipeline, Resolution};
use settings::Settings;

#[derive(Parser)]
#[command(name = "bracero_scraper", about = "Bracero History Archive interview scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and extract a range of records into one table
    Run(RunArgs),
    /// Fetch and extract a single record, printed as JSON
    Fetch {
        id: u64,
        /// Settings file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run the extractor over a saved HTML page
    Extract {
        file: PathBuf,
        #[arg(long, default_value = "0")]
        id: u64,
        #[arg(long, default_value = "")]
        url: String,
    },
    /// Summarize a SQLite output table
    Stats { path: PathBuf },
}

#[derive(Args)]
struct RunArgs {
    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// First record identifier
    #[arg(long)]
    first: Option<u64>,
    /// Last record identifier (inclusive)
    #[arg(long)]
    last: Option<u64>,
    /// Concurrent workers
    #[arg(short, long)]
    workers: Option<usize>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long)]
    delay_min_ms: Option<u64>,
    #[arg(long)]
    delay_max_ms: Option<u64>,
    /// URL template; `{id}` is replaced, otherwise the id is appended
    #[arg(long)]
    base_url: Option<String>,
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// Sort rows by record number before writing
    #[arg(long)]
    sort: bool,
    /// Write a JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,
}

impl RunArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(v) = self.first {
            settings.first_id = v;
        }
        if let Some(v) = self.last {
            settings.last_id = v;
        }
        if let Some(v) = self.workers {
            settings.workers = v;
        }
        if let Some(v) = self.timeout_ms {
            settings.timeout_ms = v;
        }
        if let Some(v) = self.delay_min_ms {
            settings.delay_min_ms = v;
        }
        if let Some(v) = self.delay_max_ms {
            settings.delay_max_ms = v;
        }
        if let Some(v) = &self.base_url {
            settings.base_url = v.clone();
        }
        if let Some(v) = &self.output {
            settings.output = v.clone();
        }
        if let Some(v) = self.format {
            settings.format = v;
        }
        if self.sort {
            settings.sort_output = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Fetch { id, config } => {
            let settings = Settings::load(config.as_deref())?;
            let run = settings.validate()?;
            let fetcher = HttpFetcher::new(&run.fetch)?;
            let extractor = Extractor::new(&run.extractor)?;

            match pipeline::resolve(&fetcher, &extractor, id).await {
                Resolution::Record(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                Resolution::Empty => println!("{}: no dialogue found", fetcher.url_for(id)),
                Resolution::Failed(cause) => println!("{}: {}", fetcher.url_for(id), cause),
            }
            Ok(())
        }
        Commands::Extract { file, id, url } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            match Extractor::default().extract(id, &html, &url) {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("No dialogue found in {}", file.display()),
            }
            Ok(())
        }
        Commands::Stats { path } => {
            let conn = db::connect(&path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Rows:       {}", s.rows);
            if let (Some(first), Some(last)) = (s.first_id, s.last_id) {
                println!("Records:    {}..={}", first, last);
            }
            if let Some(avg) = s.avg_chars {
                println!("Avg chars:  {:.0}", avg);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply(&mut settings);
    let run = settings.validate()?;

    let fetcher = Arc::new(HttpFetcher::new(&run.fetch)?);
    let extractor = Extractor::new(&run.extractor)?;
    let pipeline = Pipeline::new(fetcher, extractor, run.workers);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: finishing in-flight requests");
            on_signal.cancel();
        }
    });

    println!(
        "Fetching records {}..={} with {} workers...",
        run.range.first(),
        run.range.last(),
        run.workers
    );

    let pb = ProgressBar::new(run.range.count());
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta}) {msg}")?
            .progress_chars("=> "),
    );

    let started_at = chrono::Utc::now();
    let mut found = 0u64;
    let out = pipeline
        .run_with(run.range, cancel, |c| {
            if matches!(c.resolution, Resolution::Record(_)) {
                found += 1;
                pb.set_message(format!("{} interviews", found));
            }
            pb.inc(1);
        })
        .await?;
    pb.finish_and_clear();

    let mut results = out.results;
    if settings.sort_output {
        results.sort_by_id();
    }

    let written = output::write_table(settings.format, &settings.output, results.records())?;
    println!("{}", out.summary);
    if results.is_empty() {
        println!("No interviews extracted; {}.", settings.format.empty_note());
    }
    println!("Saved {} rows to {}", written, settings.output.display());

    if let Some(path) = &args.report {
        let report = report::RunReport::new(
            &run,
            started_at,
            &settings.output,
            settings.format,
            out.summary,
        );
        report.write(path)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
