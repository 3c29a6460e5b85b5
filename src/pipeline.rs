use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ConfigError;
use crate::fetcher::{FetchFailure, FetchOutcome, Fetcher};
use crate::parser::Extractor;
use crate::record::{ExtractedRecord, ResultSet};
use crate::settings::{IdRange, MAX_WORKERS};

/// Terminal state of one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Record(ExtractedRecord),
    Empty,
    Failed(FetchFailure),
}

/// Sent by a worker once an identifier has resolved.
#[derive(Debug, Clone)]
pub struct Completion {
    pub id: u64,
    pub resolution: Resolution,
}

/// Counters for one run. `failures` is keyed by failure label.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub requested: u64,
    pub dispatched: u64,
    pub records: u64,
    pub empty: u64,
    pub failed: u64,
    pub failures: BTreeMap<String, u64>,
    pub not_dispatched: u64,
    pub cancelled: bool,
}

impl RunSummary {
    fn new(requested: u64) -> Self {
        Self {
            requested,
            ..Self::default()
        }
    }

    fn record(&mut self, resolution: &Resolution) {
        self.dispatched += 1;
        match resolution {
            Resolution::Record(_) => self.records += 1,
            Resolution::Empty => self.empty += 1,
            Resolution::Failed(cause) => {
                self.failed += 1;
                *self.failures.entry(cause.label()).or_default() += 1;
            }
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records from {} attempted identifiers ({} without dialogue, {} failed)",
            self.records, self.dispatched, self.empty, self.failed
        )?;
        if self.not_dispatched > 0 {
            write!(f, ", {} not dispatched", self.not_dispatched)?;
        }
        Ok(())
    }
}

pub struct PipelineOutput {
    pub results: ResultSet,
    pub summary: RunSummary,
}

/// Fixed pool of workers draining an identifier queue.
pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<Extractor>,
    workers: usize,
}

impl Pipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, extractor: Extractor, workers: usize) -> Self {
        Self {
            fetcher,
            extractor: Arc::new(extractor),
            workers,
        }
    }

    #[cfg(test)]
    pub async fn run(
        &self,
        range: IdRange,
        cancel: CancellationToken,
    ) -> Result<PipelineOutput, ConfigError> {
        self.run_with(range, cancel, |_| {}).await
    }

    /// Run the whole range. `on_complete` sees every completion in arrival
    /// order. Returns once every dispatched identifier has resolved.
    pub async fn run_with<P>(
        &self,
        range: IdRange,
        cancel: CancellationToken,
        mut on_complete: P,
    ) -> Result<PipelineOutput, ConfigError>
    where
        P: FnMut(&Completion),
    {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.workers > MAX_WORKERS {
            return Err(ConfigError::TooManyWorkers {
                requested: self.workers,
                max: MAX_WORKERS,
            });
        }

        info!(
            first = range.first(),
            last = range.last(),
            workers = self.workers,
            "starting run"
        );

        let (id_tx, id_rx) = mpsc::channel::<u64>(self.workers);
        let id_rx = Arc::new(Mutex::new(id_rx));
        let (done_tx, mut done_rx) = mpsc::channel::<Completion>(self.workers * 2);

        let dispatcher = tokio::spawn(dispatch(range, id_tx, cancel.clone()));

        let mut handles = Vec::with_capacity(self.workers);
        for worker in 0..self.workers {
            handles.push(tokio::spawn(work(
                worker,
                Arc::clone(&self.fetcher),
                Arc::clone(&self.extractor),
                Arc::clone(&id_rx),
                done_tx.clone(),
                cancel.clone(),
            )));
        }

        // rx closes once every worker has dropped its sender
        drop(done_tx);

        let mut results = ResultSet::new();
        let mut summary = RunSummary::new(range.count());

        while let Some(completion) = done_rx.recv().await {
            on_complete(&completion);
            summary.record(&completion.resolution);

            match completion.resolution {
                Resolution::Record(record) => {
                    if !results.insert(record) {
                        error!(id = completion.id, "identifier resolved twice");
                    }
                }
                Resolution::Empty => debug!(id = completion.id, "no dialogue"),
                Resolution::Failed(_) => {}
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("worker task failed: {}", e);
            }
        }
        match dispatcher.await {
            Ok(queued) => debug!(queued, "dispatcher finished"),
            Err(e) => error!("dispatcher task failed: {}", e),
        }

        summary.not_dispatched = summary.requested - summary.dispatched;
        summary.cancelled = cancel.is_cancelled();
        if summary.cancelled {
            warn!(
                dispatched = summary.dispatched,
                not_dispatched = summary.not_dispatched,
                "run cancelled, in-flight work drained"
            );
        }
        info!("{}", summary);

        Ok(PipelineOutput { results, summary })
    }
}

/// Enqueue every identifier once, stopping early on cancellation.
async fn dispatch(range: IdRange, tx: mpsc::Sender<u64>, cancel: CancellationToken) -> u64 {
    let mut queued = 0;
    for id in range.iter() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(id) => {
                if sent.is_err() {
                    break;
                }
                queued += 1;
            }
        }
    }
    queued
}

async fn work(
    worker: usize,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<Extractor>,
    queue: Arc<Mutex<mpsc::Receiver<u64>>>,
    done: mpsc::Sender<Completion>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                id = rx.recv() => id,
            }
        };
        let Some(id) = next else {
            break;
        };

        let resolution = resolve(fetcher.as_ref(), &extractor, id).await;
        if done.send(Completion { id, resolution }).await.is_err() {
            break;
        }
    }
    debug!(worker, "worker done");
}

/// Fetch one identifier and extract it. Never fails: errors become
/// `Resolution::Failed`.
pub async fn resolve(fetcher: &dyn Fetcher, extractor: &Extractor, id: u64) -> Resolution {
    match fetcher.fetch(id).await {
        FetchOutcome::Success { id, url, payload } => match extractor.extract(id, &payload, &url) {
            Some(record) => Resolution::Record(record),
            None => Resolution::Empty,
        },
        FetchOutcome::Failure { id, cause } => {
            debug!(id, %cause, "dropped");
            Resolution::Failed(cause)
        }
    }
}
