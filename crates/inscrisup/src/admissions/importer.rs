//! One full reconciliation pass over every configured class.
//!
//! All lists are fetched and normalized before the store is touched; the
//! offers are then applied in a single transaction in file-number order.
//! Candidates known to the store but missing from the batch are resigned.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::catalog::ClassCode;
use super::domain::{AdmissionOffer, FileNumber, OfferState};
use super::ledger::{ResignationOutcome, ResignationTarget};
use super::normalize::{deduplicate, normalize_scraped};
use super::reconcile::{ReconcileError, ReconciliationEngine, ReconciliationResult};
use super::source::{SourceError, SourceFetcher};
use super::store::{AdmissionRepository, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("reconciliation aborted: {0}")]
    Reconcile(#[from] ReconcileError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunOutcome {
    Ok,
    Failed,
}

/// A row or offer that was rejected while the rest of the batch went on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFailure {
    pub file_number: Option<FileNumber>,
    pub class: ClassCode,
    pub reason: String,
}

/// Durable record of one import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRunSummary {
    pub id: u64,
    pub source: String,
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
    pub outcome: RunOutcome,
    pub applied: usize,
    pub absence_resignations: usize,
    pub failures: Vec<ImportFailure>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub run_id: u64,
    pub results: Vec<ReconciliationResult>,
    pub failures: Vec<ImportFailure>,
    pub absence_resignations: Vec<FileNumber>,
}

struct FetchedBatch {
    offers: Vec<AdmissionOffer>,
    seen: BTreeSet<FileNumber>,
    failures: Vec<ImportFailure>,
}

struct AppliedBatch {
    results: Vec<ReconciliationResult>,
    failures: Vec<ImportFailure>,
    absence_resignations: Vec<FileNumber>,
}

pub struct BatchImporter<R, F> {
    repository: Arc<R>,
    fetcher: F,
    engine: Arc<ReconciliationEngine>,
}

impl<R, F> BatchImporter<R, F>
where
    R: AdmissionRepository,
    F: SourceFetcher,
{
    pub fn new(repository: Arc<R>, fetcher: F, engine: Arc<ReconciliationEngine>) -> Self {
        Self {
            repository,
            fetcher,
            engine,
        }
    }

    /// Runs one pass as of `now`. The run summary is recorded even when the
    /// pass itself fails.
    pub fn run(&self, now: NaiveDateTime) -> Result<ImportReport, ImportError> {
        let clock = Instant::now();
        info!(
            source = self.fetcher.kind(),
            classes = self.engine.catalog().len(),
            "import run started"
        );

        let outcome = self.fetch(now).and_then(|batch| self.apply(batch, now));
        let elapsed =
            chrono::Duration::from_std(clock.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        let ended_at = now + elapsed;

        let summary = match &outcome {
            Ok(applied) => ImportRunSummary {
                id: 0,
                source: self.fetcher.kind().to_string(),
                started_at: now,
                ended_at,
                outcome: RunOutcome::Ok,
                applied: applied.results.len(),
                absence_resignations: applied.absence_resignations.len(),
                failures: applied.failures.clone(),
                error: None,
            },
            Err(err) => ImportRunSummary {
                id: 0,
                source: self.fetcher.kind().to_string(),
                started_at: now,
                ended_at,
                outcome: RunOutcome::Failed,
                applied: 0,
                absence_resignations: 0,
                failures: Vec::new(),
                error: Some(err.to_string()),
            },
        };
        let run_id = self
            .repository
            .transaction(|store| Ok::<_, RepositoryError>(store.record_import_run(summary)))?;

        match outcome {
            Ok(applied) => {
                info!(
                    run = run_id,
                    applied = applied.results.len(),
                    rejected = applied.failures.len(),
                    absent = applied.absence_resignations.len(),
                    "import run finished"
                );
                Ok(ImportReport {
                    run_id,
                    results: applied.results,
                    failures: applied.failures,
                    absence_resignations: applied.absence_resignations,
                })
            }
            Err(err) => {
                warn!(run = run_id, error = %err, "import run failed");
                Err(err)
            }
        }
    }

    fn fetch(&self, now: NaiveDateTime) -> Result<FetchedBatch, ImportError> {
        let mut batch = FetchedBatch {
            offers: Vec::new(),
            seen: BTreeSet::new(),
            failures: Vec::new(),
        };

        for class in self.engine.catalog().iter() {
            let addresses = self.fetcher.fetch_address_file(&class.code)?;
            for state in OfferState::ordered() {
                for row in self.fetcher.fetch_offers(&class.code, state)? {
                    let normalized =
                        row.and_then(|row| normalize_scraped(&row, &class.code, state, now.year()));
                    match normalized {
                        Ok(mut offer) => {
                            if let Some(record) = addresses.get(&offer.file_number) {
                                record.enrich(&mut offer);
                            }
                            batch.seen.insert(offer.file_number);
                            batch.offers.push(offer);
                        }
                        Err(err) => {
                            warn!(class = %class.code, error = %err, "rejected admission row");
                            // A readable file number still proves presence in the batch.
                            if let Some(file_number) = err.file_number {
                                batch.seen.insert(file_number);
                            }
                            batch.failures.push(ImportFailure {
                                file_number: err.file_number,
                                class: class.code.clone(),
                                reason: err.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(batch)
    }

    fn apply(&self, batch: FetchedBatch, now: NaiveDateTime) -> Result<AppliedBatch, ImportError> {
        let FetchedBatch {
            offers,
            seen,
            mut failures,
        } = batch;
        let offers: BTreeMap<FileNumber, AdmissionOffer> = deduplicate(offers);

        self.repository.transaction(|store| {
            let mut results = Vec::with_capacity(offers.len());
            for offer in offers.values() {
                match self.engine.apply_offer(store, offer) {
                    Ok(result) => results.push(result),
                    Err(err @ ReconcileError::UnknownClass { .. }) => {
                        warn!(student = %offer.file_number, error = %err, "offer rejected");
                        failures.push(ImportFailure {
                            file_number: Some(offer.file_number),
                            class: offer.class.clone(),
                            reason: err.to_string(),
                        });
                    }
                    Err(err) => return Err(ImportError::from(err)),
                }
            }

            let absent: Vec<FileNumber> = store
                .students()
                .filter(|student| !seen.contains(&student.file_number))
                .filter(|student| store.active_proposition(student.file_number).is_some())
                .map(|student| student.file_number)
                .collect();

            let mut absence_resignations = Vec::new();
            for file_number in absent {
                let outcome = store
                    .resign(ResignationTarget::Student(file_number), now)
                    .map_err(ReconcileError::from)?;
                if let ResignationOutcome::Recorded { .. } = outcome {
                    warn!(student = %file_number, "absent from batch, resigned");
                    absence_resignations.push(file_number);
                }
            }

            Ok(AppliedBatch {
                results,
                failures,
                absence_resignations,
            })
        })
    }
}
