//! Parcoursup admission tracking: offers in, students, propositions and
//! follow-up actions out.

pub mod catalog;
pub mod domain;
pub mod export;
pub mod importer;
pub mod ledger;
pub mod normalize;
pub mod push;
pub mod reconcile;
pub mod source;
pub mod store;

pub use catalog::{ClassCatalog, ClassCode, ClassConfig, ClassOverview};
pub use domain::{
    Action, ActionCategory, ActionId, ActionState, AdmissionOffer, FileNumber, OfferState,
    Proposition, PropositionId, PropositionStatus, Student,
};
pub use importer::{BatchImporter, ImportError, ImportReport, ImportRunSummary, RunOutcome};
pub use ledger::{LedgerError, ResignationOutcome, ResignationTarget, StudentHistory};
pub use push::{push_router, PushError, PushService};
pub use reconcile::{
    BoardingPacketGuard, ManualProposition, ReconcileError, ReconciliationEngine,
    ReconciliationOutcome, ReconciliationResult,
};
pub use source::{CsvExportFetcher, ListRow, SourceError, SourceFetcher};
pub use store::{
    AdmissionRepository, AdmissionStore, InMemoryAdmissionRepository, JsonFileRepository,
    RepositoryError,
};

use chrono::NaiveDateTime;

/// Wall-clock time of the school; every stored timestamp is local.
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
