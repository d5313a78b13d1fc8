//! Arena-style storage for students, propositions and actions.
//!
//! Propositions and actions live in flat vectors indexed by their ids; every
//! cross reference (current proposition, superseded-by chain, owning
//! proposition of an action) is a plain id, never an owning pointer.

mod file;
mod memory;

pub use file::JsonFileRepository;
pub use memory::InMemoryAdmissionRepository;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::catalog::ClassCode;
use super::domain::{Action, ActionId, FileNumber, Proposition, PropositionId, Student};
use super::importer::ImportRunSummary;
use super::push::PushLogEntry;

/// Most recent push calls kept in the ledger; older entries are dropped.
pub const PUSH_LOG_RETAINED: usize = 5_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionStore {
    students: BTreeMap<FileNumber, Student>,
    propositions: Vec<Proposition>,
    actions: Vec<Action>,
    #[serde(default)]
    import_runs: Vec<ImportRunSummary>,
    #[serde(default)]
    push_log: Vec<PushLogEntry>,
}

impl AdmissionStore {
    pub fn student(&self, file_number: FileNumber) -> Option<&Student> {
        self.students.get(&file_number)
    }

    pub(crate) fn student_mut(&mut self, file_number: FileNumber) -> Option<&mut Student> {
        self.students.get_mut(&file_number)
    }

    pub fn students(&self) -> impl Iterator<Item = &Student> {
        self.students.values()
    }

    pub(crate) fn insert_student(&mut self, student: Student) {
        self.students.insert(student.file_number, student);
    }

    pub fn proposition(&self, id: PropositionId) -> Option<&Proposition> {
        usize::try_from(id.0)
            .ok()
            .and_then(|index| self.propositions.get(index))
    }

    pub(crate) fn proposition_mut(&mut self, id: PropositionId) -> Option<&mut Proposition> {
        usize::try_from(id.0)
            .ok()
            .and_then(|index| self.propositions.get_mut(index))
    }

    pub fn next_proposition_id(&self) -> PropositionId {
        PropositionId(self.propositions.len() as u64)
    }

    /// Appends a proposition, overwriting its id with the next arena slot.
    pub(crate) fn insert_proposition(&mut self, mut proposition: Proposition) -> PropositionId {
        let id = self.next_proposition_id();
        proposition.id = id;
        self.propositions.push(proposition);
        id
    }

    pub fn propositions(&self) -> &[Proposition] {
        &self.propositions
    }

    /// Every proposition recorded for the student, oldest first.
    pub fn propositions_for(&self, file_number: FileNumber) -> impl Iterator<Item = &Proposition> {
        self.propositions
            .iter()
            .filter(move |proposition| proposition.student == file_number)
    }

    pub fn latest_proposition(&self, file_number: FileNumber) -> Option<&Proposition> {
        self.propositions_for(file_number).last()
    }

    /// The student's current proposition when it is still in force.
    pub fn active_proposition(&self, file_number: FileNumber) -> Option<&Proposition> {
        self.student(file_number)
            .and_then(|student| student.current_proposition)
            .and_then(|id| self.proposition(id))
            .filter(|proposition| proposition.is_active())
    }

    pub fn active_in_class<'a>(
        &'a self,
        class: &'a ClassCode,
    ) -> impl Iterator<Item = (&'a Student, &'a Proposition)> + 'a {
        self.students.values().filter_map(move |student| {
            self.active_proposition(student.file_number)
                .filter(|proposition| &proposition.class == class)
                .map(|proposition| (student, proposition))
        })
    }

    pub fn action(&self, id: ActionId) -> Option<&Action> {
        usize::try_from(id.0)
            .ok()
            .and_then(|index| self.actions.get(index))
    }

    pub(crate) fn action_mut(&mut self, id: ActionId) -> Option<&mut Action> {
        usize::try_from(id.0)
            .ok()
            .and_then(|index| self.actions.get_mut(index))
    }

    pub(crate) fn push_action(&mut self, mut action: Action) -> ActionId {
        let id = ActionId(self.actions.len() as u64);
        action.id = id;
        self.actions.push(action);
        id
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn actions_for(&self, file_number: FileNumber) -> impl Iterator<Item = &Action> {
        self.actions
            .iter()
            .filter(move |action| action.student == file_number)
    }

    pub fn import_runs(&self) -> &[ImportRunSummary] {
        &self.import_runs
    }

    pub(crate) fn record_import_run(&mut self, mut run: ImportRunSummary) -> u64 {
        let id = self.import_runs.len() as u64 + 1;
        run.id = id;
        self.import_runs.push(run);
        id
    }

    pub fn push_log(&self) -> &[PushLogEntry] {
        &self.push_log
    }

    pub(crate) fn record_push(&mut self, entry: PushLogEntry) {
        self.push_log.push(entry);
        if self.push_log.len() > PUSH_LOG_RETAINED {
            let excess = self.push_log.len() - PUSH_LOG_RETAINED;
            self.push_log.drain(..excess);
        }
    }
}

/// Storage abstraction; every mutation goes through one atomic transaction.
pub trait AdmissionRepository: Send + Sync {
    /// Runs a read-only view over the committed state.
    fn read<T>(&self, view: impl FnOnce(&AdmissionStore) -> T) -> Result<T, RepositoryError>;

    /// Runs `work` against a working copy; the copy is committed only on `Ok`.
    fn transaction<T, E>(
        &self,
        work: impl FnOnce(&mut AdmissionStore) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("store file i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}
