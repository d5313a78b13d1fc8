//! Append-only log of administrative actions and the resignation procedure.
//!
//! Actions only ever move out of `todo`; once done, cancelled or marked not
//! applicable they are never reopened.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

use super::domain::{
    Action, ActionCategory, ActionId, ActionState, FileNumber, Proposition, PropositionId,
    Student,
};
use super::store::AdmissionStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("proposition {0:?} not found")]
    PropositionNotFound(PropositionId),
    #[error("action {0} not found")]
    ActionNotFound(ActionId),
    #[error("student {0} not found")]
    StudentNotFound(FileNumber),
}

/// What a resignation request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResignationTarget {
    /// The student's active proposition, or their latest one if none is active.
    Student(FileNumber),
    Proposition(PropositionId),
}

/// Everything recorded for one student, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentHistory {
    pub student: Student,
    pub active_proposition: Option<PropositionId>,
    pub propositions: Vec<Proposition>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResignationOutcome {
    Recorded {
        proposition: PropositionId,
        resignation_action: ActionId,
        cancelled: Vec<ActionId>,
    },
    AlreadyResigned {
        proposition: PropositionId,
    },
    NoProposition,
}

impl AdmissionStore {
    /// Appends a new `todo` action for the proposition's student.
    pub fn schedule(
        &mut self,
        proposition: PropositionId,
        category: ActionCategory,
        at: NaiveDateTime,
        note: impl Into<String>,
    ) -> Result<ActionId, LedgerError> {
        let student = self
            .proposition(proposition)
            .ok_or(LedgerError::PropositionNotFound(proposition))?
            .student;

        let id = self.push_action(Action {
            id: ActionId(0),
            proposition,
            student,
            category,
            scheduled_at: at,
            completed_at: None,
            state: ActionState::Todo,
            note: note.into(),
        });
        debug!(action = %id, student = %student, category = category.label(), "action scheduled");
        Ok(id)
    }

    /// Marks a `todo` action as done; returns whether anything changed.
    pub fn complete(&mut self, action: ActionId, at: NaiveDateTime) -> Result<bool, LedgerError> {
        self.close_action(action, at, ActionState::Done)
    }

    /// Marks a `todo` action as cancelled; returns whether anything changed.
    pub fn cancel(&mut self, action: ActionId, at: NaiveDateTime) -> Result<bool, LedgerError> {
        self.close_action(action, at, ActionState::Cancelled)
    }

    /// Staff decided there is nothing to do for this action.
    pub fn mark_not_applicable(
        &mut self,
        action: ActionId,
        at: NaiveDateTime,
    ) -> Result<bool, LedgerError> {
        self.close_action(action, at, ActionState::NotApplicable)
    }

    fn close_action(
        &mut self,
        id: ActionId,
        at: NaiveDateTime,
        state: ActionState,
    ) -> Result<bool, LedgerError> {
        let action = self.action_mut(id).ok_or(LedgerError::ActionNotFound(id))?;
        if action.state != ActionState::Todo {
            return Ok(false);
        }

        action.state = state;
        action.completed_at = Some(at);
        Ok(true)
    }

    /// Cancels every `todo` action of the student matching `filter`.
    pub(crate) fn cancel_todo_where(
        &mut self,
        student: FileNumber,
        at: NaiveDateTime,
        filter: impl Fn(&Action) -> bool,
    ) -> Vec<ActionId> {
        let targets: Vec<ActionId> = self
            .actions_for(student)
            .filter(|action| action.is_todo() && filter(action))
            .map(|action| action.id)
            .collect();

        for id in &targets {
            if let Some(action) = self.action_mut(*id) {
                action.state = ActionState::Cancelled;
                action.completed_at = Some(at);
            }
        }
        targets
    }

    /// Whether the student has an action of `category` in one of `states`.
    pub fn has_action(
        &self,
        student: FileNumber,
        category: ActionCategory,
        states: &[ActionState],
    ) -> bool {
        self.actions_for(student)
            .any(|action| action.category == category && states.contains(&action.state))
    }

    /// Records a resignation; repeated calls never add a second resignation action.
    pub fn resign(
        &mut self,
        target: ResignationTarget,
        at: NaiveDateTime,
    ) -> Result<ResignationOutcome, LedgerError> {
        let proposition_id = match target {
            ResignationTarget::Proposition(id) => id,
            ResignationTarget::Student(file_number) => {
                let student = self
                    .student(file_number)
                    .ok_or(LedgerError::StudentNotFound(file_number))?;
                let current = student
                    .current_proposition
                    .or_else(|| self.latest_proposition(file_number).map(|p| p.id));
                match current {
                    Some(id) => id,
                    None => return Ok(ResignationOutcome::NoProposition),
                }
            }
        };

        let proposition = self
            .proposition_mut(proposition_id)
            .ok_or(LedgerError::PropositionNotFound(proposition_id))?;
        if proposition.resigned_at.is_some() {
            return Ok(ResignationOutcome::AlreadyResigned {
                proposition: proposition_id,
            });
        }
        proposition.resigned_at = Some(at);
        let student = proposition.student;

        let cancelled = self.cancel_todo_where(student, at, |action| {
            action.category != ActionCategory::Resignation
        });
        let resignation_action =
            self.schedule(proposition_id, ActionCategory::Resignation, at, "")?;

        if let Some(record) = self.student_mut(student) {
            if record.current_proposition == Some(proposition_id) {
                record.current_proposition = None;
            }
        }

        info!(student = %student, cancelled = cancelled.len(), "resignation recorded");
        Ok(ResignationOutcome::Recorded {
            proposition: proposition_id,
            resignation_action,
            cancelled,
        })
    }

    /// Flags the proposition as fully registered and closes its registration work.
    pub fn mark_registered(
        &mut self,
        proposition: PropositionId,
        at: NaiveDateTime,
    ) -> Result<Vec<ActionId>, LedgerError> {
        let record = self
            .proposition_mut(proposition)
            .ok_or(LedgerError::PropositionNotFound(proposition))?;
        record.registration_complete = true;

        let targets: Vec<ActionId> = self
            .actions()
            .iter()
            .filter(|action| {
                action.proposition == proposition
                    && action.category == ActionCategory::Register
                    && action.is_todo()
            })
            .map(|action| action.id)
            .collect();
        for id in &targets {
            self.complete(*id, at)?;
        }
        Ok(targets)
    }

    /// Open work, oldest first.
    pub fn todo_actions(&self) -> Vec<&Action> {
        let mut todo: Vec<&Action> = self.actions().iter().filter(|a| a.is_todo()).collect();
        todo.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));
        todo
    }

    pub fn actions_for_student(&self, file_number: FileNumber) -> Vec<&Action> {
        self.actions_for(file_number).collect()
    }

    pub fn student_history(&self, file_number: FileNumber) -> Option<StudentHistory> {
        let student = self.student(file_number)?.clone();
        Some(StudentHistory {
            active_proposition: self.active_proposition(file_number).map(|p| p.id),
            propositions: self.propositions_for(file_number).cloned().collect(),
            actions: self.actions_for(file_number).cloned().collect(),
            student,
        })
    }
}
