//! State machine applying one admission offer to the ledger.
//!
//! The transition depends on how the offer relates to the student's active
//! proposition: there is none, it describes the same placement (class and
//! boarding), or it describes a different one.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::catalog::{ClassCatalog, ClassCode};
use super::domain::{
    ActionCategory, ActionId, ActionState, AdmissionOffer, ContactDetails, FileNumber,
    OfferState, Proposition, PropositionId, PropositionStatus, Student,
};
use super::ledger::{LedgerError, ResignationOutcome, ResignationTarget};
use super::store::AdmissionStore;

pub(crate) const NOTE_CLASS_CHANGE: &str = "student changed class";
pub(crate) const NOTE_BOARDING_RENOUNCED: &str = "student gave up boarding";

/// When a boarding-school packet is due after boarding is granted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoardingPacketGuard {
    /// Skip it while an enrollment packet is still waiting to be sent.
    #[default]
    PendingSendPacket,
    /// Always schedule it.
    Always,
}

impl BoardingPacketGuard {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending-send-packet" | "pending" => Some(Self::PendingSendPacket),
            "always" => Some(Self::Always),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// Resignation for a candidate with nothing active.
    Ignored,
    /// First offer ever seen for this candidate.
    Created,
    /// Known candidate without an active proposition accepted again.
    Upgraded,
    /// Same placement, better status.
    StatusOnly,
    /// Same placement, nothing to change.
    Unchanged,
    /// Materially different placement replaced the active proposition.
    Superseded,
    Resigned,
}

impl ReconciliationOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Created => "created",
            Self::Upgraded => "upgraded",
            Self::StatusOnly => "status-only",
            Self::Unchanged => "unchanged",
            Self::Superseded => "superseded",
            Self::Resigned => "resigned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub file_number: FileNumber,
    pub outcome: ReconciliationOutcome,
    pub proposition: Option<PropositionId>,
    pub scheduled: Vec<ActionId>,
    pub cancelled: Vec<ActionId>,
}

impl ReconciliationResult {
    fn new(file_number: FileNumber, outcome: ReconciliationOutcome) -> Self {
        Self {
            file_number,
            outcome,
            proposition: None,
            scheduled: Vec::new(),
            cancelled: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("offer for {file_number} targets unknown class '{class}'")]
    UnknownClass {
        file_number: FileNumber,
        class: ClassCode,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// A proposition entered by staff for a student already in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManualProposition {
    pub file_number: FileNumber,
    pub class: ClassCode,
    pub status: PropositionStatus,
    #[serde(default)]
    pub boarding: bool,
    #[serde(default)]
    pub gap_year: bool,
    /// Defaults to the time the proposition is recorded.
    #[serde(default)]
    pub offered_at: Option<NaiveDateTime>,
}

pub struct ReconciliationEngine {
    catalog: ClassCatalog,
    boarding_guard: BoardingPacketGuard,
}

impl ReconciliationEngine {
    pub fn new(catalog: ClassCatalog, boarding_guard: BoardingPacketGuard) -> Self {
        Self {
            catalog,
            boarding_guard,
        }
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// Applies one offer. Rejections happen before any mutation.
    pub fn apply_offer(
        &self,
        store: &mut AdmissionStore,
        offer: &AdmissionOffer,
    ) -> Result<ReconciliationResult, ReconcileError> {
        if !self.catalog.contains(&offer.class) {
            return Err(ReconcileError::UnknownClass {
                file_number: offer.file_number,
                class: offer.class.clone(),
            });
        }

        let result = match offer.state.accepted_status() {
            Some(status) => self.apply_acceptance(store, offer, status)?,
            None => apply_resignation(store, offer)?,
        };

        info!(
            student = %offer.file_number,
            class = %offer.class,
            state = offer.state.label(),
            outcome = result.outcome.label(),
            scheduled = result.scheduled.len(),
            cancelled = result.cancelled.len(),
            "offer reconciled"
        );
        Ok(result)
    }

    /// Records a staff-entered proposition through the same transitions as
    /// an imported acceptance.
    pub fn apply_manual(
        &self,
        store: &mut AdmissionStore,
        entry: &ManualProposition,
        now: NaiveDateTime,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let student = store
            .student(entry.file_number)
            .ok_or(LedgerError::StudentNotFound(entry.file_number))?;
        let state = match entry.status {
            PropositionStatus::Definitive => OfferState::AcceptedDefinitive,
            PropositionStatus::PendingOtherChoices => OfferState::AcceptedPendingOtherChoices,
        };
        let offer = AdmissionOffer {
            file_number: entry.file_number,
            last_name: student.last_name.clone(),
            first_name: student.first_name.clone(),
            birth_date: student.birth_date,
            class: entry.class.clone(),
            state,
            responded_at: None,
            offered_at: entry.offered_at.unwrap_or(now),
            boarding: entry.boarding,
            gap_year: entry.gap_year,
            contact: ContactDetails::default(),
        };
        self.apply_offer(store, &offer)
    }

    fn apply_acceptance(
        &self,
        store: &mut AdmissionStore,
        offer: &AdmissionOffer,
        status: PropositionStatus,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let file_number = offer.file_number;

        match store.student_mut(file_number) {
            Some(student) => student.refresh_contact(offer),
            None => {
                store.insert_student(Student::from_offer(offer));
                return open_proposition(store, offer, status, None, ReconciliationOutcome::Created);
            }
        }

        match store.active_proposition(file_number).cloned() {
            None => {
                let previous = store.latest_proposition(file_number).cloned();
                open_proposition(
                    store,
                    offer,
                    status,
                    previous.as_ref(),
                    ReconciliationOutcome::Upgraded,
                )
            }
            Some(active) if active.same_placement(offer) => {
                Ok(update_status(store, &active, status))
            }
            Some(active) => self.supersede(store, offer, status, &active),
        }
    }

    fn supersede(
        &self,
        store: &mut AdmissionStore,
        offer: &AdmissionOffer,
        status: PropositionStatus,
        old: &Proposition,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let file_number = offer.file_number;
        let at = offer.offered_at;
        let mut result = ReconciliationResult::new(file_number, ReconciliationOutcome::Superseded);

        // Guards look at the ledger as it was before this offer.
        let packet_pending =
            store.has_action(file_number, ActionCategory::SendPacket, &[ActionState::Todo]);
        let packet_recorded = store.has_action(
            file_number,
            ActionCategory::SendPacket,
            &[ActionState::Todo, ActionState::Done],
        );

        let new_id = insert_proposition(store, offer, status, Some(old.id));
        if let Some(previous) = store.proposition_mut(old.id) {
            previous.superseded_by = Some(new_id);
            previous.resigned_at = Some(at);
        }
        result.proposition = Some(new_id);

        if !packet_recorded {
            result
                .scheduled
                .push(store.schedule(new_id, ActionCategory::SendPacket, at, "")?);
        }

        if !old.boarding && offer.boarding {
            let blocked = match self.boarding_guard {
                BoardingPacketGuard::PendingSendPacket => packet_pending,
                BoardingPacketGuard::Always => false,
            };
            if !blocked {
                result
                    .scheduled
                    .push(store.schedule(new_id, ActionCategory::SendBoardingPacket, at, "")?);
            }
        }

        if old.boarding && !offer.boarding {
            result.cancelled.extend(store.cancel_todo_where(file_number, at, |action| {
                action.category == ActionCategory::SendBoardingPacket
            }));
            result.scheduled.push(store.schedule(
                new_id,
                ActionCategory::Register,
                at,
                NOTE_BOARDING_RENOUNCED,
            )?);
        }

        if old.class != offer.class {
            result.scheduled.push(store.schedule(
                new_id,
                ActionCategory::Register,
                at,
                NOTE_CLASS_CHANGE,
            )?);
        }

        if offer.gap_year && !old.gap_year {
            result
                .scheduled
                .push(store.schedule(new_id, ActionCategory::GapYearReview, at, "")?);
        }

        Ok(result)
    }
}

fn insert_proposition(
    store: &mut AdmissionStore,
    offer: &AdmissionOffer,
    status: PropositionStatus,
    supersedes: Option<PropositionId>,
) -> PropositionId {
    let id = store.insert_proposition(Proposition {
        id: PropositionId(0),
        student: offer.file_number,
        class: offer.class.clone(),
        offered_at: offer.offered_at,
        resigned_at: None,
        boarding: offer.boarding,
        gap_year: offer.gap_year,
        status,
        supersedes,
        superseded_by: None,
        registration_complete: false,
    });
    if let Some(student) = store.student_mut(offer.file_number) {
        student.current_proposition = Some(id);
    }
    id
}

/// First proposition, or a new one after the previous was resigned.
fn open_proposition(
    store: &mut AdmissionStore,
    offer: &AdmissionOffer,
    status: PropositionStatus,
    previous: Option<&Proposition>,
    outcome: ReconciliationOutcome,
) -> Result<ReconciliationResult, ReconcileError> {
    let file_number = offer.file_number;
    let at = offer.offered_at;
    let mut result = ReconciliationResult::new(file_number, outcome);

    if previous.is_some() {
        result.cancelled = store.cancel_todo_where(file_number, at, |action| {
            action.category == ActionCategory::Resignation && action.scheduled_at <= at
        });
    }

    let id = insert_proposition(store, offer, status, None);
    result.proposition = Some(id);
    result
        .scheduled
        .push(store.schedule(id, ActionCategory::SendPacket, at, "")?);

    // A class change folded into a re-application yields one registration note.
    if previous.is_some_and(|previous| previous.class != offer.class) {
        result.scheduled.push(store.schedule(
            id,
            ActionCategory::Register,
            at,
            NOTE_CLASS_CHANGE,
        )?);
    }

    if offer.gap_year && !previous.is_some_and(|previous| previous.gap_year) {
        result
            .scheduled
            .push(store.schedule(id, ActionCategory::GapYearReview, at, "")?);
    }

    Ok(result)
}

fn update_status(
    store: &mut AdmissionStore,
    active: &Proposition,
    status: PropositionStatus,
) -> ReconciliationResult {
    let mut result = ReconciliationResult::new(active.student, ReconciliationOutcome::Unchanged);
    result.proposition = Some(active.id);

    if status == active.status {
        return result;
    }
    if !status.is_upgrade_from(active.status) {
        warn!(
            student = %active.student,
            current = active.status.label(),
            offered = status.label(),
            "ignoring status downgrade"
        );
        return result;
    }

    if let Some(proposition) = store.proposition_mut(active.id) {
        proposition.status = status;
    }
    result.outcome = ReconciliationOutcome::StatusOnly;
    result
}

fn apply_resignation(
    store: &mut AdmissionStore,
    offer: &AdmissionOffer,
) -> Result<ReconciliationResult, ReconcileError> {
    let mut result = ReconciliationResult::new(offer.file_number, ReconciliationOutcome::Ignored);

    let Some(active) = store.active_proposition(offer.file_number).map(|p| p.id) else {
        return Ok(result);
    };

    if let ResignationOutcome::Recorded {
        proposition,
        resignation_action,
        cancelled,
    } = store.resign(
        ResignationTarget::Proposition(active),
        offer.resignation_at(),
    )? {
        result.outcome = ReconciliationOutcome::Resigned;
        result.proposition = Some(proposition);
        result.scheduled.push(resignation_action);
        result.cancelled = cancelled;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admissions::catalog::ClassConfig;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .expect("valid date")
            .and_hms_opt(0, 0, 0)
            .expect("valid time")
    }

    fn engine(guard: BoardingPacketGuard) -> ReconciliationEngine {
        let classes = ["A", "B"]
            .into_iter()
            .map(|code| ClassConfig {
                code: ClassCode::new(code),
                name: format!("Class {code}"),
                capacity: 40,
                overbooking: 0,
            })
            .collect();
        ReconciliationEngine::new(ClassCatalog::new(classes), guard)
    }

    fn offer(class: &str, state: OfferState, boarding: bool, day: u32) -> AdmissionOffer {
        AdmissionOffer {
            file_number: FileNumber(100),
            last_name: "GARNIER".to_string(),
            first_name: "Chloé".to_string(),
            birth_date: None,
            class: ClassCode::new(class),
            state,
            responded_at: None,
            offered_at: at(day),
            boarding,
            gap_year: false,
            contact: ContactDetails::default(),
        }
    }

    fn categories(store: &AdmissionStore) -> Vec<(ActionCategory, ActionState)> {
        store
            .actions_for(FileNumber(100))
            .map(|action| (action.category, action.state))
            .collect()
    }

    #[test]
    fn boarding_guard_parses_known_values() {
        assert_eq!(
            BoardingPacketGuard::parse("Always"),
            Some(BoardingPacketGuard::Always)
        );
        assert_eq!(
            BoardingPacketGuard::parse("pending-send-packet"),
            Some(BoardingPacketGuard::PendingSendPacket)
        );
        assert_eq!(BoardingPacketGuard::parse("sometimes"), None);
    }

    #[test]
    fn resignation_for_unknown_candidate_is_ignored() {
        let engine = engine(BoardingPacketGuard::default());
        let mut store = AdmissionStore::default();

        let result = engine
            .apply_offer(&mut store, &offer("A", OfferState::Resigned, false, 1))
            .expect("applies");

        assert_eq!(result.outcome, ReconciliationOutcome::Ignored);
        assert!(store.student(FileNumber(100)).is_none());
    }

    #[test]
    fn first_acceptance_creates_student_and_send_packet() {
        let engine = engine(BoardingPacketGuard::default());
        let mut store = AdmissionStore::default();

        let result = engine
            .apply_offer(
                &mut store,
                &offer("A", OfferState::AcceptedPendingOtherChoices, false, 1),
            )
            .expect("applies");

        assert_eq!(result.outcome, ReconciliationOutcome::Created);
        let active = store
            .active_proposition(FileNumber(100))
            .expect("active proposition");
        assert_eq!(active.status, PropositionStatus::PendingOtherChoices);
        assert_eq!(
            categories(&store),
            vec![(ActionCategory::SendPacket, ActionState::Todo)]
        );
        assert_eq!(store.actions()[0].scheduled_at, at(1));
    }

    #[test]
    fn pending_to_definitive_updates_in_place() {
        let engine = engine(BoardingPacketGuard::default());
        let mut store = AdmissionStore::default();
        engine
            .apply_offer(
                &mut store,
                &offer("A", OfferState::AcceptedPendingOtherChoices, false, 1),
            )
            .expect("first offer");

        let result = engine
            .apply_offer(&mut store, &offer("A", OfferState::AcceptedDefinitive, false, 3))
            .expect("upgrade");

        assert_eq!(result.outcome, ReconciliationOutcome::StatusOnly);
        assert_eq!(store.propositions().len(), 1);
        assert_eq!(store.actions().len(), 1);
        assert_eq!(
            store.active_proposition(FileNumber(100)).map(|p| p.status),
            Some(PropositionStatus::Definitive)
        );
    }

    #[test]
    fn downgrade_is_ignored() {
        let engine = engine(BoardingPacketGuard::default());
        let mut store = AdmissionStore::default();
        engine
            .apply_offer(&mut store, &offer("A", OfferState::AcceptedDefinitive, false, 1))
            .expect("first offer");

        let result = engine
            .apply_offer(
                &mut store,
                &offer("A", OfferState::AcceptedPendingOtherChoices, false, 2),
            )
            .expect("applies");

        assert_eq!(result.outcome, ReconciliationOutcome::Unchanged);
        assert_eq!(
            store.active_proposition(FileNumber(100)).map(|p| p.status),
            Some(PropositionStatus::Definitive)
        );
    }

    #[test]
    fn unknown_class_is_rejected_without_mutation() {
        let engine = engine(BoardingPacketGuard::default());
        let mut store = AdmissionStore::default();

        let error = engine
            .apply_offer(&mut store, &offer("Z", OfferState::AcceptedDefinitive, false, 1))
            .expect_err("class Z is not configured");

        assert_eq!(
            error,
            ReconcileError::UnknownClass {
                file_number: FileNumber(100),
                class: ClassCode::new("Z"),
            }
        );
        assert_eq!(store, AdmissionStore::default());
    }

    #[test]
    fn gaining_boarding_with_pending_packet_skips_boarding_packet() {
        let engine = engine(BoardingPacketGuard::PendingSendPacket);
        let mut store = AdmissionStore::default();
        engine
            .apply_offer(&mut store, &offer("A", OfferState::AcceptedDefinitive, false, 1))
            .expect("first offer");

        let result = engine
            .apply_offer(&mut store, &offer("A", OfferState::AcceptedDefinitive, true, 2))
            .expect("boarding granted");

        assert_eq!(result.outcome, ReconciliationOutcome::Superseded);
        assert!(result.scheduled.is_empty());
        assert_eq!(
            categories(&store),
            vec![(ActionCategory::SendPacket, ActionState::Todo)]
        );
    }

    #[test]
    fn always_guard_sends_boarding_packet_despite_pending_packet() {
        let engine = engine(BoardingPacketGuard::Always);
        let mut store = AdmissionStore::default();
        engine
            .apply_offer(&mut store, &offer("A", OfferState::AcceptedDefinitive, false, 1))
            .expect("first offer");
        engine
            .apply_offer(&mut store, &offer("A", OfferState::AcceptedDefinitive, true, 2))
            .expect("boarding granted");

        assert_eq!(
            categories(&store),
            vec![
                (ActionCategory::SendPacket, ActionState::Todo),
                (ActionCategory::SendBoardingPacket, ActionState::Todo),
            ]
        );
    }

    #[test]
    fn giving_up_boarding_cancels_packet_and_notes_registration() {
        let engine = engine(BoardingPacketGuard::Always);
        let mut store = AdmissionStore::default();
        engine
            .apply_offer(&mut store, &offer("A", OfferState::AcceptedDefinitive, false, 1))
            .expect("first offer");
        engine
            .apply_offer(&mut store, &offer("A", OfferState::AcceptedDefinitive, true, 2))
            .expect("boarding granted");

        let result = engine
            .apply_offer(&mut store, &offer("A", OfferState::AcceptedDefinitive, false, 3))
            .expect("boarding dropped");

        assert_eq!(result.cancelled.len(), 1);
        let register = store
            .actions_for(FileNumber(100))
            .find(|a| a.category == ActionCategory::Register)
            .expect("registration note");
        assert_eq!(register.note, NOTE_BOARDING_RENOUNCED);
        assert!(store
            .actions_for(FileNumber(100))
            .filter(|a| a.category == ActionCategory::SendBoardingPacket)
            .all(|a| a.state == ActionState::Cancelled));
    }

    #[test]
    fn resignation_then_reapplication_in_other_class() {
        let engine = engine(BoardingPacketGuard::default());
        let mut store = AdmissionStore::default();
        engine
            .apply_offer(&mut store, &offer("A", OfferState::AcceptedDefinitive, false, 1))
            .expect("first offer");
        let resigned = engine
            .apply_offer(&mut store, &offer("A", OfferState::Resigned, false, 2))
            .expect("resignation");
        assert_eq!(resigned.outcome, ReconciliationOutcome::Resigned);

        let result = engine
            .apply_offer(&mut store, &offer("B", OfferState::AcceptedDefinitive, false, 4))
            .expect("re-application");

        assert_eq!(result.outcome, ReconciliationOutcome::Upgraded);
        assert_eq!(result.cancelled.len(), 1, "todo resignation action cancelled");
        let registers: Vec<_> = store
            .actions_for(FileNumber(100))
            .filter(|a| a.category == ActionCategory::Register)
            .collect();
        assert_eq!(registers.len(), 1);
        assert_eq!(registers[0].note, NOTE_CLASS_CHANGE);
        assert_eq!(
            store.active_proposition(FileNumber(100)).map(|p| p.class.clone()),
            Some(ClassCode::new("B"))
        );
    }

    #[test]
    fn gap_year_flag_schedules_review() {
        let engine = engine(BoardingPacketGuard::default());
        let mut store = AdmissionStore::default();
        let mut first = offer("A", OfferState::AcceptedDefinitive, false, 1);
        first.gap_year = true;

        engine.apply_offer(&mut store, &first).expect("applies");

        assert!(store.has_action(
            FileNumber(100),
            ActionCategory::GapYearReview,
            &[ActionState::Todo]
        ));
    }

    fn manual(class: &str, status: PropositionStatus) -> ManualProposition {
        ManualProposition {
            file_number: FileNumber(100),
            class: ClassCode::new(class),
            status,
            boarding: false,
            gap_year: false,
            offered_at: None,
        }
    }

    #[test]
    fn manual_proposition_supersedes_like_an_import() {
        let engine = engine(BoardingPacketGuard::default());
        let mut store = AdmissionStore::default();
        engine
            .apply_offer(&mut store, &offer("A", OfferState::AcceptedDefinitive, false, 1))
            .expect("applies");

        let result = engine
            .apply_manual(&mut store, &manual("B", PropositionStatus::Definitive), at(4))
            .expect("manual proposition applies");

        assert_eq!(result.outcome, ReconciliationOutcome::Superseded);
        let active = store
            .active_proposition(FileNumber(100))
            .expect("new active proposition");
        assert_eq!(active.class, ClassCode::new("B"));
        assert_eq!(active.offered_at, at(4));
        assert_eq!(
            store.student(FileNumber(100)).map(|s| s.last_name.as_str()),
            Some("GARNIER")
        );
    }

    #[test]
    fn manual_proposition_needs_a_known_student_and_class() {
        let engine = engine(BoardingPacketGuard::default());
        let mut store = AdmissionStore::default();

        assert_eq!(
            engine.apply_manual(&mut store, &manual("A", PropositionStatus::Definitive), at(2)),
            Err(ReconcileError::Ledger(LedgerError::StudentNotFound(FileNumber(100))))
        );

        engine
            .apply_offer(&mut store, &offer("A", OfferState::AcceptedDefinitive, false, 1))
            .expect("applies");
        let before = store.clone();
        assert!(matches!(
            engine.apply_manual(&mut store, &manual("Z", PropositionStatus::Definitive), at(2)),
            Err(ReconcileError::UnknownClass { .. })
        ));
        assert_eq!(store, before);
    }
}
