use chrono::{Duration, NaiveDate, NaiveDateTime};
use inscrisup::admissions::domain::ContactDetails;
use inscrisup::admissions::{
    ActionCategory, ActionState, AdmissionOffer, AdmissionStore, BoardingPacketGuard,
    ClassCatalog, ClassCode, ClassConfig, FileNumber, OfferState, ReconciliationEngine,
    ReconciliationOutcome, ResignationOutcome, ResignationTarget,
};

const STUDENT: FileNumber = FileNumber(100);

fn day(n: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("valid timestamp")
        + Duration::days(n)
}

fn engine(guard: BoardingPacketGuard) -> ReconciliationEngine {
    let classes = ["A", "B", "C"]
        .into_iter()
        .map(|code| ClassConfig {
            code: ClassCode::new(code),
            name: format!("Class {code}"),
            capacity: 30,
            overbooking: 3,
        })
        .collect();
    ReconciliationEngine::new(ClassCatalog::new(classes), guard)
}

fn offer(
    file: FileNumber,
    class: &str,
    state: OfferState,
    boarding: bool,
    at: NaiveDateTime,
) -> AdmissionOffer {
    AdmissionOffer {
        file_number: file,
        last_name: "LAMBERT".to_string(),
        first_name: "Nora".to_string(),
        birth_date: None,
        class: ClassCode::new(class),
        state,
        responded_at: None,
        offered_at: at,
        boarding,
        gap_year: false,
        contact: ContactDetails::default(),
    }
}

fn accepted(class: &str, boarding: bool, at: NaiveDateTime) -> AdmissionOffer {
    offer(STUDENT, class, OfferState::AcceptedDefinitive, boarding, at)
}

fn actions(store: &AdmissionStore) -> Vec<(ActionCategory, ActionState)> {
    store
        .actions_for(STUDENT)
        .map(|action| (action.category, action.state))
        .collect()
}

fn count(store: &AdmissionStore, category: ActionCategory) -> usize {
    store
        .actions_for(STUDENT)
        .filter(|action| action.category == category)
        .count()
}

#[test]
fn every_student_keeps_at_most_one_active_proposition() {
    let engine = engine(BoardingPacketGuard::default());
    let mut store = AdmissionStore::default();
    let classes = ["A", "B", "C"];
    let states = OfferState::ordered();
    let mut seed: u64 = 0x2545_f491;

    for step in 0..400 {
        seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let file = FileNumber(1 + (seed >> 33) as u32 % 6);
        let class = classes[(seed >> 20) as usize % classes.len()];
        let state = states[(seed >> 40) as usize % states.len()];
        let boarding = (seed >> 50) & 1 == 1;

        engine
            .apply_offer(&mut store, &offer(file, class, state, boarding, day(step)))
            .expect("configured classes always apply");

        for student in store.students() {
            let active: Vec<_> = store
                .propositions_for(student.file_number)
                .filter(|proposition| proposition.is_active())
                .map(|proposition| proposition.id)
                .collect();
            assert!(
                active.len() <= 1,
                "student {} has {} active propositions",
                student.file_number,
                active.len()
            );
            assert_eq!(
                store.active_proposition(student.file_number).map(|p| p.id),
                active.first().copied(),
                "step {step}: current pointer of student {} disagrees with the active proposition",
                student.file_number
            );
        }
    }
}

#[test]
fn identical_definitive_offer_twice_changes_nothing() {
    let engine = engine(BoardingPacketGuard::default());
    let mut store = AdmissionStore::default();
    engine
        .apply_offer(&mut store, &accepted("A", false, day(0)))
        .expect("first offer");
    let before = store.clone();

    let result = engine
        .apply_offer(&mut store, &accepted("A", false, day(0)))
        .expect("repeat offer");

    assert_eq!(result.outcome, ReconciliationOutcome::Unchanged);
    assert_eq!(store.propositions(), before.propositions());
    assert_eq!(store.actions(), before.actions());
}

#[test]
fn resigning_twice_records_one_resignation_action() {
    let engine = engine(BoardingPacketGuard::default());
    let mut store = AdmissionStore::default();
    engine
        .apply_offer(&mut store, &accepted("A", false, day(0)))
        .expect("first offer");

    let first = store
        .resign(ResignationTarget::Student(STUDENT), day(2))
        .expect("first resignation");
    let second = store
        .resign(ResignationTarget::Student(STUDENT), day(5))
        .expect("second resignation");

    assert!(matches!(first, ResignationOutcome::Recorded { .. }));
    assert!(matches!(second, ResignationOutcome::AlreadyResigned { .. }));
    assert_eq!(count(&store, ActionCategory::Resignation), 1);

    let resigned_again = engine
        .apply_offer(
            &mut store,
            &offer(STUDENT, "A", OfferState::Resigned, false, day(6)),
        )
        .expect("resignation offer");
    assert_eq!(resigned_again.outcome, ReconciliationOutcome::Ignored);
    assert_eq!(count(&store, ActionCategory::Resignation), 1);
}

#[test]
fn resignation_for_unknown_file_never_creates_a_student() {
    let engine = engine(BoardingPacketGuard::default());
    let mut store = AdmissionStore::default();

    let result = engine
        .apply_offer(
            &mut store,
            &offer(FileNumber(555), "B", OfferState::Resigned, true, day(0)),
        )
        .expect("resignation offer");

    assert_eq!(result.outcome, ReconciliationOutcome::Ignored);
    assert_eq!(store.students().count(), 0);
    assert!(store.actions().is_empty());
}

#[test]
fn boarding_gain_without_any_packet_gets_exactly_one_boarding_packet() {
    let engine = engine(BoardingPacketGuard::default());
    let mut store = AdmissionStore::default();
    engine
        .apply_offer(&mut store, &accepted("A", false, day(0)))
        .expect("first offer");
    let packet = store.actions()[0].id;
    store
        .mark_not_applicable(packet, day(1))
        .expect("packet dismissed");

    engine
        .apply_offer(&mut store, &accepted("A", true, day(2)))
        .expect("boarding granted");

    assert_eq!(count(&store, ActionCategory::SendBoardingPacket), 1);
    assert_eq!(
        actions(&store),
        vec![
            (ActionCategory::SendPacket, ActionState::NotApplicable),
            (ActionCategory::SendPacket, ActionState::Todo),
            (ActionCategory::SendBoardingPacket, ActionState::Todo),
        ]
    );
}

#[test]
fn boarding_gain_after_packet_was_sent_gets_boarding_packet() {
    let engine = engine(BoardingPacketGuard::default());
    let mut store = AdmissionStore::default();
    engine
        .apply_offer(&mut store, &accepted("A", false, day(0)))
        .expect("first offer");
    let packet = store.actions()[0].id;
    store.complete(packet, day(1)).expect("packet sent");

    let result = engine
        .apply_offer(&mut store, &accepted("A", true, day(2)))
        .expect("boarding granted");

    assert_eq!(result.outcome, ReconciliationOutcome::Superseded);
    assert_eq!(store.students().count(), 1);
    assert_eq!(store.propositions().len(), 2);
    assert_eq!(store.propositions()[0].superseded_by, Some(store.propositions()[1].id));
    assert_eq!(store.propositions()[0].resigned_at, Some(day(2)));
    assert_eq!(
        actions(&store),
        vec![
            (ActionCategory::SendPacket, ActionState::Done),
            (ActionCategory::SendBoardingPacket, ActionState::Todo),
        ]
    );
}

#[test]
fn boarding_gain_with_always_guard_schedules_both_packets() {
    let engine = engine(BoardingPacketGuard::Always);
    let mut store = AdmissionStore::default();
    engine
        .apply_offer(&mut store, &accepted("A", false, day(0)))
        .expect("first offer");
    engine
        .apply_offer(&mut store, &accepted("A", true, day(1)))
        .expect("boarding granted");

    assert_eq!(store.propositions().len(), 2);
    assert!(!store.propositions()[0].is_active());
    assert_eq!(
        actions(&store),
        vec![
            (ActionCategory::SendPacket, ActionState::Todo),
            (ActionCategory::SendBoardingPacket, ActionState::Todo),
        ]
    );
}

#[test]
fn class_change_supersedes_and_notes_registration() {
    let engine = engine(BoardingPacketGuard::default());
    let mut store = AdmissionStore::default();
    engine
        .apply_offer(&mut store, &accepted("A", false, day(0)))
        .expect("first offer");

    let result = engine
        .apply_offer(&mut store, &accepted("B", false, day(3)))
        .expect("class change");

    assert_eq!(result.outcome, ReconciliationOutcome::Superseded);
    let old = &store.propositions()[0];
    assert!(old.superseded_by.is_some());
    let register = store
        .actions_for(STUDENT)
        .find(|action| action.category == ActionCategory::Register)
        .expect("register note");
    assert_eq!(register.note, "student changed class");
    assert_eq!(register.scheduled_at, day(3));
    assert_eq!(
        store.active_proposition(STUDENT).map(|p| p.class.as_str()),
        Some("B")
    );
}
