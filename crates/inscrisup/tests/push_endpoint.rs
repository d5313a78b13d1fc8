use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use inscrisup::admissions::{
    push_router, ActionCategory, BoardingPacketGuard, ClassCatalog, ClassCode, ClassConfig,
    FileNumber, InMemoryAdmissionRepository, PushService, ReconciliationEngine,
};
use inscrisup::config::PushCredentials;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn router(repository: Arc<InMemoryAdmissionRepository>) -> Router {
    let catalog = ClassCatalog::new(vec![ClassConfig {
        code: ClassCode::new("4512"),
        name: "PCSI".to_string(),
        capacity: 45,
        overbooking: 5,
    }]);
    let engine = Arc::new(ReconciliationEngine::new(
        catalog,
        BoardingPacketGuard::default(),
    ));
    push_router(Arc::new(PushService::new(
        repository,
        engine,
        Some(PushCredentials {
            login: "lycee-demo".to_string(),
            password: "changeme".to_string(),
        }),
    )))
}

fn request(payload: Value) -> Request<Body> {
    Request::post("/api/v1/parcoursup/admission")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

fn admission(situation: u8, password: &str) -> Value {
    json!({
        "identifiant": {"login": "lycee-demo", "pwd": password},
        "codeCandidat": "9001",
        "nom": "FONTAINE",
        "prenom": "Eliott",
        "dateNaissance": "21/11/2005",
        "sexe": "M",
        "codeFormationpsup": "4512",
        "codeSituation": situation,
        "internat": "0",
        "adresse1": "2 chemin Vert",
        "codePostal": "74000",
        "libelleCommune": "ANNECY",
        "dateProposition": "03/06/2024 08:00",
        "dateReponse": "04/06/2024 19:45"
    })
}

async fn reply(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json reply")
}

#[tokio::test]
async fn accepted_then_resigned_push_flow() {
    let repository = Arc::new(InMemoryAdmissionRepository::default());
    let app = router(repository.clone());

    let response = app
        .clone()
        .oneshot(request(admission(1, "changeme")))
        .await
        .expect("accepted push");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(reply(response).await["retour"], "OK");

    let response = app
        .oneshot(request(admission(3, "changeme")))
        .await
        .expect("resigned push");
    assert_eq!(response.status(), StatusCode::OK);

    let store = repository.snapshot().expect("snapshot");
    let student = store.student(FileNumber(9001)).expect("student created");
    assert_eq!(student.address, "2 chemin Vert\n74000 ANNECY");
    assert!(store.active_proposition(FileNumber(9001)).is_none());
    let resignation = store
        .actions_for(FileNumber(9001))
        .find(|action| action.category == ActionCategory::Resignation)
        .expect("resignation recorded");
    assert_eq!(
        resignation.scheduled_at.format("%d/%m/%Y %H:%M").to_string(),
        "04/06/2024 19:45"
    );
    assert_eq!(store.push_log().len(), 2);
}

#[tokio::test]
async fn wrong_password_is_unauthorized_and_leaves_store_untouched() {
    let repository = Arc::new(InMemoryAdmissionRepository::default());

    let response = router(repository.clone())
        .oneshot(request(admission(1, "guess")))
        .await
        .expect("push answered");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(reply(response).await["retour"], "NOK");
    let store = repository.snapshot().expect("snapshot");
    assert_eq!(store.students().count(), 0);
    assert_eq!(store.push_log().len(), 1);
    assert!(!store.push_log()[0].payload.contains("guess"));
}

#[tokio::test]
async fn pending_answer_is_acknowledged_without_changes() {
    let repository = Arc::new(InMemoryAdmissionRepository::default());

    let response = router(repository.clone())
        .oneshot(request(admission(0, "changeme")))
        .await
        .expect("push answered");

    assert_eq!(response.status(), StatusCode::OK);
    let store = repository.snapshot().expect("snapshot");
    assert_eq!(store.students().count(), 0);
    assert_eq!(store.push_log()[0].retour, "OK");
}

#[tokio::test]
async fn malformed_payload_answers_nok() {
    let repository = Arc::new(InMemoryAdmissionRepository::default());
    let mut payload = admission(1, "changeme");
    payload["dateProposition"] = json!("hier");

    let response = router(repository.clone())
        .oneshot(request(payload))
        .await
        .expect("push answered");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = reply(response).await;
    assert_eq!(body["retour"], "NOK");
    assert!(body["message"]
        .as_str()
        .is_some_and(|message| message.contains("dateProposition")));
}
