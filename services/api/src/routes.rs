use crate::infra::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use inscrisup::admissions::export::{class_roster, RosterRow};
use inscrisup::admissions::{
    local_now, push_router, ActionId, AdmissionRepository, AdmissionStore, ClassCode,
    ClassOverview, FileNumber, ImportRunSummary, LedgerError, ManualProposition, PropositionId,
    PushService, ReconciliationEngine, ReconciliationResult, ResignationOutcome,
    ResignationTarget, StudentHistory,
};
use inscrisup::error::AppError;

/// Ledger access plus the staff operations.
pub(crate) struct Backoffice<R> {
    pub(crate) repository: Arc<R>,
    pub(crate) engine: Arc<ReconciliationEngine>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ActionView {
    pub(crate) id: ActionId,
    pub(crate) file_number: FileNumber,
    pub(crate) student: String,
    pub(crate) class: Option<ClassCode>,
    pub(crate) category: &'static str,
    pub(crate) scheduled_at: NaiveDateTime,
    pub(crate) note: String,
}

type CloseAction = fn(&mut AdmissionStore, ActionId, NaiveDateTime) -> Result<bool, LedgerError>;

pub(crate) fn with_admission_routes<R>(
    push: Arc<PushService<R>>,
    backoffice: Arc<Backoffice<R>>,
) -> Router
where
    R: AdmissionRepository + 'static,
{
    let staff = Router::new()
        .route("/api/v1/actions", get(list_actions::<R>))
        .route("/api/v1/actions/:id/complete", post(complete_action::<R>))
        .route("/api/v1/actions/:id/cancel", post(cancel_action::<R>))
        .route(
            "/api/v1/actions/:id/not-applicable",
            post(dismiss_action::<R>),
        )
        .route("/api/v1/classes", get(list_classes::<R>))
        .route("/api/v1/classes/:code/students", get(class_students::<R>))
        .route("/api/v1/students/:file", get(student_detail::<R>))
        .route("/api/v1/students/:file/resign", post(resign_student::<R>))
        .route("/api/v1/propositions", post(add_proposition::<R>))
        .route(
            "/api/v1/propositions/:id/registered",
            post(mark_registered::<R>),
        )
        .route("/api/v1/imports", get(list_imports::<R>))
        .with_state(backoffice);

    push_router(push)
        .merge(staff)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Runs ledger work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| AppError::Server(axum::Error::new(err)))?
}

pub(crate) async fn list_actions<R>(
    State(backoffice): State<Arc<Backoffice<R>>>,
) -> Result<Json<Vec<ActionView>>, AppError>
where
    R: AdmissionRepository + 'static,
{
    blocking(move || {
        let views = backoffice.repository.read(|store| {
            store
                .todo_actions()
                .into_iter()
                .map(|action| ActionView {
                    id: action.id,
                    file_number: action.student,
                    student: store
                        .student(action.student)
                        .map(|student| student.display_name())
                        .unwrap_or_default(),
                    class: store
                        .proposition(action.proposition)
                        .map(|proposition| proposition.class.clone()),
                    category: action.category.label(),
                    scheduled_at: action.scheduled_at,
                    note: action.note.clone(),
                })
                .collect::<Vec<_>>()
        })?;
        Ok(Json(views))
    })
    .await
}

async fn close_action<R>(
    backoffice: Arc<Backoffice<R>>,
    id: u64,
    close: CloseAction,
) -> Result<Json<serde_json::Value>, AppError>
where
    R: AdmissionRepository + 'static,
{
    blocking(move || {
        let changed = backoffice.repository.transaction(|store| {
            close(store, ActionId(id), local_now()).map_err(AppError::from)
        })?;
        Ok(Json(json!({ "id": id, "changed": changed })))
    })
    .await
}

pub(crate) async fn complete_action<R>(
    State(backoffice): State<Arc<Backoffice<R>>>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError>
where
    R: AdmissionRepository + 'static,
{
    close_action(backoffice, id, AdmissionStore::complete).await
}

pub(crate) async fn cancel_action<R>(
    State(backoffice): State<Arc<Backoffice<R>>>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError>
where
    R: AdmissionRepository + 'static,
{
    close_action(backoffice, id, AdmissionStore::cancel).await
}

pub(crate) async fn dismiss_action<R>(
    State(backoffice): State<Arc<Backoffice<R>>>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError>
where
    R: AdmissionRepository + 'static,
{
    close_action(backoffice, id, AdmissionStore::mark_not_applicable).await
}

pub(crate) async fn list_classes<R>(
    State(backoffice): State<Arc<Backoffice<R>>>,
) -> Result<Json<Vec<ClassOverview>>, AppError>
where
    R: AdmissionRepository + 'static,
{
    blocking(move || {
        let overview = backoffice
            .repository
            .read(|store| backoffice.engine.catalog().overview(store))?;
        Ok(Json(overview))
    })
    .await
}

pub(crate) async fn class_students<R>(
    State(backoffice): State<Arc<Backoffice<R>>>,
    Path(code): Path<String>,
) -> Response
where
    R: AdmissionRepository + 'static,
{
    let code = ClassCode::new(code);
    if !backoffice.engine.catalog().contains(&code) {
        let payload = json!({ "error": format!("unknown class '{code}'") });
        return (StatusCode::NOT_FOUND, Json(payload)).into_response();
    }

    let roster = blocking(move || {
        Ok(backoffice
            .repository
            .read(|store| class_roster(store, &code))?)
    })
    .await;
    match roster {
        Ok(rows) => (StatusCode::OK, Json::<Vec<RosterRow>>(rows)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn student_detail<R>(
    State(backoffice): State<Arc<Backoffice<R>>>,
    Path(file): Path<u32>,
) -> Result<Json<StudentHistory>, AppError>
where
    R: AdmissionRepository + 'static,
{
    let file_number = FileNumber(file);
    blocking(move || {
        backoffice
            .repository
            .read(|store| store.student_history(file_number))?
            .map(Json)
            .ok_or_else(|| AppError::from(LedgerError::StudentNotFound(file_number)))
    })
    .await
}

pub(crate) async fn resign_student<R>(
    State(backoffice): State<Arc<Backoffice<R>>>,
    Path(file): Path<u32>,
) -> Result<Json<ResignationOutcome>, AppError>
where
    R: AdmissionRepository + 'static,
{
    let target = ResignationTarget::Student(FileNumber(file));
    blocking(move || {
        let outcome = backoffice.repository.transaction(|store| {
            store.resign(target, local_now()).map_err(AppError::from)
        })?;
        Ok(Json(outcome))
    })
    .await
}

pub(crate) async fn add_proposition<R>(
    State(backoffice): State<Arc<Backoffice<R>>>,
    Json(entry): Json<ManualProposition>,
) -> Result<Json<ReconciliationResult>, AppError>
where
    R: AdmissionRepository + 'static,
{
    blocking(move || {
        let result = backoffice.repository.transaction(|store| {
            backoffice
                .engine
                .apply_manual(store, &entry, local_now())
                .map_err(AppError::from)
        })?;
        Ok(Json(result))
    })
    .await
}

pub(crate) async fn mark_registered<R>(
    State(backoffice): State<Arc<Backoffice<R>>>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError>
where
    R: AdmissionRepository + 'static,
{
    blocking(move || {
        let closed = backoffice.repository.transaction(|store| {
            store
                .mark_registered(PropositionId(id), local_now())
                .map_err(AppError::from)
        })?;
        Ok(Json(json!({ "proposition": id, "closed": closed })))
    })
    .await
}

pub(crate) async fn list_imports<R>(
    State(backoffice): State<Arc<Backoffice<R>>>,
) -> Result<Json<Vec<ImportRunSummary>>, AppError>
where
    R: AdmissionRepository + 'static,
{
    blocking(move || {
        let runs = backoffice
            .repository
            .read(|store| store.import_runs().iter().rev().cloned().collect::<Vec<_>>())?;
        Ok(Json(runs))
    })
    .await
}
