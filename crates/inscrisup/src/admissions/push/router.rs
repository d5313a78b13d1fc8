use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tracing::error;

use super::{PushReply, PushResponse, PushService};
use crate::admissions::local_now;
use crate::admissions::store::AdmissionRepository;

pub const PUSH_ROUTE: &str = "/api/v1/parcoursup/admission";

/// Router exposing the endpoint the admissions platform pushes to.
pub fn push_router<R>(service: Arc<PushService<R>>) -> Router
where
    R: AdmissionRepository + 'static,
{
    Router::new()
        .route(PUSH_ROUTE, post(receive_handler::<R>))
        .with_state(service)
}

/// Ledger I/O runs on the blocking pool.
pub(crate) async fn receive_handler<R>(
    State(service): State<Arc<PushService<R>>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Response
where
    R: AdmissionRepository + 'static,
{
    let source_ip = connect_info.map(|ConnectInfo(addr)| addr.ip());
    let received_at = local_now();
    let handled =
        tokio::task::spawn_blocking(move || service.handle(source_ip, &body, received_at)).await;

    let response = match handled {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "push handler did not finish");
            PushResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                reply: PushReply::nok("internal error"),
            }
        }
    };
    (response.status, axum::Json(response.reply)).into_response()
}
