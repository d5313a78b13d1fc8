use crate::cli::ServeArgs;
use crate::infra::{AppState, Runtime};
use crate::routes::{with_admission_routes, Backoffice};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use inscrisup::config::AppConfig;
use inscrisup::error::AppError;
use inscrisup::telemetry;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let runtime = Runtime::open(&config.admissions)?;
    if config.admissions.push_credentials.is_none() {
        warn!("push credentials not configured, every push will be refused");
    }
    let push_service = runtime.push_service(&config.admissions);
    let backoffice = Arc::new(Backoffice {
        repository: runtime.repository.clone(),
        engine: runtime.engine.clone(),
    });

    let app = with_admission_routes(push_service, backoffice)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        classes = config.admissions.classes.len(),
        store = %config.admissions.store_path.display(),
        "admission tracker ready"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
