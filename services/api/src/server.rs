use crate::cli::ServeArgs;
use crate::infra::{load_directory, AppState, InMemoryMarketplace, LoggingMessageChannel};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use servicehub::config::AppConfig;
use servicehub::error::AppError;
use servicehub::telemetry;
use servicehub::workflows::marketplace::{
    marketplace_router, DispatchPolicy, InMemoryMarketplaceStore, InboxNotifier,
    MarketplaceService,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(path) = args.directory_csv.take() {
        config.marketplace.directory_csv = Some(path);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let directory = load_directory(config.marketplace.directory_csv.as_deref())?;
    let store = Arc::new(InMemoryMarketplaceStore::new());
    let notifier = Arc::new(InboxNotifier::new(
        store.clone(),
        Arc::new(LoggingMessageChannel),
        DispatchPolicy::from(&config.marketplace),
    ));
    let service: Arc<InMemoryMarketplace> =
        Arc::new(MarketplaceService::new(store, Arc::new(directory), notifier));

    let app = with_operational_routes(marketplace_router(
        service,
        config.marketplace.admin_users.clone(),
    ))
    .layer(Extension(app_state))
    .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        admins = config.marketplace.admin_users.len(),
        external_alerts = config.marketplace.external_alerts,
        "service marketplace ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
