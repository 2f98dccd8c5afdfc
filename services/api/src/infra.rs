use metrics_exporter_prometheus::PrometheusHandle;
use servicehub::error::AppError;
use servicehub::workflows::marketplace::{
    CategoryId, InMemoryDirectory, InMemoryMarketplaceStore, InboxNotifier, MarketplaceService,
    MessageChannel, NotifierError, ProviderRef, ServiceCategory, UserId,
};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type InMemoryNotifier = InboxNotifier<InMemoryMarketplaceStore, LoggingMessageChannel>;

pub(crate) type InMemoryMarketplace =
    MarketplaceService<InMemoryMarketplaceStore, InMemoryDirectory, InMemoryNotifier>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Off-channel transport that writes each message to the log instead of a
/// messaging gateway.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LoggingMessageChannel;

impl MessageChannel for LoggingMessageChannel {
    fn deliver(&self, phone: &str, message: &str) -> Result<(), NotifierError> {
        info!(%phone, chars = message.chars().count(), "external alert delivered");
        Ok(())
    }
}

/// CSV export when a path is given, otherwise the built-in demo directory.
pub(crate) fn load_directory(path: Option<&Path>) -> Result<InMemoryDirectory, AppError> {
    match path {
        Some(path) => {
            let directory = InMemoryDirectory::from_path(path)?;
            info!(
                path = %path.display(),
                providers = directory.provider_count(),
                "provider directory loaded"
            );
            Ok(directory)
        }
        None => Ok(demo_directory()),
    }
}

pub(crate) fn demo_directory() -> InMemoryDirectory {
    InMemoryDirectory::new()
        .with_category(category("plumbing", "Plumbing", true))
        .with_category(category("electrical", "Electrical", true))
        .with_category(category("cleaning", "Cleaning", true))
        .with_category(category("gardening", "Gardening", false))
        .with_provider(provider(
            "joao-hidraulica",
            "Joao Hidraulica",
            Some("(81) 99876-1001"),
            "Recife",
            "PE",
            &["plumbing"],
        ))
        .with_provider(provider(
            "marta-reparos",
            "Marta Reparos",
            Some("81 99876-1002"),
            "Recife",
            "PE",
            &["plumbing", "electrical"],
        ))
        .with_provider(provider(
            "luz-eletrica",
            "Luz Eletrica",
            Some("081 99876-1003"),
            "Olinda",
            "PE",
            &["electrical"],
        ))
        .with_provider(provider(
            "casa-limpa",
            "Casa Limpa",
            None,
            "Recife",
            "PE",
            &["cleaning"],
        ))
}

fn category(id: &str, name: &str, is_active: bool) -> ServiceCategory {
    ServiceCategory {
        id: CategoryId::new(id),
        name: name.to_string(),
        is_active,
    }
}

fn provider(
    id: &str,
    name: &str,
    phone: Option<&str>,
    city: &str,
    state: &str,
    categories: &[&str],
) -> ProviderRef {
    ProviderRef {
        user_id: UserId::new(id),
        display_name: name.to_string(),
        phone: phone.map(str::to_string),
        categories: categories.iter().copied().map(CategoryId::new).collect(),
        city: city.to_string(),
        state: state.to_string(),
        is_active: true,
        is_available: true,
    }
}
