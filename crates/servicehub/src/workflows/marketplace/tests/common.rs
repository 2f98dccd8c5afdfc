use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::workflows::marketplace::directory::{Directory, DirectoryError};
use crate::workflows::marketplace::domain::{
    Actor, BudgetRange, CategoryId, Location, Money, NewServiceRequest, Notification,
    NotificationId, Priority, ProposalSubmission, ProviderRef, RequestId, ServiceAssignment,
    ServiceCategory, ServiceRequest, UserId,
};
use crate::workflows::marketplace::notifications::{NotificationDraft, Notifier, NotifierError};
use crate::workflows::marketplace::{
    marketplace_router, InMemoryDirectory, InMemoryMarketplaceStore, MarketplaceService,
};

pub(super) type TestService =
    MarketplaceService<InMemoryMarketplaceStore, InMemoryDirectory, RecordingNotifier>;

pub(super) const ADMIN: &str = "ops-admin";

pub(super) fn client() -> Actor {
    Actor::client("client-1")
}

pub(super) fn other_client() -> Actor {
    Actor::client("client-2")
}

pub(super) fn provider(id: &str) -> Actor {
    Actor::provider(id)
}

pub(super) fn admin() -> Actor {
    Actor::admin(ADMIN)
}

fn provider_ref(
    id: &str,
    phone: Option<&str>,
    category: &str,
    city: &str,
    state: &str,
) -> ProviderRef {
    ProviderRef {
        user_id: UserId::new(id),
        display_name: format!("Provider {id}"),
        phone: phone.map(str::to_string),
        categories: vec![CategoryId::new(category)],
        city: city.to_string(),
        state: state.to_string(),
        is_active: true,
        is_available: true,
    }
}

fn category(id: &str, name: &str, is_active: bool) -> ServiceCategory {
    ServiceCategory {
        id: CategoryId::new(id),
        name: name.to_string(),
        is_active,
    }
}

/// plumbing: prov-1 (Recife), prov-2 (Olinda), prov-3 (Recife, no phone);
/// electrical: prov-4 (Sao Paulo); carpentry has nobody; painting is inactive.
pub(super) fn directory() -> InMemoryDirectory {
    InMemoryDirectory::new()
        .with_category(category("plumbing", "Plumbing", true))
        .with_category(category("electrical", "Electrical", true))
        .with_category(category("carpentry", "Carpentry", true))
        .with_category(category("painting", "Painting", false))
        .with_provider(provider_ref(
            "prov-1",
            Some("(81) 99999-0001"),
            "plumbing",
            "Recife",
            "PE",
        ))
        .with_provider(provider_ref(
            "prov-2",
            Some("081 99999-0002"),
            "plumbing",
            "Olinda",
            "PE",
        ))
        .with_provider(provider_ref("prov-3", None, "plumbing", "Recife", "PE"))
        .with_provider(provider_ref(
            "prov-4",
            Some("11 98888-0004"),
            "electrical",
            "Sao Paulo",
            "SP",
        ))
}

pub(super) fn build_service() -> (
    TestService,
    Arc<InMemoryMarketplaceStore>,
    Arc<RecordingNotifier>,
) {
    let store = Arc::new(InMemoryMarketplaceStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = MarketplaceService::new(store.clone(), Arc::new(directory()), notifier.clone());
    (service, store, notifier)
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    let admins: BTreeSet<UserId> = [UserId::new(ADMIN)].into_iter().collect();
    marketplace_router(Arc::new(service), admins)
}

pub(super) fn new_request(title: &str) -> NewServiceRequest {
    new_request_in(title, "plumbing", "Recife", "PE")
}

pub(super) fn new_request_in(
    title: &str,
    category: &str,
    city: &str,
    state: &str,
) -> NewServiceRequest {
    NewServiceRequest {
        category_id: CategoryId::new(category),
        title: title.to_string(),
        description: "Kitchen sink drains slowly".to_string(),
        location: Location {
            address: "Rua da Aurora, 100".to_string(),
            city: city.to_string(),
            state: state.to_string(),
        },
        budget: BudgetRange {
            min: Some(Money::from_units(80)),
            max: Some(Money::from_units(200)),
        },
        priority: Priority::High,
        preferred_date: None,
        images: Vec::new(),
    }
}

pub(super) fn proposal(request_id: &RequestId, units: u64) -> ProposalSubmission {
    ProposalSubmission {
        request_id: request_id.clone(),
        proposed_price: Money::from_units(units),
        estimated_hours: 3,
        notes: "Parts included".to_string(),
    }
}

/// Open request from `client()` with one pending proposal per provider id.
pub(super) fn request_with_proposals(
    service: &TestService,
    providers: &[&str],
) -> (ServiceRequest, Vec<ServiceAssignment>) {
    let request = service
        .create_request(&client(), new_request("Fix the sink"))
        .expect("request created");
    let assignments = providers
        .iter()
        .enumerate()
        .map(|(index, id)| {
            service
                .propose(&provider(id), proposal(&request.id, 100 + index as u64 * 10))
                .expect("proposal accepted")
        })
        .collect();
    (request, assignments)
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    drafts: Mutex<Vec<NotificationDraft>>,
    external: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub(super) fn drafts(&self) -> Vec<NotificationDraft> {
        self.drafts.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn drafts_for(&self, recipient: &str) -> Vec<NotificationDraft> {
        self.drafts()
            .into_iter()
            .filter(|draft| draft.recipient.as_str() == recipient)
            .collect()
    }

    pub(super) fn external(&self) -> Vec<(String, String)> {
        self.external.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn clear(&self) {
        self.drafts.lock().expect("notifier mutex poisoned").clear();
        self.external.lock().expect("notifier mutex poisoned").clear();
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, draft: NotificationDraft) -> Result<Notification, NotifierError> {
        self.drafts
            .lock()
            .expect("notifier mutex poisoned")
            .push(draft.clone());
        Ok(Notification {
            id: NotificationId::next(),
            recipient: draft.recipient,
            title: draft.title,
            message: draft.message,
            kind: draft.kind,
            is_read: false,
            related_request: draft.related_request,
            created_at: Utc::now(),
        })
    }

    fn dispatch_external(&self, phone: &str, message: &str) -> Result<bool, NotifierError> {
        self.external
            .lock()
            .expect("notifier mutex poisoned")
            .push((phone.to_string(), message.to_string()));
        Ok(true)
    }
}

pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send(&self, _draft: NotificationDraft) -> Result<Notification, NotifierError> {
        Err(NotifierError::Transport("inbox offline".to_string()))
    }

    fn dispatch_external(&self, _phone: &str, _message: &str) -> Result<bool, NotifierError> {
        Err(NotifierError::Transport("gateway offline".to_string()))
    }
}

pub(super) struct UnavailableDirectory;

impl Directory for UnavailableDirectory {
    fn category(&self, _id: &CategoryId) -> Result<Option<ServiceCategory>, DirectoryError> {
        Err(DirectoryError::Unavailable("profile service offline".to_string()))
    }

    fn provider_profile(&self, _user_id: &UserId) -> Result<Option<ProviderRef>, DirectoryError> {
        Err(DirectoryError::Unavailable("profile service offline".to_string()))
    }

    fn eligible_providers(
        &self,
        _category: &CategoryId,
        _city: Option<&str>,
        _state: Option<&str>,
    ) -> Result<Vec<ProviderRef>, DirectoryError> {
        Err(DirectoryError::Unavailable("profile service offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
