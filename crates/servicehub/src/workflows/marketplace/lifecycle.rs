use chrono::Utc;
use tracing::{info, warn};

use super::directory::Directory;
use super::domain::{
    Actor, NewServiceRequest, RequestId, RequestStatus, Role, ServiceRequest,
    ServiceRequestUpdate,
};
use super::notifications::Notifier;
use super::repository::{
    AssignmentFilter, CancelOutcome, MarketplaceRepository, NotificationRepository,
    RepositoryError, RequestScope,
};
use super::service::{MarketplaceError, MarketplaceService};
use super::validation::{check_request_fields, ensure_category_open};

impl<R, D, N> MarketplaceService<R, D, N>
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    /// Post a new request in `open` and alert eligible providers.
    pub fn create_request(
        &self,
        actor: &Actor,
        input: NewServiceRequest,
    ) -> Result<ServiceRequest, MarketplaceError> {
        if actor.role != Role::Client {
            return Err(MarketplaceError::forbidden(actor, "create service requests"));
        }

        check_request_fields(
            &input.title,
            &input.description,
            &input.location,
            &input.budget,
        )?;
        let category = self.directory.category(&input.category_id)?;
        ensure_category_open(&input.category_id, category)?;

        let now = Utc::now();
        let request = ServiceRequest {
            id: RequestId::next(),
            client_id: actor.id.clone(),
            category_id: input.category_id,
            title: input.title,
            description: input.description,
            location: input.location,
            preferred_date: input.preferred_date,
            budget: input.budget,
            priority: input.priority,
            status: RequestStatus::Open,
            images: input.images,
            created_at: now,
            updated_at: now,
        };

        let stored = self.repository.insert_request(request)?;
        info!(
            request_id = %stored.id,
            client = %stored.client_id,
            category = %stored.category_id,
            "service request created"
        );

        let fan_out = self.notify_eligible_providers(&stored);
        if fan_out.dispatch.failed > 0 {
            warn!(
                request_id = %stored.id,
                failed = fan_out.dispatch.failed,
                "provider fan-out finished with failures"
            );
        }

        Ok(stored)
    }

    /// Owner-only partial update; status is left to the transitions.
    pub fn update_request(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        update: ServiceRequestUpdate,
    ) -> Result<ServiceRequest, MarketplaceError> {
        let mut request = self.load_request(request_id)?;
        if request.client_id != actor.id {
            return Err(MarketplaceError::forbidden(actor, "update this request"));
        }

        if let Some(category_id) = update.category_id.as_ref() {
            if category_id != &request.category_id {
                let category = self.directory.category(category_id)?;
                ensure_category_open(category_id, category)?;
            }
        }

        update.apply_to(&mut request);
        check_request_fields(
            &request.title,
            &request.description,
            &request.location,
            &request.budget,
        )?;
        request.updated_at = Utc::now();

        self.repository.update_request(request.clone())?;
        info!(request_id = %request.id, "service request updated");
        Ok(request)
    }

    /// Soft delete: the request and its pending proposals become `cancelled`.
    pub fn cancel_request(
        &self,
        actor: &Actor,
        request_id: &RequestId,
    ) -> Result<CancelOutcome, MarketplaceError> {
        let request = self.load_request(request_id)?;
        if request.client_id != actor.id {
            return Err(MarketplaceError::forbidden(actor, "cancel this request"));
        }
        if request.status != RequestStatus::Open {
            return Err(MarketplaceError::request_state(&request, "cancelled"));
        }

        let outcome = match self.repository.cancel_request(request_id, Utc::now()) {
            Ok(outcome) => outcome,
            Err(RepositoryError::StaleState(_)) => {
                let current = self.load_request(request_id)?;
                return Err(MarketplaceError::request_state(&current, "cancelled"));
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            request_id = %outcome.request.id,
            cancelled_proposals = outcome.cancelled_proposals.len(),
            "service request cancelled"
        );
        Ok(outcome)
    }

    /// Requests visible to the actor, newest first.
    pub fn list_requests(&self, actor: &Actor) -> Result<Vec<ServiceRequest>, MarketplaceError> {
        let scope = match actor.role {
            Role::Client => RequestScope::OwnedBy(actor.id.clone()),
            Role::Provider => RequestScope::VisibleToProvider(actor.id.clone()),
            Role::Admin => RequestScope::All,
        };
        let mut requests = self.repository.list_requests(&scope)?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(requests)
    }

    /// A single request, hidden as not found when outside the actor's view.
    pub fn get_request(
        &self,
        actor: &Actor,
        request_id: &RequestId,
    ) -> Result<ServiceRequest, MarketplaceError> {
        let request = self.load_request(request_id)?;
        if self.request_visible(actor, &request)? {
            Ok(request)
        } else {
            Err(MarketplaceError::not_found(
                "service request",
                request_id.as_str(),
            ))
        }
    }

    fn request_visible(
        &self,
        actor: &Actor,
        request: &ServiceRequest,
    ) -> Result<bool, MarketplaceError> {
        match actor.role {
            Role::Admin => Ok(true),
            Role::Client => Ok(request.client_id == actor.id),
            Role::Provider => {
                if request.status == RequestStatus::Open {
                    return Ok(true);
                }
                let proposals = self
                    .repository
                    .list_assignments(&AssignmentFilter::ForRequest(request.id.clone()))?;
                Ok(proposals
                    .iter()
                    .any(|proposal| proposal.provider_id == actor.id))
            }
        }
    }
}
