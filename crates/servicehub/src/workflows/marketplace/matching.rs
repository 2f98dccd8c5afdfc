use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::directory::{Directory, DirectoryError, SearchScope};
use super::domain::{
    Actor, AssignmentId, AssignmentStatus, NotificationKind, ProposalSubmission, ProviderRef,
    RequestId, RequestStatus, Role, ServiceAssignment, ServiceRequest,
};
use super::notifications::{
    new_request_message, proposal_accepted_message, DispatchReport, Notifier, Outbox,
};
use super::repository::{
    AcceptOutcome, AssignmentFilter, CompleteOutcome, MarketplaceRepository,
    NotificationRepository, RepositoryError,
};
use super::service::{MarketplaceError, MarketplaceService};
use super::validation::{check_proposal, ValidationError};

/// Summary of one provider fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    /// `None` when no scope produced an eligible provider.
    pub scope: Option<SearchScope>,
    pub providers: usize,
    pub dispatch: DispatchReport,
}

impl<R, D, N> MarketplaceService<R, D, N>
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    /// Submit a `pending` proposal against an open request.
    pub fn propose(
        &self,
        actor: &Actor,
        submission: ProposalSubmission,
    ) -> Result<ServiceAssignment, MarketplaceError> {
        if actor.role != Role::Provider {
            return Err(MarketplaceError::forbidden(actor, "submit proposals"));
        }

        let request = self.load_request(&submission.request_id)?;
        if request.status != RequestStatus::Open {
            return Err(MarketplaceError::request_state(&request, "proposed on"));
        }

        let existing = self
            .repository
            .list_assignments(&AssignmentFilter::ForRequest(request.id.clone()))?;
        if existing
            .iter()
            .any(|assignment| assignment.provider_id == actor.id)
        {
            return Err(duplicate_proposal(&request.id));
        }

        if self.directory.provider_profile(&actor.id)?.is_none() {
            return Err(ValidationError::MissingProviderProfile.into());
        }
        check_proposal(&submission)?;

        let now = Utc::now();
        let assignment = ServiceAssignment {
            id: AssignmentId::next(),
            request_id: request.id.clone(),
            provider_id: actor.id.clone(),
            proposed_price: submission.proposed_price,
            estimated_hours: submission.estimated_hours,
            status: AssignmentStatus::Pending,
            notes: submission.notes,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            completed_at: None,
        };

        let stored = match self.repository.insert_assignment(assignment) {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => return Err(duplicate_proposal(&request.id)),
            Err(RepositoryError::StaleState(_)) => {
                let current = self.load_request(&request.id)?;
                return Err(MarketplaceError::request_state(&current, "proposed on"));
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            assignment_id = %stored.id,
            request_id = %stored.request_id,
            provider = %stored.provider_id,
            price = %stored.proposed_price,
            "proposal submitted"
        );
        Ok(stored)
    }

    /// Award the request to one proposal and reject its siblings.
    pub fn accept(
        &self,
        actor: &Actor,
        assignment_id: &AssignmentId,
    ) -> Result<AcceptOutcome, MarketplaceError> {
        let assignment = self.load_assignment(assignment_id)?;
        let request = self.load_request(&assignment.request_id)?;
        if request.client_id != actor.id {
            return Err(MarketplaceError::forbidden(
                actor,
                "accept proposals on this request",
            ));
        }
        if assignment.status != AssignmentStatus::Pending {
            return Err(MarketplaceError::assignment_state(&assignment, "accepted"));
        }
        if request.status != RequestStatus::Open {
            return Err(MarketplaceError::request_state(&request, "assigned"));
        }

        let outcome = match self.repository.accept_assignment(assignment_id, Utc::now()) {
            Ok(outcome) => outcome,
            Err(RepositoryError::StaleState(_)) => {
                return Err(self.stale_accept(assignment_id));
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            assignment_id = %outcome.assignment.id,
            request_id = %outcome.request.id,
            rejected = outcome.rejected.len(),
            "proposal accepted"
        );

        let provider = outcome.assignment.provider_id.clone();
        let mut outbox = Outbox::default();
        outbox.in_app(
            provider.clone(),
            NotificationKind::AssignmentAccepted,
            "Proposal accepted!",
            format!(
                "Your proposal for \"{}\" was accepted.",
                outcome.request.title
            ),
            Some(outcome.request.id.clone()),
        );
        match self.directory.provider_profile(&provider) {
            Ok(Some(profile)) => {
                if let Some(phone) = profile.contact_phone() {
                    outbox.external(
                        provider.clone(),
                        phone,
                        proposal_accepted_message(&outcome.assignment, &outcome.request),
                    );
                }
            }
            Ok(None) => debug!(%provider, "accepted provider has no directory profile"),
            Err(err) => warn!(%provider, error = %err, "provider lookup failed"),
        }
        self.dispatch(outbox);

        Ok(outcome)
    }

    /// Close an accepted assignment and its request.
    pub fn complete(
        &self,
        actor: &Actor,
        assignment_id: &AssignmentId,
    ) -> Result<CompleteOutcome, MarketplaceError> {
        let assignment = self.load_assignment(assignment_id)?;
        if assignment.provider_id != actor.id {
            return Err(MarketplaceError::forbidden(actor, "complete this assignment"));
        }
        if assignment.status != AssignmentStatus::Accepted {
            return Err(MarketplaceError::assignment_state(&assignment, "completed"));
        }

        let outcome = match self
            .repository
            .complete_assignment(assignment_id, Utc::now())
        {
            Ok(outcome) => outcome,
            Err(RepositoryError::StaleState(_)) => {
                let current = self.load_assignment(assignment_id)?;
                return Err(MarketplaceError::assignment_state(&current, "completed"));
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            assignment_id = %outcome.assignment.id,
            request_id = %outcome.request.id,
            "service completed"
        );

        let mut outbox = Outbox::default();
        outbox.in_app(
            outcome.request.client_id.clone(),
            NotificationKind::ServiceCompleted,
            "Service completed!",
            format!(
                "The service \"{}\" was marked as completed.",
                outcome.request.title
            ),
            Some(outcome.request.id.clone()),
        );
        self.dispatch(outbox);

        Ok(outcome)
    }

    /// Provider retracts a proposal that is still `pending`.
    pub fn withdraw(
        &self,
        actor: &Actor,
        assignment_id: &AssignmentId,
    ) -> Result<ServiceAssignment, MarketplaceError> {
        let assignment = self.load_assignment(assignment_id)?;
        if assignment.provider_id != actor.id {
            return Err(MarketplaceError::forbidden(actor, "withdraw this proposal"));
        }
        if assignment.status != AssignmentStatus::Pending {
            return Err(MarketplaceError::assignment_state(&assignment, "withdrawn"));
        }

        let withdrawn = match self
            .repository
            .withdraw_assignment(assignment_id, Utc::now())
        {
            Ok(withdrawn) => withdrawn,
            Err(RepositoryError::StaleState(_)) => {
                let current = self.load_assignment(assignment_id)?;
                return Err(MarketplaceError::assignment_state(&current, "withdrawn"));
            }
            Err(err) => return Err(err.into()),
        };

        info!(assignment_id = %withdrawn.id, "proposal withdrawn");
        Ok(withdrawn)
    }

    /// Proposals visible to the actor, optionally narrowed to one request.
    pub fn list_assignments(
        &self,
        actor: &Actor,
        request_id: Option<&RequestId>,
    ) -> Result<Vec<ServiceAssignment>, MarketplaceError> {
        let filter = match actor.role {
            Role::Client => AssignmentFilter::ForClient(actor.id.clone()),
            Role::Provider => AssignmentFilter::ForProvider(actor.id.clone()),
            Role::Admin => match request_id {
                Some(id) => AssignmentFilter::ForRequest(id.clone()),
                None => AssignmentFilter::All,
            },
        };

        let mut assignments = self.repository.list_assignments(&filter)?;
        if let Some(id) = request_id {
            assignments.retain(|assignment| &assignment.request_id == id);
        }
        assignments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(assignments)
    }

    pub fn get_assignment(
        &self,
        actor: &Actor,
        assignment_id: &AssignmentId,
    ) -> Result<ServiceAssignment, MarketplaceError> {
        let assignment = self.load_assignment(assignment_id)?;
        let visible = match actor.role {
            Role::Admin => true,
            Role::Provider => assignment.provider_id == actor.id,
            Role::Client => {
                let request = self.load_request(&assignment.request_id)?;
                request.client_id == actor.id
            }
        };
        if visible {
            Ok(assignment)
        } else {
            Err(MarketplaceError::not_found(
                "assignment",
                assignment_id.as_str(),
            ))
        }
    }

    /// Alert providers that can take the request, widening the location
    /// scope when the narrower one finds nobody.
    pub fn notify_eligible_providers(&self, request: &ServiceRequest) -> FanOutReport {
        let mut report = FanOutReport::default();

        let (scope, providers) = match self.eligible_providers_for(request) {
            Ok(Some(found)) => found,
            Ok(None) => {
                debug!(request_id = %request.id, "no eligible providers in any scope");
                return report;
            }
            Err(err) => {
                warn!(
                    request_id = %request.id,
                    error = %err,
                    "provider lookup failed, skipping fan-out"
                );
                return report;
            }
        };

        let category_name = match self.directory.category(&request.category_id) {
            Ok(Some(category)) => category.name,
            Ok(None) | Err(_) => request.category_id.to_string(),
        };
        let message = new_request_message(request, &category_name);

        report.scope = Some(scope);
        report.providers = providers.len();
        for provider in providers {
            let mut outbox = Outbox::default();
            outbox.in_app(
                provider.user_id.clone(),
                NotificationKind::NewRequest,
                format!("New request: {}", request.title),
                format!(
                    "A new {} request was posted in {}, {}.",
                    category_name, request.location.city, request.location.state
                ),
                Some(request.id.clone()),
            );
            if let Some(phone) = provider.contact_phone() {
                outbox.external(provider.user_id.clone(), phone, message.clone());
            }
            report.dispatch.absorb(self.dispatch(outbox));
        }

        info!(
            request_id = %request.id,
            scope = ?scope,
            providers = report.providers,
            delivered = report.dispatch.delivered,
            failed = report.dispatch.failed,
            "provider fan-out dispatched"
        );
        report
    }

    fn eligible_providers_for(
        &self,
        request: &ServiceRequest,
    ) -> Result<Option<(SearchScope, Vec<ProviderRef>)>, DirectoryError> {
        for scope in SearchScope::CASCADE {
            let (city, state) = scope.bounds(&request.location.city, &request.location.state);
            let providers: Vec<ProviderRef> = self
                .directory
                .eligible_providers(&request.category_id, city, state)?
                .into_iter()
                .filter(|provider| {
                    provider.is_eligible() && provider.serves(&request.category_id)
                })
                .collect();
            if !providers.is_empty() {
                return Ok(Some((scope, providers)));
            }
            debug!(request_id = %request.id, scope = ?scope, "no eligible providers in scope");
        }
        Ok(None)
    }

    fn stale_accept(&self, assignment_id: &AssignmentId) -> MarketplaceError {
        let assignment = match self.load_assignment(assignment_id) {
            Ok(assignment) => assignment,
            Err(err) => return err,
        };
        if assignment.status != AssignmentStatus::Pending {
            return MarketplaceError::assignment_state(&assignment, "accepted");
        }
        match self.load_request(&assignment.request_id) {
            Ok(request) => MarketplaceError::request_state(&request, "assigned"),
            Err(err) => err,
        }
    }
}

fn duplicate_proposal(request_id: &RequestId) -> MarketplaceError {
    MarketplaceError::Conflict(format!(
        "provider already submitted a proposal for request {request_id}"
    ))
}
