use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::workflows::marketplace::domain::{
    AssignmentId, AssignmentStatus, Notification, NotificationId, RequestId, RequestStatus,
    ReviewId, ServiceAssignment, ServiceRequest, ServiceReview, UserId,
};
use crate::workflows::marketplace::repository::{
    AcceptOutcome, AssignmentFilter, CancelOutcome, CompleteOutcome, MarketplaceRepository,
    NotificationRepository, RepositoryError, RequestScope, ReviewFilter,
};

#[derive(Debug, Default)]
struct StoreState {
    requests: HashMap<RequestId, ServiceRequest>,
    assignments: HashMap<AssignmentId, ServiceAssignment>,
    reviews: HashMap<ReviewId, ServiceReview>,
    notifications: HashMap<NotificationId, Notification>,
}

impl StoreState {
    fn request_mut(&mut self, id: &RequestId) -> Result<&mut ServiceRequest, RepositoryError> {
        self.requests.get_mut(id).ok_or(RepositoryError::NotFound)
    }

    fn assignment(&self, id: &AssignmentId) -> Result<&ServiceAssignment, RepositoryError> {
        self.assignments.get(id).ok_or(RepositoryError::NotFound)
    }

    fn client_of(&self, request_id: &RequestId) -> Option<&UserId> {
        self.requests
            .get(request_id)
            .map(|request| &request.client_id)
    }
}

/// Process-local store; every method runs under one lock so multi-record
/// transitions apply as a unit.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMarketplaceStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryMarketplaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }
}

fn stale(entity: &str, id: &str, status: &str) -> RepositoryError {
    RepositoryError::StaleState(format!("{entity} {id} is {status}"))
}

impl MarketplaceRepository for InMemoryMarketplaceStore {
    fn insert_request(&self, request: ServiceRequest) -> Result<ServiceRequest, RepositoryError> {
        let mut state = self.lock()?;
        if state.requests.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        state.requests.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn update_request(&self, mut request: ServiceRequest) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let stored = state.request_mut(&request.id)?;
        request.status = stored.status;
        *stored = request;
        Ok(())
    }

    fn fetch_request(&self, id: &RequestId) -> Result<Option<ServiceRequest>, RepositoryError> {
        Ok(self.lock()?.requests.get(id).cloned())
    }

    fn list_requests(&self, scope: &RequestScope) -> Result<Vec<ServiceRequest>, RepositoryError> {
        let state = self.lock()?;
        let requests = state
            .requests
            .values()
            .filter(|request| match scope {
                RequestScope::All => true,
                RequestScope::OwnedBy(client) => &request.client_id == client,
                RequestScope::VisibleToProvider(provider) => {
                    request.status == RequestStatus::Open
                        || state.assignments.values().any(|assignment| {
                            assignment.request_id == request.id
                                && &assignment.provider_id == provider
                        })
                }
            })
            .cloned()
            .collect();
        Ok(requests)
    }

    fn cancel_request(
        &self,
        id: &RequestId,
        at: DateTime<Utc>,
    ) -> Result<CancelOutcome, RepositoryError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let request = state.request_mut(id)?;
        if request.status != RequestStatus::Open {
            return Err(stale("request", id.as_str(), request.status.label()));
        }
        request.status = RequestStatus::Cancelled;
        request.updated_at = at;
        let request = request.clone();

        let mut cancelled_proposals = Vec::new();
        for assignment in state.assignments.values_mut() {
            if &assignment.request_id == id && assignment.status == AssignmentStatus::Pending {
                assignment.status = AssignmentStatus::Cancelled;
                assignment.updated_at = at;
                cancelled_proposals.push(assignment.id.clone());
            }
        }
        cancelled_proposals.sort();

        Ok(CancelOutcome {
            request,
            cancelled_proposals,
        })
    }

    fn insert_assignment(
        &self,
        assignment: ServiceAssignment,
    ) -> Result<ServiceAssignment, RepositoryError> {
        let mut state = self.lock()?;
        let request = state
            .requests
            .get(&assignment.request_id)
            .ok_or(RepositoryError::NotFound)?;
        if request.status != RequestStatus::Open {
            return Err(stale(
                "request",
                request.id.as_str(),
                request.status.label(),
            ));
        }
        let duplicate = state.assignments.values().any(|existing| {
            existing.request_id == assignment.request_id
                && existing.provider_id == assignment.provider_id
        });
        if duplicate || state.assignments.contains_key(&assignment.id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .assignments
            .insert(assignment.id.clone(), assignment.clone());
        Ok(assignment)
    }

    fn fetch_assignment(
        &self,
        id: &AssignmentId,
    ) -> Result<Option<ServiceAssignment>, RepositoryError> {
        Ok(self.lock()?.assignments.get(id).cloned())
    }

    fn list_assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<ServiceAssignment>, RepositoryError> {
        let state = self.lock()?;
        let assignments = state
            .assignments
            .values()
            .filter(|assignment| match filter {
                AssignmentFilter::All => true,
                AssignmentFilter::ForRequest(request) => &assignment.request_id == request,
                AssignmentFilter::ForProvider(provider) => &assignment.provider_id == provider,
                AssignmentFilter::ForClient(client) => {
                    state.client_of(&assignment.request_id) == Some(client)
                }
            })
            .cloned()
            .collect();
        Ok(assignments)
    }

    fn accept_assignment(
        &self,
        id: &AssignmentId,
        at: DateTime<Utc>,
    ) -> Result<AcceptOutcome, RepositoryError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let assignment = state.assignment(id)?;
        if assignment.status != AssignmentStatus::Pending {
            return Err(stale("assignment", id.as_str(), assignment.status.label()));
        }
        let request_id = assignment.request_id.clone();
        let request = state.request_mut(&request_id)?;
        if request.status != RequestStatus::Open {
            return Err(stale(
                "request",
                request_id.as_str(),
                request.status.label(),
            ));
        }

        request.status = RequestStatus::InProgress;
        request.updated_at = at;
        let request = request.clone();

        let mut accepted = None;
        let mut rejected = Vec::new();
        for sibling in state.assignments.values_mut() {
            if sibling.request_id != request_id {
                continue;
            }
            if &sibling.id == id {
                sibling.status = AssignmentStatus::Accepted;
                sibling.accepted_at = Some(at);
                sibling.updated_at = at;
                accepted = Some(sibling.clone());
            } else if sibling.status == AssignmentStatus::Pending {
                sibling.status = AssignmentStatus::Rejected;
                sibling.updated_at = at;
                rejected.push(sibling.id.clone());
            }
        }
        rejected.sort();

        let assignment = accepted.ok_or(RepositoryError::NotFound)?;
        Ok(AcceptOutcome {
            assignment,
            request,
            rejected,
        })
    }

    fn complete_assignment(
        &self,
        id: &AssignmentId,
        at: DateTime<Utc>,
    ) -> Result<CompleteOutcome, RepositoryError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let assignment = state.assignment(id)?;
        if assignment.status != AssignmentStatus::Accepted {
            return Err(stale("assignment", id.as_str(), assignment.status.label()));
        }
        let request_id = assignment.request_id.clone();

        let request = state.request_mut(&request_id)?;
        request.status = RequestStatus::Completed;
        request.updated_at = at;
        let request = request.clone();

        let assignment = state
            .assignments
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        assignment.status = AssignmentStatus::Completed;
        assignment.completed_at = Some(at);
        assignment.updated_at = at;

        Ok(CompleteOutcome {
            assignment: assignment.clone(),
            request,
        })
    }

    fn withdraw_assignment(
        &self,
        id: &AssignmentId,
        at: DateTime<Utc>,
    ) -> Result<ServiceAssignment, RepositoryError> {
        let mut state = self.lock()?;
        let assignment = state
            .assignments
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        if assignment.status != AssignmentStatus::Pending {
            return Err(stale("assignment", id.as_str(), assignment.status.label()));
        }
        assignment.status = AssignmentStatus::Cancelled;
        assignment.updated_at = at;
        Ok(assignment.clone())
    }

    fn insert_review(&self, review: ServiceReview) -> Result<ServiceReview, RepositoryError> {
        let mut state = self.lock()?;
        let duplicate = state
            .reviews
            .values()
            .any(|existing| existing.assignment_id == review.assignment_id);
        if duplicate || state.reviews.contains_key(&review.id) {
            return Err(RepositoryError::Conflict);
        }
        state.reviews.insert(review.id.clone(), review.clone());
        Ok(review)
    }

    fn list_reviews(&self, filter: &ReviewFilter) -> Result<Vec<ServiceReview>, RepositoryError> {
        let state = self.lock()?;
        let reviews = state
            .reviews
            .values()
            .filter(|review| match filter {
                ReviewFilter::All => true,
                ReviewFilter::ForProvider(provider) => &review.provider_id == provider,
                ReviewFilter::ByReviewer(reviewer) => &review.reviewer_id == reviewer,
                ReviewFilter::ForAssignment(assignment) => &review.assignment_id == assignment,
            })
            .cloned()
            .collect();
        Ok(reviews)
    }
}

impl NotificationRepository for InMemoryMarketplaceStore {
    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError> {
        let mut state = self.lock()?;
        if state.notifications.contains_key(&notification.id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .notifications
            .insert(notification.id.clone(), notification.clone());
        Ok(notification)
    }

    fn notifications_for(
        &self,
        recipient: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .notifications
            .values()
            .filter(|row| &row.recipient == recipient && !(unread_only && row.is_read))
            .cloned()
            .collect())
    }

    fn mark_read(
        &self,
        id: &NotificationId,
        recipient: &UserId,
    ) -> Result<Notification, RepositoryError> {
        let mut state = self.lock()?;
        match state.notifications.get_mut(id) {
            Some(row) if &row.recipient == recipient => {
                row.is_read = true;
                Ok(row.clone())
            }
            _ => Err(RepositoryError::NotFound),
        }
    }

    fn mark_all_read(&self, recipient: &UserId) -> Result<usize, RepositoryError> {
        let mut state = self.lock()?;
        let mut updated = 0;
        for row in state.notifications.values_mut() {
            if &row.recipient == recipient && !row.is_read {
                row.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }
}
