use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    AssignmentId, Notification, NotificationId, RequestId, ServiceAssignment, ServiceRequest,
    ServiceReview, UserId,
};

/// Which requests a listing should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestScope {
    All,
    OwnedBy(UserId),
    /// Every open request plus any request the provider has proposed on.
    VisibleToProvider(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentFilter {
    All,
    ForRequest(RequestId),
    ForProvider(UserId),
    ForClient(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewFilter {
    All,
    ForProvider(UserId),
    ByReviewer(UserId),
    ForAssignment(AssignmentId),
}

/// Result of the accept transition, applied as one unit.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptOutcome {
    pub assignment: ServiceAssignment,
    pub request: ServiceRequest,
    pub rejected: Vec<AssignmentId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteOutcome {
    pub assignment: ServiceAssignment,
    pub request: ServiceRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub request: ServiceRequest,
    pub cancelled_proposals: Vec<AssignmentId>,
}

/// Storage for requests, proposals and reviews.
///
/// Methods that touch more than one record (`accept_assignment`,
/// `complete_assignment`, `cancel_request`) are atomic: they re-check the
/// guarding status inside the store and fail with
/// [`RepositoryError::StaleState`] without writing anything when it no longer
/// holds. `insert_assignment` and `insert_review` enforce their uniqueness
/// keys the same way.
pub trait MarketplaceRepository: Send + Sync {
    fn insert_request(&self, request: ServiceRequest) -> Result<ServiceRequest, RepositoryError>;
    /// Replaces the stored fields but keeps the stored status.
    fn update_request(&self, request: ServiceRequest) -> Result<(), RepositoryError>;
    fn fetch_request(&self, id: &RequestId) -> Result<Option<ServiceRequest>, RepositoryError>;
    fn list_requests(&self, scope: &RequestScope) -> Result<Vec<ServiceRequest>, RepositoryError>;
    fn cancel_request(
        &self,
        id: &RequestId,
        at: DateTime<Utc>,
    ) -> Result<CancelOutcome, RepositoryError>;

    /// Fails with `Conflict` when the provider already proposed on the request
    /// and with `StaleState` when the request is no longer open.
    fn insert_assignment(
        &self,
        assignment: ServiceAssignment,
    ) -> Result<ServiceAssignment, RepositoryError>;
    fn fetch_assignment(
        &self,
        id: &AssignmentId,
    ) -> Result<Option<ServiceAssignment>, RepositoryError>;
    fn list_assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<ServiceAssignment>, RepositoryError>;
    fn accept_assignment(
        &self,
        id: &AssignmentId,
        at: DateTime<Utc>,
    ) -> Result<AcceptOutcome, RepositoryError>;
    fn complete_assignment(
        &self,
        id: &AssignmentId,
        at: DateTime<Utc>,
    ) -> Result<CompleteOutcome, RepositoryError>;
    fn withdraw_assignment(
        &self,
        id: &AssignmentId,
        at: DateTime<Utc>,
    ) -> Result<ServiceAssignment, RepositoryError>;

    /// Fails with `Conflict` when the assignment already has a review.
    fn insert_review(&self, review: ServiceReview) -> Result<ServiceReview, RepositoryError>;
    fn list_reviews(&self, filter: &ReviewFilter) -> Result<Vec<ServiceReview>, RepositoryError>;
}

/// Persistence for in-app notifications.
pub trait NotificationRepository: Send + Sync {
    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError>;
    fn notifications_for(
        &self,
        recipient: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError>;
    /// `NotFound` unless the notification belongs to `recipient`.
    fn mark_read(
        &self,
        id: &NotificationId,
        recipient: &UserId,
    ) -> Result<Notification, RepositoryError>;
    fn mark_all_read(&self, recipient: &UserId) -> Result<usize, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("state changed before the write: {0}")]
    StaleState(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
