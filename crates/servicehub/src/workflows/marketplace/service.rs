use std::sync::Arc;

use super::directory::{Directory, DirectoryError};
use super::domain::{Actor, AssignmentId, RequestId, ServiceAssignment, ServiceRequest, UserId};
use super::notifications::{DispatchReport, Notifier, Outbox};
use super::repository::{MarketplaceRepository, NotificationRepository, RepositoryError};
use super::validation::ValidationError;

/// Service composing the store, the provider directory and the notifier.
///
/// Operations are split by concern across `lifecycle`, `matching`, `reviews`,
/// `statistics` and `inbox`.
pub struct MarketplaceService<R, D, N> {
    pub(crate) repository: Arc<R>,
    pub(crate) directory: Arc<D>,
    pub(crate) notifier: Arc<N>,
}

impl<R, D, N> MarketplaceService<R, D, N>
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    pub fn new(repository: Arc<R>, directory: Arc<D>, notifier: Arc<N>) -> Self {
        Self {
            repository,
            directory,
            notifier,
        }
    }

    pub(crate) fn load_request(&self, id: &RequestId) -> Result<ServiceRequest, MarketplaceError> {
        self.repository
            .fetch_request(id)?
            .ok_or_else(|| MarketplaceError::not_found("service request", id.as_str()))
    }

    pub(crate) fn load_assignment(
        &self,
        id: &AssignmentId,
    ) -> Result<ServiceAssignment, MarketplaceError> {
        self.repository
            .fetch_assignment(id)?
            .ok_or_else(|| MarketplaceError::not_found("assignment", id.as_str()))
    }

    /// Runs after the store has committed; never fails the caller.
    pub(crate) fn dispatch(&self, outbox: Outbox) -> DispatchReport {
        outbox.flush(self.notifier.as_ref())
    }
}

/// Error raised by the marketplace service.
#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{actor} ({role}) is not allowed to {action}")]
    Authorization {
        actor: UserId,
        role: &'static str,
        action: &'static str,
    },
    #[error("{entity} {id} is {status} and cannot be {action}")]
    InvalidState {
        entity: &'static str,
        id: String,
        status: &'static str,
        action: &'static str,
    },
    #[error("{0}")]
    Conflict(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl MarketplaceError {
    pub const fn kind(&self) -> &'static str {
        match self {
            MarketplaceError::Validation(_) => "validation",
            MarketplaceError::Authorization { .. } => "authorization",
            MarketplaceError::InvalidState { .. } => "invalid_state",
            MarketplaceError::Conflict(_) => "conflict",
            MarketplaceError::NotFound { .. } => "not_found",
            MarketplaceError::Repository(_) => "repository",
            MarketplaceError::Directory(_) => "directory",
        }
    }

    pub(crate) fn forbidden(actor: &Actor, action: &'static str) -> Self {
        MarketplaceError::Authorization {
            actor: actor.id.clone(),
            role: actor.role.label(),
            action,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        MarketplaceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn request_state(request: &ServiceRequest, action: &'static str) -> Self {
        MarketplaceError::InvalidState {
            entity: "service request",
            id: request.id.to_string(),
            status: request.status.label(),
            action,
        }
    }

    pub(crate) fn assignment_state(assignment: &ServiceAssignment, action: &'static str) -> Self {
        MarketplaceError::InvalidState {
            entity: "assignment",
            id: assignment.id.to_string(),
            status: assignment.status.label(),
            action,
        }
    }
}
