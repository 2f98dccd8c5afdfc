//! Service marketplace: request lifecycle, proposal matching, reviews and
//! the statistics derived from them.
//!
//! Storage, provider lookup and alert delivery sit behind the
//! [`MarketplaceRepository`], [`Directory`] and [`Notifier`] seams so the
//! workflow can run against the in-memory adapters or real backends.

pub mod directory;
pub mod domain;
mod inbox;
mod lifecycle;
pub mod matching;
pub mod memory;
pub mod notifications;
pub mod repository;
mod reviews;
pub mod router;
pub mod service;
pub mod statistics;
pub mod validation;

#[cfg(test)]
mod tests;

pub use directory::{Directory, DirectoryError, SearchScope};
pub use domain::{
    Actor, AssignmentId, AssignmentStatus, BudgetRange, CategoryId, Location, Money,
    NewServiceRequest, Notification, NotificationId, NotificationKind, Priority,
    ProposalSubmission, ProviderRef, RequestId, RequestStatus, ReviewId, ReviewSubmission, Role,
    ServiceAssignment, ServiceCategory, ServiceRequest, ServiceRequestUpdate, ServiceReview,
    UserId,
};
pub use matching::FanOutReport;
pub use memory::{DirectoryLoadError, InMemoryDirectory, InMemoryMarketplaceStore};
pub use notifications::{
    normalize_phone, DispatchPolicy, DispatchReport, InboxNotifier, MessageChannel,
    NotificationDraft, Notifier, NotifierError,
};
pub use repository::{
    AcceptOutcome, CancelOutcome, CompleteOutcome, MarketplaceRepository, NotificationRepository,
    RepositoryError,
};
pub use router::marketplace_router;
pub use service::{MarketplaceError, MarketplaceService};
pub use statistics::{ClientStatistics, ProviderStatistics, ReviewStatistics, StatisticsView};
pub use validation::ValidationError;
