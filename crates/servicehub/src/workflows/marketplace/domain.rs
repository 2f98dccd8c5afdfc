use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $prefix:literal, $sequence:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        static $sequence: AtomicU64 = AtomicU64::new(1);

        impl $name {
            pub(crate) fn next() -> Self {
                let id = $sequence.fetch_add(1, Ordering::Relaxed);
                Self(format!(concat!($prefix, "-{:06}"), id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Identifier wrapper for posted service requests.
    RequestId,
    "req",
    REQUEST_SEQUENCE
);
identifier!(
    /// Identifier wrapper for provider proposals.
    AssignmentId,
    "asg",
    ASSIGNMENT_SEQUENCE
);
identifier!(ReviewId, "rev", REVIEW_SEQUENCE);
identifier!(NotificationId, "ntf", NOTIFICATION_SEQUENCE);

/// User identity issued by the upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub String);

impl CategoryId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role claim carried by the authenticated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Provider,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "client" => Some(Role::Client),
            "provider" => Some(Role::Provider),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Authenticated caller of a workflow operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(id),
            role,
        }
    }

    pub fn client(id: impl Into<String>) -> Self {
        Self::new(id, Role::Client)
    }

    pub fn provider(id: impl Into<String>) -> Self {
        Self::new(id, Role::Provider)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }
}

/// Amount in minor currency units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(pub u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_units(units: u64) -> Self {
        Money(units.saturating_mul(100))
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Client-declared price expectations for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BudgetRange {
    #[serde(default)]
    pub min: Option<Money>,
    #[serde(default)]
    pub max: Option<Money>,
}

impl BudgetRange {
    pub fn describe(&self) -> String {
        let bound = |value: Option<Money>| match value {
            Some(amount) => amount.to_string(),
            None => "N/A".to_string(),
        };
        format!("{} - {}", bound(self.min), bound(self.max))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const fn label(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }
}

/// Lifecycle of a posted request. `pending` is read as `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[serde(alias = "pending")]
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

/// Category of work offered on the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCategory {
    pub id: CategoryId,
    pub name: String,
    pub is_active: bool,
}

/// A client's posted need for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub client_id: UserId,
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    pub location: Location,
    pub preferred_date: Option<DateTime<Utc>>,
    pub budget: BudgetRange,
    pub priority: Priority,
    pub status: RequestStatus,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client input for posting a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewServiceRequest {
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    pub location: Location,
    #[serde(default)]
    pub budget: BudgetRange,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub preferred_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Partial update of a request; absent fields keep their stored value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceRequestUpdate {
    pub category_id: Option<CategoryId>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub preferred_date: Option<DateTime<Utc>>,
    pub budget_min: Option<Money>,
    pub budget_max: Option<Money>,
    pub priority: Option<Priority>,
    pub images: Option<Vec<String>>,
}

impl ServiceRequestUpdate {
    pub(crate) fn apply_to(self, request: &mut ServiceRequest) {
        if let Some(category_id) = self.category_id {
            request.category_id = category_id;
        }
        if let Some(title) = self.title {
            request.title = title;
        }
        if let Some(description) = self.description {
            request.description = description;
        }
        if let Some(address) = self.address {
            request.location.address = address;
        }
        if let Some(city) = self.city {
            request.location.city = city;
        }
        if let Some(state) = self.state {
            request.location.state = state;
        }
        if let Some(date) = self.preferred_date {
            request.preferred_date = Some(date);
        }
        if let Some(min) = self.budget_min {
            request.budget.min = Some(min);
        }
        if let Some(max) = self.budget_max {
            request.budget.max = Some(max);
        }
        if let Some(priority) = self.priority {
            request.priority = priority;
        }
        if let Some(images) = self.images {
            request.images = images;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Accepted => "accepted",
            AssignmentStatus::Rejected => "rejected",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }

    /// Accepted or completed: the proposal that won its request.
    pub const fn is_awarded(self) -> bool {
        matches!(self, AssignmentStatus::Accepted | AssignmentStatus::Completed)
    }
}

/// A provider's priced offer against a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAssignment {
    pub id: AssignmentId,
    pub request_id: RequestId,
    pub provider_id: UserId,
    pub proposed_price: Money,
    pub estimated_hours: u32,
    pub status: AssignmentStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Provider input for a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSubmission {
    pub request_id: RequestId,
    pub proposed_price: Money,
    pub estimated_hours: u32,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReview {
    pub id: ReviewId,
    pub assignment_id: AssignmentId,
    pub request_id: RequestId,
    pub provider_id: UserId,
    pub reviewer_id: UserId,
    pub rating: u8,
    pub comment: String,
    pub would_recommend: bool,
    pub created_at: DateTime<Utc>,
}

fn recommend_by_default() -> bool {
    true
}

/// Client input for reviewing a completed assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub assignment_id: AssignmentId,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    #[serde(default = "recommend_by_default")]
    pub would_recommend: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewRequest,
    AssignmentAccepted,
    ServiceCompleted,
    ReviewReceived,
    General,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::NewRequest => "new_request",
            NotificationKind::AssignmentAccepted => "assignment_accepted",
            NotificationKind::ServiceCompleted => "service_completed",
            NotificationKind::ReviewReceived => "review_received",
            NotificationKind::General => "general",
        }
    }
}

/// In-app alert persisted for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: UserId,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub related_request: Option<RequestId>,
    pub created_at: DateTime<Utc>,
}

/// Directory view of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRef {
    pub user_id: UserId,
    pub display_name: String,
    pub phone: Option<String>,
    pub categories: Vec<CategoryId>,
    pub city: String,
    pub state: String,
    pub is_active: bool,
    pub is_available: bool,
}

impl ProviderRef {
    pub fn contact_phone(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
    }

    /// Active, available, and reachable off-channel.
    pub fn is_eligible(&self) -> bool {
        self.is_active && self.is_available && self.contact_phone().is_some()
    }

    pub fn serves(&self, category: &CategoryId) -> bool {
        self.categories.iter().any(|candidate| candidate == category)
    }
}
