use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    Notification, NotificationId, NotificationKind, RequestId, ServiceAssignment, ServiceRequest,
    UserId,
};
use super::repository::{NotificationRepository, RepositoryError};
use crate::config::MarketplaceConfig;

pub const DEFAULT_COUNTRY_CODE: &str = "55";

/// In-app alert before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationDraft {
    pub recipient: UserId,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub related_request: Option<RequestId>,
}

/// Outbound alert capability injected into the workflow.
pub trait Notifier: Send + Sync {
    /// Persist an in-app notification for the recipient.
    fn send(&self, draft: NotificationDraft) -> Result<Notification, NotifierError>;

    /// Best-effort off-channel message. `Ok(false)` means nothing was sent.
    fn dispatch_external(&self, phone: &str, message: &str) -> Result<bool, NotifierError>;
}

/// Transport behind [`Notifier::dispatch_external`] (messaging gateway, SMS, ...).
pub trait MessageChannel: Send + Sync {
    fn deliver(&self, phone: &str, message: &str) -> Result<(), NotifierError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("notification storage failed: {0}")]
    Storage(#[from] RepositoryError),
    #[error("message transport unavailable: {0}")]
    Transport(String),
}

/// Controls for the off-channel leg of the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub country_code: String,
    pub external_enabled: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            external_enabled: true,
        }
    }
}

impl From<&MarketplaceConfig> for DispatchPolicy {
    fn from(config: &MarketplaceConfig) -> Self {
        Self {
            country_code: config.country_code.clone(),
            external_enabled: config.external_alerts,
        }
    }
}

/// Notifier persisting to a [`NotificationRepository`] and sending through a
/// [`MessageChannel`].
pub struct InboxNotifier<R, C> {
    inbox: Arc<R>,
    channel: Arc<C>,
    policy: DispatchPolicy,
}

impl<R, C> InboxNotifier<R, C>
where
    R: NotificationRepository,
    C: MessageChannel,
{
    pub fn new(inbox: Arc<R>, channel: Arc<C>, policy: DispatchPolicy) -> Self {
        Self {
            inbox,
            channel,
            policy,
        }
    }
}

impl<R, C> Notifier for InboxNotifier<R, C>
where
    R: NotificationRepository,
    C: MessageChannel,
{
    fn send(&self, draft: NotificationDraft) -> Result<Notification, NotifierError> {
        let notification = Notification {
            id: NotificationId::next(),
            recipient: draft.recipient,
            title: draft.title,
            message: draft.message,
            kind: draft.kind,
            is_read: false,
            related_request: draft.related_request,
            created_at: Utc::now(),
        };
        Ok(self.inbox.insert_notification(notification)?)
    }

    fn dispatch_external(&self, phone: &str, message: &str) -> Result<bool, NotifierError> {
        if !self.policy.external_enabled {
            return Ok(false);
        }
        let formatted = normalize_phone(phone, &self.policy.country_code);
        if formatted.is_empty() {
            return Ok(false);
        }
        self.channel.deliver(&formatted, message)?;
        Ok(true)
    }
}

/// Strip formatting and make sure the number carries the country code.
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() || digits.starts_with(country_code) {
        return digits;
    }
    let national = digits.strip_prefix('0').unwrap_or(&digits);
    format!("{country_code}{national}")
}

pub fn new_request_message(request: &ServiceRequest, category_name: &str) -> String {
    format!(
        "New service request!\n\n\
         Service: {title}\n\
         Category: {category_name}\n\
         Location: {city}, {state}\n\
         Budget: {budget}\n\
         Priority: {priority}\n\n\
         Description:\n{description}\n\n\
         Address:\n{address}\n\n\
         Open the platform for details and to send your proposal.",
        title = request.title,
        city = request.location.city,
        state = request.location.state,
        budget = request.budget.describe(),
        priority = request.priority.label(),
        description = request.description,
        address = request.location.address,
    )
}

pub fn proposal_accepted_message(
    assignment: &ServiceAssignment,
    request: &ServiceRequest,
) -> String {
    let notes = if assignment.notes.trim().is_empty() {
        "No additional notes"
    } else {
        assignment.notes.as_str()
    };
    format!(
        "Proposal accepted!\n\n\
         Your proposal for \"{title}\" was accepted.\n\n\
         Price: {price}\n\
         Estimated duration: {hours} h\n\
         Address: {address}\n\n\
         Notes:\n{notes}\n\n\
         Open the platform to manage the service.",
        title = request.title,
        price = assignment.proposed_price,
        hours = assignment.estimated_hours,
        address = request.location.address,
    )
}

/// Tally of one outbox flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }

    pub fn absorb(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OutboundNotice {
    InApp(NotificationDraft),
    External {
        recipient: UserId,
        phone: String,
        message: String,
    },
}

/// Notices collected during a transition and flushed once the store commits.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    notices: Vec<OutboundNotice>,
}

impl Outbox {
    pub(crate) fn in_app(
        &mut self,
        recipient: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        related_request: Option<RequestId>,
    ) {
        self.notices.push(OutboundNotice::InApp(NotificationDraft {
            recipient,
            title: title.into(),
            message: message.into(),
            kind,
            related_request,
        }));
    }

    pub(crate) fn external(&mut self, recipient: UserId, phone: &str, message: String) {
        self.notices.push(OutboundNotice::External {
            recipient,
            phone: phone.to_string(),
            message,
        });
    }

    /// Delivery failures are logged and counted, never returned.
    pub(crate) fn flush<N>(self, notifier: &N) -> DispatchReport
    where
        N: Notifier + ?Sized,
    {
        let mut report = DispatchReport::default();
        for notice in self.notices {
            match notice {
                OutboundNotice::InApp(draft) => {
                    let recipient = draft.recipient.clone();
                    let kind = draft.kind;
                    match notifier.send(draft) {
                        Ok(_) => report.delivered += 1,
                        Err(err) => {
                            report.failed += 1;
                            warn!(
                                %recipient,
                                kind = kind.label(),
                                error = %err,
                                "in-app notification failed"
                            );
                        }
                    }
                }
                OutboundNotice::External {
                    recipient,
                    phone,
                    message,
                } => match notifier.dispatch_external(&phone, &message) {
                    Ok(true) => {
                        report.delivered += 1;
                        info!(%recipient, "external alert dispatched");
                    }
                    Ok(false) => report.skipped += 1,
                    Err(err) => {
                        report.failed += 1;
                        warn!(%recipient, error = %err, "external alert failed");
                    }
                },
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::marketplace::domain::{
        AssignmentId, AssignmentStatus, CategoryId, Location, Money, RequestStatus,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[test]
    fn normalize_phone_prepends_country_code() {
        assert_eq!(normalize_phone("(81) 99999-0000", "55"), "5581999990000");
        assert_eq!(normalize_phone("081 99999-0000", "55"), "5581999990000");
        assert_eq!(normalize_phone("+55 81 99999-0000", "55"), "5581999990000");
        assert_eq!(normalize_phone("--", "55"), "");
    }

    #[test]
    fn proposal_message_uses_placeholder_for_empty_notes() {
        let now = Utc::now();
        let request = ServiceRequest {
            id: RequestId("req-1".to_string()),
            client_id: UserId::new("client-1"),
            category_id: CategoryId::new("plumbing"),
            title: "Fix sink".to_string(),
            description: "Sink is clogged".to_string(),
            location: Location {
                address: "Rua A, 1".to_string(),
                city: "Recife".to_string(),
                state: "PE".to_string(),
            },
            preferred_date: None,
            budget: Default::default(),
            priority: Default::default(),
            status: RequestStatus::InProgress,
            images: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let assignment = ServiceAssignment {
            id: AssignmentId("asg-1".to_string()),
            request_id: request.id.clone(),
            provider_id: UserId::new("prov-1"),
            proposed_price: Money(15_050),
            estimated_hours: 3,
            status: AssignmentStatus::Accepted,
            notes: "  ".to_string(),
            created_at: now,
            updated_at: now,
            accepted_at: Some(now),
            completed_at: None,
        };

        let message = proposal_accepted_message(&assignment, &request);
        assert!(message.contains("\"Fix sink\""));
        assert!(message.contains("Price: 150.50"));
        assert!(message.contains("No additional notes"));
    }

    #[derive(Default)]
    struct MemoryInbox {
        rows: Mutex<HashMap<NotificationId, Notification>>,
    }

    impl NotificationRepository for MemoryInbox {
        fn insert_notification(
            &self,
            notification: Notification,
        ) -> Result<Notification, RepositoryError> {
            let mut rows = self.rows.lock().expect("inbox mutex poisoned");
            rows.insert(notification.id.clone(), notification.clone());
            Ok(notification)
        }

        fn notifications_for(
            &self,
            recipient: &UserId,
            _unread_only: bool,
        ) -> Result<Vec<Notification>, RepositoryError> {
            let rows = self.rows.lock().expect("inbox mutex poisoned");
            Ok(rows
                .values()
                .filter(|row| &row.recipient == recipient)
                .cloned()
                .collect())
        }

        fn mark_read(
            &self,
            _id: &NotificationId,
            _recipient: &UserId,
        ) -> Result<Notification, RepositoryError> {
            Err(RepositoryError::NotFound)
        }

        fn mark_all_read(&self, _recipient: &UserId) -> Result<usize, RepositoryError> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct CapturingChannel {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl MessageChannel for CapturingChannel {
        fn deliver(&self, phone: &str, message: &str) -> Result<(), NotifierError> {
            self.sent
                .lock()
                .expect("channel mutex poisoned")
                .push((phone.to_string(), message.to_string()));
            Ok(())
        }
    }

    #[test]
    fn inbox_notifier_persists_and_formats_numbers() {
        let inbox = Arc::new(MemoryInbox::default());
        let channel = Arc::new(CapturingChannel::default());
        let notifier =
            InboxNotifier::new(inbox.clone(), channel.clone(), DispatchPolicy::default());

        let stored = notifier
            .send(NotificationDraft {
                recipient: UserId::new("prov-1"),
                title: "Hello".to_string(),
                message: "World".to_string(),
                kind: NotificationKind::General,
                related_request: None,
            })
            .expect("notification stored");
        assert!(!stored.is_read);
        assert_eq!(
            inbox
                .notifications_for(&UserId::new("prov-1"), false)
                .expect("inbox readable")
                .len(),
            1
        );

        assert!(notifier
            .dispatch_external("(81) 98888-7777", "ping")
            .expect("dispatch succeeds"));
        let sent = channel.sent.lock().expect("channel mutex poisoned");
        assert_eq!(sent[0].0, "5581988887777");
    }

    #[test]
    fn disabled_external_alerts_are_skipped() {
        let notifier = InboxNotifier::new(
            Arc::new(MemoryInbox::default()),
            Arc::new(CapturingChannel::default()),
            DispatchPolicy {
                country_code: DEFAULT_COUNTRY_CODE.to_string(),
                external_enabled: false,
            },
        );
        assert!(!notifier
            .dispatch_external("81999990000", "ping")
            .expect("skip is not an error"));
    }
}
