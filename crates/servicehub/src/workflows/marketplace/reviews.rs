use chrono::Utc;
use tracing::info;

use super::directory::Directory;
use super::domain::{
    Actor, AssignmentId, AssignmentStatus, NotificationKind, ReviewId, ReviewSubmission, Role,
    ServiceReview, UserId,
};
use super::notifications::{Notifier, Outbox};
use super::repository::{
    MarketplaceRepository, NotificationRepository, RepositoryError, ReviewFilter,
};
use super::service::{MarketplaceError, MarketplaceService};
use super::statistics::{review_statistics, ReviewStatistics};
use super::validation::check_rating;

impl<R, D, N> MarketplaceService<R, D, N>
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    /// Record the client's single review of a completed assignment.
    pub fn submit_review(
        &self,
        actor: &Actor,
        submission: ReviewSubmission,
    ) -> Result<ServiceReview, MarketplaceError> {
        let assignment = self.load_assignment(&submission.assignment_id)?;
        if assignment.status != AssignmentStatus::Completed {
            return Err(MarketplaceError::assignment_state(&assignment, "reviewed"));
        }

        let request = self.load_request(&assignment.request_id)?;
        if request.client_id != actor.id {
            return Err(MarketplaceError::forbidden(actor, "review this assignment"));
        }

        let existing = self
            .repository
            .list_reviews(&ReviewFilter::ForAssignment(assignment.id.clone()))?;
        if !existing.is_empty() {
            return Err(duplicate_review(&assignment.id));
        }

        check_rating(&submission)?;

        let review = ServiceReview {
            id: ReviewId::next(),
            assignment_id: assignment.id.clone(),
            request_id: request.id.clone(),
            provider_id: assignment.provider_id.clone(),
            reviewer_id: actor.id.clone(),
            rating: submission.rating,
            comment: submission.comment,
            would_recommend: submission.would_recommend,
            created_at: Utc::now(),
        };

        let stored = match self.repository.insert_review(review) {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => return Err(duplicate_review(&assignment.id)),
            Err(err) => return Err(err.into()),
        };

        info!(
            review_id = %stored.id,
            assignment_id = %stored.assignment_id,
            provider = %stored.provider_id,
            rating = stored.rating,
            "review submitted"
        );

        let mut outbox = Outbox::default();
        outbox.in_app(
            stored.provider_id.clone(),
            NotificationKind::ReviewReceived,
            "New review received",
            format!(
                "Your work on \"{}\" was rated {}/5.",
                request.title, stored.rating
            ),
            Some(request.id.clone()),
        );
        self.dispatch(outbox);

        Ok(stored)
    }

    /// Reviews written by a client, received by a provider, or all for admin.
    pub fn list_reviews(&self, actor: &Actor) -> Result<Vec<ServiceReview>, MarketplaceError> {
        let filter = match actor.role {
            Role::Client => ReviewFilter::ByReviewer(actor.id.clone()),
            Role::Provider => ReviewFilter::ForProvider(actor.id.clone()),
            Role::Admin => ReviewFilter::All,
        };
        let mut reviews = self.repository.list_reviews(&filter)?;
        sort_newest_first(&mut reviews);
        Ok(reviews)
    }

    pub fn provider_reviews(
        &self,
        provider_id: &UserId,
    ) -> Result<Vec<ServiceReview>, MarketplaceError> {
        self.ensure_provider_listed(provider_id)?;
        let mut reviews = self
            .repository
            .list_reviews(&ReviewFilter::ForProvider(provider_id.clone()))?;
        sort_newest_first(&mut reviews);
        Ok(reviews)
    }

    pub fn provider_review_statistics(
        &self,
        provider_id: &UserId,
    ) -> Result<ReviewStatistics, MarketplaceError> {
        let reviews = self.provider_reviews(provider_id)?;
        Ok(review_statistics(&reviews))
    }

    pub(crate) fn ensure_provider_listed(
        &self,
        provider_id: &UserId,
    ) -> Result<(), MarketplaceError> {
        match self.directory.provider_profile(provider_id)? {
            Some(_) => Ok(()),
            None => Err(MarketplaceError::not_found(
                "provider",
                provider_id.as_str(),
            )),
        }
    }
}

fn sort_newest_first(reviews: &mut [ServiceReview]) {
    reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

fn duplicate_review(assignment_id: &AssignmentId) -> MarketplaceError {
    MarketplaceError::Conflict(format!(
        "assignment {assignment_id} has already been reviewed"
    ))
}
