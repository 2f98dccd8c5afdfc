use std::collections::BTreeMap;

use serde::Serialize;

use super::directory::Directory;
use super::domain::{
    Actor, AssignmentStatus, Money, RequestStatus, Role, ServiceAssignment, ServiceRequest,
    ServiceReview, UserId,
};
use super::notifications::Notifier;
use super::repository::{
    AssignmentFilter, MarketplaceRepository, NotificationRepository, RequestScope, ReviewFilter,
};
use super::service::{MarketplaceError, MarketplaceService};
use super::validation::{MAX_RATING, MIN_RATING};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatistics {
    pub provider_id: UserId,
    pub total_proposals: usize,
    pub accepted_proposals: usize,
    pub completed_services: usize,
    pub average_rating: f64,
    pub total_earnings: Money,
    pub success_rate: f64,
}

/// Request and review counts for one client, or for the whole platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStatistics {
    pub total_requests: usize,
    pub open_requests: usize,
    pub in_progress_requests: usize,
    pub completed_requests: usize,
    pub cancelled_requests: usize,
    pub total_assignments: usize,
    pub average_rating: f64,
    pub total_reviews: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewStatistics {
    pub total_reviews: usize,
    pub average_rating: f64,
    /// Count per star rating, every rating from 1 to 5 present.
    pub rating_distribution: BTreeMap<u8, usize>,
    pub recommendation_rate: f64,
}

/// Statistics shape chosen by the caller's role.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum StatisticsView {
    Client(ClientStatistics),
    Provider(ProviderStatistics),
    Platform(ClientStatistics),
}

pub fn provider_statistics(
    provider_id: &UserId,
    assignments: &[ServiceAssignment],
    reviews: &[ServiceReview],
) -> ProviderStatistics {
    let own: Vec<&ServiceAssignment> = assignments
        .iter()
        .filter(|assignment| &assignment.provider_id == provider_id)
        .collect();
    let accepted = own
        .iter()
        .filter(|assignment| assignment.status == AssignmentStatus::Accepted)
        .count();
    let completed: Vec<&&ServiceAssignment> = own
        .iter()
        .filter(|assignment| assignment.status == AssignmentStatus::Completed)
        .collect();
    let total_earnings = completed
        .iter()
        .fold(Money::ZERO, |sum, assignment| {
            sum.saturating_add(assignment.proposed_price)
        });

    let ratings: Vec<u8> = reviews
        .iter()
        .filter(|review| &review.provider_id == provider_id)
        .map(|review| review.rating)
        .collect();

    ProviderStatistics {
        provider_id: provider_id.clone(),
        total_proposals: own.len(),
        accepted_proposals: accepted,
        completed_services: completed.len(),
        average_rating: average(&ratings),
        total_earnings,
        success_rate: percentage(completed.len(), accepted + completed.len()),
    }
}

pub fn client_statistics(
    requests: &[ServiceRequest],
    assignments: &[ServiceAssignment],
    reviews: &[ServiceReview],
) -> ClientStatistics {
    let count = |status: RequestStatus| {
        requests
            .iter()
            .filter(|request| request.status == status)
            .count()
    };
    let ratings: Vec<u8> = reviews.iter().map(|review| review.rating).collect();

    ClientStatistics {
        total_requests: requests.len(),
        open_requests: count(RequestStatus::Open),
        in_progress_requests: count(RequestStatus::InProgress),
        completed_requests: count(RequestStatus::Completed),
        cancelled_requests: count(RequestStatus::Cancelled),
        total_assignments: assignments.len(),
        average_rating: average(&ratings),
        total_reviews: reviews.len(),
    }
}

pub fn review_statistics(reviews: &[ServiceReview]) -> ReviewStatistics {
    let mut rating_distribution: BTreeMap<u8, usize> =
        (MIN_RATING..=MAX_RATING).map(|rating| (rating, 0)).collect();
    for review in reviews {
        *rating_distribution.entry(review.rating).or_default() += 1;
    }
    let ratings: Vec<u8> = reviews.iter().map(|review| review.rating).collect();
    let recommended = reviews.iter().filter(|review| review.would_recommend).count();

    ReviewStatistics {
        total_reviews: reviews.len(),
        average_rating: average(&ratings),
        rating_distribution,
        recommendation_rate: percentage(recommended, reviews.len()),
    }
}

fn average(ratings: &[u8]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: u64 = ratings.iter().map(|rating| u64::from(*rating)).sum();
    round2(sum as f64 / ratings.len() as f64)
}

/// `part / max(whole, 1) * 100`, rounded to two decimals.
fn percentage(part: usize, whole: usize) -> f64 {
    round2(part as f64 / whole.max(1) as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl<R, D, N> MarketplaceService<R, D, N>
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    pub fn compute_provider_statistics(
        &self,
        provider_id: &UserId,
    ) -> Result<ProviderStatistics, MarketplaceError> {
        let assignments = self
            .repository
            .list_assignments(&AssignmentFilter::ForProvider(provider_id.clone()))?;
        let reviews = self
            .repository
            .list_reviews(&ReviewFilter::ForProvider(provider_id.clone()))?;
        Ok(provider_statistics(provider_id, &assignments, &reviews))
    }

    pub fn compute_client_statistics(
        &self,
        client_id: &UserId,
    ) -> Result<ClientStatistics, MarketplaceError> {
        let requests = self
            .repository
            .list_requests(&RequestScope::OwnedBy(client_id.clone()))?;
        let assignments = self
            .repository
            .list_assignments(&AssignmentFilter::ForClient(client_id.clone()))?;
        let reviews = self
            .repository
            .list_reviews(&ReviewFilter::ByReviewer(client_id.clone()))?;
        Ok(client_statistics(&requests, &assignments, &reviews))
    }

    /// Platform-wide counts; admin only.
    pub fn compute_platform_statistics(
        &self,
        actor: &Actor,
    ) -> Result<ClientStatistics, MarketplaceError> {
        if actor.role != Role::Admin {
            return Err(MarketplaceError::forbidden(actor, "view platform statistics"));
        }
        let requests = self.repository.list_requests(&RequestScope::All)?;
        let assignments = self.repository.list_assignments(&AssignmentFilter::All)?;
        let reviews = self.repository.list_reviews(&ReviewFilter::All)?;
        Ok(client_statistics(&requests, &assignments, &reviews))
    }

    pub fn statistics(&self, actor: &Actor) -> Result<StatisticsView, MarketplaceError> {
        match actor.role {
            Role::Client => self
                .compute_client_statistics(&actor.id)
                .map(StatisticsView::Client),
            Role::Provider => {
                self.ensure_provider_listed(&actor.id)?;
                self.compute_provider_statistics(&actor.id)
                    .map(StatisticsView::Provider)
            }
            Role::Admin => self
                .compute_platform_statistics(actor)
                .map(StatisticsView::Platform),
        }
    }
}
