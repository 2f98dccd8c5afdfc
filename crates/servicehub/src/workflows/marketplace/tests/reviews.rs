use super::common::*;

use crate::workflows::marketplace::domain::{
    AssignmentId, NotificationKind, ReviewSubmission, ServiceAssignment, UserId,
};
use crate::workflows::marketplace::validation::ValidationError;
use crate::workflows::marketplace::MarketplaceError;

fn completed_assignment(service: &TestService, provider_id: &str) -> ServiceAssignment {
    let (_, assignments) = request_with_proposals(service, &[provider_id]);
    service
        .accept(&client(), &assignments[0].id)
        .expect("owner accepts");
    service
        .complete(&provider(provider_id), &assignments[0].id)
        .expect("provider completes")
        .assignment
}

fn review_of(assignment_id: &AssignmentId, rating: u8) -> ReviewSubmission {
    ReviewSubmission {
        assignment_id: assignment_id.clone(),
        rating,
        comment: "Quick and tidy".to_string(),
        would_recommend: true,
    }
}

#[test]
fn review_requires_completed_assignment() {
    let (service, _, _) = build_service();
    let (_, assignments) = request_with_proposals(&service, &["prov-1"]);

    match service.submit_review(&client(), review_of(&assignments[0].id, 5)) {
        Err(MarketplaceError::InvalidState { status, .. }) => assert_eq!(status, "pending"),
        other => panic!("expected invalid state, got {other:?}"),
    }

    service
        .accept(&client(), &assignments[0].id)
        .expect("owner accepts");
    match service.submit_review(&client(), review_of(&assignments[0].id, 5)) {
        Err(MarketplaceError::InvalidState { status, .. }) => assert_eq!(status, "accepted"),
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn second_review_is_a_conflict() {
    let (service, _, notifier) = build_service();
    let assignment = completed_assignment(&service, "prov-1");
    notifier.clear();

    let review = service
        .submit_review(&client(), review_of(&assignment.id, 4))
        .expect("first review stored");
    assert_eq!(review.provider_id, UserId::new("prov-1"));
    assert_eq!(review.reviewer_id, client().id);
    assert_eq!(review.request_id, assignment.request_id);

    let drafts = notifier.drafts_for("prov-1");
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].kind, NotificationKind::ReviewReceived);

    match service.submit_review(&client(), review_of(&assignment.id, 5)) {
        Err(MarketplaceError::Conflict(_)) => {}
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn only_the_requesting_client_may_review() {
    let (service, _, _) = build_service();
    let assignment = completed_assignment(&service, "prov-1");

    match service.submit_review(&other_client(), review_of(&assignment.id, 5)) {
        Err(MarketplaceError::Authorization { .. }) => {}
        other => panic!("expected authorization error, got {other:?}"),
    }
    match service.submit_review(&provider("prov-1"), review_of(&assignment.id, 5)) {
        Err(MarketplaceError::Authorization { .. }) => {}
        other => panic!("expected authorization error, got {other:?}"),
    }
}

#[test]
fn rating_outside_range_is_rejected() {
    let (service, _, _) = build_service();
    let assignment = completed_assignment(&service, "prov-1");

    for rating in [0, 6] {
        match service.submit_review(&client(), review_of(&assignment.id, rating)) {
            Err(MarketplaceError::Validation(ValidationError::RatingOutOfRange(found))) => {
                assert_eq!(found, rating)
            }
            other => panic!("expected rating error, got {other:?}"),
        }
    }
    assert!(service
        .submit_review(&client(), review_of(&assignment.id, 1))
        .is_ok());
}

#[test]
fn provider_reviews_and_statistics() {
    let (service, _, _) = build_service();
    let first = completed_assignment(&service, "prov-1");
    let second = completed_assignment(&service, "prov-1");

    service
        .submit_review(&client(), review_of(&first.id, 5))
        .expect("review stored");
    let mut lukewarm = review_of(&second.id, 2);
    lukewarm.would_recommend = false;
    service
        .submit_review(&client(), lukewarm)
        .expect("review stored");

    let reviews = service
        .provider_reviews(&UserId::new("prov-1"))
        .expect("provider listed");
    assert_eq!(reviews.len(), 2);

    let stats = service
        .provider_review_statistics(&UserId::new("prov-1"))
        .expect("provider listed");
    assert_eq!(stats.total_reviews, 2);
    assert_eq!(stats.average_rating, 3.5);
    assert_eq!(stats.rating_distribution[&5], 1);
    assert_eq!(stats.rating_distribution[&2], 1);
    assert_eq!(stats.recommendation_rate, 50.0);

    let listed = service.list_reviews(&provider("prov-1")).expect("list");
    assert_eq!(listed.len(), 2);
    let written = service.list_reviews(&client()).expect("list");
    assert_eq!(written.len(), 2);
    assert!(service
        .list_reviews(&other_client())
        .expect("list")
        .is_empty());
}

#[test]
fn reviews_of_unknown_provider_are_not_found() {
    let (service, _, _) = build_service();

    match service.provider_reviews(&UserId::new("ghost")) {
        Err(MarketplaceError::NotFound { entity, .. }) => assert_eq!(entity, "provider"),
        other => panic!("expected not found, got {other:?}"),
    }
    assert!(matches!(
        service.provider_review_statistics(&UserId::new("ghost")),
        Err(MarketplaceError::NotFound { .. })
    ));
}
