use std::sync::{Arc, Mutex};
use std::thread;

use servicehub::workflows::marketplace::{
    Actor, AssignmentStatus, CategoryId, DispatchPolicy, InMemoryDirectory,
    InMemoryMarketplaceStore, InboxNotifier, Location, MarketplaceError, MarketplaceService,
    MessageChannel, Money, NewServiceRequest, NotifierError, Priority, ProposalSubmission,
    RequestId, RequestStatus, ReviewSubmission, StatisticsView, UserId,
};

const DIRECTORY_CSV: &str = "\
user_id,display_name,phone,city,state,categories,is_active,is_available
prov-a,Ana Reparos,(81) 98888-0001,Recife,PE,plumbing;electrical,true,true
prov-b,Bruno Hidraulica,81 98888-0002,Recife,PE,plumbing,true,true
prov-c,Carla Eletrica,81 98888-0003,Olinda,PE,plumbing,true,true
prov-d,Davi Servicos,81 98888-0004,Recife,PE,plumbing,true,true
prov-e,Eva Consertos,,Recife,PE,plumbing,true,true
";

#[derive(Default)]
struct OutboundLog {
    sent: Mutex<Vec<(String, String)>>,
}

impl OutboundLog {
    fn phones(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("outbound log poisoned")
            .iter()
            .map(|(phone, _)| phone.clone())
            .collect()
    }
}

impl MessageChannel for OutboundLog {
    fn deliver(&self, phone: &str, message: &str) -> Result<(), NotifierError> {
        self.sent
            .lock()
            .expect("outbound log poisoned")
            .push((phone.to_string(), message.to_string()));
        Ok(())
    }
}

type Service = MarketplaceService<
    InMemoryMarketplaceStore,
    InMemoryDirectory,
    InboxNotifier<InMemoryMarketplaceStore, OutboundLog>,
>;

fn marketplace() -> (Arc<Service>, Arc<OutboundLog>) {
    let directory =
        InMemoryDirectory::from_reader(DIRECTORY_CSV.as_bytes()).expect("directory parses");
    let store = Arc::new(InMemoryMarketplaceStore::new());
    let outbound = Arc::new(OutboundLog::default());
    let notifier = Arc::new(InboxNotifier::new(
        store.clone(),
        outbound.clone(),
        DispatchPolicy::default(),
    ));
    let service = MarketplaceService::new(store, Arc::new(directory), notifier);
    (Arc::new(service), outbound)
}

fn leaking_pipe() -> NewServiceRequest {
    NewServiceRequest {
        category_id: CategoryId::new("plumbing"),
        title: "Leaking kitchen pipe".to_string(),
        description: "Water under the sink every morning".to_string(),
        location: Location {
            address: "Rua da Aurora, 100".to_string(),
            city: "Recife".to_string(),
            state: "PE".to_string(),
        },
        budget: Default::default(),
        priority: Priority::Urgent,
        preferred_date: None,
        images: Vec::new(),
    }
}

fn bid(request: &RequestId, units: u64) -> ProposalSubmission {
    ProposalSubmission {
        request_id: request.clone(),
        proposed_price: Money::from_units(units),
        estimated_hours: 2,
        notes: String::new(),
    }
}

#[test]
fn request_to_review_round_trip() {
    let (service, outbound) = marketplace();
    let client = Actor::client("maria");

    let request = service
        .create_request(&client, leaking_pipe())
        .expect("request created");
    assert_eq!(request.status, RequestStatus::Open);

    // Recife providers with a phone; Olinda and the phoneless provider stay out.
    let mut alerted = outbound.phones();
    alerted.sort();
    assert_eq!(
        alerted,
        vec![
            "5581988880001".to_string(),
            "5581988880002".to_string(),
            "5581988880004".to_string(),
        ]
    );

    let proposal = service
        .propose(&Actor::provider("prov-b"), bid(&request.id, 150))
        .expect("proposal submitted");
    service
        .propose(&Actor::provider("prov-a"), bid(&request.id, 180))
        .expect("proposal submitted");

    let accepted = service
        .accept(&client, &proposal.id)
        .expect("client accepts");
    assert_eq!(accepted.request.status, RequestStatus::InProgress);
    assert_eq!(accepted.rejected.len(), 1);

    let completed = service
        .complete(&Actor::provider("prov-b"), &proposal.id)
        .expect("provider completes");
    assert_eq!(completed.request.status, RequestStatus::Completed);

    service
        .submit_review(
            &client,
            ReviewSubmission {
                assignment_id: proposal.id.clone(),
                rating: 5,
                comment: "Fixed in an hour".to_string(),
                would_recommend: true,
            },
        )
        .expect("review stored");

    match service
        .statistics(&Actor::provider("prov-b"))
        .expect("provider statistics")
    {
        StatisticsView::Provider(stats) => {
            assert_eq!(stats.completed_services, 1);
            assert_eq!(stats.total_earnings, Money::from_units(150));
            assert_eq!(stats.average_rating, 5.0);
        }
        other => panic!("expected provider view, got {other:?}"),
    }

    let inbox = service
        .list_notifications(&Actor::provider("prov-b"), false)
        .expect("inbox readable");
    assert_eq!(inbox.len(), 3);
}

#[test]
fn concurrent_accepts_have_a_single_winner() {
    let (service, _) = marketplace();
    let client = Actor::client("maria");
    let request = service
        .create_request(&client, leaking_pipe())
        .expect("request created");

    let proposals: Vec<_> = ["prov-a", "prov-b", "prov-c", "prov-d"]
        .iter()
        .enumerate()
        .map(|(index, provider)| {
            service
                .propose(&Actor::provider(*provider), bid(&request.id, 100 + index as u64))
                .expect("proposal submitted")
        })
        .collect();

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = proposals
            .iter()
            .map(|proposal| {
                let service = Arc::clone(&service);
                let client = client.clone();
                let id = proposal.id.clone();
                scope.spawn(move || service.accept(&client, &id))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("accept thread panicked"))
            .collect()
    });

    let winners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1);
    for result in &results {
        if let Err(err) = result {
            assert!(
                matches!(err, MarketplaceError::InvalidState { .. }),
                "losing accept should be an invalid state, got {err:?}"
            );
        }
    }

    let stored = service
        .list_assignments(&client, Some(&request.id))
        .expect("assignments listed");
    assert_eq!(
        stored
            .iter()
            .filter(|assignment| assignment.status == AssignmentStatus::Accepted)
            .count(),
        1
    );
    assert_eq!(
        stored
            .iter()
            .filter(|assignment| assignment.status == AssignmentStatus::Rejected)
            .count(),
        3
    );
    let request = service
        .get_request(&client, &request.id)
        .expect("request visible");
    assert_eq!(request.status, RequestStatus::InProgress);
}

#[test]
fn cancelled_request_drops_out_of_provider_listing() {
    let (service, _) = marketplace();
    let client = Actor::client("maria");
    let request = service
        .create_request(&client, leaking_pipe())
        .expect("request created");
    let proposal = service
        .propose(&Actor::provider("prov-d"), bid(&request.id, 120))
        .expect("proposal submitted");

    let outcome = service
        .cancel_request(&client, &request.id)
        .expect("owner cancels");
    assert_eq!(outcome.request.status, RequestStatus::Cancelled);

    let visible = service
        .list_requests(&Actor::provider("prov-b"))
        .expect("listing succeeds");
    assert!(visible.iter().all(|candidate| candidate.id != request.id));

    let withdrawn = service
        .get_assignment(&Actor::provider("prov-d"), &proposal.id)
        .expect("provider still sees own proposal");
    assert_eq!(withdrawn.status, AssignmentStatus::Cancelled);

    assert!(matches!(
        service.propose(&Actor::provider("prov-a"), bid(&request.id, 90)),
        Err(MarketplaceError::InvalidState { .. })
    ));
    assert!(service
        .compute_provider_statistics(&UserId::new("prov-d"))
        .is_ok());
}
