use crate::infra::{load_directory, InMemoryMarketplace, LoggingMessageChannel};
use clap::Args;
use servicehub::error::AppError;
use servicehub::workflows::marketplace::{
    Actor, BudgetRange, CategoryId, DispatchPolicy, InMemoryMarketplaceStore, InboxNotifier,
    Location, MarketplaceService, Money, NewServiceRequest, Priority, ProposalSubmission,
    ReviewSubmission, ServiceRequest,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Provider directory CSV export (defaults to the built-in demo directory)
    #[arg(long)]
    pub(crate) directory_csv: Option<PathBuf>,
    /// Category slug for the demo request
    #[arg(long, default_value = "plumbing")]
    pub(crate) category: String,
    /// City the demo request is posted in
    #[arg(long, default_value = "Recife")]
    pub(crate) city: String,
    /// State the demo request is posted in
    #[arg(long, default_value = "PE")]
    pub(crate) state: String,
    /// Stop after the proposal is accepted
    #[arg(long)]
    pub(crate) skip_completion: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        directory_csv,
        category,
        city,
        state,
        skip_completion,
    } = args;

    let directory = load_directory(directory_csv.as_deref())?;
    let provider_ids: Vec<String> = directory
        .providers()
        .map(|provider| provider.user_id.0.clone())
        .collect();
    let store = Arc::new(InMemoryMarketplaceStore::new());
    let notifier = Arc::new(InboxNotifier::new(
        store.clone(),
        Arc::new(LoggingMessageChannel),
        DispatchPolicy {
            external_enabled: false,
            ..DispatchPolicy::default()
        },
    ));
    let service: InMemoryMarketplace =
        MarketplaceService::new(store, Arc::new(directory), notifier);

    println!("Service marketplace demo");
    let client = Actor::client("demo-client");
    let request = service.create_request(&client, demo_request(category, city, state))?;
    render_request(&request);

    let alerted = alerted_providers(&service, &request, provider_ids)?;
    if alerted.is_empty() {
        println!("- No eligible providers were alerted; nothing to match.");
        return Ok(());
    }
    println!("- Alerted {} provider(s): {}", alerted.len(), alerted.join(", "));

    let mut proposals = Vec::new();
    for (index, provider_id) in alerted.iter().enumerate() {
        let provider = Actor::provider(provider_id.as_str());
        let submission = ProposalSubmission {
            request_id: request.id.clone(),
            proposed_price: Money::from_units(150 + 25 * index as u64),
            estimated_hours: 2 + index as u32,
            notes: "Materials quoted separately".to_string(),
        };
        match service.propose(&provider, submission) {
            Ok(assignment) => {
                println!(
                    "  - {} proposed {} for {}h",
                    provider_id, assignment.proposed_price, assignment.estimated_hours
                );
                proposals.push(assignment);
            }
            Err(err) => println!("  - {} could not propose: {}", provider_id, err),
        }
    }

    let Some(cheapest) = proposals
        .iter()
        .min_by_key(|assignment| assignment.proposed_price)
        .cloned()
    else {
        println!("- No proposals were submitted.");
        return Ok(());
    };

    let outcome = service.accept(&client, &cheapest.id)?;
    println!(
        "- Accepted {} from {} | request now {} | {} sibling proposal(s) rejected",
        outcome.assignment.id,
        outcome.assignment.provider_id,
        outcome.request.status.label(),
        outcome.rejected.len()
    );

    if skip_completion {
        return Ok(());
    }

    let provider = Actor::provider(cheapest.provider_id.as_str());
    let completed = service.complete(&provider, &cheapest.id)?;
    println!(
        "- {} marked the job complete; request {}",
        provider.id,
        completed.request.status.label()
    );

    let review = service.submit_review(
        &client,
        ReviewSubmission {
            assignment_id: cheapest.id.clone(),
            rating: 5,
            comment: "Arrived on time and left the kitchen clean".to_string(),
            would_recommend: true,
        },
    )?;
    println!("- Client left a {}-star review", review.rating);

    let statistics = service.statistics(&provider)?;
    match serde_json::to_string_pretty(&statistics) {
        Ok(rendered) => println!("\nProvider statistics\n{rendered}"),
        Err(err) => println!("\nProvider statistics unavailable: {err}"),
    }

    Ok(())
}

fn demo_request(category: String, city: String, state: String) -> NewServiceRequest {
    NewServiceRequest {
        category_id: CategoryId::new(category),
        title: "Kitchen sink leaking".to_string(),
        description: "Slow drip under the sink that gets worse at night".to_string(),
        location: Location {
            address: "Rua do Bom Jesus, 42".to_string(),
            city,
            state,
        },
        budget: BudgetRange {
            min: Some(Money::from_units(100)),
            max: Some(Money::from_units(250)),
        },
        priority: Priority::High,
        preferred_date: None,
        images: Vec::new(),
    }
}

fn render_request(request: &ServiceRequest) {
    println!(
        "- Posted {} \"{}\" in {}/{} ({} priority, budget {})",
        request.id,
        request.title,
        request.location.city,
        request.location.state,
        request.priority.label(),
        request.budget.describe()
    );
}

/// Providers whose inbox received the new-request alert.
fn alerted_providers(
    service: &InMemoryMarketplace,
    request: &ServiceRequest,
    candidates: Vec<String>,
) -> Result<Vec<String>, AppError> {
    let mut alerted = Vec::new();
    for candidate in candidates {
        let inbox = service.list_notifications(&Actor::provider(candidate.as_str()), false)?;
        if inbox
            .iter()
            .any(|notification| notification.related_request.as_ref() == Some(&request.id))
        {
            alerted.push(candidate);
        }
    }
    Ok(alerted)
}
