use super::domain::{
    BudgetRange, CategoryId, Location, Money, ProposalSubmission, ReviewSubmission,
    ServiceCategory,
};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Input rejected before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("service category {0} does not exist")]
    UnknownCategory(CategoryId),
    #[error("service category {0} is not available")]
    InactiveCategory(CategoryId),
    #[error("{field} must not be blank")]
    BlankField { field: &'static str },
    #[error("{field} must be greater than zero")]
    NonPositiveBudget { field: &'static str },
    #[error("budget minimum {min} exceeds maximum {max}")]
    InvertedBudget { min: Money, max: Money },
    #[error("proposed price must be greater than zero")]
    NonPositivePrice,
    #[error("estimated duration must be greater than zero")]
    NonPositiveDuration,
    #[error("rating must be between 1 and 5 (found {0})")]
    RatingOutOfRange(u8),
    #[error("user has no provider profile")]
    MissingProviderProfile,
}

pub(crate) fn ensure_category_open(
    id: &CategoryId,
    category: Option<ServiceCategory>,
) -> Result<ServiceCategory, ValidationError> {
    match category {
        Some(category) if category.is_active => Ok(category),
        Some(_) => Err(ValidationError::InactiveCategory(id.clone())),
        None => Err(ValidationError::UnknownCategory(id.clone())),
    }
}

pub(crate) fn ensure_present(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::BlankField { field })
    } else {
        Ok(())
    }
}

/// Shared by create and update so both paths reject the same shapes.
pub(crate) fn check_request_fields(
    title: &str,
    description: &str,
    location: &Location,
    budget: &BudgetRange,
) -> Result<(), ValidationError> {
    ensure_present("title", title)?;
    ensure_present("description", description)?;
    ensure_present("city", &location.city)?;
    ensure_present("state", &location.state)?;
    check_budget(budget)
}

pub(crate) fn check_budget(budget: &BudgetRange) -> Result<(), ValidationError> {
    if matches!(budget.min, Some(min) if !min.is_positive()) {
        return Err(ValidationError::NonPositiveBudget {
            field: "budget_min",
        });
    }
    if matches!(budget.max, Some(max) if !max.is_positive()) {
        return Err(ValidationError::NonPositiveBudget {
            field: "budget_max",
        });
    }
    if let (Some(min), Some(max)) = (budget.min, budget.max) {
        if min > max {
            return Err(ValidationError::InvertedBudget { min, max });
        }
    }
    Ok(())
}

pub(crate) fn check_proposal(submission: &ProposalSubmission) -> Result<(), ValidationError> {
    if !submission.proposed_price.is_positive() {
        return Err(ValidationError::NonPositivePrice);
    }
    if submission.estimated_hours == 0 {
        return Err(ValidationError::NonPositiveDuration);
    }
    Ok(())
}

pub(crate) fn check_rating(submission: &ReviewSubmission) -> Result<(), ValidationError> {
    if (MIN_RATING..=MAX_RATING).contains(&submission.rating) {
        Ok(())
    } else {
        Err(ValidationError::RatingOutOfRange(submission.rating))
    }
}
