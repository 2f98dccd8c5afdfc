use serde::Serialize;

use super::domain::{CategoryId, ProviderRef, ServiceCategory, UserId};

/// Read-only provider and category lookup owned by the profile service.
pub trait Directory: Send + Sync {
    fn category(&self, id: &CategoryId) -> Result<Option<ServiceCategory>, DirectoryError>;

    fn provider_profile(&self, user_id: &UserId) -> Result<Option<ProviderRef>, DirectoryError>;

    /// Providers serving `category`, narrowed to `city`/`state` when given.
    fn eligible_providers(
        &self,
        category: &CategoryId,
        city: Option<&str>,
        state: Option<&str>,
    ) -> Result<Vec<ProviderRef>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Location scope that produced the provider list for a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    City,
    State,
    Unscoped,
}

impl SearchScope {
    pub const CASCADE: [SearchScope; 3] =
        [SearchScope::City, SearchScope::State, SearchScope::Unscoped];

    pub(crate) fn bounds<'a>(
        self,
        city: &'a str,
        state: &'a str,
    ) -> (Option<&'a str>, Option<&'a str>) {
        match self {
            SearchScope::City => (Some(city), Some(state)),
            SearchScope::State => (None, Some(state)),
            SearchScope::Unscoped => (None, None),
        }
    }
}
