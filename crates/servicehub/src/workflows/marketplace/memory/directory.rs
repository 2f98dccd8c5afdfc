use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::config::parse_flag;
use crate::workflows::marketplace::directory::{Directory, DirectoryError};
use crate::workflows::marketplace::domain::{CategoryId, ProviderRef, ServiceCategory, UserId};

/// Directory snapshot held in memory, seeded in code or from a CSV export.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    categories: BTreeMap<CategoryId, ServiceCategory>,
    providers: BTreeMap<UserId, ProviderRef>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: ServiceCategory) -> Self {
        self.categories.insert(category.id.clone(), category);
        self
    }

    pub fn with_provider(mut self, provider: ProviderRef) -> Self {
        self.providers.insert(provider.user_id.clone(), provider);
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderRef> {
        self.providers.values()
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DirectoryLoadError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Columns: `user_id, display_name, phone, city, state, categories,
    /// is_active, is_available`. `categories` is `;` separated; every
    /// category named by a row is registered as active.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DirectoryLoadError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut directory = Self::new();

        for (index, record) in csv_reader.deserialize::<ProviderRow>().enumerate() {
            let row = record?;
            if row.user_id.is_empty() {
                return Err(DirectoryLoadError::MissingUserId { row: index + 1 });
            }

            let categories: Vec<CategoryId> = row
                .categories
                .split(';')
                .map(str::trim)
                .filter(|slug| !slug.is_empty())
                .map(CategoryId::new)
                .collect();
            for id in &categories {
                directory
                    .categories
                    .entry(id.clone())
                    .or_insert_with(|| ServiceCategory {
                        id: id.clone(),
                        name: display_name_for(&id.0),
                        is_active: true,
                    });
            }

            let provider = ProviderRef {
                user_id: UserId::new(row.user_id),
                display_name: row.display_name,
                phone: row.phone,
                categories,
                city: row.city,
                state: row.state,
                is_active: row.is_active,
                is_available: row.is_available,
            };
            directory
                .providers
                .insert(provider.user_id.clone(), provider);
        }

        Ok(directory)
    }
}

impl Directory for InMemoryDirectory {
    fn category(&self, id: &CategoryId) -> Result<Option<ServiceCategory>, DirectoryError> {
        Ok(self.categories.get(id).cloned())
    }

    fn provider_profile(&self, user_id: &UserId) -> Result<Option<ProviderRef>, DirectoryError> {
        Ok(self.providers.get(user_id).cloned())
    }

    fn eligible_providers(
        &self,
        category: &CategoryId,
        city: Option<&str>,
        state: Option<&str>,
    ) -> Result<Vec<ProviderRef>, DirectoryError> {
        let matches = |wanted: Option<&str>, actual: &str| {
            wanted.map_or(true, |wanted| wanted.trim().eq_ignore_ascii_case(actual.trim()))
        };
        Ok(self
            .providers
            .values()
            .filter(|provider| provider.is_active && provider.serves(category))
            .filter(|provider| matches(city, &provider.city) && matches(state, &provider.state))
            .cloned()
            .collect())
    }
}

fn display_name_for(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Deserialize)]
struct ProviderRow {
    user_id: String,
    display_name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    phone: Option<String>,
    city: String,
    state: String,
    #[serde(default)]
    categories: String,
    #[serde(default = "enabled", deserialize_with = "blank_as_enabled")]
    is_active: bool,
    #[serde(default = "enabled", deserialize_with = "blank_as_enabled")]
    is_available: bool,
}

fn enabled() -> bool {
    true
}

/// Blank cells mean enabled; otherwise the same tokens as the env flags.
fn blank_as_enabled<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(true),
        Some(raw) => parse_flag(raw).ok_or_else(|| {
            serde::de::Error::custom(format!("'{raw}' is not a recognised flag"))
        }),
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

#[derive(Debug)]
pub enum DirectoryLoadError {
    Io(std::io::Error),
    Csv(csv::Error),
    MissingUserId { row: usize },
}

impl std::fmt::Display for DirectoryLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryLoadError::Io(err) => write!(f, "failed to read provider directory: {}", err),
            DirectoryLoadError::Csv(err) => write!(f, "invalid provider directory CSV: {}", err),
            DirectoryLoadError::MissingUserId { row } => {
                write!(f, "provider directory row {} has no user_id", row)
            }
        }
    }
}

impl std::error::Error for DirectoryLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DirectoryLoadError::Io(err) => Some(err),
            DirectoryLoadError::Csv(err) => Some(err),
            DirectoryLoadError::MissingUserId { .. } => None,
        }
    }
}

impl From<std::io::Error> for DirectoryLoadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for DirectoryLoadError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\
user_id,display_name,phone,city,state,categories,is_active,is_available
prov-1,Ana Reparos,(47) 99999-0001,Blumenau,SC,plumbing;general-repairs,true,true
prov-2,Bruno Eletrica,,Blumenau,SC,electrical,true,false
";

    #[test]
    fn loads_providers_and_derives_categories() {
        let directory =
            InMemoryDirectory::from_reader(EXPORT.as_bytes()).expect("export parses");
        assert_eq!(directory.provider_count(), 2);

        let category = directory
            .category(&CategoryId::new("general-repairs"))
            .expect("lookup succeeds")
            .expect("category derived");
        assert_eq!(category.name, "General Repairs");
        assert!(category.is_active);

        let bruno = directory
            .provider_profile(&UserId::new("prov-2"))
            .expect("lookup succeeds")
            .expect("provider present");
        assert_eq!(bruno.phone, None);
        assert!(!bruno.is_available);
    }

    #[test]
    fn eligible_providers_matches_location_case_insensitively() {
        let directory =
            InMemoryDirectory::from_reader(EXPORT.as_bytes()).expect("export parses");
        let plumbing = CategoryId::new("plumbing");

        let in_city = directory
            .eligible_providers(&plumbing, Some("blumenau"), Some("sc"))
            .expect("lookup succeeds");
        assert_eq!(in_city.len(), 1);

        let elsewhere = directory
            .eligible_providers(&plumbing, Some("Joinville"), Some("SC"))
            .expect("lookup succeeds");
        assert!(elsewhere.is_empty());
    }

    #[test]
    fn blank_and_loose_flags_are_accepted() {
        let export = "\
user_id,display_name,phone,city,state,categories,is_active,is_available
prov-1,Ana Reparos,81 99999-0001,Recife,PE,plumbing,,
prov-2,Bruno Eletrica,81 99999-0002,Recife,PE,plumbing,1,yes
prov-3,Carla Reparos,81 99999-0003,Recife,PE,plumbing,no,0
";
        let directory =
            InMemoryDirectory::from_reader(export.as_bytes()).expect("export parses");

        for id in ["prov-1", "prov-2"] {
            let provider = directory
                .provider_profile(&UserId::new(id))
                .expect("lookup succeeds")
                .expect("provider present");
            assert!(provider.is_active && provider.is_available, "{id} enabled");
        }
        let carla = directory
            .provider_profile(&UserId::new("prov-3"))
            .expect("lookup succeeds")
            .expect("provider present");
        assert!(!carla.is_active);
        assert!(!carla.is_available);
    }

    #[test]
    fn unknown_flag_is_a_csv_error() {
        let export = "\
user_id,display_name,phone,city,state,categories,is_active,is_available
prov-1,Ana Reparos,81 99999-0001,Recife,PE,plumbing,maybe,true
";
        assert!(matches!(
            InMemoryDirectory::from_reader(export.as_bytes()),
            Err(DirectoryLoadError::Csv(_))
        ));
    }

    #[test]
    fn rejects_rows_without_user_id() {
        let export = "\
user_id,display_name,phone,city,state,categories
,Nobody,,Recife,PE,plumbing
";
        assert!(matches!(
            InMemoryDirectory::from_reader(export.as_bytes()),
            Err(DirectoryLoadError::MissingUserId { row: 1 })
        ));
    }
}
