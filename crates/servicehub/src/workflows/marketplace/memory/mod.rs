//! In-process adapters for the repository and directory seams.

mod directory;
mod store;

pub use directory::{DirectoryLoadError, InMemoryDirectory};
pub use store::InMemoryMarketplaceStore;
