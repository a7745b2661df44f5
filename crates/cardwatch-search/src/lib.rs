//! Evidence layer: per-card web search behind a provider trait, Brave Search over HTTP.

mod provider;
mod retriever;

pub use provider::{SearchError, SearchProvider};
pub use retriever::{query_for, EvidenceRetriever, RetrievalReport};

#[cfg(feature = "http")]
pub mod brave;

#[cfg(feature = "http")]
pub use brave::BraveSearch;
