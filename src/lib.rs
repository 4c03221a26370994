//! # Oracle Field Service Integration Library
//!
//! A resilient client for the Oracle Field Service (OFSC) core REST API:
//! - OAuth client-credentials tokens, renewed once on `401`
//! - Exponential backoff on `429`, honoring `Retry-After`
//! - Offset pagination with a preemptive page pause
//! - Batched, strictly sequential mutations with a cooldown between batches
//! - CSV and XML record helpers for exports
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_ofsc::{OfscClient, OfscConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OfscClient::new(OfscConfig::from_env()?)?;
//!
//!     let resources = client.resources().list_all(None).await?;
//!     println!("{} resources", resources.data.len());
//!
//!     let mut results = Vec::new();
//!     client
//!         .resources()
//!         .reset_emails("noreply.com", Some(resources.token), &mut results)
//!         .await?;
//!     let skipped = results.iter().filter(|r| r.is_skipped()).count();
//!     println!("{} updated, {} skipped", results.len() - skipped, skipped);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Authentication
pub mod auth;

// HTTP transport and client
pub mod client;
pub mod transport;

// Retry, token renewal and backoff
pub mod resilience;

// Pagination and batched mutation
pub mod batch;
pub mod pagination;

// API Services
pub mod services;

// Export and local persistence
pub mod export;
pub mod store;

// Observability
pub mod observability;

// Re-exports for convenience
pub use auth::{AccessToken, Credentials, OAuthTokenProvider, TokenProvider};
pub use batch::{BatchMutator, Mutation, MutationPlan, MutationResult, MutationStatus};
pub use client::{OfscClient, OfscClientBuilder};
pub use config::{OfscConfig, OfscConfigBuilder};
pub use errors::{OfscError, OfscErrorKind, OfscResult};
pub use pagination::{Page, PaginatedCollector, PaginationStrategy};
pub use resilience::{ApiCall, Authorized, ResilientRequester};
pub use transport::{HttpTransport, ReqwestHttpTransport};
pub use types::*;
