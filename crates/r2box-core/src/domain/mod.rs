//! Domain entities and business logic
//!
//! This module contains the core domain types for r2box:
//! - Newtypes for type-safe identifiers and validated domain types
//! - Credentials owned by the Credential Store
//! - Bucket/Object/ListingPage returned by the Provider Client
//! - CacheKey/CacheEntry owned by the Folder Cache
//! - TransferTask and its state machine, owned by the Transfer Engine
//! - The wire envelope shape the Broker wraps every response in
//! - Domain-specific and wire error types

pub mod cache;
pub mod credentials;
pub mod envelope;
pub mod errors;
pub mod newtypes;
pub mod object_store;
pub mod transfer;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheKey, DEFAULT_STALENESS_SECS, DEFAULT_TTL_SECS};
pub use credentials::{Credentials, RedactedCredentials};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta};
pub use errors::{CoreError, DomainError, ErrorCode};
pub use newtypes::*;
pub use object_store::{Bucket, ListingPage, Object};
pub use transfer::{ProgressEvent, TaskTarget, TaskType, TransferTask};
pub use transfer::TaskStatus;
