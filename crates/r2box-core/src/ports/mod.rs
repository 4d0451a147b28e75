//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ObjectStoreProvider`] - R2-compatible object storage operations,
//!   implemented by `r2box-provider` and consumed by `r2box-transfer` and
//!   `r2box-broker`.

pub mod object_store;

pub use object_store::{
    BatchDeleteOutcome, ByteRange, DeleteObjectResult, ObjectChunk, ObjectStoreProvider,
    ObjectStream, PutObjectResult,
};
