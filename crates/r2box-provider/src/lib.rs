//! Provider Client: the `aws-sdk-s3`-backed implementation of
//! `r2box_core::ports::object_store::ObjectStoreProvider` against
//! Cloudflare R2.

pub mod client;
pub mod error;

pub use client::{R2Client, DEFAULT_REQUEST_DEADLINE, DEFAULT_RESOURCE_DEADLINE};
pub use error::classify_sdk_error;
