//! r2box Core - Domain logic, configuration and error taxonomy
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Credentials`, `Bucket`, `Object`, `ListingPage`,
//!   `CacheKey`/`CacheEntry`, `TransferTask`, `Envelope`
//! - **Port definitions** - `ObjectStoreProvider`, the trait adapters
//!   implement for R2-compatible object storage
//! - **Error taxonomy** - `DomainError` for construction-time validation,
//!   `CoreError`/`ErrorCode` for the wire-level taxonomy every component
//!   above the domain layer propagates
//! - **Configuration** - the on-disk/env-driven `Config` shared by the
//!   broker, CLI and supervisor
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture
//! pattern. The domain module contains pure business logic with no
//! external I/O. The ports module defines trait interfaces that the
//! `r2box-provider` adapter crate implements; `r2box-transfer` and
//! `r2box-broker` depend only on the trait, not the concrete adapter.

pub mod config;
pub mod domain;
pub mod ports;
