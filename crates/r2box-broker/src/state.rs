//! Shared broker state, composed once in `main()` and injected into every
//! handler via `axum::extract::State`.

use std::sync::Arc;
use std::time::Instant;

use r2box_cache::FolderCache;
use r2box_core::ports::object_store::ObjectStoreProvider;
use r2box_transfer::TransferEngine;
use tokio_util::sync::CancellationToken;

/// Version string stamped on `/health` responses.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Handles shared across every route handler.
pub struct AppState {
    pub provider: Arc<dyn ObjectStoreProvider>,
    pub cache: Arc<FolderCache>,
    pub transfer: Arc<TransferEngine>,
    pub started_at: Instant,
    /// Flipped by `POST /shutdown`; the `axum::serve(...)` future in
    /// `main()` awaits this token to begin its graceful drain.
    pub shutdown: CancellationToken,
}

impl AppState {
    #[must_use]
    pub fn new(
        provider: Arc<dyn ObjectStoreProvider>,
        cache: Arc<FolderCache>,
        transfer: Arc<TransferEngine>,
    ) -> Self {
        Self {
            provider,
            cache,
            transfer,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
