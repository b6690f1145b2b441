//! Shared application state.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::sync::Arc;

use aegis_core::PolicyCompiler;
use aegis_storage::Manager;

use crate::schemas::Schemas;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Principal/policy resolver.
    pub manager: Arc<dyn Manager>,
    /// Compiled-policy cache, shared with the manager so write
    /// invalidation reaches the evaluation path.
    pub compiler: PolicyCompiler,
    /// Compiled request validators.
    pub schemas: Schemas,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
