//! Application state for Axum handlers.

use encore_core::engine::QueueEngine;

/// State shared across all HTTP handlers.
///
/// The engine is cheap to clone; every handler gets its own handle.
#[derive(Clone)]
pub struct AppState {
    /// The queue engine, with its store and change feed
    pub engine: QueueEngine,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(engine: QueueEngine) -> Self {
        Self { engine }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Required for Axum
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
