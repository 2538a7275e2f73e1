//! Application state container shared across Axum route handlers and services.
//!
//! Holds the process-wide database connection and the event bus. Wrapped by
//! Axum's `State<T>` extractor; constructed once at startup and in test
//! harnesses.

use crate::bus::EventBus;
use sea_orm::DatabaseConnection;

/// Central application state shared across the server.
#[derive(Clone)]
pub struct AppState {
    db: DatabaseConnection,
    events: EventBus,
}

impl AppState {
    /// Creates a new `AppState` from the shared database connection and bus.
    pub fn new(db: DatabaseConnection, events: EventBus) -> Self {
        Self { db, events }
    }

    /// Returns a shared reference to the internal `DatabaseConnection`.
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Returns a shared reference to the event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Returns a cloned copy of the database connection for spawned tasks.
    pub fn db_clone(&self) -> DatabaseConnection {
        self.db.clone()
    }

    /// Returns a cloned instance of the event bus.
    pub fn events_clone(&self) -> EventBus {
        self.events.clone()
    }
}
