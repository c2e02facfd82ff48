//! Shared Application State
//!
//! `AppState` is created once at startup and handed to every handler.

use mot_core::{Catalog, SessionRegistry};
use std::sync::Arc;

/// The shared application state.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub registry: Arc<SessionRegistry>,
}
