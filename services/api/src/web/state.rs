//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::session::SessionStore;
use std::sync::Arc;
use storybook_core::Storyteller;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storyteller: Arc<Storyteller>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(config: Arc<Config>, storyteller: Arc<Storyteller>) -> Self {
        Self {
            config,
            storyteller,
            sessions: Arc::new(SessionStore::new()),
        }
    }
}
