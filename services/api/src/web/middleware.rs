//! services/api/src/web/middleware.rs
//!
//! Session middleware: resolves the `session` cookie into a session context.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::Duration;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::web::{session::SESSION_COOKIE, state::AppState};

/// The id of the session a request belongs to, inserted into request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(pub Uuid);

/// Middleware that attaches every request to a session.
///
/// A request without a valid session cookie gets a fresh session id, and the
/// response carries the cookie for it unless the handler set the cookie itself.
/// The context is only initialized once the browser presents the cookie, so
/// cookieless clients never accumulate contexts. A new context is initialized
/// with the stories visible to its owner.
pub async fn session_context(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    // 1. Parse session ID from cookie
    let existing = session_from_headers(req.headers());
    let id = existing.unwrap_or_else(Uuid::new_v4);

    // 2. Initialize the context on first sight of a returning session
    if existing.is_some() {
        let (context, created) = state.sessions.init(id);
        if created {
            info!("Initialized session {}", id);
            match state
                .storyteller
                .list_stories(Some(&context.user_id))
                .await
            {
                Ok(stories) => state.sessions.set_stories(id, stories),
                Err(e) => error!("Failed to load stories for session {}: {:?}", id, e),
            }
        }
    }

    // 3. Insert session ID into request extensions
    req.extensions_mut().insert(SessionId(id));

    // 4. Continue to the handler, issuing the cookie when it is new
    let mut response = next.run(req).await;
    if existing.is_none() && !response.headers().contains_key(header::SET_COOKIE) {
        match HeaderValue::from_str(&session_cookie(id)) {
            Ok(cookie) => {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            Err(e) => error!("Failed to build session cookie: {:?}", e),
        }
    }
    response
}

/// Extracts the session id from the `Cookie` header, if present and well-formed.
pub fn session_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    let prefix = format!("{}=", SESSION_COOKIE);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| c.trim().strip_prefix(prefix.as_str()))
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
}

pub fn session_cookie(id: Uuid) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        id,
        Duration::days(30).num_seconds()
    )
}

pub fn cleared_session_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}
