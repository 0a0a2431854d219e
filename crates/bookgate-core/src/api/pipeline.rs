//! Request/response interception for protected calls.
//!
//! [`prepare`] is the outbound stage: a pure function of the request and a
//! session snapshot. [`Pipeline::handle`] is the inbound stage: successes pass
//! through untouched, and a credential rejection clears the session and
//! publishes [`AuthEvent::LoginRequired`] before the error reaches the caller.
//! Navigation itself is left to whoever subscribes to the events.

use reqwest::{header, Request};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::auth::{Credential, SessionHandle, SessionSnapshot};

use super::ApiError;

/// Route name of the login entry point
pub const LOGIN_ROUTE: &str = "Login";

/// Events are rare; a small buffer is plenty for lagging subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// The session was cleared after a credential rejection; the user must be
    /// sent to the `redirect_to` route.
    LoginRequired { redirect_to: String },
}

/// Attach the snapshot's credential, if any, to the request's
/// `Authorization` header. A request is returned unmodified otherwise.
pub fn prepare(mut request: Request, snapshot: &SessionSnapshot) -> Request {
    if let Some(credential) = snapshot.credential() {
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, credential.bearer_header());
    }
    request
}

/// The stages shared by every protected call of one client.
/// Clone is cheap; clones share the session and the event channel.
#[derive(Clone)]
pub struct Pipeline {
    session: SessionHandle,
    events: broadcast::Sender<AuthEvent>,
    login_route: String,
}

impl Pipeline {
    pub fn new(session: SessionHandle) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session,
            events,
            login_route: LOGIN_ROUTE.to_string(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Outbound stage. Reads in-memory state only. Returns the stamped
    /// request together with the credential it carries.
    pub fn outbound(&self, request: Request) -> (Request, Option<Credential>) {
        let snapshot = self.session.snapshot();
        let sent_with = snapshot.credential().cloned();
        (prepare(request, &snapshot), sent_with)
    }

    /// Inbound stage. Only `Unauthorized` triggers a reaction; every result,
    /// including that one, is handed back unchanged.
    pub fn handle<T>(
        &self,
        result: Result<T, ApiError>,
        sent_with: Option<&Credential>,
    ) -> Result<T, ApiError> {
        if let Err(ApiError::Unauthorized) = &result {
            self.reject(sent_with);
        }
        result
    }

    fn reject(&self, sent_with: Option<&Credential>) {
        // A response to an old credential must not end a session established
        // after the request went out.
        if !self.session.clear_if_current(sent_with) {
            debug!("Ignoring rejection of a credential that is no longer current");
            return;
        }
        info!("Credential rejected, session cleared");
        // No subscribers is fine: there is nobody to navigate.
        let _ = self.events.send(AuthEvent::LoginRequired {
            redirect_to: self.login_route.clone(),
        });
    }
}
