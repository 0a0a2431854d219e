//! Turns session events and guard decisions into (printed) navigation.

use bookgate_core::nav::Navigator;
use bookgate_core::AuthEvent;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;

/// Where the terminal "is". Navigation just prints and records the location.
pub struct Coordinator {
    events: broadcast::Receiver<AuthEvent>,
    location: String,
}

impl Coordinator {
    pub fn new(events: broadcast::Receiver<AuthEvent>, location: impl Into<String>) -> Self {
        Self {
            events,
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Act on every event published since the last call.
    pub fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(AuthEvent::LoginRequired { redirect_to }) => {
                    eprintln!("Session expired. Please log in again.");
                    self.redirect(&redirect_to, &[]);
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed session events");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

impl Navigator for Coordinator {
    fn proceed(&mut self) {
        println!("-> allowed");
    }

    fn redirect(&mut self, destination: &str, params: &[(String, String)]) {
        if params.is_empty() {
            println!("-> redirect to {}", destination);
        } else {
            let query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            println!("-> redirect to {} ({})", destination, query.join(", "));
        }
        self.location = destination.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_required_moves_to_login() {
        let (tx, rx) = broadcast::channel(4);
        let mut coordinator = Coordinator::new(rx, "/books");
        tx.send(AuthEvent::LoginRequired {
            redirect_to: "Login".to_string(),
        })
        .unwrap();

        coordinator.drain_events();
        assert_eq!(coordinator.location(), "Login");
    }

    #[test]
    fn test_no_events_stays_put() {
        let (_tx, rx) = broadcast::channel::<AuthEvent>(4);
        let mut coordinator = Coordinator::new(rx, "/books");
        coordinator.drain_events();
        assert_eq!(coordinator.location(), "/books");
    }
}
