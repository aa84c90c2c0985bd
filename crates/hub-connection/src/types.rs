//! Public types for the hub connection.

use std::fmt;

use harmonyctl_protocol::messages::PairRequest;

/// Account credentials used for the connection handshake.
#[derive(Clone, Default, PartialEq)]
pub struct HubCredentials {
    pub email: String,
    pub password: String,
}

impl HubCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub(crate) fn pair_request(&self) -> PairRequest {
        PairRequest {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

impl fmt::Debug for HubCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Events emitted by the connection supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Initial connection established.
    Connected { address: String },
    /// A queued command hit its watchdog deadline.
    Stalled { task: String },
    /// The current client was replaced with a fresh one.
    Reconnected { address: String },
    /// A reconnect attempt failed; the next stall retries.
    ReconnectFailed { address: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = HubCredentials::new("me@example.com", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("me@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn pair_request_carries_both_fields() {
        let req = HubCredentials::new("a", "b").pair_request();
        assert_eq!(req.email, "a");
        assert_eq!(req.password, "b");
    }
}
