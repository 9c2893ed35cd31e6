use serde::{Deserialize, Serialize};

use super::ids::ActorId;

/// Origin recorded when no proxy header identifies the client.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Per-request facts shared by every security check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub actor_id: Option<ActorId>,
    pub actor_email: Option<String>,
    /// Client network origin derived from proxy headers, or `"unknown"`
    pub origin: String,
    pub user_agent: Option<String>,
    /// Logical endpoint name, e.g. `auth/login`
    pub endpoint: String,
    pub method: String,
}

impl RequestContext {
    pub fn new(endpoint: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            actor_id: None,
            actor_email: None,
            origin: UNKNOWN_ORIGIN.to_string(),
            user_agent: None,
            endpoint: endpoint.into(),
            method: method.into(),
        }
    }

    pub fn with_actor(mut self, id: ActorId, email: Option<String>) -> Self {
        self.actor_id = Some(id);
        self.actor_email = email;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Key used for rate limiting: the authenticated actor when known,
    /// otherwise the network origin.
    pub fn rate_limit_identifier(&self) -> String {
        match &self.actor_id {
            Some(actor) => format!("user:{}", actor),
            None => format!("ip:{}", self.origin),
        }
    }
}
