//! Per-request context passed explicitly into every mutating operation.

use serde::{Deserialize, Serialize};

/// Caller context for a ledger operation.
///
/// Carries what a browser client would otherwise keep in local storage: the
/// bearer token a remote store authenticates with and the currency symbol
/// amounts are displayed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Bearer token for a remote store (opaque here)
    pub token: Option<String>,
    /// Currency symbol used when formatting amounts
    pub currency_symbol: String,
    /// Who is acting, recorded in audit entries
    pub actor: Option<String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            token: None,
            currency_symbol: "$".to_string(),
            actor: None,
        }
    }
}

impl RequestContext {
    /// Context for an anonymous local caller.
    pub fn local() -> Self {
        Self::default()
    }

    /// Builder: set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Builder: set the currency symbol.
    pub fn with_currency(mut self, symbol: impl Into<String>) -> Self {
        self.currency_symbol = symbol.into();
        self
    }

    /// Builder: set the acting user.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Actor name for logs, `anonymous` when unset.
    pub fn actor_or_anonymous(&self) -> &str {
        self.actor.as_deref().unwrap_or("anonymous")
    }
}
