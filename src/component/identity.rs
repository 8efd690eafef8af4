//! Peer identity extraction.
//!
//! Identities are opaque strings handed to the authorization gate. How they
//! are obtained depends on deployment: a fixed identity for tests and trusted
//! networks, or a header set by a TLS-terminating proxy.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName};
use reqwest::Url;

use super::ComponentError;
use crate::config::IdentityConfig;

/// Identity used when nothing else is configured.
pub const ANONYMOUS: &str = "anonymous";

/// Determines who is on the other end of a connection.
pub trait PeerIdentity: Send + Sync {
    /// Identity of the caller of an inbound request.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Identity`] when the request carries none.
    fn extract_peer_identity(&self, headers: &HeaderMap) -> Result<String, ComponentError>;

    /// Identity of the peer at `url` for outbound requests.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Identity`] when it cannot be determined.
    fn identity_for_peer(&self, url: &Url) -> Result<String, ComponentError>;
}

/// Same identity for every peer.
#[derive(Debug, Clone)]
pub struct ForgedIdentity {
    identity: String,
}

impl ForgedIdentity {
    /// Always report `identity`.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }
}

impl PeerIdentity for ForgedIdentity {
    fn extract_peer_identity(&self, _headers: &HeaderMap) -> Result<String, ComponentError> {
        Ok(self.identity.clone())
    }

    fn identity_for_peer(&self, _url: &Url) -> Result<String, ComponentError> {
        Ok(self.identity.clone())
    }
}

/// Inbound identity from a request header; outbound identity is the peer's
/// host name.
#[derive(Debug, Clone)]
pub struct HeaderIdentity {
    header: HeaderName,
}

impl HeaderIdentity {
    /// Read identities from `header`.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Identity`] for invalid header names.
    pub fn new(header: &str) -> Result<Self, ComponentError> {
        let header = HeaderName::try_from(header)
            .map_err(|e| ComponentError::Identity(format!("header `{header}`: {e}")))?;
        Ok(Self { header })
    }
}

impl PeerIdentity for HeaderIdentity {
    fn extract_peer_identity(&self, headers: &HeaderMap) -> Result<String, ComponentError> {
        let value = headers
            .get(&self.header)
            .ok_or_else(|| ComponentError::Identity(format!("missing `{}` header", self.header)))?;
        let identity = value
            .to_str()
            .map_err(|e| ComponentError::Identity(format!("`{}` header: {e}", self.header)))?
            .trim();
        if identity.is_empty() {
            return Err(ComponentError::Identity(format!("empty `{}` header", self.header)));
        }
        Ok(identity.to_string())
    }

    fn identity_for_peer(&self, url: &Url) -> Result<String, ComponentError> {
        url.host_str()
            .map(ToString::to_string)
            .ok_or_else(|| ComponentError::Identity(format!("`{url}` has no host")))
    }
}

/// Extractor selected by configuration; anonymous forged identity by default.
///
/// # Errors
///
/// Returns [`ComponentError::Identity`] for an invalid header name.
pub fn identity_from_config(
    config: &IdentityConfig,
) -> Result<Arc<dyn PeerIdentity>, ComponentError> {
    match (&config.forged_identity, &config.header) {
        (_, Some(header)) => Ok(Arc::new(HeaderIdentity::new(header)?)),
        (Some(identity), None) => Ok(Arc::new(ForgedIdentity::new(identity.clone()))),
        (None, None) => Ok(Arc::new(ForgedIdentity::new(ANONYMOUS))),
    }
}
