use crate::events::mask_token;
use std::fmt;
use url::Url;

/// An authenticated API endpoint, resolved once per analysis
#[derive(Clone, PartialEq, Eq)]
pub struct Connection {
    base_endpoint: Url,
    token: String,
    api_version: String,
}

impl Connection {
    pub fn new(base_endpoint: Url, token: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            base_endpoint,
            token: token.into(),
            api_version: api_version.into(),
        }
    }

    pub fn base_endpoint(&self) -> &Url {
        &self.base_endpoint
    }

    /// Origin of the base endpoint without a trailing slash, used in cache keys
    pub fn origin(&self) -> String {
        self.base_endpoint.origin().ascii_serialization()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn token_hint(&self) -> String {
        mask_token(&self.token)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("base_endpoint", &self.base_endpoint.as_str())
            .field("token", &self.token_hint())
            .field("api_version", &self.api_version)
            .finish()
    }
}
