// Read-only view over a browser cookie store

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Scope of the cookie, possibly with a leading dot
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    "/".to_string()
}

impl Cookie {
    pub fn new(name: &str, value: &str, domain: &str, secure: bool) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_string(),
            secure,
            path: default_path(),
        }
    }

    /// Domain without its leading dot, lowercased
    pub fn bare_domain(&self) -> String {
        self.domain.trim_start_matches('.').to_lowercase()
    }

    /// Whether this cookie is in scope for `host` (same host or a parent domain)
    pub fn matches_host(&self, host: &str) -> bool {
        let domain = self.bare_domain();
        if domain.is_empty() {
            return false;
        }
        let host = host.to_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    }
}

/// Filter for [`CookieStore::get_all`]
#[derive(Debug, Clone, Default)]
pub struct CookieQuery {
    pub name: Option<String>,
    /// Matches cookies scoped to this domain or any of its subdomains
    pub domain: Option<String>,
    pub secure: Option<bool>,
}

impl CookieQuery {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    fn matches(&self, cookie: &Cookie) -> bool {
        if let Some(ref name) = self.name
            && &cookie.name != name
        {
            return false;
        }
        if let Some(secure) = self.secure
            && cookie.secure != secure
        {
            return false;
        }
        if let Some(ref domain) = self.domain {
            let wanted = domain.trim_start_matches('.').to_lowercase();
            let actual = cookie.bare_domain();
            if actual != wanted && !actual.ends_with(&format!(".{}", wanted)) {
                return false;
            }
        }
        true
    }
}

/// The credential store the session discovery reads from.
///
/// Lookups are synchronous: stores are expected to be in memory or to load
/// their content up front.
pub trait CookieStore: Send + Sync {
    /// The cookie named `name` that would be sent to `url`, most specific scope first
    fn get(&self, url: &Url, name: &str) -> Option<Cookie>;

    fn get_all(&self, query: &CookieQuery) -> Vec<Cookie>;
}

/// In-memory cookie store, typically loaded from a JSON export of a browser profile
#[derive(Debug, Clone, Default)]
pub struct MemoryCookieStore {
    cookies: Vec<Cookie>,
}

impl MemoryCookieStore {
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self { cookies }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let cookies: Vec<Cookie> = serde_json::from_str(json)
            .map_err(|e| ScanError::ParseError(format!("Invalid cookie export: {}", e)))?;
        Ok(Self::new(cookies))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn insert(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl CookieStore for MemoryCookieStore {
    fn get(&self, url: &Url, name: &str) -> Option<Cookie> {
        let host = url.host_str()?;
        let https = url.scheme() == "https";
        self.cookies
            .iter()
            .filter(|c| c.name == name && c.matches_host(host) && (https || !c.secure))
            .max_by_key(|c| c.bare_domain().len())
            .cloned()
    }

    fn get_all(&self, query: &CookieQuery) -> Vec<Cookie> {
        self.cookies
            .iter()
            .filter(|c| query.matches(c))
            .cloned()
            .collect()
    }
}
