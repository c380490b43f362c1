//! Durable store connection target

use std::fmt;

/// A validated connection string for the durable store
///
/// Holding a target does not imply a session exists; stores build their pool
/// lazily from it.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    url: String,
}

impl ConnectionTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connection string with the password masked, safe for logs
    pub fn redacted(&self) -> String {
        let Some(scheme_end) = self.url.find("://") else {
            return self.url.clone();
        };
        let rest = &self.url[scheme_end + 3..];
        let Some(at) = rest.rfind('@') else {
            return self.url.clone();
        };
        let userinfo = &rest[..at];
        match userinfo.find(':') {
            Some(colon) => format!(
                "{}{}:***{}",
                &self.url[..scheme_end + 3],
                &userinfo[..colon],
                &rest[at..]
            ),
            None => self.url.clone(),
        }
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("url", &self.redacted())
            .finish()
    }
}
