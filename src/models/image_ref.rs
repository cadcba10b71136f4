//! Container image reference parsing.
//!
//! Workload specs name images as:
//!
//! ```text
//! [host[:port]/]path[:tag][@digest]
//! ```
//!
//! The first path component is treated as a registry host when it contains
//! a `.` or a `:`, or is exactly `localhost`. References without a host
//! are never hosted on a managed registry.
//!
//! # Examples
//!
//! ```
//! use tagreaper::models::ImageReference;
//!
//! let image = ImageReference::parse("gcr.io/acme/api:v1.4.0")?;
//! assert_eq!(image.host(), Some("gcr.io"));
//! assert_eq!(image.repository(), "acme/api");
//! assert_eq!(image.tag(), Some("v1.4.0"));
//! # Ok::<(), tagreaper::Error>(())
//! ```

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A parsed container image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    host: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    /// Parses an image reference string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the reference is empty or has an
    /// empty repository path, tag, or digest.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("empty image reference".to_string()));
        }

        let (name, digest) = match trimmed.split_once('@') {
            Some((_, "")) => {
                return Err(Error::InvalidInput(format!(
                    "image reference has an empty digest: {s}"
                )));
            },
            Some((name, digest)) => (name, Some(digest.to_string())),
            None => (trimmed, None),
        };

        let (host, path) = match name.split_once('/') {
            Some((first, rest)) if is_host(first) => (Some(first.to_string()), rest),
            _ => (None, name),
        };

        let last_slash = path.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match path[last_slash..].rfind(':') {
            Some(colon) => {
                let split = last_slash + colon;
                let tag = &path[split + 1..];
                if tag.is_empty() {
                    return Err(Error::InvalidInput(format!(
                        "image reference has an empty tag: {s}"
                    )));
                }
                (&path[..split], Some(tag.to_string()))
            },
            None => (path, None),
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(Error::InvalidInput(format!(
                "image reference has an empty repository path: {s}"
            )));
        }

        Ok(Self {
            host,
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Returns the explicit host, if the reference named one.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the repository path relative to the host.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns the tag, if present.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Returns the pinned digest, if present.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Returns `true` if the reference is hosted on `host`.
    ///
    /// Hosts compare case-insensitively after [`canonical_host`]. Any other
    /// port is significant.
    #[must_use]
    pub fn is_hosted_on(&self, host: &str) -> bool {
        self.host
            .as_deref()
            .is_some_and(|h| canonical_host(h).eq_ignore_ascii_case(canonical_host(host)))
    }
}

/// Strips a default HTTPS or HTTP port from `host[:port]`.
///
/// `registry.example.com:443` and `registry.example.com` name the same
/// registry, both in workload references and in the configured registry URL.
#[must_use]
pub fn canonical_host(host: &str) -> &str {
    host.strip_suffix(":443")
        .or_else(|| host.strip_suffix(":80"))
        .unwrap_or(host)
}

fn is_host(component: &str) -> bool {
    component == "localhost" || component.contains('.') || component.contains(':')
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(host) = &self.host {
            write!(f, "{host}/")?;
        }
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
