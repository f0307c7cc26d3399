//! Charm URL parsing and formatting.
//!
//! A charm URL identifies a versioned charm in either the charm store
//! (`cs:trusty/mysql-42`, `cs:~who/trusty/wordpress-47`) or a local
//! repository (`local:quantal/wordpress-3`). The schema defaults to the
//! charm store when omitted, so `trusty/mysql` and `cs:trusty/mysql` are
//! the same reference.

use std::fmt;
use std::str::FromStr;

use crate::error::BundleError;

/// Where a charm is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    /// The remote charm store (`cs:`).
    CharmStore,
    /// A local charm repository (`local:`).
    Local,
}

impl Schema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Schema::CharmStore => "cs",
            Schema::Local => "local",
        }
    }
}

/// A parsed charm URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharmUrl {
    pub schema: Schema,
    /// Charm store namespace user (`~who`), charm store URLs only.
    pub user: Option<String>,
    pub series: Option<String>,
    pub name: String,
    pub revision: Option<u32>,
}

impl CharmUrl {
    /// Parse a charm reference, defaulting the schema to the charm store.
    pub fn parse(url: &str) -> Result<CharmUrl, BundleError> {
        let fail = |reason: &str| BundleError::InvalidCharmUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let (schema, rest) = match url.split_once(':') {
            Some(("cs", rest)) => (Schema::CharmStore, rest),
            Some(("local", rest)) => (Schema::Local, rest),
            Some((other, _)) => {
                return Err(fail(&format!("unsupported schema {other:?}")));
            }
            None => (Schema::CharmStore, url),
        };
        if rest.is_empty() {
            return Err(fail("empty path"));
        }

        let mut parts: Vec<&str> = rest.split('/').collect();
        if parts.len() > 3 {
            return Err(fail("too many path segments"));
        }

        let mut user = None;
        if let Some(stripped) = parts[0].strip_prefix('~') {
            if schema == Schema::Local {
                return Err(fail("local charm URL cannot have a user"));
            }
            if stripped.is_empty() {
                return Err(fail("empty user"));
            }
            user = Some(stripped.to_string());
            parts.remove(0);
        }

        let (series, last) = match parts.len() {
            1 => (None, parts[0]),
            2 => {
                if !is_valid_series(parts[0]) {
                    return Err(fail(&format!("invalid series {:?}", parts[0])));
                }
                (Some(parts[0].to_string()), parts[1])
            }
            _ => return Err(fail("too many path segments")),
        };

        let (name, revision) = split_revision(last);
        if !is_valid_charm_name(name) {
            return Err(fail(&format!("invalid charm name {name:?}")));
        }

        Ok(CharmUrl {
            schema,
            user,
            series,
            name: name.to_string(),
            revision,
        })
    }

    /// The URL path without the schema, e.g. `~who/trusty/wordpress-47`.
    pub fn path(&self) -> String {
        let mut out = String::new();
        if let Some(user) = &self.user {
            out.push('~');
            out.push_str(user);
            out.push('/');
        }
        if let Some(series) = &self.series {
            out.push_str(series);
            out.push('/');
        }
        out.push_str(&self.name);
        if let Some(revision) = self.revision {
            out.push('-');
            out.push_str(&revision.to_string());
        }
        out
    }

    /// The same URL with the revision stripped. Two charm URLs are
    /// upgrade-compatible when their revisionless paths are equal.
    pub fn without_revision(&self) -> CharmUrl {
        CharmUrl {
            revision: None,
            ..self.clone()
        }
    }

    /// Whether this URL names a bundle rather than a charm.
    pub fn is_bundle(&self) -> bool {
        self.series.as_deref() == Some("bundle")
    }
}

impl fmt::Display for CharmUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.schema.as_str(), self.path())
    }
}

impl FromStr for CharmUrl {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CharmUrl::parse(s)
    }
}

/// Split a trailing `-<digits>` revision off a charm name.
fn split_revision(s: &str) -> (&str, Option<u32>) {
    if let Some((name, rev)) = s.rsplit_once('-') {
        if !name.is_empty() && !rev.is_empty() && rev.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = rev.parse() {
                return (name, Some(n));
            }
        }
    }
    (s, None)
}

fn is_valid_series(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_lowercase())
}

/// Charm names are lowercase words separated by single hyphens, with at
/// least one letter (so a bare revision cannot pass as a name).
pub fn is_valid_charm_name(s: &str) -> bool {
    if s.is_empty() || s.starts_with('-') || s.ends_with('-') || s.contains("--") {
        return false;
    }
    s.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && s.bytes().any(|b| b.is_ascii_lowercase())
}
