// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The colon-delimited naming key `project[:stack[:context]]`.
//!
//! An [`Identity`] is the primary handle everywhere: services, sessions,
//! changelog entries all key off it. Wildcards are never valid in an
//! identity itself; queries use [`IdentityPattern`] instead.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BerthError;

static IDENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+(:[A-Za-z0-9._-]+){0,2}$").expect("identity regex compiles")
});

static PATTERN_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._*-]+$").expect("pattern segment regex compiles"));

/// A validated identity: one to three colon-separated segments of
/// alphanumerics, `.`, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn parse(raw: &str) -> Result<Self, BerthError> {
        if !IDENTITY_RE.is_match(raw) {
            return Err(BerthError::validation(format!(
                "invalid identity `{raw}`: expected project[:stack[:context]] with segments of [A-Za-z0-9._-]"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First segment.
    pub fn project(&self) -> &str {
        self.0.split(':').next().unwrap_or(&self.0)
    }

    /// Second segment, when present.
    pub fn stack(&self) -> Option<&str> {
        self.0.split(':').nth(1)
    }

    /// Third segment, when present.
    pub fn context(&self) -> Option<&str> {
        self.0.split(':').nth(2)
    }

    /// Identities of which this one is a refinement: `a:b:c` has ancestors
    /// `a:b` and `a`. Used for changelog rollups.
    pub fn ancestors(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut end = self.0.len();
        while let Some(pos) = self.0[..end].rfind(':') {
            end = pos;
            out.push(&self.0[..end]);
        }
        out
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = BerthError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

/// A query pattern over identities. Each segment may contain `*` as a
/// shell-style wildcard; a trailing bare `*` segment also absorbs any
/// deeper segments, so `myapp:*` matches `myapp:api` and `myapp:api:dev`.
#[derive(Debug, Clone)]
pub struct IdentityPattern {
    segments: Vec<String>,
}

impl IdentityPattern {
    pub fn parse(raw: &str) -> Result<Self, BerthError> {
        let segments: Vec<&str> = raw.split(':').collect();
        if segments.is_empty() || segments.len() > 3 {
            return Err(BerthError::validation(format!(
                "invalid identity pattern `{raw}`: expected 1-3 segments"
            )));
        }
        for seg in &segments {
            if seg.is_empty() || !PATTERN_SEGMENT_RE.is_match(seg) {
                return Err(BerthError::validation(format!(
                    "invalid identity pattern segment `{seg}` in `{raw}`"
                )));
            }
        }
        Ok(Self {
            segments: segments.into_iter().map(String::from).collect(),
        })
    }

    /// Whether the raw string contains any wildcard at all.
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| !s.contains('*'))
    }

    pub fn matches(&self, identity: &Identity) -> bool {
        self.matches_str(identity.as_str())
    }

    pub fn matches_str(&self, identity: &str) -> bool {
        let parts: Vec<&str> = identity.split(':').collect();
        let absorbing_tail = self.segments.last().map(String::as_str) == Some("*");
        if absorbing_tail {
            if parts.len() < self.segments.len() {
                return false;
            }
        } else if parts.len() != self.segments.len() {
            return false;
        }
        for (pat, part) in self.segments.iter().zip(&parts) {
            if !segment_matches(pat, part) {
                return false;
            }
        }
        true
    }
}

/// Glob-match one segment: `*` matches any (possibly empty) run.
fn segment_matches(pattern: &str, segment: &str) -> bool {
    let escaped: String = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    match Regex::new(&format!("^{escaped}$")) {
        Ok(re) => re.is_match(segment),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_to_three_segments() {
        assert!(Identity::parse("myapp").is_ok());
        assert!(Identity::parse("myapp:api").is_ok());
        assert!(Identity::parse("myapp:api:dev").is_ok());
        assert!(Identity::parse("my-app.v2:api_1").is_ok());
    }

    #[test]
    fn rejects_malformed_identities() {
        assert!(Identity::parse("").is_err());
        assert!(Identity::parse("a:b:c:d").is_err());
        assert!(Identity::parse("a::b").is_err());
        assert!(Identity::parse("a b").is_err());
        assert!(Identity::parse("a:*").is_err(), "wildcards are query-only");
    }

    #[test]
    fn segment_accessors() {
        let id = Identity::parse("myapp:api:dev").unwrap();
        assert_eq!(id.project(), "myapp");
        assert_eq!(id.stack(), Some("api"));
        assert_eq!(id.context(), Some("dev"));

        let short = Identity::parse("myapp").unwrap();
        assert_eq!(short.project(), "myapp");
        assert_eq!(short.stack(), None);
    }

    #[test]
    fn ancestors_walk_up_the_prefix_chain() {
        let id = Identity::parse("a:b:c").unwrap();
        assert_eq!(id.ancestors(), vec!["a:b", "a"]);
        assert!(Identity::parse("a").unwrap().ancestors().is_empty());
    }

    #[test]
    fn pattern_exact_and_wildcard_matching() {
        let p = IdentityPattern::parse("myapp:api").unwrap();
        assert!(p.matches_str("myapp:api"));
        assert!(!p.matches_str("myapp:web"));
        assert!(!p.matches_str("myapp"));

        let star = IdentityPattern::parse("myapp:*").unwrap();
        assert!(star.matches_str("myapp:api"));
        assert!(star.matches_str("myapp:api:dev"));
        assert!(!star.matches_str("myapp"));
        assert!(!star.matches_str("other:api"));

        let infix = IdentityPattern::parse("my*:api").unwrap();
        assert!(infix.matches_str("myapp:api"));
        assert!(infix.matches_str("mysvc:api"));
        assert!(!infix.matches_str("myapp:api:dev"), "non-tail `*` does not absorb");
    }

    #[test]
    fn literal_patterns_are_detected() {
        assert!(IdentityPattern::parse("a:b").unwrap().is_literal());
        assert!(!IdentityPattern::parse("a:*").unwrap().is_literal());
    }
}
