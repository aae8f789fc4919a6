// Validated newtypes enforcing the canonicalization and non-emptiness invariants
// that the rest of the crate relies on at construction time rather than at every call site.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strip control characters (`U+0000-U+001F`, `U+007F-U+009F`) and ASCII double quotes,
/// the way the original extractor's `_clean_str` does after HTML-unescaping and trimming.
fn strip_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(*c as u32, 0x00..=0x1f | 0x7f..=0x9f) && *c != '"')
        .collect()
}

/// HTML-unescape, trim, then strip control characters. Shared by node/edge field
/// canonicalization (I3) and by the graph builder's tuple field cleaning (spec.md S4.B).
pub fn clean_str(raw: &str) -> String {
    let unescaped = html_escape::decode_html_entities(raw.trim());
    strip_control_chars(&unescaped)
}

/// The canonicalization function named in I3: html-unescape, trim, uppercase, then
/// strip control characters. Used for every `node_uid`/`edge` endpoint name.
pub fn canonicalize(raw: &str) -> String {
    clean_str(&raw.to_uppercase())
}

/// A node's canonical uid: case-folded, trimmed, HTML-unescaped title (I3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeUid(String);

impl NodeUid {
    /// Build from a raw, not-yet-canonicalized extracted name.
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let canonical = canonicalize(raw.as_ref());
        ensure!(!canonical.is_empty(), "node uid cannot be empty after canonicalization");
        Ok(Self(canonical))
    }

    /// Wrap a value that is already known to be canonical (e.g. read back from storage).
    /// Still re-derives and checks idempotence (P2) in debug builds.
    pub fn from_canonical(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        ensure!(!value.is_empty(), "node uid cannot be empty");
        debug_assert_eq!(canonicalize(&value), value, "stored node uid is not canonical");
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NodeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An edge's deterministic uid, derived from its endpoints as `"{source}_to_{target}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeUid(String);

impl EdgeUid {
    pub fn derive(source: &NodeUid, target: &NodeUid) -> Self {
        Self(format!("{}_to_{}", source.as_str(), target.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A community's stable string uid, distinct from its human-facing `title`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommunityUid(String);

impl CommunityUid {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        ensure!(!value.trim().is_empty(), "community uid cannot be empty");
        Ok(Self(value))
    }

    /// Deterministic uid for a cluster produced at a given hierarchy level, so that
    /// re-running clustering over an unchanged stabilized view reproduces the same uids.
    pub fn for_cluster(level: usize, cluster_index: usize) -> Self {
        Self(format!("community_L{level}_{cluster_index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommunityUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize("  Alice &amp; Bob  ");
        let twice = canonicalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn canonicalize_strips_control_chars_and_quotes() {
        let raw = "Al\u{0007}ice\"";
        assert_eq!(canonicalize(raw), "ALICE");
    }

    #[test]
    fn canonicalize_unescapes_html_entities() {
        assert_eq!(canonicalize("Tom &amp; Jerry"), "TOM & JERRY");
    }

    #[test]
    fn node_uid_rejects_empty() {
        assert!(NodeUid::new("   ").is_err());
    }

    #[test]
    fn edge_uid_derivation_matches_spec_format() {
        let s = NodeUid::new("Alice").unwrap();
        let t = NodeUid::new("Acme").unwrap();
        assert_eq!(EdgeUid::derive(&s, &t).as_str(), "ALICE_to_ACME");
    }
}
