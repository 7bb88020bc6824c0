use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;

/// Errors raised while parsing shared types.
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    /// A platform flavor string was empty.
    #[error("Platform flavor must not be empty")]
    EmptyFlavor,

    /// A package version string did not have the `<branch>-<timestamp>` shape.
    #[error("Invalid package version '{0}': expected <branch>-<timestamp>")]
    InvalidPackageVersion(String),

    /// A metadata record could not be decoded.
    #[error("Invalid metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// A project identifier, unique across the metadata tree (e.g. `kcoreaddons`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Create a new identifier.
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for ProjectId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ProjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ProjectId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ProjectId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A version-control branch name (e.g. `master`, `5.3`, `work/feature`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Branch(String);

impl Branch {
    /// Create a new branch name (stored as-is).
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Return the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The form used in registry names, which cannot contain slashes.
    ///
    /// ```
    /// use cibuild_schema::Branch;
    ///
    /// assert_eq!(Branch::new("feature/foo").normalized(), Branch::new("feature-foo"));
    /// ```
    pub fn normalized(&self) -> Self {
        Self(self.0.replace('/', "-"))
    }

    /// Whether this is the mainline branch.
    pub fn is_mainline(&self) -> bool {
        self.0 == crate::MAINLINE_BRANCH
    }

    /// Parse the branch as a dotted release number (`5.12` -> `[5, 12]`).
    ///
    /// A leading `v` is accepted. Returns `None` for anything that is not
    /// purely numeric segments.
    pub fn release_number(&self) -> Option<Vec<u64>> {
        let raw = self.0.strip_prefix('v').unwrap_or(&self.0);
        if raw.is_empty() {
            return None;
        }
        raw.split('.').map(|s| s.parse::<u64>().ok()).collect()
    }
}

/// Compare two release numbers segment-wise; missing segments count as zero.
pub fn compare_release_numbers(a: &[u64], b: &[u64]) -> Ordering {
    for i in 0..a.len().max(b.len()) {
        let (x, y) = (a.get(i).unwrap_or(&0), b.get(i).unwrap_or(&0));
        match x.cmp(y) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for Branch {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Branch {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Branch {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Branch {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl From<&str> for Branch {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Branch {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The branch requested for a dependency in a ruleset.
///
/// Anything starting with `@` is a "magic" rule that needs further
/// resolution; `@same` is built in, every other name refers to an entry of
/// the branch rule table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BranchSpec {
    /// A plain branch name.
    Literal(Branch),
    /// `@same`: track whatever the current build's branch maps to.
    Same,
    /// A named rule from the branch rule table, stored with its `@`.
    Magic(String),
}

impl BranchSpec {
    /// Parse a raw branch specification.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "@same" => Self::Same,
            magic if magic.starts_with('@') => Self::Magic(magic.to_string()),
            literal => Self::Literal(Branch::new(literal)),
        }
    }

    /// The specification as written.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(branch) => branch.as_str(),
            Self::Same => "@same",
            Self::Magic(name) => name,
        }
    }
}

impl std::fmt::Display for BranchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for BranchSpec {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl Serialize for BranchSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BranchSpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_replaces_slashes() {
        assert_eq!(Branch::new("feature/foo").normalized(), "feature-foo");
        assert_eq!(Branch::new("work/a/b").normalized(), "work-a-b");
        assert_eq!(Branch::new("master").normalized(), "master");
    }

    #[test]
    fn test_normalize_idempotent() {
        for raw in ["feature/foo", "5.3", "a//b", "plain"] {
            let once = Branch::new(raw).normalized();
            assert_eq!(once.normalized(), once);
        }
    }

    #[test]
    fn test_release_number() {
        assert_eq!(Branch::new("5.12").release_number(), Some(vec![5, 12]));
        assert_eq!(Branch::new("v6.0.1").release_number(), Some(vec![6, 0, 1]));
        assert_eq!(Branch::new("kf5").release_number(), None);
        assert_eq!(Branch::new("release/5.3").release_number(), None);
        assert_eq!(Branch::new("").release_number(), None);
    }

    #[test]
    fn test_release_comparison_is_numeric() {
        assert_eq!(compare_release_numbers(&[5, 12], &[5, 3]), Ordering::Greater);
        assert_eq!(compare_release_numbers(&[5, 2], &[5, 2, 0]), Ordering::Equal);
        assert_eq!(compare_release_numbers(&[4, 99], &[5]), Ordering::Less);
    }

    #[test]
    fn test_branch_spec_parse() {
        assert_eq!(BranchSpec::parse("@same"), BranchSpec::Same);
        assert_eq!(
            BranchSpec::parse("@stable"),
            BranchSpec::Magic("@stable".to_string())
        );
        assert_eq!(
            BranchSpec::parse("5.3"),
            BranchSpec::Literal(Branch::new("5.3"))
        );
        assert_eq!(BranchSpec::parse("@stable").to_string(), "@stable");
    }
}
