//! Project descriptors, branch rule tables and dependency rulesets.
//!
//! All three are read from YAML. The order of entries inside `require` maps
//! and rule tables is significant (later requirements override earlier ones,
//! rule globs are tried in declaration order), so those maps are decoded
//! into ordered vectors of pairs instead of hash maps.

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use crate::types::{Branch, BranchSpec, ProjectId};

/// A project as described by its `metadata.yaml` in the metadata tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Globally unique identifier.
    pub identifier: ProjectId,
    /// Slash separated repository path (e.g. `frameworks/kio`).
    pub repopath: String,
    /// Whether the project has its own repository to clone.
    #[serde(default)]
    pub hasrepo: bool,
    /// Directory (relative to the working directory) to reuse instead of a clone.
    #[serde(rename = "reuse-directory", default, skip_serializing_if = "Option::is_none")]
    pub reuse_directory: Option<String>,
}

impl Project {
    /// Parse a descriptor from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or lacks required keys.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}

/// Named branch-aliasing rules (`branch-rules.yml`).
///
/// Each rule (e.g. `@stable`) maps repository paths or globs to branches.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct BranchRuleTable {
    #[serde(deserialize_with = "deserialize_rule_table")]
    rules: BTreeMap<String, Vec<(String, Branch)>>,
}

impl BranchRuleTable {
    /// Parse a rule table from YAML. An empty document yields an empty table.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is not a mapping of mappings.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Add or replace a rule.
    pub fn insert(&mut self, name: &str, entries: Vec<(String, Branch)>) {
        self.rules.insert(name.to_string(), entries);
    }

    /// The `(pattern, branch)` entries of a rule, in declaration order.
    pub fn rule(&self, name: &str) -> Option<&[(String, Branch)]> {
        self.rules.get(name).map(Vec::as_slice)
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// One entry of a project's `Dependencies` list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DependencyRuleset {
    /// Platform flavors this ruleset applies to.
    #[serde(default)]
    pub on: Vec<String>,
    /// Repository path globs mapped to branch specifications.
    #[serde(default, deserialize_with = "deserialize_ordered")]
    pub require: Vec<(String, BranchSpec)>,
}

impl DependencyRuleset {
    /// Build a ruleset from string pairs.
    pub fn new<S: AsRef<str>>(on: &[S], require: &[(&str, &str)]) -> Self {
        Self {
            on: on.iter().map(|s| s.as_ref().to_string()).collect(),
            require: require
                .iter()
                .map(|(glob, spec)| ((*glob).to_string(), BranchSpec::parse(spec)))
                .collect(),
        }
    }
}

/// Decode a YAML mapping into a vector of pairs, keeping declaration order.
fn deserialize_ordered<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct OrderedVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping")
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, V>()? {
                entries.push((key, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_any(OrderedVisitor(PhantomData))
}

fn deserialize_rule_table<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, Vec<(String, Branch)>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Rule(#[serde(deserialize_with = "deserialize_ordered")] Vec<(String, Branch)>);

    let raw: BTreeMap<String, Rule> = BTreeMap::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(name, Rule(rule))| (name, rule)).collect())
}
