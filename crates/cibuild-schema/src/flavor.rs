//! Hierarchical build configuration tags.
//!
//! A platform flavor is written as a `/`-separated string whose first segment
//! is the operating system, e.g. `Linux/Qt6` or `Windows/Qt5/static`.
//! Rules declared for a partial flavor apply to every specialisation of it:
//! a ruleset `on: [Linux]` applies when building `Linux/Qt6`.
//!
//! # Example
//!
//! ```
//! use cibuild_schema::PlatformFlavor;
//!
//! let flavor: PlatformFlavor = "Linux/Qt6".parse().unwrap();
//! assert!(flavor.matches(&["Linux"]));
//! assert!(!flavor.matches(&["Linux/Qt6/static"]));
//! ```

use crate::CATCH_ALL_FLAVORS;
use crate::types::SchemaError;

/// A platform flavor such as `Linux/Qt6`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformFlavor {
    segments: Vec<String>,
}

impl PlatformFlavor {
    /// Build a flavor from its string form.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::EmptyFlavor`] if the string is empty.
    pub fn new(flavor: &str) -> Result<Self, SchemaError> {
        if flavor.is_empty() {
            return Err(SchemaError::EmptyFlavor);
        }
        Ok(Self {
            segments: flavor.split('/').map(str::to_string).collect(),
        })
    }

    /// The operating system tag (first segment).
    pub fn os(&self) -> &str {
        &self.segments[0]
    }

    /// All segments, most general first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Check whether any flavor of `flavor_set` applies to this flavor.
    ///
    /// `@all` and `@everything` match unconditionally. Any other entry
    /// matches when its segments form a prefix of ours.
    pub fn matches<S: AsRef<str>>(&self, flavor_set: &[S]) -> bool {
        if flavor_set
            .iter()
            .any(|f| CATCH_ALL_FLAVORS.contains(&f.as_ref()))
        {
            return true;
        }

        flavor_set.iter().any(|declared| {
            let declared: Vec<&str> = declared.as_ref().split('/').collect();
            declared.len() <= self.segments.len()
                && declared
                    .iter()
                    .zip(&self.segments)
                    .all(|(d, s)| *d == s.as_str())
        })
    }
}

impl std::fmt::Display for PlatformFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl std::str::FromStr for PlatformFlavor {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
