//! Schema-version markers and staleness.
//!
//! Every stored document carries a reserved marker field recording the schema revision that
//! produced it. The repository stamps the current version (as a string) on every store and
//! migration. Legacy documents may hold a marker of another shape, stamped by earlier code:
//!
//! | marker shape            | stale when                                      |
//! |-------------------------|-------------------------------------------------|
//! | missing or null         | always                                          |
//! | number                  | numerically older than the current version      |
//! | numeric string `"1.2"`  | component-wise older than the current version   |
//! | other string            | different from the current version              |
//! | array, object, other    | always                                          |
//!
//! Versions are compared component by component (`"1.10" > "1.9"`, `"2" == "2.0"`).

use bson::{Bson, Document, doc};
use std::{cmp::Ordering, fmt};

/// Default name of the reserved marker field.
pub const DEFAULT_SCHEMA_VERSION_FIELD: &str = "schema_version";

/// The schema version the running service writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaVersion {
    raw: String,
    components: Option<Vec<u64>>,
}

impl SchemaVersion {
    pub fn new(version: impl Into<String>) -> Self {
        let raw = version.into().trim().to_string();
        let components = parse_components(&raw);

        Self { raw, components }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The marker value stamped on stored documents.
    pub fn marker(&self) -> Bson {
        Bson::String(self.raw.clone())
    }

    /// Returns whether a document carrying `marker` must be migrated to this version.
    pub fn is_stale(&self, marker: Option<&Bson>) -> bool {
        let components = match marker {
            None | Some(Bson::Null) => return true,
            Some(Bson::String(value)) if value.trim() == self.raw => return false,
            Some(Bson::String(value)) => parse_components(value),
            Some(Bson::Int32(value)) => u64::try_from(*value).ok().map(|value| vec![value]),
            Some(Bson::Int64(value)) => u64::try_from(*value).ok().map(|value| vec![value]),
            Some(Bson::Double(value)) if value.is_finite() && *value >= 0.0 => {
                parse_components(&value.to_string())
            }
            Some(_) => None,
        };

        match (components, &self.components) {
            (Some(marker), Some(current)) => compare_components(&marker, current) == Ordering::Less,
            _ => true,
        }
    }

    /// Filter selecting every document that may be stale.
    ///
    /// The candidates still have to be checked with [`is_stale`](Self::is_stale), since the store
    /// cannot order markers of mixed shapes. Array markers are always selected: `$ne` tests their
    /// elements, so an array holding the current version would otherwise slip through.
    pub fn candidates_filter(&self, field: &str) -> Document {
        doc! {
            "$or": [
                { field: { "$ne": self.raw.as_str() } },
                { field: { "$type": "array" } },
            ]
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for SchemaVersion {
    fn from(version: &str) -> Self {
        SchemaVersion::new(version)
    }
}

impl From<String> for SchemaVersion {
    fn from(version: String) -> Self {
        SchemaVersion::new(version)
    }
}

fn parse_components(version: &str) -> Option<Vec<u64>> {
    let version = version.trim();
    if version.is_empty() {
        return None;
    }

    version
        .split('.')
        .map(|component| component.trim().parse::<u64>().ok())
        .collect()
}

fn compare_components(left: &[u64], right: &[u64]) -> Ordering {
    let len = left.len().max(right.len());
    (0..len)
        .map(|i| {
            let l = left.get(i).copied().unwrap_or(0);
            let r = right.get(i).copied().unwrap_or(0);
            l.cmp(&r)
        })
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}
