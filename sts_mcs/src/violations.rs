//! Violation map: which replayed subsequences reproduced the bug.

use crate::error::McsError;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Subsequence index → did the replay trigger the violation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationMap {
    outcomes: BTreeMap<u64, bool>,
}

impl ViolationMap {
    /// Loads a JSON object of the form `{"1": true, "2": false}`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, McsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| McsError::io(path, e))?;
        Self::from_json(&text).map_err(|reason| McsError::violations(path, reason))
    }

    /// Parses the JSON form; keys must be decimal subsequence indices.
    pub fn from_json(text: &str) -> Result<Self, String> {
        let raw: HashMap<String, bool> = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let outcomes = raw
            .into_iter()
            .map(|(key, violated)| {
                key.trim()
                    .parse::<u64>()
                    .map(|index| (index, violated))
                    .map_err(|_| format!("key '{}' is not a subsequence index", key))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { outcomes })
    }

    /// `None` when the map has no entry for `index`.
    pub fn get(&self, index: u64) -> Option<bool> {
        self.outcomes.get(&index).copied()
    }

    /// Indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = u64> + '_ {
        self.outcomes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

impl FromIterator<(u64, bool)> for ViolationMap {
    fn from_iter<T: IntoIterator<Item = (u64, bool)>>(iter: T) -> Self {
        Self {
            outcomes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_keys() {
        let map = ViolationMap::from_json(r#"{"1": true, "2": false, "10": true}"#).unwrap();
        assert_eq!(map.get(1), Some(true));
        assert_eq!(map.get(2), Some(false));
        assert_eq!(map.get(3), None);
        assert_eq!(map.indices().collect::<Vec<_>>(), vec![1, 2, 10]);
    }

    #[test]
    fn test_non_numeric_key_rejected() {
        assert!(ViolationMap::from_json(r#"{"first": true}"#).is_err());
        assert!(ViolationMap::from_json(r#"{"1": "yes"}"#).is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let err = ViolationMap::load("/nonexistent/violations.json").unwrap_err();
        assert!(matches!(err, McsError::Io { .. }));
    }
}
