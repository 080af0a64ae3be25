//! Insertion-ordered URL-prefix to token map

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Value;
use std::fmt;
use tracing::debug;

/// Normalize a URL or prefix to end with exactly one `/`
///
/// # Example
/// ```
/// # use pkgident_core::baked::normalize_url;
/// assert_eq!(normalize_url("https://repo.example.com//"), "https://repo.example.com/");
/// assert_eq!(normalize_url("https://repo.example.com/main"), "https://repo.example.com/main/");
/// ```
pub fn normalize_url(url: &str) -> String {
    format!("{}/", url.trim_end_matches('/'))
}

/// URL-prefix to auth-token map that keeps declaration order
///
/// Serializes as a plain YAML/JSON mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenTable {
    entries: Vec<(String, String)>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced key keeps its position
    pub fn insert(&mut self, url: impl Into<String>, token: impl Into<String>) {
        let url = url.into();
        let token = token.into();
        match self.entries.iter_mut().find(|(k, _)| *k == url) {
            Some(entry) => entry.1 = token,
            None => self.entries.push((url, token)),
        }
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == url)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, url: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == url)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, url: &str) -> bool {
        self.get(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First entry, in declaration order, whose key prefixes `url`
    pub fn first_prefix_match(&self, url: &str) -> Option<&str> {
        let url = normalize_url(url);
        self.iter()
            .find(|(k, _)| url.starts_with(k))
            .map(|(_, v)| v)
    }

    /// Read a YAML mapping, skipping entries that are not string to string
    ///
    /// `None` when `value` is not a mapping at all.
    pub fn from_yaml(value: &Value) -> Option<Self> {
        let Value::Mapping(map) = value else {
            return None;
        };
        let mut table = TokenTable::new();
        for (url, token) in map {
            match (url.as_str(), token.as_str()) {
                (Some(url), Some(token)) => table.insert(url, token),
                _ => debug!("Skipping repo token entry {:?}: {:?}", url, token),
            }
        }
        Some(table)
    }

    /// Entry with the longest key that prefixes `url`
    pub fn longest_prefix_match(&self, url: &str) -> Option<&str> {
        let url = normalize_url(url);
        self.iter()
            .filter(|(k, _)| url.starts_with(k))
            .max_by_key(|(k, _)| k.len())
            .map(|(_, v)| v)
    }
}

impl FromIterator<(String, String)> for TokenTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut table = TokenTable::new();
        for (url, token) in iter {
            table.insert(url, token);
        }
        table
    }
}

impl Serialize for TokenTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (url, token) in &self.entries {
            map.serialize_entry(url, token)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TokenTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = TokenTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of URL prefixes to tokens")
            }

            fn visit_unit<E>(self) -> Result<TokenTable, E> {
                Ok(TokenTable::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TokenTable, A::Error> {
                let mut table = TokenTable::new();
                while let Some((url, token)) = access.next_entry::<String, String>()? {
                    table.insert(url, token);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_any(TableVisitor)
    }
}
