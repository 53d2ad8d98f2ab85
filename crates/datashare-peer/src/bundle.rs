//! Key-value map carried in the first block of every request and response.
//!
//! The encoding is opaque to the framing layer; here it is JSON.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{PeerError, Result};

pub const KEY_PROVIDER_ID: &str = "provider_id";
pub const KEY_DATA_ID: &str = "data_id";
pub const KEY_CALLER_ID: &str = "caller_id";
pub const KEY_REQUEST_TYPE: &str = "request_type";
pub const KEY_REQUEST_ID: &str = "request_id";
pub const KEY_ARG: &str = "arg";
pub const KEY_RESULT: &str = "result";
pub const KEY_ERROR: &str = "error";

/// One bundle entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleValue {
    Str(String),
    StrArray(Vec<String>),
}

/// Ordered map of string keys to strings or string arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bundle {
    entries: BTreeMap<String, BundleValue>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .insert(key.into(), BundleValue::Str(value.into()));
    }

    pub fn insert_array(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.entries
            .insert(key.into(), BundleValue::StrArray(values));
    }

    pub fn get(&self, key: &str) -> Option<&BundleValue> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(BundleValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_array(&self, key: &str) -> Option<&[String]> {
        match self.entries.get(key) {
            Some(BundleValue::StrArray(values)) => Some(values),
            _ => None,
        }
    }

    /// String value for `key`, or `InvalidParameter` naming the key.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key)
            .ok_or_else(|| PeerError::invalid(format!("missing bundle field '{key}'")))
    }

    /// Parse an integer stored as a string.
    pub fn require_i32(&self, key: &str) -> Result<i32> {
        let raw = self.require_str(key)?;
        raw.parse()
            .map_err(|_| PeerError::invalid(format!("bundle field '{key}' is not an integer: {raw}")))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate string-valued entries in key order.
    pub fn iter_str(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|(key, value)| match value {
            BundleValue::Str(value) => Some((key.as_str(), value.as_str())),
            BundleValue::StrArray(_) => None,
        })
    }

    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Bundle {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bundle = Bundle::new();
        for (key, value) in iter {
            bundle.insert_str(key, value);
        }
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_and_arrays_survive_encoding() {
        let mut bundle = Bundle::new();
        bundle.insert_str(KEY_CALLER_ID, "org.example.consumer");
        bundle.insert_array(KEY_ARG, vec!["contacts".into(), "NULL".into()]);

        let decoded = Bundle::decode(&bundle.encode().unwrap()).unwrap();
        assert_eq!(decoded, bundle);
        assert_eq!(decoded.get_str(KEY_CALLER_ID), Some("org.example.consumer"));
        assert_eq!(decoded.get_array(KEY_ARG).unwrap().len(), 2);
        assert_eq!(decoded.get_str(KEY_ARG), None);
    }

    #[test]
    fn require_reports_missing_and_malformed_fields() {
        let mut bundle = Bundle::new();
        bundle.insert_str(KEY_REQUEST_ID, "abc");
        assert!(matches!(
            bundle.require_str(KEY_DATA_ID),
            Err(PeerError::InvalidParameter(_))
        ));
        assert!(matches!(
            bundle.require_i32(KEY_REQUEST_ID),
            Err(PeerError::InvalidParameter(_))
        ));
    }

    #[test]
    fn garbage_is_a_bundle_error() {
        let err = Bundle::decode(b"\x00\x01").unwrap_err();
        assert_eq!(err.class(), datashare_transport::ErrorClass::InvalidParameter);
    }

    #[test]
    fn collects_from_pairs() {
        let bundle: Bundle = [("name", "ada"), ("age", "36")].into_iter().collect();
        let pairs: Vec<_> = bundle.iter_str().collect();
        assert_eq!(pairs, vec![("age", "36"), ("name", "ada")]);
    }
}
