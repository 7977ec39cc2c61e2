use chrono::{DateTime, SecondsFormat, Utc};
use serde::{ser::SerializeMap, Serialize, Serializer};

// Key under which the submission time is appended
pub const TIMESTAMP_KEY: &str = "timestamp";

// Value of a single payload field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn empty() -> Self {
        FieldValue::Text(String::new())
    }
}

// Ordered mapping of payload keys to values
// The receiving spreadsheet matches columns by key name, so keys are kept
// exactly as given (case-sensitive) and in insertion order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubmissionPayload {
    entries: Vec<(String, FieldValue)>,
}

impl SubmissionPayload {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    // Insert or replace, keeping the original position on replace
    pub fn insert(&mut self, key: &str, value: FieldValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    // Copy of this payload with the submission time appended
    // A stale timestamp is dropped first so the new one always lands last
    pub fn stamped(&self, at: DateTime<Utc>) -> Self {
        let mut stamped = self.clone();
        stamped.remove(TIMESTAMP_KEY);
        stamped.insert(
            TIMESTAMP_KEY,
            FieldValue::Text(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        stamped
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for SubmissionPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
