use std::fmt;

use bytes::Bytes;

/// Kind of change delivered by a watch stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Key was inserted or updated
    Put,
    /// Key was deleted
    Delete,
}

impl EventKind {
    pub fn is_put(self) -> bool {
        self == EventKind::Put
    }

    pub fn is_delete(self) -> bool {
        self == EventKind::Delete
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Put => "PUT",
            EventKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single change observed on a watched prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// The key that changed
    pub key: String,
    /// The new value (`None` for DELETE events)
    pub value: Option<Bytes>,
    /// Type of change
    pub kind: EventKind,
}

impl WatchEvent {
    pub fn put(
        key: impl Into<String>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            kind: EventKind::Put,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            kind: EventKind::Delete,
        }
    }
}

/// Key/value pair returned by a bulk prefix read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Bytes,
}

impl KeyValue {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<KeyValue> for WatchEvent {
    fn from(kv: KeyValue) -> Self {
        WatchEvent::put(kv.key, kv.value)
    }
}

/// Exact leading-substring match used by every prefix lookup in the crate
#[inline]
pub(crate) fn matches_prefix(
    key: &str,
    prefix: &str,
) -> bool {
    key.starts_with(prefix)
}
