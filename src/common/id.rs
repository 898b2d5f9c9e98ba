//! Canonical identifiers. Keys enter the scheduler as arbitrary immutable
//! values (strings, byte-strings, or nested tuples) and are normalized once,
//! at ingest, to a byte-string (`Key`). Everything past ingest -- the graph
//! store, the selector, the healer -- deals exclusively in `Key`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A canonical task/result identity. Always the output of [`RawKey::canonicalize`];
/// never constructed directly from user input.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Vec<u8>);

// Keys travel over the wire as plain JSON strings (lossy for non-UTF-8
// bytes, which the scheduler never produces itself -- only a client could
// hand us one, and `str_graph`-style keys are always valid UTF-8 text).
impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(&self.0))
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Key(s.into_bytes()))
    }
}

impl Key {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Key(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Key({})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// A value as it arrives from a client, before normalization. Strings and
/// byte-strings canonicalize directly; tuples canonicalize to their Python-style
/// textual representation, then to bytes, matching `str_graph` in the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawKey {
    Bytes(Vec<u8>),
    Str(String),
    Tuple(Vec<RawKey>),
}

impl RawKey {
    pub fn canonicalize(&self) -> Key {
        match self {
            RawKey::Bytes(b) => Key(b.clone()),
            RawKey::Str(s) => Key(s.clone().into_bytes()),
            RawKey::Tuple(_) => Key(self.tuple_repr().into_bytes()),
        }
    }

    /// Python-`repr`-like rendering: `('x', 1)`. Only used for tuple keys;
    /// canonicalizing the result again is idempotent because the output is
    /// indistinguishable from a plain string key once it is bytes.
    fn tuple_repr(&self) -> String {
        match self {
            RawKey::Bytes(b) => format!("'{}'", String::from_utf8_lossy(b)),
            RawKey::Str(s) => format!("'{}'", s),
            RawKey::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(RawKey::tuple_repr).collect();
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
        }
    }
}

/// A worker's address, in canonical `host:port` form. Restrictions are
/// expressed in terms of the hostname half only.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerAddr(String);

impl WorkerAddr {
    pub fn new(address: impl Into<String>) -> Self {
        WorkerAddr(address.into())
    }

    pub fn hostname(&self) -> &str {
        self.0.split(':').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque client session identity (`client` field of `update-graph`, etc).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        ClientId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
