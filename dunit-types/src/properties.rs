//! Distributed system properties - the flat configuration handed to workers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Well-known property keys.
pub mod keys {
    /// Locator list members use to find each other (`address[port]`).
    pub const LOCATORS: &str = "locators";
    /// Log level for workers and the harness.
    pub const LOG_LEVEL: &str = "log-level";
    /// Multicast discovery port (0 = disabled).
    pub const MCAST_PORT: &str = "mcast-port";
    /// Whether members should reconnect on their own after a forced disconnect.
    pub const DISABLE_AUTO_RECONNECT: &str = "disable-auto-reconnect";
}

/// A single property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean flag
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Free-form string
    Str(String),
}

impl PropertyValue {
    /// Interpret the value as a boolean, accepting `"true"`/`"false"` strings.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::Str(s) => s.parse().ok(),
            PropertyValue::Int(_) => None,
        }
    }

    /// Interpret the value as an integer, accepting numeric strings.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            PropertyValue::Str(s) => s.parse().ok(),
            PropertyValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

/// A caller-owned, mutable property mapping.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Immutable snapshot of the distributed system properties for a run.
///
/// Produced once per environment. Cloning shares the same snapshot, and
/// nothing can mutate it after construction: callers merge onto a
/// [`PropertyMap`] of their own instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributedSystemProperties(Arc<PropertyMap>);

impl DistributedSystemProperties {
    /// Freeze a property map into a snapshot.
    pub fn new(map: PropertyMap) -> Self {
        Self(Arc::new(map))
    }

    /// Look up a property.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    /// Returns true if the snapshot defines `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate over all properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no properties.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy the snapshot into a fresh, mutable map.
    pub fn to_map(&self) -> PropertyMap {
        self.0.as_ref().clone()
    }
}

impl From<PropertyMap> for DistributedSystemProperties {
    fn from(map: PropertyMap) -> Self {
        Self::new(map)
    }
}

impl Serialize for DistributedSystemProperties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DistributedSystemProperties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        PropertyMap::deserialize(deserializer).map(Self::new)
    }
}
