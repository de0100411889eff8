//! Property merging with harness-level defaults.
//!
//! The backend snapshot is never written to. Callers hand in their own
//! [`PropertyMap`] and get back a map with the snapshot's values filled in
//! wherever they did not set a key themselves.

use dunit_types::{keys, DistributedSystemProperties, PropertyMap, PropertyValue};

/// Log level reported when the snapshot does not set `log-level`.
pub const DEFAULT_LOG_LEVEL: &str = "config";

/// Merge the backend snapshot onto the caller's properties.
///
/// - Keys the caller already set are left untouched (caller wins).
/// - Keys only the snapshot defines are copied in.
/// - If neither side contains `disable-auto-reconnect`, it is set to `true`:
///   tests expect to control reconnection themselves. Only key presence is
///   tested, so an explicit `false` on either side is respected.
pub fn merge_properties(
    snapshot: &DistributedSystemProperties,
    mut caller: PropertyMap,
) -> PropertyMap {
    for (key, value) in snapshot.iter() {
        caller
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    caller
        .entry(keys::DISABLE_AUTO_RECONNECT.to_string())
        .or_insert(PropertyValue::Bool(true));

    caller
}

/// The log level configured for the run, or [`DEFAULT_LOG_LEVEL`].
pub fn log_level(snapshot: &DistributedSystemProperties) -> String {
    snapshot
        .get(keys::LOG_LEVEL)
        .map(|v| v.to_string())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}
