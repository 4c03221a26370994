//! Shared data types.

use serde::{Deserialize, Serialize};

/// Backend-defined entity; the core does not interpret its fields.
pub type Entity = serde_json::Value;

/// A work zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkZone {
    /// Work zone label.
    pub work_zone_label: String,
    /// Work zone name.
    #[serde(default)]
    pub work_zone_name: String,
    /// Status, e.g. `active`.
    #[serde(default)]
    pub status: String,
    /// Travel area.
    #[serde(default)]
    pub travel_area: String,
    /// Matching keys.
    #[serde(default)]
    pub keys: Vec<String>,
}
