pub mod collector;
pub mod config;
pub mod ingest;
pub mod probe;
pub mod render;
pub mod scheduler;
pub mod series;
pub mod storage;
pub mod util;

use serde::{Deserialize, Serialize};

/// Identifier of a measurement target (the speedtest server id)
pub type TargetId = u32;

/// A remote endpoint measurements are taken against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub display: Option<String>,
}

impl Target {
    pub fn new(id: TargetId, display: Option<&str>) -> Self {
        Self {
            id,
            display: display.map(str::to_string),
        }
    }

    /// Human readable label, falling back to `id {id}` if none is configured
    pub fn display_name(&self) -> String {
        self.display
            .clone()
            .unwrap_or_else(|| fallback_name(self.id))
    }
}

/// Label used for targets without a configured display name
pub fn fallback_name(id: TargetId) -> String {
    format!("id {id}")
}

/// Resolve the label for `id` against the configured targets.
///
/// Targets that only exist in the history (e.g. removed from the
/// configuration) still get a stable label.
pub fn target_label(targets: &[Target], id: TargetId) -> String {
    targets
        .iter()
        .find(|target| target.id == id)
        .map(Target::display_name)
        .unwrap_or_else(|| fallback_name(id))
}
