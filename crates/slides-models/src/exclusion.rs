//! Exclusion list entries.

use serde::{Deserialize, Serialize};

use crate::hash::PerceptualHash;

/// A named reference image that post-processing should discard on sight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionEntry {
    pub id: String,
    pub name: String,
    pub p_hash: PerceptualHash,
    /// Unix milliseconds
    #[serde(default)]
    pub created_at: i64,
    /// Shipped with the application rather than added by the user
    #[serde(default)]
    pub is_preset: bool,
    /// Presets can be switched off; user entries are always active
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ExclusionEntry {
    /// Whether this entry takes part in matching.
    pub fn is_active(&self) -> bool {
        !self.is_preset || self.is_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_preset_is_inactive() {
        let json = format!(
            r#"{{"id":"1","name":"Blank desktop","pHash":"{}","isPreset":true,"isEnabled":false}}"#,
            "0".repeat(64)
        );
        let entry: ExclusionEntry = serde_json::from_str(&json).unwrap();
        assert!(!entry.is_active());
    }

    #[test]
    fn test_user_entry_is_always_active() {
        let json = format!(
            r#"{{"id":"2","name":"Logo","pHash":"{}","isEnabled":false}}"#,
            "f".repeat(64)
        );
        let entry: ExclusionEntry = serde_json::from_str(&json).unwrap();
        assert!(entry.is_active());
    }
}
