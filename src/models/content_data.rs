use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an update: `provider/name:version`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdateId {
    pub provider: String,
    pub name: String,
    pub version: String,
}

impl UpdateId {
    pub fn new<P, N, V>(provider: P, name: N, version: V) -> Self
    where
        P: Into<String>,
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            provider: provider.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.provider.is_empty() && !self.name.is_empty() && !self.version.is_empty()
    }

    /// Serialized form reported as `installedUpdateId`
    pub fn to_json_string(&self) -> String {
        serde_json::json!({
            "provider": self.provider,
            "name": self.name,
            "version": self.version,
        })
        .to_string()
    }
}

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.provider, self.name, self.version)
    }
}

/// Content fields of an accepted deployment
///
/// Present for as long as a deployment is being processed; dropped when the
/// workflow completes or is superseded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentData {
    pub expected_update_id: UpdateId,
    pub installed_criteria: Option<String>,
    /// Handler selector, e.g. `microsoft/apt:1`
    pub update_type: String,
}

impl ContentData {
    /// Criteria passed to `IsInstalled`; falls back to the update id
    pub fn installed_criteria_or_update_id(&self) -> String {
        self.installed_criteria
            .clone()
            .unwrap_or_else(|| self.expected_update_id.to_string())
    }
}
