use serde::{Deserialize, Serialize};

/// Display names of a behavior in the two locales clients know about.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedName {
    pub en: String,
    pub fr: String,
}

impl LocalizedName {
    pub fn new(en: impl Into<String>, fr: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            fr: fr.into(),
        }
    }

    /// Build from optional locale values; a missing `fr` falls back to `en`.
    pub fn with_fallback(en: Option<&str>, fr: Option<&str>) -> Self {
        let en = en.unwrap_or_default().to_string();
        let fr = fr.map(str::to_string).unwrap_or_else(|| en.clone());
        Self { en, fr }
    }
}

/// A runnable behavior installed on the robot, as found in the package listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Behavior {
    pub package_id: String,
    pub path: String,
    /// Name the behavior manager knows it by.
    pub name: String,
    pub localized_name: LocalizedName,
    pub description: String,
    pub tags: Vec<String>,
}

impl Behavior {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Client-facing catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorInfo {
    pub id: String,
    pub behavior_name: String,
    pub localized_name: LocalizedName,
    pub description: String,
}

impl BehaviorInfo {
    /// Entry keyed by the behavior's own name.
    pub fn from_behavior(behavior: &Behavior) -> Self {
        Self {
            id: behavior.name.clone(),
            behavior_name: behavior.name.clone(),
            localized_name: behavior.localized_name.clone(),
            description: behavior.description.clone(),
        }
    }
}
