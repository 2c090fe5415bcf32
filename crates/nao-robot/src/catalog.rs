//! Classified lookup tables of runnable behaviors.
//!
//! A [`Catalog`] is built in one go from the robot's package listing (or the
//! fixed fallback when simulated) and never mutated afterwards; the session
//! swaps whole catalogs.

use std::collections::HashMap;

use nao_core::behavior::{Behavior, BehaviorInfo, LocalizedName};
use nao_core::errors::RobotError;
use serde::Deserialize;

pub const ANIMATIONS_PACKAGE: &str = "animations";
pub const REACTION_POSTURE: &str = "Stand";
pub const HEAD_TOUCHED: &str = "HeadTouched";
pub const HEAD_TOUCHED_PACKAGE: &str = "dialog_touch";
pub const HEAD_TOUCHED_PATH: &str = "animations/head_touched";
pub const BODY_ACTION_PACKAGE: &str = "dialog_move_arms";

/// Reaction types selected by tag, with the tag they match on.
const TAGGED_REACTIONS: [(&str, &str); 4] = [
    ("Happy", "happy"),
    ("Proud", "proud"),
    ("Laugh", "laugh"),
    ("Sad", "sad"),
];

/// Applied in order; later keys see the output of earlier replacements.
const BODY_ACTION_REPLACEMENTS: [(&str, &str); 5] = [
    ("LArm", "left arm"),
    ("RArm", "right arm"),
    ("BothArms", "both arms"),
    ("Up", "Raise "),
    ("Stretch", "Stretch "),
];

const DEFAULT_LOCALE: &str = "en_US";
const SECOND_LOCALE: &str = "fr_FR";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    // Listing order; a later entry with the same id replaces the earlier one
    // in place.
    dances: Vec<BehaviorInfo>,
    reactions: Vec<(String, Vec<BehaviorInfo>)>,
    body_actions: Vec<BehaviorInfo>,
}

impl Catalog {
    /// Classify a full behavior list.
    pub fn build(behaviors: &[Behavior]) -> Self {
        let dances = keyed_in_order(
            behaviors
                .iter()
                .filter(|b| is_dance(b))
                .map(BehaviorInfo::from_behavior),
        );

        let mut reactions: Vec<(String, Vec<BehaviorInfo>)> = TAGGED_REACTIONS
            .iter()
            .map(|(reaction, tag)| {
                let matching = behaviors
                    .iter()
                    .filter(|b| is_tagged_reaction(b, tag))
                    .map(BehaviorInfo::from_behavior)
                    .collect();
                (reaction.to_string(), matching)
            })
            .collect();
        let head_touched = behaviors
            .iter()
            .filter(|b| b.package_id == HEAD_TOUCHED_PACKAGE && b.path == HEAD_TOUCHED_PATH)
            .map(BehaviorInfo::from_behavior)
            .collect();
        reactions.push((HEAD_TOUCHED.to_string(), head_touched));

        let body_actions = keyed_in_order(
            behaviors
                .iter()
                .filter(|b| b.package_id == BODY_ACTION_PACKAGE)
                .map(body_action_info),
        );

        Self {
            dances,
            reactions,
            body_actions,
        }
    }

    /// Parse a raw package listing and classify it.
    pub fn from_listing(listing: &serde_json::Value) -> Result<Self, RobotError> {
        let behaviors = parse_package_listing(listing)?;
        Ok(Self::build(&behaviors))
    }

    /// Fixed catalog used when no robot is available.
    pub fn fallback() -> Self {
        let dances = [
            (
                "caravan-palace-se",
                LocalizedName::new("Electro Swing", "Electro Swing"),
                "Nao dances on Electro Swing music.",
            ),
            (
                "eagle-dance",
                LocalizedName::new("Eagle Dance", "La danse de l'aigle"),
                "This is a slow dance with impressive moves balanced on one foot.\r\n",
            ),
            (
                "gangnam-style",
                LocalizedName::new("Gangnam Style", "Gangnam sta ile"),
                "Gangnam style dance.",
            ),
            (
                "thriller-dance",
                LocalizedName::new("The thriller dance", "La danse thriller"),
                "Nao dances on Michael Jackson's thriller.",
            ),
        ]
        .into_iter()
        .map(|(id, localized_name, description)| BehaviorInfo {
            id: id.to_string(),
            behavior_name: id.to_string(),
            localized_name,
            description: description.to_string(),
        })
        .collect();

        let reactions = TAGGED_REACTIONS
            .iter()
            .map(|(reaction, _)| reaction.to_string())
            .chain(std::iter::once(HEAD_TOUCHED.to_string()))
            .map(|reaction| (reaction, Vec::new()))
            .collect();

        let body_actions = [
            ("StretchBothArms", "Stretch both arms", "Etire les deux bras"),
            ("StretchLArm", "Stretch left arm", "Etire le bras gauche"),
            ("StretchRArm", "Stretch right arm", "Etire le bras droit"),
            ("UpBothArms", "Raise both arms", "Lève les deux bras"),
            ("UpLArm", "Raise left arm", "Lève le bras gauche"),
            ("UpRArm", "Raise right arm", "Lève le bras droit"),
        ]
        .into_iter()
        .map(|(id, en, fr)| BehaviorInfo {
            id: id.to_string(),
            behavior_name: format!("{BODY_ACTION_PACKAGE}/animations/{id}"),
            localized_name: LocalizedName::new(en, fr),
            description: en.to_string(),
        })
        .collect();

        Self {
            dances,
            reactions,
            body_actions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dances.is_empty() && self.reactions.is_empty() && self.body_actions.is_empty()
    }

    pub fn dance(&self, id: &str) -> Option<&BehaviorInfo> {
        self.dances.iter().find(|d| d.id == id)
    }

    pub fn dances(&self) -> impl Iterator<Item = &BehaviorInfo> {
        self.dances.iter()
    }

    pub fn reaction_types(&self) -> impl Iterator<Item = &str> {
        self.reactions.iter().map(|(reaction, _)| reaction.as_str())
    }

    pub fn reactions(&self, reaction_type: &str) -> Option<&[BehaviorInfo]> {
        self.reactions
            .iter()
            .find(|(reaction, _)| reaction == reaction_type)
            .map(|(_, behaviors)| behaviors.as_slice())
    }

    pub fn body_action(&self, id: &str) -> Option<&BehaviorInfo> {
        self.body_actions.iter().find(|b| b.id == id)
    }

    pub fn body_actions(&self) -> impl Iterator<Item = &BehaviorInfo> {
        self.body_actions.iter()
    }
}

fn keyed_in_order(infos: impl Iterator<Item = BehaviorInfo>) -> Vec<BehaviorInfo> {
    let mut ordered: Vec<BehaviorInfo> = Vec::new();
    for info in infos {
        match ordered.iter_mut().find(|existing| existing.id == info.id) {
            Some(existing) => *existing = info,
            None => ordered.push(info),
        }
    }
    ordered
}

// Matches the free-text description; kept as-is because clients rely on the
// resulting list.
fn is_dance(behavior: &Behavior) -> bool {
    behavior.description.contains("dance")
}

fn is_tagged_reaction(behavior: &Behavior, tag: &str) -> bool {
    behavior.package_id == ANIMATIONS_PACKAGE
        && behavior
            .path
            .starts_with(&format!("{REACTION_POSTURE}/Emotions"))
        && behavior.has_tag(tag)
}

fn body_action_info(behavior: &Behavior) -> BehaviorInfo {
    let id = behavior
        .path
        .rsplit('/')
        .next()
        .unwrap_or(behavior.path.as_str())
        .to_string();
    let description = describe_body_action(&id);
    BehaviorInfo {
        id,
        behavior_name: behavior.name.clone(),
        localized_name: LocalizedName::new(description.clone(), ""),
        description,
    }
}

/// Human-readable description of a body-action path segment.
pub fn describe_body_action(segment: &str) -> String {
    BODY_ACTION_REPLACEMENTS
        .iter()
        .fold(segment.to_string(), |description, (key, value)| {
            if description.contains(key) {
                description.replace(key, value)
            } else {
                description
            }
        })
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    uuid: String,
    elems: RawElems,
}

#[derive(Debug, Deserialize)]
struct RawElems {
    names: HashMap<String, String>,
    descriptions: HashMap<String, String>,
    contents: RawContents,
}

#[derive(Debug, Deserialize)]
struct RawContents {
    behaviors: Vec<RawBehavior>,
}

#[derive(Debug, Deserialize)]
struct RawBehavior {
    path: String,
    #[serde(rename = "langToName", default)]
    lang_to_name: HashMap<String, String>,
    #[serde(rename = "langToDesc", default)]
    lang_to_desc: HashMap<String, String>,
    #[serde(rename = "langToTags", default)]
    lang_to_tags: HashMap<String, Vec<String>>,
}

/// Flatten a raw package listing into behaviors.
/// Packages missing any of the expected sections are skipped.
pub fn parse_package_listing(listing: &serde_json::Value) -> Result<Vec<Behavior>, RobotError> {
    let packages = listing
        .as_array()
        .ok_or_else(|| RobotError::remote("package listing is not a list"))?;

    let mut behaviors = Vec::new();
    for package in packages {
        let package: RawPackage = match serde_json::from_value(package.clone()) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "skipping package without behavior contents");
                continue;
            }
        };

        for raw in &package.elems.contents.behaviors {
            let (name, names, descriptions) = if raw.path == "." {
                (
                    package.uuid.clone(),
                    &package.elems.names,
                    &package.elems.descriptions,
                )
            } else {
                (
                    format!("{}/{}", package.uuid, raw.path),
                    &raw.lang_to_name,
                    &raw.lang_to_desc,
                )
            };

            behaviors.push(Behavior {
                package_id: package.uuid.clone(),
                path: raw.path.clone(),
                name,
                localized_name: LocalizedName::with_fallback(
                    names.get(DEFAULT_LOCALE).map(String::as_str),
                    names.get(SECOND_LOCALE).map(String::as_str),
                ),
                description: descriptions.get(DEFAULT_LOCALE).cloned().unwrap_or_default(),
                tags: raw.lang_to_tags.get(DEFAULT_LOCALE).cloned().unwrap_or_default(),
            });
        }
    }
    Ok(behaviors)
}
