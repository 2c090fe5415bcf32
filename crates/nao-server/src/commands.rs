//! The closed set of commands a client can issue, with typed payloads.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    GenericNao,
    SetTtsLanguage,
    Say,
    StopSay,
    WakeUp,
    Rest,
    StandUp,
    SitDown,
    ChangeEyesColor,
    GetDanceBehaviors,
    Dance,
    StopDance,
    GetExpressiveReactionTypes,
    ExpressiveReaction,
    StopExpressiveReaction,
    GetBodyActionBehaviors,
    BodyAction,
    StopBodyAction,
    SetBasicAwarenessState,
    SetBreathingEnabled,
    RunBehavior,
    StopBehavior,
}

impl CommandKind {
    pub const ALL: [CommandKind; 22] = [
        Self::GenericNao,
        Self::SetTtsLanguage,
        Self::Say,
        Self::StopSay,
        Self::WakeUp,
        Self::Rest,
        Self::StandUp,
        Self::SitDown,
        Self::ChangeEyesColor,
        Self::GetDanceBehaviors,
        Self::Dance,
        Self::StopDance,
        Self::GetExpressiveReactionTypes,
        Self::ExpressiveReaction,
        Self::StopExpressiveReaction,
        Self::GetBodyActionBehaviors,
        Self::BodyAction,
        Self::StopBodyAction,
        Self::SetBasicAwarenessState,
        Self::SetBreathingEnabled,
        Self::RunBehavior,
        Self::StopBehavior,
    ];

    /// Wire name as sent in `commandId`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenericNao => "GenericNao",
            Self::SetTtsLanguage => "SetTTSLanguage",
            Self::Say => "Say",
            Self::StopSay => "StopSay",
            Self::WakeUp => "WakeUp",
            Self::Rest => "Rest",
            Self::StandUp => "StandUp",
            Self::SitDown => "SitDown",
            Self::ChangeEyesColor => "ChangeEyesColor",
            Self::GetDanceBehaviors => "GetDanceBehaviors",
            Self::Dance => "Dance",
            Self::StopDance => "StopDance",
            Self::GetExpressiveReactionTypes => "GetExpressiveReactionTypes",
            Self::ExpressiveReaction => "ExpressiveReaction",
            Self::StopExpressiveReaction => "StopExpressiveReaction",
            Self::GetBodyActionBehaviors => "GetBodyActionBehaviors",
            Self::BodyAction => "BodyAction",
            Self::StopBodyAction => "StopBodyAction",
            Self::SetBasicAwarenessState => "SetBasicAwarenessState",
            Self::SetBreathingEnabled => "SetBreathingEnabled",
            Self::RunBehavior => "RunBehavior",
            Self::StopBehavior => "StopBehavior",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("command not found in mapping: {0}")]
    UnknownCommand(String),
    #[error("invalid payload for command '{kind}': {reason}")]
    InvalidPayload { kind: CommandKind, reason: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    GenericNao { text: String },
    SetTtsLanguage { language: String },
    Say { text: String },
    StopSay,
    WakeUp,
    Rest,
    StandUp,
    SitDown,
    ChangeEyesColor { color: String },
    GetDanceBehaviors,
    Dance { dance_id: String },
    StopDance { dance_id: String },
    GetExpressiveReactionTypes,
    ExpressiveReaction { reaction_type: String },
    StopExpressiveReaction { reaction_type: String },
    GetBodyActionBehaviors,
    BodyAction { body_action_id: String },
    StopBodyAction { body_action_id: String },
    SetBasicAwarenessState {
        enabled: bool,
        engagement_mode: String,
        tracking_mode: String,
    },
    SetBreathingEnabled { enabled: bool, chain_name: String },
    RunBehavior { name: String },
    StopBehavior { name: String },
}

#[derive(Deserialize)]
struct TextPayload {
    text: String,
}

#[derive(Deserialize)]
struct LanguagePayload {
    language: String,
}

#[derive(Deserialize)]
struct ColorPayload {
    color: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DancePayload {
    dance_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReactionPayload {
    reaction_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BodyActionPayload {
    body_action_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AwarenessPayload {
    enabled: bool,
    engagement_mode: String,
    tracking_mode: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BreathingPayload {
    enabled: bool,
    chain_name: String,
}

#[derive(Deserialize)]
struct NamePayload {
    name: String,
}

fn payload<T: DeserializeOwned>(kind: CommandKind, data: &Value) -> Result<T, CommandError> {
    serde_json::from_value(data.clone()).map_err(|e| CommandError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

impl Command {
    /// Resolve a wire command name and payload.
    pub fn from_wire(name: &str, data: &Value) -> Result<Self, CommandError> {
        let kind =
            CommandKind::parse(name).ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;
        Self::parse(kind, data)
    }

    /// Payloads of commands without arguments are ignored.
    pub fn parse(kind: CommandKind, data: &Value) -> Result<Self, CommandError> {
        use CommandKind as K;

        let command = match kind {
            K::GenericNao => {
                let p: TextPayload = payload(kind, data)?;
                Self::GenericNao { text: p.text }
            }
            K::SetTtsLanguage => {
                let p: LanguagePayload = payload(kind, data)?;
                Self::SetTtsLanguage { language: p.language }
            }
            K::Say => {
                let p: TextPayload = payload(kind, data)?;
                Self::Say { text: p.text }
            }
            K::StopSay => Self::StopSay,
            K::WakeUp => Self::WakeUp,
            K::Rest => Self::Rest,
            K::StandUp => Self::StandUp,
            K::SitDown => Self::SitDown,
            K::ChangeEyesColor => {
                let p: ColorPayload = payload(kind, data)?;
                Self::ChangeEyesColor { color: p.color }
            }
            K::GetDanceBehaviors => Self::GetDanceBehaviors,
            K::Dance => {
                let p: DancePayload = payload(kind, data)?;
                Self::Dance { dance_id: p.dance_id }
            }
            K::StopDance => {
                let p: DancePayload = payload(kind, data)?;
                Self::StopDance { dance_id: p.dance_id }
            }
            K::GetExpressiveReactionTypes => Self::GetExpressiveReactionTypes,
            K::ExpressiveReaction => {
                let p: ReactionPayload = payload(kind, data)?;
                Self::ExpressiveReaction { reaction_type: p.reaction_type }
            }
            K::StopExpressiveReaction => {
                let p: ReactionPayload = payload(kind, data)?;
                Self::StopExpressiveReaction { reaction_type: p.reaction_type }
            }
            K::GetBodyActionBehaviors => Self::GetBodyActionBehaviors,
            K::BodyAction => {
                let p: BodyActionPayload = payload(kind, data)?;
                Self::BodyAction { body_action_id: p.body_action_id }
            }
            K::StopBodyAction => {
                let p: BodyActionPayload = payload(kind, data)?;
                Self::StopBodyAction { body_action_id: p.body_action_id }
            }
            K::SetBasicAwarenessState => {
                let p: AwarenessPayload = payload(kind, data)?;
                Self::SetBasicAwarenessState {
                    enabled: p.enabled,
                    engagement_mode: p.engagement_mode,
                    tracking_mode: p.tracking_mode,
                }
            }
            K::SetBreathingEnabled => {
                let p: BreathingPayload = payload(kind, data)?;
                Self::SetBreathingEnabled {
                    enabled: p.enabled,
                    chain_name: p.chain_name,
                }
            }
            K::RunBehavior => {
                let p: NamePayload = payload(kind, data)?;
                Self::RunBehavior { name: p.name }
            }
            K::StopBehavior => {
                let p: NamePayload = payload(kind, data)?;
                Self::StopBehavior { name: p.name }
            }
        };
        Ok(command)
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::GenericNao { .. } => CommandKind::GenericNao,
            Self::SetTtsLanguage { .. } => CommandKind::SetTtsLanguage,
            Self::Say { .. } => CommandKind::Say,
            Self::StopSay => CommandKind::StopSay,
            Self::WakeUp => CommandKind::WakeUp,
            Self::Rest => CommandKind::Rest,
            Self::StandUp => CommandKind::StandUp,
            Self::SitDown => CommandKind::SitDown,
            Self::ChangeEyesColor { .. } => CommandKind::ChangeEyesColor,
            Self::GetDanceBehaviors => CommandKind::GetDanceBehaviors,
            Self::Dance { .. } => CommandKind::Dance,
            Self::StopDance { .. } => CommandKind::StopDance,
            Self::GetExpressiveReactionTypes => CommandKind::GetExpressiveReactionTypes,
            Self::ExpressiveReaction { .. } => CommandKind::ExpressiveReaction,
            Self::StopExpressiveReaction { .. } => CommandKind::StopExpressiveReaction,
            Self::GetBodyActionBehaviors => CommandKind::GetBodyActionBehaviors,
            Self::BodyAction { .. } => CommandKind::BodyAction,
            Self::StopBodyAction { .. } => CommandKind::StopBodyAction,
            Self::SetBasicAwarenessState { .. } => CommandKind::SetBasicAwarenessState,
            Self::SetBreathingEnabled { .. } => CommandKind::SetBreathingEnabled,
            Self::RunBehavior { .. } => CommandKind::RunBehavior,
            Self::StopBehavior { .. } => CommandKind::StopBehavior,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_kind_round_trips_its_name() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CommandKind::parse("SetTTSLanguage"), Some(CommandKind::SetTtsLanguage));
        assert_eq!(CommandKind::parse("Fly"), None);
        assert_eq!(CommandKind::parse("say"), None);
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            Command::from_wire("Fly", &json!({})),
            Err(CommandError::UnknownCommand("Fly".into()))
        );
    }

    #[test]
    fn typed_payloads() {
        assert_eq!(
            Command::from_wire("Dance", &json!({"danceId": "eagle-dance"})).unwrap(),
            Command::Dance { dance_id: "eagle-dance".into() }
        );
        assert_eq!(
            Command::from_wire(
                "SetBasicAwarenessState",
                &json!({"enabled": true, "engagementMode": "Unengaged", "trackingMode": "Head"})
            )
            .unwrap(),
            Command::SetBasicAwarenessState {
                enabled: true,
                engagement_mode: "Unengaged".into(),
                tracking_mode: "Head".into(),
            }
        );
        assert_eq!(
            Command::from_wire("SetBreathingEnabled", &json!({"enabled": false, "chainName": "Arms"}))
                .unwrap(),
            Command::SetBreathingEnabled { enabled: false, chain_name: "Arms".into() }
        );
    }

    #[test]
    fn argument_free_commands_ignore_payload() {
        assert_eq!(Command::from_wire("WakeUp", &Value::Null).unwrap(), Command::WakeUp);
        assert_eq!(
            Command::from_wire("GetDanceBehaviors", &json!({"extra": 1})).unwrap(),
            Command::GetDanceBehaviors
        );
    }

    #[test]
    fn malformed_payloads() {
        let err = Command::from_wire("Say", &json!({"txt": "hi"})).unwrap_err();
        assert!(matches!(err, CommandError::InvalidPayload { kind: CommandKind::Say, .. }));
        assert!(err.to_string().contains("'Say'"));

        assert!(Command::from_wire("Dance", &Value::Null).is_err());
        assert!(Command::from_wire("SetBreathingEnabled", &json!({"enabled": "yes", "chainName": "Body"})).is_err());
    }

    #[test]
    fn kind_matches_parsed_command() {
        let command = Command::from_wire("StopBehavior", &json!({"name": "a/b"})).unwrap();
        assert_eq!(command.kind(), CommandKind::StopBehavior);
    }
}
