//! Robot actions as MCP tools see them: every call answers with a sentence
//! describing what happened. Failures are reported, never raised.

use std::sync::Arc;

use nao_core::errors::RobotError;
use nao_robot::RobotSession;
use tracing::{debug, warn};

/// Text answer of one tool call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolReply {
    pub ok: bool,
    pub text: String,
}

impl ToolReply {
    fn done(text: String) -> Self {
        Self { ok: true, text }
    }

    fn failed(text: String) -> Self {
        Self { ok: false, text }
    }
}

fn reply(tool: &'static str, result: Result<(), RobotError>, done: String, failed: &str) -> ToolReply {
    match result {
        Ok(()) => ToolReply::done(done),
        Err(e) => {
            warn!(tool, error = %e, "tool call failed");
            ToolReply::failed(format!("{failed}: {e}"))
        }
    }
}

fn listing<T: serde::Serialize>(tool: &'static str, items: &[T]) -> ToolReply {
    match serde_json::to_string(items) {
        Ok(json) => ToolReply::done(json),
        Err(e) => {
            warn!(tool, error = %e, "failed to serialize listing");
            ToolReply::failed(format!("Failed to list: {e}"))
        }
    }
}

#[derive(Clone)]
pub struct NaoTools {
    session: Arc<RobotSession>,
}

impl NaoTools {
    pub fn new(session: Arc<RobotSession>) -> Self {
        Self { session }
    }

    pub async fn set_tts_language(&self, language: &str) -> ToolReply {
        reply(
            "set_tts_language",
            self.session.set_tts_language(language).await,
            format!("Nao switched language to {language}"),
            &format!("Nao failed to switch language to {language}"),
        )
    }

    pub async fn say(&self, text: &str) -> ToolReply {
        reply(
            "say",
            self.session.say(text).await,
            format!("Nao said {text}"),
            &format!("Nao failed to say {text}"),
        )
    }

    pub async fn wake_up(&self) -> ToolReply {
        reply(
            "wake_up",
            self.session.wake_up().await,
            "Nao motors are enabled".into(),
            "Failed to enable Nao motors",
        )
    }

    pub async fn rest(&self) -> ToolReply {
        reply(
            "rest",
            self.session.rest().await,
            "Nao motors are disabled".into(),
            "Failed to disable Nao motors",
        )
    }

    pub async fn stand_up(&self) -> ToolReply {
        reply(
            "stand_up",
            self.session.stand_up().await,
            "Nao stood up".into(),
            "Nao failed to stand up",
        )
    }

    pub async fn sit_down(&self) -> ToolReply {
        reply(
            "sit_down",
            self.session.sit_down().await,
            "Nao sat down".into(),
            "Nao failed to sit down",
        )
    }

    pub fn get_dance_list(&self) -> ToolReply {
        debug!("retrieving dance list");
        listing("get_dance_list", &self.session.dance_behaviors())
    }

    pub async fn dance(&self, dance_id: &str) -> ToolReply {
        reply(
            "dance",
            self.session.dance(dance_id).await,
            format!("Nao has danced the dance with id '{dance_id}'"),
            &format!("Nao failed to dance the dance with id '{dance_id}'"),
        )
    }

    pub fn get_expressive_reaction_types(&self) -> ToolReply {
        listing(
            "get_expressive_reaction_types",
            &self.session.expressive_reaction_types(),
        )
    }

    pub async fn expressive_reaction(&self, reaction_type: &str) -> ToolReply {
        reply(
            "expressive_reaction",
            self.session.expressive_reaction(reaction_type).await,
            format!("Nao has reacted for type '{reaction_type}'"),
            &format!("Nao failed to react for type '{reaction_type}'"),
        )
    }

    pub fn get_body_actions_list(&self) -> ToolReply {
        debug!("retrieving body actions list");
        listing("get_body_actions_list", &self.session.body_action_behaviors())
    }

    pub async fn body_action(&self, body_action_id: &str) -> ToolReply {
        reply(
            "body_action",
            self.session.body_action(body_action_id).await,
            format!("Nao has performed the body action with id '{body_action_id}'"),
            &format!("Nao failed to perform the body action with id '{body_action_id}'"),
        )
    }
}
