use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use nao_core::errors::RobotError;
use nao_robot::RobotSession;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::commands::Command;
use crate::protocol::{CommandEnded, CommandRequest};

/// Resolve and run one command against the session, producing the
/// correlated response. Never fails.
pub async fn dispatch(session: &RobotSession, request: &CommandRequest) -> CommandEnded {
    dispatch_with(request, |command| execute(session, command)).await
}

/// Like [`dispatch`] with a custom executor. Panics inside `run` are caught
/// and reported as an error response.
pub async fn dispatch_with<F, Fut>(request: &CommandRequest, run: F) -> CommandEnded
where
    F: FnOnce(Command) -> Fut,
    Fut: Future<Output = Result<Value, RobotError>>,
{
    let uuid = request.command_uuid.as_str();
    info!(command = %request.command_id, command_uuid = uuid, "received command");

    let command = match Command::from_wire(&request.command_id, &request.command_data) {
        Ok(command) => command,
        Err(e) => {
            error!(command = %request.command_id, error = %e, "rejecting command");
            return CommandEnded::error(uuid, e.to_string());
        }
    };
    let kind = command.kind();

    let response = match AssertUnwindSafe(run(command)).catch_unwind().await {
        Ok(Ok(data)) => CommandEnded::success(uuid, data),
        Ok(Err(e)) if e.is_client_error() => {
            warn!(command = %kind, error = %e, error_kind = e.error_kind(), "command refused");
            CommandEnded::error(uuid, e.to_string())
        }
        Ok(Err(e)) => {
            error!(command = %kind, error = %e, error_kind = e.error_kind(), "error in command");
            CommandEnded::error(uuid, e.to_string())
        }
        Err(_) => {
            error!(command = %kind, "command handler panicked");
            CommandEnded::error(uuid, format!("command '{kind}' failed unexpectedly"))
        }
    };

    info!(command = %kind, success = response.is_success(), "sending response after applying command");
    response
}

/// Run a parsed command. Catalog queries return their listing as `data`;
/// every other command returns `null`.
pub async fn execute(session: &RobotSession, command: Command) -> Result<Value, RobotError> {
    info!(command = %command.kind(), "applying command");

    match command {
        Command::GenericNao { text } => {
            info!(text = %text, "generic command");
            Ok(Value::Null)
        }
        Command::SetTtsLanguage { language } => {
            session.set_tts_language(&language).await.map(none)
        }
        Command::Say { text } => session.say(&text).await.map(none),
        Command::StopSay => session.stop_say().await.map(none),
        Command::WakeUp => session.wake_up().await.map(none),
        Command::Rest => session.rest().await.map(none),
        Command::StandUp => session.stand_up().await.map(none),
        Command::SitDown => session.sit_down().await.map(none),
        Command::ChangeEyesColor { color } => session.change_eyes_color(&color).await.map(none),

        Command::GetDanceBehaviors => Ok(listing(&session.dance_behaviors())),
        Command::Dance { dance_id } => session.dance(&dance_id).await.map(none),
        Command::StopDance { dance_id } => session.stop_dance(&dance_id).await.map(none),

        Command::GetExpressiveReactionTypes => Ok(listing(&session.expressive_reaction_types())),
        Command::ExpressiveReaction { reaction_type } => {
            session.expressive_reaction(&reaction_type).await.map(none)
        }
        Command::StopExpressiveReaction { reaction_type } => {
            session.stop_expressive_reaction(&reaction_type).await.map(none)
        }

        Command::GetBodyActionBehaviors => Ok(listing(&session.body_action_behaviors())),
        Command::BodyAction { body_action_id } => {
            session.body_action(&body_action_id).await.map(none)
        }
        Command::StopBodyAction { body_action_id } => {
            session.stop_body_action(&body_action_id).await.map(none)
        }

        Command::SetBasicAwarenessState {
            enabled,
            engagement_mode,
            tracking_mode,
        } => {
            info!(enabled, engagement_mode = %engagement_mode, tracking_mode = %tracking_mode, "setting basic awareness");
            session
                .set_basic_awareness(enabled, &engagement_mode, &tracking_mode)
                .await
                .map(none)
        }
        Command::SetBreathingEnabled {
            enabled,
            chain_name,
        } => session
            .set_breathing_enabled(&chain_name, enabled)
            .await
            .map(none),

        Command::RunBehavior { name } => session.run_behavior(&name).await.map(none),
        Command::StopBehavior { name } => session.stop_behavior(&name).await.map(none),
    }
}

fn none(_: ()) -> Value {
    Value::Null
}

fn listing<T: serde::Serialize>(items: &[T]) -> Value {
    serde_json::to_value(items).unwrap_or_else(|e| {
        error!(error = %e, "failed to serialize listing");
        Value::Array(Vec::new())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nao_robot::SessionConfig;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn request(command_id: &str, data: Value) -> CommandRequest {
        CommandRequest {
            command_uuid: "uuid-1".into(),
            command_id: command_id.into(),
            command_data: data,
        }
    }

    async fn simulated_session() -> RobotSession {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = RobotSession::new(SessionConfig::default(), None, tx);
        session.connect().await.unwrap();
        session
    }

    #[tokio::test]
    async fn unknown_command_does_not_run() {
        let mut ran = false;
        let response = dispatch_with(&request("Fly", json!({})), |_| {
            ran = true;
            async { Ok(Value::Null) }
        })
        .await;
        assert!(!ran);
        assert_eq!(response.command_uuid, "uuid-1");
        assert!(!response.is_success());
        assert!(response.message.contains("Fly"));
    }

    #[tokio::test]
    async fn malformed_payload_does_not_run() {
        let mut ran = false;
        let response = dispatch_with(&request("Dance", json!({"dance": 1})), |_| {
            ran = true;
            async { Ok(Value::Null) }
        })
        .await;
        assert!(!ran);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn handler_panic_becomes_error_response() {
        let response = dispatch_with(&request("WakeUp", Value::Null), |_| async {
            if true {
                panic!("handler exploded");
            }
            Ok(Value::Null)
        })
        .await;
        assert_eq!(response.command_uuid, "uuid-1");
        assert!(!response.is_success());
        assert!(response.message.contains("WakeUp"));
    }

    #[tokio::test]
    async fn handler_error_text_is_the_message() {
        let response = dispatch_with(&request("Rest", Value::Null), |_| async {
            Err(RobotError::NotConnected)
        })
        .await;
        assert_eq!(response.message, RobotError::NotConnected.to_string());
        assert!(response.data.is_null());
    }

    #[tokio::test]
    async fn catalog_queries_return_listings() {
        let session = simulated_session().await;

        let dances = dispatch(&session, &request("GetDanceBehaviors", Value::Null)).await;
        assert!(dances.is_success());
        let ids: Vec<&str> = dances
            .data
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["caravan-palace-se", "eagle-dance", "gangnam-style", "thriller-dance"]);
        assert_eq!(dances.data[1]["localizedName"]["fr"], "La danse de l'aigle");

        let types = dispatch(&session, &request("GetExpressiveReactionTypes", Value::Null)).await;
        assert_eq!(types.data, json!(["Happy", "Proud", "Laugh", "Sad", "HeadTouched"]));

        let actions = dispatch(&session, &request("GetBodyActionBehaviors", Value::Null)).await;
        assert_eq!(actions.data.as_array().unwrap().len(), 6);
        assert_eq!(actions.data[0]["behaviorName"], "dialog_move_arms/animations/StretchBothArms");
    }

    #[tokio::test]
    async fn simulated_actions_succeed() {
        let session = simulated_session().await;
        for (id, data) in [
            ("Say", json!({"text": "hello"})),
            ("GenericNao", json!({"text": "note"})),
            ("StandUp", Value::Null),
            ("Dance", json!({"danceId": "gangnam-style"})),
            ("SetBreathingEnabled", json!({"enabled": true, "chainName": "Body"})),
        ] {
            let response = dispatch(&session, &request(id, data)).await;
            assert!(response.is_success(), "{id} failed: {}", response.message);
            assert!(response.data.is_null());
        }
    }

    #[tokio::test]
    async fn simulated_dance_can_be_stopped() {
        let session = simulated_session().await;
        let response = dispatch(&session, &request("Dance", json!({"danceId": "eagle-dance"}))).await;
        assert!(response.is_success());
        let response = dispatch(&session, &request("StopDance", json!({"danceId": "eagle-dance"}))).await;
        assert!(response.is_success(), "{}", response.message);

        let response = dispatch(&session, &request("StopDance", json!({"danceId": "tango"}))).await;
        assert!(!response.is_success());
        assert_eq!(response.message, "dance 'tango' not found");
    }
}
