use std::sync::Arc;

use nao_robot::RobotSession;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use serde::Deserialize;

use crate::tools::{NaoTools, ToolReply};

/// Failure to bring up or run the MCP service.
#[derive(Debug, thiserror::Error)]
pub enum McpServeError {
    #[error("mcp initialization failed: {0}")]
    Init(String),
    #[error("mcp service stopped abnormally: {0}")]
    Stopped(String),
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LanguageArgs {
    /// The language to set (must be one of: English, French)
    pub language: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SayArgs {
    /// The text to say
    pub text: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DanceArgs {
    /// The id of the dance to perform
    pub dance_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReactionArgs {
    /// The type of reaction to make
    pub reaction_type: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct BodyActionArgs {
    /// The id of the body action to perform
    pub body_action_id: String,
}

fn into_result(reply: ToolReply) -> Result<CallToolResult, McpError> {
    let content = vec![Content::text(reply.text)];
    Ok(if reply.ok {
        CallToolResult::success(content)
    } else {
        CallToolResult::error(content)
    })
}

/// MCP server exposing robot tools.
#[derive(Clone)]
pub struct NaoMcpServer {
    tools: NaoTools,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl NaoMcpServer {
    pub fn new(session: Arc<RobotSession>) -> Self {
        Self {
            tools: NaoTools::new(session),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Change the language of Nao text to speech.")]
    async fn set_tts_language(
        &self,
        Parameters(LanguageArgs { language }): Parameters<LanguageArgs>,
    ) -> Result<CallToolResult, McpError> {
        into_result(self.tools.set_tts_language(&language).await)
    }

    #[tool(description = "Make Nao say something.")]
    async fn say(&self, Parameters(SayArgs { text }): Parameters<SayArgs>) -> Result<CallToolResult, McpError> {
        into_result(self.tools.say(&text).await)
    }

    #[tool(description = "Enable Nao motors for action. Call it at the beginning of an interaction, before any movement.")]
    async fn wake_up(&self) -> Result<CallToolResult, McpError> {
        into_result(self.tools.wake_up().await)
    }

    #[tool(description = "Disable Nao motors. Call it at the end of an interaction.")]
    async fn rest(&self) -> Result<CallToolResult, McpError> {
        into_result(self.tools.rest().await)
    }

    #[tool(description = "Make Nao stand up.")]
    async fn stand_up(&self) -> Result<CallToolResult, McpError> {
        into_result(self.tools.stand_up().await)
    }

    #[tool(description = "Make Nao sit down.")]
    async fn sit_down(&self) -> Result<CallToolResult, McpError> {
        into_result(self.tools.sit_down().await)
    }

    #[tool(description = "Get the list of available dances as JSON (id, localized names, behavior name, description). Needed before calling dance.")]
    async fn get_dance_list(&self) -> Result<CallToolResult, McpError> {
        into_result(self.tools.get_dance_list())
    }

    #[tool(description = "Make Nao perform a dance from get_dance_list.")]
    async fn dance(&self, Parameters(DanceArgs { dance_id }): Parameters<DanceArgs>) -> Result<CallToolResult, McpError> {
        into_result(self.tools.dance(&dance_id).await)
    }

    #[tool(description = "Get the list of available reaction types as JSON. Needed before calling expressive_reaction.")]
    async fn get_expressive_reaction_types(&self) -> Result<CallToolResult, McpError> {
        into_result(self.tools.get_expressive_reaction_types())
    }

    #[tool(description = "Make Nao react to a specific emotion or situation from get_expressive_reaction_types.")]
    async fn expressive_reaction(
        &self,
        Parameters(ReactionArgs { reaction_type }): Parameters<ReactionArgs>,
    ) -> Result<CallToolResult, McpError> {
        into_result(self.tools.expressive_reaction(&reaction_type).await)
    }

    #[tool(description = "Get the list of available body actions as JSON. Needed before calling body_action.")]
    async fn get_body_actions_list(&self) -> Result<CallToolResult, McpError> {
        into_result(self.tools.get_body_actions_list())
    }

    #[tool(description = "Make Nao perform a body action from get_body_actions_list.")]
    async fn body_action(
        &self,
        Parameters(BodyActionArgs { body_action_id }): Parameters<BodyActionArgs>,
    ) -> Result<CallToolResult, McpError> {
        into_result(self.tools.body_action(&body_action_id).await)
    }
}

#[tool_handler]
impl ServerHandler for NaoMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Controls a Nao robot. Call wake_up before moving it and rest when done.".into(),
            ),
            ..Default::default()
        }
    }
}

/// Serve the robot tools over stdin/stdout until the client disconnects.
pub async fn serve_stdio(session: Arc<RobotSession>) -> Result<(), McpServeError> {
    let service = NaoMcpServer::new(session)
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|e| McpServeError::Init(e.to_string()))?;
    tracing::info!("mcp server ready on stdio");

    let reason = service
        .waiting()
        .await
        .map_err(|e| McpServeError::Stopped(e.to_string()))?;
    tracing::info!(reason = ?reason, "mcp server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nao_robot::SessionConfig;
    use tokio::sync::mpsc;

    async fn simulated_server() -> NaoMcpServer {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = SessionConfig { fake_robot: true, ..SessionConfig::default() };
        let session = Arc::new(RobotSession::new(config, None, tx));
        session.connect().await.unwrap();
        NaoMcpServer::new(session)
    }

    #[tokio::test]
    async fn registers_every_tool() {
        let server = simulated_server().await;
        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "body_action",
                "dance",
                "expressive_reaction",
                "get_body_actions_list",
                "get_dance_list",
                "get_expressive_reaction_types",
                "rest",
                "say",
                "set_tts_language",
                "sit_down",
                "stand_up",
                "wake_up",
            ]
        );
    }

    #[tokio::test]
    async fn advertises_tools_capability() {
        let server = simulated_server().await;
        assert!(server.get_info().capabilities.tools.is_some());
    }

    #[tokio::test]
    async fn failed_action_is_a_tool_error() {
        let server = simulated_server().await;

        let ok = server
            .dance(Parameters(DanceArgs { dance_id: "eagle-dance".into() }))
            .await
            .unwrap();
        assert_eq!(ok.is_error, Some(false));

        let failed = server
            .dance(Parameters(DanceArgs { dance_id: "moonwalk".into() }))
            .await
            .unwrap();
        assert_eq!(failed.is_error, Some(true));
    }
}
