/// Error taxonomy for everything that touches the robot.
/// Classifies errors as configuration, connection, robot-side, or client errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RobotError {
    // Configuration / connection
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to connect to {url} after {attempts} attempts: {reason}")]
    ConnectFailed {
        url: String,
        attempts: u32,
        reason: String,
    },
    #[error("not connected to the robot")]
    NotConnected,

    // Robot side
    #[error("service {0} is not available")]
    ServiceUnavailable(&'static str),
    #[error("robot call failed: {0}")]
    Remote(String),
    #[error("robot did not reach posture {0}")]
    PostureNotReached(String),
    #[error("robot task failed: {0}")]
    TaskFailed(String),

    // Client errors
    #[error("dance '{0}' not found")]
    UnknownDance(String),
    #[error("reaction type '{0}' not found")]
    UnknownReactionType(String),
    #[error("body action '{0}' not found")]
    UnknownBodyAction(String),
    #[error("no behaviors registered for reaction type '{0}'")]
    NoReactionBehaviors(String),
    #[error("{kind} '{id}' is not running")]
    NotRunning { kind: &'static str, id: String },
}

impl RobotError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    /// Errors caused by what the client asked for rather than by the robot.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownDance(_)
                | Self::UnknownReactionType(_)
                | Self::UnknownBodyAction(_)
                | Self::NoReactionBehaviors(_)
                | Self::NotRunning { .. }
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ConnectFailed { .. } => "connect_failed",
            Self::NotConnected => "not_connected",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Remote(_) => "remote",
            Self::PostureNotReached(_) => "posture_not_reached",
            Self::TaskFailed(_) => "task_failed",
            Self::UnknownDance(_) => "unknown_dance",
            Self::UnknownReactionType(_) => "unknown_reaction_type",
            Self::UnknownBodyAction(_) => "unknown_body_action",
            Self::NoReactionBehaviors(_) => "no_reaction_behaviors",
            Self::NotRunning { .. } => "not_running",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_classification() {
        assert!(RobotError::UnknownDance("x".into()).is_client_error());
        assert!(RobotError::NotRunning { kind: "dance", id: "x".into() }.is_client_error());
        assert!(!RobotError::NotConnected.is_client_error());
        assert!(!RobotError::remote("boom").is_client_error());
        assert!(!RobotError::ServiceUnavailable("ALMotion").is_client_error());
    }

    #[test]
    fn messages_name_the_subject() {
        let err = RobotError::NotRunning { kind: "dance", id: "gangnam-style".into() };
        assert_eq!(err.to_string(), "dance 'gangnam-style' is not running");

        let err = RobotError::ConnectFailed {
            url: "tcp://10.0.0.2:9559".into(),
            attempts: 10,
            reason: "refused".into(),
        };
        assert!(err.to_string().contains("after 10 attempts"));
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(RobotError::NotConnected.error_kind(), "not_connected");
        assert_eq!(RobotError::PostureNotReached("Sit".into()).error_kind(), "posture_not_reached");
        assert_eq!(RobotError::TaskFailed("panic".into()).error_kind(), "task_failed");
    }
}
