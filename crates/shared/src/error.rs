use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Start,
    Stop,
    CloseAll,
    CancelAll,
}

impl CommandKind {
    pub fn label(self) -> &'static str {
        match self {
            CommandKind::Start => "start",
            CommandKind::Stop => "stop",
            CommandKind::CloseAll => "close_all",
            CommandKind::CancelAll => "cancel_all",
        }
    }
}

/// Why an operator command did not take effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{} is not available while the session is {status}", .command.label())]
    Gated {
        command: CommandKind,
        status: String,
    },
    #[error("another command ({}) is still in flight", .0.label())]
    InFlight(CommandKind),
    #[error("invalid strategy config: {0}")]
    InvalidConfig(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

impl CommandError {
    /// Errors produced locally never reached the backend.
    pub fn reached_backend(&self) -> bool {
        matches!(self, CommandError::Transport(_) | CommandError::Rejected(_))
    }
}
