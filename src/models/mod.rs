use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            author: author.into(),
            text: text.into(),
        }
    }

    // Same layout the chat log has always used: "<time> [<author>]- <text>"
    pub fn format(&self) -> String {
        format!("{} [{}]- {}", self.timestamp.to_rfc3339(), self.author, self.text)
    }
}

#[cfg(test)]
impl ChatMessage {
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Where the single live round currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Idle,
    Voting,
    WinnerStaged,
    CaseOpened,
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundState::Idle => "idle",
            RoundState::Voting => "voting",
            RoundState::WinnerStaged => "winner staged",
            RoundState::CaseOpened => "case opened",
        };
        f.write_str(name)
    }
}

/// Operator commands that move the round between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowCommand {
    Start,
    Stop,
    StageWinner,
    OpenCase,
    ResetToSelection,
}

impl fmt::Display for ShowCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShowCommand::Start => "start",
            ShowCommand::Stop => "stop",
            ShowCommand::StageWinner => "stage_winner",
            ShowCommand::OpenCase => "open_case",
            ShowCommand::ResetToSelection => "reset_to_selection",
        };
        f.write_str(name)
    }
}
